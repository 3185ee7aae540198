//! moorage CLI - database bootstrap and model registry front end
//!
//! Subcommands:
//! - `check`: validate configuration and model definitions without touching
//!   the database
//! - `models`: list the model definitions discovered on disk
//! - `boot`: connect to Postgres, register every model, and print the
//!   resulting catalog

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use moorage_core::{initialize, GlobalBindings};
use moorage_postgres::PgDriver;

mod config;
mod discover;
mod tracing_setup;

use config::MoorageConfig;
use discover::FsModelSource;

#[derive(Parser, Debug)]
#[command(
    name = "moorage",
    author,
    version,
    about = "Bootstrap a Postgres-backed model registry from declarative definitions"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Path to config file (default: ~/.moorage/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate config and model definitions without connecting
    Check,
    /// List discovered model definitions
    Models,
    /// Connect, register all models, and print the catalog
    Boot {
        /// Skip publishing models into the global bindings registry
        #[arg(long)]
        no_globals: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(cli.debug)?;
    config::load_dotenv();

    let cfg = MoorageConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Check => cmd_check(&cfg),
        Commands::Models => cmd_models(&cfg),
        Commands::Boot { no_globals } => cmd_boot(&cfg, no_globals).await,
    }
}

fn cmd_check(cfg: &MoorageConfig) -> Result<()> {
    let bootstrap = cfg.to_bootstrap_config()?;
    bootstrap.validate()?;

    let definitions = FsModelSource::new(cfg.models.dir.clone()).load_definitions()?;
    println!(
        "ok: config valid, {} model definition(s) in {}",
        definitions.len(),
        cfg.models.dir.display()
    );
    Ok(())
}

fn cmd_models(cfg: &MoorageConfig) -> Result<()> {
    let definitions = FsModelSource::new(cfg.models.dir.clone()).load_definitions()?;
    if definitions.is_empty() {
        println!("no model definitions in {}", cfg.models.dir.display());
        return Ok(());
    }
    for def in definitions.values() {
        println!(
            "{:<20} global: {:<20} fields: {}",
            def.identity.as_str(),
            def.display_name(),
            def.fields().len()
        );
    }
    Ok(())
}

async fn cmd_boot(cfg: &MoorageConfig, no_globals: bool) -> Result<()> {
    let mut bootstrap = cfg.to_bootstrap_config()?;
    if no_globals {
        bootstrap.expose_models_globally = false;
    }

    let driver = PgDriver::default();
    let source = FsModelSource::new(cfg.models.dir.clone());
    let bindings = GlobalBindings::new(bootstrap.collision_policy);

    let (tx, rx) = tokio::sync::oneshot::channel();
    initialize(&driver, &bootstrap, &source, &bindings, move |outcome| {
        let _ = tx.send(outcome);
    })
    .await;

    let catalog = rx
        .await
        .context("initialization finished without reporting an outcome")??;

    info!(models = catalog.len(), "bootstrap complete");
    for handle in catalog.iter() {
        println!(
            "{:<20} global: {:<20} table: {}",
            handle.identity.as_str(),
            handle.global_id,
            handle.model().table()
        );
    }
    if bootstrap.expose_models_globally {
        println!("exposed {} global binding(s)", bindings.len());
    }
    Ok(())
}
