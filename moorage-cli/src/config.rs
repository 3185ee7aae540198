//! CLI configuration: `~/.moorage/config.toml` plus environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use moorage_core::{BootstrapConfig, CollisionPolicy, ConnectOptions};

/// Environment variable that overrides `[database].uri`.
pub const DATABASE_URL_ENV: &str = "MOORAGE_DATABASE_URL";

fn default_uri() -> String {
    "postgres://localhost/moorage_app".to_string()
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MoorageConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string; `MOORAGE_DATABASE_URL` wins over this
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Driver options forwarded opaquely at connect time
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Directory of `*.json` model definition files
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,
    /// Publish registered models into the global bindings registry
    #[serde(default = "default_true")]
    pub expose_globally: bool,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
            expose_globally: true,
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl MoorageConfig {
    /// Default config file path: `~/.moorage/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".moorage/config.toml")
    }

    /// Load config from an explicit path, or from the default location.
    ///
    /// An explicit path that doesn't exist is an error; a missing default
    /// file just yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context(format!("Failed to read config file: {}", path.display()))?;
            let config: Self = toml::from_str(&content)
                .context(format!("Failed to parse config file (invalid TOML): {}", path.display()))?;
            info!(path = %path.display(), "loaded config");
            config
        } else if required {
            anyhow::bail!("Config not found at {}", path.display());
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Ok(uri) = std::env::var(DATABASE_URL_ENV) {
            debug!("database URI overridden from {DATABASE_URL_ENV}");
            config.database.uri = uri;
        }

        Ok(config)
    }

    /// Lower this config into the bootstrap subsystem's shape.
    pub fn to_bootstrap_config(&self) -> Result<BootstrapConfig> {
        let mut options = ConnectOptions::new();
        for (key, value) in &self.database.options {
            options.insert(key.clone(), toml_to_json(value)?);
        }

        Ok(BootstrapConfig {
            connection_uri: self.database.uri.clone(),
            connection_options: options,
            expose_models_globally: self.models.expose_globally,
            collision_policy: self.models.collision_policy,
        })
    }
}

/// Load `.env` from the current directory and `~/.moorage/.env`.
/// Existing environment variables always win.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env from current directory");
    }
    if let Some(home) = dirs::home_dir() {
        let env_file = home.join(".moorage/.env");
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => debug!(path = %env_file.display(), "loaded ~/.moorage/.env"),
                Err(e) => debug!("failed to load ~/.moorage/.env: {e}"),
            }
        }
    }
}

fn toml_to_json(value: &toml::Value) -> Result<serde_json::Value> {
    serde_json::to_value(value).context("connection option is not representable as JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_implicit_config() {
        let config = MoorageConfig::default();
        assert_eq!(config.database.uri, "postgres://localhost/moorage_app");
        assert!(config.database.options.is_empty());
        assert!(config.models.expose_globally);
    }

    #[test]
    fn parses_full_toml_config() {
        let config: MoorageConfig = toml::from_str(
            r#"
            [database]
            uri = "postgres://db.internal/app"

            [database.options]
            max_connections = 8

            [models]
            dir = "defs"
            expose_globally = false
            collision_policy = "reject"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.uri, "postgres://db.internal/app");
        assert_eq!(config.models.dir, PathBuf::from("defs"));
        assert!(!config.models.expose_globally);
        assert_eq!(config.models.collision_policy, CollisionPolicy::Reject);

        let bootstrap = config.to_bootstrap_config().unwrap();
        assert_eq!(
            bootstrap.connection_options["max_connections"],
            serde_json::json!(8)
        );
        assert!(!bootstrap.expose_models_globally);
    }
}
