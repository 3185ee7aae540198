//! Initialization: connection supervision and the guarded completion path.
//!
//! [`initialize`] is the subsystem's single entry point. It validates
//! configuration, opens the connection through the driver, loads model
//! definitions from the discovery collaborator, runs the schema → register
//! → expose pipeline, and delivers the outcome through a
//! [`CompletionGuard`]-wrapped callback — exactly once, success or failure.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::BootstrapConfig;
use crate::definition::{Identity, ModelDefinition};
use crate::driver::{Driver, DriverError};
use crate::error::{BootstrapError, Result};
use crate::globals::{self, GlobalBindings};
use crate::guard::{CompletionGuard, Outcome};
use crate::registry::{self, ModelCatalog};
use crate::schema;

/// The model-discovery collaborator: supplies identity → definition.
///
/// Discovery is external to this subsystem (file walking, embedding hosts,
/// hardcoded test fixtures); a failure here fails initialization
/// immediately, passed through to the completion callback.
#[async_trait]
pub trait ModelSource<S>: Send + Sync {
    async fn load(&self) -> anyhow::Result<BTreeMap<Identity, ModelDefinition<S>>>;
}

/// A fixed set of definitions, mostly useful in tests and embedders that
/// declare models in code.
pub struct StaticModelSource<S> {
    definitions: BTreeMap<Identity, ModelDefinition<S>>,
}

impl<S> StaticModelSource<S> {
    pub fn new(definitions: impl IntoIterator<Item = ModelDefinition<S>>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|def| (def.identity.clone(), def))
                .collect(),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> ModelSource<S> for StaticModelSource<S> {
    async fn load(&self) -> anyhow::Result<BTreeMap<Identity, ModelDefinition<S>>> {
        Ok(self.definitions.clone())
    }
}

/// Run the full initialization sequence and deliver the outcome through
/// `on_complete`, which is guaranteed to run exactly once.
///
/// On success the callback receives the [`ModelCatalog`]; the same handles
/// are also published into `globals` unless the config disables exposure.
/// On failure nothing is registered or exposed.
pub async fn initialize<D, F>(
    driver: &D,
    config: &BootstrapConfig,
    source: &dyn ModelSource<D::Schema>,
    bindings: &GlobalBindings<D::Model>,
    on_complete: F,
) where
    D: Driver,
    F: FnOnce(Outcome<ModelCatalog<D::Model>>) + Send + 'static,
{
    let guard = CompletionGuard::new(on_complete);
    let outcome = run(driver, config, source, bindings).await;
    guard.complete(outcome);
}

async fn run<D: Driver>(
    driver: &D,
    config: &BootstrapConfig,
    source: &dyn ModelSource<D::Schema>,
    bindings: &GlobalBindings<D::Model>,
) -> Result<ModelCatalog<D::Model>> {
    // Validation is synchronous and happens before any I/O.
    config.validate()?;

    info!(uri = %config.connection_uri, "opening database connection");
    let conn = driver
        .connect(&config.connection_uri, &config.connection_options)
        .await
        .map_err(|err| classify_connect_error(err, &config.connection_uri))?;
    debug!("database connection open");

    // A source that parses raw definitions may fail with a structured
    // bootstrap error (bad schema shape, non-callable constructor); those
    // keep their own kind. Anything else is a discovery failure.
    let definitions = source.load().await.map_err(|err| {
        match err.downcast::<BootstrapError>() {
            Ok(bootstrap_err) => bootstrap_err,
            Err(other) => BootstrapError::discovery(other),
        }
    })?;
    info!(count = definitions.len(), "model definitions loaded");

    // Schema builds are fail-fast: the first failure aborts the batch and
    // nothing gets registered.
    let mut schemas = BTreeMap::new();
    for (identity, definition) in &definitions {
        let compiled = schema::build(driver, definition, &config.connection_uri)?;
        schemas.insert(identity.clone(), compiled);
    }

    let catalog = registry::register_models(driver, &conn, schemas, &definitions)?;

    globals::expose(bindings, &catalog, config.expose_models_globally)?;

    info!(models = catalog.len(), "initialization complete");
    Ok(catalog)
}

/// Map a driver connect failure onto the bootstrap error taxonomy.
///
/// Connection-refused gets rewritten into a troubleshooting message naming
/// the configured URI; failures with no usable message are normalized
/// rather than propagated as-is; everything else passes through.
fn classify_connect_error(err: DriverError, uri: &str) -> BootstrapError {
    if err.is_refused() {
        return BootstrapError::ConnectionRefused {
            uri: uri.to_string(),
            message: err.to_string(),
        };
    }
    let message = err.to_string();
    if message.trim().is_empty() {
        return BootstrapError::UnrecognizedConnection;
    }
    BootstrapError::UnknownConnection { message }
}
