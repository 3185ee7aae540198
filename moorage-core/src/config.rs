//! Bootstrap configuration surface.
//!
//! The typed [`BootstrapConfig`] is what the rest of the crate consumes.
//! [`BootstrapConfig::from_raw`] accepts a loosely-shaped JSON value (the
//! form configuration arrives in from config files or embedding hosts) and
//! performs the explicit shape checks the typed deserializer would otherwise
//! paper over: a non-string URI, an array where a mapping was expected, or a
//! non-boolean exposure flag are all rejected before any I/O starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BootstrapError, Result};
use crate::globals::CollisionPolicy;

/// Driver-specific connection options, passed through opaquely.
pub type ConnectOptions = BTreeMap<String, Value>;

fn default_expose() -> bool {
    true
}

/// Validated configuration for one initialization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Database connection string, e.g. `postgres://localhost/app`
    pub connection_uri: String,

    /// Options forwarded to the driver when the connection is opened
    #[serde(default)]
    pub connection_options: ConnectOptions,

    /// Whether registered models are published into the global bindings
    /// registry after a successful run. Defaults to `true`.
    #[serde(default = "default_expose")]
    pub expose_models_globally: bool,

    /// What to do when two models map to the same global binding name
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

impl BootstrapConfig {
    /// Create a config with defaults for everything but the URI.
    pub fn new(connection_uri: impl Into<String>) -> Self {
        Self {
            connection_uri: connection_uri.into(),
            connection_options: ConnectOptions::new(),
            expose_models_globally: true,
            collision_policy: CollisionPolicy::default(),
        }
    }

    /// Validate the config. Runs synchronously, before any connection
    /// attempt; a failure here never reaches the driver.
    pub fn validate(&self) -> Result<()> {
        let uri = self.connection_uri.trim();
        if uri.is_empty() {
            return Err(BootstrapError::config(
                "`connection_uri` must be a non-empty database connection string",
            ));
        }
        if !uri.contains("://") {
            return Err(BootstrapError::config(format!(
                "`connection_uri` does not look like a connection string (expected `scheme://...`, got `{uri}`)"
            )));
        }
        Ok(())
    }

    /// Build a validated config from a loosely-shaped JSON value.
    ///
    /// Mirrors the checks a dynamic host would perform by hand: each field
    /// is verified for shape individually so the error names the offending
    /// key rather than a serde path.
    pub fn from_raw(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| BootstrapError::config("configuration must be a mapping"))?;

        let connection_uri = match obj.get("connection_uri") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(BootstrapError::config(
                    "`connection_uri` must be a string (a database connection string)",
                ))
            }
            None => {
                return Err(BootstrapError::config(
                    "`connection_uri` is required: expected a database connection string",
                ))
            }
        };

        let connection_options = match obj.get("connection_options") {
            None | Some(Value::Null) => ConnectOptions::new(),
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Some(_) => {
                return Err(BootstrapError::config(
                    "`connection_options` must be a mapping of driver options, not a list or scalar",
                ))
            }
        };

        let expose_models_globally = match obj.get("expose_models_globally") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(BootstrapError::config(
                    "`expose_models_globally` must be either `true` or `false`",
                ))
            }
        };

        let collision_policy = match obj.get("collision_policy") {
            None | Some(Value::Null) => CollisionPolicy::default(),
            Some(v) => serde_json::from_value(v.clone()).map_err(|_| {
                BootstrapError::config(
                    "`collision_policy` must be one of `reject`, `warn`, `overwrite`",
                )
            })?,
        };

        let config = Self {
            connection_uri,
            connection_options,
            expose_models_globally,
            collision_policy,
        };
        config.validate()?;
        Ok(config)
    }
}
