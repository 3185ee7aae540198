//! Model registration: compiled schemas become named, queryable handles.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::definition::{Identity, ModelDefinition};
use crate::driver::Driver;
use crate::error::{BootstrapError, Result};

/// A registered model: the driver's model reference plus identity metadata.
///
/// Identity and display name are set here explicitly rather than inherited
/// from whatever the driver defaults to, so downstream consumers see the
/// same metadata regardless of how the model was registered.
pub struct ModelHandle<M> {
    pub identity: Identity,
    /// Display name used for the global binding
    pub global_id: String,
    model: Arc<M>,
}

impl<M> ModelHandle<M> {
    pub fn new(identity: Identity, global_id: String, model: M) -> Self {
        Self {
            identity,
            global_id,
            model: Arc::new(model),
        }
    }

    /// The underlying driver model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Whether two handles refer to the same underlying driver model.
    pub fn same_model(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
    }
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            global_id: self.global_id.clone(),
            model: Arc::clone(&self.model),
        }
    }
}

impl<M> std::fmt::Debug for ModelHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("identity", &self.identity)
            .field("global_id", &self.global_id)
            .finish_non_exhaustive()
    }
}

/// All models registered by one successful initialization run, keyed by
/// identity. Lookup is case-insensitive.
pub struct ModelCatalog<M> {
    handles: BTreeMap<Identity, ModelHandle<M>>,
}

impl<M> ModelCatalog<M> {
    pub fn get(&self, identity: impl AsRef<str>) -> Option<&ModelHandle<M>> {
        self.handles.get(&Identity::new(identity))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handles in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelHandle<M>> {
        self.handles.values()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.handles.keys()
    }
}

impl<M> std::fmt::Debug for ModelCatalog<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("identities", &self.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Bind every compiled schema to a named model and attach identity
/// metadata from the original definitions.
///
/// Iteration is in identity order, so logs and failures are deterministic.
/// The first bind failure aborts the batch.
pub fn register_models<D: Driver>(
    driver: &D,
    conn: &D::Conn,
    schemas: BTreeMap<Identity, D::Schema>,
    definitions: &BTreeMap<Identity, ModelDefinition<D::Schema>>,
) -> Result<ModelCatalog<D::Model>> {
    let mut handles = BTreeMap::new();

    for (identity, schema) in schemas {
        let model = driver.bind_model(conn, &identity, schema).map_err(|err| {
            BootstrapError::registration(identity.as_str(), err.to_string())
        })?;

        let global_id = definitions
            .get(&identity)
            .map(ModelDefinition::display_name)
            .unwrap_or_else(|| identity.capitalized());

        debug!(model = %identity, global_id = %global_id, "registered model");
        handles.insert(identity.clone(), ModelHandle::new(identity, global_id, model));
    }

    info!(count = handles.len(), "model registration complete");
    Ok(ModelCatalog { handles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectOptions;
    use crate::definition::FieldMap;
    use crate::driver::DriverError;
    use async_trait::async_trait;

    struct NamingDriver;

    #[async_trait]
    impl Driver for NamingDriver {
        type Conn = ();
        type Schema = ();
        type Model = String;

        async fn connect(&self, _: &str, _: &ConnectOptions) -> std::result::Result<(), DriverError> {
            Ok(())
        }

        fn compile_schema(&self, _: &Identity, _: &FieldMap) -> std::result::Result<(), DriverError> {
            Ok(())
        }

        fn bind_model(&self, _: &(), identity: &Identity, _: ()) -> std::result::Result<String, DriverError> {
            if identity.as_str() == "broken" {
                return Err(DriverError::bind("table name rejected"));
            }
            Ok(format!("model:{identity}"))
        }
    }

    fn defs(names: &[&str]) -> BTreeMap<Identity, ModelDefinition<()>> {
        names
            .iter()
            .map(|n| (Identity::new(n), ModelDefinition::new(*n)))
            .collect()
    }

    #[test]
    fn registration_attaches_identity_and_display_name() {
        let definitions = defs(&["post", "user"]);
        let schemas = definitions.keys().cloned().map(|id| (id, ())).collect();

        let catalog = register_models(&NamingDriver, &(), schemas, &definitions).unwrap();
        assert_eq!(catalog.len(), 2);

        let post = catalog.get("post").unwrap();
        assert_eq!(post.identity.as_str(), "post");
        assert_eq!(post.global_id, "Post");
        assert_eq!(post.model(), "model:post");

        // case-insensitive lookup
        assert!(catalog.get("POST").is_some());
    }

    #[test]
    fn explicit_global_id_is_copied_onto_the_handle() {
        let mut definitions = defs(&["user"]);
        let id = Identity::new("user");
        definitions.insert(id.clone(), ModelDefinition::new("user").with_global_id("Account"));
        let schemas = [(id, ())].into_iter().collect();

        let catalog = register_models(&NamingDriver, &(), schemas, &definitions).unwrap();
        assert_eq!(catalog.get("user").unwrap().global_id, "Account");
    }

    #[test]
    fn bind_failure_aborts_the_batch() {
        let definitions = defs(&["broken", "post"]);
        let schemas = definitions.keys().cloned().map(|id| (id, ())).collect();

        let err = register_models(&NamingDriver, &(), schemas, &definitions).unwrap_err();
        assert_eq!(err.code(), "RegistrationError");
        assert!(err.to_string().contains("broken"));
    }
}
