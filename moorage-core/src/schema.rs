//! Schema building: one [`ModelDefinition`] in, one driver-level schema out.

use tracing::debug;

use crate::definition::{Identity, ModelDefinition, SchemaSource};
use crate::driver::Driver;
use crate::error::{BootstrapError, Result};

/// Context handed to custom schema constructors.
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Identity of the model being built
    pub identity: &'a Identity,
    /// The connection string the run was configured with
    pub connection_uri: &'a str,
}

/// Build the driver-level schema for one definition.
///
/// `Fields` definitions go through the driver's native schema constructor;
/// `Custom` definitions invoke the user-supplied constructor with the field
/// mapping and the build context. A custom constructor's failure is wrapped
/// with the model identity so batch-level errors stay attributable.
pub fn build<D: Driver>(
    driver: &D,
    definition: &ModelDefinition<D::Schema>,
    connection_uri: &str,
) -> Result<D::Schema> {
    let identity = &definition.identity;
    let ctx = BuildContext {
        identity,
        connection_uri,
    };

    match &definition.source {
        SchemaSource::Fields(fields) => {
            debug!(model = %identity, fields = fields.len(), "compiling schema");
            driver.compile_schema(identity, fields).map_err(|err| {
                BootstrapError::schema_shape(identity.as_str(), err.to_string())
            })
        }
        SchemaSource::Custom { fields, builder } => {
            debug!(model = %identity, "running custom schema constructor");
            builder(fields, &ctx).map_err(|err| BootstrapError::SchemaBuilderFailed {
                model: identity.as_str().to_string(),
                reason: err.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectOptions;
    use crate::definition::{FieldMap, FieldSpec};
    use crate::driver::DriverError;
    use async_trait::async_trait;

    /// Driver whose schemas are just the field count.
    struct CountingDriver;

    #[async_trait]
    impl Driver for CountingDriver {
        type Conn = ();
        type Schema = usize;
        type Model = ();

        async fn connect(&self, _: &str, _: &ConnectOptions) -> std::result::Result<(), DriverError> {
            Ok(())
        }

        fn compile_schema(&self, _: &Identity, fields: &FieldMap) -> std::result::Result<usize, DriverError> {
            Ok(fields.len())
        }

        fn bind_model(&self, _: &(), _: &Identity, _: usize) -> std::result::Result<(), DriverError> {
            Ok(())
        }
    }

    #[test]
    fn fields_go_through_native_constructor() {
        let mut fields = FieldMap::new();
        fields.insert("title".into(), FieldSpec::new("string"));
        let def = ModelDefinition::with_fields("post", fields);
        let schema = build(&CountingDriver, &def, "postgres://localhost/x").unwrap();
        assert_eq!(schema, 1);
    }

    #[test]
    fn custom_constructor_sees_fields_and_context() {
        let mut fields = FieldMap::new();
        fields.insert("title".into(), FieldSpec::new("string"));
        let def = ModelDefinition::with_fields("post", fields).with_builder(|fields, ctx| {
            assert_eq!(ctx.identity.as_str(), "post");
            assert!(ctx.connection_uri.starts_with("postgres://"));
            Ok(fields.len() + 10)
        });
        let schema = build(&CountingDriver, &def, "postgres://localhost/x").unwrap();
        assert_eq!(schema, 11);
    }

    #[test]
    fn custom_constructor_failure_is_wrapped_with_identity() {
        let def = ModelDefinition::<usize>::new("foo")
            .with_builder(|_, _| Err("bad field".into()));
        let err = build(&CountingDriver, &def, "postgres://localhost/x").unwrap_err();
        assert_eq!(err.code(), "SchemaBuilderError");
        let msg = err.to_string();
        assert!(msg.contains("foo"));
        assert!(msg.contains("bad field"));
        assert!(msg.contains("error while running custom schema constructor"));
    }
}
