//! sqlx-backed Postgres driver for the moorage bootstrap pipeline.
//!
//! Owns the three database-specific pieces: pool establishment (with a
//! bounded connection count), field-spec → column-type schema compilation,
//! and model binding. Query execution and migrations stay with the caller;
//! a [`PgModel`] hands out the pool and table metadata and nothing more.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, warn};

use moorage_core::{ConnectOptions, Driver, DriverError, FieldMap, Identity};

/// Default maximum connections for the pool.
/// Kept low for single-process tooling.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Postgres allows identifiers up to 63 bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Postgres driver. Stateless; all per-run state lives in the pool and the
/// model handles it produces.
#[derive(Debug, Clone)]
pub struct PgDriver {
    max_connections: u32,
}

impl Default for PgDriver {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl PgDriver {
    pub fn new(max_connections: u32) -> Self {
        Self { max_connections }
    }
}

/// One column of a compiled schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgColumn {
    pub sql_type: String,
    pub not_null: bool,
}

/// Compiled, Postgres-level schema: column name → column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgSchema {
    columns: BTreeMap<String, PgColumn>,
}

impl PgSchema {
    pub fn columns(&self) -> &BTreeMap<String, PgColumn> {
        &self.columns
    }
}

/// A registered model: pool plus table metadata. Queryable in the sense
/// that the caller can take the pool and go; this crate does not execute
/// queries on its behalf.
#[derive(Debug, Clone)]
pub struct PgModel {
    pool: PgPool,
    table: String,
    schema: PgSchema,
}

impl PgModel {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &PgSchema {
        &self.schema
    }

    /// Render the `CREATE TABLE` statement this model's schema describes.
    /// Rendering only; running it is the caller's decision.
    pub fn create_table_sql(&self) -> String {
        let columns = self
            .schema
            .columns
            .iter()
            .map(|(name, col)| {
                if col.not_null {
                    format!("\"{name}\" {} NOT NULL", col.sql_type)
                } else {
                    format!("\"{name}\" {}", col.sql_type)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS \"{}\" ({columns})", self.table)
    }
}

#[async_trait]
impl Driver for PgDriver {
    type Conn = PgPool;
    type Schema = PgSchema;
    type Model = PgModel;

    async fn connect(&self, uri: &str, options: &ConnectOptions) -> Result<PgPool, DriverError> {
        let mut pool_options = PgPoolOptions::new().max_connections(self.max_connections);

        for (key, value) in options {
            match (key.as_str(), value.as_u64()) {
                ("max_connections", Some(n)) => {
                    pool_options = pool_options.max_connections(n as u32);
                }
                ("min_connections", Some(n)) => {
                    pool_options = pool_options.min_connections(n as u32);
                }
                ("acquire_timeout_secs", Some(n)) => {
                    pool_options = pool_options.acquire_timeout(Duration::from_secs(n));
                }
                ("idle_timeout_secs", Some(n)) => {
                    pool_options = pool_options.idle_timeout(Duration::from_secs(n));
                }
                _ => {
                    warn!(option = %key, "ignoring unrecognized connection option");
                }
            }
        }

        let pool = pool_options
            .connect(uri)
            .await
            .map_err(classify_sqlx_error)?;
        debug!(max_connections = self.max_connections, "postgres pool established");
        Ok(pool)
    }

    fn compile_schema(
        &self,
        identity: &Identity,
        fields: &FieldMap,
    ) -> Result<PgSchema, DriverError> {
        let mut columns = BTreeMap::new();
        for (name, spec) in fields {
            let sql_type = column_type(&spec.field_type).ok_or_else(|| {
                DriverError::schema(format!(
                    "field `{name}` of model `{identity}` has unsupported type `{}`",
                    spec.field_type
                ))
            })?;
            columns.insert(
                name.clone(),
                PgColumn {
                    sql_type: sql_type.to_string(),
                    not_null: spec.required,
                },
            );
        }
        Ok(PgSchema { columns })
    }

    fn bind_model(
        &self,
        conn: &PgPool,
        identity: &Identity,
        schema: PgSchema,
    ) -> Result<PgModel, DriverError> {
        let table = identity.as_str();
        if !is_valid_identifier(table) {
            return Err(DriverError::bind(format!(
                "`{table}` is not a valid Postgres table name"
            )));
        }
        Ok(PgModel {
            pool: conn.clone(),
            table: table.to_string(),
            schema,
        })
    }
}

/// Field-spec type name → Postgres column type.
fn column_type(field_type: &str) -> Option<&'static str> {
    match field_type.to_ascii_lowercase().as_str() {
        "string" | "text" => Some("TEXT"),
        "integer" | "int" => Some("BIGINT"),
        "number" | "float" | "double" => Some("DOUBLE PRECISION"),
        "boolean" | "bool" => Some("BOOLEAN"),
        "date" | "datetime" | "timestamp" => Some("TIMESTAMPTZ"),
        "json" | "object" => Some("JSONB"),
        "uuid" => Some("UUID"),
        "binary" | "bytes" => Some("BYTEA"),
        _ => None,
    }
}

/// Table names must be plain identifiers; quoting exotic names is not
/// worth the injection surface.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Map a sqlx connect failure onto the driver error taxonomy, walking the
/// error chain for an OS-level connection-refused.
fn classify_sqlx_error(err: sqlx::Error) -> DriverError {
    if chain_has_refused(&err) {
        DriverError::refused(err.to_string())
    } else {
        DriverError::connection(err.to_string())
    }
}

fn chain_has_refused(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use moorage_core::FieldSpec;

    fn fields(pairs: &[(&str, FieldSpec)]) -> FieldMap {
        pairs
            .iter()
            .map(|(name, spec)| (name.to_string(), spec.clone()))
            .collect()
    }

    #[test]
    fn compile_maps_field_types_to_columns() {
        let schema = PgDriver::default()
            .compile_schema(
                &Identity::new("post"),
                &fields(&[
                    ("title", FieldSpec::required("string")),
                    ("views", FieldSpec::new("integer")),
                    ("meta", FieldSpec::new("json")),
                ]),
            )
            .unwrap();

        assert_eq!(schema.columns()["title"].sql_type, "TEXT");
        assert!(schema.columns()["title"].not_null);
        assert_eq!(schema.columns()["views"].sql_type, "BIGINT");
        assert!(!schema.columns()["views"].not_null);
        assert_eq!(schema.columns()["meta"].sql_type, "JSONB");
    }

    #[test]
    fn compile_rejects_unknown_field_type() {
        let err = PgDriver::default()
            .compile_schema(
                &Identity::new("post"),
                &fields(&[("title", FieldSpec::new("varchar2"))]),
            )
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("title"));
        assert!(msg.contains("varchar2"));
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("post"));
        assert!(is_valid_identifier("_audit_log2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1post"));
        assert!(!is_valid_identifier("post; drop table users"));
        assert!(!is_valid_identifier(&"x".repeat(64)));
    }

    #[test]
    fn refused_detection_walks_the_error_chain() {
        #[derive(Debug)]
        struct Outer(io::Error);
        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "outer: {}", self.0)
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let refused = Outer(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(chain_has_refused(&refused));

        let other = Outer(io::Error::from(io::ErrorKind::TimedOut));
        assert!(!chain_has_refused(&other));
    }

    #[tokio::test]
    async fn create_table_sql_renders_columns_in_order() {
        // connect_lazy performs no I/O
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let driver = PgDriver::default();
        let schema = driver
            .compile_schema(
                &Identity::new("post"),
                &fields(&[
                    ("title", FieldSpec::required("string")),
                    ("views", FieldSpec::new("integer")),
                ]),
            )
            .unwrap();
        let model = driver
            .bind_model(&pool, &Identity::new("post"), schema)
            .unwrap();
        assert_eq!(
            model.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"post\" (\"title\" TEXT NOT NULL, \"views\" BIGINT)"
        );
    }

    // Integration tests require a real database.
    // Run with: DATABASE_URL=postgres://... cargo test -p moorage-postgres -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn connect_establishes_a_pool() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgDriver::default()
            .connect(&url, &ConnectOptions::new())
            .await
            .expect("pool creation failed");

        let result: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    #[ignore = "requires network"]
    async fn connect_to_closed_port_classifies_as_refused() {
        // port 1 is essentially guaranteed closed locally
        let err = PgDriver::default()
            .connect("postgres://127.0.0.1:1/nope", &ConnectOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_refused(), "got: {err}");
    }
}
