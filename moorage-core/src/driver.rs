//! The driver seam.
//!
//! Everything database-specific lives behind [`Driver`]: opening the
//! connection, compiling a field mapping into a driver-level schema, and
//! binding a compiled schema to a named model. The bootstrap pipeline in
//! this crate never touches the wire; query execution and migrations are
//! entirely the driver's (and its callers') business.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConnectOptions;
use crate::definition::{FieldMap, Identity};

/// Errors surfaced by driver implementations.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The server actively refused the connection
    #[error("connection refused: {message}")]
    Refused { message: String },

    /// Any other connection-establishment failure
    #[error("{message}")]
    Connection { message: String },

    /// The field mapping cannot be compiled into a driver schema
    #[error("{message}")]
    Schema { message: String },

    /// A compiled schema could not be bound to a model
    #[error("{message}")]
    Bind { message: String },
}

impl DriverError {
    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
        }
    }

    /// Whether this is a connection-refused failure, either classified by
    /// the driver or recognizable from the message text.
    pub fn is_refused(&self) -> bool {
        match self {
            Self::Refused { .. } => true,
            Self::Connection { message } => {
                message.contains("ECONNREFUSED") || message.contains("Connection refused")
            }
            _ => false,
        }
    }
}

/// A database driver capable of backing the bootstrap pipeline.
///
/// `connect` resolves exactly once by construction (it is a future, not an
/// event subscription), which is what makes the supervisor's
/// exactly-one-terminal-event invariant hold without runtime bookkeeping.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Live connection handle (e.g. a pool)
    type Conn: Send + Sync;
    /// Compiled, driver-level schema
    type Schema: Send;
    /// Registered, queryable model
    type Model: Send + Sync;

    /// Establish the connection. Must not retry internally; the first
    /// terminal outcome is the only one.
    async fn connect(
        &self,
        uri: &str,
        options: &ConnectOptions,
    ) -> Result<Self::Conn, DriverError>;

    /// Compile a field mapping into this driver's schema representation.
    fn compile_schema(
        &self,
        identity: &Identity,
        fields: &FieldMap,
    ) -> Result<Self::Schema, DriverError>;

    /// Bind a compiled schema to a named model on an open connection.
    fn bind_model(
        &self,
        conn: &Self::Conn,
        identity: &Identity,
        schema: Self::Schema,
    ) -> Result<Self::Model, DriverError>;
}
