/// Structured error types for moorage-core.
///
/// Uses `thiserror` for better API surface and error composition.
/// Binary crates (moorage-cli) can still use `anyhow` for convenience,
/// but library consumers get structured, composable errors.
use thiserror::Error;

/// Result type alias for moorage-core operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Everything that can go wrong between "initialize was called" and
/// "the completion callback fired".
///
/// Each variant maps to a stable [`code`](BootstrapError::code) marker so
/// callers can branch on error kind without matching on the enum directly
/// (useful across an FFI or logging boundary).
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Configuration rejected before any I/O was attempted
    #[error("Configuration error: {reason}")]
    ConfigValidation { reason: String },

    /// The database actively refused the connection. Rewritten into a
    /// troubleshooting message that names the configured URI.
    #[error(
        "Could not connect to the database at `{uri}`: the connection was refused ({message}).\n\
         Make sure the database server is running, the connection URI is correct, \
         and the configured connection options are valid."
    )]
    ConnectionRefused { uri: String, message: String },

    /// Any other connection failure, passed through with the driver's message
    #[error("Database connection failed: {message}")]
    UnknownConnection { message: String },

    /// The driver reported a failure but the payload carried no usable
    /// message; normalized instead of propagating garbage
    #[error("Unrecognized connection error: the database driver reported a malformed failure")]
    UnrecognizedConnection,

    /// A model's `schema` field has the wrong shape
    #[error("Invalid schema for model `{model}`: {reason}")]
    SchemaShape { model: String, reason: String },

    /// A model declares a custom schema constructor that cannot be invoked
    #[error("Invalid custom schema constructor for model `{model}`: {reason}")]
    SchemaBuilderInvalid { model: String, reason: String },

    /// A model's custom schema constructor ran and failed
    #[error("error while running custom schema constructor for model `{model}`: {reason}")]
    SchemaBuilderFailed { model: String, reason: String },

    /// The driver failed to turn a compiled schema into a model handle
    #[error("Failed to register model `{model}`: {reason}")]
    Registration { model: String, reason: String },

    /// The model-discovery collaborator failed; passed through unchanged
    #[error("Model discovery failed: {reason}")]
    Discovery { reason: String },

    /// A global binding name is already taken (only under
    /// `CollisionPolicy::Reject`)
    #[error("Global binding `{name}` is already taken by model `{existing}`")]
    BindingCollision { name: String, existing: String },
}

impl BootstrapError {
    /// Stable error-kind marker, independent of the display message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } => "ConfigValidationError",
            Self::ConnectionRefused { .. } => "ConnectionRefused",
            Self::UnknownConnection { .. } => "UnknownConnectionError",
            Self::UnrecognizedConnection => "UnrecognizedConnectionError",
            Self::SchemaShape { .. } => "SchemaValidationError",
            Self::SchemaBuilderInvalid { .. } | Self::SchemaBuilderFailed { .. } => {
                "SchemaBuilderError"
            }
            Self::Registration { .. } => "RegistrationError",
            Self::Discovery { .. } => "DiscoveryError",
            Self::BindingCollision { .. } => "BindingCollisionError",
        }
    }

    /// Create a config validation error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigValidation {
            reason: reason.into(),
        }
    }

    /// Create a schema shape error for a model
    pub fn schema_shape(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaShape {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-custom-constructor error for a model
    pub fn schema_builder_invalid(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaBuilderInvalid {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create a registration error for a model
    pub fn registration(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registration {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create a discovery error
    pub fn discovery(reason: impl std::fmt::Display) -> Self {
        Self::Discovery {
            reason: reason.to_string(),
        }
    }
}
