//! moorage-core: database bootstrap and model registry.
//!
//! Given declarative model definitions (identity → field schema, optional
//! custom schema constructor), this crate opens a single database
//! connection through a pluggable [`driver::Driver`], compiles a validated
//! schema per model, registers each as a queryable [`registry::ModelHandle`],
//! and optionally publishes the handles into an application-owned
//! [`globals::GlobalBindings`] registry — with the whole sequence completing
//! exactly once through a guarded callback.
//!
//! Query execution, migrations, and the wire protocol are the driver's
//! concern, not this crate's.

pub mod bootstrap;
pub mod config;
pub mod definition;
pub mod driver;
pub mod error;
pub mod globals;
pub mod guard;
pub mod registry;
pub mod schema;

pub use bootstrap::{initialize, ModelSource, StaticModelSource};
pub use config::{BootstrapConfig, ConnectOptions};
pub use definition::{FieldMap, FieldSpec, Identity, ModelDefinition, SchemaSource};
pub use driver::{Driver, DriverError};
pub use error::{BootstrapError, Result};
pub use globals::{CollisionPolicy, GlobalBindings};
pub use guard::{CompletionGuard, Outcome};
pub use registry::{ModelCatalog, ModelHandle};
pub use schema::BuildContext;
