//! Declarative model definitions.
//!
//! A [`ModelDefinition`] is the raw input for one model: a case-insensitive
//! [`Identity`], a field mapping, and (optionally) a custom schema
//! constructor. Whether a definition compiles its schema from the field
//! mapping or through a custom constructor is decided here, at parse time,
//! as the [`SchemaSource`] tagged variant; nothing downstream inspects
//! capabilities at runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{BootstrapError, Result};
use crate::schema::BuildContext;

/// Boxed error type returned by custom schema constructors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Case-insensitive model name. Stored lowercased; two identities that
/// differ only in case are the same identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity with its first letter uppercased, used as the default
    /// display name for global bindings.
    pub fn capitalized(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One field in a model's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Driver-interpreted type name, e.g. `"string"`, `"integer"`, `"json"`
    pub field_type: String,
    /// Whether the field is required (NOT NULL, in relational terms)
    pub required: bool,
}

impl FieldSpec {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            required: false,
        }
    }

    pub fn required(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            required: true,
        }
    }
}

/// Field name → field spec, in stable order.
pub type FieldMap = BTreeMap<String, FieldSpec>;

/// Custom schema constructor: `(field mapping, build context) → schema`.
pub type SchemaBuilderFn<S> =
    Arc<dyn Fn(&FieldMap, &BuildContext<'_>) -> std::result::Result<S, BoxError> + Send + Sync>;

/// How a model's driver-level schema gets produced.
pub enum SchemaSource<S> {
    /// Compile the field mapping through the driver's native constructor
    Fields(FieldMap),
    /// Invoke a user-supplied constructor with the field mapping
    Custom {
        fields: FieldMap,
        builder: SchemaBuilderFn<S>,
    },
}

impl<S> Clone for SchemaSource<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Fields(fields) => Self::Fields(fields.clone()),
            Self::Custom { fields, builder } => Self::Custom {
                fields: fields.clone(),
                builder: Arc::clone(builder),
            },
        }
    }
}

impl<S> fmt::Debug for SchemaSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Self::Custom { fields, .. } => f
                .debug_struct("Custom")
                .field("fields", fields)
                .field("builder", &"<fn>")
                .finish(),
        }
    }
}

/// Declarative input for one model, immutable once parsed.
pub struct ModelDefinition<S> {
    pub identity: Identity,
    /// Display name override; defaults to the capitalized identity
    pub global_id: Option<String>,
    pub source: SchemaSource<S>,
}

impl<S> Clone for ModelDefinition<S> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            global_id: self.global_id.clone(),
            source: self.source.clone(),
        }
    }
}

impl<S> fmt::Debug for ModelDefinition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("identity", &self.identity)
            .field("global_id", &self.global_id)
            .field("source", &self.source)
            .finish()
    }
}

impl<S> ModelDefinition<S> {
    /// Definition with an empty field mapping.
    pub fn new(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            global_id: None,
            source: SchemaSource::Fields(FieldMap::new()),
        }
    }

    /// Definition compiled from an explicit field mapping.
    pub fn with_fields(identity: impl Into<Identity>, fields: FieldMap) -> Self {
        Self {
            identity: identity.into(),
            global_id: None,
            source: SchemaSource::Fields(fields),
        }
    }

    /// Attach a custom schema constructor, keeping the current field
    /// mapping as the constructor's input.
    pub fn with_builder(
        mut self,
        builder: impl Fn(&FieldMap, &BuildContext<'_>) -> std::result::Result<S, BoxError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        let fields = match self.source {
            SchemaSource::Fields(fields) | SchemaSource::Custom { fields, .. } => fields,
        };
        self.source = SchemaSource::Custom {
            fields,
            builder: Arc::new(builder),
        };
        self
    }

    /// Override the display name used for the global binding.
    pub fn with_global_id(mut self, global_id: impl Into<String>) -> Self {
        self.global_id = Some(global_id.into());
        self
    }

    /// Display name: explicit `global_id` if set, else the capitalized
    /// identity.
    pub fn display_name(&self) -> String {
        self.global_id
            .clone()
            .unwrap_or_else(|| self.identity.capitalized())
    }

    /// The field mapping this definition was declared with.
    pub fn fields(&self) -> &FieldMap {
        match &self.source {
            SchemaSource::Fields(fields) | SchemaSource::Custom { fields, .. } => fields,
        }
    }

    /// Parse a definition from its raw JSON form (the shape model files on
    /// disk use).
    ///
    /// Recognized keys: `schema` (mapping of field name → spec, defaults to
    /// empty), `globalId` / `global_id` (display name override), and
    /// `schemaBuilder`. A raw definition cannot carry a callable, so any
    /// `schemaBuilder` value is rejected here; custom constructors are
    /// attached programmatically via [`ModelDefinition::with_builder`].
    pub fn from_raw(identity: impl Into<Identity>, raw: &Value) -> Result<Self> {
        let identity = identity.into();
        let obj = raw.as_object().ok_or_else(|| {
            BootstrapError::schema_shape(
                identity.as_str(),
                format!("expected the definition to be a mapping, got {}", kind_of(raw)),
            )
        })?;

        let fields = match obj.get("schema") {
            None | Some(Value::Null) => FieldMap::new(),
            Some(Value::Object(map)) => parse_fields(&identity, map)?,
            Some(other) => {
                return Err(BootstrapError::schema_shape(
                    identity.as_str(),
                    format!(
                        "`schema` must be a mapping of field name to field spec, got {}",
                        kind_of(other)
                    ),
                ))
            }
        };

        if let Some(builder) = obj.get("schemaBuilder") {
            if !builder.is_null() {
                return Err(BootstrapError::schema_builder_invalid(
                    identity.as_str(),
                    "`schemaBuilder` in a raw definition is not callable; attach custom \
                     constructors in code via `with_builder`",
                ));
            }
        }

        let global_id = match obj.get("globalId").or_else(|| obj.get("global_id")) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(BootstrapError::schema_shape(
                    identity.as_str(),
                    format!("`globalId` must be a string, got {}", kind_of(other)),
                ))
            }
        };

        Ok(Self {
            identity,
            global_id,
            source: SchemaSource::Fields(fields),
        })
    }
}

fn parse_fields(
    identity: &Identity,
    map: &serde_json::Map<String, Value>,
) -> Result<FieldMap> {
    let mut fields = FieldMap::new();
    for (name, spec) in map {
        let parsed = match spec {
            // shorthand: "title": "string"
            Value::String(field_type) => FieldSpec::new(field_type.clone()),
            // long form: "title": {"type": "string", "required": true}
            Value::Object(obj) => {
                let field_type = obj.get("type").and_then(Value::as_str).ok_or_else(|| {
                    BootstrapError::schema_shape(
                        identity.as_str(),
                        format!("field `{name}` is missing a string `type`"),
                    )
                })?;
                FieldSpec {
                    field_type: field_type.to_string(),
                    required: obj.get("required").and_then(Value::as_bool).unwrap_or(false),
                }
            }
            other => {
                return Err(BootstrapError::schema_shape(
                    identity.as_str(),
                    format!("field `{name}` must be a type name or a spec mapping, got {}", kind_of(other)),
                ))
            }
        };
        fields.insert(name.clone(), parsed);
    }
    Ok(fields)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}
