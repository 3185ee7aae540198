//! Filesystem model discovery.
//!
//! Walks a directory of `*.json` definition files; the case-insensitive
//! model identity comes from the file stem, the definition body from the
//! file contents. This is the model-discovery collaborator the bootstrap
//! pipeline consumes through the [`ModelSource`] seam.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use moorage_core::{Identity, ModelDefinition, ModelSource};
use moorage_postgres::PgSchema;

pub struct FsModelSource {
    dir: PathBuf,
}

impl FsModelSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Walk the models directory and parse every definition file.
    ///
    /// Two files whose stems collapse to the same identity (`Post.json`
    /// vs `post.json`) are a hard error; silently keeping one of them
    /// would hide a model.
    pub fn load_definitions(&self) -> Result<BTreeMap<Identity, ModelDefinition<PgSchema>>> {
        if !self.dir.is_dir() {
            anyhow::bail!("models directory {} does not exist", self.dir.display());
        }

        let mut definitions = BTreeMap::new();
        let mut origins: BTreeMap<Identity, PathBuf> = BTreeMap::new();

        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = entry.context("failed to walk models directory")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .with_context(|| format!("model file {} has a non-UTF-8 name", path.display()))?;
            let identity = Identity::new(stem);

            if let Some(previous) = origins.get(&identity) {
                anyhow::bail!(
                    "model identity `{identity}` is defined twice: {} and {}",
                    previous.display(),
                    path.display()
                );
            }

            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read model file {}", path.display()))?;
            let raw: Value = serde_json::from_str(&content)
                .with_context(|| format!("model file {} is not valid JSON", path.display()))?;

            let definition = ModelDefinition::from_raw(identity.clone(), &raw)?;
            debug!(model = %identity, path = %path.display(), "discovered model definition");

            origins.insert(identity.clone(), path.to_path_buf());
            definitions.insert(identity, definition);
        }

        Ok(definitions)
    }
}

#[async_trait]
impl ModelSource<PgSchema> for FsModelSource {
    async fn load(&self) -> Result<BTreeMap<Identity, ModelDefinition<PgSchema>>> {
        self.load_definitions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn discovers_definitions_from_json_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Post.json", r#"{"schema": {"title": "string"}}"#);
        write(&dir, "user.json", r#"{"schema": {}, "globalId": "Account"}"#);
        write(&dir, "README.md", "not a model");

        let defs = FsModelSource::new(dir.path()).load_definitions().unwrap();
        assert_eq!(defs.len(), 2);

        let post = &defs[&Identity::new("post")];
        assert_eq!(post.fields()["title"].field_type, "string");
        assert_eq!(post.display_name(), "Post");

        let user = &defs[&Identity::new("user")];
        assert_eq!(user.display_name(), "Account");
    }

    #[test]
    fn duplicate_identities_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Post.json", r#"{"schema": {}}"#);
        write(&dir, "post.json", r#"{"schema": {}}"#);

        let err = FsModelSource::new(dir.path()).load_definitions().unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn invalid_schema_shape_keeps_its_error_kind() {
        let dir = TempDir::new().unwrap();
        write(&dir, "post.json", r#"{"schema": ["title"]}"#);

        let err = FsModelSource::new(dir.path()).load_definitions().unwrap_err();
        let bootstrap_err = err
            .downcast::<moorage_core::BootstrapError>()
            .expect("shape errors stay structured");
        assert_eq!(bootstrap_err.code(), "SchemaValidationError");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = FsModelSource::new("/nonexistent/models")
            .load_definitions()
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
