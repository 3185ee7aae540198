//! Global model bindings.
//!
//! Instead of ambient process-wide globals, bindings live in an explicit
//! [`GlobalBindings`] registry owned (and injected) by the application.
//! Collision behavior is an explicit policy rather than a silent
//! last-writer-wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BootstrapError, Result};
use crate::registry::{ModelCatalog, ModelHandle};

/// What to do when two models resolve to the same display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail the run with a `BindingCollision` error
    Reject,
    /// Overwrite, but log the collision loudly. Preserves last-writer-wins
    /// while making sure it never happens silently.
    #[default]
    Warn,
    /// Overwrite without comment
    Overwrite,
}

/// Application-owned registry of display name → model handle.
///
/// Cheap to clone; all clones share the same bindings. The inner map is
/// mutex-guarded so writes arriving from the bootstrap task and reads from
/// application threads never race.
pub struct GlobalBindings<M> {
    inner: Arc<Mutex<HashMap<String, ModelHandle<M>>>>,
    policy: CollisionPolicy,
}

impl<M> Clone for GlobalBindings<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
        }
    }
}

impl<M> Default for GlobalBindings<M> {
    fn default() -> Self {
        Self::new(CollisionPolicy::default())
    }
}

impl<M> GlobalBindings<M> {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    /// Bind `name` to `handle` under this registry's collision policy.
    pub fn register(&self, name: impl Into<String>, handle: ModelHandle<M>) -> Result<()> {
        let name = name.into();
        let mut bindings = self.inner.lock().expect("global bindings poisoned");

        if let Some(existing) = bindings.get(&name) {
            match self.policy {
                CollisionPolicy::Reject => {
                    return Err(BootstrapError::BindingCollision {
                        name,
                        existing: existing.identity.as_str().to_string(),
                    });
                }
                CollisionPolicy::Warn => {
                    warn!(
                        binding = %name,
                        previous = %existing.identity,
                        replacement = %handle.identity,
                        "global binding collision, later model wins"
                    );
                }
                CollisionPolicy::Overwrite => {}
            }
        }

        debug!(binding = %name, model = %handle.identity, "global binding set");
        bindings.insert(name, handle);
        Ok(())
    }

    /// Look up a binding by display name. Returns a clone of the handle
    /// (sharing the same underlying model).
    pub fn get(&self, name: &str) -> Option<ModelHandle<M>> {
        self.inner
            .lock()
            .expect("global bindings poisoned")
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("global bindings poisoned")
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("global bindings poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Currently bound display names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("global bindings poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Bind a batch of handles, all-or-nothing.
    ///
    /// Under `Reject`, collisions (against existing bindings or within the
    /// batch itself) are detected before anything is inserted, so a failed
    /// batch leaves the registry untouched.
    pub fn register_batch<'a>(
        &self,
        handles: impl IntoIterator<Item = &'a ModelHandle<M>>,
    ) -> Result<()>
    where
        M: 'a,
    {
        let handles: Vec<&ModelHandle<M>> = handles.into_iter().collect();
        let mut bindings = self.inner.lock().expect("global bindings poisoned");

        if self.policy == CollisionPolicy::Reject {
            let mut staged: HashMap<&str, &ModelHandle<M>> = HashMap::new();
            for handle in &handles {
                let clash = bindings
                    .get(handle.global_id.as_str())
                    .or_else(|| staged.get(handle.global_id.as_str()).copied());
                if let Some(existing) = clash {
                    return Err(BootstrapError::BindingCollision {
                        name: handle.global_id.clone(),
                        existing: existing.identity.as_str().to_string(),
                    });
                }
                staged.insert(handle.global_id.as_str(), *handle);
            }
        }

        for handle in handles {
            if self.policy == CollisionPolicy::Warn {
                if let Some(existing) = bindings.get(&handle.global_id) {
                    warn!(
                        binding = %handle.global_id,
                        previous = %existing.identity,
                        replacement = %handle.identity,
                        "global binding collision, later model wins"
                    );
                }
            }
            debug!(binding = %handle.global_id, model = %handle.identity, "global binding set");
            bindings.insert(handle.global_id.clone(), handle.clone());
        }
        Ok(())
    }
}

/// Publish every handle in the catalog into the bindings registry.
///
/// No-op when `enabled` is false. Handles are bound under their
/// `global_id`, in identity order, so collision outcomes are deterministic.
pub fn expose<M>(
    bindings: &GlobalBindings<M>,
    catalog: &ModelCatalog<M>,
    enabled: bool,
) -> Result<()> {
    if !enabled {
        debug!("global model exposure disabled, skipping");
        return Ok(());
    }
    bindings.register_batch(catalog.iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Identity;

    fn handle(identity: &str, global_id: &str) -> ModelHandle<u32> {
        ModelHandle::new(Identity::new(identity), global_id.to_string(), 0)
    }

    #[test]
    fn reject_policy_fails_on_collision() {
        let bindings = GlobalBindings::new(CollisionPolicy::Reject);
        bindings.register("User", handle("user", "User")).unwrap();
        let err = bindings.register("User", handle("users", "User")).unwrap_err();
        assert_eq!(err.code(), "BindingCollisionError");
        // first binding survives
        assert_eq!(bindings.get("User").unwrap().identity.as_str(), "user");
    }

    #[test]
    fn warn_policy_overwrites() {
        let bindings = GlobalBindings::new(CollisionPolicy::Warn);
        bindings.register("User", handle("user", "User")).unwrap();
        bindings.register("User", handle("users", "User")).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("User").unwrap().identity.as_str(), "users");
    }

    #[test]
    fn rejected_batch_leaves_the_registry_untouched() {
        let bindings = GlobalBindings::new(CollisionPolicy::Reject);
        let batch = [handle("user", "User"), handle("users", "User")];
        let err = bindings.register_batch(batch.iter()).unwrap_err();
        assert_eq!(err.code(), "BindingCollisionError");
        assert!(bindings.is_empty());
    }

    #[test]
    fn lookups_share_the_underlying_model() {
        let bindings = GlobalBindings::new(CollisionPolicy::Overwrite);
        let original = handle("user", "User");
        bindings.register("User", original.clone()).unwrap();
        assert!(bindings.get("User").unwrap().same_model(&original));
    }
}
