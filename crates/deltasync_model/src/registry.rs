//! The model registry.

use crate::meta::ModelMeta;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::warn;

/// Registry of all synced models.
///
/// Constructed once at process start and passed by handle (`Arc`) to the
/// cache, client and server. Registration is idempotent by name with
/// last-write-wins semantics; redefining a name logs a warning.
///
/// # Example
///
/// ```
/// use deltasync_model::{ModelMeta, ModelRegistry, PropertyMeta, PropertyType};
///
/// let registry = ModelRegistry::new();
/// registry.register(ModelMeta::new(
///     "Task",
///     vec![PropertyMeta::new("title", PropertyType::String).indexed()],
/// ));
///
/// assert!(registry.get("Task").is_some());
/// assert_eq!(registry.indexed_properties("Task"), vec!["title"]);
/// ```
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, ModelMeta>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a static table of models.
    pub fn from_models(models: Vec<ModelMeta>) -> Self {
        let registry = Self::new();
        for model in models {
            registry.register(model);
        }
        registry
    }

    /// Registers a model, replacing any previous definition of the same name.
    pub fn register(&self, meta: ModelMeta) {
        let mut models = self.models.write();
        if models.contains_key(&meta.name) {
            warn!(model = %meta.name, "model redefined, last registration wins");
        }
        models.insert(meta.name.clone(), meta);
    }

    /// Returns the model with the given name.
    pub fn get(&self, name: &str) -> Option<ModelMeta> {
        self.models.read().get(name).cloned()
    }

    /// Returns all registered models, sorted by name.
    pub fn get_all(&self) -> Vec<ModelMeta> {
        self.models.read().values().cloned().collect()
    }

    /// Returns the indexed property names of a model, or empty if unknown.
    pub fn indexed_properties(&self, name: &str) -> Vec<String> {
        self.models
            .read()
            .get(name)
            .map(|m| m.indexed_properties())
            .unwrap_or_default()
    }

    /// Returns true if a model with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.read().contains_key(name)
    }

    /// Returns the number of registered models.
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Returns true if no models are registered.
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// Computes the deterministic schema fingerprint.
    ///
    /// SHA-256 over the canonical rendering of every model (names sorted,
    /// properties sorted within each model), hex-encoded. Any structural
    /// change to any registered model changes the hash; local caches compare
    /// it at open time to detect the need for a rebuild.
    pub fn schema_hash(&self) -> String {
        let models = self.models.read();
        let mut hasher = Sha256::new();
        for meta in models.values() {
            hasher.update(meta.canonical().as_bytes());
            hasher.update(b"\n");
        }

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{:02x}", byte));
        }
        hex
    }
}
