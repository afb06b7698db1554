//! Medium registry for dynamic backend resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::medium::StorageMedium;
use dimvault_common::{Error, Result};

/// Factory function type for creating media.
pub type MediumFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StorageMedium>> + Send + Sync>;

/// Registry for storage medium factories.
///
/// Allows dynamic registration and resolution of media by backend name and
/// configuration.
pub struct MediumRegistry {
    factories: HashMap<String, MediumFactory>,
}

impl MediumRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a medium factory.
    ///
    /// # Preconditions
    /// - `name` must be unique within the registry
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: MediumFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Medium '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a medium by name and configuration.
    ///
    /// # Errors
    /// - Medium not registered
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn StorageMedium>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Medium '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered medium names.
    pub fn media(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a medium is registered.
    pub fn has_medium(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for MediumRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn required_size(config: &Value) -> Result<u64> {
    config
        .get("size")
        .and_then(|v| v.as_u64())
        .filter(|size| *size > 0)
        .ok_or_else(|| Error::InvalidInput("Medium requires a positive 'size'".to_string()))
}

/// Create a registry with the built-in media.
///
/// - `memory`: `{"size": n}`
/// - `local`: `{"path": "...", "size": n}`, opened if it exists
pub fn create_default_registry() -> MediumRegistry {
    let mut registry = MediumRegistry::new();

    registry
        .register(
            "memory",
            Box::new(|config| {
                let size = usize::try_from(required_size(&config)?).map_err(|_| {
                    Error::InvalidInput("Memory medium size exceeds address space".to_string())
                })?;
                Ok(Arc::new(crate::memory::MemoryMedium::new(size)))
            }),
        )
        .expect("Failed to register memory medium");

    registry
        .register(
            "local",
            Box::new(|config| {
                let path = config.get("path").and_then(|v| v.as_str()).ok_or_else(|| {
                    Error::InvalidInput("Local medium requires 'path'".to_string())
                })?;
                let size = required_size(&config)?;
                Ok(Arc::new(crate::file::FileMedium::open_or_create(
                    path, size,
                )?))
            }),
        )
        .expect("Failed to register local medium");

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMedium;
    use serde_json::json;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = MediumRegistry::new();
        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryMedium::new(8)))))
            .unwrap();

        let medium = registry.resolve("test", Value::Null).unwrap();
        assert_eq!(medium.name(), "memory");
        assert_eq!(medium.size(), 8);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = MediumRegistry::new();
        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryMedium::new(8)))))
            .unwrap();
        let result = registry.register("test", Box::new(|_| Ok(Arc::new(MemoryMedium::new(8)))));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = MediumRegistry::new();
        assert!(registry.resolve("unknown", Value::Null).is_err());
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        assert!(registry.has_medium("memory"));
        assert!(registry.has_medium("local"));

        let memory = registry.resolve("memory", json!({"size": 4096})).unwrap();
        assert_eq!(memory.size(), 4096);
        assert!(registry.resolve("memory", json!({})).is_err());
        assert!(registry.resolve("memory", json!({"size": 0})).is_err());
    }

    #[tokio::test]
    async fn test_local_medium_resolves_twice() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("vault.medium");
        let config = json!({"path": path.to_str().unwrap(), "size": 1000});
        let registry = create_default_registry();

        let first = registry.resolve("local", config.clone()).unwrap();
        first.write(0, &[7]).await.unwrap();
        drop(first);

        let second = registry.resolve("local", config).unwrap();
        assert_eq!(second.name(), "local");
        assert_eq!(second.read(0, 1).await.unwrap(), vec![7]);
    }
}
