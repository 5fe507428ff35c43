//! Strategy factory registry.
//!
//! Maps a policy `type` discriminator to a factory. Registries are filled at
//! startup and then only read.

use indexmap::IndexMap;
use std::sync::Arc;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Type already registered
    #[error("Factory already registered: {type_name}")]
    AlreadyRegistered {
        /// Offending type
        type_name: String,
    },

    /// Type not registered
    #[error("Factory not found: {type_name}")]
    NotFound {
        /// Requested type
        type_name: String,
    },
}

/// Registry of factories keyed by type string
pub struct FactoryRegistry<F: ?Sized> {
    factories: IndexMap<String, Arc<F>>,
}

impl<F: ?Sized> FactoryRegistry<F> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register a factory under a type
    ///
    /// # Errors
    ///
    /// Returns error if the type is already taken
    pub fn register(&mut self, type_name: &str, factory: Arc<F>) -> Result<(), RegistryError> {
        if self.factories.contains_key(type_name) {
            return Err(RegistryError::AlreadyRegistered {
                type_name: type_name.to_string(),
            });
        }
        self.factories.insert(type_name.to_string(), factory);
        Ok(())
    }

    /// Register a factory, replacing any factory already under the type
    pub fn replace(&mut self, type_name: &str, factory: Arc<F>) -> Option<Arc<F>> {
        self.factories.insert(type_name.to_string(), factory)
    }

    /// Builder form of [`register`](Self::register)
    ///
    /// # Errors
    ///
    /// Returns error if the type is already taken
    pub fn with(mut self, type_name: &str, factory: Arc<F>) -> Result<Self, RegistryError> {
        self.register(type_name, factory)?;
        Ok(self)
    }

    /// Factory for a type
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Arc<F>> {
        self.factories.get(type_name).cloned()
    }

    /// Factory for a type, or an error naming the missing type
    ///
    /// # Errors
    ///
    /// Returns error if the type is not registered
    pub fn require(&self, type_name: &str) -> Result<Arc<F>, RegistryError> {
        self.get(type_name).ok_or_else(|| RegistryError::NotFound {
            type_name: type_name.to_string(),
        })
    }

    /// Whether a type is registered
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered types in registration order
    #[must_use]
    pub fn types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Number of registered factories
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<F: ?Sized> Default for FactoryRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Hello;
    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct Hi;
    impl Greeter for Hi {
        fn greet(&self) -> String {
            "hi".to_string()
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry: FactoryRegistry<dyn Greeter> = FactoryRegistry::new();
        registry.register("hello", Arc::new(Hello)).unwrap();
        registry.register("hi", Arc::new(Hi)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("hi"));
        assert_eq!(registry.get("hello").unwrap().greet(), "hello");
        assert!(registry.get("hey").is_none());
        assert_eq!(registry.types(), vec!["hello", "hi"]);
    }

    #[test]
    fn test_replace_keeps_order() {
        let mut registry: FactoryRegistry<dyn Greeter> = FactoryRegistry::new();
        registry.register("a", Arc::new(Hello)).unwrap();
        registry.register("b", Arc::new(Hello)).unwrap();
        assert!(registry.replace("a", Arc::new(Hi)).is_some());
        assert_eq!(registry.get("a").unwrap().greet(), "hi");
        assert_eq!(registry.types(), vec!["a", "b"]);
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry: FactoryRegistry<dyn Greeter> = FactoryRegistry::new();
        registry.register("hello", Arc::new(Hello)).unwrap();
        let err = registry.register("hello", Arc::new(Hi)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyRegistered {
                type_name: "hello".to_string()
            }
        );
        assert_eq!(registry.get("hello").unwrap().greet(), "hello");
    }

    #[test]
    fn test_require_missing() {
        let registry: FactoryRegistry<dyn Greeter> = FactoryRegistry::<dyn Greeter>::default()
            .with("hi", Arc::new(Hi) as Arc<dyn Greeter>)
            .unwrap();
        assert!(registry.require("hi").is_ok());
        let err = registry.require("hello").err().unwrap();
        assert_eq!(err.to_string(), "Factory not found: hello");
    }
}
