//! Static registry of saga definitions.

use std::collections::HashMap;

use crate::definition::SagaDefinition;

/// Maps workflow names to their definitions.
///
/// Populated once at startup and read-only afterwards; a lookup miss at
/// saga start is a rejection, not a crash.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, SagaDefinition>,
}

impl DefinitionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, replacing any previous one with the same name.
    pub fn register(&mut self, definition: SagaDefinition) {
        self.definitions
            .insert(definition.name().to_string(), definition);
    }

    /// Looks up a definition by name.
    pub fn get(&self, name: &str) -> Option<&SagaDefinition> {
        self.definitions.get(name)
    }

    /// Returns true if a definition with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Returns the number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if no definitions are registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_definition(name: &str) -> SagaDefinition {
        SagaDefinition::builder(name)
            .step("reserve-inventory")
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = DefinitionRegistry::new();
        assert!(registry.is_empty());

        registry.register(sample_definition("purchase"));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("purchase"));
        assert_eq!(registry.get("purchase").unwrap().name(), "purchase");
    }

    #[test]
    fn test_lookup_miss_returns_none() {
        let registry = DefinitionRegistry::new();
        assert!(registry.get("unknown").is_none());
        assert!(!registry.contains("unknown"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = DefinitionRegistry::new();
        registry.register(sample_definition("purchase"));

        let replacement = SagaDefinition::builder("purchase")
            .step("check-fraud")
            .step("reserve-inventory")
            .build()
            .unwrap();
        registry.register(replacement);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("purchase").unwrap().step_count(), 2);
    }
}
