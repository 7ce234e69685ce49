use serde::{Deserialize, Serialize};

/// A property at which traversal stops: its value is deferred by identity
/// even when loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StopProperty {
    pub type_name: String,
    pub property: String,
}

impl StopProperty {
    pub fn new(type_name: &str, property: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            property: property.to_string(),
        }
    }
}

/// Detach configuration
///
/// Travels with a serialized model, so it must stay plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachConfig {
    /// Properties never traversed
    pub stop_properties: Vec<StopProperty>,

    /// Resolve pending references eagerly in `get_object`. When off,
    /// placeholders resolve on first access only.
    pub resolve_references_on_get: bool,
}

impl DetachConfig {
    pub fn new() -> Self {
        Self {
            stop_properties: Vec::new(),
            resolve_references_on_get: true,
        }
    }

    /// Stop traversal at `type_name.property`
    pub fn stop_at(mut self, type_name: &str, property: &str) -> Self {
        let stop = StopProperty::new(type_name, property);
        if !self.stop_properties.contains(&stop) {
            self.stop_properties.push(stop);
        }
        self
    }

    /// Set eager reference resolution
    pub fn resolve_references_on_get(mut self, resolve: bool) -> Self {
        self.resolve_references_on_get = resolve;
        self
    }

    /// Exact match on the declaring type name.
    pub fn is_stop_property(&self, type_name: &str, property: &str) -> bool {
        self.stop_properties
            .iter()
            .any(|stop| stop.type_name == type_name && stop.property == property)
    }
}

impl Default for DetachConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetachConfig::default();
        assert!(config.resolve_references_on_get);
        assert!(config.stop_properties.is_empty());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DetachConfig::new()
            .stop_at("Person", "company")
            .stop_at("Person", "company")
            .resolve_references_on_get(false);

        assert_eq!(config.stop_properties.len(), 1);
        assert!(config.is_stop_property("Person", "company"));
        assert!(!config.is_stop_property("Person", "name"));
        assert!(!config.resolve_references_on_get);
    }

    #[test]
    fn test_config_serde() {
        let config = DetachConfig::new().stop_at("Tree", "parent");
        let json = serde_json::to_string(&config).unwrap();
        let decoded: DetachConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
