//! Compose configuration document

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::ConfigError;

const SERVICES_KEY: &str = "services";

/// A compose configuration tree.
///
/// The document is kept as an ordered YAML mapping, so serializing the same
/// document twice always produces the same bytes. Apart from the top-level
/// `services` mapping no schema is assumed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Mapping);

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document. An empty document yields an empty mapping.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(content).map_err(ConfigError::Parse)?;
        match value {
            Value::Null => Ok(Self::new()),
            Value::Mapping(mapping) => Ok(Self(mapping)),
            other => Err(ConfigError::NotAMapping(value_kind(&other).to_string())),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.0).map_err(ConfigError::Serialize)
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn into_mapping(self) -> Mapping {
        self.0
    }

    /// Top-level value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(Value::String(key.into()), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The `services` mapping, if present
    pub fn services(&self) -> Option<&Mapping> {
        self.0.get(SERVICES_KEY).and_then(Value::as_mapping)
    }

    /// Service names in declaration order
    pub fn service_names(&self) -> Vec<String> {
        self.services()
            .map(|services| {
                services
                    .keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn service(&self, name: &str) -> Option<&Value> {
        self.services().and_then(|services| services.get(name))
    }

    /// Mutable access to a service declaration that is a mapping
    pub fn service_mut(&mut self, name: &str) -> Option<&mut Mapping> {
        self.0
            .get_mut(SERVICES_KEY)
            .and_then(Value::as_mapping_mut)
            .and_then(|services| services.get_mut(name))
            .and_then(Value::as_mapping_mut)
    }

    /// Add or replace a service declaration, creating `services` if needed
    pub fn insert_service(&mut self, name: impl Into<String>, declaration: Value) -> Option<Value> {
        let services = self
            .0
            .entry(Value::String(SERVICES_KEY.to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));

        if !services.is_mapping() {
            *services = Value::Mapping(Mapping::new());
        }

        services
            .as_mapping_mut()
            .and_then(|services| services.insert(Value::String(name.into()), declaration))
    }

    pub fn remove_service(&mut self, name: &str) -> Option<Value> {
        self.0
            .get_mut(SERVICES_KEY)
            .and_then(Value::as_mapping_mut)
            .and_then(|services| services.remove(name))
    }
}

impl From<Mapping> for ConfigDocument {
    fn from(mapping: Mapping) -> Self {
        Self(mapping)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
