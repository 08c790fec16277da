//! Capability input/output types

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Arguments passed to a capability
///
/// The router forwards whatever the model produced without interpreting it.
/// Capabilities pull typed values out with the accessors below; a missing or
/// mistyped value becomes `EngineError::InvalidArguments` carrying the
/// capability name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityArgs {
    pub capability: String,
    pub value: serde_json::Value,
}

impl CapabilityArgs {
    /// Create arguments for a capability from a raw JSON value
    pub fn new(capability: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            capability: capability.into(),
            value,
        }
    }

    /// Create empty arguments
    pub fn empty(capability: impl Into<String>) -> Self {
        Self::new(capability, serde_json::Value::Null)
    }

    /// Parse arguments from a JSON string; blank input means no arguments
    pub fn from_json_str(capability: impl Into<String>, raw: &str) -> Result<Self, EngineError> {
        let capability = capability.into();
        if raw.trim().is_empty() {
            return Ok(Self::empty(capability));
        }
        match serde_json::from_str(raw) {
            Ok(value) => Ok(Self::new(capability, value)),
            Err(e) => Err(EngineError::invalid_args(
                capability,
                format!("arguments are not valid JSON: {}", e),
            )),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if !self.value.is_object() {
            self.value = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.value.as_object_mut() {
            map.insert(key.into(), value);
        }
        self
    }

    /// Get a parameter as a JSON value
    pub fn param_json(&self, key: &str) -> Result<&serde_json::Value, EngineError> {
        self.value
            .get(key)
            .ok_or_else(|| EngineError::invalid_args(&self.capability, format!("missing '{}'", key)))
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, EngineError> {
        self.param_json(key)?
            .as_str()
            .map(String::from)
            .ok_or_else(|| self.wrong_type(key, "a string"))
    }

    /// Get a numeric parameter (integers are accepted)
    pub fn param_f64(&self, key: &str) -> Result<f64, EngineError> {
        self.param_json(key)?
            .as_f64()
            .ok_or_else(|| self.wrong_type(key, "a number"))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.value.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    /// Positional fallback: a bare scalar stands in for the first parameter.
    ///
    /// Models frequently answer `{"function": "setInterval", "arguments": 0.01}`
    /// instead of wrapping the value in an object.
    pub fn scalar(&self) -> Option<&serde_json::Value> {
        match &self.value {
            serde_json::Value::Object(_) | serde_json::Value::Null => None,
            serde_json::Value::Array(items) => items.first(),
            other => Some(other),
        }
    }

    /// Arguments as an object map, if they are one
    pub fn as_object(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.value.as_object()
    }

    fn wrong_type(&self, key: &str, expected: &str) -> EngineError {
        EngineError::invalid_args(&self.capability, format!("'{}' must be {}", key, expected))
    }
}

/// Output from a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    pub data: serde_json::Value,
}

impl CapabilityOutput {
    /// Create an output with text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: serde_json::json!({ "text": text.into() }),
        }
    }

    /// Create an output with JSON data
    pub fn json(data: serde_json::Value) -> Self {
        Self { data }
    }

    /// Create an empty output
    pub fn empty() -> Self {
        Self {
            data: serde_json::Value::Null,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.data).unwrap_or_else(|_| "null".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_param() {
        let args = CapabilityArgs::empty("setInterval")
            .with_param("interval", json!(0.01))
            .with_param("unit", json!("s"));

        assert_eq!(args.param_f64("interval").unwrap(), 0.01);
        assert_eq!(args.param_str("unit").unwrap(), "s");
    }

    #[test]
    fn test_missing_param_names_capability() {
        let args = CapabilityArgs::empty("startProgram");
        match args.param_str("query").unwrap_err() {
            EngineError::InvalidArguments { name, reason } => {
                assert_eq!(name, "startProgram");
                assert!(reason.contains("query"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_type() {
        let args = CapabilityArgs::new("setInterval", json!({"interval": "fast"}));
        assert!(matches!(
            args.param_f64("interval"),
            Err(EngineError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_integer_accepted_as_number() {
        let args = CapabilityArgs::new("setInterval", json!({"interval": 1}));
        assert_eq!(args.param_f64("interval").unwrap(), 1.0);
    }

    #[test]
    fn test_from_json_str() {
        let args = CapabilityArgs::from_json_str("startProgram", r#"{"query": "steam"}"#).unwrap();
        assert_eq!(args.param_str_opt("query"), Some("steam".to_string()));

        let blank = CapabilityArgs::from_json_str("start", "  ").unwrap();
        assert_eq!(blank.value, serde_json::Value::Null);

        assert!(CapabilityArgs::from_json_str("start", "{oops").is_err());
    }

    #[test]
    fn test_scalar_fallback() {
        assert_eq!(
            CapabilityArgs::new("x", json!(0.5)).scalar(),
            Some(&json!(0.5))
        );
        assert_eq!(
            CapabilityArgs::new("x", json!(["chrome"])).scalar(),
            Some(&json!("chrome"))
        );
        assert_eq!(CapabilityArgs::new("x", json!({"a": 1})).scalar(), None);
        assert_eq!(CapabilityArgs::empty("x").scalar(), None);
    }

    #[test]
    fn test_output_text() {
        let output = CapabilityOutput::text("done");
        assert_eq!(output.data, json!({"text": "done"}));
        assert_eq!(output.to_json(), r#"{"text":"done"}"#);
        assert_eq!(CapabilityOutput::empty().to_json(), "null");
    }
}
