//! Props and their JSON encoding.

use serde_json::Value;

/// Render props as submitted by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Props {
    /// Pre-serialized text, handed to the script verbatim.
    Raw(String),
    /// Structured value, encoded with the configured [`JsonEncoder`].
    Value(Value),
}

impl Default for Props {
    fn default() -> Self {
        Props::Value(Value::Object(Default::default()))
    }
}

impl From<&str> for Props {
    fn from(raw: &str) -> Self {
        Props::Raw(raw.to_string())
    }
}

impl From<String> for Props {
    fn from(raw: String) -> Self {
        Props::Raw(raw)
    }
}

impl From<Value> for Props {
    fn from(value: Value) -> Self {
        Props::Value(value)
    }
}

/// Turns structured props into JSON text.
///
/// Adapt whichever encoder the application prefers to this one method; it is
/// resolved once at setup.
pub trait JsonEncoder: Send + Sync {
    fn encode(&self, value: &Value) -> anyhow::Result<String>;
}

/// Compact `serde_json` encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonEncoder;

impl JsonEncoder for SerdeJsonEncoder {
    fn encode(&self, value: &Value) -> anyhow::Result<String> {
        Ok(serde_json::to_string(value)?)
    }
}

impl<F> JsonEncoder for F
where
    F: Fn(&Value) -> anyhow::Result<String> + Send + Sync,
{
    fn encode(&self, value: &Value) -> anyhow::Result<String> {
        self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_props_are_raw() {
        let raw = r#"{"quote":"say \"hi\""}"#;
        assert_eq!(Props::from(raw), Props::Raw(raw.to_string()));
        assert_eq!(Props::from(raw.to_string()), Props::Raw(raw.to_string()));
    }

    #[test]
    fn test_default_props_are_empty_object() {
        let encoded = match Props::default() {
            Props::Value(value) => SerdeJsonEncoder.encode(&value).unwrap(),
            Props::Raw(_) => unreachable!(),
        };
        assert_eq!(encoded, "{}");
    }

    #[test]
    fn test_serde_encoder_is_compact() {
        let encoded = SerdeJsonEncoder
            .encode(&json!({"name": "World", "tags": [1, 2]}))
            .unwrap();
        assert_eq!(encoded, r#"{"name":"World","tags":[1,2]}"#);
    }

    #[test]
    fn test_closure_encoder() {
        let pretty = |value: &Value| -> anyhow::Result<String> {
            Ok(serde_json::to_string_pretty(value)?)
        };
        let encoded = pretty.encode(&json!({"a": 1})).unwrap();
        assert!(encoded.contains('\n'));
    }
}
