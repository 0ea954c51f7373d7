//! Opaque vendor configuration blocks
//!
//! Auth0 exposes several free-form objects (client addons, client metadata, connection
//! options, tenant session settings). The operator never interprets them: they are
//! carried as an order-preserving JSON object and compared structurally.

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Free-form JSON object preserved key-for-key across read-modify-write cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PassthroughDocument(pub Map<String, Value>);

impl PassthroughDocument {
    /// Borrow the underlying JSON object
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the document into a JSON value
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for PassthroughDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl JsonSchema for PassthroughDocument {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("PassthroughDocument")
    }

    fn inline_schema() -> bool {
        true
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order_survives_round_trip() {
        let raw = r#"{"zeta":1,"alpha":{"nested":true,"b":[3,2,1]},"mid":"x"}"#;
        let doc: PassthroughDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_string(&doc).unwrap(), raw);
    }

    #[test]
    fn test_schema_preserves_unknown_fields() {
        let schema = schemars::schema_for!(PassthroughDocument);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["x-kubernetes-preserve-unknown-fields"], Value::Bool(true));
    }
}
