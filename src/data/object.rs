//! Federated object seam
//!
//! [`FederatedObject`] is the only surface of the vocabulary layer the read
//! pipeline sees. [`ApObject`] is the JSON-backed implementation used by
//! [`super::MemoryStore`].

use serde_json::{Map, Value};

use super::context::JsonLdContext;
use crate::error::AppError;

/// Addressing properties that must never leave the server.
pub const SENSITIVE_FIELDS: [&str; 2] = ["bto", "bcc"];

/// Types that are Links rather than Objects and carry no addressing.
const LINK_TYPES: [&str; 3] = ["Link", "Mention", "Hashtag"];

/// Object capability: clear properties that must not be served.
pub trait SensitiveFields {
    fn clear_sensitive_fields(&mut self);
}

/// Capabilities the read pipeline needs from a stored resource.
pub trait FederatedObject: Send + Sync + std::fmt::Debug {
    /// Serialize to a generic map, without `@context`.
    fn serialize(&self) -> Result<Map<String, Value>, AppError>;

    /// Whether this resource represents something that was deleted.
    fn is_tombstone(&self) -> bool;

    /// Context declarations the object itself carries.
    fn json_ld_context(&self) -> JsonLdContext;

    /// Redaction capability, present only for Object-shaped resources.
    fn sensitive_fields(&mut self) -> Option<&mut dyn SensitiveFields> {
        None
    }
}

/// A stored ActivityStreams document.
#[derive(Debug, Clone, PartialEq)]
pub struct ApObject {
    id: String,
    types: Vec<String>,
    context: JsonLdContext,
    properties: Map<String, Value>,
}

impl ApObject {
    /// Build from a JSON document.
    ///
    /// The document must be an object with a string `id` and a `type` that is
    /// a string or an array of strings. `@context` is split off and kept as
    /// declarations.
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        let Value::Object(mut properties) = value else {
            return Err(AppError::Validation(
                "ActivityStreams document must be a JSON object".to_string(),
            ));
        };

        let id = properties
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Validation("Missing id".to_string()))?
            .to_string();

        let types = match properties.get("type") {
            Some(Value::String(kind)) => vec![kind.clone()],
            Some(Value::Array(kinds)) if !kinds.is_empty() => kinds
                .iter()
                .map(|kind| kind.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| AppError::Validation("Invalid type".to_string()))?,
            _ => return Err(AppError::Validation("Missing type".to_string())),
        };

        let context = properties
            .remove("@context")
            .map(|value| JsonLdContext::from_value(&value))
            .unwrap_or_default();

        Ok(Self {
            id,
            types,
            context,
            properties,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn has_type(&self, kind: &str) -> bool {
        self.types.iter().any(|t| t == kind)
    }

    pub fn is_link(&self) -> bool {
        LINK_TYPES.iter().any(|kind| self.has_type(kind))
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// IRIs named by an addressing property, whether given as a string,
    /// an array, or embedded objects with an `id`.
    pub fn addressees(&self, property: &str) -> Vec<&str> {
        fn collect<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
            match value {
                Value::String(iri) => out.push(iri),
                Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
                Value::Object(object) => {
                    if let Some(Value::String(iri)) = object.get("id") {
                        out.push(iri);
                    }
                }
                _ => {}
            }
        }

        let mut out = Vec::new();
        if let Some(value) = self.properties.get(property) {
            collect(value, &mut out);
        }
        out
    }
}

impl SensitiveFields for ApObject {
    fn clear_sensitive_fields(&mut self) {
        for field in SENSITIVE_FIELDS {
            self.properties.remove(field);
        }
    }
}

impl FederatedObject for ApObject {
    fn serialize(&self) -> Result<Map<String, Value>, AppError> {
        Ok(self.properties.clone())
    }

    fn is_tombstone(&self) -> bool {
        self.has_type("Tombstone")
    }

    fn json_ld_context(&self) -> JsonLdContext {
        self.context.clone()
    }

    fn sensitive_fields(&mut self) -> Option<&mut dyn SensitiveFields> {
        if self.is_link() {
            return None;
        }
        Some(self)
    }
}
