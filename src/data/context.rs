//! JSON-LD `@context` bookkeeping
//!
//! A context is kept as the ordered list of its entries: bare vocabulary
//! IRIs and objects of term definitions. Declaration order is preserved
//! because it decides how terms resolve. Merging is first-writer-wins, so
//! a term or namespace declared by the object itself is never overwritten.

use serde_json::{Map, Value};

/// ActivityStreams base namespace.
pub const ACTIVITYSTREAMS_NS: &str = "https://www.w3.org/ns/activitystreams";

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    /// A bare IRI, e.g. `"https://w3id.org/security/v1"`.
    Vocabulary(String),
    /// One `{term: definition}` object. Definitions are kept verbatim.
    Terms(Map<String, Value>),
}

/// Ordered `@context` declarations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonLdContext {
    entries: Vec<Entry>,
}

impl JsonLdContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `namespace` under `alias` unless the namespace is already declared.
    ///
    /// An empty alias declares a bare vocabulary. Returns `true` if the
    /// entry was added.
    pub fn declare(&mut self, namespace: impl Into<String>, alias: impl Into<String>) -> bool {
        let namespace = namespace.into();
        if self.alias_of(&namespace).is_some() {
            return false;
        }

        let alias = alias.into();
        if alias.is_empty() {
            self.entries.push(Entry::Vocabulary(namespace));
            true
        } else {
            self.define(alias, Value::String(namespace))
        }
    }

    /// Add a term definition unless `term` is already defined.
    ///
    /// The definition may be a namespace string or an expanded term object
    /// such as `{"@id": "toot:featured", "@type": "@id"}`.
    pub fn define(&mut self, term: impl Into<String>, definition: Value) -> bool {
        let term = term.into();
        if self.has_term(&term) {
            return false;
        }

        match self.entries.last_mut() {
            Some(Entry::Terms(terms)) => {
                terms.insert(term, definition);
            }
            _ => {
                let mut terms = Map::new();
                terms.insert(term, definition);
                self.entries.push(Entry::Terms(terms));
            }
        }
        true
    }

    /// Fold `other` into `self`, in `other`'s order; existing entries win.
    pub fn merge(&mut self, other: &JsonLdContext) {
        for entry in &other.entries {
            match entry {
                Entry::Vocabulary(namespace) => {
                    self.declare(namespace.clone(), "");
                }
                Entry::Terms(terms) => {
                    self.start_group();
                    for (term, definition) in terms {
                        self.define(term.clone(), definition.clone());
                    }
                    self.end_group();
                }
            }
        }
    }

    /// Append the ActivityStreams base namespace unless it is already declared.
    pub fn with_activitystreams(mut self) -> Self {
        self.declare(ACTIVITYSTREAMS_NS, "");
        self
    }

    /// Alias `namespace` is declared under; `""` for a bare vocabulary.
    pub fn alias_of(&self, namespace: &str) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Vocabulary(declared) if declared == namespace => Some(""),
            Entry::Vocabulary(_) => None,
            Entry::Terms(terms) => terms
                .iter()
                .find(|(_, definition)| definition.as_str() == Some(namespace))
                .map(|(term, _)| term.as_str()),
        })
    }

    pub fn has_term(&self, term: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, Entry::Terms(terms) if terms.contains_key(term)))
    }

    /// Number of declarations (vocabularies plus terms).
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Vocabulary(_) => 1,
                Entry::Terms(terms) => terms.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the declarations out of an `@context` value.
    ///
    /// Strings declare a vocabulary, objects define terms, arrays combine
    /// both in order. Other values are ignored.
    pub fn from_value(value: &Value) -> Self {
        let mut context = Self::new();
        context.absorb(value);
        context
    }

    fn absorb(&mut self, value: &Value) {
        match value {
            Value::String(namespace) => {
                self.declare(namespace.clone(), "");
            }
            Value::Array(items) => {
                for item in items {
                    self.absorb(item);
                }
            }
            Value::Object(terms) => {
                self.start_group();
                for (term, definition) in terms {
                    self.define(term.clone(), definition.clone());
                }
                self.end_group();
            }
            _ => {}
        }
    }

    // Each source object becomes its own entry so it renders back as one.
    fn start_group(&mut self) {
        self.entries.push(Entry::Terms(Map::new()));
    }

    fn end_group(&mut self) {
        if matches!(self.entries.last(), Some(Entry::Terms(terms)) if terms.is_empty()) {
            self.entries.pop();
        }
    }

    /// Render as an `@context` value.
    ///
    /// A single entry renders bare (a string or one object); anything more
    /// renders as an array in declaration order.
    pub fn to_value(&self) -> Value {
        let mut items: Vec<Value> = self
            .entries
            .iter()
            .map(|entry| match entry {
                Entry::Vocabulary(namespace) => Value::String(namespace.clone()),
                Entry::Terms(terms) => Value::Object(terms.clone()),
            })
            .collect();

        if items.len() == 1 {
            items.remove(0)
        } else {
            Value::Array(items)
        }
    }
}
