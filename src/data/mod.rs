//! Data layer module
//!
//! The seam between the read pipeline and the vocabulary/storage side:
//! - `FederatedObject` capability set and its JSON-backed implementation
//! - JSON-LD context merging
//! - Object storage (in-memory reference store)

mod context;
mod object;
mod store;

pub use context::{ACTIVITYSTREAMS_NS, JsonLdContext};
pub use object::{ApObject, FederatedObject, SENSITIVE_FIELDS, SensitiveFields};
pub use store::{
    MemoryStore, ObjectStore, PUBLIC_COLLECTION, is_publicly_addressed, is_visible_to,
};

#[cfg(test)]
pub use store::MockObjectStore;
