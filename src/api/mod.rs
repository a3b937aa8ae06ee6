//! API layer
//!
//! - ActivityPub read gate (middleware)
//! - Health and metrics (Prometheus)

mod activitypub;
mod metrics;

pub use activitypub::federated_read_gate;
pub use metrics::operational_router;
