//! Feed endpoints and their registry
//!
//! - `feed_endpoint` - broker link, queue registration and lifecycle for one feed
//! - `monitor` - background loop that drains the queue and publishes decisions
//! - `registry` - live endpoint set, reconciliation and orphan cleanup

pub mod feed_endpoint;
mod monitor;
pub mod registry;

pub use feed_endpoint::{EndpointContext, EndpointStatus, FeedEndpoint};
pub use registry::{EndpointRegistry, ReconcileReport};
