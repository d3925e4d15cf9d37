//! Per-feed detection queues
//!
//! - `types` - `FeedId` and `DetectionEvent`
//! - `feed_queue` - deduplicating FIFO for one feed
//! - `registry` - feed identity → queue map with publish timestamps

pub mod feed_queue;
pub mod registry;
pub mod types;

pub use feed_queue::FeedQueue;
pub use registry::QueueRegistry;
pub use types::{DetectionEvent, FeedId};
