//! Ad decision policy
//!
//! - `decision` - fallback chain, slot generation and busy retry
//! - `services` - `AdServices` seam to the analytics and generation services
//! - `http` - reqwest implementation and health probes
//! - `request` - generation request bodies
//! - `animation` - GIF assembly from still images

pub mod animation;
pub mod decision;
pub mod http;
pub mod request;
pub mod services;

pub use decision::{DecisionPolicy, MAX_BUSY_ATTEMPTS};
pub use http::{probe_service, HttpAdServices};
pub use request::{AdDecorations, DynamicAdRequest, PredefinedAdRequest};
pub use services::{AdServices, PriceQuote, RelatedItem, ServiceError};
