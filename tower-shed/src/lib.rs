//! # tower-shed
//!
//! Adaptive client-side throttling middleware for the
//! [Tower](https://github.com/tower-rs/tower) ecosystem, built on
//! [`shed_limit`].
//!
//! Place a [`ThrottleLayer`] in a *client* stack, in front of the transport
//! that talks to one backend. While the backend is healthy the layer is
//! passive; once the backend starts failing, calls begin completing
//! immediately with [`shed_limit::Shed`] instead of going out on the wire,
//! lower-priority traffic first.
//!
//! Unlike queueing rate limiters, this middleware never waits for capacity:
//! there is no internal timer, no queue, and `poll_ready` never parks the
//! caller on the throttle's behalf. A rejection costs one random draw.
//!
//! Requests carry their priority in [`http::Extensions`]; see
//! [`PriorityHint`] for wiring up other request types.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use shed_limit::{AdaptiveThrottle, Priority, PriorityRange};
//! use tower::ServiceBuilder;
//! use tower_shed::ThrottleLayer;
//!
//! let throttle = Arc::new(AdaptiveThrottle::new(PriorityRange::standard()));
//! let layer = ThrottleLayer::new(throttle).with_default_priority(Priority::MEDIUM);
//! # let _ = ServiceBuilder::new().layer(layer);
//! ```

mod hint;
mod layer;
mod service;


pub use hint::PriorityHint;
pub use layer::ThrottleLayer;
pub use service::ThrottleService;
