//! # shed-limit
//!
//! `shed-limit` is an adaptive client-side throttle: a reliability primitive
//! placed in front of an outbound dependency (a network service, a database,
//! a cache) to help it recover from overload. Backends must spend resources
//! to reject requests over their capacity, so it is vital for clients to ease
//! off when the backend is in trouble, lest it spend everything on rejections
//! and have nothing left to serve anyone.
//!
//! ## How it works
//!
//! The throttle tracks the success rate of requests over a sliding window
//! (usually a minute or so) and randomly rejects new requests *locally*,
//! without sending them, to avoid offering much more load than the backend is
//! currently accepting. Some slop is included: even when the backend serves
//! nothing successfully, a trickle of probe traffic still goes out so the
//! client learns when it becomes healthy again. The algorithm is the client
//! throttle described in <https://sre.google/sre-book/handling-overload/>.
//!
//! Requests carry a [`Priority`]; when the throttle sheds, lower-priority
//! traffic is preferred to be rejected first.
//!
//! ## Key concepts
//!
//! * **Passive when healthy**: no queueing, no delays, no timers. A healthy
//!   call path costs one mutex acquisition and an O(1) bucket walk.
//! * **Fail fast**: a shed call completes immediately with [`Shed`]; it never
//!   waits for capacity.
//! * **Transparent errors**: upstream errors pass through verbatim. The only
//!   rewriting the throttle ever does is unwrapping the [`Rejected`] marker.
//!
//! ## Example
//!
//! ```rust
//! use shed_limit::{AdaptiveThrottle, BoxError, Context, Priority, PriorityRange};
//!
//! let throttle = AdaptiveThrottle::new(PriorityRange::standard());
//! let cx = Context::new();
//!
//! let reply: Result<&str, BoxError> =
//!     throttle.execute(&cx, Priority::MEDIUM, |_cx| Ok("pong"));
//! assert_eq!(reply.unwrap(), "pong");
//! ```

mod context;
mod error;
mod priority;
mod throttle;
mod window;

pub use context::Context;
pub use error::is_distress;
pub use error::set_default_classifier;
pub use error::BoxError;
pub use error::Classifier;
pub use error::Fault;
pub use error::Rejected;
pub use error::Shed;
pub use priority::InvalidPriority;
pub use priority::OutOfRange;
pub use priority::Priority;
pub use priority::PriorityRange;
pub use throttle::AdaptiveThrottle;
pub use throttle::Snapshot;
pub use throttle::DEFAULT_MIN_RATE;
pub use throttle::DEFAULT_RATIO;
pub use throttle::DEFAULT_WINDOW;
