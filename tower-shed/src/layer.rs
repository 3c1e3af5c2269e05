use std::sync::Arc;

use shed_limit::AdaptiveThrottle;
use shed_limit::Priority;
use tower::Layer;

use crate::service::ThrottleService;

/// Applies an adaptive client-side throttle to requests.
///
/// Every service built from one layer shares the same [`AdaptiveThrottle`],
/// so cloned clients all feed the same view of backend health.
#[derive(Clone, Debug)]
pub struct ThrottleLayer {
    throttle: Arc<AdaptiveThrottle>,
    default_priority: Priority,
}

impl ThrottleLayer {
    /// Create a layer sharing `throttle` across every service it wraps.
    pub fn new(throttle: Arc<AdaptiveThrottle>) -> Self {
        ThrottleLayer {
            throttle,
            default_priority: Priority::MEDIUM,
        }
    }

    /// Set the priority assumed for requests that carry no hint.
    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ThrottleService::new(service, Arc::clone(&self.throttle))
            .with_default_priority(self.default_priority)
    }
}
