use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use shed_limit::AdaptiveThrottle;
use shed_limit::Priority;
use tower::BoxError;
use tower::Service;

use crate::hint::PriorityHint;

/// Fail-fast adaptive throttling middleware.
///
/// Admitted requests flow to the inner service and their outcome feeds the
/// shared throttle; shed requests complete immediately with
/// [`shed_limit::Shed`]. Inner errors pass through verbatim, except that a
/// [`shed_limit::Rejected`] wrapper is unwrapped on the way out.
pub struct ThrottleService<S> {
    inner: S,
    throttle: Arc<AdaptiveThrottle>,
    default_priority: Priority,
}

impl<S> ThrottleService<S> {
    pub fn new(inner: S, throttle: Arc<AdaptiveThrottle>) -> Self {
        ThrottleService {
            inner,
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

impl<S: Clone> Clone for ThrottleService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            throttle: Arc::clone(&self.throttle),
            default_priority: self.default_priority,
        }
    }
}

impl<S, Req> Service<Req> for ThrottleService<S>
where
    S: Service<Req, Error = BoxError>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: PriorityHint,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The throttle never exerts backpressure; readiness is the inner
        // service's alone.
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let hinted = req.priority_hint().unwrap_or(self.default_priority);
        let priority = match self.throttle.range().validate(hinted) {
            Ok(priority) => priority,
            Err(err) => return Box::pin(std::future::ready(Err(BoxError::from(err)))),
        };

        match self.throttle.try_admit(priority) {
            ControlFlow::Break(shed) => Box::pin(std::future::ready(Err(BoxError::from(shed)))),
            ControlFlow::Continue(()) => {
                let future = self.inner.call(req);
                let throttle = Arc::clone(&self.throttle);
                Box::pin(async move { throttle.settle(priority, future.await) })
            }
        }
    }
}
