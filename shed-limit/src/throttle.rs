use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use quanta::Clock;
use quanta::Instant;
use rand::Rng;

use crate::context::Context;
use crate::error::default_classifier;
use crate::error::BoxError;
use crate::error::Classifier;
use crate::error::Rejected;
use crate::error::Shed;
use crate::priority::Priority;
use crate::priority::PriorityRange;
use crate::window::WindowedCounter;
use crate::window::BUCKETS;

/// Default success-to-admit multiplier `k`.
///
/// A value of 2 means the throttle lets twice as many requests reach the
/// backend as it believes will succeed.
pub const DEFAULT_RATIO: f64 = 2.0;

/// Default baseline probe rate, in requests per second, that goes through to
/// the upstream even when every request is failing.
pub const DEFAULT_MIN_RATE: f64 = 1.0;

/// Default sliding-window span over which outcomes are remembered.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Windowed request/accept totals for one priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Attempts in the window, including locally shed calls.
    pub requests: u64,
    /// Outcomes in the window that counted as accepted.
    pub accepts: u64,
}

/// One pair of counters per priority rank, all behind a single mutex so a
/// probability computation reads a consistent snapshot across ranks.
struct Lanes {
    requests: Vec<WindowedCounter>,
    accepts: Vec<WindowedCounter>,
}

impl Lanes {
    fn new(now: Instant, window: Duration, cardinality: usize) -> Self {
        let width = window / BUCKETS as u32;
        Self {
            requests: (0..cardinality)
                .map(|_| WindowedCounter::new(now, width))
                .collect(),
            accepts: (0..cardinality)
                .map(|_| WindowedCounter::new(now, width))
                .collect(),
        }
    }
}

/// An adaptive client-side throttle for one logical upstream.
///
/// Construct one per (client, backend) pair, share it via `Arc`, and route
/// every outbound call through [`execute`](Self::execute). The throttle
/// tracks how many requests the backend has been accepting lately and rejects
/// the excess locally, preferring to reject lower-priority requests first.
/// See the crate docs for the algorithm.
pub struct AdaptiveThrottle {
    range: PriorityRange,
    ratio: f64,
    min_rate: f64,
    window: Duration,
    clock: Clock,
    classifier: Classifier,
    draw: Box<dyn Fn() -> f64 + Send + Sync>,
    lanes: Mutex<Lanes>,
}

impl AdaptiveThrottle {
    /// A throttle over `range` with the default ratio, probe rate and window.
    pub fn new(range: PriorityRange) -> Self {
        let clock = Clock::new();
        let now = clock.now();
        Self {
            range,
            ratio: DEFAULT_RATIO,
            min_rate: DEFAULT_MIN_RATE,
            window: DEFAULT_WINDOW,
            lanes: Mutex::new(Lanes::new(now, DEFAULT_WINDOW, range.cardinality())),
            clock,
            classifier: default_classifier(),
            draw: Box::new(|| rand::rng().random::<f64>()),
        }
    }

    /// Set the ratio `k` between the measured accept rate and the rate the
    /// throttle will admit.
    ///
    /// Higher values react more slowly when a backend becomes unhealthy but
    /// more quickly when it recovers, at the cost of more load on an
    /// unhealthy backend. 2 is a good start; backends serving cheap requests
    /// (in-memory caches, say) may want less.
    pub fn with_ratio(mut self, k: f64) -> Self {
        self.ratio = k;
        self
    }

    /// Set the minimum rate, in requests per second, that goes through to
    /// the upstream even when every request is failing. This is how the
    /// throttle learns that the upstream became healthy again.
    pub fn with_min_rate(mut self, rate: f64) -> Self {
        self.min_rate = rate;
        self
    }

    /// Set the sliding window over which outcomes are remembered.
    /// Accumulated counts are discarded.
    pub fn with_window(mut self, window: Duration) -> Self {
        assert!(!window.is_zero(), "window must be non-zero");
        self.window = window;
        self.reset_lanes();
        self
    }

    /// Replace the distress classifier for this throttle only.
    pub fn with_classifier(
        mut self,
        classifier: impl Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Replace the clock. Accumulated counts are discarded. Pair with
    /// [`quanta::Clock::mock`] to drive time from tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.reset_lanes();
        self
    }

    /// Replace the uniform `[0, 1)` source behind admit draws. Primarily for
    /// deterministic tests.
    pub fn with_draw(mut self, draw: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.draw = Box::new(draw);
        self
    }

    /// The priority range this throttle accepts.
    pub fn range(&self) -> PriorityRange {
        self.range
    }

    /// Run `work` through the throttle.
    ///
    /// The priority bound to `cx` wins over `default_priority`, and the
    /// resolved priority is validated per the range policy before anything
    /// else happens, so under [`crate::OutOfRange::Reject`] an out-of-range
    /// call fails without invoking `work`.
    ///
    /// When enough failures accumulate in the window, calls start failing
    /// with [`Shed`] without reaching `work`. Errors from `work` come back
    /// verbatim, except that a [`Rejected`] wrapper is unwrapped to its inner
    /// error.
    pub fn execute<T, F>(
        &self,
        cx: &Context,
        default_priority: Priority,
        work: F,
    ) -> Result<T, BoxError>
    where
        F: FnOnce(&Context) -> Result<T, BoxError>,
    {
        let priority = self.range.validate(cx.priority_or(default_priority))?;
        match self.try_admit(priority) {
            ControlFlow::Break(shed) => Err(shed.into()),
            ControlFlow::Continue(()) => self.settle(priority, work(cx)),
        }
    }

    /// Like [`execute`](Self::execute), but a local rejection routes to
    /// `fallback` instead of surfacing [`Shed`].
    ///
    /// The fallback runs only when the throttle itself short-circuited the
    /// call; errors returned by `work` never trigger it.
    pub fn execute_or_else<T, F, G>(
        &self,
        cx: &Context,
        default_priority: Priority,
        work: F,
        fallback: G,
    ) -> Result<T, BoxError>
    where
        F: FnOnce(&Context) -> Result<T, BoxError>,
        G: FnOnce(&Context, Shed) -> Result<T, BoxError>,
    {
        let priority = self.range.validate(cx.priority_or(default_priority))?;
        match self.try_admit(priority) {
            ControlFlow::Break(shed) => fallback(cx, shed),
            ControlFlow::Continue(()) => self.settle(priority, work(cx)),
        }
    }

    /// Decide whether a call at `priority` may go out now.
    ///
    /// On rejection the attempt is recorded and the [`Shed`] sentinel comes
    /// back. Recording locally rejected calls is deliberate: as callers keep
    /// arriving faster than the upstream accepts, requests keep outgrowing
    /// accepts and the rejection probability keeps rising, which is the
    /// behaviour that actually protects the upstream.
    ///
    /// On admission nothing is recorded yet; account the outcome with
    /// [`settle`](Self::settle). `priority` is expected to be validated;
    /// out-of-range ranks are accounted at the lowest level.
    pub fn try_admit(&self, priority: Priority) -> ControlFlow<Shed> {
        let now = self.clock.now();
        let probability = self.rejection_probability_at(priority, now);
        if (self.draw)() < probability {
            tracing::debug!(priority = %priority, probability, "shedding call client side");
            let lane = self.lane(priority);
            self.lanes.lock().requests[lane].add(now, 1);
            return ControlFlow::Break(Shed::new());
        }
        ControlFlow::Continue(())
    }

    /// Account the outcome of an admitted call and shape the caller-visible
    /// result.
    ///
    /// Success and benign errors count as accepts. A [`Rejected`]-wrapped
    /// error counts as request-only and comes back unwrapped. Anything the
    /// classifier marks as distress counts as request-only and passes
    /// through verbatim. An admitted call that is dropped without being
    /// settled records nothing.
    pub fn settle<T>(&self, priority: Priority, result: Result<T, BoxError>) -> Result<T, BoxError> {
        let now = self.clock.now();
        match result {
            Ok(value) => {
                self.record(priority, now, true);
                Ok(value)
            }
            Err(err) => match err.downcast::<Rejected>() {
                Ok(rejected) => {
                    self.record(priority, now, false);
                    Err(rejected.into_inner())
                }
                Err(err) => {
                    let distress = (self.classifier)(err.as_ref());
                    self.record(priority, now, !distress);
                    Err(err)
                }
            },
        }
    }

    /// Probability that a call at `priority` would currently be rejected,
    /// in `[0, 1]`.
    pub fn rejection_probability(&self, priority: Priority) -> f64 {
        self.rejection_probability_at(priority, self.clock.now())
    }

    /// The formula from <https://sre.google/sre-book/handling-overload/>:
    ///
    /// ```text
    /// clamp((requests - k * accepts) / (requests + min_per_window), 0, 1)
    /// ```
    ///
    /// where `requests` additionally includes the unaccepted traffic of
    /// every rank more important than `priority`. Without that term a flood
    /// of failing high-priority traffic would leave lower ranks admitting at
    /// their unmodified baseline; with it, shedding propagates down the
    /// hierarchy while higher ranks see only their own pressure.
    fn rejection_probability_at(&self, priority: Priority, now: Instant) -> f64 {
        let lane = self.lane(priority);
        let mut lanes = self.lanes.lock();
        let mut requests = lanes.requests[lane].get(now) as f64;
        let accepts = lanes.accepts[lane].get(now) as f64;
        for i in 0..lane {
            let higher_requests = lanes.requests[i].get(now);
            let higher_accepts = lanes.accepts[i].get(now);
            requests += higher_requests.saturating_sub(higher_accepts) as f64;
        }
        drop(lanes);

        let denominator = requests + self.min_per_window();
        if denominator <= 0.0 {
            return 0.0;
        }
        ((requests - self.ratio * accepts) / denominator).clamp(0.0, 1.0)
    }

    /// Windowed totals for `priority`.
    pub fn snapshot(&self, priority: Priority) -> Snapshot {
        let now = self.clock.now();
        let lane = self.lane(priority);
        let mut lanes = self.lanes.lock();
        Snapshot {
            requests: lanes.requests[lane].get(now),
            accepts: lanes.accepts[lane].get(now),
        }
    }

    fn record(&self, priority: Priority, now: Instant, accepted: bool) {
        let lane = self.lane(priority);
        let mut lanes = self.lanes.lock();
        lanes.requests[lane].add(now, 1);
        if accepted {
            lanes.accepts[lane].add(now, 1);
        }
    }

    /// Counter index for `priority`. Ranks past the end of the range share
    /// the lowest lane; range policy is enforced by the callers that care.
    fn lane(&self, priority: Priority) -> usize {
        priority.rank().min(self.range.lowest().rank()) as usize
    }

    fn min_per_window(&self) -> f64 {
        self.min_rate * self.window.as_secs_f64()
    }

    fn reset_lanes(&mut self) {
        let now = self.clock.now();
        self.lanes = Mutex::new(Lanes::new(now, self.window, self.range.cardinality()));
    }
}

impl fmt::Debug for AdaptiveThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveThrottle")
            .field("range", &self.range)
            .field("ratio", &self.ratio)
            .field("min_rate", &self.min_rate)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
