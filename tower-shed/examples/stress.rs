//! Multi-priority load against a capacity-limited fake upstream.
//!
//! Three client loops offer 5/10/20 rps at priorities 0/1/2 to a backend
//! that accepts 20 rps and turns the rest away. Watch the throttle push the
//! shedding onto the lowest priority while the probe traffic keeps
//! rediscovering capacity.
//!
//! Run with `cargo run --example stress`.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use hdrhistogram::Histogram;
use http::Request;
use shed_limit::AdaptiveThrottle;
use shed_limit::Fault;
use shed_limit::Priority;
use shed_limit::PriorityRange;
use shed_limit::Shed;
use tokio::task::JoinSet;
use tower::service_fn;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;
use tower_shed::ThrottleLayer;

const DEMAND_RPS: [u64; 3] = [5, 10, 20];
const SUPPLY_RPS: f64 = 20.0;
const RUN_FOR: Duration = Duration::from_secs(15);

/// Token-bucket stand-in for a backend with a hard capacity.
struct Upstream {
    tokens: f64,
    last: Instant,
}

impl Upstream {
    fn new() -> Self {
        Upstream {
            tokens: SUPPLY_RPS,
            last: Instant::now(),
        }
    }

    fn admit(&mut self) -> bool {
        let now = Instant::now();
        let refill = now.duration_since(self.last).as_secs_f64() * SUPPLY_RPS;
        self.tokens = (self.tokens + refill).min(SUPPLY_RPS);
        self.last = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[tokio::main]
async fn main() {
    let throttle = Arc::new(
        AdaptiveThrottle::new(PriorityRange::new(Priority::MEDIUM))
            .with_window(Duration::from_secs(3)),
    );
    let upstream = Arc::new(Mutex::new(Upstream::new()));
    let layer = ThrottleLayer::new(Arc::clone(&throttle));

    let mut workers = JoinSet::new();
    for (rank, rps) in DEMAND_RPS.iter().copied().enumerate() {
        let layer = layer.clone();
        let upstream = Arc::clone(&upstream);
        workers.spawn(async move {
            let backend = service_fn(move |_req: Request<()>| {
                let upstream = Arc::clone(&upstream);
                async move {
                    if upstream.lock().unwrap().admit() {
                        Ok("ok")
                    } else {
                        Err(BoxError::from(Fault::unavailable()))
                    }
                }
            });
            let mut client = layer.layer(backend);

            let mut ticker = tokio::time::interval(Duration::from_millis(1000 / rps));
            let mut attempted = 0u64;
            let mut sent = 0u64;
            let mut shed = 0u64;
            let mut latency = Histogram::<u64>::new(3).expect("histogram bounds");

            let started = Instant::now();
            while started.elapsed() < RUN_FOR {
                ticker.tick().await;
                let mut req = Request::new(());
                req.extensions_mut().insert(Priority::new(rank as u8));

                attempted += 1;
                let call_started = Instant::now();
                let outcome = client.ready().await.expect("ready").call(req).await;
                latency
                    .record(call_started.elapsed().as_micros() as u64)
                    .ok();
                match outcome {
                    Ok(_) => sent += 1,
                    Err(err) if err.is::<Shed>() => shed += 1,
                    // Turned away by the upstream itself: it still went out.
                    Err(_) => sent += 1,
                }
            }
            (rank, attempted, sent, shed, latency)
        });
    }

    let mut rows = Vec::new();
    while let Some(row) = workers.join_next().await {
        rows.push(row.expect("worker panicked"));
    }
    rows.sort_by_key(|row| row.0);

    let secs = RUN_FOR.as_secs_f64();
    println!("supply: {SUPPLY_RPS:.0} rps, window: 3s, run: {secs:.0}s");
    println!(
        "{:<10} {:>12} {:>10} {:>8} {:>12}",
        "priority", "demand rps", "sent rps", "shed %", "p99 call us"
    );
    for (rank, attempted, sent, shed, latency) in rows {
        println!(
            "{:<10} {:>12.1} {:>10.1} {:>7.1}% {:>12}",
            rank,
            attempted as f64 / secs,
            sent as f64 / secs,
            shed as f64 / attempted.max(1) as f64 * 100.0,
            latency.value_at_quantile(0.99),
        );
    }
}
