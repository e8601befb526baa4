//! Burst probe: fire N copies of one probe at once and record a single
//! aggregate verdict.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{Probe, Verdict};
use crate::results::Outcome;

/// Counts from one burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstTally {
    pub succeeded: usize,
    pub skipped: usize,
    pub total: usize,
}

pub struct ConcurrencyProbe {
    name: String,
    probe: Arc<dyn Probe>,
    fan_out: usize,
}

impl ConcurrencyProbe {
    /// # Panics
    ///
    /// Panics if `fan_out` is zero.
    pub fn new(name: impl Into<String>, probe: Arc<dyn Probe>, fan_out: usize) -> Self {
        assert!(fan_out > 0, "concurrency fan-out must be at least 1");
        Self {
            name: name.into(),
            probe,
            fan_out,
        }
    }

    /// Spawn every worker, then wait for all of them.
    pub async fn burst(&self) -> BurstTally {
        let mut workers = JoinSet::new();
        for _ in 0..self.fan_out {
            let probe = Arc::clone(&self.probe);
            workers.spawn(async move { probe.run().await });
        }

        let mut tally = BurstTally {
            succeeded: 0,
            skipped: 0,
            total: self.fan_out,
        };
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(v) if v.outcome == Outcome::Pass => tally.succeeded += 1,
                Ok(v) if v.outcome == Outcome::SkippedOptional => tally.skipped += 1,
                Ok(v) => debug!(probe = %self.probe.name(), message = %v.message, "burst request failed"),
                // A panicking worker only costs its own request.
                Err(e) => warn!(probe = %self.probe.name(), error = %e, "burst worker aborted"),
            }
        }
        tally
    }
}

#[async_trait::async_trait]
impl Probe for ConcurrencyProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Verdict {
        let start = Instant::now();
        let tally = self.burst().await;
        let duration = start.elapsed();
        let message = format!("{}/{} successful", tally.succeeded, tally.total);

        if tally.succeeded == tally.total {
            Verdict::pass(message, duration)
        } else if tally.skipped == tally.total {
            Verdict::skipped(format!("{message} (optional dependency unavailable)"), duration)
        } else {
            Verdict::fail(message, duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testutil::{serve, unused_base};
    use crate::probes::{Endpoint, HttpProbe};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Probe for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self) -> Verdict {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => panic!("worker blew up"),
                1 => Verdict::fail("nope", Duration::ZERO),
                _ => Verdict::pass("ok", Duration::ZERO),
            }
        }
    }

    #[tokio::test]
    async fn test_healthy_target_all_succeed() {
        let base = serve(Router::new().route("/health", get(|| async { "ok" }))).await;
        let probe = HttpProbe::new("GET /health", Endpoint::get(&base, "/health"));
        let burst = ConcurrencyProbe::new("Concurrent requests (5x)", Arc::new(probe), 5);

        let v = burst.run().await;
        assert_eq!(v.outcome, Outcome::Pass);
        assert_eq!(v.message, "5/5 successful");
    }

    #[tokio::test]
    async fn test_unreachable_target_fails() {
        let ep = Endpoint::get(&unused_base(), "/health").timeout(Duration::from_secs(2));
        let burst = ConcurrencyProbe::new("burst", Arc::new(HttpProbe::new("h", ep.clone())), 4);
        assert_eq!(
            burst.burst().await,
            BurstTally {
                succeeded: 0,
                skipped: 0,
                total: 4
            }
        );
        let v = burst.run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert_eq!(v.message, "0/4 successful");

        let optional = HttpProbe::new("h", ep).optional_dependency();
        let v = ConcurrencyProbe::new("burst", Arc::new(optional), 3).run().await;
        assert_eq!(v.outcome, Outcome::SkippedOptional);
    }

    #[tokio::test]
    async fn test_worker_panic_does_not_sink_siblings() {
        let flaky = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
        });
        let burst = ConcurrencyProbe::new("flaky burst", flaky.clone(), 6);
        let v = burst.run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert_eq!(v.message, "4/6 successful");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 6);
    }
}
