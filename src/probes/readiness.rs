//! Readiness polling: wait for a service to answer before running checks
//! against it.

use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of waiting on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready { elapsed: Duration, status: u16 },
    NotReady { elapsed: Duration, last_error: Option<String> },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Readiness::Ready { elapsed, .. } | Readiness::NotReady { elapsed, .. } => *elapsed,
        }
    }
}

/// Fixed-interval poller bounded by an overall deadline.
#[derive(Debug, Clone)]
pub struct ReadinessWaiter {
    client: Client,
    url: String,
    deadline: Duration,
    poll_interval: Duration,
    attempt_timeout: Duration,
    ready_statuses: BTreeSet<u16>,
}

impl ReadinessWaiter {
    /// Waiter with a 1s poll interval, 2s per-attempt timeout and
    /// `{200}` as the ready set.
    pub fn new(url: impl Into<String>, deadline: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            deadline,
            poll_interval: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(2),
            ready_statuses: BTreeSet::from([200]),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Statuses that mean "server is up". A 404 often qualifies: the server
    /// answered, the route just does not exist.
    pub fn ready_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.ready_statuses = statuses.into_iter().collect();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Poll until a ready status is seen or the deadline passes.
    pub async fn wait(&self) -> Readiness {
        let start = Instant::now();
        let mut last_error = None;
        let mut attempts = 0u32;

        loop {
            let remaining = self.deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            attempts += 1;

            let attempt = self
                .client
                .get(&self.url)
                .timeout(self.attempt_timeout.min(remaining))
                .send()
                .await;
            match attempt {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if self.ready_statuses.contains(&status) {
                        let elapsed = start.elapsed();
                        info!(url = %self.url, status, attempts, elapsed_ms = elapsed.as_millis() as u64, "target ready");
                        return Readiness::Ready { elapsed, status };
                    }
                    debug!(url = %self.url, status, "target answered with a non-ready status");
                    last_error = Some(format!("status {status}"));
                }
                // Refused connections just mean "not up yet".
                Err(e) => {
                    debug!(url = %self.url, error = %e, "readiness attempt failed");
                    last_error = Some(e.to_string());
                }
            }

            let remaining = self.deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }

        let elapsed = start.elapsed();
        warn!(url = %self.url, attempts, elapsed_ms = elapsed.as_millis() as u64, "target not ready before deadline");
        Readiness::NotReady {
            elapsed,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testutil::{serve, unused_base};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ready_immediately() {
        let base = serve(Router::new().route("/health", get(|| async { "ok" }))).await;
        let waiter = ReadinessWaiter::new(format!("{base}/health"), Duration::from_secs(5));
        let r = waiter.wait().await;
        assert!(r.is_ready());
        assert!(r.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_404_counts_when_configured() {
        let base = serve(Router::new()).await;
        let url = format!("{base}/");

        let r = ReadinessWaiter::new(&url, Duration::from_secs(5))
            .ready_statuses([200, 404])
            .wait()
            .await;
        assert_eq!(
            r,
            Readiness::Ready {
                elapsed: r.elapsed(),
                status: 404
            }
        );

        let r = ReadinessWaiter::new(&url, Duration::from_millis(600))
            .poll_interval(Duration::from_millis(100))
            .wait()
            .await;
        assert!(!r.is_ready());
    }

    #[tokio::test]
    async fn test_not_ready_at_deadline() {
        let deadline = Duration::from_millis(700);
        let waiter = ReadinessWaiter::new(unused_base(), deadline)
            .poll_interval(Duration::from_millis(100))
            .attempt_timeout(Duration::from_millis(100));
        let r = waiter.wait().await;
        match r {
            Readiness::NotReady { elapsed, last_error } => {
                assert!(elapsed >= deadline);
                assert!(elapsed < deadline + Duration::from_secs(1));
                assert!(last_error.is_some());
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_becomes_ready_after_warmup() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/health",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        );
        let base = serve(router).await;

        let r = ReadinessWaiter::new(format!("{base}/health"), Duration::from_secs(5))
            .poll_interval(Duration::from_millis(50))
            .wait()
            .await;
        assert!(r.is_ready());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
