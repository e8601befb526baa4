//! Sequential latency check: repeat one probe and bound the slowest sample,
//! optionally the mean as well.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{Probe, Verdict};
use crate::results::Outcome;

/// Summary of repeated samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub failed: usize,
    pub mean: Duration,
    pub max: Duration,
}

impl LatencySummary {
    pub fn from_samples(durations: &[Duration], failed: usize) -> Self {
        let max = durations.iter().copied().max().unwrap_or_default();
        let mean = if durations.is_empty() {
            Duration::ZERO
        } else {
            durations.iter().sum::<Duration>() / durations.len() as u32
        };
        Self {
            samples: durations.len(),
            failed,
            mean,
            max,
        }
    }
}

pub struct TimingProbe {
    name: String,
    probe: Arc<dyn Probe>,
    samples: usize,
    max_latency: Duration,
    max_mean: Option<Duration>,
}

impl TimingProbe {
    /// # Panics
    ///
    /// Panics if `samples` is zero.
    pub fn new(
        name: impl Into<String>,
        probe: Arc<dyn Probe>,
        samples: usize,
        max_latency: Duration,
    ) -> Self {
        assert!(samples > 0, "timing probe needs at least one sample");
        Self {
            name: name.into(),
            probe,
            samples,
            max_latency,
            max_mean: None,
        }
    }

    /// Also require the mean sample to stay below `bound`.
    pub fn max_mean(mut self, bound: Duration) -> Self {
        self.max_mean = Some(bound);
        self
    }

    pub async fn measure(&self) -> LatencySummary {
        let mut durations = Vec::with_capacity(self.samples);
        let mut failed = 0;
        for _ in 0..self.samples {
            let v = self.probe.run().await;
            if v.outcome != Outcome::Pass {
                failed += 1;
            }
            durations.push(v.duration);
        }
        LatencySummary::from_samples(&durations, failed)
    }
}

#[async_trait::async_trait]
impl Probe for TimingProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Verdict {
        let start = Instant::now();
        let summary = self.measure().await;
        let duration = start.elapsed();

        let mut message = format!(
            "Avg: {}ms, Max: {}ms",
            summary.mean.as_millis(),
            summary.max.as_millis()
        );
        if summary.failed > 0 {
            message.push_str(&format!(", {} of {} requests failed", summary.failed, summary.samples));
        }

        let mean_ok = self.max_mean.map_or(true, |bound| summary.mean < bound);
        if summary.failed == 0 && summary.max < self.max_latency && mean_ok {
            Verdict::pass(message, duration)
        } else {
            Verdict::fail(message, duration)
        }
    }
}
