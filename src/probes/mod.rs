//! Probe engine: HTTP and subprocess checks plus the readiness, burst and
//! latency helpers built on top of them.

use std::time::Duration;

use thiserror::Error;

use crate::results::{Outcome, RecordError, ResultRecord};

pub mod concurrency;
pub mod http;
pub mod process;
pub mod readiness;
pub mod shape;
pub mod timing;

#[cfg(test)]
pub(crate) mod testutil;

pub use concurrency::ConcurrencyProbe;
pub use http::{Endpoint, HttpProbe, HttpResponse};
pub use process::{ProcessCheck, ProcessOutput};
pub use readiness::{Readiness, ReadinessWaiter};
pub use timing::TimingProbe;

/// Everything that can go wrong while probing a target.
///
/// Each variant resolves to exactly one [`ResultRecord`]; none of them escape
/// a probe as an error value.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {:.1}s", after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("{0}")]
    Validation(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("Command timed out after {:.0}s", after.as_secs_f64())]
    CommandTimeout { after: Duration },

    #[error("command not found: {program}")]
    CommandNotFound { program: String },
}

impl ProbeError {
    /// Classify a reqwest failure, keeping timeouts distinct from transport
    /// errors.
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return ProbeError::Timeout { after: timeout };
        }
        // reqwest's Display hides the root cause ("error sending request");
        // walk the source chain so "connection refused" reaches the report.
        let mut msg = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(inner) = source {
            msg.push_str(": ");
            msg.push_str(&inner.to_string());
            source = inner.source();
        }
        ProbeError::Transport(msg)
    }
}

/// What a single probe run concluded, before it is named and logged.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub message: String,
    pub duration: Duration,
}

impl Verdict {
    pub fn pass(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            outcome: Outcome::Pass,
            message: message.into(),
            duration,
        }
    }

    pub fn fail(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            outcome: Outcome::Fail,
            message: message.into(),
            duration,
        }
    }

    pub fn skipped(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            outcome: Outcome::SkippedOptional,
            message: message.into(),
            duration,
        }
    }

    pub fn into_record(self, name: impl Into<String>) -> Result<ResultRecord, RecordError> {
        ResultRecord::new(name, self.outcome, self.message, self.duration)
    }
}

/// Trait for all black-box checks.
///
/// `run` never fails: transport, timeout, status and validation problems are
/// all folded into the returned [`Verdict`].
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Name used for the record this probe produces.
    fn name(&self) -> &str;

    async fn run(&self) -> Verdict;
}
