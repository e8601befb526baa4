//! Suite runner: ordered check units sharing one result log.
//!
//! Units run strictly in order on the calling task. A unit that returns an
//! error or panics is turned into a single `Fail` record named after the unit
//! and the run continues, unless the error is an [`Abort`].

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{EnvFile, HarnessConfig};
use crate::probes::{Endpoint, HttpProbe, Probe, Verdict};
use crate::report::{Console, SuiteReport};
use crate::results::{Outcome, ResultLog, ResultRecord};

/// Returned by a unit to stop the whole suite (a hard dependency is missing).
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct Abort {
    pub reason: String,
}

impl Abort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Shared state handed to every check unit of one run.
pub struct SuiteContext {
    pub config: HarnessConfig,
    log: ResultLog,
    console: Console,
    env: Option<EnvFile>,
    client: reqwest::Client,
}

impl SuiteContext {
    pub fn new(config: HarnessConfig, console: Console) -> Self {
        Self {
            config,
            log: ResultLog::new(),
            console,
            env: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_env(mut self, env: EnvFile) -> Self {
        self.env = Some(env);
        self
    }

    pub fn env(&self) -> Option<&EnvFile> {
        self.env.as_ref()
    }

    /// HTTP probe on the run's shared connection pool.
    pub fn http(&self, name: impl Into<String>, endpoint: Endpoint) -> HttpProbe {
        HttpProbe::new(name, endpoint).with_client(self.client.clone())
    }

    pub fn log(&self) -> &ResultLog {
        &self.log
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Append a record and echo it to the console.
    pub fn record(&self, record: ResultRecord) {
        self.console.record(&record);
        self.log.push(record);
    }

    /// Name a verdict and record it.
    pub fn record_verdict(&self, name: &str, verdict: Verdict) -> anyhow::Result<Outcome> {
        let outcome = verdict.outcome;
        self.record(verdict.into_record(name)?);
        Ok(outcome)
    }

    /// Run a probe and record its verdict under the probe's name.
    pub async fn check(&self, probe: &dyn Probe) -> anyhow::Result<Outcome> {
        let verdict = probe.run().await;
        self.record_verdict(probe.name(), verdict)
    }
}

pub type CheckFuture<'a> = BoxFuture<'a, anyhow::Result<()>>;

type CheckFn = Box<dyn for<'a> Fn(&'a SuiteContext) -> CheckFuture<'a> + Send + Sync>;

enum Step {
    Section(String),
    Check { name: String, run: CheckFn },
}

/// An ordered list of named check units.
pub struct Suite {
    name: String,
    steps: Vec<Step>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a new titled group in the console output.
    pub fn section(mut self, title: impl Into<String>) -> Self {
        self.steps.push(Step::Section(title.into()));
        self
    }

    /// Append a unit. It may record any number of results.
    ///
    /// # Panics
    ///
    /// Panics if `name` is blank.
    pub fn check<F>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: for<'a> Fn(&'a SuiteContext) -> CheckFuture<'a> + Send + Sync + 'static,
    {
        let name = name.into();
        assert!(!name.trim().is_empty(), "check unit name must not be empty");
        self.steps.push(Step::Check {
            name,
            run: Box::new(run),
        });
        self
    }

    /// Names of the check units, in run order.
    pub fn unit_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::Check { name, .. } => Some(name.as_str()),
                Step::Section(_) => None,
            })
            .collect()
    }

    /// Run every unit in order and aggregate the log.
    pub async fn run(&self, ctx: &SuiteContext) -> SuiteReport {
        let started_at = Utc::now();
        info!(suite = %self.name, units = self.unit_names().len(), "running suite");
        ctx.console().section(&self.name);

        let mut aborted = None;
        for step in &self.steps {
            let (name, run) = match step {
                Step::Section(title) => {
                    ctx.console().section(title);
                    continue;
                }
                Step::Check { name, run } => (name, run),
            };

            debug!(unit = %name, "starting check unit");
            let start = Instant::now();
            let result = AssertUnwindSafe(run(ctx)).catch_unwind().await;
            let elapsed = start.elapsed();

            let failure = match result {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => {
                    if let Some(abort) = err.downcast_ref::<Abort>() {
                        warn!(unit = %name, reason = %abort.reason, "suite aborted");
                        aborted = Some(abort.reason.clone());
                    }
                    format!("{err:#}")
                }
                Err(panic) => format!("check panicked: {}", panic_message(&*panic)),
            };

            warn!(unit = %name, error = %failure, "check unit failed");
            // Names are checked in `Suite::check`.
            if let Ok(record) = ResultRecord::new(name.as_str(), Outcome::Fail, &failure, elapsed) {
                ctx.record(record);
            }
            if aborted.is_some() {
                break;
            }
        }

        let report = SuiteReport::new(&self.name, started_at, ctx.log().snapshot(), aborted);
        info!(
            suite = %self.name,
            total = report.outcome.total,
            failed = report.outcome.failed,
            "suite finished"
        );
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
