//! stackprobe -- black-box verification harness for a containerized LLM
//! pattern service (REST API, Ollama-compatible API, web UIs).
//!
//! Probes report Pass, Fail or SkippedOptional into a shared result log; suites
//! are ordered lists of checks over those probes, and a run exits non-zero
//! exactly when something failed.

pub mod config;
pub mod probes;
pub mod report;
pub mod results;
pub mod suite;
pub mod suites;

use tracing::{debug, warn};

use config::{ConfigError, EnvFile, HarnessConfig};
use report::{Console, SuiteReport};
use suite::SuiteContext;
use suites::SuiteKind;

/// Build a context for one suite run, attaching the env file when it loads.
pub fn context(config: &HarnessConfig, console: Console) -> SuiteContext {
    let ctx = SuiteContext::new(config.clone(), console);
    match EnvFile::load(&config.environment.env_file) {
        Ok(env) => ctx.with_env(env),
        Err(ConfigError::EnvFileMissing { path }) => {
            debug!(path = %path.display(), "no environment file, continuing without it");
            ctx
        }
        Err(e) => {
            warn!(error = %e, "environment file could not be read");
            ctx
        }
    }
}

/// Run one suite against the configured deployment.
pub async fn run_suite(kind: SuiteKind, config: &HarnessConfig, console: Console) -> SuiteReport {
    let ctx = context(config, console);
    kind.build().run(&ctx).await
}
