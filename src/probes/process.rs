//! Subprocess checks (docker, docker-compose, installed CLIs) with the same
//! tri-state contract as HTTP probes.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Probe, ProbeError, Verdict};
use crate::results::Outcome;

/// Captured result of a finished (or never started) command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    /// The program could not be found on `PATH`.
    pub not_found: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `program` with `args`, capturing output, bounded by `timeout`.
///
/// A missing program is reported through [`ProcessOutput::not_found`] so the
/// caller can decide whether that is acceptable. A timeout is an error of its
/// own and the child is killed.
pub async fn run_command(
    program: &str,
    args: &[String],
    current_dir: Option<&PathBuf>,
    timeout: Duration,
) -> Result<ProcessOutput, ProbeError> {
    run_command_with_input(program, args, current_dir, None, timeout).await
}

/// [`run_command`] with `input` written to the child's stdin. Without input
/// the child's stdin is closed.
pub async fn run_command_with_input(
    program: &str,
    args: &[String],
    current_dir: Option<&PathBuf>,
    input: Option<&str>,
    timeout: Duration,
) -> Result<ProcessOutput, ProbeError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(ProcessOutput {
                stderr: ProbeError::CommandNotFound {
                    program: program.to_string(),
                }
                .to_string(),
                not_found: true,
                ..ProcessOutput::default()
            })
        }
        Err(e) => return Err(ProbeError::Process(format!("failed to run {program}: {e}"))),
        Ok(child) => child,
    };

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            // A child may exit without draining stdin; its exit status tells the story.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "child closed stdin early");
            }
        }
    };
    let run = async move { tokio::join!(feed, child.wait_with_output()).1 };

    match tokio::time::timeout(timeout, run).await {
        Err(_) => Err(ProbeError::CommandTimeout { after: timeout }),
        Ok(Err(e)) => Err(ProbeError::Process(format!("failed to run {program}: {e}"))),
        Ok(Ok(out)) => Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            exit_code: out.status.code(),
            not_found: false,
        }),
    }
}

/// Maps captured output to an outcome and message.
pub type Classifier = Arc<dyn Fn(&ProcessOutput) -> (Outcome, String) + Send + Sync>;

/// Default classifier: exit code 0 passes, anything else fails with stderr.
pub fn exit_zero() -> Classifier {
    Arc::new(|out: &ProcessOutput| {
        if out.success() {
            (Outcome::Pass, first_line(&out.stdout).to_string())
        } else {
            (Outcome::Fail, failure_message(out))
        }
    })
}

/// Stdout must contain `needle` (case-insensitive) on a zero exit.
pub fn stdout_contains(needle: &str) -> Classifier {
    let needle = needle.to_lowercase();
    Arc::new(move |out: &ProcessOutput| {
        if !out.success() {
            (Outcome::Fail, failure_message(out))
        } else if out.stdout.to_lowercase().contains(&needle) {
            (Outcome::Pass, format!("found {needle:?}"))
        } else {
            (Outcome::Fail, format!("{needle:?} not found in output"))
        }
    })
}

/// The program ran at all; exit status is ignored.
pub fn installed() -> Classifier {
    Arc::new(|out: &ProcessOutput| {
        if out.not_found {
            (Outcome::Fail, out.stderr.clone())
        } else {
            (Outcome::Pass, "installed".to_string())
        }
    })
}

pub fn first_line(s: &str) -> &str {
    s.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

/// Exit code plus the first stderr line.
pub fn failure_message(out: &ProcessOutput) -> String {
    let detail = first_line(&out.stderr);
    match out.exit_code {
        Some(code) if detail.is_empty() => format!("exit code {code}"),
        Some(code) => format!("exit code {code}: {detail}"),
        None if detail.is_empty() => "terminated by signal".to_string(),
        None => detail.to_string(),
    }
}

/// A command plus the rule deciding what its output means.
#[derive(Clone)]
pub struct ProcessCheck {
    name: String,
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    input: Option<String>,
    timeout: Duration,
    classifier: Classifier,
    optional_when_missing: bool,
}

impl ProcessCheck {
    pub fn new<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            current_dir: None,
            input: None,
            timeout: Duration::from_secs(60),
            classifier: exit_zero(),
            optional_when_missing: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Text piped to the command's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn classify(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// A missing program means the tool is an optional part of the setup.
    pub fn optional_when_missing(mut self) -> Self {
        self.optional_when_missing = true;
        self
    }
}

#[async_trait::async_trait]
impl Probe for ProcessCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Verdict {
        let start = Instant::now();
        let result = run_command_with_input(
            &self.program,
            &self.args,
            self.current_dir.as_ref(),
            self.input.as_deref(),
            self.timeout,
        )
        .await;
        let duration = start.elapsed();
        debug!(program = %self.program, args = ?self.args, elapsed_ms = duration.as_millis() as u64, "process check finished");

        match result {
            Err(e) => Verdict::fail(e.to_string(), duration),
            Ok(out) if out.not_found && self.optional_when_missing => {
                Verdict::skipped(format!("{} not installed (optional)", self.program), duration)
            }
            Ok(out) => {
                let (outcome, message) = (self.classifier)(&out);
                Verdict {
                    outcome,
                    message,
                    duration,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_zero_passes() {
        let check = ProcessCheck::new("echo", "sh", ["-c", "echo hello"]);
        let v = check.run().await;
        assert_eq!(v.outcome, Outcome::Pass);
        assert_eq!(v.message, "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_with_stderr() {
        let check = ProcessCheck::new("boom", "sh", ["-c", "echo broken >&2; exit 3"]);
        let v = check.run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert_eq!(v.message, "exit code 3: broken");
    }

    #[tokio::test]
    async fn test_timeout_is_its_own_failure() {
        let check = ProcessCheck::new("sleepy", "sleep", ["5"]).timeout(Duration::from_millis(200));
        let v = check.run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert!(v.message.starts_with("Command timed out"));
        assert!(v.duration < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_tool_optional_or_not() {
        let program = "stackprobe-definitely-not-installed";
        let v = ProcessCheck::new("tool", program, ["--version"]).run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert!(v.message.contains("command not found"));

        let v = ProcessCheck::new("tool", program, ["--version"])
            .optional_when_missing()
            .run()
            .await;
        assert_eq!(v.outcome, Outcome::SkippedOptional);
    }

    #[tokio::test]
    async fn test_classifier_sees_not_found_signal() {
        let classifier: Classifier = Arc::new(|out: &ProcessOutput| {
            if out.not_found {
                (Outcome::SkippedOptional, "yt not installed".to_string())
            } else {
                (Outcome::Pass, String::new())
            }
        });
        let v = ProcessCheck::new("yt", "stackprobe-missing-yt", Vec::<String>::new())
            .classify(classifier)
            .run()
            .await;
        assert_eq!(v.outcome, Outcome::SkippedOptional);
        assert_eq!(v.message, "yt not installed");
    }

    #[tokio::test]
    async fn test_stdin_is_piped_through() {
        let check = ProcessCheck::new("upper", "tr", ["a-z", "A-Z"]).stdin("fabric pipeline");
        let v = check.run().await;
        assert_eq!(v.outcome, Outcome::Pass);
        assert_eq!(v.message, "FABRIC PIPELINE");

        // A child that ignores its input still finishes normally.
        let out = run_command_with_input("true", &[], None, Some("unread"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_stdout_contains() {
        let check = ProcessCheck::new("services", "sh", ["-c", "printf 'fabric-api\\nOllama\\n'"])
            .classify(stdout_contains("ollama"));
        assert_eq!(check.run().await.outcome, Outcome::Pass);

        let check = ProcessCheck::new("services", "sh", ["-c", "echo fabric-api"])
            .classify(stdout_contains("ollama"));
        assert_eq!(check.run().await.outcome, Outcome::Fail);
    }
}
