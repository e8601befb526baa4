//! Aggregation and console reporting for a finished suite run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::results::{truncate, LogSnapshot, Outcome, ResultRecord};

/// Digest messages are cut to this many characters.
pub const DIGEST_MESSAGE_CHARS: usize = 80;

const BANNER_WIDTH: usize = 70;

/// Totals derived from one log snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SuiteOutcome {
    pub total: usize,
    /// Pass plus SkippedOptional.
    pub passed: usize,
    /// The SkippedOptional share of `passed`.
    pub skipped: usize,
    pub failed: usize,
    /// `passed / total`, in `0.0..=1.0`. An empty run counts as 1.0.
    pub success_rate: f64,
    /// Sum of record durations, not wall-clock time.
    #[serde(rename = "total_duration_secs", serialize_with = "serialize_secs")]
    pub total_duration: Duration,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl SuiteOutcome {
    pub fn from_snapshot(snapshot: &LogSnapshot) -> Self {
        let records = snapshot.records();
        let total = records.len();
        let failed = records.iter().filter(|r| r.outcome().is_fail()).count();
        let skipped = records
            .iter()
            .filter(|r| r.outcome() == Outcome::SkippedOptional)
            .count();
        let passed = total - failed;
        let success_rate = if total == 0 {
            1.0
        } else {
            passed as f64 / total as f64
        };
        Self {
            total,
            passed,
            skipped,
            failed,
            success_rate,
            total_duration: records.iter().map(ResultRecord::duration).sum(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Process exit code for this outcome: 0 when nothing failed, else 1.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Everything known about one finished suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub run_id: Uuid,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub outcome: SuiteOutcome,
    /// Set when the suite stopped early on a hard dependency.
    pub aborted: Option<String>,
    pub records: LogSnapshot,
}

impl SuiteReport {
    pub fn new(
        suite: impl Into<String>,
        started_at: DateTime<Utc>,
        records: LogSnapshot,
        aborted: Option<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            suite: suite.into(),
            started_at,
            outcome: SuiteOutcome::from_snapshot(&records),
            aborted,
            records,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.failures()
    }
}

const GREEN: &str = "\x1b[0;32m";
const RED: &str = "\x1b[0;31m";
const YELLOW: &str = "\x1b[1;33m";
const BLUE: &str = "\x1b[0;34m";
const CYAN: &str = "\x1b[0;36m";
const RESET: &str = "\x1b[0m";

/// Stateless text formatter; colour is a per-value choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter {
    pub color: bool,
}

impl Formatter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub fn header(&self, title: &str) -> String {
        let rule = "=".repeat(BANNER_WIDTH);
        format!(
            "{}\n{}\n{}",
            self.paint(BLUE, &rule),
            self.paint(BLUE, &format!("{title:^BANNER_WIDTH$}")),
            self.paint(BLUE, &rule)
        )
    }

    pub fn status(&self, outcome: Outcome) -> String {
        match outcome {
            Outcome::Pass => self.paint(GREEN, "✓ PASS"),
            Outcome::Fail => self.paint(RED, "✗ FAIL"),
            Outcome::SkippedOptional => self.paint(YELLOW, "○ SKIP"),
        }
    }

    /// One live line per record, with the message indented underneath.
    pub fn record(&self, record: &ResultRecord) -> String {
        let secs = record.duration().as_secs_f64();
        let timing = if secs > 0.0 {
            format!(" {}", self.paint(CYAN, &format!("({secs:.2}s)")))
        } else {
            String::new()
        };
        let mut line = format!("{} - {}{timing}", self.status(record.outcome()), record.name());
        if !record.message().is_empty() {
            line.push_str(&format!("\n       {}", record.message()));
        }
        line
    }

    pub fn summary(&self, report: &SuiteReport) -> String {
        let o = &report.outcome;
        let mut out = vec![
            self.header(&format!("{} Summary", report.suite)),
            format!("Total Tests: {}", o.total),
            self.paint(GREEN, &format!("Passed: {}", o.passed)),
        ];
        if o.skipped > 0 {
            out.push(self.paint(YELLOW, &format!("  (optional, not available: {})", o.skipped)));
        }
        out.push(self.paint(RED, &format!("Failed: {}", o.failed)));
        out.push(format!("Total Time: {:.2}s", o.total_duration.as_secs_f64()));
        out.push(format!("Success Rate: {:.1}%", o.success_rate * 100.0));

        if let Some(reason) = &report.aborted {
            out.push(self.paint(RED, &format!("\nSuite aborted: {reason}")));
        }

        if o.failed > 0 {
            out.push(self.paint(YELLOW, "\nFailed Tests:"));
            for rec in report.failures() {
                out.push(format!(
                    "  - {}: {}",
                    rec.name(),
                    truncate(rec.message(), DIGEST_MESSAGE_CHARS)
                ));
            }
        }

        let rule = self.paint(BLUE, &"=".repeat(BANNER_WIDTH));
        let verdict = if o.is_success() {
            self.paint(GREEN, &format!("{:^BANNER_WIDTH$}", "ALL TESTS PASSED"))
        } else {
            self.paint(YELLOW, &format!("{:^BANNER_WIDTH$}", "SOME TESTS FAILED"))
        };
        out.push(format!("\n{rule}\n{verdict}\n{rule}"));
        out.join("\n")
    }
}

/// Live console output, layered over the result log.
#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    formatter: Formatter,
    quiet: bool,
}

impl Console {
    pub fn new(formatter: Formatter, quiet: bool) -> Self {
        Self { formatter, quiet }
    }

    /// A console that prints nothing (JSON output, tests).
    pub fn silent() -> Self {
        Self {
            formatter: Formatter::default(),
            quiet: true,
        }
    }

    pub fn formatter(&self) -> Formatter {
        self.formatter
    }

    pub fn section(&self, title: &str) {
        if !self.quiet {
            println!("\n{}\n", self.formatter.header(title));
        }
    }

    pub fn record(&self, record: &ResultRecord) {
        if !self.quiet {
            println!("{}", self.formatter.record(record));
        }
    }

    pub fn note(&self, text: &str) {
        if !self.quiet {
            println!("{}", self.formatter.paint(YELLOW, text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, outcome: Outcome, msg: &str, ms: u64) -> ResultRecord {
        ResultRecord::new(name, outcome, msg, Duration::from_millis(ms)).unwrap()
    }

    fn snapshot(records: Vec<ResultRecord>) -> LogSnapshot {
        LogSnapshot::from(records)
    }

    #[test]
    fn test_outcome_counts() {
        let snap = snapshot(vec![
            rec("a", Outcome::Pass, "", 100),
            rec("b", Outcome::SkippedOptional, "endpoint not available (optional)", 50),
            rec("c", Outcome::Fail, "Status: 500", 250),
            rec("d", Outcome::Pass, "", 100),
        ]);
        let o = SuiteOutcome::from_snapshot(&snap);
        assert_eq!(o.total, 4);
        assert_eq!(o.passed, 3);
        assert_eq!(o.skipped, 1);
        assert_eq!(o.failed, 1);
        assert_eq!(o.passed + o.failed, o.total);
        assert!((o.success_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(o.total_duration, Duration::from_millis(500));
        assert_eq!(o.exit_code(), 1);
    }

    #[test]
    fn test_empty_run_is_full_success() {
        let o = SuiteOutcome::from_snapshot(&LogSnapshot::default());
        assert_eq!(o.total, 0);
        assert_eq!(o.success_rate, 1.0);
        assert_eq!(o.exit_code(), 0);
    }

    #[test]
    fn test_skips_do_not_fail_the_run() {
        let snap = snapshot(vec![
            rec("a", Outcome::SkippedOptional, "", 0),
            rec("b", Outcome::Pass, "", 0),
        ]);
        assert_eq!(SuiteOutcome::from_snapshot(&snap).exit_code(), 0);
    }

    #[test]
    fn test_digest_lists_only_failures() {
        let long = "y".repeat(150);
        let snap = snapshot(vec![
            rec("GET /health", Outcome::Pass, "Status: 200", 10),
            rec("GET /strategies", Outcome::SkippedOptional, "endpoint not available (optional)", 10),
            rec("POST /chat", Outcome::Fail, &long, 10),
        ]);
        let report = SuiteReport::new("API Integration", Utc::now(), snap, None);
        let text = Formatter::new(false).summary(&report);

        let digest = text.split("Failed Tests:").nth(1).unwrap();
        assert!(digest.contains("  - POST /chat: "));
        assert!(!digest.contains("GET /strategies"));
        assert!(!digest.contains("GET /health"));
        assert!(digest.contains(&format!("{}...", "y".repeat(DIGEST_MESSAGE_CHARS))));
        assert!(text.contains("Success Rate: 66.7%"));
        assert!(text.contains("SOME TESTS FAILED"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_color_only_when_enabled() {
        let r = rec("x", Outcome::Pass, "", 0);
        assert!(Formatter::new(true).record(&r).contains(GREEN));
        assert_eq!(Formatter::new(false).record(&r), "✓ PASS - x");
    }

    #[test]
    fn test_report_serializes() {
        let snap = snapshot(vec![rec("a", Outcome::SkippedOptional, "m", 1500)]);
        let report = SuiteReport::new("smoke", Utc::now(), snap, None);
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["records"][0]["outcome"], "skipped_optional");
        assert_eq!(v["records"][0]["duration_secs"], 1.5);
        assert_eq!(v["outcome"]["passed"], 1);
        assert_eq!(v["suite"], "smoke");
    }
}
