//! Result model for a single suite run.
//!
//! A [`ResultRecord`] is immutable once built. A [`ResultLog`] is the
//! append-only, shareable list of records that every probe in a run writes to;
//! the reporter reads it once through [`ResultLog::snapshot`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Longest message kept on a record, in characters.
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Programmer errors when building a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("result record name must not be empty")]
    EmptyName,
}

/// Tri-state outcome of a single check.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    /// An optional capability was verified absent. Counts towards `passed`
    /// but is reported separately.
    SkippedOptional,
}

impl Outcome {
    pub fn is_fail(self) -> bool {
        self == Outcome::Fail
    }

    pub fn tag(self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::SkippedOptional => "SKIP",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One recorded check outcome.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultRecord {
    name: String,
    outcome: Outcome,
    message: String,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    duration: Duration,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ResultRecord {
    /// Build a record. The message is truncated to [`MAX_MESSAGE_CHARS`].
    pub fn new(
        name: impl Into<String>,
        outcome: Outcome,
        message: impl Into<String>,
        duration: Duration,
    ) -> Result<Self, RecordError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RecordError::EmptyName);
        }
        Ok(Self {
            name,
            outcome,
            message: truncate(&message.into(), MAX_MESSAGE_CHARS),
            duration,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Truncate `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Append-only log shared by every probe of one run.
///
/// Cloning is cheap and yields a handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct ResultLog {
    records: Arc<Mutex<Vec<ResultRecord>>>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and append a record.
    pub fn append(
        &self,
        name: impl Into<String>,
        outcome: Outcome,
        message: impl Into<String>,
        duration: Duration,
    ) -> Result<(), RecordError> {
        self.push(ResultRecord::new(name, outcome, message, duration)?);
        Ok(())
    }

    /// Append an already-built record.
    pub fn push(&self, record: ResultRecord) {
        // A panic while holding the lock cannot leave a half-written Vec push,
        // so a poisoned lock is still safe to use.
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the records appended so far, in append order.
    pub fn snapshot(&self) -> LogSnapshot {
        let records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        LogSnapshot { records }
    }
}

/// Read-only view of a [`ResultLog`] at one point in time.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct LogSnapshot {
    records: Vec<ResultRecord>,
}

impl LogSnapshot {
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter().filter(|r| r.outcome.is_fail())
    }
}

impl From<Vec<ResultRecord>> for LogSnapshot {
    fn from(records: Vec<ResultRecord>) -> Self {
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_name_rejected() {
        let err = ResultRecord::new("  ", Outcome::Pass, "", Duration::ZERO).unwrap_err();
        assert_eq!(err, RecordError::EmptyName);

        let log = ResultLog::new();
        assert!(log.append("", Outcome::Fail, "x", Duration::ZERO).is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn test_message_truncated() {
        let long = "x".repeat(500);
        let rec = ResultRecord::new("long", Outcome::Fail, long, Duration::ZERO).unwrap();
        assert_eq!(rec.message().chars().count(), MAX_MESSAGE_CHARS + 3);
        assert!(rec.message().ends_with("..."));

        let short = ResultRecord::new("short", Outcome::Pass, "ok", Duration::ZERO).unwrap();
        assert_eq!(short.message(), "ok");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "é".repeat(10);
        assert_eq!(truncate(&s, 3), "ééé...");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[test]
    fn test_append_order_preserved() {
        let log = ResultLog::new();
        for name in ["A", "B", "C"] {
            log.append(name, Outcome::Pass, "", Duration::from_millis(1))
                .unwrap();
        }
        let names: Vec<_> = log
            .snapshot()
            .records()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn test_concurrent_appends_not_lost() {
        let log = ResultLog::new();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let msg = format!("worker {worker} item {i}");
                        log.append(
                            format!("w{worker}-{i}"),
                            Outcome::Pass,
                            msg,
                            Duration::from_millis(i),
                        )
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = log.snapshot();
        assert_eq!(snap.len(), 400);
        for rec in snap.records() {
            let (w, i) = rec.name()[1..].split_once('-').unwrap();
            assert_eq!(rec.message(), format!("worker {w} item {i}"));
            assert_eq!(rec.duration(), Duration::from_millis(i.parse().unwrap()));
        }
    }

    #[test]
    fn test_snapshot_is_detached() {
        let log = ResultLog::new();
        log.append("first", Outcome::Pass, "", Duration::ZERO).unwrap();
        let snap = log.snapshot();
        log.append("second", Outcome::Fail, "", Duration::ZERO).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(log.snapshot().failures().count(), 1);
    }
}
