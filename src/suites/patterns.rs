//! Pattern library suite: the installed pattern tree on disk and the same
//! library as the API reports it.
//!
//! A host without a pattern directory (the library lives in the container)
//! skips the filesystem checks instead of failing them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::{json, Value};

use super::{api_base, text_at_least, DEFAULT_PATTERN};
use crate::config::expand_home;
use crate::probes::shape::JsonShape;
use crate::probes::{Endpoint, HttpResponse, Verdict};
use crate::results::Outcome;
use crate::suite::{CheckFuture, Suite, SuiteContext};

/// Phrases a usable system prompt is expected to contain at least one of.
const PROMPT_MARKERS: [&str; 4] = ["you are", "your task", "instructions", "output"];

/// Prompts sampled by the content check.
const CONTENT_SAMPLE: usize = 5;

pub fn suite() -> Suite {
    Suite::new("Pattern Library")
        .section("Pattern Availability")
        .check("Patterns API available", api_available)
        .check("Patterns directory", directory)
        .check("Pattern count", count)
        .section("Core Patterns")
        .check("Core patterns present", core_patterns)
        .section("Pattern Structure")
        .check("Pattern structure", structure)
        .check("Pattern content format", content_format)
        .section("Pattern Naming")
        .check("Pattern naming", naming)
        .section("Pattern Execution")
        .check("Pattern execution", execution)
}

/// First configured pattern directory that exists.
fn pattern_dir(ctx: &SuiteContext) -> Option<PathBuf> {
    ctx.config
        .patterns
        .dirs
        .iter()
        .map(|d| expand_home(d))
        .find(|d| d.is_dir())
}

/// Pattern names are the subdirectory names, sorted.
fn installed(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Installed names, or `None` once `name` has been recorded as skipped or
/// failed.
fn installed_or_record(ctx: &SuiteContext, name: &str) -> anyhow::Result<Option<(PathBuf, Vec<String>)>> {
    let Some(dir) = pattern_dir(ctx) else {
        ctx.record_verdict(name, Verdict::skipped("No pattern directory on this host", Duration::ZERO))?;
        return Ok(None);
    };
    match installed(&dir) {
        Ok(names) => Ok(Some((dir, names))),
        Err(e) => {
            let msg = format!("cannot read {}: {e}", dir.display());
            ctx.record_verdict(name, Verdict::fail(msg, Duration::ZERO))?;
            Ok(None)
        }
    }
}

/// Names listed by `GET /patterns`, as plain strings or `{name}` objects.
fn listed_names(resp: &HttpResponse) -> Result<Vec<String>, String> {
    let body = resp.json()?;
    let JsonShape::Array(items) = JsonShape::of(&body) else {
        return Err("expected an array of patterns".to_string());
    };
    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            other => other.get("name").and_then(Value::as_str).map(str::to_string),
        })
        .collect())
}

async fn api_names(ctx: &SuiteContext, name: &str) -> (Verdict, Option<Vec<String>>) {
    let probe = ctx
        .http(
            name,
            Endpoint::get(api_base(ctx), "/patterns").timeout(ctx.config.timeouts.request()),
        )
        .validate(|resp: &HttpResponse| {
            let names = listed_names(resp)?;
            if names.is_empty() {
                Err("no patterns returned".to_string())
            } else {
                Ok(format!("Found {} patterns", names.len()))
            }
        });
    let (verdict, resp) = probe.execute().await;
    let names = resp
        .filter(|_| verdict.outcome == Outcome::Pass)
        .and_then(|r| listed_names(&r).ok());
    (verdict, names)
}

fn api_available(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let (verdict, _) = api_names(ctx, "Patterns API available").await;
        ctx.record_verdict("Patterns API available", verdict)?;
        Ok(())
    }
    .boxed()
}

fn directory(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let verdict = match pattern_dir(ctx) {
            Some(dir) => Verdict::pass(format!("Found at {}", dir.display()), Duration::ZERO),
            None => Verdict::skipped("Not found locally (running in container?)", Duration::ZERO),
        };
        ctx.record_verdict("Patterns directory", verdict)?;
        Ok(())
    }
    .boxed()
}

fn count(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Pattern count";
        let Some((_, names)) = installed_or_record(ctx, name)? else {
            return Ok(());
        };
        let min = ctx.config.patterns.min_count;
        let verdict = if names.len() >= min {
            Verdict::pass(format!("Found {} patterns", names.len()), Duration::ZERO)
        } else {
            Verdict::fail(format!("Found {} patterns, expected at least {min}", names.len()), Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// The API's list is authoritative; the local tree is the fallback.
fn core_patterns(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let start = Instant::now();
        let (_, from_api) = api_names(ctx, "List patterns").await;
        let (names, source) = match from_api {
            Some(names) => (names, "API"),
            None => {
                let Some((_, names)) = installed_or_record(ctx, "Core patterns present")? else {
                    return Ok(());
                };
                (names, "filesystem")
            }
        };
        for core in &ctx.config.patterns.core {
            let verdict = if names.contains(core) {
                Verdict::pass(format!("Available via {source}"), start.elapsed())
            } else {
                Verdict::fail(format!("Not listed by {source}"), start.elapsed())
            };
            ctx.record_verdict(&format!("Core pattern: {core}"), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

fn system_prompt(dir: &Path, pattern: &str) -> Option<String> {
    std::fs::read_to_string(dir.join(pattern).join("system.md")).ok()
}

fn structure(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Pattern structure";
        let Some((dir, names)) = installed_or_record(ctx, name)? else {
            return Ok(());
        };
        let sample = &names[..names.len().min(ctx.config.patterns.sample_size)];
        let broken: Vec<&str> = sample
            .iter()
            .filter(|p| system_prompt(&dir, p).map_or(true, |s| s.trim().len() <= 10))
            .map(String::as_str)
            .collect();
        let verdict = if broken.is_empty() {
            Verdict::pass(format!("{} sampled patterns have a system.md", sample.len()), Duration::ZERO)
        } else {
            Verdict::fail(format!("missing or empty system.md: {}", broken.join(", ")), Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// A prompt reads like instructions and spans more than a few lines.
fn well_formed(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    PROMPT_MARKERS.iter().any(|m| lower.contains(m)) && prompt.lines().count() > 3
}

fn content_format(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Pattern content format";
        let Some((dir, names)) = installed_or_record(ctx, name)? else {
            return Ok(());
        };
        let sample: Vec<(&str, String)> = names
            .iter()
            .filter_map(|p| system_prompt(&dir, p).map(|s| (p.as_str(), s)))
            .take(CONTENT_SAMPLE)
            .collect();
        let odd: Vec<&str> = sample
            .iter()
            .filter(|(_, prompt)| !well_formed(prompt))
            .map(|(p, _)| *p)
            .collect();
        let verdict = if sample.is_empty() {
            Verdict::skipped("No system prompts to sample", Duration::ZERO)
        } else if odd.is_empty() {
            Verdict::pass(format!("{} sampled prompts well-formed", sample.len()), Duration::ZERO)
        } else {
            Verdict::fail(format!("unusual format: {}", odd.join(", ")), Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// Names must be lowercase, not hidden, and unique ignoring case.
fn naming_problems(names: &[String]) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for name in names {
        if name.starts_with('.') {
            problems.push(format!("{name} is hidden"));
        } else if name.chars().any(char::is_uppercase) {
            problems.push(format!("{name} is not lowercase"));
        }
        *seen.entry(name.to_lowercase()).or_default() += 1;
    }
    problems.extend(
        seen.into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, n)| format!("{name} appears {n} times")),
    );
    problems
}

fn naming(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Pattern naming";
        let Some((_, names)) = installed_or_record(ctx, name)? else {
            return Ok(());
        };
        let problems = naming_problems(&names);
        let verdict = if problems.is_empty() {
            Verdict::pass(format!("{} names follow convention", names.len()), Duration::ZERO)
        } else {
            Verdict::fail(problems.join("; "), Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

fn execution(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let body = json!({
            "input": "Artificial intelligence is transforming how we work and live.",
            "pattern": DEFAULT_PATTERN,
            "stream": false,
        });
        let probe = ctx
            .http(
                format!("Pattern execution: {DEFAULT_PATTERN}"),
                Endpoint::post_json(api_base(ctx), "/chat", body).timeout(ctx.config.timeouts.chat()),
            )
            .validate(text_at_least(10));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::probes::testutil::{serve, unused_base};
    use crate::report::{Console, SuiteReport};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    const PROMPT: &str = "# IDENTITY\nYou are an expert summarizer.\n# STEPS\nRead it.\n# OUTPUT\nBullets.\n";

    fn write_pattern(root: &Path, name: &str, prompt: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("system.md"), prompt).unwrap();
    }

    fn ctx_for(api: String, dirs: Vec<PathBuf>) -> SuiteContext {
        let mut config = HarnessConfig::default();
        config.targets.api_base = api;
        config.patterns.dirs = dirs;
        config.patterns.min_count = 3;
        config.patterns.core = vec!["summarize".to_string(), "explain_code".to_string()];
        config.timeouts.request_secs = 2;
        config.timeouts.chat_secs = 2;
        SuiteContext::new(config, Console::silent())
    }

    fn outcome_of(report: &SuiteReport, name: &str) -> Option<Outcome> {
        report
            .records
            .records()
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.outcome())
    }

    #[tokio::test]
    async fn test_library_on_disk_and_via_api() {
        let root = tempfile::tempdir().unwrap();
        for name in ["summarize", "explain_code", "extract_wisdom"] {
            write_pattern(root.path(), name, PROMPT);
        }
        let api = serve(
            Router::new()
                .route("/patterns", get(|| async { Json(json!(["summarize", "extract_wisdom"])) }))
                .route("/chat", post(|| async { "A short summary of the input." })),
        )
        .await;
        let missing = root.path().join("nowhere");
        let report = suite().run(&ctx_for(api, vec![missing, root.path().to_path_buf()])).await;

        assert_eq!(outcome_of(&report, "Patterns directory"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Pattern count"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Core pattern: summarize"), Some(Outcome::Pass));
        // The API list wins over the tree, and it omits explain_code.
        assert_eq!(outcome_of(&report, "Core pattern: explain_code"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Pattern structure"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Pattern content format"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Pattern naming"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Pattern execution: summarize"), Some(Outcome::Pass));
        assert_eq!(report.outcome.failed, 1);
    }

    #[tokio::test]
    async fn test_broken_tree_without_api() {
        let root = tempfile::tempdir().unwrap();
        write_pattern(root.path(), "summarize", PROMPT);
        write_pattern(root.path(), "Bad_Name", "short");
        std::fs::create_dir_all(root.path().join("no_prompt")).unwrap();
        let report = suite()
            .run(&ctx_for(unused_base(), vec![root.path().to_path_buf()]))
            .await;

        assert_eq!(outcome_of(&report, "Patterns API available"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Core pattern: summarize"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Core pattern: explain_code"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Pattern structure"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Pattern content format"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Pattern naming"), Some(Outcome::Fail));
    }

    #[tokio::test]
    async fn test_no_local_tree_skips_filesystem_checks() {
        let root = tempfile::tempdir().unwrap();
        let report = suite()
            .run(&ctx_for(unused_base(), vec![root.path().join("absent")]))
            .await;
        for name in ["Patterns directory", "Pattern count", "Pattern structure", "Pattern naming"] {
            assert_eq!(outcome_of(&report, name), Some(Outcome::SkippedOptional), "{name}");
        }
    }

    #[test]
    fn test_naming_problems() {
        let names: Vec<String> = ["summarize", ".hidden", "Summarize", "ok_name"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let problems = naming_problems(&names);
        assert!(problems.contains(&".hidden is hidden".to_string()));
        assert!(problems.contains(&"Summarize is not lowercase".to_string()));
        assert!(problems.contains(&"summarize appears 2 times".to_string()));
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_well_formed_prompt() {
        assert!(well_formed(PROMPT));
        assert!(!well_formed("You are a bot."));
        assert!(!well_formed("a\nb\nc\nd\ne\n"));
    }
}
