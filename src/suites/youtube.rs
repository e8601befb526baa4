//! YouTube suite: transcripts and comments pulled through the real CLIs,
//! fed to the API and piped into the pattern CLI the way users chain them.
//!
//! Without the transcript CLI every transcript check is skipped; without the
//! pattern CLI the comment and workflow checks are.

use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::json;

use super::{api_base, invocation, DEFAULT_PATTERN};
use crate::config::{expand_home, EnvFile};
use crate::probes::process::{failure_message, first_line, run_command_with_input};
use crate::probes::{Endpoint, HttpResponse, ProcessOutput, Verdict};
use crate::results::Outcome;
use crate::suite::{CheckFuture, Suite, SuiteContext};

pub fn suite() -> Suite {
    Suite::new("YouTube")
        .section("Environment Checks")
        .check("yt command available", yt_available)
        .check("YouTube API key configured", api_key)
        .section("Transcript Tests")
        .check("Transcript pipeline", transcripts)
        .section("Comments Tests")
        .check("Comments pipeline", comments)
        .section("Error Handling")
        .check("Bad video URLs", bad_urls)
}

async fn run(
    ctx: &SuiteContext,
    command: &[String],
    what: &str,
    extra: &[&str],
    input: Option<&str>,
) -> anyhow::Result<ProcessOutput> {
    let (program, args) = invocation(command, what, extra)?;
    Ok(run_command_with_input(&program, &args, None, input, ctx.config.timeouts.chat()).await?)
}

async fn transcript(ctx: &SuiteContext, url: &str) -> anyhow::Result<ProcessOutput> {
    run(ctx, &ctx.config.youtube.yt, "transcript CLI", &["--transcript", url], None).await
}

fn yt_available(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let start = Instant::now();
        let out = run(ctx, &ctx.config.youtube.yt, "transcript CLI", &["--help"], None).await?;
        let verdict = if out.not_found {
            Verdict::skipped(
                "Not installed (go install github.com/danielmiessler/fabric/cmd/yt@latest)",
                start.elapsed(),
            )
        } else {
            Verdict::pass("installed", start.elapsed())
        };
        ctx.record_verdict("yt command available", verdict)?;
        Ok(())
    }
    .boxed()
}

/// The pattern CLI reads its YouTube key from its own env file.
fn api_key(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let path = expand_home(&ctx.config.youtube.fabric_env);
        let verdict = match EnvFile::load(&path) {
            Err(_) => Verdict::skipped(format!("{} not found", path.display()), Duration::ZERO),
            Ok(env) if env.is_set("YOUTUBE_API_KEY") => Verdict::pass("Key present", Duration::ZERO),
            Ok(_) => Verdict::fail(format!("Add YOUTUBE_API_KEY to {}", path.display()), Duration::ZERO),
        };
        ctx.record_verdict("YouTube API key configured", verdict)?;
        Ok(())
    }
    .boxed()
}

fn chars(s: &str) -> usize {
    s.chars().count()
}

/// A transcript is real text, not an error banner.
fn usable_transcript(out: &ProcessOutput) -> Result<String, String> {
    let text = out.stdout.trim();
    if !out.success() {
        Err(failure_message(out))
    } else if text.starts_with("ERROR") {
        Err(first_line(text).to_string())
    } else if chars(text) <= 50 {
        Err(format!("Transcript too short: {} chars", chars(text)))
    } else {
        Ok(format!("Got {} chars", chars(text)))
    }
}

fn verdict_of(result: Result<String, String>, duration: Duration) -> Verdict {
    match result {
        Ok(msg) => Verdict::pass(msg, duration),
        Err(msg) => Verdict::fail(msg, duration),
    }
}

/// Run `/chat` with `pattern` over `input`, judging the reply with `judge`.
async fn summarize_via_api<F>(ctx: &SuiteContext, name: &str, pattern: &str, input: &str, judge: F) -> anyhow::Result<()>
where
    F: Fn(&HttpResponse) -> Result<String, String> + Send + Sync + 'static,
{
    let body = json!({ "input": input, "pattern": pattern, "stream": false });
    let probe = ctx
        .http(name, Endpoint::post_json(api_base(ctx), "/chat", body).timeout(ctx.config.timeouts.chat()))
        .validate(judge);
    ctx.check(&probe).await?;
    Ok(())
}

/// Pipe `input` into the pattern CLI with `flags`; output must exceed `min`.
async fn workflow(ctx: &SuiteContext, name: &str, flags: &[&str], input: &str, min: usize) -> anyhow::Result<()> {
    let start = Instant::now();
    let out = run(ctx, &ctx.config.youtube.fabric, "pattern CLI", flags, Some(input)).await?;
    let verdict = if out.not_found {
        Verdict::skipped("pattern CLI not installed (optional)", start.elapsed())
    } else if !out.success() {
        Verdict::fail(failure_message(&out), start.elapsed())
    } else if chars(&out.stdout) > min {
        Verdict::pass(format!("Generated {} char summary", chars(&out.stdout)), start.elapsed())
    } else {
        Verdict::fail(format!("Summary too short: {} chars", chars(&out.stdout)), start.elapsed())
    };
    ctx.record_verdict(name, verdict)?;
    Ok(())
}

/// Extract once, then feed the transcript to the API and the CLI.
fn transcripts(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let yt = &ctx.config.youtube;
        let start = Instant::now();
        let out = transcript(ctx, &yt.video_url).await?;
        let elapsed = start.elapsed();
        if out.not_found {
            ctx.record_verdict("Transcript extraction (CLI)", Verdict::skipped("yt not installed (optional)", elapsed))?;
            return Ok(());
        }

        let usable = usable_transcript(&out);
        let extracted = ctx.record_verdict("Transcript extraction (CLI)", verdict_of(usable, elapsed))?;
        let bound = yt.max_transcript();
        let speed = format!("Took {:.1}s (limit {}s)", elapsed.as_secs_f64(), bound.as_secs());
        let verdict = if out.success() && elapsed < bound {
            Verdict::pass(speed, elapsed)
        } else {
            Verdict::fail(speed, elapsed)
        };
        ctx.record_verdict("Transcript extraction speed", verdict)?;
        if extracted != Outcome::Pass {
            return Ok(());
        }

        let text = out.stdout.trim().to_string();
        let limit = chars(&text);
        summarize_via_api(ctx, "Transcript → Fabric pipeline", DEFAULT_PATTERN, &text, move |resp| {
            let n = chars(&resp.body);
            let msg = format!("Transcript: {limit} → Summary: {n}");
            if n > 50 && n < limit {
                Ok(msg)
            } else {
                Err(msg)
            }
        })
        .await?;

        for pattern in &yt.patterns {
            let name = format!("Transcript → {pattern}");
            summarize_via_api(ctx, &name, pattern, &text, |resp| {
                let n = chars(&resp.body);
                if n > 30 {
                    Ok(format!("Generated {n} chars"))
                } else {
                    Err(format!("Output too short: {n} chars"))
                }
            })
            .await?;
        }

        workflow(ctx, "Workflow: yt → fabric -sp", &["-sp", DEFAULT_PATTERN], &text, 50).await
    }
    .boxed()
}

fn comments(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let yt = &ctx.config.youtube;
        let start = Instant::now();
        let out = run(ctx, &yt.fabric, "pattern CLI", &["-y", yt.video_url.as_str(), "--comments"], None).await?;
        let verdict = if out.not_found {
            Verdict::skipped("pattern CLI not installed (optional)", start.elapsed())
        } else if !out.success() {
            Verdict::fail(failure_message(&out), start.elapsed())
        } else if chars(&out.stdout) > 50 {
            Verdict::pass(format!("Got {} chars", chars(&out.stdout)), start.elapsed())
        } else {
            Verdict::fail(format!("Comments too short: {} chars", chars(&out.stdout)), start.elapsed())
        };
        if ctx.record_verdict("Comments extraction", verdict)? != Outcome::Pass {
            return Ok(());
        }

        let text = out.stdout.trim().to_string();
        summarize_via_api(ctx, "Comments → Fabric pipeline", DEFAULT_PATTERN, &text, |resp| {
            let n = chars(&resp.body);
            if n > 30 {
                Ok(format!("Summary: {n} chars"))
            } else {
                Err(format!("Summary too short: {n} chars"))
            }
        })
        .await?;

        workflow(ctx, "Workflow: comments → fabric -rp", &["-rp", DEFAULT_PATTERN], &text, 30).await
    }
    .boxed()
}

/// An invalid URL must fail; a private one only has to not hang or crash.
fn bad_urls(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let yt = &ctx.config.youtube;
        let start = Instant::now();
        let invalid = transcript(ctx, &yt.invalid_url).await?;
        if invalid.not_found {
            ctx.record_verdict("Invalid video URL", Verdict::skipped("yt not installed (optional)", start.elapsed()))?;
            return Ok(());
        }
        let verdict = if invalid.success() {
            Verdict::fail("Accepted an invalid URL", start.elapsed())
        } else {
            Verdict::pass("Correctly rejected", start.elapsed())
        };
        ctx.record_verdict("Invalid video URL", verdict)?;

        let start = Instant::now();
        let verdict = match transcript(ctx, &yt.private_url).await {
            Ok(out) if out.exit_code.is_none() => Verdict::fail("terminated by signal", start.elapsed()),
            Ok(_) => Verdict::pass("Handled gracefully", start.elapsed()),
            Err(e) => Verdict::fail(e.to_string(), start.elapsed()),
        };
        ctx.record_verdict("Private video handling", verdict)?;
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
    use axum::routing::post;
    use axum::Router;
    use std::path::Path;

    const FAKE_YT: &str = r#"
case "$2" in
  *INVALID*|*private*) echo "ERROR: video unavailable" >&2; exit 1 ;;
esac
[ "$1" = "--help" ] && exit 0
i=0
while [ $i -lt 10 ]; do printf 'never gonna give you up, never gonna let you down. '; i=$((i+1)); done
"#;

    const FAKE_FABRIC: &str = r#"
case "$1" in
  -y) printf 'great song\nclassic\nstill listening in 2026\nthe dance moves are unmatched\n' ;;
  -sp|-rp) printf 'Summary: '; cat ;;
  *) exit 2 ;;
esac
"#;

    fn script(dir: &Path, name: &str, body: &str) -> Vec<String> {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        vec!["sh".to_string(), path.to_string_lossy().into_owned()]
    }

    fn ctx_for(dir: &Path, api: String, yt: Vec<String>, fabric: Vec<String>) -> SuiteContext {
        let mut config = HarnessConfig::default();
        config.targets.api_base = api;
        config.youtube.yt = yt;
        config.youtube.fabric = fabric;
        config.youtube.fabric_env = dir.join("fabric.env");
        config.timeouts.chat_secs = 5;
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
    async fn test_scripted_clis_and_api() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fabric.env"), "YOUTUBE_API_KEY=AIzaXYZ\n").unwrap();
        let api = serve(Router::new().route(
            "/chat",
            post(|| async { "A catchy pop song about loyalty; the singer promises never to give up or let down." }),
        ))
        .await;
        let yt = script(dir.path(), "yt.sh", FAKE_YT);
        let fabric = script(dir.path(), "fabric.sh", FAKE_FABRIC);
        let report = suite().run(&ctx_for(dir.path(), api, yt, fabric)).await;

        for name in [
            "yt command available",
            "YouTube API key configured",
            "Transcript extraction (CLI)",
            "Transcript extraction speed",
            "Transcript → Fabric pipeline",
            "Transcript → summarize",
            "Transcript → extract_wisdom",
            "Workflow: yt → fabric -sp",
            "Comments extraction",
            "Comments → Fabric pipeline",
            "Workflow: comments → fabric -rp",
            "Invalid video URL",
            "Private video handling",
        ] {
            assert_eq!(outcome_of(&report, name), Some(Outcome::Pass), "{name}");
        }
        assert_eq!(report.outcome.failed, 0);
    }

    #[tokio::test]
    async fn test_missing_clis_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = |name: &str| vec![name.to_string()];
        let ctx = ctx_for(
            dir.path(),
            unused_base(),
            missing("stackprobe-no-such-yt"),
            missing("stackprobe-no-such-fabric"),
        );
        let report = suite().run(&ctx).await;
        assert_eq!(report.outcome.failed, 0);
        assert_eq!(report.outcome.skipped, report.outcome.total);
        assert_eq!(outcome_of(&report, "Transcript → Fabric pipeline"), None);
    }

    #[tokio::test]
    async fn test_key_missing_from_fabric_env_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fabric.env"), "OPENAI_API_KEY=sk-x\n").unwrap();
        let missing = vec!["stackprobe-no-such-yt".to_string()];
        let report = suite()
            .run(&ctx_for(dir.path(), unused_base(), missing.clone(), missing))
            .await;
        assert_eq!(outcome_of(&report, "YouTube API key configured"), Some(Outcome::Fail));
    }

    #[test]
    fn test_usable_transcript() {
        let out = |stdout: &str, code: i32| ProcessOutput {
            stdout: stdout.to_string(),
            exit_code: Some(code),
            ..ProcessOutput::default()
        };
        assert!(usable_transcript(&out(&"word ".repeat(20), 0)).is_ok());
        assert!(usable_transcript(&out("ERROR: no captions for this video at all, sorry about that", 0)).is_err());
        assert!(usable_transcript(&out("short", 0)).unwrap_err().contains("too short"));
        assert!(usable_transcript(&out(&"word ".repeat(20), 1)).is_err());
    }
}
