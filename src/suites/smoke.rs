//! End-to-end smoke suite, gated on the services actually being up.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::json;

use super::{api_base, text_at_least, DEFAULT_PATTERN};
use crate::config::EnvFile;
use crate::probes::process::{installed, ProcessCheck};
use crate::probes::shape::{non_empty_array, object_or_array};
use crate::probes::{Endpoint, HttpProbe, HttpResponse, Readiness, ReadinessWaiter, TimingProbe, Verdict};
use crate::results::Outcome;
use crate::suite::{Abort, CheckFuture, Suite, SuiteContext};

pub fn suite() -> Suite {
    Suite::new("End-to-End Smoke")
        .check("API readiness", api_ready)
        .section("API")
        .check("API health", health)
        .check("List patterns", patterns)
        .check("List models", models)
        .check("API response time", response_time)
        .section("Pattern Execution")
        .check("Simple pattern execution", simple_pattern)
        .check("Pattern with code input", pattern_with_code)
        .check("YouTube transcript integration", youtube_transcript)
        .check("YouTube comments integration", youtube_comments)
        .section("Vendor Configuration")
        .check("Multiple vendors configured", multiple_vendors)
        .section("Web UIs")
        .check("Svelte UI", svelte_ui)
        .check("Streamlit UI", streamlit_ui)
}

fn waiter(ctx: &SuiteContext, url: String, deadline: std::time::Duration) -> ReadinessWaiter {
    let t = &ctx.config.timeouts;
    ReadinessWaiter::new(url, deadline)
        .poll_interval(t.readiness_poll())
        .attempt_timeout(t.readiness_attempt())
        .ready_statuses([200, 404])
}

/// Nothing else in this suite is meaningful without the API.
fn api_ready(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let deadline = ctx.config.timeouts.readiness();
        ctx.console().note("Waiting for API to be ready...");
        match waiter(ctx, format!("{}/health", api_base(ctx)), deadline).wait().await {
            Readiness::Ready { elapsed, .. } => {
                let msg = format!("ready after {:.1}s", elapsed.as_secs_f64());
                ctx.record_verdict("API readiness", Verdict::pass(msg, elapsed))?;
                Ok(())
            }
            Readiness::NotReady { elapsed, .. } => Err(Abort::new(format!(
                "API not ready after {:.0}s; start the stack with `docker-compose up -d`",
                elapsed.as_secs_f64()
            ))
            .into()),
        }
    }
    .boxed()
}

fn health(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = ctx.http(
            "API health",
            Endpoint::get(api_base(ctx), "/health").timeout(ctx.config.timeouts.request()),
        );
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn patterns(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = ctx.http(
            "List patterns",
            Endpoint::get(api_base(ctx), "/patterns").timeout(ctx.config.timeouts.request()),
        )
        .validate(|resp: &HttpResponse| non_empty_array(resp, "patterns"));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn models(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = ctx.http(
            "List models",
            Endpoint::get(api_base(ctx), "/models").timeout(ctx.config.timeouts.request()),
        )
        .validate(|resp: &HttpResponse| object_or_array(resp, "models/vendors"));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn response_time(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = ctx.http(
            "API health",
            Endpoint::get(api_base(ctx), "/health").timeout(ctx.config.timeouts.request()),
        );
        let load = &ctx.config.load;
        let timing = TimingProbe::new("API response time", Arc::new(probe), load.timing_samples, load.max_latency());
        ctx.check(&timing).await?;
        Ok(())
    }
    .boxed()
}

fn simple_pattern(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let body = json!({
            "input": "The quick brown fox jumps over the lazy dog. This is a simple test sentence.",
            "pattern": DEFAULT_PATTERN,
            "stream": false,
        });
        let probe = ctx.http(
            "Simple pattern execution",
            Endpoint::post_json(api_base(ctx), "/chat", body).timeout(ctx.config.timeouts.chat()),
        )
        .validate(text_at_least(10));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn pattern_with_code(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let code = "def fibonacci(n):\n    if n <= 1:\n        return n\n    return fibonacci(n-1) + fibonacci(n-2)\n";
        let probe = ctx.http(
            "Execute 'explain_code' with code",
            Endpoint::post_json(
                api_base(ctx),
                "/chat",
                json!({ "input": code, "pattern": "explain_code", "stream": false }),
            )
            .timeout(ctx.config.timeouts.chat())
            .optional_on_404(),
        )
        .validate(text_at_least(51));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

/// The transcript route shells out to `yt`; without it the check is moot.
fn youtube_transcript(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let yt = ProcessCheck::new("yt CLI installed", "yt", ["--help"])
            .timeout(ctx.config.timeouts.command())
            .classify(installed())
            .optional_when_missing();
        if ctx.check(&yt).await? != Outcome::Pass {
            return Ok(());
        }

        let probe = ctx.http(
            "YT transcript -> Fabric pattern",
            Endpoint::post_json(
                api_base(ctx),
                "/youtube/transcript",
                json!({ "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ" }),
            )
            .timeout(ctx.config.timeouts.chat())
            .optional_on_404(),
        )
        .validate(text_at_least(1));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

const MOCK_COMMENTS: &str = "Comment 1: This video is amazing! Very informative.
Comment 2: Great explanation of the concepts.
Comment 3: Thanks for sharing this knowledge.
Comment 4: The examples really helped me understand.
Comment 5: Would love to see a follow-up video.
Comment 6: Clear and concise, well done.
Comment 7: I learned a lot from this.
Comment 8: The pacing was perfect.
Comment 9: Subscribed after watching this.
Comment 10: Best tutorial on this topic so far.
";

/// Comments fetched by the pattern CLI are summarized the same way any input
/// is; a fixed set stands in for a live fetch.
fn youtube_comments(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let body = json!({ "input": MOCK_COMMENTS, "pattern": DEFAULT_PATTERN, "stream": false });
        let probe = ctx
            .http(
                "YT comments -> Fabric pattern",
                Endpoint::post_json(api_base(ctx), "/chat", body).timeout(ctx.config.timeouts.chat()),
            )
            .validate(text_at_least(21));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn multiple_vendors(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Multiple vendors configured";
        let loaded;
        let env = match ctx.env() {
            Some(env) => env,
            None => match EnvFile::load(&ctx.config.environment.env_file) {
                Ok(env) => {
                    loaded = env;
                    &loaded
                }
                Err(e) => {
                    ctx.record_verdict(name, Verdict::skipped(e.to_string(), Duration::ZERO))?;
                    return Ok(());
                }
            },
        };
        let configured: Vec<&str> = ctx
            .config
            .environment
            .vendor_keys
            .iter()
            .map(String::as_str)
            .filter(|k| env.is_set(k))
            .collect();
        let verdict = if configured.len() >= 2 {
            Verdict::pass(format!("Vendors: {}", configured.join(", ")), Duration::ZERO)
        } else {
            Verdict::fail(format!("Only {} vendor(s)", configured.len()), Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

fn html_page(resp: &HttpResponse) -> Result<String, String> {
    let lower = resp.body.to_lowercase();
    if lower.contains("<html") || lower.contains("<!doctype") {
        Ok(format!("Page size: {} bytes", resp.body.len()))
    } else {
        Err("No HTML content found".to_string())
    }
}

/// Wait for a UI; a UI that never comes up is recorded as skipped, not passed.
async fn ui_check(ctx: &SuiteContext, name: &str, ready_url: String, page: HttpProbe) -> anyhow::Result<()> {
    let readiness = waiter(ctx, ready_url, ctx.config.timeouts.ui_readiness()).wait().await;
    if let Readiness::NotReady { elapsed, .. } = readiness {
        let msg = format!("not ready after {:.0}s (not started?)", elapsed.as_secs_f64());
        ctx.record_verdict(name, Verdict::skipped(msg, elapsed))?;
        return Ok(());
    }
    ctx.check(&page).await?;
    Ok(())
}

fn svelte_ui(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let base = &ctx.config.targets.svelte_base;
        let page = ctx.http(
            "Svelte UI loads",
            Endpoint::get(base, "/").timeout(ctx.config.timeouts.request()),
        )
        .validate(html_page);
        ui_check(ctx, "Svelte UI loads", base.clone(), page).await
    }
    .boxed()
}

fn streamlit_ui(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let base = &ctx.config.targets.streamlit_base;
        let page = ctx.http(
            "Streamlit UI loads",
            Endpoint::get(base, "/").timeout(ctx.config.timeouts.request()),
        )
        .validate(html_page);
        ui_check(ctx, "Streamlit UI loads", format!("{base}/_stcore/health"), page).await
    }
    .boxed()
}
