//! Ollama-compatible API suite (patterns exposed as models).
//!
//! The Ollama surface is an optional deployment profile, so every probe here
//! treats an unreachable target as `SkippedOptional`.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};

use super::{api_base, chat_content, not_server_error, ollama_base, DEFAULT_PATTERN};
use crate::probes::shape::{json_lines, JsonShape};
use crate::probes::{ConcurrencyProbe, Endpoint, HttpProbe, HttpResponse, TimingProbe, Verdict};
use crate::results::Outcome;
use crate::suite::{CheckFuture, Suite, SuiteContext};

const MODEL_TAG: &str = ":latest";

const COMMON_PATTERNS: [&str; 5] = ["summarize", "analyze_code", "explain_code", "extract_wisdom", "improve_writing"];

/// How many of [`COMMON_PATTERNS`] must be exposed as models.
const COMMON_REQUIRED: usize = 3;

pub fn suite() -> Suite {
    Suite::new("Ollama Integration")
        .section("Ollama API Connection")
        .check("GET /api/version", version)
        .section("Pattern-as-Model Listing")
        .check("GET /api/tags", tags)
        .check("Common patterns available", common_patterns)
        .section("Ollama Chat Endpoint")
        .check("POST /api/chat (basic)", chat_basic)
        .check("POST /api/chat (streaming)", chat_streaming)
        .check("POST /api/chat (with context)", chat_with_context)
        .section("Error Handling")
        .check("Unknown model", unknown_model)
        .section("Performance")
        .check("Chat response times", response_times)
        .check("Concurrent tags requests", concurrent_tags)
        .section("Fabric vs Ollama")
        .check("Fabric vs Ollama", comparison)
}

fn get(ctx: &SuiteContext, name: &str, path: &str) -> HttpProbe {
    ctx.http(
        name,
        Endpoint::get(ollama_base(ctx), path).timeout(ctx.config.timeouts.request()),
    )
    .optional_dependency()
}

fn version(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = get(ctx, "GET /api/version", "/api/version").validate(|resp: &HttpResponse| {
            let body = resp.json()?;
            match body.get("version").and_then(Value::as_str) {
                Some(v) => Ok(format!("Version: {v}")),
                None => Err("missing 'version' string".to_string()),
            }
        });
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

/// Model names listed under `models[].name`.
fn model_names(resp: &HttpResponse) -> Result<Vec<String>, String> {
    let body = resp.json()?;
    let models = match body.get("models").map(JsonShape::of) {
        Some(JsonShape::Array(models)) => models,
        Some(other) => return Err(format!("'models' is {}, expected array", other.kind())),
        None => return Err("missing 'models' key".to_string()),
    };
    models
        .iter()
        .map(|m| {
            m.get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| "model entry without 'name'".to_string())
        })
        .collect()
}

/// Every listed model follows the `name:latest` convention.
fn naming_convention(names: &[String]) -> Result<String, String> {
    let invalid: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| !n.ends_with(MODEL_TAG))
        .collect();
    if invalid.is_empty() {
        Ok(format!("Valid: {}, Invalid: 0", names.len()))
    } else {
        Err(format!(
            "Valid: {}, Invalid: {} ({})",
            names.len() - invalid.len(),
            invalid.len(),
            invalid.join(", ")
        ))
    }
}

fn tags(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = get(ctx, "GET /api/tags", "/api/tags").validate(|resp: &HttpResponse| {
            let names = model_names(resp)?;
            if names.is_empty() {
                Err("no patterns exposed as models".to_string())
            } else {
                Ok(format!("Found {} patterns as models", names.len()))
            }
        });
        let (verdict, resp) = probe.execute().await;
        let duration = verdict.duration;
        let listed = ctx.record_verdict("GET /api/tags", verdict)?;
        let Some(resp) = resp.filter(|_| listed == Outcome::Pass) else {
            return Ok(());
        };

        let naming = match model_names(&resp).and_then(|names| naming_convention(&names)) {
            Ok(msg) => Verdict::pass(msg, duration),
            Err(msg) => Verdict::fail(msg, duration),
        };
        ctx.record_verdict("Pattern naming convention", naming)?;
        Ok(())
    }
    .boxed()
}

fn common_patterns(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = get(ctx, "Common patterns available", "/api/tags").validate(|resp: &HttpResponse| {
            let names = model_names(resp)?;
            let found = common_found(&names);
            if found.len() >= COMMON_REQUIRED {
                Ok(format!("Found {}/{}: {}", found.len(), COMMON_PATTERNS.len(), found.join(", ")))
            } else {
                Err(format!("Only {}/{} common patterns found", found.len(), COMMON_PATTERNS.len()))
            }
        });
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn common_found(names: &[String]) -> Vec<&'static str> {
    COMMON_PATTERNS
        .iter()
        .copied()
        .filter(|p| names.iter().any(|n| n == &format!("{p}{MODEL_TAG}")))
        .collect()
}

fn chat(ctx: &SuiteContext, name: &str, messages: Value, stream: bool) -> HttpProbe {
    let body = json!({
        "model": format!("{DEFAULT_PATTERN}{MODEL_TAG}"),
        "messages": messages,
        "stream": stream,
    });
    ctx.http(
        name,
        Endpoint::post_json(ollama_base(ctx), "/api/chat", body).timeout(ctx.config.timeouts.chat()),
    )
    .optional_dependency()
}

fn chat_basic(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let model = format!("{DEFAULT_PATTERN}{MODEL_TAG}");
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": "Test message for Ollama integration" }],
            "stream": false,
        });
        let probe = ctx.http(
            "POST /api/chat (basic)",
            Endpoint::post_json(ollama_base(ctx), "/api/chat", body).timeout(ctx.config.timeouts.chat()),
        )
        .optional_dependency()
        .validate(|resp: &HttpResponse| {
            let body = resp.json()?;
            chat_content(&body)
                .map(|c| format!("Response: {} chars", c.chars().count()))
                .ok_or_else(|| "invalid response structure".to_string())
        });
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

/// An unknown model may be rejected any way the server likes, short of a 5xx.
fn unknown_model(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let body = json!({
            "model": "nonexistent_pattern_xyz:latest",
            "messages": [{ "role": "user", "content": "Test" }],
            "stream": false,
        });
        let probe = ctx.http(
            "Invalid model error",
            Endpoint::post_json(ollama_base(ctx), "/api/chat", body)
                .timeout(ctx.config.timeouts.request())
                .expect_status(200..500),
        )
        .optional_dependency()
        .validate(not_server_error);
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn chat_streaming(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let messages = json!([{ "role": "user", "content": "Test streaming" }]);
        let probe = chat(ctx, "POST /api/chat (streaming)", messages, true).validate(|resp: &HttpResponse| {
            match json_lines(&resp.body).len() {
                0 => Err("no chunks received".to_string()),
                n => Ok(format!("Received {n} chunks")),
            }
        });
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn chat_with_context(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let messages = json!([
            { "role": "user", "content": "What is 2+2?" },
            { "role": "assistant", "content": "4" },
            { "role": "user", "content": "What about 3+3?" },
        ]);
        let probe = chat(ctx, "POST /api/chat (with context)", messages, false).validate(|resp: &HttpResponse| {
            let body = resp.json()?;
            chat_content(&body)
                .map(|_| "Multi-turn conversation handled".to_string())
                .ok_or_else(|| "invalid response structure".to_string())
        });
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

/// Mean chat latency over several samples. A first request decides whether
/// Ollama is there at all.
fn response_times(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Chat response times";
        let messages = json!([{ "role": "user", "content": "Quick test" }]);
        let probe = chat(ctx, name, messages, false);
        let (first, _) = probe.execute().await;
        if first.outcome == Outcome::SkippedOptional {
            ctx.record_verdict(name, first)?;
            return Ok(());
        }

        let load = &ctx.config.load;
        let timing = TimingProbe::new(name, Arc::new(probe), load.chat_samples, ctx.config.timeouts.chat())
            .max_mean(load.max_chat_mean());
        ctx.check(&timing).await?;
        Ok(())
    }
    .boxed()
}

fn concurrent_tags(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let n = ctx.config.load.concurrency;
        let probe = Arc::new(get(ctx, "GET /api/tags", "/api/tags"));
        let burst = ConcurrencyProbe::new(format!("Concurrent requests ({n}x)"), probe, n);
        ctx.check(&burst).await?;
        Ok(())
    }
    .boxed()
}

/// The same input through both surfaces must produce an answer on each.
fn comparison(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Fabric vs Ollama";
        let input = "Explain what Docker is in one sentence";
        let ollama = chat(ctx, name, json!([{ "role": "user", "content": input }]), false);
        let (verdict, resp) = ollama.execute().await;
        if verdict.outcome == Outcome::SkippedOptional {
            ctx.record_verdict(name, verdict)?;
            return Ok(());
        }
        let ollama_chars = resp
            .filter(|_| verdict.outcome == Outcome::Pass)
            .and_then(|r| r.json().ok())
            .and_then(|body| chat_content(&body).map(|c| c.trim().chars().count()))
            .unwrap_or(0);

        let fabric = ctx.http(
            name,
            Endpoint::post_json(
                api_base(ctx),
                "/chat",
                json!({ "input": input, "pattern": DEFAULT_PATTERN, "stream": false }),
            )
            .timeout(ctx.config.timeouts.chat()),
        );
        let (fabric_verdict, fabric_resp) = fabric.execute().await;
        let fabric_chars = fabric_resp
            .filter(|_| fabric_verdict.outcome == Outcome::Pass)
            .map(|r| r.body.trim().chars().count())
            .unwrap_or(0);

        let duration = verdict.duration + fabric_verdict.duration;
        let message = format!("Fabric: {fabric_chars} chars, Ollama: {ollama_chars} chars");
        let outcome = if fabric_chars > 0 && ollama_chars > 0 {
            Verdict::pass(message, duration)
        } else {
            Verdict::fail(message, duration)
        };
        ctx.record_verdict(name, outcome)?;
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::probes::testutil::{serve, unused_base};
    use crate::report::Console;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    fn target(names: &'static [&'static str]) -> Router {
        Router::new()
            .route("/api/version", get(|| async { Json(json!({ "version": "0.1.0" })) }))
            .route(
                "/api/tags",
                get(move || async move {
                    let models: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
                    Json(json!({ "models": models }))
                }),
            )
            .route(
                "/api/chat",
                post(|Json(body): Json<Value>| async move {
                    if body["model"] == "summarize:latest" {
                        (StatusCode::OK, Json(json!({ "message": { "role": "assistant", "content": "short summary" } })))
                    } else {
                        (StatusCode::NOT_FOUND, Json(json!({ "error": "model not found" })))
                    }
                }),
            )
    }

    fn ctx_for(ollama_base: String) -> SuiteContext {
        let mut config = HarnessConfig::default();
        config.targets.ollama_base = ollama_base;
        config.targets.api_base = unused_base();
        config.timeouts.request_secs = 2;
        config.timeouts.chat_secs = 2;
        SuiteContext::new(config, Console::silent())
    }

    fn outcome_of(report: &crate::report::SuiteReport, name: &str) -> Option<Outcome> {
        report
            .records
            .records()
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.outcome())
    }

    #[tokio::test]
    async fn test_healthy_ollama_surface() {
        let base = serve(target(&["summarize:latest", "extract_wisdom:latest", "analyze_code:latest"])).await;
        let fabric = serve(Router::new().route("/chat", post(|| async { "Docker packages apps into containers." }))).await;
        let mut ctx = ctx_for(base);
        ctx.config.targets.api_base = fabric;
        let report = suite().run(&ctx).await;

        let failures: Vec<_> = report.failures().map(|r| r.name().to_string()).collect();
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
        assert_eq!(outcome_of(&report, "Pattern naming convention"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Invalid model error"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Concurrent requests (5x)"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Common patterns available"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "POST /api/chat (streaming)"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Chat response times"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Fabric vs Ollama"), Some(Outcome::Pass));
    }

    #[tokio::test]
    async fn test_too_few_common_patterns_and_missing_fabric_fail() {
        let base = serve(target(&["summarize:latest", "extract_wisdom:latest"])).await;
        let report = suite().run(&ctx_for(base)).await;
        assert_eq!(outcome_of(&report, "Common patterns available"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Fabric vs Ollama"), Some(Outcome::Fail));
    }

    #[test]
    fn test_common_found_needs_latest_tag() {
        let names = vec!["summarize:latest".to_string(), "explain_code".to_string()];
        assert_eq!(common_found(&names), vec!["summarize"]);
    }

    #[tokio::test]
    async fn test_bad_model_names_fail_convention() {
        let base = serve(target(&["summarize:latest", "extract_wisdom"])).await;
        let report = suite().run(&ctx_for(base)).await;
        assert_eq!(outcome_of(&report, "GET /api/tags"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Pattern naming convention"), Some(Outcome::Fail));
        assert_eq!(report.outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_absent_ollama_is_skipped() {
        let report = suite().run(&ctx_for(unused_base())).await;
        assert_eq!(report.outcome.failed, 0);
        assert_eq!(report.outcome.skipped, report.outcome.total);
        assert_eq!(report.outcome.exit_code(), 0);
        assert_eq!(outcome_of(&report, "Pattern naming convention"), None);
        assert_eq!(outcome_of(&report, "Chat response times"), Some(Outcome::SkippedOptional));
        assert_eq!(outcome_of(&report, "Fabric vs Ollama"), Some(Outcome::SkippedOptional));
    }

    #[test]
    fn test_naming_convention() {
        let names = vec!["a:latest".to_string(), "b".to_string()];
        assert_eq!(naming_convention(&names).unwrap_err(), "Valid: 1, Invalid: 1 (b)");
        assert!(naming_convention(&names[..1]).is_ok());
    }
}
