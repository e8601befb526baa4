//! Environment suite: the env file, vendor credentials, and installed CLIs.

use std::time::{Duration, Instant};

use futures::FutureExt;

use super::api_base;
use crate::config::EnvFile;
use crate::probes::{Endpoint, ProcessCheck, Verdict};
use crate::suite::{Abort, CheckFuture, Suite, SuiteContext};

/// Expected key prefix per vendor, with the shortest plausible length.
const KEY_FORMATS: [(&str, &str, usize); 4] = [
    ("ANTHROPIC_API_KEY", "sk-ant-", 30),
    ("OPENAI_API_KEY", "sk-", 40),
    ("GEMINI_API_KEY", "AIza", 30),
    ("GROQ_API_KEY", "gsk_", 30),
];

const KNOWN_VENDORS: [&str; 5] = ["OpenAI", "Anthropic", "Groq", "Gemini", "Ollama"];

pub fn suite() -> Suite {
    Suite::new("Environment")
        .section("Environment File")
        .check("Load env file", load_env)
        .section("API Key Validation")
        .check("Vendor API keys", vendor_keys)
        .section("Default Configuration")
        .check("Default vendor and model", defaults)
        .section("Installed Tools")
        .check("Installed CLIs", tools)
        .section("Dockerfiles")
        .check("Dockerfile syntax", dockerfiles)
        .section("Service Health")
        .check("Service health endpoints", service_health)
}

/// The env file attached to the run, or loaded from the configured path.
fn env(ctx: &SuiteContext) -> anyhow::Result<EnvFile> {
    match ctx.env() {
        Some(env) => Ok(env.clone()),
        None => Ok(EnvFile::load(&ctx.config.environment.env_file)?),
    }
}

/// Every later check reads the file, so a missing one ends the suite.
fn load_env(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let start = Instant::now();
        let env = env(ctx).map_err(|e| Abort::new(e.to_string()))?;
        let msg = format!("Loaded {} variables from {}", env.len(), env.path().display());
        ctx.record_verdict("Load env file", Verdict::pass(msg, start.elapsed()))?;
        Ok(())
    }
    .boxed()
}

fn key_format(value: &str, prefix: &str, min_len: usize) -> Result<String, String> {
    if !value.starts_with(prefix) {
        Err(format!("Invalid prefix (expected: {prefix})"))
    } else if value.len() < min_len {
        Err(format!("Key too short: {} chars", value.len()))
    } else {
        Ok(format!("Valid key (length: {})", value.len()))
    }
}

fn vendor_keys(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let env = env(ctx)?;
        let wanted = &ctx.config.environment.vendor_keys;
        let present: Vec<&str> = wanted
            .iter()
            .map(String::as_str)
            .filter(|k| env.is_set(k))
            .collect();

        let verdict = if present.is_empty() {
            Verdict::fail(format!("none of {} is set", wanted.join(", ")), Duration::ZERO)
        } else {
            Verdict::pass(format!("Configured: {}", present.join(", ")), Duration::ZERO)
        };
        ctx.record_verdict("At least one vendor API key", verdict)?;

        for key in present {
            let Some((_, prefix, min_len)) = KEY_FORMATS.iter().find(|(k, _, _)| *k == key) else {
                continue;
            };
            let value = env.get(key).unwrap_or_default();
            let verdict = match key_format(value, prefix, *min_len) {
                Ok(msg) => Verdict::pass(msg, Duration::ZERO),
                Err(msg) => Verdict::fail(msg, Duration::ZERO),
            };
            ctx.record_verdict(&format!("{key} format"), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

/// Defaults are optional, but when set they must name a known vendor.
fn defaults(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let env = env(ctx)?;
        let vendor = match env.get("DEFAULT_VENDOR").filter(|v| !v.is_empty()) {
            None => Verdict::skipped("Not configured (optional)", Duration::ZERO),
            Some(v) if KNOWN_VENDORS.contains(&v) => Verdict::pass(format!("Set to: {v}"), Duration::ZERO),
            Some(v) => Verdict::fail(format!("Unknown vendor: {v}"), Duration::ZERO),
        };
        ctx.record_verdict("DEFAULT_VENDOR", vendor)?;

        let model = match env.get("DEFAULT_MODEL").filter(|v| !v.is_empty()) {
            None => Verdict::skipped("Not configured (optional)", Duration::ZERO),
            Some(m) => Verdict::pass(format!("Set to: {m}"), Duration::ZERO),
        };
        ctx.record_verdict("DEFAULT_MODEL", model)?;
        Ok(())
    }
    .boxed()
}

fn tools(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        for tool in &ctx.config.environment.tools {
            let check = ProcessCheck::new(format!("{tool} CLI installed"), tool.as_str(), ["--version"])
                .timeout(ctx.config.timeouts.command())
                .optional_when_missing();
            ctx.check(&check).await?;
        }
        Ok(())
    }
    .boxed()
}

/// A base image and a process to run.
fn dockerfile_problems(content: &str) -> Vec<&'static str> {
    let lines: Vec<&str> = content.lines().map(str::trim_start).collect();
    let has = |prefix: &str| lines.iter().any(|l| l.starts_with(prefix));
    let mut problems = Vec::new();
    if !has("FROM ") {
        problems.push("no FROM instruction");
    }
    if !has("CMD ") && !has("ENTRYPOINT ") {
        problems.push("no CMD or ENTRYPOINT");
    }
    problems
}

fn dockerfiles(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        for rel in &ctx.config.environment.dockerfiles {
            let path = ctx.config.compose.project_dir.join(rel);
            let verdict = match std::fs::read_to_string(&path) {
                Err(_) => Verdict::fail(format!("{} not found", path.display()), Duration::ZERO),
                Ok(content) => match dockerfile_problems(&content).as_slice() {
                    [] => Verdict::pass("Valid structure", Duration::ZERO),
                    problems => Verdict::fail(problems.join(", "), Duration::ZERO),
                },
            };
            ctx.record_verdict(&format!("{} syntax", rel.display()), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

/// A service that is not running is skipped; one that answers must be healthy.
fn service_health(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let t = &ctx.config.targets;
        for (name, base, path) in [
            ("API health", api_base(ctx), "/health"),
            ("Svelte health", t.svelte_base.as_str(), "/"),
            ("Streamlit health", t.streamlit_base.as_str(), "/_stcore/health"),
        ] {
            let probe = ctx
                .http(name, Endpoint::get(base, path).timeout(ctx.config.timeouts.request()))
                .optional_dependency();
            ctx.check(&probe).await?;
        }
        Ok(())
    }
    .boxed()
}
