//! The concrete suites run against a deployment. Each one is just an ordered
//! list of check units over the probe engine.

use std::fmt;

use serde_json::Value;

use crate::probes::HttpResponse;
use crate::suite::{Suite, SuiteContext};

pub mod api;
pub mod compose;
pub(crate) mod docker;
pub mod environment;
pub mod ollama;
pub mod patterns;
pub mod secrets;
pub mod security;
pub mod smoke;
pub mod strategies;
pub mod youtube;

/// Pattern used by every execution check.
pub const DEFAULT_PATTERN: &str = "summarize";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SuiteKind {
    /// Env file, required keys, installed CLIs
    Environment,
    /// docker-compose configuration and profiles
    Compose,
    /// End-to-end smoke run gated on service readiness
    Smoke,
    /// REST API endpoints, load and error handling
    Api,
    /// Ollama-compatible API surface
    Ollama,
    /// Injection hardening and secret hygiene
    Security,
    /// Installed pattern library and its API listing
    Patterns,
    /// Prompt strategies via CLI and API
    Strategies,
    /// Secrets manager CLI and project wiring
    Secrets,
    /// YouTube transcript and comment workflows
    Youtube,
}

impl SuiteKind {
    /// Order used by `run all`: cheap static checks before live services.
    pub const ALL: [SuiteKind; 10] = [
        SuiteKind::Environment,
        SuiteKind::Secrets,
        SuiteKind::Compose,
        SuiteKind::Smoke,
        SuiteKind::Api,
        SuiteKind::Patterns,
        SuiteKind::Strategies,
        SuiteKind::Ollama,
        SuiteKind::Youtube,
        SuiteKind::Security,
    ];

    pub fn build(self) -> Suite {
        match self {
            SuiteKind::Environment => environment::suite(),
            SuiteKind::Compose => compose::suite(),
            SuiteKind::Smoke => smoke::suite(),
            SuiteKind::Api => api::suite(),
            SuiteKind::Ollama => ollama::suite(),
            SuiteKind::Security => security::suite(),
            SuiteKind::Patterns => patterns::suite(),
            SuiteKind::Strategies => strategies::suite(),
            SuiteKind::Secrets => secrets::suite(),
            SuiteKind::Youtube => youtube::suite(),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SuiteKind::Environment => "env file, required keys, installed CLIs",
            SuiteKind::Compose => "docker-compose configuration and profiles",
            SuiteKind::Smoke => "end-to-end smoke run gated on service readiness",
            SuiteKind::Api => "REST API endpoints, load and error handling",
            SuiteKind::Ollama => "Ollama-compatible API surface",
            SuiteKind::Security => "injection hardening and secret hygiene",
            SuiteKind::Patterns => "installed pattern library and its API listing",
            SuiteKind::Strategies => "prompt strategies via CLI and API",
            SuiteKind::Secrets => "secrets manager CLI and project wiring",
            SuiteKind::Youtube => "YouTube transcript and comment workflows",
        }
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuiteKind::Environment => "environment",
            SuiteKind::Compose => "compose",
            SuiteKind::Smoke => "smoke",
            SuiteKind::Api => "api",
            SuiteKind::Ollama => "ollama",
            SuiteKind::Security => "security",
            SuiteKind::Patterns => "patterns",
            SuiteKind::Strategies => "strategies",
            SuiteKind::Secrets => "secrets",
            SuiteKind::Youtube => "youtube",
        };
        f.write_str(s)
    }
}

/// Program and arguments for `<command..> <extra..>`; `what` names the
/// command in the error when it is empty.
pub(crate) fn invocation(command: &[String], what: &str, extra: &[&str]) -> anyhow::Result<(String, Vec<String>)> {
    let Some((program, prefix)) = command.split_first() else {
        anyhow::bail!("{what} command is empty");
    };
    let mut args = prefix.to_vec();
    args.extend(extra.iter().map(|s| s.to_string()));
    Ok((program.clone(), args))
}

pub(crate) fn api_base(ctx: &SuiteContext) -> &str {
    &ctx.config.targets.api_base
}

pub(crate) fn ollama_base(ctx: &SuiteContext) -> &str {
    &ctx.config.targets.ollama_base
}

/// Body must carry at least `min_chars` characters of text.
pub(crate) fn text_at_least(min_chars: usize) -> impl Fn(&HttpResponse) -> Result<String, String> {
    move |resp: &HttpResponse| {
        let len = resp.body.chars().count();
        if len >= min_chars {
            Ok(format!("Response: {len} chars"))
        } else {
            Err(format!("Response too short: {len} chars"))
        }
    }
}

/// Any acceptable status other than a server error.
pub(crate) fn not_server_error(resp: &HttpResponse) -> Result<String, String> {
    if resp.status >= 500 {
        Err(format!("server error {}", resp.status))
    } else {
        Ok(format!("Status: {}", resp.status))
    }
}

/// Chat replies come back either as `{message:{content}}` or `{response}`.
pub(crate) fn chat_content(body: &Value) -> Option<&str> {
    crate::probes::shape::string_at(body, &["message", "content"])
        .or_else(|| crate::probes::shape::string_at(body, &["response"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_suite_builds_with_units() {
        for kind in SuiteKind::ALL {
            let suite = kind.build();
            assert!(!suite.unit_names().is_empty(), "{kind} has no units");
        }
    }

    #[test]
    fn test_chat_content_shapes() {
        assert_eq!(chat_content(&json!({"message": {"content": "hi"}})), Some("hi"));
        assert_eq!(chat_content(&json!({"response": "yo"})), Some("yo"));
        assert_eq!(chat_content(&json!({"choices": []})), None);
    }

    #[test]
    fn test_text_at_least() {
        let check = text_at_least(5);
        let resp = |body: &str| HttpResponse::new(200, body);
        assert!(check(&resp("hello world")).is_ok());
        assert_eq!(check(&resp("hi")).unwrap_err(), "Response too short: 2 chars");
    }
}
