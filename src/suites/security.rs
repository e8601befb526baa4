//! Security suite: injection hardening on `/chat`, secret hygiene on disk,
//! in logs and in the running container, and response headers.
//!
//! Container checks need a running API container; without one (or without
//! docker) they are recorded as `SkippedOptional`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::FutureExt;
use reqwest::Method;
use serde_json::json;

use super::{api_base, docker, not_server_error, DEFAULT_PATTERN};
use crate::probes::process::failure_message;
use crate::probes::{Endpoint, HttpProbe, HttpResponse, Verdict};
use crate::suite::{CheckFuture, Suite, SuiteContext};

const SQL_PAYLOADS: [&str; 4] = [
    "'; DROP TABLE users; --",
    "1' OR '1'='1",
    "admin'--",
    "1; DELETE FROM patterns WHERE 1=1",
];

const XSS_PAYLOADS: [&str; 4] = [
    "<script>alert('XSS')</script>",
    "<img src=x onerror=alert('XSS')>",
    "javascript:alert('XSS')",
    "<iframe src='javascript:alert(1)'>",
];

const COMMAND_PAYLOADS: [&str; 4] = ["; ls -la", "| cat /etc/passwd", "`whoami`", "$(rm -rf /)"];

const TRAVERSAL_PAYLOADS: [&str; 3] = [
    "../../../etc/passwd",
    "..\\..\\..\\windows\\system32",
    "....//....//....//etc/passwd",
];

/// First line of `/etc/passwd`; seeing it means a file was served.
const PASSWD_MARKER: &str = "root:x:0:0";

const RATE_LIMIT_REQUESTS: usize = 20;

/// Project-scoped key shapes. Template placeholders never look like these.
const TEMPLATE_KEY_PATTERNS: [&str; 2] = [r"sk-ant-api\d*-[A-Za-z0-9_-]{90,}", r"sk-proj-[A-Za-z0-9_-]{48,}"];

const LOG_TAIL_LINES: &str = "1000";

pub fn suite() -> Suite {
    Suite::new("Security")
        .section("API Key Protection")
        .check("API keys not in container logs", keys_not_in_logs)
        .check("Secrets not in API responses", secrets_not_echoed)
        .check("Env file permissions", env_file_permissions)
        .section("Input Sanitization")
        .check("SQL injection protection", sql_injection)
        .check("XSS protection", xss)
        .check("Command injection protection", command_injection)
        .check("Path traversal protection", path_traversal)
        .section("Secret Handling")
        .check("Secrets not in docker-compose", compose_secrets)
        .check("Env template has no real secrets", env_template)
        .section("Rate Limiting")
        .check("Rate limiting check", rate_limiting)
        .section("Docker Security")
        .check("Containers run as non-root", non_root)
        .check("Sensitive files not in image", no_baked_env)
        .section("HTTP Security Headers")
        .check("CORS headers check", cors)
}

fn chat_probe(ctx: &SuiteContext, input: &str, pattern: &str) -> HttpProbe {
    ctx.http(
        "payload",
        Endpoint::post_json(
            api_base(ctx),
            "/chat",
            json!({ "input": input, "pattern": pattern, "stream": false }),
        )
        .timeout(ctx.config.timeouts.request())
        .expect_status(200..500),
    )
}

/// Send every payload and fold the verdicts into one record.
async fn sweep<V>(ctx: &SuiteContext, name: &str, probes: Vec<(&str, HttpProbe)>, validator: V) -> anyhow::Result<()>
where
    V: Fn(&HttpResponse) -> Result<String, String> + Clone + Send + Sync + 'static,
{
    let start = Instant::now();
    let total = probes.len();
    let mut failures = Vec::new();
    for (payload, probe) in probes {
        let verdict = probe.validate(validator.clone()).execute().await.0;
        if verdict.outcome.is_fail() {
            failures.push(format!("{payload:?}: {}", verdict.message));
        }
    }
    let verdict = if failures.is_empty() {
        Verdict::pass(format!("All {total} payloads handled safely"), start.elapsed())
    } else {
        Verdict::fail(
            format!("{}/{total} payloads unsafe; {}", failures.len(), failures.join("; ")),
            start.elapsed(),
        )
    };
    ctx.record_verdict(name, verdict)?;
    Ok(())
}

fn input_sweep<'a>(ctx: &'a SuiteContext, name: &'static str, payloads: &'static [&'static str]) -> CheckFuture<'a> {
    async move {
        let probes = payloads
            .iter()
            .map(|p| (*p, chat_probe(ctx, p, DEFAULT_PATTERN)))
            .collect();
        sweep(ctx, name, probes, not_server_error).await
    }
    .boxed()
}

fn sql_injection(ctx: &SuiteContext) -> CheckFuture<'_> {
    input_sweep(ctx, "SQL injection protection", &SQL_PAYLOADS)
}

fn command_injection(ctx: &SuiteContext) -> CheckFuture<'_> {
    input_sweep(ctx, "Command injection protection", &COMMAND_PAYLOADS)
}

fn no_active_script(resp: &HttpResponse) -> Result<String, String> {
    not_server_error(resp)?;
    if resp.status == 200 && resp.body.to_lowercase().contains("<script>") {
        Err("active <script> tag in response".to_string())
    } else {
        Ok("sanitized".to_string())
    }
}

fn xss(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probes = XSS_PAYLOADS
            .iter()
            .map(|p| (*p, chat_probe(ctx, p, DEFAULT_PATTERN)))
            .collect();
        sweep(ctx, "XSS protection", probes, no_active_script).await
    }
    .boxed()
}

fn no_file_contents(resp: &HttpResponse) -> Result<String, String> {
    not_server_error(resp)?;
    if resp.body.contains(PASSWD_MARKER) {
        Err("response contains file contents".to_string())
    } else {
        Ok("traversal blocked".to_string())
    }
}

/// Payloads go in the pattern name, which maps to a file on the server.
fn path_traversal(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probes = TRAVERSAL_PAYLOADS
            .iter()
            .map(|p| (*p, chat_probe(ctx, "test", p)))
            .collect();
        sweep(ctx, "Path traversal protection", probes, no_file_contents).await
    }
    .boxed()
}

fn secrets_not_echoed(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Secrets not in API responses";
        let secrets: Vec<String> = match ctx.env() {
            Some(env) => env.secret_values().map(str::to_string).collect(),
            None => Vec::new(),
        };
        if secrets.is_empty() {
            ctx.record_verdict(name, Verdict::skipped("no secrets loaded from env file", Duration::ZERO))?;
            return Ok(());
        }

        let start = Instant::now();
        let mut leaks = Vec::new();
        for path in ["/health", "/patterns", "/models"] {
            let probe = ctx.http(
                path,
                Endpoint::get(api_base(ctx), path)
                    .timeout(ctx.config.timeouts.request())
                    .expect_status(200..600),
            );
            let (verdict, resp) = probe.execute().await;
            let Some(resp) = resp else {
                ctx.record_verdict(name, Verdict::fail(verdict.message, start.elapsed()))?;
                return Ok(());
            };
            if secrets.iter().any(|s| resp.body.contains(s.as_str())) {
                leaks.push(probe.endpoint().to_string());
            }
        }

        let verdict = if leaks.is_empty() {
            Verdict::pass(format!("{} secrets checked, none exposed", secrets.len()), start.elapsed())
        } else {
            Verdict::fail(format!("secret value exposed by {}", leaks.join(", ")), start.elapsed())
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

fn env_file_path(ctx: &SuiteContext) -> PathBuf {
    match ctx.env() {
        Some(env) => env.path().to_path_buf(),
        None => ctx.config.environment.env_file.clone(),
    }
}

/// Group and other permission bits must all be clear.
#[cfg(unix)]
fn check_permissions(path: &Path) -> std::io::Result<Verdict> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
    let msg = format!("Permissions: {mode:03o}");
    Ok(if mode & 0o077 == 0 {
        Verdict::pass(msg, Duration::ZERO)
    } else {
        Verdict::fail(format!("{msg} (group/other access, expected 600)"), Duration::ZERO)
    })
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> std::io::Result<Verdict> {
    Ok(Verdict::skipped("permission bits not available on this platform", Duration::ZERO))
}

fn env_file_permissions(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Env file permissions";
        let path = env_file_path(ctx);
        let verdict = if path.exists() {
            check_permissions(&path)?
        } else {
            Verdict::skipped(format!("{} not found", path.display()), Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// Compose should reference the env file, never inline the secrets it holds.
fn compose_secrets(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Secrets not in docker-compose";
        let compose = &ctx.config.compose;
        let path = compose.project_dir.join(&compose.file);
        if !path.exists() {
            ctx.record_verdict(name, Verdict::skipped(format!("{} not found", path.display()), Duration::ZERO))?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let patterns = docker::compile(&docker::LIVE_KEY_PATTERNS)?;
        let mut inlined = docker::find_keys(&content, &patterns);
        if let Some(env) = ctx.env() {
            inlined.extend(
                env.secret_values()
                    .filter(|s| content.contains(*s))
                    .map(str::to_string),
            );
        }
        let inlined = inlined.len();
        let verdict = if inlined > 0 {
            Verdict::fail(format!("Found {inlined} hardcoded secrets"), Duration::ZERO)
        } else if !content.contains("env_file:") {
            Verdict::fail("Not using env_file", Duration::ZERO)
        } else {
            Verdict::pass("Uses env_file correctly", Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// `.env.example` ships with the repository, so it may only hold placeholders.
fn env_template(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Env template has no real secrets";
        let path = ctx.config.compose.project_dir.join(".env.example");
        if !path.exists() {
            ctx.record_verdict(name, Verdict::skipped(format!("{} not found", path.display()), Duration::ZERO))?;
            return Ok(());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let found = docker::find_keys(&content, &docker::compile(&TEMPLATE_KEY_PATTERNS)?);
        let verdict = if found.is_empty() {
            Verdict::pass("Only placeholders", Duration::ZERO)
        } else {
            Verdict::fail(format!("Found {} real keys", found.len()), Duration::ZERO)
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// The API container, or `None` once `name` has been recorded as skipped.
async fn inspectable<'a>(ctx: &'a SuiteContext, name: &str) -> anyhow::Result<Option<&'a str>> {
    let container = ctx.config.compose.api_container.as_str();
    match docker::unavailable(ctx, container).await? {
        None => Ok(Some(container)),
        Some(reason) => {
            ctx.record_verdict(name, Verdict::skipped(reason, Duration::ZERO))?;
            Ok(None)
        }
    }
}

fn keys_not_in_logs(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "API keys not in container logs";
        let Some(container) = inspectable(ctx, name).await? else {
            return Ok(());
        };
        let start = Instant::now();
        let out = docker::run(ctx, &["logs", container, "--tail", LOG_TAIL_LINES]).await?;
        if !out.success() {
            let msg = format!("logs unavailable: {}", failure_message(&out));
            ctx.record_verdict(name, Verdict::skipped(msg, start.elapsed()))?;
            return Ok(());
        }
        // Containers log to both streams.
        let logs = format!("{}\n{}", out.stdout, out.stderr);
        let found = docker::find_keys(&logs, &docker::compile(&docker::LIVE_KEY_PATTERNS)?);
        let verdict = if found.is_empty() {
            Verdict::pass("No keys exposed", start.elapsed())
        } else {
            Verdict::fail(format!("Found {} exposed keys", found.len()), start.elapsed())
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

fn non_root(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Containers run as non-root";
        let Some(container) = inspectable(ctx, name).await? else {
            return Ok(());
        };
        let start = Instant::now();
        let out = docker::run(ctx, &["exec", container, "whoami"]).await?;
        let user = out.stdout.trim();
        let verdict = if !out.success() || user.is_empty() {
            Verdict::skipped(format!("cannot check: {}", failure_message(&out)), start.elapsed())
        } else if user == "root" {
            Verdict::fail("Running as: root", start.elapsed())
        } else {
            Verdict::pass(format!("Running as: {user}"), start.elapsed())
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// Env files belong in a volume or `env_file`, never in the image.
fn no_baked_env(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Sensitive files not in image";
        let Some(container) = inspectable(ctx, name).await? else {
            return Ok(());
        };
        let start = Instant::now();
        let mut baked = Vec::new();
        for path in &ctx.config.compose.image_secret_paths {
            let out = docker::run(ctx, &["exec", container, "test", "-f", path]).await?;
            if out.success() {
                baked.push(path.as_str());
            }
        }
        let verdict = if baked.is_empty() {
            Verdict::pass(".env not baked into image", start.elapsed())
        } else {
            Verdict::fail(format!("found in image: {}", baked.join(", ")), start.elapsed())
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// Informational: a local deployment may legitimately omit CORS.
fn cors(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "CORS headers check";
        let probe = ctx.http(
            name,
            Endpoint::new(Method::OPTIONS, api_base(ctx), "/chat")
                .header("Origin", ctx.config.targets.svelte_base.as_str())
                .timeout(ctx.config.timeouts.request())
                .expect_status(100..600),
        );
        let (verdict, resp) = probe.execute().await;
        let duration = verdict.duration;
        let verdict = match resp {
            None => Verdict::skipped(format!("cannot check: {}", verdict.message), duration),
            Some(resp) => match resp.header("access-control-allow-origin") {
                Some(origin) => Verdict::pass(format!("CORS configured (allow-origin: {origin})"), duration),
                None => Verdict::skipped("No CORS headers (optional for local dev)", duration),
            },
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

/// Informational: rate limiting is not required.
fn rate_limiting(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let start = Instant::now();
        let probe = ctx.http(
            "GET /health",
            Endpoint::get(api_base(ctx), "/health")
                .timeout(ctx.config.timeouts.request())
                .expect_status(200..600),
        );
        let mut limited = false;
        for _ in 0..RATE_LIMIT_REQUESTS {
            match probe.execute().await.1 {
                Some(resp) if resp.status == 429 => {
                    limited = true;
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
        let msg = if limited {
            "Rate limiting active (429 responses)"
        } else {
            "No rate limiting detected (optional feature)"
        };
        ctx.record_verdict("Rate limiting check", Verdict::pass(msg, start.elapsed()))?;
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvFile, HarnessConfig};
    use crate::probes::testutil::{serve, unused_base};
    use crate::report::{Console, SuiteReport};
    use crate::results::Outcome;
    use axum::http::StatusCode;
    use axum::routing::{get, options, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::io::Write;

    const SECRET: &str = "sk-live-abcdef123456";

    fn ctx_for(api: String, project_dir: &Path, env: Option<EnvFile>) -> SuiteContext {
        let mut config = HarnessConfig::default();
        config.targets.api_base = api;
        config.timeouts.request_secs = 2;
        config.compose.project_dir = project_dir.to_path_buf();
        config.compose.docker = vec!["stackprobe-no-such-docker".to_string()];
        config.environment.env_file = project_dir.join(".env");
        let ctx = SuiteContext::new(config, Console::silent());
        match env {
            Some(env) => ctx.with_env(env),
            None => ctx,
        }
    }

    fn outcome_of(report: &SuiteReport, name: &str) -> Option<Outcome> {
        report
            .records
            .records()
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.outcome())
    }

    fn write_env(dir: &Path, mode: u32) -> EnvFile {
        let path = dir.join(".env");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "OPENAI_API_KEY={SECRET}").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        EnvFile::load(&path).unwrap()
    }

    /// Escapes what it echoes and rejects unknown patterns.
    fn hardened() -> Router {
        Router::new()
            .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
            .route("/patterns", get(|| async { Json(json!(["summarize"])) }))
            .route("/models", get(|| async { Json(json!(["gpt-4o"])) }))
            .route(
                "/chat",
                post(|Json(body): Json<Value>| async move {
                    if body["pattern"] != "summarize" {
                        return (StatusCode::NOT_FOUND, "unknown pattern".to_string());
                    }
                    let input = body["input"].as_str().unwrap_or_default().replace('<', "&lt;");
                    (StatusCode::OK, format!("Summary of: {input}"))
                }),
            )
    }

    #[tokio::test]
    async fn test_hardened_target_passes() {
        let dir = tempfile::tempdir().unwrap();
        let env = write_env(dir.path(), 0o600);
        std::fs::write(
            dir.path().join("docker-compose.yml"),
            "services:\n  fabric-api:\n    env_file:\n      - .env\n",
        )
        .unwrap();
        let base = serve(hardened()).await;
        let report = suite().run(&ctx_for(base, dir.path(), Some(env))).await;

        let failures: Vec<_> = report
            .failures()
            .map(|r| format!("{}: {}", r.name(), r.message()))
            .collect();
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
        assert_eq!(outcome_of(&report, "Secrets not in API responses"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Secrets not in docker-compose"), Some(Outcome::Pass));
        // No OPTIONS route, so no CORS headers: informational only.
        assert_eq!(outcome_of(&report, "CORS headers check"), Some(Outcome::SkippedOptional));
        assert_eq!(
            outcome_of(&report, "API keys not in container logs"),
            Some(Outcome::SkippedOptional)
        );
    }

    /// Fake docker CLI; `@KEY@` is replaced with a live-shaped key.
    const FAKE_DOCKER: &str = r#"
case "$*" in
  "inspect -f {{.State.Running}} fabric-api") echo @RUNNING@ ;;
  "logs fabric-api --tail 1000") echo "listening on :8080"; echo "loaded key @KEY@" >&2 ;;
  "exec fabric-api whoami") echo root ;;
  "exec fabric-api test -f /app/.env") exit 1 ;;
  "exec fabric-api test -f /.env") exit 0 ;;
  *) exit 2 ;;
esac
"#;

    fn fake_docker(dir: &Path, running: bool) -> Vec<String> {
        let key = format!("sk-proj-{}", "Q".repeat(60));
        let script = dir.join("fake-docker.sh");
        let body = FAKE_DOCKER
            .replace("@KEY@", &key)
            .replace("@RUNNING@", if running { "true" } else { "false" });
        std::fs::write(&script, body).unwrap();
        vec!["sh".to_string(), script.to_string_lossy().into_owned()]
    }

    #[tokio::test]
    async fn test_container_hygiene_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env.example"),
            format!("OPENAI_API_KEY=sk-proj-{}\n", "x".repeat(50)),
        )
        .unwrap();
        let mut ctx = ctx_for(unused_base(), dir.path(), None);
        ctx.config.compose.docker = fake_docker(dir.path(), true);
        ctx.config.timeouts.command_secs = 5;
        let report = suite().run(&ctx).await;

        assert_eq!(outcome_of(&report, "API keys not in container logs"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Containers run as non-root"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Sensitive files not in image"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Env template has no real secrets"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "CORS headers check"), Some(Outcome::SkippedOptional));
        let baked = report
            .records
            .records()
            .iter()
            .find(|r| r.name() == "Sensitive files not in image")
            .map(|r| r.message().to_string());
        assert_eq!(baked.as_deref(), Some("found in image: /.env"));
    }

    #[tokio::test]
    async fn test_stopped_container_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env.example"), "OPENAI_API_KEY=sk-proj-your-key-here\n").unwrap();
        let mut ctx = ctx_for(unused_base(), dir.path(), None);
        ctx.config.compose.docker = fake_docker(dir.path(), false);
        ctx.config.timeouts.command_secs = 5;
        let report = suite().run(&ctx).await;

        for name in [
            "API keys not in container logs",
            "Containers run as non-root",
            "Sensitive files not in image",
        ] {
            assert_eq!(outcome_of(&report, name), Some(Outcome::SkippedOptional), "{name}");
        }
        assert_eq!(outcome_of(&report, "Env template has no real secrets"), Some(Outcome::Pass));
    }

    #[tokio::test]
    async fn test_cors_header_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new().route(
            "/chat",
            options(|headers: axum::http::HeaderMap| async move {
                let origin = headers
                    .get("origin")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("*")
                    .to_string();
                ([("access-control-allow-origin", origin)], "")
            }),
        );
        let base = serve(router).await;
        let report = suite().run(&ctx_for(base, dir.path(), None)).await;
        assert_eq!(outcome_of(&report, "CORS headers check"), Some(Outcome::Pass));
    }

    #[tokio::test]
    async fn test_server_errors_and_echoes_fail() {
        let dir = tempfile::tempdir().unwrap();
        let env = write_env(dir.path(), 0o644);
        let leaky = Router::new()
            .route("/health", get(|| async { format!("ok key={SECRET}") }))
            .route("/patterns", get(|| async { "[]" }))
            .route("/models", get(|| async { "[]" }))
            .route(
                "/chat",
                post(|Json(body): Json<Value>| async move {
                    let input = body["input"].as_str().unwrap_or_default().to_string();
                    if input.contains('\'') {
                        return (StatusCode::INTERNAL_SERVER_ERROR, "syntax error".to_string());
                    }
                    (StatusCode::OK, input)
                }),
            );
        let base = serve(leaky).await;
        let report = suite().run(&ctx_for(base, dir.path(), Some(env))).await;

        assert_eq!(outcome_of(&report, "SQL injection protection"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "XSS protection"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Command injection protection"), Some(Outcome::Pass));
        assert_eq!(outcome_of(&report, "Secrets not in API responses"), Some(Outcome::Fail));
        #[cfg(unix)]
        assert_eq!(outcome_of(&report, "Env file permissions"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Secrets not in docker-compose"), Some(Outcome::SkippedOptional));
        assert_eq!(outcome_of(&report, "Env template has no real secrets"), Some(Outcome::SkippedOptional));
        assert_eq!(report.outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_missing_env_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let report = suite().run(&ctx_for(unused_base(), dir.path(), None)).await;
        assert_eq!(outcome_of(&report, "Env file permissions"), Some(Outcome::SkippedOptional));
        assert_eq!(outcome_of(&report, "Secrets not in API responses"), Some(Outcome::SkippedOptional));
        // The API is down, so the payload sweeps fail rather than pass.
        assert_eq!(outcome_of(&report, "SQL injection protection"), Some(Outcome::Fail));
        assert_eq!(outcome_of(&report, "Rate limiting check"), Some(Outcome::Pass));
    }

    #[test]
    fn test_no_active_script() {
        let resp = |status, body: &str| HttpResponse::new(status, body);
        assert!(no_active_script(&resp(200, "&lt;script>")).is_ok());
        assert!(no_active_script(&resp(200, "<SCRIPT>alert(1)")).is_err());
        assert!(no_active_script(&resp(400, "<script>")).is_ok());
        assert!(no_active_script(&resp(500, "")).is_err());
    }
}
