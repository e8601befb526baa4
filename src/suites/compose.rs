//! docker-compose configuration suite: file validity, profiles and
//! services, the rendered configuration (volumes, networks, dependencies,
//! ports, environment, restart policy), the docker daemon, and what is
//! actually running.
//!
//! A missing compose or docker CLI turns the affected checks into
//! `SkippedOptional`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use futures::FutureExt;

use super::{api_base, docker};
use crate::probes::process::{failure_message, run_command};
use crate::probes::{Endpoint, ProcessCheck, ProcessOutput, Verdict};
use crate::results::Outcome;
use crate::suite::{CheckFuture, Suite, SuiteContext};

pub fn suite() -> Suite {
    Suite::new("Docker Compose")
        .section("Docker Compose Validation")
        .check("docker-compose.yml syntax", syntax)
        .section("Profile Definitions")
        .check("Profiles defined", profiles_defined)
        .section("Default Profile Services")
        .check("Default services", default_services)
        .section("Optional Profiles")
        .check("Profile services", profile_services)
        .section("Volumes & Networks")
        .check("Volumes and networks", volumes_and_networks)
        .section("Service Dependencies")
        .check("Service dependencies", dependencies)
        .section("Port Mappings")
        .check("Port mappings", port_mappings)
        .section("Environment Configuration")
        .check("Environment configuration", environment)
        .section("Restart Policies")
        .check("Restart policy", restart_policy)
        .section("Docker Daemon")
        .check("Docker daemon running", docker_daemon)
        .section("Service Isolation (Runtime)")
        .check("Runtime isolation", runtime_isolation)
}

/// Program and arguments for `<compose command> -f <file> <extra..>`.
fn invocation(ctx: &SuiteContext, extra: &[&str]) -> anyhow::Result<(String, Vec<String>)> {
    let compose = &ctx.config.compose;
    let Some((program, prefix)) = compose.command.split_first() else {
        bail!("compose command is empty");
    };
    let mut args = prefix.to_vec();
    args.push("-f".to_string());
    args.push(compose.file.to_string_lossy().into_owned());
    args.extend(extra.iter().map(|s| s.to_string()));
    Ok((program.clone(), args))
}

/// Run a compose command; records a failure or skip itself and returns
/// output only on success.
async fn compose_output(ctx: &SuiteContext, name: &str, extra: &[&str]) -> anyhow::Result<Option<ProcessOutput>> {
    let (program, args) = invocation(ctx, extra)?;
    let start = Instant::now();
    let result = run_command(
        &program,
        &args,
        Some(&ctx.config.compose.project_dir),
        ctx.config.timeouts.command(),
    )
    .await;
    let elapsed = start.elapsed();

    let verdict = match result {
        Err(e) => Verdict::fail(e.to_string(), elapsed),
        Ok(out) if out.not_found => Verdict::skipped(format!("{program} not installed (optional)"), elapsed),
        Ok(out) if !out.success() => Verdict::fail(failure_message(&out), elapsed),
        Ok(out) => return Ok(Some(out)),
    };
    ctx.record_verdict(name, verdict)?;
    Ok(None)
}

fn syntax(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let (program, args) = invocation(ctx, &["config", "--quiet"])?;
        let check = ProcessCheck::new("docker-compose.yml syntax", program, args)
            .current_dir(&ctx.config.compose.project_dir)
            .timeout(ctx.config.timeouts.command())
            .optional_when_missing();
        ctx.check(&check).await?;
        Ok(())
    }
    .boxed()
}

/// `docker-compose config` output, or `None` once `name` is recorded.
async fn rendered(ctx: &SuiteContext, name: &str) -> anyhow::Result<Option<(String, Instant)>> {
    let start = Instant::now();
    Ok(compose_output(ctx, name, &["config"]).await?.map(|out| (out.stdout, start)))
}

fn found(present: bool, pass: impl Into<String>, fail: impl Into<String>, start: Instant) -> Verdict {
    if present {
        Verdict::pass(pass, start.elapsed())
    } else {
        Verdict::fail(fail, start.elapsed())
    }
}

/// Profiles appear in the rendered config and default services need none.
fn profiles_defined(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let Some((config, start)) = rendered(ctx, "Profiles defined").await? else {
            return Ok(());
        };
        let lower = config.to_lowercase();
        for expectation in &ctx.config.compose.optional_profiles {
            let profile = &expectation.profile;
            let verdict = found(
                lower.contains(&profile.to_lowercase()),
                "Found in compose config",
                "Profile not found",
                start,
            );
            ctx.record_verdict(&format!("Profile defined: {profile}"), verdict)?;
        }
        for service in &ctx.config.compose.default_services {
            let verdict = found(config.contains(service.as_str()), "Defined", "Not found", start);
            ctx.record_verdict(&format!("Default service: {service}"), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

fn default_services(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let start = Instant::now();
        let Some(out) = compose_output(ctx, "List services", &["config", "--services"]).await? else {
            return Ok(());
        };
        let services = docker::listed(&out);
        for expected in &ctx.config.compose.default_services {
            let verdict = if services.contains(&expected.as_str()) {
                Verdict::pass("Defined", start.elapsed())
            } else {
                Verdict::fail("Not in default profile", start.elapsed())
            };
            ctx.record_verdict(&format!("Service available: {expected}"), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

fn profile_services(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        for expectation in &ctx.config.compose.optional_profiles {
            let start = Instant::now();
            let name = format!("Profile '{}' services", expectation.profile);
            let extra = ["--profile", expectation.profile.as_str(), "config", "--services"];
            let Some(out) = compose_output(ctx, &name, &extra).await? else {
                continue;
            };
            let verdict = if docker::listed(&out).contains(&expectation.service.as_str()) {
                Verdict::pass(
                    format!("{} available with --profile {}", expectation.service, expectation.profile),
                    start.elapsed(),
                )
            } else {
                Verdict::fail(
                    format!("{} not found in {} profile", expectation.service, expectation.profile),
                    start.elapsed(),
                )
            };
            ctx.record_verdict(&name, verdict)?;
        }
        Ok(())
    }
    .boxed()
}

/// Top-level YAML key present in rendered config.
fn has_section(config: &str, key: &str) -> bool {
    let header = format!("{key}:");
    config.lines().any(|l| l.trim_end() == header)
}

fn volumes_and_networks(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let Some((config, start)) = rendered(ctx, "Render compose config").await? else {
            return Ok(());
        };
        for (key, name) in [("volumes", "Volumes defined"), ("networks", "Networks defined")] {
            let verdict = found(
                has_section(&config, key),
                format!("'{key}' section present"),
                format!("no top-level '{key}' section"),
                start,
            );
            ctx.record_verdict(name, verdict)?;
        }
        let compose = &ctx.config.compose;
        for volume in &compose.volumes {
            let verdict = found(config.contains(volume.as_str()), "Defined", "Not in compose file", start);
            ctx.record_verdict(&format!("Volume defined: {volume}"), verdict)?;
        }
        for network in &compose.networks {
            let verdict = found(config.contains(network.as_str()), "Defined in compose file", "Not found", start);
            ctx.record_verdict(&format!("Network: {network}"), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

/// Web services wait on a healthy API rather than a started one.
fn dependencies(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let Some((config, start)) = rendered(ctx, "Service dependencies").await? else {
            return Ok(());
        };
        for (needle, name, pass, fail) in [
            ("depends_on:", "Dependencies configured", "Found depends_on blocks", "No depends_on found"),
            ("healthcheck:", "Health checks configured", "Found healthcheck blocks", "No healthcheck found"),
            (
                "condition: service_healthy",
                "Healthy dependency condition",
                "Services wait for health",
                "No health-based dependencies",
            ),
        ] {
            ctx.record_verdict(name, found(config.contains(needle), pass, fail, start))?;
        }
        Ok(())
    }
    .boxed()
}

/// Short (`"8080:8080"`) and long (`published: "8080"`) port syntax.
fn publishes(config: &str, port: u16) -> bool {
    [
        format!("{port}:"),
        format!("published: \"{port}\""),
        format!("published: {port}"),
        format!("target: {port}"),
    ]
    .iter()
    .any(|p| config.contains(p.as_str()))
}

fn port_mappings(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let Some((config, start)) = rendered(ctx, "Port mappings").await? else {
            return Ok(());
        };
        for expectation in &ctx.config.compose.ports {
            let port = expectation.port;
            let verdict = if publishes(&config, port) {
                Verdict::pass(format!("For {}", expectation.service), start.elapsed())
            } else if expectation.optional {
                Verdict::skipped(format!("Optional ({} not rendered)", expectation.service), start.elapsed())
            } else {
                Verdict::fail(format!("Expected for {}", expectation.service), start.elapsed())
            };
            ctx.record_verdict(&format!("Port {port} mapped"), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

fn environment(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Environment configuration";
        let Some((config, start)) = rendered(ctx, name).await? else {
            return Ok(());
        };
        let present = config.contains("env_file:") || config.contains("environment:");
        ctx.record_verdict(name, found(present, "Found env settings", "No env configuration found", start))?;
        Ok(())
    }
    .boxed()
}

fn restart_policy(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Restart policy";
        let Some((config, start)) = rendered(ctx, name).await? else {
            return Ok(());
        };
        let verdict = if !config.contains("restart:") {
            Verdict::fail("No restart policy set", start.elapsed())
        } else if config.contains("unless-stopped") || config.contains("always") {
            Verdict::pass("Configured for resilience", start.elapsed())
        } else {
            Verdict::pass("Configured (non-default)", start.elapsed())
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}

fn docker_daemon(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let (program, args) = docker::invocation(ctx, &["info"])?;
        let check = ProcessCheck::new("Docker daemon running", program, args)
            .timeout(ctx.config.timeouts.command().min(Duration::from_secs(10)))
            .classify(Arc::new(|out: &ProcessOutput| {
                if out.success() {
                    (Outcome::Pass, "docker info succeeded".to_string())
                } else {
                    (Outcome::Fail, failure_message(out))
                }
            }))
            .optional_when_missing();
        ctx.check(&check).await?;
        Ok(())
    }
    .boxed()
}

/// A listed resource matches by name or under a compose project prefix.
fn has_resource(listed: &[&str], name: &str) -> bool {
    let suffix = format!("_{name}");
    listed.iter().any(|l| *l == name || l.ends_with(&suffix))
}

/// What is running, and the volumes and networks compose created. Nothing
/// running is not a failure; the stack may simply not be started.
fn runtime_isolation(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let compose = &ctx.config.compose;
        let start = Instant::now();
        let ps = docker::run(ctx, &["ps", "--format", "{{.Names}}"]).await?;
        if ps.not_found {
            ctx.record_verdict("Stack services running", Verdict::skipped("docker not installed (optional)", start.elapsed()))?;
            return Ok(());
        }
        if !ps.success() {
            ctx.record_verdict("Stack services running", Verdict::fail(failure_message(&ps), start.elapsed()))?;
            return Ok(());
        }

        let running: Vec<&str> = docker::listed(&ps)
            .into_iter()
            .filter(|n| n.contains(compose.container_prefix.as_str()))
            .collect();
        if running.is_empty() {
            let msg = "No services found (expected if not started)";
            ctx.record_verdict("Stack services running", Verdict::skipped(msg, start.elapsed()))?;
        } else {
            let msg = format!("Found: {}", running.join(", "));
            ctx.record_verdict("Stack services running", Verdict::pass(msg, start.elapsed()))?;
            if running.iter().any(|n| n.contains("api")) {
                let probe = ctx.http(
                    "API network access",
                    Endpoint::get(api_base(ctx), "/health")
                        .timeout(ctx.config.timeouts.request())
                        .expect_status(100..600),
                );
                ctx.check(&probe).await?;
            }
        }

        for (kind, wanted) in [("volume", &compose.volumes), ("network", &compose.networks)] {
            let out = docker::run(ctx, &[kind, "ls", "--format", "{{.Name}}"]).await?;
            if !out.success() {
                let msg = format!("could not list {kind}s: {}", failure_message(&out));
                ctx.record_verdict(&format!("Docker {kind} listing"), Verdict::fail(msg, start.elapsed()))?;
                continue;
            }
            let listed = docker::listed(&out);
            for name in wanted {
                let verdict = if has_resource(&listed, name) {
                    Verdict::pass("Exists", start.elapsed())
                } else {
                    Verdict::skipped("Not found (will be created on first start)", start.elapsed())
                };
                ctx.record_verdict(&format!("Docker {kind}: {name}"), verdict)?;
            }
        }
        Ok(())
    }
    .boxed()
}
