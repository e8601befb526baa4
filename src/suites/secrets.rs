//! Secrets manager suite: the CLI, the project scripts that export secrets
//! before containers start, and the hygiene around the generated env file.
//!
//! The manager is an optional part of the setup. A missing CLI skips the
//! CLI checks; the project wiring is still checked on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

use super::invocation;
use crate::probes::process::{failure_message, first_line, stdout_contains};
use crate::probes::{ProcessCheck, ProcessOutput, Verdict};
use crate::results::Outcome;
use crate::suite::{CheckFuture, Suite, SuiteContext};

pub fn suite() -> Suite {
    Suite::new("Secrets Manager")
        .section("CLI Installation")
        .check("Secrets CLI", cli)
        .section("Project Integration")
        .check("Project scripts", project_scripts)
        .check("Launcher exports secrets", launcher)
        .section("Export Configuration")
        .check("Export configuration", export_config)
        .section("Environment Validation")
        .check("Environment validation script", validation_script)
        .section("Security Checks")
        .check(".env in .gitignore", gitignore)
        .check("Secrets documented", documented)
}

fn project_file(ctx: &SuiteContext, rel: &std::path::Path) -> PathBuf {
    ctx.config.secrets.project_dir.join(rel)
}

fn cli_check(ctx: &SuiteContext, name: &str, extra: &[&str]) -> anyhow::Result<ProcessCheck> {
    let (program, args) = invocation(&ctx.config.secrets.cli, "secrets CLI", extra)?;
    Ok(ProcessCheck::new(name, program, args)
        .current_dir(&ctx.config.secrets.project_dir)
        .timeout(ctx.config.timeouts.command())
        .optional_when_missing())
}

/// Version, help, and login state. Nothing past `--version` runs when the
/// CLI is absent.
fn cli(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let version = cli_check(ctx, "Secrets CLI installed", &["--version"])?.classify(Arc::new(
            |out: &ProcessOutput| {
                if out.success() {
                    let v = first_line(&out.stdout);
                    let v = if v.is_empty() { first_line(&out.stderr) } else { v };
                    (Outcome::Pass, format!("Version: {v}"))
                } else {
                    (Outcome::Fail, failure_message(out))
                }
            },
        ));
        if ctx.check(&version).await? != Outcome::Pass {
            return Ok(());
        }

        let help = cli_check(ctx, "CLI help available", &["--help"])?.classify(Arc::new(|out: &ProcessOutput| {
            if out.success() && (out.stdout.contains("export") || out.stdout.contains("run")) {
                (Outcome::Pass, "Commands: export, run".to_string())
            } else {
                (Outcome::Fail, "help lists neither export nor run".to_string())
            }
        }));
        ctx.check(&help).await?;

        // Not being logged in is normal outside a developer machine.
        let login = cli_check(ctx, "CLI authenticated", &["user", "get"])?.classify(Arc::new(|out: &ProcessOutput| {
            if out.success() {
                (Outcome::Pass, "User is logged in".to_string())
            } else {
                (Outcome::SkippedOptional, "Not logged in (run: infisical login)".to_string())
            }
        }));
        ctx.check(&login).await?;
        Ok(())
    }
    .boxed()
}

/// `scripts` table of a package manifest.
fn manifest_scripts(content: &str) -> Result<serde_json::Map<String, Value>, String> {
    let manifest: Value = serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))?;
    match manifest.get("scripts") {
        Some(Value::Object(scripts)) => Ok(scripts.clone()),
        Some(_) => Err("'scripts' is not an object".to_string()),
        None => Ok(serde_json::Map::new()),
    }
}

fn project_scripts(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let cfg = &ctx.config.secrets;
        let path = project_file(ctx, &cfg.manifest);
        let name = format!("{} exists", cfg.manifest.display());
        let Ok(content) = std::fs::read_to_string(&path) else {
            ctx.record_verdict(&name, Verdict::fail("File not found", Duration::ZERO))?;
            return Ok(());
        };
        let scripts = match manifest_scripts(&content) {
            Ok(scripts) => scripts,
            Err(msg) => {
                ctx.record_verdict(&format!("{} valid JSON", cfg.manifest.display()), Verdict::fail(msg, Duration::ZERO))?;
                return Ok(());
            }
        };
        for script in &cfg.required_scripts {
            let verdict = if scripts.contains_key(script) {
                Verdict::pass("Defined", Duration::ZERO)
            } else {
                Verdict::fail(format!("Not found in {}", cfg.manifest.display()), Duration::ZERO)
            };
            ctx.record_verdict(&format!("Script: {script}"), verdict)?;
        }
        Ok(())
    }
    .boxed()
}

fn launcher_text(ctx: &SuiteContext) -> Option<String> {
    std::fs::read_to_string(project_file(ctx, &ctx.config.secrets.launcher)).ok()
}

fn launcher(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = format!("{} exports secrets", ctx.config.secrets.launcher.display());
        let verdict = match launcher_text(ctx) {
            None => Verdict::fail("Script not found", Duration::ZERO),
            Some(text) if text.contains("infisical export") => {
                Verdict::pass("Exports secrets before Docker start", Duration::ZERO)
            }
            Some(_) => Verdict::fail("No `infisical export` found", Duration::ZERO),
        };
        ctx.record_verdict(&name, verdict)?;
        Ok(())
    }
    .boxed()
}

fn export_config(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let export = cli_check(ctx, "Export command available", &["export", "--help"])?.classify(stdout_contains("--env"));
        ctx.check(&export).await?;

        let cfg = &ctx.config.secrets;
        let verdict = match cfg.project_configs.iter().find(|p| project_file(ctx, p).is_file()) {
            Some(found) => Verdict::pass(format!("{} exists", found.display()), Duration::ZERO),
            None => Verdict::skipped("No config file (run: pnpm secrets:init)", Duration::ZERO),
        };
        ctx.record_verdict("Project config", verdict)?;
        Ok(())
    }
    .boxed()
}

fn validation_script(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let cfg = &ctx.config.secrets;
        let name = format!("{} exists", cfg.validator.display());
        if !project_file(ctx, &cfg.validator).is_file() {
            ctx.record_verdict(&name, Verdict::fail("Script not found", Duration::ZERO))?;
            return Ok(());
        }
        ctx.record_verdict(&name, Verdict::pass("Environment validation available", Duration::ZERO))?;

        let Some(text) = launcher_text(ctx) else {
            return Ok(());
        };
        let stem = cfg
            .validator
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let verdict = if !stem.is_empty() && text.contains(&stem) {
            Verdict::pass("Validates before Docker start", Duration::ZERO)
        } else {
            Verdict::fail("Not integrated", Duration::ZERO)
        };
        ctx.record_verdict(&format!("Validation in {}", cfg.launcher.display()), verdict)?;
        Ok(())
    }
    .boxed()
}

/// A `.gitignore` line covering `.env` itself.
fn ignores_env(gitignore: &str) -> bool {
    gitignore
        .lines()
        .map(str::trim)
        .any(|l| matches!(l, ".env" | "/.env" | ".env*" | "*.env" | ".env.*"))
}

fn gitignore(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let path = ctx.config.secrets.project_dir.join(".gitignore");
        let verdict = match std::fs::read_to_string(&path) {
            Err(_) => Verdict::skipped("No .gitignore in project", Duration::ZERO),
            Ok(text) if ignores_env(&text) => Verdict::pass("Secrets won't be committed", Duration::ZERO),
            Ok(_) => Verdict::fail(".env might be committed", Duration::ZERO),
        };
        ctx.record_verdict(".env in .gitignore", verdict)?;
        Ok(())
    }
    .boxed()
}

fn documented(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let readme = ctx.config.secrets.project_dir.join("README.md");
        let mentions = std::fs::read_to_string(readme)
            .map(|t| t.to_lowercase())
            .is_ok_and(|t| ["infisical", "secret", "environment"].iter().any(|w| t.contains(w)));
        let verdict = if mentions {
            Verdict::pass("README mentions secrets", Duration::ZERO)
        } else {
            Verdict::skipped("Consider documenting required secrets in README", Duration::ZERO)
        };
        ctx.record_verdict("Secrets documented", verdict)?;
        Ok(())
    }
    .boxed()
}
