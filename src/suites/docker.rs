//! Docker CLI plumbing shared by the compose and security suites.

use regex_automata::meta::{BuildError, Regex};
use std::collections::BTreeSet;

use crate::probes::process::run_command;
use crate::probes::ProcessOutput;
use crate::suite::SuiteContext;

/// Program and arguments for `<docker command> <extra..>`.
pub(crate) fn invocation(ctx: &SuiteContext, extra: &[&str]) -> anyhow::Result<(String, Vec<String>)> {
    super::invocation(&ctx.config.compose.docker, "docker", extra)
}

pub(crate) async fn run(ctx: &SuiteContext, extra: &[&str]) -> anyhow::Result<ProcessOutput> {
    let (program, args) = invocation(ctx, extra)?;
    Ok(run_command(&program, &args, None, ctx.config.timeouts.command()).await?)
}

/// `None` when `container` is running, otherwise why it cannot be inspected.
pub(crate) async fn unavailable(ctx: &SuiteContext, container: &str) -> anyhow::Result<Option<String>> {
    let out = run(ctx, &["inspect", "-f", "{{.State.Running}}", container]).await?;
    Ok(if out.not_found {
        Some("docker not installed (optional)".to_string())
    } else if out.success() && out.stdout.trim() == "true" {
        None
    } else {
        Some(format!("container {container} not running"))
    })
}

/// Non-blank lines of a listing such as `docker ps --format '{{.Names}}'`.
pub(crate) fn listed(out: &ProcessOutput) -> Vec<&str> {
    out.stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Vendor key shapes as issued to live accounts.
pub(crate) const LIVE_KEY_PATTERNS: [&str; 4] = [
    r"sk-ant-[A-Za-z0-9_-]{90,}",
    r"sk-(?:proj-)?[A-Za-z0-9_-]{48,}",
    r"gsk_[A-Za-z0-9]{52,}",
    r"AIza[A-Za-z0-9_-]{35,}",
];

pub(crate) fn compile(patterns: &[&str]) -> Result<Vec<Regex>, BuildError> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

/// Distinct substrings of `text` matching any pattern.
pub(crate) fn find_keys(text: &str, patterns: &[Regex]) -> BTreeSet<String> {
    patterns
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| text[m.range()].to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_keys_deduplicates_overlapping_shapes() {
        let patterns = compile(&LIVE_KEY_PATTERNS).unwrap();
        let anthropic = format!("sk-ant-api03-{}", "a".repeat(95));
        let log = format!("boot ok\nusing key {anthropic}\nusing key {anthropic}\n");
        let found = find_keys(&log, &patterns);
        // The generic `sk-` shape also matches inside the Anthropic key.
        assert!(found.contains(&anthropic));
        assert!(found.len() <= 2);

        assert!(find_keys("OPENAI_API_KEY=sk-your-key-here", &patterns).is_empty());
        let groq = format!("gsk_{}", "Z".repeat(52));
        assert_eq!(find_keys(&groq, &patterns).len(), 1);
    }

    #[test]
    fn test_listed_skips_blank_lines() {
        let out = ProcessOutput {
            stdout: "fabric-api\n\n  fabric-web-svelte \n".to_string(),
            exit_code: Some(0),
            ..ProcessOutput::default()
        };
        assert_eq!(listed(&out), ["fabric-api", "fabric-web-svelte"]);
    }
}
