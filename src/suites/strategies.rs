//! Prompt strategy suite: installed strategy files, `--strategy` runs
//! through the pattern CLI, and the `strategy` field of `/chat`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::{json, Value};

use super::{api_base, chat_content, invocation, ollama_base, text_at_least, DEFAULT_PATTERN};
use crate::config::expand_home;
use crate::probes::process::{failure_message, Classifier};
use crate::probes::{Endpoint, HttpProbe, HttpResponse, ProcessCheck, ProcessOutput, Verdict};
use crate::results::Outcome;
use crate::suite::{CheckFuture, Suite, SuiteContext};

const SIMPLE_INPUT: &str = "Explain what artificial intelligence is.";

const CODE_INPUT: &str = "def quicksort(arr):\n    if len(arr) <= 1:\n        return arr\n    pivot = arr[len(arr) // 2]\n    left = [x for x in arr if x < pivot]\n    right = [x for x in arr if x > pivot]\n    return quicksort(left) + [pivot] + quicksort(right)\n";

const DESIGN_INPUT: &str =
    "Design a notification system for a mobile app that must work offline and sync when reconnected.";

const REASONING_WORDS: [&str; 9] = [
    "step", "first", "second", "then", "therefore", "because", "so", "thus", "calculation",
];

const ALTERNATIVE_WORDS: [&str; 7] = ["option", "alternative", "approach", "path", "solution", "way", "method"];

pub fn suite() -> Suite {
    Suite::new("Strategies")
        .section("Strategy Installation")
        .check("Strategies installed", installed)
        .section("CLI Strategy Execution")
        .check("CLI strategy runs", cli_runs)
        .section("API Strategy Execution")
        .check("API strategy comparison", api_comparison)
        .section("Strategy-Specific Behavior")
        .check("CoT shows reasoning steps", cot_reasoning)
        .check("ToT explores alternatives", tot_alternatives)
        .section("Strategies with Different Patterns")
        .check("Strategies with code pattern", code_pattern)
        .section("Strategy Error Handling")
        .check("Invalid strategy handling", invalid_strategy)
        .check("Strategy with empty input", empty_input)
        .section("Strategy + Ollama Integration")
        .check("Ollama API + strategies", with_ollama)
}

fn installed(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let cfg = &ctx.config.strategies;
        let dir = expand_home(&cfg.dir);
        if !dir.is_dir() {
            let msg = format!("{} not found; run `fabric -S`", dir.display());
            ctx.record_verdict("Strategies directory exists", Verdict::fail(msg, Duration::ZERO))?;
            return Ok(());
        }
        ctx.record_verdict("Strategies directory exists", Verdict::pass(dir.display().to_string(), Duration::ZERO))?;

        let missing: Vec<&str> = cfg
            .names
            .iter()
            .filter(|s| !dir.join(format!("{s}.json")).is_file())
            .map(String::as_str)
            .collect();
        let found = format!("Found: {}/{}", cfg.names.len() - missing.len(), cfg.names.len());
        let verdict = if missing.is_empty() {
            Verdict::pass(found, Duration::ZERO)
        } else {
            Verdict::fail(format!("{found} - Missing: {}", missing.join(", ")), Duration::ZERO)
        };
        ctx.record_verdict("All strategies installed", verdict)?;
        Ok(())
    }
    .boxed()
}

/// Output must be more than `min` characters on a zero exit.
pub(crate) fn generated_more_than(min: usize) -> Classifier {
    Arc::new(move |out: &ProcessOutput| {
        let len = out.stdout.chars().count();
        if !out.success() {
            (Outcome::Fail, failure_message(out))
        } else if len > min {
            (Outcome::Pass, format!("Generated {len} chars"))
        } else {
            (Outcome::Fail, format!("Output too short: {len} chars"))
        }
    })
}

fn cli_runs(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let cfg = &ctx.config.strategies;
        for strategy in &cfg.cli {
            let extra = ["--strategy", strategy.as_str(), "-p", DEFAULT_PATTERN];
            let (program, args) = invocation(&cfg.fabric, "pattern CLI", &extra)?;
            let check = ProcessCheck::new(format!("CLI: fabric --strategy {strategy}"), program, args)
                .stdin(SIMPLE_INPUT)
                .timeout(ctx.config.timeouts.chat())
                .classify(generated_more_than(20))
                .optional_when_missing();
            if ctx.check(&check).await? == Outcome::SkippedOptional {
                break;
            }
        }
        Ok(())
    }
    .boxed()
}

fn strategy_chat(ctx: &SuiteContext, name: String, pattern: &str, strategy: &str, input: &str) -> HttpProbe {
    let body = json!({ "input": input, "pattern": pattern, "strategy": strategy, "stream": false });
    ctx.http(
        name,
        Endpoint::post_json(api_base(ctx), "/chat", body)
            .timeout(ctx.config.timeouts.chat())
            .optional_on_404(),
    )
}

/// One `/chat` per compared strategy, then the comparisons between them.
fn api_comparison(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let cfg = &ctx.config.strategies;
        let mut outputs: BTreeMap<&str, (String, Duration)> = BTreeMap::new();
        for strategy in &cfg.compare {
            let probe = strategy_chat(ctx, format!("API: strategy={strategy}"), DEFAULT_PATTERN, strategy, SIMPLE_INPUT)
                .validate(text_at_least(21));
            let (verdict, resp) = probe.execute().await;
            let duration = verdict.duration;
            let outcome = ctx.record_verdict(&format!("API: strategy={strategy}"), verdict)?;
            if let Some(resp) = resp.filter(|_| outcome == Outcome::Pass) {
                outputs.insert(strategy.as_str(), (resp.body, duration));
            }
        }

        if outputs.len() < 2 {
            let msg = format!("Not enough strategies responded ({})", outputs.len());
            ctx.record_verdict("Strategy outputs differ", Verdict::fail(msg, Duration::ZERO))?;
            return Ok(());
        }

        for pair in cfg.compare.windows(2) {
            let (a, b) = (pair[0].as_str(), pair[1].as_str());
            let (Some((out_a, _)), Some((out_b, _))) = (outputs.get(a), outputs.get(b)) else {
                continue;
            };
            let diff = out_a.chars().count().abs_diff(out_b.chars().count());
            let msg = format!("Length difference: {diff} chars");
            let verdict = if out_a != out_b {
                Verdict::pass(msg, Duration::ZERO)
            } else {
                Verdict::fail(format!("identical output; {msg}"), Duration::ZERO)
            };
            ctx.record_verdict(&format!("{a} vs {b} differ"), verdict)?;
        }

        let lengths: Vec<String> = outputs
            .iter()
            .map(|(s, (out, _))| format!("{s}: {}", out.chars().count()))
            .collect();
        if let Some((standard, _)) = outputs.get("standard") {
            let shortest = outputs.values().all(|(out, _)| standard.chars().count() <= out.chars().count());
            let msg = format!("Lengths: {}", lengths.join(", "));
            let verdict = if shortest {
                Verdict::pass(msg, Duration::ZERO)
            } else {
                Verdict::fail(msg, Duration::ZERO)
            };
            ctx.record_verdict("Standard is most concise", verdict)?;
        }

        let bound = cfg.max_duration();
        let times: Vec<String> = outputs
            .iter()
            .map(|(s, (_, d))| format!("{s}: {:.1}s", d.as_secs_f64()))
            .collect();
        let slowest = outputs.values().map(|(_, d)| *d).max().unwrap_or_default();
        let msg = format!("Times: {}", times.join(", "));
        let verdict = if slowest < bound {
            Verdict::pass(msg, slowest)
        } else {
            Verdict::fail(format!("{msg} (limit {}s)", bound.as_secs()), slowest)
        };
        ctx.record_verdict("Strategy performance reasonable", verdict)?;
        Ok(())
    }
    .boxed()
}

/// Body text, or the chat content when the body is a chat reply.
fn reply_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| chat_content(&v).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
        .to_lowercase()
}

fn mentions_any(words: &'static [&'static str]) -> impl Fn(&HttpResponse) -> Result<String, String> {
    move |resp| {
        let text = reply_text(&resp.body);
        match words.iter().find(|w| text.contains(*w)) {
            Some(w) => Ok(format!("mentions {w:?}")),
            None => Err(format!("none of {} found", words.join(", "))),
        }
    }
}

fn cot_reasoning(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = strategy_chat(
            ctx,
            "CoT shows reasoning steps".to_string(),
            DEFAULT_PATTERN,
            "cot",
            "Calculate 15% of 240 and explain your steps.",
        )
        .validate(mentions_any(&REASONING_WORDS));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn tot_alternatives(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let probe = strategy_chat(
            ctx,
            "ToT explores alternatives".to_string(),
            "create_design_document",
            "tot",
            DESIGN_INPUT,
        )
        .validate(mentions_any(&ALTERNATIVE_WORDS));
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn code_pattern(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        for strategy in ["standard", "cot", "reflexion"] {
            let probe = strategy_chat(ctx, format!("{strategy} + analyze_code"), "analyze_code", strategy, CODE_INPUT)
                .validate(text_at_least(51));
            ctx.check(&probe).await?;
        }
        Ok(())
    }
    .boxed()
}

fn invalid_strategy(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let body = json!({
            "input": "Test input",
            "pattern": DEFAULT_PATTERN,
            "strategy": "invalid_strategy_12345",
            "stream": false,
        });
        let probe = ctx.http(
            "Invalid strategy handling",
            Endpoint::post_json(api_base(ctx), "/chat", body)
                .timeout(ctx.config.timeouts.request())
                .expect_status([400, 404]),
        );
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

fn empty_input(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let body = json!({ "input": "", "pattern": DEFAULT_PATTERN, "strategy": "cot", "stream": false });
        let probe = ctx.http(
            "Strategy with empty input",
            Endpoint::post_json(api_base(ctx), "/chat", body)
                .timeout(ctx.config.timeouts.request())
                .expect_status([200, 400, 422]),
        );
        ctx.check(&probe).await?;
        Ok(())
    }
    .boxed()
}

/// The Ollama surface may ignore or reject `strategy`; only a reply that
/// claims success must be well-formed.
fn with_ollama(ctx: &SuiteContext) -> CheckFuture<'_> {
    async move {
        let name = "Ollama API + strategies";
        let start = Instant::now();
        let version = ctx
            .http(
                name,
                Endpoint::get(ollama_base(ctx), "/api/version").timeout(ctx.config.timeouts.request()),
            )
            .optional_dependency();
        let (verdict, _) = version.execute().await;
        if verdict.outcome != Outcome::Pass {
            ctx.record_verdict(name, Verdict::skipped("Ollama API not available (optional)", start.elapsed()))?;
            return Ok(());
        }

        let body = json!({
            "model": format!("{DEFAULT_PATTERN}:latest"),
            "messages": [{ "role": "user", "content": SIMPLE_INPUT }],
            "strategy": "cot",
            "stream": false,
        });
        let chat = ctx
            .http(
                name,
                Endpoint::post_json(ollama_base(ctx), "/api/chat", body)
                    .timeout(ctx.config.timeouts.chat())
                    .expect_status(100..600),
            )
            .optional_dependency();
        let verdict = match chat.execute().await {
            (_, Some(resp)) if resp.status == 200 => {
                match resp.json().ok().as_ref().and_then(chat_content) {
                    Some(_) => Verdict::pass("Strategy parameter accepted", start.elapsed()),
                    None => Verdict::fail("invalid response structure", start.elapsed()),
                }
            }
            (_, Some(resp)) => Verdict::skipped(
                format!("Strategy param not supported (status {}, optional)", resp.status),
                start.elapsed(),
            ),
            (v, None) => Verdict::skipped(format!("Optional: {}", v.message), start.elapsed()),
        };
        ctx.record_verdict(name, verdict)?;
        Ok(())
    }
    .boxed()
}
