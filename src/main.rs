use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use stackprobe::config::HarnessConfig;
use stackprobe::probes::http::is_http_url;
use stackprobe::probes::{Readiness, ReadinessWaiter};
use stackprobe::report::{Console, Formatter};
use stackprobe::suites::SuiteKind;

#[derive(Parser)]
#[command(
    name = "stackprobe",
    about = "Black-box verification harness for a containerized LLM pattern service",
    version,
    long_about = None
)]
struct Cli {
    /// TOML config file (falls back to $STACKPROBE_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the REST API base URL
    #[arg(long, global = true, env = "STACKPROBE_API_BASE")]
    api_base: Option<String>,

    /// Override the Ollama-compatible API base URL
    #[arg(long, global = true, env = "STACKPROBE_OLLAMA_BASE")]
    ollama_base: Option<String>,

    /// KEY=VALUE environment file with vendor credentials
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Disable ANSI colours
    #[arg(long, global = true)]
    no_color: bool,

    /// JSON output for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one suite, or `all` of them in order
    Run {
        #[arg(value_parser = parse_selection)]
        suite: Selection,
    },

    /// List the available suites
    List,

    /// Wait until a URL answers with a ready status
    Wait {
        url: String,

        /// Overall deadline in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Statuses that count as ready
        #[arg(long, value_delimiter = ',', default_value = "200")]
        ready: Vec<u16>,
    },
}

#[derive(Debug, Clone, Copy)]
enum Selection {
    All,
    One(SuiteKind),
}

fn parse_selection(s: &str) -> Result<Selection, String> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(Selection::All);
    }
    SuiteKind::from_str(s, true).map(Selection::One)
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = HarnessConfig::resolve(cli.config.as_deref())?;
    if let Some(url) = cli.api_base {
        config.targets.api_base = url;
    }
    if let Some(url) = cli.ollama_base {
        config.targets.ollama_base = url;
    }
    if let Some(path) = cli.env_file {
        config.environment.env_file = path;
    }
    config.validate()?;

    let color = !cli.no_color && std::io::stdout().is_terminal();
    let console = if cli.json {
        Console::silent()
    } else {
        Console::new(Formatter::new(color), false)
    };

    match cli.command {
        Commands::Run { suite } => {
            let kinds = match suite {
                Selection::All => SuiteKind::ALL.to_vec(),
                Selection::One(kind) => vec![kind],
            };
            tracing::info!(suites = kinds.len(), "starting run");

            let mut reports = Vec::with_capacity(kinds.len());
            for kind in kinds {
                let report = stackprobe::run_suite(kind, &config, console).await;
                if !cli.json {
                    println!("\n{}", console.formatter().summary(&report));
                }
                reports.push(report);
            }

            if cli.json {
                let out = match reports.as_slice() {
                    [single] => serde_json::to_string_pretty(single)?,
                    many => serde_json::to_string_pretty(many)?,
                };
                println!("{out}");
            }

            let failed = reports.iter().any(|r| !r.outcome.is_success());
            Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
        Commands::List => {
            if cli.json {
                let list: Vec<_> = SuiteKind::ALL
                    .iter()
                    .map(|k| {
                        json!({
                            "name": k.to_string(),
                            "description": k.description(),
                            "checks": k.build().unit_names(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                println!("{:<12} | Description", "Suite");
                println!("{:-<12}-|-{:-<50}", "", "");
                for kind in SuiteKind::ALL {
                    println!("{:<12} | {}", kind.to_string(), kind.description());
                }
                println!("{:<12} | every suite above, in order", "all");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Wait {
            url,
            timeout,
            ready,
        } => {
            anyhow::ensure!(is_http_url(&url), "wait URL must be http:// or https://, got {url:?}");
            anyhow::ensure!(!ready.is_empty(), "--ready needs at least one status");
            tracing::info!(%url, timeout, ?ready, "waiting for target");
            let readiness = ReadinessWaiter::new(url.as_str(), Duration::from_secs(timeout))
                .poll_interval(config.timeouts.readiness_poll())
                .attempt_timeout(config.timeouts.readiness_attempt())
                .ready_statuses(ready)
                .wait()
                .await;

            if cli.json {
                let out = match &readiness {
                    Readiness::Ready { elapsed, status } => json!({
                        "url": url,
                        "ready": true,
                        "status": status,
                        "elapsed_secs": elapsed.as_secs_f64(),
                    }),
                    Readiness::NotReady { elapsed, last_error } => json!({
                        "url": url,
                        "ready": false,
                        "last_error": last_error,
                        "elapsed_secs": elapsed.as_secs_f64(),
                    }),
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                match &readiness {
                    Readiness::Ready { elapsed, status } => println!(
                        "{url} ready after {:.1}s (status {status})",
                        elapsed.as_secs_f64()
                    ),
                    Readiness::NotReady { elapsed, last_error } => println!(
                        "{url} not ready after {:.1}s: {}",
                        elapsed.as_secs_f64(),
                        last_error.as_deref().unwrap_or("no response")
                    ),
                }
            }
            Ok(if readiness.is_ready() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
