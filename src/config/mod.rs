//! Harness configuration: where the deployment lives and how patient to be
//! with it.
//!
//! Loaded from TOML with defaults for every field. The file path comes from
//! `--config`, then the `STACKPROBE_CONFIG` environment variable, then falls
//! back to compiled-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::probes::http::is_http_url;

pub mod env_file;

pub use env_file::{ConfigError, EnvFile};

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "STACKPROBE_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub patterns: PatternsConfig,
    #[serde(default)]
    pub strategies: StrategiesConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub youtube: YoutubeConfig,
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded harness configuration");
        Ok(config)
    }

    /// An explicit path must load; the environment variable may fail over to
    /// defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "{CONFIG_ENV_VAR} set but file could not be loaded, using defaults"
                ),
            }
        }
        debug!("no config file given, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Reject values no run can work with. Called once after CLI overrides
    /// are applied, before any suite is built.
    pub fn validate(&self) -> Result<()> {
        let t = &self.targets;
        for (key, url) in [
            ("api_base", &t.api_base),
            ("ollama_base", &t.ollama_base),
            ("svelte_base", &t.svelte_base),
            ("streamlit_base", &t.streamlit_base),
        ] {
            ensure!(is_http_url(url), "targets.{key} must be an http:// or https:// URL, got {url:?}");
        }
        ensure!(self.load.concurrency > 0, "load.concurrency must be at least 1");
        ensure!(self.load.timing_samples > 0, "load.timing_samples must be at least 1");
        ensure!(self.load.chat_samples > 0, "load.chat_samples must be at least 1");
        ensure!(self.timeouts.readiness_poll_secs > 0, "timeouts.readiness_poll_secs must be at least 1");
        ensure!(
            self.timeouts.readiness_attempt_secs > 0,
            "timeouts.readiness_attempt_secs must be at least 1"
        );
        ensure!(!self.compose.docker.is_empty(), "compose.docker must name a program");
        Ok(())
    }
}

/// Expand a leading `~` to `$HOME`. Paths without one are returned as is.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Base URLs of the services under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Pattern REST API.
    pub api_base: String,
    /// Ollama-compatible API.
    pub ollama_base: String,
    pub svelte_base: String,
    pub streamlit_base: String,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080".to_string(),
            ollama_base: "http://localhost:11434".to_string(),
            svelte_base: "http://localhost:5173".to_string(),
            streamlit_base: "http://localhost:8501".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// All values in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Plain GETs (health, listings).
    pub request_secs: u64,
    /// Pattern execution; these go through an LLM and are slow.
    pub chat_secs: u64,
    /// Overall readiness deadline for the API.
    pub readiness_secs: u64,
    /// Readiness deadline for each web UI.
    pub ui_readiness_secs: u64,
    pub readiness_poll_secs: u64,
    pub readiness_attempt_secs: u64,
    pub command_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_secs: 10,
            chat_secs: 60,
            readiness_secs: 30,
            ui_readiness_secs: 10,
            readiness_poll_secs: 1,
            readiness_attempt_secs: 2,
            command_secs: 60,
        }
    }
}

impl TimeoutsConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn chat(&self) -> Duration {
        Duration::from_secs(self.chat_secs)
    }

    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }

    pub fn ui_readiness(&self) -> Duration {
        Duration::from_secs(self.ui_readiness_secs)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_secs(self.readiness_poll_secs)
    }

    pub fn readiness_attempt(&self) -> Duration {
        Duration::from_secs(self.readiness_attempt_secs)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }
}

// ---------------------------------------------------------------------------
// Compose
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Compose invocation, e.g. `["docker", "compose"]` for the v2 plugin.
    pub command: Vec<String>,
    /// Docker CLI invocation used for daemon and container checks.
    pub docker: Vec<String>,
    pub file: PathBuf,
    /// Working directory for docker-compose invocations.
    pub project_dir: PathBuf,
    /// Services expected without any profile.
    pub default_services: Vec<String>,
    /// Profile name and the service it adds.
    pub optional_profiles: Vec<ProfileExpectation>,
    /// Container inspected for logs, user and baked-in files.
    pub api_container: String,
    /// Running containers whose name contains this belong to the stack.
    pub container_prefix: String,
    /// Named volumes, as written in the compose file.
    pub volumes: Vec<String>,
    pub networks: Vec<String>,
    /// Host ports the rendered config must publish.
    pub ports: Vec<PortExpectation>,
    /// Paths inside the API container that must not hold an env file.
    pub image_secret_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileExpectation {
    pub profile: String,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortExpectation {
    pub port: u16,
    pub service: String,
    /// Published only under an optional profile.
    #[serde(default)]
    pub optional: bool,
}

impl PortExpectation {
    fn new(port: u16, service: &str, optional: bool) -> Self {
        Self {
            port,
            service: service.to_string(),
            optional,
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            command: vec!["docker-compose".to_string()],
            docker: vec!["docker".to_string()],
            file: PathBuf::from("docker-compose.yml"),
            project_dir: PathBuf::from("."),
            default_services: vec![
                "fabric-api".to_string(),
                "fabric-web-svelte".to_string(),
                "fabric-web-streamlit".to_string(),
            ],
            optional_profiles: vec![ProfileExpectation {
                profile: "ollama".to_string(),
                service: "fabric-ollama".to_string(),
            }],
            api_container: "fabric-api".to_string(),
            container_prefix: "fabric".to_string(),
            volumes: strings(&["fabric-config", "fabric-patterns", "fabric-logs"]),
            networks: strings(&["fabric-net"]),
            ports: vec![
                PortExpectation::new(8080, "fabric-api", false),
                PortExpectation::new(5173, "fabric-web-svelte", false),
                PortExpectation::new(8502, "fabric-web-streamlit", false),
                PortExpectation::new(11434, "fabric-ollama", true),
            ],
            image_secret_paths: strings(&["/app/.env", "/.env"]),
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Parallel requests in a burst check.
    pub concurrency: usize,
    /// Sequential samples in a latency check.
    pub timing_samples: usize,
    /// Slowest acceptable sample.
    pub max_latency_ms: u64,
    /// Sequential chat completions in a response-time check.
    pub chat_samples: usize,
    /// Highest acceptable mean for chat completions.
    pub max_chat_mean_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timing_samples: 5,
            max_latency_ms: 1000,
            chat_samples: 3,
            max_chat_mean_secs: 10,
        }
    }
}

impl LoadConfig {
    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    pub fn max_chat_mean(&self) -> Duration {
        Duration::from_secs(self.max_chat_mean_secs)
    }
}

// ---------------------------------------------------------------------------
// Environment file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub env_file: PathBuf,
    /// At least one of these must be set to a non-empty value.
    pub vendor_keys: Vec<String>,
    /// CLIs probed with `--version`; missing ones are optional.
    pub tools: Vec<String>,
    /// Dockerfiles that must exist with a `FROM` and a `CMD`/`ENTRYPOINT`.
    pub dockerfiles: Vec<PathBuf>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(".env"),
            vendor_keys: strings(&["OPENAI_API_KEY", "ANTHROPIC_API_KEY", "GEMINI_API_KEY", "GROQ_API_KEY"]),
            tools: strings(&["docker", "fabric"]),
            dockerfiles: vec![PathBuf::from("Dockerfile.api"), PathBuf::from("Dockerfile.svelte")],
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// Candidate pattern directories, first existing one wins. `~` expands
    /// to `$HOME`.
    pub dirs: Vec<PathBuf>,
    pub min_count: usize,
    /// Patterns every installation is expected to ship.
    pub core: Vec<String>,
    /// How many pattern directories the structure check samples.
    pub sample_size: usize,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            dirs: vec![
                PathBuf::from("~/.config/fabric/patterns"),
                PathBuf::from("/home/fabric/.config/fabric/patterns"),
                PathBuf::from("~/.fabric/patterns"),
            ],
            min_count: 200,
            core: strings(&[
                "summarize",
                "extract_wisdom",
                "analyze_claims",
                "explain_code",
                "improve_prompt",
                "create_summary",
                "rate_value",
                "extract_main_idea",
            ]),
            sample_size: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    /// Directory holding one `<name>.json` per installed strategy.
    pub dir: PathBuf,
    pub names: Vec<String>,
    /// Strategies compared against each other for output and timing.
    pub compare: Vec<String>,
    /// Strategies also run through the pattern CLI.
    pub cli: Vec<String>,
    /// Pattern CLI used for `--strategy` runs, program first.
    pub fabric: Vec<String>,
    /// Slowest acceptable completion in the timing comparison.
    pub max_secs: u64,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.config/fabric/strategies"),
            names: strings(&[
                "standard",
                "cot",
                "cod",
                "tot",
                "aot",
                "ltm",
                "self-consistent",
                "self-refine",
                "reflexion",
            ]),
            compare: strings(&["standard", "cot", "tot"]),
            cli: strings(&["standard", "cot", "tot"]),
            fabric: strings(&["fabric"]),
            max_secs: 30,
        }
    }
}

impl StrategiesConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }
}

// ---------------------------------------------------------------------------
// Secrets manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Secrets manager CLI, program first.
    pub cli: Vec<String>,
    /// Project root holding the manifest, scripts and docs.
    pub project_dir: PathBuf,
    /// `package.json`-style manifest whose `scripts` table is checked.
    pub manifest: PathBuf,
    pub required_scripts: Vec<String>,
    /// Launcher that must export secrets before starting containers.
    pub launcher: PathBuf,
    pub validator: PathBuf,
    /// Any one of these marks the project as initialised.
    pub project_configs: Vec<PathBuf>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            cli: strings(&["infisical"]),
            project_dir: PathBuf::from("."),
            manifest: PathBuf::from("package.json"),
            required_scripts: strings(&[
                "dev:infisical",
                "build:infisical",
                "secrets:init",
                "env:pull:dev",
                "env:pull:prod",
            ]),
            launcher: PathBuf::from("scripts/docker-up.sh"),
            validator: PathBuf::from("scripts/validate-env.mjs"),
            project_configs: vec![PathBuf::from(".infisical.json"), PathBuf::from("infisical.json")],
        }
    }
}

// ---------------------------------------------------------------------------
// YouTube
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// Transcript CLI, program first.
    pub yt: Vec<String>,
    /// Pattern CLI used for comments and piped workflows.
    pub fabric: Vec<String>,
    pub video_url: String,
    /// A URL no video lives at; extraction must fail cleanly.
    pub invalid_url: String,
    pub private_url: String,
    /// Env file the pattern CLI reads its YouTube key from.
    pub fabric_env: PathBuf,
    pub patterns: Vec<String>,
    /// Slowest acceptable transcript extraction.
    pub max_transcript_secs: u64,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            yt: strings(&["yt"]),
            fabric: strings(&["fabric"]),
            video_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            invalid_url: "https://www.youtube.com/watch?v=INVALID123456".to_string(),
            private_url: "https://www.youtube.com/watch?v=privatevideo123".to_string(),
            fabric_env: PathBuf::from("~/.config/fabric/.env"),
            patterns: strings(&["summarize", "extract_wisdom"]),
            max_transcript_secs: 20,
        }
    }
}

impl YoutubeConfig {
    pub fn max_transcript(&self) -> Duration {
        Duration::from_secs(self.max_transcript_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
