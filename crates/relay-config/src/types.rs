use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    #[serde(default)]
    pub backends: BTreeMap<String, BackendDef>,
    /// Routing rules keyed by task-type tag (see [`TASK_TYPE_TAGS`]).
    #[serde(default)]
    pub routing: BTreeMap<String, RouteRule>,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// The eight task-type tags routing rules may be keyed by.
pub const TASK_TYPE_TAGS: [&str; 8] = [
    "codebase_analysis",
    "code_review",
    "code_generation",
    "quick_query",
    "architecture_design",
    "debugging",
    "documentation",
    "refactoring",
];

/// One configured backend. Descriptors are immutable after load.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendDef {
    Cli {
        #[serde(default = "default_enabled")]
        enabled: bool,
        /// Child binary path or name resolved via PATH.
        executable: String,
    },
    Http {
        #[serde(default = "default_enabled")]
        enabled: bool,
        /// Scheme + host + port. A trailing slash is stripped on use.
        base_url: String,
        #[serde(default)]
        api_type: Dialect,
        #[serde(default)]
        default_model: Option<String>,
        /// Substring-match list for model auto-detection, in preference order.
        #[serde(default)]
        preferred_models: Vec<String>,
        /// Ask the service supervisor to start the backend before first use.
        #[serde(default = "default_enabled")]
        auto_start: bool,
        /// Pick a model from `preferred_models` when none is configured.
        #[serde(default = "default_enabled")]
        auto_detect_model: bool,
        /// Attempts per model inside the adapter, on top of the
        /// orchestrator's own candidate retries.
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        /// Seconds between adapter-level retry attempts.
        #[serde(default = "default_retry_delay")]
        retry_delay: u64,
    },
}

impl BackendDef {
    pub fn enabled(&self) -> bool {
        match self {
            BackendDef::Cli { enabled, .. } => *enabled,
            BackendDef::Http { enabled, .. } => *enabled,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackendDef::Cli { .. } => "cli",
            BackendDef::Http { .. } => "http",
        }
    }
}

/// On-the-wire streaming format an HTTP backend speaks.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Newline-delimited JSON records (`/api/generate`).
    #[default]
    Ndjson,
    /// Server-Sent Events chat completions (`/v1/chat/completions`).
    Sse,
}

/// Routing rule for one task type. Immutable after load.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRule {
    pub primary: String,
    #[serde(default)]
    pub fallback: Vec<String>,
    /// Minimum file count before parallel execution is considered.
    #[serde(default)]
    pub parallel_threshold: Option<usize>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Global execution limits applied when a rule carries no override.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Attempts per candidate in the orchestrator's retry loop.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_enabled")]
    pub retry_on_failure: bool,
    /// Worker ceiling for the parallel executor.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_on_failure: true,
            max_workers: default_max_workers(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    2
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_workers() -> usize {
    3
}
