//! # relay-runtime
//!
//! Core runtime for relay, a request-routing orchestrator for
//! heterogeneous LLM backends.
//!
//! A caller submits a task (prompt, optional files, optional routing
//! hints) and receives a streamed response from the most appropriate
//! backend. Backends are command-line tools run as child processes or HTTP
//! endpoints speaking NDJSON or SSE; the runtime hides the difference,
//! selects among them, survives their failures, and keeps the caller's
//! byte stream flowing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay_config::parse_config_from_str;
//! use relay_runtime::{Orchestrator, Preferences, StreamEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> relay_runtime::Result<()> {
//! let config = parse_config_from_str(r#"
//! backends:
//!   ollama_local:
//!     type: http
//!     base_url: "http://localhost:11434"
//!     default_model: "llama3.2"
//! "#)?;
//!
//! let orchestrator = Orchestrator::new(config);
//! let mut stream = orchestrator
//!     .execute("What is 2 + 2?", &[], Preferences::default())
//!     .await?;
//!
//! while let Some(event) = stream.next().await {
//!     if let StreamEvent::Chunk { text, .. } = event? {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! caller ──► Orchestrator ──► Classifier ──► Router ──► Adapter ──► Backend
//!                │                             │           │
//!                ▼                             ▼           ▼
//!          HealthMonitor ◄─────── probes ── Backend    ProcessManager
//! ```
//!
//! - **Classification** is a pure function of the prompt and file set
//! - **Routing** picks the first healthy candidate from the rule table,
//!   with liveness cached under split positive/negative TTLs
//! - **Execution** retries per candidate and falls back across candidates,
//!   but never after a chunk has reached the caller
//! - **Process supervision** tracks every spawned child so a shutdown
//!   signal can sweep them within a bounded grace period

pub mod adapters;
pub mod cache;
pub mod classifier;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod parallel;
pub mod process;
pub mod prompt;
pub mod router;
pub mod security;
pub mod stream;
pub mod supervisor;

pub use adapters::{Adapter, AdapterRegistry, ChunkReceiver, CliAdapter, ExecuteRequest, HttpAdapter};
pub use cache::{HealthCache, HealthCacheStats, TtlCache};
pub use classifier::{classify, Classification, Latency, TaskType};
pub use error::{Error, Result};
pub use health::HealthMonitor;
pub use orchestrator::{Orchestrator, Preferences, TestReport};
pub use parallel::{BackendResult, ParallelExecutor, ParallelReport, Strategy};
pub use process::{ProcessKind, ProcessManager};
pub use router::{Decision, ExecutionMode, Router};
pub use stream::{ResponseStream, StreamEvent};
pub use supervisor::{NoopSupervisor, ServiceSupervisor, SupervisorReport, SupervisorRequest};
