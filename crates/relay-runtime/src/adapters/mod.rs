pub mod cli;
pub mod http;

pub use cli::CliAdapter;
pub use http::HttpAdapter;

use crate::process::ProcessManager;
use crate::supervisor::ServiceSupervisor;
use crate::{Error, Result};
use async_trait::async_trait;
use relay_config::{BackendDef, RelayConfig};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Uniform request slot every adapter accepts. Anything beyond these four
/// fields is outside the adapter contract.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub files: Vec<PathBuf>,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
}

impl ExecuteRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Channel of raw text chunks produced by one adapter attempt. Bounded so
/// a stalled consumer stalls the producing child or connection.
pub type ChunkReceiver = mpsc::Receiver<Result<String>>;

pub(crate) const CHUNK_CAPACITY: usize = 32;

/// Per-backend component translating the uniform contract into
/// backend-specific I/O.
///
/// `execute` returns once the backend has accepted the work; output then
/// arrives through the channel as it is produced. Failures before any
/// output surface as the returned error, later ones as an `Err` item
/// terminating the channel.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Static descriptor facts for inventory listings.
    fn metadata(&self) -> serde_json::Value;

    async fn execute(&self, request: ExecuteRequest) -> Result<ChunkReceiver>;

    /// Liveness check. Transport errors report `Ok(false)` rather than
    /// failing; the health prober caches either way.
    async fn health_check(&self) -> Result<bool>;
}

/// Adapters held by backend name, O(1) lookup.
pub struct AdapterRegistry {
    adapters: FxHashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: FxHashMap::default(),
        }
    }

    /// Builds adapters for every enabled backend in the descriptor table.
    pub fn from_config(
        config: &RelayConfig,
        process: Arc<ProcessManager>,
        supervisor: Arc<dyn ServiceSupervisor>,
    ) -> Self {
        let mut registry = Self::new();

        for (name, backend) in &config.backends {
            if !backend.enabled() {
                tracing::debug!("Skipping disabled backend: {}", name);
                continue;
            }

            let adapter: Arc<dyn Adapter> = match backend {
                BackendDef::Cli { executable, .. } => Arc::new(CliAdapter::new(
                    name.clone(),
                    executable.clone(),
                    Arc::clone(&process),
                )),
                BackendDef::Http { .. } => Arc::new(HttpAdapter::from_backend(
                    name.clone(),
                    backend,
                    Arc::clone(&supervisor),
                )),
            };

            registry.register(name.clone(), adapter);
            info!("Initialized adapter: {}", name);
        }

        registry
    }

    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a reqwest transport error onto the taxonomy.
pub(crate) fn map_transport_error(backend: &str, timeout_secs: u64, e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(backend, timeout_secs)
    } else if e.is_connect() {
        Error::unavailable(backend, format!("cannot connect: {e}"))
    } else {
        Error::adapter(backend, format!("request failed: {e}"))
    }
}
