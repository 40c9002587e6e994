use crate::adapters::{Adapter, AdapterRegistry, ExecuteRequest};
use crate::classifier;
use crate::health::HealthMonitor;
use crate::parallel::{ParallelExecutor, Strategy};
use crate::process::ProcessManager;
use crate::router::{Decision, ExecutionMode, Router};
use crate::security::{validate_file_paths, validate_prompt};
use crate::stream::{event_channel, ResponseStream, StreamEvent};
use crate::supervisor::{NoopSupervisor, ServiceSupervisor};
use crate::{Error, Result};
use relay_config::RelayConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const TEST_BACKEND_TIMEOUT: Duration = Duration::from_secs(10);
const TEST_SAMPLE_CHARS: usize = 200;

/// Routing hints a caller may attach to a request. Everything else about
/// execution is decided by classification and the rule table.
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    /// Backend to try before the routed candidates. Still health-gated and
    /// retried like any other candidate.
    pub backend: Option<String>,
    /// Model override passed through to HTTP adapters.
    pub model: Option<String>,
}

/// Result of a one-shot backend probe.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub success: bool,
    pub sample_text: Option<String>,
    pub error: Option<String>,
}

/// The coordination state machine: classification, routing, streamed
/// execution with retry and fallback across heterogeneous backends.
pub struct Orchestrator {
    config: Arc<RelayConfig>,
    registry: Arc<AdapterRegistry>,
    router: Router,
    health: Arc<HealthMonitor>,
    process: Arc<ProcessManager>,
}

impl Orchestrator {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_supervisor(config, Arc::new(NoopSupervisor))
    }

    pub fn with_supervisor(config: RelayConfig, supervisor: Arc<dyn ServiceSupervisor>) -> Self {
        let config = Arc::new(config);
        let process = Arc::new(ProcessManager::new());
        process.install_signal_handlers();

        let registry = Arc::new(AdapterRegistry::from_config(
            &config,
            Arc::clone(&process),
            supervisor,
        ));
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&config),
            Arc::clone(&registry),
        ));
        let router = Router::new(Arc::clone(&config), Arc::clone(&health));

        info!("Initialized orchestrator with {} adapters", registry.len());

        Self {
            config,
            registry,
            router,
            health,
            process,
        }
    }

    pub fn process_manager(&self) -> Arc<ProcessManager> {
        Arc::clone(&self.process)
    }

    /// Executes a task end to end, streaming chunks as the winning backend
    /// produces them.
    ///
    /// Failures before routing completes surface as the returned error;
    /// later failures terminate the stream. Once any chunk has reached the
    /// caller, retry and fallback are off the table; a failure after that
    /// point is terminal.
    pub async fn execute(
        &self,
        prompt: &str,
        files: &[String],
        preferences: Preferences,
    ) -> Result<ResponseStream> {
        validate_prompt(prompt)?;
        let files = validate_file_paths(files);

        info!("Executing task with {} files", files.len());

        let classification = classifier::classify(prompt, &files);
        let decision = self.router.route(&classification).await?;

        let mut candidates: Vec<String> = Vec::new();
        if let Some(preferred) = &preferences.backend {
            candidates.push(preferred.clone());
        }
        candidates.push(decision.primary.clone());
        candidates.extend(decision.fallback.iter().cloned());
        candidates.dedup();

        let (tx, stream) = event_channel();

        match decision.mode {
            ExecutionMode::Parallel => {
                let this = self.clone_internals();
                let prompt = prompt.to_string();
                let decision = decision.clone();
                tokio::spawn(async move {
                    this.drive_parallel(&prompt, &files, &candidates, &decision, tx)
                        .await;
                });
            }
            _ => {
                let this = self.clone_internals();
                let prompt = prompt.to_string();
                let model = preferences.model.clone();
                let task_type = classification.task_type.as_str().to_string();
                let timeout = decision.timeout;
                tokio::spawn(async move {
                    this.drive_single(prompt, files, model, candidates, timeout, task_type, tx)
                        .await;
                });
            }
        }

        Ok(stream)
    }

    /// Fans the same task out to every enabled backend, multiplexing
    /// labeled chunks.
    pub async fn execute_broadcast(
        &self,
        prompt: &str,
        files: &[String],
    ) -> Result<ResponseStream> {
        validate_prompt(prompt)?;
        let files = validate_file_paths(files);
        let decision = self.router.route_broadcast()?;

        let mut backends = vec![decision.primary.clone()];
        backends.extend(decision.fallback.iter().cloned());

        let (tx, stream) = event_channel();
        let this = self.clone_internals();
        let prompt = prompt.to_string();
        let timeout = decision.timeout;

        tokio::spawn(async move {
            this.drive_broadcast(prompt, files, backends, timeout, tx).await;
        });

        Ok(stream)
    }

    /// Inventory of all configured backends with cached health state.
    pub async fn list_backends(&self) -> serde_json::Value {
        let mut listing = serde_json::Map::new();

        for (name, backend) in &self.config.backends {
            let healthy = self.health.probe(name).await;
            let metadata = match self.registry.get(name) {
                Some(adapter) => adapter.metadata(),
                None => serde_json::json!({"type": backend.kind()}),
            };

            listing.insert(
                name.clone(),
                serde_json::json!({
                    "enabled": backend.enabled(),
                    "healthy": healthy,
                    "metadata": metadata,
                }),
            );
        }

        serde_json::Value::Object(listing)
    }

    /// One-shot echo-style probe of a single backend.
    pub async fn test_backend(&self, name: &str, prompt: &str) -> TestReport {
        let Some(adapter) = self.registry.get(name) else {
            return TestReport {
                success: false,
                sample_text: None,
                error: Some(format!("Backend '{}' not found", name)),
            };
        };

        match adapter.health_check().await {
            Ok(true) => {}
            _ => {
                return TestReport {
                    success: false,
                    sample_text: None,
                    error: Some("Backend failed health check".to_string()),
                };
            }
        }

        let request = ExecuteRequest::new(prompt).with_timeout(Some(TEST_BACKEND_TIMEOUT));
        match collect_all(&adapter, request).await {
            Ok(text) => TestReport {
                success: true,
                sample_text: Some(text.chars().take(TEST_SAMPLE_CHARS).collect()),
                error: None,
            },
            Err(e) => TestReport {
                success: false,
                sample_text: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Introspection dump of the routing rule table.
    pub fn routing_rules(&self) -> serde_json::Value {
        self.router.rules_summary()
    }

    pub fn invalidate_health(&self, name: Option<&str>) {
        self.health.invalidate(name);
    }

    fn clone_internals(&self) -> OrchestratorCore {
        OrchestratorCore {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            parallel: ParallelExecutor::new(self.config.execution.max_workers),
        }
    }
}

/// The pieces a driver task needs once routing has happened.
struct OrchestratorCore {
    config: Arc<RelayConfig>,
    registry: Arc<AdapterRegistry>,
    parallel: ParallelExecutor,
}

/// What became of one streaming attempt.
enum AttemptOutcome {
    /// Completed; the request is done.
    Completed,
    /// Failed before any chunk reached the caller; candidate loop decides.
    FailedClean(Error),
    /// Failed after output was forwarded, or the caller went away.
    /// Terminal either way.
    Terminal,
}

impl OrchestratorCore {
    #[allow(clippy::too_many_arguments)]
    async fn drive_single(
        &self,
        prompt: String,
        files: Vec<PathBuf>,
        model: Option<String>,
        candidates: Vec<String>,
        timeout: Duration,
        task_type: String,
        tx: mpsc::Sender<Result<StreamEvent>>,
    ) {
        let max_retries = if self.config.execution.retry_on_failure {
            self.config.execution.max_retries.max(1)
        } else {
            1
        };

        let mut last_error: Option<Error> = None;

        'candidates: for candidate in &candidates {
            let Some(adapter) = self.registry.get(candidate) else {
                warn!("Adapter not found: {}", candidate);
                continue;
            };

            for attempt in 1..=max_retries {
                debug!("Attempting {} (attempt {}/{})", candidate, attempt, max_retries);

                let request = ExecuteRequest::new(&prompt)
                    .with_files(files.clone())
                    .with_model(model.clone())
                    .with_timeout(Some(timeout));

                match self.stream_attempt(&adapter, candidate, request, &tx).await {
                    AttemptOutcome::Completed => {
                        info!("Task completed successfully on {}", candidate);
                        return;
                    }
                    AttemptOutcome::Terminal => return,
                    AttemptOutcome::FailedClean(e) => {
                        warn!("Attempt {} on {} failed: {}", attempt, candidate, e);

                        if e.is_unavailable() {
                            // Unavailable backends don't deserve a second try
                            last_error = Some(e);
                            continue 'candidates;
                        }
                        let retry = e.is_retryable() && attempt < max_retries;
                        last_error = Some(e);
                        if !retry {
                            continue 'candidates;
                        }
                    }
                }
            }
        }

        let final_error = match last_error {
            Some(e) => Error::Execution(format!("All backends failed. Last error: {e}")),
            None => Error::NoServiceAvailable { task_type },
        };
        error!("{}", final_error);
        let _ = tx.send(Err(final_error)).await;
    }

    /// Streams one adapter attempt, forwarding chunks as they arrive.
    async fn stream_attempt(
        &self,
        adapter: &Arc<dyn Adapter>,
        backend: &str,
        request: ExecuteRequest,
        tx: &mpsc::Sender<Result<StreamEvent>>,
    ) -> AttemptOutcome {
        let mut rx = match adapter.execute(request).await {
            Ok(rx) => rx,
            Err(e) => return AttemptOutcome::FailedClean(e),
        };

        let mut forwarded = false;

        while let Some(chunk) = rx.recv().await {
            match chunk {
                Ok(text) => {
                    let event = StreamEvent::Chunk {
                        backend: backend.to_string(),
                        text,
                    };
                    if tx.send(Ok(event)).await.is_err() {
                        debug!("Caller abandoned the stream");
                        return AttemptOutcome::Terminal;
                    }
                    forwarded = true;
                }
                Err(e) => {
                    if !forwarded {
                        return AttemptOutcome::FailedClean(e);
                    }
                    // Output already reached the caller; no backend swap can
                    // continue the same response
                    let _ = tx
                        .send(Err(Error::Execution(format!(
                            "Stream from '{backend}' failed mid-response: {e}"
                        ))))
                        .await;
                    return AttemptOutcome::Terminal;
                }
            }
        }

        AttemptOutcome::Completed
    }

    async fn drive_parallel(
        &self,
        prompt: &str,
        files: &[PathBuf],
        backends: &[String],
        decision: &Decision,
        tx: mpsc::Sender<Result<StreamEvent>>,
    ) {
        let report = self
            .parallel
            .execute(
                Strategy::Split,
                prompt,
                files,
                backends,
                &self.registry,
                Some(decision.timeout),
            )
            .await;

        for result in &report.results {
            let event = if result.success {
                StreamEvent::Chunk {
                    backend: result.backend.clone(),
                    text: format!("## Results from {}\n\n{}\n", result.backend, result.text),
                }
            } else {
                StreamEvent::BackendFailed {
                    backend: result.backend.clone(),
                    error: result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                }
            };

            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        if report.successes == 0 {
            let _ = tx
                .send(Err(Error::Execution(
                    "All parallel backends failed".to_string(),
                )))
                .await;
        }
    }

    async fn drive_broadcast(
        &self,
        prompt: String,
        files: Vec<PathBuf>,
        backends: Vec<String>,
        timeout: Duration,
        tx: mpsc::Sender<Result<StreamEvent>>,
    ) {
        let mut join_set = JoinSet::new();

        for backend in backends {
            let Some(adapter) = self.registry.get(&backend) else {
                let _ = tx
                    .send(Ok(StreamEvent::BackendFailed {
                        backend: backend.clone(),
                        error: "adapter not found".to_string(),
                    }))
                    .await;
                continue;
            };

            let tx = tx.clone();
            let request = ExecuteRequest::new(&prompt)
                .with_files(files.clone())
                .with_timeout(Some(timeout));

            join_set.spawn(async move {
                match adapter.execute(request).await {
                    Ok(mut rx) => {
                        while let Some(chunk) = rx.recv().await {
                            let event = match chunk {
                                Ok(text) => StreamEvent::Chunk {
                                    backend: backend.clone(),
                                    text,
                                },
                                Err(e) => {
                                    let _ = tx
                                        .send(Ok(StreamEvent::BackendFailed {
                                            backend: backend.clone(),
                                            error: e.to_string(),
                                        }))
                                        .await;
                                    return;
                                }
                            };
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                        let _ = tx
                            .send(Ok(StreamEvent::BackendDone { backend }))
                            .await;
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Ok(StreamEvent::BackendFailed {
                                backend,
                                error: e.to_string(),
                            }))
                            .await;
                    }
                }
            });
        }

        // The request ends when every backend has completed or failed
        while join_set.join_next().await.is_some() {}
    }
}

async fn collect_all(adapter: &Arc<dyn Adapter>, request: ExecuteRequest) -> Result<String> {
    let mut rx = adapter.execute(request).await?;
    let mut text = String::new();
    while let Some(chunk) = rx.recv().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}
