use crate::adapters::{AdapterRegistry, ExecuteRequest};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Fan-out strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Partition the file list among backends; same prompt everywhere.
    Split,
    /// Every backend receives the full prompt and file list.
    Duplicate,
}

/// Outcome of one backend's leg of a fan-out.
#[derive(Debug, Clone)]
pub struct BackendResult {
    pub backend: String,
    pub success: bool,
    pub text: String,
    pub error: Option<String>,
}

/// Aggregated fan-out outcome.
#[derive(Debug, Clone)]
pub struct ParallelReport {
    pub aggregated_text: String,
    pub results: Vec<BackendResult>,
    pub backends_used: Vec<String>,
    pub duration: Duration,
    pub successes: usize,
    pub failures: usize,
}

/// Runs one task across several backends concurrently.
///
/// Sibling failures never abort the run; aggregation waits exactly as long
/// as the slowest backend, with per-backend timeouts enforced by the
/// adapters themselves.
pub struct ParallelExecutor {
    max_workers: usize,
}

impl ParallelExecutor {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub async fn execute(
        &self,
        strategy: Strategy,
        prompt: &str,
        files: &[PathBuf],
        backends: &[String],
        registry: &Arc<AdapterRegistry>,
        timeout: Option<Duration>,
    ) -> ParallelReport {
        let start = Instant::now();

        let backends_to_use: Vec<String> = backends
            .iter()
            .take(self.max_workers)
            .cloned()
            .collect();

        info!(
            "Starting parallel execution: {} files, {} backends, strategy={:?}",
            files.len(),
            backends_to_use.len(),
            strategy
        );

        let chunks: Vec<Vec<PathBuf>> = match strategy {
            Strategy::Split => split_files(files, backends_to_use.len()),
            Strategy::Duplicate => backends_to_use.iter().map(|_| files.to_vec()).collect(),
        };

        let mut join_set = JoinSet::new();
        for (index, (backend, chunk)) in backends_to_use.iter().zip(chunks).enumerate() {
            let Some(adapter) = registry.get(backend) else {
                warn!("Adapter not found for {}, skipping", backend);
                continue;
            };

            let backend = backend.clone();
            let request = ExecuteRequest::new(prompt)
                .with_files(chunk)
                .with_timeout(timeout);

            join_set.spawn(async move {
                debug!("Executing on {} with {} files", backend, request.files.len());
                let outcome = run_to_completion(&adapter, request).await;
                (index, backend, outcome)
            });
        }

        let mut slots: Vec<Option<BackendResult>> = Vec::new();
        slots.resize_with(backends_to_use.len(), || None);

        while let Some(joined) = join_set.join_next().await {
            let Ok((index, backend, outcome)) = joined else {
                continue;
            };

            let result = match outcome {
                Ok(text) => BackendResult {
                    backend,
                    success: true,
                    text,
                    error: None,
                },
                Err(e) => {
                    warn!("Backend {} failed: {}", backend, e);
                    BackendResult {
                        backend,
                        success: false,
                        text: String::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            slots[index] = Some(result);
        }

        // Results stay in backend order regardless of completion order
        let results: Vec<BackendResult> = slots.into_iter().flatten().collect();
        let successes = results.iter().filter(|r| r.success).count();
        let failures = results.len() - successes;

        let aggregated_text = match strategy {
            Strategy::Split => aggregate_split(&results),
            Strategy::Duplicate => aggregate_duplicate(&results),
        };

        let duration = start.elapsed();
        info!(
            "Parallel execution completed in {:.2}s: {} successful, {} failed",
            duration.as_secs_f64(),
            successes,
            failures
        );

        ParallelReport {
            aggregated_text,
            results,
            backends_used: backends_to_use,
            duration,
            successes,
            failures,
        }
    }
}

async fn run_to_completion(
    adapter: &Arc<dyn crate::adapters::Adapter>,
    request: ExecuteRequest,
) -> Result<String> {
    let mut rx = adapter.execute(request).await?;
    let mut text = String::new();
    while let Some(chunk) = rx.recv().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}

/// Splits files into `count` roughly-equal chunks, earlier chunks taking
/// the remainder.
fn split_files(files: &[PathBuf], count: usize) -> Vec<Vec<PathBuf>> {
    if count == 0 {
        return Vec::new();
    }

    let chunk_size = files.len() / count;
    let remainder = files.len() % count;

    let mut chunks = Vec::with_capacity(count);
    let mut start = 0;

    for i in 0..count {
        let extra = usize::from(i < remainder);
        let end = start + chunk_size + extra;
        chunks.push(files[start..end].to_vec());
        start = end;
    }

    chunks
}

fn aggregate_split(results: &[BackendResult]) -> String {
    let parts: Vec<String> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| format!("## Results from {}\n\n{}\n", r.backend, r.text))
        .collect();

    if parts.is_empty() {
        return "All parallel tasks failed.".to_string();
    }

    parts.join("\n---\n\n")
}

fn aggregate_duplicate(results: &[BackendResult]) -> String {
    let mut parts = vec!["# Comparison of Results from Multiple Models\n".to_string()];

    for result in results {
        if result.success {
            parts.push(format!("## {}\n\n{}\n", result.backend, result.text));
        } else {
            let error = result.error.as_deref().unwrap_or("Unknown error");
            parts.push(format!("## {}\n\n**Error:** {}\n", result.backend, error));
        }
    }

    parts.join("\n---\n\n")
}
