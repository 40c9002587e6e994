use super::{map_transport_error, Adapter, ChunkReceiver, ExecuteRequest, CHUNK_CAPACITY};
use crate::security::validate_prompt;
use crate::supervisor::{ServiceSupervisor, SupervisorRequest};
use crate::{prompt, Error, Result};
use async_trait::async_trait;
use relay_config::{BackendDef, Dialect};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Adapter for HTTP backends speaking either the NDJSON generate dialect
/// or the SSE chat-completion dialect.
///
/// Retry layering: this adapter runs up to `max_retries` attempts per
/// model with a fixed delay, advancing through the preferred-model list on
/// exhaustion. The orchestrator's outer loop retries the whole adapter
/// call per candidate, so the two multiply: a backend with adapter
/// retries N and orchestrator retries M sees at most N×M attempts.
pub struct HttpAdapter {
    name: String,
    base_url: String,
    dialect: Dialect,
    default_model: Option<String>,
    preferred_models: Vec<String>,
    auto_start: bool,
    auto_detect_model: bool,
    max_retries: u32,
    retry_delay: Duration,
    client: reqwest::Client,
    supervisor: Arc<dyn ServiceSupervisor>,
    ready: AtomicBool,
}

impl HttpAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        base_url: String,
        dialect: Dialect,
        default_model: Option<String>,
        preferred_models: Vec<String>,
        auto_start: bool,
        auto_detect_model: bool,
        max_retries: u32,
        retry_delay: Duration,
        supervisor: Arc<dyn ServiceSupervisor>,
    ) -> Self {
        Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            dialect,
            default_model,
            preferred_models,
            auto_start,
            auto_detect_model,
            max_retries: max_retries.max(1),
            retry_delay,
            client: reqwest::Client::new(),
            supervisor,
            ready: AtomicBool::new(false),
        }
    }

    pub fn from_backend(
        name: String,
        backend: &BackendDef,
        supervisor: Arc<dyn ServiceSupervisor>,
    ) -> Self {
        match backend {
            BackendDef::Http {
                base_url,
                api_type,
                default_model,
                preferred_models,
                auto_start,
                auto_detect_model,
                max_retries,
                retry_delay,
                ..
            } => Self::new(
                name,
                base_url.clone(),
                *api_type,
                default_model.clone(),
                preferred_models.clone(),
                *auto_start,
                *auto_detect_model,
                *max_retries,
                Duration::from_secs(*retry_delay),
                supervisor,
            ),
            BackendDef::Cli { .. } => {
                unreachable!("HttpAdapter built from a CLI descriptor")
            }
        }
    }

    fn health_url(&self) -> String {
        match self.dialect {
            Dialect::Ndjson => format!("{}/api/tags", self.base_url),
            Dialect::Sse => format!("{}/v1/models", self.base_url),
        }
    }

    fn generate_url(&self) -> String {
        match self.dialect {
            Dialect::Ndjson => format!("{}/api/generate", self.base_url),
            Dialect::Sse => format!("{}/v1/chat/completions", self.base_url),
        }
    }

    /// First-use readiness gate: probe, optionally ask the supervisor to
    /// start the backend, re-probe.
    async fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::Relaxed) {
            return Ok(());
        }

        if self.health_check().await.unwrap_or(false) {
            self.ready.store(true, Ordering::Relaxed);
            return Ok(());
        }

        if self.auto_start {
            debug!("Backend '{}' down, asking supervisor to start it", self.name);
            let report = self
                .supervisor
                .ensure_healthy(SupervisorRequest {
                    name: self.name.clone(),
                    base_url: self.base_url.clone(),
                    dialect: self.dialect,
                    auto_start: self.auto_start,
                    auto_detect_model: self.auto_detect_model,
                    preferred_models: self.preferred_models.clone(),
                })
                .await;

            if report.healthy || self.health_check().await.unwrap_or(false) {
                self.ready.store(true, Ordering::Relaxed);
                return Ok(());
            }

            if let Some(error) = report.error {
                return Err(Error::unavailable(&self.name, error));
            }
        }

        Err(Error::unavailable(&self.name, "backend is not ready"))
    }

    /// Model priority: explicit request > descriptor default > auto-detect
    /// against the preferred list > first listed model.
    async fn resolve_model(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(model) = explicit {
            return Ok(model.to_string());
        }
        if let Some(model) = &self.default_model {
            return Ok(model.clone());
        }

        if self.auto_detect_model {
            let models = self.list_models().await?;
            if let Some(model) = pick_preferred(&models, &self.preferred_models) {
                debug!("Auto-detected model '{}' for '{}'", model, self.name);
                return Ok(model);
            }
            if let Some(first) = models.into_iter().next() {
                return Ok(first);
            }
        }

        Err(Error::adapter_fatal(
            &self.name,
            "no model configured and auto-detection found none",
        ))
    }

    /// Lists the models the backend reports on its discovery endpoint.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.health_url())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.name, HEALTH_CHECK_TIMEOUT.as_secs(), &e))?;

        if !response.status().is_success() {
            return Err(Error::adapter(
                &self.name,
                format!("model listing returned status {}", response.status()),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::adapter(&self.name, format!("invalid model listing: {e}")))?;

        let models = match self.dialect {
            Dialect::Ndjson => body["models"]
                .as_array()
                .map(|models| {
                    models
                        .iter()
                        .filter_map(|m| m["name"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            Dialect::Sse => body["data"]
                .as_array()
                .map(|models| {
                    models
                        .iter()
                        .filter_map(|m| m["id"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
        };

        Ok(models)
    }

    /// Issues one streaming request. Any non-200 status is mapped before
    /// a single chunk flows.
    async fn start_stream(
        &self,
        prompt: &str,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<ChunkReceiver> {
        let body = match self.dialect {
            Dialect::Ndjson => serde_json::json!({
                "model": model,
                "prompt": prompt,
                "stream": true,
            }),
            Dialect::Sse => serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "stream": true,
            }),
        };

        let mut request = self.client.post(self.generate_url()).json(&body);
        if let Some(limit) = timeout {
            request = request.timeout(limit);
        }

        let timeout_secs = timeout.map(|t| t.as_secs()).unwrap_or(0);
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&self.name, timeout_secs, &e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.map_status(status.as_u16(), &text));
        }

        let (tx, rx) = mpsc::channel(CHUNK_CAPACITY);
        let name = self.name.clone();
        let dialect = self.dialect;

        tokio::spawn(async move {
            stream_body(&name, dialect, response, tx, timeout_secs).await;
        });

        Ok(rx)
    }

    fn map_status(&self, status: u16, body: &str) -> Error {
        match status {
            401 => Error::adapter_fatal(&self.name, "authentication failed"),
            402 => Error::adapter_fatal(&self.name, "payment required"),
            404 => Error::adapter_fatal(&self.name, format!("model not found: {}", body.trim())),
            429 => Error::unavailable(&self.name, "rate limit exceeded"),
            503 => Error::unavailable(&self.name, format!("temporarily unavailable: {}", body.trim())),
            s if s >= 500 => Error::adapter(&self.name, format!("server error (status {s}): {}", body.trim())),
            s => Error::adapter_fatal(&self.name, format!("API error (status {s}): {}", body.trim())),
        }
    }

    /// The model chain for one execution: resolved model first, then the
    /// rest of the preferred list.
    fn model_chain(&self, resolved: String) -> Vec<String> {
        let mut chain = vec![resolved];
        for model in &self.preferred_models {
            if !chain.contains(model) {
                chain.push(model.clone());
            }
        }
        chain
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "http",
            "base_url": self.base_url,
            "api_type": self.dialect,
            "default_model": self.default_model,
        })
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<ChunkReceiver> {
        validate_prompt(&request.prompt)?;
        self.ensure_ready().await?;

        // HTTP dialects have no file-reference syntax, so contents are
        // always inlined.
        let full_prompt = prompt::assemble(&request.prompt, &request.files);
        let resolved = self.resolve_model(request.model.as_deref()).await?;

        let mut last_error: Option<Error> = None;

        for model in self.model_chain(resolved) {
            let mut server_error_retried = false;

            let mut attempt = 0;
            while attempt < self.max_retries {
                attempt += 1;

                match self.start_stream(&full_prompt, &model, request.timeout).await {
                    Ok(rx) => return Ok(rx),
                    Err(e) if e.is_timeout() => return Err(e),
                    Err(e) if e.is_unavailable() => {
                        warn!(
                            "Backend '{}' unavailable for model '{}' (attempt {}/{}): {}",
                            self.name, model, attempt, self.max_retries, e
                        );
                        last_error = Some(e);
                        if attempt < self.max_retries {
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                    Err(e) if e.is_retryable() => {
                        // Transient server error: one extra attempt, no more
                        if server_error_retried {
                            last_error = Some(e);
                            break;
                        }
                        server_error_retried = true;
                        last_error = Some(e);
                        tokio::time::sleep(self.retry_delay).await;
                        attempt -= 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            debug!(
                "Model '{}' exhausted on '{}', advancing to next fallback",
                model, self.name
            );
        }

        Err(last_error
            .unwrap_or_else(|| Error::adapter(&self.name, "all models and retries exhausted")))
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.health_url())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) => Ok(response.status().as_u16() == 200),
            Err(e) => {
                debug!("Health check for '{}' failed: {}", self.name, e);
                Ok(false)
            }
        }
    }
}

/// First listed model whose name contains any preferred entry,
/// case-insensitive.
fn pick_preferred(models: &[String], preferred: &[String]) -> Option<String> {
    for model in models {
        let lowered = model.to_lowercase();
        if preferred
            .iter()
            .any(|p| lowered.contains(&p.to_lowercase()))
        {
            return Some(model.clone());
        }
    }
    None
}

/// Parses a streaming response body line by line, yielding text chunks.
async fn stream_body(
    backend: &str,
    dialect: Dialect,
    response: reqwest::Response,
    tx: mpsc::Sender<Result<String>>,
    timeout_secs: u64,
) {
    let mut response = response;
    let mut buffer = String::new();

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let error = map_transport_error(backend, timeout_secs, &e);
                let _ = tx.send(Err(error)).await;
                return;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_line(backend, dialect, line) {
                LineOutcome::Text(text) => {
                    if tx.send(Ok(text)).await.is_err() {
                        // Consumer gone; dropping the response closes the
                        // connection
                        return;
                    }
                }
                LineOutcome::Done => return,
                LineOutcome::Skip => {}
            }
        }
    }

    // Trailing data without a newline still counts
    let line = buffer.trim().to_string();
    if !line.is_empty() {
        if let LineOutcome::Text(text) = parse_line(backend, dialect, &line) {
            let _ = tx.send(Ok(text)).await;
        }
    }
}

enum LineOutcome {
    Text(String),
    Done,
    Skip,
}

fn parse_line(backend: &str, dialect: Dialect, line: &str) -> LineOutcome {
    match dialect {
        Dialect::Ndjson => {
            let record: serde_json::Value = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(_) => {
                    warn!("Invalid JSON from '{}': {:.100}", backend, line);
                    return LineOutcome::Skip;
                }
            };

            if record["done"].as_bool().unwrap_or(false) {
                // A final record may still carry text
                if let Some(text) = record["response"].as_str() {
                    if !text.is_empty() {
                        return LineOutcome::Text(text.to_string());
                    }
                }
                return LineOutcome::Done;
            }

            match record["response"].as_str() {
                Some(text) => LineOutcome::Text(text.to_string()),
                None => LineOutcome::Skip,
            }
        }
        Dialect::Sse => {
            let Some(payload) = line.strip_prefix("data: ") else {
                return LineOutcome::Skip;
            };

            if payload == "[DONE]" {
                return LineOutcome::Done;
            }

            let record: serde_json::Value = match serde_json::from_str(payload) {
                Ok(record) => record,
                Err(_) => {
                    warn!("Invalid JSON in SSE from '{}': {:.100}", backend, payload);
                    return LineOutcome::Skip;
                }
            };

            match record["choices"][0]["delta"]["content"].as_str() {
                Some(text) => LineOutcome::Text(text.to_string()),
                None => LineOutcome::Skip,
            }
        }
    }
}
