use crate::classifier::Classification;
use crate::health::HealthMonitor;
use crate::{Error, Result};
use relay_config::RelayConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How the selected backends will be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Single,
    Parallel,
    Broadcast,
}

/// Routing output for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub primary: String,
    pub fallback: Vec<String>,
    pub mode: ExecutionMode,
    pub timeout: Duration,
}

/// Maps a classification to backends using the rule table, health-gated.
pub struct Router {
    config: Arc<RelayConfig>,
    health: Arc<HealthMonitor>,
}

impl Router {
    pub fn new(config: Arc<RelayConfig>, health: Arc<HealthMonitor>) -> Self {
        Self { config, health }
    }

    /// Picks the first healthy candidate for the classified task.
    ///
    /// Rule lookup falls back to the classifier's recommendations when no
    /// rule covers the task type. Fails with `NoServiceAvailable` when
    /// every candidate is unhealthy.
    pub async fn route(&self, classification: &Classification) -> Result<Decision> {
        let tag = classification.task_type.as_str();
        let rule = self.config.routing.get(tag);

        let candidates: Vec<String> = match rule {
            Some(rule) => std::iter::once(rule.primary.clone())
                .chain(rule.fallback.iter().cloned())
                .collect(),
            None => {
                warn!(
                    "No routing rule for {}, using classifier recommendations",
                    tag
                );
                classification.recommended_backends.clone()
            }
        };

        // Decisions only ever name backends that exist and are enabled
        let candidates: Vec<String> = candidates
            .into_iter()
            .filter(|name| {
                self.config
                    .backends
                    .get(name)
                    .map(|b| b.enabled())
                    .unwrap_or(false)
            })
            .collect();

        let mut selected = None;
        for (index, candidate) in candidates.iter().enumerate() {
            if self.health.probe(candidate).await {
                if index > 0 {
                    info!(
                        "Primary '{}' unavailable, using fallback '{}'",
                        candidates[0], candidate
                    );
                }
                selected = Some(index);
                break;
            }
        }

        let Some(selected) = selected else {
            return Err(Error::NoServiceAvailable {
                task_type: tag.to_string(),
            });
        };

        let parallel_allowed = rule
            .and_then(|r| r.parallel_threshold)
            .map(|threshold| classification.file_count > threshold)
            .unwrap_or(false);

        let mode = if classification.parallel_hint && parallel_allowed {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Single
        };

        let timeout = rule
            .and_then(|r| r.timeout_seconds)
            .unwrap_or(self.config.execution.timeout_seconds);

        let decision = Decision {
            primary: candidates[selected].clone(),
            fallback: candidates[selected + 1..].to_vec(),
            mode,
            timeout: Duration::from_secs(timeout),
        };

        info!(
            "Routed {} to {} (mode={:?}, timeout={}s)",
            tag,
            decision.primary,
            decision.mode,
            timeout
        );

        Ok(decision)
    }

    /// Broadcast decision over every enabled backend, for comparison runs.
    pub fn route_broadcast(&self) -> Result<Decision> {
        let mut enabled: Vec<String> = self
            .config
            .backends
            .iter()
            .filter(|(_, backend)| backend.enabled())
            .map(|(name, _)| name.clone())
            .collect();

        if enabled.is_empty() {
            return Err(Error::NoServiceAvailable {
                task_type: "broadcast".to_string(),
            });
        }

        let primary = enabled.remove(0);
        Ok(Decision {
            primary,
            fallback: enabled,
            mode: ExecutionMode::Broadcast,
            timeout: Duration::from_secs(self.config.execution.timeout_seconds),
        })
    }

    /// Introspection dump of the rule table.
    pub fn rules_summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();
        for (tag, rule) in &self.config.routing {
            summary.insert(
                tag.clone(),
                serde_json::json!({
                    "primary": rule.primary,
                    "fallback": rule.fallback,
                    "parallel_threshold": rule.parallel_threshold,
                    "timeout": rule.timeout_seconds,
                }),
            );
        }
        serde_json::Value::Object(summary)
    }
}
