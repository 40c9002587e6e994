use async_trait::async_trait;
use relay_config::Dialect;

/// Everything the supervisor needs to bring a backend up.
#[derive(Debug, Clone)]
pub struct SupervisorRequest {
    pub name: String,
    pub base_url: String,
    pub dialect: Dialect,
    pub auto_start: bool,
    pub auto_detect_model: bool,
    pub preferred_models: Vec<String>,
}

/// Outcome of a supervision attempt.
#[derive(Debug, Clone, Default)]
pub struct SupervisorReport {
    pub healthy: bool,
    pub models: Vec<String>,
    pub recommended_model: Option<String>,
    pub error: Option<String>,
}

/// Collaborator responsible for spawning local daemons when absent.
///
/// The runtime treats it as an opaque callable: adapters ask it to make a
/// backend healthy before first use and act on the report. Injected at
/// construction; deployments without local daemon management use
/// [`NoopSupervisor`].
#[async_trait]
pub trait ServiceSupervisor: Send + Sync {
    async fn ensure_healthy(&self, request: SupervisorRequest) -> SupervisorReport;
}

/// Supervisor that never starts anything.
pub struct NoopSupervisor;

#[async_trait]
impl ServiceSupervisor for NoopSupervisor {
    async fn ensure_healthy(&self, request: SupervisorRequest) -> SupervisorReport {
        SupervisorReport {
            healthy: false,
            error: Some(format!(
                "no supervisor configured to start '{}'",
                request.name
            )),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_supervisor_reports_unhealthy() {
        let supervisor = NoopSupervisor;
        let report = supervisor
            .ensure_healthy(SupervisorRequest {
                name: "ollama_local".to_string(),
                base_url: "http://localhost:11434".to_string(),
                dialect: Dialect::Ndjson,
                auto_start: true,
                auto_detect_model: true,
                preferred_models: vec![],
            })
            .await;

        assert!(!report.healthy);
        assert!(report.error.unwrap().contains("ollama_local"));
    }
}
