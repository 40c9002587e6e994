use anyhow::Result;
use relay_config::RelayConfig;
use relay_runtime::Orchestrator;

pub async fn execute(config: RelayConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(config);
    let listing = orchestrator.list_backends().await;
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
