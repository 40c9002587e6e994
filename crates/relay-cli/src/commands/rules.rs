use anyhow::Result;
use relay_config::RelayConfig;
use relay_runtime::Orchestrator;

pub fn execute(config: RelayConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(config);
    let rules = orchestrator.routing_rules();
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}
