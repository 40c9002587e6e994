//! Cross-component wiring tests: config through classification, routing,
//! and introspection.

use relay_config::{parse_config_from_str, validate_config};
use relay_runtime::{classify, Latency, Orchestrator, TaskType};
use std::io::Write;
use std::path::PathBuf;

fn sample_config() -> &'static str {
    r#"
backends:
  qwen:
    type: cli
    executable: "true"
  ollama_local:
    type: http
    base_url: "http://localhost:11434"
    api_type: ndjson
    default_model: "llama3.2"
    preferred_models: ["qwen2.5-coder", "llama"]
  lmstudio:
    type: http
    enabled: false
    base_url: "http://localhost:1234"
    api_type: sse

routing:
  quick_query:
    primary: ollama_local
    fallback: [qwen]
    timeout_seconds: 60
  codebase_analysis:
    primary: qwen
    fallback: [ollama_local]
    parallel_threshold: 20
    timeout_seconds: 600

execution:
  timeout_seconds: 300
  max_retries: 2
  max_workers: 3
"#
}

#[test]
fn config_parses_and_validates() {
    let config = parse_config_from_str(sample_config()).unwrap();
    validate_config(&config).unwrap();

    assert_eq!(config.backends.len(), 3);
    assert_eq!(config.routing.len(), 2);
    assert!(!config.backends["lmstudio"].enabled());
}

#[test]
fn classification_matches_routing_tags() {
    let config = parse_config_from_str(sample_config()).unwrap();

    // Every rule key corresponds to a producible task type
    let c = classify("What is 2 + 2?", &Vec::<PathBuf>::new());
    assert_eq!(c.task_type, TaskType::QuickQuery);
    assert!(config.routing.contains_key(c.task_type.as_str()));
}

#[tokio::test]
async fn orchestrator_builds_adapters_for_enabled_backends() {
    let config = parse_config_from_str(sample_config()).unwrap();
    let orchestrator = Orchestrator::new(config);

    let listing = orchestrator.list_backends().await;
    let listing = listing.as_object().unwrap();

    assert_eq!(listing.len(), 3);
    assert_eq!(listing["qwen"]["enabled"], true);
    assert_eq!(listing["qwen"]["metadata"]["type"], "cli");
    assert_eq!(listing["ollama_local"]["metadata"]["type"], "http");
    assert_eq!(
        listing["ollama_local"]["metadata"]["base_url"],
        "http://localhost:11434"
    );

    // Disabled backends are listed but unhealthy and carry bare metadata
    assert_eq!(listing["lmstudio"]["enabled"], false);
    assert_eq!(listing["lmstudio"]["healthy"], false);
}

#[tokio::test]
async fn routing_rules_introspection_round_trips() {
    let config = parse_config_from_str(sample_config()).unwrap();
    let orchestrator = Orchestrator::new(config);

    let rules = orchestrator.routing_rules();
    assert_eq!(rules["quick_query"]["primary"], "ollama_local");
    assert_eq!(rules["quick_query"]["fallback"][0], "qwen");
    assert_eq!(rules["codebase_analysis"]["parallel_threshold"], 20);
    assert_eq!(rules["codebase_analysis"]["timeout"], 600);
}

#[test]
fn large_file_sets_classify_for_parallel_execution() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..25)
        .map(|i| {
            let path = dir.path().join(format!("src_{i}.rs"));
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "// module {i}").unwrap();
            path
        })
        .collect();

    let c = classify("Review the architecture", &files);
    assert_eq!(c.task_type, TaskType::CodebaseAnalysis);
    assert!(c.parallel_hint);
    assert_eq!(c.estimated_latency, Latency::High);
    assert_eq!(c.file_count, 25);
}

#[tokio::test]
async fn health_snapshot_starts_empty_and_fills_on_probe() {
    let config = parse_config_from_str(sample_config()).unwrap();
    let orchestrator = Orchestrator::new(config);

    // list_backends probes everything, populating the cache
    let listing = orchestrator.list_backends().await;
    assert_eq!(listing["qwen"]["healthy"], true);

    // Invalidation clears the cached observation without erroring
    orchestrator.invalidate_health(Some("qwen"));
    orchestrator.invalidate_health(None);
}
