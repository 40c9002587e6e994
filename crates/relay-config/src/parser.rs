use crate::{ConfigError, RelayConfig, Result};
use std::path::Path;

pub fn parse_config(path: &Path) -> Result<RelayConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;

    parse_config_from_str(&content)
}

pub fn parse_config_from_str(yaml: &str) -> Result<RelayConfig> {
    serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    #[test]
    fn test_parse_config_from_str_minimal() {
        let yaml = r#"
backends:
  ollama_local:
    type: http
    base_url: "http://localhost:11434"
    api_type: ndjson
    default_model: "llama3.2"
"#;
        let result = parse_config_from_str(yaml);
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.backends.len(), 1);
        assert!(config.backends["ollama_local"].enabled());
        assert_eq!(config.backends["ollama_local"].kind(), "http");
        assert_eq!(config.execution.max_retries, 2);
        assert_eq!(config.execution.timeout_seconds, 300);
    }

    #[test]
    fn test_parse_config_invalid_yaml() {
        let yaml = "invalid: yaml: structure: [[[";
        let result = parse_config_from_str(yaml);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_parse_config_from_file_not_found() {
        let result = parse_config(Path::new("/nonexistent/file.yaml"));
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_, _)));
    }

    #[test]
    fn test_parse_config_with_both_backend_kinds() {
        let yaml = r#"
backends:
  qwen:
    type: cli
    executable: "qwen"

  lmstudio:
    type: http
    enabled: false
    base_url: "http://localhost:1234"
    api_type: sse
    preferred_models: ["qwen2.5-coder", "deepseek"]
    max_retries: 3
    retry_delay: 1

routing:
  quick_query:
    primary: lmstudio
    fallback: [qwen]
    timeout_seconds: 60

execution:
  timeout_seconds: 120
  max_retries: 1
  retry_on_failure: true
  max_workers: 2
"#;
        let config = parse_config_from_str(yaml).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert!(!config.backends["lmstudio"].enabled());

        match &config.backends["lmstudio"] {
            BackendDef::Http {
                api_type,
                preferred_models,
                max_retries,
                retry_delay,
                ..
            } => {
                assert_eq!(*api_type, Dialect::Sse);
                assert_eq!(preferred_models.len(), 2);
                assert_eq!(*max_retries, 3);
                assert_eq!(*retry_delay, 1);
            }
            BackendDef::Cli { .. } => panic!("expected http backend"),
        }

        let rule = &config.routing["quick_query"];
        assert_eq!(rule.primary, "lmstudio");
        assert_eq!(rule.fallback, vec!["qwen".to_string()]);
        assert_eq!(rule.timeout_seconds, Some(60));
        assert_eq!(config.execution.max_workers, 2);
    }

    #[test]
    fn test_parse_config_rejects_unknown_top_level_key() {
        let yaml = r#"
backends: {}
cluster:
  nodes: 3
"#;
        assert!(parse_config_from_str(yaml).is_err());
    }

    #[test]
    fn test_http_defaults() {
        let yaml = r#"
backends:
  ollama:
    type: http
    base_url: "http://localhost:11434"
"#;
        let config = parse_config_from_str(yaml).unwrap();
        match &config.backends["ollama"] {
            BackendDef::Http {
                api_type,
                auto_start,
                auto_detect_model,
                max_retries,
                retry_delay,
                default_model,
                ..
            } => {
                assert_eq!(*api_type, Dialect::Ndjson);
                assert!(auto_start);
                assert!(auto_detect_model);
                assert_eq!(*max_retries, 2);
                assert_eq!(*retry_delay, 2);
                assert!(default_model.is_none());
            }
            BackendDef::Cli { .. } => panic!("expected http backend"),
        }
    }
}
