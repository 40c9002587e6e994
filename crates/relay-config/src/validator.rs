use crate::{BackendDef, ConfigError, RelayConfig, Result, TASK_TYPE_TAGS};

pub fn validate_config(config: &RelayConfig) -> Result<()> {
    for (name, backend) in &config.backends {
        validate_backend(name, backend)?;
    }

    for (tag, rule) in &config.routing {
        if !TASK_TYPE_TAGS.contains(&tag.as_str()) {
            return Err(ConfigError::UnknownTaskType(tag.clone()));
        }

        // Every rule must reference backends that exist in the descriptor table
        for backend in std::iter::once(&rule.primary).chain(rule.fallback.iter()) {
            if !config.backends.contains_key(backend) {
                return Err(ConfigError::UnknownBackend {
                    rule: tag.clone(),
                    backend: backend.clone(),
                });
            }
        }
    }

    if config.execution.max_workers == 0 {
        return Err(ConfigError::ValidationError(
            "execution.max_workers must be at least 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_backend(name: &str, backend: &BackendDef) -> Result<()> {
    match backend {
        BackendDef::Cli { executable, .. } => {
            if executable.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{}' has an empty executable",
                    name
                )));
            }
        }
        BackendDef::Http { base_url, .. } => {
            let parsed = url::Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl {
                backend: name.to_string(),
                reason: e.to_string(),
            })?;

            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidBaseUrl {
                    backend: name.to_string(),
                    reason: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config_from_str;

    fn valid_yaml() -> &'static str {
        r#"
backends:
  qwen:
    type: cli
    executable: "qwen"
  ollama_local:
    type: http
    base_url: "http://localhost:11434"

routing:
  quick_query:
    primary: ollama_local
    fallback: [qwen]
"#
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        let config = parse_config_from_str(valid_yaml()).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_task_type() {
        let yaml = r#"
backends:
  qwen:
    type: cli
    executable: "qwen"

routing:
  poetry_critique:
    primary: qwen
"#;
        let config = parse_config_from_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTaskType(_)));
    }

    #[test]
    fn test_validate_rejects_rule_with_unknown_backend() {
        let yaml = r#"
backends:
  qwen:
    type: cli
    executable: "qwen"

routing:
  debugging:
    primary: qwen
    fallback: [phantom]
"#;
        let config = parse_config_from_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err();
        match err {
            ConfigError::UnknownBackend { rule, backend } => {
                assert_eq!(rule, "debugging");
                assert_eq!(backend, "phantom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let yaml = r#"
backends:
  weird:
    type: http
    base_url: "ftp://example.com"
"#;
        let config = parse_config_from_str(yaml).unwrap();
        assert!(matches!(
            validate_config(&config).unwrap_err(),
            ConfigError::InvalidBaseUrl { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_empty_executable() {
        let yaml = r#"
backends:
  blank:
    type: cli
    executable: "  "
"#;
        let config = parse_config_from_str(yaml).unwrap();
        assert!(matches!(
            validate_config(&config).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let yaml = r#"
backends:
  qwen:
    type: cli
    executable: "qwen"

execution:
  max_workers: 0
"#;
        let config = parse_config_from_str(yaml).unwrap();
        assert!(validate_config(&config).is_err());
    }
}
