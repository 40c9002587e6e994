//! # relay-config
//!
//! Configuration parsing and validation for the relay orchestrator.
//!
//! Backend descriptors, routing rules, and execution limits are loaded from
//! YAML into immutable tables at startup. The runtime never mutates them.
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_config::{parse_config_from_str, validate_config};
//!
//! let yaml = r#"
//! backends:
//!   ollama_local:
//!     type: http
//!     base_url: "http://localhost:11434"
//!     api_type: ndjson
//!     default_model: "llama3.2"
//!
//! routing:
//!   quick_query:
//!     primary: ollama_local
//! "#;
//!
//! let config = parse_config_from_str(yaml).expect("valid config");
//! validate_config(&config).expect("validation passes");
//!
//! assert_eq!(config.backends.len(), 1);
//! assert_eq!(config.routing["quick_query"].primary, "ollama_local");
//! ```
//!
//! ## Validation Rules
//!
//! - Routing-rule keys must be one of the eight task-type tags
//! - Every rule must reference backends present in the descriptor table
//! - HTTP base URLs must parse with an http/https scheme
//! - CLI executables must be non-empty

pub mod error;
pub mod parser;
pub mod types;
pub mod validator;

pub use error::{ConfigError, Result};
pub use parser::{parse_config, parse_config_from_str};
pub use types::*;
pub use validator::validate_config;
