use std::path::Path;
use tracing::{debug, warn};

/// Per-file ceiling when inlining contents into a prompt.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Merges a prompt with bounded file contents into a single input slot.
///
/// Each readable file becomes a fenced block headed by `# File: <path>`;
/// the prompt text follows after all blocks. Missing and oversized files
/// are skipped. HTTP backends have no native file-reference syntax, so
/// this inlining is their only option.
pub fn assemble(prompt: &str, files: &[impl AsRef<Path>]) -> String {
    if files.is_empty() {
        return prompt.to_string();
    }

    let mut assembled = String::new();

    for file in files {
        let path = file.as_ref();
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => {
                warn!("File not found: {}", path.display());
                continue;
            }
        };

        if meta.len() > MAX_FILE_SIZE {
            warn!(
                "File too large ({} bytes), skipping: {}",
                meta.len(),
                path.display()
            );
            continue;
        }

        match std::fs::read(path) {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                assembled.push_str(&format!(
                    "\n\n# File: {}\n```\n{}\n```\n\n",
                    path.display(),
                    content
                ));
            }
            Err(e) => {
                debug!("Cannot read file {}: {}", path.display(), e);
            }
        }
    }

    assembled.push_str(&format!("\n\n{}", prompt));
    assembled
}

/// Builds the `@path` reference string CLI backends accept in place of
/// inlined contents.
pub fn file_references(files: &[impl AsRef<Path>]) -> String {
    let mut refs = String::new();
    for file in files {
        refs.push_str(&format!("@{} ", file.as_ref().display()));
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_assemble_without_files() {
        let files: Vec<PathBuf> = vec![];
        assert_eq!(assemble("just a prompt", &files), "just a prompt");
    }

    #[test]
    fn test_assemble_inlines_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "lib.rs", "pub fn answer() -> u32 { 42 }");

        let result = assemble("Review this", &[path.clone()]);

        assert!(result.contains(&format!("# File: {}", path.display())));
        assert!(result.contains("pub fn answer() -> u32 { 42 }"));
        assert!(result.contains("```"));
        // Prompt comes after all file blocks
        assert!(result.trim_end().ends_with("Review this"));
    }

    #[test]
    fn test_assemble_skips_missing_files() {
        let result = assemble(
            "prompt",
            &[PathBuf::from("/definitely/not/a/real/file.rs")],
        );
        assert!(!result.contains("# File:"));
        assert!(result.contains("prompt"));
    }

    #[test]
    fn test_assemble_skips_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let f = std::fs::File::create(&path).unwrap();
        f.set_len(MAX_FILE_SIZE + 1).unwrap();

        let result = assemble("prompt", &[path]);
        assert!(!result.contains("# File:"));
    }

    #[test]
    fn test_assemble_replaces_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binaryish.txt");
        std::fs::write(&path, [b'o', b'k', 0xff, 0xfe, b'!']).unwrap();

        let result = assemble("prompt", &[path]);
        assert!(result.contains("ok"));
        assert!(result.contains('\u{FFFD}'));
    }

    #[test]
    fn test_assemble_multiple_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(&dir, "a.rs", "mod a;");
        let b = write_file(&dir, "b.rs", "mod b;");

        let result = assemble("prompt", &[a.clone(), b.clone()]);
        let a_pos = result.find("a.rs").unwrap();
        let b_pos = result.find("b.rs").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn test_file_references() {
        let refs = file_references(&[PathBuf::from("/tmp/a.rs"), PathBuf::from("/tmp/b.rs")]);
        assert_eq!(refs, "@/tmp/a.rs @/tmp/b.rs ");
    }

    #[test]
    fn test_file_references_empty() {
        let files: Vec<PathBuf> = vec![];
        assert_eq!(file_references(&files), "");
    }
}
