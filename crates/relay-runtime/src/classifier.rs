use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Categorical task tags driving routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodebaseAnalysis,
    CodeReview,
    CodeGeneration,
    QuickQuery,
    ArchitectureDesign,
    Debugging,
    Documentation,
    Refactoring,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CodebaseAnalysis => "codebase_analysis",
            TaskType::CodeReview => "code_review",
            TaskType::CodeGeneration => "code_generation",
            TaskType::QuickQuery => "quick_query",
            TaskType::ArchitectureDesign => "architecture_design",
            TaskType::Debugging => "debugging",
            TaskType::Documentation => "documentation",
            TaskType::Refactoring => "refactoring",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected latency band for a classified task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Latency {
    Low,
    Medium,
    High,
}

/// Classification record produced per request, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub task_type: TaskType,
    pub file_count: usize,
    pub total_size_bytes: u64,
    /// Weighted blend of file count, total size, and prompt length in [0, 1].
    pub complexity_score: f64,
    pub recommended_backends: Vec<String>,
    pub parallel_hint: bool,
    pub estimated_latency: Latency,
}

// Thresholds
const LARGE_CODEBASE_FILES: usize = 20;
const LARGE_CODEBASE_SIZE: u64 = 500_000;
const QUICK_QUERY_MAX_PROMPT_LENGTH: usize = 200;

// Keyword sets, matched in this fixed order; first non-empty
// intersection wins.
const REVIEW_KEYWORDS: [&str; 6] = ["review", "analyze", "check", "audit", "inspect", "examine"];
const GENERATION_KEYWORDS: [&str; 7] = [
    "write",
    "create",
    "generate",
    "implement",
    "build",
    "add",
    "make",
];
const DEBUG_KEYWORDS: [&str; 7] = [
    "debug", "fix", "bug", "error", "issue", "problem", "broken",
];
const REFACTOR_KEYWORDS: [&str; 5] = ["refactor", "improve", "optimize", "clean", "restructure"];
const DOCUMENTATION_KEYWORDS: [&str; 6] = [
    "document", "docs", "readme", "comment", "explain", "describe",
];
const ARCHITECTURE_KEYWORDS: [&str; 5] = [
    "architecture",
    "design",
    "structure",
    "pattern",
    "system",
];

/// Classifies a task from its prompt and file set.
///
/// Deterministic: the result depends only on the prompt text, file count,
/// and on-disk file sizes (missing files contribute zero).
pub fn classify(prompt: &str, files: &[impl AsRef<Path>]) -> Classification {
    let file_count = files.len();
    let total_size = total_file_size(files);

    let task_type = determine_task_type(prompt, file_count, total_size);
    let complexity_score = complexity(file_count, total_size, prompt.chars().count());
    let recommended_backends = recommend_backends(task_type);
    let parallel_hint = task_type == TaskType::CodebaseAnalysis && file_count > LARGE_CODEBASE_FILES;
    let estimated_latency = estimate_latency(task_type, file_count);

    info!(
        "Classified task: type={}, files={}, size={}, complexity={:.2}, parallel={}",
        task_type, file_count, total_size, complexity_score, parallel_hint
    );

    Classification {
        task_type,
        file_count,
        total_size_bytes: total_size,
        complexity_score,
        recommended_backends,
        parallel_hint,
        estimated_latency,
    }
}

fn determine_task_type(prompt: &str, file_count: usize, total_size: u64) -> TaskType {
    if file_count > LARGE_CODEBASE_FILES || total_size > LARGE_CODEBASE_SIZE {
        return TaskType::CodebaseAnalysis;
    }

    if file_count == 0 && prompt.chars().count() < QUICK_QUERY_MAX_PROMPT_LENGTH {
        return TaskType::QuickQuery;
    }

    let lowered = prompt.to_lowercase();
    let words: HashSet<&str> = lowered.split_whitespace().collect();

    let keyword_sets: [(&[&str], TaskType); 6] = [
        (&REVIEW_KEYWORDS, TaskType::CodeReview),
        (&GENERATION_KEYWORDS, TaskType::CodeGeneration),
        (&DEBUG_KEYWORDS, TaskType::Debugging),
        (&REFACTOR_KEYWORDS, TaskType::Refactoring),
        (&DOCUMENTATION_KEYWORDS, TaskType::Documentation),
        (&ARCHITECTURE_KEYWORDS, TaskType::ArchitectureDesign),
    ];

    for (keywords, task_type) in keyword_sets {
        if keywords.iter().any(|k| words.contains(k)) {
            return task_type;
        }
    }

    if file_count > 0 {
        TaskType::CodeReview
    } else {
        TaskType::QuickQuery
    }
}

fn complexity(file_count: usize, total_size: u64, prompt_length: usize) -> f64 {
    let file_factor = (file_count as f64 / 100.0).min(1.0);
    let size_factor = (total_size as f64 / (5.0 * 1024.0 * 1024.0)).min(1.0);
    let prompt_factor = (prompt_length as f64 / 1000.0).min(1.0);

    let score = 0.4 * file_factor + 0.4 * size_factor + 0.2 * prompt_factor;
    (score * 100.0).round() / 100.0
}

fn recommend_backends(task_type: TaskType) -> Vec<String> {
    let names: &[&str] = match task_type {
        TaskType::CodebaseAnalysis => &["gemini", "qwen"],
        TaskType::CodeReview => &["qwen", "ollama_local"],
        TaskType::CodeGeneration => &["qwen", "ollama_local"],
        TaskType::QuickQuery => &["ollama_local", "ollama_remote"],
        TaskType::ArchitectureDesign => &["gemini", "qwen"],
        TaskType::Debugging => &["qwen", "ollama_local"],
        TaskType::Documentation => &["ollama_local", "qwen"],
        TaskType::Refactoring => &["qwen", "ollama_local"],
    };
    names.iter().map(|s| s.to_string()).collect()
}

fn estimate_latency(task_type: TaskType, file_count: usize) -> Latency {
    if task_type == TaskType::QuickQuery {
        return Latency::Low;
    }
    if task_type == TaskType::CodebaseAnalysis || file_count > 50 {
        return Latency::High;
    }
    Latency::Medium
}

fn total_file_size(files: &[impl AsRef<Path>]) -> u64 {
    let mut total = 0;
    for file in files {
        match std::fs::metadata(file.as_ref()) {
            Ok(meta) if meta.is_file() => total += meta.len(),
            Ok(_) => {}
            Err(e) => debug!("Cannot get size of {}: {}", file.as_ref().display(), e),
        }
    }
    total
}
