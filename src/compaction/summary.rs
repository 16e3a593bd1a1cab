//! Compact renderings of worker results for downstream context.

use std::path::PathBuf;

use crate::worker::WorkerResult;

/// Files listed by name in a summary line before collapsing to `(+N more)`.
pub const MAX_LISTED_FILES: usize = 3;

/// One-line summary, e.g. `[CODER] ✓ | Changed: a, b, c (+2 more) | 2 issues | BLOCKED: reason`.
pub fn summary_line(result: &WorkerResult) -> String {
    let mut parts = vec![format!("[{}]", result.worker.to_uppercase())];

    if let Some(failure) = &result.failure {
        parts.push("✗".to_string());
        parts.push(format!("failed: {}", failure.message));
        return parts.join(" | ");
    }
    parts.push("✓".to_string());

    if !result.files_changed.is_empty() {
        let listed: Vec<String> = result
            .files_changed
            .iter()
            .take(MAX_LISTED_FILES)
            .map(|p| p.display().to_string())
            .collect();
        let mut changed = format!("Changed: {}", listed.join(", "));
        if result.files_changed.len() > MAX_LISTED_FILES {
            changed.push_str(&format!(
                " (+{} more)",
                result.files_changed.len() - MAX_LISTED_FILES
            ));
        }
        parts.push(changed);
    }

    if !result.issues.is_empty() {
        let critical = result
            .issues
            .iter()
            .filter(|i| i.trim_start().to_lowercase().starts_with("critical"))
            .count();
        if critical > 0 {
            parts.push(format!("{} critical", critical));
        }
        parts.push(format!(
            "{} issue{}",
            result.issues.len(),
            if result.issues.len() == 1 { "" } else { "s" }
        ));
    }

    if result.blocked {
        parts.push(format!(
            "BLOCKED: {}",
            result.block_reason.as_deref().unwrap_or("no reason given")
        ));
    }

    let summary = result.summary.lines().next().unwrap_or("").trim();
    if !summary.is_empty() {
        parts.push(summary.to_string());
    }

    parts.join(" | ")
}

/// Task hints first, then files touched by recent results, without duplicates.
pub fn merge_file_hints(task_hints: &[PathBuf], recent: &[WorkerResult]) -> Vec<PathBuf> {
    let mut merged: Vec<PathBuf> = Vec::new();
    let candidates = task_hints
        .iter()
        .chain(recent.iter().flat_map(|r| r.files_changed.iter()));
    for path in candidates {
        if !merged.contains(path) {
            merged.push(path.clone());
        }
    }
    merged
}

/// Multi-line context block for display and prompts.
pub fn render_context(recent: &[WorkerResult]) -> String {
    recent.iter().map(summary_line).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InvocationError;
    use std::time::Duration;

    #[test]
    fn test_summary_line_collapses_files() {
        let result = WorkerResult::new("coder", "Added login\nmore detail")
            .with_files(["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"])
            .with_issues(["warning: x", "info: y"]);
        assert_eq!(
            summary_line(&result),
            "[CODER] ✓ | Changed: a.rs, b.rs, c.rs (+2 more) | 2 issues | Added login"
        );
    }

    #[test]
    fn test_summary_line_blocked() {
        let result = WorkerResult::new("security", "")
            .with_issues(["critical: SQL injection"])
            .blocked_by("SQL injection");
        assert_eq!(
            summary_line(&result),
            "[SECURITY] ✓ | 1 critical | 1 issue | BLOCKED: SQL injection"
        );
    }

    #[test]
    fn test_summary_line_failed() {
        let err = InvocationError::Malformed("worker produced no output".into());
        let result = WorkerResult::failed("tester", &err, Duration::ZERO);
        let line = summary_line(&result);
        assert!(line.starts_with("[TESTER] ✗ | failed: "));
        assert!(line.contains("no output"));
    }

    #[test]
    fn test_merge_file_hints_dedupes() {
        let recent = vec![
            WorkerResult::new("coder", "").with_files(["src/a.rs", "src/b.rs"]),
            WorkerResult::new("tester", "").with_files(["tests/a.rs", "src/a.rs"]),
        ];
        let merged = merge_file_hints(&[PathBuf::from("src/b.rs")], &recent);
        assert_eq!(
            merged,
            vec![
                PathBuf::from("src/b.rs"),
                PathBuf::from("src/a.rs"),
                PathBuf::from("tests/a.rs"),
            ]
        );
    }

    #[test]
    fn test_render_context_one_line_per_result() {
        let recent = vec![WorkerResult::new("coder", "x"), WorkerResult::new("docs", "y")];
        assert_eq!(render_context(&recent).lines().count(), 2);
    }
}
