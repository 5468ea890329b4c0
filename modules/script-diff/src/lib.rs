//! Line-level diff between two script versions with derived statistics.
//!
//! Stateless and target-agnostic; the scan layer decides when two versions
//! are worth comparing.

use anyhow::Result;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

/// Best-effort source formatting applied before diffing. Minified bundles
/// diff poorly line-by-line; a formatter restores line structure. Failure
/// is never an error for the diff itself.
pub trait SourceFormatter {
    fn format(&self, source: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Unchanged,
}

/// A run of consecutive lines sharing one tag, literal text included.
#[derive(Debug, Clone, Serialize)]
pub struct DiffSegment {
    pub kind: ChangeKind,
    pub text: String,
}

/// One added or removed line, numbered 1-based within its own version.
#[derive(Debug, Clone, Serialize)]
pub struct LineChange {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub unchanged: usize,
    /// (additions + deletions) / max(old line count, 1) * 100, two decimals.
    pub change_percent: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffChanges {
    pub added: Vec<LineChange>,
    pub removed: Vec<LineChange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    pub segments: Vec<DiffSegment>,
    pub stats: DiffStats,
    pub changes: DiffChanges,
}

/// Diff two texts after an optional formatting pass. A formatter error
/// silently falls back to the unformatted input.
pub fn diff_with_formatter(
    old: &str,
    new: &str,
    formatter: Option<&dyn SourceFormatter>,
) -> DiffResult {
    match formatter {
        Some(f) => {
            let old_fmt = apply_formatter(f, old);
            let new_fmt = apply_formatter(f, new);
            diff(&old_fmt, &new_fmt)
        }
        None => diff(old, new),
    }
}

fn apply_formatter(f: &dyn SourceFormatter, source: &str) -> String {
    match f.format(source) {
        Ok(formatted) => formatted,
        Err(e) => {
            tracing::debug!(error = %e, "formatter rejected input, diffing raw text");
            source.to_string()
        }
    }
}

/// Line-granularity diff of `old` against `new`.
pub fn diff(old: &str, new: &str) -> DiffResult {
    let text_diff = TextDiff::from_lines(old, new);

    let mut segments: Vec<DiffSegment> = Vec::new();
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let (mut additions, mut deletions, mut unchanged) = (0usize, 0usize, 0usize);
    // Added lines are numbered against the new text, removed lines against
    // the old text; the two counters advance independently.
    let mut old_line = 1usize;
    let mut new_line = 1usize;

    for change in text_diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => ChangeKind::Unchanged,
            ChangeTag::Delete => ChangeKind::Removed,
            ChangeTag::Insert => ChangeKind::Added,
        };
        let raw = change.value();
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        match kind {
            ChangeKind::Unchanged => {
                if !line.is_empty() {
                    unchanged += 1;
                }
                old_line += 1;
                new_line += 1;
            }
            ChangeKind::Added => {
                if !line.is_empty() {
                    additions += 1;
                    added.push(LineChange { line: new_line, text: line.to_string() });
                }
                new_line += 1;
            }
            ChangeKind::Removed => {
                if !line.is_empty() {
                    deletions += 1;
                    removed.push(LineChange { line: old_line, text: line.to_string() });
                }
                old_line += 1;
            }
        }
        match segments.last_mut() {
            Some(seg) if seg.kind == kind => seg.text.push_str(raw),
            _ => segments.push(DiffSegment { kind, text: raw.to_string() }),
        }
    }

    let total_old_lines = deletions + unchanged;
    let change_percent =
        (additions + deletions) as f64 / total_old_lines.max(1) as f64 * 100.0;

    DiffResult {
        segments,
        stats: DiffStats {
            additions,
            deletions,
            unchanged,
            change_percent: format!("{:.2}", change_percent),
        },
        changes: DiffChanges { added, removed },
    }
}

/// Render the segment stream with +/-/space prefixes, capped at `max_lines`
/// emitted lines before an explicit truncation marker. `max_lines = 0`
/// means no cap.
pub fn format_for_terminal(result: &DiffResult, max_lines: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    for seg in &result.segments {
        let prefix = match seg.kind {
            ChangeKind::Added => "+",
            ChangeKind::Removed => "-",
            ChangeKind::Unchanged => " ",
        };
        for line in seg.text.lines() {
            lines.push(format!("{} {}", prefix, line));
        }
    }
    if max_lines > 0 && lines.len() > max_lines {
        let hidden = lines.len() - max_lines;
        lines.truncate(max_lines);
        lines.push(format!("... ({} more lines)", hidden));
    }
    lines.join("\n")
}
