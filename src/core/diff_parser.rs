use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rendered when the filtered file set is empty. The orchestrator treats a
/// diff equal to this sentinel as "nothing to review".
pub const NO_CHANGES_SENTINEL: &str = "No code changes to review.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeType {
    fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Renamed => "renamed",
        }
    }
}

/// A single line with its position in the old or new file, depending on
/// which collection it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    /// Context lines seen before the first add/remove in the hunk.
    pub context_before: Vec<LineEntry>,
    /// Removed lines, numbered against the old file.
    pub removed_lines: Vec<LineEntry>,
    /// Added lines, numbered against the new file.
    pub added_lines: Vec<LineEntry>,
    /// Every context line after the first add/remove, regardless of how many
    /// change runs follow.
    pub context_after: Vec<LineEntry>,
}

impl DiffHunk {
    fn new(old_start: usize, old_count: usize, new_start: usize, new_count: usize) -> Self {
        Self {
            old_start,
            old_count,
            new_start,
            new_count,
            context_before: Vec::new(),
            removed_lines: Vec::new(),
            added_lines: Vec::new(),
            context_after: Vec::new(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.added_lines.is_empty() || !self.removed_lines.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffFile {
    pub path: String,
    pub change_type: ChangeType,
    pub hunks: Vec<DiffHunk>,
}

static HUNK_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

static TARGET_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"b/(.+)$").unwrap());

/// Parser state: at most one file and one hunk open at a time. Closing a
/// hunk flushes it into its file; closing a file flushes it into the result.
enum ParseState {
    NoFile,
    InFile {
        file: DiffFile,
    },
    InHunk {
        file: DiffFile,
        hunk: DiffHunk,
        old_line: usize,
        new_line: usize,
    },
}

impl ParseState {
    /// Close an open hunk, dropping back to `InFile`.
    fn close_hunk(self) -> ParseState {
        match self {
            ParseState::InHunk {
                mut file, hunk, ..
            } => {
                file.hunks.push(hunk);
                ParseState::InFile { file }
            }
            other => other,
        }
    }

    /// Close an open file (and any open hunk) into `files`.
    fn close_file(self, files: &mut Vec<DiffFile>) {
        if let ParseState::InFile { file } = self.close_hunk() {
            files.push(file);
        }
    }

    fn file_mut(&mut self) -> Option<&mut DiffFile> {
        match self {
            ParseState::NoFile => None,
            ParseState::InFile { file } => Some(file),
            ParseState::InHunk { file, .. } => Some(file),
        }
    }
}

/// Best-effort unified-diff parser. Malformed or unrecognized lines are
/// skipped, never fatal: this is a review front-end, not a diff validator,
/// and hardening it would reject diffs git itself happily produces.
pub struct DiffParser;

impl DiffParser {
    pub fn parse(raw_diff: &str) -> Vec<DiffFile> {
        let mut files = Vec::new();
        let mut state = ParseState::NoFile;

        for line in raw_diff.lines() {
            if line.starts_with("diff --git") {
                state.close_file(&mut files);
                let path = TARGET_PATH_RE
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                state = ParseState::InFile {
                    file: DiffFile {
                        path,
                        change_type: ChangeType::Modified,
                        hunks: Vec::new(),
                    },
                };
            } else if line.starts_with("new file mode") {
                if let Some(file) = state.file_mut() {
                    file.change_type = ChangeType::Added;
                }
            } else if line.starts_with("deleted file mode") {
                if let Some(file) = state.file_mut() {
                    file.change_type = ChangeType::Deleted;
                }
            } else if line.starts_with("rename from") {
                if let Some(file) = state.file_mut() {
                    file.change_type = ChangeType::Renamed;
                }
            } else if line.starts_with("---") {
                // Source-file header; the +++ line is authoritative.
            } else if line.starts_with("+++") {
                if let Some(captures) = TARGET_PATH_RE.captures(line) {
                    if let Some(file) = state.file_mut() {
                        file.path = captures[1].to_string();
                    }
                }
            } else if line.starts_with("@@") {
                state = match (HUNK_HEADER_RE.captures(line), state.close_hunk()) {
                    (Some(captures), ParseState::InFile { file }) => {
                        let old_start = parse_number(captures.get(1), 0);
                        let old_count = parse_number(captures.get(2), 1);
                        let new_start = parse_number(captures.get(3), 0);
                        let new_count = parse_number(captures.get(4), 1);
                        ParseState::InHunk {
                            file,
                            hunk: DiffHunk::new(old_start, old_count, new_start, new_count),
                            old_line: old_start,
                            new_line: new_start,
                        }
                    }
                    // Malformed header or no open file: skip the line.
                    (_, other) => other,
                };
            } else if let ParseState::InHunk {
                hunk,
                old_line,
                new_line,
                ..
            } = &mut state
            {
                if let Some(content) = line.strip_prefix(' ') {
                    let entry = LineEntry {
                        line: *new_line,
                        content: content.to_string(),
                    };
                    if hunk.has_changes() {
                        hunk.context_after.push(entry);
                    } else {
                        hunk.context_before.push(entry);
                    }
                    *old_line += 1;
                    *new_line += 1;
                } else if let Some(content) = line.strip_prefix('-') {
                    hunk.removed_lines.push(LineEntry {
                        line: *old_line,
                        content: content.to_string(),
                    });
                    *old_line += 1;
                } else if let Some(content) = line.strip_prefix('+') {
                    hunk.added_lines.push(LineEntry {
                        line: *new_line,
                        content: content.to_string(),
                    });
                    *new_line += 1;
                }
                // Anything else inside a hunk ("\ No newline at end of file",
                // garbage) is skipped without moving the counters.
            }
        }

        state.close_file(&mut files);
        files
    }

    /// Drop deleted files, then apply the file-acceptance predicate.
    /// Appearance order of the survivors is preserved.
    pub fn filter_files<F>(files: Vec<DiffFile>, is_eligible: F) -> Vec<DiffFile>
    where
        F: Fn(&str) -> bool,
    {
        files
            .into_iter()
            .filter(|f| f.change_type != ChangeType::Deleted)
            .filter(|f| is_eligible(&f.path))
            .collect()
    }

    /// Render the parsed diff into the line-numbered text block sent to the
    /// model. Hunks without added or removed lines are omitted; context is
    /// capped at `max_context_lines` on each side.
    pub fn format_for_llm(files: &[DiffFile], max_context_lines: usize) -> String {
        if files.is_empty() {
            return NO_CHANGES_SENTINEL.to_string();
        }

        let mut sections: Vec<String> = Vec::new();

        for file in files {
            sections.push(format!("File: {} ({})", file.path, file.change_type.as_str()));

            for hunk in &file.hunks {
                if !hunk.has_changes() {
                    continue;
                }

                sections.push(format!(
                    "Lines {}-{}:",
                    hunk.new_start,
                    (hunk.new_start + hunk.new_count).saturating_sub(1)
                ));

                let before_start = hunk.context_before.len().saturating_sub(max_context_lines);
                for entry in &hunk.context_before[before_start..] {
                    sections.push(format!("  {}: {}", entry.line, entry.content));
                }
                for entry in &hunk.removed_lines {
                    sections.push(format!("- {}: {}", entry.line, entry.content));
                }
                for entry in &hunk.added_lines {
                    sections.push(format!("+ {}: {}", entry.line, entry.content));
                }
                for entry in hunk.context_after.iter().take(max_context_lines) {
                    sections.push(format!("  {}: {}", entry.line, entry.content));
                }

                sections.push(String::new());
            }
        }

        sections.join("\n")
    }
}

fn parse_number(capture: Option<regex::Match<'_>>, default: usize) -> usize {
    capture
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(default)
}
