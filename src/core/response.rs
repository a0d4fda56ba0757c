use crate::core::review::{CodeSuggestion, ReviewResult, ReviewStatus};
use once_cell::sync::Lazy;
use regex::Regex;

/// `<file>:<line>[-<endLine>]: <description>` on a SUGGESTION entry marks it
/// as promotable to an inline code suggestion.
static SUGGESTION_LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\s:]+):(\d+)(?:-(\d+))?:\s*(.+)$").unwrap());

/// Converts the endpoint's free-text reply into structured findings.
/// Unrecognized lines are ignored; the literal `NONE` means "no findings
/// for this category".
pub struct ResponseParser;

impl ResponseParser {
    pub fn parse(response: &str) -> ReviewResult {
        let mut result = ReviewResult::new(ReviewStatus::Success);
        let lines: Vec<&str> = response.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i].trim();

            if let Some(rest) = line.strip_prefix("CRITICAL:") {
                push_finding(&mut result.critical_issues, rest);
            } else if let Some(rest) = line.strip_prefix("WARNING:") {
                push_finding(&mut result.warnings, rest);
            } else if let Some(rest) = line.strip_prefix("SUGGESTION:") {
                let text = rest.trim();
                if text.is_empty() || text == "NONE" {
                    i += 1;
                    continue;
                }

                if let Some(consumed) = Self::try_code_suggestion(text, &lines, i, &mut result) {
                    i = consumed;
                    continue;
                }

                result.suggestions.push(text.to_string());
            }

            i += 1;
        }

        result.raw_response = Some(response.to_string());
        result
    }

    /// Promote `SUGGESTION: file:line[-end]: desc` followed immediately by a
    /// ```suggestion fence into a [`CodeSuggestion`]. Returns the index just
    /// past the closing fence on success. An unterminated fence or a
    /// non-matching location keeps the entry as a plain suggestion.
    fn try_code_suggestion(
        text: &str,
        lines: &[&str],
        index: usize,
        result: &mut ReviewResult,
    ) -> Option<usize> {
        if lines.get(index + 1).map(|l| l.trim()) != Some("```suggestion") {
            return None;
        }
        let captures = SUGGESTION_LOCATION_RE.captures(text)?;

        let mut body: Vec<&str> = Vec::new();
        let mut j = index + 2;
        while j < lines.len() {
            if lines[j].trim() == "```" {
                let line_start: usize = captures[2].parse().ok()?;
                let line_end = captures
                    .get(3)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(line_start);

                result.code_suggestions.push(CodeSuggestion {
                    file: captures[1].to_string(),
                    line_start,
                    line_end,
                    description: captures[4].trim().to_string(),
                    // Body kept verbatim; empty means "delete these lines".
                    suggested_code: body.join("\n"),
                });
                return Some(j + 1);
            }
            body.push(lines[j]);
            j += 1;
        }

        // Fence never closed: fall back to a plain suggestion.
        None
    }
}

fn push_finding(list: &mut Vec<String>, raw: &str) {
    let text = raw.trim();
    if !text.is_empty() && text != "NONE" {
        list.push(text.to_string());
    }
}
