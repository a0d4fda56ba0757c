use crate::core::review::{ReviewResult, ReviewStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static CREDENTIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|secret|api_key|apikey|token|private_key)\s*[:=]\s*["'][^"']+["']"#)
        .unwrap()
});

static SQL_BUILD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(execute|query|raw)\s*\(.*(\+|%s|\{|format)"#).unwrap()
});

static UNSAFE_CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(eval|exec|system|popen)\s*\(").unwrap());

static DYNAMIC_FILE_OP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(open|remove|unlink|rmtree)\s*\([^)]*(\+|%|format)").unwrap());

static HARDCODED_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"')]+"#).unwrap());

static DEBUG_LEFTOVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(console\.log\s*\(|\bdebugger\b|\bprint\s*\(|\bdbg!\s*\()").unwrap()
});

static NONE_COMPARISON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[!=]=\s*None\b").unwrap());

/// Header forms accepted when attributing added lines to a file: raw git
/// diffs (`+++ b/path`) and the formatted review text (`File: path (type)`).
static FORMATTED_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^File: (.+) \((?:added|modified|deleted|renamed)\)$").unwrap());

static FORMATTED_ADDED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+ \d+: (.*)$").unwrap());

/// Per-language rule for spotting new definitions that lack a doc comment.
/// `doc_after` marks languages whose docstring follows the definition line
/// (Python) instead of preceding it.
struct DocRule {
    definition: Regex,
    doc_comment: Regex,
    doc_after: bool,
}

static DOC_RULES: Lazy<Vec<(&'static [&'static str], DocRule)>> = Lazy::new(|| {
    vec![
        (
            &[".py"][..],
            DocRule {
                definition: Regex::new(r"^\s*(?:async\s+)?(?:def|class)\s+(\w+)").unwrap(),
                doc_comment: Regex::new(r#"^\s*(?:r?"""|r?''')"#).unwrap(),
                doc_after: true,
            },
        ),
        (
            &[".js", ".ts", ".jsx", ".tsx"][..],
            DocRule {
                definition: Regex::new(
                    r"^\s*(?:export\s+(?:default\s+)?)?(?:async\s+)?(?:function\s+(\w+)|class\s+(\w+)|(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|\w+\s*=>))",
                )
                .unwrap(),
                doc_comment: Regex::new(r"^\s*/\*\*").unwrap(),
                doc_after: false,
            },
        ),
        (
            &[".java"][..],
            DocRule {
                definition: Regex::new(
                    r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized)\s+)+(?:class|interface|enum|record|void|int|String|boolean|long|double|float|[A-Z]\w*(?:<[^>]*>)?(?:\[\])?)\s+(\w+)\s*[(<{]",
                )
                .unwrap(),
                doc_comment: Regex::new(r"^\s*/\*\*").unwrap(),
                doc_after: false,
            },
        ),
        (
            &[".c", ".cpp", ".h"][..],
            DocRule {
                definition: Regex::new(
                    r"^\s*(?:(?:static|inline|const|extern|unsigned|signed)\s+)*(?:void|bool|int|char|float|double|long|short|size_t|struct\s+\w+|\w+_t)[\s*&]+(\w+)\s*\(",
                )
                .unwrap(),
                doc_comment: Regex::new(r"^\s*(?:/\*\*|///)").unwrap(),
                doc_after: false,
            },
        ),
        (
            &[".go"][..],
            DocRule {
                definition: Regex::new(
                    r"^\s*func\s+(?:\(\s*\w+\s+\*?[\w.]+\)\s+)?(\w+)\s*\(",
                )
                .unwrap(),
                doc_comment: Regex::new(r"^\s*//").unwrap(),
                doc_after: false,
            },
        ),
        (
            &[".rs"][..],
            DocRule {
                definition: Regex::new(
                    r"^\s*(?:pub\s*(?:\([^)]*\)\s*)?)?(?:(?:async|unsafe|const)\s+)*(?:fn|struct|enum|trait|mod)\s+(\w+)",
                )
                .unwrap(),
                doc_comment: Regex::new(r"^\s*///").unwrap(),
                doc_after: false,
            },
        ),
    ]
});

fn doc_rule(extension: &str) -> Option<&'static DocRule> {
    DOC_RULES
        .iter()
        .find(|(extensions, _)| extensions.contains(&extension))
        .map(|(_, rule)| rule)
}

struct AddedLine {
    file: String,
    content: String,
}

/// Local heuristic reviewer used when the inference endpoint is out of
/// reach. Security hits are reported as warnings, not criticals, so an
/// endpoint outage never hard-blocks a commit by itself.
pub struct StaticAnalyzer;

impl StaticAnalyzer {
    pub fn analyze(diff_text: &str, check_docstrings: bool) -> ReviewResult {
        let mut result = ReviewResult::new(ReviewStatus::Success);
        result.fallback_used = true;

        let added = extract_added_lines(diff_text);
        debug!("Static analysis over {} added line(s)", added.len());

        for line in &added {
            for finding in security_findings(&line.content, &line.file) {
                result.warnings.push(format!("STATIC_ANALYSIS: {finding}"));
            }
            result.warnings.extend(quality_findings(&line.content, &line.file));
            result.suggestions.extend(improvements(&line.content, &line.file));
        }

        if check_docstrings {
            result.suggestions.extend(docstring_suggestions(&added));
        }

        result
    }
}

/// Flag added function/class definitions with no doc comment. Lines are
/// grouped per file in appearance order so the adjacency checks see the same
/// neighborhood the diff showed.
fn docstring_suggestions(added: &[AddedLine]) -> Vec<String> {
    let mut by_file: Vec<(&str, Vec<&str>)> = Vec::new();
    for line in added {
        match by_file.iter_mut().find(|(file, _)| *file == line.file) {
            Some((_, lines)) => lines.push(line.content.as_str()),
            None => by_file.push((line.file.as_str(), vec![line.content.as_str()])),
        }
    }

    let mut suggestions = Vec::new();
    for (file, lines) in &by_file {
        let extension = match file.rfind('.') {
            Some(index) => &file[index..],
            None => continue,
        };
        let rule = match doc_rule(extension) {
            Some(rule) => rule,
            None => continue,
        };

        for (index, line) in lines.iter().enumerate() {
            let captures = match rule.definition.captures(line) {
                Some(captures) => captures,
                None => continue,
            };
            let name = captures
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str())
                .unwrap_or("unknown");

            if !has_doc_comment(rule, lines, index) {
                suggestions.push(format!("{file}: Missing docstring for '{name}'"));
            }
        }
    }

    suggestions
}

/// The first non-blank neighbor decides: up to two lines after the
/// definition for docstring-after languages, up to three lines before for
/// the rest.
fn has_doc_comment(rule: &DocRule, lines: &[&str], index: usize) -> bool {
    if rule.doc_after {
        for line in lines.iter().skip(index + 1).take(2) {
            if line.trim().is_empty() {
                continue;
            }
            return rule.doc_comment.is_match(line);
        }
    } else {
        for line in lines[..index].iter().rev().take(3) {
            if line.trim().is_empty() {
                continue;
            }
            return rule.doc_comment.is_match(line);
        }
    }
    false
}

fn extract_added_lines(diff_text: &str) -> Vec<AddedLine> {
    let mut current_file = String::from("unknown");
    let mut added = Vec::new();

    for line in diff_text.lines() {
        if let Some(path) = line.strip_prefix("+++ b/") {
            current_file = path.to_string();
        } else if let Some(captures) = FORMATTED_FILE_RE.captures(line) {
            current_file = captures[1].to_string();
        } else if line.starts_with("+++") || line.starts_with("diff --git") {
            // Header noise, not content.
        } else if let Some(captures) = FORMATTED_ADDED_RE.captures(line) {
            added.push(AddedLine {
                file: current_file.clone(),
                content: captures[1].to_string(),
            });
        } else if let Some(content) = line.strip_prefix('+') {
            added.push(AddedLine {
                file: current_file.clone(),
                content: content.to_string(),
            });
        }
    }

    added
}

fn security_findings(content: &str, file: &str) -> Vec<String> {
    let mut findings = Vec::new();

    if CREDENTIAL_RE.is_match(content) {
        findings.push(format!("{file}: possible hardcoded credential"));
    }
    if SQL_BUILD_RE.is_match(content) {
        findings.push(format!("{file}: possible SQL built from dynamic input"));
    }
    if let Some(captures) = UNSAFE_CALL_RE.captures(content) {
        findings.push(format!("{file}: use of unsafe function {}()", &captures[1]));
    }
    if DYNAMIC_FILE_OP_RE.is_match(content) {
        findings.push(format!("{file}: file operation on an unvalidated dynamic path"));
    }

    findings
}

fn quality_findings(content: &str, file: &str) -> Vec<String> {
    let mut findings = Vec::new();

    if let Some(url) = HARDCODED_URL_RE.find(content) {
        let url = url.as_str();
        if !url.contains("localhost") && !url.contains("127.0.0.1") && !url.contains("example.com")
        {
            findings.push(format!("{file}: hardcoded URL {url}"));
        }
    }
    if DEBUG_LEFTOVER_RE.is_match(content) {
        findings.push(format!("{file}: debug statement left in code"));
    }

    findings
}

fn improvements(content: &str, file: &str) -> Vec<String> {
    let mut suggestions = Vec::new();

    if content.len() > 120 {
        suggestions.push(format!("{file}: line longer than 120 characters, consider wrapping"));
    }
    if NONE_COMPARISON_RE.is_match(content) {
        suggestions.push(format!("{file}: compare against None with 'is'/'is not'"));
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardcoded_credential_becomes_prefixed_warning() {
        let diff = "+++ b/settings.py\n+password = \"hunter2\"\n";
        let result = StaticAnalyzer::analyze(diff, false);

        assert!(result.fallback_used);
        assert!(result.critical_issues.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("STATIC_ANALYSIS: settings.py"));
        assert!(result.warnings[0].contains("hardcoded credential"));
    }

    #[test]
    fn unsafe_function_is_flagged_with_name() {
        let diff = "+++ b/run.py\n+result = eval(user_input)\n";
        let result = StaticAnalyzer::analyze(diff, false);
        assert!(result.warnings.iter().any(|w| w.contains("eval()")));
    }

    #[test]
    fn formatted_review_text_is_also_analyzable() {
        let diff = "File: app.js (modified)\nLines 3-4:\n+ 3: console.log(debugData)\n";
        let result = StaticAnalyzer::analyze(diff, false);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("app.js") && w.contains("debug statement")));
    }

    #[test]
    fn removed_and_context_lines_are_not_analyzed() {
        let diff = "+++ b/a.py\n-password = \"old\"\n eval(x)\n";
        let result = StaticAnalyzer::analyze(diff, true);
        assert!(result.warnings.is_empty());
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn localhost_urls_are_not_flagged() {
        let diff = "+++ b/client.py\n+BASE = \"http://localhost:8080\"\n+PROD = \"https://api.internal.example.io/v1\"\n";
        let result = StaticAnalyzer::analyze(diff, false);
        let url_warnings: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| w.contains("hardcoded URL"))
            .collect();
        assert_eq!(url_warnings.len(), 1);
        assert!(url_warnings[0].contains("api.internal.example.io"));
    }

    #[test]
    fn clean_diff_produces_empty_result() {
        let diff = "+++ b/math.py\n+def add(a, b):\n+    return a + b\n";
        let result = StaticAnalyzer::analyze(diff, false);
        assert!(result.warnings.is_empty());
        assert!(result.critical_issues.is_empty());
        assert_eq!(result.status, ReviewStatus::Success);
    }

    #[test]
    fn python_definition_without_docstring_is_suggested() {
        let diff = "+++ b/app.py\n+def handler(request):\n+    return request\n";
        let result = StaticAnalyzer::analyze(diff, true);
        assert_eq!(
            result.suggestions,
            vec!["app.py: Missing docstring for 'handler'"]
        );
    }

    #[test]
    fn python_docstring_on_the_next_line_satisfies_the_check() {
        let diff =
            "+++ b/app.py\n+def handler(request):\n+    \"\"\"Handle one request.\"\"\"\n+    return request\n";
        let result = StaticAnalyzer::analyze(diff, true);
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn doc_comment_before_the_definition_satisfies_the_check() {
        let documented = "+++ b/lib.rs\n+/// Adds two numbers.\n+pub fn add(a: i32, b: i32) -> i32 {\n";
        let result = StaticAnalyzer::analyze(documented, true);
        assert!(result.suggestions.is_empty());

        let undocumented = "+++ b/lib.rs\n+pub fn add(a: i32, b: i32) -> i32 {\n";
        let result = StaticAnalyzer::analyze(undocumented, true);
        assert_eq!(
            result.suggestions,
            vec!["lib.rs: Missing docstring for 'add'"]
        );
    }

    #[test]
    fn jsdoc_block_before_an_arrow_function_is_accepted() {
        let diff = "+++ b/util.js\n+/** Doubles the input. */\n+const double = (x) => x * 2\n";
        let result = StaticAnalyzer::analyze(diff, true);
        assert!(result.suggestions.is_empty());

        let bare = "+++ b/util.js\n+const double = (x) => x * 2\n";
        let result = StaticAnalyzer::analyze(bare, true);
        assert_eq!(
            result.suggestions,
            vec!["util.js: Missing docstring for 'double'"]
        );
    }

    #[test]
    fn docstring_check_can_be_disabled() {
        let diff = "+++ b/app.py\n+def handler(request):\n+    return request\n";
        let result = StaticAnalyzer::analyze(diff, false);
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn files_without_a_known_extension_are_not_doc_checked() {
        let diff = "+++ b/Makefile\n+build:\n+\tcargo build\n";
        let result = StaticAnalyzer::analyze(diff, true);
        assert!(result.suggestions.is_empty());
    }
}
