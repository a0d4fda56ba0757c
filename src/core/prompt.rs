use crate::config::PromptConfig;
use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, warn};

/// Built-in review instruction template. Placeholders are filled from the
/// prompt customization config; rule lists render as bullet lists.
const DEFAULT_TEMPLATE: &str = "\
You are a security-focused code reviewer. Analyze the following git diff changes for:

CRITICAL ISSUES (block commit):
- Hardcoded credentials, API keys, secrets
- SQL injection, XSS vulnerabilities
- Unsafe functions (eval(), exec(), system())
- Direct file system operations without validation
- Network requests to external endpoints without proper validation
- Buffer overflow risks
- Command injection vulnerabilities
{custom_critical_rules}

WARNINGS (allow commit but flag):
- Code style violations
- Potential bugs and edge cases
- Performance issues
- Missing error handling
- Input validation gaps
- Documentation gaps
{custom_warnings}

SUGGESTIONS (improvements):
- Best practices recommendations
- Code organization improvements
- Security enhancements
{custom_suggestions}

{additional_instructions}

Format your response as:
CRITICAL: [issue description]
WARNING: [issue description]
SUGGESTION: [suggestion]

If no issues found for a category, respond \"NONE\".

Changes to review:
{diff_content}

Focus on security vulnerabilities first, then code quality.";

const PLACEHOLDERS: [&str; 5] = [
    "diff_content",
    "custom_critical_rules",
    "custom_warnings",
    "custom_suggestions",
    "additional_instructions",
];

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap());

pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Compose the review prompt. Falls back from the custom template to the
    /// built-in one, and from there to a minimal two-line prompt, so a prompt
    /// is always producible.
    pub fn build(&self, diff_content: &str) -> String {
        if let Some(custom) = &self.config.custom_prompt {
            match self.render(custom, diff_content) {
                Ok(prompt) => return prompt,
                Err(err) => {
                    warn!("Custom prompt template invalid: {err}. Using default template.");
                }
            }
        }

        match self.render(DEFAULT_TEMPLATE, diff_content) {
            Ok(prompt) => prompt,
            Err(err) => {
                error!("Default prompt template failed: {err}. Using minimal prompt.");
                format!("Review this code diff for security issues:\n\n{diff_content}")
            }
        }
    }

    fn render(&self, template: &str, diff_content: &str) -> Result<String> {
        // Reject unknown placeholders before substituting, so braces inside
        // the diff text itself can never trip the check.
        for captures in PLACEHOLDER_RE.captures_iter(template) {
            let name = &captures[1];
            if !PLACEHOLDERS.contains(&name) {
                bail!("unknown placeholder {{{name}}}");
            }
        }

        Ok(template
            .replace("{custom_critical_rules}", &bullets(&self.config.custom_critical_rules))
            .replace("{custom_warnings}", &bullets(&self.config.custom_warnings))
            .replace("{custom_suggestions}", &bullets(&self.config.custom_suggestions))
            .replace(
                "{additional_instructions}",
                self.config.additional_instructions.as_deref().unwrap_or(""),
            )
            .replace("{diff_content}", diff_content))
    }
}

fn bullets(rules: &[String]) -> String {
    rules
        .iter()
        .map(|rule| format!("- {rule}"))
        .collect::<Vec<_>>()
        .join("\n")
}
