use crate::adapters::llm::{LlmClient, LlmError};
use crate::config::{Config, OverflowStrategy};
use crate::core::budget::{BudgetCheck, TokenBudgeter};
use crate::core::diff_parser::NO_CHANGES_SENTINEL;
use crate::core::prompt::PromptBuilder;
use crate::core::response::ResponseParser;
use crate::core::review::{ReviewResult, ReviewStatus};
use crate::core::splitter::DiffSplitter;
use crate::core::static_analysis::StaticAnalyzer;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// How a review call failed. Endpoint failures feed the retry and fallback
/// machinery; anything else is an internal fault that must surface as an
/// error instead of masquerading as a reviewable diff.
enum CallFailure {
    Endpoint(LlmError),
    Fault(anyhow::Error),
}

/// Drives a review end to end: prompt → budget check → optional split →
/// endpoint call with retry → fallback chain → parsed result. Chunk calls
/// and retries are strictly sequential; each review invocation owns its
/// orchestrator state, so concurrent reviews never interfere.
pub struct Orchestrator {
    config: Config,
    client: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    budgeter: TokenBudgeter,
}

impl Orchestrator {
    pub fn new(config: Config, client: Arc<dyn LlmClient>) -> Self {
        let budgeter = TokenBudgeter::new(config.llm.chars_per_token, config.llm.max_tokens);
        let prompts = PromptBuilder::new(config.prompt.clone());
        Self {
            config,
            client,
            prompts,
            budgeter,
        }
    }

    pub async fn review_diff(&self, diff_content: &str) -> ReviewResult {
        if diff_content.trim().is_empty() || diff_content == NO_CHANGES_SENTINEL {
            info!("No reviewable changes; skipping endpoint call");
            return ReviewResult::success_empty();
        }

        let prompt = self.prompts.build(diff_content);
        let check = self.budgeter.check_limit(&prompt);
        if check.exceeds {
            info!(
                "Prompt estimated at {} tokens against a limit of {}",
                check.estimated, check.max
            );
            return match self.config.llm.overflow_strategy {
                OverflowStrategy::Skip => skip_result(check),
                OverflowStrategy::Truncate => {
                    self.review_truncated(diff_content, &prompt, check).await
                }
                OverflowStrategy::Chunk => self.review_chunked(diff_content, &prompt).await,
            };
        }

        self.review_direct(diff_content, &prompt).await
    }

    /// Single-request path for diffs within budget.
    async fn review_direct(&self, diff_content: &str, prompt: &str) -> ReviewResult {
        let model = self.config.model();
        match self.call_with_retry(&model, prompt).await {
            Ok(result) => result,
            Err(CallFailure::Endpoint(err)) => {
                self.handle_model_unavailable(diff_content, err).await
            }
            Err(CallFailure::Fault(err)) => fault_result(err),
        }
    }

    /// Drop trailing files until the diff fits, then review what survived.
    async fn review_truncated(
        &self,
        diff_content: &str,
        prompt: &str,
        check: BudgetCheck,
    ) -> ReviewResult {
        let overhead = prompt
            .chars()
            .count()
            .saturating_sub(diff_content.chars().count());
        let truncated = DiffSplitter::truncate(diff_content, self.budgeter.char_budget(overhead));

        if truncated.text.trim().is_empty() {
            warn!("Nothing fits under the token limit even after truncation");
            return skip_result(check);
        }

        info!(
            "Truncated diff to fit; {} file(s) dropped",
            truncated.skipped_files.len()
        );

        let mut result = self.review_direct(&truncated.text, &self.prompts.build(&truncated.text)).await;
        if result.status == ReviewStatus::Error {
            return result;
        }
        result.warnings.push(format!(
            "{} file(s) skipped after truncating the diff to fit the token limit",
            truncated.skipped_files.len()
        ));
        result
    }

    /// Review the diff as an ordered set of file-aligned chunks. Findings
    /// are accumulated with order-preserving de-duplication; a failed chunk
    /// is noted and does not abort the rest.
    async fn review_chunked(&self, diff_content: &str, prompt: &str) -> ReviewResult {
        let overhead = prompt
            .chars()
            .count()
            .saturating_sub(diff_content.chars().count());
        let chunk_budget = self.budgeter.char_budget(overhead).max(1);
        let chunks = DiffSplitter::chunk(diff_content, chunk_budget);
        let total = chunks.len();
        let model = self.config.model();

        let mut result = ReviewResult::new(ReviewStatus::Success);
        result.total_chunks = total;

        for (index, chunk) in chunks.iter().enumerate() {
            info!("Reviewing chunk {}/{}", index + 1, total);
            let chunk_prompt = self.prompts.build(chunk);

            match self.call_with_retry(&model, &chunk_prompt).await {
                Ok(chunk_result) => {
                    merge_unique(&mut result.critical_issues, chunk_result.critical_issues);
                    merge_unique(&mut result.warnings, chunk_result.warnings);
                    merge_unique(&mut result.suggestions, chunk_result.suggestions);
                    result.code_suggestions.extend(chunk_result.code_suggestions);
                    result.chunks_reviewed += 1;
                }
                Err(CallFailure::Endpoint(err)) => {
                    warn!("Chunk {}/{} review failed: {err}", index + 1, total);
                    result
                        .warnings
                        .push(format!("Chunk {}/{} review failed: {err}", index + 1, total));
                }
                Err(CallFailure::Fault(err)) => return fault_result(err),
            }
        }

        if result.chunks_reviewed == 0 {
            result.status = ReviewStatus::Error;
            result
                .critical_issues
                .push(format!("All {total} diff chunk reviews failed"));
        }

        result
    }

    /// One endpoint call with the configured retry budget. Exponential
    /// backoff with jitter between retryable failures; permanent failures
    /// return immediately.
    async fn call_with_retry(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<ReviewResult, CallFailure> {
        let max_attempts = self.config.llm.max_retries.max(1);
        let mut attempt = 0u32;

        loop {
            match self.client.complete(model, prompt).await {
                Ok(raw) => return Ok(ResponseParser::parse(&raw)),
                Err(err) => match err.downcast::<LlmError>() {
                    Ok(endpoint_err) => {
                        warn!(
                            "Endpoint call failed (attempt {}/{}): {endpoint_err}",
                            attempt + 1,
                            max_attempts
                        );
                        if endpoint_err.is_retryable() && attempt + 1 < max_attempts {
                            let delay = backoff_delay(attempt);
                            info!("Retrying in {:.1}s", delay.as_secs_f64());
                            sleep(delay).await;
                            attempt += 1;
                        } else {
                            return Err(CallFailure::Endpoint(endpoint_err));
                        }
                    }
                    Err(fault) => return Err(CallFailure::Fault(fault)),
                },
            }
        }
    }

    /// Fallback chain once the primary model is unreachable: one shot at the
    /// configured backup model (request-scoped override, the primary config
    /// is never touched), then local static analysis. The result is never
    /// upgraded back to success, even when static analysis finds nothing.
    async fn handle_model_unavailable(&self, diff_content: &str, err: LlmError) -> ReviewResult {
        error!("Model unavailable: {err}");

        let mut result = ReviewResult::new(ReviewStatus::ModelUnavailable);
        result.warnings.push(format!("LLM model unavailable: {err}"));

        if let Some(fallback_model) = &self.config.llm.fallback_model {
            info!("Trying fallback model: {fallback_model}");
            let prompt = self.prompts.build(diff_content);
            match self.client.complete(fallback_model, &prompt).await {
                Ok(raw) => {
                    let mut fallback_result = ResponseParser::parse(&raw);
                    fallback_result.fallback_used = true;
                    fallback_result.warnings.push(
                        "Used backup model because the primary model was unavailable".to_string(),
                    );
                    return fallback_result;
                }
                Err(fallback_err) => {
                    warn!("Fallback model also failed: {fallback_err}");
                }
            }
        }

        if self.config.fallback.enable_static_analysis {
            info!("Using static analysis as fallback");
            let static_result =
                StaticAnalyzer::analyze(diff_content, self.config.review.check_docstrings);
            result.warnings.extend(static_result.warnings);
            result.suggestions.extend(static_result.suggestions);
            result.fallback_used = true;
        }

        result
    }

    /// One tiny completion to verify the endpoint is reachable and the
    /// model answers.
    pub async fn test_connection(&self) -> bool {
        let model = self.config.model();
        match self
            .client
            .complete(&model, "Test connection. Respond with 'OK'.")
            .await
        {
            Ok(reply) => reply.contains("OK"),
            Err(err) => {
                error!("Connection test failed: {err}");
                false
            }
        }
    }
}

fn skip_result(check: BudgetCheck) -> ReviewResult {
    let mut result = ReviewResult::new(ReviewStatus::Skipped);
    result.warnings.push(format!(
        "Diff estimated at {} tokens exceeds the {} token limit; review skipped",
        check.estimated, check.max
    ));
    result
        .suggestions
        .push("Reduce the changeset size or raise llm.max_tokens".to_string());
    result
}

fn fault_result(err: anyhow::Error) -> ReviewResult {
    error!("Unexpected error during review: {err:#}");
    let mut result = ReviewResult::new(ReviewStatus::Error);
    result
        .critical_issues
        .push(format!("Review system error: {err}"));
    result
}

/// `2^attempt` seconds plus uniform(0,1) jitter; attempt is zero-indexed.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 2u64.saturating_pow(attempt) as f64;
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    Duration::from_secs_f64(base + jitter)
}

/// Order-preserving de-duplication by exact string equality.
fn merge_unique(accumulated: &mut Vec<String>, incoming: Vec<String>) {
    for item in incoming {
        if !accumulated.contains(&item) {
            accumulated.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a queue of canned replies and records every call.
    struct ScriptedClient {
        responses: Mutex<VecDeque<anyhow::Result<String>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_model(&self, index: usize) -> String {
            self.calls.lock().unwrap()[index].0.clone()
        }

        fn call_prompt(&self, index: usize) -> String {
            self.calls.lock().unwrap()[index].1.clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, model: &str, prompt: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("CRITICAL: NONE".to_string()))
        }
    }

    fn ok(text: &str) -> anyhow::Result<String> {
        Ok(text.to_string())
    }

    fn status_err(code: u16) -> anyhow::Result<String> {
        Err(LlmError::Status {
            status: code,
            message: "canned failure".to_string(),
        }
        .into())
    }

    fn base_config() -> Config {
        let mut config = Config::default();
        config.llm.model = "primary-model".to_string();
        config
    }

    /// Two small formatted file sections, ~30 characters each.
    fn two_file_diff() -> String {
        "File: one.py (modified)\n+ 1: a\nFile: two.py (modified)\n+ 1: b\n".to_string()
    }

    /// Config sized so the prompt for `diff` overflows, leaving roughly
    /// `slack` characters of per-chunk budget.
    fn overflowing_config(diff: &str, slack: usize) -> Config {
        let mut config = base_config();
        config.llm.chars_per_token = 1.0;
        let prompt = PromptBuilder::new(config.prompt.clone()).build(diff);
        let overhead = prompt.chars().count() - diff.chars().count();
        config.llm.max_tokens = overhead + slack;
        config
    }

    #[tokio::test]
    async fn empty_diff_short_circuits_without_network() {
        let client = ScriptedClient::new(vec![]);
        let orchestrator = Orchestrator::new(base_config(), client.clone());

        let result = orchestrator.review_diff("   \n ").await;
        assert_eq!(result.status, ReviewStatus::Success);
        assert!(result.critical_issues.is_empty());
        assert_eq!(client.call_count(), 0);

        let result = orchestrator.review_diff(NO_CHANGES_SENTINEL).await;
        assert_eq!(result.status, ReviewStatus::Success);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn direct_call_parses_response() {
        let client = ScriptedClient::new(vec![ok(
            "CRITICAL: app.py:1: hardcoded secret\nWARNING: NONE\nSUGGESTION: NONE",
        )]);
        let orchestrator = Orchestrator::new(base_config(), client.clone());

        let result = orchestrator.review_diff("File: app.py (modified)\n+ 1: x").await;
        assert_eq!(result.status, ReviewStatus::Success);
        assert_eq!(result.critical_issues, vec!["app.py:1: hardcoded secret"]);
        assert_eq!(client.call_count(), 1);
        assert_eq!(client.call_model(0), "primary-model");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_then_succeeds() {
        let client = ScriptedClient::new(vec![status_err(503), ok("WARNING: w1")]);
        let orchestrator = Orchestrator::new(base_config(), client.clone());

        let result = orchestrator.review_diff("File: a.py (modified)\n+ 1: x").await;
        assert_eq!(result.status, ReviewStatus::Success);
        assert_eq!(result.warnings, vec!["w1"]);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retry_and_falls_back_to_static() {
        let diff = "File: settings.py (modified)\n+ 1: password = \"hunter2\"\n";
        let client = ScriptedClient::new(vec![status_err(404)]);
        let orchestrator = Orchestrator::new(base_config(), client.clone());

        let result = orchestrator.review_diff(diff).await;

        // 404 is permanent: exactly one attempt.
        assert_eq!(client.call_count(), 1);
        assert_eq!(result.status, ReviewStatus::ModelUnavailable);
        assert!(result.fallback_used);
        assert!(result.warnings[0].contains("LLM model unavailable"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("STATIC_ANALYSIS") && w.contains("hardcoded credential")));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_reach_the_fallback_chain() {
        let mut config = base_config();
        config.llm.max_retries = 2;
        let client = ScriptedClient::new(vec![status_err(500), status_err(500)]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff("File: a.py (modified)\n+ 1: x").await;
        assert_eq!(client.call_count(), 2);
        assert_eq!(result.status, ReviewStatus::ModelUnavailable);
    }

    #[tokio::test]
    async fn backup_model_is_tried_with_scoped_override() {
        let mut config = base_config();
        config.llm.fallback_model = Some("backup-model".to_string());
        let client = ScriptedClient::new(vec![status_err(404), ok("WARNING: from backup")]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff("File: a.py (modified)\n+ 1: x").await;

        assert_eq!(result.status, ReviewStatus::Success);
        assert!(result.fallback_used);
        assert!(result.warnings.iter().any(|w| w == "from backup"));
        assert!(result.warnings.iter().any(|w| w.contains("backup model")));

        assert_eq!(client.call_count(), 2);
        assert_eq!(client.call_model(0), "primary-model");
        assert_eq!(client.call_model(1), "backup-model");
    }

    #[tokio::test]
    async fn failing_backup_model_still_reaches_static_analysis() {
        let mut config = base_config();
        config.llm.fallback_model = Some("backup-model".to_string());
        let client = ScriptedClient::new(vec![status_err(404), status_err(404)]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff("File: a.py (modified)\n+ 1: x").await;
        assert_eq!(result.status, ReviewStatus::ModelUnavailable);
        assert!(result.fallback_used);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn unexpected_fault_is_fatal_without_retry_or_fallback() {
        let client = ScriptedClient::new(vec![Err(anyhow!("mutex poisoned"))]);
        let orchestrator = Orchestrator::new(base_config(), client.clone());

        let result = orchestrator.review_diff("File: a.py (modified)\n+ 1: x").await;

        assert_eq!(result.status, ReviewStatus::Error);
        assert_eq!(result.critical_issues.len(), 1);
        assert!(result.critical_issues[0].contains("Review system error"));
        assert!(!result.fallback_used);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn skip_strategy_names_both_token_numbers() {
        let diff = two_file_diff();
        let mut config = overflowing_config(&diff, 10);
        config.llm.overflow_strategy = OverflowStrategy::Skip;
        let client = ScriptedClient::new(vec![]);
        let orchestrator = Orchestrator::new(config.clone(), client.clone());

        let result = orchestrator.review_diff(&diff).await;

        assert_eq!(result.status, ReviewStatus::Skipped);
        assert_eq!(client.call_count(), 0);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains(&format!("{} token limit", config.llm.max_tokens)));
        assert_eq!(result.suggestions.len(), 1);
        assert!(result.suggestions[0].contains("Reduce the changeset size"));
    }

    #[tokio::test]
    async fn chunk_strategy_deduplicates_in_order() {
        let diff = two_file_diff();
        let config = overflowing_config(&diff, 40);
        let client = ScriptedClient::new(vec![
            ok("CRITICAL: A\nCRITICAL: B"),
            ok("CRITICAL: A\nCRITICAL: C"),
        ]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff(&diff).await;

        assert_eq!(result.status, ReviewStatus::Success);
        assert_eq!(result.critical_issues, vec!["A", "B", "C"]);
        assert_eq!(result.chunks_reviewed, 2);
        assert_eq!(result.total_chunks, 2);
        assert_eq!(client.call_count(), 2);
        // Each chunk prompt carries exactly one file.
        assert!(client.call_prompt(0).contains("one.py"));
        assert!(!client.call_prompt(0).contains("two.py"));
        assert!(client.call_prompt(1).contains("two.py"));
    }

    #[tokio::test]
    async fn failed_chunk_is_recorded_and_does_not_abort() {
        let diff = two_file_diff();
        let mut config = overflowing_config(&diff, 40);
        config.llm.max_retries = 1;
        let client = ScriptedClient::new(vec![status_err(500), ok("WARNING: chunk two finding")]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff(&diff).await;

        assert_eq!(result.status, ReviewStatus::Success);
        assert_eq!(result.chunks_reviewed, 1);
        assert_eq!(result.total_chunks, 2);
        assert!(result.warnings.iter().any(|w| w.contains("Chunk 1/2 review failed")));
        assert!(result.warnings.iter().any(|w| w == "chunk two finding"));
    }

    #[tokio::test]
    async fn all_chunks_failing_is_an_error() {
        let diff = two_file_diff();
        let mut config = overflowing_config(&diff, 40);
        config.llm.max_retries = 1;
        let client = ScriptedClient::new(vec![status_err(500), status_err(500)]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff(&diff).await;

        assert_eq!(result.status, ReviewStatus::Error);
        assert_eq!(result.chunks_reviewed, 0);
        assert!(result.critical_issues[0].contains("All 2 diff chunk reviews failed"));
    }

    #[tokio::test]
    async fn truncate_strategy_reviews_leading_files_and_warns() {
        let diff = two_file_diff();
        let mut config = overflowing_config(&diff, 40);
        config.llm.overflow_strategy = OverflowStrategy::Truncate;
        let client = ScriptedClient::new(vec![ok("WARNING: NONE")]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff(&diff).await;

        assert_eq!(result.status, ReviewStatus::Success);
        assert_eq!(client.call_count(), 1);
        assert!(client.call_prompt(0).contains("one.py"));
        assert!(!client.call_prompt(0).contains("two.py"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("1 file(s) skipped after truncating")));
    }

    #[tokio::test]
    async fn truncate_with_no_survivors_skips() {
        let diff = two_file_diff();
        let mut config = overflowing_config(&diff, 5);
        config.llm.overflow_strategy = OverflowStrategy::Truncate;
        let client = ScriptedClient::new(vec![]);
        let orchestrator = Orchestrator::new(config, client.clone());

        let result = orchestrator.review_diff(&diff).await;
        assert_eq!(result.status, ReviewStatus::Skipped);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn connection_test_checks_for_ok() {
        let client = ScriptedClient::new(vec![ok("OK, ready."), ok("no idea")]);
        let orchestrator = Orchestrator::new(base_config(), client.clone());
        assert!(orchestrator.test_connection().await);
        assert!(!orchestrator.test_connection().await);
    }

    #[test]
    fn backoff_delay_lies_in_expected_window() {
        for attempt in 0..5u32 {
            let base = 2f64.powi(attempt as i32);
            for _ in 0..20 {
                let delay = backoff_delay(attempt).as_secs_f64();
                assert!(delay >= base, "attempt {attempt}: {delay} < {base}");
                assert!(delay < base + 1.0, "attempt {attempt}: {delay} too large");
            }
        }
    }

    #[test]
    fn merge_unique_preserves_first_occurrence_order() {
        let mut accumulated = vec!["A".to_string(), "B".to_string()];
        merge_unique(
            &mut accumulated,
            vec!["A".to_string(), "C".to_string(), "B".to_string()],
        );
        assert_eq!(accumulated, vec!["A", "B", "C"]);
    }
}
