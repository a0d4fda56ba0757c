/// Character-ratio token estimator. Deliberately not a tokenizer: the gate
/// only needs a stable, monotonic approximation to decide whether a prompt
/// fits the endpoint, and the ratio is tunable per model family.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudgeter {
    chars_per_token: f32,
    max_tokens: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetCheck {
    pub exceeds: bool,
    pub estimated: usize,
    pub max: usize,
}

impl TokenBudgeter {
    pub fn new(chars_per_token: f32, max_tokens: usize) -> Self {
        // A ratio at or below zero would divide the budget away entirely.
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            4.0
        };
        Self {
            chars_per_token,
            max_tokens,
        }
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        (text.chars().count() as f32 / self.chars_per_token) as usize
    }

    pub fn check_limit(&self, prompt: &str) -> BudgetCheck {
        let estimated = self.estimate_tokens(prompt);
        BudgetCheck {
            exceeds: estimated > self.max_tokens,
            estimated,
            max: self.max_tokens,
        }
    }

    /// The character budget implied by the token ceiling, minus a reserved
    /// overhead (the non-diff portion of the prompt).
    pub fn char_budget(&self, reserved_chars: usize) -> usize {
        let total = (self.max_tokens as f32 * self.chars_per_token) as usize;
        total.saturating_sub(reserved_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_floor_of_chars_over_ratio() {
        let budgeter = TokenBudgeter::new(4.0, 100);
        assert_eq!(budgeter.estimate_tokens(""), 0);
        assert_eq!(budgeter.estimate_tokens("abc"), 0);
        assert_eq!(budgeter.estimate_tokens("abcd"), 1);
        assert_eq!(budgeter.estimate_tokens(&"x".repeat(10)), 2);
    }

    #[test]
    fn check_limit_flags_only_strict_excess() {
        let budgeter = TokenBudgeter::new(1.0, 5);
        let at_limit = budgeter.check_limit("12345");
        assert!(!at_limit.exceeds);
        assert_eq!(at_limit.estimated, 5);
        assert_eq!(at_limit.max, 5);

        let over = budgeter.check_limit("123456");
        assert!(over.exceeds);
        assert_eq!(over.estimated, 6);
    }

    #[test]
    fn check_limit_is_monotonic_in_max() {
        let prompt = "some prompt text";
        for max in 1..64 {
            let small = TokenBudgeter::new(1.0, max);
            let large = TokenBudgeter::new(1.0, max + 1);
            if !small.check_limit(prompt).exceeds {
                assert!(!large.check_limit(prompt).exceeds);
            }
        }
    }

    #[test]
    fn char_budget_subtracts_reserved_overhead() {
        let budgeter = TokenBudgeter::new(4.0, 100);
        assert_eq!(budgeter.char_budget(0), 400);
        assert_eq!(budgeter.char_budget(150), 250);
        assert_eq!(budgeter.char_budget(1000), 0);
    }
}
