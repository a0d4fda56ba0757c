use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How to handle a prompt that exceeds the token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowStrategy {
    Skip,
    Truncate,
    #[default]
    Chunk,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    pub fallback_model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f32,

    #[serde(default)]
    pub overflow_strategy: OverflowStrategy,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            fallback_model: None,
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_tokens: default_max_tokens(),
            chars_per_token: default_chars_per_token(),
            overflow_strategy: OverflowStrategy::default(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Whether the static analyzer suggests docstrings for new definitions.
    /// Offline mode forces this on regardless of the config value.
    #[serde(default = "default_true")]
    pub check_docstrings: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            file_extensions: default_file_extensions(),
            exclude_patterns: default_exclude_patterns(),
            check_docstrings: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_max_context_lines")]
    pub max_context_lines: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_context_lines: default_max_context_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enable_static_analysis: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enable_static_analysis: true,
        }
    }
}

/// Optional prompt customization merged into the built-in template.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptConfig {
    pub custom_prompt: Option<String>,

    #[serde(default)]
    pub custom_critical_rules: Vec<String>,

    #[serde(default)]
    pub custom_warnings: Vec<String>,

    #[serde(default)]
    pub custom_suggestions: Vec<String>,

    pub additional_instructions: Option<String>,
}

impl Config {
    /// Load configuration from `.diffgate.yml` in the current directory,
    /// falling back to `.diffgate.yaml`, then the home directory, then
    /// built-in defaults.
    pub fn load() -> Result<Self> {
        for name in [".diffgate.yml", ".diffgate.yaml"] {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".diffgate.yml");
            if home_config.exists() {
                return Self::load_from(&home_config);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// API key for the inference endpoint. `LLM_API_KEY` takes precedence
    /// over the config file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("LLM_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.llm.api_key.clone())
    }

    /// Endpoint base URL. `LLM_BASE_URL` takes precedence.
    pub fn base_url(&self) -> Option<String> {
        std::env::var("LLM_BASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| self.llm.base_url.clone())
    }

    /// Model name. `LLM_MODEL` takes precedence.
    pub fn model(&self) -> String {
        std::env::var("LLM_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.llm.model.clone())
    }

    /// File-acceptance predicate: extension allow-list intersected with the
    /// exclude-pattern deny-list.
    pub fn is_file_eligible(&self, file_path: &str) -> bool {
        let path = Path::new(file_path);

        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        if !self.review.file_extensions.iter().any(|e| *e == extension) {
            return false;
        }

        for pattern in &self.review.exclude_patterns {
            // The pattern keeps its trailing slash so `target/` matches only
            // real directory components, never names like `targets.rs`.
            if file_path.contains(pattern.as_str()) {
                return false;
            }
            if let Ok(glob_pattern) = glob::Pattern::new(pattern) {
                if glob_pattern.matches(file_path)
                    || path
                        .file_name()
                        .map_or(false, |n| glob_pattern.matches(&n.to_string_lossy()))
                {
                    return false;
                }
            }
        }

        true
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_tokens() -> usize {
    10_000
}

fn default_chars_per_token() -> f32 {
    4.0
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_context_lines() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_file_extensions() -> Vec<String> {
    [
        ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".cpp", ".c", ".h", ".go", ".rs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "node_modules/",
        ".git/",
        "__pycache__/",
        "target/",
        "*.min.js",
        "*.test.js",
        "*.spec.js",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
