pub mod budget;
pub mod diff_parser;
pub mod git;
pub mod orchestrator;
pub mod prompt;
pub mod response;
pub mod review;
pub mod splitter;
pub mod static_analysis;

pub use diff_parser::DiffParser;
pub use git::{DiffMode, GitDiffSource};
pub use orchestrator::Orchestrator;
pub use review::{ReviewOutcome, ReviewResult, ReviewStatus};
pub use static_analysis::StaticAnalyzer;
