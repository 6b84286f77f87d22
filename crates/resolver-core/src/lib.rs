//! Core types, configuration, and error handling for the issue resolver.
//!
//! This crate provides the shared foundation used by the other resolver crates:
//! - [`ResolverError`] — unified error type using `thiserror`
//! - [`ResolverConfig`] — configuration loaded from `.ai-issue-resolver.toml`
//!   and overlaid with GitHub Action inputs
//! - Shared types: [`CodeChange`], [`ReviewFeedback`], [`IssueContext`],
//!   [`CommentContext`], [`RepositoryContext`]

mod config;
mod error;
mod types;

pub use config::{CommandConfig, GitHubConfig, LlmConfig, ResolverConfig, CONFIG_FILE_NAME};
pub use error::ResolverError;
pub use types::{
    CodeChange, CommentContext, Improvement, ImprovementKind, IssueContext, Label,
    QualityIssue, RepositoryContext, ReviewFeedback, SecurityIssue, SecuritySeverity, Severity,
    TestingSuggestion,
};

/// A convenience `Result` type for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;
