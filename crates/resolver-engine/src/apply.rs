use base64::Engine;
use resolver_core::{CodeChange, ResolverError};
use resolver_github::client::{FileLookup, FileWrite, RepositoryClient};

use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Prefix for commits made in response to reviewer feedback.
pub const FEEDBACK_COMMIT_PREFIX: &str = "AI Update: ";

/// How a change's message becomes a commit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStyle {
    /// Use the message as given (issue-driven generation).
    Verbatim,
    /// Prefix with [`FEEDBACK_COMMIT_PREFIX`] (feedback-driven changes).
    FeedbackUpdate,
}

impl CommitStyle {
    /// # Examples
    ///
    /// ```
    /// use resolver_engine::apply::CommitStyle;
    ///
    /// assert_eq!(CommitStyle::Verbatim.commit_message("Fix parser"), "Fix parser");
    /// assert_eq!(
    ///     CommitStyle::FeedbackUpdate.commit_message("Fix parser"),
    ///     "AI Update: Fix parser"
    /// );
    /// ```
    pub fn commit_message(self, message: &str) -> String {
        match self {
            CommitStyle::Verbatim => message.to_string(),
            CommitStyle::FeedbackUpdate => format!("{FEEDBACK_COMMIT_PREFIX}{message}"),
        }
    }
}

/// Outcome of one committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub path: String,
    /// `true` if the file did not exist on the branch before.
    pub created: bool,
}

/// Commits a change-set to a branch, one commit per file, in input order.
///
/// Each change is a lookup followed by a write. The pair is not atomic: if
/// another writer moves the file in between, the write fails with
/// [`ResolverError::RemoteWriteConflict`] and the remaining changes are not
/// attempted. Nothing is retried.
pub struct ChangeApplier<'a> {
    repo: &'a dyn RepositoryClient,
    telemetry: &'a dyn TelemetrySink,
}

impl<'a> ChangeApplier<'a> {
    pub fn new(repo: &'a dyn RepositoryClient, telemetry: &'a dyn TelemetrySink) -> Self {
        Self { repo, telemetry }
    }

    /// Commit every change in `changes` to `branch`.
    ///
    /// # Errors
    ///
    /// Propagates the first repository error; earlier commits stay in place.
    pub async fn apply(
        &self,
        branch: &str,
        changes: &[CodeChange],
        style: CommitStyle,
    ) -> Result<Vec<AppliedChange>, ResolverError> {
        let mut applied = Vec::with_capacity(changes.len());
        for change in changes {
            let lookup = self.repo.get_content(&change.path, branch).await?;
            let created = matches!(lookup, FileLookup::Missing);
            let write = FileWrite {
                path: change.path.clone(),
                content_base64: base64::engine::general_purpose::STANDARD
                    .encode(change.content.as_bytes()),
                message: style.commit_message(&change.message),
                branch: branch.to_string(),
                sha: lookup.sha().map(str::to_string),
            };
            self.repo.create_or_update_file(&write).await?;

            tracing::info!(path = %change.path, branch, created, "committed change");
            self.telemetry.record(
                TelemetryEvent::new("change_applied")
                    .with("path", &change.path)
                    .with("branch", branch)
                    .with("created", created),
            );
            applied.push(AppliedChange {
                path: change.path.clone(),
                created,
            });
        }
        Ok(applied)
    }
}
