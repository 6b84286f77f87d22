use async_trait::async_trait;
use resolver_core::ResolverError;
use serde::{Deserialize, Serialize};

/// Result of looking up a file on a branch.
///
/// Absence is an ordinary outcome here rather than an error: the change
/// applier creates the file when it is [`FileLookup::Missing`] and updates it
/// with the known blob SHA when it is [`FileLookup::Existing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    /// The file exists; `sha` is its current blob SHA.
    Existing { sha: String },
    /// No file at this path on the requested ref.
    Missing,
}

impl FileLookup {
    /// The blob SHA, if the file exists.
    pub fn sha(&self) -> Option<&str> {
        match self {
            FileLookup::Existing { sha } => Some(sha),
            FileLookup::Missing => None,
        }
    }
}

/// A single create-or-update file request. One request is one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWrite {
    pub path: String,
    /// File content, base64-encoded.
    pub content_base64: String,
    pub message: String,
    pub branch: String,
    /// Current blob SHA; `None` creates the file.
    pub sha: Option<String>,
}

/// Parameters of a pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch containing the changes.
    pub head: String,
    /// Branch to merge into.
    pub base: String,
}

/// The parts of a pull request the workflows need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub head_ref: String,
    pub base_ref: String,
}

/// A file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrFile {
    pub path: String,
    /// `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
    /// Unified diff of the file; GitHub omits it for binary or huge files.
    pub patch: Option<String>,
}

/// Remote repository operations used by the workflows.
///
/// Implementations map transport failures onto [`ResolverError`]:
/// missing refs and pull requests are [`ResolverError::RemoteNotFound`], a
/// stale blob SHA on write is [`ResolverError::RemoteWriteConflict`].
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Resolve `branch` to its head commit SHA.
    async fn get_ref(&self, branch: &str) -> Result<String, ResolverError>;

    /// Create `branch` pointing at `from_sha`.
    async fn create_ref(&self, branch: &str, from_sha: &str) -> Result<(), ResolverError>;

    /// Look up the blob SHA of `path` on `git_ref`.
    async fn get_content(&self, path: &str, git_ref: &str) -> Result<FileLookup, ResolverError>;

    /// Read the UTF-8 text of `path` on `git_ref`; `None` when absent.
    async fn read_file(&self, path: &str, git_ref: &str) -> Result<Option<String>, ResolverError>;

    /// Create or update a file, producing one commit.
    async fn create_or_update_file(&self, write: &FileWrite) -> Result<(), ResolverError>;

    /// Open a pull request and return its number.
    async fn create_pull_request(&self, pr: &NewPullRequest) -> Result<u64, ResolverError>;

    /// Add labels to an issue or pull request.
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ResolverError>;

    /// Fetch head and base branch of a pull request.
    async fn get_pull_request(&self, number: u64) -> Result<PullRequestInfo, ResolverError>;

    /// List the files changed by a pull request.
    async fn list_pr_files(&self, number: u64) -> Result<Vec<PrFile>, ResolverError>;

    /// Post a comment on an issue or pull request.
    async fn create_comment(&self, number: u64, body: &str) -> Result<(), ResolverError>;
}
