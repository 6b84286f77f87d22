//! In-memory repository (testing only)
//!
//! [`MemoryRepository`] satisfies the [`RepositoryClient`] contract without a
//! network and records every call in order, so tests can assert on commit
//! ordering and on the exact arguments each write received.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use resolver_core::ResolverError;

use crate::client::{FileLookup, FileWrite, NewPullRequest, PrFile, PullRequestInfo, RepositoryClient};

/// One observed call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    GetRef(String),
    CreateRef { branch: String, sha: String },
    GetContent { path: String, git_ref: String },
    ReadFile { path: String, git_ref: String },
    WriteFile(FileWrite),
    CreatePullRequest(NewPullRequest),
    AddLabels { number: u64, labels: Vec<String> },
    GetPullRequest(u64),
    ListPrFiles(u64),
    CreateComment { number: u64, body: String },
}

#[derive(Debug, Clone)]
struct StoredFile {
    sha: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    refs: HashMap<String, String>,
    /// (branch, path) -> file
    files: BTreeMap<(String, String), StoredFile>,
    pulls: HashMap<u64, PullRequestInfo>,
    pr_files: HashMap<u64, Vec<PrFile>>,
    conflicts: HashSet<String>,
    next_number: u64,
    next_sha: u64,
    calls: Vec<RepoCall>,
}

impl State {
    fn fresh_sha(&mut self) -> String {
        self.next_sha += 1;
        format!("sha-{}", self.next_sha)
    }
}

/// In-memory [`RepositoryClient`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        let repo = Self::default();
        repo.state.lock().unwrap().next_number = 100;
        repo
    }

    /// Create or move `branch` to `sha`.
    pub fn with_branch(self, branch: &str, sha: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .refs
            .insert(branch.to_string(), sha.to_string());
        self
    }

    /// Seed a text file on `branch`; returns the blob SHA it was given.
    pub fn seed_file(&self, branch: &str, path: &str, text: &str) -> String {
        self.seed_bytes(branch, path, text.as_bytes())
    }

    /// Seed a file with arbitrary content, e.g. an image.
    pub fn seed_bytes(&self, branch: &str, path: &str, bytes: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let sha = state.fresh_sha();
        state.files.insert(
            (branch.to_string(), path.to_string()),
            StoredFile {
                sha: sha.clone(),
                bytes: bytes.to_vec(),
            },
        );
        sha
    }

    /// Register an open pull request and the files it touches.
    pub fn seed_pull_request(&self, info: PullRequestInfo, files: Vec<PrFile>) {
        let mut state = self.state.lock().unwrap();
        state.pr_files.insert(info.number, files);
        state.pulls.insert(info.number, info);
    }

    /// Make every write to `path` fail with a conflict.
    pub fn conflict_on(&self, path: &str) {
        self.state.lock().unwrap().conflicts.insert(path.to_string());
    }

    /// Every call observed so far, in order.
    pub fn calls(&self) -> Vec<RepoCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Only the file writes, in order.
    pub fn writes(&self) -> Vec<FileWrite> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RepoCall::WriteFile(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    /// Only the comments, as `(number, body)` pairs.
    pub fn comments(&self) -> Vec<(u64, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RepoCall::CreateComment { number, body } => Some((number, body)),
                _ => None,
            })
            .collect()
    }

    /// Current text of `path` on `branch`; `None` if missing or not UTF-8.
    pub fn file_text(&self, branch: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(branch.to_string(), path.to_string()))
            .and_then(|f| String::from_utf8(f.bytes.clone()).ok())
    }

    fn record(&self, call: RepoCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl RepositoryClient for MemoryRepository {
    async fn get_ref(&self, branch: &str) -> Result<String, ResolverError> {
        self.record(RepoCall::GetRef(branch.to_string()));
        self.state
            .lock()
            .unwrap()
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| ResolverError::RemoteNotFound(format!("branch {branch}")))
    }

    async fn create_ref(&self, branch: &str, from_sha: &str) -> Result<(), ResolverError> {
        self.record(RepoCall::CreateRef {
            branch: branch.to_string(),
            sha: from_sha.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        if state.refs.contains_key(branch) {
            return Err(ResolverError::GitHub(format!(
                "branch {branch}: Reference already exists"
            )));
        }
        state.refs.insert(branch.to_string(), from_sha.to_string());
        // a new branch starts with the files of the branch it was cut from
        let source = state
            .refs
            .iter()
            .find(|(name, sha)| name.as_str() != branch && sha.as_str() == from_sha)
            .map(|(name, _)| name.clone());
        if let Some(source) = source {
            let copied: Vec<_> = state
                .files
                .iter()
                .filter(|((b, _), _)| *b == source)
                .map(|((_, p), f)| ((branch.to_string(), p.clone()), f.clone()))
                .collect();
            state.files.extend(copied);
        }
        Ok(())
    }

    async fn get_content(&self, path: &str, git_ref: &str) -> Result<FileLookup, ResolverError> {
        self.record(RepoCall::GetContent {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        });
        let state = self.state.lock().unwrap();
        Ok(match state.files.get(&(git_ref.to_string(), path.to_string())) {
            Some(file) => FileLookup::Existing {
                sha: file.sha.clone(),
            },
            None => FileLookup::Missing,
        })
    }

    async fn read_file(&self, path: &str, git_ref: &str) -> Result<Option<String>, ResolverError> {
        self.record(RepoCall::ReadFile {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        });
        Ok(self.file_text(git_ref, path))
    }

    async fn create_or_update_file(&self, write: &FileWrite) -> Result<(), ResolverError> {
        self.record(RepoCall::WriteFile(write.clone()));
        let mut state = self.state.lock().unwrap();
        if state.conflicts.contains(&write.path) {
            return Err(ResolverError::RemoteWriteConflict {
                path: write.path.clone(),
                message: "sha does not match".into(),
            });
        }
        if !state.refs.contains_key(&write.branch) {
            return Err(ResolverError::RemoteNotFound(format!(
                "branch {}",
                write.branch
            )));
        }
        let key = (write.branch.clone(), write.path.clone());
        let current = state.files.get(&key).map(|f| f.sha.clone());
        if current != write.sha {
            return Err(ResolverError::RemoteWriteConflict {
                path: write.path.clone(),
                message: format!("expected {current:?}, got {:?}", write.sha),
            });
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&write.content_base64)
            .map_err(|e| ResolverError::GitHub(format!("invalid base64 content: {e}")))?;
        let sha = state.fresh_sha();
        state.files.insert(key, StoredFile { sha, bytes });
        Ok(())
    }

    async fn create_pull_request(&self, pr: &NewPullRequest) -> Result<u64, ResolverError> {
        self.record(RepoCall::CreatePullRequest(pr.clone()));
        let mut state = self.state.lock().unwrap();
        if !state.refs.contains_key(&pr.head) {
            return Err(ResolverError::RemoteNotFound(format!("branch {}", pr.head)));
        }
        state.next_number += 1;
        let number = state.next_number;
        state.pulls.insert(
            number,
            PullRequestInfo {
                number,
                head_ref: pr.head.clone(),
                base_ref: pr.base.clone(),
            },
        );
        Ok(number)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ResolverError> {
        self.record(RepoCall::AddLabels {
            number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequestInfo, ResolverError> {
        self.record(RepoCall::GetPullRequest(number));
        self.state
            .lock()
            .unwrap()
            .pulls
            .get(&number)
            .cloned()
            .ok_or_else(|| ResolverError::RemoteNotFound(format!("pull request #{number}")))
    }

    async fn list_pr_files(&self, number: u64) -> Result<Vec<PrFile>, ResolverError> {
        self.record(RepoCall::ListPrFiles(number));
        Ok(self
            .state
            .lock()
            .unwrap()
            .pr_files
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), ResolverError> {
        self.record(RepoCall::CreateComment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }
}
