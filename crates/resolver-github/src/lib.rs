//! GitHub integration: the repository collaborator and the Actions event payload.
//!
//! - [`client::RepositoryClient`] — narrow async contract the workflows depend on
//! - [`github::GitHubClient`] — REST implementation backed by `octocrab`
//! - [`event::ActionEvent`] — the inbound `issues` / `issue_comment` payload
//! - [`fakes::MemoryRepository`] — in-memory implementation for tests

pub mod client;
pub mod event;
pub mod fakes;
pub mod github;
