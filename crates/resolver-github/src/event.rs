use std::fmt;
use std::path::Path;

use resolver_core::{CommentContext, IssueContext, RepositoryContext, ResolverError};
use serde::Deserialize;

/// Kind of webhook event that started the run.
///
/// # Examples
///
/// ```
/// use resolver_github::event::EventKind;
///
/// assert_eq!(EventKind::from_name("issues"), EventKind::Issues);
/// assert_eq!(EventKind::from_name("push"), EventKind::Other("push".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Issues,
    IssueComment,
    Other(String),
}

impl EventKind {
    /// Map a `GITHUB_EVENT_NAME` value to a kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "issues" => EventKind::Issues,
            "issue_comment" => EventKind::IssueComment,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Issues => write!(f, "issues"),
            EventKind::IssueComment => write!(f, "issue_comment"),
            EventKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// The inbound event, reduced to the fields the resolver reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEvent {
    pub kind: EventKind,
    /// Payload `action` (`opened`, `labeled`, `created`, ...), if any.
    pub action: Option<String>,
    pub issue: Option<IssueContext>,
    pub comment: Option<CommentContext>,
    pub repository: Option<RepositoryContext>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    issue: Option<IssueContext>,
    #[serde(default)]
    comment: Option<CommentContext>,
    #[serde(default)]
    repository: Option<RawRepository>,
}

#[derive(Deserialize)]
struct RawRepository {
    full_name: String,
    #[serde(default)]
    default_branch: Option<String>,
}

impl ActionEvent {
    /// Parse an event payload delivered for `event_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Event`] if the payload is not valid JSON or a
    /// present `issue`/`comment` object is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use resolver_github::event::{ActionEvent, EventKind};
    ///
    /// let payload = r#"{
    ///     "action": "created",
    ///     "comment": {"body": "/ai-issue-resolver-review", "issue_url": "https://api.github.com/repos/o/r/issues/5"},
    ///     "repository": {"full_name": "o/r", "default_branch": "main"}
    /// }"#;
    /// let event = ActionEvent::from_payload("issue_comment", payload).unwrap();
    /// assert_eq!(event.kind, EventKind::IssueComment);
    /// assert_eq!(event.comment.unwrap().issue_number(), Some(5));
    /// ```
    pub fn from_payload(event_name: &str, payload: &str) -> Result<Self, ResolverError> {
        let raw: RawPayload = serde_json::from_str(payload)
            .map_err(|e| ResolverError::Event(format!("invalid {event_name} payload: {e}")))?;

        let repository = match raw.repository {
            Some(repo) => {
                let mut ctx = RepositoryContext::from_full_name(&repo.full_name).ok_or_else(|| {
                    ResolverError::Event(format!(
                        "invalid repository full_name '{}'",
                        repo.full_name
                    ))
                })?;
                ctx.default_branch = repo.default_branch;
                Some(ctx)
            }
            None => None,
        };

        Ok(Self {
            kind: EventKind::from_name(event_name),
            action: raw.action,
            issue: raw.issue,
            comment: raw.comment,
            repository,
        })
    }

    /// Read a payload file written by the Actions runner.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Io`] if the file cannot be read, otherwise as
    /// [`ActionEvent::from_payload`].
    pub fn from_file(event_name: &str, path: &Path) -> Result<Self, ResolverError> {
        let payload = std::fs::read_to_string(path)?;
        Self::from_payload(event_name, &payload)
    }

    /// Load the event from the Actions environment.
    ///
    /// Reads `GITHUB_EVENT_NAME` and `GITHUB_EVENT_PATH`; when the payload has
    /// no `repository` object, falls back to `GITHUB_REPOSITORY`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Event`] if either variable is missing.
    pub fn from_env<F>(lookup: F) -> Result<Self, ResolverError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup("GITHUB_EVENT_NAME")
            .ok_or_else(|| ResolverError::Event("GITHUB_EVENT_NAME is not set".into()))?;
        let path = lookup("GITHUB_EVENT_PATH")
            .ok_or_else(|| ResolverError::Event("GITHUB_EVENT_PATH is not set".into()))?;
        let mut event = Self::from_file(&name, Path::new(&path))?;
        if event.repository.is_none() {
            event.repository = lookup("GITHUB_REPOSITORY")
                .as_deref()
                .and_then(RepositoryContext::from_full_name);
        }
        Ok(event)
    }
}
