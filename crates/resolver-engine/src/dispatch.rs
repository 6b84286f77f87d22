use std::fmt;

use async_trait::async_trait;
use resolver_core::{CommandConfig, CommentContext, IssueContext, ResolverError};
use resolver_github::event::{ActionEvent, EventKind};

/// Which workflow an event selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A labelled issue: generate changes and open a pull request.
    GeneratePr(IssueContext),
    /// A change command: apply `feedback` to the commented pull request.
    ApplyFeedback {
        comment: CommentContext,
        feedback: String,
    },
    /// A review command: review the commented pull request.
    Review(CommentContext),
    /// Nothing to do for this event.
    Ignore,
}

impl Dispatch {
    /// Short workflow name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Dispatch::GeneratePr(_) => "generate-pr",
            Dispatch::ApplyFeedback { .. } => "apply-feedback",
            Dispatch::Review(_) => "review",
            Dispatch::Ignore => "ignore",
        }
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::GeneratePr(issue) => write!(f, "generate-pr for issue #{}", issue.number),
            Dispatch::ApplyFeedback { comment, feedback } => write!(
                f,
                "apply-feedback on {} ({:?})",
                comment.issue_url, feedback
            ),
            Dispatch::Review(comment) => write!(f, "review on {}", comment.issue_url),
            Dispatch::Ignore => write!(f, "ignore"),
        }
    }
}

/// Classify an event. Pure; performs no I/O.
///
/// Rules, first match wins:
/// 1. `issues` with the trigger label → [`Dispatch::GeneratePr`]
/// 2. `issue_comment` starting with the change command → [`Dispatch::ApplyFeedback`]
/// 3. `issue_comment` starting with the review command → [`Dispatch::Review`]
/// 4. anything else → [`Dispatch::Ignore`]
///
/// Closed or deleted issues and edited or deleted comments are ignored, so a
/// command runs once, when it is posted. A payload without an `action` is
/// treated as new.
///
/// # Examples
///
/// ```
/// use resolver_core::{CommandConfig, CommentContext};
/// use resolver_engine::dispatch::{classify, Dispatch};
/// use resolver_github::event::{ActionEvent, EventKind};
///
/// let event = ActionEvent {
///     kind: EventKind::IssueComment,
///     action: Some("created".into()),
///     issue: None,
///     comment: Some(CommentContext {
///         body: "/ai-issue-resolver-change  add null check ".into(),
///         issue_url: "https://api.github.com/repos/o/r/issues/4".into(),
///     }),
///     repository: None,
/// };
/// match classify(&event, &CommandConfig::default()) {
///     Dispatch::ApplyFeedback { feedback, .. } => assert_eq!(feedback, "add null check"),
///     other => panic!("unexpected {other}"),
/// }
/// ```
pub fn classify(event: &ActionEvent, commands: &CommandConfig) -> Dispatch {
    let action = event.action.as_deref();
    match event.kind {
        EventKind::Issues if matches!(action, Some("closed" | "deleted")) => Dispatch::Ignore,
        EventKind::IssueComment if !matches!(action, None | Some("created")) => Dispatch::Ignore,
        EventKind::Issues => match &event.issue {
            Some(issue) if issue.has_label(&commands.trigger_label) => {
                Dispatch::GeneratePr(issue.clone())
            }
            _ => Dispatch::Ignore,
        },
        EventKind::IssueComment => {
            let Some(comment) = &event.comment else {
                return Dispatch::Ignore;
            };
            if let Some(rest) = comment.body.strip_prefix(commands.change_command.as_str()) {
                Dispatch::ApplyFeedback {
                    comment: comment.clone(),
                    feedback: rest.trim().to_string(),
                }
            } else if comment.body.starts_with(commands.review_command.as_str()) {
                Dispatch::Review(comment.clone())
            } else {
                Dispatch::Ignore
            }
        }
        EventKind::Other(_) => Dispatch::Ignore,
    }
}

/// The three workflows a dispatch can start.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn generate_pr(&self, issue: &IssueContext) -> Result<(), ResolverError>;

    async fn apply_feedback(
        &self,
        comment: &CommentContext,
        feedback: &str,
    ) -> Result<(), ResolverError>;

    async fn review(&self, comment: &CommentContext) -> Result<(), ResolverError>;
}

/// Classify `event` and run the selected workflow.
///
/// Returns the decision that was taken; [`Dispatch::Ignore`] is a successful
/// no-op.
///
/// # Errors
///
/// Propagates any error from the selected workflow.
pub async fn dispatch(
    event: &ActionEvent,
    commands: &CommandConfig,
    handler: &dyn WorkflowHandler,
) -> Result<Dispatch, ResolverError> {
    let decision = classify(event, commands);
    tracing::info!(event = %event.kind, workflow = decision.name(), "dispatching");
    match &decision {
        Dispatch::GeneratePr(issue) => handler.generate_pr(issue).await?,
        Dispatch::ApplyFeedback { comment, feedback } => {
            handler.apply_feedback(comment, feedback).await?
        }
        Dispatch::Review(comment) => handler.review(comment).await?,
        Dispatch::Ignore => {}
    }
    Ok(decision)
}
