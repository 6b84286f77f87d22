use std::fmt::Write;

use async_trait::async_trait;
use resolver_core::{CommandConfig, CommentContext, IssueContext, ResolverError};
use resolver_github::client::{NewPullRequest, RepositoryClient};
use resolver_github::event::ActionEvent;

use crate::apply::{AppliedChange, ChangeApplier, CommitStyle};
use crate::dispatch::{dispatch, Dispatch, WorkflowHandler};
use crate::format::format_review;
use crate::llm::ChatModel;
use crate::prompt::{self, FileContext};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// The Generate-PR, Apply-Feedback, and Review workflows.
///
/// Every collaborator is passed in; nothing is global. Malformed model output
/// degrades to an empty result and the workflow carries on. Provider and
/// repository failures propagate.
pub struct Workflows<'a> {
    llm: &'a dyn ChatModel,
    repo: &'a dyn RepositoryClient,
    telemetry: &'a dyn TelemetrySink,
    commands: CommandConfig,
    base_branch: String,
}

impl<'a> Workflows<'a> {
    pub fn new(
        llm: &'a dyn ChatModel,
        repo: &'a dyn RepositoryClient,
        telemetry: &'a dyn TelemetrySink,
        commands: CommandConfig,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            repo,
            telemetry,
            commands,
            base_branch: base_branch.into(),
        }
    }

    /// Classify `event` and run the matching workflow.
    ///
    /// # Errors
    ///
    /// Propagates provider and repository errors from the workflow.
    pub async fn handle(&self, event: &ActionEvent) -> Result<Dispatch, ResolverError> {
        let decision = dispatch(event, &self.commands, self).await?;
        self.telemetry.record(
            TelemetryEvent::new("dispatch")
                .with("event", &event.kind)
                .with("workflow", decision.name()),
        );
        Ok(decision)
    }

    fn applier(&self) -> ChangeApplier<'_> {
        ChangeApplier::new(self.repo, self.telemetry)
    }

    /// Replace malformed-output errors with `T::default()`.
    fn or_empty<T: Default>(
        &self,
        result: Result<T, ResolverError>,
        workflow: &'static str,
    ) -> Result<T, ResolverError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_model_output() => {
                tracing::warn!(workflow, error = %e, "model output unusable, continuing with an empty result");
                if let ResolverError::Extraction { raw } = &e {
                    tracing::debug!(workflow, raw = %raw, "unparsed model response");
                }
                self.telemetry.record(
                    TelemetryEvent::new("llm_response_degraded")
                        .with("workflow", workflow)
                        .with("error", &e),
                );
                Ok(T::default())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl WorkflowHandler for Workflows<'_> {
    async fn generate_pr(&self, issue: &IssueContext) -> Result<(), ResolverError> {
        tracing::info!(issue = issue.number, model = self.llm.model(), "generating changes");
        let raw = self
            .llm
            .complete(
                prompt::generation_system_prompt(),
                &prompt::build_generation_prompt(issue),
            )
            .await?;
        let changes = self.or_empty(prompt::parse_changes(&raw), "generate-pr")?;

        if changes.is_empty() {
            self.repo
                .create_comment(
                    issue.number,
                    "The AI resolver could not produce any changes for this issue. \
                     Add more detail to the description and re-apply the label to try again.",
                )
                .await?;
            return Ok(());
        }

        let base_sha = self.repo.get_ref(&self.base_branch).await?;
        let branch = self.commands.branch_name(issue.number);
        self.repo.create_ref(&branch, &base_sha).await?;

        let applied = self
            .applier()
            .apply(&branch, &changes, CommitStyle::Verbatim)
            .await?;

        let pr_number = self
            .repo
            .create_pull_request(&NewPullRequest {
                title: format!("AI Fix: {}", issue.title),
                body: pull_request_body(issue, &applied),
                head: branch.clone(),
                base: self.base_branch.clone(),
            })
            .await?;
        self.repo
            .add_labels(pr_number, &self.commands.pr_labels)
            .await?;
        self.repo
            .create_comment(
                issue.number,
                &format!(
                    "Opened #{pr_number} with {} AI-generated change(s). \
                     Comment `{} <feedback>` on the pull request to request updates.",
                    applied.len(),
                    self.commands.change_command
                ),
            )
            .await?;

        tracing::info!(issue = issue.number, pr = pr_number, %branch, "pull request opened");
        self.telemetry.record(
            TelemetryEvent::new("pull_request_created")
                .with("issue", issue.number)
                .with("pull_request", pr_number)
                .with("files", applied.len()),
        );
        Ok(())
    }

    async fn apply_feedback(
        &self,
        comment: &CommentContext,
        feedback: &str,
    ) -> Result<(), ResolverError> {
        let number = pull_request_number(comment)?;
        if feedback.is_empty() {
            self.repo
                .create_comment(
                    number,
                    &format!(
                        "Usage: `{} <what to change>`",
                        self.commands.change_command
                    ),
                )
                .await?;
            return Ok(());
        }

        let pr = self.repo.get_pull_request(number).await?;
        let files = self.repo.list_pr_files(number).await?;

        let mut context = Vec::with_capacity(files.len());
        for file in &files {
            let content = if file.status == "removed" {
                None
            } else {
                self.repo
                    .read_file(&file.path, &pr.head_ref)
                    .await?
                    .filter(|text| text.len() <= self.commands.max_file_bytes)
            };
            context.push(FileContext {
                path: file.path.clone(),
                content,
                patch: file.patch.clone(),
            });
        }

        tracing::info!(pr = number, files = files.len(), "applying feedback");
        let raw = self
            .llm
            .complete(
                prompt::generation_system_prompt(),
                &prompt::build_feedback_prompt(feedback, &context),
            )
            .await?;
        let changes = self.or_empty(prompt::parse_changes(&raw), "apply-feedback")?;

        if changes.is_empty() {
            self.repo
                .create_comment(
                    number,
                    &format!("No changes were produced for this feedback:\n\n> {feedback}"),
                )
                .await?;
            return Ok(());
        }

        let applied = self
            .applier()
            .apply(&pr.head_ref, &changes, CommitStyle::FeedbackUpdate)
            .await?;

        let mut body = format!(
            "Applied {} change(s) to `{}` for this feedback:\n\n> {feedback}\n\n",
            applied.len(),
            pr.head_ref
        );
        push_file_list(&mut body, &applied);
        self.repo.create_comment(number, &body).await?;
        Ok(())
    }

    async fn review(&self, comment: &CommentContext) -> Result<(), ResolverError> {
        let number = pull_request_number(comment)?;
        let files = self.repo.list_pr_files(number).await?;

        tracing::info!(pr = number, files = files.len(), "reviewing pull request");
        let raw = self
            .llm
            .complete(
                prompt::review_system_prompt(),
                &prompt::build_review_prompt(&files),
            )
            .await?;
        let feedback = self.or_empty(prompt::parse_review(&raw), "review")?;

        let narrative = self
            .llm
            .complete(
                prompt::security_system_prompt(),
                &prompt::build_security_prompt(&files),
            )
            .await?;

        self.repo
            .create_comment(number, &format_review(&feedback, &narrative))
            .await?;
        self.telemetry.record(
            TelemetryEvent::new("review_posted")
                .with("pull_request", number)
                .with("findings", feedback.len()),
        );
        Ok(())
    }
}

fn pull_request_number(comment: &CommentContext) -> Result<u64, ResolverError> {
    comment.issue_number().ok_or_else(|| {
        ResolverError::Event(format!(
            "cannot read an issue number from '{}'",
            comment.issue_url
        ))
    })
}

fn pull_request_body(issue: &IssueContext, applied: &[AppliedChange]) -> String {
    let mut body = format!(
        "Resolves #{}\n\nThis pull request was generated automatically from the issue description.\n\n",
        issue.number
    );
    push_file_list(&mut body, applied);
    body.push_str("\nPlease review the changes carefully before merging.\n");
    body
}

fn push_file_list(out: &mut String, applied: &[AppliedChange]) {
    out.push_str("### Files\n\n");
    for change in applied {
        let verb = if change.created { "added" } else { "updated" };
        let _ = writeln!(out, "- `{}` ({verb})", change.path);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use resolver_core::{Label, ResolverConfig};
    use resolver_github::client::{PrFile, PullRequestInfo};
    use resolver_github::event::EventKind;
    use resolver_github::fakes::{MemoryRepository, RepoCall};

    use super::*;
    use crate::telemetry::MemorySink;

    /// Replays canned responses and records the prompts it was given.
    struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String, ResolverError>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String, ResolverError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn replying(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        fn user_prompts(&self) -> Vec<String> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .map(|(_, u)| u.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, system: &str, user: &str) -> Result<String, ResolverError> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ResolverError::Provider("no scripted response".into())))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn issue() -> IssueContext {
        IssueContext {
            number: 7,
            title: "Parser panics on empty input".into(),
            body: "parse(\"\") panics".into(),
            labels: vec![Label {
                name: "ai-fix".into(),
            }],
        }
    }

    fn comment(body: &str) -> CommentContext {
        CommentContext {
            body: body.into(),
            issue_url: "https://api.github.com/repos/octo/app/issues/55".into(),
        }
    }

    fn comment_event(body: &str) -> ActionEvent {
        ActionEvent {
            kind: EventKind::IssueComment,
            action: Some("created".into()),
            issue: None,
            comment: Some(comment(body)),
            repository: None,
        }
    }

    fn seeded_pull_request(repo: &MemoryRepository) {
        repo.seed_pull_request(
            PullRequestInfo {
                number: 55,
                head_ref: "ai-fix/issue-7".into(),
                base_ref: "main".into(),
            },
            vec![
                PrFile {
                    path: "src/parse.rs".into(),
                    status: "modified".into(),
                    patch: Some("+fn parse() {}".into()),
                },
                PrFile {
                    path: "src/old.rs".into(),
                    status: "removed".into(),
                    patch: None,
                },
            ],
        );
    }

    const TWO_CHANGES: &str = r##"Here are the changes:
```json
[
  {"path": "src/parse.rs", "content": "pub fn parse(s: &str) -> Option<u32> { s.parse().ok() }\n", "message": "Return None on empty input"},
  {"path": "tests/parse.rs", "content": "#[test]\nfn empty() {}\n", "message": "Add regression test"}
]
```"##;

    #[tokio::test]
    async fn generate_pr_opens_labelled_pull_request() {
        let llm = ScriptedModel::replying(&[TWO_CHANGES]);
        let repo = MemoryRepository::new().with_branch("main", "base-sha");
        repo.seed_file("main", "src/parse.rs", "pub fn parse(s: &str) -> u32 { s.parse().unwrap() }\n");
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        workflows.generate_pr(&issue()).await.unwrap();

        let calls = repo.calls();
        assert_eq!(calls[0], RepoCall::GetRef("main".into()));
        assert_eq!(
            calls[1],
            RepoCall::CreateRef {
                branch: "ai-fix/issue-7".into(),
                sha: "base-sha".into()
            }
        );

        let writes = repo.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].message, "Return None on empty input");
        assert!(writes[0].sha.is_some(), "existing file is updated with its sha");
        assert_eq!(writes[1].message, "Add regression test");
        assert!(writes[1].sha.is_none());
        assert!(writes.iter().all(|w| w.branch == "ai-fix/issue-7"));

        let pr = calls
            .iter()
            .find_map(|c| match c {
                RepoCall::CreatePullRequest(pr) => Some(pr.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(pr.title, "AI Fix: Parser panics on empty input");
        assert_eq!(pr.head, "ai-fix/issue-7");
        assert_eq!(pr.base, "main");
        assert!(pr.body.contains("Resolves #7"));
        assert!(pr.body.contains("`src/parse.rs` (updated)"));
        assert!(pr.body.contains("`tests/parse.rs` (added)"));

        assert!(calls.contains(&RepoCall::AddLabels {
            number: 101,
            labels: vec!["ai-generated".into()]
        }));
        let comments = repo.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 7);
        assert!(comments[0].1.contains("#101"));

        assert_eq!(
            sink.names(),
            vec!["change_applied", "change_applied", "pull_request_created"]
        );
    }

    #[tokio::test]
    async fn generate_pr_with_unparseable_output_only_comments() {
        let llm = ScriptedModel::replying(&["I would start by reading the parser."]);
        let repo = MemoryRepository::new().with_branch("main", "base-sha");
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        workflows.generate_pr(&issue()).await.unwrap();

        let calls = repo.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], RepoCall::CreateComment { number: 7, .. }));
        assert_eq!(sink.names(), vec!["llm_response_degraded"]);
    }

    #[tokio::test]
    async fn generate_pr_with_invalid_change_degrades_whole_set() {
        let raw = r#"[{"path":"a.rs","content":"x","message":"ok"},{"path":"","content":"y","message":"bad"}]"#;
        let llm = ScriptedModel::replying(&[raw]);
        let repo = MemoryRepository::new().with_branch("main", "base-sha");
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        workflows.generate_pr(&issue()).await.unwrap();

        assert!(repo.writes().is_empty());
        let degraded = &sink.events()[0];
        assert_eq!(degraded.properties["workflow"], "generate-pr");
        assert!(degraded.properties["error"].contains("[1].path"));
    }

    #[tokio::test]
    async fn generate_pr_missing_base_branch_is_fatal() {
        let llm = ScriptedModel::replying(&[TWO_CHANGES]);
        let repo = MemoryRepository::new();
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        let err = workflows.generate_pr(&issue()).await.unwrap_err();
        assert!(matches!(err, ResolverError::RemoteNotFound(_)));
        assert!(repo.writes().is_empty());
    }

    #[tokio::test]
    async fn provider_error_propagates_without_side_effects() {
        let llm = ScriptedModel::new(vec![Err(ResolverError::Provider(
            "429 Too Many Requests".into(),
        ))]);
        let repo = MemoryRepository::new().with_branch("main", "base-sha");
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        let err = workflows.generate_pr(&issue()).await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn change_comment_applies_feedback_end_to_end() {
        let llm = ScriptedModel::replying(&[
            r#"[{"path":"src/parse.rs","content":"fn parse() { /* checked */ }\n","message":"Add null check"}]"#,
        ]);
        let repo = MemoryRepository::new()
            .with_branch("main", "base-sha")
            .with_branch("ai-fix/issue-7", "head-sha");
        let sha = repo.seed_file("ai-fix/issue-7", "src/parse.rs", "fn parse() {}\n");
        seeded_pull_request(&repo);
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        let decision = workflows
            .handle(&comment_event("/ai-issue-resolver-change add null check"))
            .await
            .unwrap();

        assert_eq!(
            decision,
            Dispatch::ApplyFeedback {
                comment: comment("/ai-issue-resolver-change add null check"),
                feedback: "add null check".into(),
            }
        );
        let prompt = &llm.user_prompts()[0];
        assert!(prompt.contains("> add null check"));
        assert!(prompt.contains("fn parse() {}"));

        // removed files are not read
        assert!(!repo.calls().contains(&RepoCall::ReadFile {
            path: "src/old.rs".into(),
            git_ref: "ai-fix/issue-7".into()
        }));

        let writes = repo.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].branch, "ai-fix/issue-7");
        assert_eq!(writes[0].message, "AI Update: Add null check");
        assert_eq!(writes[0].sha.as_deref(), Some(sha.as_str()));

        let comments = repo.comments();
        assert_eq!(comments[0].0, 55);
        assert!(comments[0].1.contains("Applied 1 change(s)"));
        assert_eq!(sink.names(), vec!["change_applied", "dispatch"]);
    }

    #[tokio::test]
    async fn binary_files_in_the_pull_request_do_not_stop_feedback() {
        let llm = ScriptedModel::replying(&[
            r#"[{"path":"src/a.rs","content":"fn a() { check(); }\n","message":"Add null check"}]"#,
        ]);
        let repo = MemoryRepository::new().with_branch("ai-fix/issue-7", "head-sha");
        repo.seed_file("ai-fix/issue-7", "src/a.rs", "fn a() {}\n");
        repo.seed_bytes(
            "ai-fix/issue-7",
            "assets/logo.png",
            &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        );
        repo.seed_pull_request(
            PullRequestInfo {
                number: 55,
                head_ref: "ai-fix/issue-7".into(),
                base_ref: "main".into(),
            },
            vec![
                PrFile {
                    path: "src/a.rs".into(),
                    status: "modified".into(),
                    patch: None,
                },
                PrFile {
                    path: "assets/logo.png".into(),
                    status: "added".into(),
                    patch: None,
                },
            ],
        );
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        workflows
            .apply_feedback(&comment("/ai-issue-resolver-change add null check"), "add null check")
            .await
            .unwrap();

        let prompt = &llm.user_prompts()[0];
        assert!(prompt.contains("### assets/logo.png\n\n(content not available)"));
        assert!(prompt.contains("fn a() {}"));
        let writes = repo.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].path, "src/a.rs");
    }

    #[tokio::test]
    async fn oversized_files_are_not_sent_as_context() {
        let llm = ScriptedModel::replying(&["[]"]);
        let repo = MemoryRepository::new().with_branch("ai-fix/issue-7", "head-sha");
        repo.seed_file("ai-fix/issue-7", "src/parse.rs", &"x".repeat(64));
        seeded_pull_request(&repo);
        let sink = MemorySink::new();
        let commands = CommandConfig {
            max_file_bytes: 10,
            ..CommandConfig::default()
        };
        let workflows = Workflows::new(&llm, &repo, &sink, commands, "main");

        workflows
            .apply_feedback(&comment("/ai-issue-resolver-change x"), "x")
            .await
            .unwrap();

        let prompt = &llm.user_prompts()[0];
        assert!(!prompt.contains(&"x".repeat(64)));
        assert!(prompt.contains("(content not available)"));
        // an empty change list is a valid answer, not a degradation
        assert!(sink.names().is_empty());
        assert!(repo.comments()[0].1.contains("No changes were produced"));
    }

    #[tokio::test]
    async fn empty_feedback_posts_usage() {
        let llm = ScriptedModel::replying(&[]);
        let repo = MemoryRepository::new();
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        workflows
            .handle(&comment_event("/ai-issue-resolver-change   "))
            .await
            .unwrap();

        assert!(llm.user_prompts().is_empty());
        assert!(repo.comments()[0].1.starts_with("Usage:"));
    }

    #[tokio::test]
    async fn review_posts_formatted_feedback() {
        let review = r#"{
            "qualityIssues": [{"file": "src/parse.rs", "line": 3, "description": "unwrap on input", "severity": "high"}],
            "securityIssues": [],
            "improvements": [],
            "testingSuggestions": [{"file": "src/parse.rs", "description": "test empty string"}]
        }"#;
        let llm = ScriptedModel::replying(&[review, "No security impact."]);
        let repo = MemoryRepository::new();
        seeded_pull_request(&repo);
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        let decision = workflows
            .handle(&comment_event("/ai-issue-resolver-review please check"))
            .await
            .unwrap();

        assert_eq!(decision.name(), "review");
        assert!(repo.writes().is_empty());
        let comments = repo.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 55);
        assert!(comments[0].1.contains("`src/parse.rs:3`: unwrap on input"));
        assert!(comments[0].1.contains("No security impact."));
        let events = sink.events();
        assert_eq!(events[0].name, "review_posted");
        assert_eq!(events[0].properties["findings"], "2");
    }

    #[tokio::test]
    async fn malformed_review_degrades_to_empty_comment() {
        let llm = ScriptedModel::replying(&[
            r#"{"qualityIssues": [], "improvements": [], "testingSuggestions": []}"#,
            "Nothing notable.",
        ]);
        let repo = MemoryRepository::new();
        seeded_pull_request(&repo);
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");

        workflows.review(&comment("/ai-issue-resolver-review")).await.unwrap();

        let body = &repo.comments()[0].1;
        assert!(body.contains("0 quality | 0 security | 0 improvements | 0 testing"));
        assert!(body.contains("Nothing notable."));
        assert_eq!(sink.names(), vec!["llm_response_degraded", "review_posted"]);
    }

    #[tokio::test]
    async fn unrelated_event_touches_nothing() {
        let llm = ScriptedModel::replying(&[]);
        let repo = MemoryRepository::new();
        let sink = MemorySink::new();
        let config = ResolverConfig::default();
        let workflows = Workflows::new(&llm, &repo, &sink, config.commands, "main");

        let decision = workflows.handle(&comment_event("nice work!")).await.unwrap();

        assert_eq!(decision, Dispatch::Ignore);
        assert!(repo.calls().is_empty());
        assert!(llm.user_prompts().is_empty());
        assert_eq!(sink.events()[0].properties["workflow"], "ignore");
    }

    #[tokio::test]
    async fn comment_without_issue_number_is_event_error() {
        let llm = ScriptedModel::replying(&[]);
        let repo = MemoryRepository::new();
        let sink = MemorySink::new();
        let workflows = Workflows::new(&llm, &repo, &sink, CommandConfig::default(), "main");
        let bad = CommentContext {
            body: "/ai-issue-resolver-review".into(),
            issue_url: "not-a-url".into(),
        };

        let err = workflows.review(&bad).await.unwrap_err();
        assert!(matches!(err, ResolverError::Event(_)));
    }
}
