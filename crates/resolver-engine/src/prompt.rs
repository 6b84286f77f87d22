use std::fmt::Write;

use resolver_core::{CodeChange, IssueContext, ResolverError, ReviewFeedback};
use resolver_github::client::PrFile;

use crate::extract::extract;
use crate::schema::{validate_as, Schema};

const GENERATION_SYSTEM_PROMPT: &str = "\
You are an expert software engineer resolving GitHub issues. You produce \
complete, working file contents that fix the described problem.

Rules:
- Respond with JSON only, no prose and no markdown fences
- Each entry replaces the whole file at `path`, so `content` must be the full file
- Paths are relative to the repository root
- Keep changes minimal and focused on the issue
- Each `message` is a short imperative commit message";

const REVIEW_SYSTEM_PROMPT: &str = "\
You are an expert code reviewer. You analyse pull request changes for code \
quality, security, possible improvements, and missing tests.

Rules:
- Respond with JSON only, no prose and no markdown fences
- Only report findings that are supported by the diff
- Reference the file each finding applies to
- Use empty arrays for sections with no findings";

const SECURITY_SYSTEM_PROMPT: &str = "\
You are an application security engineer. Summarise the security impact of \
a pull request in a few short markdown paragraphs: what attack surface \
changes, which risks are introduced or removed, and what should be verified \
before merging. If there is no security impact, say so in one sentence.";

/// A file given to the model as context for a change request.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub path: String,
    /// Current text on the PR head, when it could be read.
    pub content: Option<String>,
    pub patch: Option<String>,
}

/// System prompt for issue-driven and feedback-driven code generation.
pub fn generation_system_prompt() -> &'static str {
    GENERATION_SYSTEM_PROMPT
}

/// System prompt for the structured review.
pub fn review_system_prompt() -> &'static str {
    REVIEW_SYSTEM_PROMPT
}

/// System prompt for the free-text security narrative.
pub fn security_system_prompt() -> &'static str {
    SECURITY_SYSTEM_PROMPT
}

fn output_schema<T: Schema>() -> String {
    let schema = T::shape().to_json_schema();
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string())
}

/// Build the user prompt asking for changes that resolve `issue`.
///
/// # Examples
///
/// ```
/// use resolver_core::IssueContext;
/// use resolver_engine::prompt::build_generation_prompt;
///
/// let issue = IssueContext {
///     number: 3,
///     title: "Panic on empty input".into(),
///     body: "Calling parse(\"\") panics".into(),
///     labels: vec![],
/// };
/// let prompt = build_generation_prompt(&issue);
/// assert!(prompt.contains("#3: Panic on empty input"));
/// assert!(prompt.contains("\"minLength\": 1"));
/// ```
pub fn build_generation_prompt(issue: &IssueContext) -> String {
    let mut prompt = format!(
        "Resolve the following GitHub issue.\n\n## Issue #{}: {}\n\n",
        issue.number, issue.title
    );
    if issue.body.trim().is_empty() {
        prompt.push_str("(no description)\n");
    } else {
        prompt.push_str(&issue.body);
        prompt.push('\n');
    }
    let _ = write!(
        prompt,
        "\nRespond with a JSON array of file changes matching this JSON Schema:\n\n```json\n{}\n```\n",
        output_schema::<Vec<CodeChange>>()
    );
    prompt
}

/// Build the user prompt asking for changes that address reviewer `feedback`
/// on a pull request.
pub fn build_feedback_prompt(feedback: &str, files: &[FileContext]) -> String {
    let mut prompt = String::from("Update the pull request to address this feedback:\n\n");
    let _ = writeln!(prompt, "> {}\n", feedback.replace('\n', "\n> "));

    if files.is_empty() {
        prompt.push_str("The pull request does not touch any files yet.\n");
    } else {
        prompt.push_str("## Files in the pull request\n");
        for file in files {
            let _ = writeln!(prompt, "\n### {}\n", file.path);
            match &file.content {
                Some(content) => {
                    let _ = writeln!(prompt, "Current content:\n```\n{content}\n```");
                }
                None => prompt.push_str("(content not available)\n"),
            }
            if let Some(patch) = &file.patch {
                let _ = writeln!(prompt, "Changes so far:\n```diff\n{patch}\n```");
            }
        }
    }

    let _ = write!(
        prompt,
        "\nRespond with a JSON array of file changes matching this JSON Schema:\n\n```json\n{}\n```\n\
         Return an empty array if no change is needed.\n",
        output_schema::<Vec<CodeChange>>()
    );
    prompt
}

/// Build the user prompt for the structured review of `files`.
///
/// # Examples
///
/// ```
/// use resolver_engine::prompt::build_review_prompt;
/// use resolver_github::client::PrFile;
///
/// let files = vec![PrFile {
///     path: "src/db.rs".into(),
///     status: "modified".into(),
///     patch: Some("+let q = format!(\"SELECT {}\", id);".into()),
/// }];
/// let prompt = build_review_prompt(&files);
/// assert!(prompt.contains("src/db.rs (modified)"));
/// assert!(prompt.contains("securityIssues"));
/// ```
pub fn build_review_prompt(files: &[PrFile]) -> String {
    let mut prompt = String::from("Review the following pull request changes.\n\n");
    push_diffs(&mut prompt, files);
    let _ = write!(
        prompt,
        "\nRespond with a JSON object matching this JSON Schema:\n\n```json\n{}\n```\n",
        output_schema::<ReviewFeedback>()
    );
    prompt
}

/// Build the user prompt for the security narrative of `files`.
pub fn build_security_prompt(files: &[PrFile]) -> String {
    let mut prompt = String::from("Assess the security impact of these changes.\n\n");
    push_diffs(&mut prompt, files);
    prompt
}

fn push_diffs(prompt: &mut String, files: &[PrFile]) {
    for file in files {
        let _ = writeln!(prompt, "### {} ({})", file.path, file.status);
        match &file.patch {
            Some(patch) => {
                let _ = writeln!(prompt, "```diff\n{patch}\n```\n");
            }
            None => prompt.push_str("(no textual diff)\n\n"),
        }
    }
}

/// Parse a model response into a validated change list.
///
/// # Errors
///
/// Returns [`ResolverError::Extraction`] or [`ResolverError::SchemaValidation`].
///
/// # Examples
///
/// ```
/// use resolver_engine::prompt::parse_changes;
///
/// let raw = r#"Here you go: [{"path":"a.rs","content":"","message":"m"}]"#;
/// assert_eq!(parse_changes(raw).unwrap().len(), 1);
/// ```
pub fn parse_changes(raw: &str) -> Result<Vec<CodeChange>, ResolverError> {
    validate_as(extract(raw)?)
}

/// Parse a model response into validated review feedback.
///
/// # Errors
///
/// Returns [`ResolverError::Extraction`] or [`ResolverError::SchemaValidation`].
pub fn parse_review(raw: &str) -> Result<ReviewFeedback, ResolverError> {
    validate_as(extract(raw)?)
}
