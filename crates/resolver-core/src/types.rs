use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A single file write instruction produced by the model.
///
/// Only values that passed schema validation reach the change applier, so a
/// `CodeChange` seen outside the parsing pipeline always has a non-empty
/// `path` and `message`.
///
/// # Examples
///
/// ```
/// use resolver_core::CodeChange;
///
/// let change = CodeChange {
///     path: "src/lib.rs".into(),
///     content: "pub fn add(a: i32, b: i32) -> i32 { a + b }\n".into(),
///     message: "Add add()".into(),
/// };
/// assert_eq!(change.path, "src/lib.rs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    /// Repository-relative file path.
    pub path: String,
    /// Full new content of the file.
    pub content: String,
    /// Commit message for this file.
    pub message: String,
}

/// Severity of a code quality finding.
///
/// # Examples
///
/// ```
/// use resolver_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"medium\"").unwrap();
/// assert_eq!(s, Severity::Medium);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Accepted wire values, in ascending order.
    pub const VALUES: &'static [&'static str] = &["low", "medium", "high"];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Severity of a security finding. Adds `critical` on top of [`Severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecuritySeverity {
    /// Accepted wire values, in ascending order.
    pub const VALUES: &'static [&'static str] = &["low", "medium", "high", "critical"];
}

impl fmt::Display for SecuritySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecuritySeverity::Low => write!(f, "low"),
            SecuritySeverity::Medium => write!(f, "medium"),
            SecuritySeverity::High => write!(f, "high"),
            SecuritySeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Category of a suggested improvement.
///
/// # Examples
///
/// ```
/// use resolver_core::ImprovementKind;
///
/// let kind: ImprovementKind = serde_json::from_str("\"best-practice\"").unwrap();
/// assert_eq!(kind, ImprovementKind::BestPractice);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImprovementKind {
    Performance,
    Readability,
    Maintainability,
    BestPractice,
}

impl ImprovementKind {
    /// Accepted wire values.
    pub const VALUES: &'static [&'static str] =
        &["performance", "readability", "maintainability", "best-practice"];
}

impl fmt::Display for ImprovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImprovementKind::Performance => write!(f, "performance"),
            ImprovementKind::Readability => write!(f, "readability"),
            ImprovementKind::Maintainability => write!(f, "maintainability"),
            ImprovementKind::BestPractice => write!(f, "best-practice"),
        }
    }
}

/// A code quality finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub file: String,
    /// Line in the new version of the file, when the model gave one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    pub description: String,
    pub severity: Severity,
}

/// A security finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub file: String,
    pub description: String,
    pub severity: SecuritySeverity,
}

/// A non-blocking improvement suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Improvement {
    pub file: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ImprovementKind,
}

/// A suggestion for additional tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingSuggestion {
    pub file: String,
    pub description: String,
}

/// Structured output of one review call.
///
/// All four arrays are always present. A review whose model output could not
/// be parsed is represented by [`ReviewFeedback::default`], which has every
/// array empty.
///
/// # Examples
///
/// ```
/// use resolver_core::ReviewFeedback;
///
/// let feedback = ReviewFeedback::default();
/// assert!(feedback.is_empty());
/// let json = serde_json::to_value(&feedback).unwrap();
/// assert!(json.get("securityIssues").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFeedback {
    pub quality_issues: Vec<QualityIssue>,
    pub security_issues: Vec<SecurityIssue>,
    pub improvements: Vec<Improvement>,
    pub testing_suggestions: Vec<TestingSuggestion>,
}

impl ReviewFeedback {
    /// Returns `true` when no section has any entry.
    pub fn is_empty(&self) -> bool {
        self.quality_issues.is_empty()
            && self.security_issues.is_empty()
            && self.improvements.is_empty()
            && self.testing_suggestions.is_empty()
    }

    /// Total number of entries across all sections.
    pub fn len(&self) -> usize {
        self.quality_issues.len()
            + self.security_issues.len()
            + self.improvements.len()
            + self.testing_suggestions.len()
    }
}

/// An issue label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// The issue an event refers to, as delivered in the event payload.
///
/// # Examples
///
/// ```
/// use resolver_core::IssueContext;
///
/// let issue: IssueContext = serde_json::from_str(
///     r#"{"number": 7, "title": "Crash", "body": null, "labels": [{"name": "ai-fix"}]}"#,
/// ).unwrap();
/// assert_eq!(issue.body, "");
/// assert!(issue.has_label("ai-fix"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContext {
    pub number: u64,
    pub title: String,
    /// Issue description; GitHub sends `null` for an empty body.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl IssueContext {
    /// Returns `true` if the issue carries a label with exactly this name.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }
}

/// The comment an `issue_comment` event refers to.
///
/// # Examples
///
/// ```
/// use resolver_core::CommentContext;
///
/// let comment = CommentContext {
///     body: "/ai-issue-resolver-review".into(),
///     issue_url: "https://api.github.com/repos/octo/app/issues/42".into(),
/// };
/// assert_eq!(comment.issue_number(), Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentContext {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    pub issue_url: String,
}

impl CommentContext {
    /// Issue or pull request number, taken from the last segment of `issue_url`.
    pub fn issue_number(&self) -> Option<u64> {
        self.issue_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse().ok())
    }
}

/// The repository the event was delivered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryContext {
    pub owner: String,
    pub name: String,
    /// Default branch, when the payload carried one.
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl RepositoryContext {
    /// Parse an `owner/name` string such as `GITHUB_REPOSITORY`.
    ///
    /// Returns `None` unless both halves are non-empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use resolver_core::RepositoryContext;
    ///
    /// let repo = RepositoryContext::from_full_name("octocat/hello-world").unwrap();
    /// assert_eq!(repo.owner, "octocat");
    /// assert_eq!(repo.name, "hello-world");
    /// assert!(RepositoryContext::from_full_name("no-slash").is_none());
    /// ```
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            default_branch: None,
        })
    }
}

impl fmt::Display for RepositoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_feedback_uses_camel_case_keys() {
        let json = serde_json::to_value(ReviewFeedback::default()).unwrap();
        assert!(json.get("qualityIssues").is_some());
        assert!(json.get("testingSuggestions").is_some());
        assert!(json.get("quality_issues").is_none());
    }

    #[test]
    fn improvement_kind_uses_type_key() {
        let improvement: Improvement = serde_json::from_str(
            r#"{"file":"a.rs","description":"cache it","type":"performance"}"#,
        )
        .unwrap();
        assert_eq!(improvement.kind, ImprovementKind::Performance);
    }

    #[test]
    fn feedback_len_counts_all_sections() {
        let feedback = ReviewFeedback {
            quality_issues: vec![QualityIssue {
                file: "a.rs".into(),
                line: Some(3),
                description: "unused".into(),
                severity: Severity::Low,
            }],
            security_issues: vec![SecurityIssue {
                file: "b.rs".into(),
                description: "sql injection".into(),
                severity: SecuritySeverity::Critical,
            }],
            improvements: vec![],
            testing_suggestions: vec![TestingSuggestion {
                file: "c.rs".into(),
                description: "cover error path".into(),
            }],
        };
        assert_eq!(feedback.len(), 3);
        assert!(!feedback.is_empty());
    }

    #[test]
    fn enum_values_match_serde_names() {
        for value in Severity::VALUES {
            let parsed: Severity = serde_json::from_value(serde_json::json!(value)).unwrap();
            assert_eq!(parsed.to_string(), *value);
        }
        for value in SecuritySeverity::VALUES {
            let parsed: SecuritySeverity =
                serde_json::from_value(serde_json::json!(value)).unwrap();
            assert_eq!(parsed.to_string(), *value);
        }
        for value in ImprovementKind::VALUES {
            let parsed: ImprovementKind =
                serde_json::from_value(serde_json::json!(value)).unwrap();
            assert_eq!(parsed.to_string(), *value);
        }
    }

    #[test]
    fn issue_labels_default_to_empty() {
        let issue: IssueContext =
            serde_json::from_str(r#"{"number":1,"title":"t","body":"b"}"#).unwrap();
        assert!(issue.labels.is_empty());
        assert!(!issue.has_label("ai-fix"));
    }

    #[test]
    fn comment_issue_number_handles_bad_urls() {
        let comment = CommentContext {
            body: String::new(),
            issue_url: "https://api.github.com/repos/o/r/issues/".into(),
        };
        assert_eq!(comment.issue_number(), None);

        let comment = CommentContext {
            body: String::new(),
            issue_url: "https://api.github.com/repos/o/r/issues/abc".into(),
        };
        assert_eq!(comment.issue_number(), None);
    }

    #[test]
    fn repository_display_is_full_name() {
        let repo = RepositoryContext::from_full_name("octo/app").unwrap();
        assert_eq!(repo.to_string(), "octo/app");
        assert!(RepositoryContext::from_full_name("/app").is_none());
        assert!(RepositoryContext::from_full_name("a/b/c").is_none());
    }
}
