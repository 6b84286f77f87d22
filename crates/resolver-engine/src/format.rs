use std::fmt::Write;

use resolver_core::{ReviewFeedback, SecuritySeverity, Severity};

const NOTHING_FOUND: &str = "_Nothing to report._\n";

/// Render review feedback and a security narrative as a PR comment.
///
/// Pure and deterministic: entries keep the order the model gave them.
///
/// # Examples
///
/// ```
/// use resolver_core::ReviewFeedback;
/// use resolver_engine::format::format_review;
///
/// let md = format_review(&ReviewFeedback::default(), "No security impact.");
/// assert!(md.starts_with("## AI Code Review"));
/// assert!(md.contains("No security impact."));
/// ```
pub fn format_review(feedback: &ReviewFeedback, security_narrative: &str) -> String {
    let mut out = String::from("## AI Code Review\n\n");
    let _ = writeln!(
        out,
        "**Findings:** {} quality | {} security | {} improvements | {} testing\n",
        feedback.quality_issues.len(),
        feedback.security_issues.len(),
        feedback.improvements.len(),
        feedback.testing_suggestions.len(),
    );

    out.push_str("### Code Quality\n\n");
    if feedback.quality_issues.is_empty() {
        out.push_str(NOTHING_FOUND);
    }
    for issue in &feedback.quality_issues {
        let location = match issue.line {
            Some(line) => format!("{}:{line}", issue.file),
            None => issue.file.clone(),
        };
        let _ = writeln!(
            out,
            "- {} **{}** `{location}`: {}",
            quality_marker(issue.severity),
            issue.severity.to_string().to_uppercase(),
            one_line(&issue.description),
        );
    }

    out.push_str("\n### Security\n\n");
    if feedback.security_issues.is_empty() {
        out.push_str(NOTHING_FOUND);
    }
    for issue in &feedback.security_issues {
        let _ = writeln!(
            out,
            "- {} **{}** `{}`: {}",
            security_marker(issue.severity),
            issue.severity.to_string().to_uppercase(),
            issue.file,
            one_line(&issue.description),
        );
    }

    out.push_str("\n### Suggested Improvements\n\n");
    if feedback.improvements.is_empty() {
        out.push_str(NOTHING_FOUND);
    }
    for improvement in &feedback.improvements {
        let _ = writeln!(
            out,
            "- _{}_ `{}`: {}",
            improvement.kind,
            improvement.file,
            one_line(&improvement.description),
        );
    }

    out.push_str("\n### Testing Suggestions\n\n");
    if feedback.testing_suggestions.is_empty() {
        out.push_str(NOTHING_FOUND);
    }
    for suggestion in &feedback.testing_suggestions {
        let _ = writeln!(
            out,
            "- `{}`: {}",
            suggestion.file,
            one_line(&suggestion.description),
        );
    }

    out.push_str("\n### Security Analysis\n\n");
    let narrative = security_narrative.trim();
    if narrative.is_empty() {
        out.push_str("_No security analysis available._\n");
    } else {
        out.push_str(narrative);
        out.push('\n');
    }

    out.push_str("\n---\n_Generated by ai-issue-resolver._\n");
    out
}

fn quality_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "\u{1f534}",
        Severity::Medium => "\u{1f7e0}",
        Severity::Low => "\u{1f7e1}",
    }
}

fn security_marker(severity: SecuritySeverity) -> &'static str {
    match severity {
        SecuritySeverity::Critical => "\u{1f6a8}",
        SecuritySeverity::High => "\u{1f534}",
        SecuritySeverity::Medium => "\u{1f7e0}",
        SecuritySeverity::Low => "\u{1f7e1}",
    }
}

/// Collapse newlines so a description stays inside its list item.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
