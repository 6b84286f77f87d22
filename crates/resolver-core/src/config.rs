use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ResolverError;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".ai-issue-resolver.toml";

/// Top-level configuration.
///
/// Supports layered resolution: CLI flags > action inputs > config file > defaults.
///
/// # Examples
///
/// ```
/// use resolver_core::ResolverConfig;
///
/// let config = ResolverConfig::default();
/// assert_eq!(config.llm.provider, "openai");
/// assert_eq!(config.llm.model, "gpt-4");
/// assert_eq!(config.commands.trigger_label, "ai-fix");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Trigger label, command tokens, and branch naming.
    #[serde(default)]
    pub commands: CommandConfig,
}

impl ResolverConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Io`] if the file cannot be read, or
    /// [`ResolverError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ResolverError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use resolver_core::ResolverConfig;
    ///
    /// let toml = r#"
    /// [commands]
    /// trigger_label = "bot-fix"
    /// "#;
    /// let config = ResolverConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.commands.trigger_label, "bot-fix");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ResolverError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from an explicit path, or from [`CONFIG_FILE_NAME`] if it exists,
    /// or fall back to defaults.
    ///
    /// Logs a warning when the command tokens overlap.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or discovered file cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ResolverError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        if let Some((shorter, longer)) = config.commands.overlapping_tokens() {
            tracing::warn!(
                shorter = %shorter,
                longer = %longer,
                "command token is a prefix of another; the change command is matched first"
            );
        }
        Ok(config)
    }

    /// Overlay GitHub Action inputs on top of the current values.
    ///
    /// Actions exposes each input `foo-bar` as the environment variable
    /// `INPUT_FOO-BAR`. `lookup` abstracts the environment so callers can pass
    /// `|k| std::env::var(k).ok()`. Empty values are ignored. The GitHub token
    /// falls back to `GITHUB_TOKEN`.
    ///
    /// # Examples
    ///
    /// ```
    /// use resolver_core::ResolverConfig;
    ///
    /// let mut config = ResolverConfig::default();
    /// config.apply_action_inputs(|key| match key {
    ///     "INPUT_MODEL-NAME" => Some("gpt-4o".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.llm.model, "gpt-4o");
    /// ```
    pub fn apply_action_inputs<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("INPUT_GITHUB-TOKEN").or_else(|| get("GITHUB_TOKEN")) {
            self.github.token = Some(token);
        }
        if let Some(url) = get("GITHUB_API_URL") {
            self.github.api_url = Some(url);
        }
        if let Some(key) = get("INPUT_MODEL-API-KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(provider) = get("INPUT_MODEL-PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = get("INPUT_MODEL-NAME") {
            self.llm.model = model;
        }
        if let Some(url) = get("INPUT_MODEL-BASE-URL") {
            self.llm.base_url = Some(url);
        }
    }

    /// Check that everything a `run` needs is present.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Config`] naming the first missing value.
    pub fn validate_for_run(&self) -> Result<(), ResolverError> {
        if self.github.token.is_none() {
            return Err(ResolverError::Config("github-token is required".into()));
        }
        if self.llm.api_key.is_none() {
            return Err(ResolverError::Config("model-api-key is required".into()));
        }
        if self.commands.change_command.is_empty() || self.commands.review_command.is_empty() {
            return Err(ResolverError::Config(
                "command tokens must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use resolver_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4");
/// assert!(config.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (`"openai"` or `"anthropic"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests (OpenAI-compatible gateways).
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// GitHub API configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Token used for every REST call.
    pub token: Option<String>,
    /// API base URL for GitHub Enterprise Server.
    pub api_url: Option<String>,
}

/// Dispatch and branch naming configuration.
///
/// # Examples
///
/// ```
/// use resolver_core::CommandConfig;
///
/// let config = CommandConfig::default();
/// assert_eq!(config.change_command, "/ai-issue-resolver-change");
/// assert_eq!(config.review_command, "/ai-issue-resolver-review");
/// assert_eq!(config.branch_name(12), "ai-fix/issue-12");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Issue label that starts the Generate-PR workflow.
    #[serde(default = "default_trigger_label")]
    pub trigger_label: String,
    /// Comment prefix that starts the Apply-Feedback workflow.
    #[serde(default = "default_change_command")]
    pub change_command: String,
    /// Comment prefix that starts the Review workflow.
    #[serde(default = "default_review_command")]
    pub review_command: String,
    /// Prefix of the branch created for an issue; the issue number is appended.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Labels added to generated pull requests.
    #[serde(default = "default_pr_labels")]
    pub pr_labels: Vec<String>,
    /// Base branch when the event payload does not name a default branch.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Files larger than this are not sent to the model as context.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

fn default_trigger_label() -> String {
    "ai-fix".into()
}

fn default_change_command() -> String {
    "/ai-issue-resolver-change".into()
}

fn default_review_command() -> String {
    "/ai-issue-resolver-review".into()
}

fn default_branch_prefix() -> String {
    "ai-fix/issue-".into()
}

fn default_pr_labels() -> Vec<String> {
    vec!["ai-generated".into()]
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_max_file_bytes() -> usize {
    100_000
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            trigger_label: default_trigger_label(),
            change_command: default_change_command(),
            review_command: default_review_command(),
            branch_prefix: default_branch_prefix(),
            pr_labels: default_pr_labels(),
            base_branch: default_base_branch(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl CommandConfig {
    /// Branch name used for the pull request generated from `issue_number`.
    pub fn branch_name(&self, issue_number: u64) -> String {
        format!("{}{issue_number}", self.branch_prefix)
    }

    /// If one command token is a prefix of the other, return `(shorter, longer)`.
    pub fn overlapping_tokens(&self) -> Option<(&str, &str)> {
        let change = self.change_command.as_str();
        let review = self.review_command.as_str();
        if change.starts_with(review) {
            Some((review, change))
        } else if review.starts_with(change) {
            Some((change, review))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = ResolverConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4");
        assert!(config.llm.api_key.is_none());
        assert!(config.github.token.is_none());
        assert_eq!(config.commands.trigger_label, "ai-fix");
        assert_eq!(config.commands.pr_labels, vec!["ai-generated"]);
        assert_eq!(config.commands.base_branch, "main");
        assert_eq!(config.commands.max_file_bytes, 100_000);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[llm]
provider = "anthropic"
model = "claude-sonnet-4-20250514"
base_url = "https://api.anthropic.com"

[commands]
trigger_label = "bot"
change_command = "/bot-change"
review_command = "/bot-review"
pr_labels = ["bot", "needs-review"]
"#;
        let config = ResolverConfig::from_toml(toml).unwrap();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.commands.change_command, "/bot-change");
        assert_eq!(config.commands.pr_labels, vec!["bot", "needs-review"]);
        assert_eq!(config.commands.branch_prefix, "ai-fix/issue-");
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ResolverConfig::from_toml("").unwrap();
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.commands.review_command, "/ai-issue-resolver-review");
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(ResolverConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn action_inputs_override_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("INPUT_GITHUB-TOKEN", "ghs_action"),
            ("INPUT_MODEL-API-KEY", "sk-test"),
            ("INPUT_MODEL-PROVIDER", "anthropic"),
            ("INPUT_MODEL-NAME", ""),
        ]);
        let mut config = ResolverConfig::from_toml("[llm]\nmodel = \"from-file\"\n").unwrap();
        config.apply_action_inputs(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.github.token.as_deref(), Some("ghs_action"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.provider, "anthropic");
        // empty input does not clobber the file value
        assert_eq!(config.llm.model, "from-file");
    }

    #[test]
    fn github_token_falls_back_to_env() {
        let mut config = ResolverConfig::default();
        config.apply_action_inputs(|k| (k == "GITHUB_TOKEN").then(|| "ghp_env".to_string()));
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));
    }

    #[test]
    fn validate_for_run_requires_tokens() {
        let mut config = ResolverConfig::default();
        let err = config.validate_for_run().unwrap_err();
        assert!(err.to_string().contains("github-token"));

        config.github.token = Some("t".into());
        let err = config.validate_for_run().unwrap_err();
        assert!(err.to_string().contains("model-api-key"));

        config.llm.api_key = Some("k".into());
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn overlapping_tokens_detected() {
        let mut commands = CommandConfig::default();
        assert!(commands.overlapping_tokens().is_none());

        commands.change_command = "/review-security".into();
        commands.review_command = "/review".into();
        assert_eq!(
            commands.overlapping_tokens(),
            Some(("/review", "/review-security"))
        );
    }
}
