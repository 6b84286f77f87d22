use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use resolver_core::{LlmConfig, ResolverError};
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 8192;
const TEMPERATURE: f64 = 0.1;

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use resolver_engine::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Fix this issue".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Supported LLM providers.
///
/// # Examples
///
/// ```
/// use resolver_engine::llm::Provider;
///
/// let p: Provider = "OpenAI".parse().unwrap();
/// assert_eq!(p, Provider::OpenAi);
/// assert!("watson".parse::<Provider>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI or any gateway exposing `/v1/chat/completions`.
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

impl Provider {
    fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }
}

impl FromStr for Provider {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(ResolverError::Config(format!(
                "unknown model-provider '{other}', expected openai or anthropic"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// The LLM collaborator: one system and one user instruction in, free text out.
///
/// Nothing guarantees the text honours any requested format; callers run it
/// through [`crate::extract`] and [`crate::schema`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a single completion.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ResolverError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Chat completions client for OpenAI-compatible endpoints and Anthropic.
///
/// # Examples
///
/// ```
/// use resolver_core::LlmConfig;
/// use resolver_engine::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    provider: Provider,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Config`] for an unknown provider, or
    /// [`ResolverError::Provider`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, ResolverError> {
        let provider: Provider = config.provider.parse()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ResolverError::Provider(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
            provider,
        })
    }

    /// The configured provider.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
    }

    /// Send a chat completion request and return the text response.
    ///
    /// System messages are sent in the provider's native position.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Provider`] on HTTP errors (including rate
    /// limiting) or when the response does not have the expected structure.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ResolverError> {
        let request = match self.provider {
            Provider::OpenAi => self.openai_request(&messages),
            Provider::Anthropic => self.anthropic_request(&messages),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ResolverError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ResolverError::Provider(format!(
                "{} API error {status}: {body_text}",
                self.provider
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ResolverError::Provider(format!("failed to parse response: {e}")))?;

        let content = match self.provider {
            Provider::OpenAi => openai_content(&response_body),
            Provider::Anthropic => anthropic_content(&response_body),
        };
        content.map(str::to_string).ok_or_else(|| {
            ResolverError::Provider(format!("unexpected response structure: {response_body}"))
        })
    }

    fn openai_request(&self, messages: &[ChatMessage]) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/chat/completions", self.base_url());
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": TEMPERATURE,
        });
        let mut request = self.client.post(url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }
        request
    }

    fn anthropic_request(&self, messages: &[ChatMessage]) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/messages", self.base_url());
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
        let body = serde_json::json!({
            "model": self.config.model,
            "system": system.join("\n\n"),
            "messages": turns,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
        });
        let mut request = self
            .client
            .post(url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("x-api-key", api_key);
        }
        request
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ResolverError> {
        self.chat(vec![
            ChatMessage {
                role: Role::System,
                content: system.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: user.to_string(),
            },
        ])
        .await
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn openai_content(body: &serde_json::Value) -> Option<&str> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
}

fn anthropic_content(body: &serde_json::Value) -> Option<&str> {
    body.get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .and_then(|block| block.get("text"))
        .and_then(|t| t.as_str())
}
