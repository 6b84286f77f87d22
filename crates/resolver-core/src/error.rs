use miette::Diagnostic;

/// Errors that can occur while resolving an event.
///
/// Library crates return this type directly; the binary converts it into a
/// `miette::Report` at the boundary.
///
/// `Extraction` and `SchemaValidation` describe malformed model output and are
/// normally downgraded to an empty result by the workflow that parsed it. All
/// other variants propagate to the top level and fail the run.
///
/// # Examples
///
/// ```
/// use resolver_core::ResolverError;
///
/// let err = ResolverError::Config("missing github-token".into());
/// assert!(err.to_string().contains("missing github-token"));
/// ```
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ResolverError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(resolver::config),
        help("set the value in .ai-issue-resolver.toml, as an action input, or as a CLI flag")
    )]
    Config(String),

    /// The inbound event payload could not be read or understood.
    #[error("event error: {0}")]
    #[diagnostic(code(resolver::event))]
    Event(String),

    /// No parseable JSON document could be recovered from a model response.
    #[error("no JSON document found in model response ({} chars)", raw.len())]
    #[diagnostic(code(resolver::extraction))]
    Extraction {
        /// The original response text, kept for diagnostics.
        raw: String,
    },

    /// A JSON document was found but did not match the expected shape.
    #[error("schema validation failed: {}", violations.join("; "))]
    #[diagnostic(code(resolver::schema))]
    SchemaValidation {
        /// One entry per failing field path.
        violations: Vec<String>,
    },

    /// A file write was rejected because the file changed underneath us.
    #[error("write conflict on {path}: {message}")]
    #[diagnostic(
        code(resolver::write_conflict),
        help("another run may have pushed to the same branch; re-run the command")
    )]
    RemoteWriteConflict {
        /// Repository-relative path of the file.
        path: String,
        /// Message returned by the remote.
        message: String,
    },

    /// A branch, pull request, or file does not exist.
    #[error("not found: {0}")]
    #[diagnostic(code(resolver::not_found))]
    RemoteNotFound(String),

    /// Any other repository API failure.
    #[error("GitHub error: {0}")]
    #[diagnostic(code(resolver::github))]
    GitHub(String),

    /// The LLM provider call failed (auth, rate limit, transport, shape).
    #[error("LLM provider error: {0}")]
    #[diagnostic(code(resolver::provider))]
    Provider(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ResolverError {
    /// Returns `true` for failures caused by malformed model output.
    ///
    /// These are the errors the workflows degrade to an empty result.
    ///
    /// # Examples
    ///
    /// ```
    /// use resolver_core::ResolverError;
    ///
    /// assert!(ResolverError::Extraction { raw: "nope".into() }.is_model_output());
    /// assert!(!ResolverError::Provider("429".into()).is_model_output());
    /// ```
    pub fn is_model_output(&self) -> bool {
        matches!(
            self,
            ResolverError::Extraction { .. } | ResolverError::SchemaValidation { .. }
        )
    }
}
