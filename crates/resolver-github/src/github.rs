use async_trait::async_trait;
use base64::Engine;
use resolver_core::{RepositoryContext, ResolverError};
use serde::Deserialize;

use crate::client::{FileLookup, FileWrite, NewPullRequest, PrFile, PullRequestInfo, RepositoryClient};

/// GitHub's page size cap for list endpoints.
const PER_PAGE: usize = 100;
/// GitHub stops returning PR files after 3000 entries.
const MAX_FILE_PAGES: usize = 30;

/// GitHub REST client scoped to a single repository.
///
/// # Examples
///
/// ```no_run
/// use resolver_core::RepositoryContext;
/// use resolver_github::github::GitHubClient;
///
/// let repo = RepositoryContext::from_full_name("octocat/hello-world").unwrap();
/// let client = GitHubClient::new("ghp_xxxx", None, repo).unwrap();
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    repo: RepositoryContext,
}

impl GitHubClient {
    /// Create a client for `repo` authenticated with `token`.
    ///
    /// `api_url` overrides the API base for GitHub Enterprise Server.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Config`] if the base URL is invalid, or
    /// [`ResolverError::GitHub`] if the client cannot be built.
    pub fn new(
        token: &str,
        api_url: Option<&str>,
        repo: RepositoryContext,
    ) -> Result<Self, ResolverError> {
        let mut builder = octocrab::Octocrab::builder().personal_token(token.to_string());
        if let Some(url) = api_url {
            builder = builder
                .base_uri(url)
                .map_err(|e| ResolverError::Config(format!("invalid GitHub API URL '{url}': {e}")))?;
        }
        let octocrab = builder
            .build()
            .map_err(|e| ResolverError::GitHub(format!("failed to create GitHub client: {e}")))?;
        Ok(Self { octocrab, repo })
    }

    /// The repository this client writes to.
    pub fn repository(&self) -> &RepositoryContext {
        &self.repo
    }

    fn route(&self, rest: &str) -> String {
        format!("/repos/{}/{}/{rest}", self.repo.owner, self.repo.name)
    }
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct NumberResponse {
    number: u64,
}

#[derive(Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    head: BranchRef,
    base: BranchRef,
}

#[derive(Deserialize)]
struct PullFileResponse {
    filename: String,
    status: String,
    #[serde(default)]
    patch: Option<String>,
}

#[async_trait]
impl RepositoryClient for GitHubClient {
    async fn get_ref(&self, branch: &str) -> Result<String, ResolverError> {
        let route = self.route(&format!("git/ref/heads/{}", encode_path(branch)));
        let response: RefResponse = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| classify(e, &format!("branch {branch}")))?;
        Ok(response.object.sha)
    }

    async fn create_ref(&self, branch: &str, from_sha: &str) -> Result<(), ResolverError> {
        let route = self.route("git/refs");
        let body = serde_json::json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": from_sha,
        });
        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| classify(e, &format!("branch {branch}")))?;
        Ok(())
    }

    async fn get_content(&self, path: &str, git_ref: &str) -> Result<FileLookup, ResolverError> {
        match self.fetch_content(path, git_ref).await? {
            Some(content) => Ok(FileLookup::Existing { sha: content.sha }),
            None => Ok(FileLookup::Missing),
        }
    }

    async fn read_file(&self, path: &str, git_ref: &str) -> Result<Option<String>, ResolverError> {
        let Some(content) = self.fetch_content(path, git_ref).await? else {
            return Ok(None);
        };
        if content.encoding.as_deref() != Some("base64") {
            // Files over 1 MB come back without inline content.
            return Ok(None);
        }
        let encoded = content.content.unwrap_or_default();
        let text = decode_content(&encoded)?;
        if text.is_none() {
            tracing::debug!(path, git_ref, "skipping binary file");
        }
        Ok(text)
    }

    async fn create_or_update_file(&self, write: &FileWrite) -> Result<(), ResolverError> {
        let route = self.route(&format!("contents/{}", encode_path(&write.path)));
        let mut body = serde_json::json!({
            "message": write.message,
            "content": write.content_base64,
            "branch": write.branch,
        });
        if let Some(sha) = &write.sha {
            body["sha"] = serde_json::Value::String(sha.clone());
        }
        let result: Result<serde_json::Value, octocrab::Error> =
            self.octocrab.put(route, Some(&body)).await;
        result
            .map(|_| ())
            .map_err(|e| write_error(status_of(&e), &describe(&e), &write.path))
    }

    async fn create_pull_request(&self, pr: &NewPullRequest) -> Result<u64, ResolverError> {
        let route = self.route("pulls");
        let response: NumberResponse = self
            .octocrab
            .post(route, Some(pr))
            .await
            .map_err(|e| classify(e, &format!("branch {}", pr.head)))?;
        Ok(response.number)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ResolverError> {
        if labels.is_empty() {
            return Ok(());
        }
        let route = self.route(&format!("issues/{number}/labels"));
        let body = serde_json::json!({ "labels": labels });
        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| classify(e, &format!("issue #{number}")))?;
        Ok(())
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequestInfo, ResolverError> {
        let route = self.route(&format!("pulls/{number}"));
        let response: PullResponse = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| classify(e, &format!("pull request #{number}")))?;
        Ok(PullRequestInfo {
            number: response.number,
            head_ref: response.head.name,
            base_ref: response.base.name,
        })
    }

    async fn list_pr_files(&self, number: u64) -> Result<Vec<PrFile>, ResolverError> {
        let route = self.route(&format!("pulls/{number}/files"));
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let params = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            let batch: Vec<PullFileResponse> = self
                .octocrab
                .get(&route, Some(&params))
                .await
                .map_err(|e| classify(e, &format!("pull request #{number}")))?;
            let done = batch.len() < PER_PAGE;
            files.extend(batch.into_iter().map(|f| PrFile {
                path: f.filename,
                status: f.status,
                patch: f.patch,
            }));
            if done {
                break;
            }
        }
        Ok(files)
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), ResolverError> {
        let route = self.route(&format!("issues/{number}/comments"));
        let body = serde_json::json!({ "body": body });
        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| classify(e, &format!("issue #{number}")))?;
        Ok(())
    }
}

impl GitHubClient {
    async fn fetch_content(
        &self,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<ContentResponse>, ResolverError> {
        let route = self.route(&format!("contents/{}", encode_path(path)));
        let params = [("ref", git_ref)];
        let result: Result<serde_json::Value, octocrab::Error> =
            self.octocrab.get(route, Some(&params)).await;
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                return match lookup_error(status_of(&e), &describe(&e), path) {
                    Some(err) => Err(err),
                    None => Ok(None),
                }
            }
        };
        if value.is_array() {
            return Err(ResolverError::GitHub(format!(
                "{path} is a directory, not a file"
            )));
        }
        let content: ContentResponse = serde_json::from_value(value)?;
        Ok(Some(content))
    }
}

fn status_of(err: &octocrab::Error) -> Option<u16> {
    match err {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => None,
    }
}

/// The API's own message plus any field errors, or the transport error text.
fn describe(err: &octocrab::Error) -> String {
    match err {
        octocrab::Error::GitHub { source, .. } => match &source.errors {
            Some(errors) if !errors.is_empty() => {
                let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                format!("{} ({})", source.message, details.join(", "))
            }
            _ => source.message.clone(),
        },
        other => other.to_string(),
    }
}

fn classify(err: octocrab::Error, what: &str) -> ResolverError {
    status_error(status_of(&err), &describe(&err), what)
}

fn status_error(status: Option<u16>, message: &str, what: &str) -> ResolverError {
    match status {
        Some(404) => ResolverError::RemoteNotFound(what.to_string()),
        _ => ResolverError::GitHub(format!("{what}: {message}")),
    }
}

/// Failure of a contents lookup; `None` means the file does not exist.
fn lookup_error(status: Option<u16>, message: &str, path: &str) -> Option<ResolverError> {
    match status {
        Some(404) => None,
        _ => Some(status_error(status, message, &format!("file {path}"))),
    }
}

/// Failure of a contents write.
///
/// 409 means the sha no longer matches. 422 is only a conflict when it is
/// about the sha (the file appeared without one); other 422s are validation
/// failures such as an invalid path.
fn write_error(status: Option<u16>, message: &str, path: &str) -> ResolverError {
    let conflict = match status {
        Some(409) => true,
        Some(422) => message.to_ascii_lowercase().contains("sha"),
        _ => false,
    };
    if conflict {
        ResolverError::RemoteWriteConflict {
            path: path.to_string(),
            message: message.to_string(),
        }
    } else {
        status_error(status, message, &format!("file {path}"))
    }
}

/// Decode the base64 `content` field of the contents API.
///
/// GitHub wraps the encoded payload at 60 columns, so whitespace is stripped
/// before decoding. Binary files, whose bytes are not UTF-8, yield `None`.
///
/// # Errors
///
/// Returns [`ResolverError::GitHub`] if the payload is not base64.
///
/// # Examples
///
/// ```
/// use resolver_github::github::decode_content;
///
/// assert_eq!(decode_content("aGVs\nbG8=\n").unwrap().as_deref(), Some("hello"));
/// assert_eq!(decode_content("iVBORw0KGgo=").unwrap(), None);
/// ```
pub fn decode_content(encoded: &str) -> Result<Option<String>, ResolverError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ResolverError::GitHub(format!("invalid base64 content: {e}")))?;
    Ok(String::from_utf8(bytes).ok())
}

/// Percent-encode each segment of a repository path for use in a URL route.
///
/// # Examples
///
/// ```
/// use resolver_github::github::encode_path;
///
/// assert_eq!(encode_path("src/my file.rs"), "src/my%20file.rs");
/// assert_eq!(encode_path("src/lib.rs"), "src/lib.rs");
/// ```
pub fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}
