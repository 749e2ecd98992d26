//! forge::github
//!
//! GitHub forge implementation using the REST API.
//!
//! # Design
//!
//! - Reads use the contents API (file bodies, base64 encoded) and the
//!   recursive git trees API (listings).
//! - Branches are created through the git refs API.
//! - Batch commits use the git data API: one tree built on top of the
//!   branch tip's tree, one commit, then a fast-forward ref update. A
//!   concurrent push to the branch makes the ref update fail instead of
//!   being overwritten.
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` when limits are hit. Retrying is the
//! caller's responsibility.
//!
//! # Example
//!
//! ```
//! use inkpress::forge::github::GitHubForge;
//!
//! let forge = GitHubForge::from_remote_url("git@github.com:acme/site.git", "token").unwrap();
//! assert_eq!(forge.owner(), "acme");
//! assert_eq!(forge.repo(), "site");
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{
    Change, CreatePrRequest, EntryKind, FileChange, Forge, ForgeError, PullRequest, RemoteFile,
    TreeEntry,
};
use crate::core::types::{BlobHash, BranchName, CommitHash, ContentRoot, RepoPath};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "inkpress";

/// File mode for regular files in git trees.
const FILE_MODE: &str = "100644";

/// GitHub forge implementation.
pub struct GitHubForge {
    client: Client,
    token: String,
    /// Repository owner (user or organization)
    owner: String,
    repo: String,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubForge {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self::with_api_base(token, owner, repo, DEFAULT_API_BASE)
    }

    /// Create a forge against a custom API base (GitHub Enterprise, tests).
    pub fn with_api_base(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a forge from a git remote URL (SSH or HTTPS).
    ///
    /// Returns `None` if the URL is not a GitHub URL.
    pub fn from_remote_url(url: &str, token: impl Into<String>) -> Option<Self> {
        let (owner, repo) = parse_github_url(url)?;
        Some(Self::new(token, owner, repo))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        if self.token.is_empty() {
            return Err(ForgeError::AuthRequired);
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ForgeError::AuthFailed("token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint from path segments.
    ///
    /// Segments are percent-encoded individually.
    fn repo_url<'s>(
        &self,
        segments: impl IntoIterator<Item = &'s str>,
    ) -> Result<Url, ForgeError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| ForgeError::NetworkError(format!("invalid api base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ForgeError::NetworkError("api base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    /// Send a request and decode the JSON response.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ForgeError> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        self.handle_response(response).await
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            Err(self.error_from_response(response, status).await)
        }
    }

    /// Map an error response from the API.
    async fn error_from_response(&self, response: Response, status: StatusCode) -> ForgeError {
        let required_permissions = response
            .headers()
            .get("X-Accepted-GitHub-Permissions")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => {
                ForgeError::RateLimited
            }
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                    err_msg.push_str(&format!(" [required: {}]", perms));
                }
                ForgeError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Commit sha at the tip of a branch.
    async fn branch_tip(&self, branch: &BranchName) -> Result<String, ForgeError> {
        let segments = ["git", "ref", "heads"]
            .into_iter()
            .chain(branch.as_str().split('/'));
        let git_ref: GitHubRef = self.send(self.client.get(self.repo_url(segments)?)).await?;
        Ok(git_ref.object.sha)
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn read_file(
        &self,
        path: &RepoPath,
        git_ref: &BranchName,
    ) -> Result<Option<RemoteFile>, ForgeError> {
        let mut url = self.repo_url(std::iter::once("contents").chain(path.components()))?;
        url.query_pairs_mut().append_pair("ref", git_ref.as_str());

        let contents: GitHubContents = match self.send(self.client.get(url)).await {
            Ok(contents) => contents,
            Err(ForgeError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if contents.kind != "file" {
            return Ok(None);
        }

        let content = decode_content(&contents.content.unwrap_or_default())?;
        let hash = parse_blob_hash(&contents.sha)?;
        Ok(Some(RemoteFile { content, hash }))
    }

    async fn read_tree(
        &self,
        git_ref: &BranchName,
        prefix: &ContentRoot,
    ) -> Result<Vec<TreeEntry>, ForgeError> {
        let tip = self.branch_tip(git_ref).await?;
        let mut url = self.repo_url(["git", "trees", tip.as_str()])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let tree: GitHubTree = self.send(self.client.get(url)).await?;
        if tree.truncated {
            debug!(git_ref = %git_ref, "tree listing truncated by the host");
        }
        tree_entries(tree.tree, prefix)
    }

    async fn create_branch(
        &self,
        base: &BranchName,
        name: &BranchName,
    ) -> Result<CommitHash, ForgeError> {
        let sha = self.branch_tip(base).await?;
        let body = CreateRefBody {
            git_ref: format!("refs/heads/{}", name),
            sha: &sha,
        };
        let url = self.repo_url(["git", "refs"])?;
        let created: GitHubRef = self.send(self.client.post(url).json(&body)).await?;
        parse_commit_hash(&created.object.sha)
    }

    async fn commit_batch(
        &self,
        branch: &BranchName,
        changes: &[FileChange],
        message: &str,
    ) -> Result<CommitHash, ForgeError> {
        let head = self.branch_tip(branch).await?;

        let commit_url = self.repo_url(["git", "commits", head.as_str()])?;
        let head_commit: GitHubCommit = self.send(self.client.get(commit_url)).await?;

        let tree_body = CreateTreeBody {
            base_tree: &head_commit.tree.sha,
            tree: changes.iter().map(TreeItem::from).collect(),
        };
        let tree_url = self.repo_url(["git", "trees"])?;
        let tree: GitHubSha = self.send(self.client.post(tree_url).json(&tree_body)).await?;

        let commit_body = CreateCommitBody {
            message,
            tree: &tree.sha,
            parents: vec![head.as_str()],
        };
        let commits_url = self.repo_url(["git", "commits"])?;
        let commit: GitHubSha = self
            .send(self.client.post(commits_url).json(&commit_body))
            .await?;

        let ref_url = self.repo_url(
            ["git", "refs", "heads"]
                .into_iter()
                .chain(branch.as_str().split('/')),
        )?;
        let update = UpdateRefBody {
            sha: &commit.sha,
            force: false,
        };
        let _: GitHubRef = self.send(self.client.patch(ref_url).json(&update)).await?;

        debug!(branch = %branch, commit = %commit.sha, files = changes.len(), "batch committed");
        parse_commit_hash(&commit.sha)
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let body = CreatePrBody {
            head: request.head.as_str(),
            base: request.base.as_str(),
            title: &request.title,
            body: request.body.as_deref(),
            draft: request.draft,
        };
        let url = self.repo_url(["pulls"])?;
        let pr: GitHubPullRequest = self.send(self.client.post(url).json(&body)).await?;
        Ok(pr.into())
    }
}

// --------------------------------------------------------------------------
// Response conversion
// --------------------------------------------------------------------------

/// Decode a base64 contents payload (GitHub wraps it at 60 columns).
fn decode_content(encoded: &str) -> Result<String, ForgeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| ForgeError::ApiError {
        status: 200,
        message: format!("invalid base64 content: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|_| ForgeError::ApiError {
        status: 200,
        message: "file content is not valid UTF-8".into(),
    })
}

fn parse_blob_hash(sha: &str) -> Result<BlobHash, ForgeError> {
    BlobHash::new(sha).map_err(|e| ForgeError::ApiError {
        status: 200,
        message: e.to_string(),
    })
}

fn parse_commit_hash(sha: &str) -> Result<CommitHash, ForgeError> {
    CommitHash::new(sha).map_err(|e| ForgeError::ApiError {
        status: 200,
        message: e.to_string(),
    })
}

/// Keep the entries below `prefix` and convert them.
///
/// Submodules and other non-blob, non-tree entries are skipped.
fn tree_entries(
    items: Vec<GitHubTreeItem>,
    prefix: &ContentRoot,
) -> Result<Vec<TreeEntry>, ForgeError> {
    let mut entries = Vec::new();
    for item in items {
        let kind = match item.kind.as_str() {
            "blob" => EntryKind::File,
            "tree" => EntryKind::Dir,
            _ => continue,
        };
        let Ok(path) = RepoPath::new(item.path) else {
            continue;
        };
        if prefix.strip(&path).is_none() {
            continue;
        }
        let hash = match kind {
            EntryKind::File => Some(parse_blob_hash(&item.sha)?),
            EntryKind::Dir => None,
        };
        entries.push(TreeEntry { path, kind, hash });
    }
    Ok(entries)
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    draft: bool,
}

#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct CreateTreeBody<'a> {
    base_tree: &'a str,
    tree: Vec<TreeItem<'a>>,
}

/// Tree entry in a create-tree request.
///
/// A deletion is an entry with `sha: null` and no `content`.
#[derive(Serialize)]
struct TreeItem<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<Option<&'a str>>,
}

impl<'a> From<&'a FileChange> for TreeItem<'a> {
    fn from(change: &'a FileChange) -> Self {
        TreeItem {
            path: change.path.as_str(),
            mode: FILE_MODE,
            kind: "blob",
            content: change.change.content(),
            sha: match change.change {
                Change::Delete => Some(None),
                Change::Create(_) | Change::Update(_) => None,
            },
        }
    }
}

#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubContents {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    content: Option<String>,
}

#[derive(Deserialize)]
struct GitHubTree {
    tree: Vec<GitHubTreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct GitHubTreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Deserialize)]
struct GitHubRef {
    object: GitHubSha,
}

#[derive(Deserialize)]
struct GitHubCommit {
    tree: GitHubSha,
}

#[derive(Deserialize)]
struct GitHubSha {
    sha: String,
}

/// GitHub PR response format.
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    head: GitHubBranchRef,
    base: GitHubBranchRef,
    title: String,
}

#[derive(Deserialize)]
struct GitHubBranchRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
            title: pr.title,
        }
    }
}

// --------------------------------------------------------------------------
// URL Parsing
// --------------------------------------------------------------------------

/// Parse a GitHub remote URL to extract owner and repo.
///
/// Supports both SSH and HTTPS formats:
/// - `git@github.com:owner/repo.git`
/// - `https://github.com/owner/repo.git`
/// - `https://github.com/owner/repo`
///
/// # Example
///
/// ```
/// use inkpress::forge::github::parse_github_url;
///
/// let (owner, repo) = parse_github_url("git@github.com:octocat/hello-world.git").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello-world");
/// ```
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    match rest.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Some((owner.to_string(), repo.to_string()))
        }
        _ => None,
    }
}
