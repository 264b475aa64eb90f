//! GitHub REST implementation of [`RemoteRepositoryClient`]
//!
//! Repository listings and branch listings are paged (`per_page=100`) until a
//! short page is returned. File contents are base64 decoded; the blob `sha`
//! returned by the contents endpoint is used as the version fingerprint.

use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::traits::RemoteRepositoryClient;
use crate::remote::types::{BranchMeta, FileUpdate, OwnerType, RemoteFile, RepoMeta, UpdatedFile};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

#[derive(Debug, Deserialize)]
struct ApiOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    name: String,
    owner: ApiOwner,
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    html_url: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
}

impl From<ApiRepository> for RepoMeta {
    fn from(repo: ApiRepository) -> Self {
        RepoMeta {
            owner: repo.owner.login,
            name: repo.name,
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
            private: repo.private,
            description: repo.description,
            stars: repo.stargazers_count,
            forks: repo.forks_count,
            html_url: repo.html_url,
            updated_at: repo.updated_at,
            topics: repo.topics,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiBranch {
    name: String,
    commit: ApiCommitRef,
    #[serde(default)]
    protected: bool,
}

#[derive(Debug, Deserialize)]
struct ApiContentRef {
    path: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiUpdateResponse {
    content: ApiContentRef,
}

/// Map a non-success response onto the remote error taxonomy
pub(crate) fn status_error(
    status: StatusCode,
    headers: &HeaderMap,
    resource: &str,
    body: &str,
) -> RemoteError {
    let remaining = headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    let retry_after_secs = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (remaining == Some("0") || retry_after_secs.is_some()));
    if rate_limited {
        return RemoteError::RateLimited { retry_after_secs };
    }

    let message = api_message(body);
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound {
            resource: resource.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Forbidden {
            resource: resource.to_string(),
            message,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RemoteError::Timeout {
            operation: resource.to_string(),
            after: Duration::ZERO,
        },
        s if s.is_server_error() => {
            RemoteError::Transport(format!("{} returned {}: {}", resource, s, message))
        }
        s => RemoteError::Decode(format!("{} returned {}: {}", resource, s, message)),
    }
}

/// A 409, or a 422 complaining about the blob sha, means the fingerprint moved
pub(crate) fn is_sha_conflict(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("sha"))
}

/// The `message` field of a GitHub error body, or the raw body
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Client for the GitHub REST API (or a compatible enterprise endpoint)
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl GitHubClient {
    /// Create a client for `api_url`; requests time out after `timeout`
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> RemoteResult<Self> {
        let base_url = Url::parse(api_url)
            .map_err(|e| RemoteError::Transport(format!("Invalid API URL '{}': {}", api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Transport(format!(
                "Invalid API URL '{}': not a base URL",
                api_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment
    pub(crate) fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("Invalid API URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request_accepting(method, url, JSON_MEDIA_TYPE)
    }

    fn request_accepting(&self, method: Method, url: Url, accept: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("dak-engine/", env!("CARGO_PKG_VERSION")));
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, resource: &str) -> RemoteResult<Response> {
        log::trace!("GitHub request: {}", resource);
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout {
                    operation: resource.to_string(),
                    after: self.timeout,
                }
            } else {
                RemoteError::from(e)
            }
        })
    }

    /// Send and decode a JSON response, mapping error statuses
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        resource: &str,
    ) -> RemoteResult<T> {
        let response = self.send(builder, resource).await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, resource, &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(format!("{}: {}", resource, e)))
    }

    /// Fetch a file body through the raw media type
    async fn fetch_raw(&self, url: Url, resource: &str) -> RemoteResult<Vec<u8>> {
        let response = self
            .send(self.request_accepting(Method::GET, url, RAW_MEDIA_TYPE), resource)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, resource, &body));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Decode(format!("{}: {}", resource, e)))?;
        Ok(bytes.to_vec())
    }

    /// Collect every page of a listing endpoint
    async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &str,
    ) -> RemoteResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let batch: Vec<T> = self
                .fetch_json(self.request(Method::GET, page_url), resource)
                .await?;
            let short_page = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if short_page {
                break;
            }
            page += 1;
        }
        log::debug!("Fetched {} items from {} ({} pages)", items.len(), resource, page);
        Ok(items)
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> RemoteResult<Url> {
        let mut segments = vec!["repos", owner, repo, "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        self.endpoint(segments)
    }
}

/// Decoded file body; `None` when the body was omitted for size.
fn decode_content(content: &ApiContent) -> RemoteResult<Option<Vec<u8>>> {
    if content.kind != "file" {
        return Err(RemoteError::Decode(format!(
            "{} is a {}, not a file",
            content.path, content.kind
        )));
    }
    match (content.encoding.as_deref(), content.content.as_deref()) {
        (Some("base64"), Some(encoded)) => {
            let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64
                .decode(cleaned.as_bytes())
                .map(Some)
                .map_err(|e| RemoteError::Decode(format!("{}: invalid base64: {}", content.path, e)))
        }
        // Files over 1 MB come back without a body
        (Some("none"), None | Some("")) => Ok(None),
        (None, Some(raw)) => Ok(Some(raw.as_bytes().to_vec())),
        (encoding, _) => Err(RemoteError::Decode(format!(
            "{}: unsupported content encoding {:?}",
            content.path, encoding
        ))),
    }
}

#[async_trait]
impl RemoteRepositoryClient for GitHubClient {
    async fn list_repositories(
        &self,
        owner: &str,
        owner_type: OwnerType,
    ) -> RemoteResult<Vec<RepoMeta>> {
        let kind = match owner_type {
            OwnerType::User => "users",
            OwnerType::Organization => "orgs",
        };
        let url = self.endpoint([kind, owner, "repos"])?;
        let resource = format!("{}/{}/repos", kind, owner);
        let repos: Vec<ApiRepository> = self.fetch_all_pages(url, &resource).await?;
        Ok(repos.into_iter().map(RepoMeta::from).collect())
    }

    async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> RemoteResult<RemoteFile> {
        let mut url = self.contents_url(owner, repo, path)?;
        if let Some(git_ref) = git_ref {
            url.query_pairs_mut().append_pair("ref", git_ref);
        }
        let resource = format!("{}/{}:{}", owner, repo, path);
        let content: ApiContent = self
            .fetch_json(self.request(Method::GET, url.clone()), &resource)
            .await?;

        let body = match decode_content(&content)? {
            Some(body) => body,
            None => {
                log::debug!("{} is too large for inline content, fetching raw", resource);
                self.fetch_raw(url, &resource).await?
            }
        };
        Ok(RemoteFile {
            path: content.path,
            content: body,
            fingerprint: content.sha,
        })
    }

    async fn update_file(
        &self,
        owner: &str,
        repo: &str,
        update: &FileUpdate,
    ) -> RemoteResult<UpdatedFile> {
        let url = self.contents_url(owner, repo, &update.path)?;
        let resource = format!("{}/{}:{}", owner, repo, update.path);

        let mut body = serde_json::json!({
            "message": update.message,
            "content": BASE64.encode(&update.content),
            "branch": update.branch,
        });
        if let Some(sha) = &update.expected_fingerprint {
            body["sha"] = serde_json::Value::String(sha.clone());
        }

        let response = self
            .send(self.request(Method::PUT, url).json(&body), &resource)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            if is_sha_conflict(status, &text) {
                return Err(RemoteError::Conflict {
                    path: update.path.clone(),
                    expected: update.expected_fingerprint.clone(),
                    actual: None,
                });
            }
            return Err(status_error(status, &headers, &resource, &text));
        }

        let updated: ApiUpdateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("{}: {}", resource, e)))?;
        Ok(UpdatedFile {
            path: updated.content.path,
            new_fingerprint: updated.content.sha,
        })
    }

    async fn get_branches(&self, owner: &str, repo: &str) -> RemoteResult<Vec<BranchMeta>> {
        let url = self.endpoint(["repos", owner, repo, "branches"])?;
        let resource = format!("{}/{}/branches", owner, repo);
        let branches: Vec<ApiBranch> = self.fetch_all_pages(url, &resource).await?;
        Ok(branches
            .into_iter()
            .map(|b| BranchMeta {
                name: b.name,
                head_sha: b.commit.sha,
                protected: b.protected,
            })
            .collect())
    }
}
