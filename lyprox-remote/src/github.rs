//! GitHub HTTP client serving dataset tables and collection metadata.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lyprox_core::{
    CollectionMetadata, DatasetIdentity, LoaderConfig, LyproxError, LyproxResult,
    MetadataSource, RawTable, RawTableSource,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::csv_table::parse_raw_table_str;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

const SOURCE_NAME: &str = "github";
const USER_AGENT: &str = concat!("lyprox/", env!("CARGO_PKG_VERSION"));

/// Subset of the repository resource the pipeline reads.
#[derive(Debug, Clone, Deserialize)]
struct RepoResponse {
    private: bool,
    pushed_at: DateTime<Utc>,
}

impl From<RepoResponse> for CollectionMetadata {
    fn from(repo: RepoResponse) -> Self {
        CollectionMetadata::new(repo.private, repo.pushed_at)
    }
}

/// GitHub-backed [`RawTableSource`] and [`MetadataSource`].
///
/// Every request is bounded by the client timeout. A token, when set, is
/// sent on both endpoints so private collections resolve.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_base: String,
    raw_base: String,
    token: Option<String>,
}

impl GithubClient {
    /// Create a client against the public GitHub endpoints.
    pub fn new(token: Option<String>, timeout: Duration) -> LyproxResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                LyproxError::remote_unavailable(SOURCE_NAME, format!("client setup failed: {}", e))
            })?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            token,
        })
    }

    pub fn from_config(config: &LoaderConfig) -> LyproxResult<Self> {
        Self::new(config.github_token.clone(), config.remote_timeout)
    }

    /// Point the client at different API and raw-content hosts.
    pub fn with_base_urls(
        mut self,
        api_base: impl Into<String>,
        raw_base: impl Into<String>,
    ) -> Self {
        let api_base: String = api_base.into();
        let raw_base: String = raw_base.into();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.raw_base = raw_base.trim_end_matches('/').to_string();
        self
    }

    pub fn repo_url(&self, collection: &str) -> String {
        format!("{}/repos/{}", self.api_base, collection)
    }

    /// URL of the CSV file holding one dataset version.
    pub fn data_url(&self, identity: &DatasetIdentity) -> String {
        format!(
            "{}/{}/{}/{}/data.csv",
            self.raw_base,
            identity.collection(),
            identity.version_ref(),
            identity.name()
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> LyproxResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| request_error(&e))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(status_error(status, resource))
        }
    }
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_base", &self.api_base)
            .field("raw_base", &self.raw_base)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn request_error(error: &reqwest::Error) -> LyproxError {
    let reason = if error.is_timeout() {
        format!("request timed out: {}", error)
    } else {
        format!("HTTP request failed: {}", error)
    };
    LyproxError::remote_unavailable(SOURCE_NAME, reason)
}

/// Map a non-success status to the remote error taxonomy.
///
/// Only 404 means the resource does not exist. Everything else, including
/// auth and rate-limit responses, is an unavailable source.
pub fn status_error(status: StatusCode, resource: &str) -> LyproxError {
    match status {
        StatusCode::NOT_FOUND => LyproxError::not_found(resource),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LyproxError::remote_unavailable(
            SOURCE_NAME,
            format!("access denied ({}) for {}", status, resource),
        ),
        StatusCode::TOO_MANY_REQUESTS => LyproxError::remote_unavailable(
            SOURCE_NAME,
            format!("rate limited while fetching {}", resource),
        ),
        _ => LyproxError::remote_unavailable(
            SOURCE_NAME,
            format!("unexpected status {} for {}", status, resource),
        ),
    }
}

#[async_trait]
impl MetadataSource for GithubClient {
    async fn fetch_metadata(&self, collection: &str) -> LyproxResult<CollectionMetadata> {
        let request = self
            .client
            .get(self.repo_url(collection))
            .header("Accept", "application/vnd.github+json");
        let response = self.send(request, collection).await?;

        let repo: RepoResponse = response.json().await.map_err(|e| {
            LyproxError::remote_unavailable(
                SOURCE_NAME,
                format!("failed to parse repository {}: {}", collection, e),
            )
        })?;

        Ok(repo.into())
    }
}

#[async_trait]
impl RawTableSource for GithubClient {
    async fn fetch_raw(&self, identity: &DatasetIdentity) -> LyproxResult<RawTable> {
        let url = self.data_url(identity);
        let response = self.send(self.client.get(&url), &url).await?;
        let body = response.text().await.map_err(|e| request_error(&e))?;

        let table = parse_raw_table_str(&body)?;
        tracing::debug!(
            dataset = %identity,
            rows = table.row_count(),
            columns = table.columns().len(),
            "Fetched raw dataset table"
        );
        Ok(table)
    }
}
