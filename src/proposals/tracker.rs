//! Issue tracker access.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::ExposeSecret;

use crate::config::{RepoRef, TrackerConfig};
use crate::error::{ConfigError, ResolveError};
use crate::proposals::model::IssueResponse;

/// Fetches issues by number. Pure I/O, no classification.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch one issue. Any transport error or non-2xx status is a failure.
    async fn fetch_issue(&self, repo: &RepoRef, id: &str) -> Result<IssueResponse, ResolveError>;
}

/// GitHub REST API client for issue lookups.
pub struct GithubTracker {
    http: reqwest::Client,
    api_base: String,
}

impl GithubTracker {
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("msc-resolver/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| ConfigError::InvalidValue {
                    key: "GITHUB_TOKEN".into(),
                    message: e.to_string(),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "GITHUB_API_BASE".into(),
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn issue_endpoint(&self, repo: &RepoRef, id: &str) -> String {
        format!(
            "{}/repos/{}/{}/issues/{id}",
            self.api_base, repo.owner, repo.name
        )
    }
}

#[async_trait]
impl IssueTracker for GithubTracker {
    async fn fetch_issue(&self, repo: &RepoRef, id: &str) -> Result<IssueResponse, ResolveError> {
        let resp = self
            .http
            .get(self.issue_endpoint(repo, id))
            .send()
            .await
            .map_err(|e| ResolveError::Fetch {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ResolveError::Status {
                id: id.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json::<IssueResponse>()
            .await
            .map_err(|e| ResolveError::Decode {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }
}
