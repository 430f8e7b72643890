//! Configuration types.
//!
//! Everything is read once from the environment at startup and is
//! immutable afterwards.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Repository holding the proposals.
pub const DEFAULT_REPO: &str = "matrix-org/matrix-spec-proposals";

/// Label that marks an issue as a proposal.
pub const DEFAULT_PROPOSAL_LABEL: &str = "proposal";

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_WEB_BASE: &str = "https://github.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;

/// An `owner/repo` pair on the issue tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse an `owner/repo` slug.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: "MSC_REPO".into(),
            message: format!("'{raw}', expected owner/repo"),
        };

        let (owner, name) = raw.trim().split_once('/').ok_or_else(invalid)?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Issue tracker settings used by the resolver.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Repository the proposals live in.
    pub repo: RepoRef,
    /// Exact label name that classifies an issue as a proposal.
    pub proposal_label: String,
    /// REST API base, e.g. `https://api.github.com`.
    pub api_base: String,
    /// Web base used to build issue links, e.g. `https://github.com`.
    pub web_base: String,
    /// Optional token for authenticated requests.
    pub token: Option<SecretString>,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            repo: RepoRef {
                owner: "matrix-org".to_string(),
                name: "matrix-spec-proposals".to_string(),
            },
            proposal_label: DEFAULT_PROPOSAL_LABEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            web_base: DEFAULT_WEB_BASE.to_string(),
            token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl TrackerConfig {
    /// Load tracker settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load tracker settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let repo = RepoRef::parse(&lookup("MSC_REPO").unwrap_or_else(|| DEFAULT_REPO.into()))?;

        let proposal_label = lookup("MSC_PROPOSAL_LABEL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PROPOSAL_LABEL.to_string());

        let api_base = lookup("GITHUB_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.into())
            .trim_end_matches('/')
            .to_string();
        let web_base = lookup("GITHUB_WEB_BASE")
            .unwrap_or_else(|| DEFAULT_WEB_BASE.into())
            .trim_end_matches('/')
            .to_string();

        let token = lookup("GITHUB_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let request_timeout = parse_secs(
            "GITHUB_REQUEST_TIMEOUT_SECS",
            lookup("GITHUB_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        Ok(Self {
            repo,
            proposal_label,
            api_base,
            web_base,
            token,
            request_timeout,
        })
    }

    /// Canonical web link for an issue number.
    pub fn issue_url(&self, id: &str) -> String {
        format!("{}/{}/issues/{id}", self.web_base, self.repo)
    }
}

/// Matrix homeserver connection settings.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    /// Homeserver base URL, e.g. `https://matrix.example.org`.
    pub homeserver: String,
    /// Access token of the bot account.
    pub access_token: SecretString,
    /// Long-poll timeout passed to `/sync`.
    pub sync_timeout: Duration,
}

impl MatrixConfig {
    /// Load Matrix settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load Matrix settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let homeserver = lookup("MATRIX_HOMESERVER_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("MATRIX_HOMESERVER_URL".into()))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        let access_token = lookup("MATRIX_ACCESS_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("MATRIX_ACCESS_TOKEN".into()))?;

        let sync_timeout = parse_secs(
            "MATRIX_SYNC_TIMEOUT_SECS",
            lookup("MATRIX_SYNC_TIMEOUT_SECS"),
            DEFAULT_SYNC_TIMEOUT_SECS,
        )?;

        Ok(Self {
            homeserver,
            access_token,
            sync_timeout,
        })
    }
}

fn parse_secs(key: &str, raw: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(default));
    };
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        })
}
