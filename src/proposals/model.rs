//! Proposal data types.

use serde::{Deserialize, Serialize};

/// Placeholder used when the issue has no title.
pub const UNKNOWN_TITLE: &str = "Unknown title";

/// Placeholder used when the issue has no creator login.
pub const UNKNOWN_AUTHOR: &str = "Unknown author";

/// A proposal resolved from the issue tracker.
///
/// Only built for issues carrying the proposal label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    /// Decimal identifier as it appeared in the message.
    pub id: String,
    pub title: String,
    /// Creator handle, prefixed with `@`.
    pub author: String,
    pub url: String,
}

/// The subset of a GitHub issue response the resolver reads.
///
/// Every field is optional; missing fields fall back to placeholders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueResponse {
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user: Option<IssueUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueLabel {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueUser {
    #[serde(default)]
    pub login: Option<String>,
}

impl IssueResponse {
    /// Whether any label has exactly this name.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .iter()
            .any(|l| l.name.as_deref() == Some(label))
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_TITLE)
    }

    /// Creator login prefixed with `@`.
    pub fn author_handle(&self) -> String {
        let login = self
            .user
            .as_ref()
            .and_then(|u| u.login.as_deref())
            .unwrap_or(UNKNOWN_AUTHOR);
        format!("@{login}")
    }
}
