//! Proposal resolution: one tracker lookup, then label classification.

use std::sync::Arc;

use tracing::debug;

use crate::config::TrackerConfig;
use crate::error::ResolveError;
use crate::proposals::model::ProposalRecord;
use crate::proposals::tracker::IssueTracker;

/// Turns proposal identifiers into records.
#[derive(Clone)]
pub struct ProposalResolver {
    tracker: Arc<dyn IssueTracker>,
    config: Arc<TrackerConfig>,
}

impl ProposalResolver {
    pub fn new(tracker: Arc<dyn IssueTracker>, config: Arc<TrackerConfig>) -> Self {
        Self { tracker, config }
    }

    /// Look up a single proposal.
    ///
    /// `Ok(None)` means the issue exists but is not labelled as a proposal.
    /// Errors are never retried.
    pub async fn resolve(&self, id: &str) -> Result<Option<ProposalRecord>, ResolveError> {
        debug!(msc = id, repo = %self.config.repo, "Resolving proposal");
        let issue = self.tracker.fetch_issue(&self.config.repo, id).await?;

        if !issue.has_label(&self.config.proposal_label) {
            debug!(msc = id, label = %self.config.proposal_label, "Issue is not a proposal");
            return Ok(None);
        }

        Ok(Some(ProposalRecord {
            id: id.to_string(),
            title: issue.title_or_default().to_string(),
            author: issue.author_handle(),
            url: self.config.issue_url(id),
        }))
    }

    /// Resolve identifiers one at a time, in order.
    ///
    /// Unlabelled issues are skipped. The first failure aborts the whole
    /// batch and no records are returned.
    pub async fn resolve_all(&self, ids: &[String]) -> Result<Vec<ProposalRecord>, ResolveError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.resolve(id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
