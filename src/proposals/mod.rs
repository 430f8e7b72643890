//! Proposal lookup pipeline.
//!
//! Every message that survives the dispatch policy flows through:
//! 1. `extract_references()`: find `mscNNNN` mentions, deduplicated
//! 2. `ProposalResolver::resolve()`: one tracker lookup per mention, in order
//! 3. `format_reply()`: render the records into a single reply
//!
//! A fetch failure on any mention aborts the whole message.

pub mod extract;
pub mod format;
pub mod model;
pub mod resolver;
pub mod tracker;

pub use extract::extract_references;
pub use format::format_reply;
pub use model::{IssueLabel, IssueResponse, IssueUser, ProposalRecord};
pub use resolver::ProposalResolver;
pub use tracker::{GithubTracker, IssueTracker};
