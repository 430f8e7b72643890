//! Proposal reference extraction.
//!
//! A reference is `msc` (any case) immediately followed by a run of one to
//! four ASCII digits. The whole digit run is captured, so a longer run such
//! as `msc12345` is not a reference at all rather than being truncated.

use std::sync::LazyLock;

use regex::Regex;

/// Longest digit run accepted as a proposal number.
const MAX_DIGITS: usize = 4;

static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)msc([0-9]+)").expect("valid reference pattern"));

/// Find proposal references in a message body.
///
/// Returns the digit strings in order of first appearance, without
/// duplicates. An empty result means there is nothing to do.
pub fn extract_references(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();

    for caps in REFERENCE_PATTERN.captures_iter(text) {
        let digits = &caps[1];
        if digits.len() > MAX_DIGITS {
            continue;
        }
        if !ids.iter().any(|id| id == digits) {
            ids.push(digits.to_string());
        }
    }

    ids
}
