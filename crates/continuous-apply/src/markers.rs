//! Control data embedded in free text.
//!
//! Two textual contracts live here: the marker lines that tie a tracking
//! issue to a pull request and commit, and the merge-commit lines of
//! `git log --merges --pretty=oneline`.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    /// `[pull-request]: #<N>` followed by `[commit]: <hash>`
    static ref TRACKING_MARKERS: Regex =
        Regex::new(r"\[pull-request\]: #(\d+)\s+\[commit\]: ([a-z0-9]+)\b").unwrap();

    /// `<hash> ... Merge pull request #<N> from ...`
    static ref MERGE_COMMIT: Regex =
        Regex::new(r"^([a-z0-9]+) .*Merge pull request #(\d+) from ").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("Issue #{issue} body is missing the \"[pull-request]: #<N>\" / \"[commit]: <hash>\" markers")]
    Missing { issue: u64 },

    #[error("Issue #{issue} references an invalid pull request number '{value}'")]
    InvalidNumber { issue: u64, value: String },
}

/// Pull request and commit referenced by a tracking issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingMarkers {
    pub pull_request: u64,
    pub commit: String,
}

impl TrackingMarkers {
    #[must_use]
    pub fn new(pull_request: u64, commit: impl Into<String>) -> Self {
        Self {
            pull_request,
            commit: commit.into(),
        }
    }

    /// Extract the markers from the body of issue `issue`.
    pub fn parse(issue: u64, body: &str) -> Result<Self, MarkerError> {
        let captures = TRACKING_MARKERS
            .captures(body)
            .ok_or(MarkerError::Missing { issue })?;

        let number = &captures[1];
        let pull_request = number.parse().map_err(|_| MarkerError::InvalidNumber {
            issue,
            value: number.to_string(),
        })?;

        Ok(Self {
            pull_request,
            commit: captures[2].to_string(),
        })
    }

    /// The two marker lines, in the order the parser expects.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[pull-request]: #{}\n[commit]: {}\n",
            self.pull_request, self.commit
        )
    }
}

/// One merge commit from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEntry {
    pub commit: String,
    pub pull_request: u64,
}

/// Merge commits in log order (newest first). Lines that are not pull
/// request merges are dropped.
#[must_use]
pub fn parse_merge_log(log: &str) -> Vec<MergeEntry> {
    log.lines()
        .filter_map(|line| {
            let captures = MERGE_COMMIT.captures(line)?;
            let pull_request = captures[2].parse().ok()?;
            Some(MergeEntry {
                commit: captures[1].to_string(),
                pull_request,
            })
        })
        .collect()
}
