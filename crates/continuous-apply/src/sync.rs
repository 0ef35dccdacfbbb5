//! Change detection: is there a new commit to roll out?

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use scm::{Issue, IssueState, IssueTracker, PullRequest};

use crate::config::{MatchCriteria, SyncMode};
use crate::error::{Error, Result};
use crate::git::Repository;
use crate::markers::{parse_merge_log, TrackingMarkers};

/// What was last picked up for rollout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedState {
    /// Issue the rollout reports to. In pull request mode this is the pull
    /// request's own issue.
    pub issue: Option<Issue>,
    pub pull_request: Option<PullRequest>,
    /// Sole identity used for change detection.
    pub commit: String,
}

impl TrackedState {
    #[must_use]
    pub fn issue_number(&self) -> Option<u64> {
        self.issue.as_ref().map(|issue| issue.number)
    }

    #[must_use]
    pub fn pull_request_number(&self) -> Option<u64> {
        self.pull_request.as_ref().map(|pr| pr.number)
    }
}

/// Finds the newest qualifying commit and remembers it between calls.
pub struct SourceSync {
    tracker: Arc<dyn IssueTracker>,
    repo: Arc<dyn Repository>,
    mode: SyncMode,
    criteria: MatchCriteria,
    branch: String,
    state: TrackedState,
}

impl SourceSync {
    #[must_use]
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        repo: Arc<dyn Repository>,
        mode: SyncMode,
        criteria: MatchCriteria,
    ) -> Self {
        Self {
            tracker,
            repo,
            mode,
            criteria,
            branch: "master".to_string(),
            state: TrackedState::default(),
        }
    }

    /// Branch whose merge log is scanned in pull request mode.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    #[must_use]
    pub fn state(&self) -> &TrackedState {
        &self.state
    }

    /// Returns `true` when a new commit was adopted.
    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn sync(&mut self) -> Result<bool> {
        match self.mode {
            SyncMode::PullRequest => self.sync_pull_requests().await,
            SyncMode::Issue => self.sync_issues().await,
        }
    }

    async fn sync_pull_requests(&mut self) -> Result<bool> {
        debug!("Fetching repository");
        self.repo.fetch().await?;
        let log = self.repo.merge_log(&self.branch).await?;

        for entry in parse_merge_log(&log) {
            if entry.commit == self.state.commit {
                debug!(commit = %entry.commit, "Tracked commit is still current");
                return Ok(false);
            }

            debug!(commit = %entry.commit, pull_request = entry.pull_request, "Checking merge");
            let issue = self.tracker.get_issue(entry.pull_request).await?;
            if let Err(mismatch) = self.criteria.check(&issue) {
                debug!(pull_request = entry.pull_request, %mismatch, "Skipping pull request");
                continue;
            }

            let pull_request = self.tracker.get_pull_request(entry.pull_request).await?;
            info!(
                pull_request = entry.pull_request,
                commit = %entry.commit,
                "Found new pull request"
            );
            self.state = TrackedState {
                issue: Some(issue),
                pull_request: Some(pull_request),
                commit: entry.commit,
            };
            return Ok(true);
        }

        Err(Error::NoMatchingPullRequest)
    }

    async fn sync_issues(&mut self) -> Result<bool> {
        let issues = self.tracker.list_issues(&self.criteria.to_query()).await?;
        let Some(newest) = issues.into_iter().next() else {
            return Err(Error::NoMatchingIssue);
        };

        if self
            .state
            .issue
            .as_ref()
            .is_some_and(|current| current.id == newest.id)
        {
            debug!(issue = newest.number, "Tracked issue unchanged");
            return Ok(false);
        }

        info!(issue = newest.number, "Syncing issue");
        let number = newest.number;
        let closed = newest.state == IssueState::Closed;
        let body = newest.body_text().to_string();

        // Adopted before parsing so a malformed issue is not retried
        self.state.issue = Some(newest);

        let markers = TrackingMarkers::parse(number, &body).inspect_err(|e| {
            warn!(issue = number, error = %e, "Skipping issue without rollout markers");
        })?;

        let pull_request = self.tracker.get_pull_request(markers.pull_request).await?;
        self.state.pull_request = Some(pull_request);
        self.state.commit = markers.commit;
        info!(issue = number, commit = %self.state.commit, "Syncing commit");

        if closed {
            info!(issue = number, "Tracked issue is closed");
            return Ok(false);
        }

        Ok(true)
    }
}
