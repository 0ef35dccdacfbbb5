//! The `manage-issues` loop: one tracking issue per merged pull request,
//! whose state and body are rolled up from label-driven status reporters.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use scm::{Issue, IssueEdit, IssueQuery, IssueState, IssueTracker, NewIssue};

use crate::clock::{Clock, PollState};
use crate::config::{ManagerConfig, StatusReporterSpec, SyncMode, ANY_STATE};
use crate::error::{Error, Result};
use crate::git::Repository;
use crate::markers::TrackingMarkers;
use crate::report::Templates;
use crate::rollout::Phase;
use crate::sync::SourceSync;

/// A reporter and its phase as of the last evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReporter {
    pub spec: StatusReporterSpec,
    pub phase: Phase,
}

impl StatusReporter {
    #[must_use]
    pub fn new(spec: StatusReporterSpec) -> Self {
        Self {
            spec,
            phase: Phase::Pending,
        }
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.phase.is_complete()
    }

    /// Derive the phase from the issue's labels. An empty label set is
    /// always satisfied.
    pub fn evaluate(&mut self, labels: &BTreeSet<String>) -> Phase {
        let has_all = |required: &[String]| required.iter().all(|label| labels.contains(label));

        self.phase = if has_all(&self.spec.complete_labels) {
            Phase::Complete
        } else if has_all(&self.spec.in_progress_labels) {
            Phase::InProgress
        } else {
            Phase::Pending
        };
        self.phase
    }
}

/// Evaluate every reporter in order. The issue state follows the last
/// reporter: closed when it is complete, open otherwise.
pub fn evaluate_reporters(reporters: &mut [StatusReporter], labels: &BTreeSet<String>) -> IssueState {
    let mut state = IssueState::Open;
    for reporter in reporters.iter_mut() {
        let phase = reporter.evaluate(labels);
        debug!(reporter = %reporter.spec.name, %phase, "Evaluated reporter");
        state = if phase.is_complete() {
            IssueState::Closed
        } else {
            IssueState::Open
        };
    }
    state
}

pub struct IssueStatusAggregator {
    config: ManagerConfig,
    tracker: Arc<dyn IssueTracker>,
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    sync: SourceSync,
    templates: Templates,
    reporters: Vec<StatusReporter>,
    tracking_issue: Option<Issue>,
}

impl IssueStatusAggregator {
    pub fn new(
        config: ManagerConfig,
        tracker: Arc<dyn IssueTracker>,
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let sync = SourceSync::new(
            Arc::clone(&tracker),
            Arc::clone(&repo),
            SyncMode::PullRequest,
            config.open_issue.clone(),
        )
        .with_branch(config.branch.clone());
        let reporters = config
            .status_reporters
            .iter()
            .cloned()
            .map(StatusReporter::new)
            .collect();

        Ok(Self {
            config,
            tracker,
            repo,
            clock,
            sync,
            templates: Templates::new()?,
            reporters,
            tracking_issue: None,
        })
    }

    #[must_use]
    pub fn reporters(&self) -> &[StatusReporter] {
        &self.reporters
    }

    /// The tracking issue as last written.
    #[must_use]
    pub fn tracking_issue(&self) -> Option<&Issue> {
        self.tracking_issue.as_ref()
    }

    /// Clone the repository and cycle forever. Returns only on errors that
    /// retrying cannot fix.
    pub async fn run(&mut self) -> Result<()> {
        self.repo.ensure_cloned().await?;
        info!(repo = %self.config.repo, label = %self.config.label, "Managing tracking issues");

        let mut state = PollState::Poll;
        while state.wait(self.clock.as_ref()).await {
            state = self.tick().await?;
        }
        Ok(())
    }

    /// One cycle followed by the configured pause.
    pub async fn tick(&mut self) -> Result<PollState> {
        match self.cycle().await {
            Ok(state) => debug!(%state, "Cycle finished"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => error!(error = %e, "Cycle failed"),
        }
        Ok(PollState::Backoff(self.config.interval()))
    }

    /// Sync to the newest pull request, adopt or open its tracking issue and
    /// write back the rolled-up status. Returns the state written.
    #[instrument(skip(self))]
    pub async fn cycle(&mut self) -> Result<IssueState> {
        let markers = self.sync_pull_request().await?;
        let issue = self.adopt_tracking_issue(&markers).await?;
        self.update_issue_status(issue, &markers).await
    }

    /// Wait until the merge log has a qualifying pull request.
    async fn sync_pull_request(&mut self) -> Result<TrackingMarkers> {
        let mut state = PollState::Poll;
        while state.wait(self.clock.as_ref()).await {
            state = match self.sync.sync().await {
                Ok(_) => PollState::Done,
                Err(Error::NoMatchingPullRequest) => {
                    info!("No matching pull request yet");
                    PollState::Backoff(self.config.interval())
                }
                Err(e) => return Err(e),
            };
        }

        let tracked = self.sync.state();
        let pull_request = tracked
            .pull_request_number()
            .ok_or(Error::NoMatchingPullRequest)?;
        Ok(TrackingMarkers::new(pull_request, tracked.commit.clone()))
    }

    /// The newest labelled issue carrying `markers`, or a new one. Every
    /// other labelled issue is closed.
    async fn adopt_tracking_issue(&mut self, markers: &TrackingMarkers) -> Result<u64> {
        let query = IssueQuery {
            state: Some(ANY_STATE.to_string()),
            labels: vec![self.config.label.clone()],
            assignee: Some(self.config.open_issue.assignee.clone()).filter(|a| !a.is_empty()),
            milestone: Some(self.config.open_issue.milestone.clone()).filter(|m| !m.is_empty()),
        };
        let issues = self.tracker.list_issues(&query).await?;
        debug!(count = issues.len(), label = %self.config.label, "Checking labelled issues");

        let mut candidate_seen = false;
        let mut adopted = None;
        for issue in issues.into_iter().filter(|issue| !issue.is_pull_request()) {
            if candidate_seen {
                self.close_stale(&issue).await;
                continue;
            }

            let found = match TrackingMarkers::parse(issue.number, issue.body_text()) {
                Ok(found) => found,
                Err(e) => {
                    warn!(issue = issue.number, error = %e, "Ignoring labelled issue");
                    continue;
                }
            };
            candidate_seen = true;

            if found != *markers {
                info!(
                    issue = issue.number,
                    pull_request = found.pull_request,
                    commit = %found.commit,
                    "Tracking issue is stale"
                );
                self.close_stale(&issue).await;
                continue;
            }

            info!(issue = issue.number, pull_request = markers.pull_request, "Issue matches pull request");
            adopted = Some(issue.number);
        }

        match adopted {
            Some(number) => Ok(number),
            None => self.open_tracking_issue(markers).await,
        }
    }

    async fn open_tracking_issue(&mut self, markers: &TrackingMarkers) -> Result<u64> {
        for reporter in &mut self.reporters {
            reporter.phase = Phase::Pending;
        }

        let mut labels = self.config.open_actions.add_labels.clone();
        if !labels.contains(&self.config.label) {
            labels.push(self.config.label.clone());
        }

        let new_issue = NewIssue {
            title: format!("Rollout #{}", markers.pull_request),
            body: self.templates.render_tracking_issue(markers, &self.reporters)?,
            labels,
            assignees: self.config.open_actions.add_assignees.clone(),
        };
        let issue = self.tracker.create_issue(&new_issue).await?;
        info!(issue = issue.number, pull_request = markers.pull_request, "Opened tracking issue");
        Ok(issue.number)
    }

    async fn close_stale(&self, issue: &Issue) {
        if issue.state == IssueState::Closed {
            return;
        }
        info!(issue = issue.number, "Closing stale tracking issue");
        if let Err(e) = self
            .tracker
            .edit_issue(issue.number, &IssueEdit::state(IssueState::Closed))
            .await
        {
            warn!(issue = issue.number, error = %e, "Could not close issue");
        }
    }

    async fn update_issue_status(&mut self, number: u64, markers: &TrackingMarkers) -> Result<IssueState> {
        let issue = self.tracker.get_issue(number).await?;
        let state = evaluate_reporters(&mut self.reporters, &issue.label_names());

        let edit = IssueEdit {
            state: Some(state),
            body: Some(self.templates.render_tracking_issue(markers, &self.reporters)?),
        };
        self.tracking_issue = Some(self.tracker.edit_issue(number, &edit).await?);
        info!(issue = number, %state, "Updated tracking issue");
        Ok(state)
    }
}
