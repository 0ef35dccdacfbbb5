//! Configuration for the two run modes.
//!
//! `apply-issues` is driven by command-line flags that the binary folds into
//! [`ApplySettings`]; `manage-issues` reads a [`ManagerConfig`] YAML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use scm::{Issue, IssueQuery, IssueState, RepoRef};

use crate::error::{Error, Result};

/// Default location of the issue manager configuration.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/continuous-apply/issue-manager/config.yaml";

/// Per-user location, relative to `$HOME`.
pub const USER_CONFIG_PATH: &str = ".continuous-apply/issue-manager/config.yaml";

/// Literal state value that matches issues in any state.
pub const ANY_STATE: &str = "all";

/// Why an issue failed [`MatchCriteria::check`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("label '{0}' missing")]
    MissingLabel(String),

    #[error("assignee '{0}' not found")]
    Assignee(String),

    #[error("milestone '{0}' does not match")]
    Milestone(String),

    #[error("state '{0}' does not match")]
    State(IssueState),
}

/// Filter for qualifying issues and pull requests. Every non-empty field
/// must match; empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCriteria {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub milestone: String,
    /// `open`, `closed`, `all` or empty
    #[serde(default)]
    pub state: String,
}

impl MatchCriteria {
    /// Check labels, assignee, milestone and state, in that order.
    pub fn check(&self, issue: &Issue) -> std::result::Result<(), Mismatch> {
        if !self.labels.is_empty() {
            let present = issue.label_names();
            if let Some(missing) = self.labels.iter().find(|label| !present.contains(*label)) {
                return Err(Mismatch::MissingLabel(missing.clone()));
            }
        }

        if !self.assignee.is_empty() && !issue.has_assignee(&self.assignee) {
            return Err(Mismatch::Assignee(self.assignee.clone()));
        }

        if !self.milestone.is_empty() && issue.milestone_title() != self.milestone {
            return Err(Mismatch::Milestone(issue.milestone_title().to_string()));
        }

        if !self.state.is_empty() && self.state != ANY_STATE && issue.state.as_str() != self.state {
            return Err(Mismatch::State(issue.state));
        }

        Ok(())
    }

    /// The same filter as a server-side issue query.
    #[must_use]
    pub fn to_query(&self) -> IssueQuery {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        IssueQuery {
            state: non_empty(&self.state),
            labels: self.labels.clone(),
            assignee: non_empty(&self.assignee),
            milestone: non_empty(&self.milestone),
        }
    }
}

/// Bookkeeping performed on an issue around a rollout or on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitActions {
    #[serde(default)]
    pub add_labels: Vec<String>,
    #[serde(default)]
    pub add_assignees: Vec<String>,
    #[serde(default)]
    pub remove_labels: Vec<String>,
    #[serde(default)]
    pub remove_assignees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_state: Option<IssueState>,
}

impl GitActions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add_labels.is_empty()
            && self.add_assignees.is_empty()
            && self.remove_labels.is_empty()
            && self.remove_assignees.is_empty()
            && self.set_state.is_none()
    }
}

/// A named, label-driven facet of "is this change done".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReporterSpec {
    pub name: String,
    #[serde(default)]
    pub in_progress_labels: Vec<String>,
    #[serde(default)]
    pub complete_labels: Vec<String>,
    #[serde(default)]
    pub wait_for: Vec<String>,
}

/// How SourceSync finds the next commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SyncMode {
    /// Newest issue matching the criteria, carrying pull request markers
    #[default]
    Issue,
    /// Newest merge commit whose pull request matches the criteria
    #[value(name = "pr")]
    PullRequest,
}

/// Ordering of apply and poll across target paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RolloutPolicy {
    /// Apply and converge one path before starting the next
    #[default]
    Sequential,
    /// Apply every path, then converge them together
    Parallel,
}

/// Everything the orchestrator needs besides its capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySettings {
    /// Rollout name; identifies the progress comment.
    pub name: String,
    /// Login the engine acts as.
    pub user: String,
    pub targets: Vec<String>,
    pub policy: RolloutPolicy,
    /// Pause between status checks.
    pub pause: Duration,
    pub before: GitActions,
    pub after: GitActions,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            user: String::new(),
            targets: vec!["./".to_string()],
            policy: RolloutPolicy::Sequential,
            pause: Duration::from_secs(1),
            before: GitActions::default(),
            after: GitActions::default(),
        }
    }
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_interval_seconds() -> u64 {
    30
}

/// `manage-issues` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    pub repo: RepoRef,

    /// Login that owns the tracking issues
    #[serde(default)]
    pub user: String,

    /// Label that marks tracking issues
    #[serde(default)]
    pub label: String,

    /// Which merged pull requests get a tracking issue
    #[serde(default)]
    pub open_issue: MatchCriteria,

    /// Labels and assignees for new tracking issues
    #[serde(default)]
    pub open_actions: GitActions,

    #[serde(default)]
    pub status_reporters: Vec<StatusReporterSpec>,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

impl ManagerConfig {
    /// Load from an explicit path, or the first of the default locations
    /// that exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let mut candidates = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(USER_CONFIG_PATH));
        }

        let path = candidates
            .iter()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::Config(format!(
                    "could not find a config file, looked in {}",
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

        Self::from_file(path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("could not read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("could not parse config file: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.repo.owner.is_empty() {
            return Err(Error::Config(
                "must specify repo.owner as the owner of a git repo".to_string(),
            ));
        }
        if self.repo.repo.is_empty() {
            return Err(Error::Config(
                "must specify repo.repo as the name of a git repo".to_string(),
            ));
        }
        if self.user.is_empty() {
            return Err(Error::Config(
                "must specify user as the login for a GitHub account".to_string(),
            ));
        }
        if self.open_issue.labels.is_empty() && self.open_issue.state.is_empty() {
            return Err(Error::Config(
                "must specify openIssue.labels or openIssue.state".to_string(),
            ));
        }
        if self.open_actions.add_labels.is_empty() && self.open_actions.add_assignees.is_empty() {
            return Err(Error::Config(
                "must specify openActions.addLabels or openActions.addAssignees".to_string(),
            ));
        }
        if self.label.is_empty() {
            return Err(Error::Config(
                "must specify label to label managed issues".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}
