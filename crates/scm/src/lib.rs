//! Issue tracker abstraction for continuous-apply.
//!
//! The rollout engine never talks to GitHub directly. It goes through the
//! [`IssueTracker`] trait, which covers the handful of issue, pull request,
//! label, assignee and comment operations the engine needs.
//!
//! - [`IssueTracker`] is the capability, bound to a single repository
//! - [`GitHubClient`] implements it against the GitHub REST API
//! - [`types`] holds the wire types shared by both

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod github;
pub mod tracker;
pub mod types;

pub use error::ScmError;
pub use github::GitHubClient;
pub use tracker::IssueTracker;
pub use types::{
    Comment, Issue, IssueEdit, IssueQuery, IssueState, Label, Milestone, NewIssue, PullRequest,
    RepoRef, User,
};
