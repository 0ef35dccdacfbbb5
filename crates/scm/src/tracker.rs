//! The issue tracker capability.

use async_trait::async_trait;

use crate::error::ScmError;
use crate::types::{Comment, Issue, IssueEdit, IssueQuery, NewIssue, PullRequest};

/// Issue, pull request and comment operations against one repository.
///
/// Every call is a single synchronous request/response round trip; callers
/// decide whether a failure is fatal or best-effort.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// List issues (and pull requests) matching the query, newest first.
    /// Only the first page of results is returned.
    async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, ScmError>;

    async fn get_issue(&self, number: u64) -> Result<Issue, ScmError>;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest, ScmError>;

    async fn create_issue(&self, issue: &NewIssue) -> Result<Issue, ScmError>;

    async fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<Issue, ScmError>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ScmError>;

    /// Remove one label. A label that is not present is not an error.
    async fn remove_label(&self, number: u64, label: &str) -> Result<(), ScmError>;

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> Result<(), ScmError>;

    async fn remove_assignees(&self, number: u64, assignees: &[String]) -> Result<(), ScmError>;

    /// Every comment on the issue, oldest first.
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, ScmError>;

    async fn create_comment(&self, number: u64, body: &str) -> Result<Comment, ScmError>;

    async fn edit_comment(&self, comment_id: u64, body: &str) -> Result<Comment, ScmError>;
}
