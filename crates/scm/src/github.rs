//! # GitHub REST Client
//!
//! [`IssueTracker`] implementation backed by the GitHub REST API v3.

use async_trait::async_trait;
use reqwest::{header, Client as HttpClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::ScmError;
use crate::tracker::IssueTracker;
use crate::types::{Comment, Issue, IssueEdit, IssueQuery, NewIssue, PullRequest, RepoRef};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "continuous-apply/1.0";

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
}

/// GitHub API client bound to a single repository.
#[derive(Clone)]
pub struct GitHubClient {
    http_client: HttpClient,
    base_url: String,
    token: String,
    repo: RepoRef,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client authenticated with a personal access token.
    pub fn new(token: impl Into<String>, repo: RepoRef) -> Result<Self, ScmError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(ScmError::Configuration(
                "GitHub access token is empty".to_string(),
            ));
        }

        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
            repo,
        })
    }

    /// Point the client at a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url, self.repo.owner, self.repo.repo, path
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ScmError> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// GET every page of a list endpoint, following `Link: rel="next"`.
    async fn send_paged<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ScmError> {
        let mut request = self.request(Method::GET, url).query(query);
        let mut items = Vec::new();
        loop {
            let response = Self::check(request.send().await?).await?;
            let next = next_page(&response);
            items.extend(response.json::<Vec<T>>().await?);
            match next {
                Some(next) => {
                    debug!(%next, "Following next page");
                    request = self.request(Method::GET, &next);
                }
                None => return Ok(items),
            }
        }
    }

    async fn send_discard(&self, request: RequestBuilder) -> Result<(), ScmError> {
        Self::check(request.send().await?).await?;
        Ok(())
    }

    /// Turn a non-success response into [`ScmError::Api`].
    async fn check(response: Response) -> Result<Response, ScmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GitHubError>(&text)
            .map(|e| e.message)
            .unwrap_or(text);

        Err(ScmError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// URL of the next page advertised in a `Link` header.
fn next_page(response: &Response) -> Option<String> {
    let link = response.headers().get(header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

#[async_trait]
impl IssueTracker for GitHubClient {
    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, ScmError> {
        let url = self.repo_url("/issues");
        let issues: Vec<Issue> = self
            .send_json(self.request(Method::GET, &url).query(&query.to_params()))
            .await?;
        debug!("Listed {} issues", issues.len());
        Ok(issues)
    }

    async fn get_issue(&self, number: u64) -> Result<Issue, ScmError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        self.send_json(self.request(Method::GET, &url)).await
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest, ScmError> {
        let url = self.repo_url(&format!("/pulls/{number}"));
        self.send_json(self.request(Method::GET, &url)).await
    }

    #[instrument(skip(self, issue), fields(title = %issue.title))]
    async fn create_issue(&self, issue: &NewIssue) -> Result<Issue, ScmError> {
        let url = self.repo_url("/issues");
        self.send_json(self.request(Method::POST, &url).json(issue))
            .await
    }

    async fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<Issue, ScmError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        self.send_json(self.request(Method::PATCH, &url).json(edit))
            .await
    }

    #[instrument(skip(self), fields(issue = %number))]
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ScmError> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(&format!("/issues/{number}/labels"));
        let body = serde_json::json!({ "labels": labels });
        self.send_discard(self.request(Method::POST, &url).json(&body))
            .await
    }

    #[instrument(skip(self), fields(issue = %number))]
    async fn remove_label(&self, number: u64, label: &str) -> Result<(), ScmError> {
        let url = self.repo_url(&format!(
            "/issues/{number}/labels/{}",
            urlencoding::encode(label)
        ));
        match self.send_discard(self.request(Method::DELETE, &url)).await {
            Err(e) if e.is_not_found() => {
                debug!("Label '{}' not present on #{}", label, number);
                Ok(())
            }
            other => other,
        }
    }

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> Result<(), ScmError> {
        if assignees.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(&format!("/issues/{number}/assignees"));
        let body = serde_json::json!({ "assignees": assignees });
        self.send_discard(self.request(Method::POST, &url).json(&body))
            .await
    }

    async fn remove_assignees(&self, number: u64, assignees: &[String]) -> Result<(), ScmError> {
        if assignees.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(&format!("/issues/{number}/assignees"));
        let body = serde_json::json!({ "assignees": assignees });
        self.send_discard(self.request(Method::DELETE, &url).json(&body))
            .await
    }

    #[instrument(skip(self), fields(issue = %number))]
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, ScmError> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        let comments: Vec<Comment> = self.send_paged(&url, &[("per_page", "100")]).await?;
        debug!("Listed {} comments", comments.len());
        Ok(comments)
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<Comment, ScmError> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        let payload = serde_json::json!({ "body": body });
        self.send_json(self.request(Method::POST, &url).json(&payload))
            .await
    }

    async fn edit_comment(&self, comment_id: u64, body: &str) -> Result<Comment, ScmError> {
        let url = self.repo_url(&format!("/issues/comments/{comment_id}"));
        let payload = serde_json::json!({ "body": body });
        self.send_json(self.request(Method::PATCH, &url).json(&payload))
            .await
    }
}
