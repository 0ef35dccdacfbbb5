//! In-memory stand-ins for every capability the engine talks to.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use continuous_apply::cluster::{AccessorError, ClusterAccessor};
use continuous_apply::error::{Error, Result};
use continuous_apply::manifest::ToolOutput;
use continuous_apply::status::WorkloadKind;
use continuous_apply::{Applier, Clock, NamespacedName, Renderer, Repository};
use scm::{
    Comment, Issue, IssueEdit, IssueQuery, IssueState, IssueTracker, Label, NewIssue, PullRequest,
    ScmError, User,
};

pub const BOT: &str = "rollout-bot";

pub fn issue(number: u64, labels: &[&str], state: IssueState, body: &str) -> Issue {
    Issue {
        id: number * 100,
        number,
        title: format!("Issue {number}"),
        body: Some(body.to_string()),
        state,
        labels: labels
            .iter()
            .map(|name| Label {
                name: (*name).to_string(),
            })
            .collect(),
        assignees: Vec::new(),
        milestone: None,
        pull_request: None,
    }
}

/// The issue side of a pull request, as the issues endpoint returns it.
pub fn pull_request_issue(number: u64, labels: &[&str]) -> Issue {
    Issue {
        pull_request: Some(json!({"url": format!("https://api.github.com/pulls/{number}")})),
        ..issue(number, labels, IssueState::Closed, "")
    }
}

pub fn pull_request(number: u64, merge_commit: &str) -> PullRequest {
    PullRequest {
        id: number * 1000,
        number,
        title: format!("Change {number}"),
        state: IssueState::Closed,
        merge_commit_sha: Some(merge_commit.to_string()),
        html_url: None,
    }
}

#[derive(Default)]
pub struct TrackerState {
    pub issues: BTreeMap<u64, Issue>,
    pub pull_requests: BTreeMap<u64, PullRequest>,
    pub comments: BTreeMap<u64, Vec<Comment>>,
    /// Every body pushed through `edit_comment`, in order.
    pub comment_bodies: Vec<String>,
    pub created_issues: Vec<NewIssue>,
    pub calls: Vec<String>,
    pub failing_edits: BTreeSet<u64>,
    next_id: u64,
}

/// Issue tracker that keeps everything in memory and logs each call.
pub struct FakeTracker {
    login: String,
    pub state: Mutex<TrackerState>,
}

impl Default for FakeTracker {
    fn default() -> Self {
        Self::new(BOT)
    }
}

impl FakeTracker {
    pub fn new(login: &str) -> Self {
        Self {
            login: login.to_string(),
            state: Mutex::new(TrackerState {
                next_id: 5000,
                ..TrackerState::default()
            }),
        }
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        self.state.lock().unwrap().issues.insert(issue.number, issue);
        self
    }

    pub fn with_pull_request(self, pull_request: PullRequest) -> Self {
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .insert(pull_request.number, pull_request);
        self
    }

    pub fn with_comment(self, issue: u64, author: &str, body: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id();
            state.comments.entry(issue).or_default().push(Comment {
                id,
                body: Some(body.to_string()),
                user: Some(User {
                    login: author.to_string(),
                }),
            });
        }
        self
    }

    pub fn failing_edit(self, issue: u64) -> Self {
        self.state.lock().unwrap().failing_edits.insert(issue);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn issue(&self, number: u64) -> Issue {
        self.state.lock().unwrap().issues[&number].clone()
    }

    pub fn set_labels(&self, number: u64, labels: &[&str]) {
        let mut state = self.state.lock().unwrap();
        if let Some(issue) = state.issues.get_mut(&number) {
            issue.labels = labels
                .iter()
                .map(|name| Label {
                    name: (*name).to_string(),
                })
                .collect();
        }
    }

    pub fn comments(&self, issue: u64) -> Vec<Comment> {
        self.state
            .lock()
            .unwrap()
            .comments
            .get(&issue)
            .cloned()
            .unwrap_or_default()
    }

    pub fn comment_bodies(&self) -> Vec<String> {
        self.state.lock().unwrap().comment_bodies.clone()
    }

    pub fn created_issues(&self) -> Vec<NewIssue> {
        self.state.lock().unwrap().created_issues.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl TrackerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_mut(&mut self, number: u64) -> std::result::Result<&mut Issue, ScmError> {
        self.issues.get_mut(&number).ok_or_else(not_found)
    }
}

fn not_found() -> ScmError {
    ScmError::Api {
        status: 404,
        message: "Not Found".to_string(),
    }
}

fn matches_query(issue: &Issue, query: &IssueQuery) -> bool {
    let state_ok = match query.state.as_deref() {
        None => issue.state == IssueState::Open,
        Some("all") => true,
        Some(state) => issue.state.as_str() == state,
    };
    let labels = issue.label_names();
    state_ok
        && query.labels.iter().all(|label| labels.contains(label))
        && query
            .assignee
            .as_deref()
            .map_or(true, |assignee| issue.has_assignee(assignee))
        && query
            .milestone
            .as_deref()
            .map_or(true, |milestone| issue.milestone_title() == milestone)
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn list_issues(&self, query: &IssueQuery) -> std::result::Result<Vec<Issue>, ScmError> {
        self.record(format!("list_issues {:?}", query.labels));
        let state = self.state.lock().unwrap();
        // Newest first
        Ok(state
            .issues
            .values()
            .rev()
            .filter(|issue| matches_query(issue, query))
            .cloned()
            .collect())
    }

    async fn get_issue(&self, number: u64) -> std::result::Result<Issue, ScmError> {
        self.record(format!("get_issue {number}"));
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&number)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn get_pull_request(&self, number: u64) -> std::result::Result<PullRequest, ScmError> {
        self.record(format!("get_pull_request {number}"));
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .get(&number)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn create_issue(&self, new_issue: &NewIssue) -> std::result::Result<Issue, ScmError> {
        self.record(format!("create_issue {}", new_issue.title));
        let mut state = self.state.lock().unwrap();
        let number = state.issues.keys().next_back().copied().unwrap_or_default() + 1;
        let labels: Vec<&str> = new_issue.labels.iter().map(String::as_str).collect();
        let mut created = issue(number, &labels, IssueState::Open, &new_issue.body);
        created.title.clone_from(&new_issue.title);
        created.assignees = new_issue
            .assignees
            .iter()
            .map(|login| User {
                login: login.clone(),
            })
            .collect();
        state.issues.insert(number, created.clone());
        state.created_issues.push(new_issue.clone());
        Ok(created)
    }

    async fn edit_issue(&self, number: u64, edit: &IssueEdit) -> std::result::Result<Issue, ScmError> {
        self.record(format!(
            "edit_issue {number} {}",
            edit.state.map_or("-", IssueState::as_str)
        ));
        let mut state = self.state.lock().unwrap();
        if state.failing_edits.contains(&number) {
            return Err(ScmError::Api {
                status: 500,
                message: "boom".to_string(),
            });
        }
        let issue = state.issue_mut(number)?;
        if let Some(new_state) = edit.state {
            issue.state = new_state;
        }
        if let Some(body) = &edit.body {
            issue.body = Some(body.clone());
        }
        Ok(issue.clone())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> std::result::Result<(), ScmError> {
        self.record(format!("add_labels {number} {}", labels.join(",")));
        let mut state = self.state.lock().unwrap();
        let issue = state.issue_mut(number)?;
        for name in labels {
            if !issue.labels.iter().any(|label| &label.name == name) {
                issue.labels.push(Label { name: name.clone() });
            }
        }
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> std::result::Result<(), ScmError> {
        self.record(format!("remove_label {number} {label}"));
        let mut state = self.state.lock().unwrap();
        let issue = state.issue_mut(number)?;
        issue.labels.retain(|existing| existing.name != label);
        Ok(())
    }

    async fn add_assignees(&self, number: u64, assignees: &[String]) -> std::result::Result<(), ScmError> {
        self.record(format!("add_assignees {number} {}", assignees.join(",")));
        let mut state = self.state.lock().unwrap();
        let issue = state.issue_mut(number)?;
        for login in assignees {
            if !issue.has_assignee(login) {
                issue.assignees.push(User {
                    login: login.clone(),
                });
            }
        }
        Ok(())
    }

    async fn remove_assignees(&self, number: u64, assignees: &[String]) -> std::result::Result<(), ScmError> {
        self.record(format!("remove_assignees {number} {}", assignees.join(",")));
        let mut state = self.state.lock().unwrap();
        let issue = state.issue_mut(number)?;
        issue.assignees.retain(|user| !assignees.contains(&user.login));
        Ok(())
    }

    async fn list_comments(&self, number: u64) -> std::result::Result<Vec<Comment>, ScmError> {
        self.record(format!("list_comments {number}"));
        Ok(self.comments(number))
    }

    async fn create_comment(&self, number: u64, body: &str) -> std::result::Result<Comment, ScmError> {
        self.record(format!("create_comment {number}"));
        let mut state = self.state.lock().unwrap();
        let comment = Comment {
            id: state.next_id(),
            body: Some(body.to_string()),
            user: Some(User {
                login: self.login.clone(),
            }),
        };
        state.comments.entry(number).or_default().push(comment.clone());
        Ok(comment)
    }

    async fn edit_comment(&self, comment_id: u64, body: &str) -> std::result::Result<Comment, ScmError> {
        self.record(format!("edit_comment {comment_id}"));
        let mut state = self.state.lock().unwrap();
        state.comment_bodies.push(body.to_string());
        let comment = state
            .comments
            .values_mut()
            .flatten()
            .find(|comment| comment.id == comment_id)
            .ok_or_else(not_found)?;
        comment.body = Some(body.to_string());
        Ok(comment.clone())
    }
}

/// Repository whose merge log is set by the test.
#[derive(Default)]
pub struct FakeRepo {
    pub merge_log: Mutex<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRepo {
    pub fn with_merge_log(log: &str) -> Self {
        Self {
            merge_log: Mutex::new(log.to_string()),
            calls: Mutex::default(),
        }
    }

    pub fn set_merge_log(&self, log: &str) {
        *self.merge_log.lock().unwrap() = log.to_string();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Repository for FakeRepo {
    async fn ensure_cloned(&self) -> Result<()> {
        self.record("clone".to_string());
        Ok(())
    }

    async fn fetch(&self) -> Result<()> {
        self.record("fetch".to_string());
        Ok(())
    }

    async fn merge_log(&self, branch: &str) -> Result<String> {
        self.record(format!("log {branch}"));
        Ok(self.merge_log.lock().unwrap().clone())
    }

    async fn sync_to(&self, commit: &str) -> Result<()> {
        self.record(format!("checkout {commit}"));
        Ok(())
    }
}

/// Renders from a fixed path to stream table.
#[derive(Default)]
pub struct FakeRenderer {
    pub streams: HashMap<String, String>,
}

impl FakeRenderer {
    pub fn with(mut self, path: &str, stream: &str) -> Self {
        self.streams.insert(path.to_string(), stream.to_string());
        self
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, path: &str) -> Result<String> {
        self.streams.get(path).cloned().ok_or_else(|| Error::Render {
            path: path.to_string(),
            output: "accumulating resources: no such directory".to_string(),
        })
    }
}

/// Ordered record of applies and lookups shared by several fakes.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// `metadata.name` of a single rendered document.
fn document_name(document: &str) -> &str {
    document
        .lines()
        .find_map(|line| line.trim().strip_prefix("name: "))
        .unwrap_or_default()
}

/// Applier that succeeds unless the document contains `failing_name`.
#[derive(Default)]
pub struct FakeApplier {
    pub failing_name: Option<String>,
    pub applied: Mutex<Vec<String>>,
    events: Option<EventLog>,
}

impl FakeApplier {
    pub fn failing_on(name: &str) -> Self {
        Self {
            failing_name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn recording_to(mut self, log: &EventLog) -> Self {
        self.events = Some(log.clone());
        self
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl Applier for FakeApplier {
    async fn apply(&self, document: &str) -> Result<ToolOutput> {
        self.applied.lock().unwrap().push(document.to_string());
        if let Some(events) = &self.events {
            events.push(format!("apply {}", document_name(document)));
        }
        let failing = self
            .failing_name
            .as_deref()
            .is_some_and(|name| document.contains(&format!("name: {name}")));
        Ok(if failing {
            ToolOutput {
                success: false,
                output: "error: unable to recognize \"STDIN\"".to_string(),
            }
        } else {
            ToolOutput {
                success: true,
                output: "configured".to_string(),
            }
        })
    }
}

/// Cluster that serves a queue of object states per workload; the last
/// state sticks once the queue is drained.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<HashMap<(WorkloadKind, NamespacedName), VecDeque<Value>>>,
    pub lookups: Mutex<Vec<String>>,
    events: Option<EventLog>,
}

impl FakeCluster {
    pub fn with(self, kind: WorkloadKind, name: &NamespacedName, states: Vec<Value>) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((kind, name.clone()), states.into());
        self
    }

    pub fn recording_to(mut self, log: &EventLog) -> Self {
        self.events = Some(log.clone());
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterAccessor for FakeCluster {
    async fn get(&self, kind: WorkloadKind, name: &NamespacedName) -> std::result::Result<Value, AccessorError> {
        self.lookups.lock().unwrap().push(format!("{kind} {name}"));
        if let Some(events) = &self.events {
            events.push(format!("lookup {kind} {name}"));
        }
        let mut objects = self.objects.lock().unwrap();
        let not_found = || AccessorError::NotFound {
            kind,
            name: name.clone(),
        };
        let states = objects.get_mut(&(kind, name.clone())).ok_or_else(not_found)?;
        if states.len() > 1 {
            states.pop_front().ok_or_else(not_found)
        } else {
            states.front().cloned().ok_or_else(not_found)
        }
    }
}

/// Deployment with `updated` of `replicas` pods rolled out.
pub fn deployment(name: &str, replicas: i32, updated: i32) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": "default", "generation": 2},
        "spec": {"replicas": replicas},
        "status": {
            "observedGeneration": 2,
            "replicas": replicas,
            "updatedReplicas": updated,
            "availableReplicas": updated
        }
    })
}

/// Clock that starts at a fixed instant and only moves when slept on.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    pub sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            sleeps: Mutex::default(),
        }
    }
}

impl ManualClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::from_std(duration).unwrap();
    }
}
