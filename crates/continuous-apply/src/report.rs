//! Markdown published to the issue tracker.
//!
//! Two documents are rendered with handlebars: the progress comment of a
//! [`RolloutSet`] and the body of an aggregator tracking issue. Both are
//! read back by humans and, for the tracking issue markers, by the engine
//! itself, so their layout is part of the external contract.

use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use scm::IssueTracker;

use crate::error::Result;
use crate::issues::StatusReporter;
use crate::markers::TrackingMarkers;
use crate::rollout::RolloutSet;

const PROGRESS_TEMPLATE: &str = r"## {{icon}} {{name}} - *{{status}}*
---

{{#each rollouts}}
### {{icon}} `{{path}}` - *{{status}}*

{{#each objects}}
- [{{#if done}}x{{else}} {{/if}}] {{display}}
{{#if apply_status}}
  - **apply:** `{{apply_status}}`
{{/if}}
{{#if rollout_status}}
  - **rollout:** `{{rollout_status}}`
{{#each history}}
    - {{this}}
{{/each}}
{{/if}}
{{/each}}

---

{{/each}}
";

const TRACKING_ISSUE_TEMPLATE: &str = r"{{markers}}
Rollout #{{pull_request}}

{{#each reporters}}
- {{icon}} {{name}} - *{{status}}*{{#unless done}}{{#if wait_for}} (run after{{#each wait_for}} {{this}}{{/each}}){{/if}}{{/unless}}
{{/each}}
";

#[derive(Serialize)]
struct ProgressView<'a> {
    icon: &'static str,
    name: &'a str,
    status: String,
    rollouts: Vec<RolloutView<'a>>,
}

#[derive(Serialize)]
struct RolloutView<'a> {
    icon: &'static str,
    path: &'a str,
    status: String,
    objects: Vec<ObjectView<'a>>,
}

#[derive(Serialize)]
struct ObjectView<'a> {
    done: bool,
    display: String,
    apply_status: &'a str,
    rollout_status: &'a str,
    history: &'a [String],
}

#[derive(Serialize)]
struct TrackingIssueView<'a> {
    markers: String,
    pull_request: u64,
    reporters: Vec<ReporterView<'a>>,
}

#[derive(Serialize)]
struct ReporterView<'a> {
    icon: &'static str,
    name: &'a str,
    status: String,
    done: bool,
    wait_for: &'a [String],
}

/// Compiled templates for every published document.
#[derive(Clone)]
pub struct Templates {
    handlebars: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        // Markdown, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_template_string("progress", PROGRESS_TEMPLATE)?;
        handlebars.register_template_string("tracking-issue", TRACKING_ISSUE_TEMPLATE)?;

        Ok(Self { handlebars })
    }

    /// Body of the progress comment, without the identifying prefix.
    pub fn render_progress(&self, set: &RolloutSet) -> Result<String> {
        let view = ProgressView {
            icon: set.phase.icon(),
            name: &set.name,
            status: set.phase.to_string(),
            rollouts: set
                .rollouts
                .iter()
                .map(|rollout| RolloutView {
                    icon: rollout.phase.icon(),
                    path: &rollout.path,
                    status: rollout.phase.to_string(),
                    objects: rollout
                        .objects
                        .iter()
                        .map(|object| ObjectView {
                            done: object.done,
                            display: object.display(),
                            apply_status: &object.apply_status,
                            rollout_status: &object.rollout_status,
                            history: &object.history,
                        })
                        .collect(),
                })
                .collect(),
        };

        Ok(self.handlebars.render("progress", &view)?)
    }

    /// Body of an aggregator tracking issue.
    pub fn render_tracking_issue(
        &self,
        markers: &TrackingMarkers,
        reporters: &[StatusReporter],
    ) -> Result<String> {
        let view = TrackingIssueView {
            markers: markers.render(),
            pull_request: markers.pull_request,
            reporters: reporters
                .iter()
                .map(|reporter| ReporterView {
                    icon: reporter.phase.icon(),
                    name: &reporter.spec.name,
                    status: reporter.phase.to_string(),
                    done: reporter.done(),
                    wait_for: &reporter.spec.wait_for,
                })
                .collect(),
        };

        Ok(self.handlebars.render("tracking-issue", &view)?)
    }
}

/// First line of every progress comment; identifies it among the issue's
/// comments.
#[must_use]
pub fn comment_prefix(name: &str) -> String {
    format!("[rollout]: {name}")
}

/// The single progress comment of a rollout, edited in place.
pub struct ProgressComment {
    tracker: Arc<dyn IssueTracker>,
    prefix: String,
    comment_id: u64,
}

impl ProgressComment {
    /// Find the comment `user` left for rollout `name` on `issue`, or create
    /// one holding only the prefix. The prefix must be the whole first line.
    pub async fn locate_or_create(
        tracker: Arc<dyn IssueTracker>,
        name: &str,
        user: &str,
        issue: u64,
    ) -> Result<Self> {
        let prefix = comment_prefix(name);

        let existing = tracker
            .list_comments(issue)
            .await?
            .into_iter()
            .find(|comment| {
                let ours = comment.author() == Some(user);
                let matches = comment.body_text().lines().next() == Some(prefix.as_str());
                if !(ours && matches) {
                    debug!(comment = comment.id, ours, matches, "Skipping comment");
                }
                ours && matches
            });

        let comment_id = match existing {
            Some(comment) => comment.id,
            None => {
                debug!(%issue, %prefix, "Creating progress comment");
                tracker.create_comment(issue, &prefix).await?.id
            }
        };

        Ok(Self {
            tracker,
            prefix,
            comment_id,
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.comment_id
    }

    /// Replace the comment body, keeping the prefix in front.
    pub async fn push(&self, body: &str) -> Result<()> {
        let body = if body.starts_with(&self.prefix) {
            body.to_string()
        } else {
            format!("{}\n\n{body}", self.prefix)
        };
        self.tracker.edit_comment(self.comment_id, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusReporterSpec;
    use crate::manifest::ManifestObject;
    use crate::rollout::{Phase, Rollout, DONE_ICON, IN_PROGRESS_ICON};
    use crate::status::RolloutStatus;
    use chrono::{TimeZone, Utc};

    fn rollout_set() -> RolloutSet {
        let mut web =
            ManifestObject::decode("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n")
                .unwrap();
        web.apply_status = "deployment.apps/web configured".to_string();

        let mut set = RolloutSet::new("production");
        let mut rollout = Rollout::new("overlays/prod", vec![web]);
        rollout.phase = Phase::InProgress;
        set.rollouts.push(rollout);
        set
    }

    fn history_lines(body: &str) -> usize {
        body.lines().filter(|line| line.starts_with("    - *")).count()
    }

    #[test]
    fn progress_lists_objects_with_apply_output() {
        let body = Templates::new().unwrap().render_progress(&rollout_set()).unwrap();

        assert!(body.starts_with(&format!("## {IN_PROGRESS_ICON} production - *In Progress*\n---\n")));
        assert!(body.contains(&format!("### {IN_PROGRESS_ICON} `overlays/prod` - *In Progress*")));
        assert!(body.contains("- [ ] Deployment default/web\n"));
        assert!(body.contains("  - **apply:** `deployment.apps/web configured`\n"));
        assert!(!body.contains("**rollout:**"));
    }

    #[test]
    fn status_change_appends_one_history_line() {
        let templates = Templates::new().unwrap();
        let mut set = rollout_set();
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();

        set.rollouts[0].objects[0].observe(&RolloutStatus::progressing("waiting"), at);
        let first = templates.render_progress(&set).unwrap();

        set.rollouts[0].objects[0].observe(&RolloutStatus::complete("rolled out"), at);
        let second = templates.render_progress(&set).unwrap();

        assert_eq!(history_lines(&first), 1);
        assert_eq!(history_lines(&second), 2);
        assert!(second.contains("    - *05 Mar 24 09:30 UTC* - `waiting`\n"));
        assert!(second.contains("    - *05 Mar 24 09:30 UTC* - `rolled out`\n"));
        assert!(second.contains("  - **rollout:** `rolled out`\n"));
        assert!(second.contains("- [x] Deployment default/web\n"));
    }

    #[test]
    fn tracking_issue_starts_with_markers() {
        let mut reporters = vec![
            StatusReporter::new(StatusReporterSpec {
                name: "staging".to_string(),
                complete_labels: vec!["staging-done".to_string()],
                ..StatusReporterSpec::default()
            }),
            StatusReporter::new(StatusReporterSpec {
                name: "production".to_string(),
                complete_labels: vec!["prod-done".to_string()],
                wait_for: vec!["staging".to_string(), "qa".to_string()],
                ..StatusReporterSpec::default()
            }),
        ];
        reporters[0].phase = Phase::Complete;

        let markers = TrackingMarkers::new(42, "abc123");
        let body = Templates::new()
            .unwrap()
            .render_tracking_issue(&markers, &reporters)
            .unwrap();

        assert!(body.starts_with("[pull-request]: #42\n[commit]: abc123\n"));
        assert!(body.contains("\nRollout #42\n"));
        assert!(body.contains(&format!("- {DONE_ICON} staging - *Complete*\n")));
        assert!(body.contains("-  production - *Pending* (run after staging qa)\n"));
        assert_eq!(TrackingMarkers::parse(1, &body).unwrap(), markers);
    }

    #[test]
    fn prefix_names_the_rollout() {
        assert_eq!(comment_prefix("prod"), "[rollout]: prod");
    }
}
