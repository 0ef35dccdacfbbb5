//! Drives one rollout of a commit: render, apply, poll to convergence and
//! report.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use scm::IssueTracker;

use crate::actions::run_actions;
use crate::clock::{Clock, PollState};
use crate::config::{ApplySettings, RolloutPolicy};
use crate::error::{Error, Result};
use crate::git::Repository;
use crate::manifest::{decode_stream, Applier, Renderer};
use crate::report::{ProgressComment, Templates};
use crate::rollout::{Phase, Rollout, RolloutSet};
use crate::status::StatusEngine;

/// Deployments are checked against whatever revision is running.
const ANY_REVISION: i64 = 0;

pub struct ApplyOrchestrator {
    settings: ApplySettings,
    tracker: Arc<dyn IssueTracker>,
    repo: Arc<dyn Repository>,
    renderer: Arc<dyn Renderer>,
    applier: Arc<dyn Applier>,
    status: StatusEngine,
    clock: Arc<dyn Clock>,
    templates: Templates,
}

impl ApplyOrchestrator {
    pub fn new(
        settings: ApplySettings,
        tracker: Arc<dyn IssueTracker>,
        repo: Arc<dyn Repository>,
        renderer: Arc<dyn Renderer>,
        applier: Arc<dyn Applier>,
        status: StatusEngine,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            tracker,
            repo,
            renderer,
            applier,
            status,
            clock,
            templates: Templates::new()?,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &ApplySettings {
        &self.settings
    }

    /// Roll `commit` out, reporting progress on `issue`. Re-running for the
    /// same commit renders and applies again.
    #[instrument(skip(self), fields(name = %self.settings.name))]
    pub async fn run(&self, issue: u64, commit: &str) -> Result<RolloutSet> {
        self.repo.sync_to(commit).await?;
        info!("Repo synced");

        run_actions(self.tracker.as_ref(), issue, &self.settings.before).await?;

        let comment = ProgressComment::locate_or_create(
            Arc::clone(&self.tracker),
            &self.settings.name,
            &self.settings.user,
            issue,
        )
        .await?;

        let mut set = RolloutSet::new(&self.settings.name);
        for path in &self.settings.targets {
            info!(%path, "Rendering target");
            let stream = self.renderer.render(path).await?;
            let objects = decode_stream(&stream)?;
            info!(%path, objects = objects.len(), "Adding objects to rollout");
            set.rollouts.push(Rollout::new(path, objects));
        }
        self.publish(&comment, &set).await?;

        match self.settings.policy {
            RolloutPolicy::Sequential => {
                for index in 0..set.rollouts.len() {
                    self.apply_rollouts(&comment, &mut set, &[index]).await?;
                    self.converge(&comment, &mut set, &[index]).await?;
                }
            }
            RolloutPolicy::Parallel => {
                let all: Vec<usize> = (0..set.rollouts.len()).collect();
                self.apply_rollouts(&comment, &mut set, &all).await?;
                self.converge(&comment, &mut set, &all).await?;
            }
        }

        set.mark_complete();
        self.publish(&comment, &set).await?;
        info!("Rollout complete");

        run_actions(self.tracker.as_ref(), issue, &self.settings.after).await?;
        Ok(set)
    }

    /// Apply every object of the selected rollouts, in decode order. The
    /// first failure is recorded, published and returned.
    async fn apply_rollouts(
        &self,
        comment: &ProgressComment,
        set: &mut RolloutSet,
        indices: &[usize],
    ) -> Result<()> {
        for &index in indices {
            set.rollouts[index].phase = Phase::InProgress;

            for position in 0..set.rollouts[index].objects.len() {
                let object = &mut set.rollouts[index].objects[position];
                info!(object = %object.display(), "Applying");

                let failure = match self.applier.apply(&object.raw).await {
                    Ok(output) => {
                        debug!(output = %output.output, "Apply output");
                        object.apply_status = output.output;
                        (!output.success).then(|| object.apply_status.clone())
                    }
                    Err(e) => {
                        object.apply_status = format!("error: {e}");
                        Some(e.to_string())
                    }
                };

                if let Some(output) = failure {
                    let shown = object.display();
                    error!(object = %shown, %output, "Apply failed");
                    self.publish_best_effort(comment, set).await;
                    return Err(Error::Apply {
                        object: shown,
                        output,
                    });
                }
            }
        }

        self.publish(comment, set).await
    }

    /// Poll the selected rollouts until every object has converged.
    async fn converge(
        &self,
        comment: &ProgressComment,
        set: &mut RolloutSet,
        indices: &[usize],
    ) -> Result<()> {
        let mut state = PollState::Poll;
        while state.wait(self.clock.as_ref()).await {
            state = self.poll_round(comment, set, indices).await?;
        }
        Ok(())
    }

    async fn poll_round(
        &self,
        comment: &ProgressComment,
        set: &mut RolloutSet,
        indices: &[usize],
    ) -> Result<PollState> {
        let mut phase_changed = false;

        for &index in indices {
            for position in 0..set.rollouts[index].objects.len() {
                let object = &set.rollouts[index].objects[position];
                if object.done {
                    continue;
                }

                let result = self
                    .status
                    .status_for(&object.api_version, &object.kind, &object.name, ANY_REVISION)
                    .await;

                let object = &mut set.rollouts[index].objects[position];
                match result {
                    Ok(status) => {
                        if object.observe(&status, self.clock.now()) {
                            info!(
                                object = %object.display(),
                                message = %object.rollout_status,
                                done = status.done,
                                "Rollout status changed"
                            );
                            self.publish(comment, set).await?;
                        }
                    }
                    Err(source) => {
                        object.observe_error(&source);
                        let shown = object.display();
                        error!(object = %shown, error = %source, "Rollout status unavailable");
                        self.publish_best_effort(comment, set).await;
                        return Err(Error::Status {
                            object: shown,
                            source,
                        });
                    }
                }
            }

            let rollout = &mut set.rollouts[index];
            if !rollout.phase.is_complete() && rollout.all_done() {
                info!(path = %rollout.path, "Rollout converged");
                rollout.phase = Phase::Complete;
                phase_changed = true;
            }
        }

        if phase_changed {
            self.publish(comment, set).await?;
        }

        let converged = indices.iter().all(|&index| set.rollouts[index].all_done());
        Ok(if converged {
            PollState::Done
        } else {
            PollState::Backoff(self.settings.pause)
        })
    }

    async fn publish(&self, comment: &ProgressComment, set: &RolloutSet) -> Result<()> {
        let body = self.templates.render_progress(set)?;
        comment.push(&body).await
    }

    async fn publish_best_effort(&self, comment: &ProgressComment, set: &RolloutSet) {
        if let Err(e) = self.publish(comment, set).await {
            warn!(error = %e, "Could not publish final progress");
        }
    }
}
