//! The `apply-issues` control loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::apply::ApplyOrchestrator;
use crate::clock::{Clock, PollState};
use crate::error::Result;
use crate::git::Repository;
use crate::sync::SourceSync;

/// Repeatedly syncs the source and rolls out every new commit.
pub struct ContinuousApply {
    sync: SourceSync,
    orchestrator: ApplyOrchestrator,
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ContinuousApply {
    #[must_use]
    pub fn new(
        sync: SourceSync,
        orchestrator: ApplyOrchestrator,
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            sync,
            orchestrator,
            repo,
            clock,
            interval,
        }
    }

    #[must_use]
    pub fn sync(&self) -> &SourceSync {
        &self.sync
    }

    /// Clone the repository, then loop forever. Only a failed clone returns.
    pub async fn run(&mut self) -> Result<()> {
        self.repo.ensure_cloned().await?;
        info!(interval = ?self.interval, "Watching for new commits");

        let mut state = PollState::Poll;
        while state.wait(self.clock.as_ref()).await {
            state = self.tick().await;
        }
        Ok(())
    }

    /// One sync attempt, followed by a rollout when the commit changed.
    pub async fn tick(&mut self) -> PollState {
        match self.sync.sync().await {
            Ok(true) => {
                let state = self.sync.state();
                let commit = state.commit.clone();
                match state.issue_number() {
                    Some(issue) => {
                        info!(%issue, %commit, "Rolling out new commit");
                        if let Err(e) = self.orchestrator.run(issue, &commit).await {
                            error!(%issue, %commit, error = %e, "Rollout failed");
                        }
                    }
                    None => warn!(%commit, "New commit has no issue to report to"),
                }
            }
            Ok(false) => debug!("No new commit"),
            Err(e) if e.is_retryable() => info!(reason = %e, "Nothing to roll out yet"),
            Err(e) => error!(error = %e, "Sync failed"),
        }

        PollState::Backoff(self.interval)
    }
}
