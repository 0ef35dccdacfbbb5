//! Issue bookkeeping around a rollout.

use tracing::{debug, warn};

use scm::{IssueEdit, IssueTracker};

use crate::config::GitActions;
use crate::error::Result;

/// Apply `actions` to `issue`. Additions and the state change must succeed;
/// removals are best-effort since the label or assignee may not be there.
pub async fn run_actions(tracker: &dyn IssueTracker, issue: u64, actions: &GitActions) -> Result<()> {
    if actions.is_empty() {
        return Ok(());
    }
    debug!(%issue, ?actions, "Running issue actions");

    if !actions.add_labels.is_empty() {
        tracker.add_labels(issue, &actions.add_labels).await?;
    }

    for label in &actions.remove_labels {
        if let Err(e) = tracker.remove_label(issue, label).await {
            warn!(%issue, %label, error = %e, "Could not remove label");
        }
    }

    if !actions.add_assignees.is_empty() {
        tracker.add_assignees(issue, &actions.add_assignees).await?;
    }

    if !actions.remove_assignees.is_empty() {
        if let Err(e) = tracker.remove_assignees(issue, &actions.remove_assignees).await {
            warn!(%issue, assignees = ?actions.remove_assignees, error = %e, "Could not remove assignees");
        }
    }

    if let Some(state) = actions.set_state {
        tracker.edit_issue(issue, &IssueEdit::state(state)).await?;
    }

    Ok(())
}
