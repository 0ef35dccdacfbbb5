use k8s_openapi::api::apps::v1::DaemonSet;

use super::{NamespacedName, RolloutStatus, StatusError};

const ROLLING_UPDATE: &str = "RollingUpdate";

pub(super) fn status(daemon: &DaemonSet, name: &NamespacedName) -> Result<RolloutStatus, StatusError> {
    // The API server defaults an unset strategy to RollingUpdate
    let strategy = daemon
        .spec
        .as_ref()
        .and_then(|spec| spec.update_strategy.as_ref())
        .and_then(|strategy| strategy.type_.as_deref())
        .unwrap_or(ROLLING_UPDATE);
    if strategy != ROLLING_UPDATE {
        return Err(StatusError::DaemonSetStrategy);
    }

    let generation = daemon.metadata.generation.unwrap_or_default();
    let status = daemon.status.clone().unwrap_or_default();

    if generation > status.observed_generation.unwrap_or_default() {
        return Ok(RolloutStatus::progressing(
            "Waiting for daemon set spec update to be observed...",
        ));
    }

    let desired = status.desired_number_scheduled;
    let updated = status.updated_number_scheduled.unwrap_or_default();
    let available = status.number_available.unwrap_or_default();

    if updated < desired {
        return Ok(RolloutStatus::progressing(format!(
            "Waiting for daemon set \"{name}\" rollout to finish: {updated} out of {desired} new pods have been updated..."
        )));
    }
    if available < desired {
        return Ok(RolloutStatus::progressing(format!(
            "Waiting for daemon set \"{name}\" rollout to finish: {available} of {desired} updated pods are available..."
        )));
    }

    Ok(RolloutStatus::complete(format!(
        "daemon set \"{name}\" successfully rolled out"
    )))
}
