use k8s_openapi::api::apps::v1::StatefulSet;

use super::{RolloutStatus, StatusError};

const ON_DELETE: &str = "OnDelete";
const ROLLING_UPDATE: &str = "RollingUpdate";

pub(super) fn status(sts: &StatefulSet) -> Result<RolloutStatus, StatusError> {
    let spec = sts.spec.clone().unwrap_or_default();
    let strategy = spec.update_strategy.unwrap_or_default();

    if strategy.type_.as_deref() == Some(ON_DELETE) {
        return Err(StatusError::OnDeleteStrategy);
    }

    let generation = sts.metadata.generation.unwrap_or_default();
    let status = sts.status.clone().unwrap_or_default();
    let observed = status.observed_generation.unwrap_or_default();

    if observed == 0 || generation > observed {
        return Ok(RolloutStatus::progressing(
            "Waiting for statefulset spec update to be observed...",
        ));
    }

    let ready = status.ready_replicas.unwrap_or_default();
    let updated = status.updated_replicas.unwrap_or_default();

    if let Some(desired) = spec.replicas {
        if ready < desired {
            return Ok(RolloutStatus::progressing(format!(
                "Waiting for {} pods to be ready...",
                desired - ready
            )));
        }
    }

    if strategy.type_.as_deref() == Some(ROLLING_UPDATE) {
        if let Some(rolling_update) = strategy.rolling_update {
            if let (Some(desired), Some(partition)) = (spec.replicas, rolling_update.partition) {
                let target = desired - partition;
                if updated < target {
                    return Ok(RolloutStatus::progressing(format!(
                        "Waiting for partitioned roll out to finish: {updated} out of {target} new pods have been updated..."
                    )));
                }
            }
            return Ok(RolloutStatus::complete(format!(
                "partitioned roll out complete: {updated} new pods have been updated..."
            )));
        }
    }

    let update_revision = status.update_revision.unwrap_or_default();
    let current_revision = status.current_revision.unwrap_or_default();
    if update_revision != current_revision {
        return Ok(RolloutStatus::progressing(format!(
            "waiting for statefulset rolling update to complete {updated} pods at revision {update_revision}..."
        )));
    }

    Ok(RolloutStatus::complete(format!(
        "statefulset rolling update complete {} pods at revision {current_revision}...",
        status.current_replicas.unwrap_or_default()
    )))
}
