//! Collection bootstrap: indexes and startup self-cleanup.

use crate::fields;
use sprocket_interfaces::{BackendError, DocumentCollection, Filter, IndexSpec};
use std::sync::Arc;
use tracing::{debug, info};

/// Ensure the indexes the coordination protocol relies on, then
/// recover from an unclean prior shutdown of this node by deleting its
/// own leftover locks. Other nodes' locks are left to expiry.
pub(crate) async fn initialize_collections(
    jobs: &Arc<dyn DocumentCollection>,
    triggers: &Arc<dyn DocumentCollection>,
    locks: &Arc<dyn DocumentCollection>,
    calendars: &Arc<dyn DocumentCollection>,
    instance_id: &str,
) -> Result<(), BackendError> {
    // Group leads the compound key so a group-only matcher can use the
    // same index.
    let key_index = IndexSpec::new(fields::KEY_INDEX, &[fields::GROUP, fields::NAME], true);
    jobs.ensure_index(&key_index).await?;
    triggers.ensure_index(&key_index).await?;
    locks.ensure_index(&key_index).await?;

    // Startup self-cleanup scans by instance id.
    locks
        .ensure_index(&IndexSpec::new(
            fields::LOCK_INSTANCE_INDEX,
            &[fields::INSTANCE_ID],
            false,
        ))
        .await?;

    calendars
        .ensure_index(&IndexSpec::new(
            fields::CALENDAR_NAME_INDEX,
            &[fields::NAME],
            true,
        ))
        .await?;

    let removed = locks
        .delete_many(&Filter::eq(fields::INSTANCE_ID, instance_id))
        .await?;
    if removed > 0 {
        info!(instance = instance_id, count = removed, "removed own locks left by a prior run");
    }

    // Earlier layouts indexed name before group; drop those when
    // present and ignore the failure when they are already gone.
    for collection in [jobs, triggers, locks] {
        if let Err(err) = collection.drop_index(fields::LEGACY_KEY_INDEX).await {
            debug!(error = %err, "legacy key index not dropped");
        }
    }

    Ok(())
}
