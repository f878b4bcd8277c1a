//! Retention sweep: expire old fields, object first, catalog row second.

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use metget_common::{MetGetResult, Service};
use storage::{Catalog, ObjectStorage};

const SWEEP_BATCH: i64 = 500;

/// Delete fields whose valid time fell behind the retention horizon.
/// Returns the number of rows removed.
#[instrument(skip(catalog, store), fields(service = %service))]
pub async fn sweep(
    catalog: &Catalog,
    store: &ObjectStorage,
    service: Service,
    retention_days: i64,
) -> MetGetResult<u64> {
    if service.is_track() {
        // Track rows are tiny and re-issued in place; nothing to sweep.
        return Ok(0);
    }

    let cutoff = Utc::now() - Duration::days(retention_days);
    let mut removed = 0u64;

    loop {
        let expired = catalog.expired_fields(service, cutoff, SWEEP_BATCH).await?;
        if expired.is_empty() {
            break;
        }

        let mut progressed = false;
        for row in &expired {
            // Object first: a dangling catalog row is recoverable, a
            // dangling pointer into the store is not.
            if let Err(e) = store.delete(&row.filepath).await {
                warn!(key = %row.filepath, error = %e, "Delete failed, row kept");
                continue;
            }
            removed += catalog.delete_field(service, &row.filepath).await?;
            progressed = true;
        }

        // Stuck rows would make the next batch identical.
        if !progressed || (expired.len() as i64) < SWEEP_BATCH {
            break;
        }
    }

    info!(removed = removed, "Swept expired fields");
    Ok(removed)
}
