//! ETA prediction (§4.6): `predicted = (Σduration / Σamount) × current_amount`
//! against the `stats` table, keyed by [`StatType`]. Each phase handler
//! records its own observation once it completes and, before starting,
//! writes a prediction for the work it's about to do.

use std::sync::Arc;

use kiwi_core::domain::StatType;
use kiwi_store::GraphStore;

use crate::error::Result;

/// Writes `BatchStatus.estimated_duration_ms` from the historical average for
/// `stat_type`, scaled to `current_amount`. A cold `stats` table (no rows yet
/// for this `stat_type`) leaves the estimate unset rather than guessing.
pub async fn estimate(
    store: &Arc<GraphStore>,
    stat_type: StatType,
    current_amount: f64,
    correlation_id: &str,
    batch_id: i32,
) -> Result<()> {
    if let Some(estimated_ms) = store.predict_duration_ms(stat_type, current_amount).await? {
        store.set_batch_estimated_duration(correlation_id, batch_id, estimated_ms).await?;
    }
    Ok(())
}

/// Records one completed phase's actual cost for future predictions.
pub async fn record(store: &Arc<GraphStore>, stat_type: StatType, amount: f64, duration_ms: i64) -> Result<()> {
    store.record_stat(stat_type, amount, duration_ms).await?;
    Ok(())
}
