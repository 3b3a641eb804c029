//! Scheduled sponsor wall refresh.
//!
//! A cron-backed worker forces a rebuild once per day at local midnight,
//! independent of the interval-based staleness check on read paths.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;

use crate::application::wall::WallService;

/// Marker type for the cron-triggered refresh tick.
/// Must implement `From<chrono::DateTime<Tz>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct MidnightRefreshJob;

impl From<chrono::DateTime<chrono::Local>> for MidnightRefreshJob {
    fn from(_: chrono::DateTime<chrono::Local>) -> Self {
        Self
    }
}

/// Context for the scheduled refresh worker.
#[derive(Clone)]
pub struct RefreshContext {
    pub wall: Arc<WallService>,
}

/// Process one scheduled refresh tick. A failed rebuild is logged and the
/// previous artifacts stay in service; the worker itself never fails.
pub async fn process_midnight_refresh_job(
    _job: MidnightRefreshJob,
    ctx: Data<RefreshContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.wall.rebuild().await {
        Ok(()) => {
            tracing::info!(target: "mecenate::jobs", "scheduled refresh completed");
        }
        Err(err) => {
            tracing::warn!(target: "mecenate::jobs", error = %err, "scheduled refresh failed");
        }
    }
    Ok(())
}

/// Cron schedule for the daily refresh: local midnight, `0 0 0 * * *`.
pub fn midnight_refresh_schedule() -> Schedule {
    Schedule::from_str("0 0 0 * * *").expect("invalid cron expression for midnight refresh")
}
