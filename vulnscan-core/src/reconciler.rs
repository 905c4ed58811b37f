//! Recovery for scans that never left PENDING.
//!
//! A scan whose unit failed to launch, or whose unit died before claiming it,
//! stays PENDING forever. The reconciler periodically relaunches units for
//! such scans. It never writes a status itself: the relaunched worker still
//! has to win the PENDING -> RUNNING compare-and-set, so a unit that was
//! merely slow to start cannot cause the scan to run twice.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{LaunchError, Result, ScanError},
    launcher::{ExecutionUnitSpec, JobLauncher},
    store::ScanStore,
};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub relaunched: usize,
    pub already_running: usize,
    pub failed: usize,
}

impl SweepSummary {
    pub fn examined(&self) -> usize {
        self.relaunched + self.already_running + self.failed
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ScanStore>,
    launcher: Arc<dyn JobLauncher>,
    pending_grace: Duration,
    interval: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("pending_grace", &self.pending_grace)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ScanStore>,
        launcher: Arc<dyn JobLauncher>,
        pending_grace: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            launcher,
            pending_grace,
            interval,
        }
    }

    /// Relaunch units for scans PENDING for longer than the grace period.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let grace = TimeDelta::from_std(self.pending_grace).map_err(|err| {
            ScanError::Internal(format!("pending grace out of range: {err}"))
        })?;
        let stale = self.store.list_pending_before(now - grace).await?;

        let mut summary = SweepSummary::default();
        for record in stale {
            let spec = ExecutionUnitSpec::new(record.id, record.image_reference());
            match self.launcher.launch(&spec).await {
                Ok(unit) => {
                    info!(
                        scan_id = %record.id,
                        unit = %unit.name,
                        pending_since = %record.scan_date,
                        "relaunched execution unit for stale scan"
                    );
                    summary.relaunched += 1;
                }
                Err(LaunchError::AlreadyRunning { unit }) => {
                    debug!(scan_id = %record.id, unit = %unit, "unit still running; skipping");
                    summary.already_running += 1;
                }
                Err(err) => {
                    warn!(scan_id = %record.id, error = %err, "relaunch failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Sweep every `interval` until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval = ?self.interval,
                grace = ?self.pending_grace,
                "reconciler started"
            );

            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("reconciler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.sweep().await {
                            Ok(summary) if summary.examined() > 0 => {
                                info!(
                                    relaunched = summary.relaunched,
                                    already_running = summary.already_running,
                                    failed = summary.failed,
                                    "reconciler sweep finished"
                                );
                            }
                            Ok(_) => {}
                            Err(err) => error!(error = %err, "reconciler sweep failed"),
                        }
                    }
                }
            }
        })
    }
}
