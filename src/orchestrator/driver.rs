use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::api::{ApiError, BatchApi, BatchSnapshot};
use super::marker::{MarkerStore, ResumptionMarker};
use crate::models::{BatchStatus, GenerationKind};

/// Where the driver currently is. `Stopped` covers every clean exit:
/// completion, cancellation, and a record that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Running,
    Paused,
    QuotaBlocked,
    Interrupted,
    Stopped,
}

/// Everything a progress surface needs to render one batch. Published on a
/// watch channel after every unit call; the latest value always wins.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub queue_record_id: Uuid,
    pub kind: GenerationKind,
    pub status: BatchStatus,
    pub produced_count: i64,
    pub target_count: i64,
    pub error_count: i64,
    pub phase: DriverPhase,
    pub last_unit_failed: bool,
    /// (used, limit) of the exhausted quota while the driver is parked.
    pub quota: Option<(i64, i64)>,
}

impl BatchProgress {
    pub(super) fn starting(record_id: Uuid, kind: GenerationKind, target_count: i64) -> Self {
        BatchProgress {
            queue_record_id: record_id,
            kind,
            status: BatchStatus::Pending,
            produced_count: 0,
            target_count,
            error_count: 0,
            phase: DriverPhase::Running,
            last_unit_failed: false,
            quota: None,
        }
    }

    pub(super) fn from_snapshot(snapshot: &BatchSnapshot) -> Self {
        BatchProgress {
            queue_record_id: snapshot.id,
            kind: snapshot.kind,
            status: snapshot.status,
            produced_count: snapshot.produced_count,
            target_count: snapshot.target_count,
            error_count: snapshot.error_count,
            phase: DriverPhase::Running,
            last_unit_failed: false,
            quota: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Breather between unit calls so a batch does not hammer the server.
    pub unit_delay: Duration,
    /// Consecutive failed calls before the driver parks as Interrupted.
    pub max_transport_failures: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            unit_delay: Duration::from_millis(400),
            max_transport_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Control {
    Run,
    Pause,
    Cancel,
}

/// A live (or parked) driver for one batch, held by the session.
pub(super) struct BatchHandle {
    pub record_id: Uuid,
    pub control: watch::Sender<Control>,
    pub progress_tx: watch::Sender<BatchProgress>,
    pub progress: watch::Receiver<BatchProgress>,
    pub task: JoinHandle<()>,
}

/// Single task that walks one batch to a terminal state. All waiting goes
/// through `tokio::select!` over the control channel and the unit delay,
/// so pause and cancel take effect between units, never mid-request.
pub(super) async fn run_driver(
    api: Arc<dyn BatchApi>,
    markers: Arc<MarkerStore>,
    owner_id: Uuid,
    kind: GenerationKind,
    record_id: Uuid,
    mut control: watch::Receiver<Control>,
    progress: watch::Sender<BatchProgress>,
    options: DriverOptions,
) {
    let mut transport_failures: u32 = 0;

    loop {
        let directive = *control.borrow_and_update();
        match directive {
            Control::Cancel => {
                set_phase(&progress, DriverPhase::Stopped);
                return;
            }
            Control::Pause => {
                set_phase(&progress, DriverPhase::Paused);
                loop {
                    if control.changed().await.is_err() {
                        return;
                    }
                    if *control.borrow_and_update() != Control::Pause {
                        break;
                    }
                }
                continue;
            }
            Control::Run => {}
        }

        match api.advance_unit(record_id).await {
            Ok(response) => {
                transport_failures = 0;
                let finished = response.status.is_terminal();

                progress.send_modify(|p| {
                    p.status = response.status;
                    p.produced_count = response.produced_count;
                    p.target_count = response.target_count;
                    p.error_count = response.error_count;
                    p.last_unit_failed = response.item_failed;
                    p.quota = None;
                    p.phase = if finished {
                        DriverPhase::Stopped
                    } else {
                        DriverPhase::Running
                    };
                });

                if finished {
                    markers.clear(owner_id, kind);
                    tracing::info!(
                        queue_record_id = %record_id,
                        status = ?response.status,
                        produced = response.produced_count,
                        errors = response.error_count,
                        "Batch finished"
                    );
                    return;
                }

                // A pause may have landed while this unit was in flight;
                // the refreshed marker must not erase it.
                let refreshed = ResumptionMarker {
                    queue_record_id: record_id,
                    owner_id,
                    kind,
                    last_known_produced_count: response.produced_count,
                    paused: *control.borrow() == Control::Pause,
                };
                if let Err(e) = markers.save(&refreshed) {
                    tracing::warn!(
                        queue_record_id = %record_id,
                        error = %e,
                        "Failed to refresh resumption marker"
                    );
                }
            }
            Err(ApiError::QuotaExceeded { used, limit }) => {
                // Park with the marker in place; resume after the window
                // resets continues the same record.
                progress.send_modify(|p| {
                    p.phase = DriverPhase::QuotaBlocked;
                    p.quota = Some((used, limit));
                });
                tracing::warn!(
                    queue_record_id = %record_id,
                    used,
                    limit,
                    "Quota exhausted, parking batch"
                );
                return;
            }
            Err(ApiError::NotFound) => {
                markers.clear(owner_id, kind);
                set_phase(&progress, DriverPhase::Stopped);
                tracing::warn!(queue_record_id = %record_id, "Batch record missing, stopping");
                return;
            }
            Err(err) => {
                transport_failures += 1;
                tracing::warn!(
                    queue_record_id = %record_id,
                    attempt = transport_failures,
                    error = %err,
                    "Unit call failed"
                );

                // The unit may have landed before the connection broke;
                // the stored record is the truth, so reconcile from it.
                if let Ok(snapshot) = api.fetch_batch(record_id).await {
                    progress.send_modify(|p| {
                        p.status = snapshot.status;
                        p.produced_count = snapshot.produced_count;
                        p.error_count = snapshot.error_count;
                    });
                    if snapshot.status.is_terminal() {
                        markers.clear(owner_id, kind);
                        set_phase(&progress, DriverPhase::Stopped);
                        return;
                    }
                }

                if transport_failures >= options.max_transport_failures {
                    set_phase(&progress, DriverPhase::Interrupted);
                    tracing::warn!(
                        queue_record_id = %record_id,
                        "Driver interrupted after repeated failures"
                    );
                    return;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(options.unit_delay) => {}
            _ = control.changed() => {}
        }
    }
}

fn set_phase(progress: &watch::Sender<BatchProgress>, phase: DriverPhase) {
    progress.send_modify(|p| p.phase = phase);
}
