pub mod api;
pub mod driver;
pub mod marker;

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{BatchParameters, GenerationKind};

pub use api::{AdvanceResponse, ApiError, BatchApi, BatchSnapshot, HttpBatchApi};
pub use driver::{BatchProgress, DriverOptions, DriverPhase};
pub use marker::{MarkerStore, ResumptionMarker};

use driver::{run_driver, BatchHandle, Control};

#[derive(Debug)]
pub enum SessionError {
    AlreadyActive(GenerationKind),
    NoActiveBatch(GenerationKind),
    Api(ApiError),
    Marker(std::io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AlreadyActive(kind) => {
                write!(f, "a {} batch is already running", kind.as_str())
            }
            SessionError::NoActiveBatch(kind) => {
                write!(f, "no {} batch to operate on", kind.as_str())
            }
            SessionError::Api(err) => write!(f, "server call failed: {err}"),
            SessionError::Marker(err) => write!(f, "marker store failure: {err}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        SessionError::Api(err)
    }
}

/// A batch found via a resumption marker that is still live server-side.
/// Handed to the caller so the user can choose: pick it back up or discard.
#[derive(Debug, Clone)]
pub struct RecoveredBatch {
    pub marker: ResumptionMarker,
    pub snapshot: BatchSnapshot,
}

/// Client-side coordinator for one signed-in user. Owns at most one driver
/// per generation kind plus the marker files that let a later session find
/// batches this one leaves behind. No global state: drop the session and
/// its drivers stop.
pub struct Session {
    owner_id: Uuid,
    api: Arc<dyn BatchApi>,
    markers: Arc<MarkerStore>,
    options: DriverOptions,
    drivers: DashMap<GenerationKind, BatchHandle>,
}

impl Session {
    pub fn new(
        owner_id: Uuid,
        api: Arc<dyn BatchApi>,
        marker_dir: impl Into<PathBuf>,
        options: DriverOptions,
    ) -> Self {
        Session {
            owner_id,
            api,
            markers: Arc::new(MarkerStore::new(marker_dir)),
            options,
            drivers: DashMap::new(),
        }
    }

    /// Create a batch on the server and start driving it. Rejected locally
    /// when a driver for this kind is still running and by the server when
    /// a record of this kind is still active anywhere.
    pub async fn start(
        &self,
        kind: GenerationKind,
        parameters: BatchParameters,
        target_count: i64,
    ) -> Result<watch::Receiver<BatchProgress>, SessionError> {
        {
            if let Some(handle) = self.drivers.get(&kind) {
                if !handle.task.is_finished() {
                    return Err(SessionError::AlreadyActive(kind));
                }
            }
        }

        let record_id = self
            .api
            .create_batch(kind, &parameters, target_count)
            .await
            .map_err(|e| match e {
                ApiError::AlreadyActive => SessionError::AlreadyActive(kind),
                other => SessionError::Api(other),
            })?;

        let marker = ResumptionMarker {
            queue_record_id: record_id,
            owner_id: self.owner_id,
            kind,
            last_known_produced_count: 0,
            paused: false,
        };
        self.markers.save(&marker).map_err(SessionError::Marker)?;

        tracing::info!(
            queue_record_id = %record_id,
            kind = kind.as_str(),
            target_count,
            "Batch started"
        );

        Ok(self.spawn(kind, record_id, BatchProgress::starting(record_id, kind, target_count)))
    }

    /// Stop scheduling units after the in-flight one, if any. Local only;
    /// the server record stays as it is.
    pub fn pause(&self, kind: GenerationKind) -> Result<(), SessionError> {
        let handle = self
            .drivers
            .get(&kind)
            .ok_or(SessionError::NoActiveBatch(kind))?;

        let _ = handle.control.send(Control::Pause);

        let marker = ResumptionMarker {
            queue_record_id: handle.record_id,
            owner_id: self.owner_id,
            kind,
            last_known_produced_count: handle.progress.borrow().produced_count,
            paused: true,
        };
        self.markers.save(&marker).map_err(SessionError::Marker)?;

        tracing::info!(queue_record_id = %handle.record_id, "Batch paused");

        Ok(())
    }

    /// Continue a paused or parked batch. The stored record is re-read
    /// first and its values win; a driver that exited (quota park,
    /// interruption) is replaced with a fresh one.
    pub async fn resume(
        &self,
        kind: GenerationKind,
    ) -> Result<watch::Receiver<BatchProgress>, SessionError> {
        let (record_id, parked) = {
            let handle = self
                .drivers
                .get(&kind)
                .ok_or(SessionError::NoActiveBatch(kind))?;
            (handle.record_id, handle.task.is_finished())
        };

        let snapshot = self.api.fetch_batch(record_id).await?;

        if snapshot.status.is_terminal() {
            // Finished behind our back; surface the final state and clean up.
            self.markers.clear(self.owner_id, kind);
            let receiver = {
                match self.drivers.get(&kind) {
                    Some(handle) => {
                        let _ = handle.control.send(Control::Cancel);
                        handle.progress_tx.send_modify(|p| {
                            p.status = snapshot.status;
                            p.produced_count = snapshot.produced_count;
                            p.error_count = snapshot.error_count;
                            p.phase = DriverPhase::Stopped;
                        });
                        Some(handle.progress.clone())
                    }
                    None => None,
                }
            };
            self.drivers.remove(&kind);
            return receiver.ok_or(SessionError::NoActiveBatch(kind));
        }

        let marker = ResumptionMarker {
            queue_record_id: record_id,
            owner_id: self.owner_id,
            kind,
            last_known_produced_count: snapshot.produced_count,
            paused: false,
        };
        self.markers.save(&marker).map_err(SessionError::Marker)?;

        if parked {
            tracing::info!(queue_record_id = %record_id, "Respawning parked driver");
            return Ok(self.spawn(kind, record_id, BatchProgress::from_snapshot(&snapshot)));
        }

        let handle = self
            .drivers
            .get(&kind)
            .ok_or(SessionError::NoActiveBatch(kind))?;
        handle.progress_tx.send_modify(|p| {
            p.status = snapshot.status;
            p.produced_count = snapshot.produced_count;
            p.error_count = snapshot.error_count;
            p.phase = DriverPhase::Running;
            p.quota = None;
        });
        let _ = handle.control.send(Control::Run);

        Ok(handle.progress.clone())
    }

    /// Cancel the batch on the server, stop the driver, drop the marker.
    /// Items already produced stay owned by the user.
    pub async fn cancel(&self, kind: GenerationKind) -> Result<BatchSnapshot, SessionError> {
        let record_id = { self.drivers.get(&kind).map(|h| h.record_id) }
            .or_else(|| {
                self.markers
                    .load(self.owner_id, kind)
                    .map(|m| m.queue_record_id)
            })
            .ok_or(SessionError::NoActiveBatch(kind))?;

        let snapshot = self.api.cancel_batch(record_id).await?;

        {
            if let Some(handle) = self.drivers.get(&kind) {
                let _ = handle.control.send(Control::Cancel);
                handle.progress_tx.send_modify(|p| {
                    p.status = snapshot.status;
                    p.produced_count = snapshot.produced_count;
                    p.error_count = snapshot.error_count;
                    p.phase = DriverPhase::Stopped;
                });
            }
        }
        self.drivers.remove(&kind);
        self.markers.clear(self.owner_id, kind);

        tracing::info!(queue_record_id = %record_id, "Batch cancelled");

        Ok(snapshot)
    }

    /// Tear down the local driver without touching the server record or the
    /// marker. Models a page close: the batch stays resumable elsewhere.
    pub fn abandon(&self, kind: GenerationKind) {
        if let Some((_, handle)) = self.drivers.remove(&kind) {
            handle.task.abort();
            tracing::info!(queue_record_id = %handle.record_id, "Batch abandoned locally");
        }
    }

    /// Check for a batch left behind by an earlier session. Stale markers
    /// (record finished or gone) are cleared silently; a live one is handed
    /// back for an explicit resume-or-discard choice.
    pub async fn recover_on_load(
        &self,
        kind: GenerationKind,
    ) -> Result<Option<RecoveredBatch>, SessionError> {
        let Some(marker) = self.markers.load(self.owner_id, kind) else {
            return Ok(None);
        };

        match self.api.fetch_batch(marker.queue_record_id).await {
            Ok(snapshot) if snapshot.status.is_terminal() => {
                self.markers.clear(self.owner_id, kind);
                Ok(None)
            }
            Ok(snapshot) => Ok(Some(RecoveredBatch { marker, snapshot })),
            Err(ApiError::NotFound) => {
                self.markers.clear(self.owner_id, kind);
                Ok(None)
            }
            Err(e) => Err(SessionError::Api(e)),
        }
    }

    /// Pick a recovered batch back up, continuing from the server's
    /// counters rather than the marker's possibly stale ones.
    pub fn resume_recovered(
        &self,
        recovered: &RecoveredBatch,
    ) -> Result<watch::Receiver<BatchProgress>, SessionError> {
        let kind = recovered.marker.kind;
        {
            if let Some(handle) = self.drivers.get(&kind) {
                if !handle.task.is_finished() {
                    return Err(SessionError::AlreadyActive(kind));
                }
            }
        }

        let marker = ResumptionMarker {
            last_known_produced_count: recovered.snapshot.produced_count,
            paused: false,
            ..recovered.marker.clone()
        };
        self.markers.save(&marker).map_err(SessionError::Marker)?;

        tracing::info!(
            queue_record_id = %recovered.snapshot.id,
            produced = recovered.snapshot.produced_count,
            "Resuming recovered batch"
        );

        Ok(self.spawn(
            kind,
            recovered.snapshot.id,
            BatchProgress::from_snapshot(&recovered.snapshot),
        ))
    }

    /// Reject a recovered batch: cancel it server-side and drop the marker.
    pub async fn discard_recovered(&self, recovered: &RecoveredBatch) -> Result<(), SessionError> {
        match self.api.cancel_batch(recovered.snapshot.id).await {
            Ok(_) => {}
            // Gone or already finished: discarding is still done.
            Err(ApiError::NotFound) | Err(ApiError::Conflict(_)) => {}
            Err(e) => return Err(SessionError::Api(e)),
        }

        self.markers.clear(self.owner_id, recovered.marker.kind);

        tracing::info!(
            queue_record_id = %recovered.snapshot.id,
            "Recovered batch discarded"
        );

        Ok(())
    }

    pub fn progress(&self, kind: GenerationKind) -> Option<watch::Receiver<BatchProgress>> {
        self.drivers.get(&kind).map(|handle| handle.progress.clone())
    }

    fn spawn(
        &self,
        kind: GenerationKind,
        record_id: Uuid,
        initial: BatchProgress,
    ) -> watch::Receiver<BatchProgress> {
        let (control_tx, control_rx) = watch::channel(Control::Run);
        let (progress_tx, progress_rx) = watch::channel(initial);

        let task = tokio::spawn(run_driver(
            self.api.clone(),
            self.markers.clone(),
            self.owner_id,
            kind,
            record_id,
            control_rx,
            progress_tx.clone(),
            self.options.clone(),
        ));

        self.drivers.insert(
            kind,
            BatchHandle {
                record_id,
                control: control_tx,
                progress_tx,
                progress: progress_rx.clone(),
                task,
            },
        );

        progress_rx
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for entry in self.drivers.iter() {
            entry.value().task.abort();
        }
    }
}
