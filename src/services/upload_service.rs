//! Upload sync engine.
//!
//! Drains PENDING photos through a bounded worker pool, records the outcome of
//! every attempt on the photo row and gives up after a bounded number of
//! failures. In-flight state lives only in memory, so a crash mid-upload leaves
//! the photo PENDING and it is picked up again on the next run.

use crate::database::{get_with, query_with, Change, Record, Store};
use crate::error::AppError;
use crate::models::{
    EntityType, Photo, PhotoFilter, Project, Track, TrackPoint, UploadStatus, Vehicle,
};
use crate::services::background_sync::{SyncLog, SyncLogEntry};
use crate::services::sync_service;
use chrono::Utc;
use photo_upload::{HealthStatus, ModuleType, UploadApi, UploadError, UploadRequest};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Retry and concurrency limits of the sync engine
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Failed attempts after which a photo is abandoned
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Parallel uploads
    pub workers: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(900),
            workers: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `attempts` failures.
    ///
    /// `base * 2^(attempts-1)` capped at `max_delay`, with random jitter in the
    /// upper half so retries of a failed batch spread out.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let half_ms = ceiling.as_millis() as u64 / 2;
        let jitter_ms = rand::random::<u64>() % (half_ms + 1);
        ceiling - Duration::from_millis(half_ms) + Duration::from_millis(jitter_ms)
    }
}

/// Outcome counts of one `sync_pending` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Uploads started
    pub attempted: usize,
    pub uploaded: usize,
    /// Attempts that failed, including those that led to abandonment
    pub failed: usize,
    pub abandoned: usize,
    /// Due photos skipped because an upload was already running
    pub skipped_in_flight: usize,
}

enum Outcome {
    Finished(Result<(), UploadError>),
    Cancelled,
}

enum Claim {
    /// The caller owns the upload until it releases the claim
    Acquired(oneshot::Receiver<()>),
    InFlight,
    Stopped,
}

/// Claims owned by one `sync_pending` run. Whatever is still held when the run
/// ends, including after a panicked upload task, is released on drop.
struct HeldClaims<'a> {
    engine: &'a SyncEngine,
    ids: HashSet<Uuid>,
}

impl<'a> HeldClaims<'a> {
    fn new(engine: &'a SyncEngine) -> Self {
        Self {
            engine,
            ids: HashSet::new(),
        }
    }

    fn hold(&mut self, photo_id: Uuid) {
        self.ids.insert(photo_id);
    }

    fn release(&mut self, photo_id: Uuid) {
        if self.ids.remove(&photo_id) {
            self.engine.release(photo_id);
        }
    }
}

impl Drop for HeldClaims<'_> {
    fn drop(&mut self) {
        for photo_id in self.ids.drain() {
            self.engine.release(photo_id);
        }
    }
}

/// Runs and tracks photo uploads.
///
/// Shared as `Arc<SyncEngine>` between the capture coordinator, the background
/// loop and the UI.
pub struct SyncEngine {
    store: Store,
    api: Arc<dyn UploadApi>,
    policy: RetryPolicy,
    /// Claimed photos. The sender is taken once the upload was asked to stop,
    /// the entry stays until the owning run has written the outcome.
    in_flight: Mutex<HashMap<Uuid, Option<oneshot::Sender<()>>>>,
    wake: Notify,
    shutdown: watch::Sender<bool>,
    progress: watch::Sender<(usize, usize)>,
    session_log: SyncLog,
}

impl SyncEngine {
    pub fn new(store: Store, api: Arc<dyn UploadApi>, policy: RetryPolicy) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (progress, _) = watch::channel((0, 0));
        Self {
            store,
            api,
            policy,
            in_flight: Mutex::new(HashMap::new()),
            wake: Notify::new(),
            shutdown,
            progress,
            session_log: SyncLog::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Asks the background loop to run soon. Never blocks.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn woken(&self) {
        self.wake.notified().await
    }

    /// Upload progress of the running batch as `(finished, total)`
    pub fn subscribe_progress(&self) -> watch::Receiver<(usize, usize)> {
        self.progress.subscribe()
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn session_log(&self) -> &SyncLog {
        &self.session_log
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Uploads sync is allowed to run. Stored settings win over the config file.
    fn sync_allowed(&self) -> Result<bool, AppError> {
        let settings = self.store.read(sync_service::load_sync_settings)?;
        Ok(match settings {
            Some(settings) => settings.is_configured(),
            None => true,
        })
    }

    /// Uploads every due PENDING photo once.
    pub async fn sync_pending(&self) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::default();

        if self.is_stopped() {
            log::debug!("Sync engine stopped, skipping upload run");
            return Ok(report);
        }
        if !self.sync_allowed()? {
            log::debug!("Sync disabled, skipping photo upload");
            return Ok(report);
        }

        let due = self.store.read(|conn| load_due_photos(conn))?;
        let total = due.len();
        if total == 0 {
            return Ok(report);
        }
        log::info!("Found {} photos to upload", total);

        let mut finished = 0;
        self.progress.send_replace((0, total));

        // Declared first so the join set (and its tasks) is dropped before the claims
        let mut claims = HeldClaims::new(self);
        let mut join_set: JoinSet<(Photo, Outcome)> = JoinSet::new();

        for photo in due {
            if self.is_stopped() {
                break;
            }

            // Limit concurrent uploads
            while join_set.len() >= self.policy.workers.max(1) {
                if let Some(result) = join_set.join_next().await {
                    self.handle_result(result, &mut claims, &mut report);
                    finished += 1;
                    self.progress.send_replace((finished, total));
                }
            }

            let cancel_rx = match self.claim(photo.id) {
                Claim::Acquired(rx) => rx,
                Claim::InFlight => {
                    report.skipped_in_flight += 1;
                    continue;
                }
                Claim::Stopped => break,
            };
            claims.hold(photo.id);

            // Another run may have finished this photo since it was loaded
            let photo = match self.store.get::<Photo>(photo.id) {
                Ok(Some(current)) if current.upload_status == UploadStatus::Pending => current,
                Ok(_) => {
                    claims.release(photo.id);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let request = match self.store.read(|conn| upload_request_for(conn, &photo)) {
                Ok(request) => request,
                Err(AppError::NotFound(what)) => {
                    log::warn!("Photo {} has no owner ({} missing), abandoning", photo.id, what);
                    self.record_failure(&photo, &format!("{} not found", what), true, &mut report);
                    claims.release(photo.id);
                    continue;
                }
                Err(e) => return Err(e),
            };

            report.attempted += 1;
            let api = self.api.clone();
            join_set.spawn(async move {
                tokio::select! {
                    result = api.upload_photo(&request) => {
                        (photo, Outcome::Finished(result.map(|_| ())))
                    }
                    Ok(()) = cancel_rx => (photo, Outcome::Cancelled),
                }
            });
        }

        // Wait for remaining uploads
        while let Some(result) = join_set.join_next().await {
            self.handle_result(result, &mut claims, &mut report);
            finished += 1;
            self.progress.send_replace((finished, total));
        }
        self.progress.send_replace((0, 0));

        log::info!(
            "Upload run finished: {} uploaded, {} failed, {} abandoned, {} skipped",
            report.uploaded,
            report.failed,
            report.abandoned,
            report.skipped_in_flight
        );
        Ok(report)
    }

    /// Marks a photo as in flight
    fn claim(&self, photo_id: Uuid) -> Claim {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return Claim::InFlight;
        };
        // Checked under the lock so `cancel_all` cannot miss a new claim
        if self.is_stopped() {
            return Claim::Stopped;
        }
        if in_flight.contains_key(&photo_id) {
            return Claim::InFlight;
        }
        let (tx, rx) = oneshot::channel();
        in_flight.insert(photo_id, Some(tx));
        Claim::Acquired(rx)
    }

    fn release(&self, photo_id: Uuid) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&photo_id);
        }
    }

    fn handle_result(
        &self,
        result: Result<(Photo, Outcome), tokio::task::JoinError>,
        claims: &mut HeldClaims<'_>,
        report: &mut SyncReport,
    ) {
        let (photo, outcome) = match result {
            Ok(done) => done,
            Err(e) => {
                // The photo stays PENDING, its claim is released when the run ends
                log::error!("Upload task failed: {}", e);
                return;
            }
        };

        match outcome {
            Outcome::Finished(Ok(())) => {
                match self.mark_uploaded(&photo) {
                    Ok(true) => {
                        report.uploaded += 1;
                        log::info!("Uploaded photo {}", photo.file_name);
                    }
                    Ok(false) => {
                        log::debug!("Photo {} was already uploaded or deleted", photo.id)
                    }
                    Err(e) => log::error!("Failed to mark photo {} uploaded: {}", photo.id, e),
                }
            }
            Outcome::Finished(Err(e)) => {
                log::warn!("Upload of photo {} failed: {}", photo.id, e);
                self.record_failure(&photo, &e.to_string(), !e.is_retryable(), report);
            }
            Outcome::Cancelled => {
                log::info!("Upload of photo {} cancelled", photo.id);
            }
        }

        // Only now may another run pick the photo up
        claims.release(photo.id);
    }

    /// Sets the uploaded flag. Returns false if nothing changed.
    fn mark_uploaded(&self, photo: &Photo) -> Result<bool, AppError> {
        self.store.transaction(|conn, changes| {
            let updated = conn.execute(
                "UPDATE photos
                 SET is_uploaded = 1, upload_status = 'UPLOADED', last_error = NULL, next_attempt_at = NULL
                 WHERE id = ?1 AND is_uploaded = 0",
                [photo.id.to_string()],
            )?;
            if updated > 0 {
                changes.push(Change::of(photo));
            }
            Ok(updated > 0)
        })
    }

    fn record_failure(&self, photo: &Photo, error: &str, permanent: bool, report: &mut SyncReport) {
        let attempts = photo.upload_attempts + 1;
        let abandon = permanent || attempts >= self.policy.max_attempts;
        let (status, next_attempt_at) = if abandon {
            (UploadStatus::Abandoned, None)
        } else {
            let delay = self.policy.backoff(attempts);
            let next = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
                .unwrap_or_else(Utc::now);
            (UploadStatus::Pending, Some(next))
        };

        let written = self.store.transaction(|conn, changes| {
            let updated = conn.execute(
                "UPDATE photos
                 SET upload_attempts = ?2, last_error = ?3, upload_status = ?4, next_attempt_at = ?5
                 WHERE id = ?1 AND is_uploaded = 0",
                (photo.id.to_string(), attempts, error, status, next_attempt_at),
            )?;
            if updated > 0 {
                changes.push(Change::of(photo));
            }
            Ok(updated > 0)
        });

        match written {
            Ok(true) => {
                report.failed += 1;
                if abandon {
                    report.abandoned += 1;
                    log::warn!(
                        "Abandoned upload of photo {} after {} attempts",
                        photo.id,
                        attempts
                    );
                }
            }
            Ok(false) => {}
            Err(e) => log::error!("Failed to record upload failure of {}: {}", photo.id, e),
        }
    }

    /// Aborts the in-flight upload of one photo. The photo stays PENDING.
    pub fn cancel(&self, photo_id: Uuid) -> bool {
        let sender = self
            .in_flight
            .lock()
            .ok()
            .and_then(|mut in_flight| in_flight.get_mut(&photo_id).and_then(Option::take));
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                log::debug!("Cancelling upload of photo {}", photo_id);
                true
            }
            None => false,
        }
    }

    /// Aborts every in-flight upload and stops the background loop
    pub fn cancel_all(&self) {
        self.shutdown.send_replace(true);
        let senders: Vec<oneshot::Sender<()>> = match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.values_mut().filter_map(Option::take).collect(),
            Err(_) => Vec::new(),
        };
        log::info!("Stopping sync, cancelling {} uploads", senders.len());
        for tx in senders {
            let _ = tx.send(());
        }
    }

    /// Puts an abandoned photo back into the queue with a fresh attempt budget
    pub fn retry_abandoned(&self, photo_id: Uuid) -> Result<(), AppError> {
        self.store.transaction(|conn, changes| {
            let photo = get_with::<Photo>(conn, photo_id)?
                .ok_or_else(|| AppError::NotFound("Photo".to_string()))?;
            if photo.upload_status != UploadStatus::Abandoned {
                return Err(AppError::Validation(format!(
                    "Photo upload is {}, not ABANDONED",
                    photo.upload_status
                )));
            }
            conn.execute(
                "UPDATE photos
                 SET upload_status = 'PENDING', upload_attempts = 0, last_error = NULL, next_attempt_at = NULL
                 WHERE id = ?1",
                [photo_id.to_string()],
            )?;
            changes.push(Change::of(&photo));
            Ok(())
        })?;
        log::info!("Photo {} queued for upload again", photo_id);
        self.wake();
        Ok(())
    }

    /// `retry_abandoned` for every abandoned photo
    pub fn retry_all_abandoned(&self) -> Result<usize, AppError> {
        let count = self.store.transaction(|conn, changes| {
            let abandoned = query_with::<Photo>(
                conn,
                &PhotoFilter::with_status(UploadStatus::Abandoned),
            )?;
            conn.execute(
                "UPDATE photos
                 SET upload_status = 'PENDING', upload_attempts = 0, last_error = NULL, next_attempt_at = NULL
                 WHERE upload_status = 'ABANDONED'",
                [],
            )?;
            changes.extend(abandoned.iter().map(Change::of));
            Ok(abandoned.len())
        })?;
        if count > 0 {
            self.wake();
        }
        Ok(count)
    }

    /// Removes all remote photos of a module. Failures are logged, never returned.
    pub async fn delete_remote_photos(&self, module_id: &str, module_type: ModuleType) -> bool {
        if !matches!(self.sync_allowed(), Ok(true)) {
            log::debug!("Sync disabled, not deleting remote photos of {}", module_id);
            return false;
        }
        match self.api.delete_module_photos(module_id, module_type).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Remote delete of {} {} failed: {}",
                    module_type,
                    module_id,
                    e
                );
                false
            }
        }
    }

    pub async fn test_connection(&self) -> Result<HealthStatus, AppError> {
        let status = self.api.test_connection().await?;
        log::info!("Upload server answered: {} ({})", status.status, status.message);
        Ok(status)
    }

    /// Appends a finished run to the session log and stamps the last sync time
    pub fn record_cycle(&self, report: &SyncReport) {
        self.session_log.append(SyncLogEntry {
            ts_ms: Utc::now().timestamp_millis(),
            photos_uploaded: report.uploaded,
            photos_failed: report.failed,
            photos_abandoned: report.abandoned,
        });
        if report.uploaded > 0 {
            if let Err(e) = self.store.read(sync_service::update_last_sync) {
                log::warn!("Failed to store last sync time: {}", e);
            }
        }
    }
}

/// PENDING photos whose retry time has come, oldest first
fn load_due_photos(conn: &Connection) -> Result<Vec<Photo>, AppError> {
    let sql = format!(
        "SELECT {} FROM photos
         WHERE is_uploaded = 0 AND upload_status = 'PENDING'
           AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
         ORDER BY timestamp ASC, rowid ASC",
        Photo::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let photos = stmt
        .query_map([Utc::now()], |row| Photo::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(photos)
}

/// Server module a photo is filed under.
///
/// Track point photos go to the module of their track.
pub fn module_of(conn: &Connection, photo: &Photo) -> Result<(String, ModuleType, Project), AppError> {
    let missing = |what: &str| AppError::NotFound(what.to_string());

    match photo.entity_type {
        EntityType::Project => {
            let project = get_with::<Project>(conn, photo.entity_id)?
                .ok_or_else(|| missing("Project"))?;
            Ok((project.id.to_string(), ModuleType::Project, project))
        }
        EntityType::Vehicle => {
            let vehicle = get_with::<Vehicle>(conn, photo.entity_id)?
                .ok_or_else(|| missing("Vehicle"))?;
            let project = get_with::<Project>(conn, vehicle.project_id)?
                .ok_or_else(|| missing("Project"))?;
            Ok((vehicle.id.to_string(), ModuleType::Vehicle, project))
        }
        EntityType::TrackPoint => {
            let point = get_with::<TrackPoint>(conn, photo.entity_id)?
                .ok_or_else(|| missing("Track point"))?;
            let track = get_with::<Track>(conn, point.track_id)?
                .ok_or_else(|| missing("Track"))?;
            let vehicle = get_with::<Vehicle>(conn, track.vehicle_id)?
                .ok_or_else(|| missing("Vehicle"))?;
            let project = get_with::<Project>(conn, vehicle.project_id)?
                .ok_or_else(|| missing("Project"))?;
            Ok((track.id.to_string(), ModuleType::Track, project))
        }
    }
}

fn upload_request_for(conn: &Connection, photo: &Photo) -> Result<UploadRequest, AppError> {
    let (module_id, module_type, project) = module_of(conn, photo)?;
    Ok(UploadRequest {
        file_path: PathBuf::from(&photo.path),
        file_name: photo.file_name.clone(),
        module_id,
        module_type,
        photo_type: photo.photo_type.as_str().to_string(),
        project_name: Some(project.name),
        latitude: photo.latitude,
        longitude: photo.longitude,
    })
}
