//! Photo capture coordinator.
//!
//! A capture is validated against the owning entity and the track lifecycle,
//! gets the next sequence number for its (entity, photo type) pair, is written
//! to disk and then recorded. Sequence allocation, file write and insert run
//! under a per-(entity, photo type) lock; the UNIQUE index on the photo table
//! catches writers outside this process.

use crate::camera::{import_file, write_bytes, CameraService, CaptureFailure, ImageSource};
use crate::database::{get_with, Change, EntityKind, Record, Store, Subscription};
use crate::error::AppError;
use crate::filesystem::{entity_dir, photo_file_name, remove_photo_file};
use crate::models::{
    validate_coordinates, EntityRef, EntityType, Photo, PhotoFilter, PhotoType, PointType,
    Project, Track, TrackPoint, TrackState, UploadStatus, Vehicle,
};
use crate::services::track_service::adjust_photo_counter;
use crate::services::upload_service::SyncEngine;
use chrono::Utc;
use photo_upload::ModuleType;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Re-allocations after a sequence conflict before giving up
const MAX_SEQUENCE_RETRIES: u32 = 5;

type CaptureKey = (Uuid, PhotoType);

/// Owner details needed to name and count a photo
struct CaptureContext {
    name_prefix: Vec<String>,
    track: Option<TrackLink>,
}

struct TrackLink {
    track_id: Uuid,
    vehicle_id: Uuid,
    point_type: PointType,
}

pub struct PhotoService {
    store: Store,
    camera: Arc<dyn CameraService>,
    photo_dir: PathBuf,
    sync: Option<Arc<SyncEngine>>,
    capture_locks: Mutex<HashMap<CaptureKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl PhotoService {
    pub fn new(store: Store, camera: Arc<dyn CameraService>, photo_dir: PathBuf) -> Self {
        Self {
            store,
            camera,
            photo_dir,
            sync: None,
            capture_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wakes `engine` after captures and cancels its uploads on delete
    pub fn with_sync(mut self, engine: Arc<SyncEngine>) -> Self {
        self.sync = Some(engine);
        self
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    pub async fn capture(
        &self,
        entity: EntityRef,
        photo_type: PhotoType,
        source: ImageSource,
    ) -> Result<Photo, AppError> {
        self.capture_with_location(entity, photo_type, source, None)
            .await
    }

    /// Captures a photo and records it for upload.
    ///
    /// `location` is the `(latitude, longitude)` where the picture was taken.
    pub async fn capture_with_location(
        &self,
        entity: EntityRef,
        photo_type: PhotoType,
        source: ImageSource,
        location: Option<(f64, f64)>,
    ) -> Result<Photo, AppError> {
        if let Some((latitude, longitude)) = location {
            validate_coordinates(latitude, longitude)?;
        }

        let context = self
            .store
            .read(|conn| resolve_context(conn, entity, photo_type))?;

        let lock = self.capture_lock((entity.id(), photo_type))?;
        let guard = lock.lock().await;

        let dir = entity_dir(&self.photo_dir, entity);
        let sequence = self
            .store
            .read(|conn| next_photo_sequence(conn, entity, photo_type))?;
        let mut path = dir.join(photo_file_name(&context.name_prefix, photo_type, sequence));

        self.acquire_image(&source, &path).await.map_err(|e| {
            log::error!("Capture for {} failed: {}", entity, e);
            AppError::StorageFailure(e.to_string())
        })?;

        let result = self
            .record_capture(entity, photo_type, &context, sequence, location, &mut path)
            .await;

        drop(guard);
        drop(lock);
        self.prune_locks();

        match result {
            Ok(photo) => {
                log::info!(
                    "Captured {} #{} for {}",
                    photo.photo_type,
                    photo.sequence,
                    entity
                );
                if let Some(sync) = &self.sync {
                    sync.wake();
                }
                Ok(photo)
            }
            Err(e) => {
                // No record, so no file either
                if let Err(remove_err) = remove_photo_file(&path).await {
                    log::warn!("Could not remove {}: {}", path.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    /// Inserts the photo record, re-allocating the sequence on conflicts.
    /// `path` follows the file when it is renamed.
    async fn record_capture(
        &self,
        entity: EntityRef,
        photo_type: PhotoType,
        context: &CaptureContext,
        mut sequence: i64,
        location: Option<(f64, f64)>,
        path: &mut PathBuf,
    ) -> Result<Photo, AppError> {
        let timestamp = Utc::now();
        let mut retries = 0;

        loop {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let photo = Photo {
                id: Uuid::new_v4(),
                entity_id: entity.id(),
                entity_type: entity.entity_type(),
                photo_type,
                path: path.to_string_lossy().into_owned(),
                file_name,
                sequence,
                timestamp,
                latitude: location.map(|(lat, _)| lat),
                longitude: location.map(|(_, lon)| lon),
                is_uploaded: false,
                upload_status: UploadStatus::Pending,
                upload_attempts: 0,
                last_error: None,
                next_attempt_at: None,
            };

            match self
                .store
                .transaction(|conn, changes| insert_captured(conn, changes, &photo))
            {
                Ok(()) => return Ok(photo),
                Err(e) if e.is_unique_violation() => {
                    if retries >= MAX_SEQUENCE_RETRIES {
                        return Err(AppError::SequenceConflict(format!(
                            "No free sequence for {} {} after {} retries",
                            entity, photo_type, retries
                        )));
                    }
                    retries += 1;

                    let next = self
                        .store
                        .read(|conn| next_photo_sequence(conn, entity, photo_type))?;
                    sequence = next.max(sequence + 1);
                    let renamed = path.with_file_name(photo_file_name(
                        &context.name_prefix,
                        photo_type,
                        sequence,
                    ));
                    tokio::fs::rename(&*path, &renamed)
                        .await
                        .map_err(|e| AppError::StorageFailure(e.to_string()))?;
                    log::warn!(
                        "Sequence conflict for {} {}, retrying as #{}",
                        entity,
                        photo_type,
                        sequence
                    );
                    *path = renamed;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn acquire_image(&self, source: &ImageSource, target: &Path) -> Result<(), CaptureFailure> {
        match source {
            ImageSource::Camera => {
                let written = self.camera.capture(target).await?;
                if written != target {
                    tokio::fs::rename(&written, target).await?;
                }
            }
            ImageSource::File(source) => {
                import_file(source, target).await?;
            }
            ImageSource::Bytes(data) => {
                write_bytes(data, target).await?;
            }
        }
        Ok(())
    }

    fn capture_lock(&self, key: CaptureKey) -> Result<Arc<tokio::sync::Mutex<()>>, AppError> {
        let mut locks = self
            .capture_locks
            .lock()
            .map_err(|_| AppError::Other("Capture lock map poisoned".to_string()))?;
        Ok(locks.entry(key).or_default().clone())
    }

    /// Drops locks nobody is waiting on
    fn prune_locks(&self) {
        if let Ok(mut locks) = self.capture_locks.lock() {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
    }

    pub fn get_photo(&self, id: Uuid) -> Result<Photo, AppError> {
        self.store
            .get::<Photo>(id)?
            .ok_or_else(|| AppError::NotFound("Photo".to_string()))
    }

    pub fn list_photos(&self, filter: &PhotoFilter) -> Result<Vec<Photo>, AppError> {
        self.store.query::<Photo>(filter)
    }

    pub fn subscribe_photos(&self, filter: PhotoFilter) -> Subscription<Photo> {
        self.store.subscribe::<Photo>(filter)
    }

    /// Deletes a photo record and its file.
    ///
    /// A running upload of the photo is cancelled first. Local deletion does not
    /// depend on the server.
    pub async fn delete_photo(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(sync) = &self.sync {
            sync.cancel(id);
        }

        let photo = self
            .store
            .transaction(|conn, changes| delete_photo_record(conn, changes, id))?;

        if let Err(e) = remove_photo_file(Path::new(&photo.path)).await {
            log::warn!("Photo {} deleted but file remains: {}", id, e);
        }
        log::info!("Deleted photo {}", photo.file_name);
        Ok(())
    }

    /// Deletes every photo of an entity and asks the server to do the same.
    ///
    /// Track point photos live in the module of their track on the server, so
    /// the remote delete only runs once the whole track has no photos left.
    pub async fn delete_entity_photos(&self, entity: EntityRef) -> Result<usize, AppError> {
        let photos = self.store.query::<Photo>(&PhotoFilter::for_entity(entity))?;
        for photo in &photos {
            self.delete_photo(photo.id).await?;
        }

        if let Some(sync) = &self.sync {
            let remote = match entity {
                EntityRef::Project(id) => Some((id, ModuleType::Project)),
                EntityRef::Vehicle(id) => Some((id, ModuleType::Vehicle)),
                EntityRef::TrackPoint(id) => {
                    let track = self.store.read(|conn| {
                        match get_with::<TrackPoint>(conn, id)? {
                            Some(point) => get_with::<Track>(conn, point.track_id),
                            None => Ok(None),
                        }
                    })?;
                    track
                        .filter(|t| t.total_photo_count() == 0)
                        .map(|t| (t.id, ModuleType::Track))
                }
            };
            if let Some((module_id, module_type)) = remote {
                sync.delete_remote_photos(&module_id.to_string(), module_type)
                    .await;
            }
        }

        Ok(photos.len())
    }
}

/// Checks that `photo_type` may be captured for `entity` right now
fn resolve_context(
    conn: &Connection,
    entity: EntityRef,
    photo_type: PhotoType,
) -> Result<CaptureContext, AppError> {
    if photo_type.entity_type() != entity.entity_type() {
        return Err(AppError::InvalidCaptureContext(format!(
            "{} photos cannot be taken for a {}",
            photo_type,
            entity.entity_type()
        )));
    }

    match entity {
        EntityRef::Project(id) => {
            let project = require::<Project>(conn, id, "Project")?;
            Ok(CaptureContext {
                name_prefix: vec![project.name],
                track: None,
            })
        }
        EntityRef::Vehicle(id) => {
            let vehicle = require::<Vehicle>(conn, id, "Vehicle")?;
            let project = require::<Project>(conn, vehicle.project_id, "Project")?;
            Ok(CaptureContext {
                name_prefix: vec![project.name, vehicle.name],
                track: None,
            })
        }
        EntityRef::TrackPoint(id) => {
            let point = require::<TrackPoint>(conn, id, "Track point")?;
            if photo_type.point_type() != Some(point.point_type) {
                return Err(AppError::InvalidCaptureContext(format!(
                    "{} photos cannot be taken for a {} point",
                    photo_type, point.point_type
                )));
            }

            let track = require::<Track>(conn, point.track_id, "Track")?;
            match track.state() {
                TrackState::NotStarted => {
                    return Err(AppError::InvalidCaptureContext(
                        "Track has not been started".to_string(),
                    ))
                }
                TrackState::Ended if point.point_type != PointType::End => {
                    return Err(AppError::InvalidCaptureContext(
                        "Track has ended, only END point photos can be added".to_string(),
                    ))
                }
                _ => {}
            }

            let vehicle = require::<Vehicle>(conn, track.vehicle_id, "Vehicle")?;
            let project = require::<Project>(conn, vehicle.project_id, "Project")?;
            Ok(CaptureContext {
                name_prefix: vec![
                    project.name,
                    vehicle.name,
                    track.name,
                    format!("P{}", point.sequence),
                ],
                track: Some(TrackLink {
                    track_id: track.id,
                    vehicle_id: vehicle.id,
                    point_type: point.point_type,
                }),
            })
        }
    }
}

fn require<R: Record>(conn: &Connection, id: Uuid, what: &str) -> Result<R, AppError> {
    get_with::<R>(conn, id)?.ok_or_else(|| AppError::NotFound(what.to_string()))
}

/// `max(sequence) + 1` for the (entity, photo type) pair, 0 for the first photo
fn next_photo_sequence(
    conn: &Connection,
    entity: EntityRef,
    photo_type: PhotoType,
) -> Result<i64, AppError> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sequence) FROM photos
         WHERE entity_id = ?1 AND entity_type = ?2 AND photo_type = ?3",
        (entity.id().to_string(), entity.entity_type(), photo_type),
        |row| row.get(0),
    )?;
    Ok(max.map_or(0, |m| m + 1))
}

/// Photo insert plus the derived writes: track counter and project cover
fn insert_captured(
    conn: &Connection,
    changes: &mut Vec<Change>,
    photo: &Photo,
) -> Result<(), AppError> {
    // The owner may have changed while the image was written
    let context = resolve_context(conn, photo.entity_ref(), photo.photo_type)?;

    photo.insert(conn)?;
    changes.push(Change::of(photo));

    if let Some(link) = context.track {
        adjust_photo_counter(conn, link.track_id, link.point_type, 1)?;
        changes.push(Change::new(EntityKind::Track, link.track_id, Some(link.vehicle_id)));
    }

    if photo.entity_type == EntityType::Project && photo.photo_type == PhotoType::Overview {
        // First overview wins
        let updated = conn.execute(
            "UPDATE projects SET cover_photo_path = ?1, updated_at = ?2
             WHERE id = ?3 AND cover_photo_path IS NULL",
            (&photo.path, Utc::now(), photo.entity_id.to_string()),
        )?;
        if updated > 0 {
            changes.push(Change::new(EntityKind::Project, photo.entity_id, None));
        }
    }

    Ok(())
}

fn delete_photo_record(
    conn: &Connection,
    changes: &mut Vec<Change>,
    id: Uuid,
) -> Result<Photo, AppError> {
    let photo = require::<Photo>(conn, id, "Photo")?;
    conn.execute("DELETE FROM photos WHERE id = ?1", [id.to_string()])?;
    changes.push(Change::of(&photo));

    match photo.entity_ref() {
        EntityRef::TrackPoint(point_id) => {
            if let Some(point) = get_with::<TrackPoint>(conn, point_id)? {
                adjust_photo_counter(conn, point.track_id, point.point_type, -1)?;
                if let Some(track) = get_with::<Track>(conn, point.track_id)? {
                    changes.push(Change::of(&track));
                }
            }
        }
        EntityRef::Project(project_id) => {
            // Move the cover to the earliest remaining overview, or clear it
            let updated = conn.execute(
                "UPDATE projects
                 SET cover_photo_path = (
                        SELECT path FROM photos
                        WHERE entity_id = ?1 AND entity_type = 'PROJECT' AND photo_type = 'OVERVIEW'
                        ORDER BY sequence ASC LIMIT 1),
                     updated_at = ?3
                 WHERE id = ?1 AND cover_photo_path = ?2",
                (project_id.to_string(), &photo.path, Utc::now()),
            )?;
            if updated > 0 {
                changes.push(Change::new(EntityKind::Project, project_id, None));
            }
        }
        EntityRef::Vehicle(_) => {}
    }

    Ok(photo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::NoCamera;
    use crate::models::{NewTrackPoint, Vehicle};
    use crate::services::test_support::{FakeUploadApi, Reply};
    use crate::services::upload_service::RetryPolicy;
    use crate::services::{project_service, track_service, vehicle_service};
    use std::time::Duration;
    use tempfile::TempDir;

    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg";

    struct Fixture {
        _dir: TempDir,
        store: Store,
        project: Project,
        vehicle: Vehicle,
        track: Track,
        api: Arc<FakeUploadApi>,
        engine: Arc<SyncEngine>,
        service: Arc<PhotoService>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let project =
            project_service::create_project(&store, "Demo".to_string(), String::new()).unwrap();
        let vehicle = vehicle_service::create_vehicle(
            &store,
            project.id,
            "Van 1".to_string(),
            "M-SV 42".to_string(),
            String::new(),
            String::new(),
        )
        .unwrap();
        let track =
            track_service::create_track(&store, vehicle.id, "Loop".to_string(), 300.0).unwrap();

        let api = Arc::new(FakeUploadApi::new(Reply::Ok));
        let policy = RetryPolicy {
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let engine = Arc::new(SyncEngine::new(store.clone(), api.clone(), policy));
        let service = Arc::new(
            PhotoService::new(store.clone(), Arc::new(NoCamera), dir.path().join("photos"))
                .with_sync(engine.clone()),
        );

        Fixture {
            _dir: dir,
            store,
            project,
            vehicle,
            track,
            api,
            engine,
            service,
        }
    }

    fn bytes() -> ImageSource {
        ImageSource::Bytes(JPEG.to_vec())
    }

    #[tokio::test]
    async fn test_first_overview_becomes_cover() {
        let fx = fixture();
        let project = EntityRef::Project(fx.project.id);

        let first = fx
            .service
            .capture(project, PhotoType::Overview, bytes())
            .await
            .unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.file_name, "Demo_OVERVIEW_0.jpg");
        assert!(Path::new(&first.path).exists());
        let loaded = project_service::get_project(&fx.store, fx.project.id).unwrap();
        assert_eq!(loaded.cover_photo_path.as_deref(), Some(first.path.as_str()));

        let second = fx
            .service
            .capture(project, PhotoType::Overview, bytes())
            .await
            .unwrap();
        assert_eq!(second.sequence, 1);
        let loaded = project_service::get_project(&fx.store, fx.project.id).unwrap();
        assert_eq!(loaded.cover_photo_path.as_deref(), Some(first.path.as_str()));

        // other project photo types never touch the cover
        let doc = fx
            .service
            .capture(project, PhotoType::Document, bytes())
            .await
            .unwrap();
        assert_eq!(doc.sequence, 0);
    }

    #[tokio::test]
    async fn test_concurrent_captures_get_distinct_sequences() {
        let fx = fixture();
        let vehicle = EntityRef::Vehicle(fx.vehicle.id);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = fx.service.clone();
            handles.push(tokio::spawn(async move {
                service.capture(vehicle, PhotoType::Front, bytes()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut sequences: Vec<i64> = fx
            .service
            .list_photos(&PhotoFilter::for_entity(vehicle))
            .unwrap()
            .iter()
            .map(|p| p.sequence)
            .collect();
        sequences.sort();
        assert_eq!(sequences, (0..10).collect::<Vec<i64>>());
        assert!(fx.service.capture_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_photo_type_rejected() {
        let fx = fixture();
        let result = fx
            .service
            .capture(EntityRef::Vehicle(fx.vehicle.id), PhotoType::Overview, bytes())
            .await;
        assert!(matches!(result, Err(AppError::InvalidCaptureContext(_))));

        let missing = fx
            .service
            .capture(EntityRef::Project(Uuid::new_v4()), PhotoType::Overview, bytes())
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        assert!(fx.service.list_photos(&PhotoFilter::default()).unwrap().is_empty());
        assert!(!fx.service.photo_dir().exists());
    }

    #[tokio::test]
    async fn test_camera_failure_creates_no_record() {
        let fx = fixture();
        let result = fx
            .service
            .capture(EntityRef::Project(fx.project.id), PhotoType::Overview, ImageSource::Camera)
            .await;
        assert!(matches!(result, Err(AppError::StorageFailure(_))));
        assert!(fx.service.list_photos(&PhotoFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_removes_file() {
        let fx = fixture();
        fx.store
            .read(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_photos BEFORE INSERT ON photos
                     BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let result = fx
            .service
            .capture(EntityRef::Project(fx.project.id), PhotoType::Overview, bytes())
            .await;
        assert!(matches!(result, Err(AppError::Database(_))));

        let dir = entity_dir(fx.service.photo_dir(), EntityRef::Project(fx.project.id));
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
        let project = project_service::get_project(&fx.store, fx.project.id).unwrap();
        assert!(project.cover_photo_path.is_none());
    }

    #[tokio::test]
    async fn test_path_conflict_is_retried_with_next_sequence() {
        let fx = fixture();
        let entity = EntityRef::Project(fx.project.id);
        let taken = entity_dir(fx.service.photo_dir(), entity).join("Demo_OVERVIEW_0.jpg");

        // A stray record already owns the path the first overview would get
        fx.store
            .put(&Photo {
                id: Uuid::new_v4(),
                entity_id: fx.project.id,
                entity_type: EntityType::Project,
                photo_type: PhotoType::SiteSurvey,
                path: taken.to_string_lossy().into_owned(),
                file_name: "Demo_OVERVIEW_0.jpg".to_string(),
                sequence: 0,
                timestamp: Utc::now(),
                latitude: None,
                longitude: None,
                is_uploaded: false,
                upload_status: UploadStatus::Pending,
                upload_attempts: 0,
                last_error: None,
                next_attempt_at: None,
            })
            .unwrap();

        let photo = fx
            .service
            .capture(entity, PhotoType::Overview, bytes())
            .await
            .unwrap();
        assert_eq!(photo.sequence, 1);
        assert_eq!(photo.file_name, "Demo_OVERVIEW_1.jpg");
        assert!(Path::new(&photo.path).exists());
        assert!(!taken.exists());
    }

    #[tokio::test]
    async fn test_track_point_photo_rules_and_counters() {
        let fx = fixture();
        let start = track_service::record_point(
            &fx.store,
            fx.track.id,
            NewTrackPoint::new(PointType::Start, 48.1, 11.5),
        )
        .unwrap();
        let middle = track_service::record_point(
            &fx.store,
            fx.track.id,
            NewTrackPoint::new(PointType::Middle, 48.2, 11.6),
        )
        .unwrap();

        // photo type must match the point
        let mismatch = fx
            .service
            .capture(EntityRef::TrackPoint(start.id), PhotoType::MiddlePoint, bytes())
            .await;
        assert!(matches!(mismatch, Err(AppError::InvalidCaptureContext(_))));

        let start_photo = fx
            .service
            .capture_with_location(
                EntityRef::TrackPoint(start.id),
                PhotoType::StartPoint,
                bytes(),
                Some((48.1, 11.5)),
            )
            .await
            .unwrap();
        assert_eq!(start_photo.file_name, "Demo_Van_1_Loop_P0_START_POINT_0.jpg");
        assert_eq!(start_photo.latitude, Some(48.1));
        for _ in 0..2 {
            fx.service
                .capture(EntityRef::TrackPoint(middle.id), PhotoType::MiddlePoint, bytes())
                .await
                .unwrap();
        }

        let end = track_service::record_point(
            &fx.store,
            fx.track.id,
            NewTrackPoint::new(PointType::End, 48.3, 11.7),
        )
        .unwrap();

        // after the end only END point photos are accepted
        let late = fx
            .service
            .capture(EntityRef::TrackPoint(middle.id), PhotoType::MiddlePoint, bytes())
            .await;
        assert!(matches!(late, Err(AppError::InvalidCaptureContext(_))));
        fx.service
            .capture(EntityRef::TrackPoint(end.id), PhotoType::EndPoint, bytes())
            .await
            .unwrap();

        let track = track_service::get_track(&fx.store, fx.track.id).unwrap();
        assert_eq!(track.start_point_photo_count, 1);
        assert_eq!(track.middle_point_photo_count, 2);
        assert_eq!(track.end_point_photo_count, 1);
        assert_eq!(track.total_photo_count(), 4);

        fx.service.delete_photo(start_photo.id).await.unwrap();
        assert!(!Path::new(&start_photo.path).exists());
        let track = track_service::get_track(&fx.store, fx.track.id).unwrap();
        assert_eq!(track.start_point_photo_count, 0);
        assert_eq!(track.total_photo_count(), 3);

        let recounted = track_service::recount_track_photos(&fx.store, fx.track.id).unwrap();
        assert_eq!(recounted, track);
    }

    #[tokio::test]
    async fn test_delete_moves_cover_to_next_overview() {
        let fx = fixture();
        let entity = EntityRef::Project(fx.project.id);
        let first = fx.service.capture(entity, PhotoType::Overview, bytes()).await.unwrap();
        let second = fx.service.capture(entity, PhotoType::Overview, bytes()).await.unwrap();

        fx.service.delete_photo(first.id).await.unwrap();
        let project = project_service::get_project(&fx.store, fx.project.id).unwrap();
        assert_eq!(project.cover_photo_path.as_deref(), Some(second.path.as_str()));

        fx.service.delete_photo(second.id).await.unwrap();
        let project = project_service::get_project(&fx.store, fx.project.id).unwrap();
        assert!(project.cover_photo_path.is_none());

        assert!(matches!(
            fx.service.delete_photo(second.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_captured_photos_are_uploaded_to_their_module() {
        let fx = fixture();
        let start = track_service::record_point(
            &fx.store,
            fx.track.id,
            NewTrackPoint::new(PointType::Start, 48.1, 11.5),
        )
        .unwrap();
        fx.service
            .capture(EntityRef::TrackPoint(start.id), PhotoType::StartPoint, bytes())
            .await
            .unwrap();
        fx.service
            .capture(EntityRef::Vehicle(fx.vehicle.id), PhotoType::LicensePlate, bytes())
            .await
            .unwrap();

        let report = fx.engine.sync_pending().await.unwrap();
        assert_eq!(report.uploaded, 2);

        let uploads = fx.api.uploads.lock().unwrap().clone();
        let track_upload = uploads
            .iter()
            .find(|r| r.photo_type == "START_POINT")
            .unwrap();
        assert_eq!(track_upload.module_type, ModuleType::Track);
        assert_eq!(track_upload.module_id, fx.track.id.to_string());
        assert_eq!(track_upload.project_name.as_deref(), Some("Demo"));

        let plate_upload = uploads
            .iter()
            .find(|r| r.photo_type == "LICENSE_PLATE")
            .unwrap();
        assert_eq!(plate_upload.module_type, ModuleType::Vehicle);
        assert_eq!(plate_upload.module_id, fx.vehicle.id.to_string());
    }

    #[tokio::test]
    async fn test_delete_during_upload_cancels_it() {
        let fx = fixture();
        fx.api.set_default(Reply::Hang);
        let photo = fx
            .service
            .capture(EntityRef::Vehicle(fx.vehicle.id), PhotoType::Front, bytes())
            .await
            .unwrap();

        let engine = fx.engine.clone();
        let run = tokio::spawn(async move { engine.sync_pending().await });
        fx.api.started.notified().await;
        assert_eq!(fx.engine.in_flight_count(), 1);

        fx.service.delete_photo(photo.id).await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.failed, 0);
        assert!(matches!(
            fx.service.get_photo(photo.id),
            Err(AppError::NotFound(_))
        ));
        assert!(!Path::new(&photo.path).exists());
        assert_eq!(fx.engine.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_entity_photos_propagates_remote_delete() {
        let fx = fixture();
        let entity = EntityRef::Vehicle(fx.vehicle.id);
        for photo_type in [PhotoType::Front, PhotoType::Rear, PhotoType::Interior] {
            fx.service.capture(entity, photo_type, bytes()).await.unwrap();
        }

        // remote failure does not block the local delete
        *fx.api.fail_deletes.lock().unwrap() = true;
        let removed = fx.service.delete_entity_photos(entity).await.unwrap();
        assert_eq!(removed, 3);
        assert!(fx
            .service
            .list_photos(&PhotoFilter::for_entity(entity))
            .unwrap()
            .is_empty());

        let deletes = fx.api.deletes.lock().unwrap().clone();
        assert_eq!(deletes, vec![(fx.vehicle.id.to_string(), ModuleType::Vehicle)]);
    }
}
