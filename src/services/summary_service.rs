use crate::database::{count_with, get_with, query_with, Store};
use crate::error::AppError;
use crate::models::{
    EntityRef, Photo, PhotoFilter, PhotoType, PointType, Project, Track, TrackFilter, TrackPoint,
    TrackPointFilter, UploadStatus, Vehicle, VehicleFilter,
};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Photos of a project's own, vehicle and track point entities
const PROJECT_PHOTOS_WHERE: &str = "(entity_type = 'PROJECT' AND entity_id = ?1)
    OR (entity_type = 'VEHICLE' AND entity_id IN (SELECT id FROM vehicles WHERE project_id = ?1))
    OR (entity_type = 'TRACK_POINT' AND entity_id IN (
        SELECT tp.id FROM track_points tp
        JOIN tracks t ON t.id = tp.track_id
        JOIN vehicles v ON v.id = t.vehicle_id
        WHERE v.project_id = ?1))";

const VEHICLE_PHOTOS_WHERE: &str = "(entity_type = 'VEHICLE' AND entity_id = ?1)
    OR (entity_type = 'TRACK_POINT' AND entity_id IN (
        SELECT tp.id FROM track_points tp
        JOIN tracks t ON t.id = tp.track_id
        WHERE t.vehicle_id = ?1))";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub project: Project,
    pub vehicle_count: u64,
    pub track_count: u64,
    /// All photos in the project, including vehicle and track point photos
    pub photo_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSummary {
    pub vehicle: Vehicle,
    pub track_count: u64,
    /// Vehicle photos plus the photos on its tracks
    pub photo_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub track: Track,
    pub point_count: u64,
    pub photo_counts: BTreeMap<PointType, u32>,
    pub total_photo_count: u32,
}

/// Upload state of all photos
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadOverview {
    pub pending: u64,
    pub uploaded: u64,
    pub abandoned: u64,
}

impl UploadOverview {
    pub fn total(&self) -> u64 {
        self.pending + self.uploaded + self.abandoned
    }
}

pub fn project_summary(store: &Store, project_id: Uuid) -> Result<ProjectSummary, AppError> {
    store.read(|conn| {
        let project = get_with::<Project>(conn, project_id)?
            .ok_or_else(|| AppError::NotFound("Project".to_string()))?;

        let vehicle_count = count_with::<Vehicle>(
            conn,
            &VehicleFilter {
                project_id: Some(project_id),
            },
        )?;
        let track_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks t
             JOIN vehicles v ON v.id = t.vehicle_id
             WHERE v.project_id = ?1",
            [project_id.to_string()],
            |row| row.get(0),
        )?;
        let photo_count = count_photos_where(conn, PROJECT_PHOTOS_WHERE, project_id)?;

        Ok(ProjectSummary {
            project,
            vehicle_count,
            track_count: track_count as u64,
            photo_count,
        })
    })
}

/// Summaries of every project, newest first
pub fn list_project_summaries(store: &Store) -> Result<Vec<ProjectSummary>, AppError> {
    let projects = store.query::<Project>(&Default::default())?;
    projects
        .iter()
        .map(|p| project_summary(store, p.id))
        .collect()
}

pub fn vehicle_summary(store: &Store, vehicle_id: Uuid) -> Result<VehicleSummary, AppError> {
    store.read(|conn| {
        let vehicle = get_with::<Vehicle>(conn, vehicle_id)?
            .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;
        let track_count = count_with::<Track>(
            conn,
            &TrackFilter {
                vehicle_id: Some(vehicle_id),
            },
        )?;
        let photo_count = count_photos_where(conn, VEHICLE_PHOTOS_WHERE, vehicle_id)?;

        Ok(VehicleSummary {
            vehicle,
            track_count,
            photo_count,
        })
    })
}

/// Track totals, read from the stored per-type counters
pub fn track_summary(store: &Store, track_id: Uuid) -> Result<TrackSummary, AppError> {
    store.read(|conn| {
        let track = get_with::<Track>(conn, track_id)?
            .ok_or_else(|| AppError::NotFound("Track".to_string()))?;
        let point_count = count_with::<TrackPoint>(
            conn,
            &TrackPointFilter {
                track_id: Some(track_id),
                point_type: None,
            },
        )?;

        let photo_counts = PointType::all()
            .into_iter()
            .map(|point_type| (point_type, track.photo_count(point_type)))
            .collect();
        let total_photo_count = track.total_photo_count();

        Ok(TrackSummary {
            track,
            point_count,
            photo_counts,
            total_photo_count,
        })
    })
}

/// Photo count per photo type of an entity. Every type valid for the entity
/// is present, with 0 when nothing was captured yet.
pub fn photo_counts_by_type(
    store: &Store,
    entity: EntityRef,
) -> Result<BTreeMap<PhotoType, u64>, AppError> {
    store.read(|conn| {
        let mut counts: BTreeMap<PhotoType, u64> = entity
            .entity_type()
            .photo_types()
            .iter()
            .map(|t| (*t, 0))
            .collect();

        let mut stmt = conn.prepare(
            "SELECT photo_type, COUNT(*) FROM photos
             WHERE entity_id = ?1 AND entity_type = ?2
             GROUP BY photo_type",
        )?;
        let rows = stmt.query_map((entity.id().to_string(), entity.entity_type()), |row| {
            Ok((row.get::<_, PhotoType>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (photo_type, count) = row?;
            counts.insert(photo_type, count as u64);
        }
        Ok(counts)
    })
}

pub fn upload_overview(store: &Store) -> Result<UploadOverview, AppError> {
    store.read(|conn| {
        let mut overview = UploadOverview::default();
        let mut stmt =
            conn.prepare("SELECT upload_status, COUNT(*) FROM photos GROUP BY upload_status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, UploadStatus>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match status {
                UploadStatus::Pending => overview.pending = count,
                UploadStatus::Uploaded => overview.uploaded = count,
                UploadStatus::Abandoned => overview.abandoned = count,
            }
        }
        Ok(overview)
    })
}

/// Abandoned photos, newest first, for the retry screen
pub fn abandoned_photos(store: &Store) -> Result<Vec<Photo>, AppError> {
    store.read(|conn| query_with::<Photo>(conn, &PhotoFilter::with_status(UploadStatus::Abandoned)))
}

fn count_photos_where(conn: &Connection, predicate: &str, id: Uuid) -> Result<u64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM photos WHERE {}", predicate);
    let count: i64 = conn.query_row(&sql, [id.to_string()], |row| row.get(0))?;
    Ok(count as u64)
}
