//! Track lifecycle: creation, point recording and per-type photo counters.
//!
//! A track moves `NotStarted -> Started -> Ended`. Every transition reads the
//! track, allocates the point sequence and writes point and track inside one
//! IMMEDIATE transaction, so concurrent recorders on the same track are
//! serialized by the store and arrival order decides.

use crate::database::{count_with, get_with, query_with, Change, EntityKind, Record, Store};
use crate::error::AppError;
use crate::models::track::counter_column;
use crate::models::{
    EntityRef, NewTrackPoint, Photo, PhotoFilter, PointType, Track, TrackFilter, TrackPoint,
    TrackPointFilter, TrackState, Vehicle,
};
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

/// Creates a new, not yet started track for a vehicle
pub fn create_track(
    store: &Store,
    vehicle_id: Uuid,
    name: String,
    length: f64,
) -> Result<Track, AppError> {
    let track = Track::new(vehicle_id, name.trim().to_string(), length);
    track.validate()?;

    store.transaction(|conn, changes| {
        if get_with::<Vehicle>(conn, vehicle_id)?.is_none() {
            return Err(AppError::NotFound("Vehicle".to_string()));
        }
        track.insert(conn)?;
        changes.push(Change::of(&track));
        Ok(())
    })?;

    log::info!("Created track {} for vehicle {}", track.id, vehicle_id);
    Ok(track)
}

pub fn get_track(store: &Store, id: Uuid) -> Result<Track, AppError> {
    store
        .get::<Track>(id)?
        .ok_or_else(|| AppError::NotFound("Track".to_string()))
}

pub fn list_tracks(store: &Store, vehicle_id: Option<Uuid>) -> Result<Vec<Track>, AppError> {
    store.query::<Track>(&TrackFilter { vehicle_id })
}

pub fn get_point(store: &Store, id: Uuid) -> Result<TrackPoint, AppError> {
    store
        .get::<TrackPoint>(id)?
        .ok_or_else(|| AppError::NotFound("Track point".to_string()))
}

/// Points of a track in sequence order
pub fn list_points(store: &Store, track_id: Uuid) -> Result<Vec<TrackPoint>, AppError> {
    store.query::<TrackPoint>(&TrackPointFilter {
        track_id: Some(track_id),
        point_type: None,
    })
}

/// Checks whether `point_type` may be recorded in `state`
pub fn check_transition(state: TrackState, point_type: PointType) -> Result<(), AppError> {
    match (state, point_type) {
        (TrackState::Ended, _) => Err(AppError::InvalidTransition(
            "Track has already ended".to_string(),
        )),
        (TrackState::NotStarted, PointType::Start) => Ok(()),
        (TrackState::NotStarted, other) => Err(AppError::InvalidTransition(format!(
            "Track must be started with a START point, got {}",
            other
        ))),
        (TrackState::Started, PointType::Start) => Err(AppError::InvalidTransition(
            "Track has already been started".to_string(),
        )),
        (TrackState::Started, _) => Ok(()),
    }
}

/// Records the next point of a track and applies the resulting transition
pub fn record_point(
    store: &Store,
    track_id: Uuid,
    point: NewTrackPoint,
) -> Result<TrackPoint, AppError> {
    point.validate()?;

    let recorded = store.transaction(|conn, changes| {
        let track = get_with::<Track>(conn, track_id)?
            .ok_or_else(|| AppError::NotFound("Track".to_string()))?;
        check_transition(track.state(), point.point_type)?;

        let sequence = next_point_sequence(conn, track_id, point.sequence)?;
        let timestamp = point.timestamp.unwrap_or_else(Utc::now);

        let recorded = TrackPoint {
            id: Uuid::new_v4(),
            track_id,
            latitude: point.latitude,
            longitude: point.longitude,
            altitude: point.altitude,
            sequence,
            timestamp,
            point_type: point.point_type,
        };
        recorded.insert(conn)?;
        changes.push(Change::of(&recorded));

        match point.point_type {
            PointType::Start => {
                conn.execute(
                    "UPDATE tracks SET is_started = 1, start_time = ?1 WHERE id = ?2",
                    (timestamp, track_id.to_string()),
                )?;
                changes.push(Change::of(&track));
            }
            PointType::End => {
                // A clock that went backwards must not end a track before it started
                let end_time = track.start_time.map_or(timestamp, |start| timestamp.max(start));
                conn.execute(
                    "UPDATE tracks SET is_ended = 1, end_time = ?1 WHERE id = ?2",
                    (end_time, track_id.to_string()),
                )?;
                changes.push(Change::of(&track));
            }
            PointType::Middle | PointType::Model => {}
        }

        Ok(recorded)
    })?;

    log::info!(
        "Recorded {} point #{} on track {}",
        recorded.point_type,
        recorded.sequence,
        track_id
    );
    Ok(recorded)
}

fn next_point_sequence(
    conn: &Connection,
    track_id: Uuid,
    requested: Option<i64>,
) -> Result<i64, AppError> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sequence) FROM track_points WHERE track_id = ?1",
        [track_id.to_string()],
        |row| row.get(0),
    )?;

    match (requested, max) {
        (Some(requested), Some(max)) if requested <= max => Err(AppError::SequenceConflict(
            format!("Point sequence {} is not after {}", requested, max),
        )),
        (Some(requested), _) => Ok(requested),
        (None, Some(max)) => Ok(max + 1),
        (None, None) => Ok(0),
    }
}

/// Deletes a MIDDLE or MODEL point that has no photos.
///
/// START and END points carry the lifecycle and stay.
pub fn delete_point(store: &Store, id: Uuid) -> Result<(), AppError> {
    store.transaction(|conn, changes| {
        let point = get_with::<TrackPoint>(conn, id)?
            .ok_or_else(|| AppError::NotFound("Track point".to_string()))?;

        if matches!(point.point_type, PointType::Start | PointType::End) {
            return Err(AppError::InvalidTransition(format!(
                "{} points cannot be removed",
                point.point_type
            )));
        }

        let photos = count_with::<Photo>(conn, &PhotoFilter::for_entity(EntityRef::TrackPoint(id)))?;
        if photos > 0 {
            return Err(AppError::HasChildren(format!(
                "Track point #{} ({} photos)",
                point.sequence, photos
            )));
        }

        conn.execute("DELETE FROM track_points WHERE id = ?1", [id.to_string()])?;
        changes.push(Change::of(&point));
        Ok(())
    })
}

/// Deletes a track that has no points
pub fn delete_track(store: &Store, id: Uuid) -> Result<(), AppError> {
    store.transaction(|conn, changes| {
        let track = get_with::<Track>(conn, id)?
            .ok_or_else(|| AppError::NotFound("Track".to_string()))?;

        let points = count_with::<TrackPoint>(
            conn,
            &TrackPointFilter {
                track_id: Some(id),
                point_type: None,
            },
        )?;
        if points > 0 {
            return Err(AppError::HasChildren(format!(
                "Track '{}' ({} points)",
                track.name, points
            )));
        }

        conn.execute("DELETE FROM tracks WHERE id = ?1", [id.to_string()])?;
        changes.push(Change::new(EntityKind::Track, id, Some(track.vehicle_id)));
        Ok(())
    })?;

    log::info!("Deleted track {}", id);
    Ok(())
}

/// Adds `delta` to the photo counter of `point_type` on a track.
///
/// Runs inside the caller's transaction together with the photo write.
pub(crate) fn adjust_photo_counter(
    conn: &Connection,
    track_id: Uuid,
    point_type: PointType,
    delta: i64,
) -> Result<(), AppError> {
    let column = counter_column(point_type);
    let sql = format!("UPDATE tracks SET {0} = {0} + ?1 WHERE id = ?2", column);
    let updated = conn.execute(&sql, (delta, track_id.to_string()))?;
    if updated == 0 {
        return Err(AppError::NotFound("Track".to_string()));
    }
    Ok(())
}

/// Recomputes all four photo counters of a track from the photo records
pub fn recount_track_photos(store: &Store, track_id: Uuid) -> Result<Track, AppError> {
    let track = store.transaction(|conn, changes| {
        let mut track = get_with::<Track>(conn, track_id)?
            .ok_or_else(|| AppError::NotFound("Track".to_string()))?;

        let points = query_with::<TrackPoint>(
            conn,
            &TrackPointFilter {
                track_id: Some(track_id),
                point_type: None,
            },
        )?;

        let mut counts = [0u32; 4];
        for point in &points {
            let photos = count_with::<Photo>(
                conn,
                &PhotoFilter::for_entity(EntityRef::TrackPoint(point.id)),
            )?;
            let slot = match point.point_type {
                PointType::Start => 0,
                PointType::Middle => 1,
                PointType::Model => 2,
                PointType::End => 3,
            };
            counts[slot] += photos as u32;
        }

        conn.execute(
            "UPDATE tracks SET start_point_photo_count = ?1, middle_point_photo_count = ?2,
                model_point_photo_count = ?3, end_point_photo_count = ?4
             WHERE id = ?5",
            (counts[0], counts[1], counts[2], counts[3], track_id.to_string()),
        )?;

        track.start_point_photo_count = counts[0];
        track.middle_point_photo_count = counts[1];
        track.model_point_photo_count = counts[2];
        track.end_point_photo_count = counts[3];
        changes.push(Change::of(&track));
        Ok(track)
    })?;

    log::debug!(
        "Recounted photos of track {}: {} total",
        track_id,
        track.total_photo_count()
    );
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{project_service, vehicle_service};
    use chrono::Duration;

    fn setup() -> (Store, Track) {
        let store = Store::open_in_memory().unwrap();
        let project = project_service::create_project(&store, "P".to_string(), String::new()).unwrap();
        let vehicle = vehicle_service::create_vehicle(
            &store,
            project.id,
            "V".to_string(),
            String::new(),
            String::new(),
            String::new(),
        )
        .unwrap();
        let track = create_track(&store, vehicle.id, "T".to_string(), 250.0).unwrap();
        (store, track)
    }

    fn point(point_type: PointType) -> NewTrackPoint {
        NewTrackPoint::new(point_type, 48.137, 11.575)
    }

    #[test]
    fn test_create_track_requires_vehicle() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            create_track(&store, Uuid::new_v4(), "T".to_string(), 0.0),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_full_lifecycle() {
        let (store, track) = setup();
        assert_eq!(track.state(), TrackState::NotStarted);

        let start = record_point(&store, track.id, point(PointType::Start)).unwrap();
        assert_eq!(start.sequence, 0);
        let loaded = get_track(&store, track.id).unwrap();
        assert_eq!(loaded.state(), TrackState::Started);
        assert_eq!(loaded.start_time, Some(start.timestamp));

        let middle = record_point(&store, track.id, point(PointType::Middle)).unwrap();
        assert_eq!(middle.sequence, 1);

        let end = record_point(&store, track.id, point(PointType::End)).unwrap();
        assert_eq!(end.sequence, 2);
        let ended = get_track(&store, track.id).unwrap();
        assert_eq!(ended.state(), TrackState::Ended);
        assert!(ended.end_time.is_some());
        assert!(ended.end_time >= ended.start_time);

        // a second END leaves everything as it was
        let again = record_point(&store, track.id, point(PointType::End));
        assert!(matches!(again, Err(AppError::InvalidTransition(_))));
        assert_eq!(get_track(&store, track.id).unwrap(), ended);
        assert_eq!(list_points(&store, track.id).unwrap().len(), 3);
    }

    #[test]
    fn test_first_point_must_be_start() {
        let (store, track) = setup();
        for point_type in [PointType::Middle, PointType::Model, PointType::End] {
            assert!(matches!(
                record_point(&store, track.id, point(point_type)),
                Err(AppError::InvalidTransition(_))
            ));
        }
        assert!(list_points(&store, track.id).unwrap().is_empty());
        assert_eq!(get_track(&store, track.id).unwrap().state(), TrackState::NotStarted);
    }

    #[test]
    fn test_second_start_rejected() {
        let (store, track) = setup();
        record_point(&store, track.id, point(PointType::Start)).unwrap();
        assert!(matches!(
            record_point(&store, track.id, point(PointType::Start)),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_explicit_sequence_must_increase() {
        let (store, track) = setup();
        record_point(&store, track.id, point(PointType::Start).with_sequence(5)).unwrap();

        let tie = record_point(&store, track.id, point(PointType::Middle).with_sequence(5));
        assert!(matches!(tie, Err(AppError::SequenceConflict(_))));
        let lower = record_point(&store, track.id, point(PointType::Middle).with_sequence(2));
        assert!(matches!(lower, Err(AppError::SequenceConflict(_))));

        let next = record_point(&store, track.id, point(PointType::Model)).unwrap();
        assert_eq!(next.sequence, 6);
    }

    #[test]
    fn test_sequences_strictly_increasing() {
        let (store, track) = setup();
        record_point(&store, track.id, point(PointType::Start)).unwrap();
        for i in 0..20 {
            let point_type = if i % 3 == 0 { PointType::Model } else { PointType::Middle };
            record_point(&store, track.id, point(point_type)).unwrap();
        }
        let sequences: Vec<i64> = list_points(&store, track.id)
            .unwrap()
            .iter()
            .map(|p| p.sequence)
            .collect();
        assert_eq!(sequences, (0..21).collect::<Vec<i64>>());
    }

    #[test]
    fn test_end_time_not_before_start() {
        let (store, track) = setup();
        let start_at = Utc::now();
        record_point(&store, track.id, point(PointType::Start).at(start_at)).unwrap();
        record_point(
            &store,
            track.id,
            point(PointType::End).at(start_at - Duration::minutes(5)),
        )
        .unwrap();

        let ended = get_track(&store, track.id).unwrap();
        assert_eq!(ended.end_time, Some(start_at));
    }

    #[test]
    fn test_delete_point_rules() {
        let (store, track) = setup();
        let start = record_point(&store, track.id, point(PointType::Start)).unwrap();
        let middle = record_point(&store, track.id, point(PointType::Middle)).unwrap();

        assert!(matches!(
            delete_point(&store, start.id),
            Err(AppError::InvalidTransition(_))
        ));
        delete_point(&store, middle.id).unwrap();
        assert_eq!(list_points(&store, track.id).unwrap().len(), 1);

        assert!(matches!(delete_track(&store, track.id), Err(AppError::HasChildren(_))));
    }

    #[test]
    fn test_counter_adjust_and_recount() {
        let (store, track) = setup();
        store
            .transaction(|conn, _| {
                adjust_photo_counter(conn, track.id, PointType::Middle, 2)?;
                adjust_photo_counter(conn, track.id, PointType::End, 1)
            })
            .unwrap();
        let drifted = get_track(&store, track.id).unwrap();
        assert_eq!(drifted.total_photo_count(), 3);

        // no photo records exist, so the repair resets every counter
        let repaired = recount_track_photos(&store, track.id).unwrap();
        assert_eq!(repaired.total_photo_count(), 0);
        assert_eq!(get_track(&store, track.id).unwrap().middle_point_photo_count, 0);

        // counters never go below zero
        let negative = store.transaction(|conn, _| {
            adjust_photo_counter(conn, track.id, PointType::Start, -1)
        });
        assert!(negative.is_err());
    }
}
