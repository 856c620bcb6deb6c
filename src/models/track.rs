use super::track_point::PointType;
use super::{uuid_column, validate_name};
use crate::database::{opt_uuid, EntityKind, Record, RecordFilter};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state, derived from `is_started` / `is_ended`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    NotStarted,
    Started,
    Ended,
}

/// A recorded route of one vehicle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub name: String,
    /// Route length in meters
    pub length: f64,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_started: bool,
    pub is_ended: bool,
    pub start_point_photo_count: u32,
    pub middle_point_photo_count: u32,
    pub model_point_photo_count: u32,
    pub end_point_photo_count: u32,
}

impl Track {
    pub fn new(vehicle_id: Uuid, name: String, length: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            name,
            length,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            is_started: false,
            is_ended: false,
            start_point_photo_count: 0,
            middle_point_photo_count: 0,
            model_point_photo_count: 0,
            end_point_photo_count: 0,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_name("Track name", &self.name)?;
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(AppError::Validation(
                "Track length must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn state(&self) -> TrackState {
        match (self.is_started, self.is_ended) {
            (_, true) => TrackState::Ended,
            (true, false) => TrackState::Started,
            (false, false) => TrackState::NotStarted,
        }
    }

    /// Photos attached to points of the given type
    pub fn photo_count(&self, point_type: PointType) -> u32 {
        match point_type {
            PointType::Start => self.start_point_photo_count,
            PointType::Middle => self.middle_point_photo_count,
            PointType::Model => self.model_point_photo_count,
            PointType::End => self.end_point_photo_count,
        }
    }

    pub fn total_photo_count(&self) -> u32 {
        self.start_point_photo_count
            + self.middle_point_photo_count
            + self.model_point_photo_count
            + self.end_point_photo_count
    }
}

/// Name of the per-type counter column
pub(crate) fn counter_column(point_type: PointType) -> &'static str {
    match point_type {
        PointType::Start => "start_point_photo_count",
        PointType::Middle => "middle_point_photo_count",
        PointType::Model => "model_point_photo_count",
        PointType::End => "end_point_photo_count",
    }
}

impl<'r> TryFrom<&Row<'r>> for Track {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'r>) -> Result<Self, Self::Error> {
        Ok(Track {
            id: uuid_column(row, 0)?,
            vehicle_id: uuid_column(row, 1)?,
            name: row.get(2)?,
            length: row.get(3)?,
            created_at: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            is_started: row.get(7)?,
            is_ended: row.get(8)?,
            start_point_photo_count: row.get(9)?,
            middle_point_photo_count: row.get(10)?,
            model_point_photo_count: row.get(11)?,
            end_point_photo_count: row.get(12)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackFilter {
    pub vehicle_id: Option<Uuid>,
}

impl RecordFilter for TrackFilter {
    const PREDICATE: &'static str = "(?1 IS NULL OR vehicle_id = ?1)";

    fn params(&self) -> Vec<Value> {
        vec![opt_uuid(self.vehicle_id)]
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.vehicle_id
    }
}

impl Record for Track {
    const KIND: EntityKind = EntityKind::Track;
    const TABLE: &'static str = "tracks";
    const COLUMNS: &'static str = "id, vehicle_id, name, length, created_at, start_time, end_time, \
        is_started, is_ended, start_point_photo_count, middle_point_photo_count, \
        model_point_photo_count, end_point_photo_count";
    const ORDER_BY: &'static str = "created_at DESC, rowid DESC";

    type Filter = TrackFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn parent_id(&self) -> Option<Uuid> {
        Some(self.vehicle_id)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Self::try_from(row)
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO tracks (id, vehicle_id, name, length, created_at, start_time, end_time,
                is_started, is_ended, start_point_photo_count, middle_point_photo_count,
                model_point_photo_count, end_point_photo_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            (
                self.id.to_string(),
                self.vehicle_id.to_string(),
                &self.name,
                self.length,
                self.created_at,
                self.start_time,
                self.end_time,
                self.is_started,
                self.is_ended,
                self.start_point_photo_count,
                self.middle_point_photo_count,
                self.model_point_photo_count,
                self.end_point_photo_count,
            ),
        )?;
        Ok(())
    }
}
