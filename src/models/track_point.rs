use super::{sql_text_enum, uuid_column, validate_coordinates};
use crate::database::{opt_text, opt_uuid, EntityKind, Record, RecordFilter};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PointType {
    Start,
    Middle,
    Model,
    End,
}

impl PointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::Start => "START",
            PointType::Middle => "MIDDLE",
            PointType::Model => "MODEL",
            PointType::End => "END",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "START" => Some(PointType::Start),
            "MIDDLE" => Some(PointType::Middle),
            "MODEL" => Some(PointType::Model),
            "END" => Some(PointType::End),
            _ => None,
        }
    }

    pub fn all() -> [PointType; 4] {
        [
            PointType::Start,
            PointType::Middle,
            PointType::Model,
            PointType::End,
        ]
    }
}

sql_text_enum!(PointType);

/// A recorded position along a track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackPoint {
    pub id: Uuid,
    pub track_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub point_type: PointType,
}

/// Input for recording a point.
///
/// `sequence` and `timestamp` are filled in by the lifecycle engine when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackPoint {
    pub point_type: PointType,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub sequence: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewTrackPoint {
    pub fn new(point_type: PointType, latitude: f64, longitude: f64) -> Self {
        Self {
            point_type,
            latitude,
            longitude,
            altitude: None,
            sequence: None,
            timestamp: None,
        }
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_coordinates(self.latitude, self.longitude)?;
        if let Some(sequence) = self.sequence {
            if sequence < 0 {
                return Err(AppError::Validation(
                    "Point sequence must not be negative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl<'r> TryFrom<&Row<'r>> for TrackPoint {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'r>) -> Result<Self, Self::Error> {
        Ok(TrackPoint {
            id: uuid_column(row, 0)?,
            track_id: uuid_column(row, 1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            altitude: row.get(4)?,
            sequence: row.get(5)?,
            timestamp: row.get(6)?,
            point_type: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackPointFilter {
    pub track_id: Option<Uuid>,
    pub point_type: Option<PointType>,
}

impl RecordFilter for TrackPointFilter {
    const PREDICATE: &'static str =
        "(?1 IS NULL OR track_id = ?1) AND (?2 IS NULL OR point_type = ?2)";

    fn params(&self) -> Vec<Value> {
        vec![opt_uuid(self.track_id), opt_text(self.point_type)]
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.track_id
    }
}

impl Record for TrackPoint {
    const KIND: EntityKind = EntityKind::TrackPoint;
    const TABLE: &'static str = "track_points";
    const COLUMNS: &'static str =
        "id, track_id, latitude, longitude, altitude, sequence, timestamp, point_type";
    const ORDER_BY: &'static str = "sequence ASC";

    type Filter = TrackPointFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn parent_id(&self) -> Option<Uuid> {
        Some(self.track_id)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Self::try_from(row)
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO track_points (id, track_id, latitude, longitude, altitude, sequence, timestamp, point_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                self.id.to_string(),
                self.track_id.to_string(),
                self.latitude,
                self.longitude,
                self.altitude,
                self.sequence,
                self.timestamp,
                self.point_type,
            ),
        )?;
        Ok(())
    }
}
