use super::track_point::PointType;
use super::{sql_text_enum, uuid_column};
use crate::database::{opt_text, opt_uuid, EntityKind, Record, RecordFilter};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity a photo is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Project,
    Vehicle,
    TrackPoint,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Project => "PROJECT",
            EntityType::Vehicle => "VEHICLE",
            EntityType::TrackPoint => "TRACK_POINT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PROJECT" => Some(EntityType::Project),
            "VEHICLE" => Some(EntityType::Vehicle),
            "TRACK_POINT" => Some(EntityType::TrackPoint),
            _ => None,
        }
    }

    /// Photo types that may be captured for this entity type
    pub fn photo_types(&self) -> &'static [PhotoType] {
        match self {
            EntityType::Project => &[
                PhotoType::Overview,
                PhotoType::Document,
                PhotoType::SiteSurvey,
            ],
            EntityType::Vehicle => &[
                PhotoType::Front,
                PhotoType::Rear,
                PhotoType::LeftSide,
                PhotoType::RightSide,
                PhotoType::Interior,
                PhotoType::LicensePlate,
            ],
            EntityType::TrackPoint => &[
                PhotoType::StartPoint,
                PhotoType::MiddlePoint,
                PhotoType::ModelPoint,
                PhotoType::EndPoint,
            ],
        }
    }
}

sql_text_enum!(EntityType);

/// Capture stage of a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhotoType {
    // Project
    Overview,
    Document,
    SiteSurvey,
    // Vehicle
    Front,
    Rear,
    LeftSide,
    RightSide,
    Interior,
    LicensePlate,
    // Track point
    StartPoint,
    MiddlePoint,
    ModelPoint,
    EndPoint,
}

impl PhotoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoType::Overview => "OVERVIEW",
            PhotoType::Document => "DOCUMENT",
            PhotoType::SiteSurvey => "SITE_SURVEY",
            PhotoType::Front => "FRONT",
            PhotoType::Rear => "REAR",
            PhotoType::LeftSide => "LEFT_SIDE",
            PhotoType::RightSide => "RIGHT_SIDE",
            PhotoType::Interior => "INTERIOR",
            PhotoType::LicensePlate => "LICENSE_PLATE",
            PhotoType::StartPoint => "START_POINT",
            PhotoType::MiddlePoint => "MIDDLE_POINT",
            PhotoType::ModelPoint => "MODEL_POINT",
            PhotoType::EndPoint => "END_POINT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OVERVIEW" => Some(PhotoType::Overview),
            "DOCUMENT" => Some(PhotoType::Document),
            "SITE_SURVEY" => Some(PhotoType::SiteSurvey),
            "FRONT" => Some(PhotoType::Front),
            "REAR" => Some(PhotoType::Rear),
            "LEFT_SIDE" => Some(PhotoType::LeftSide),
            "RIGHT_SIDE" => Some(PhotoType::RightSide),
            "INTERIOR" => Some(PhotoType::Interior),
            "LICENSE_PLATE" => Some(PhotoType::LicensePlate),
            "START_POINT" => Some(PhotoType::StartPoint),
            "MIDDLE_POINT" => Some(PhotoType::MiddlePoint),
            "MODEL_POINT" => Some(PhotoType::ModelPoint),
            "END_POINT" => Some(PhotoType::EndPoint),
            _ => None,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            PhotoType::Overview | PhotoType::Document | PhotoType::SiteSurvey => {
                EntityType::Project
            }
            PhotoType::Front
            | PhotoType::Rear
            | PhotoType::LeftSide
            | PhotoType::RightSide
            | PhotoType::Interior
            | PhotoType::LicensePlate => EntityType::Vehicle,
            PhotoType::StartPoint
            | PhotoType::MiddlePoint
            | PhotoType::ModelPoint
            | PhotoType::EndPoint => EntityType::TrackPoint,
        }
    }

    /// Point type a track point photo belongs to
    pub fn point_type(&self) -> Option<PointType> {
        match self {
            PhotoType::StartPoint => Some(PointType::Start),
            PhotoType::MiddlePoint => Some(PointType::Middle),
            PhotoType::ModelPoint => Some(PointType::Model),
            PhotoType::EndPoint => Some(PointType::End),
            _ => None,
        }
    }

    pub fn for_point_type(point_type: PointType) -> Self {
        match point_type {
            PointType::Start => PhotoType::StartPoint,
            PointType::Middle => PhotoType::MiddlePoint,
            PointType::Model => PhotoType::ModelPoint,
            PointType::End => PhotoType::EndPoint,
        }
    }
}

sql_text_enum!(PhotoType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Pending,
    Uploaded,
    /// Given up after repeated or permanent failures, until retried by the user
    Abandoned,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Uploaded => "UPLOADED",
            UploadStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(UploadStatus::Pending),
            "UPLOADED" => Some(UploadStatus::Uploaded),
            "ABANDONED" => Some(UploadStatus::Abandoned),
            _ => None,
        }
    }
}

sql_text_enum!(UploadStatus);

/// Typed reference to a photo owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Project(Uuid),
    Vehicle(Uuid),
    TrackPoint(Uuid),
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        match entity_type {
            EntityType::Project => EntityRef::Project(id),
            EntityType::Vehicle => EntityRef::Vehicle(id),
            EntityType::TrackPoint => EntityRef::TrackPoint(id),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            EntityRef::Project(id) | EntityRef::Vehicle(id) | EntityRef::TrackPoint(id) => *id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRef::Project(_) => EntityType::Project,
            EntityRef::Vehicle(_) => EntityType::Vehicle,
            EntityRef::TrackPoint(_) => EntityType::TrackPoint,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.entity_type(), self.id())
    }
}

/// A captured image attached to one entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: EntityType,
    pub photo_type: PhotoType,
    /// Absolute path of the image file
    pub path: String,
    pub file_name: String,
    /// Per (entity, photo type) counter starting at 0
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_uploaded: bool,
    pub upload_status: UploadStatus,
    pub upload_attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Photo {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.entity_id)
    }
}

impl<'r> TryFrom<&Row<'r>> for Photo {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'r>) -> Result<Self, Self::Error> {
        Ok(Photo {
            id: uuid_column(row, 0)?,
            entity_id: uuid_column(row, 1)?,
            entity_type: row.get(2)?,
            photo_type: row.get(3)?,
            path: row.get(4)?,
            file_name: row.get(5)?,
            sequence: row.get(6)?,
            timestamp: row.get(7)?,
            latitude: row.get(8)?,
            longitude: row.get(9)?,
            is_uploaded: row.get(10)?,
            upload_status: row.get(11)?,
            upload_attempts: row.get(12)?,
            last_error: row.get(13)?,
            next_attempt_at: row.get(14)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoFilter {
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<EntityType>,
    pub photo_type: Option<PhotoType>,
    pub is_uploaded: Option<bool>,
    pub upload_status: Option<UploadStatus>,
}

impl PhotoFilter {
    pub fn for_entity(entity: EntityRef) -> Self {
        Self {
            entity_id: Some(entity.id()),
            entity_type: Some(entity.entity_type()),
            ..Default::default()
        }
    }

    pub fn with_status(status: UploadStatus) -> Self {
        Self {
            upload_status: Some(status),
            ..Default::default()
        }
    }
}

impl RecordFilter for PhotoFilter {
    const PREDICATE: &'static str = "(?1 IS NULL OR entity_id = ?1) \
        AND (?2 IS NULL OR entity_type = ?2) \
        AND (?3 IS NULL OR photo_type = ?3) \
        AND (?4 IS NULL OR is_uploaded = ?4) \
        AND (?5 IS NULL OR upload_status = ?5)";

    fn params(&self) -> Vec<Value> {
        vec![
            opt_uuid(self.entity_id),
            opt_text(self.entity_type),
            opt_text(self.photo_type),
            Value::from(self.is_uploaded),
            opt_text(self.upload_status),
        ]
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.entity_id
    }
}

impl Record for Photo {
    const KIND: EntityKind = EntityKind::Photo;
    const TABLE: &'static str = "photos";
    const COLUMNS: &'static str = "id, entity_id, entity_type, photo_type, path, file_name, \
        sequence, timestamp, latitude, longitude, is_uploaded, upload_status, \
        upload_attempts, last_error, next_attempt_at";
    const ORDER_BY: &'static str = "timestamp DESC, rowid DESC";

    type Filter = PhotoFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn parent_id(&self) -> Option<Uuid> {
        Some(self.entity_id)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Self::try_from(row)
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO photos (id, entity_id, entity_type, photo_type, path, file_name,
                sequence, timestamp, latitude, longitude, is_uploaded, upload_status,
                upload_attempts, last_error, next_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            (
                self.id.to_string(),
                self.entity_id.to_string(),
                self.entity_type,
                self.photo_type,
                &self.path,
                &self.file_name,
                self.sequence,
                self.timestamp,
                self.latitude,
                self.longitude,
                self.is_uploaded,
                self.upload_status,
                self.upload_attempts,
                &self.last_error,
                self.next_attempt_at,
            ),
        )?;
        Ok(())
    }
}
