pub mod photo;
pub mod project;
pub mod sync_settings;
pub mod track;
pub mod track_point;
pub mod vehicle;

pub use photo::{EntityRef, EntityType, Photo, PhotoFilter, PhotoType, UploadStatus};
pub use project::{Project, ProjectFilter};
pub use sync_settings::SyncSettings;
pub use track::{Track, TrackFilter, TrackState};
pub use track_point::{NewTrackPoint, PointType, TrackPoint, TrackPointFilter};
pub use vehicle::{Vehicle, VehicleFilter};

use crate::error::AppError;
use rusqlite::Row;
use uuid::Uuid;

/// Maximum length of user supplied names
pub const MAX_NAME_LEN: usize = 100;

/// Stores a fieldless enum as its SCREAMING_SNAKE text form.
/// The enum needs `as_str(&self) -> &'static str` and `from_str(&str) -> Option<Self>`.
macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl rusqlite::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::from_str(s).ok_or_else(|| {
                    rusqlite::types::FromSqlError::Other(
                        format!("unknown {} '{}'", stringify!($ty), s).into(),
                    )
                })
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
pub(crate) use sql_text_enum;

/// Reads a UUID stored as TEXT
pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn validate_name(field: &str, value: &str) -> Result<(), AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "{} must not be longer than {} characters",
            field, MAX_NAME_LEN
        )));
    }
    Ok(())
}

pub(crate) fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::Validation(format!(
            "Latitude {} is out of range",
            latitude
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::Validation(format!(
            "Longitude {} is out of range",
            longitude
        )));
    }
    Ok(())
}
