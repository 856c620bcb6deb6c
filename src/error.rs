use std::fmt;

/// Central error types for the survey capture pipeline
#[derive(Debug)]
pub enum AppError {
    /// Database error (rusqlite)
    Database(rusqlite::Error),
    /// Filesystem error
    Filesystem(std::io::Error),
    /// Validation error (e.g. invalid inputs)
    Validation(String),
    /// Referenced entity does not exist
    NotFound(String),
    /// Photo type or entity state does not allow this capture
    InvalidCaptureContext(String),
    /// Track lifecycle does not allow this point
    InvalidTransition(String),
    /// Sequence number already taken or not increasing
    SequenceConflict(String),
    /// Image could not be written to local storage
    StorageFailure(String),
    /// Entity still owns children and cannot be deleted
    HasChildren(String),
    /// Configuration could not be loaded
    Config(String),
    /// Remote service error
    Upload(photo_upload::UploadError),
    /// General error
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Filesystem(e) => write!(f, "Filesystem error: {}", e),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidCaptureContext(msg) => write!(f, "Invalid capture context: {}", msg),
            AppError::InvalidTransition(msg) => write!(f, "Invalid transition: {}", msg),
            AppError::SequenceConflict(msg) => write!(f, "Sequence conflict: {}", msg),
            AppError::StorageFailure(msg) => write!(f, "Storage failure: {}", msg),
            AppError::HasChildren(msg) => write!(f, "Still in use: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Upload(e) => write!(f, "{}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// Conversions from other error types
impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Filesystem(e)
    }
}

impl From<photo_upload::UploadError> for AppError {
    fn from(e: photo_upload::UploadError) -> Self {
        AppError::Upload(e)
    }
}

impl AppError {
    /// True for a UNIQUE constraint violation coming from SQLite
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            AppError::SequenceConflict(_) => true,
            _ => false,
        }
    }

    /// User-friendly error messages for UI
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred. Please try again.".to_string(),
            AppError::Filesystem(_) | AppError::StorageFailure(_) => {
                "The photo could not be saved. Please check storage permissions.".to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => format!("{} was not found.", msg),
            AppError::InvalidCaptureContext(msg) | AppError::InvalidTransition(msg) => msg.clone(),
            AppError::SequenceConflict(_) => "Please take the photo again.".to_string(),
            AppError::HasChildren(msg) => format!("{} still contains data.", msg),
            AppError::Config(msg) => format!("Invalid settings: {}", msg),
            AppError::Upload(_) => "The server could not be reached.".to_string(),
            AppError::Other(msg) => msg.clone(),
        }
    }
}
