/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while talking to the upload service
#[derive(Debug)]
pub enum UploadError {
    /// Network failure, timeout or 5xx answer. Worth retrying later.
    Transient(String),
    /// 4xx answer. Retrying the same request will not help.
    Permanent { status: u16, message: String },
    /// The local photo file could not be read
    IoError(std::io::Error),
    /// Client construction or request building failed
    Other(String),
}

impl UploadError {
    /// Whether the sync engine should schedule another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transient(_))
    }

    /// Maps a non-success HTTP status to the matching error class
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };

        if (400..500).contains(&status) {
            UploadError::Permanent { status, message }
        } else {
            UploadError::Transient(message)
        }
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Transient(msg) => write!(f, "Transient upload error: {}", msg),
            UploadError::Permanent { message, .. } => {
                write!(f, "Upload rejected: {}", message)
            }
            UploadError::IoError(e) => write!(f, "IO error: {}", e),
            UploadError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for UploadError {}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::IoError(err)
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => UploadError::from_status(status.as_u16(), &err.to_string()),
            None if err.is_builder() => UploadError::Other(err.to_string()),
            None => UploadError::Transient(err.to_string()),
        }
    }
}
