// Image acquisition for the capture coordinator. Hardware cameras plug in
// through `CameraService`; the crate ships a file import implementation.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// Why no image could be written
#[derive(Debug)]
pub enum CaptureFailure {
    /// The user aborted the capture
    Cancelled,
    /// No camera or source image available
    Unavailable(String),
    /// The source produced no image data
    Empty,
    Io(std::io::Error),
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CaptureFailure::Cancelled => write!(f, "Capture cancelled"),
            CaptureFailure::Unavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            CaptureFailure::Empty => write!(f, "Captured image is empty"),
            CaptureFailure::Io(e) => write!(f, "Image could not be written: {}", e),
        }
    }
}

impl std::error::Error for CaptureFailure {}

impl From<std::io::Error> for CaptureFailure {
    fn from(e: std::io::Error) -> Self {
        CaptureFailure::Io(e)
    }
}

/// Camera collaborator: writes one image to `target` and returns where it ended up
#[async_trait]
pub trait CameraService: Send + Sync {
    async fn capture(&self, target: &Path) -> Result<PathBuf, CaptureFailure>;
}

/// Where the image of a capture request comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Take a new picture with the configured camera
    Camera,
    /// Import an existing image file
    File(PathBuf),
    /// Encoded image bytes already in memory
    Bytes(Vec<u8>),
}

/// Camera that "captures" by copying a fixed image file.
///
/// Used on machines without camera hardware and for batch imports.
pub struct FileImportCamera {
    source: PathBuf,
}

impl FileImportCamera {
    pub fn new(source: PathBuf) -> Self {
        Self { source }
    }
}

#[async_trait]
impl CameraService for FileImportCamera {
    async fn capture(&self, target: &Path) -> Result<PathBuf, CaptureFailure> {
        if !tokio::fs::try_exists(&self.source).await? {
            return Err(CaptureFailure::Unavailable(format!(
                "source image {} does not exist",
                self.source.display()
            )));
        }
        import_file(&self.source, target).await
    }
}

/// Camera that is never available
pub struct NoCamera;

#[async_trait]
impl CameraService for NoCamera {
    async fn capture(&self, _target: &Path) -> Result<PathBuf, CaptureFailure> {
        Err(CaptureFailure::Unavailable("no camera configured".to_string()))
    }
}

/// Copies an image file to `target`, creating parent directories
pub async fn import_file(source: &Path, target: &Path) -> Result<PathBuf, CaptureFailure> {
    ensure_parent(target).await?;
    let copied = tokio::fs::copy(source, target).await?;
    if copied == 0 {
        let _ = tokio::fs::remove_file(target).await;
        return Err(CaptureFailure::Empty);
    }
    Ok(target.to_path_buf())
}

/// Writes in-memory image bytes to `target`
pub async fn write_bytes(data: &[u8], target: &Path) -> Result<PathBuf, CaptureFailure> {
    if data.is_empty() {
        return Err(CaptureFailure::Empty);
    }
    ensure_parent(target).await?;
    tokio::fs::write(target, data).await?;
    Ok(target.to_path_buf())
}

async fn ensure_parent(target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
