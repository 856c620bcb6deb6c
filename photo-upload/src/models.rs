use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Module a photo is filed under on the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleType {
    Project,
    Vehicle,
    Track,
}

impl ModuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Project => "PROJECT",
            ModuleType::Vehicle => "VEHICLE",
            ModuleType::Track => "TRACK",
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to upload one photo
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    /// Absolute path of the local file
    pub file_path: PathBuf,
    /// File name presented to the server
    pub file_name: String,
    pub module_id: String,
    pub module_type: ModuleType,
    pub photo_type: String,
    pub project_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Body returned by a successful upload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadReceipt {
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub upload_time: Option<String>,
}

/// Answer of `GET /photo/test`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}
