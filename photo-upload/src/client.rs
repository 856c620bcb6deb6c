//! HTTP implementation of the upload service contract

use crate::error::{UploadError, UploadResult};
use crate::models::{HealthStatus, ModuleType, UploadReceipt, UploadRequest};
use async_trait::async_trait;
use std::time::Duration;

/// Remote side of the photo sync
///
/// Implementations must be cheap to share between upload workers.
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Uploads one photo file with its module metadata
    async fn upload_photo(&self, request: &UploadRequest) -> UploadResult<UploadReceipt>;

    /// Removes every photo the server holds for a module
    async fn delete_module_photos(
        &self,
        module_id: &str,
        module_type: ModuleType,
    ) -> UploadResult<()>;

    /// Checks that the service is reachable
    async fn test_connection(&self) -> UploadResult<HealthStatus>;
}

/// Configuration for the HTTP upload client
#[derive(Debug, Clone)]
pub struct UploadClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for UploadClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://10.0.2.2:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// `reqwest` based upload client
pub struct HttpUploadClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUploadClient {
    /// Create a new upload client
    pub fn new(config: UploadClientConfig) -> UploadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UploadError::Other(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn scalar_fields(request: &UploadRequest) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("moduleId", request.module_id.clone()),
            ("moduleType", request.module_type.as_str().to_string()),
            ("photoType", request.photo_type.clone()),
        ];
        if let Some(name) = &request.project_name {
            fields.push(("projectName", name.clone()));
        }
        if let Some(lat) = request.latitude {
            fields.push(("latitude", lat.to_string()));
        }
        if let Some(lon) = request.longitude {
            fields.push(("longitude", lon.to_string()));
        }
        fields
    }
}

#[async_trait]
impl UploadApi for HttpUploadClient {
    async fn upload_photo(&self, request: &UploadRequest) -> UploadResult<UploadReceipt> {
        let data = tokio::fs::read(&request.file_path).await?;
        let size = data.len();

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(request.file_name.clone())
            .mime_str("image/jpeg")
            .map_err(|e| UploadError::Other(format!("Invalid MIME type: {}", e)))?;

        let fields = Self::scalar_fields(request);
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &fields {
            form = form.text(*name, value.clone());
        }
        form = form.part("photo", part);

        // The receiving controller binds scalars from the query string, so they go in both.
        let response = self
            .client
            .post(self.url("photo/upload"))
            .query(&fields)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            log::warn!(
                "Upload of {} rejected with {}",
                request.file_name,
                status.as_u16()
            );
            return Err(UploadError::from_status(status.as_u16(), &body));
        }

        let receipt = match serde_json::from_str::<UploadReceipt>(&body) {
            Ok(receipt) => receipt,
            Err(e) => {
                log::warn!(
                    "Upload of {} succeeded but response was not JSON: {}",
                    request.file_name,
                    e
                );
                UploadReceipt::default()
            }
        };

        log::info!(
            "Uploaded {} ({} bytes) to {} {}",
            request.file_name,
            size,
            request.module_type,
            request.module_id
        );
        Ok(receipt)
    }

    async fn delete_module_photos(
        &self,
        module_id: &str,
        module_type: ModuleType,
    ) -> UploadResult<()> {
        let response = self
            .client
            .delete(self.url("photo/delete"))
            .query(&[("moduleId", module_id), ("moduleType", module_type.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::from_status(status.as_u16(), &body));
        }

        log::info!("Deleted remote photos of {} {}", module_type, module_id);
        Ok(())
    }

    async fn test_connection(&self) -> UploadResult<HealthStatus> {
        let response = self.client.get(self.url("photo/test")).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::from_status(status.as_u16(), &body));
        }

        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| UploadError::Other(format!("Invalid health response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_url_joining() {
        let client = HttpUploadClient::new(UploadClientConfig {
            base_url: "http://localhost:5000/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.url("/photo/upload"), "http://localhost:5000/photo/upload");
        assert_eq!(client.url("photo/test"), "http://localhost:5000/photo/test");
    }

    #[test]
    fn test_scalar_fields_skip_missing_values() {
        let request = UploadRequest {
            file_path: PathBuf::from("/tmp/a.jpg"),
            file_name: "a.jpg".to_string(),
            module_id: "track-1".to_string(),
            module_type: ModuleType::Track,
            photo_type: "START_POINT".to_string(),
            project_name: Some("Demo".to_string()),
            latitude: None,
            longitude: None,
        };

        let fields = HttpUploadClient::scalar_fields(&request);
        assert_eq!(
            fields,
            vec![
                ("moduleId", "track-1".to_string()),
                ("moduleType", "TRACK".to_string()),
                ("photoType", "START_POINT".to_string()),
                ("projectName", "Demo".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let client = HttpUploadClient::new(UploadClientConfig::default()).unwrap();
        let request = UploadRequest {
            file_path: PathBuf::from("/definitely/not/here.jpg"),
            file_name: "here.jpg".to_string(),
            module_id: "p".to_string(),
            module_type: ModuleType::Project,
            photo_type: "OVERVIEW".to_string(),
            project_name: None,
            latitude: None,
            longitude: None,
        };

        let err = client.upload_photo(&request).await.unwrap_err();
        assert!(matches!(err, UploadError::IoError(_)));
        assert!(!err.is_retryable());
    }
}
