//! # Photo Upload
//!
//! Client for the survey photo upload service.
//!
//! The service exposes a small HTTP contract:
//! - `POST /photo/upload` (multipart) stores one photo for a module
//! - `DELETE /photo/delete?moduleId&moduleType` drops all photos of a module
//! - `GET /photo/test` reports service health
//!
//! [`UploadApi`] is the seam the sync engine talks to; [`HttpUploadClient`] is the
//! `reqwest` implementation of it.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use photo_upload::{HttpUploadClient, UploadClientConfig};
//!
//! let client = HttpUploadClient::new(UploadClientConfig {
//!     base_url: "http://10.0.2.2:5000".to_string(),
//!     timeout_secs: 30,
//! })?;
//! let health = client.test_connection().await?;
//! ```

pub mod client;
pub mod error;
pub mod models;

pub use client::{HttpUploadClient, UploadApi, UploadClientConfig};
pub use error::{UploadError, UploadResult};
pub use models::{HealthStatus, ModuleType, UploadReceipt, UploadRequest};
