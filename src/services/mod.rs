pub mod background_sync;
pub mod photo_service;
pub mod project_service;
pub mod summary_service;
pub mod sync_service;
pub mod track_service;
pub mod upload_service;
pub mod vehicle_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use background_sync::start_background_sync;
pub use photo_service::PhotoService;
pub use upload_service::{RetryPolicy, SyncEngine, SyncReport};
