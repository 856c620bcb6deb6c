use crate::services::upload_service::SyncEngine;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Entries kept in the session log
const SYNC_LOG_CAPACITY: usize = 500;

/// In-memory session log entry (volatile, lost on restart)
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub ts_ms: i64,
    pub photos_uploaded: usize,
    pub photos_failed: usize,
    pub photos_abandoned: usize,
}

/// Bounded log of completed sync cycles
#[derive(Debug, Default)]
pub struct SyncLog {
    entries: Mutex<VecDeque<SyncLogEntry>>,
}

impl SyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: SyncLogEntry) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push_back(entry);
            while guard.len() > SYNC_LOG_CAPACITY {
                guard.pop_front();
            }
        }
    }

    /// Oldest first
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Starts the background sync loop.
///
/// Runs `sync_pending` every `interval` and whenever the engine is woken (after
/// a capture). Ends when `SyncEngine::cancel_all` is called.
pub fn start_background_sync(engine: Arc<SyncEngine>, interval: Duration) -> JoinHandle<()> {
    log::info!(
        "Starting background sync with {} second interval",
        interval.as_secs()
    );

    tokio::spawn(async move {
        let mut shutdown = engine.shutdown_signal();

        while !engine.is_stopped() {
            match engine.sync_pending().await {
                Ok(report) => {
                    if report.attempted > 0 {
                        log::info!("Background sync completed: {:?}", report);
                    }
                    engine.record_cycle(&report);
                }
                Err(e) => log::error!("Background sync error: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = engine.woken() => log::debug!("Background sync woken"),
                _ = shutdown.changed() => {}
            }
        }

        log::info!("Background sync stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Store;
    use crate::models::{EntityRef, Photo, PhotoFilter, PhotoType, UploadStatus};
    use crate::services::test_support::{FakeUploadApi, Reply};
    use crate::services::upload_service::RetryPolicy;
    use crate::services::{project_service, vehicle_service};
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(uploaded: usize) -> SyncLogEntry {
        SyncLogEntry {
            ts_ms: 0,
            photos_uploaded: uploaded,
            photos_failed: 0,
            photos_abandoned: 0,
        }
    }

    #[test]
    fn test_sync_log_is_bounded() {
        let log = SyncLog::new();
        for i in 0..(SYNC_LOG_CAPACITY + 20) {
            log.append(entry(i));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), SYNC_LOG_CAPACITY);
        assert_eq!(entries[0].photos_uploaded, 20);
        assert_eq!(entries.last().unwrap().photos_uploaded, SYNC_LOG_CAPACITY + 19);
    }

    #[tokio::test]
    async fn test_background_loop_uploads_and_stops() {
        let store = Store::open_in_memory().unwrap();
        let project =
            project_service::create_project(&store, "Depot".to_string(), String::new()).unwrap();
        let vehicle = vehicle_service::create_vehicle(
            &store,
            project.id,
            "Crane".to_string(),
            "K-1".to_string(),
            String::new(),
            String::new(),
        )
        .unwrap();
        let photo = Photo {
            id: Uuid::new_v4(),
            entity_id: vehicle.id,
            entity_type: EntityRef::Vehicle(vehicle.id).entity_type(),
            photo_type: PhotoType::Front,
            path: "/tmp/Depot_Crane_FRONT_0.jpg".to_string(),
            file_name: "Depot_Crane_FRONT_0.jpg".to_string(),
            sequence: 0,
            timestamp: Utc::now(),
            latitude: None,
            longitude: None,
            is_uploaded: false,
            upload_status: UploadStatus::Pending,
            upload_attempts: 0,
            last_error: None,
            next_attempt_at: None,
        };
        store.put(&photo).unwrap();

        let api = Arc::new(FakeUploadApi::new(Reply::Ok));
        let engine = Arc::new(SyncEngine::new(store.clone(), api.clone(), RetryPolicy::default()));
        let mut uploaded = store.subscribe::<Photo>(PhotoFilter {
            is_uploaded: Some(true),
            ..Default::default()
        });
        assert_eq!(uploaded.next().await.unwrap().unwrap().len(), 0);

        let handle = start_background_sync(engine.clone(), Duration::from_secs(3600));
        let done = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let photos = uploaded.next().await.unwrap().unwrap();
                if photos.len() == 1 {
                    break;
                }
            }
        })
        .await;
        assert!(done.is_ok());

        engine.cancel_all();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(api.call_count(), 1);
        assert!(!engine.session_log().entries().is_empty());
    }
}
