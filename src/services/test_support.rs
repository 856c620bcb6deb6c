//! Shared fixtures for service tests

use async_trait::async_trait;
use photo_upload::{
    HealthStatus, ModuleType, UploadApi, UploadError, UploadReceipt, UploadRequest, UploadResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// How the fake server answers an upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Ok,
    Transient,
    Permanent,
    /// Never answers, used to test cancellation
    Hang,
}

/// Scripted in-memory upload server
pub struct FakeUploadApi {
    script: Mutex<VecDeque<Reply>>,
    default_reply: Mutex<Reply>,
    pub uploads: Mutex<Vec<UploadRequest>>,
    pub deletes: Mutex<Vec<(String, ModuleType)>>,
    pub fail_deletes: Mutex<bool>,
    pub calls: AtomicUsize,
    /// Notified whenever an upload call starts
    pub started: Notify,
}

impl FakeUploadApi {
    pub fn new(default_reply: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(default_reply),
            uploads: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            fail_deletes: Mutex::new(false),
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    /// Replies used in order before falling back to the default
    pub fn script(&self, replies: &[Reply]) {
        self.script.lock().unwrap().extend(replies.iter().copied());
    }

    pub fn set_default(&self, reply: Reply) {
        *self.default_reply.lock().unwrap() = reply;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.file_name.clone())
            .collect()
    }
}

#[async_trait]
impl UploadApi for FakeUploadApi {
    async fn upload_photo(&self, request: &UploadRequest) -> UploadResult<UploadReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.default_reply.lock().unwrap());
        self.started.notify_one();

        match reply {
            Reply::Ok => {
                self.uploads.lock().unwrap().push(request.clone());
                Ok(UploadReceipt {
                    file_name: Some(request.file_name.clone()),
                    ..Default::default()
                })
            }
            Reply::Transient => Err(UploadError::from_status(503, "maintenance")),
            Reply::Permanent => Err(UploadError::from_status(400, "bad photo type")),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn delete_module_photos(&self, module_id: &str, module_type: ModuleType) -> UploadResult<()> {
        self.deletes
            .lock()
            .unwrap()
            .push((module_id.to_string(), module_type));
        if *self.fail_deletes.lock().unwrap() {
            return Err(UploadError::Transient("connection refused".to_string()));
        }
        Ok(())
    }

    async fn test_connection(&self) -> UploadResult<HealthStatus> {
        Ok(HealthStatus {
            status: "success".to_string(),
            message: "fake server".to_string(),
            timestamp: None,
        })
    }
}
