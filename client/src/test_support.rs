// src/test_support.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    api::ExamApi,
    collaborators::{ErrorReporter, Navigator},
    error::SyncError,
    models::{ExamWindow, attempt::AttemptResult, exam::Exam},
    refresh::RefreshClient,
    state::StoreHandle,
};

/// In-memory [`ExamApi`] that counts calls and can be gated or made to fail.
#[derive(Default)]
pub struct FakeApi {
    pub windows: Mutex<Vec<ExamWindow>>,
    pub exams: Vec<Exam>,
    pub attempts: Vec<AttemptResult>,
    pub window_calls: AtomicUsize,
    pub unauthorized: AtomicBool,
    pub failing: AtomicBool,
    pub gate: Option<Arc<Notify>>,
}

impl FakeApi {
    pub fn with_windows(windows: Vec<ExamWindow>) -> Self {
        Self {
            windows: Mutex::new(windows),
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.window_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExamApi for FakeApi {
    async fn fetch_exams(&self) -> Result<Vec<Exam>, SyncError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(SyncError::Unauthorized);
        }
        Ok(self.exams.clone())
    }

    async fn fetch_windows(&self) -> Result<Vec<ExamWindow>, SyncError> {
        self.window_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Network("connection reset".to_string()));
        }
        Ok(self.windows.lock().unwrap().clone())
    }

    async fn fetch_ranking(&self, _window_id: i64) -> Result<Vec<AttemptResult>, SyncError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(SyncError::Unauthorized);
        }
        Ok(self.attempts.clone())
    }
}

/// Records navigation and error-display calls.
#[derive(Default)]
pub struct Recorder {
    pub redirects: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

impl Navigator for Recorder {
    fn redirect_to_login(&self, login_path: &str) {
        self.redirects.lock().unwrap().push(login_path.to_string());
    }
}

impl ErrorReporter for Recorder {
    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

pub fn refresh_client(
    api: Arc<FakeApi>,
    store: StoreHandle,
) -> (Arc<RefreshClient>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let client = RefreshClient::new(api, store, recorder.clone(), recorder.clone(), "/login");
    (Arc::new(client), recorder)
}
