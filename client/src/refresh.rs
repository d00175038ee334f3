// src/refresh.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{
    api::ExamApi,
    collaborators::{ErrorReporter, Navigator},
    error::SyncError,
    models::{ExamWindow, attempt::RankingEntry, exam::Exam},
    ranking::build_ranking,
    state::StoreHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// User-initiated: shows the loading flag and surfaces errors.
    Foreground,
    /// Timer or event initiated: silent, coalesced, errors only logged.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { windows: usize },
    /// A background refresh was already in flight; nothing was sent.
    Coalesced,
    Unauthorized,
    Failed,
    /// The owning view was torn down before the response arrived.
    Detached,
}

/// Authoritative refetch of the exam catalog and window list.
pub struct RefreshClient {
    api: Arc<dyn ExamApi>,
    store: StoreHandle,
    navigator: Arc<dyn Navigator>,
    errors: Arc<dyn ErrorReporter>,
    login_path: String,
    background_in_flight: AtomicBool,
    foreground_in_flight: AtomicUsize,
    loading: watch::Sender<bool>,
}

/// Clears the background in-flight flag when the refresh ends or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Holds the loading flag up while at least one foreground refresh runs.
struct Loading<'a> {
    count: &'a AtomicUsize,
    flag: &'a watch::Sender<bool>,
}

impl<'a> Loading<'a> {
    fn start(count: &'a AtomicUsize, flag: &'a watch::Sender<bool>) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        flag.send_replace(true);
        Loading { count, flag }
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.flag.send_replace(false);
        }
    }
}

impl RefreshClient {
    pub fn new(
        api: Arc<dyn ExamApi>,
        store: StoreHandle,
        navigator: Arc<dyn Navigator>,
        errors: Arc<dyn ErrorReporter>,
        login_path: impl Into<String>,
    ) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            api,
            store,
            navigator,
            errors,
            login_path: login_path.into(),
            background_in_flight: AtomicBool::new(false),
            foreground_in_flight: AtomicUsize::new(0),
            loading,
        }
    }

    /// Observable loading flag for the UI. Only foreground refreshes raise it.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Fetches the catalog, then the window list, and replaces the Store.
    ///
    /// Background refreshes use lock-and-drop: a trigger while another
    /// background refresh is in flight returns [`RefreshOutcome::Coalesced`].
    pub async fn refresh(&self, mode: RefreshMode) -> RefreshOutcome {
        let _in_flight = match mode {
            RefreshMode::Background => match InFlight::acquire(&self.background_in_flight) {
                Some(guard) => Some(guard),
                None => {
                    tracing::debug!("Background refresh already in flight, dropping trigger");
                    return RefreshOutcome::Coalesced;
                }
            },
            RefreshMode::Foreground => None,
        };
        let _loading = (mode == RefreshMode::Foreground)
            .then(|| Loading::start(&self.foreground_in_flight, &self.loading));

        match self.fetch_snapshot().await {
            Ok((exams, windows)) => {
                let count = windows.len();
                let applied = self
                    .store
                    .update(|store| {
                        store.replace_exams(exams);
                        store.replace_all(windows);
                    })
                    .await;
                match applied {
                    Some(()) => {
                        tracing::debug!("Refresh ({:?}) applied {} windows", mode, count);
                        RefreshOutcome::Applied { windows: count }
                    }
                    None => RefreshOutcome::Detached,
                }
            }
            Err(SyncError::Unauthorized) => {
                self.handle_unauthorized();
                RefreshOutcome::Unauthorized
            }
            Err(e) => {
                match mode {
                    RefreshMode::Foreground => {
                        tracing::error!("Failed to load exam windows: {}", e);
                        self.errors
                            .show_error(&format!("Could not load exam windows: {}", e));
                    }
                    RefreshMode::Background if e.is_transient() => {
                        tracing::warn!("Background refresh failed, next cycle will retry: {}", e);
                    }
                    RefreshMode::Background => {
                        tracing::error!("Background refresh failed: {}", e);
                    }
                }
                RefreshOutcome::Failed
            }
        }
    }

    /// Loads and aggregates the ranking of one window.
    pub async fn load_ranking(&self, window_id: i64) -> Result<Vec<RankingEntry>, SyncError> {
        match self.api.fetch_ranking(window_id).await {
            Ok(attempts) => Ok(build_ranking(attempts)),
            Err(SyncError::Unauthorized) => {
                self.handle_unauthorized();
                Err(SyncError::Unauthorized)
            }
            Err(e) => {
                tracing::error!("Failed to load ranking for window {}: {}", window_id, e);
                Err(e)
            }
        }
    }

    async fn fetch_snapshot(&self) -> Result<(Vec<Exam>, Vec<ExamWindow>), SyncError> {
        let exams = self.api.fetch_exams().await?;
        let mut windows = self.api.fetch_windows().await?;

        let titles: HashMap<i64, &str> = exams.iter().map(|e| (e.id, e.title.as_str())).collect();
        for window in &mut windows {
            window.exam_title = window
                .exam_id
                .and_then(|id| titles.get(&id))
                .map(|t| t.to_string());
        }

        Ok((exams, windows))
    }

    fn handle_unauthorized(&self) {
        if !self.store.is_attached() {
            return;
        }
        tracing::warn!("REST API answered 401, aborting refresh");
        self.navigator.redirect_to_login(&self.login_path);
    }
}

/// Collapses bursts of triggers into one background refresh after a quiet period.
pub struct RefreshDebouncer {
    trigger: mpsc::UnboundedSender<()>,
    pending: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RefreshDebouncer {
    pub fn spawn(client: Arc<RefreshClient>, delay: Duration) -> Self {
        let (trigger, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(debounce_loop(rx, client, delay, pending.clone()));
        Self {
            trigger,
            pending,
            task,
        }
    }

    /// Schedules (or pushes back) the next background refresh.
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::Release);
        if self.trigger.send(()).is_err() {
            self.pending.store(false, Ordering::Release);
        }
    }

    /// Whether a refresh is scheduled but has not started yet.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.task.abort();
        self.pending.store(false, Ordering::Release);
    }
}

impl Drop for RefreshDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<()>,
    client: Arc<RefreshClient>,
    delay: Duration,
    pending: Arc<AtomicBool>,
) {
    while rx.recv().await.is_some() {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                msg = rx.recv() => match msg {
                    Some(()) => sleep.as_mut().reset(Instant::now() + delay),
                    None => return,
                },
            }
        }
        pending.store(false, Ordering::Release);
        client.refresh(RefreshMode::Background).await;
    }
}
