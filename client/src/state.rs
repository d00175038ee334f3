// src/state.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, watch};

use crate::models::{ExamWindow, LifecycleState, WindowPatch, exam::Exam};

/// Client-side cache of the professor's exam windows.
///
/// The server is the source of truth: full refreshes replace everything,
/// incremental patches only touch windows that are already cached.
#[derive(Debug, Default, Clone)]
pub struct Store {
    windows: Vec<ExamWindow>,
    exams: Vec<Exam>,
    last_updated_at: Option<DateTime<Utc>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full window list with a server snapshot.
    pub fn replace_all(&mut self, windows: Vec<ExamWindow>) {
        self.windows = windows;
        self.touch();
    }

    pub fn replace_exams(&mut self, exams: Vec<Exam>) {
        self.exams = exams;
        self.touch();
    }

    /// Shallow-merges `patch` into the window with `window_id`.
    ///
    /// Returns `false` without inserting anything when the id is unknown.
    pub fn apply_patch(&mut self, window_id: i64, patch: &WindowPatch) -> bool {
        let Some(window) = self.windows.iter_mut().find(|w| w.id == window_id) else {
            return false;
        };
        patch.merge_into(window);
        self.touch();
        true
    }

    pub fn touch(&mut self) {
        self.last_updated_at = Some(Utc::now());
    }

    pub fn get(&self, window_id: i64) -> Option<&ExamWindow> {
        self.windows.iter().find(|w| w.id == window_id)
    }

    pub fn windows(&self) -> &[ExamWindow] {
        &self.windows
    }

    pub fn exams(&self) -> &[Exam] {
        &self.exams
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_updated_at
    }

    /// Windows in one lifecycle state, in server order. Backs the tabbed views.
    pub fn by_state(&self, state: LifecycleState) -> impl Iterator<Item = &ExamWindow> {
        self.windows.iter().filter(move |w| w.state == state)
    }
}

/// Shared handle to the [`Store`] owned by one mounted view.
///
/// Once [`StoreHandle::detach`] is called (view torn down), every mutation is
/// dropped, so fetches that complete late cannot write into a discarded cache.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<RwLock<Store>>,
    attached: Arc<AtomicBool>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreHandle {
    pub fn new() -> Self {
        Self::from_store(Store::new())
    }

    pub fn from_store(store: Store) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(store)),
            attached: Arc::new(AtomicBool::new(true)),
            revision: Arc::new(revision),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.read().await
    }

    /// Runs `f` under a single write guard, so read-decide-write is never split.
    ///
    /// Returns `None` once the handle is detached.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Store) -> R) -> Option<R> {
        if !self.is_attached() {
            return None;
        }
        let result = {
            let mut store = self.inner.write().await;
            f(&mut store)
        };
        self.revision.send_modify(|rev| *rev += 1);
        Some(result)
    }

    pub async fn replace_all(&self, windows: Vec<ExamWindow>) -> bool {
        self.update(|s| s.replace_all(windows)).await.is_some()
    }

    pub async fn apply_patch(&self, window_id: i64, patch: &WindowPatch) -> bool {
        self.update(|s| s.apply_patch(window_id, patch))
            .await
            .unwrap_or(false)
    }

    pub async fn get(&self, window_id: i64) -> Option<ExamWindow> {
        self.inner.read().await.get(window_id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<ExamWindow> {
        self.inner.read().await.windows().to_vec()
    }

    /// Receiver that observes a new revision after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}
