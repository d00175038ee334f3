// src/channel/mod.rs

//! Live update channel: applies push events to the Store.
//!
//! The transport lives in [`socket`]; this module only decides what each
//! event does to the cache, so it can be driven directly in tests.

pub mod events;
pub mod latency;
pub mod socket;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, watch};

use crate::{
    reconcile::{Decision, Incoming, decide},
    refresh::RefreshDebouncer,
    state::StoreHandle,
};
use events::{ChannelEvent, Frame, PONG_EVENT, normalize};
use latency::{LatencyStats, LatencyTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// What one event did to the Store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventReport {
    pub applied: usize,
    pub discarded: usize,
    pub refresh_scheduled: bool,
}

pub struct LiveChannel {
    store: StoreHandle,
    debouncer: Arc<RefreshDebouncer>,
    latency: Mutex<LatencyTracker>,
    state: watch::Sender<ChannelState>,
}

impl LiveChannel {
    pub fn new(store: StoreHandle, debouncer: Arc<RefreshDebouncer>) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            store,
            debouncer,
            latency: Mutex::new(LatencyTracker::new()),
            state,
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn set_state(&self, next: ChannelState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!("Push channel {} -> {}", previous, next);
        }
    }

    pub async fn latency_stats(&self) -> Option<LatencyStats> {
        self.latency.lock().await.stats()
    }

    pub async fn latency_samples(&self) -> usize {
        self.latency.lock().await.len()
    }

    /// Handles one raw text frame. Returns the reply to send back, if any.
    pub async fn handle_text(&self, text: &str) -> Option<Frame> {
        let Some(frame) = Frame::decode(text) else {
            tracing::warn!("Discarding undecodable push frame ({} bytes)", text.len());
            return None;
        };
        self.handle_event(&frame.event, &frame.data).await
    }

    pub async fn handle_event(&self, name: &str, data: &Value) -> Option<Frame> {
        match normalize(name, data) {
            Some(ChannelEvent::LatencyPing(payload)) => Some(Frame::new(PONG_EVENT, payload)),
            Some(event) => {
                self.apply(event).await;
                None
            }
            None => {
                tracing::debug!("Discarding push event '{}'", name);
                None
            }
        }
    }

    /// Applies a normalized event through the reconciliation rules.
    pub async fn apply(&self, event: ChannelEvent) -> EventReport {
        match event {
            ChannelEvent::StatusChange {
                emitted_at_ms,
                changes,
            } => {
                if let Some(emitted) = emitted_at_ms {
                    let received = Utc::now().timestamp_millis();
                    let mut latency = self.latency.lock().await;
                    for _ in &changes {
                        latency.record(emitted, received);
                    }
                }

                let report = self
                    .store
                    .update(|store| {
                        let mut report = EventReport::default();
                        for change in &changes {
                            let decision =
                                decide(store.get(change.window_id), &Incoming::State(change.state));
                            match decision.patch() {
                                Some(patch) => {
                                    store.apply_patch(change.window_id, patch);
                                    report.applied += 1;
                                    report.refresh_scheduled |= decision.wants_refresh();
                                }
                                None => {
                                    tracing::debug!(
                                        "Status change for window {} discarded: {:?}",
                                        change.window_id,
                                        decision
                                    );
                                    report.discarded += 1;
                                }
                            }
                        }
                        report
                    })
                    .await
                    .unwrap_or_default();

                if report.refresh_scheduled {
                    self.debouncer.trigger();
                }
                report
            }
            ChannelEvent::EnrollmentChange {
                window_id,
                count,
                state,
            } => {
                self.apply_single(window_id, Incoming::Enrollment { count, state })
                    .await
            }
            ChannelEvent::WindowToggle { window_id, active } => {
                self.apply_single(window_id, Incoming::Visibility(active))
                    .await
            }
            ChannelEvent::LatencyPing(_) => EventReport::default(),
        }
    }

    async fn apply_single(&self, window_id: i64, incoming: Incoming) -> EventReport {
        self.store
            .update(|store| {
                let decision = decide(store.get(window_id), &incoming);
                let report = match &decision {
                    Decision::Apply(patch) | Decision::ApplyAndRefresh(patch) => {
                        store.apply_patch(window_id, patch);
                        EventReport {
                            applied: 1,
                            ..EventReport::default()
                        }
                    }
                    Decision::Discard(reason) => {
                        tracing::debug!("Event for window {} discarded: {:?}", window_id, reason);
                        EventReport {
                            discarded: 1,
                            ..EventReport::default()
                        }
                    }
                };
                store.touch();
                report
            })
            .await
            .unwrap_or_default()
    }
}
