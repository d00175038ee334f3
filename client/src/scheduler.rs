// src/scheduler.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    channel::ChannelState,
    refresh::{RefreshClient, RefreshMode},
};

/// A named periodic task with explicit start/stop.
///
/// The first tick fires one full period after `start`. Dropping the timer stops it.
pub struct IntervalTimer {
    name: &'static str,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl IntervalTimer {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            task: None,
        }
    }

    /// Starts ticking. A no-op when already active.
    pub fn start<F, Fut>(&mut self, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_active() {
            return;
        }
        let period = self.period;
        let name = self.name;
        tracing::debug!("Starting {} timer ({}s)", name, period.as_secs());
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tracing::trace!("{} timer fired", name);
                tick().await;
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!("Stopping {} timer", self.name);
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Safety and fallback polling around the live channel.
///
/// * Safety timer: background refresh every `safety` period, always.
/// * Fallback timer: background refresh every `fallback` period, only while
///   the channel is not connected.
pub struct FallbackScheduler {
    task: JoinHandle<()>,
    fallback_active: watch::Receiver<bool>,
}

impl FallbackScheduler {
    pub fn spawn(
        client: Arc<RefreshClient>,
        channel_state: watch::Receiver<ChannelState>,
        safety: Duration,
        fallback: Duration,
    ) -> Self {
        let (active_tx, fallback_active) = watch::channel(false);
        let task = tokio::spawn(supervise(client, channel_state, safety, fallback, active_tx));
        Self {
            task,
            fallback_active,
        }
    }

    pub fn is_fallback_active(&self) -> bool {
        *self.fallback_active.borrow()
    }

    /// Observes fallback polling being switched on and off.
    pub fn fallback_active(&self) -> watch::Receiver<bool> {
        self.fallback_active.clone()
    }

    /// Cancels both timers.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for FallbackScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type Tick = Pin<Box<dyn Future<Output = ()> + Send>>;

fn background_tick(client: Arc<RefreshClient>) -> impl FnMut() -> Tick {
    move || {
        let client = client.clone();
        Box::pin(async move {
            client.refresh(RefreshMode::Background).await;
        })
    }
}

async fn supervise(
    client: Arc<RefreshClient>,
    mut channel_state: watch::Receiver<ChannelState>,
    safety: Duration,
    fallback: Duration,
    active_tx: watch::Sender<bool>,
) {
    // Both timers live on this task's stack; aborting the task drops (and stops) them.
    let mut safety_timer = IntervalTimer::new("safety", safety);
    let mut fallback_timer = IntervalTimer::new("fallback", fallback);
    safety_timer.start(background_tick(client.clone()));

    loop {
        let state = *channel_state.borrow_and_update();
        if state == ChannelState::Connected {
            if fallback_timer.is_active() {
                tracing::info!("Push channel connected, stopping fallback polling");
            }
            fallback_timer.stop();
        } else if !fallback_timer.is_active() {
            tracing::warn!(
                "Push channel {}, polling every {}s",
                state,
                fallback.as_secs()
            );
            fallback_timer.start(background_tick(client.clone()));
        }
        active_tx.send_replace(fallback_timer.is_active());

        if channel_state.changed().await.is_err() {
            // Channel gone for good: keep polling until teardown.
            if !fallback_timer.is_active() {
                fallback_timer.start(background_tick(client.clone()));
                active_tx.send_replace(true);
            }
            std::future::pending::<()>().await;
        }
    }
}
