// src/session.rs

use std::sync::Arc;

use crate::{
    api::ExamApi,
    channel::{
        LiveChannel,
        socket::{PushConnection, SocketOptions},
    },
    collaborators::{ErrorReporter, Navigator},
    config::Config,
    error::SyncError,
    models::attempt::RankingEntry,
    refresh::{RefreshClient, RefreshDebouncer, RefreshMode, RefreshOutcome},
    scheduler::FallbackScheduler,
    state::StoreHandle,
    utils::jwt::professor_id_from_token,
};

/// One mounted "Exam Windows" view: Store, refresh, push channel and timers.
///
/// Everything is released by [`Session::teardown`]; dropping the session
/// detaches the Store and stops the background tasks as well.
pub struct Session {
    store: StoreHandle,
    refresh: Arc<RefreshClient>,
    debouncer: Arc<RefreshDebouncer>,
    channel: Arc<LiveChannel>,
    scheduler: FallbackScheduler,
    connection: Option<PushConnection>,
}

impl Session {
    /// Initial foreground load, then channel and timers.
    ///
    /// Fails only when the session token is rejected; a push channel that
    /// cannot be opened leaves the session on polling.
    pub async fn mount(
        config: &Config,
        api: Arc<dyn ExamApi>,
        navigator: Arc<dyn Navigator>,
        errors: Arc<dyn ErrorReporter>,
    ) -> Result<Self, SyncError> {
        let store = StoreHandle::new();
        let refresh = Arc::new(RefreshClient::new(
            api,
            store.clone(),
            navigator,
            errors,
            config.login_path.clone(),
        ));

        if refresh.refresh(RefreshMode::Foreground).await == RefreshOutcome::Unauthorized {
            store.detach();
            return Err(SyncError::Unauthorized);
        }

        let debouncer = Arc::new(RefreshDebouncer::spawn(
            refresh.clone(),
            config.refresh_debounce(),
        ));
        let channel = Arc::new(LiveChannel::new(store.clone(), debouncer.clone()));
        let scheduler = FallbackScheduler::spawn(
            refresh.clone(),
            channel.subscribe_state(),
            config.safety_interval(),
            config.fallback_interval(),
        );

        let professor_id = match &config.professor_id {
            Some(id) => Ok(id.clone()),
            None => professor_id_from_token(&config.session_token),
        };
        let connection = match professor_id {
            Ok(professor_id) => Some(PushConnection::spawn(
                channel.clone(),
                SocketOptions {
                    url: config.ws_url.clone(),
                    token: config.session_token.clone(),
                    professor_id,
                    reconnect_delay: config.reconnect_delay(),
                },
            )),
            Err(e) => {
                tracing::warn!("Push channel disabled, relying on polling: {}", e);
                None
            }
        };

        tracing::info!("Exam windows session mounted");
        Ok(Self {
            store,
            refresh,
            debouncer,
            channel,
            scheduler,
            connection,
        })
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn refresh_client(&self) -> &Arc<RefreshClient> {
        &self.refresh
    }

    pub fn channel(&self) -> &Arc<LiveChannel> {
        &self.channel
    }

    pub fn scheduler(&self) -> &FallbackScheduler {
        &self.scheduler
    }

    /// User-requested reload.
    pub async fn reload(&self) -> RefreshOutcome {
        self.refresh.refresh(RefreshMode::Foreground).await
    }

    pub async fn ranking(&self, window_id: i64) -> Result<Vec<RankingEntry>, SyncError> {
        self.refresh.load_ranking(window_id).await
    }

    /// Closes the channel, clears both timers and the pending debounced refresh.
    pub async fn teardown(mut self) {
        self.store.detach();
        self.scheduler.shutdown();
        self.debouncer.stop();
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        tracing::info!("Exam windows session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.store.detach();
        self.debouncer.stop();
    }
}
