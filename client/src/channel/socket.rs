// src/channel/socket.rs

//! WebSocket transport for the live update channel.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message,
    },
};

use super::events::{Frame, JOIN_EVENT};
use super::{ChannelState, LiveChannel};
use crate::error::SyncError;

/// Connection parameters for the push endpoint.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub url: String,
    pub token: String,
    pub professor_id: String,
    pub reconnect_delay: Duration,
}

/// Background task owning the WebSocket connection.
///
/// Dropping it without [`PushConnection::close`] aborts the task.
pub struct PushConnection {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PushConnection {
    pub fn spawn(channel: Arc<LiveChannel>, options: SocketOptions) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(channel, options, shutdown_rx));
        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Sends a close frame (if connected) and waits briefly for the task to end.
    pub async fn close(mut self) {
        self.shutdown.send_replace(true);
        let Some(task) = self.task.take() else {
            return;
        };
        let abort = task.abort_handle();
        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            tracing::warn!("Push connection did not close in time, aborting");
            abort.abort();
        }
    }
}

impl Drop for PushConnection {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    channel: Arc<LiveChannel>,
    options: SocketOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        channel.set_state(ChannelState::Connecting);

        match session(&channel, &options, &mut shutdown).await {
            Ok(()) => tracing::info!("Push channel closed"),
            Err(e) => tracing::warn!("Push channel unavailable, polling until it returns: {}", e),
        }
        channel.set_state(ChannelState::Disconnected);

        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(options.reconnect_delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

async fn session(
    channel: &LiveChannel,
    options: &SocketOptions,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), SyncError> {
    let mut request = options.url.as_str().into_client_request()?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", options.token))
        .map_err(|e| SyncError::Config(format!("session token is not a valid header: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (stream, _) = tokio::select! {
        connected = connect_async(request) => connected?,
        _ = shutdown.changed() => return Ok(()),
    };
    let (mut write, mut read) = stream.split();

    let join = Frame::new(
        JOIN_EVENT,
        json!({ "professorId": options.professor_id, "token": options.token }),
    );
    write.send(Message::Text(join.encode()?.into())).await?;
    channel.set_state(ChannelState::Connected);

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = channel.handle_text(text.as_str()).await {
                        write.send(Message::Text(reply.encode()?.into())).await?;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = shutdown.changed() => {
                write.send(Message::Close(None)).await.ok();
                return Ok(());
            }
        }
    }
}
