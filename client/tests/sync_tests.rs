// tests/sync_tests.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use examline_sync::{
    Session,
    api::{ExamApi, HttpExamApi},
    channel::ChannelState,
    collaborators::{ErrorReporter, Navigator},
    config::Config,
    error::SyncError,
    refresh::RefreshOutcome,
    models::{ExamWindow, LifecycleState},
    state::StoreHandle,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;

/// In-memory stand-in for the Examline backend.
struct MockBackend {
    windows: Mutex<Value>,
    unauthorized: AtomicBool,
    window_hits: AtomicUsize,
    ws_auth: Mutex<Vec<String>>,
    ws_closed: AtomicUsize,
    received: Mutex<Vec<Value>>,
    outbound: broadcast::Sender<String>,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        let (outbound, _) = broadcast::channel(16);
        Arc::new(Self {
            windows: Mutex::new(json!([
                {
                    "id": 7,
                    "examenId": 1,
                    "estado": "programada",
                    "fechaInicio": "2026-03-01T10:00:00Z",
                    "duracion": 90,
                    "cupoMaximo": 30,
                    "inscritosCount": 5,
                    "activa": true,
                    "usaSEB": false,
                    "kioskMode": true,
                    "sinTiempo": false,
                    "requierePresente": true
                },
                {
                    "id": 8,
                    "examenId": 2,
                    "estado": "en_curso",
                    "cupoMaximo": 10,
                    "sinTiempo": true,
                    "requierePresente": true,
                    "inscripciones": [
                        {"id": 1, "estado": "confirmada"},
                        {"id": 2, "estado": "cancelada"}
                    ]
                }
            ])),
            unauthorized: AtomicBool::new(false),
            window_hits: AtomicUsize::new(0),
            ws_auth: Mutex::new(Vec::new()),
            ws_closed: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            outbound,
        })
    }

    fn push(&self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.outbound.send(frame).expect("no websocket subscriber");
    }

    fn received_events(&self, name: &str) -> Vec<Value> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f["event"] == name)
            .map(|f| f["data"].clone())
            .collect()
    }
}

type Mock = Arc<MockBackend>;

fn authorized(mock: &MockBackend, headers: &HeaderMap) -> bool {
    !mock.unauthorized.load(Ordering::SeqCst)
        && headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Bearer "))
}

async fn list_exams(State(mock): State<Mock>, headers: HeaderMap) -> Response {
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([
        {"id": 1, "titulo": "Algebra I"},
        {"id": 2, "titulo": "Physics"}
    ]))
    .into_response()
}

async fn list_windows(State(mock): State<Mock>, headers: HeaderMap) -> Response {
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    mock.window_hits.fetch_add(1, Ordering::SeqCst);
    let windows = mock.windows.lock().unwrap().clone();
    Json(json!({ "data": windows })).into_response()
}

async fn ranking(State(mock): State<Mock>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != 7 {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!([
        {"studentId": 1, "nombre": "ana", "puntaje": 8.5, "fechaFin": "2026-03-01T11:00:00Z"},
        {"studentId": 2, "nombre": "luis", "puntaje": 9.0, "fechaFin": "2026-03-01T11:10:00Z"},
        {"studentId": 1, "nombre": "ana", "puntaje": 6.0, "fechaFin": "2026-03-01T10:50:00Z"}
    ]))
    .into_response()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(mock): State<Mock>,
    headers: HeaderMap,
) -> Response {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        mock.ws_auth.lock().unwrap().push(auth.to_string());
    }
    ws.on_upgrade(move |socket| handle_socket(socket, mock))
}

async fn handle_socket(socket: WebSocket, mock: Mock) {
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = mock.outbound.subscribe();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) {
                        mock.received.lock().unwrap().push(frame);
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    mock.ws_closed.fetch_add(1, Ordering::SeqCst);
}

/// Spawns the mock backend on a random port. Returns (mock, "127.0.0.1:port").
async fn spawn_app() -> (Mock, String) {
    let mock = MockBackend::new();

    let app = Router::new()
        .route("/api/exams", get(list_exams))
        .route("/api/exam-windows/professor", get(list_windows))
        .route("/api/exam-windows/{id}/ranking", get(ranking))
        .route("/ws", get(ws_handler))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (mock, address)
}

#[derive(Default)]
struct Recorder {
    redirects: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
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

fn test_config(address: &str, ws_url: &str) -> Config {
    let mut config = Config::new(&format!("http://{}/api", address), ws_url, "test-session-token");
    config.professor_id = Some("42".to_string());
    config.refresh_debounce_ms = 50;
    config.reconnect_delay_secs = 1;
    config
}

async fn mount(config: &Config, recorder: &Arc<Recorder>) -> Result<Session, SyncError> {
    let api = Arc::new(HttpExamApi::with_client(
        reqwest::Client::new(),
        &config.api_base_url,
        &config.session_token,
    )?);
    Session::mount(config, api, recorder.clone(), recorder.clone()).await
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

async fn wait_for_window(
    store: &StoreHandle,
    id: i64,
    what: &str,
    pred: impl Fn(&ExamWindow) -> bool,
) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.get(id).await.is_some_and(|w| pred(&w)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn http_api_decodes_both_enrollment_representations() {
    // Arrange
    let (_mock, address) = spawn_app().await;
    let base_url = format!("http://{}/api", address);
    let api = HttpExamApi::with_client(reqwest::Client::new(), &base_url, "tok").unwrap();

    // Act
    let windows = api.fetch_windows().await.expect("Failed to fetch windows");
    let exams = api.fetch_exams().await.expect("Failed to fetch exams");

    // Assert
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].enrolled_count, 5);
    assert_eq!(windows[0].state, LifecycleState::Scheduled);
    assert!(!windows[0].effective_full_screen());
    assert_eq!(windows[1].enrolled_count, 1);
    assert!(!windows[1].requires_attendance_marking);
    assert_eq!(exams[1].title, "Physics");
}

#[tokio::test]
async fn http_api_maps_401_to_unauthorized() {
    let (mock, address) = spawn_app().await;
    mock.unauthorized.store(true, Ordering::SeqCst);
    let base_url = format!("http://{}/api", address);
    let api = HttpExamApi::with_client(reqwest::Client::new(), &base_url, "tok").unwrap();

    assert!(matches!(api.fetch_windows().await, Err(SyncError::Unauthorized)));
}

#[tokio::test]
async fn mount_with_rejected_token_redirects_to_login() {
    let (mock, address) = spawn_app().await;
    mock.unauthorized.store(true, Ordering::SeqCst);
    let recorder = Arc::new(Recorder::default());

    let result = mount(&test_config(&address, &format!("ws://{}/ws", address)), &recorder).await;

    assert!(matches!(result, Err(SyncError::Unauthorized)));
    assert_eq!(*recorder.redirects.lock().unwrap(), vec!["/login".to_string()]);
    assert_eq!(mock.window_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn live_session_applies_push_events() {
    // Arrange
    let (mock, address) = spawn_app().await;
    let recorder = Arc::new(Recorder::default());
    let mut config = test_config(&address, &format!("ws://{}/ws", address));
    config.refresh_debounce_ms = 300;
    let session = mount(&config, &recorder).await.expect("Failed to mount session");

    let window = session.store().get(7).await.expect("window 7 loaded");
    assert_eq!(window.exam_title.as_deref(), Some("Algebra I"));

    let mut state = session.channel().subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == ChannelState::Connected))
        .await
        .expect("channel did not connect")
        .unwrap();
    eventually("join message", || !mock.received_events("join_professor_room").is_empty()).await;
    assert_eq!(mock.received_events("join_professor_room")[0]["professorId"], "42");
    assert_eq!(
        *mock.ws_auth.lock().unwrap(),
        vec!["Bearer test-session-token".to_string()]
    );
    assert!(!session.scheduler().is_fallback_active());
    let hits_before = mock.window_hits.load(Ordering::SeqCst);

    // The server moves window 7 forward; window 8 keeps its authoritative count.
    mock.windows.lock().unwrap()[0]["estado"] = json!("en_curso");

    // Act: status change, enrollment change and a latency ping
    let now_ms = chrono::Utc::now().timestamp_millis();
    mock.push("su", json!({"t": "sc", "ts": now_ms, "c": [{"i": 7, "s": "in_progress"}]}));
    mock.push("iu", json!({"ventanaId": 8, "inscritosCount": 4}));
    mock.push("latency_ping", json!({"ts": now_ms, "seq": 1}));

    // Assert
    let store = session.store();
    wait_for_window(store, 7, "status patch", |w| w.state == LifecycleState::InProgress).await;
    wait_for_window(store, 8, "enrollment patch", |w| w.enrolled_count == 4).await;
    eventually("pong", || !mock.received_events("pong").is_empty()).await;
    assert_eq!(mock.received_events("pong")[0], json!({"ts": now_ms, "seq": 1}));
    assert_eq!(session.channel().latency_samples().await, 1);

    // The debounced background refresh reconciles with the server snapshot.
    eventually("debounced refresh", || mock.window_hits.load(Ordering::SeqCst) > hits_before).await;
    wait_for_window(store, 8, "server snapshot", |w| w.enrolled_count == 1).await;
    assert_eq!(store.get(7).await.unwrap().state, LifecycleState::InProgress);

    session.teardown().await;
    eventually("socket closed", || mock.ws_closed.load(Ordering::SeqCst) == 1).await;
    assert!(recorder.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dropping_a_session_closes_the_push_channel() {
    let (mock, address) = spawn_app().await;
    let recorder = Arc::new(Recorder::default());
    let session = mount(&test_config(&address, &format!("ws://{}/ws", address)), &recorder)
        .await
        .expect("Failed to mount session");
    eventually("join message", || !mock.received_events("join_professor_room").is_empty()).await;

    drop(session);

    eventually("socket closed", || mock.ws_closed.load(Ordering::SeqCst) == 1).await;
    // Longer than the reconnect delay: nothing dials back in.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(mock.ws_auth.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reload_fetches_a_fresh_snapshot() {
    let (mock, address) = spawn_app().await;
    let recorder = Arc::new(Recorder::default());
    let session = mount(&test_config(&address, &format!("ws://{}/ws", address)), &recorder)
        .await
        .expect("Failed to mount session");
    let hits = mock.window_hits.load(Ordering::SeqCst);

    mock.windows.lock().unwrap()[1]["inscritosCount"] = json!(9);
    let outcome = session.reload().await;

    assert_eq!(outcome, RefreshOutcome::Applied { windows: 2 });
    assert_eq!(mock.window_hits.load(Ordering::SeqCst), hits + 1);
    assert_eq!(session.store().get(8).await.unwrap().enrolled_count, 9);
    assert!(!session.refresh_client().is_loading());

    mock.unauthorized.store(true, Ordering::SeqCst);
    assert_eq!(session.reload().await, RefreshOutcome::Unauthorized);
    assert_eq!(*recorder.redirects.lock().unwrap(), vec!["/login".to_string()]);
    session.teardown().await;
}

#[tokio::test]
async fn ranking_is_aggregated_from_attempts() {
    let (_mock, address) = spawn_app().await;
    let recorder = Arc::new(Recorder::default());
    let session = mount(&test_config(&address, &format!("ws://{}/ws", address)), &recorder)
        .await
        .expect("Failed to mount session");

    let ranking = session.ranking(7).await.expect("Failed to load ranking");

    let rows: Vec<(u32, i64, f64)> =
        ranking.iter().map(|r| (r.position, r.student_id, r.score)).collect();
    assert_eq!(rows, vec![(1, 2, 9.0), (2, 1, 8.5)]);

    assert!(matches!(session.ranking(99).await, Err(SyncError::Http(404))));
    session.teardown().await;
}

#[tokio::test]
async fn unreachable_push_channel_falls_back_to_polling() {
    let (_mock, address) = spawn_app().await;
    let recorder = Arc::new(Recorder::default());

    // Nothing listens on this port.
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_url = format!("ws://{}/ws", closed.local_addr().unwrap());
    drop(closed);

    let session = mount(&test_config(&address, &dead_url), &recorder)
        .await
        .expect("Failed to mount session");

    eventually("fallback polling", || session.scheduler().is_fallback_active()).await;
    assert_ne!(session.channel().state(), ChannelState::Connected);
    assert_eq!(session.store().read().await.len(), 2);

    session.teardown().await;
}
