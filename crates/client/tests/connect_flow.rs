//! End-to-end connect/disconnect flows against a stub discovery endpoint.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parley_client::{
    ClientError, ConnectConfig, EventCategory, MediaTransport, SessionEvent, SessionManager,
    SessionState, TransportCredentials, TransportEvent, TransportFactory,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Stub discovery endpoint counting hits and answering with a fixed response.
#[derive(Clone)]
struct StubState {
    hits: Arc<AtomicUsize>,
    status: StatusCode,
    body: Value,
    delay: Duration,
}

async fn connect_handler(
    State(state): State<StubState>,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.delay).await;
    (state.status, Json(state.body.clone()))
}

async fn spawn_stub(
    status: StatusCode,
    body: Value,
    delay: Duration,
) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = StubState {
        hits: Arc::clone(&hits),
        status,
        body,
        delay,
    };
    let app = Router::new()
        .route("/connect", post(connect_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

fn ok_body() -> Value {
    json!({ "room_url": "https://x/y", "token": "abc" })
}

/// Transport double: emits a scripted event prefix on start and records all
/// outbound traffic.
struct ScriptedTransport {
    script: Vec<TransportEvent>,
    sent: Mutex<Vec<Value>>,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    stops: AtomicUsize,
}

impl ScriptedTransport {
    fn new(script: Vec<TransportEvent>) -> Arc<Self> {
        Arc::new(Self {
            script,
            sent: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            stops: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MediaTransport for ScriptedTransport {
    async fn start(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), ClientError> {
        for event in &self.script {
            let _ = events.send(event.clone());
        }
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn send_app_message(&self, payload: Value) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ClientError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let sender = self.events.lock().unwrap().take();
        if let Some(sender) = sender {
            let _ = sender.send(TransportEvent::StateChanged(SessionState::Disconnecting));
            let _ = sender.send(TransportEvent::StateChanged(SessionState::Disconnected));
        }
        Ok(())
    }
}

/// Factory recording the credentials each created transport received.
struct RecordingFactory {
    script: Vec<TransportEvent>,
    created: Mutex<Vec<TransportCredentials>>,
    transports: Mutex<Vec<Arc<ScriptedTransport>>>,
}

impl RecordingFactory {
    fn new(script: Vec<TransportEvent>) -> Arc<Self> {
        Arc::new(Self {
            script,
            created: Mutex::new(Vec::new()),
            transports: Mutex::new(Vec::new()),
        })
    }

    fn created(&self) -> Vec<TransportCredentials> {
        self.created.lock().unwrap().clone()
    }

    fn transport(&self, index: usize) -> Arc<ScriptedTransport> {
        Arc::clone(&self.transports.lock().unwrap()[index])
    }
}

#[async_trait]
impl TransportFactory for RecordingFactory {
    async fn create(
        &self,
        credentials: TransportCredentials,
    ) -> Result<Arc<dyn MediaTransport>, ClientError> {
        self.created.lock().unwrap().push(credentials);
        let transport = ScriptedTransport::new(self.script.clone());
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport)
    }
}

fn connecting_script() -> Vec<TransportEvent> {
    vec![TransportEvent::StateChanged(SessionState::Connecting)]
}

fn ready_script() -> Vec<TransportEvent> {
    vec![
        TransportEvent::StateChanged(SessionState::Connecting),
        TransportEvent::StateChanged(SessionState::Connected),
        TransportEvent::StateChanged(SessionState::Ready),
    ]
}

async fn wait_for_state(manager: &SessionManager, state: SessionState) {
    let mut rx = manager.subscribe_state();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

#[tokio::test]
async fn credentials_reach_the_transport_unmodified() {
    let (base_url, _hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(connecting_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    manager.connect().await.unwrap();

    assert_eq!(
        factory.created(),
        vec![TransportCredentials {
            session_url: "https://x/y".to_string(),
            token: "abc".to_string(),
        }]
    );
    assert_eq!(manager.state(), SessionState::Connecting);
    assert!(manager.session_id().await.is_some());
}

#[tokio::test]
async fn concurrent_connects_issue_one_discovery_request() {
    let (base_url, hits) =
        spawn_stub(StatusCode::OK, ok_body(), Duration::from_millis(200)).await;
    let factory = RecordingFactory::new(connecting_script());
    let manager = Arc::new(SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    ));

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.connect().await })
    };
    // Give the first call time to reach the discovery request.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = manager.connect().await;

    assert_eq!(second, Err(ClientError::AlreadyConnecting));
    first.await.unwrap().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(factory.created().len(), 1);
}

#[tokio::test]
async fn connect_while_live_is_already_connected() {
    let (base_url, hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(ready_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    manager.connect().await.unwrap();
    wait_for_state(&manager, SessionState::Ready).await;

    assert_eq!(manager.connect().await, Err(ClientError::AlreadyConnected));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disconnect_is_idempotent_with_one_observable_transition() {
    let (base_url, _hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(ready_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );
    let (_sub, mut state_events) = manager
        .router()
        .subscribe_channel(EventCategory::StateChanged);

    manager.connect().await.unwrap();
    wait_for_state(&manager, SessionState::Ready).await;

    manager.disconnect().await.unwrap();
    manager.disconnect().await.unwrap();
    manager.disconnect().await.unwrap();

    assert_eq!(manager.state(), SessionState::Disconnected);
    assert_eq!(factory.transport(0).stops.load(Ordering::SeqCst), 1);

    let mut disconnected = 0;
    while let Ok(event) = state_events.try_recv() {
        if matches!(
            event,
            SessionEvent::StateChanged {
                current: SessionState::Disconnected,
                ..
            }
        ) {
            disconnected += 1;
        }
    }
    assert_eq!(disconnected, 1);
}

#[tokio::test]
async fn disconnect_with_no_session_is_a_no_op() {
    let (base_url, hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(connecting_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    manager.disconnect().await.unwrap();
    manager.disconnect().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(factory.created().is_empty());
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn discovery_failure_carries_status_and_body() {
    let (base_url, _hits) = spawn_stub(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({ "detail": "no capacity" }),
        Duration::ZERO,
    )
    .await;
    let factory = RecordingFactory::new(connecting_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    let err = manager.connect().await.unwrap_err();
    match err {
        ClientError::Connection { status, message } => {
            assert_eq!(status, Some(503));
            assert!(message.contains("no capacity"));
        }
        other => panic!("expected Connection error, got {other:?}"),
    }
    assert!(factory.created().is_empty());
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn malformed_discovery_response_never_starts_a_transport() {
    let (base_url, _hits) = spawn_stub(
        StatusCode::OK,
        json!({ "room_url": "https://x/y" }),
        Duration::ZERO,
    )
    .await;
    let factory = RecordingFactory::new(connecting_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(factory.created().is_empty());

    // The failure is recoverable: connect can be attempted again.
    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[tokio::test]
async fn send_before_ready_is_rejected_with_no_outbound_frame() {
    let (base_url, _hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(connecting_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    manager.connect().await.unwrap();
    wait_for_state(&manager, SessionState::Connecting).await;

    let channel = manager.control_channel().await.unwrap();
    let err = channel
        .send(&parley_client::ControlMessage::new("early", json!({})))
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::NotReady(SessionState::Connecting));
    assert!(factory.transport(0).sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn send_when_ready_reaches_the_transport() {
    let (base_url, _hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(ready_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    manager.connect().await.unwrap();
    wait_for_state(&manager, SessionState::Ready).await;

    let channel = manager.control_channel().await.unwrap();
    channel
        .send(&parley_client::ControlMessage::new(
            "get-weather",
            json!({ "city": "Lisbon" }),
        ))
        .await
        .unwrap();

    let sent = factory.transport(0).sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["type"], "custom");
    assert_eq!(sent[0]["label"], "get-weather");
}

#[tokio::test]
async fn control_channel_unavailable_without_a_session() {
    let (base_url, _hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(connecting_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    let err = manager.control_channel().await.unwrap_err();
    assert_eq!(err, ClientError::NotReady(SessionState::Disconnected));
}

#[tokio::test]
async fn reconnect_after_disconnect_uses_a_fresh_transport() {
    let (base_url, hits) = spawn_stub(StatusCode::OK, ok_body(), Duration::ZERO).await;
    let factory = RecordingFactory::new(ready_script());
    let manager = SessionManager::new(
        ConnectConfig::new(base_url),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    manager.connect().await.unwrap();
    wait_for_state(&manager, SessionState::Ready).await;
    let first_id = manager.session_id().await.unwrap();
    manager.disconnect().await.unwrap();

    manager.connect().await.unwrap();
    wait_for_state(&manager, SessionState::Ready).await;
    let second_id = manager.session_id().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(factory.created().len(), 2);
    assert_ne!(first_id, second_id);
}
