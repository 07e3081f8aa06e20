//! End-to-end integration tests using real WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use seance_core::envelope::{ErrorPayload, MessageReceivedPayload, SpiritResponsePayload};
use seance_core::retry::RetryConfig;
use seance_core::{Envelope, EventKind, Identity, SessionId};
use seance_server::config::ServerConfig;
use seance_server::server::SeanceServer;
use seance_spirit::context::Prompt;
use seance_spirit::fallback::FALLBACK_RESPONSES;
use seance_spirit::{Generator, GeneratorError, ResponsePipeline};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// ── Mock generators ──

struct FixedGenerator(&'static str);

#[async_trait]
impl Generator for FixedGenerator {
    fn name(&self) -> &str {
        "fixed"
    }
    async fn generate(&self, _prompt: &Prompt) -> Result<String, GeneratorError> {
        Ok(self.0.to_owned())
    }
}

struct RejectingGenerator;

#[async_trait]
impl Generator for RejectingGenerator {
    fn name(&self) -> &str {
        "rejecting"
    }
    async fn generate(&self, _prompt: &Prompt) -> Result<String, GeneratorError> {
        Err(GeneratorError::Api {
            status: 403,
            message: "permission denied".into(),
            code: Some("PERMISSION_DENIED".into()),
        })
    }
}

// ── Harness ──

/// Boot a test server on an ephemeral port.
async fn boot_server(generator: Arc<dyn Generator>) -> (SocketAddr, Arc<SeanceServer>) {
    let pipeline = ResponsePipeline::new(generator, RetryConfig::default(), 10);
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(SeanceServer::new(
        ServerConfig::default(),
        pipeline,
        metrics_handle,
    ));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn connect(addr: SocketAddr, session: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{addr}/ws/{session}")))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

/// Connect, handshake, and wait until the server has registered the peer.
async fn join(server: &SeanceServer, addr: SocketAddr, session: &str, name: &str) -> WsStream {
    let before = server.registry().connection_count();
    let mut ws = connect(addr, session).await;
    let handshake = json!({"user_id": name.to_lowercase(), "name": name});
    ws.send(Message::text(handshake.to_string())).await.unwrap();
    wait_until(|| server.registry().connection_count() > before).await;
    ws
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn ask(ws: &mut WsStream, name: &str, question: &str) {
    let frame = Envelope::send_message(name, question).to_json().unwrap();
    ws.send(Message::text(frame)).await.unwrap();
}

/// Next envelope, skipping control frames.
async fn next_event(ws: &mut WsStream) -> Envelope {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("socket error");
        match msg {
            Message::Text(text) => return Envelope::from_json(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Read until the server's close frame and return its code.
async fn close_code(ws: &mut WsStream) -> Option<CloseCode> {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("timed out waiting for close") {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| f.code),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return None,
        }
    }
}

async fn assert_silent(ws: &mut WsStream) {
    assert!(
        timeout(Duration::from_millis(200), ws.next()).await.is_err(),
        "expected no frame"
    );
}

// ── Scenarios ──

#[tokio::test]
async fn question_reaches_every_participant_with_timings() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("I dwell in voltage."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;
    let mut bo = join(&server, addr, "parlour", "Bo").await;

    let joined = next_event(&mut ada).await;
    assert_eq!(joined.kind(), EventKind::UserJoined);
    assert_eq!(joined.payload_as::<Identity>().unwrap().name, "Bo");

    ask(&mut ada, "Ada", "Who are you?").await;

    for ws in [&mut ada, &mut bo] {
        let echo = next_event(ws).await;
        assert_eq!(echo.kind(), EventKind::MessageReceived);
        let echo: MessageReceivedPayload = echo.payload_as().unwrap();
        assert_eq!(echo.user_name, "Ada");
        assert_eq!(echo.message, "Who are you?");

        assert_eq!(next_event(ws).await.kind(), EventKind::SpiritThinking);

        let response = next_event(ws).await;
        assert_eq!(response.kind(), EventKind::SpiritResponse);
        let response: SpiritResponsePayload = response.payload_as().unwrap();
        assert_eq!(response.message, "I dwell in voltage.");
        assert_eq!(response.word_count, 4);
        assert_eq!(response.letter_timings.len(), 19);
        assert!(response.letter_timings.iter().all(|t| (50..=500).contains(t)));
    }
}

#[tokio::test]
async fn joiner_is_not_told_about_itself() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;
    assert_silent(&mut ada).await;
}

#[tokio::test]
async fn departure_is_announced_and_session_retired() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;
    let mut bo = join(&server, addr, "parlour", "Bo").await;
    let _ = next_event(&mut ada).await; // Bo joined

    bo.close(None).await.unwrap();
    let left = next_event(&mut ada).await;
    assert_eq!(left.kind(), EventKind::UserLeft);
    assert_eq!(left.payload_as::<Identity>().unwrap().name, "Bo");
    assert_eq!(server.registry().connection_count(), 1);

    ada.close(None).await.unwrap();
    wait_until(|| !server.registry().has_session(&SessionId::from("parlour"))).await;
    assert_eq!(server.registry().session_count(), 0);
}

#[tokio::test]
async fn invalid_question_is_answered_only_to_sender() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;
    let mut bo = join(&server, addr, "parlour", "Bo").await;
    let _ = next_event(&mut ada).await;

    ask(&mut ada, "Ada", "   ").await;
    let err = next_event(&mut ada).await;
    assert_eq!(err.kind(), EventKind::Error);
    assert_eq!(
        err.payload_as::<ErrorPayload>().unwrap().code.as_deref(),
        Some("EMPTY_MESSAGE")
    );

    ask(&mut ada, "Ada", &"x".repeat(501)).await;
    let err = next_event(&mut ada).await;
    assert_eq!(
        err.payload_as::<ErrorPayload>().unwrap().code.as_deref(),
        Some("MESSAGE_TOO_LONG")
    );

    ada.send(Message::text("{not json")).await.unwrap();
    let err = next_event(&mut ada).await;
    assert_eq!(
        err.payload_as::<ErrorPayload>().unwrap().code.as_deref(),
        Some("INVALID_ENVELOPE")
    );

    assert_silent(&mut bo).await;
}

#[tokio::test]
async fn sessions_are_isolated() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;
    let mut cy = join(&server, addr, "attic", "Cy").await;

    ask(&mut ada, "Ada", "Anyone?").await;
    assert_eq!(next_event(&mut ada).await.kind(), EventKind::MessageReceived);
    assert_silent(&mut cy).await;
    assert_eq!(server.registry().session_count(), 2);
}

#[tokio::test]
async fn permanent_generation_failure_serves_fallback() {
    let (addr, server) = boot_server(Arc::new(RejectingGenerator)).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;

    ask(&mut ada, "Ada", "Hello?").await;
    assert_eq!(next_event(&mut ada).await.kind(), EventKind::MessageReceived);
    assert_eq!(next_event(&mut ada).await.kind(), EventKind::SpiritThinking);
    let response: SpiritResponsePayload = next_event(&mut ada).await.payload_as().unwrap();
    assert_eq!(response.message, FALLBACK_RESPONSES[0]);
    assert_eq!(response.letter_timings.len(), response.message.chars().count());
}

#[tokio::test]
async fn blank_handshake_name_is_refused() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ws = connect(addr, "parlour").await;
    ws.send(Message::text(json!({"name": "   "}).to_string()))
        .await
        .unwrap();

    let err = next_event(&mut ws).await;
    assert_eq!(
        err.payload_as::<ErrorPayload>().unwrap().code.as_deref(),
        Some("INVALID_IDENTITY")
    );
    assert_eq!(close_code(&mut ws).await, Some(CloseCode::Policy));
    assert_eq!(server.registry().connection_count(), 0);
}

#[tokio::test]
async fn missing_name_joins_as_anonymous() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;

    let mut ghost = connect(addr, "parlour").await;
    ghost.send(Message::text("{}")).await.unwrap();

    let joined = next_event(&mut ada).await;
    assert_eq!(joined.payload_as::<Identity>().unwrap().name, "Anonymous");
    let participants = server
        .registry()
        .participants_of(&SessionId::from("parlour"));
    assert_eq!(participants.len(), 2);
}

#[tokio::test]
async fn health_reflects_live_connections() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let _ada = join(&server, addr, "parlour", "Ada").await;
    let _bo = join(&server, addr, "attic", "Bo").await;
    let _cy = join(&server, addr, "parlour", "Cy").await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 3);
    assert_eq!(body["active_sessions"], 2);
    assert_eq!(
        body["sessions"],
        serde_json::json!([
            {"session_id": "attic", "participants": 1, "max_users": 6},
            {"session_id": "parlour", "participants": 2, "max_users": 6},
        ])
    );
}

#[tokio::test]
async fn shutdown_closes_sockets_with_going_away() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;

    server.shutdown().shutdown();
    assert_eq!(close_code(&mut ada).await, Some(CloseCode::Away));
    wait_until(|| server.registry().connection_count() == 0).await;
}

#[tokio::test]
async fn graceful_shutdown_waits_for_session_teardown() {
    let (addr, server) = boot_server(Arc::new(FixedGenerator("Yes."))).await;
    let mut ada = join(&server, addr, "parlour", "Ada").await;
    let mut bo = join(&server, addr, "attic", "Bo").await;

    let finished = server
        .shutdown()
        .graceful_shutdown(Some(TIMEOUT))
        .await;
    assert!(finished);

    // Every session task already ran its teardown when the wait returned.
    assert_eq!(server.registry().connection_count(), 0);
    assert_eq!(server.registry().session_count(), 0);
    assert_eq!(close_code(&mut ada).await, Some(CloseCode::Away));
    assert_eq!(close_code(&mut bo).await, Some(CloseCode::Away));
}
