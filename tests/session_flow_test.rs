//! Session Flow Integration Tests
//!
//! Each test scripts a rendezvous server end over an in-process WebSocket
//! listener and drives a real session controller against it.

use futures::{SinkExt, StreamExt};
use parley::application::{SessionController, SessionHandle};
use parley::config::{Config, IceConfig};
use parley::domain::connection::ConnectionState;
use parley::domain::participant::ParticipantId;
use parley::domain::session::ConnectionPhase;
use parley::domain::shared::error::SessionError;
use parley::domain::shared::events::{SessionEvent, Severity};
use parley::infrastructure::media::ProfileBackend;
use parley::infrastructure::peer::transport::SdpEngine;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

const ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:1\r\n";

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.signaling.endpoint = format!("ws://127.0.0.1:{port}");
    config.reconnect.base_delay_ms = 10;
    config
}

async fn join(config: Config, local: &str) -> (SessionController, SessionHandle) {
    SessionController::join(
        config,
        Arc::new(ProfileBackend::full()),
        Arc::new(SdpEngine::new(IceConfig::default())),
        "test-room",
        ParticipantId::from(local),
    )
    .await
    .expect("join failed")
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.expect("accept failed");
    accept_async(stream).await.expect("handshake failed")
}

/// Next JSON text frame from the client, skipping control frames
async fn recv_json(server: &mut ServerWs) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), server.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the stream")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("malformed client frame");
        }
    }
}

async fn send_json(server: &mut ServerWs, value: Value) {
    server
        .send(Message::Text(value.to_string()))
        .await
        .expect("server send failed");
}

/// Wait for the first event matching the predicate
async fn await_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn join_announces_media_and_offers_to_new_participant() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;

        // Presence announcement arrives first
        let announce = recv_json(&mut ws).await;
        assert_eq!(announce["type"], "media_state");
        assert_eq!(announce["state"]["video"], true);
        assert_eq!(announce["state"]["audio"], true);

        // A participant joins the room
        send_json(
            &mut ws,
            json!({
                "type": "user_joined",
                "participant_id": "bob",
                "timestamp": "2026-08-30T10:00:00Z",
            }),
        )
        .await;

        // The engine offers toward the newcomer
        let offer = recv_json(&mut ws).await;
        assert_eq!(offer["type"], "offer");
        assert_eq!(offer["target"], "bob");
        assert_eq!(offer["sender"], "alice");
        assert_eq!(offer["offer"]["type"], "offer");
        assert!(offer["offer"]["sdp"].as_str().unwrap().starts_with("v=0"));

        // Answer on bob's behalf
        send_json(
            &mut ws,
            json!({
                "type": "webrtc_answer",
                "answer": { "type": "answer", "sdp": ANSWER_SDP },
                "sender": "bob",
                "target": "alice",
            }),
        )
        .await;

        ws
    });

    let (controller, handle) = join(test_config(port), "alice").await;
    assert_eq!(controller.phase(), ConnectionPhase::Active);

    let mut events = controller.events().subscribe();
    let session = tokio::spawn(controller.run());

    await_event(&mut events, |e| {
        matches!(e, SessionEvent::ParticipantJoined { participant_id } if participant_id.as_str() == "bob")
    })
    .await;
    await_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Connecting,
                ..
            }
        )
    })
    .await;
    await_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Connected,
                ..
            }
        )
    })
    .await;

    handle.hang_up();
    assert!(session.await.unwrap().is_ok());
    server.await.unwrap();
}

#[tokio::test]
async fn media_toggle_is_announced_with_exact_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;

        let announce = recv_json(&mut ws).await;
        assert_eq!(announce["type"], "media_state");
        assert_eq!(announce["state"]["video"], true);

        // Camera off leaves audio untouched
        let toggled = recv_json(&mut ws).await;
        assert_eq!(toggled["type"], "media_state");
        assert_eq!(toggled["state"]["video"], false);
        assert_eq!(toggled["state"]["audio"], true);
        ws
    });

    let (controller, handle) = join(test_config(port), "alice").await;
    let mut events = controller.events().subscribe();
    let session = tokio::spawn(controller.run());

    handle.toggle_video();
    let event = await_event(&mut events, |e| {
        matches!(e, SessionEvent::MediaStateChanged { .. })
    })
    .await;
    match event {
        SessionEvent::MediaStateChanged {
            participant_id,
            state,
        } => {
            assert_eq!(participant_id.as_str(), "alice");
            assert!(!state.video);
            assert!(state.audio);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    handle.hang_up();
    assert!(session.await.unwrap().is_ok());
    server.await.unwrap();
}

#[tokio::test]
async fn abnormal_drop_reconnects_with_backoff() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        // First connection dies without a close frame
        let mut ws = accept(&listener).await;
        let announce = recv_json(&mut ws).await;
        assert_eq!(announce["type"], "media_state");
        drop(ws);

        // Reconnect attempts 1 and 2 are refused before the handshake
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);

        // Attempt 3 succeeds; presence is re-announced
        let mut ws = accept(&listener).await;
        let announce = recv_json(&mut ws).await;
        assert_eq!(announce["type"], "media_state");
        ws
    });

    let (controller, handle) = join(test_config(port), "alice").await;
    let mut events = controller.events().subscribe();
    let session = tokio::spawn(controller.run());

    await_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::PhaseChanged {
                new_phase: ConnectionPhase::Reconnecting,
                ..
            }
        )
    })
    .await;
    // The drop is surfaced to the user as a transport error
    let lost = await_event(&mut events, |e| {
        matches!(e, SessionEvent::Notification { .. })
    })
    .await;
    match lost {
        SessionEvent::Notification { severity, message } => {
            assert_eq!(severity, Severity::Error);
            assert_eq!(message, "signaling connection dropped");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    await_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::PhaseChanged {
                old_phase: ConnectionPhase::Reconnecting,
                new_phase: ConnectionPhase::Active,
            }
        )
    })
    .await;

    handle.hang_up();
    assert!(session.await.unwrap().is_ok());
    server.await.unwrap();
}

#[tokio::test]
async fn reconnect_exhaustion_closes_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _announce = recv_json(&mut ws).await;
        drop(ws);
        // Listener drops here; every reconnect attempt is refused
    });

    let (controller, _handle) = join(test_config(port), "alice").await;
    let mut events = controller.events().subscribe();
    let session = tokio::spawn(controller.run());

    server.await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), session)
        .await
        .expect("session did not terminate")
        .unwrap();
    assert_eq!(result.unwrap_err(), SessionError::ReconnectExhausted);

    await_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::PhaseChanged {
                new_phase: ConnectionPhase::Closed,
                ..
            }
        )
    })
    .await;
}

#[tokio::test]
async fn server_close_ends_the_session_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _announce = recv_json(&mut ws).await;
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "room closed".into(),
        })))
        .await
        .unwrap();
    });

    let (controller, _handle) = join(test_config(port), "alice").await;
    let mut events = controller.events().subscribe();
    let session = tokio::spawn(controller.run());

    await_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::PhaseChanged {
                new_phase: ConnectionPhase::Closed,
                ..
            }
        )
    })
    .await;

    assert!(session.await.unwrap().is_ok());
    server.await.unwrap();
}

#[tokio::test]
async fn remote_media_updates_reach_subscribers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _announce = recv_json(&mut ws).await;

        send_json(
            &mut ws,
            json!({
                "type": "user_joined",
                "participant_id": "bob",
                "timestamp": "2026-08-30T10:00:00Z",
            }),
        )
        .await;
        // Consume the resulting offer so the stream stays drained
        let offer = recv_json(&mut ws).await;
        assert_eq!(offer["type"], "offer");

        send_json(
            &mut ws,
            json!({
                "type": "media_state_update",
                "participant_id": "bob",
                "state": { "video": false, "audio": true },
            }),
        )
        .await;
        ws
    });

    let (controller, handle) = join(test_config(port), "alice").await;
    let mut events = controller.events().subscribe();
    let session = tokio::spawn(controller.run());

    let event = await_event(&mut events, |e| {
        matches!(e, SessionEvent::MediaStateChanged { participant_id, .. } if participant_id.as_str() == "bob")
    })
    .await;
    match event {
        SessionEvent::MediaStateChanged { state, .. } => {
            assert!(!state.video);
            assert!(state.audio);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    handle.hang_up();
    assert!(session.await.unwrap().is_ok());
    server.await.unwrap();
}
