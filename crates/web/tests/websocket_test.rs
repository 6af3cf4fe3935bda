//! WebSocket integration tests against a real listener

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tally_core::{CounterKey, UpdateMessage};
use tally_objects::{CounterRouter, RouterConfig, StoreConfig};
use tally_web::{AppState, ServerConfig, create_app};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type TestResult = Result<(), Box<dyn std::error::Error>>;
type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

async fn spawn_server(config: RouterConfig) -> Result<(SocketAddr, AppState), Box<dyn std::error::Error>> {
    let state = AppState::new(CounterRouter::new(StoreConfig::in_memory(), config));
    let app = create_app(&ServerConfig::default(), state.clone())?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok((addr, state))
}

async fn connect(addr: SocketAddr, key: &str) -> Result<Client, Box<dyn std::error::Error>> {
    let (client, _response) = connect_async(format!("ws://{addr}/counter/{key}/ws")).await?;
    Ok(client)
}

/// Next count update, skipping control frames.
async fn next_count(client: &mut Client) -> Result<Option<i64>, Box<dyn std::error::Error>> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next()).await?;
        match frame {
            Some(Ok(Message::Text(text))) => {
                return Ok(Some(UpdateMessage::from_json(text.as_str())?.count()));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(_)) | None => return Ok(None),
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STREAMING TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_snapshot_then_updates_in_order() -> TestResult {
    // GIVEN: A counter at 2 and a connected client
    let (addr, state) = spawn_server(RouterConfig::default()).await?;
    let key: CounterKey = "room1".parse()?;
    state.router.increment(&key).await?;
    state.router.increment(&key).await?;
    let mut client = connect(addr, "room1").await?;

    // WHEN: The first frame arrives and the counter moves
    let snapshot = next_count(&mut client).await?;
    state.router.decrement(&key).await?;
    state.router.increment(&key).await?;
    state.router.increment(&key).await?;

    // THEN: The snapshot is 2, followed by each committed value
    assert_eq!(snapshot, Some(2));
    assert_eq!(next_count(&mut client).await?, Some(1));
    assert_eq!(next_count(&mut client).await?, Some(2));
    assert_eq!(next_count(&mut client).await?, Some(3));
    Ok(())
}

#[tokio::test]
async fn test_inbound_messages_are_ignored() -> TestResult {
    // GIVEN: A connected client
    let (addr, state) = spawn_server(RouterConfig::default()).await?;
    let key: CounterKey = "chatty".parse()?;
    let mut client = connect(addr, "chatty").await?;
    assert_eq!(next_count(&mut client).await?, Some(0));

    // WHEN: It sends text and binary frames, then the counter moves
    client.send(Message::Text("increment please".into())).await?;
    client.send(Message::Binary(vec![1, 2, 3].into())).await?;
    state.router.increment(&key).await?;

    // THEN: Only the real update arrives
    assert_eq!(next_count(&mut client).await?, Some(1));
    assert_eq!(state.router.get_count(&key).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_close_is_echoed_and_connection_removed() -> TestResult {
    // GIVEN: Two clients on one key
    let (addr, state) = spawn_server(RouterConfig::default()).await?;
    let key: CounterKey = "closing".parse()?;
    let mut leaving = connect(addr, "closing").await?;
    let mut staying = connect(addr, "closing").await?;
    next_count(&mut leaving).await?;
    next_count(&mut staying).await?;

    // WHEN: One closes with a code and reason
    leaving
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        })))
        .await?;

    // THEN: The same close frame comes back
    let echoed = tokio::time::timeout(Duration::from_secs(5), leaving.next()).await?;
    match echoed {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::Away);
            assert_eq!(frame.reason.as_str(), "bye");
        }
        other => return Err(format!("expected close echo, got {other:?}").into()),
    }

    // AND: The other client keeps receiving updates
    state.router.increment(&key).await?;
    assert_eq!(next_count(&mut staying).await?, Some(1));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.router.connection_count(&key).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_stream_survives_hibernation() -> TestResult {
    // GIVEN: Instances hibernate after 50ms idle, and a client is connected
    let config = RouterConfig::default().with_hibernate_after(Duration::from_millis(50));
    let (addr, state) = spawn_server(config).await?;
    let key: CounterKey = "sleepy".parse()?;
    let mut client = connect(addr, "sleepy").await?;
    assert_eq!(next_count(&mut client).await?, Some(0));

    // WHEN: The instance hibernates and a mutation rehydrates it
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state.router.live_instances(), 0);
    state.router.increment(&key).await?;

    // THEN: The socket opened before hibernation still gets the update
    assert_eq!(next_count(&mut client).await?, Some(1));
    Ok(())
}

#[tokio::test]
async fn test_disconnect_removes_connection() -> TestResult {
    // GIVEN: A connected client
    let (addr, state) = spawn_server(RouterConfig::default()).await?;
    let key: CounterKey = "vanish".parse()?;
    let mut client = connect(addr, "vanish").await?;
    next_count(&mut client).await?;
    assert_eq!(state.router.connection_count(&key).await, 1);

    // WHEN: It drops the TCP connection without a close handshake
    drop(client);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // THEN: It is no longer registered
    assert_eq!(state.router.connection_count(&key).await, 0);
    Ok(())
}
