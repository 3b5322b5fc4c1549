//! End-to-end tests for the send/recover loop.
//!
//! The client runs against scripted in-memory connections: each accepted
//! "session" is one half of a `tokio::io::duplex` pair, with the test
//! playing the gateway on the other half. Dropping the gateway half closes
//! the session exactly the way the real gateway does after an error
//! response.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use apns_client::protocol::{item, ErrorResponse, Status, FRAME_COMMAND};
use apns_client::transport::Connector;
use apns_client::{Client, ClientConfig, Notification, Payload};

const TIMEOUT: Duration = Duration::from_secs(5);

const TOKEN: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

fn test_config() -> ClientConfig {
    ClientConfig::new("gateway.test:2195").connect_retry_delay(Duration::from_millis(10))
}

fn notification(badge: u32) -> Notification {
    let mut payload = Payload::default();
    payload.aps.badge = Some(badge);
    Notification::new(TOKEN, payload)
}

/// Test side of the scripted gateway: queues sessions for the connector.
struct GatewayScript {
    tx: mpsc::Sender<DuplexStream>,
}

impl GatewayScript {
    /// Queue one accepted session and return the gateway half of it.
    async fn accept(&self) -> DuplexStream {
        let (client_half, gateway_half) = tokio::io::duplex(64 * 1024);
        self.tx.send(client_half).await.unwrap();
        gateway_half
    }
}

/// Connector handing out pre-scripted duplex streams.
///
/// `connect` waits until the script queues the next session, which keeps
/// the loop parked in its reconnect phase without burning retries.
struct ScriptedConnector {
    streams: Mutex<mpsc::Receiver<DuplexStream>>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> io::Result<Self::Stream> {
        self.streams.lock().await.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, "no scripted session")
        })
    }
}

fn scripted_connector() -> (GatewayScript, ScriptedConnector) {
    let (tx, rx) = mpsc::channel(8);
    (
        GatewayScript { tx },
        ScriptedConnector {
            streams: Mutex::new(rx),
        },
    )
}

/// A notification frame as observed by the gateway.
#[derive(Debug, Default)]
struct SentFrame {
    identifier: u32,
    token: Vec<u8>,
    payload: Vec<u8>,
    expiration: u32,
    priority: u8,
}

impl SentFrame {
    fn badge(&self) -> u64 {
        let value: serde_json::Value = serde_json::from_slice(&self.payload).unwrap();
        value["aps"]["badge"].as_u64().unwrap()
    }
}

/// Read and decode one notification frame from the gateway side.
async fn read_frame(gateway: &mut DuplexStream) -> SentFrame {
    timeout(TIMEOUT, async {
        let mut head = [0u8; 5];
        gateway.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0], FRAME_COMMAND);

        let body_len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]) as usize;
        let mut body = vec![0u8; body_len];
        gateway.read_exact(&mut body).await.unwrap();

        let mut frame = SentFrame::default();
        let mut at = 0;
        while at < body.len() {
            let id = body[at];
            let len = u16::from_be_bytes([body[at + 1], body[at + 2]]) as usize;
            let data = &body[at + 3..at + 3 + len];
            match id {
                item::DEVICE_TOKEN => frame.token = data.to_vec(),
                item::PAYLOAD => frame.payload = data.to_vec(),
                item::IDENTIFIER => frame.identifier = u32::from_be_bytes(data.try_into().unwrap()),
                item::EXPIRATION => frame.expiration = u32::from_be_bytes(data.try_into().unwrap()),
                item::PRIORITY => frame.priority = data[0],
                other => panic!("unknown frame item {other}"),
            }
            at += 3 + len;
        }
        frame
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Assert that nothing arrives on the gateway side for a short while.
async fn assert_no_frame(gateway: &mut DuplexStream) {
    let mut byte = [0u8; 1];
    let outcome = timeout(Duration::from_millis(100), gateway.read(&mut byte)).await;
    assert!(outcome.is_err(), "unexpected data on the gateway side");
}

/// Report an error for `identifier` and close the session, gateway-style.
async fn reject(mut gateway: DuplexStream, status: Status, identifier: u32) {
    let response = ErrorResponse::new(status, identifier);
    gateway.write_all(&response.encode()).await.unwrap();
    drop(gateway);
}

// Scenario: happy path. Three auto-assigned submissions are written in
// order with sequential identifiers and no failure reports.
#[tokio::test]
async fn assigns_sequential_identifiers_and_writes_in_order() {
    let (script, connector) = scripted_connector();
    let mut client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    for badge in 1..=3 {
        client.send(notification(badge)).await;
    }

    for expected in 1..=3u32 {
        let frame = read_frame(&mut gateway).await;
        assert_eq!(frame.identifier, expected);
        assert_eq!(frame.badge(), u64::from(expected));
        assert_eq!(frame.token, hex::decode(TOKEN).unwrap());
        assert_eq!(frame.expiration, 0);
        assert_eq!(frame.priority, 10);
    }

    assert!(client.failures().try_recv().is_none());
}

// Scenario: single rejection. The rejected notification is reported once,
// only the tail behind it is replayed on the next session.
#[tokio::test]
async fn rejection_reports_the_notification_and_replays_the_tail() {
    let (script, connector) = scripted_connector();
    let mut client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    for badge in 1..=3 {
        client.send(notification(badge)).await;
    }
    for expected in 1..=3u32 {
        assert_eq!(read_frame(&mut gateway).await.identifier, expected);
    }

    reject(gateway, Status::InvalidToken, 2).await;

    let failure = timeout(TIMEOUT, client.failures().recv())
        .await
        .expect("timed out waiting for the failure report")
        .unwrap();
    assert_eq!(failure.notification.identifier, 2);
    assert_eq!(failure.error.status, Status::InvalidToken);
    assert_eq!(failure.error.identifier, 2);

    // Only the notification written after the rejected one is replayed,
    // with its identifier preserved.
    let mut gateway = script.accept().await;
    let frame = read_frame(&mut gateway).await;
    assert_eq!(frame.identifier, 3);
    assert_eq!(frame.badge(), 3);
    assert_no_frame(&mut gateway).await;
}

// Scenario: transport loss. Notifications written to a connection that
// later dies are replayed in order on the next one.
#[tokio::test]
async fn transport_loss_replays_the_entire_window_in_order() {
    let (script, connector) = scripted_connector();
    let client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    client.send(notification(1)).await;
    client.send(notification(2)).await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 1);
    assert_eq!(read_frame(&mut gateway).await.identifier, 2);

    drop(gateway);

    let mut gateway = script.accept().await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 1);
    assert_eq!(read_frame(&mut gateway).await.identifier, 2);

    client.send(notification(3)).await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 3);
}

// Scenario: a submission racing the connection loss. Whichever of the
// failing write or the reader's EOF the loop notices first, nothing is
// lost: both notifications land on the next session.
#[tokio::test]
async fn submission_racing_a_dead_connection_is_not_lost() {
    let (script, connector) = scripted_connector();
    let client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    client.send(notification(1)).await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 1);

    drop(gateway);
    client.send(notification(2)).await;

    let mut gateway = script.accept().await;
    let mut identifiers = vec![
        read_frame(&mut gateway).await.identifier,
        read_frame(&mut gateway).await.identifier,
    ];
    identifiers.sort_unstable();
    assert_eq!(identifiers, vec![1, 2]);
}

// Scenario: caller-preset identifiers. Presets are written verbatim and
// the counter resumes past them.
#[tokio::test]
async fn preset_identifier_advances_the_counter() {
    let (script, connector) = scripted_connector();
    let client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    client.send(notification(1).identifier(100).expiration(1234)).await;
    client.send(notification(2)).await;

    let frame = read_frame(&mut gateway).await;
    assert_eq!(frame.identifier, 100);
    assert_eq!(frame.expiration, 1234);
    assert_eq!(read_frame(&mut gateway).await.identifier, 101);
}

// Scenario: error for an identifier outside the window. The client
// reconnects without replaying or reporting anything, and keeps working.
#[tokio::test]
async fn unknown_identifier_reconnects_without_replay_or_report() {
    let (script, connector) = scripted_connector();
    let mut client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    client.send(notification(1)).await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 1);

    reject(gateway, Status::ProcessingError, 999).await;

    let mut gateway = script.accept().await;
    assert_no_frame(&mut gateway).await;
    assert!(client.failures().try_recv().is_none());

    client.send(notification(2)).await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 2);
}

// Scenario: burst past capacity. The oldest notifications age out, and an
// error naming an evicted identifier is treated as unknown.
#[tokio::test]
async fn evicted_identifier_is_treated_as_unknown() {
    let (script, connector) = scripted_connector();
    let mut client = Client::with_connector(test_config().buffer_capacity(3), connector);
    let mut gateway = script.accept().await;

    for badge in 1..=5 {
        client.send(notification(badge)).await;
    }
    for expected in 1..=5u32 {
        assert_eq!(read_frame(&mut gateway).await.identifier, expected);
    }

    // Identifier 2 was evicted by the burst (window holds 3..=5).
    reject(gateway, Status::InvalidToken, 2).await;

    let mut gateway = script.accept().await;
    assert_no_frame(&mut gateway).await;
    assert!(client.failures().try_recv().is_none());

    client.send(notification(6)).await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 6);
}

// A malformed submission is dropped without poisoning the session.
#[tokio::test]
async fn unencodable_notification_is_dropped() {
    let (script, connector) = scripted_connector();
    let client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    client
        .send(Notification::new("not a token", Payload::default()))
        .await;
    client.send(notification(1)).await;

    // Only the valid notification reaches the wire. Identifier assignment
    // happens before encoding, so the dropped one still consumed 1.
    let frame = read_frame(&mut gateway).await;
    assert_eq!(frame.identifier, 2);
}

// Dropping the client shuts the loop down and closes the session.
#[tokio::test]
async fn dropping_the_client_closes_the_session() {
    let (script, connector) = scripted_connector();
    let client = Client::with_connector(test_config(), connector);
    let mut gateway = script.accept().await;

    client.send(notification(1)).await;
    assert_eq!(read_frame(&mut gateway).await.identifier, 1);

    drop(client);

    let mut byte = [0u8; 1];
    let read = timeout(TIMEOUT, gateway.read(&mut byte))
        .await
        .expect("timed out waiting for the session to close")
        .unwrap();
    assert_eq!(read, 0);
}
