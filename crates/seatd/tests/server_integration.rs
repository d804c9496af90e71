//! Integration tests for the Unix socket server.
//!
//! These tests drive the SeatServer through real socket connections:
//! handshake, show membership, event fan-out and disconnect clean-up.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use seat_core::{
    Money, PriceTable, RevenueSplit, SeatLayout, SeatType, Show, ShowId, UserAccount, UserId,
};
use seat_protocol::{ClientMessage, MessageType, ProtocolVersion, ServerMessage};
use seatd::directory::ShowDirectory;
use seatd::server::SeatServer;
use seatd::show::ShowSettings;
use seatd::storage::{MemoryStore, Storage};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Upper bound on waiting for any single server message
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    socket_path: PathBuf,
    store: Arc<MemoryStore>,
    cancel_token: CancellationToken,
    _temp_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestServer {
    /// Spawns a server with show `S1` (10x10, ₹200) and users U1, U2, V1.
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");

        let store = Arc::new(MemoryStore::new());
        store
            .insert_show(Show::reserved(
                ShowId::new("S1"),
                SeatLayout::grid(10, 10, SeatType::Regular),
                PriceTable::new(Money::rupees(200), Money::rupees(300)),
                RevenueSplit::SingleVendor {
                    vendor: UserId::new("V1"),
                },
            ))
            .await;
        for (user, balance) in [("U1", 1000), ("U2", 1000), ("V1", 0)] {
            store
                .insert_user(UserAccount::new(UserId::new(user), Money::rupees(balance)))
                .await;
        }

        let directory = Arc::new(ShowDirectory::new(store.clone(), ShowSettings::default()));
        let cancel_token = CancellationToken::new();
        let server = SeatServer::new(socket_path.clone(), directory, cancel_token.clone());

        // Spawn server in background
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        // Wait for socket to be ready with timeout
        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }

        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            socket_path,
            store,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Connects and completes the handshake as `user`.
    async fn connect_as(&self, user: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(ClientMessage::connect(user, None)).await;
        match client.recv().await {
            ServerMessage::Connected { .. } => client,
            other => panic!("Expected Connected, got {other:?}"),
        }
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        self.send_raw(&json).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> ServerMessage {
        let mut line = String::new();
        timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("server message within timeout")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Joins `show` and returns the snapshot.
    async fn join(&mut self, show: &str) -> (Vec<String>, Vec<String>) {
        self.send(ClientMessage::join(show)).await;
        match self.recv().await {
            ServerMessage::Joined {
                held_seats,
                booked_seats,
                ..
            } => (
                held_seats.iter().map(|s| s.as_str().to_string()).collect(),
                booked_seats.iter().map(|s| s.as_str().to_string()).collect(),
            ),
            other => panic!("Expected Joined, got {other:?}"),
        }
    }

    /// Reads until the connection closes, returning how many messages came.
    async fn read_to_eof(&mut self) -> usize {
        let mut count = 0;
        loop {
            let mut line = String::new();
            let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .expect("connection should close")
                .unwrap_or(0);
            if n == 0 {
                return count;
            }
            count += 1;
        }
    }
}

fn error_code(msg: &ServerMessage) -> Option<&str> {
    match msg {
        ServerMessage::Error { code, .. } => code.as_deref(),
        _ => None,
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_assigns_connection_id() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .send(ClientMessage::connect("U1", Some("kiosk-7".to_string())))
        .await;
    match client.recv().await {
        ServerMessage::Connected {
            protocol_version,
            client_id,
        } => {
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
            assert_eq!(client_id.as_str(), "kiosk-7");
        }
        other => panic!("Expected Connected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let msg = ClientMessage {
        protocol_version: ProtocolVersion::new(99, 0),
        message: MessageType::Connect {
            user_id: UserId::new("U1"),
            client_id: None,
        },
    };
    client.send(msg).await;
    assert!(matches!(client.recv().await, ServerMessage::Rejected { .. }));
    assert_eq!(client.read_to_eof().await, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_first_message_must_be_connect() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send(ClientMessage::join("S1")).await;
    assert!(matches!(client.recv().await, ServerMessage::Rejected { .. }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_connection_id_is_rejected() {
    let server = TestServer::spawn().await;
    let mut first = server.connect().await;
    first
        .send(ClientMessage::connect("U1", Some("dup".to_string())))
        .await;
    assert!(matches!(first.recv().await, ServerMessage::Connected { .. }));

    let mut second = server.connect().await;
    second
        .send(ClientMessage::connect("U2", Some("dup".to_string())))
        .await;
    assert!(matches!(second.recv().await, ServerMessage::Rejected { .. }));

    server.shutdown().await;
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn test_ping_and_bad_request() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_as("U1").await;

    client.send(ClientMessage::ping(7)).await;
    assert_eq!(client.recv().await, ServerMessage::pong(7));

    client.send_raw("{not json").await;
    let reply = client.recv().await;
    assert_eq!(error_code(&reply), Some("bad_request"));

    // Still usable afterwards
    client.send(ClientMessage::ping(8)).await;
    assert_eq!(client.recv().await, ServerMessage::pong(8));

    server.shutdown().await;
}

#[tokio::test]
async fn test_select_requires_join() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_as("U1").await;

    client.send(ClientMessage::select("S1", "A1")).await;
    assert_eq!(error_code(&client.recv().await), Some("not_joined"));

    client.send(ClientMessage::join("nope")).await;
    assert_eq!(error_code(&client.recv().await), Some("unknown_show"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_join_snapshot_shows_holds() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect_as("U1").await;
    let mut bob = server.connect_as("U2").await;

    assert_eq!(alice.join("S1").await, (vec![], vec![]));

    alice.send(ClientMessage::select("S1", "A1")).await;
    match alice.recv().await {
        ServerMessage::Held {
            seat,
            expires_in_ms,
            ..
        } => {
            assert_eq!(seat.as_str(), "A1");
            assert!(expires_in_ms > 0 && expires_in_ms <= 60_000);
        }
        other => panic!("Expected Held, got {other:?}"),
    }

    assert_eq!(bob.join("S1").await, (vec!["A1".to_string()], vec![]));

    bob.send(ClientMessage::select("S1", "A1")).await;
    assert_eq!(error_code(&bob.recv().await), Some("already_held"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_events_fan_out_to_watchers() {
    let server = TestServer::spawn().await;
    let mut buyer = server.connect_as("U1").await;
    let mut watcher = server.connect_as("U2").await;
    buyer.join("S1").await;
    watcher.join("S1").await;

    buyer.send(ClientMessage::select("S1", "A1")).await;
    assert!(matches!(buyer.recv().await, ServerMessage::Held { .. }));
    buyer.send(ClientMessage::select("S1", "A2")).await;
    assert!(matches!(buyer.recv().await, ServerMessage::Held { .. }));

    let show = ShowId::new("S1");
    assert_eq!(
        watcher.recv().await,
        ServerMessage::locked(show.clone(), "A1".into())
    );
    assert_eq!(
        watcher.recv().await,
        ServerMessage::locked(show.clone(), "A2".into())
    );

    buyer
        .send(ClientMessage::commit(
            "S1",
            vec!["A1".into(), "A2".into()],
            Money::rupees(400),
        ))
        .await;

    // Broadcasts are queued before the reply
    assert_eq!(buyer.recv().await, ServerMessage::booked(show.clone(), "A1".into()));
    assert_eq!(buyer.recv().await, ServerMessage::booked(show.clone(), "A2".into()));
    match buyer.recv().await {
        ServerMessage::CommitSuccess {
            ticket,
            new_balance,
            ..
        } => {
            assert_eq!(new_balance, Money::rupees(600));
            assert_eq!(ticket.amount, Money::rupees(400));
        }
        other => panic!("Expected CommitSuccess, got {other:?}"),
    }

    assert_eq!(watcher.recv().await, ServerMessage::booked(show.clone(), "A1".into()));
    assert_eq!(watcher.recv().await, ServerMessage::booked(show, "A2".into()));

    let vendor = server.store.read_user(&UserId::new("V1")).await.unwrap();
    assert_eq!(vendor.balance, Money::rupees(400));

    server.shutdown().await;
}

#[tokio::test]
async fn test_commit_error_reports_reasons() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_as("U1").await;
    client.join("S1").await;

    client.send(ClientMessage::select("S1", "D4")).await;
    assert!(matches!(client.recv().await, ServerMessage::Held { .. }));

    client
        .send(ClientMessage::commit("S1", vec!["D4".into()], Money::rupees(50)))
        .await;
    match client.recv().await {
        ServerMessage::CommitError {
            reasons, retryable, ..
        } => {
            assert!(!retryable);
            assert_eq!(reasons.len(), 1);
            assert!(reasons[0].contains("Invalid amount"), "{reasons:?}");
        }
        other => panic!("Expected CommitError, got {other:?}"),
    }

    // Hold survives the rejection
    client.send(ClientMessage::leave("S1")).await;
    assert!(matches!(client.recv().await, ServerMessage::Left { .. }));
    assert_eq!(client.join("S1").await.0, vec!["D4".to_string()]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_releases_holds() {
    let server = TestServer::spawn().await;
    let mut leaver = server.connect_as("U1").await;
    let mut other = server.connect_as("U2").await;
    leaver.join("S1").await;
    other.join("S1").await;

    leaver.send(ClientMessage::select("S1", "C3")).await;
    assert!(matches!(leaver.recv().await, ServerMessage::Held { .. }));

    let show = ShowId::new("S1");
    assert_eq!(
        other.recv().await,
        ServerMessage::locked(show.clone(), "C3".into())
    );

    drop(leaver);
    assert_eq!(other.recv().await, ServerMessage::unlocked(show, "C3".into()));

    other.send(ClientMessage::select("S1", "C3")).await;
    assert!(matches!(other.recv().await, ServerMessage::Held { .. }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_graceful_disconnect_message() {
    let server = TestServer::spawn().await;
    let mut leaver = server.connect_as("U1").await;
    let mut other = server.connect_as("U2").await;
    leaver.join("S1").await;
    other.join("S1").await;

    leaver.send(ClientMessage::select("S1", "E5")).await;
    assert!(matches!(leaver.recv().await, ServerMessage::Held { .. }));
    assert!(matches!(other.recv().await, ServerMessage::Locked { .. }));

    leaver.send(ClientMessage::disconnect()).await;
    assert_eq!(leaver.read_to_eof().await, 0);
    assert!(matches!(other.recv().await, ServerMessage::Unlocked { .. }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let server = TestServer::spawn().await;
    let socket_path = server.socket_path.clone();
    assert!(socket_path.exists());

    server.cancel_token.cancel();
    sleep(SHUTDOWN_GRACE_PERIOD).await;
    assert!(!socket_path.exists());
}
