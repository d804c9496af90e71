//! Unix socket server for the seat reservation daemon.
//!
//! The server:
//! - Listens on a Unix socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Caps the number of concurrent connections
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   SeatServer    │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  ShowDirectory  │────▶│   ShowActor     │
//! │   (per client)  │     │                 │     │   (per show)    │
//! └───────┬─────────┘     └─────────────────┘     └────────┬────────┘
//!         │                                                │ events
//!         │ disconnect    ┌─────────────────┐              ▼
//!         └──────────────▶│ SessionRegistry │        client outboxes
//!                         └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the server keeps running

mod connection;

pub use connection::{
    ConnectionError, ConnectionHandler, MAX_MESSAGE_SIZE, READ_TIMEOUT, WRITE_TIMEOUT,
};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use seat_protocol::ServerMessage;

use crate::directory::ShowDirectory;
use crate::session::SessionRegistry;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/seatd.sock";

/// Maximum number of concurrent client connections
pub const MAX_CONNECTIONS: usize = 1024;

/// Unix socket server for the daemon.
pub struct SeatServer {
    socket_path: PathBuf,
    directory: Arc<ShowDirectory>,
    sessions: Arc<SessionRegistry>,
    cancel_token: CancellationToken,

    /// Connection counter for generating connection ids
    connection_counter: AtomicU64,

    /// Connections currently being served
    active: Arc<AtomicUsize>,
}

impl SeatServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        directory: Arc<ShowDirectory>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            sessions: Arc::new(SessionRegistry::new(Arc::clone(&directory))),
            directory,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Runs the server until the cancellation token is triggered.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(socket = %self.socket_path.display(), "Seat server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    fn handle_connection(&self, stream: UnixStream, connection_number: u64) {
        if self.active.load(Ordering::Relaxed) >= MAX_CONNECTIONS {
            warn!(
                connection = connection_number,
                max = MAX_CONNECTIONS,
                "Connection limit reached, rejecting client"
            );
            tokio::spawn(reject(stream));
            return;
        }

        self.active.fetch_add(1, Ordering::Relaxed);
        let active = Arc::clone(&self.active);
        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            Arc::clone(&self.directory),
            Arc::clone(&self.sessions),
            connection_number,
        );
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!(connection = connection_number, "Connection dropped on shutdown");
                }
                _ = handler.run() => {}
            }
            active.fetch_sub(1, Ordering::Relaxed);
        });
    }

    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Tells a client over the connection cap why it is being dropped.
async fn reject(mut stream: UnixStream) {
    let msg = ServerMessage::rejected(
        &ServerError::TooManyConnections {
            max: MAX_CONNECTIONS,
        }
        .to_string(),
    );
    if let Ok(mut json) = serde_json::to_string(&msg) {
        json.push('\n');
        let _ = tokio::time::timeout(WRITE_TIMEOUT, stream.write_all(json.as_bytes())).await;
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Too many connections (max: {max})")]
    TooManyConnections { max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path() {
        assert_eq!(DEFAULT_SOCKET_PATH, "/tmp/seatd.sock");
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::SocketSetup {
            path: PathBuf::from("/tmp/test.sock"),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/test.sock"));
        assert!(err.to_string().contains("permission denied"));

        let err = ServerError::TooManyConnections {
            max: MAX_CONNECTIONS,
        };
        assert!(err.to_string().contains("1024"));
    }
}
