//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs the handshake (protocol version + user identity)
//! - Routes requests to the show actors
//! - Runs a writer task draining the connection's outbox
//! - Releases every hold of the connection when it goes away
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A bad request is answered with an error and the connection continues
//! - I/O errors end the connection and trigger hold clean-up

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use seat_core::{ConnectionId, Money, SeatCode, ShowId};
use seat_protocol::{ClientMessage, MessageType, ProtocolVersion, ServerMessage};

use crate::directory::ShowDirectory;
use crate::session::{SessionError, SessionRegistry};
use crate::show::{Holder, Outbox, ShowError, ShowHandle, OUTBOX_CAPACITY};

/// Maximum message size (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Read timeout for idle connections (5 minutes)
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    directory: Arc<ShowDirectory>,
    sessions: Arc<SessionRegistry>,
    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        directory: Arc<ShowDirectory>,
        sessions: Arc<SessionRegistry>,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            directory,
            sessions,
            connection_number,
        }
    }

    /// Runs the connection until it closes.
    ///
    /// Returns the connection id if the handshake succeeded.
    pub async fn run(mut self) -> Option<ConnectionId> {
        debug!(connection = self.connection_number, "New client connected");

        let holder = match self.handle_handshake().await {
            Ok(holder) => {
                info!(
                    connection = %holder.connection,
                    user = %holder.user,
                    "Client handshake completed"
                );
                holder
            }
            Err(e) => {
                warn!(
                    connection = self.connection_number,
                    error = %e,
                    "Handshake failed"
                );
                return None;
            }
        };

        let Self {
            reader,
            writer,
            directory,
            sessions,
            ..
        } = self;

        let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let writer_task = spawn_writer(writer, outbox_rx, holder.connection.clone());

        let connection = holder.connection.clone();
        let mut client = ConnectedClient {
            reader,
            outbox,
            directory,
            sessions: Arc::clone(&sessions),
            holder,
        };
        if let Err(e) = client.process_messages().await {
            debug!(connection = %connection, error = %e, "Connection closed");
        }
        drop(client);

        let shows = sessions.disconnect(&connection).await;
        info!(connection = %connection, shows, "Client disconnected");

        // Let already queued messages drain once the show actors drop their
        // outbox clones
        let _ = timeout(WRITE_TIMEOUT, writer_task).await;

        Some(connection)
    }

    /// Expects a `Connect` message, validates its version and registers the
    /// connection under the given user.
    async fn handle_handshake(&mut self) -> Result<Holder, ConnectionError> {
        let msg = match timeout(READ_TIMEOUT, read_message(&mut self.reader)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout),
        };

        if let Err(e) = ProtocolVersion::check_client(&msg.protocol_version) {
            warn!(
                client_version = %msg.protocol_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );
            write_message(&mut self.writer, &ServerMessage::rejected(&e.to_string())).await?;
            return Err(ConnectionError::VersionMismatch {
                client: msg.protocol_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { user_id, client_id } => {
                let connection = client_id
                    .map(ConnectionId::new)
                    .unwrap_or_else(|| ConnectionId::new(format!("conn-{}", self.connection_number)));

                if let Err(e) = self
                    .sessions
                    .register(connection.clone(), user_id.clone())
                    .await
                {
                    write_message(&mut self.writer, &ServerMessage::rejected(&e.to_string()))
                        .await?;
                    return Err(e.into());
                }

                if let Err(e) =
                    write_message(&mut self.writer, &ServerMessage::connected(connection.clone()))
                        .await
                {
                    self.sessions.disconnect(&connection).await;
                    return Err(e);
                }

                Ok(Holder::new(user_id, connection))
            }
            other => {
                write_message(
                    &mut self.writer,
                    &ServerMessage::rejected("Expected connect message for handshake"),
                )
                .await?;
                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }
}

/// A client past the handshake.
struct ConnectedClient {
    reader: BufReader<OwnedReadHalf>,
    outbox: Outbox,
    directory: Arc<ShowDirectory>,
    sessions: Arc<SessionRegistry>,
    holder: Holder,
}

impl ConnectedClient {
    /// Reads and handles messages until the client leaves or I/O fails.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, read_message(&mut self.reader)).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(connection = %self.holder.connection, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(e @ (ConnectionError::ParseError(_)
                | ConnectionError::MessageTooLarge { .. }))) => {
                    debug!(connection = %self.holder.connection, error = %e, "Bad request");
                    self.reply(ServerMessage::error_with_code(&e.to_string(), "bad_request"))
                        .await?;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(connection = %self.holder.connection, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            if ProtocolVersion::check_client(&msg.protocol_version).is_err() {
                self.reply(ServerMessage::error_with_code(
                    &format!(
                        "Protocol version {} not supported",
                        msg.protocol_version
                    ),
                    "version_mismatch",
                ))
                .await?;
                continue;
            }

            if matches!(msg.message, MessageType::Disconnect) {
                debug!(connection = %self.holder.connection, "Client requested disconnect");
                return Ok(());
            }

            self.handle_message(msg.message).await?;
        }
    }

    /// Handles one request. Only a closed outbox is an error.
    async fn handle_message(&mut self, message: MessageType) -> Result<(), ConnectionError> {
        let response = match message {
            MessageType::Connect { .. } => {
                ServerMessage::error_with_code("Already connected", "already_connected")
            }
            MessageType::Join { show_id } => match self.join(&show_id).await {
                // The actor queues `joined` itself
                Ok(()) => return Ok(()),
                Err(e) => show_error(&show_id, &e),
            },
            MessageType::Leave { show_id } => self.leave(show_id).await,
            MessageType::Select { show_id, seat } => self.select(show_id, seat).await,
            MessageType::Unselect { show_id, seat } => self.unselect(show_id, seat).await,
            MessageType::Commit {
                show_id,
                seats,
                amount,
            } => self.commit(show_id, seats, amount).await,
            MessageType::BookGeneral {
                show_id,
                quantity,
                amount,
            } => self.book_general(show_id, quantity, amount).await,
            MessageType::Ping { seq } => ServerMessage::pong(seq),
            MessageType::Disconnect => return Ok(()),
        };
        self.reply(response).await
    }

    async fn join(&self, show_id: &ShowId) -> Result<(), ShowError> {
        let handle = self.directory.get(show_id).await?;
        handle
            .join(self.holder.connection.clone(), self.outbox.clone())
            .await?;
        // Recorded after the actor accepted us so disconnect reaches it
        if let Err(e) = self
            .sessions
            .record_join(&self.holder.connection, show_id.clone())
            .await
        {
            warn!(connection = %self.holder.connection, error = %e, "Join not recorded");
        }
        Ok(())
    }

    async fn leave(&self, show_id: ShowId) -> ServerMessage {
        let result = match self.directory.existing(&show_id).await {
            Some(handle) => handle.leave(self.holder.connection.clone()).await,
            None => Ok(false),
        };
        match result {
            Ok(true) => ServerMessage::Left { show_id },
            Ok(false) => show_error(&show_id, &ShowError::NotJoined(show_id.clone())),
            Err(e) => show_error(&show_id, &e),
        }
    }

    async fn select(&self, show_id: ShowId, seat: SeatCode) -> ServerMessage {
        let result = match self.joined_show(&show_id).await {
            Ok(handle) => handle.select(self.holder.clone(), seat).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(held) => ServerMessage::Held {
                show_id,
                seat: held.seat,
                expires_in_ms: u64::try_from(held.expires_in.as_millis()).unwrap_or(u64::MAX),
            },
            Err(e) => show_error(&show_id, &e),
        }
    }

    async fn unselect(&self, show_id: ShowId, seat: SeatCode) -> ServerMessage {
        let result = match self.joined_show(&show_id).await {
            Ok(handle) => handle.unselect(self.holder.clone(), seat.clone()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => ServerMessage::Released { show_id, seat },
            Err(e) => show_error(&show_id, &e),
        }
    }

    async fn commit(&self, show_id: ShowId, seats: Vec<SeatCode>, amount: Money) -> ServerMessage {
        let result = match self.joined_show(&show_id).await {
            Ok(handle) => handle.commit(self.holder.clone(), seats, amount).await,
            Err(e) => Err(e),
        };
        booking_response(show_id, result)
    }

    async fn book_general(&self, show_id: ShowId, quantity: u32, amount: Money) -> ServerMessage {
        let result = match self.directory.get(&show_id).await {
            Ok(handle) => {
                handle
                    .book_general(self.holder.clone(), quantity, amount)
                    .await
            }
            Err(e) => Err(e),
        };
        booking_response(show_id, result)
    }

    /// Requests touching holds need a running actor the client has joined;
    /// the actor itself checks membership.
    async fn joined_show(&self, show_id: &ShowId) -> Result<ShowHandle, ShowError> {
        self.directory
            .existing(show_id)
            .await
            .ok_or_else(|| ShowError::NotJoined(show_id.clone()))
    }

    async fn reply(&self, message: ServerMessage) -> Result<(), ConnectionError> {
        self.outbox
            .send(message)
            .await
            .map_err(|_| ConnectionError::Io("outbox closed".to_string()))
    }
}

fn show_error(show_id: &ShowId, err: &ShowError) -> ServerMessage {
    debug!(show_id = %show_id, code = err.code(), error = %err, "Request failed");
    ServerMessage::error_with_code(&err.to_string(), err.code())
}

fn booking_response(
    show_id: ShowId,
    result: Result<crate::storage::BookingReceipt, ShowError>,
) -> ServerMessage {
    match result {
        Ok(receipt) => ServerMessage::CommitSuccess {
            show_id,
            ticket: Box::new(receipt.ticket),
            new_balance: receipt.new_balance,
        },
        Err(ShowError::Commit(e)) => ServerMessage::CommitError {
            show_id,
            reasons: e.reasons(),
            retryable: e.is_retryable(),
        },
        Err(e) => show_error(&show_id, &e),
    }
}

/// Spawns the task that owns the write half and drains the outbox.
fn spawn_writer(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut outbox_rx: mpsc::Receiver<ServerMessage>,
    connection: ConnectionId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            if let Err(e) = write_message(&mut writer, &msg).await {
                debug!(connection = %connection, error = %e, "Writer stopped");
                break;
            }
        }
    })
}

/// Reads a single newline-delimited message.
async fn read_message(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<ClientMessage, ConnectionError> {
    let mut line = String::new();

    let bytes_read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

    if bytes_read == 0 {
        return Err(ConnectionError::Eof);
    }

    if line.len() > MAX_MESSAGE_SIZE {
        return Err(ConnectionError::MessageTooLarge {
            size: line.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    serde_json::from_str(&line).map_err(|e| ConnectionError::ParseError(e.to_string()))
}

/// Writes one message as a JSON line.
async fn write_message(
    writer: &mut BufWriter<OwnedWriteHalf>,
    msg: &ServerMessage,
) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::{CommitError, CommitRejection, HoldError};

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 0),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));

        let err = ConnectionError::MessageTooLarge {
            size: 100_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("65536"));
    }

    #[test]
    fn test_booking_response_mapping() {
        let msg = booking_response(
            ShowId::new("S1"),
            Err(ShowError::Commit(CommitError::Rejected(vec![
                CommitRejection::SeatNotHeld(SeatCode::from("A1")),
            ]))),
        );
        match msg {
            ServerMessage::CommitError {
                reasons, retryable, ..
            } => {
                assert_eq!(reasons, vec!["Seat A1 is not held by you".to_string()]);
                assert!(!retryable);
            }
            other => panic!("Expected CommitError, got {other:?}"),
        }

        let msg = booking_response(
            ShowId::new("S1"),
            Err(ShowError::Commit(CommitError::TransactionFailed("io".into()))),
        );
        assert!(matches!(
            msg,
            ServerMessage::CommitError {
                retryable: true,
                ..
            }
        ));
    }

    #[test]
    fn test_show_error_carries_code() {
        let msg = show_error(
            &ShowId::new("S1"),
            &ShowError::Hold(HoldError::AlreadyHeld(SeatCode::from("B5"))),
        );
        assert_eq!(
            msg,
            ServerMessage::error_with_code("seat B5 is held by another buyer", "already_held")
        );
    }
}
