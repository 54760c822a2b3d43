//! Per-viewer connection handling
//!
//! Each viewer gets one task for its socket. The task owns the write half
//! and multiplexes three inputs onto it: snapshots from the broadcaster,
//! command replies from the reader task, and the shutdown signal.
//!
//! ```text
//!             ┌──────────────┐  SnapshotFrame   ┌───────────────┐
//!             │  Broadcaster │ ───────────────► │               │
//!             └──────────────┘                  │  write loop   │ ──► socket
//!  socket ──► read task ──ViewerCommand──► ... ─┤ (this task)   │
//!                        ServerMessage (mpsc) ► │               │
//!                                               └───────────────┘
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result};
use crate::protocol::message::INVALID_MESSAGE;
use crate::protocol::{ServerMessage, ViewerCommand};
use crate::session::{SessionContext, SessionState};
use crate::stats::SessionStats;

use super::broadcaster::{Broadcaster, SnapshotFrame};
use super::config::ServerConfig;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Upper bound on the closing handshake sent at shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// One viewer connection
pub struct Connection {
    state: SessionState,
    config: ServerConfig,
    broadcaster: Arc<Broadcaster>,
}

impl Connection {
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        config: ServerConfig,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            state: SessionState::new(session_id, peer_addr),
            config,
            broadcaster,
        }
    }

    /// Run the session to completion
    ///
    /// Returns when the viewer disconnects, a write fails, or the
    /// broadcaster shuts down. The session is unregistered on every path
    /// that registered it.
    pub async fn run(mut self, socket: TcpStream) -> Result<SessionStats> {
        self.state.start_handshake();

        let ws = match tokio::time::timeout(
            self.config.handshake_timeout,
            tokio_tungstenite::accept_async(socket),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout),
        };

        self.state.activate();

        let session_id = self.state.id;
        let frames = self
            .broadcaster
            .register_session(SessionContext::new(session_id, self.state.peer_addr))
            .await;

        let result = self.serve(ws, frames).await;

        self.broadcaster.unregister_session(session_id).await;
        self.state.closed();

        let stats = self.state.stats();
        tracing::debug!(
            session_id = session_id,
            sent = stats.snapshots_sent,
            dropped = stats.snapshots_dropped,
            commands = stats.commands_handled,
            "Session finished"
        );

        result.map(|()| stats)
    }

    async fn serve(
        &mut self,
        ws: WebSocketStream<TcpStream>,
        frames: broadcast::Receiver<SnapshotFrame>,
    ) -> Result<()> {
        let (sink, stream) = ws.split();
        let (reply_tx, reply_rx) = mpsc::channel(self.config.reply_capacity.max(1));

        let reader = tokio::spawn(read_loop(
            stream,
            Arc::clone(&self.broadcaster),
            reply_tx,
            self.state.id,
        ));

        let shutdown = self.broadcaster.shutdown_signal();
        let result = self.write_loop(sink, frames, reply_rx, shutdown).await;

        reader.abort();
        result
    }

    async fn write_loop(
        &mut self,
        mut sink: WsSink,
        mut frames: broadcast::Receiver<SnapshotFrame>,
        mut replies: mpsc::Receiver<ServerMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                self.state.close();
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await;
                return Ok(());
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Err(Error::Shutdown);
                    }
                }

                reply = replies.recv() => match reply {
                    Some(message) => {
                        let text = message.to_json()?;
                        sink.send(Message::Text(text.into())).await?;
                        self.state.on_command();
                    }
                    // Reader finished: the viewer closed or the socket failed
                    None => return Ok(()),
                },

                frame = frames.recv() => match frame {
                    Ok(frame) => {
                        sink.send(frame_message(&frame)?).await?;
                        self.state.on_snapshot_sent();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(
                            session_id = self.state.id,
                            skipped = skipped,
                            "Viewer lagging, oldest snapshots dropped"
                        );
                        self.state.on_lagged(skipped);
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }
}

/// Wrap a serialized snapshot as a text frame without copying it
fn frame_message(frame: &SnapshotFrame) -> Result<Message> {
    Utf8Bytes::try_from(frame.payload.clone())
        .map(Message::Text)
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Read commands until the viewer goes away, replying through `replies`
async fn read_loop(
    mut stream: WsStream,
    broadcaster: Arc<Broadcaster>,
    replies: mpsc::Sender<ServerMessage>,
    session_id: u64,
) {
    while let Some(message) = stream.next().await {
        let reply = match message {
            Ok(Message::Text(text)) => match ViewerCommand::parse(text.as_str()) {
                Ok(command) => broadcaster.handle_command(session_id, command).await,
                Err(e) => {
                    tracing::warn!(session_id = session_id, error = %e, "Malformed viewer message");
                    ServerMessage::error(INVALID_MESSAGE, e.to_string())
                }
            },
            Ok(Message::Binary(_)) => {
                ServerMessage::error(INVALID_MESSAGE, "binary messages are not supported")
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(session_id = session_id, error = %e, "Read failed");
                break;
            }
        };

        if replies.send(reply).await.is_err() {
            break;
        }
    }
}
