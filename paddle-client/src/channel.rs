//! WebSocket Plumbing
//!
//! Thin connections for the two server endpoints. Each connection splits
//! its socket, parses inbound frames on a background task into a mailbox,
//! and exposes typed send/recv. Unparseable frames are logged and dropped.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::messages::{ChannelMessage, GameClientMessage, GameServerMessage, UserId};

type WsSink =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Client networking errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The WebSocket dial or transport failed.
    #[error("connection failed: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// The matchmaking channel closed before delivering `match_found`.
    #[error("matchmaking channel closed before a match was found")]
    ChannelClosedBeforeMatch,

    /// The connection dropped while traffic was expected.
    #[error("connection lost")]
    ConnectionLost,

    /// Outbound message failed to serialize.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Build the matchmaking channel URL.
fn matchmaking_url(base_url: &str, ws_token: &str) -> String {
    format!("{}/matchmaking?token={}", base_url, ws_token)
}

/// Build the game-session URL for a fresh join.
fn game_url(base_url: &str, session_id: &str, join_token: &str) -> String {
    format!("{}/game?session={}&token={}", base_url, session_id, join_token)
}

/// Build the game-session URL for a resume.
fn resume_url(base_url: &str, session_id: &str, user_id: UserId) -> String {
    format!("{}/game?session={}&resume={}", base_url, session_id, user_id)
}

/// An open matchmaking channel.
///
/// Inbound-only from the client's point of view; the credential in the URL
/// is the only thing the client ever presents.
pub struct MatchmakingChannel {
    incoming: mpsc::UnboundedReceiver<ChannelMessage>,
    reader: JoinHandle<()>,
}

impl MatchmakingChannel {
    /// Open the channel with a queue-join `ws_token`.
    pub async fn connect(base_url: &str, ws_token: &str) -> Result<Self, ClientError> {
        let url = matchmaking_url(base_url, ws_token);
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        debug!("matchmaking channel open");

        let (_sink, stream) = ws_stream.split();
        let (tx, incoming) = mpsc::unbounded_channel();
        let reader = tokio::spawn(pump_channel(stream, tx));

        Ok(Self { incoming, reader })
    }

    /// Next channel message; `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.incoming.recv().await
    }

    /// Drain the channel until `match_found` arrives.
    pub async fn wait_for_match(
        &mut self,
    ) -> Result<ChannelMessage, ClientError> {
        while let Some(message) = self.recv().await {
            match message {
                found @ ChannelMessage::MatchFound { .. } => return Ok(found),
                other => debug!(?other, "channel message"),
            }
        }
        Err(ClientError::ChannelClosedBeforeMatch)
    }
}

impl Drop for MatchmakingChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn pump_channel(
    mut stream: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    tx: mpsc::UnboundedSender<ChannelMessage>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match ChannelMessage::from_json(&text) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("unparseable channel frame: {}", e),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
}

/// An open game-session socket.
pub struct GameConnection {
    sink: WsSink,
    incoming: mpsc::UnboundedReceiver<GameServerMessage>,
    reader: JoinHandle<()>,
}

impl GameConnection {
    /// Join a session with a single-use `join_token`.
    pub async fn connect(
        base_url: &str,
        session_id: &str,
        join_token: &str,
    ) -> Result<Self, ClientError> {
        Self::dial(&game_url(base_url, session_id, join_token)).await
    }

    /// Resume a session after a drop, inside the reconnect window.
    pub async fn resume(
        base_url: &str,
        session_id: &str,
        user_id: UserId,
    ) -> Result<Self, ClientError> {
        Self::dial(&resume_url(base_url, session_id, user_id)).await
    }

    async fn dial(url: &str) -> Result<Self, ClientError> {
        let (ws_stream, _) = connect_async(url).await?;
        debug!("game socket open");

        let (sink, stream) = ws_stream.split();
        let (tx, incoming) = mpsc::unbounded_channel();
        let reader = tokio::spawn(pump_game(stream, tx));

        Ok(Self {
            sink,
            incoming,
            reader,
        })
    }

    /// Next server message; `None` once the socket has closed.
    pub async fn recv(&mut self) -> Option<GameServerMessage> {
        self.incoming.recv().await
    }

    /// Send a client message.
    pub async fn send(&mut self, message: GameClientMessage) -> Result<(), ClientError> {
        let text = message.to_json()?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|_| ClientError::ConnectionLost)
    }

    /// Close the socket.
    pub async fn close(mut self) {
        let _ = self.sink.close().await;
    }
}

impl Drop for GameConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn pump_game(
    mut stream: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    tx: mpsc::UnboundedSender<GameServerMessage>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match GameServerMessage::from_json(&text) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("unparseable game frame: {}", e),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(
            matchmaking_url("ws://localhost:9090", "abc"),
            "ws://localhost:9090/matchmaking?token=abc"
        );
        assert_eq!(
            game_url("ws://localhost:9090", "m-1", "tok"),
            "ws://localhost:9090/game?session=m-1&token=tok"
        );
        assert_eq!(
            resume_url("ws://localhost:9090", "m-1", 42),
            "ws://localhost:9090/game?session=m-1&resume=42"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ClientError::ChannelClosedBeforeMatch.to_string(),
            "matchmaking channel closed before a match was found"
        );
        assert_eq!(ClientError::ConnectionLost.to_string(), "connection lost");
    }
}
