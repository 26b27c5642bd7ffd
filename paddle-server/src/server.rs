//! WebSocket Server
//!
//! Front door for the two realtime endpoints:
//!
//! - `/matchmaking?token=...`: per-player channel that relays queue
//!   events until the terminal `match_found`, then closes.
//! - `/game?session=...&token=...`: game-session endpoint; the join
//!   credential is consumed atomically at connect time. A dropped player
//!   resumes with `/game?session=...&resume=<user>` inside the reconnect
//!   window (identity on the resume path comes from the out-of-scope
//!   session-cookie layer).
//!
//! Credentials ride the request URI and are validated before any further
//! traffic is accepted; a second connection attempt with the same credential
//! always fails.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::credentials::{ChannelClaims, CredentialStore, JoinClaims};
use crate::protocol::{
    ChannelMessage, ErrorCode, GameClientMessage, GameServerMessage, QueueJoinResponse, QueueMode,
    UserId,
};
use crate::queue::{PlayerProfile, QueueCoordinator, QueueError};
use crate::session::{JoinOutcome, MatchSession, SessionConfig, SessionError, SessionManager, SessionState};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Channel credential lifetime (covers expected queue wait).
    pub channel_ttl: Duration,
    /// Join credential lifetime (covers only the handoff window).
    pub join_ttl: Duration,
    /// Countdown length in seconds.
    pub countdown_secs: u32,
    /// Reconnect window for dropped players.
    pub reconnect_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9090".parse().unwrap(),
            max_connections: 1000,
            channel_ttl: Duration::from_secs(120),
            join_ttl: Duration::from_secs(10),
            countdown_secs: 3,
            reconnect_timeout: Duration::from_secs(30),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn env_secs(key: &str) -> Option<Duration> {
            std::env::var(key).ok()?.parse().ok().map(Duration::from_secs)
        }

        Self {
            bind_addr: std::env::var("PADDLE_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("PADDLE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            channel_ttl: env_secs("PADDLE_CHANNEL_TTL_SECS").unwrap_or(defaults.channel_ttl),
            join_ttl: env_secs("PADDLE_JOIN_TTL_SECS").unwrap_or(defaults.join_ttl),
            countdown_secs: std::env::var("PADDLE_COUNTDOWN_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.countdown_secs),
            reconnect_timeout: env_secs("PADDLE_RECONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.reconnect_timeout),
            version: defaults.version,
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The endpoint a connection asked for, parsed from the request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    Matchmaking {
        token: Option<String>,
    },
    Game {
        session: Option<String>,
        token: Option<String>,
        resume: Option<UserId>,
    },
}

/// Arena-style registry of live connections, keyed by a generated handle.
/// Inserted on connect, removed on disconnect; also enforces the
/// connection cap.
struct ConnectionRegistry {
    next_id: AtomicU64,
    capacity: usize,
    connections: RwLock<HashMap<u64, SocketAddr>>,
}

impl ConnectionRegistry {
    fn new(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            capacity,
            connections: RwLock::new(HashMap::new()),
        }
    }

    async fn insert(&self, addr: SocketAddr) -> Option<u64> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.capacity {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        connections.insert(id, addr);
        Some(id)
    }

    async fn remove(&self, id: u64) {
        self.connections.write().await.remove(&id);
    }

    async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// The matchmaking and game-session server.
pub struct GameServer {
    config: ServerConfig,
    channel_credentials: Arc<CredentialStore<ChannelClaims>>,
    join_credentials: Arc<CredentialStore<JoinClaims>>,
    queue: Arc<QueueCoordinator>,
    sessions: Arc<SessionManager>,
    registry: Arc<ConnectionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server, wiring the credential stores, queue, and sessions.
    pub fn new(config: ServerConfig) -> Self {
        let channel_credentials = Arc::new(CredentialStore::new(config.channel_ttl));
        let join_credentials = Arc::new(CredentialStore::new(config.join_ttl));
        let sessions = Arc::new(SessionManager::new(SessionConfig {
            countdown_secs: config.countdown_secs,
            reconnect_timeout: config.reconnect_timeout,
            join_window: config.join_ttl * 6,
        }));
        let queue = Arc::new(QueueCoordinator::new(
            channel_credentials.clone(),
            join_credentials.clone(),
            sessions.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            registry: Arc::new(ConnectionRegistry::new(config.max_connections)),
            config,
            channel_credentials,
            join_credentials,
            queue,
            sessions,
            shutdown_tx,
        }
    }

    /// Queue-join entry point for the request layer: enqueue and mint the
    /// channel credential. Conflicts with [`QueueError::AlreadyQueued`] on a
    /// duplicate join.
    pub async fn queue_join(
        &self,
        profile: PlayerProfile,
        mode: QueueMode,
    ) -> Result<QueueJoinResponse, QueueError> {
        self.queue.join(profile, mode).await
    }

    /// Queue-leave entry point for the request layer. Idempotent.
    pub async fn queue_leave(&self, user_id: UserId) {
        self.queue.leave(user_id).await;
    }

    /// Run the server until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("paddle server v{} listening on {}", self.config.version, self.config.bind_addr);

        let cleanup_sessions = self.sessions.clone();
        let cleanup_handle = tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(30));
            loop {
                tick.tick().await;
                cleanup_sessions.cleanup().await;
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr).await,
                        Err(e) => error!("accept error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Signal the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Live connection count.
    pub async fn connection_count(&self) -> usize {
        self.registry.count().await
    }

    /// Active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.count().await
    }

    /// Waiting ticket count.
    pub async fn queue_size(&self) -> usize {
        self.queue.len().await
    }

    /// Accept a WebSocket handshake and dispatch on the request path.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let Some(conn_id) = self.registry.insert(addr).await else {
            warn!("connection limit reached, rejecting {}", addr);
            return;
        };

        let registry = self.registry.clone();
        let queue = self.queue.clone();
        let sessions = self.sessions.clone();
        let channel_credentials = self.channel_credentials.clone();
        let join_credentials = self.join_credentials.clone();
        let countdown_secs = self.config.countdown_secs;
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut endpoint: Option<Endpoint> = None;
            let callback = |req: &Request, resp: Response| {
                endpoint = parse_endpoint(req.uri().path(), req.uri().query());
                Ok(resp)
            };

            let ws_stream = match accept_hdr_async(stream, callback).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("handshake failed for {}: {}", addr, e);
                    registry.remove(conn_id).await;
                    return;
                }
            };

            match endpoint {
                Some(Endpoint::Matchmaking { token }) => {
                    run_matchmaking_channel(ws_stream, token, channel_credentials, queue, shutdown_rx)
                        .await;
                }
                Some(Endpoint::Game { session, token, resume }) => {
                    run_game_socket(
                        ws_stream,
                        session,
                        token,
                        resume,
                        join_credentials,
                        sessions,
                        countdown_secs,
                        shutdown_rx,
                    )
                    .await;
                }
                None => {
                    debug!("unknown endpoint requested by {}", addr);
                }
            }

            registry.remove(conn_id).await;
            debug!("connection {} from {} cleaned up", conn_id, addr);
        });
    }
}

/// Parse the request path and query into an endpoint descriptor.
fn parse_endpoint(path: &str, query: Option<&str>) -> Option<Endpoint> {
    let query = query.unwrap_or("");
    match path {
        "/matchmaking" => Some(Endpoint::Matchmaking {
            token: query_param(query, "token"),
        }),
        "/game" => Some(Endpoint::Game {
            session: query_param(query, "session"),
            token: query_param(query, "token"),
            resume: query_param(query, "resume").and_then(|v| v.parse().ok()),
        }),
        _ => None,
    }
}

/// Extract a query parameter value. Tokens and ids are URI-safe, so no
/// percent-decoding is needed.
fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

/// Serve one matchmaking channel: validate the channel credential, attach
/// the ticket, and relay coordinator messages. `match_found` is terminal;
/// nothing is sent after it and the socket closes right away.
async fn run_matchmaking_channel(
    ws_stream: WebSocketStream<TcpStream>,
    token: Option<String>,
    channel_credentials: Arc<CredentialStore<ChannelClaims>>,
    queue: Arc<QueueCoordinator>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let claims = match token.as_deref().map(|t| channel_credentials.validate(t)) {
        Some(Ok(claims)) => claims,
        _ => {
            send_channel_error(&mut ws_sender, ErrorCode::InvalidOrExpiredToken).await;
            return;
        }
    };
    let user_id = claims.user_id;

    let (tx, mut rx) = mpsc::channel::<ChannelMessage>(64);
    if queue.attach_channel(user_id, tx).await.is_err() {
        // Valid credential but the ticket is gone (left or reaped).
        send_channel_error(&mut ws_sender, ErrorCode::InternalError).await;
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let terminal = matches!(msg, ChannelMessage::MatchFound { .. });
                match msg.to_json() {
                    Ok(text) => {
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            queue.detach_channel(user_id).await;
                            break;
                        }
                    }
                    Err(e) => {
                        error!("failed to serialize channel message: {}", e);
                        continue;
                    }
                }
                if terminal {
                    debug!(user_id, "match_found delivered, closing channel");
                    break;
                }
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    // The channel carries no client->server traffic beyond
                    // the connect-time credential; ignore stray frames.
                    Some(Ok(Message::Close(_))) | None => {
                        queue.detach_channel(user_id).await;
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(user_id, "channel socket error: {}", e);
                        queue.detach_channel(user_id).await;
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_rx.recv() => {
                queue.detach_channel(user_id).await;
                break;
            }
        }
    }

    let _ = ws_sender.close().await;
}

/// Resolve a game-socket connect into a user and session, consuming the
/// join credential on the fresh-join path.
async fn authorize_game_join(
    join_credentials: &CredentialStore<JoinClaims>,
    sessions: &SessionManager,
    session_id: Option<&str>,
    token: Option<&str>,
    resume: Option<UserId>,
) -> Result<(UserId, Arc<RwLock<MatchSession>>), ErrorCode> {
    let session_id = session_id.ok_or(ErrorCode::InvalidOrExpiredToken)?;

    let user_id = match (token, resume) {
        (Some(token), _) => {
            let claims = join_credentials
                .validate(token)
                .map_err(|_| ErrorCode::InvalidOrExpiredToken)?;
            if claims.match_session_id != session_id {
                return Err(ErrorCode::InvalidOrExpiredToken);
            }
            claims.user_id
        }
        // Resume path: identity was re-established by the session-cookie
        // layer upstream; the seat check below still gates entry.
        (None, Some(user_id)) => user_id,
        (None, None) => return Err(ErrorCode::InvalidOrExpiredToken),
    };

    let session = sessions
        .get(session_id)
        .await
        .ok_or(ErrorCode::InvalidOrExpiredToken)?;
    Ok((user_id, session))
}

/// Serve one game-session socket.
async fn run_game_socket(
    ws_stream: WebSocketStream<TcpStream>,
    session_id: Option<String>,
    token: Option<String>,
    resume: Option<UserId>,
    join_credentials: Arc<CredentialStore<JoinClaims>>,
    sessions: Arc<SessionManager>,
    countdown_secs: u32,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (user_id, session) = match authorize_game_join(
        &join_credentials,
        &sessions,
        session_id.as_deref(),
        token.as_deref(),
        resume,
    )
    .await
    {
        Ok(resolved) => resolved,
        Err(code) => {
            send_game_error(&mut ws_sender, code).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<GameServerMessage>(64);
    let outcome = {
        let mut s = session.write().await;
        s.join(user_id, tx.clone())
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            let code = match e {
                SessionError::NotAParticipant | SessionError::ReconnectWindowClosed => {
                    ErrorCode::InvalidOrExpiredToken
                }
                SessionError::AlreadyJoined | SessionError::InvalidState => {
                    ErrorCode::InternalError
                }
            };
            send_game_error(&mut ws_sender, code).await;
            return;
        }
    };

    {
        let s = session.read().await;
        let _ = tx
            .send(GameServerMessage::Joined {
                match_session_id: s.id.clone(),
                user_id,
            })
            .await;
    }

    match outcome {
        JoinOutcome::Waiting => {
            let _ = tx.send(GameServerMessage::Waiting).await;
        }
        JoinOutcome::Ready => {
            spawn_countdown(session.clone(), countdown_secs);
        }
        JoinOutcome::Resumed => {
            let s = session.read().await;
            if s.state() == SessionState::Playing {
                let _ = tx.send(GameServerMessage::Started).await;
            }
            s.broadcast(GameServerMessage::PeerReconnected { user_id }).await;
            info!(user_id, session_id = %s.id, "player resumed");
        }
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg.to_json() {
                    Ok(text) => {
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            mark_dropped(&session, user_id).await;
                            break;
                        }
                    }
                    Err(e) => error!("failed to serialize game message: {}", e),
                }
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match GameClientMessage::from_json(&text) {
                            Ok(GameClientMessage::Ping { timestamp }) => {
                                let _ = tx.send(GameServerMessage::Pong {
                                    timestamp,
                                    server_time: unix_millis(),
                                }).await;
                            }
                            Ok(GameClientMessage::Leave) => {
                                let mut s = session.write().await;
                                s.remove_player(user_id);
                                s.broadcast(GameServerMessage::PeerLeft { user_id }).await;
                                break;
                            }
                            // Malformed frames are dropped, never fatal.
                            Err(e) => debug!(user_id, "malformed game frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        mark_dropped(&session, user_id).await;
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(user_id, "game socket error: {}", e);
                        mark_dropped(&session, user_id).await;
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    let _ = ws_sender.close().await;
}

/// Countdown task: tick down once per second, then flip to Playing.
fn spawn_countdown(session: Arc<RwLock<MatchSession>>, countdown_secs: u32) {
    tokio::spawn(async move {
        {
            let mut s = session.write().await;
            s.begin_countdown();
        }

        for remaining in (1..=countdown_secs).rev() {
            {
                let s = session.read().await;
                s.broadcast(GameServerMessage::Countdown { seconds: remaining }).await;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let mut s = session.write().await;
        s.begin_playing();
        s.broadcast(GameServerMessage::Started).await;
        info!(session_id = %s.id, "match started");
    });
}

/// Record an unexpected drop: the seat stays resumable inside the
/// reconnect window and the peer learns about it.
async fn mark_dropped(session: &Arc<RwLock<MatchSession>>, user_id: UserId) {
    let mut s = session.write().await;
    if s.mark_disconnected(user_id) {
        s.broadcast(GameServerMessage::PeerLeft { user_id }).await;
    }
}

async fn send_channel_error<S>(ws_sender: &mut S, code: ErrorCode)
where
    S: SinkExt<Message> + Unpin,
{
    if let Ok(text) = (ChannelMessage::Error { error: code }).to_json() {
        let _ = ws_sender.send(Message::Text(text)).await;
    }
    let _ = ws_sender.close().await;
}

async fn send_game_error<S>(ws_sender: &mut S, code: ErrorCode)
where
    S: SinkExt<Message> + Unpin,
{
    if let Ok(text) = (GameServerMessage::Error { error: code }).to_json() {
        let _ = ws_sender.send(Message::Text(text)).await;
    }
    let _ = ws_sender.close().await;
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialError;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.countdown_secs, 3);
        assert!(config.join_ttl < config.channel_ttl);
    }

    #[test]
    fn test_parse_endpoint_matchmaking() {
        let endpoint = parse_endpoint("/matchmaking", Some("token=abc123")).unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Matchmaking {
                token: Some("abc123".into())
            }
        );
    }

    #[test]
    fn test_parse_endpoint_game() {
        let endpoint = parse_endpoint("/game", Some("session=m-1&token=t-1")).unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Game {
                session: Some("m-1".into()),
                token: Some("t-1".into()),
                resume: None,
            }
        );

        let endpoint = parse_endpoint("/game", Some("session=m-1&resume=42")).unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Game {
                session: Some("m-1".into()),
                token: None,
                resume: Some(42),
            }
        );
    }

    #[test]
    fn test_parse_endpoint_unknown_path() {
        assert!(parse_endpoint("/chat", None).is_none());
    }

    #[test]
    fn test_query_param() {
        assert_eq!(query_param("a=1&b=2", "b"), Some("2".into()));
        assert_eq!(query_param("a=1&b=2", "c"), None);
        assert_eq!(query_param("", "a"), None);
    }

    #[tokio::test]
    async fn test_registry_capacity() {
        let registry = ConnectionRegistry::new(2);
        let addr: SocketAddr = "127.0.0.1:1000".parse().unwrap();

        let a = registry.insert(addr).await.unwrap();
        let _b = registry.insert(addr).await.unwrap();
        assert!(registry.insert(addr).await.is_none());

        registry.remove(a).await;
        assert!(registry.insert(addr).await.is_some());
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(ServerConfig::default());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
        assert_eq!(server.queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = GameServer::new(ServerConfig::default());
        server.shutdown();
    }

    /// Full handoff scenario across the server's own components: two
    /// same-mode joins pair into one session, and each join token is
    /// accepted exactly once at the game-session join path.
    #[tokio::test]
    async fn test_handoff_scenario() {
        let server = GameServer::new(ServerConfig::default());

        let a = PlayerProfile {
            user_id: 1,
            display_name: "alpha".into(),
            rating: 1200,
            tier: "gold".into(),
        };
        let b = PlayerProfile {
            user_id: 2,
            display_name: "beta".into(),
            rating: 1180,
            tier: "gold".into(),
        };

        let resp_a = server.queue_join(a.clone(), QueueMode::Ranked).await.unwrap();
        assert!(matches!(
            server.queue_join(a, QueueMode::Ranked).await,
            Err(QueueError::AlreadyQueued)
        ));
        let resp_b = server.queue_join(b, QueueMode::Ranked).await.unwrap();

        // Open both channels (credential consumed at connect time).
        let claims_a = server.channel_credentials.validate(&resp_a.ws_token).unwrap();
        let claims_b = server.channel_credentials.validate(&resp_b.ws_token).unwrap();
        assert_eq!(
            server.channel_credentials.validate(&resp_a.ws_token),
            Err(CredentialError::InvalidOrExpired)
        );

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        server.queue.attach_channel(claims_a.user_id, tx_a).await.unwrap();
        server.queue.attach_channel(claims_b.user_id, tx_b).await.unwrap();

        let mut found = Vec::new();
        for rx in [&mut rx_a, &mut rx_b] {
            loop {
                match rx.recv().await {
                    Some(ChannelMessage::MatchFound {
                        match_session_id,
                        join_token,
                        ..
                    }) => {
                        found.push((match_session_id, join_token));
                        break;
                    }
                    Some(_) => continue,
                    None => panic!("channel closed before match_found"),
                }
            }
        }

        let (session_a, token_a) = found[0].clone();
        let (session_b, token_b) = found[1].clone();
        assert_eq!(session_a, session_b);
        assert_ne!(token_a, token_b);

        // First presentation of each token succeeds.
        let (user_a, session) = authorize_game_join(
            &server.join_credentials,
            &server.sessions,
            Some(&session_a),
            Some(&token_a),
            None,
        )
        .await
        .unwrap();
        assert_eq!(user_a, 1);

        let (user_b, _) = authorize_game_join(
            &server.join_credentials,
            &server.sessions,
            Some(&session_b),
            Some(&token_b),
            None,
        )
        .await
        .unwrap();
        assert_eq!(user_b, 2);

        // Second presentation always fails, whatever its origin.
        let replay = authorize_game_join(
            &server.join_credentials,
            &server.sessions,
            Some(&session_a),
            Some(&token_a),
            None,
        )
        .await;
        assert_eq!(replay.err(), Some(ErrorCode::InvalidOrExpiredToken));

        // Both seats join the session; second join reports Ready.
        let (seat_tx_a, _seat_rx_a) = mpsc::channel(8);
        let (seat_tx_b, _seat_rx_b) = mpsc::channel(8);
        let mut s = session.write().await;
        assert_eq!(s.join(user_a, seat_tx_a).unwrap(), JoinOutcome::Waiting);
        assert_eq!(s.join(user_b, seat_tx_b).unwrap(), JoinOutcome::Ready);
    }

    /// A token presented for the wrong session is rejected and consumed.
    #[tokio::test]
    async fn test_token_bound_to_session() {
        let server = GameServer::new(ServerConfig::default());
        let token = server.join_credentials.mint(JoinClaims {
            user_id: 5,
            display_name: "p".into(),
            match_session_id: "real-session".into(),
        });

        let result = authorize_game_join(
            &server.join_credentials,
            &server.sessions,
            Some("other-session"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(result.err(), Some(ErrorCode::InvalidOrExpiredToken));
        // Consumed by the failed presentation.
        assert_eq!(server.join_credentials.outstanding(), 0);
    }
}
