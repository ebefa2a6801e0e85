//! Connection management.
//!
//! The manager owns:
//! - the three-phase handshake (start session, connection info, open channel),
//! - the persistent channel and its outbound queue,
//! - state polling with `get_state`.
//!
//! Every transport error is terminal: the manager moves to
//! [`ConnectionState::Closed`] and a new manager has to be built to reconnect.

use std::{collections::VecDeque, time::Duration};

use kitchen_shared::{
    config::ClientConfig,
    error::{ClientError, LogicError, TransportError},
    net::{send_message, Channel, Connector},
    protocol::{decode_from_bytes, ActionMessage, ChannelMessage, Inbound, LevelDescriptor, Snapshot},
};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{input::ActionIntent, session::SessionApi};

/// Inbound frames handled per [`ConnectionManager::poll`]; the rest wait for
/// the next frame.
pub const MAX_FRAMES_PER_POLL: usize = 64;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing attempted yet.
    Idle,
    /// Waiting for the session start acknowledgment.
    HandshakePhase1,
    /// Waiting for connection info.
    HandshakePhase2,
    /// Opening the persistent channel.
    ChannelConnecting,
    /// Channel open, no snapshot received yet.
    Ready,
    /// At least one snapshot received.
    Receiving,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Receiving)
    }
}

/// A player slot this client controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPlayer {
    /// Player id as it appears in snapshots.
    pub id: String,
    pub identity_hash: String,
    pub channel_address: String,
}

/// Message counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnStats {
    pub sent: u64,
    pub states: u64,
    /// Malformed or unknown inbound messages.
    pub discarded: u64,
}

pub struct ConnectionManager {
    cfg: ClientConfig,
    session: Box<dyn SessionApi>,
    connector: Box<dyn Connector>,

    state: ConnectionState,
    channel: Option<Box<dyn Channel>>,
    outbound: VecDeque<ChannelMessage>,

    players: Vec<LocalPlayer>,
    level: Option<LevelDescriptor>,

    polling: bool,
    /// When the outstanding `get_state` was sent.
    state_requested_at: Option<Instant>,
    stats: ConnStats,
}

impl ConnectionManager {
    pub fn new(cfg: ClientConfig, session: Box<dyn SessionApi>, connector: Box<dyn Connector>) -> Self {
        let polling = cfg.poll_state;
        Self {
            cfg,
            session,
            connector,
            state: ConnectionState::Idle,
            channel: None,
            outbound: VecDeque::new(),
            players: Vec::new(),
            level: None,
            polling,
            state_requested_at: None,
            stats: ConnStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_players(&self) -> &[LocalPlayer] {
        &self.players
    }

    pub fn level(&self) -> Option<&LevelDescriptor> {
        self.level.as_ref()
    }

    pub fn stats(&self) -> ConnStats {
        self.stats
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = ?self.state, to = ?next, "Connection state");
        self.state = next;
    }

    fn invalid_state(&self, expected: &'static str) -> ClientError {
        LogicError::InvalidState {
            expected,
            actual: format!("{:?}", self.state),
        }
        .into()
    }

    /// Runs the handshake. Only valid from `Idle`; any failure closes the manager.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.state != ConnectionState::Idle {
            return Err(self.invalid_state("Idle"));
        }
        match self.handshake().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, phase = ?self.state, "Handshake failed");
                self.transition(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), ClientError> {
        let participant = self.cfg.participant_id.clone();

        self.transition(ConnectionState::HandshakePhase1);
        let ack = self
            .session
            .start_session(&participant, self.cfg.player_count)
            .await?;
        info!(%participant, players = self.cfg.player_count, status = ack.status, "Session started");

        self.transition(ConnectionState::HandshakePhase2);
        let info = self.session.connection_info(&participant).await?;
        let players: Vec<LocalPlayer> = info
            .players
            .iter()
            .map(|(slot, conn)| LocalPlayer {
                id: conn.player_id.clone().unwrap_or_else(|| slot.clone()),
                identity_hash: conn.identity_hash.clone(),
                channel_address: conn.channel_address.clone(),
            })
            .collect();
        let first = players.first().cloned().ok_or(LogicError::NoPlayerSlot)?;
        if let Some(level) = &info.level {
            info!(level = %level.name, last = level.is_last_level, "Level descriptor received");
        }

        self.transition(ConnectionState::ChannelConnecting);
        let mut channel = self.connector.open(&first.channel_address).await?;
        info!(address = %first.channel_address, "Channel open");

        for player in &players {
            let ready = ChannelMessage::Ready {
                identity_hash: player.identity_hash.clone(),
            };
            send_message(channel.as_mut(), &ready).await?;
            self.stats.sent += 1;
        }
        let get_state = ChannelMessage::GetState {
            identity_hash: first.identity_hash.clone(),
        };
        send_message(channel.as_mut(), &get_state).await?;
        self.stats.sent += 1;
        self.state_requested_at = Some(Instant::now());

        self.channel = Some(channel);
        self.players = players;
        self.level = info.level;
        self.transition(ConnectionState::Ready);
        Ok(())
    }

    /// Queues an action and transmits it immediately. At most once: a failed
    /// send is not retried.
    pub async fn submit_action(&mut self, intent: ActionIntent) -> Result<(), ClientError> {
        if !self.state.is_open() {
            return Err(self.invalid_state("Ready or Receiving"));
        }
        let identity_hash = self
            .players
            .iter()
            .find(|p| p.id == intent.player)
            .map(|p| p.identity_hash.clone())
            .ok_or_else(|| LogicError::UnknownLocalPlayer(intent.player.clone()))?;

        self.outbound.push_back(ChannelMessage::Action {
            identity_hash: identity_hash.clone(),
            action: ActionMessage {
                player: intent.player,
                action_type: intent.action_type,
                action_data: intent.action_data,
                duration: intent.duration,
                identity_hash,
            },
        });
        self.flush().await
    }

    /// Sends a `get_state` for the first local player.
    pub async fn request_state(&mut self) -> Result<(), ClientError> {
        if !self.state.is_open() {
            return Err(self.invalid_state("Ready or Receiving"));
        }
        let Some(first) = self.players.first() else {
            return Err(LogicError::NoPlayerSlot.into());
        };
        self.outbound.push_back(ChannelMessage::GetState {
            identity_hash: first.identity_hash.clone(),
        });
        self.state_requested_at = Some(Instant::now());
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), ClientError> {
        while let Some(msg) = self.outbound.pop_front() {
            let Some(channel) = self.channel.as_mut() else {
                self.outbound.clear();
                return Err(TransportError::Closed.into());
            };
            match send_message(channel.as_mut(), &msg).await {
                Ok(()) => self.stats.sent += 1,
                Err(e) if e.is_transport() => {
                    self.fail(&e);
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Dropping unencodable message"),
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: &ClientError) {
        warn!(error = %err, "Channel failed, closing");
        self.channel = None;
        self.outbound.clear();
        self.transition(ConnectionState::Closed);
    }

    /// Stops sending `get_state` requests.
    pub fn stop_polling(&mut self) {
        self.polling = false;
        self.state_requested_at = None;
    }

    /// Pumps the channel once: waits up to `wait` for the first frame, then
    /// drains what is already buffered, at most [`MAX_FRAMES_PER_POLL`]
    /// frames. Returns snapshots in arrival order.
    pub async fn poll(&mut self, wait: Duration) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();
        if !self.state.is_open() {
            return snapshots;
        }
        let Some(channel) = self.channel.as_mut() else {
            return snapshots;
        };

        let mut timeout = wait;
        let mut failure = None;
        for _ in 0..MAX_FRAMES_PER_POLL {
            match channel.recv_timeout(timeout).await {
                Ok(Some(frame)) => match decode_from_bytes(&frame) {
                    Ok(Inbound::State(snap)) => snapshots.push(*snap),
                    Ok(Inbound::Other(tag)) => {
                        debug!(%tag, "Discarding message");
                        self.stats.discarded += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, bytes = frame.len(), "Dropping malformed message");
                        self.stats.discarded += 1;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
            timeout = Duration::ZERO;
        }

        if !snapshots.is_empty() {
            self.stats.states += snapshots.len() as u64;
            self.state_requested_at = None;
            if self.state == ConnectionState::Ready {
                self.transition(ConnectionState::Receiving);
            }
            trace!(count = snapshots.len(), "Snapshots received");
        }
        if let Some(e) = failure {
            self.fail(&e.into());
            return snapshots;
        }

        if self.polling && self.state_due() {
            if let Err(e) = self.request_state().await {
                debug!(error = %e, "State request failed");
            }
        }
        snapshots
    }

    /// Whether a new `get_state` should go out: none outstanding, or the
    /// outstanding one timed out.
    fn state_due(&self) -> bool {
        match self.state_requested_at {
            None => true,
            Some(at) => at.elapsed() >= Duration::from_millis(self.cfg.state_request_timeout_ms),
        }
    }

    /// Closes the channel. Already-issued handshake requests are not aborted.
    pub async fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "Channel close failed");
            }
        }
        self.outbound.clear();
        if self.state != ConnectionState::Closed {
            info!("Connection closed");
            self.transition(ConnectionState::Closed);
        }
    }
}
