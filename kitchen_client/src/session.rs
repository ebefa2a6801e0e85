//! Handshake requests.
//!
//! The first two handshake phases are plain HTTP requests against the study
//! server. [`SessionApi`] hides them so the connection manager can be driven
//! by a scripted implementation in tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use kitchen_shared::{
    error::{ClientError, DecodeError, TransportError},
    protocol::{ConnectionInfo, SessionAck},
};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// Phase 1 and 2 of the handshake.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Asks the server to start a session for `participant`.
    async fn start_session(
        &self,
        participant: &str,
        player_count: u32,
    ) -> Result<SessionAck, ClientError>;

    /// Fetches per-slot channel descriptors and the level descriptor.
    async fn connection_info(&self, participant: &str) -> Result<ConnectionInfo, ClientError>;
}

/// [`SessionApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    base: String,
    http: Client,
}

impl HttpSessionApi {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http {
                url: server_url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base: server_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// POSTs to `url` and returns status and body of a successful response.
    async fn post(&self, url: String) -> Result<(u16, Vec<u8>), TransportError> {
        debug!(%url, "POST");
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| TransportError::Http {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(|e| TransportError::Http {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok((status.as_u16(), body.to_vec()))
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn start_session(
        &self,
        participant: &str,
        player_count: u32,
    ) -> Result<SessionAck, ClientError> {
        let url = format!("{}/start_study/{participant}/{player_count}", self.base);
        let (status, body) = self.post(url).await?;
        Ok(SessionAck {
            status,
            body: serde_json::from_slice::<Value>(&body).ok(),
        })
    }

    async fn connection_info(&self, participant: &str) -> Result<ConnectionInfo, ClientError> {
        let url = format!("{}/get_game_connection/{participant}", self.base);
        let (_, body) = self.post(url).await?;
        let info = serde_json::from_slice(&body).map_err(DecodeError::from)?;
        Ok(info)
    }
}

/// A request [`StaticSession`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Start { participant: String, player_count: u32 },
    ConnectionInfo { participant: String },
}

/// Answers every request with a prepared [`ConnectionInfo`]; records calls.
#[derive(Debug, Clone)]
pub struct StaticSession {
    info: ConnectionInfo,
    refuse_start: bool,
    calls: Arc<Mutex<Vec<SessionCall>>>,
}

impl StaticSession {
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            refuse_start: false,
            calls: Arc::default(),
        }
    }

    /// Fails phase 1 with a 503.
    pub fn refusing(mut self) -> Self {
        self.refuse_start = true;
        self
    }

    /// Shared log of received calls.
    pub fn calls(&self) -> Arc<Mutex<Vec<SessionCall>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: SessionCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl SessionApi for StaticSession {
    async fn start_session(
        &self,
        participant: &str,
        player_count: u32,
    ) -> Result<SessionAck, ClientError> {
        self.record(SessionCall::Start {
            participant: participant.to_string(),
            player_count,
        });
        if self.refuse_start {
            return Err(TransportError::Status {
                url: format!("start_study/{participant}/{player_count}"),
                status: 503,
            }
            .into());
        }
        Ok(SessionAck {
            status: 200,
            body: None,
        })
    }

    async fn connection_info(&self, participant: &str) -> Result<ConnectionInfo, ClientError> {
        self.record(SessionCall::ConnectionInfo {
            participant: participant.to_string(),
        });
        Ok(self.info.clone())
    }
}
