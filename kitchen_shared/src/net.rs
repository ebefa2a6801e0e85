//! Channel transports.
//!
//! Goals:
//! - One persistent bidirectional channel per session, carrying JSON envelopes.
//! - Receiving is cancel-safe so the frame loop can poll with a zero timeout.
//! - Transports are interchangeable behind [`Channel`] and [`Connector`].
//!
//! Addresses select the transport: `ws://` and `wss://` open a websocket,
//! `tcp://host:port` (or a bare `host:port`) opens length-prefixed frames over
//! TCP, the same framing the stub server in the integration tests speaks.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::{self, Instant},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::{
    error::{ClientError, TransportError},
    protocol::{encode_to_bytes, ChannelMessage},
};

/// Largest accepted frame.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// A persistent bidirectional message channel.
#[async_trait]
pub trait Channel: Send {
    /// Sends one encoded frame.
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the next inbound frame; `Ok(None)` when none
    /// arrived in time. A zero timeout only returns already-available data.
    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Encodes and sends one envelope.
pub async fn send_message(channel: &mut dyn Channel, msg: &ChannelMessage) -> Result<(), ClientError> {
    let frame = encode_to_bytes(msg)?;
    channel.send_frame(frame).await?;
    Ok(())
}

/// Opens channels by address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, address: &str) -> Result<Box<dyn Channel>, TransportError>;
}

#[async_trait]
impl<C: Connector + ?Sized> Connector for Arc<C> {
    async fn open(&self, address: &str) -> Result<Box<dyn Channel>, TransportError> {
        (**self).open(address).await
    }
}

/// Chooses a transport from the address scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn open(&self, address: &str) -> Result<Box<dyn Channel>, TransportError> {
        if address.starts_with("ws://") || address.starts_with("wss://") {
            return Ok(Box::new(WsChannel::connect(address).await?));
        }
        let host = address.strip_prefix("tcp://").unwrap_or(address);
        if host.is_empty() || host.contains('/') {
            return Err(TransportError::Refused(address.to_string()));
        }
        Ok(Box::new(FramedChannel::connect(host).await?))
    }
}

/// Length-prefixed (u32 big-endian) JSON frames over TCP.
#[derive(Debug)]
pub struct FramedChannel {
    stream: TcpStream,
    buf: BytesMut,
}

impl FramedChannel {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(%addr, "Framed channel connected");
        Ok(Self::new(stream))
    }

    /// Splits one complete frame off the read buffer.
    fn take_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }
        if self.buf.len() < 4 + len {
            self.buf.reserve(4 + len - self.buf.len());
            return Ok(None);
        }
        self.buf.advance(4);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

#[async_trait]
impl Channel for FramedChannel {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let mut out = BytesMut::with_capacity(4 + frame.len());
        out.put_u32(frame.len() as u32);
        out.extend_from_slice(&frame);
        self.stream.write_all(&out).await?;
        Ok(())
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }
            // `read_buf` is cancel-safe: a timed-out read loses no bytes.
            match time::timeout_at(deadline, self.stream.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) => return Err(TransportError::Closed),
                Ok(Ok(n)) => trace!(bytes = n, "Framed channel read"),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Websocket transport.
pub struct WsChannel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsChannel {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, response) = tokio_tungstenite::connect_async(url).await?;
        debug!(%url, status = %response.status(), "Websocket connected");
        Ok(Self { ws })
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(&frame).into_owned();
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            match time::timeout_at(deadline, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return Ok(Some(Bytes::from(text))),
                Ok(Some(Ok(Message::Binary(data)))) => return Ok(Some(Bytes::from(data))),
                Ok(Some(Ok(Message::Close(frame)))) => {
                    debug!(?frame, "Websocket closed by peer");
                    return Err(TransportError::Closed);
                }
                // Pings are answered by the stream itself.
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(None) => return Err(TransportError::Closed),
                Err(_) => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// In-process channel endpoint; see [`memory_pair`].
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

/// Two connected in-process endpoints, for headless runs and tests.
pub fn memory_pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel { tx: a_tx, rx: b_rx },
        MemoryChannel { tx: b_tx, rx: a_rx },
    )
}

impl MemoryChannel {
    /// Sends an envelope from this endpoint.
    pub fn push(&self, msg: &ChannelMessage) -> Result<(), ClientError> {
        let frame = encode_to_bytes(msg)?;
        self.tx.send(frame).map_err(|_| TransportError::Closed)?;
        Ok(())
    }

    /// Sends a raw frame from this endpoint.
    pub fn push_raw(&self, frame: impl Into<Bytes>) -> Result<(), TransportError> {
        self.tx.send(frame.into()).map_err(|_| TransportError::Closed)
    }

    /// Takes every frame already delivered to this endpoint.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            out.push(frame);
        }
        out
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        match time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.rx.close();
        Ok(())
    }
}

/// Hands out one prepared [`MemoryChannel`] and records requested addresses.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    channel: Mutex<Option<MemoryChannel>>,
    opened: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn new(channel: MemoryChannel) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Addresses passed to [`Connector::open`], in call order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, address: &str) -> Result<Box<dyn Channel>, TransportError> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(address.to_string());
        }
        let channel = self
            .channel
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| TransportError::Refused(address.to_string()))?;
        Ok(Box::new(channel))
    }
}

/// TCP listener accepting [`FramedChannel`] peers.
pub struct FramedListener {
    listener: TcpListener,
}

impl FramedListener {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> Result<FramedChannel, TransportError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "Framed channel accepted");
        Ok(FramedChannel::new(stream))
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::{decode_from_bytes, Inbound};

    #[tokio::test]
    async fn framed_roundtrip_over_tcp() {
        let listener = FramedListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut peer = listener.accept().await.unwrap();
            let frame = peer
                .recv_timeout(Duration::from_secs(2))
                .await
                .unwrap()
                .unwrap();
            peer.send_frame(Bytes::from_static(br#"{"type":"state","state":{}}"#))
                .await
                .unwrap();
            frame
        });

        let mut client = DefaultConnector
            .open(&format!("tcp://{addr}"))
            .await
            .unwrap();
        send_message(
            client.as_mut(),
            &ChannelMessage::GetState {
                identity_hash: "h".into(),
            },
        )
        .await
        .unwrap();

        let reply = client
            .recv_timeout(Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(decode_from_bytes(&reply).unwrap(), Inbound::State(_)));

        let got = server.await.unwrap();
        assert_eq!(&got[..], br#"{"type":"get_state","identityHash":"h"}"#);
    }

    #[tokio::test]
    async fn websocket_roundtrip_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let got = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("unexpected {other:?}"),
            };
            ws.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
            ws.send(Message::Text(r#"{"type":"state","state":{}}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Binary(br#"{"type":"pong"}"#.to_vec()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            got
        });

        let mut client = DefaultConnector
            .open(&format!("ws://{addr}"))
            .await
            .unwrap();
        // The server stays silent until it hears from us.
        assert!(client.recv_timeout(Duration::ZERO).await.unwrap().is_none());

        send_message(
            client.as_mut(),
            &ChannelMessage::GetState {
                identity_hash: "h".into(),
            },
        )
        .await
        .unwrap();

        let state = client
            .recv_timeout(Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(decode_from_bytes(&state).unwrap(), Inbound::State(_)));
        let other = client
            .recv_timeout(Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode_from_bytes(&other).unwrap(), Inbound::Other("pong".into()));

        assert!(matches!(
            client.recv_timeout(Duration::from_secs(2)).await,
            Err(TransportError::Closed)
        ));

        let got = server.await.unwrap();
        assert_eq!(got, r#"{"type":"get_state","identityHash":"h"}"#);
    }

    #[tokio::test]
    async fn zero_timeout_returns_none_when_idle() {
        let (mut a, _b) = memory_pair();
        assert!(a.recv_timeout(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_peer_reports_closed() {
        let (mut a, b) = memory_pair();
        drop(b);
        assert!(matches!(
            a.recv_timeout(Duration::from_millis(5)).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn memory_connector_hands_out_once() {
        let (a, _b) = memory_pair();
        let connector = MemoryConnector::new(a);
        assert!(connector.open("addr").await.is_ok());
        assert!(matches!(
            connector.open("addr").await,
            Err(TransportError::Refused(_))
        ));
        assert_eq!(connector.opened(), vec!["addr".to_string(), "addr".to_string()]);
    }

    #[tokio::test]
    async fn partial_frames_wait_for_more_bytes() {
        let listener = FramedListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut ch = FramedChannel::new(stream);

        ch.buf.put_u32(3);
        ch.buf.extend_from_slice(b"ab");
        assert!(ch.take_frame().unwrap().is_none());
        ch.buf.extend_from_slice(b"c");
        assert_eq!(&ch.take_frame().unwrap().unwrap()[..], b"abc");

        ch.buf.put_u32((MAX_FRAME_LEN + 1) as u32);
        assert!(matches!(ch.take_frame(), Err(TransportError::FrameTooLarge(_))));
    }
}
