//! Integration test support.
//!
//! [`StubGameServer`] plays the game-server side of the channel over framed
//! TCP: it accepts one client, records every envelope it receives, and answers
//! `get_state` requests with scripted snapshots. [`fixtures`] holds a short
//! kitchen scenario exercising type changes, progress, holding, and nesting.

use std::{collections::BTreeMap, time::Duration};

use anyhow::{bail, Context};
use kitchen_shared::{
    net::{Channel, FramedChannel, FramedListener},
    prelude::*,
};
use tracing::debug;

/// Identity hash handed to the single player slot.
pub const PLAYER_HASH: &str = "h1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

pub struct StubGameServer {
    listener: FramedListener,
    peer: Option<FramedChannel>,
    /// Every envelope received from the client, in order.
    pub received: Vec<ChannelMessage>,
    pub states_sent: usize,
}

/// Binds a stub server on an ephemeral port and returns the connection info
/// a session server would hand out for it.
pub async fn bind_ephemeral() -> anyhow::Result<(StubGameServer, ConnectionInfo)> {
    let listener = FramedListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut players = BTreeMap::new();
    players.insert(
        "0".to_string(),
        PlayerConnection {
            player_id: None,
            identity_hash: PLAYER_HASH.to_string(),
            channel_address: format!("tcp://{addr}"),
        },
    );
    let info = ConnectionInfo {
        players,
        level: Some(LevelDescriptor {
            name: "level1".to_string(),
            player_count: 1,
            kitchen_size: vec![8.0, 6.0],
            ..LevelDescriptor::default()
        }),
    };

    let server = StubGameServer {
        listener,
        peer: None,
        received: Vec::new(),
        states_sent: 0,
    };
    Ok((server, info))
}

impl StubGameServer {
    pub async fn accept_one(&mut self) -> anyhow::Result<()> {
        let peer = tokio::time::timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .context("accept timed out")??;
        self.peer = Some(peer);
        Ok(())
    }

    /// Waits up to `wait` for one client envelope and records it.
    pub async fn pump(&mut self, wait: Duration) -> anyhow::Result<Option<ChannelMessage>> {
        let peer = self.peer.as_mut().context("no client accepted")?;
        let Some(frame) = peer.recv_timeout(wait).await? else {
            return Ok(None);
        };
        let msg: ChannelMessage = serde_json::from_slice(&frame).context("decode client envelope")?;
        debug!(?msg, "Stub server received");
        self.received.push(msg.clone());
        Ok(Some(msg))
    }

    /// Pumps until a message matching `pred` arrives.
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        pred: impl Fn(&ChannelMessage) -> bool,
    ) -> anyhow::Result<ChannelMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if left.is_zero() {
                bail!("timed out waiting for client message");
            }
            if let Some(msg) = self.pump(left).await? {
                if pred(&msg) {
                    return Ok(msg);
                }
            }
        }
    }

    pub async fn send_state(&mut self, snap: &Snapshot) -> anyhow::Result<()> {
        let peer = self.peer.as_mut().context("no client accepted")?;
        let frame = encode_to_bytes(&ChannelMessage::State {
            identity_hash: Some(PLAYER_HASH.to_string()),
            state: Box::new(snap.clone()),
        })?;
        peer.send_frame(frame).await?;
        self.states_sent += 1;
        Ok(())
    }

    /// Answers one `get_state` per snapshot, in order.
    pub async fn serve(&mut self, states: &[Snapshot]) -> anyhow::Result<()> {
        for snap in states {
            self.wait_for(Duration::from_secs(5), |m| matches!(m, ChannelMessage::GetState { .. }))
                .await?;
            self.send_state(snap).await?;
        }
        Ok(())
    }

    /// Drops the client connection.
    pub fn disconnect(&mut self) {
        self.peer = None;
    }
}

pub mod fixtures {
    //! A tomato goes from the cutting board into the pot.

    use kitchen_shared::{
        prelude::*,
        testing::{counter, item, player, pot, snapshot},
    };

    fn cook(x: f32, holding: Option<ItemState>) -> PlayerState {
        let mut p = player("0", x, 1.0, holding);
        p.nearest_counter_id = Some("board".into());
        p.nearest_counter_pos = Some(Vec2::new(1.0, 2.0));
        p
    }

    fn station(id: &str, kind: &str, x: f32, occupants: Vec<ItemState>) -> CounterState {
        let mut c = counter(id, kind, occupants);
        c.position = Vec2::new(x, 2.0);
        c.orientation = Vec2::new(0.0, -1.0);
        c
    }

    fn base(cook: PlayerState, board: Vec<ItemState>, stove: Vec<ItemState>) -> Snapshot {
        let mut snap = snapshot(
            vec![cook],
            vec![
                station("board", "CuttingBoard", 1.0, board),
                station("stove", "Stove", 3.0, stove),
            ],
        );
        snap.kitchen = KitchenSize {
            width: 8.0,
            height: 6.0,
        };
        snap.remaining_time = 120.0;
        snap
    }

    fn empty_pot() -> ItemState {
        pot("pot", Vec::new(), None)
    }

    /// Raw, half chopped, chopped, carried, in the pot (session ends).
    pub fn tomato_scenario() -> Vec<Snapshot> {
        let raw = base(cook(1.0, None), vec![item("t1", "Tomato", 0.0)], vec![empty_pot()]);
        let chopping = base(cook(1.0, None), vec![item("t1", "Tomato", 50.0)], vec![empty_pot()]);
        let chopped = base(cook(1.0, None), vec![item("t1", "ChoppedTomato", 0.0)], vec![empty_pot()]);
        let carried = base(
            cook(2.0, Some(item("t1", "ChoppedTomato", 0.0))),
            vec![],
            vec![empty_pot()],
        );
        let mut cooked = base(
            cook(3.0, None),
            vec![],
            vec![pot("pot", vec![item("t1", "ChoppedTomato", 0.0)], None)],
        );
        cooked.score = 20.0;
        cooked.ended = true;
        cooked.remaining_time = 0.0;
        vec![raw, chopping, chopped, carried, cooked]
    }
}
