//! Client context.
//!
//! [`KitchenClient`] ties the pieces together and is driven once per
//! rendering frame from a single task:
//! 1. submit queued input intents,
//! 2. pump the channel and apply every received snapshot in arrival order,
//! 3. advance interpolation and write transforms to the scene.
//!
//! Nothing here blocks on the network for longer than the poll wait passed to
//! [`KitchenClient::frame`].

use std::time::Duration;

use kitchen_shared::{config::ClientConfig, error::ClientError, scene::SceneBackend};
use tracing::{debug, info, warn};

use crate::{
    apply::{ApplyReport, StateApplier},
    connection::{ConnectionManager, ConnectionState},
    input::{intent_channel, IntentReceiver, IntentSender},
    interp::InterpolationScheduler,
};

/// What one frame did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub actions_sent: usize,
    pub snapshots: usize,
    /// Snapshots that ran the counter/item pass.
    pub reconciled: usize,
    pub registry_mutations: usize,
    pub transform_writes: usize,
}

/// Per-session client context.
pub struct KitchenClient<S: SceneBackend> {
    conn: ConnectionManager,
    applier: StateApplier,
    interp: InterpolationScheduler,
    scene: S,
    intents: IntentReceiver,
    frames: u64,
    last_apply: Option<ApplyReport>,
}

impl<S: SceneBackend> KitchenClient<S> {
    /// Builds the context and the sender half input sources push intents into.
    pub fn new(cfg: &ClientConfig, conn: ConnectionManager, scene: S) -> (Self, IntentSender) {
        let (tx, rx) = intent_channel();
        let client = Self {
            conn,
            applier: StateApplier::new(cfg.layout.clone()),
            interp: InterpolationScheduler::new(cfg.interpolation),
            scene,
            intents: rx,
            frames: 0,
            last_apply: None,
        };
        (client, tx)
    }

    /// Runs the handshake and marks the returned slots as locally controlled.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        self.conn.connect().await?;
        let ids: Vec<String> = self
            .conn
            .local_players()
            .iter()
            .map(|p| p.id.clone())
            .collect();
        info!(players = ?ids, "Client started");
        self.applier.set_local_players(ids, &mut self.interp);
        Ok(())
    }

    /// Advances one frame of `dt` seconds, waiting at most `wait` for inbound data.
    pub async fn frame(&mut self, dt: f32, wait: Duration) -> FrameReport {
        let mut report = FrameReport::default();
        self.frames += 1;

        for intent in self.intents.drain() {
            match self.conn.submit_action(intent).await {
                Ok(()) => report.actions_sent += 1,
                Err(e) => warn!(error = %e, "Action dropped"),
            }
        }

        let snapshots = self.conn.poll(wait).await;
        report.snapshots = snapshots.len();
        for snap in &snapshots {
            let applied = self.applier.apply(snap, &mut self.scene, &mut self.interp);
            if applied.reconciled {
                report.reconciled += 1;
            }
            report.registry_mutations += applied.registry_mutations();
            self.last_apply = Some(applied);
        }
        if self.applier.session_ended() {
            self.conn.stop_polling();
        }

        report.transform_writes = self.interp.tick(dt, &mut self.scene);
        if report.snapshots > 0 {
            debug!(frame = self.frames, ?report, "Frame");
        }
        report
    }

    /// Whether the frame loop should keep going.
    pub fn is_running(&self) -> bool {
        self.conn.state().is_open() && !self.applier.session_ended()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn applier(&self) -> &StateApplier {
        &self.applier
    }

    pub fn interpolation(&self) -> &InterpolationScheduler {
        &self.interp
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Report of the most recently applied snapshot.
    pub fn last_apply(&self) -> Option<&ApplyReport> {
        self.last_apply.as_ref()
    }

    /// Human-readable status lines for a console.
    pub fn status(&self) -> Vec<String> {
        let stats = self.conn.stats();
        let mut out = vec![
            format!("State: {:?}", self.conn.state()),
            format!("Frames: {}", self.frames),
            format!(
                "Messages: {} sent, {} states, {} discarded",
                stats.sent, stats.states, stats.discarded
            ),
            format!(
                "Entities: {} players, {} counters, {} items",
                self.applier.players().len(),
                self.applier.counters().len(),
                self.applier.items().len()
            ),
            format!("Reconciliation passes: {}", self.applier.passes()),
        ];
        if let Some(level) = self.conn.level() {
            out.push(format!("Level: {}", level.name));
        }
        for p in self.conn.local_players() {
            out.push(format!("Local player: {}", p.id));
        }
        if self.applier.session_ended() {
            out.push("Session ended".to_string());
        }
        out
    }

    /// Closes the channel.
    pub async fn shutdown(&mut self) {
        self.conn.close().await;
    }
}
