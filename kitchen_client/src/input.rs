//! Input handling.
//!
//! A device layer fills an [`InputState`] once per frame. [`InputSampler`]
//! turns it into action intents for one local player, and the intents reach
//! the client context through an explicit [`intent_channel`].

use kitchen_shared::{
    error::TransportError,
    math::Vec2,
    protocol::{ActionData, ActionType, InteractKey},
};
use tokio::sync::mpsc;

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub movement: Vec2,
    pub pick_up: bool,
    pub interact: bool,
}

/// One outbound action, before the identity hash is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionIntent {
    pub player: String,
    pub action_type: ActionType,
    pub action_data: ActionData,
    pub duration: f32,
}

impl ActionIntent {
    pub fn movement(player: &str, direction: Vec2, duration: f32) -> Self {
        Self {
            player: player.to_string(),
            action_type: ActionType::Movement,
            action_data: ActionData::Direction(direction.clamp_unit()),
            duration,
        }
    }

    pub fn pick_up_drop(player: &str) -> Self {
        Self {
            player: player.to_string(),
            action_type: ActionType::PickUpDrop,
            action_data: ActionData::None,
            duration: 0.0,
        }
    }

    pub fn interact(player: &str, key: InteractKey) -> Self {
        Self {
            player: player.to_string(),
            action_type: ActionType::Interact,
            action_data: ActionData::Key(key),
            duration: 0.0,
        }
    }
}

/// Edge-detecting sampler for one local player.
#[derive(Debug, Clone)]
pub struct InputSampler {
    player: String,
    prev: InputState,
}

impl InputSampler {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            prev: InputState::default(),
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    /// Intents for a frame of length `dt`: movement while the stick is
    /// deflected, pick-up on press, interact keydown/keyup on press/release.
    pub fn sample(&mut self, input: InputState, dt: f32) -> Vec<ActionIntent> {
        let mut out = Vec::new();
        if input.movement != Vec2::ZERO {
            out.push(ActionIntent::movement(&self.player, input.movement, dt));
        }
        if input.pick_up && !self.prev.pick_up {
            out.push(ActionIntent::pick_up_drop(&self.player));
        }
        match (self.prev.interact, input.interact) {
            (false, true) => out.push(ActionIntent::interact(&self.player, InteractKey::Keydown)),
            (true, false) => out.push(ActionIntent::interact(&self.player, InteractKey::Keyup)),
            _ => {}
        }
        self.prev = input;
        out
    }
}

/// Producer half of the intent channel.
#[derive(Debug, Clone)]
pub struct IntentSender {
    tx: mpsc::UnboundedSender<ActionIntent>,
}

impl IntentSender {
    pub fn send(&self, intent: ActionIntent) -> Result<(), TransportError> {
        self.tx.send(intent).map_err(|_| TransportError::Closed)
    }

    pub fn send_all(&self, intents: impl IntoIterator<Item = ActionIntent>) -> Result<(), TransportError> {
        intents.into_iter().try_for_each(|i| self.send(i))
    }
}

/// Consumer half, owned by the client context.
#[derive(Debug)]
pub struct IntentReceiver {
    rx: mpsc::UnboundedReceiver<ActionIntent>,
}

impl IntentReceiver {
    /// Everything queued since the last call, in send order.
    pub fn drain(&mut self) -> Vec<ActionIntent> {
        let mut out = Vec::new();
        while let Ok(intent) = self.rx.try_recv() {
            out.push(intent);
        }
        out
    }
}

pub fn intent_channel() -> (IntentSender, IntentReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IntentSender { tx }, IntentReceiver { rx })
}
