//! Wire protocol.
//!
//! Two surfaces:
//! - Handshake payloads returned by the session HTTP endpoints.
//! - Channel envelopes (`ready`, `get_state`, `action`, `state`) exchanged as
//!   JSON text over the persistent channel.
//!
//! Field names are camelCase; the server's snake_case spellings are accepted
//! as aliases on decode. Item-bearing fields are validated here into a closed
//! set of item variants selected by the `category` discriminator.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{error::DecodeError, math::Vec2};

fn default_true() -> bool {
    true
}

/// Decodes `null` the same as an absent field.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Counter occupants arrive as `null`, a single item, or a list of items.
fn occupants<'de, D>(d: D) -> Result<Vec<ItemState>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<ItemState>),
        One(Box<ItemState>),
    }

    Ok(match Option::<OneOrMany>::deserialize(d)? {
        None => Vec::new(),
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![*item],
    })
}

// ─── Handshake ───

/// Acknowledgment of a session start request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAck {
    pub status: u16,
    /// Response body, if the server sent JSON.
    pub body: Option<Value>,
}

/// Connection descriptor for one player slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConnection {
    #[serde(default, alias = "player_id")]
    pub player_id: Option<String>,
    #[serde(alias = "player_hash")]
    pub identity_hash: String,
    #[serde(alias = "websocket_url")]
    pub channel_address: String,
}

/// Level the session runs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "last_level")]
    pub is_last_level: bool,
    #[serde(default, alias = "recipe_graphs", deserialize_with = "null_as_default")]
    pub recipe_graphs: Vec<Value>,
    #[serde(default, alias = "number_players")]
    pub player_count: u32,
    #[serde(default, alias = "kitchen_size", deserialize_with = "null_as_default")]
    pub kitchen_size: Vec<f32>,
}

/// Response of the connection-info request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Player slot key → connection descriptor.
    #[serde(alias = "player_info")]
    pub players: BTreeMap<String, PlayerConnection>,
    #[serde(default, rename = "levelDescriptor", alias = "level_info")]
    pub level: Option<LevelDescriptor>,
}

// ─── Snapshot ───

/// Timed effect attached to a counter or item (e.g. fire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectState {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "progress_percentage", deserialize_with = "null_as_default")]
    pub progress: f32,
}

/// Item without contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "progress_percentage", deserialize_with = "null_as_default")]
    pub progress: f32,
    #[serde(default, alias = "inverse_progress")]
    pub inverse_progress: bool,
    #[serde(default, alias = "active_effects", deserialize_with = "null_as_default")]
    pub active_effects: Vec<EffectState>,
}

/// Cooking equipment or plate holding other items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "progress_percentage", deserialize_with = "null_as_default")]
    pub progress: f32,
    #[serde(default, alias = "inverse_progress")]
    pub inverse_progress: bool,
    #[serde(default, alias = "active_effects", deserialize_with = "null_as_default")]
    pub active_effects: Vec<EffectState>,
    #[serde(default, alias = "content_list", deserialize_with = "null_as_default")]
    pub content: Vec<ItemState>,
    /// Finished result shown in place of the contents.
    #[serde(default, alias = "content_ready")]
    pub ready: Option<Box<ItemState>>,
}

/// An item, selected by its `category` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category")]
pub enum ItemState {
    #[serde(rename = "Item")]
    Plain(PlainItem),
    #[serde(rename = "ItemCookingEquipment")]
    Container(ContainerItem),
}

impl ItemState {
    pub fn id(&self) -> &str {
        match self {
            ItemState::Plain(i) => &i.id,
            ItemState::Container(c) => &c.id,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ItemState::Plain(i) => &i.kind,
            ItemState::Container(c) => &c.kind,
        }
    }

    pub fn progress(&self) -> f32 {
        match self {
            ItemState::Plain(i) => i.progress,
            ItemState::Container(c) => c.progress,
        }
    }

    pub fn inverse_progress(&self) -> bool {
        match self {
            ItemState::Plain(i) => i.inverse_progress,
            ItemState::Container(c) => c.inverse_progress,
        }
    }

    /// Whether a progress indicator should be shown (strictly between 0 and 100).
    pub fn in_progress(&self) -> bool {
        let p = self.progress();
        p > 0.0 && p < 100.0
    }

    pub fn contents(&self) -> &[ItemState] {
        match self {
            ItemState::Plain(_) => &[],
            ItemState::Container(c) => &c.content,
        }
    }

    pub fn ready(&self) -> Option<&ItemState> {
        match self {
            ItemState::Plain(_) => None,
            ItemState::Container(c) => c.ready.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: String,
    #[serde(alias = "pos")]
    pub position: Vec2,
    #[serde(default, alias = "facing_direction")]
    pub facing_direction: Vec2,
    #[serde(default)]
    pub holding: Option<ItemState>,
    #[serde(default, alias = "current_nearest_counter_id")]
    pub nearest_counter_id: Option<String>,
    #[serde(default, alias = "current_nearest_counter_pos")]
    pub nearest_counter_pos: Option<Vec2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterState {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(alias = "pos")]
    pub position: Vec2,
    #[serde(default)]
    pub orientation: Vec2,
    #[serde(default, alias = "occupied_by", deserialize_with = "occupants")]
    pub occupants: Vec<ItemState>,
    #[serde(default, alias = "active_effects", deserialize_with = "null_as_default")]
    pub active_effects: Vec<EffectState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    pub id: String,
    pub meal: String,
    /// Seconds since session start.
    #[serde(default, alias = "start_time")]
    pub start_time: f64,
    #[serde(default, alias = "max_duration")]
    pub max_duration: f64,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KitchenSize {
    pub width: f32,
    pub height: f32,
}

/// View cone limiting what a player can see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRestriction {
    pub direction: Vec2,
    pub position: Vec2,
    pub angle: f32,
    #[serde(default)]
    pub range: Option<f32>,
}

/// One server-pushed instant of world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<PlayerState>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub counters: Vec<CounterState>,
    #[serde(default)]
    pub kitchen: KitchenSize,
    #[serde(default)]
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub orders: Vec<OrderState>,
    #[serde(default)]
    pub ended: bool,
    #[serde(default, alias = "remaining_time")]
    pub remaining_time: f64,
    #[serde(default, alias = "view_restrictions")]
    pub view_restrictions: Option<Vec<ViewRestriction>>,
    /// `[player, meal]` pairs.
    #[serde(default, alias = "served_meals", deserialize_with = "null_as_default")]
    pub served_meals: Vec<Vec<String>>,
    /// `[player, text]` pairs.
    #[serde(
        default,
        alias = "info_msg",
        alias = "info_messages",
        deserialize_with = "null_as_default"
    )]
    pub info_messages: Vec<Vec<String>>,
    #[serde(default = "default_true", alias = "all_players_ready")]
    pub all_players_ready: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            players: Vec::new(),
            counters: Vec::new(),
            kitchen: KitchenSize::default(),
            score: 0.0,
            orders: Vec::new(),
            ended: false,
            remaining_time: 0.0,
            view_restrictions: None,
            served_meals: Vec::new(),
            info_messages: Vec::new(),
            all_players_ready: true,
        }
    }
}

// ─── Channel envelope ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Movement,
    PickUpDrop,
    Interact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractKey {
    Keydown,
    Keyup,
}

/// Payload of an action: a movement direction, an interact key edge, or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionData {
    Direction(Vec2),
    Key(InteractKey),
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    pub player: String,
    #[serde(alias = "action_type")]
    pub action_type: ActionType,
    #[serde(default, alias = "action_data")]
    pub action_data: ActionData,
    pub duration: f32,
    #[serde(alias = "player_hash")]
    pub identity_hash: String,
}

/// Channel message envelope, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    Ready {
        #[serde(rename = "identityHash", alias = "player_hash")]
        identity_hash: String,
    },
    GetState {
        #[serde(rename = "identityHash", alias = "player_hash")]
        identity_hash: String,
    },
    Action {
        #[serde(rename = "identityHash", alias = "player_hash")]
        identity_hash: String,
        action: ActionMessage,
    },
    State {
        #[serde(
            default,
            rename = "identityHash",
            alias = "player_hash",
            skip_serializing_if = "Option::is_none"
        )]
        identity_hash: Option<String>,
        state: Box<Snapshot>,
    },
}

/// What the client does with an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    State(Box<Snapshot>),
    /// Any other tag; logged and discarded by the receiver.
    Other(String),
}

pub fn encode_to_bytes(msg: &ChannelMessage) -> Result<Bytes, DecodeError> {
    Ok(Bytes::from(serde_json::to_vec(msg)?))
}

/// Decodes an inbound frame. Only `state` payloads are decoded in full.
pub fn decode_from_bytes(b: &[u8]) -> Result<Inbound, DecodeError> {
    let mut value: Value = serde_json::from_slice(b)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingTag)?
        .to_owned();
    if tag != "state" {
        return Ok(Inbound::Other(tag));
    }
    let state = value
        .get_mut("state")
        .map(Value::take)
        .unwrap_or(Value::Null);
    Ok(Inbound::State(Box::new(serde_json::from_value(state)?)))
}
