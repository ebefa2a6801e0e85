//! Snapshot builders for tests.
//!
//! Available to this crate's tests and, through the `test-support` feature,
//! to the other workspace crates' tests.

use crate::{
    math::Vec2,
    protocol::{ContainerItem, CounterState, ItemState, PlainItem, PlayerState, Snapshot},
};

pub fn item(id: &str, kind: &str, progress: f32) -> ItemState {
    ItemState::Plain(PlainItem {
        id: id.into(),
        kind: kind.into(),
        progress,
        inverse_progress: false,
        active_effects: Vec::new(),
    })
}

pub fn container(id: &str, kind: &str, content: Vec<ItemState>, ready: Option<ItemState>) -> ItemState {
    ItemState::Container(ContainerItem {
        id: id.into(),
        kind: kind.into(),
        progress: 0.0,
        inverse_progress: false,
        active_effects: Vec::new(),
        content,
        ready: ready.map(Box::new),
    })
}

pub fn pot(id: &str, content: Vec<ItemState>, ready: Option<ItemState>) -> ItemState {
    container(id, "Pot", content, ready)
}

/// Counter at the origin facing +y.
pub fn counter(id: &str, kind: &str, occupants: Vec<ItemState>) -> CounterState {
    CounterState {
        id: id.into(),
        kind: kind.into(),
        position: Vec2::ZERO,
        orientation: Vec2::new(0.0, 1.0),
        occupants,
        active_effects: Vec::new(),
    }
}

/// Player facing +y with no nearest counter.
pub fn player(id: &str, x: f32, y: f32, holding: Option<ItemState>) -> PlayerState {
    PlayerState {
        id: id.into(),
        position: Vec2::new(x, y),
        facing_direction: Vec2::new(0.0, 1.0),
        holding,
        nearest_counter_id: None,
        nearest_counter_pos: None,
    }
}

pub fn snapshot(players: Vec<PlayerState>, counters: Vec<CounterState>) -> Snapshot {
    Snapshot {
        players,
        counters,
        ..Snapshot::default()
    }
}
