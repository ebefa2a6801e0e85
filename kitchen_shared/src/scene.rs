//! Scene abstraction.
//!
//! This crate intentionally does not depend on a rendering backend.
//! The client drives visuals only through [`SceneBackend`]; an engine
//! integration implements it over its scene graph.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::{
    error::AssetError,
    math::{Quat, Vec3},
};

/// Opaque reference to a spawned visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

/// What to spawn. Counter, item, and order variants carry the server type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpawnKind {
    Floor,
    Player,
    Counter(String),
    Item(String),
    Progress,
    Order(String),
}

impl SpawnKind {
    /// Name the asset lookup is keyed by.
    pub fn asset_name(&self) -> &str {
        match self {
            SpawnKind::Floor => "Floor",
            SpawnKind::Player => "Player",
            SpawnKind::Progress => "Progress",
            SpawnKind::Counter(kind) | SpawnKind::Item(kind) | SpawnKind::Order(kind) => kind,
        }
    }
}

/// Where a visual hangs in the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Root,
    /// The holding spot of a player visual.
    HoldingSpot(Handle),
    Counter(Handle),
    /// Inside a container item, or above an item for progress indicators.
    Item(Handle),
}

/// Text fields of the heads-up display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HudSlot {
    Score,
    Time,
    Info,
    Status,
}

/// Scene collaborator contract.
pub trait SceneBackend {
    fn spawn(&mut self, kind: &SpawnKind, id: &str) -> Result<Handle, AssetError>;
    fn destroy(&mut self, handle: Handle);
    fn set_parent(&mut self, handle: Handle, container: Container);
    fn set_local_transform(&mut self, handle: Handle, position: Vec3, rotation: Quat);
    fn set_active(&mut self, handle: Handle, active: bool);

    fn set_progress(&mut self, _handle: Handle, _fraction: f32, _inverse: bool) {}
    fn set_highlight(&mut self, _handle: Handle, _on: bool) {}
    fn set_text(&mut self, _slot: HudSlot, _text: &str) {}
}

/// State of one visual in a [`HeadlessScene`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: SpawnKind,
    pub id: String,
    pub parent: Container,
    pub position: Vec3,
    pub rotation: Quat,
    pub active: bool,
    pub progress: Option<f32>,
    pub highlighted: bool,
}

/// Call counters of a [`HeadlessScene`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SceneStats {
    pub spawned: u64,
    pub destroyed: u64,
    pub reparented: u64,
    pub moved: u64,
    pub toggled: u64,
}

/// Scene without a renderer: tracks every node, useful for headless runs and tests.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    next: u64,
    nodes: HashMap<Handle, Node>,
    missing: HashSet<String>,
    texts: HashMap<HudSlot, String>,
    stats: SceneStats,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes spawning `asset` fail with an [`AssetError`].
    pub fn without_asset(mut self, asset: &str) -> Self {
        self.missing.insert(asset.to_string());
        self
    }

    pub fn node(&self, handle: Handle) -> Option<&Node> {
        self.nodes.get(&handle)
    }

    /// Live handles spawned for entity `id`, ordered by creation.
    pub fn handles_for(&self, id: &str) -> Vec<Handle> {
        let mut out: Vec<Handle> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.id == id)
            .map(|(h, _)| *h)
            .collect();
        out.sort();
        out
    }

    /// Live nodes matching a predicate.
    pub fn count_where(&self, pred: impl Fn(&Node) -> bool) -> usize {
        self.nodes.values().filter(|n| pred(n)).count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn text(&self, slot: HudSlot) -> Option<&str> {
        self.texts.get(&slot).map(String::as_str)
    }

    pub fn stats(&self) -> SceneStats {
        self.stats
    }
}

impl SceneBackend for HeadlessScene {
    fn spawn(&mut self, kind: &SpawnKind, id: &str) -> Result<Handle, AssetError> {
        if self.missing.contains(kind.asset_name()) {
            return Err(AssetError {
                kind: kind.asset_name().to_string(),
                id: id.to_string(),
            });
        }
        self.next += 1;
        let handle = Handle(self.next);
        self.nodes.insert(
            handle,
            Node {
                kind: kind.clone(),
                id: id.to_string(),
                parent: Container::Root,
                position: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                active: true,
                progress: None,
                highlighted: false,
            },
        );
        self.stats.spawned += 1;
        trace!(?handle, ?kind, %id, "spawn");
        Ok(handle)
    }

    fn destroy(&mut self, handle: Handle) {
        if self.nodes.remove(&handle).is_some() {
            self.stats.destroyed += 1;
            trace!(?handle, "destroy");
        }
    }

    fn set_parent(&mut self, handle: Handle, container: Container) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.parent = container;
            self.stats.reparented += 1;
        }
    }

    fn set_local_transform(&mut self, handle: Handle, position: Vec3, rotation: Quat) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.position = position;
            node.rotation = rotation;
            self.stats.moved += 1;
        }
    }

    fn set_active(&mut self, handle: Handle, active: bool) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.active = active;
            self.stats.toggled += 1;
        }
    }

    fn set_progress(&mut self, handle: Handle, fraction: f32, _inverse: bool) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.progress = Some(fraction);
        }
    }

    fn set_highlight(&mut self, handle: Handle, on: bool) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.highlighted = on;
        }
    }

    fn set_text(&mut self, slot: HudSlot, text: &str) {
        self.texts.insert(slot, text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_scene_tracks_nodes() {
        let mut scene = HeadlessScene::new();
        let counter = scene.spawn(&SpawnKind::Counter("Stove".into()), "c1").unwrap();
        let item = scene.spawn(&SpawnKind::Item("Pot".into()), "pot").unwrap();
        scene.set_parent(item, Container::Counter(counter));
        scene.set_active(item, false);

        let node = scene.node(item).unwrap();
        assert_eq!(node.parent, Container::Counter(counter));
        assert!(!node.active);
        assert_eq!(scene.handles_for("pot"), vec![item]);

        scene.destroy(item);
        scene.destroy(item);
        assert_eq!(scene.stats().destroyed, 1);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn missing_asset_fails_spawn() {
        let mut scene = HeadlessScene::new().without_asset("Onion");
        let err = scene.spawn(&SpawnKind::Item("Onion".into()), "o1").unwrap_err();
        assert_eq!(err.kind, "Onion");
        assert!(scene.is_empty());
    }
}
