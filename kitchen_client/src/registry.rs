//! Client-side entity registries.
//!
//! Each registry maps a server entity id to the visual handle spawned for it,
//! plus what reconciliation needs to remember about that entity. Entries are
//! created lazily on first sighting and live for the session only.

use std::collections::HashMap;

use kitchen_shared::{
    math::Vec3,
    scene::{Container, Handle},
};

use crate::interp::Control;

/// Entry that owns a visual.
pub trait Visual {
    fn handle(&self) -> Handle;
}

/// Id-keyed storage of registry entries.
#[derive(Debug)]
pub struct Registry<E> {
    entries: HashMap<String, E>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E> Registry<E> {
    pub fn get(&self, id: &str) -> Option<&E> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut E> {
        self.entries.get_mut(id)
    }

    /// Inserts/replaces the entry for `id`.
    pub fn insert(&mut self, id: &str, entry: E) -> Option<E> {
        self.entries.insert(id.to_string(), entry)
    }

    pub fn remove(&mut self, id: &str) -> Option<E> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &E)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Removes and returns every entry whose id fails `keep`.
    pub fn drain_where(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<(String, E)> {
        let gone: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !keep(id))
            .cloned()
            .collect();
        gone.into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|e| (id, e)))
            .collect()
    }
}

impl<E: Visual> Registry<E> {
    pub fn handle(&self, id: &str) -> Option<Handle> {
        self.entries.get(id).map(Visual::handle)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntry {
    pub handle: Handle,
    pub control: Control,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CounterEntry {
    pub handle: Handle,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemEntry {
    pub handle: Handle,
    /// Type the visual was built for.
    pub kind: String,
    /// Current parent; `None` until first placed.
    pub container: Option<Container>,
    pub offset: Vec3,
    pub active: bool,
}

impl ItemEntry {
    pub fn new(handle: Handle, kind: &str) -> Self {
        Self {
            handle,
            kind: kind.to_string(),
            container: None,
            offset: Vec3::ZERO,
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEntry {
    pub handle: Handle,
    /// Item visual the indicator floats above.
    pub owner: Handle,
}

impl Visual for PlayerEntry {
    fn handle(&self) -> Handle {
        self.handle
    }
}

impl Visual for CounterEntry {
    fn handle(&self) -> Handle {
        self.handle
    }
}

impl Visual for ItemEntry {
    fn handle(&self) -> Handle {
        self.handle
    }
}

impl Visual for ProgressEntry {
    fn handle(&self) -> Handle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_drain() {
        let mut reg: Registry<ItemEntry> = Registry::default();
        reg.insert("a", ItemEntry::new(Handle(1), "Tomato"));
        reg.insert("b", ItemEntry::new(Handle(2), "Onion"));
        assert_eq!(reg.handle("a"), Some(Handle(1)));
        assert_eq!(reg.get("b").unwrap().kind, "Onion");

        let gone = reg.drain_where(|id| id == "a");
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].0, "b");
        assert!(reg.contains("a"));
        assert_eq!(reg.len(), 1);
    }
}
