//! Change detection.
//!
//! Counter and item reconciliation is skipped when nothing it reads has
//! changed. The fingerprint is a structural hash over, in snapshot order:
//! each counter's id and occupants, and each player's held item. Per item it
//! covers id, type, progress, and nested contents. Occupant order is part of
//! the hash since stacking depends on it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use kitchen_shared::protocol::{ItemState, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn of(snap: &Snapshot) -> Self {
        let mut h = DefaultHasher::new();
        snap.counters.len().hash(&mut h);
        for counter in &snap.counters {
            counter.id.hash(&mut h);
            counter.occupants.len().hash(&mut h);
            for item in &counter.occupants {
                hash_item(item, &mut h);
            }
        }
        snap.players.len().hash(&mut h);
        for player in &snap.players {
            player.id.hash(&mut h);
            match &player.holding {
                Some(item) => {
                    1u8.hash(&mut h);
                    hash_item(item, &mut h);
                }
                None => 0u8.hash(&mut h),
            }
        }
        Self(h.finish())
    }
}

fn hash_item(item: &ItemState, h: &mut DefaultHasher) {
    item.id().hash(h);
    item.kind().hash(h);
    item.progress().to_bits().hash(h);
    item.inverse_progress().hash(h);
    item.contents().len().hash(h);
    for inner in item.contents() {
        hash_item(inner, h);
    }
    match item.ready() {
        Some(ready) => {
            1u8.hash(h);
            hash_item(ready, h);
        }
        None => 0u8.hash(h),
    }
}

/// Remembers the fingerprint of the last reconciled snapshot.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the snapshot's fingerprint; returns whether it differs from
    /// the previous one.
    pub fn changed(&mut self, snap: &Snapshot) -> bool {
        let fp = Fingerprint::of(snap);
        if self.last == Some(fp) {
            return false;
        }
        self.last = Some(fp);
        true
    }

    pub fn last(&self) -> Option<Fingerprint> {
        self.last
    }

    /// Forces the next snapshot through a full pass.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kitchen_shared::{
        math::Vec2,
        protocol::CounterState,
        testing::{counter as counter_of, item, player, pot, snapshot},
    };

    fn counter(id: &str, occupants: Vec<ItemState>) -> CounterState {
        counter_of(id, "Counter", occupants)
    }

    fn snap(counters: Vec<CounterState>) -> Snapshot {
        snapshot(Vec::new(), counters)
    }

    #[test]
    fn identical_snapshots_are_unchanged() {
        let s = snap(vec![counter("c1", vec![item("i1", "Tomato", 0.0)])]);
        let mut det = ChangeDetector::new();
        assert!(det.changed(&s));
        assert!(!det.changed(&s.clone()));
        det.reset();
        assert!(det.changed(&s));
    }

    #[test]
    fn type_progress_and_order_are_observed() {
        let base = snap(vec![counter(
            "c1",
            vec![item("a", "Plate", 0.0), item("b", "Plate", 0.0)],
        )]);
        let fp = Fingerprint::of(&base);

        let retyped = snap(vec![counter(
            "c1",
            vec![item("a", "DirtyPlate", 0.0), item("b", "Plate", 0.0)],
        )]);
        let progressed = snap(vec![counter(
            "c1",
            vec![item("a", "Plate", 10.0), item("b", "Plate", 0.0)],
        )]);
        let reordered = snap(vec![counter(
            "c1",
            vec![item("b", "Plate", 0.0), item("a", "Plate", 0.0)],
        )]);
        for other in [retyped, progressed, reordered] {
            assert_ne!(fp, Fingerprint::of(&other));
        }
    }

    #[test]
    fn nested_contents_and_held_items_are_observed() {
        let empty = snap(vec![counter("stove", vec![pot("pot", Vec::new(), None)])]);
        let filled = snap(vec![counter(
            "stove",
            vec![pot("pot", vec![item("t", "ChoppedTomato", 0.0)], None)],
        )]);
        assert_ne!(Fingerprint::of(&empty), Fingerprint::of(&filled));

        let mut holding = empty.clone();
        holding
            .players
            .push(player("0", 0.0, 0.0, Some(item("p", "Plate", 0.0))));
        assert_ne!(Fingerprint::of(&empty), Fingerprint::of(&holding));

        // Movement alone does not count.
        let mut moved = holding.clone();
        moved.players[0].position = Vec2::new(3.0, 1.0);
        assert_eq!(Fingerprint::of(&holding), Fingerprint::of(&moved));
    }
}
