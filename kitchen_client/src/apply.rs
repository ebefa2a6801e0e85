//! Snapshot application.
//!
//! Turns each snapshot into the smallest set of scene mutations that makes
//! the local registries match it:
//! - players: created on first sight, then only their interpolation target moves,
//! - counters and items: one full pass whenever the [`Fingerprint`] changes,
//! - progress indicators: present exactly for items with `0 < progress < 100`,
//! - orders: replaced wholesale every snapshot,
//! - HUD text: rewritten per field only when its value changed.
//!
//! Nothing escapes [`StateApplier::apply`] as an error. Missing visuals and
//! dangling container references skip the entity and are counted in the
//! returned [`ApplyReport`].
//!
//! [`Fingerprint`]: crate::fingerprint::Fingerprint

use std::collections::{BTreeSet, HashMap, HashSet};

use kitchen_shared::{
    config::LayoutConfig,
    error::{ClientError, LogicError},
    math::{Quat, Vec3},
    protocol::{ItemState, KitchenSize, Snapshot, ViewRestriction},
    scene::{Container, Handle, HudSlot, SceneBackend, SpawnKind},
};
use tracing::{debug, info, trace, warn};

use crate::{
    fingerprint::ChangeDetector,
    interp::{Control, InterpolationScheduler},
    registry::{CounterEntry, ItemEntry, PlayerEntry, ProgressEntry, Registry},
};

/// What one [`StateApplier::apply`] call changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    /// Whether the counter/item pass ran (fingerprint changed).
    pub reconciled: bool,
    pub players_created: usize,
    pub counters_created: usize,
    pub items_created: usize,
    /// Items whose type changed: old visual destroyed, new one created.
    pub items_replaced: usize,
    pub items_hidden: usize,
    pub items_reactivated: usize,
    pub items_reparented: usize,
    /// Same container, new local offset (stack height changed).
    pub items_moved: usize,
    pub progress_created: usize,
    pub progress_destroyed: usize,
    pub orders: usize,
    /// Entities skipped because no visual exists for their type.
    pub missing_assets: usize,
    /// Entities skipped because their container is unknown.
    pub unresolved: usize,
}

impl ApplyReport {
    /// Total registry mutations (orders and HUD excluded).
    pub fn registry_mutations(&self) -> usize {
        self.players_created
            + self.counters_created
            + self.items_created
            + self.items_replaced
            + self.items_hidden
            + self.items_reactivated
            + self.items_reparented
            + self.items_moved
            + self.progress_created
            + self.progress_destroyed
    }
}

/// Who currently holds an item.
#[derive(Debug, Clone, Copy)]
enum Holder<'a> {
    Player(&'a str),
    Counter(&'a str),
    Item(&'a str),
}

/// An item and where it belongs, in parent-before-child order.
#[derive(Debug)]
struct Placement<'a> {
    item: &'a ItemState,
    holder: Holder<'a>,
    offset: Vec3,
}

fn collect_placements<'a>(snap: &'a Snapshot, layout: &LayoutConfig) -> Vec<Placement<'a>> {
    let mut out = Vec::new();
    for player in &snap.players {
        if let Some(item) = &player.holding {
            push_with_contents(
                &mut out,
                item,
                Holder::Player(&player.id),
                layout.holding_offset,
                layout,
            );
        }
    }
    for counter in &snap.counters {
        let mut same_kind: HashMap<&str, usize> = HashMap::new();
        for item in &counter.occupants {
            let mut offset = Vec3::new(0.0, layout.counter_item_height, 0.0);
            if let Some(step) = layout.stack_step(item.kind(), &counter.kind) {
                let below = same_kind.entry(item.kind()).or_insert(0);
                offset.y += step * *below as f32;
                *below += 1;
            }
            push_with_contents(&mut out, item, Holder::Counter(&counter.id), offset, layout);
        }
    }
    out
}

fn push_with_contents<'a>(
    out: &mut Vec<Placement<'a>>,
    item: &'a ItemState,
    holder: Holder<'a>,
    offset: Vec3,
    layout: &LayoutConfig,
) {
    out.push(Placement {
        item,
        holder,
        offset,
    });
    let parent = Holder::Item(item.id());
    // A finished result replaces the contents visually.
    if let Some(ready) = item.ready() {
        push_with_contents(out, ready, parent, Vec3::ZERO, layout);
        return;
    }
    for (i, inner) in item.contents().iter().enumerate() {
        let offset = Vec3::new(0.0, layout.content_step * i as f32, 0.0);
        push_with_contents(out, inner, parent, offset, layout);
    }
}

fn format_clock(seconds: i64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Default)]
struct HudMemo {
    score: Option<f64>,
    seconds: Option<i64>,
    info: Option<String>,
}

/// Applies snapshots to the scene and owns the entity registries.
#[derive(Debug)]
pub struct StateApplier {
    layout: LayoutConfig,
    local_players: HashSet<String>,

    players: Registry<PlayerEntry>,
    counters: Registry<CounterEntry>,
    items: Registry<ItemEntry>,
    progress: Registry<ProgressEntry>,
    orders: Vec<Handle>,

    detector: ChangeDetector,
    /// Item ids placed by the last full pass.
    active_items: HashSet<String>,
    highlighted: BTreeSet<String>,
    floor: Option<(Handle, KitchenSize)>,
    hud: HudMemo,
    view_restrictions: Option<Vec<ViewRestriction>>,
    ended: bool,
    passes: u64,
    /// Entities already warned about, so repeats log at trace level.
    warned: HashSet<String>,
}

impl StateApplier {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            layout,
            local_players: HashSet::new(),
            players: Registry::default(),
            counters: Registry::default(),
            items: Registry::default(),
            progress: Registry::default(),
            orders: Vec::new(),
            detector: ChangeDetector::new(),
            active_items: HashSet::new(),
            highlighted: BTreeSet::new(),
            floor: None,
            hud: HudMemo::default(),
            view_restrictions: None,
            ended: false,
            passes: 0,
            warned: HashSet::new(),
        }
    }

    /// Marks which player ids this client controls.
    pub fn set_local_players<I, S>(&mut self, ids: I, interp: &mut InterpolationScheduler)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_players = ids.into_iter().map(Into::into).collect();
        let known: Vec<String> = self.players.iter().map(|(id, _)| id.to_string()).collect();
        for id in known {
            let control = if self.local_players.contains(&id) {
                Control::Local
            } else {
                Control::Remote
            };
            if let Some(entry) = self.players.get_mut(&id) {
                entry.control = control;
                interp.set_control(entry.handle, control);
            }
        }
    }

    /// Applies one snapshot. Never fails; see [`ApplyReport`] for what happened.
    pub fn apply(
        &mut self,
        snap: &Snapshot,
        scene: &mut dyn SceneBackend,
        interp: &mut InterpolationScheduler,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();

        self.update_floor(snap.kitchen, scene);
        self.reconcile_players(snap, scene, interp, &mut report);

        if self.detector.changed(snap) {
            self.reconcile_items(snap, scene, &mut report);
            report.reconciled = true;
            self.passes += 1;
            debug!(
                pass = self.passes,
                created = report.items_created,
                replaced = report.items_replaced,
                hidden = report.items_hidden,
                "Reconciled counters and items"
            );
        } else {
            trace!("Counters and items unchanged, skipping reconciliation");
        }

        self.update_highlights(snap, scene);
        report.orders = self.replace_orders(snap, scene);
        self.update_hud(snap, scene);
        self.view_restrictions = snap.view_restrictions.clone();
        report
    }

    fn note_failure(&mut self, id: &str, err: &ClientError) {
        if self.warned.insert(id.to_string()) {
            warn!(%id, error = %err, "Skipping entity");
        } else {
            trace!(%id, error = %err, "Skipping entity");
        }
    }

    fn update_floor(&mut self, kitchen: KitchenSize, scene: &mut dyn SceneBackend) {
        let center = Vec3::new(kitchen.width * 0.5, 0.0, kitchen.height * 0.5);
        match self.floor {
            Some((_, size)) if size == kitchen => {}
            Some((handle, _)) => {
                scene.set_local_transform(handle, center, Quat::IDENTITY);
                self.floor = Some((handle, kitchen));
            }
            None => match scene.spawn(&SpawnKind::Floor, "kitchen") {
                Ok(handle) => {
                    scene.set_local_transform(handle, center, Quat::IDENTITY);
                    self.floor = Some((handle, kitchen));
                }
                Err(e) => self.note_failure("kitchen", &ClientError::from(e)),
            },
        }
    }

    fn reconcile_players(
        &mut self,
        snap: &Snapshot,
        scene: &mut dyn SceneBackend,
        interp: &mut InterpolationScheduler,
        report: &mut ApplyReport,
    ) {
        for player in &snap.players {
            let position = player.position.to_plane();
            let rotation = Quat::from_facing(player.facing_direction);

            if let Some(entry) = self.players.get(&player.id) {
                interp.set_target(entry.handle, position, rotation);
                continue;
            }

            match scene.spawn(&SpawnKind::Player, &player.id) {
                Ok(handle) => {
                    let control = if self.local_players.contains(&player.id) {
                        Control::Local
                    } else {
                        Control::Remote
                    };
                    scene.set_parent(handle, Container::Root);
                    scene.set_local_transform(handle, position, rotation);
                    interp.register(handle, position, rotation, control);
                    self.players
                        .insert(&player.id, PlayerEntry { handle, control });
                    report.players_created += 1;
                    info!(player = %player.id, ?control, "Player joined");
                }
                Err(e) => {
                    report.missing_assets += 1;
                    self.note_failure(&player.id, &ClientError::from(e));
                }
            }
        }
    }

    fn ensure_counters(
        &mut self,
        snap: &Snapshot,
        scene: &mut dyn SceneBackend,
        report: &mut ApplyReport,
    ) {
        for counter in &snap.counters {
            if self.counters.contains(&counter.id) {
                continue;
            }
            match scene.spawn(&SpawnKind::Counter(counter.kind.clone()), &counter.id) {
                Ok(handle) => {
                    scene.set_parent(handle, Container::Root);
                    scene.set_local_transform(
                        handle,
                        counter.position.to_plane(),
                        Quat::from_facing(counter.orientation),
                    );
                    self.counters.insert(
                        &counter.id,
                        CounterEntry {
                            handle,
                            kind: counter.kind.clone(),
                        },
                    );
                    report.counters_created += 1;
                }
                Err(e) => {
                    report.missing_assets += 1;
                    self.note_failure(&counter.id, &ClientError::from(e));
                }
            }
        }
    }

    fn reconcile_items(
        &mut self,
        snap: &Snapshot,
        scene: &mut dyn SceneBackend,
        report: &mut ApplyReport,
    ) {
        self.ensure_counters(snap, scene, report);

        let placements = collect_placements(snap, &self.layout);
        let mut active: HashSet<String> = HashSet::with_capacity(placements.len());

        for placement in &placements {
            let id = placement.item.id();
            let container = match self.resolve(id, placement.holder, &active) {
                Ok(container) => container,
                Err(e) => {
                    report.unresolved += 1;
                    self.note_failure(id, &ClientError::from(e));
                    continue;
                }
            };
            if self.ensure_item(placement.item, scene, report).is_none() {
                continue;
            }
            self.place(id, container, placement.offset, scene, report);
            active.insert(id.to_string());
        }

        for id in self.active_items.difference(&active) {
            if let Some(entry) = self.items.get_mut(id) {
                if entry.active {
                    scene.set_active(entry.handle, false);
                    entry.active = false;
                    report.items_hidden += 1;
                }
            }
        }
        self.active_items = active;

        self.reconcile_progress(&placements, scene, report);
    }

    /// Maps a holder to its scene container. Parent items must have been
    /// placed earlier in this pass.
    fn resolve(
        &self,
        item: &str,
        holder: Holder<'_>,
        placed: &HashSet<String>,
    ) -> Result<Container, LogicError> {
        let (found, container) = match holder {
            Holder::Player(id) => (self.players.handle(id).map(Container::HoldingSpot), id),
            Holder::Counter(id) => (self.counters.handle(id).map(Container::Counter), id),
            Holder::Item(id) if placed.contains(id) => {
                (self.items.handle(id).map(Container::Item), id)
            }
            Holder::Item(id) => (None, id),
        };
        found.ok_or_else(|| LogicError::UnknownContainer {
            item: item.to_string(),
            container: container.to_string(),
        })
    }

    /// Fetches the item's visual, creating it or replacing it on type change.
    fn ensure_item(
        &mut self,
        item: &ItemState,
        scene: &mut dyn SceneBackend,
        report: &mut ApplyReport,
    ) -> Option<Handle> {
        let id = item.id();
        let kind = item.kind();

        if let Some(entry) = self.items.get_mut(id) {
            if entry.kind == kind {
                if !entry.active {
                    scene.set_active(entry.handle, true);
                    entry.active = true;
                    report.items_reactivated += 1;
                }
                return Some(entry.handle);
            }
            debug!(item = %id, from = %entry.kind, to = %kind, "Item changed type, replacing visual");
            let old = entry.handle;
            self.detach_children(old, scene);
            scene.destroy(old);
            self.items.remove(id);
            report.items_replaced += 1;
        }

        match scene.spawn(&SpawnKind::Item(kind.to_string()), id) {
            Ok(handle) => {
                self.items.insert(id, ItemEntry::new(handle, kind));
                report.items_created += 1;
                Some(handle)
            }
            Err(e) => {
                report.missing_assets += 1;
                self.note_failure(id, &ClientError::from(e));
                None
            }
        }
    }

    /// Moves visuals hanging under `parent` to the root before it is destroyed.
    fn detach_children(&mut self, parent: Handle, scene: &mut dyn SceneBackend) {
        let under = Some(Container::Item(parent));
        let children: Vec<String> = self
            .items
            .iter()
            .filter(|(_, e)| e.container == under)
            .map(|(id, _)| id.to_string())
            .collect();
        for id in children {
            if let Some(entry) = self.items.get_mut(&id) {
                scene.set_parent(entry.handle, Container::Root);
                entry.container = None;
            }
        }
        let bars: Vec<String> = self
            .progress
            .iter()
            .filter(|(_, e)| e.owner == parent)
            .map(|(id, _)| id.to_string())
            .collect();
        for id in bars {
            if let Some(entry) = self.progress.get(&id) {
                scene.destroy(entry.handle);
            }
            self.progress.remove(&id);
        }
    }

    fn place(
        &mut self,
        id: &str,
        container: Container,
        offset: Vec3,
        scene: &mut dyn SceneBackend,
        report: &mut ApplyReport,
    ) {
        let Some(entry) = self.items.get_mut(id) else {
            return;
        };
        if entry.container != Some(container) {
            scene.set_parent(entry.handle, container);
            scene.set_local_transform(entry.handle, offset, Quat::IDENTITY);
            entry.container = Some(container);
            entry.offset = offset;
            report.items_reparented += 1;
        } else if entry.offset != offset {
            scene.set_local_transform(entry.handle, offset, Quat::IDENTITY);
            entry.offset = offset;
            report.items_moved += 1;
        }
    }

    fn reconcile_progress(
        &mut self,
        placements: &[Placement<'_>],
        scene: &mut dyn SceneBackend,
        report: &mut ApplyReport,
    ) {
        let lift = Vec3::new(0.0, self.layout.progress_height, 0.0);
        let mut live: HashSet<&str> = HashSet::new();

        for placement in placements {
            let item = placement.item;
            let id = item.id();
            if !item.in_progress() || !self.active_items.contains(id) {
                continue;
            }
            let Some(owner) = self.items.handle(id) else {
                continue;
            };

            let existing = self.progress.get(id).map(|e| (e.handle, e.owner != owner));
            let (handle, reparent) = match existing {
                Some(found) => found,
                None => match scene.spawn(&SpawnKind::Progress, id) {
                    Ok(handle) => {
                        report.progress_created += 1;
                        (handle, true)
                    }
                    Err(e) => {
                        report.missing_assets += 1;
                        self.note_failure(id, &ClientError::from(e));
                        continue;
                    }
                },
            };
            if reparent {
                scene.set_parent(handle, Container::Item(owner));
            }
            self.progress.insert(id, ProgressEntry { handle, owner });
            scene.set_local_transform(handle, lift, Quat::IDENTITY);
            scene.set_progress(handle, item.progress() / 100.0, item.inverse_progress());
            live.insert(id);
        }

        for (_, entry) in self.progress.drain_where(|id| live.contains(id)) {
            scene.destroy(entry.handle);
            report.progress_destroyed += 1;
        }
    }

    fn update_highlights(&mut self, snap: &Snapshot, scene: &mut dyn SceneBackend) {
        let next: BTreeSet<String> = snap
            .players
            .iter()
            .filter(|p| self.local_players.contains(&p.id))
            .filter_map(|p| p.nearest_counter_id.clone())
            .filter(|id| self.counters.contains(id))
            .collect();
        if next == self.highlighted {
            return;
        }
        for id in self.highlighted.difference(&next) {
            if let Some(handle) = self.counters.handle(id) {
                scene.set_highlight(handle, false);
            }
        }
        for id in next.difference(&self.highlighted) {
            if let Some(handle) = self.counters.handle(id) {
                scene.set_highlight(handle, true);
            }
        }
        self.highlighted = next;
    }

    fn replace_orders(&mut self, snap: &Snapshot, scene: &mut dyn SceneBackend) -> usize {
        for handle in self.orders.drain(..) {
            scene.destroy(handle);
        }
        for (i, order) in snap.orders.iter().enumerate() {
            match scene.spawn(&SpawnKind::Order(order.meal.clone()), &order.id) {
                Ok(handle) => {
                    let slot = Vec3::new(self.layout.order_spacing * i as f32, 0.0, 0.0);
                    scene.set_local_transform(handle, slot, Quat::IDENTITY);
                    self.orders.push(handle);
                }
                Err(e) => self.note_failure(&order.id, &ClientError::from(e)),
            }
        }
        self.orders.len()
    }

    fn update_hud(&mut self, snap: &Snapshot, scene: &mut dyn SceneBackend) {
        if self.hud.score != Some(snap.score) {
            scene.set_text(HudSlot::Score, &format!("Score: {}", snap.score));
            self.hud.score = Some(snap.score);
        }

        let seconds = snap.remaining_time.max(0.0).ceil() as i64;
        if self.hud.seconds != Some(seconds) {
            scene.set_text(HudSlot::Time, &format_clock(seconds));
            self.hud.seconds = Some(seconds);
        }

        let info = snap
            .info_messages
            .iter()
            .filter(|m| m.first().is_some_and(|p| self.local_players.contains(p)))
            .filter_map(|m| m.get(1).cloned())
            .collect::<Vec<_>>()
            .join("\n");
        if self.hud.info.as_deref() != Some(info.as_str()) {
            scene.set_text(HudSlot::Info, &info);
            self.hud.info = Some(info);
        }

        if snap.ended && !self.ended {
            self.ended = true;
            scene.set_text(HudSlot::Status, "Game over");
            info!(score = snap.score, served = snap.served_meals.len(), "Session ended");
        }
    }

    pub fn session_ended(&self) -> bool {
        self.ended
    }

    /// Number of full counter/item passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn view_restrictions(&self) -> Option<&[ViewRestriction]> {
        self.view_restrictions.as_deref()
    }

    pub fn players(&self) -> &Registry<PlayerEntry> {
        &self.players
    }

    pub fn counters(&self) -> &Registry<CounterEntry> {
        &self.counters
    }

    pub fn items(&self) -> &Registry<ItemEntry> {
        &self.items
    }

    pub fn progress(&self) -> &Registry<ProgressEntry> {
        &self.progress
    }

    pub fn order_handles(&self) -> &[Handle] {
        &self.orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kitchen_shared::{
        config::InterpConfig,
        protocol::OrderState,
        scene::HeadlessScene,
        testing::{counter, item, player, pot, snapshot as snap},
    };

    struct Fixture {
        applier: StateApplier,
        scene: HeadlessScene,
        interp: InterpolationScheduler,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_scene(HeadlessScene::new())
        }

        fn with_scene(scene: HeadlessScene) -> Self {
            let mut interp = InterpolationScheduler::new(InterpConfig::default());
            let mut applier = StateApplier::new(LayoutConfig::default());
            applier.set_local_players(["0"], &mut interp);
            Self {
                applier,
                scene,
                interp,
            }
        }

        fn apply(&mut self, snap: &Snapshot) -> ApplyReport {
            self.applier.apply(snap, &mut self.scene, &mut self.interp)
        }

        fn item(&self, id: &str) -> Handle {
            self.applier.items().handle(id).unwrap()
        }
    }

    #[test]
    fn identical_snapshot_twice_makes_no_mutations() {
        let mut fx = Fixture::new();
        let s = snap(
            vec![player("0", 0.0, 0.0, Some(item("p", "Plate", 0.0)))],
            vec![counter("c1", "Counter", vec![item("i1", "Tomato", 0.0)])],
        );

        let first = fx.apply(&s);
        assert!(first.reconciled);
        assert_eq!(first.players_created, 1);
        assert_eq!(first.counters_created, 1);
        assert_eq!(first.items_created, 2);
        let spawned = fx.scene.stats().spawned;

        let second = fx.apply(&s.clone());
        assert!(!second.reconciled);
        assert_eq!(second.registry_mutations(), 0);
        assert_eq!(fx.applier.passes(), 1);
        assert_eq!(fx.scene.stats().spawned, spawned);
        assert_eq!(fx.scene.stats().destroyed, 0);
    }

    #[test]
    fn type_change_replaces_handle_exactly_once() {
        let mut fx = Fixture::new();
        fx.apply(&snap(vec![], vec![counter("C1", "Counter", vec![item("i1", "Tomato", 0.0)])]));
        let old = fx.item("i1");
        let before = fx.scene.stats();

        let report = fx.apply(&snap(
            vec![],
            vec![counter("C1", "Counter", vec![item("i1", "ChoppedTomato", 0.0)])],
        ));
        let after = fx.scene.stats();
        assert_eq!(report.items_replaced, 1);
        assert_eq!(report.items_created, 1);
        assert_eq!(after.destroyed - before.destroyed, 1);
        assert_eq!(after.spawned - before.spawned, 1);

        let new = fx.item("i1");
        assert_ne!(old, new);
        assert!(fx.scene.node(old).is_none());
        let node = fx.scene.node(new).unwrap();
        assert_eq!(node.kind, SpawnKind::Item("ChoppedTomato".into()));
        let c1 = fx.applier.counters().handle("C1").unwrap();
        assert_eq!(node.parent, Container::Counter(c1));
    }

    #[test]
    fn same_type_reuses_handle_across_containers() {
        let mut fx = Fixture::new();
        fx.apply(&snap(
            vec![player("0", 0.0, 0.0, None)],
            vec![counter("c1", "Counter", vec![item("i1", "Tomato", 0.0)])],
        ));
        let handle = fx.item("i1");
        assert_eq!(fx.scene.node(handle).unwrap().position.y, 0.5);

        let report = fx.apply(&snap(
            vec![player("0", 0.0, 0.0, Some(item("i1", "Tomato", 0.0)))],
            vec![counter("c1", "Counter", vec![])],
        ));
        assert_eq!(report.items_created, 0);
        assert_eq!(report.items_reparented, 1);
        assert_eq!(fx.item("i1"), handle);

        let holder = fx.applier.players().handle("0").unwrap();
        let node = fx.scene.node(handle).unwrap();
        assert_eq!(node.parent, Container::HoldingSpot(holder));
        assert_eq!(node.position, Vec3::ZERO);
    }

    #[test]
    fn absent_items_are_hidden_then_reactivated() {
        let mut fx = Fixture::new();
        let with = snap(vec![], vec![counter("c1", "Counter", vec![item("i1", "Tomato", 0.0)])]);
        let without = snap(vec![], vec![counter("c1", "Counter", vec![])]);

        fx.apply(&with);
        let handle = fx.item("i1");

        let hidden = fx.apply(&without);
        assert_eq!(hidden.items_hidden, 1);
        assert!(!fx.scene.node(handle).unwrap().active);

        let back = fx.apply(&with);
        assert_eq!(back.items_reactivated, 1);
        assert_eq!(back.items_created, 0);
        assert_eq!(fx.item("i1"), handle);
        assert!(fx.scene.node(handle).unwrap().active);
        assert_eq!(fx.scene.stats().destroyed, 0);
    }

    #[test]
    fn progress_indicator_tracks_open_interval() {
        let mut fx = Fixture::new();
        let at = |p: f32| snap(vec![], vec![counter("board", "CuttingBoard", vec![item("i1", "Tomato", p)])]);

        fx.apply(&at(0.0));
        assert!(fx.applier.progress().is_empty());

        fx.apply(&at(40.0));
        let bar = fx.applier.progress().handle("i1").unwrap();
        let node = fx.scene.node(bar).unwrap();
        assert_eq!(node.parent, Container::Item(fx.item("i1")));
        assert!((node.progress.unwrap() - 0.4).abs() < 1e-6);
        assert_eq!(node.position.y, LayoutConfig::default().progress_height);

        fx.apply(&at(80.0));
        assert_eq!(fx.applier.progress().handle("i1"), Some(bar));
        assert!((fx.scene.node(bar).unwrap().progress.unwrap() - 0.8).abs() < 1e-6);

        let done = fx.apply(&at(100.0));
        assert_eq!(done.progress_destroyed, 1);
        assert!(fx.applier.progress().is_empty());
        assert!(fx.scene.node(bar).is_none());
    }

    #[test]
    fn plates_stack_on_dispenser() {
        let mut fx = Fixture::new();
        fx.apply(&snap(
            vec![],
            vec![
                counter(
                    "disp",
                    "PlateDispenser",
                    vec![item("a", "Plate", 0.0), item("b", "Plate", 0.0), item("c", "Plate", 0.0)],
                ),
                counter("plain", "Counter", vec![item("d", "Plate", 0.0)]),
            ],
        ));
        let y = |fx: &Fixture, id: &str| fx.scene.node(fx.item(id)).unwrap().position.y;
        assert!((y(&fx, "a") - 0.5).abs() < 1e-6);
        assert!((y(&fx, "b") - 0.55).abs() < 1e-6);
        assert!((y(&fx, "c") - 0.6).abs() < 1e-6);
        assert!((y(&fx, "d") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn nested_contents_hang_under_container() {
        let mut fx = Fixture::new();
        let cooking = snap(
            vec![],
            vec![counter(
                "stove",
                "Stove",
                vec![pot("pot", vec![item("t1", "ChoppedTomato", 0.0), item("t2", "ChoppedTomato", 0.0)], None)],
            )],
        );
        fx.apply(&cooking);
        let pot_handle = fx.item("pot");
        let t2 = fx.scene.node(fx.item("t2")).unwrap();
        assert_eq!(t2.parent, Container::Item(pot_handle));
        assert!((t2.position.y - 0.1).abs() < 1e-6);

        let done = snap(
            vec![],
            vec![counter(
                "stove",
                "Stove",
                vec![pot(
                    "pot",
                    vec![item("t1", "ChoppedTomato", 0.0), item("t2", "ChoppedTomato", 0.0)],
                    Some(item("soup", "TomatoSoup", 0.0)),
                )],
            )],
        );
        let report = fx.apply(&done);
        assert_eq!(report.items_hidden, 2);
        let soup = fx.scene.node(fx.item("soup")).unwrap();
        assert_eq!(soup.parent, Container::Item(pot_handle));
        assert!(!fx.scene.node(fx.item("t1")).unwrap().active);
    }

    #[test]
    fn missing_asset_skips_only_that_item() {
        let mut fx = Fixture::with_scene(HeadlessScene::new().without_asset("Onion"));
        let report = fx.apply(&snap(
            vec![],
            vec![counter("c1", "Counter", vec![item("o", "Onion", 0.0), item("t", "Tomato", 0.0)])],
        ));
        assert_eq!(report.missing_assets, 1);
        assert_eq!(report.items_created, 1);
        assert!(fx.applier.items().handle("o").is_none());
        assert!(fx.applier.items().handle("t").is_some());
    }

    #[test]
    fn missing_container_asset_does_not_rerun_identical_snapshots() {
        let mut fx = Fixture::with_scene(HeadlessScene::new().without_asset("Stove"));
        let s = snap(
            vec![],
            vec![
                counter("stove", "Stove", vec![pot("pot", vec![item("t1", "ChoppedTomato", 0.0)], None)]),
                counter("c1", "Counter", vec![item("i1", "Tomato", 0.0)]),
            ],
        );

        let first = fx.apply(&s);
        assert!(first.reconciled);
        assert_eq!(first.missing_assets, 1);
        // The pot and its contents have nowhere to go.
        assert_eq!(first.unresolved, 2);
        assert!(fx.applier.items().handle("i1").is_some());

        let reconciled: Vec<bool> = (0..4).map(|_| fx.apply(&s.clone()).reconciled).collect();
        assert_eq!(reconciled, vec![false; 4]);
        assert_eq!(fx.applier.passes(), 1);

        // A real change still goes through.
        let mut moved = s.clone();
        moved.counters[1].occupants.clear();
        assert!(fx.apply(&moved).reconciled);
        assert_eq!(fx.applier.passes(), 2);
    }

    #[test]
    fn unknown_holder_is_skipped_without_retry() {
        let mut fx = Fixture::with_scene(HeadlessScene::new().without_asset("Player"));
        let s = snap(vec![player("0", 0.0, 0.0, Some(item("p", "Plate", 0.0)))], vec![]);

        let first = fx.apply(&s);
        assert_eq!(first.unresolved, 1);
        assert!(fx.applier.items().is_empty());

        let second = fx.apply(&s);
        assert!(!second.reconciled);
        assert_eq!(second.unresolved, 0);
        assert_eq!(fx.applier.passes(), 1);
    }

    #[test]
    fn players_only_move_their_targets() {
        let mut fx = Fixture::new();
        fx.apply(&snap(vec![player("0", 1.0, 1.0, None), player("1", 4.0, 4.0, None)], vec![]));
        let local = fx.applier.players().get("0").unwrap().clone();
        let remote = fx.applier.players().get("1").unwrap().clone();
        assert_eq!(local.control, Control::Local);
        assert_eq!(remote.control, Control::Remote);

        let report = fx.apply(&snap(vec![player("0", 2.0, 1.0, None), player("1", 4.0, 5.0, None)], vec![]));
        assert_eq!(report.players_created, 0);
        assert_eq!(fx.scene.node(local.handle).unwrap().position, Vec3::new(1.0, 0.0, 1.0));
        let motion = fx.interp.motion(local.handle).unwrap();
        assert_eq!(motion.target_position, Vec3::new(2.0, 0.0, 1.0));
        assert_eq!(motion.position, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn orders_are_replaced_every_snapshot() {
        let mut fx = Fixture::new();
        let order = |id: &str| OrderState {
            id: id.into(),
            meal: "TomatoSoup".into(),
            start_time: 0.0,
            max_duration: 60.0,
            score: 20.0,
        };
        let mut s = snap(vec![], vec![]);
        s.orders = vec![order("o1"), order("o2")];

        assert_eq!(fx.apply(&s).orders, 2);
        let first = fx.applier.order_handles().to_vec();
        fx.apply(&s);
        let second = fx.applier.order_handles().to_vec();

        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|h| !second.contains(h)));
        assert_eq!(fx.scene.count_where(|n| matches!(n.kind, SpawnKind::Order(_))), 2);
    }

    #[test]
    fn hud_fields_update_when_changed() {
        let mut fx = Fixture::new();
        let mut s = snap(vec![], vec![]);
        s.score = 20.0;
        s.remaining_time = 94.2;
        s.info_messages = vec![
            vec!["0".into(), "Order served".into()],
            vec!["1".into(), "not ours".into()],
        ];
        fx.apply(&s);
        assert_eq!(fx.scene.text(HudSlot::Score), Some("Score: 20"));
        assert_eq!(fx.scene.text(HudSlot::Time), Some("1:35"));
        assert_eq!(fx.scene.text(HudSlot::Info), Some("Order served"));
        assert_eq!(fx.scene.text(HudSlot::Status), None);

        s.ended = true;
        s.remaining_time = 0.0;
        fx.apply(&s);
        assert_eq!(fx.scene.text(HudSlot::Time), Some("0:00"));
        assert_eq!(fx.scene.text(HudSlot::Status), Some("Game over"));
        assert!(fx.applier.session_ended());
    }

    #[test]
    fn nearest_counter_is_highlighted_for_local_players() {
        let mut fx = Fixture::new();
        let near = |id: Option<&str>| {
            let mut p = player("0", 0.0, 0.0, None);
            p.nearest_counter_id = id.map(str::to_string);
            snap(vec![p], vec![counter("a", "Counter", vec![]), counter("b", "Counter", vec![])])
        };
        fx.apply(&near(Some("a")));
        let a = fx.applier.counters().handle("a").unwrap();
        let b = fx.applier.counters().handle("b").unwrap();
        assert!(fx.scene.node(a).unwrap().highlighted);

        fx.apply(&near(Some("b")));
        assert!(!fx.scene.node(a).unwrap().highlighted);
        assert!(fx.scene.node(b).unwrap().highlighted);

        fx.apply(&near(None));
        assert!(!fx.scene.node(b).unwrap().highlighted);
    }

    #[test]
    fn floor_follows_kitchen_size() {
        let mut fx = Fixture::new();
        let mut s = snap(vec![], vec![]);
        s.kitchen = KitchenSize { width: 8.0, height: 6.0 };
        fx.apply(&s);
        fx.apply(&s);
        let floors: Vec<_> = fx.scene.handles_for("kitchen");
        assert_eq!(floors.len(), 1);
        assert_eq!(fx.scene.node(floors[0]).unwrap().position, Vec3::new(4.0, 0.0, 3.0));
    }
}
