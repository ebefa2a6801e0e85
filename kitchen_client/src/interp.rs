//! Interpolation.
//!
//! The server sends discrete snapshots at a lower, irregular rate.
//! The client renders at its own rate and moves each entity's visual
//! transform toward the latest target every frame:
//! - locally-controlled entities follow with exponential smoothing,
//! - remote entities travel at constant linear and angular speed and snap
//!   onto the target once within `snap_distance`.
//!
//! Targets are written by the state applier; the scheduler only reads them.

use std::collections::BTreeMap;

use kitchen_shared::{
    config::InterpConfig,
    math::{Quat, Vec3},
    scene::{Handle, SceneBackend},
};

/// Residual below which local smoothing lands on the target.
const SETTLE_EPSILON: f32 = 1e-4;

/// Who drives an entity's movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Local,
    Remote,
}

/// Visual and target transform of one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub position: Vec3,
    pub rotation: Quat,
    pub target_position: Vec3,
    pub target_rotation: Quat,
    pub control: Control,
}

impl Motion {
    /// Starts settled at the given transform.
    pub fn at(position: Vec3, rotation: Quat, control: Control) -> Self {
        Self {
            position,
            rotation,
            target_position: position,
            target_rotation: rotation,
            control,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.position == self.target_position && self.rotation == self.target_rotation
    }

    /// Advances by `dt` seconds. Returns whether the visual transform changed.
    pub fn step(&mut self, cfg: &InterpConfig, dt: f32) -> bool {
        if self.is_settled() {
            return false;
        }
        match self.control {
            Control::Local => self.step_local(cfg.local_smoothing, dt),
            Control::Remote => {
                self.step_remote(cfg.remote_speed, cfg.snap_distance, cfg.remote_angular_speed, dt)
            }
        }
        true
    }

    fn step_local(&mut self, rate: f32, dt: f32) {
        let t = 1.0 - (-rate * dt).exp();
        self.position = self.position.lerp(self.target_position, t);
        self.rotation = self.rotation.slerp(self.target_rotation, t);

        if self.position.distance(self.target_position) < SETTLE_EPSILON {
            self.position = self.target_position;
        }
        if self.rotation.angle_to(self.target_rotation) < SETTLE_EPSILON {
            self.rotation = self.target_rotation;
        }
    }

    fn step_remote(&mut self, speed: f32, snap: f32, degrees_per_sec: f32, dt: f32) {
        if self.position.distance(self.target_position) <= snap {
            self.position = self.target_position;
        } else {
            self.position = self.position.move_towards(self.target_position, speed * dt);
        }
        self.rotation = self
            .rotation
            .rotate_towards(self.target_rotation, degrees_per_sec.to_radians() * dt);
    }
}

/// Per-frame smoothing of every registered entity.
#[derive(Debug, Default)]
pub struct InterpolationScheduler {
    cfg: InterpConfig,
    motions: BTreeMap<Handle, Motion>,
}

impl InterpolationScheduler {
    pub fn new(cfg: InterpConfig) -> Self {
        Self {
            cfg,
            motions: BTreeMap::new(),
        }
    }

    /// Registers an entity already placed at its first target.
    pub fn register(&mut self, handle: Handle, position: Vec3, rotation: Quat, control: Control) {
        self.motions
            .insert(handle, Motion::at(position, rotation, control));
    }

    /// Updates the target of a registered entity. Returns false if unknown.
    pub fn set_target(&mut self, handle: Handle, position: Vec3, rotation: Quat) -> bool {
        match self.motions.get_mut(&handle) {
            Some(m) => {
                m.target_position = position;
                m.target_rotation = rotation;
                true
            }
            None => false,
        }
    }

    pub fn set_control(&mut self, handle: Handle, control: Control) {
        if let Some(m) = self.motions.get_mut(&handle) {
            m.control = control;
        }
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Motion> {
        self.motions.remove(&handle)
    }

    pub fn motion(&self, handle: Handle) -> Option<&Motion> {
        self.motions.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.motions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }

    /// Advances every entity by `dt` and writes changed transforms to the
    /// scene. Returns the number of writes.
    pub fn tick(&mut self, dt: f32, scene: &mut dyn SceneBackend) -> usize {
        let mut writes = 0;
        for (handle, motion) in self.motions.iter_mut() {
            if motion.step(&self.cfg, dt) {
                scene.set_local_transform(*handle, motion.position, motion.rotation);
                writes += 1;
            }
        }
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kitchen_shared::scene::{HeadlessScene, SpawnKind};
    use proptest::prelude::*;
    use std::f32::consts::PI;

    fn cfg() -> InterpConfig {
        InterpConfig::default()
    }

    #[test]
    fn remote_moves_at_constant_speed_then_snaps() {
        let cfg = cfg();
        let mut m = Motion::at(Vec3::ZERO, Quat::IDENTITY, Control::Remote);
        m.target_position = Vec3::new(1.0, 0.0, 0.0);

        assert!(m.step(&cfg, 0.1));
        assert!((m.position.x - cfg.remote_speed * 0.1).abs() < 1e-6);

        m.position = Vec3::new(1.0 - cfg.snap_distance * 0.5, 0.0, 0.0);
        m.step(&cfg, 0.001);
        assert_eq!(m.position, m.target_position);
        assert!(m.is_settled());
        assert!(!m.step(&cfg, 0.1));
    }

    #[test]
    fn remote_rotation_is_speed_limited() {
        let cfg = cfg();
        let mut m = Motion::at(Vec3::ZERO, Quat::IDENTITY, Control::Remote);
        m.target_rotation = Quat::from_yaw(PI);
        m.step(&cfg, 0.05);
        let turned = Quat::IDENTITY.angle_to(m.rotation);
        assert!((turned - cfg.remote_angular_speed.to_radians() * 0.05).abs() < 1e-3);
    }

    #[test]
    fn local_follows_exponentially() {
        let cfg = cfg();
        let mut m = Motion::at(Vec3::ZERO, Quat::IDENTITY, Control::Local);
        m.target_position = Vec3::new(10.0, 0.0, 0.0);
        m.step(&cfg, 1.0 / 60.0);
        let expected = 10.0 * (1.0 - (-cfg.local_smoothing / 60.0).exp());
        assert!((m.position.x - expected).abs() < 1e-4);

        for _ in 0..600 {
            m.step(&cfg, 1.0 / 60.0);
        }
        assert!(m.is_settled());
    }

    #[test]
    fn tick_writes_only_moving_entities() {
        let mut scene = HeadlessScene::new();
        let a = scene.spawn(&SpawnKind::Player, "a").unwrap();
        let b = scene.spawn(&SpawnKind::Player, "b").unwrap();

        let mut sched = InterpolationScheduler::new(cfg());
        sched.register(a, Vec3::ZERO, Quat::IDENTITY, Control::Remote);
        sched.register(b, Vec3::ZERO, Quat::IDENTITY, Control::Local);
        assert!(sched.set_target(a, Vec3::new(0.0, 0.0, 2.0), Quat::IDENTITY));
        assert!(!sched.set_target(Handle(99), Vec3::ZERO, Quat::IDENTITY));

        assert_eq!(sched.tick(0.1, &mut scene), 1);
        assert_eq!(scene.node(a).unwrap().position, sched.motion(a).unwrap().position);
        assert_eq!(scene.node(b).unwrap().position, Vec3::ZERO);
    }

    proptest! {
        #[test]
        fn remote_distance_strictly_decreases(
            sx in -50.0f32..50.0, sz in -50.0f32..50.0,
            tx in -50.0f32..50.0, tz in -50.0f32..50.0,
            dt in 0.001f32..0.1,
        ) {
            let cfg = cfg();
            let target = Vec3::new(tx, 0.0, tz);
            let mut m = Motion::at(Vec3::new(sx, 0.0, sz), Quat::IDENTITY, Control::Remote);
            m.target_position = target;

            let mut before = m.position.distance(target);
            let mut frames = 0;
            while before > 0.0 && frames < 100_000 {
                m.step(&cfg, dt);
                let after = m.position.distance(target);
                prop_assert!(after < before);
                before = after;
                frames += 1;
            }
            prop_assert_eq!(m.position, target);
        }

        #[test]
        fn local_never_overshoots(start in -50.0f32..50.0, goal in -50.0f32..50.0, dt in 0.001f32..0.1) {
            let cfg = cfg();
            let mut m = Motion::at(Vec3::new(start, 0.0, 0.0), Quat::IDENTITY, Control::Local);
            m.target_position = Vec3::new(goal, 0.0, 0.0);
            let before = (goal - start).abs();
            m.step(&cfg, dt);
            let after = (goal - m.position.x).abs();
            prop_assert!(after <= before + 1e-4);
        }
    }
}
