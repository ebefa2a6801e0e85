//! Configuration system.
//!
//! Loads client configuration from JSON strings (file IO left to app).
//! Every field has a default so partial files are valid.

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Root client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the session server handling the handshake.
    pub server_url: String,
    pub participant_id: String,
    pub player_count: u32,
    /// Render/pump rate of the frame loop.
    pub frame_hz: u32,
    pub request_timeout_ms: u64,
    /// Request the next state after each received one.
    pub poll_state: bool,
    /// Re-issue an unanswered `get_state` after this long.
    pub state_request_timeout_ms: u64,
    pub interpolation: InterpConfig,
    pub layout: LayoutConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            participant_id: "participant".to_string(),
            player_count: 1,
            frame_hz: 60,
            request_timeout_ms: 5_000,
            poll_state: true,
            state_request_timeout_ms: 1_000,
            interpolation: InterpConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpConfig {
    /// Exponential rate (1/s) for locally-controlled entities.
    pub local_smoothing: f32,
    /// Translation speed (units/s) for remote entities.
    pub remote_speed: f32,
    /// Remote entities closer than this land on the target.
    pub snap_distance: f32,
    /// Degrees per second for remote entities.
    pub remote_angular_speed: f32,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            local_smoothing: 15.0,
            remote_speed: 4.0,
            snap_distance: 0.05,
            remote_angular_speed: 720.0,
        }
    }
}

/// Item placed on a counter kind stacks upward by `step` per same-kind item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRule {
    pub item: String,
    pub counter: String,
    pub step: f32,
}

impl StackRule {
    pub fn new(item: &str, counter: &str, step: f32) -> Self {
        Self {
            item: item.to_string(),
            counter: counter.to_string(),
            step,
        }
    }
}

/// Local offsets used when placing visuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub counter_item_height: f32,
    pub holding_offset: Vec3,
    pub progress_height: f32,
    pub content_step: f32,
    pub order_spacing: f32,
    pub stacking: Vec<StackRule>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            counter_item_height: 0.5,
            holding_offset: Vec3::ZERO,
            progress_height: 0.6,
            content_step: 0.1,
            order_spacing: 1.2,
            stacking: vec![
                StackRule::new("Plate", "PlateDispenser", 0.05),
                StackRule::new("DirtyPlate", "PlateDispenser", 0.05),
                StackRule::new("DirtyPlate", "Sink", 0.05),
                StackRule::new("Plate", "SinkAddon", 0.05),
            ],
        }
    }
}

impl LayoutConfig {
    /// Stacking step for an item kind on a counter kind, if it stacks there.
    pub fn stack_step(&self, item: &str, counter: &str) -> Option<f32> {
        self.stacking
            .iter()
            .find(|r| r.item == item && r.counter == counter)
            .map(|r| r.step)
    }
}
