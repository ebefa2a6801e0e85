//! `kitchen_client`
//!
//! Client-side systems:
//! - Handshake and the persistent state channel
//! - Snapshot reconciliation into entity registries
//! - Change detection gating the counter/item pass
//! - Interpolation toward server-reported transforms
//! - Input intents for locally-controlled players

pub mod apply;
pub mod client;
pub mod connection;
pub mod fingerprint;
pub mod input;
pub mod interp;
pub mod registry;
pub mod session;

pub use client::KitchenClient;
