//! `kitchen_shared`
//!
//! Libraries shared by the client, its binary, and the integration tests.
//!
//! Design goals:
//! - The wire protocol is validated at the boundary into closed types.
//! - Transports and the scene are traits so tests run headless.
//! - No `unsafe`.

pub mod config;
pub mod error;
pub mod math;
pub mod net;
pub mod protocol;
pub mod scene;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
    pub use crate::scene::*;
}
