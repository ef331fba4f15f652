//! Goat engine crate.
//!
//! A small real-time 3D renderer: shader programs, interleaved vertex buffers,
//! textures and a camera-driven scene (`gfx`, `world`), plus the platform and
//! GPU runtime that hosts them (`window`, `device`, `input`, `time`, `core`).

pub mod error;
pub mod gfx;
pub mod world;

pub mod core;
pub mod device;
pub mod input;
pub mod logging;
pub mod time;
pub mod window;

pub use error::{GfxError, Result};
