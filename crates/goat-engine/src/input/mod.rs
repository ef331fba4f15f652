//! Keyboard input.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! Runtime code translates platform events into `InputEvent`s.

mod bindings;
mod frame;
mod state;
mod types;

pub(crate) mod platform;

pub use bindings::MovementBindings;
pub use frame::InputFrame;
pub use state::InputState;
pub use types::{InputEvent, Key, KeyState, Modifiers};
