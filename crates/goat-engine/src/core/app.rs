use anyhow::Result;
use winit::event::WindowEvent;

use super::ctx::{FrameCtx, StartCtx};

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by [`Runtime`](crate::window::Runtime).
///
/// An error from any callback stops the event loop and is returned from
/// `Runtime::run`.
pub trait App {
    /// Called once, after the window and GPU exist and before the first frame.
    /// This is where shaders, buffers and textures are created.
    fn on_start(&mut self, ctx: &mut StartCtx<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called for raw window events, after input state has been updated.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called once per rendered frame.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl>;
}
