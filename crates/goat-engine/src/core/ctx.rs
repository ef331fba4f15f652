use anyhow::{Context, Result};
use winit::window::Window;

use crate::device::{Gpu, SurfaceErrorAction};
use crate::gfx::SharedDriver;
use crate::input::{InputFrame, InputState};
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Window handle plus size queries.
pub struct WindowCtx<'a> {
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    /// Drawable size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

/// Context passed to `core::App::on_start`.
pub struct StartCtx<'a> {
    pub window: WindowCtx<'a>,
    /// Driver every GPU resource of the app must be created through.
    pub driver: SharedDriver,
}

/// Per-frame context passed to `core::App::on_frame`.
///
/// `'a` is the callback duration; `'w` is the window borrow carried by `Gpu<'w>`.
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub input: &'a InputState,
    pub input_frame: &'a InputFrame,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_, '_> {
    /// Acquires a frame, lets `draw` issue draw calls, then replays them into
    /// one cleared render pass and presents.
    ///
    /// `draw` receives the drawable size. A skipped or reconfigured surface
    /// frame does not call `draw`; a fatal surface error returns `Exit`.
    pub fn render<F>(&mut self, draw: F) -> Result<AppControl>
    where
        F: FnOnce((u32, u32)) -> Result<()>,
    {
        let size = self.gpu.size();
        if size.width == 0 || size.height == 0 {
            return Ok(AppControl::Continue);
        }

        let mut frame = match self.gpu.begin_frame() {
            Ok(f) => f,
            Err(err) => {
                return Ok(match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => AppControl::Exit,
                    _ => AppControl::Continue,
                });
            }
        };

        let driver = self.gpu.driver().clone();
        if let Err(err) = draw((size.width, size.height)) {
            driver.discard_pending();
            return Err(err).context("frame draw failed");
        }

        driver.flush(&mut frame.encoder, &frame.view, (size.width, size.height));

        self.window.window.pre_present_notify();
        self.gpu.submit(frame);

        Ok(AppControl::Continue)
    }
}
