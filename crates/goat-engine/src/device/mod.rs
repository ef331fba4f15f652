//! GPU device + surface management.
//!
//! Creates the wgpu adapter, device and surface for a window, hands the device
//! to a shared [`WgpuDriver`](crate::gfx::WgpuDriver), and acquires frames.

mod gpu;
mod init;
mod surface;

pub use gpu::{Gpu, GpuFrame};
pub use init::GpuInit;
pub use surface::SurfaceErrorAction;
