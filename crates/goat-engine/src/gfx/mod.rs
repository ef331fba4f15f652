//! GPU resources and the render context that draws with them.

pub mod buffer;
pub mod context;
pub mod driver;
pub mod shader;
pub mod texture;
pub mod uniform;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffer::{AttributeBound, BufferObject};
pub use context::{BoundTexture, RenderContext};
pub use driver::{
    DataKind, DrawMode, Driver, HeadlessDriver, RenderSettings, ShaderStage, SharedDriver,
    WgpuDriver,
};
pub use shader::ShaderUnit;
pub use texture::{TextureOptions, TextureUnit};
pub use uniform::{ElementType, UniformKind, UniformShape, UniformValue};
