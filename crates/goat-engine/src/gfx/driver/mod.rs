//! GPU driver seam.
//!
//! Everything above this module talks to the GPU through [`Driver`]: a small,
//! handle-based, GL-shaped interface in direct-state-access style. Two
//! implementations ship:
//! - [`HeadlessDriver`] records every call and needs no GPU
//! - [`WgpuDriver`] maps the program/uniform model onto wgpu
//!
//! Drivers are shared as `Rc<dyn Driver>`; all rendering is single-threaded.

mod handles;
mod headless;
pub mod reflect;
mod wgpu_driver;

use std::rc::Rc;

use thiserror::Error;

use crate::gfx::uniform::{UniformKind, UniformValue};

pub use handles::{BufferId, ProgramId, ShaderId, TextureId, UniformLocation, VertexArrayId};
pub use headless::{GpuCall, HeadlessDriver, DEFAULT_CALL_LIMIT};
pub use wgpu_driver::{RenderSettings, WgpuDriver};

/// Shared driver handle.
pub type SharedDriver = Rc<dyn Driver>;

/// Pipeline stage a shader unit compiles for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// WGSL entry point attribute for this stage.
    pub fn attribute(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "@vertex",
            ShaderStage::Fragment => "@fragment",
        }
    }
}

/// Element type of interleaved vertex data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DataKind {
    Float,
    Int,
    UnsignedInt,
}

impl DataKind {
    /// Byte size of one element.
    pub const fn byte_size(self) -> usize {
        4
    }
}

/// Upload usage hint.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DrawMode {
    Static,
    Dynamic,
}

/// What a buffer upload is bound as.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Primitive topology for draw calls.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    Triangles,
}

/// One vertex attribute pointer, as recorded into a vertex array.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttribPointer {
    pub location: u32,
    pub components: u32,
    pub kind: DataKind,
    pub stride: u32,
    pub offset: u32,
}

/// Decoded RGBA8 (sRGB) pixels with an optional mip chain.
///
/// `levels[0]` is the full-size image; each further level halves both sides
/// (minimum 1).
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub levels: Vec<Vec<u8>>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// The shader compiler rejected the source.
    #[error("{log}")]
    Compile { log: String },

    /// The program failed to link.
    #[error("{log}")]
    Link { log: String },

    #[error("unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("uniform declared as {declared}, set as {given}")]
    TypeMismatch { declared: String, given: UniformKind },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("allocation failed: {0}")]
    Allocation(String),
}

/// GL-shaped GPU interface.
///
/// Draws use the program most recently passed to [`Driver::use_program`] and
/// the most recently bound vertex array and textures, like GL. Everything else
/// names the object it acts on.
pub trait Driver {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    // ── shaders ──────────────────────────────────────────────────────────
    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderId, DriverError>;
    fn compile_shader(&self, shader: ShaderId, source: &str) -> Result<(), DriverError>;
    fn delete_shader(&self, shader: ShaderId);

    // ── programs ─────────────────────────────────────────────────────────
    fn create_program(&self) -> Result<ProgramId, DriverError>;
    fn attach_shader(&self, program: ProgramId, shader: ShaderId) -> Result<(), DriverError>;
    fn link_program(&self, program: ProgramId) -> Result<(), DriverError>;
    fn delete_program(&self, program: ProgramId);
    fn use_program(&self, program: ProgramId) -> Result<(), DriverError>;

    /// Names of every uniform the linked program declares.
    fn active_uniforms(&self, program: ProgramId) -> Vec<String>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    /// Writes a uniform of `program` without making it current.
    fn set_uniform(
        &self,
        program: ProgramId,
        location: UniformLocation,
        value: &UniformValue,
    ) -> Result<(), DriverError>;

    // ── vertex data ──────────────────────────────────────────────────────
    fn create_vertex_array(&self) -> Result<VertexArrayId, DriverError>;
    fn delete_vertex_array(&self, vao: VertexArrayId);
    fn bind_vertex_array(&self, vao: VertexArrayId) -> Result<(), DriverError>;

    fn create_buffer(&self) -> Result<BufferId, DriverError>;
    fn delete_buffer(&self, buffer: BufferId);
    fn buffer_data(
        &self,
        buffer: BufferId,
        target: BufferTarget,
        bytes: &[u8],
        mode: DrawMode,
    ) -> Result<(), DriverError>;

    fn vertex_attrib_pointer(
        &self,
        vao: VertexArrayId,
        buffer: BufferId,
        attrib: &VertexAttribPointer,
    ) -> Result<(), DriverError>;
    fn enable_vertex_attrib(&self, vao: VertexArrayId, location: u32) -> Result<(), DriverError>;
    fn element_buffer(&self, vao: VertexArrayId, buffer: BufferId) -> Result<(), DriverError>;

    fn draw_arrays(&self, topology: Topology, first: u32, count: u32) -> Result<(), DriverError>;
    /// Draws `count` `u32` indices from the bound vertex array's element buffer.
    fn draw_elements(&self, topology: Topology, count: u32) -> Result<(), DriverError>;

    // ── textures ─────────────────────────────────────────────────────────
    fn create_texture(&self, label: &str, image: &TextureImage) -> Result<TextureId, DriverError>;
    fn delete_texture(&self, texture: TextureId);
    fn bind_texture(&self, unit: u32, texture: TextureId) -> Result<(), DriverError>;
}

/// Highest texture unit index a driver must accept.
pub const MAX_TEXTURE_UNIT: u32 = 31;

/// Conventional size of a driver diagnostic buffer.
pub const INFO_LOG_CAPACITY: usize = 512;

/// Truncates a diagnostic log to [`INFO_LOG_CAPACITY`] bytes on a char boundary.
pub fn truncate_log(mut log: String) -> String {
    if log.len() > INFO_LOG_CAPACITY {
        let mut cut = INFO_LOG_CAPACITY;
        while !log.is_char_boundary(cut) {
            cut -= 1;
        }
        log.truncate(cut);
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_log_keeps_short_logs() {
        assert_eq!(truncate_log("bad token".into()), "bad token");
    }

    #[test]
    fn truncate_log_cuts_on_char_boundary() {
        let log = "é".repeat(400);
        let cut = truncate_log(log);
        assert!(cut.len() <= INFO_LOG_CAPACITY);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
