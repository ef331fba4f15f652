//! Error types for the rendering core.
//!
//! Every failure in `gfx` and `world` is reported through [`GfxError`]. None of
//! them are retried locally; they propagate to the frame-loop driver, which logs
//! them and terminates.

use std::path::PathBuf;

use thiserror::Error;

use crate::gfx::driver::DriverError;

/// Convenience alias used by the rendering core.
pub type Result<T> = std::result::Result<T, GfxError>;

#[derive(Error, Debug)]
pub enum GfxError {
    // ── resource creation ────────────────────────────────────────────────
    /// The driver could not allocate a GPU object.
    #[error("failed to create GPU {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    /// Any other driver-side failure that is not part of the taxonomy below.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    // ── shaders and programs ─────────────────────────────────────────────
    /// A source file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A shader source file exists but holds no text.
    #[error("shader '{}' is empty", path.display())]
    EmptySource { path: PathBuf },

    /// The shader compiler rejected a stage. `log` is the truncated diagnostic.
    #[error("[shader] [{}] failed to compile: {log}", path.display())]
    ShaderCompilationFailed { path: PathBuf, log: String },

    /// Program linking failed. `log` is the truncated diagnostic.
    #[error("failed to link shader program: {log}")]
    ProgramLinkFailed { log: String },

    // ── registration conflicts ───────────────────────────────────────────
    #[error("shader '{}' is already attached to this render context", path.display())]
    DuplicateShaderPath { path: PathBuf },

    #[error("a texture is already bound to unit {unit}")]
    DuplicateTextureUnit { unit: u32 },

    #[error("a texture is already bound to uniform '{name}'")]
    DuplicateUniformName { name: String },

    #[error("texture unit {unit} exceeds the highest addressable unit ({max})")]
    TooManyTextureUnits { unit: u32, max: u32 },

    #[error("attribute slot {slot} is already bound")]
    DuplicateAttributeSlot { slot: u32 },

    // ── vertex data ──────────────────────────────────────────────────────
    #[error("no attribute bounds set")]
    NoAttributesRegistered,

    /// The uploaded element count is not a whole number of entries.
    #[error("{elements} elements do not divide into entries of {per_entry} elements")]
    MisalignedVertexData { elements: usize, per_entry: usize },

    // ── context lifecycle ────────────────────────────────────────────────
    #[error("render context needs at least one buffer and one shader to compile")]
    NothingToCompile,

    #[error("render context is already compiled")]
    AlreadyCompiled,

    #[error("render context has not been compiled")]
    NotCompiled,

    // ── uniforms ─────────────────────────────────────────────────────────
    #[error("uniform of name '{name}' was not found")]
    UniformNotFound { name: String },

    #[error("unsupported uniform type: {0}")]
    UnsupportedUniformType(String),

    #[error("uniform '{name}' is declared as {declared} but was set as {given}")]
    UniformTypeMismatch {
        name: String,
        declared: String,
        given: String,
    },

    // ── textures ─────────────────────────────────────────────────────────
    #[error("texture '{}' has an unsupported pixel layout: {detail}", path.display())]
    UnsupportedTextureFormat { path: PathBuf, detail: String },

    #[error("failed to decode texture '{}': {source}", path.display())]
    TextureDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
