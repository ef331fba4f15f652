//! Render context: one shader program and the resources drawn through it.
//!
//! Lifecycle:
//! 1. create (allocates the program)
//! 2. register shaders, buffers and textures in any order
//! 3. [`RenderContext::compile`] once: attach, link, cache every active uniform
//!    location, point texture uniforms at their units and release shader handles.
//!    A failed compile leaves the shaders held so it can be retried
//! 4. [`RenderContext::activate`] and [`RenderContext::render`] every frame
//!
//! Dropping the context deletes the program and every resource it owns.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use crate::error::{GfxError, Result};
use crate::gfx::buffer::BufferObject;
use crate::gfx::driver::{
    truncate_log, DriverError, ProgramId, SharedDriver, UniformLocation, MAX_TEXTURE_UNIT,
};
use crate::gfx::shader::ShaderUnit;
use crate::gfx::texture::TextureUnit;
use crate::gfx::uniform::{UniformElement, UniformShape, UniformValue};

/// A texture bound to a sampler uniform through a fixed texture unit.
#[derive(Debug)]
pub struct BoundTexture {
    unit: u32,
    texture: TextureUnit,
    uniform_name: String,
}

impl BoundTexture {
    pub fn unit(&self) -> u32 {
        self.unit
    }

    pub fn texture(&self) -> &TextureUnit {
        &self.texture
    }

    pub fn uniform_name(&self) -> &str {
        &self.uniform_name
    }
}

pub struct RenderContext {
    driver: SharedDriver,
    program: ProgramId,
    compiled: bool,
    linked: bool,
    attached: usize,
    buffers: Vec<BufferObject>,
    shaders: Vec<ShaderUnit>,
    textures: Vec<BoundTexture>,
    next_unit: u32,
    locations: HashMap<String, UniformLocation>,
}

impl RenderContext {
    pub fn new(driver: &SharedDriver) -> Result<Self> {
        let program = driver
            .create_program()
            .map_err(|e| GfxError::ResourceCreation {
                what: "program",
                reason: e.to_string(),
            })?;
        log::debug!("create_program() = {program}");

        Ok(Self {
            driver: driver.clone(),
            program,
            compiled: false,
            linked: false,
            attached: 0,
            buffers: Vec::new(),
            shaders: Vec::new(),
            textures: Vec::new(),
            next_unit: 0,
            locations: HashMap::new(),
        })
    }

    // ── registration ─────────────────────────────────────────────────────

    /// Takes ownership of a compiled shader stage. Paths must be unique.
    pub fn add_shader(&mut self, shader: ShaderUnit) -> Result<()> {
        if self.shaders.iter().any(|s| s.path() == shader.path()) {
            return Err(GfxError::DuplicateShaderPath {
                path: shader.path().to_path_buf(),
            });
        }
        log::debug!(
            "added shader '{}' to program {}",
            shader.path().display(),
            self.program
        );
        self.shaders.push(shader);
        Ok(())
    }

    /// Takes ownership of a buffer. Buffers draw in registration order.
    pub fn add_buffer(&mut self, buffer: BufferObject) {
        log::debug!("added {buffer:?} to program {}", self.program);
        self.buffers.push(buffer);
    }

    /// Binds `texture` to the sampler uniform `uniform_name` on the next free
    /// texture unit, which is returned. Units are never reused.
    pub fn add_texture(&mut self, texture: TextureUnit, uniform_name: impl Into<String>) -> Result<u32> {
        let unit = self.next_unit;
        self.bind_texture_at(texture, uniform_name.into(), unit)?;
        self.next_unit += 1;
        Ok(unit)
    }

    fn bind_texture_at(&mut self, texture: TextureUnit, uniform_name: String, unit: u32) -> Result<()> {
        if unit > MAX_TEXTURE_UNIT {
            return Err(GfxError::TooManyTextureUnits {
                unit,
                max: MAX_TEXTURE_UNIT,
            });
        }
        for bound in &self.textures {
            if bound.unit == unit {
                return Err(GfxError::DuplicateTextureUnit { unit });
            }
            if bound.uniform_name == uniform_name {
                return Err(GfxError::DuplicateUniformName { name: uniform_name });
            }
        }
        log::debug!(
            "texture '{}' -> unit {unit} ('{uniform_name}')",
            texture.path().display()
        );
        self.textures.push(BoundTexture {
            unit,
            texture,
            uniform_name,
        });
        Ok(())
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Links the registered shaders into the program. Succeeds once.
    ///
    /// Shader handles are released and locations cached only when every step
    /// succeeds. After a failure past the link the program stays linked and a
    /// retry only repeats the uniform setup.
    pub fn compile(&mut self) -> Result<()> {
        if self.compiled {
            return Err(GfxError::AlreadyCompiled);
        }
        if self.buffers.is_empty() || self.shaders.is_empty() {
            return Err(GfxError::NothingToCompile);
        }
        let started = Instant::now();

        if !self.linked || self.attached < self.shaders.len() {
            self.link()?;
        }

        let mut locations = HashMap::new();
        for name in self.driver.active_uniforms(self.program) {
            if let Some(location) = self.driver.uniform_location(self.program, &name) {
                log::debug!("uniform '{name}' -> {location}");
                locations.insert(name, location);
            }
        }

        for bound in &self.textures {
            let location = locations.get(&bound.uniform_name).copied().ok_or_else(|| {
                GfxError::UniformNotFound {
                    name: bound.uniform_name.clone(),
                }
            })?;
            log::debug!("setting uniform '{}' to unit {}", bound.uniform_name, bound.unit);
            self.driver
                .set_uniform(self.program, location, &UniformValue::int(bound.unit as i32))?;
        }

        for shader in &mut self.shaders {
            shader.release();
        }
        self.locations = locations;
        self.compiled = true;
        log::info!(
            "program {} compiled: {} shaders, {} buffers, {} textures in {}us",
            self.program,
            self.shaders.len(),
            self.buffers.len(),
            self.textures.len(),
            started.elapsed().as_micros()
        );
        Ok(())
    }

    /// Attaches the shaders added since the last call, then links.
    fn link(&mut self) -> Result<()> {
        for shader in &self.shaders[self.attached..] {
            let Some(handle) = shader.handle() else {
                return Err(DriverError::InvalidOperation(format!(
                    "shader '{}' was already released",
                    shader.path().display()
                ))
                .into());
            };
            log::debug!("attach_shader({}, {handle})", self.program);
            self.driver.attach_shader(self.program, handle)?;
            self.attached += 1;
        }

        self.linked = false;
        log::debug!("link_program({})", self.program);
        match self.driver.link_program(self.program) {
            Ok(()) => {}
            Err(DriverError::Link { log }) => {
                let err = GfxError::ProgramLinkFailed {
                    log: truncate_log(log),
                };
                log::error!("{err}");
                return Err(err);
            }
            Err(other) => return Err(other.into()),
        }
        self.linked = true;
        Ok(())
    }

    /// Makes the program current and binds every texture to its unit.
    pub fn activate(&self) -> Result<()> {
        if !self.compiled {
            return Err(GfxError::NotCompiled);
        }
        self.driver.use_program(self.program)?;
        for bound in &self.textures {
            self.driver.bind_texture(bound.unit, bound.texture.handle())?;
        }
        Ok(())
    }

    /// Binds and draws every buffer in registration order.
    pub fn render(&self) -> Result<()> {
        if !self.compiled {
            return Err(GfxError::NotCompiled);
        }
        for buffer in &self.buffers {
            buffer.bind()?;
            buffer.draw()?;
        }
        Ok(())
    }

    // ── uniforms ─────────────────────────────────────────────────────────

    /// Location of an active uniform, as cached by [`compile`](Self::compile).
    ///
    /// Names missing from the cache, such as `var.member` paths into a uniform
    /// struct, are asked of the driver.
    pub fn uniform(&self, name: &str) -> Result<UniformLocation> {
        if !self.compiled {
            return Err(GfxError::NotCompiled);
        }
        if let Some(location) = self.locations.get(name) {
            return Ok(*location);
        }
        self.driver
            .uniform_location(self.program, name)
            .ok_or_else(|| GfxError::UniformNotFound {
                name: name.to_string(),
            })
    }

    pub fn set_bool(&self, name: &str, value: bool) -> Result<()> {
        self.upload(name, &UniformValue::int(i32::from(value)))
    }

    pub fn set_int(&self, name: &str, value: i32) -> Result<()> {
        self.upload(name, &UniformValue::int(value))
    }

    pub fn set_uint(&self, name: &str, value: u32) -> Result<()> {
        self.upload(name, &UniformValue::uint(value))
    }

    pub fn set_float(&self, name: &str, value: f32) -> Result<()> {
        self.upload(name, &UniformValue::float(value))
    }

    /// Uploads a 1 to 4 component vector of `f32`, `i32` or `u32`.
    pub fn set_vector<T: UniformElement>(&self, name: &str, values: &[T]) -> Result<()> {
        let value = UniformValue::new(UniformShape::Vector(values.len()), values)?;
        self.upload(name, &value)
    }

    /// Uploads a column-major `dimension` x `dimension` matrix.
    pub fn set_matrix<T: UniformElement>(&self, name: &str, values: &[T], dimension: usize) -> Result<()> {
        let value = UniformValue::new(UniformShape::Matrix(dimension), values)?;
        self.upload(name, &value)
    }

    pub fn set_mat4(&self, name: &str, matrix: &glam::Mat4) -> Result<()> {
        self.upload(name, &UniformValue::mat4(matrix))
    }

    pub fn set_vec3(&self, name: &str, v: glam::Vec3) -> Result<()> {
        self.set_vector(name, &v.to_array())
    }

    pub fn set_vec4(&self, name: &str, v: glam::Vec4) -> Result<()> {
        self.set_vector(name, &v.to_array())
    }

    fn upload(&self, name: &str, value: &UniformValue) -> Result<()> {
        let location = self.uniform(name)?;
        self.driver
            .set_uniform(self.program, location, value)
            .map_err(|e| match e {
                DriverError::TypeMismatch { declared, given } => GfxError::UniformTypeMismatch {
                    name: name.to_string(),
                    declared,
                    given: given.to_string(),
                },
                other => other.into(),
            })
    }

    // ── accessors ────────────────────────────────────────────────────────

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn buffers(&self) -> &[BufferObject] {
        &self.buffers
    }

    pub fn shaders(&self) -> &[ShaderUnit] {
        &self.shaders
    }

    pub fn textures(&self) -> &[BoundTexture] {
        &self.textures
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        log::debug!("delete_program({})", self.program);
        self.driver.delete_program(self.program);
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("program", &self.program)
            .field("compiled", &self.compiled)
            .field("buffers", &self.buffers.len())
            .field("shaders", &self.shaders.len())
            .field("textures", &self.textures)
            .finish()
    }
}
