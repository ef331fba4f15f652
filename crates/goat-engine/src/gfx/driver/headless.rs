//! A driver that records instead of rendering.
//!
//! Handles are real (monotonic, validated on use), shaders go through the same
//! WGSL reflection as the GPU backend, and every call lands in an ordered log
//! that tests can inspect.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use super::handles::HandleCounter;
use super::reflect::{self, ProgramLayout, ShaderReflection};
use super::{
    BufferId, BufferTarget, DrawMode, Driver, DriverError, ProgramId, ShaderId, ShaderStage,
    TextureId, TextureImage, Topology, UniformLocation, VertexArrayId, VertexAttribPointer,
    MAX_TEXTURE_UNIT,
};
use crate::gfx::uniform::UniformValue;

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateShader(ShaderId, ShaderStage),
    CompileShader(ShaderId),
    DeleteShader(ShaderId),
    CreateProgram(ProgramId),
    AttachShader(ProgramId, ShaderId),
    LinkProgram(ProgramId),
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    GetUniformLocation {
        program: ProgramId,
        name: String,
    },
    SetUniform {
        program: ProgramId,
        name: String,
        value: UniformValue,
    },
    CreateVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    BindVertexArray(VertexArrayId),
    CreateBuffer(BufferId),
    DeleteBuffer(BufferId),
    BufferData {
        buffer: BufferId,
        target: BufferTarget,
        len: usize,
        mode: DrawMode,
    },
    VertexAttribPointer {
        vao: VertexArrayId,
        buffer: BufferId,
        attrib: VertexAttribPointer,
    },
    EnableVertexAttrib {
        vao: VertexArrayId,
        location: u32,
    },
    ElementBuffer {
        vao: VertexArrayId,
        buffer: BufferId,
    },
    DrawArrays {
        first: u32,
        count: u32,
    },
    DrawElements {
        count: u32,
    },
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
        levels: usize,
    },
    DeleteTexture(TextureId),
    BindTexture {
        unit: u32,
        texture: TextureId,
    },
}

impl GpuCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCall::DrawArrays { .. } | GpuCall::DrawElements { .. })
    }
}

struct ShaderEntry {
    stage: ShaderStage,
    reflection: Option<ShaderReflection>,
}

#[derive(Default)]
struct ProgramEntry {
    attached: Vec<ShaderId>,
    layout: Option<ProgramLayout>,
}

#[derive(Default)]
struct VaoEntry {
    element_buffer: Option<BufferId>,
    enabled: HashSet<u32>,
}

#[derive(Default)]
struct State {
    shaders: HashMap<ShaderId, ShaderEntry>,
    programs: HashMap<ProgramId, ProgramEntry>,
    vaos: HashMap<VertexArrayId, VaoEntry>,
    buffers: HashMap<BufferId, usize>,
    textures: HashMap<TextureId, (u32, u32)>,
    current_program: Option<ProgramId>,
    bound_vao: Option<VertexArrayId>,
    calls: VecDeque<GpuCall>,
    call_limit: usize,
}

impl State {
    fn log(&mut self, call: GpuCall) {
        if self.calls.len() == self.call_limit {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// Calls kept by [`HeadlessDriver::new`] before the oldest are dropped.
pub const DEFAULT_CALL_LIMIT: usize = 1 << 16;

/// GPU-less [`Driver`] with an inspectable call log.
///
/// The log keeps at most `call_limit` entries and drops the oldest first.
/// A long dry-run loop should still call [`clear_calls`](Self::clear_calls)
/// once per frame so per-frame assertions only see that frame.
pub struct HeadlessDriver {
    ids: HandleCounter,
    state: RefCell<State>,
    fail_allocations: Cell<bool>,
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::with_call_limit(DEFAULT_CALL_LIMIT)
    }
}

impl HeadlessDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver whose call log holds at most `limit` calls (at least one).
    pub fn with_call_limit(limit: usize) -> Self {
        Self {
            ids: HandleCounter::default(),
            state: RefCell::new(State {
                call_limit: limit.max(1),
                ..State::default()
            }),
            fail_allocations: Cell::new(false),
        }
    }

    /// The most recent calls since creation or the last
    /// [`clear_calls`](Self::clear_calls), oldest first.
    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.borrow().calls.iter().cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn draw_count(&self) -> usize {
        self.state.borrow().calls.iter().filter(|c| c.is_draw()).count()
    }

    /// Values written to the uniform `name`, in call order.
    pub fn uniform_writes(&self, name: &str) -> Vec<UniformValue> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                GpuCall::SetUniform { name: n, value, .. } if n == name => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of GPU objects not yet deleted.
    pub fn live_objects(&self) -> usize {
        let s = self.state.borrow();
        s.shaders.len() + s.programs.len() + s.vaos.len() + s.buffers.len() + s.textures.len()
    }

    pub fn is_live_program(&self, program: ProgramId) -> bool {
        self.state.borrow().programs.contains_key(&program)
    }

    pub fn is_live_shader(&self, shader: ShaderId) -> bool {
        self.state.borrow().shaders.contains_key(&shader)
    }

    /// Byte length of the last upload into `buffer`.
    pub fn buffer_len(&self, buffer: BufferId) -> Option<usize> {
        self.state.borrow().buffers.get(&buffer).copied()
    }

    /// Enabled attribute locations of `vao`, sorted.
    pub fn enabled_attributes(&self, vao: VertexArrayId) -> Vec<u32> {
        let s = self.state.borrow();
        let mut locations: Vec<u32> = s
            .vaos
            .get(&vao)
            .map(|v| v.enabled.iter().copied().collect())
            .unwrap_or_default();
        locations.sort_unstable();
        locations
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.state.borrow().textures.get(&texture).copied()
    }

    /// Makes every subsequent `create_*` call fail, like an exhausted driver.
    pub fn fail_allocations(&self, fail: bool) {
        self.fail_allocations.set(fail);
    }

    fn allocate(&self, what: &str) -> Result<u32, DriverError> {
        if self.fail_allocations.get() {
            return Err(DriverError::Allocation(format!("out of {what} handles")));
        }
        Ok(self.ids.next())
    }

    fn record(&self, call: GpuCall) {
        self.state.borrow_mut().log(call);
    }
}

fn invalid<T>(kind: &'static str, id: u32) -> Result<T, DriverError> {
    Err(DriverError::InvalidHandle { kind, id })
}

impl Driver for HeadlessDriver {
    fn name(&self) -> &'static str {
        "headless"
    }

    // ── shaders ──────────────────────────────────────────────────────────

    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderId, DriverError> {
        let id = ShaderId(self.allocate("shader")?);
        self.state.borrow_mut().shaders.insert(
            id,
            ShaderEntry {
                stage,
                reflection: None,
            },
        );
        self.record(GpuCall::CreateShader(id, stage));
        Ok(id)
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> Result<(), DriverError> {
        self.record(GpuCall::CompileShader(shader));
        let mut s = self.state.borrow_mut();
        let Some(entry) = s.shaders.get_mut(&shader) else {
            return invalid(ShaderId::KIND, shader.0);
        };
        let reflection =
            reflect::reflect(entry.stage, source).map_err(|log| DriverError::Compile { log })?;
        entry.reflection = Some(reflection);
        Ok(())
    }

    fn delete_shader(&self, shader: ShaderId) {
        self.state.borrow_mut().shaders.remove(&shader);
        self.record(GpuCall::DeleteShader(shader));
    }

    // ── programs ─────────────────────────────────────────────────────────

    fn create_program(&self) -> Result<ProgramId, DriverError> {
        let id = ProgramId(self.allocate("program")?);
        self.state
            .borrow_mut()
            .programs
            .insert(id, ProgramEntry::default());
        self.record(GpuCall::CreateProgram(id));
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) -> Result<(), DriverError> {
        {
            let mut s = self.state.borrow_mut();
            if !s.shaders.contains_key(&shader) {
                return invalid(ShaderId::KIND, shader.0);
            }
            let Some(p) = s.programs.get_mut(&program) else {
                return invalid(ProgramId::KIND, program.0);
            };
            if p.attached.contains(&shader) {
                return Err(DriverError::InvalidOperation(format!(
                    "{shader:?} is already attached to {program:?}"
                )));
            }
            p.attached.push(shader);
        }
        self.record(GpuCall::AttachShader(program, shader));
        Ok(())
    }

    fn link_program(&self, program: ProgramId) -> Result<(), DriverError> {
        self.record(GpuCall::LinkProgram(program));
        let mut s = self.state.borrow_mut();
        let State {
            shaders, programs, ..
        } = &mut *s;
        let Some(p) = programs.get_mut(&program) else {
            return invalid(ProgramId::KIND, program.0);
        };

        let mut stages = Vec::with_capacity(p.attached.len());
        for id in &p.attached {
            match shaders.get(id).and_then(|e| e.reflection.as_ref()) {
                Some(r) => stages.push(r),
                None => {
                    return Err(DriverError::Link {
                        log: format!("{id:?} is not a compiled shader"),
                    });
                }
            }
        }
        let layout = reflect::link(&stages).map_err(|log| DriverError::Link { log })?;
        p.layout = Some(layout);
        Ok(())
    }

    fn delete_program(&self, program: ProgramId) {
        let mut s = self.state.borrow_mut();
        s.programs.remove(&program);
        if s.current_program == Some(program) {
            s.current_program = None;
        }
        s.log(GpuCall::DeleteProgram(program));
    }

    fn use_program(&self, program: ProgramId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        match s.programs.get(&program) {
            None => return invalid(ProgramId::KIND, program.0),
            Some(p) if p.layout.is_none() => {
                return Err(DriverError::InvalidOperation(format!(
                    "{program:?} is not linked"
                )));
            }
            Some(_) => {}
        }
        s.current_program = Some(program);
        s.log(GpuCall::UseProgram(program));
        Ok(())
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<String> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.layout.as_ref())
            .map(ProgramLayout::active_names)
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.record(GpuCall::GetUniformLocation {
            program,
            name: name.to_string(),
        });
        let s = self.state.borrow();
        let layout = s.programs.get(&program)?.layout.as_ref()?;
        layout.find(name).map(|slot| UniformLocation(slot as u32))
    }

    fn set_uniform(
        &self,
        program: ProgramId,
        location: UniformLocation,
        value: &UniformValue,
    ) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        let Some(layout) = s.programs.get(&program).and_then(|p| p.layout.as_ref()) else {
            return invalid(ProgramId::KIND, program.0);
        };
        let slot = location.0 as usize;
        layout.accepts(slot, value.kind)?;
        let name = layout.uniforms[slot].name.clone();

        s.log(GpuCall::SetUniform {
            program,
            name,
            value: value.clone(),
        });
        Ok(())
    }

    // ── vertex data ──────────────────────────────────────────────────────

    fn create_vertex_array(&self) -> Result<VertexArrayId, DriverError> {
        let id = VertexArrayId(self.allocate("vertex array")?);
        self.state.borrow_mut().vaos.insert(id, VaoEntry::default());
        self.record(GpuCall::CreateVertexArray(id));
        Ok(id)
    }

    fn delete_vertex_array(&self, vao: VertexArrayId) {
        let mut s = self.state.borrow_mut();
        s.vaos.remove(&vao);
        if s.bound_vao == Some(vao) {
            s.bound_vao = None;
        }
        s.log(GpuCall::DeleteVertexArray(vao));
    }

    fn bind_vertex_array(&self, vao: VertexArrayId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        if !s.vaos.contains_key(&vao) {
            return invalid(VertexArrayId::KIND, vao.0);
        }
        s.bound_vao = Some(vao);
        s.log(GpuCall::BindVertexArray(vao));
        Ok(())
    }

    fn create_buffer(&self) -> Result<BufferId, DriverError> {
        let id = BufferId(self.allocate("buffer")?);
        self.state.borrow_mut().buffers.insert(id, 0);
        self.record(GpuCall::CreateBuffer(id));
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.state.borrow_mut().buffers.remove(&buffer);
        self.record(GpuCall::DeleteBuffer(buffer));
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        target: BufferTarget,
        bytes: &[u8],
        mode: DrawMode,
    ) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        let Some(len) = s.buffers.get_mut(&buffer) else {
            return invalid(BufferId::KIND, buffer.0);
        };
        *len = bytes.len();
        s.log(GpuCall::BufferData {
            buffer,
            target,
            len: bytes.len(),
            mode,
        });
        Ok(())
    }

    fn vertex_attrib_pointer(
        &self,
        vao: VertexArrayId,
        buffer: BufferId,
        attrib: &VertexAttribPointer,
    ) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        if !s.buffers.contains_key(&buffer) {
            return invalid(BufferId::KIND, buffer.0);
        }
        if !s.vaos.contains_key(&vao) {
            return invalid(VertexArrayId::KIND, vao.0);
        }
        if !(1..=4).contains(&attrib.components) {
            return Err(DriverError::InvalidOperation(format!(
                "attribute {} has {} components",
                attrib.location, attrib.components
            )));
        }
        s.log(GpuCall::VertexAttribPointer {
            vao,
            buffer,
            attrib: *attrib,
        });
        Ok(())
    }

    fn enable_vertex_attrib(&self, vao: VertexArrayId, location: u32) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        let Some(entry) = s.vaos.get_mut(&vao) else {
            return invalid(VertexArrayId::KIND, vao.0);
        };
        entry.enabled.insert(location);
        s.log(GpuCall::EnableVertexAttrib { vao, location });
        Ok(())
    }

    fn element_buffer(&self, vao: VertexArrayId, buffer: BufferId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        if !s.buffers.contains_key(&buffer) {
            return invalid(BufferId::KIND, buffer.0);
        }
        let Some(entry) = s.vaos.get_mut(&vao) else {
            return invalid(VertexArrayId::KIND, vao.0);
        };
        entry.element_buffer = Some(buffer);
        s.log(GpuCall::ElementBuffer { vao, buffer });
        Ok(())
    }

    fn draw_arrays(&self, topology: Topology, first: u32, count: u32) -> Result<(), DriverError> {
        let Topology::Triangles = topology;
        let mut s = self.state.borrow_mut();
        if s.current_program.is_none() || s.bound_vao.is_none() {
            return Err(DriverError::InvalidOperation(
                "draw without a program and vertex array bound".into(),
            ));
        }
        s.log(GpuCall::DrawArrays { first, count });
        Ok(())
    }

    fn draw_elements(&self, topology: Topology, count: u32) -> Result<(), DriverError> {
        let Topology::Triangles = topology;
        let mut s = self.state.borrow_mut();
        let has_elements = s
            .bound_vao
            .and_then(|vao| s.vaos.get(&vao))
            .is_some_and(|v| v.element_buffer.is_some());
        if s.current_program.is_none() || !has_elements {
            return Err(DriverError::InvalidOperation(
                "indexed draw without a program and element buffer bound".into(),
            ));
        }
        s.log(GpuCall::DrawElements { count });
        Ok(())
    }

    // ── textures ─────────────────────────────────────────────────────────

    fn create_texture(&self, _label: &str, image: &TextureImage) -> Result<TextureId, DriverError> {
        if image.width == 0 || image.height == 0 || image.levels.is_empty() {
            return Err(DriverError::InvalidOperation(
                "texture must have a non-empty base level".into(),
            ));
        }
        let id = TextureId(self.allocate("texture")?);
        self.state
            .borrow_mut()
            .textures
            .insert(id, (image.width, image.height));
        self.record(GpuCall::CreateTexture {
            texture: id,
            width: image.width,
            height: image.height,
            levels: image.levels.len(),
        });
        Ok(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.state.borrow_mut().textures.remove(&texture);
        self.record(GpuCall::DeleteTexture(texture));
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        if unit > MAX_TEXTURE_UNIT {
            return Err(DriverError::InvalidOperation(format!(
                "texture unit {unit} out of range"
            )));
        }
        if !s.textures.contains_key(&texture) {
            return invalid(TextureId::KIND, texture.0);
        }
        s.log(GpuCall::BindTexture { unit, texture });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::uniform::UniformKind;

    const VERT: &str = r#"
struct Transforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    model: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> transforms: Transforms;

@vertex
fn main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
    return transforms.projection * transforms.view * transforms.model * vec4<f32>(pos, 1.0);
}
"#;

    const FRAG: &str = r#"
@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.5, 0.2, 1.0);
}
"#;

    fn linked(driver: &HeadlessDriver) -> ProgramId {
        let v = driver.create_shader(ShaderStage::Vertex).unwrap();
        driver.compile_shader(v, VERT).unwrap();
        let f = driver.create_shader(ShaderStage::Fragment).unwrap();
        driver.compile_shader(f, FRAG).unwrap();
        let p = driver.create_program().unwrap();
        driver.attach_shader(p, v).unwrap();
        driver.attach_shader(p, f).unwrap();
        driver.link_program(p).unwrap();
        p
    }

    // ── handles ──────────────────────────────────────────────────────────

    #[test]
    fn handles_are_unique_and_nonzero() {
        let d = HeadlessDriver::new();
        let a = d.create_buffer().unwrap();
        let b = d.create_buffer().unwrap();
        assert_ne!(a, b);
        assert_ne!(a.raw(), 0);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let d = HeadlessDriver::new();
        d.fail_allocations(true);
        assert!(matches!(d.create_program(), Err(DriverError::Allocation(_))));
    }

    #[test]
    fn deleted_objects_are_no_longer_live() {
        let d = HeadlessDriver::new();
        let vao = d.create_vertex_array().unwrap();
        assert_eq!(d.live_objects(), 1);
        d.delete_vertex_array(vao);
        assert_eq!(d.live_objects(), 0);
        assert!(d.bind_vertex_array(vao).is_err());
    }

    // ── programs ─────────────────────────────────────────────────────────

    #[test]
    fn compile_failure_returns_diagnostic() {
        let d = HeadlessDriver::new();
        let v = d.create_shader(ShaderStage::Vertex).unwrap();
        let err = d.compile_shader(v, "this is not wgsl").unwrap_err();
        assert!(matches!(err, DriverError::Compile { .. }));
    }

    #[test]
    fn link_without_fragment_stage_fails() {
        let d = HeadlessDriver::new();
        let v = d.create_shader(ShaderStage::Vertex).unwrap();
        d.compile_shader(v, VERT).unwrap();
        let p = d.create_program().unwrap();
        d.attach_shader(p, v).unwrap();
        assert!(matches!(d.link_program(p), Err(DriverError::Link { .. })));
    }

    #[test]
    fn use_program_requires_link() {
        let d = HeadlessDriver::new();
        let p = d.create_program().unwrap();
        assert!(d.use_program(p).is_err());
    }

    // ── uniforms ─────────────────────────────────────────────────────────

    #[test]
    fn uniform_writes_are_typed_and_logged() {
        let d = HeadlessDriver::new();
        let p = linked(&d);
        let model = d.uniform_location(p, "model").unwrap();
        d.set_uniform(p, model, &UniformValue::mat4(&glam::Mat4::IDENTITY))
            .unwrap();
        assert_eq!(d.uniform_writes("model").len(), 1);

        let err = d.set_uniform(p, model, &UniformValue::float(1.0)).unwrap_err();
        assert_eq!(
            err,
            DriverError::TypeMismatch {
                declared: "mat4x4<f32>".into(),
                given: UniformKind::Float
            }
        );
    }

    #[test]
    fn unknown_uniform_has_no_location() {
        let d = HeadlessDriver::new();
        let p = linked(&d);
        assert!(d.uniform_location(p, "missing").is_none());
        assert_eq!(d.active_uniforms(p), vec!["projection", "view", "model"]);
    }

    // ── call log ─────────────────────────────────────────────────────────

    #[test]
    fn call_log_keeps_only_the_newest_calls() {
        let d = HeadlessDriver::with_call_limit(4);
        let vao = d.create_vertex_array().unwrap();
        for _ in 0..10 {
            d.bind_vertex_array(vao).unwrap();
        }
        d.delete_vertex_array(vao);

        let calls = d.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.last(), Some(&GpuCall::DeleteVertexArray(vao)));
        assert!(calls[..3].iter().all(|c| *c == GpuCall::BindVertexArray(vao)));

        d.clear_calls();
        assert!(d.calls().is_empty());
    }

    // ── draws ────────────────────────────────────────────────────────────

    #[test]
    fn indexed_draw_needs_element_buffer() {
        let d = HeadlessDriver::new();
        let p = linked(&d);
        d.use_program(p).unwrap();
        let vao = d.create_vertex_array().unwrap();
        d.bind_vertex_array(vao).unwrap();
        assert!(d.draw_elements(Topology::Triangles, 3).is_err());

        let ebo = d.create_buffer().unwrap();
        d.element_buffer(vao, ebo).unwrap();
        d.draw_elements(Topology::Triangles, 3).unwrap();
        assert_eq!(d.draw_count(), 1);
    }
}
