//! wgpu backend for the GL-shaped [`Driver`].
//!
//! wgpu has no notion of a linked program with settable uniforms, so this
//! driver keeps one:
//! - a program is a pair of validated WGSL modules plus their merged reflection
//! - uniform writes land in a CPU shadow of each uniform block
//! - every draw snapshots the shadow into a per-frame uniform buffer at a
//!   dynamic offset, so consecutive draws can see different `model` matrices
//! - pipelines are built on first use per (program, vertex layout, format)
//!
//! Draws are recorded and replayed into a single render pass by [`WgpuDriver::flush`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroU64;
use std::rc::Rc;

use wgpu::util::DeviceExt;

use super::handles::HandleCounter;
use super::reflect::{self, ProgramLayout, ShaderReflection, SlotTarget};
use super::{
    BufferId, BufferTarget, DataKind, DrawMode, Driver, DriverError, ProgramId, ShaderId,
    ShaderStage, TextureId, TextureImage, Topology, UniformLocation, VertexArrayId,
    VertexAttribPointer, MAX_TEXTURE_UNIT,
};
use crate::gfx::uniform::{UniformData, UniformKind, UniformValue};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const TEXTURE_UNITS: usize = MAX_TEXTURE_UNIT as usize + 1;

/// Fixed-function state applied to every frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderSettings {
    pub clear_color: wgpu::Color,
    pub depth_test: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: wgpu::Color {
                r: 0.2,
                g: 0.3,
                b: 0.3,
                a: 1.0,
            },
            depth_test: true,
        }
    }
}

struct GpuShader {
    stage: ShaderStage,
    compiled: Option<(Rc<wgpu::ShaderModule>, ShaderReflection)>,
}

struct LinkedProgram {
    layout: ProgramLayout,
    vertex: Rc<wgpu::ShaderModule>,
    fragment: Rc<wgpu::ShaderModule>,
    bind_group_layout: Rc<wgpu::BindGroupLayout>,
    pipeline_layout: Rc<wgpu::PipelineLayout>,
    /// One byte image per uniform block.
    shadow: Vec<Vec<u8>>,
    /// Texture unit each texture binding samples from.
    units: Vec<u32>,
}

#[derive(Default)]
struct GpuProgram {
    attached: Vec<ShaderId>,
    linked: Option<LinkedProgram>,
}

#[derive(Default)]
struct GpuVao {
    attribs: BTreeMap<u32, (BufferId, VertexAttribPointer)>,
    enabled: HashSet<u32>,
    element: Option<BufferId>,
    generation: u64,
}

#[derive(Default)]
struct GpuBuffer {
    buffer: Option<Rc<wgpu::Buffer>>,
    usage: Option<BufferTarget>,
}

struct GpuTexture {
    view: Rc<wgpu::TextureView>,
    sampler: Rc<wgpu::Sampler>,
}

#[derive(Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    program: ProgramId,
    vao: VertexArrayId,
    generation: u64,
    format: wgpu::TextureFormat,
}

enum DrawKind {
    Arrays { first: u32, count: u32 },
    Elements { count: u32, index: Rc<wgpu::Buffer> },
}

struct RecordedDraw {
    pipeline: Rc<wgpu::RenderPipeline>,
    bind_group_layout: Rc<wgpu::BindGroupLayout>,
    blocks: Vec<(u32, u32)>,
    offsets: Vec<u32>,
    textures: Vec<(u32, Option<u32>, Rc<wgpu::TextureView>, Rc<wgpu::Sampler>)>,
    vertex_buffers: Vec<Rc<wgpu::Buffer>>,
    kind: DrawKind,
}

#[derive(Default)]
struct State {
    shaders: HashMap<ShaderId, GpuShader>,
    programs: HashMap<ProgramId, GpuProgram>,
    vaos: HashMap<VertexArrayId, GpuVao>,
    buffers: HashMap<BufferId, GpuBuffer>,
    textures: HashMap<TextureId, GpuTexture>,
    pipelines: HashMap<PipelineKey, Rc<wgpu::RenderPipeline>>,

    current_program: Option<ProgramId>,
    bound_vao: Option<VertexArrayId>,
    units: [Option<TextureId>; TEXTURE_UNITS],

    uniform_bytes: Vec<u8>,
    draws: Vec<RecordedDraw>,
    depth: Option<(wgpu::TextureView, (u32, u32))>,
}

/// [`Driver`] backed by a wgpu device.
pub struct WgpuDriver {
    device: wgpu::Device,
    queue: wgpu::Queue,
    settings: RenderSettings,
    surface_format: Cell<wgpu::TextureFormat>,
    uniform_alignment: usize,
    ids: HandleCounter,
    state: RefCell<State>,
}

impl WgpuDriver {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, settings: RenderSettings) -> Self {
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        Self {
            device,
            queue,
            settings,
            surface_format: Cell::new(wgpu::TextureFormat::Bgra8UnormSrgb),
            uniform_alignment: uniform_alignment.max(1),
            ids: HandleCounter::default(),
            state: RefCell::new(State::default()),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    /// Sets the color target format pipelines are built for.
    pub fn set_surface_format(&self, format: wgpu::TextureFormat) {
        if self.surface_format.replace(format) != format {
            self.state.borrow_mut().pipelines.clear();
        }
    }

    /// Draw calls recorded since the last flush.
    pub fn pending_draws(&self) -> usize {
        self.state.borrow().draws.len()
    }

    /// Drops draws recorded for a frame that will not be presented.
    pub fn discard_pending(&self) {
        let mut s = self.state.borrow_mut();
        s.draws.clear();
        s.uniform_bytes.clear();
    }

    /// Replays the recorded draws into one render pass targeting `view`.
    ///
    /// The pass always clears, so a frame with no draws shows the clear color.
    pub fn flush(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        size: (u32, u32),
    ) {
        let mut s = self.state.borrow_mut();
        let draws = std::mem::take(&mut s.draws);
        let bytes = std::mem::take(&mut s.uniform_bytes);

        if self.settings.depth_test && s.depth.as_ref().is_none_or(|(_, sz)| *sz != size) {
            s.depth = Some((self.create_depth(size), size));
        }

        let ubo = (!bytes.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("goat frame uniforms"),
                    contents: &bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let bind_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|d| self.bind_group_for(d, ubo.as_ref()))
            .collect();

        let depth_view = s.depth.as_ref().map(|(v, _)| v);
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("goat scene pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.settings.clear_color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth_view
                .filter(|_| self.settings.depth_test)
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for (draw, bind_group) in draws.iter().zip(&bind_groups) {
            rpass.set_pipeline(&draw.pipeline);
            rpass.set_bind_group(0, bind_group, &draw.offsets);
            for (slot, vb) in draw.vertex_buffers.iter().enumerate() {
                rpass.set_vertex_buffer(slot as u32, vb.slice(..));
            }
            match &draw.kind {
                DrawKind::Arrays { first, count } => rpass.draw(*first..first + count, 0..1),
                DrawKind::Elements { count, index } => {
                    rpass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(0..*count, 0, 0..1);
                }
            }
        }
    }

    fn create_depth(&self, (width, height): (u32, u32)) -> wgpu::TextureView {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("goat depth"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn bind_group_for(&self, draw: &RecordedDraw, ubo: Option<&wgpu::Buffer>) -> wgpu::BindGroup {
        let mut entries = Vec::new();
        if let Some(ubo) = ubo {
            for &(binding, size) in &draw.blocks {
                entries.push(wgpu::BindGroupEntry {
                    binding,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: ubo,
                        offset: 0,
                        size: NonZeroU64::new(u64::from(size)),
                    }),
                });
            }
        }
        for (binding, sampler_binding, view, sampler) in &draw.textures {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            if let Some(sb) = sampler_binding {
                entries.push(wgpu::BindGroupEntry {
                    binding: *sb,
                    resource: wgpu::BindingResource::Sampler(sampler),
                });
            }
        }
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("goat draw bind group"),
            layout: &draw.bind_group_layout,
            entries: &entries,
        })
    }

    fn link(&self, attached: &[ShaderId], shaders: &HashMap<ShaderId, GpuShader>)
        -> Result<LinkedProgram, DriverError>
    {
        let mut compiled = Vec::with_capacity(attached.len());
        for id in attached {
            match shaders.get(id).and_then(|s| s.compiled.as_ref()) {
                Some(c) => compiled.push(c),
                None => {
                    return Err(DriverError::Link {
                        log: format!("{id:?} is not a compiled shader"),
                    });
                }
            }
        }
        let reflections: Vec<&ShaderReflection> = compiled.iter().map(|(_, r)| r).collect();
        let layout = reflect::link(&reflections).map_err(|log| DriverError::Link { log })?;

        let module_for = |stage| {
            compiled
                .iter()
                .find(|(_, r)| r.stage == stage)
                .map(|(m, _)| Rc::clone(m))
                .ok_or_else(|| DriverError::Link {
                    log: format!("missing {} module", stage.attribute()),
                })
        };
        let vertex = module_for(ShaderStage::Vertex)?;
        let fragment = module_for(ShaderStage::Fragment)?;

        let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let mut entries = Vec::new();
        for block in &layout.blocks {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(u64::from(block.size)),
                },
                count: None,
            });
        }
        for tex in &layout.textures {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: tex.binding,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            if let Some(sb) = tex.sampler_binding {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: sb,
                    visibility,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                });
            }
        }

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("goat program bgl"),
                    entries: &entries,
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("goat program layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        Ok(LinkedProgram {
            shadow: layout
                .blocks
                .iter()
                .map(|b| vec![0; b.size as usize])
                .collect(),
            units: vec![0; layout.textures.len()],
            layout,
            vertex,
            fragment,
            bind_group_layout: Rc::new(bind_group_layout),
            pipeline_layout: Rc::new(pipeline_layout),
        })
    }

    fn build_pipeline(
        &self,
        program: &LinkedProgram,
        buffers: &[(u64, Vec<wgpu::VertexAttribute>)],
    ) -> wgpu::RenderPipeline {
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = buffers
            .iter()
            .map(|(stride, attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let depth_stencil = self.settings.depth_test.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("goat program pipeline"),
                layout: Some(program.pipeline_layout.as_ref()),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(program.layout.vertex_entry.as_str()),
                    compilation_options: Default::default(),
                    buffers: &vertex_buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some(program.layout.fragment_entry.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_format.get(),
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
    }

    /// Validates the bound state and records one draw.
    fn record_draw(&self, indexed: Option<u32>, arrays: (u32, u32)) -> Result<(), DriverError> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;

        let program_id = s.current_program.ok_or_else(|| {
            DriverError::InvalidOperation("draw with no program in use".into())
        })?;
        let vao_id = s.bound_vao.ok_or_else(|| {
            DriverError::InvalidOperation("draw with no vertex array bound".into())
        })?;
        let program = s
            .programs
            .get(&program_id)
            .and_then(|p| p.linked.as_ref())
            .ok_or(DriverError::InvalidHandle {
                kind: ProgramId::KIND,
                id: program_id.0,
            })?;
        let vao = s.vaos.get(&vao_id).ok_or(DriverError::InvalidHandle {
            kind: VertexArrayId::KIND,
            id: vao_id.0,
        })?;

        // group enabled attributes by source buffer, in buffer order
        let mut per_buffer: BTreeMap<BufferId, (u64, Vec<wgpu::VertexAttribute>)> =
            BTreeMap::new();
        for (&location, (buffer, attrib)) in &vao.attribs {
            if !vao.enabled.contains(&location) {
                continue;
            }
            let entry = per_buffer
                .entry(*buffer)
                .or_insert_with(|| (u64::from(attrib.stride), Vec::new()));
            if entry.0 != u64::from(attrib.stride) {
                return Err(DriverError::InvalidOperation(format!(
                    "attributes sharing {buffer:?} disagree on stride"
                )));
            }
            entry.1.push(wgpu::VertexAttribute {
                format: vertex_format(attrib.kind, attrib.components)?,
                offset: u64::from(attrib.offset),
                shader_location: location,
            });
        }

        for input in &program.layout.vertex_inputs {
            let fed = vao.attribs.get(&input.location).filter(|_| vao.enabled.contains(&input.location));
            match fed {
                Some((_, a)) if reflect::element_of_data(a.kind) == input.element => {}
                Some(_) => {
                    return Err(DriverError::InvalidOperation(format!(
                        "attribute {} does not match the shader input type",
                        input.location
                    )));
                }
                None => {
                    return Err(DriverError::InvalidOperation(format!(
                        "shader input @location({}) has no enabled attribute",
                        input.location
                    )));
                }
            }
        }

        let mut vertex_buffers = Vec::with_capacity(per_buffer.len());
        for id in per_buffer.keys() {
            let buffer = s
                .buffers
                .get(id)
                .and_then(|b| b.buffer.clone())
                .ok_or_else(|| {
                    DriverError::InvalidOperation(format!("{id:?} has no data"))
                })?;
            vertex_buffers.push(buffer);
        }

        let kind = match indexed {
            Some(count) => {
                let index = vao
                    .element
                    .and_then(|id| s.buffers.get(&id))
                    .and_then(|b| b.buffer.clone())
                    .ok_or_else(|| {
                        DriverError::InvalidOperation("indexed draw without element data".into())
                    })?;
                DrawKind::Elements { count, index }
            }
            None => DrawKind::Arrays {
                first: arrays.0,
                count: arrays.1,
            },
        };

        let mut textures = Vec::with_capacity(program.layout.textures.len());
        for (tex, &unit) in program.layout.textures.iter().zip(&program.units) {
            let bound = s.units[unit as usize]
                .and_then(|id| s.textures.get(&id))
                .ok_or_else(|| {
                    DriverError::InvalidOperation(format!(
                        "'{}' samples unit {unit}, which has no texture bound",
                        tex.name
                    ))
                })?;
            textures.push((
                tex.binding,
                tex.sampler_binding,
                Rc::clone(&bound.view),
                Rc::clone(&bound.sampler),
            ));
        }

        let key = PipelineKey {
            program: program_id,
            vao: vao_id,
            generation: vao.generation,
            format: self.surface_format.get(),
        };
        let pipeline = match s.pipelines.get(&key) {
            Some(p) => Rc::clone(p),
            None => {
                let buffers: Vec<_> = per_buffer.into_values().collect();
                let p = Rc::new(self.build_pipeline(program, &buffers));
                log::debug!("built pipeline for {program_id:?} / {vao_id:?}");
                s.pipelines.insert(key, Rc::clone(&p));
                p
            }
        };

        let mut offsets = Vec::with_capacity(program.shadow.len());
        let mut blocks = Vec::with_capacity(program.shadow.len());
        for (block, shadow) in program.layout.blocks.iter().zip(&program.shadow) {
            let aligned = s.uniform_bytes.len().next_multiple_of(self.uniform_alignment);
            s.uniform_bytes.resize(aligned, 0);
            offsets.push(aligned as u32);
            s.uniform_bytes.extend_from_slice(shadow);
            blocks.push((block.binding, block.size));
        }

        let draw = RecordedDraw {
            pipeline,
            bind_group_layout: Rc::clone(&program.bind_group_layout),
            blocks,
            offsets,
            textures,
            vertex_buffers,
            kind,
        };
        s.draws.push(draw);
        Ok(())
    }
}

fn vertex_format(kind: DataKind, components: u32) -> Result<wgpu::VertexFormat, DriverError> {
    use wgpu::VertexFormat as F;

    let format = match (kind, components) {
        (DataKind::Float, 1) => F::Float32,
        (DataKind::Float, 2) => F::Float32x2,
        (DataKind::Float, 3) => F::Float32x3,
        (DataKind::Float, 4) => F::Float32x4,
        (DataKind::Int, 1) => F::Sint32,
        (DataKind::Int, 2) => F::Sint32x2,
        (DataKind::Int, 3) => F::Sint32x3,
        (DataKind::Int, 4) => F::Sint32x4,
        (DataKind::UnsignedInt, 1) => F::Uint32,
        (DataKind::UnsignedInt, 2) => F::Uint32x2,
        (DataKind::UnsignedInt, 3) => F::Uint32x3,
        (DataKind::UnsignedInt, 4) => F::Uint32x4,
        _ => {
            return Err(DriverError::InvalidOperation(format!(
                "{components} x {kind:?} is not a vertex format"
            )));
        }
    };
    Ok(format)
}

/// Writes `value` into a block shadow, honouring WGSL's 16-byte matrix column stride.
fn write_member(shadow: &mut [u8], offset: u32, size: u32, value: &UniformValue) {
    let bytes = value.data.as_bytes();
    let offset = offset as usize;

    if value.kind == UniformKind::Mat3 {
        for (col, chunk) in bytes.chunks(12).enumerate() {
            let at = offset + col * 16;
            shadow[at..at + chunk.len()].copy_from_slice(chunk);
        }
        return;
    }

    let len = bytes.len().min(size as usize);
    shadow[offset..offset + len].copy_from_slice(&bytes[..len]);
}

fn invalid<T>(kind: &'static str, id: u32) -> Result<T, DriverError> {
    Err(DriverError::InvalidHandle { kind, id })
}

impl Driver for WgpuDriver {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    // ── shaders ──────────────────────────────────────────────────────────

    fn create_shader(&self, stage: ShaderStage) -> Result<ShaderId, DriverError> {
        let id = ShaderId(self.ids.next());
        self.state.borrow_mut().shaders.insert(
            id,
            GpuShader {
                stage,
                compiled: None,
            },
        );
        Ok(id)
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        let Some(entry) = s.shaders.get_mut(&shader) else {
            return invalid(ShaderId::KIND, shader.0);
        };
        let reflection =
            reflect::reflect(entry.stage, source).map_err(|log| DriverError::Compile { log })?;
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(format!("goat {shader:?}").as_str()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        entry.compiled = Some((Rc::new(module), reflection));
        Ok(())
    }

    fn delete_shader(&self, shader: ShaderId) {
        self.state.borrow_mut().shaders.remove(&shader);
    }

    // ── programs ─────────────────────────────────────────────────────────

    fn create_program(&self) -> Result<ProgramId, DriverError> {
        let id = ProgramId(self.ids.next());
        self.state
            .borrow_mut()
            .programs
            .insert(id, GpuProgram::default());
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        if !s.shaders.contains_key(&shader) {
            return invalid(ShaderId::KIND, shader.0);
        }
        let Some(p) = s.programs.get_mut(&program) else {
            return invalid(ProgramId::KIND, program.0);
        };
        if !p.attached.contains(&shader) {
            p.attached.push(shader);
        }
        Ok(())
    }

    fn link_program(&self, program: ProgramId) -> Result<(), DriverError> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let Some(p) = s.programs.get_mut(&program) else {
            return invalid(ProgramId::KIND, program.0);
        };
        p.linked = Some(self.link(&p.attached, &s.shaders)?);
        s.pipelines.retain(|k, _| k.program != program);
        Ok(())
    }

    fn delete_program(&self, program: ProgramId) {
        let mut s = self.state.borrow_mut();
        s.programs.remove(&program);
        s.pipelines.retain(|k, _| k.program != program);
        if s.current_program == Some(program) {
            s.current_program = None;
        }
    }

    fn use_program(&self, program: ProgramId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        match s.programs.get(&program) {
            Some(p) if p.linked.is_some() => {
                s.current_program = Some(program);
                Ok(())
            }
            Some(_) => Err(DriverError::InvalidOperation(format!(
                "{program:?} is not linked"
            ))),
            None => invalid(ProgramId::KIND, program.0),
        }
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<String> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.linked.as_ref())
            .map(|l| l.layout.active_names())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let s = self.state.borrow();
        let linked = s.programs.get(&program)?.linked.as_ref()?;
        linked
            .layout
            .find(name)
            .map(|slot| UniformLocation(slot as u32))
    }

    fn set_uniform(
        &self,
        program: ProgramId,
        location: UniformLocation,
        value: &UniformValue,
    ) -> Result<(), DriverError> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let Some(linked) = s.programs.get_mut(&program).and_then(|p| p.linked.as_mut()) else {
            return invalid(ProgramId::KIND, program.0);
        };

        match linked.layout.accepts(location.0 as usize, value.kind)? {
            SlotTarget::Member {
                block,
                offset,
                size,
                ..
            } => write_member(&mut linked.shadow[block], offset, size, value),
            SlotTarget::Texture { texture } => {
                let unit = match &value.data {
                    UniformData::I32(v) => v.first().map(|u| *u as i64),
                    UniformData::U32(v) => v.first().map(|u| i64::from(*u)),
                    UniformData::F32(_) => None,
                };
                match unit {
                    Some(u) if (0..=i64::from(MAX_TEXTURE_UNIT)).contains(&u) => {
                        linked.units[texture] = u as u32;
                    }
                    _ => {
                        return Err(DriverError::InvalidOperation(format!(
                            "texture unit {unit:?} out of range"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // ── vertex data ──────────────────────────────────────────────────────

    fn create_vertex_array(&self) -> Result<VertexArrayId, DriverError> {
        let id = VertexArrayId(self.ids.next());
        self.state.borrow_mut().vaos.insert(id, GpuVao::default());
        Ok(id)
    }

    fn delete_vertex_array(&self, vao: VertexArrayId) {
        let mut s = self.state.borrow_mut();
        s.vaos.remove(&vao);
        s.pipelines.retain(|k, _| k.vao != vao);
        if s.bound_vao == Some(vao) {
            s.bound_vao = None;
        }
    }

    fn bind_vertex_array(&self, vao: VertexArrayId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        if !s.vaos.contains_key(&vao) {
            return invalid(VertexArrayId::KIND, vao.0);
        }
        s.bound_vao = Some(vao);
        Ok(())
    }

    fn create_buffer(&self) -> Result<BufferId, DriverError> {
        let id = BufferId(self.ids.next());
        self.state
            .borrow_mut()
            .buffers
            .insert(id, GpuBuffer::default());
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        target: BufferTarget,
        bytes: &[u8],
        mode: DrawMode,
    ) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        let Some(entry) = s.buffers.get_mut(&buffer) else {
            return invalid(BufferId::KIND, buffer.0);
        };
        if bytes.is_empty() {
            entry.buffer = None;
            return Ok(());
        }

        // dynamic buffers are rewritten in place while they fit
        if mode == DrawMode::Dynamic
            && entry.usage == Some(target)
            && let Some(existing) = &entry.buffer
            && existing.size() >= bytes.len() as u64
            && bytes.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0
        {
            self.queue.write_buffer(existing, 0, bytes);
            return Ok(());
        }

        let usage = match target {
            BufferTarget::Vertex => wgpu::BufferUsages::VERTEX,
            BufferTarget::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        let created = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(format!("goat {buffer:?}").as_str()),
                contents: bytes,
                usage,
            });
        entry.buffer = Some(Rc::new(created));
        entry.usage = Some(target);
        Ok(())
    }

    fn vertex_attrib_pointer(
        &self,
        vao: VertexArrayId,
        buffer: BufferId,
        attrib: &VertexAttribPointer,
    ) -> Result<(), DriverError> {
        vertex_format(attrib.kind, attrib.components)?;
        let mut s = self.state.borrow_mut();
        if !s.buffers.contains_key(&buffer) {
            return invalid(BufferId::KIND, buffer.0);
        }
        let Some(v) = s.vaos.get_mut(&vao) else {
            return invalid(VertexArrayId::KIND, vao.0);
        };
        v.attribs.insert(attrib.location, (buffer, *attrib));
        v.generation += 1;
        Ok(())
    }

    fn enable_vertex_attrib(&self, vao: VertexArrayId, location: u32) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        let Some(v) = s.vaos.get_mut(&vao) else {
            return invalid(VertexArrayId::KIND, vao.0);
        };
        if v.enabled.insert(location) {
            v.generation += 1;
        }
        Ok(())
    }

    fn element_buffer(&self, vao: VertexArrayId, buffer: BufferId) -> Result<(), DriverError> {
        let mut s = self.state.borrow_mut();
        if !s.buffers.contains_key(&buffer) {
            return invalid(BufferId::KIND, buffer.0);
        }
        let Some(v) = s.vaos.get_mut(&vao) else {
            return invalid(VertexArrayId::KIND, vao.0);
        };
        v.element = Some(buffer);
        Ok(())
    }

    fn draw_arrays(&self, topology: Topology, first: u32, count: u32) -> Result<(), DriverError> {
        let Topology::Triangles = topology;
        self.record_draw(None, (first, count))
    }

    fn draw_elements(&self, topology: Topology, count: u32) -> Result<(), DriverError> {
        let Topology::Triangles = topology;
        self.record_draw(Some(count), (0, 0))
    }

    // ── textures ─────────────────────────────────────────────────────────

    fn create_texture(&self, label: &str, image: &TextureImage) -> Result<TextureId, DriverError> {
        if image.width == 0 || image.height == 0 || image.levels.is_empty() {
            return Err(DriverError::InvalidOperation(
                "texture must have a non-empty base level".into(),
            ));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: image.levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, pixels) in image.levels.iter().enumerate() {
            let width = (image.width >> level).max(1);
            let height = (image.height >> level).max(1);
            if pixels.len() != (width * height * 4) as usize {
                return Err(DriverError::InvalidOperation(format!(
                    "mip level {level} holds {} bytes, expected {}",
                    pixels.len(),
                    width * height * 4
                )));
            }
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let mipmap_filter = if image.levels.len() > 1 {
            wgpu::MipmapFilterMode::Linear
        } else {
            wgpu::MipmapFilterMode::Nearest
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter,
            ..Default::default()
        });

        let id = TextureId(self.ids.next());
        self.state.borrow_mut().textures.insert(
            id,
            GpuTexture {
                view: Rc::new(texture.create_view(&wgpu::TextureViewDescriptor::default())),
                sampler: Rc::new(sampler),
            },
        );
        Ok(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut s = self.state.borrow_mut();
        s.textures.remove(&texture);
        for unit in s.units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
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
        s.units[unit as usize] = Some(texture);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn mat3_columns_are_padded_to_16_bytes() {
        let mut shadow = vec![0u8; 48];
        let value = UniformValue::new(
            crate::gfx::uniform::UniformShape::Matrix(3),
            &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        )
        .unwrap();
        write_member(&mut shadow, 0, 48, &value);

        let floats = floats(&shadow);
        assert_eq!(&floats[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[3], 0.0);
        assert_eq!(&floats[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&floats[8..11], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn vector_writes_land_at_member_offset() {
        let mut shadow = vec![0u8; 32];
        let value =
            UniformValue::new(crate::gfx::uniform::UniformShape::Vector(3), &[1.0f32, 2.0, 3.0])
                .unwrap();
        write_member(&mut shadow, 16, 12, &value);
        let floats = floats(&shadow);
        assert_eq!(&floats[4..7], &[1.0, 2.0, 3.0]);
        assert_eq!(&floats[0..4], &[0.0; 4]);
    }

    #[test]
    fn vertex_formats_cover_one_to_four_components() {
        assert_eq!(vertex_format(DataKind::Float, 3).unwrap(), wgpu::VertexFormat::Float32x3);
        assert_eq!(vertex_format(DataKind::UnsignedInt, 1).unwrap(), wgpu::VertexFormat::Uint32);
        assert!(vertex_format(DataKind::Int, 5).is_err());
    }

    #[test]
    fn default_settings_clear_to_teal_with_depth() {
        let s = RenderSettings::default();
        assert!(s.depth_test);
        assert_eq!(s.clear_color.g, 0.3);
    }
}
