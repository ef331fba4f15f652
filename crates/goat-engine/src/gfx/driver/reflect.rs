//! WGSL reflection and GL-style program linking.
//!
//! Both drivers validate shader text here, so a headless run rejects exactly
//! the sources the GPU path would reject.

use std::collections::BTreeMap;

use naga::{AddressSpace, Binding, ImageClass, ImageDimension, ScalarKind, TypeInner, VectorSize};

use super::{DataKind, DriverError, ShaderStage};
use crate::gfx::uniform::{ElementType, UniformKind};

/// A `@location` input of the vertex entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexInput {
    pub location: u32,
    pub element: ElementType,
}

/// One settable field inside a uniform block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    /// `None` for types the uniform setters cannot express (arrays, nested structs).
    pub kind: Option<UniformKind>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceType {
    UniformBlock { size: u32, members: Vec<UniformMember> },
    Texture { sampled_2d_float: bool },
    Sampler { comparison: bool },
}

/// A bound global of one shader module.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Resource {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub ty: ResourceType,
}

/// What a single compiled stage exposes.
#[derive(Debug, Clone)]
pub struct ShaderReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub vertex_inputs: Vec<VertexInput>,
    pub resources: Vec<Resource>,
}

/// Parses and validates `source`, then extracts its interface.
///
/// The error string is the compiler diagnostic, untruncated.
pub fn reflect(stage: ShaderStage, source: &str) -> Result<ShaderReflection, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .ok_or_else(|| format!("no {} entry point", stage.attribute()))?;

    let mut vertex_inputs = Vec::new();
    if stage == ShaderStage::Vertex {
        for arg in &entry.function.arguments {
            collect_inputs(&module, arg.ty, arg.binding.as_ref(), &mut vertex_inputs);
        }
    }

    let mut resources = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let (Some(binding), Some(name)) = (&var.binding, &var.name) else {
            continue;
        };
        let inner = &module.types[var.ty].inner;

        let ty = match var.space {
            AddressSpace::Uniform => block_layout(&module, name, inner),
            AddressSpace::Handle => match *inner {
                TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => ResourceType::Texture {
                    sampled_2d_float: dim == ImageDimension::D2
                        && !arrayed
                        && matches!(
                            class,
                            ImageClass::Sampled {
                                kind: ScalarKind::Float,
                                multi: false
                            }
                        ),
                },
                TypeInner::Sampler { comparison } => ResourceType::Sampler { comparison },
                _ => continue,
            },
            _ => return Err(format!("global '{name}' uses an unsupported address space")),
        };

        resources.push(Resource {
            name: name.clone(),
            group: binding.group,
            binding: binding.binding,
            ty,
        });
    }

    Ok(ShaderReflection {
        stage,
        entry_point: entry.name.clone(),
        vertex_inputs,
        resources,
    })
}

fn collect_inputs(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<VertexInput>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::Location { location, .. }) => {
            if let Some(element) = element_of(inner) {
                out.push(VertexInput {
                    location: *location,
                    element,
                });
            }
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for m in members {
                    collect_inputs(module, m.ty, m.binding.as_ref(), out);
                }
            }
        }
    }
}

fn element_of(inner: &TypeInner) -> Option<ElementType> {
    let scalar = match *inner {
        TypeInner::Scalar(s) => s,
        TypeInner::Vector { scalar, .. } => scalar,
        _ => return None,
    };
    match scalar.kind {
        ScalarKind::Float => Some(ElementType::Float),
        ScalarKind::Sint => Some(ElementType::Int),
        ScalarKind::Uint => Some(ElementType::UInt),
        _ => None,
    }
}

fn kind_of(inner: &TypeInner) -> Option<UniformKind> {
    use UniformKind::*;

    match *inner {
        TypeInner::Scalar(s) if s.width == 4 => match s.kind {
            ScalarKind::Float => Some(Float),
            ScalarKind::Sint => Some(Int),
            ScalarKind::Uint => Some(UInt),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.width == 4 => {
            match (scalar.kind, size) {
                (ScalarKind::Float, VectorSize::Bi) => Some(Vec2),
                (ScalarKind::Float, VectorSize::Tri) => Some(Vec3),
                (ScalarKind::Float, VectorSize::Quad) => Some(Vec4),
                (ScalarKind::Sint, VectorSize::Bi) => Some(IVec2),
                (ScalarKind::Sint, VectorSize::Tri) => Some(IVec3),
                (ScalarKind::Sint, VectorSize::Quad) => Some(IVec4),
                (ScalarKind::Uint, VectorSize::Bi) => Some(UVec2),
                (ScalarKind::Uint, VectorSize::Tri) => Some(UVec3),
                (ScalarKind::Uint, VectorSize::Quad) => Some(UVec4),
                _ => None,
            }
        }
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } if scalar.kind == ScalarKind::Float && scalar.width == 4 && columns == rows => {
            match columns {
                VectorSize::Bi => Some(Mat2),
                VectorSize::Tri => Some(Mat3),
                VectorSize::Quad => Some(Mat4),
            }
        }
        _ => None,
    }
}

fn block_layout(module: &naga::Module, var_name: &str, inner: &TypeInner) -> ResourceType {
    let gctx = module.to_ctx();
    match inner {
        TypeInner::Struct { members, span } => ResourceType::UniformBlock {
            size: *span,
            members: members
                .iter()
                .filter_map(|m| {
                    let ty = &module.types[m.ty].inner;
                    Some(UniformMember {
                        name: m.name.clone()?,
                        offset: m.offset,
                        size: ty.size(gctx),
                        kind: kind_of(ty),
                    })
                })
                .collect(),
        },
        other => {
            let size = other.size(gctx);
            ResourceType::UniformBlock {
                size,
                members: vec![UniformMember {
                    name: var_name.to_string(),
                    offset: 0,
                    size,
                    kind: kind_of(other),
                }],
            }
        }
    }
}

// ── linking ─────────────────────────────────────────────────────────────

/// A uniform buffer binding of a linked program.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlockLayout {
    pub binding: u32,
    pub size: u32,
}

/// A texture binding and its paired sampler, if the shader declares one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TextureBinding {
    pub name: String,
    pub binding: u32,
    pub sampler_binding: Option<u32>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlotTarget {
    Member {
        block: usize,
        offset: u32,
        size: u32,
        kind: Option<UniformKind>,
    },
    /// Holds the texture unit index the texture samples from.
    Texture { texture: usize },
}

/// A resolvable uniform name. Aliases (`block.member`) share a target with
/// their plain name and are not reported as active uniforms.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub alias: bool,
    pub target: SlotTarget,
}

/// Interface of a linked program.
#[derive(Debug, Clone)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub vertex_inputs: Vec<VertexInput>,
    pub blocks: Vec<BlockLayout>,
    pub textures: Vec<TextureBinding>,
    pub uniforms: Vec<UniformSlot>,
}

impl ProgramLayout {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|u| u.name == name)
    }

    pub fn active_names(&self) -> Vec<String> {
        self.uniforms
            .iter()
            .filter(|u| !u.alias)
            .map(|u| u.name.clone())
            .collect()
    }

    /// Checks that a value of `kind` may be written to `slot`.
    pub fn accepts(&self, slot: usize, kind: UniformKind) -> Result<SlotTarget, DriverError> {
        let target = self
            .uniforms
            .get(slot)
            .ok_or(DriverError::InvalidHandle {
                kind: "uniform",
                id: slot as u32,
            })?
            .target;

        let ok = match target {
            SlotTarget::Member {
                kind: Some(declared),
                ..
            } => declared == kind,
            SlotTarget::Member { kind: None, .. } => false,
            SlotTarget::Texture { .. } => matches!(kind, UniformKind::Int | UniformKind::UInt),
        };
        if ok {
            return Ok(target);
        }

        let declared = match target {
            SlotTarget::Member { kind: Some(k), .. } => k.to_string(),
            SlotTarget::Member { kind: None, .. } => "an unsupported type".to_string(),
            SlotTarget::Texture { .. } => "texture_2d<f32>".to_string(),
        };
        Err(DriverError::TypeMismatch {
            declared,
            given: kind,
        })
    }
}

/// Combines attached stages into one program interface.
///
/// The error string is the link diagnostic.
pub fn link(shaders: &[&ShaderReflection]) -> Result<ProgramLayout, String> {
    let mut vertex = None;
    let mut fragment = None;
    for s in shaders {
        let slot = match s.stage {
            ShaderStage::Vertex => &mut vertex,
            ShaderStage::Fragment => &mut fragment,
        };
        if slot.replace(*s).is_some() {
            return Err(format!("more than one {} shader attached", s.stage.attribute()));
        }
    }
    let vertex = vertex.ok_or("no vertex shader attached")?;
    let fragment = fragment.ok_or("no fragment shader attached")?;

    let mut by_binding: BTreeMap<u32, &Resource> = BTreeMap::new();
    for r in vertex.resources.iter().chain(&fragment.resources) {
        if r.group != 0 {
            return Err(format!(
                "'{}' uses bind group {}; only group 0 is supported",
                r.name, r.group
            ));
        }
        match by_binding.get(&r.binding) {
            Some(existing) if *existing == r => {}
            Some(existing) => {
                return Err(format!(
                    "binding {} is declared as both '{}' and '{}'",
                    r.binding, existing.name, r.name
                ));
            }
            None => {
                by_binding.insert(r.binding, r);
            }
        }
    }

    let mut blocks = Vec::new();
    let mut textures = Vec::new();
    let mut samplers = Vec::new();
    let mut uniforms: Vec<UniformSlot> = Vec::new();

    let mut push_slot = |slot: UniformSlot| -> Result<(), String> {
        if uniforms.iter().any(|u| u.name == slot.name) {
            return Err(format!("uniform '{}' is declared more than once", slot.name));
        }
        uniforms.push(slot);
        Ok(())
    };

    for (&binding, r) in &by_binding {
        match &r.ty {
            ResourceType::UniformBlock { size, members } => {
                let block = blocks.len();
                blocks.push(BlockLayout {
                    binding,
                    size: *size,
                });
                for m in members {
                    let target = SlotTarget::Member {
                        block,
                        offset: m.offset,
                        size: m.size,
                        kind: m.kind,
                    };
                    push_slot(UniformSlot {
                        name: m.name.clone(),
                        alias: false,
                        target,
                    })?;
                    if m.name != r.name {
                        push_slot(UniformSlot {
                            name: format!("{}.{}", r.name, m.name),
                            alias: true,
                            target,
                        })?;
                    }
                }
            }
            ResourceType::Texture { sampled_2d_float } => {
                if !sampled_2d_float {
                    return Err(format!(
                        "texture '{}' must be a texture_2d<f32>",
                        r.name
                    ));
                }
                push_slot(UniformSlot {
                    name: r.name.clone(),
                    alias: false,
                    target: SlotTarget::Texture {
                        texture: textures.len(),
                    },
                })?;
                textures.push(TextureBinding {
                    name: r.name.clone(),
                    binding,
                    sampler_binding: None,
                });
            }
            ResourceType::Sampler { comparison } => {
                if *comparison {
                    return Err(format!("comparison sampler '{}' is not supported", r.name));
                }
                samplers.push((r.name.clone(), binding));
            }
        }
    }

    for (name, binding) in samplers {
        let texture = name
            .strip_suffix("_sampler")
            .and_then(|base| textures.iter_mut().find(|t| t.name == base))
            .ok_or_else(|| format!("sampler '{name}' has no matching '<texture>_sampler' texture"))?;
        texture.sampler_binding = Some(binding);
    }

    Ok(ProgramLayout {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        vertex_inputs: vertex.vertex_inputs.clone(),
        blocks,
        textures,
        uniforms,
    })
}

/// Scalar family a vertex attribute of `kind` feeds.
pub fn element_of_data(kind: DataKind) -> ElementType {
    match kind {
        DataKind::Float => ElementType::Float,
        DataKind::Int => ElementType::Int,
        DataKind::UnsignedInt => ElementType::UInt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERT: &str = r#"
struct Transforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    model: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> transforms: Transforms;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) pos: vec3<f32>, @location(1) uv: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = transforms.projection * transforms.view * transforms.model * vec4<f32>(pos, 1.0);
    out.uv = uv;
    return out;
}
"#;

    const FRAG: &str = r#"
@group(0) @binding(1) var diffuse: texture_2d<f32>;
@group(0) @binding(2) var diffuse_sampler: sampler;
@group(0) @binding(3) var<uniform> tint: vec4<f32>;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(diffuse, diffuse_sampler, uv) * tint;
}
"#;

    // ── reflect ──────────────────────────────────────────────────────────

    #[test]
    fn reflects_vertex_inputs_and_block_members() {
        let r = reflect(ShaderStage::Vertex, VERT).unwrap();
        assert_eq!(r.entry_point, "vs_main");
        assert_eq!(r.vertex_inputs.len(), 2);
        assert_eq!(r.vertex_inputs[1].location, 1);

        let ResourceType::UniformBlock { size, members } = &r.resources[0].ty else {
            panic!("expected a uniform block");
        };
        assert_eq!(*size, 192);
        assert_eq!(members[2].name, "model");
        assert_eq!(members[2].offset, 128);
        assert_eq!(members[2].kind, Some(UniformKind::Mat4));
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = reflect(ShaderStage::Fragment, VERT).unwrap_err();
        assert!(err.contains("@fragment"));
    }

    #[test]
    fn syntax_errors_carry_a_diagnostic() {
        let err = reflect(ShaderStage::Vertex, "fn broken( {").unwrap_err();
        assert!(!err.is_empty());
    }

    // ── link ─────────────────────────────────────────────────────────────

    #[test]
    fn link_merges_stages_and_pairs_samplers() {
        let v = reflect(ShaderStage::Vertex, VERT).unwrap();
        let f = reflect(ShaderStage::Fragment, FRAG).unwrap();
        let layout = link(&[&v, &f]).unwrap();

        assert_eq!(layout.blocks.len(), 2);
        assert_eq!(layout.textures[0].sampler_binding, Some(2));
        assert!(layout.find("model").is_some());
        assert!(layout.find("transforms.model").is_some());
        assert!(layout.find("tint").is_some());

        let names = layout.active_names();
        assert!(names.contains(&"diffuse".to_string()));
        assert!(!names.contains(&"transforms.model".to_string()));
    }

    #[test]
    fn link_requires_both_stages() {
        let v = reflect(ShaderStage::Vertex, VERT).unwrap();
        assert!(link(&[&v]).unwrap_err().contains("fragment"));
    }

    #[test]
    fn accepts_checks_declared_kind() {
        let v = reflect(ShaderStage::Vertex, VERT).unwrap();
        let f = reflect(ShaderStage::Fragment, FRAG).unwrap();
        let layout = link(&[&v, &f]).unwrap();

        let model = layout.find("model").unwrap();
        assert!(layout.accepts(model, UniformKind::Mat4).is_ok());
        assert!(matches!(
            layout.accepts(model, UniformKind::Vec4),
            Err(DriverError::TypeMismatch { .. })
        ));

        let diffuse = layout.find("diffuse").unwrap();
        assert!(layout.accepts(diffuse, UniformKind::Int).is_ok());
    }
}
