//! Shared fixtures for the headless render tests.

use std::path::PathBuf;
use std::rc::Rc;

use tempfile::TempDir;

use crate::gfx::driver::{HeadlessDriver, SharedDriver};

pub const VERTEX_SRC: &str = r#"
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

pub const FRAGMENT_SRC: &str = r#"
@group(0) @binding(1) var texture1: texture_2d<f32>;
@group(0) @binding(2) var texture1_sampler: sampler;
@group(0) @binding(3) var texture2: texture_2d<f32>;
@group(0) @binding(4) var texture2_sampler: sampler;

struct Material {
    tint: vec4<f32>,
    mix_amount: f32,
    flags: u32,
    layer: i32,
};
@group(0) @binding(5) var<uniform> material: Material;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let a = textureSample(texture1, texture1_sampler, uv);
    let b = textureSample(texture2, texture2_sampler, uv);
    let keep = f32(material.flags & 1u) + f32(material.layer) * 0.0;
    return mix(a, b, material.mix_amount) * material.tint * keep;
}
"#;

/// A headless driver, both as itself (for inspection) and shared.
pub fn headless() -> (Rc<HeadlessDriver>, SharedDriver) {
    let headless = Rc::new(HeadlessDriver::new());
    let shared: SharedDriver = headless.clone();
    (headless, shared)
}

pub fn write_shader(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, source).unwrap();
    path
}

/// Interleaved position + uv data for `entries` vertices.
pub fn quad_data(entries: usize) -> Vec<f32> {
    (0..entries * 5).map(|i| i as f32).collect()
}
