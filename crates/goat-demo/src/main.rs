use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use glam::{Vec3, Vec4};
use image::{Rgba, RgbaImage};

use goat_engine::core::{App, AppControl, FrameCtx, StartCtx};
use goat_engine::device::GpuInit;
use goat_engine::gfx::{
    BufferObject, DataKind, DrawMode, RenderContext, RenderSettings, ShaderStage, ShaderUnit,
    SharedDriver, TextureOptions, TextureUnit,
};
use goat_engine::input::MovementBindings;
use goat_engine::logging::{init_logging, LoggingConfig};
use goat_engine::window::{Runtime, RuntimeConfig};
use goat_engine::world::{Camera, GameObject, Scene, Transform};

/// Unit cube, 36 vertices of position (3) + uv (2).
#[rustfmt::skip]
const CUBE: [f32; 180] = [
    -0.5, -0.5, -0.5,  0.0, 0.0,
     0.5, -0.5, -0.5,  1.0, 0.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
    -0.5,  0.5, -0.5,  0.0, 1.0,
    -0.5, -0.5, -0.5,  0.0, 0.0,

    -0.5, -0.5,  0.5,  0.0, 0.0,
     0.5, -0.5,  0.5,  1.0, 0.0,
     0.5,  0.5,  0.5,  1.0, 1.0,
     0.5,  0.5,  0.5,  1.0, 1.0,
    -0.5,  0.5,  0.5,  0.0, 1.0,
    -0.5, -0.5,  0.5,  0.0, 0.0,

    -0.5,  0.5,  0.5,  1.0, 0.0,
    -0.5,  0.5, -0.5,  1.0, 1.0,
    -0.5, -0.5, -0.5,  0.0, 1.0,
    -0.5, -0.5, -0.5,  0.0, 1.0,
    -0.5, -0.5,  0.5,  0.0, 0.0,
    -0.5,  0.5,  0.5,  1.0, 0.0,

     0.5,  0.5,  0.5,  1.0, 0.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
     0.5, -0.5, -0.5,  0.0, 1.0,
     0.5, -0.5, -0.5,  0.0, 1.0,
     0.5, -0.5,  0.5,  0.0, 0.0,
     0.5,  0.5,  0.5,  1.0, 0.0,

    -0.5, -0.5, -0.5,  0.0, 1.0,
     0.5, -0.5, -0.5,  1.0, 1.0,
     0.5, -0.5,  0.5,  1.0, 0.0,
     0.5, -0.5,  0.5,  1.0, 0.0,
    -0.5, -0.5,  0.5,  0.0, 0.0,
    -0.5, -0.5, -0.5,  0.0, 1.0,

    -0.5,  0.5, -0.5,  0.0, 1.0,
     0.5,  0.5, -0.5,  1.0, 1.0,
     0.5,  0.5,  0.5,  1.0, 0.0,
     0.5,  0.5,  0.5,  1.0, 0.0,
    -0.5,  0.5,  0.5,  0.0, 0.0,
    -0.5,  0.5, -0.5,  0.0, 1.0,
];

const CUBE_POSITIONS: [Vec3; 10] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(2.0, 5.0, -15.0),
    Vec3::new(-1.5, -2.2, -2.5),
    Vec3::new(-3.8, -2.0, -12.3),
    Vec3::new(2.4, -0.4, -3.5),
    Vec3::new(-1.7, 3.0, -7.5),
    Vec3::new(1.3, -2.0, -2.5),
    Vec3::new(1.5, 2.0, -2.5),
    Vec3::new(1.5, 0.2, -1.5),
    Vec3::new(-1.3, 1.0, -1.5),
];

/// Degrees per second around the tilted axis.
const SPIN_SPEED: f32 = 40.0;

fn assets_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("assets")
}

fn checkerboard(size: u32, cells: u32) -> RgbaImage {
    let cell = (size / cells).max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba([230, 220, 200, 255])
        } else {
            Rgba([90, 60, 40, 255])
        }
    })
}

fn gradient(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        let r = (x * 255 / size.max(1)) as u8;
        let g = (y * 255 / size.max(1)) as u8;
        Rgba([r, g, 160, 255])
    })
}

/// Loads `textures/<name>.png` from the assets directory when present,
/// otherwise uses the generated fallback.
fn texture(driver: &SharedDriver, name: &str, fallback: impl FnOnce() -> RgbaImage) -> Result<TextureUnit> {
    let path = assets_dir().join("textures").join(format!("{name}.png"));
    let texture = if path.is_file() {
        TextureUnit::load(driver, &path, TextureOptions::default())
    } else {
        TextureUnit::from_image(driver, name, fallback(), TextureOptions::default())
    };
    texture.with_context(|| format!("failed to create texture `{name}`"))
}

fn build_scene(driver: &SharedDriver, camera: Rc<RefCell<Camera>>) -> Result<Scene> {
    let shaders = assets_dir().join("shaders");
    let mut context = RenderContext::new(driver)?;
    context.add_shader(ShaderUnit::load(driver, shaders.join("basic.vert.wgsl"), ShaderStage::Vertex)?)?;
    context.add_shader(ShaderUnit::load(driver, shaders.join("basic.frag.wgsl"), ShaderStage::Fragment)?)?;

    let mut cube = BufferObject::new(driver, DrawMode::Static, DataKind::Float, None)?;
    cube.add_attribute(0, 3)?;
    cube.add_attribute(1, 2)?;
    cube.apply_attribute_bounds(&CUBE)?;
    context.add_buffer(cube);

    context.add_texture(texture(driver, "wall", || checkerboard(256, 8))?, "texture1")?;
    context.add_texture(texture(driver, "overlay", || gradient(256))?, "texture2")?;

    let objects = CUBE_POSITIONS
        .iter()
        .enumerate()
        .map(|(i, pos)| {
            let tilt = 20.0 * i as f32;
            GameObject::with_transform(Transform::new(*pos, Vec3::new(tilt, tilt * 0.3, tilt * 0.5), Vec3::ONE))
        })
        .collect();

    let mut scene = Scene::new("cubes", camera, context, objects);
    scene.activate().context("failed to compile the cube program")?;
    scene.render_context().set_vec4("tint", Vec4::ONE)?;
    scene.render_context().set_float("mix_amount", 0.2)?;
    Ok(scene)
}

struct Demo {
    camera: Rc<RefCell<Camera>>,
    bindings: MovementBindings,
    scene: Option<Scene>,
}

impl Demo {
    fn new() -> Self {
        Self {
            camera: Rc::new(RefCell::new(Camera::default())),
            bindings: MovementBindings::default(),
            scene: None,
        }
    }
}

impl App for Demo {
    fn on_start(&mut self, ctx: &mut StartCtx<'_>) -> Result<()> {
        let scene = build_scene(&ctx.driver, self.camera.clone())?;
        log::info!("scene `{}` ready with {} objects", scene.name(), scene.objects().len());
        self.scene = Some(scene);
        Ok(())
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl> {
        let Some(scene) = self.scene.as_mut() else {
            return Ok(AppControl::Continue);
        };

        self.bindings
            .apply(ctx.input, &mut self.camera.borrow_mut(), ctx.time.dt);

        let spin = SPIN_SPEED * ctx.time.dt;
        for (i, object) in scene.objects_mut().iter_mut().enumerate() {
            if i % 3 == 0 {
                object.transform_mut().rot += Vec3::new(spin, spin * 0.5, 0.0);
            }
        }

        ctx.render(|(width, height)| {
            scene.set_viewport(width, height);
            scene.render()?;
            Ok(())
        })
    }
}

fn main() {
    init_logging(LoggingConfig::default());

    let result = Runtime::run(
        RuntimeConfig::default(),
        GpuInit::default(),
        RenderSettings::default(),
        Demo::new(),
    );

    if let Err(err) = result {
        log::error!("goat-demo failed: {err:#}");
        std::process::exit(1);
    }
}
