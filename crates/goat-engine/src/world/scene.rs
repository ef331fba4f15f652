use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use crate::error::Result;
use crate::gfx::RenderContext;

use super::camera::{Camera, DEFAULT_VIEWPORT};
use super::game_object::GameObject;

/// Uniform names the scene pushes every frame.
pub const PROJECTION_UNIFORM: &str = "projection";
pub const VIEW_UNIFORM: &str = "view";
pub const MODEL_UNIFORM: &str = "model";

/// A render context, the camera looking at it and the objects drawn through it.
///
/// Each active object redraws every buffer of the context with its own model
/// matrix, so N objects sharing one context draw the same geometry N times.
#[derive(Debug)]
pub struct Scene {
    name: String,
    context: RenderContext,
    camera: Rc<RefCell<Camera>>,
    objects: Vec<GameObject>,
    viewport: (u32, u32),
}

impl Scene {
    pub fn new(
        name: impl Into<String>,
        camera: Rc<RefCell<Camera>>,
        context: RenderContext,
        objects: Vec<GameObject>,
    ) -> Self {
        Self {
            name: name.into(),
            context,
            camera,
            objects,
            viewport: DEFAULT_VIEWPORT,
        }
    }

    /// Compiles the context on first use, then activates it.
    pub fn activate(&mut self) -> Result<()> {
        if !self.context.is_compiled() {
            self.context.compile()?;
        }
        self.context.activate()
    }

    /// Draws one frame: camera uniforms once, then every active object.
    pub fn render(&mut self) -> Result<()> {
        let started = Instant::now();
        self.activate()?;

        let (projection, view) = {
            let camera = self.camera.borrow();
            (camera.projection(self.viewport.0, self.viewport.1), camera.view())
        };
        self.context.set_mat4(PROJECTION_UNIFORM, &projection)?;
        self.context.set_mat4(VIEW_UNIFORM, &view)?;

        let mut drawn = 0;
        for object in self.objects.iter().filter(|o| o.active) {
            self.context.set_mat4(MODEL_UNIFORM, &object.model_matrix())?;
            self.context.render()?;
            drawn += 1;
        }

        log::debug!(
            "Scene<{}>::render() [{}us] {drawn}/{} objects",
            self.name,
            started.elapsed().as_micros(),
            self.objects.len()
        );
        Ok(())
    }

    pub fn add_object(&mut self, object: GameObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[GameObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [GameObject] {
        &mut self.objects
    }

    pub fn render_context(&self) -> &RenderContext {
        &self.context
    }

    /// Registration access; adding resources after the first frame has no effect
    /// on an already compiled program.
    pub fn render_context_mut(&mut self) -> &mut RenderContext {
        &mut self.context
    }

    pub fn camera(&self) -> &Rc<RefCell<Camera>> {
        &self.camera
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Viewport the projection matrix is built for.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};
    use image::RgbaImage;

    use super::*;
    use crate::gfx::driver::{GpuCall, HeadlessDriver};
    use crate::gfx::test_support::{self, quad_data, FRAGMENT_SRC, VERTEX_SRC};
    use crate::gfx::{
        BufferObject, DataKind, DrawMode, ShaderStage, ShaderUnit, SharedDriver, TextureOptions,
        TextureUnit, UniformValue,
    };
    use crate::world::{Direction, Transform};

    fn context(driver: &SharedDriver) -> RenderContext {
        let mut ctx = RenderContext::new(driver).unwrap();
        ctx.add_shader(
            ShaderUnit::from_source(driver, "basic.vert", ShaderStage::Vertex, VERTEX_SRC).unwrap(),
        )
        .unwrap();
        ctx.add_shader(
            ShaderUnit::from_source(driver, "basic.frag", ShaderStage::Fragment, FRAGMENT_SRC)
                .unwrap(),
        )
        .unwrap();

        let mut vbo = BufferObject::new(driver, DrawMode::Static, DataKind::Float, None).unwrap();
        vbo.add_attribute(0, 3).unwrap();
        vbo.add_attribute(1, 2).unwrap();
        vbo.apply_attribute_bounds(&quad_data(6)).unwrap();
        ctx.add_buffer(vbo);

        for name in ["texture1", "texture2"] {
            let tex = TextureUnit::from_image(driver, name, RgbaImage::new(1, 1), TextureOptions::default())
                .unwrap();
            ctx.add_texture(tex, name).unwrap();
        }
        ctx
    }

    fn scene(objects: Vec<GameObject>) -> (Rc<HeadlessDriver>, Scene) {
        let (headless, driver) = test_support::headless();
        let camera = Rc::new(RefCell::new(Camera::default()));
        let scene = Scene::new("test", camera, context(&driver), objects);
        (headless, scene)
    }

    #[test]
    fn empty_scene_pushes_camera_uniforms_once_and_draws_nothing() {
        let (headless, mut scene) = scene(Vec::new());
        scene.render().unwrap();

        assert_eq!(headless.uniform_writes("projection").len(), 1);
        assert_eq!(headless.uniform_writes("view").len(), 1);
        assert!(headless.uniform_writes("model").is_empty());
        assert_eq!(headless.draw_count(), 0);
    }

    #[test]
    fn first_render_compiles_once() {
        let (headless, mut scene) = scene(vec![GameObject::new()]);
        scene.render().unwrap();
        scene.render().unwrap();

        let links = headless
            .calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::LinkProgram(_)))
            .count();
        assert_eq!(links, 1);
        assert!(scene.render_context().is_compiled());
    }

    #[test]
    fn each_active_object_sets_model_then_draws() {
        let moved = GameObject::with_transform(Transform::new(Vec3::X, Vec3::ZERO, Vec3::ONE));
        let mut hidden = GameObject::new();
        hidden.active = false;
        let (headless, mut scene) = scene(vec![GameObject::new(), hidden, moved]);

        scene.render().unwrap();

        assert_eq!(
            headless.uniform_writes("model"),
            vec![
                UniformValue::mat4(&Mat4::IDENTITY),
                UniformValue::mat4(&Mat4::from_translation(Vec3::X)),
            ]
        );
        assert_eq!(headless.draw_count(), 2);
    }

    #[test]
    fn frame_order_is_use_camera_then_objects() {
        let (headless, mut scene) = scene(vec![GameObject::new()]);
        scene.render().unwrap();

        let calls = headless.calls();
        let index_of = |pred: fn(&GpuCall) -> bool| calls.iter().position(pred).unwrap();
        let used = index_of(|c| matches!(c, GpuCall::UseProgram(_)));
        let projection = index_of(|c| matches!(c, GpuCall::SetUniform { name, .. } if name == "projection"));
        let view = index_of(|c| matches!(c, GpuCall::SetUniform { name, .. } if name == "view"));
        let model = index_of(|c| matches!(c, GpuCall::SetUniform { name, .. } if name == "model"));
        let draw = index_of(GpuCall::is_draw);

        assert!(used < projection && projection < view && view < model && model < draw);
    }

    #[test]
    fn camera_movement_shows_up_in_the_next_frame() {
        let (headless, mut scene) = scene(Vec::new());
        scene.camera().borrow_mut().walk(Direction::Forward, 1.0);
        scene.render().unwrap();

        let expected = scene.camera().borrow().view();
        assert_eq!(headless.uniform_writes("view"), vec![UniformValue::mat4(&expected)]);
    }

    #[test]
    fn projection_follows_the_viewport() {
        let (headless, mut scene) = scene(Vec::new());
        scene.set_viewport(1600, 900);
        scene.render().unwrap();

        let expected = scene.camera().borrow().projection(1600, 900);
        assert_eq!(headless.uniform_writes("projection"), vec![UniformValue::mat4(&expected)]);
    }

    #[test]
    fn added_objects_are_drawn() {
        let (headless, mut scene) = scene(Vec::new());
        scene.add_object(GameObject::new());
        scene.add_object(GameObject::new());
        scene.render().unwrap();
        assert_eq!(scene.objects().len(), 2);
        assert_eq!(headless.draw_count(), 2);
    }
}
