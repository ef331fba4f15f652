use glam::{Mat4, Vec3};

use super::game_object::ObjectId;

/// Position, Euler rotation (degrees, applied X then Y then Z) and scale.
///
/// `parent` and `children` are bookkeeping only: they are never composed
/// into [`Transform::model_matrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub pos: Vec3,
    pub rot: Vec3,
    pub scale: Vec3,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            rot: Vec3::ZERO,
            scale: Vec3::ONE,
            parent: None,
            children: Vec::new(),
        }
    }
}

impl Transform {
    pub fn new(pos: Vec3, rot: Vec3, scale: Vec3) -> Self {
        Self {
            pos,
            rot,
            scale,
            ..Self::default()
        }
    }

    fn rotation(&self) -> Mat4 {
        Mat4::from_rotation_x(self.rot.x.to_radians())
            * Mat4::from_rotation_y(self.rot.y.to_radians())
            * Mat4::from_rotation_z(self.rot.z.to_radians())
    }

    /// translate * rotate * scale.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.pos) * self.rotation() * Mat4::from_scale(self.scale)
    }

    /// Local +X in world space.
    pub fn right(&self) -> Vec3 {
        self.rotation().transform_vector3(Vec3::X)
    }

    /// Local -Z in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation().transform_vector3(Vec3::NEG_Z)
    }

    /// Local +Y in world space.
    pub fn up(&self) -> Vec3 {
        self.rotation().transform_vector3(Vec3::Y)
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Replaces the parent link, returning the old one.
    pub fn set_parent(&mut self, parent: Option<ObjectId>) -> Option<ObjectId> {
        std::mem::replace(&mut self.parent, parent)
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Records `child`. Returns `false` if it was already a child.
    pub fn add_child(&mut self, child: ObjectId) -> bool {
        if self.children.contains(&child) {
            return false;
        }
        self.children.push(child);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::GameObject;

    #[test]
    fn default_model_matrix_is_identity() {
        assert_eq!(Transform::default().model_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn model_matrix_scales_rotates_then_translates() {
        let t = Transform::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 90.0, 0.0), Vec3::splat(2.0));
        let p = t.model_matrix().transform_point3(Vec3::X);
        // scale to (2,0,0), yaw 90 degrees to (0,0,-2), then translate
        assert!(p.abs_diff_eq(Vec3::new(1.0, 2.0, 1.0), 1e-5));
    }

    #[test]
    fn direction_vectors_follow_rotation() {
        let t = Transform::new(Vec3::ZERO, Vec3::new(0.0, 90.0, 0.0), Vec3::ONE);
        assert!(t.forward().abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert!(t.right().abs_diff_eq(Vec3::NEG_Z, 1e-5));
        assert!(t.up().abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn hierarchy_links_do_not_affect_the_model_matrix() {
        let parent = GameObject::new();
        let child = GameObject::new();

        let mut t = Transform::default();
        assert!(t.add_child(child.id()));
        assert!(!t.add_child(child.id()));
        assert_eq!(t.set_parent(Some(parent.id())), None);

        assert_eq!(t.children(), &[child.id()]);
        assert_eq!(t.model_matrix(), Mat4::IDENTITY);
    }
}
