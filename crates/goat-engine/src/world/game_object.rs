use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3};

use super::transform::Transform;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`GameObject`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// How long an object's resources are expected to stay valid. Not enforced.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum Lifetime {
    Static,
    #[default]
    Scene,
    Object,
    Frame,
}

/// Something the scene draws once per frame with its own model matrix.
#[derive(Debug)]
pub struct GameObject {
    id: ObjectId,
    pub active: bool,
    pub world_pos: Vec3,
    lifetime: Lifetime,
    transform: Transform,
}

impl Default for GameObject {
    fn default() -> Self {
        Self::create(Vec3::ZERO, Lifetime::default(), Transform::default(), true)
    }
}

impl GameObject {
    /// Active object at the origin with an identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(world_pos: Vec3, lifetime: Lifetime, transform: Transform, active: bool) -> Self {
        Self {
            id: ObjectId::next(),
            active,
            world_pos,
            lifetime,
            transform,
        }
    }

    /// Active, scene-lifetime object with the given transform.
    pub fn with_transform(transform: Transform) -> Self {
        Self::create(Vec3::ZERO, Lifetime::Scene, transform, true)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.model_matrix()
    }
}
