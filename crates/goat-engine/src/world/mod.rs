//! Objects placed in the world, the camera viewing them, and the scene tying both
//! to a render context.

pub mod camera;
pub mod game_object;
pub mod scene;
pub mod transform;

pub use camera::{Camera, Direction};
pub use game_object::{GameObject, Lifetime, ObjectId};
pub use scene::Scene;
pub use transform::Transform;
