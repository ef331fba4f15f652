use crate::world::{Camera, Direction};

use super::state::InputState;
use super::types::Key;

/// Held-key to camera-direction table.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementBindings {
    bindings: Vec<(Key, Direction)>,
}

impl Default for MovementBindings {
    /// W/S/A/D plus the arrow keys.
    fn default() -> Self {
        Self::new([
            (Key::W, Direction::Forward),
            (Key::ArrowUp, Direction::Forward),
            (Key::S, Direction::Backward),
            (Key::ArrowDown, Direction::Backward),
            (Key::A, Direction::Left),
            (Key::ArrowLeft, Direction::Left),
            (Key::D, Direction::Right),
            (Key::ArrowRight, Direction::Right),
        ])
    }
}

impl MovementBindings {
    pub fn new(bindings: impl IntoIterator<Item = (Key, Direction)>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }

    /// Adds or replaces the direction bound to `key`.
    pub fn bind(&mut self, key: Key, direction: Direction) {
        match self.bindings.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = direction,
            None => self.bindings.push((key, direction)),
        }
    }

    pub fn direction(&self, key: Key) -> Option<Direction> {
        self.bindings.iter().find(|(k, _)| *k == key).map(|(_, d)| *d)
    }

    /// Walks `camera` once per held, bound key. Returns whether it moved.
    pub fn apply(&self, input: &InputState, camera: &mut Camera, dt: f32) -> bool {
        let mut moved = false;
        for (key, direction) in &self.bindings {
            if input.key_down(*key) {
                camera.walk(*direction, dt);
                moved = true;
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::input::{InputEvent, InputFrame, KeyState, Modifiers};
    use crate::world::camera::DEFAULT_POSITION;

    fn hold(state: &mut InputState, key: Key) {
        let mut frame = InputFrame::default();
        state.apply_event(
            &mut frame,
            InputEvent::Key {
                key,
                state: KeyState::Pressed,
                modifiers: Modifiers::default(),
                code: 0,
                repeat: false,
            },
        );
    }

    #[test]
    fn nothing_held_leaves_the_camera_alone() {
        let mut camera = Camera::default();
        assert!(!MovementBindings::default().apply(&InputState::default(), &mut camera, 1.0));
        assert_eq!(camera.position(), DEFAULT_POSITION);
    }

    #[test]
    fn held_w_walks_forward() {
        let mut input = InputState::default();
        hold(&mut input, Key::W);
        let mut camera = Camera::default();

        assert!(MovementBindings::default().apply(&input, &mut camera, 1.0));
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), 1e-6));
    }

    #[test]
    fn opposite_keys_cancel_out() {
        let mut input = InputState::default();
        hold(&mut input, Key::A);
        hold(&mut input, Key::ArrowRight);
        let mut camera = Camera::default();

        MovementBindings::default().apply(&input, &mut camera, 0.25);
        assert!(camera.position().abs_diff_eq(DEFAULT_POSITION, 1e-6));
    }

    #[test]
    fn rebinding_replaces_the_direction() {
        let mut bindings = MovementBindings::default();
        bindings.bind(Key::W, Direction::Backward);
        bindings.bind(Key::Q, Direction::Left);
        assert_eq!(bindings.direction(Key::W), Some(Direction::Backward));
        assert_eq!(bindings.direction(Key::Q), Some(Direction::Left));
        assert_eq!(bindings.direction(Key::E), None);
    }
}
