use std::collections::HashSet;

use glam::Vec2;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

#[cfg(target_arch = "wasm32")]
pub mod wasm;

/// Two presses closer together than this count as a double click.
pub const DOUBLE_CLICK_SECONDS: f64 = 0.3;

/// Identifier for a mouse button, numbered the way the DOM numbers them
/// (left is zero, middle one, right two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const MIDDLE: Self = Self(1);
    pub const RIGHT: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// What dragging with this button does to the camera.
    pub fn drag_mode(self) -> DragMode {
        if self == Self::LEFT {
            DragMode::Rotate
        } else {
            DragMode::Pan
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Rotate,
    Pan,
}

/// Pointer motion accumulated since the last frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PointerFrame {
    /// Pixels dragged with the rotate button.
    pub rotate: Vec2,
    /// Pixels dragged with a pan button.
    pub pan: Vec2,
    /// Summed wheel delta; positive scrolls away from the target.
    pub wheel: f32,
}

impl PointerFrame {
    pub fn is_empty(&self) -> bool {
        self.rotate == Vec2::ZERO && self.pan == Vec2::ZERO && self.wheel == 0.0
    }
}

/// Pointer state shared between event listeners and the frame loop.
///
/// Listeners only record; the frame loop drains the accumulated motion with
/// [`PointerInput::take_frame`] before it updates the camera.
#[derive(Debug, Default)]
pub struct PointerInput {
    buttons: RwLock<HashSet<MouseButton>>,
    position: RwLock<Option<Vec2>>,
    pending: Mutex<PointerFrame>,
}

impl PointerInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_button_down(&self, button: MouseButton) {
        self.buttons.write().insert(button);
    }

    pub fn set_button_up(&self, button: MouseButton) {
        self.buttons.write().remove(&button);
    }

    pub fn release_all(&self) {
        self.buttons.write().clear();
    }

    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.buttons.read().contains(&button)
    }

    /// Records the pointer position; motion counts as a drag while a button
    /// is held.
    pub fn move_to(&self, position: Vec2) {
        let previous = self.position.write().replace(position);
        let Some(previous) = previous else {
            return;
        };
        let delta = position - previous;
        let mode = {
            let buttons = self.buttons.read();
            if buttons.contains(&MouseButton::LEFT) {
                Some(DragMode::Rotate)
            } else {
                buttons.iter().next().map(|button| button.drag_mode())
            }
        };
        let mut pending = self.pending.lock();
        match mode {
            Some(DragMode::Rotate) => pending.rotate += delta,
            Some(DragMode::Pan) => pending.pan += delta,
            None => {}
        }
    }

    pub fn wheel(&self, delta_y: f32) {
        if delta_y.is_finite() {
            self.pending.lock().wheel += delta_y;
        }
    }

    pub fn position(&self) -> Option<Vec2> {
        *self.position.read()
    }

    /// Returns and clears the motion recorded since the previous call.
    pub fn take_frame(&self) -> PointerFrame {
        std::mem::take(&mut *self.pending.lock())
    }
}

/// Detects double clicks on hosts that only report single presses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClickTracker {
    last_press: Option<f64>,
}

impl ClickTracker {
    /// Registers a press at `time` seconds; returns whether it completes a
    /// double click.
    pub fn press(&mut self, time: f64) -> bool {
        match self.last_press {
            Some(last) if (0.0..=DOUBLE_CLICK_SECONDS).contains(&(time - last)) => {
                self.last_press = None;
                true
            }
            _ => {
                self.last_press = Some(time);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drags_accumulate_by_button() {
        let input = PointerInput::new();
        input.move_to(Vec2::new(10.0, 10.0));
        input.move_to(Vec2::new(20.0, 10.0));
        assert!(input.take_frame().is_empty());

        input.set_button_down(MouseButton::LEFT);
        input.move_to(Vec2::new(25.0, 12.0));
        input.move_to(Vec2::new(30.0, 14.0));
        input.set_button_up(MouseButton::LEFT);
        input.set_button_down(MouseButton::RIGHT);
        input.move_to(Vec2::new(30.0, 24.0));
        input.wheel(120.0);

        let frame = input.take_frame();
        assert_eq!(frame.rotate, Vec2::new(10.0, 4.0));
        assert_eq!(frame.pan, Vec2::new(0.0, 10.0));
        assert_eq!(frame.wheel, 120.0);
        assert!(input.take_frame().is_empty());
    }

    #[test]
    fn buttons_are_tracked() {
        let input = PointerInput::new();
        input.set_button_down(MouseButton::MIDDLE);
        assert!(input.is_button_down(MouseButton::MIDDLE));
        input.release_all();
        assert!(!input.is_button_down(MouseButton::MIDDLE));
        assert_eq!(MouseButton::MIDDLE.drag_mode(), DragMode::Pan);
    }

    #[test]
    fn double_click_needs_two_quick_presses() {
        let mut clicks = ClickTracker::default();
        assert!(!clicks.press(1.0));
        assert!(clicks.press(1.2));
        assert!(!clicks.press(1.3));
        assert!(!clicks.press(2.0));
        assert!(clicks.press(2.25));
    }
}
