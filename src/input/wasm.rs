use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec2;
use gloo_events::{EventListener, EventListenerOptions};
use wasm_bindgen::JsCast;
use web_sys::{window, HtmlCanvasElement, MouseEvent, WheelEvent};

use super::{MouseButton, PointerInput};

/// Handles DOM pointer events and updates the shared [`PointerInput`].
pub struct WasmPointerHandler {
    listeners: Vec<EventListener>,
}

impl WasmPointerHandler {
    pub fn attach(canvas: &HtmlCanvasElement, input: Arc<PointerInput>) -> Result<Self> {
        let window = window().ok_or_else(|| anyhow!("window not available"))?;

        let mut listeners = Vec::new();

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(canvas, "mousedown", move |event| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    input_state.move_to(offset(event));
                    input_state.set_button_down(MouseButton::new(event.button() as u8));
                }
            }));
        }

        // Releases are watched on the window so a drag that leaves the canvas still ends.
        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&window, "mouseup", move |event| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    input_state.set_button_up(MouseButton::new(event.button() as u8));
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(canvas, "mousemove", move |event| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    input_state.move_to(offset(event));
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new_with_options(
                canvas,
                "wheel",
                EventListenerOptions::enable_prevent_default(),
                move |event| {
                    if let Some(event) = event.dyn_ref::<WheelEvent>() {
                        event.prevent_default();
                        input_state.wheel(event.delta_y() as f32);
                    }
                },
            ));
        }

        listeners.push(EventListener::new_with_options(
            canvas,
            "contextmenu",
            EventListenerOptions::enable_prevent_default(),
            |event| event.prevent_default(),
        ));

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&window, "blur", move |_| {
                input_state.release_all();
            }));
        }

        Ok(Self { listeners })
    }
}

impl Drop for WasmPointerHandler {
    fn drop(&mut self) {
        self.listeners.clear();
    }
}

fn offset(event: &MouseEvent) -> Vec2 {
    Vec2::new(event.offset_x() as f32, event.offset_y() as f32)
}
