use serde::Serialize;

use super::chain::{BloomSettings, FrameInputs, PassKind, RenderBackend, RenderError};
use crate::material::linear_to_srgb_hex;
use crate::policy::Role;

/// What the headless backend saw for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub passes: Vec<PassKind>,
    pub draw_calls: usize,
    pub blended_draw_calls: usize,
    pub exposure: f32,
    pub bloom: BloomSettings,
    pub camera_position: [f32; 3],
    pub frame_color: Option<String>,
}

/// Backend without a GPU: runs the chain bookkeeping and records a summary
/// of every frame.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: (u32, u32),
    frames: u64,
    last: Option<FrameRecord>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width.max(1), height.max(1)),
            frames: 0,
            last: None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.last.as_ref()
    }
}

impl RenderBackend for HeadlessBackend {
    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn submit(&mut self, frame: &FrameInputs<'_>) -> Result<(), RenderError> {
        let materials = frame.scene.materials();
        let items = frame.scene.draw_list();
        let blended = items
            .iter()
            .filter(|item| {
                materials
                    .get(item.material)
                    .is_some_and(|material| material.is_blended())
            })
            .count();
        let frame_color = materials
            .role(Role::Frame)
            .and_then(|id| materials.get(id))
            .map(|material| format!("#{:06x}", linear_to_srgb_hex(material.color)));

        self.last = Some(FrameRecord {
            index: self.frames,
            width: self.size.0,
            height: self.size.1,
            passes: frame.chain.passes().to_vec(),
            draw_calls: items.len(),
            blended_draw_calls: blended,
            exposure: frame.chain.tone_mapping.exposure(),
            bloom: frame.chain.bloom,
            camera_position: frame.camera.position.to_array(),
            frame_color,
        });
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::panel::ParameterSink;
    use crate::params::{ParamKey, ParamValue};
    use crate::render::RenderPipeline;
    use crate::scene::Scene;

    #[test]
    fn parameter_changes_show_up_in_the_next_frame() {
        let scene = Scene::default();
        let camera = PerspectiveCamera::new(1.0);
        let mut pipeline = RenderPipeline::new(HeadlessBackend::new(640, 480));

        pipeline.render(&scene, &camera).unwrap();
        let first = pipeline.backend().last_frame().unwrap().clone();
        assert_eq!(first.exposure, 1.0);
        assert_eq!(first.passes, vec![PassKind::Scene, PassKind::Bloom]);

        pipeline
            .set_live_parameter(ParamKey::Exposure, ParamValue::Scalar(0.5))
            .unwrap();
        pipeline
            .set_live_parameter(ParamKey::BloomStrength, ParamValue::Scalar(2.0))
            .unwrap();
        pipeline.render(&scene, &camera).unwrap();
        let second = pipeline.backend().last_frame().unwrap();
        assert_eq!(second.index, 1);
        assert!((second.exposure - 0.0625).abs() < 1e-7);
        assert_eq!(second.bloom.strength, 2.0);
        assert_eq!(pipeline.frame_count(), 2);
    }

    #[test]
    fn resize_reaches_the_backend() {
        let mut pipeline = RenderPipeline::new(HeadlessBackend::new(640, 480));
        pipeline.resize(0, 300);
        assert_eq!(pipeline.backend().size(), (1, 300));
    }
}
