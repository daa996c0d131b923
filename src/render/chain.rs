use std::fmt;

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::camera::PerspectiveCamera;
use crate::panel::ParameterSink;
use crate::params::{ParamKey, ParamValue, ParameterError};
use crate::scene::Scene;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("GPU ran out of memory")]
    OutOfMemory,
    #[error("GPU device lost: {0}")]
    DeviceLost(String),
}

/// Stage of the post-processing chain, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    /// Draws the scene into the HDR target.
    Scene,
    /// Extracts bright areas, blurs them and adds them back.
    Bloom,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassKind::Scene => "scene",
            PassKind::Bloom => "bloom",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BloomSettings {
    /// Luminance above which a pixel starts to glow.
    pub threshold: f32,
    /// Multiplier applied to the blurred glow when it is added back.
    pub strength: f32,
    /// Spread of the blur, `0..=1`.
    pub radius: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            strength: 0.6,
            radius: 0.0,
        }
    }
}

impl BloomSettings {
    /// Distance in texels between blur taps.
    pub fn spread(&self) -> f32 {
        1.0 + 3.0 * self.radius.clamp(0.0, 1.0)
    }
}

/// Output stage. The control value is raised to the fourth power before it
/// scales the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneMapping {
    control: f32,
    exposure: f32,
}

impl Default for ToneMapping {
    fn default() -> Self {
        let mut tone = Self {
            control: 1.0,
            exposure: 1.0,
        };
        tone.set_control(1.0);
        tone
    }
}

impl ToneMapping {
    pub fn set_control(&mut self, value: f32) {
        self.control = value;
        self.exposure = value.powi(4);
    }

    /// Value as shown on the panel.
    pub fn control(&self) -> f32 {
        self.control
    }

    /// Multiplier applied before tone mapping.
    pub fn exposure(&self) -> f32 {
        self.exposure
    }
}

/// Fixed pass order plus the values the passes read every frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PassChain {
    pub bloom: BloomSettings,
    pub tone_mapping: ToneMapping,
}

impl PassChain {
    pub const PASSES: [PassKind; 2] = [PassKind::Scene, PassKind::Bloom];

    pub fn passes(&self) -> &'static [PassKind] {
        &Self::PASSES
    }
}

impl ParameterSink for PassChain {
    fn set_live_parameter(&mut self, key: ParamKey, value: ParamValue) -> Result<(), ParameterError> {
        let value = value.checked_for(key)?.as_scalar();
        match (key, value) {
            (ParamKey::Exposure, Some(value)) => self.tone_mapping.set_control(value),
            (ParamKey::BloomThreshold, Some(value)) => self.bloom.threshold = value,
            (ParamKey::BloomStrength, Some(value)) => self.bloom.strength = value,
            (ParamKey::BloomRadius, Some(value)) => self.bloom.radius = value,
            _ => return Err(ParameterError::WrongTarget(key)),
        }
        Ok(())
    }
}

/// Everything a backend needs for one frame.
pub struct FrameInputs<'a> {
    pub scene: &'a Scene,
    pub camera: &'a PerspectiveCamera,
    pub chain: &'a PassChain,
}

/// Executes a [`PassChain`] against some output.
pub trait RenderBackend {
    /// Resizes the output to `width` x `height` physical pixels.
    fn resize(&mut self, width: u32, height: u32);
    /// Runs every pass of the chain once. A frame that cannot be presented
    /// right now is skipped with `Ok`.
    fn submit(&mut self, frame: &FrameInputs<'_>) -> Result<(), RenderError>;
}

/// Owns the pass chain and hands frames to a backend.
pub struct RenderPipeline<B> {
    backend: B,
    chain: PassChain,
    frames: u64,
}

impl<B: RenderBackend> RenderPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            chain: PassChain::default(),
            frames: 0,
        }
    }

    pub fn chain(&self) -> &PassChain {
        &self.chain
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        debug!("render output resized to {width}x{height}");
        self.backend.resize(width.max(1), height.max(1));
    }

    /// Renders one frame with the current chain parameters.
    pub fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError> {
        let frame = FrameInputs {
            scene,
            camera,
            chain: &self.chain,
        };
        self.backend.submit(&frame)?;
        self.frames += 1;
        Ok(())
    }
}

impl<B: RenderBackend> ParameterSink for RenderPipeline<B> {
    fn set_live_parameter(&mut self, key: ParamKey, value: ParamValue) -> Result<(), ParameterError> {
        self.chain.set_live_parameter(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposure_is_applied_to_the_fourth_power() {
        let mut chain = PassChain::default();
        assert_eq!(chain.tone_mapping.exposure(), 1.0);
        chain
            .set_live_parameter(ParamKey::Exposure, ParamValue::Scalar(0.5))
            .unwrap();
        assert!((chain.tone_mapping.exposure() - 0.0625).abs() < 1e-7);
        assert_eq!(chain.tone_mapping.control(), 0.5);
    }

    #[test]
    fn bloom_parameters_are_independent() {
        let mut chain = PassChain::default();
        chain
            .set_live_parameter(ParamKey::BloomRadius, ParamValue::Scalar(1.0))
            .unwrap();
        assert_eq!(
            chain.bloom,
            BloomSettings {
                threshold: 0.5,
                strength: 0.6,
                radius: 1.0
            }
        );
        assert_eq!(chain.bloom.spread(), 4.0);
        assert_eq!(chain.tone_mapping.exposure(), 1.0);
    }

    #[test]
    fn scene_keys_are_rejected() {
        let mut chain = PassChain::default();
        assert_eq!(
            chain.set_live_parameter(ParamKey::FrameColor, ParamValue::Color(0)),
            Err(ParameterError::WrongTarget(ParamKey::FrameColor))
        );
    }

    #[test]
    fn passes_run_scene_then_bloom() {
        assert_eq!(
            PassChain::default().passes(),
            &[PassKind::Scene, PassKind::Bloom]
        );
    }
}
