//! The showcase context: one owner for everything a frame touches.

use std::sync::Arc;

use glam::Vec2;
use log::{info, warn};
use thiserror::Error;

use crate::asset::{AssetLoadError, AssetLoader, AssetSource};
use crate::camera::{OrbitControls, PerspectiveCamera};
use crate::config::ShowcaseConfig;
use crate::fragment::SceneFragment;
use crate::frame::{FrameTarget, FrameTime};
use crate::input::PointerInput;
use crate::material::TextureImage;
use crate::panel::{ConfigPanel, ParameterSink};
use crate::params::{LiveParameters, ParamKey, ParamTarget, ParamValue, ParameterError};
use crate::policy::MaterialPolicy;
use crate::render::{RenderBackend, RenderError, RenderPipeline};
use crate::scene::{ProductGroup, Scene, SceneError};
use crate::viewport::{FullscreenApi, FullscreenChange, Viewport};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Asset(#[from] AssetLoadError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Everything fetched for the product before it is attached.
#[derive(Debug, Clone)]
pub struct ProductAssets {
    pub fragment: SceneFragment,
    pub floor_shadow: Option<TextureImage>,
    pub floor_alpha: Option<TextureImage>,
}

impl ProductAssets {
    /// Fetches the model and the floor textures. A texture that fails to
    /// load is logged and left out; a model that fails is an error.
    pub async fn fetch<S: AssetSource>(
        loader: &AssetLoader<S>,
        config: &ShowcaseConfig,
    ) -> Result<Self, AssetLoadError> {
        let fragment = loader.load(&config.asset).await?;
        let floor_shadow = optional_texture(loader, &config.floor_shadow).await;
        let floor_alpha = optional_texture(loader, &config.floor_alpha).await;
        Ok(Self {
            fragment,
            floor_shadow,
            floor_alpha,
        })
    }
}

async fn optional_texture<S: AssetSource>(
    loader: &AssetLoader<S>,
    path: &str,
) -> Option<TextureImage> {
    match loader.load_texture(path).await {
        Ok(image) => Some(image),
        Err(err) => {
            warn!("continuing without texture: {err}");
            None
        }
    }
}

/// Scene, camera, controls, render pipeline, viewport and live parameters
/// of one showcase session.
pub struct Showcase<B> {
    scene: Scene,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    pipeline: RenderPipeline<B>,
    viewport: Viewport,
    parameters: LiveParameters,
    panel: ConfigPanel,
    pointer: Arc<PointerInput>,
}

impl<B: RenderBackend> Showcase<B> {
    pub fn new(backend: B, viewport: Viewport, config: &ShowcaseConfig) -> Self {
        let scene = Scene::new(MaterialPolicy::with_aliases(&config.role_aliases));
        let controls = OrbitControls::default();
        let mut camera = PerspectiveCamera::new(viewport.aspect());
        camera.look_at(controls.target);

        let mut pipeline = RenderPipeline::new(backend);
        let (width, height) = viewport.physical_size();
        pipeline.resize(width, height);

        Self {
            scene,
            camera,
            controls,
            pipeline,
            viewport,
            parameters: LiveParameters::default(),
            panel: ConfigPanel::default(),
            pointer: Arc::new(PointerInput::new()),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn pipeline(&self) -> &RenderPipeline<B> {
        &self.pipeline
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn parameters(&self) -> &LiveParameters {
        &self.parameters
    }

    pub fn panel(&self) -> &ConfigPanel {
        &self.panel
    }

    /// Shared with the host's input listeners.
    pub fn pointer(&self) -> &Arc<PointerInput> {
        &self.pointer
    }

    /// Applies the initial parameter values of a configuration.
    pub fn apply_config(&mut self, config: &ShowcaseConfig) -> Result<(), ParameterError> {
        for (key, value) in &config.parameters {
            self.edit_parameter(*key, *value)?;
        }
        Ok(())
    }

    /// Applies a panel edit, clamped and snapped like the control would.
    pub fn edit_parameter(
        &mut self,
        key: ParamKey,
        value: ParamValue,
    ) -> Result<ParamValue, ParameterError> {
        let value = self.panel.normalize(key, value)?;
        self.set_live_parameter(key, value)?;
        Ok(value)
    }

    /// Applies a panel edit given as text, e.g. `("bloomStrength", "1.2")`.
    pub fn edit_parameter_text(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<ParamValue, ParameterError> {
        let key =
            ParamKey::from_name(name).ok_or_else(|| ParameterError::UnknownKey(name.to_string()))?;
        let value = ParamValue::parse(key, text)?;
        self.edit_parameter(key, value)
    }

    /// Fetches the product and attaches it. Only the first successful call
    /// attaches anything.
    pub async fn load_product<S: AssetSource>(
        &mut self,
        loader: &AssetLoader<S>,
        config: &ShowcaseConfig,
    ) -> Result<&ProductGroup, LoadError> {
        if self.scene.is_attached() {
            return Err(SceneError::AlreadyAttached.into());
        }
        let assets = ProductAssets::fetch(loader, config).await?;
        Ok(self.install_product(assets)?)
    }

    /// Attaches already fetched assets.
    pub fn install_product(&mut self, assets: ProductAssets) -> Result<&ProductGroup, SceneError> {
        if self.scene.is_attached() {
            return Err(SceneError::AlreadyAttached);
        }
        self.scene
            .set_floor_textures(assets.floor_shadow, assets.floor_alpha);
        self.scene.attach_product(assets.fragment)
    }

    /// Applies a host resize: viewport, camera aspect, then the render
    /// output at the capped pixel ratio.
    pub fn handle_resize(&mut self, width: u32, height: u32, host_pixel_ratio: f32) {
        self.viewport.resize(width, height, host_pixel_ratio);
        self.camera.set_aspect(self.viewport.aspect());
        let (physical_width, physical_height) = self.viewport.physical_size();
        self.pipeline.resize(physical_width, physical_height);
        info!(
            "viewport {}x{} at pixel ratio {}",
            self.viewport.width(),
            self.viewport.height(),
            self.viewport.pixel_ratio()
        );
    }

    pub fn toggle_fullscreen(&mut self, apis: &[&dyn FullscreenApi]) -> FullscreenChange {
        self.viewport.toggle_fullscreen(apis)
    }
}

impl<B: RenderBackend> FrameTarget for Showcase<B> {
    fn advance(&mut self, time: FrameTime) {
        let input = self.pointer.take_frame();
        let height = self.viewport.height() as f32;
        if input.rotate != Vec2::ZERO {
            self.controls.rotate_by_pixels(input.rotate, height);
        }
        if input.pan != Vec2::ZERO {
            self.controls.pan_by_pixels(&self.camera, input.pan, height);
        }
        if input.wheel != 0.0 {
            self.controls.dolly(input.wheel);
        }
        self.controls.update(&mut self.camera, time.delta);
    }

    fn render(&mut self) -> Result<(), RenderError> {
        self.pipeline.render(&self.scene, &self.camera)
    }
}

impl<B: RenderBackend> ParameterSink for Showcase<B> {
    fn set_live_parameter(&mut self, key: ParamKey, value: ParamValue) -> Result<(), ParameterError> {
        let value = value.checked_for(key)?;
        match key.target() {
            ParamTarget::Controls => {
                let Some(scalar) = value.as_scalar() else {
                    return Err(ParameterError::KindMismatch {
                        key,
                        expected: key.kind(),
                    });
                };
                match key {
                    ParamKey::AutoRotateSpeed => self.controls.auto_rotate_speed = scalar,
                    ParamKey::Damping => self.controls.damping_factor = scalar,
                    _ => return Err(ParameterError::WrongTarget(key)),
                }
            }
            ParamTarget::Scene => self.scene.set_live_parameter(key, value)?,
            ParamTarget::Pipeline => self.pipeline.set_live_parameter(key, value)?,
        }
        self.parameters.record(key, value);
        Ok(())
    }
}
