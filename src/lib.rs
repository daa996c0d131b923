//! Interactive 3D product showcase.
//!
//! The crate loads a display-case model, binds shared materials to its
//! named parts and renders it through a bloom and tone-mapping chain with
//! damped orbit controls. The same [`Showcase`] context drives a native
//! winit window, a browser canvas, or a headless backend that records what
//! each frame would have drawn.

pub mod app;
pub mod asset;
pub mod camera;
pub mod config;
pub mod fragment;
pub mod frame;
pub mod input;
pub mod material;
pub mod obj;
pub mod panel;
pub mod params;
pub mod policy;
pub mod render;
pub mod scene;
pub mod viewport;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{LoadError, ProductAssets, Showcase};
#[cfg(not(target_arch = "wasm32"))]
pub use asset::DirectorySource;
pub use asset::{AssetLoadError, AssetLoader, AssetSource, MemorySource};
pub use camera::{OrbitControls, PerspectiveCamera};
pub use config::{ConfigError, ShowcaseConfig};
pub use fragment::{Geometry, MaterialBinding, MeshNode, Node, SceneFragment, Transform};
#[cfg(not(target_arch = "wasm32"))]
pub use frame::SystemClock;
pub use frame::{FrameClock, FrameScheduler, FrameState, FrameTarget, FrameTime, TimeSource};
pub use input::{ClickTracker, MouseButton, PointerInput};
pub use material::{Material, MaterialId, MaterialKind, MaterialRegistry, TextureImage};
pub use obj::load_obj_from_str;
pub use panel::{ConfigPanel, PanelSchema, ParameterSink};
pub use params::{parse_assignment, LiveParameters, ParamKey, ParamValue, ParameterError};
pub use policy::{MaterialPolicy, Role};
pub use render::{
    FrameRecord, GpuBackend, HeadlessBackend, PassChain, RenderBackend, RenderError,
    RenderPipeline,
};
pub use scene::{Scene, SceneError};
pub use viewport::{FullscreenApi, FullscreenChange, Viewport};
