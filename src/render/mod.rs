mod bloom;
mod chain;
mod gpu;
pub mod headless;
mod shaders;

pub use chain::{
    BloomSettings, FrameInputs, PassChain, PassKind, RenderBackend, RenderError, RenderPipeline,
    ToneMapping,
};
pub use gpu::GpuBackend;
pub use headless::{FrameRecord, HeadlessBackend};
