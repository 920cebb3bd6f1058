//! Draw-pipeline emulation for the GS on WebGPU.
//!
//! This crate owns the hot path between the GS-state-driven renderer and
//! the host GPU: it batches triangles, tracks dirty draw state, resolves
//! capability descriptors to cached pipelines and bind groups (compiling
//! freshly synthesized WGSL on a miss), and issues one draw call per
//! batch. Pixels never touch the render target — the generated fragment
//! programs read and write the emulated video memory buffer directly, in
//! the guest's own pixel formats.
//!
//! Device/swapchain setup, frame pacing, and population of the memory
//! buffer, CLUT and swizzle-lookup images are collaborator concerns; see
//! [`DrawContext`] and [`FrameLifecycle`] for the exact boundary.

mod batch;
mod cache;
mod config;
mod context;
mod draw;
mod frame;
mod pipeline;
mod state;
mod stats;
mod vertex;

pub use cache::CacheStats;
pub use config::DrawConfig;
pub use context::{ContextError, DrawContext};
pub use draw::{Draw, MAX_VERTEX_COUNT};
pub use frame::{FrameLifecycle, FrameQueue};
pub use pipeline::{BindGroupCache, DrawPipeline, PipelineCache};
pub use state::{
    DepthbufferParams, DrawState, FramebufferParams, PushConstants, ScissorRect,
    TextureAlphaParams, TextureClampParams, TextureParams,
};
pub use stats::DrawStats;
pub use vertex::PrimVertex;

pub use prism_formats::{PixelFormat, StorageClass, VRAM_BYTES};
pub use prism_shadergen::{
    AlphaTestFunc, BlendAlphaTerm, BlendColorTerm, ClampMode, DepthTestFunc, DescriptorSetCaps,
    PipelineCaps, TextureFunction, DRAW_AREA_SIZE,
};
