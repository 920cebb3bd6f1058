//! Shader synthesis for the emulated GS draw pipeline.
//!
//! Programs are described by a [`PipelineCaps`] capability descriptor,
//! built as a typed expression IR ([`ir`]) and lowered to WGSL ([`wgsl`]).
//! Generation is pure: equal descriptors produce byte-identical modules,
//! which is what makes the descriptor usable as a pipeline-cache key.

pub mod caps;
pub mod fragment;
pub mod ir;
pub mod reference;
pub mod vertex;
pub mod wgsl;

pub use caps::{
    AlphaTestFunc, BlendAlphaTerm, BlendColorTerm, ClampMode, DepthTestFunc, DescriptorSetCaps,
    PipelineCaps, TextureFunction,
};
pub use fragment::fragment_ir;
pub use vertex::vertex_ir;
pub use wgsl::{bindings, lower, PUSH_CONSTANTS_SIZE};

/// Side length of the fixed square drawing area, in pixels.
pub const DRAW_AREA_SIZE: u32 = 1024;

/// One past the maximum representable fixed-point depth value.
pub const DEPTH_MAX: f64 = 4_294_967_296.0;

/// Synthesizes the (capability-independent) vertex stage module.
pub fn vertex_wgsl() -> String {
    wgsl::lower(&vertex::vertex_ir())
}

/// Synthesizes the fragment stage module for one capability descriptor.
pub fn fragment_wgsl(caps: &PipelineCaps) -> String {
    wgsl::lower(&fragment::fragment_ir(caps))
}
