//! The capability descriptor: the complete description of one draw
//! configuration, and the only input that shapes generated shader code.
//!
//! Two descriptors that compare equal always produce byte-identical WGSL;
//! the pipeline cache relies on this, so every field here must actually
//! influence generation (or be normalized away before the descriptor is
//! built by the caller).

use prism_formats::PixelFormat;

/// Texture/vertex-color combine function (GS `TFX`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFunction {
    Modulate,
    Decal,
    Highlight,
    Highlight2,
}

impl TextureFunction {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Modulate,
            1 => Self::Decal,
            2 => Self::Highlight,
            3 => Self::Highlight2,
            _ => return None,
        })
    }
}

/// Per-axis texture coordinate clamp policy (GS `WMS`/`WMT`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClampMode {
    /// Wrap by bitwise AND with `size - 1` (size is a power of two).
    Repeat,
    /// Clamp to `[0, size - 1]`.
    Clamp,
    /// Clamp to the explicit `[min, max]` region.
    RegionClamp,
    /// AND with the region minimum, OR with the region maximum.
    RegionRepeat,
}

impl ClampMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Repeat,
            1 => Self::Clamp,
            2 => Self::RegionClamp,
            3 => Self::RegionRepeat,
            _ => return None,
        })
    }
}

/// Alpha-test compare function (the subset of GS `ATST` the synthesizer
/// supports).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlphaTestFunc {
    Always,
    Equal,
    GreaterOrEqual,
}

impl AlphaTestFunc {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => Self::Always,
            4 => Self::Equal,
            5 => Self::GreaterOrEqual,
            _ => return None,
        })
    }
}

/// Depth-test compare function (GS `ZTST`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthTestFunc {
    Never,
    Always,
    GreaterOrEqual,
    Greater,
}

impl DepthTestFunc {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Never,
            1 => Self::Always,
            2 => Self::GreaterOrEqual,
            3 => Self::Greater,
            _ => return None,
        })
    }
}

/// Selector for the A, B and D terms of the blend equation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendColorTerm {
    Source,
    Dest,
    Zero,
}

impl BlendColorTerm {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Source,
            1 => Self::Dest,
            2 => Self::Zero,
            _ => return None,
        })
    }
}

/// Selector for the C (multiplier) term of the blend equation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendAlphaTerm {
    SourceAlpha,
    DestAlpha,
    Fixed,
}

impl BlendAlphaTerm {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::SourceAlpha,
            1 => Self::DestAlpha,
            2 => Self::Fixed,
            _ => return None,
        })
    }
}

/// Pipeline capability descriptor: the sole key of the pipeline cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineCaps {
    pub has_texture: bool,
    pub framebuffer_format: PixelFormat,
    pub depthbuffer_format: PixelFormat,
    pub texture_format: PixelFormat,
    /// Palette format; only meaningful when `texture_format` is indexed.
    pub clut_format: PixelFormat,
    pub tex_clamp_u: ClampMode,
    pub tex_clamp_v: ClampMode,
    pub texture_function: TextureFunction,
    /// Whether the texture format carries native alpha bits.
    pub texture_has_alpha: bool,
    /// Force alpha to zero when the sampled color sums to exactly zero.
    pub texture_black_is_transparent: bool,
    pub alpha_test: AlphaTestFunc,
    pub depth_test: DepthTestFunc,
    pub has_alpha_blending: bool,
    pub blend_a: BlendColorTerm,
    pub blend_b: BlendColorTerm,
    pub blend_c: BlendAlphaTerm,
    pub blend_d: BlendColorTerm,
    pub write_depth: bool,
    /// Set when the framebuffer write mask is not all-ones, so the
    /// destination pixel must be read even without blending.
    pub mask_color: bool,
}

impl Default for PipelineCaps {
    fn default() -> Self {
        Self {
            has_texture: false,
            framebuffer_format: PixelFormat::Psmct32,
            depthbuffer_format: PixelFormat::Psmz32,
            texture_format: PixelFormat::Psmct32,
            clut_format: PixelFormat::Psmct32,
            tex_clamp_u: ClampMode::Repeat,
            tex_clamp_v: ClampMode::Repeat,
            texture_function: TextureFunction::Modulate,
            texture_has_alpha: false,
            texture_black_is_transparent: false,
            alpha_test: AlphaTestFunc::Always,
            depth_test: DepthTestFunc::Always,
            has_alpha_blending: false,
            blend_a: BlendColorTerm::Source,
            blend_b: BlendColorTerm::Zero,
            blend_c: BlendAlphaTerm::SourceAlpha,
            blend_d: BlendColorTerm::Zero,
            write_depth: false,
            mask_color: false,
        }
    }
}

impl PipelineCaps {
    /// Projects out the fields that decide resource bindings. This is the
    /// key of the descriptor-set cache and is only ever derived from a full
    /// descriptor.
    pub fn descriptor_caps(&self) -> DescriptorSetCaps {
        DescriptorSetCaps {
            has_texture: self.has_texture,
            framebuffer_format: self.framebuffer_format,
            depthbuffer_format: self.depthbuffer_format,
            texture_format: self.texture_format,
        }
    }
}

/// The format-relevant projection of [`PipelineCaps`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorSetCaps {
    pub has_texture: bool,
    pub framebuffer_format: PixelFormat,
    pub depthbuffer_format: PixelFormat,
    pub texture_format: PixelFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_caps_ignores_shading_state() {
        let mut a = PipelineCaps {
            has_texture: true,
            ..PipelineCaps::default()
        };
        let mut b = a;
        // Differ in every non-format field.
        a.texture_function = TextureFunction::Decal;
        b.texture_function = TextureFunction::Highlight2;
        a.depth_test = DepthTestFunc::Greater;
        b.depth_test = DepthTestFunc::Never;
        a.has_alpha_blending = true;
        assert_ne!(a, b);
        assert_eq!(a.descriptor_caps(), b.descriptor_caps());
    }

    #[test]
    fn descriptor_caps_tracks_formats() {
        let a = PipelineCaps::default();
        let b = PipelineCaps {
            framebuffer_format: PixelFormat::Psmct16,
            ..a
        };
        assert_ne!(a.descriptor_caps(), b.descriptor_caps());
    }

    #[test]
    fn raw_register_decoding() {
        assert_eq!(TextureFunction::from_raw(3), Some(TextureFunction::Highlight2));
        assert_eq!(AlphaTestFunc::from_raw(5), Some(AlphaTestFunc::GreaterOrEqual));
        // LESS is real hardware state but outside the synthesizable subset.
        assert_eq!(AlphaTestFunc::from_raw(2), None);
        assert_eq!(DepthTestFunc::from_raw(2), Some(DepthTestFunc::GreaterOrEqual));
        assert_eq!(ClampMode::from_raw(3), Some(ClampMode::RegionRepeat));
        assert_eq!(BlendColorTerm::from_raw(2), Some(BlendColorTerm::Zero));
        assert_eq!(BlendAlphaTerm::from_raw(2), Some(BlendAlphaTerm::Fixed));
    }
}
