//! The committed draw state: everything a flushed batch is drawn under.
//!
//! Setters on the orchestrator compare against this state, flush the
//! pending batch under the old values, and only then commit — so each
//! batch sees exactly one consistent snapshot. The push-constant block is
//! packed from here at flush time and never read again afterwards.

use bytemuck::{Pod, Zeroable};
use prism_shadergen::{PipelineCaps, DRAW_AREA_SIZE, PUSH_CONSTANTS_SIZE};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FramebufferParams {
    pub addr: u32,
    pub width: u32,
    pub write_mask: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthbufferParams {
    pub addr: u32,
    pub width: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureParams {
    pub buf_addr: u32,
    pub buf_width: u32,
    pub width: u32,
    pub height: u32,
    /// CLUT entry offset applied to 4-bit palette indices.
    pub csa: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureAlphaParams {
    pub a0: u32,
    pub a1: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureClampParams {
    pub min_u: u32,
    pub min_v: u32,
    pub max_u: u32,
    pub max_v: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for ScissorRect {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: DRAW_AREA_SIZE,
            height: DRAW_AREA_SIZE,
        }
    }
}

/// Per-flush uniform block. Field order mirrors the `PushConstants` struct
/// the lowering pass declares; the two must stay in lockstep.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PushConstants {
    pub fb_buf_addr: i32,
    pub fb_buf_width: i32,
    pub fb_write_mask: u32,
    pub depth_buf_addr: i32,
    pub depth_buf_width: i32,
    pub tex_buf_addr: i32,
    pub tex_buf_width: i32,
    pub tex_width: i32,
    pub tex_height: i32,
    pub tex_csa: i32,
    pub tex_a0: i32,
    pub tex_a1: i32,
    pub alpha_ref: u32,
    pub alpha_fix: i32,
    pub clamp_min_u: i32,
    pub clamp_min_v: i32,
    pub clamp_max_u: i32,
    pub clamp_max_v: i32,
}

const _: () = assert!(std::mem::size_of::<PushConstants>() == PUSH_CONSTANTS_SIZE as usize);

/// The full committed state owned by the orchestrator. No hidden globals:
/// this struct is the single authority on what the next flush draws with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrawState {
    pub caps: PipelineCaps,
    pub framebuffer: FramebufferParams,
    pub depthbuffer: DepthbufferParams,
    pub texture: TextureParams,
    pub texture_alpha: TextureAlphaParams,
    pub alpha_ref: u32,
    pub clamp: TextureClampParams,
    pub alpha_fix: u32,
    pub scissor: ScissorRect,
}

impl DrawState {
    pub fn push_constants(&self) -> PushConstants {
        PushConstants {
            fb_buf_addr: self.framebuffer.addr as i32,
            fb_buf_width: self.framebuffer.width as i32,
            fb_write_mask: self.framebuffer.write_mask,
            depth_buf_addr: self.depthbuffer.addr as i32,
            depth_buf_width: self.depthbuffer.width as i32,
            tex_buf_addr: self.texture.buf_addr as i32,
            tex_buf_width: self.texture.buf_width as i32,
            tex_width: self.texture.width as i32,
            tex_height: self.texture.height as i32,
            tex_csa: self.texture.csa as i32,
            tex_a0: self.texture_alpha.a0 as i32,
            tex_a1: self.texture_alpha.a1 as i32,
            alpha_ref: self.alpha_ref,
            alpha_fix: self.alpha_fix as i32,
            clamp_min_u: self.clamp.min_u as i32,
            clamp_min_v: self.clamp.min_v as i32,
            clamp_max_u: self.clamp.max_u as i32,
            clamp_max_v: self.clamp.max_v as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_match_the_shader_block_size() {
        assert_eq!(
            std::mem::size_of::<PushConstants>(),
            PUSH_CONSTANTS_SIZE as usize
        );
    }

    #[test]
    fn push_constants_pack_from_state() {
        let state = DrawState {
            framebuffer: FramebufferParams {
                addr: 0x20_0000,
                width: 640,
                write_mask: 0x00FF_FFFF,
            },
            depthbuffer: DepthbufferParams {
                addr: 0x30_0000,
                width: 640,
            },
            texture: TextureParams {
                buf_addr: 0x1000,
                buf_width: 256,
                width: 256,
                height: 128,
                csa: 16,
            },
            texture_alpha: TextureAlphaParams { a0: 0x80, a1: 0xFF },
            alpha_ref: 0x40,
            alpha_fix: 0x42,
            clamp: TextureClampParams {
                min_u: 1,
                min_v: 2,
                max_u: 3,
                max_v: 4,
            },
            ..DrawState::default()
        };
        let push = state.push_constants();
        assert_eq!(push.fb_buf_addr, 0x20_0000);
        assert_eq!(push.fb_write_mask, 0x00FF_FFFF);
        assert_eq!(push.tex_csa, 16);
        assert_eq!(push.alpha_ref, 0x40);
        assert_eq!(push.clamp_max_v, 4);
    }

    #[test]
    fn scissor_defaults_to_the_full_drawing_area() {
        let scissor = ScissorRect::default();
        assert_eq!((scissor.width, scissor.height), (DRAW_AREA_SIZE, DRAW_AREA_SIZE));
    }
}
