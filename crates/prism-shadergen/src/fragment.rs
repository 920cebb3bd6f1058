//! Fragment stage synthesis: the emulated per-pixel pipeline, driven
//! entirely by the capability descriptor.
//!
//! The generated program samples the texture (if any) straight out of the
//! emulated-memory buffer through the per-format swizzle tables, runs the
//! combine/alpha stages, and then performs the destination
//! read-modify-write inside the interlocked region: destination reads,
//! depth test, blend, masked commit and the conditional depth write.
//!
//! A capability combination the emulated hardware cannot produce (for
//! example a depth format used as a framebuffer) is a caller bug and
//! panics; there is no recoverable error path here.

use prism_formats::{PixelFormat, StorageClass, CLUT_HIGH_HALF_OFFSET, PAGE_BYTES};

use crate::caps::{
    AlphaTestFunc, BlendAlphaTerm, BlendColorTerm, ClampMode, DepthTestFunc, PipelineCaps,
    TextureFunction,
};
use crate::ir::{
    self, BindingSet, Expr, Image, Input, Local, MemWidth, Output, PushField, ShaderBuilder,
    ShaderIr, Ty,
};
use crate::DEPTH_MAX;

pub fn fragment_ir(caps: &PipelineCaps) -> ShaderIr {
    let bindings = BindingSet {
        texture: caps.has_texture,
        clut: caps.has_texture && caps.texture_format.is_indexed(),
    };
    let mut b = ShaderBuilder::fragment(bindings);

    let src_depth = b.let_(
        "src_depth",
        (ir::input(Input::Depth) * ir::f32(DEPTH_MAX as f32)).to_u32(),
    );

    let texture_color = b.var(
        "texture_color",
        Ty::F32x4,
        ir::splat(Ty::F32x4, ir::f32(1.0)),
    );
    if caps.has_texture {
        sample_texture(&mut b, caps, texture_color);
        if caps.texture_has_alpha {
            expand_alpha(&mut b, caps, texture_color);
        }
        apply_texture_function(&mut b, caps, texture_color);
    } else {
        b.set(texture_color, ir::input(Input::Color));
    }

    let alpha_q = b.let_(
        "alpha_q",
        (texture_color.get().w() * ir::f32(255.0)).to_u32(),
    );
    let alpha_pass = b.let_(
        "alpha_pass",
        match caps.alpha_test {
            AlphaTestFunc::Always => ir::Expr::Bool(true),
            AlphaTestFunc::Equal => alpha_q.clone().ceq(ir::push(PushField::AlphaRef)),
            AlphaTestFunc::GreaterOrEqual => alpha_q.cge(ir::push(PushField::AlphaRef)),
        },
    );

    let screen_pos = b.let_(
        "screen_pos",
        ir::input(Input::FragCoord).xy().cast(Ty::I32x2),
    );

    let fb_addr = match caps.framebuffer_format {
        PixelFormat::Psmct32 | PixelFormat::Psmct24 => pixel_address(
            &mut b,
            "fb_addr",
            Image::FbSwizzle,
            StorageClass::Ct32,
            ir::push(PushField::FbBufAddr),
            ir::push(PushField::FbBufWidth),
            screen_pos.clone(),
        ),
        PixelFormat::Psmct16 | PixelFormat::Psmct16s => pixel_address(
            &mut b,
            "fb_addr",
            Image::FbSwizzle,
            StorageClass::Ct16,
            ir::push(PushField::FbBufAddr),
            ir::push(PushField::FbBufWidth),
            screen_pos.clone(),
        ),
        other => panic!("unsupported framebuffer format {other:?}"),
    };

    // TODO: address PSMZ16/PSMZ16S through a dedicated swizzle table once
    // the context uploads one; the page geometry matches PSMCT16 so the
    // shared scheme is exact for linear layouts only.
    let depth_addr = match caps.depthbuffer_format {
        PixelFormat::Psmz32 | PixelFormat::Psmz24 => pixel_address(
            &mut b,
            "depth_addr",
            Image::DepthSwizzle,
            StorageClass::Z32,
            ir::push(PushField::DepthBufAddr),
            ir::push(PushField::DepthBufWidth),
            screen_pos.clone(),
        ),
        PixelFormat::Psmz16 | PixelFormat::Psmz16s => pixel_address(
            &mut b,
            "depth_addr",
            Image::DepthSwizzle,
            StorageClass::Ct16,
            ir::push(PushField::DepthBufAddr),
            ir::push(PushField::DepthBufWidth),
            screen_pos,
        ),
        other => panic!("unsupported depthbuffer format {other:?}"),
    };

    let dst_color = b.var("dst_color", Ty::F32x4, ir::splat(Ty::F32x4, ir::f32(0.0)));

    b.interlocked(fb_addr.clone(), |b| {
        let dst_pixel = b.var("dst_pixel", Ty::U32, ir::u32(0));
        if caps.has_alpha_blending || caps.mask_color {
            read_destination_color(b, caps, fb_addr.clone(), dst_pixel, dst_color);
        }

        let needs_dst_depth = matches!(
            caps.depth_test,
            DepthTestFunc::GreaterOrEqual | DepthTestFunc::Greater
        );
        let dst_depth = if needs_dst_depth {
            Some(b.let_("dst_depth", read_depth(caps, depth_addr.clone())))
        } else {
            None
        };
        let depth_pass = b.let_(
            "depth_pass",
            match caps.depth_test {
                DepthTestFunc::Always => Expr::Bool(true),
                DepthTestFunc::Never => Expr::Bool(false),
                DepthTestFunc::GreaterOrEqual => src_depth
                    .clone()
                    .cge(dst_depth.clone().expect("destination depth read above")),
                DepthTestFunc::Greater => src_depth
                    .clone()
                    .cgt(dst_depth.clone().expect("destination depth read above")),
            },
        );

        if caps.has_alpha_blending {
            let blend_a = b.let_("blend_a", color_term(caps.blend_a, texture_color, dst_color));
            let blend_b = b.let_("blend_b", color_term(caps.blend_b, texture_color, dst_color));
            let blend_c = b.let_("blend_c", alpha_term(caps.blend_c, texture_color, dst_color));
            let blend_d = b.let_("blend_d", color_term(caps.blend_d, texture_color, dst_color));
            let blended = (blend_a - blend_b) * blend_c * ir::splat(Ty::F32x3, ir::f32(2.0))
                + blend_d;
            b.set(
                dst_color,
                clamp01(ir::f32x4(vec![blended, texture_color.get().w()])),
            );
        } else {
            b.set(dst_color, texture_color.get());
        }

        b.if_(alpha_pass.clone().and(depth_pass), |b| {
            write_framebuffer(b, caps, fb_addr.clone(), dst_pixel, dst_color);
            if caps.write_depth {
                write_depthbuffer(b, caps, depth_addr.clone(), src_depth.clone());
            }
        });
    });

    b.output(Output::FragColor, dst_color.get());
    b.finish()
}

/// Emits the page-plus-swizzle-table address computation shared by every
/// surface access; `storage` picks the page geometry and addressing unit.
fn pixel_address(
    b: &mut ShaderBuilder,
    name: &str,
    image: Image,
    storage: StorageClass,
    base: Expr,
    buf_width: Expr,
    pos: Expr,
) -> Expr {
    let page_width = || ir::i32(storage.page_width() as i32);
    let page_height = || ir::i32(storage.page_height() as i32);

    let page = (pos.clone().x() / page_width())
        + (pos.clone().y() / page_height()) * (buf_width / page_width());
    let offset = ir::fetch(
        image,
        ir::i32x2(
            pos.clone().x() % page_width(),
            pos.y() % page_height(),
        ),
    )
    .to_i32();
    let page_base = base + page * ir::i32(PAGE_BYTES as i32);
    let addr = if storage.nibble_addressed() {
        page_base * ir::i32(2) + offset
    } else {
        page_base + offset
    };
    b.let_(name, addr)
}

fn sample_texture(b: &mut ShaderBuilder, caps: &PipelineCaps, out: Local) {
    let tex_size = b.let_(
        "tex_size",
        ir::i32x2(ir::push(PushField::TexWidth), ir::push(PushField::TexHeight)).cast(Ty::F32x2),
    );
    let texel_pos = b.let_(
        "texel_pos",
        (ir::input(Input::TexCoord).xy() / ir::input(Input::TexCoord).sw("zz") * tex_size)
            .cast(Ty::I32x2),
    );
    let tex_u = b.let_(
        "tex_u",
        clamp_coord(
            caps.tex_clamp_u,
            texel_pos.clone().x(),
            ir::push(PushField::TexWidth),
            ir::push(PushField::ClampMinU),
            ir::push(PushField::ClampMaxU),
        ),
    );
    let tex_v = b.let_(
        "tex_v",
        clamp_coord(
            caps.tex_clamp_v,
            texel_pos.y(),
            ir::push(PushField::TexHeight),
            ir::push(PushField::ClampMinV),
            ir::push(PushField::ClampMaxV),
        ),
    );
    let tex_pos = b.let_("tex_pos", ir::i32x2(tex_u, tex_v));
    let color = texture_color_expr(b, caps, tex_pos);
    b.set(out, color);
}

fn clamp_coord(mode: ClampMode, coord: Expr, size: Expr, min: Expr, max: Expr) -> Expr {
    match mode {
        ClampMode::Repeat => coord & (size - ir::i32(1)),
        ClampMode::Clamp => ir::clamp(coord, ir::i32(0), size - ir::i32(1)),
        ClampMode::RegionClamp => ir::clamp(coord, min, max),
        ClampMode::RegionRepeat => (coord & min) | max,
    }
}

fn texture_color_expr(b: &mut ShaderBuilder, caps: &PipelineCaps, pos: Expr) -> Expr {
    let base = ir::push(PushField::TexBufAddr);
    let width = ir::push(PushField::TexBufWidth);
    match caps.texture_format {
        PixelFormat::Psmct32 => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::Ct32, base, width, pos);
            let pixel = b.let_("tex_pixel", ir::mem_load(MemWidth::Word, addr));
            psm32_to_rgba(pixel)
        }
        PixelFormat::Psmct24 => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::Ct32, base, width, pos);
            let pixel = b.let_("tex_pixel", ir::mem_load(MemWidth::Triple, addr));
            psm32_to_rgba(pixel)
        }
        PixelFormat::Psmct16 | PixelFormat::Psmct16s => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::Ct16, base, width, pos);
            let pixel = b.let_("tex_pixel", ir::mem_load(MemWidth::Half, addr));
            psm16_to_rgba(pixel)
        }
        PixelFormat::Psmt8 => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::T8, base, width, pos);
            let pixel = b.let_("tex_pixel", ir::mem_load(MemWidth::Byte, addr));
            clut_color(b, caps, pixel)
        }
        PixelFormat::Psmt4 => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::T4, base, width, pos);
            let pixel = b.let_("tex_pixel", ir::mem_load(MemWidth::Nibble, addr));
            clut_color(b, caps, pixel)
        }
        PixelFormat::Psmt8h => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::Ct32, base, width, pos);
            let pixel = b.let_(
                "tex_pixel",
                ir::mem_load(MemWidth::Byte, addr + ir::i32(3)),
            );
            clut_color(b, caps, pixel)
        }
        PixelFormat::Psmt4hl => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::Ct32, base, width, pos);
            let nibble_addr = b.let_("tex_nibble_addr", (addr + ir::i32(3)) * ir::i32(2));
            let pixel = b.let_("tex_pixel", ir::mem_load(MemWidth::Nibble, nibble_addr));
            clut_color(b, caps, pixel)
        }
        PixelFormat::Psmt4hh => {
            let addr = pixel_address(b, "tex_addr", Image::TexSwizzle, StorageClass::Ct32, base, width, pos);
            let nibble_addr = b.let_(
                "tex_nibble_addr",
                ((addr + ir::i32(3)) * ir::i32(2)) | ir::i32(1),
            );
            let pixel = b.let_("tex_pixel", ir::mem_load(MemWidth::Nibble, nibble_addr));
            clut_color(b, caps, pixel)
        }
        other => panic!("unsupported texture format {other:?}"),
    }
}

/// Resolves an index texel through the color-lookup table. 32-bit palette
/// entries are split across two image texels (low/high 16-bit halves).
fn clut_color(b: &mut ShaderBuilder, caps: &PipelineCaps, texel: Expr) -> Expr {
    assert!(caps.texture_format.is_indexed());

    let index = if caps.texture_format.is_indexed8() {
        b.let_("clut_index", texel.to_i32())
    } else {
        b.let_(
            "clut_index",
            texel.to_i32() + ir::push(PushField::TexCsa),
        )
    };
    match caps.clut_format {
        PixelFormat::Psmct32 | PixelFormat::Psmct24 => {
            let lo = ir::fetch(Image::Clut, ir::i32x2(index.clone(), ir::i32(0)));
            let hi = ir::fetch(
                Image::Clut,
                ir::i32x2(index + ir::i32(CLUT_HIGH_HALF_OFFSET), ir::i32(0)),
            );
            let entry = b.let_("clut_entry", lo | (hi << ir::u32(16)));
            psm32_to_rgba(entry)
        }
        other => panic!("unsupported CLUT format {other:?}"),
    }
}

/// Replaces the single-bit native alpha with the configured A0/A1 constants
/// for the formats that need it.
fn expand_alpha(b: &mut ShaderBuilder, caps: &PipelineCaps, texture_color: Local) {
    let requires_expansion = if caps.texture_format.is_indexed() {
        matches!(
            caps.clut_format,
            PixelFormat::Psmct16 | PixelFormat::Psmct16s
        )
    } else {
        matches!(
            caps.texture_format,
            PixelFormat::Psmct24 | PixelFormat::Psmct16 | PixelFormat::Psmct16s
        )
    };
    if !requires_expansion {
        return;
    }

    let a0 = ir::push(PushField::TexA0).to_f32() / ir::f32(255.0);
    let a1 = ir::push(PushField::TexA1).to_f32() / ir::f32(255.0);
    let alpha = b.let_("expanded_alpha", ir::mix(a0, a1, texture_color.get().w()));
    b.set(
        texture_color,
        ir::f32x4(vec![texture_color.get().xyz(), alpha]),
    );

    if caps.texture_black_is_transparent {
        // The channels are non-negative, so a zero sum means pure black.
        let color_sum = b.let_(
            "color_sum",
            texture_color.get().x() + texture_color.get().y() + texture_color.get().z(),
        );
        b.if_(color_sum.ceq(ir::f32(0.0)), |b| {
            b.set(
                texture_color,
                ir::f32x4(vec![texture_color.get().xyz(), ir::f32(0.0)]),
            );
        });
    }
}

fn apply_texture_function(b: &mut ShaderBuilder, caps: &PipelineCaps, texture_color: Local) {
    match caps.texture_function {
        TextureFunction::Modulate => {
            b.set(
                texture_color,
                clamp01(
                    texture_color.get()
                        * ir::input(Input::Color)
                        * ir::splat(Ty::F32x4, ir::f32(2.0)),
                ),
            );
            if !caps.texture_has_alpha {
                b.set(
                    texture_color,
                    ir::f32x4(vec![
                        texture_color.get().xyz(),
                        ir::input(Input::Color).w(),
                    ]),
                );
            }
        }
        TextureFunction::Decal => {}
        TextureFunction::Highlight2 => {
            b.set(
                texture_color,
                clamp01(
                    texture_color.get()
                        * ir::input(Input::Color)
                        * ir::splat(Ty::F32x4, ir::f32(2.0))
                        + ir::input(Input::Color).sw("wwww"),
                ),
            );
            if !caps.texture_has_alpha {
                b.set(
                    texture_color,
                    ir::f32x4(vec![
                        texture_color.get().xyz(),
                        ir::input(Input::Color).w(),
                    ]),
                );
            }
        }
        TextureFunction::Highlight => {
            panic!("texture function Highlight is not supported")
        }
    }
}

fn read_destination_color(
    b: &mut ShaderBuilder,
    caps: &PipelineCaps,
    fb_addr: Expr,
    dst_pixel: Local,
    dst_color: Local,
) {
    match caps.framebuffer_format {
        PixelFormat::Psmct32 => {
            b.set(dst_pixel, ir::mem_load(MemWidth::Word, fb_addr));
            b.set(dst_color, psm32_to_rgba(dst_pixel.get()));
        }
        PixelFormat::Psmct24 => {
            b.set(dst_pixel, ir::mem_load(MemWidth::Triple, fb_addr));
            b.set(dst_color, psm32_to_rgba(dst_pixel.get()));
        }
        PixelFormat::Psmct16 | PixelFormat::Psmct16s => {
            b.set(dst_pixel, ir::mem_load(MemWidth::Half, fb_addr));
            b.set(dst_color, psm16_to_rgba(dst_pixel.get()));
        }
        other => panic!("unsupported framebuffer format {other:?}"),
    }
}

fn read_depth(caps: &PipelineCaps, depth_addr: Expr) -> Expr {
    match caps.depthbuffer_format {
        PixelFormat::Psmz32 => ir::mem_load(MemWidth::Word, depth_addr),
        PixelFormat::Psmz24 => ir::mem_load(MemWidth::Triple, depth_addr),
        PixelFormat::Psmz16 | PixelFormat::Psmz16s => ir::mem_load(MemWidth::Half, depth_addr),
        other => panic!("unsupported depthbuffer format {other:?}"),
    }
}

fn color_term(term: BlendColorTerm, src: Local, dst: Local) -> Expr {
    match term {
        BlendColorTerm::Source => src.get().xyz(),
        BlendColorTerm::Dest => dst.get().xyz(),
        BlendColorTerm::Zero => ir::splat(Ty::F32x3, ir::f32(0.0)),
    }
}

fn alpha_term(term: BlendAlphaTerm, src: Local, dst: Local) -> Expr {
    match term {
        BlendAlphaTerm::SourceAlpha => src.get().sw("www"),
        BlendAlphaTerm::DestAlpha => dst.get().sw("www"),
        BlendAlphaTerm::Fixed => ir::splat(
            Ty::F32x3,
            ir::push(PushField::AlphaFix).to_f32() / ir::f32(255.0),
        ),
    }
}

/// Merges the outgoing color into the destination pixel under the write
/// mask and stores it with the format's packing.
fn write_framebuffer(
    b: &mut ShaderBuilder,
    caps: &PipelineCaps,
    fb_addr: Expr,
    dst_pixel: Local,
    dst_color: Local,
) {
    let mask = ir::push(PushField::FbWriteMask);
    match caps.framebuffer_format {
        PixelFormat::Psmct32 | PixelFormat::Psmct24 => {
            let merged = b.let_(
                "fb_value",
                (rgba_to_psm32(dst_color.get()) & mask.clone())
                    | (dst_pixel.get() & mask.bit_not()),
            );
            let width = if caps.framebuffer_format == PixelFormat::Psmct32 {
                MemWidth::Word
            } else {
                MemWidth::Triple
            };
            b.store(width, fb_addr, merged);
        }
        PixelFormat::Psmct16 | PixelFormat::Psmct16s => {
            let merged = b.let_(
                "fb_value",
                (rgba_to_psm16(dst_color.get()) & mask.clone())
                    | (dst_pixel.get() & mask.bit_not()),
            );
            b.store(MemWidth::Half, fb_addr, merged);
        }
        other => panic!("unsupported framebuffer format {other:?}"),
    }
}

/// Stores the source depth truncated to the depth format's width.
fn write_depthbuffer(b: &mut ShaderBuilder, caps: &PipelineCaps, depth_addr: Expr, src_depth: Expr) {
    match caps.depthbuffer_format {
        PixelFormat::Psmz32 => b.store(MemWidth::Word, depth_addr, src_depth),
        PixelFormat::Psmz24 => b.store(
            MemWidth::Triple,
            depth_addr,
            src_depth & ir::u32(0x00FF_FFFF),
        ),
        PixelFormat::Psmz16 | PixelFormat::Psmz16s => {
            b.store(MemWidth::Half, depth_addr, src_depth & ir::u32(0xFFFF))
        }
        other => panic!("unsupported depthbuffer format {other:?}"),
    }
}

fn psm32_to_rgba(pixel: Expr) -> Expr {
    ir::f32x4(vec![
        (pixel.clone() & ir::u32(0xFF)).to_f32(),
        ((pixel.clone() >> ir::u32(8)) & ir::u32(0xFF)).to_f32(),
        ((pixel.clone() >> ir::u32(16)) & ir::u32(0xFF)).to_f32(),
        ((pixel >> ir::u32(24)) & ir::u32(0xFF)).to_f32(),
    ]) / ir::f32(255.0)
}

fn psm16_to_rgba(pixel: Expr) -> Expr {
    ir::f32x4(vec![
        ((pixel.clone() & ir::u32(0x1F)) << ir::u32(3)).to_f32(),
        (((pixel.clone() >> ir::u32(5)) & ir::u32(0x1F)) << ir::u32(3)).to_f32(),
        (((pixel.clone() >> ir::u32(10)) & ir::u32(0x1F)) << ir::u32(3)).to_f32(),
        (((pixel >> ir::u32(15)) & ir::u32(1)) * ir::u32(255)).to_f32(),
    ]) / ir::f32(255.0)
}

fn rgba_to_psm32(color: Expr) -> Expr {
    (color.clone().x() * ir::f32(255.0)).to_u32()
        | ((color.clone().y() * ir::f32(255.0)).to_u32() << ir::u32(8))
        | ((color.clone().z() * ir::f32(255.0)).to_u32() << ir::u32(16))
        | ((color.w() * ir::f32(255.0)).to_u32() << ir::u32(24))
}

fn rgba_to_psm16(color: Expr) -> Expr {
    ((color.clone().x() * ir::f32(255.0)).to_u32() >> ir::u32(3))
        | (((color.clone().y() * ir::f32(255.0)).to_u32() >> ir::u32(3)) << ir::u32(5))
        | (((color.clone().z() * ir::f32(255.0)).to_u32() >> ir::u32(3)) << ir::u32(10))
        | (((color.w() * ir::f32(255.0)).to_u32() >> ir::u32(7)) << ir::u32(15))
}

fn clamp01(value: Expr) -> Expr {
    ir::clamp(
        value,
        ir::splat(Ty::F32x4, ir::f32(0.0)),
        ir::splat(Ty::F32x4, ir::f32(1.0)),
    )
}
