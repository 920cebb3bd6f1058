//! Vertex stage synthesis. The program does not depend on the capability
//! descriptor: it maps drawing-area coordinates to clip space, normalizes
//! the fixed-point depth and forwards color and texture coordinates.
//!
//! Clip-space Y is negated so that window coordinates in the fragment
//! stage equal drawing-area coordinates (WebGPU clip space is Y-up,
//! drawing-area coordinates are Y-down).

use crate::ir::{self, Expr, Input, Output, ShaderBuilder, ShaderIr, Stage, Ty};
use crate::{DEPTH_MAX, DRAW_AREA_SIZE};

pub fn vertex_ir() -> ShaderIr {
    let mut b = ShaderBuilder::new(Stage::Vertex);

    let scale = 2.0 / DRAW_AREA_SIZE as f32;
    let ndc = b.let_(
        "ndc",
        ir::input(Input::Position)
            * Expr::Construct(Ty::F32x2, vec![ir::f32(scale), ir::f32(-scale)])
            + Expr::Construct(Ty::F32x2, vec![ir::f32(-1.0), ir::f32(1.0)]),
    );
    b.output(
        Output::ClipPos,
        ir::f32x4(vec![ndc, ir::f32(0.0), ir::f32(1.0)]),
    );
    b.output(
        Output::Depth,
        ir::input(Input::Depth).to_f32() / ir::f32(DEPTH_MAX as f32),
    );
    b.output(Output::Color, ir::input(Input::Color));
    b.output(Output::TexCoord, ir::input(Input::TexCoord));
    b.finish()
}
