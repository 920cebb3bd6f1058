//! WGSL lowering for the shader IR.
//!
//! This is the only place that knows how the IR is encoded for the host
//! GPU: binding indices, the push-constant block layout, the
//! emulated-memory access helpers and the interlock substitute all live
//! here. Lowering is deterministic, so equal IR (and therefore equal
//! capability descriptors) produces byte-identical modules.

use std::fmt::Write;

use crate::ir::{
    BinOp, Builtin, Expr, Image, Input, MemWidth, Output, PushField, ShaderIr, Stage, Stmt, Ty,
    UnOp,
};

/// Bind-group slots shared between generated code and pipeline layouts.
pub mod bindings {
    pub const VRAM: u32 = 0;
    pub const VRAM_LOCKS: u32 = 1;
    pub const FB_SWIZZLE: u32 = 2;
    pub const DEPTH_SWIZZLE: u32 = 3;
    pub const TEX_SWIZZLE: u32 = 4;
    pub const CLUT: u32 = 5;
}

/// Byte size of the push-constant block declared by generated fragment
/// programs. Must match the host-side block layout exactly.
pub const PUSH_CONSTANTS_SIZE: u32 = 72;

const PUSH_CONSTANTS_STRUCT: &str = "\
struct PushConstants {
  fb_buf_addr: i32,
  fb_buf_width: i32,
  fb_write_mask: u32,
  depth_buf_addr: i32,
  depth_buf_width: i32,
  tex_buf_addr: i32,
  tex_buf_width: i32,
  tex_width: i32,
  tex_height: i32,
  tex_csa: i32,
  tex_a0: i32,
  tex_a1: i32,
  alpha_ref: u32,
  alpha_fix: i32,
  clamp_min_u: i32,
  clamp_min_v: i32,
  clamp_max_u: i32,
  clamp_max_v: i32,
}
";

// Emulated-memory access helpers. Everything goes through atomics: the
// buffer is written by concurrently executing fragments, and a masked
// sub-word store must not tear against a neighboring pixel in the same
// word.
const MEMORY_HELPERS: &str = "\
fn vram_read32(addr: i32) -> u32 {
  return atomicLoad(&vram[addr >> 2u]);
}

fn vram_read24(addr: i32) -> u32 {
  return vram_read32(addr) & 0xffffffu;
}

fn vram_read16(addr: i32) -> u32 {
  let word = atomicLoad(&vram[addr >> 2u]);
  return (word >> ((u32(addr) & 2u) * 8u)) & 0xffffu;
}

fn vram_read8(addr: i32) -> u32 {
  let word = atomicLoad(&vram[addr >> 2u]);
  return (word >> ((u32(addr) & 3u) * 8u)) & 0xffu;
}

fn vram_read4(nibble_addr: i32) -> u32 {
  let word = atomicLoad(&vram[nibble_addr >> 3u]);
  return (word >> ((u32(nibble_addr) & 7u) * 4u)) & 0xfu;
}

fn vram_write32(addr: i32, value: u32) {
  atomicStore(&vram[addr >> 2u], value);
}

fn vram_write24(addr: i32, value: u32) {
  atomicAnd(&vram[addr >> 2u], 0xff000000u);
  atomicOr(&vram[addr >> 2u], value & 0xffffffu);
}

fn vram_write16(addr: i32, value: u32) {
  let shift = (u32(addr) & 2u) * 8u;
  atomicAnd(&vram[addr >> 2u], ~(0xffffu << shift));
  atomicOr(&vram[addr >> 2u], (value & 0xffffu) << shift);
}
";

const VERTEX_IO: &str = "\
struct VertexIn {
  @location(0) position: vec2<f32>,
  @location(1) depth: u32,
  @location(2) color: vec4<f32>,
  @location(3) texcoord: vec3<f32>,
}

struct VertexOut {
  @builtin(position) clip_pos: vec4<f32>,
  @location(0) depth: f32,
  @location(1) color: vec4<f32>,
  @location(2) texcoord: vec3<f32>,
}
";

const FRAGMENT_IN: &str = "\
struct FragmentIn {
  @builtin(position) frag_coord: vec4<f32>,
  @location(0) depth: f32,
  @location(1) color: vec4<f32>,
  @location(2) texcoord: vec3<f32>,
}
";

/// Lowers a stage program to a WGSL module.
pub fn lower(ir: &ShaderIr) -> String {
    let mut w = Writer {
        ir,
        out: String::new(),
        indent: 1,
        interlocks: 0,
    };
    match ir.stage {
        Stage::Vertex => w.vertex_module(),
        Stage::Fragment => w.fragment_module(),
    }
    w.out
}

struct Writer<'a> {
    ir: &'a ShaderIr,
    out: String,
    indent: usize,
    interlocks: u32,
}

impl Writer<'_> {
    fn vertex_module(&mut self) {
        self.out.push_str(VERTEX_IO);
        self.out.push_str("\n@vertex\n");
        self.out.push_str("fn vs_main(input: VertexIn) -> VertexOut {\n");
        self.out.push_str("  var out: VertexOut;\n");
        self.block(&self.ir.body.clone());
        self.out.push_str("  return out;\n}\n");
    }

    fn fragment_module(&mut self) {
        self.out.push_str(PUSH_CONSTANTS_STRUCT);
        self.out.push_str("\nvar<push_constant> pc: PushConstants;\n\n");
        let _ = writeln!(
            self.out,
            "@group(0) @binding({}) var<storage, read_write> vram: array<atomic<u32>>;",
            bindings::VRAM
        );
        let _ = writeln!(
            self.out,
            "@group(0) @binding({}) var<storage, read_write> vram_locks: array<atomic<u32>>;",
            bindings::VRAM_LOCKS
        );
        let _ = writeln!(
            self.out,
            "@group(0) @binding({}) var fb_swizzle: texture_2d<u32>;",
            bindings::FB_SWIZZLE
        );
        let _ = writeln!(
            self.out,
            "@group(0) @binding({}) var depth_swizzle: texture_2d<u32>;",
            bindings::DEPTH_SWIZZLE
        );
        if self.ir.bindings.texture {
            let _ = writeln!(
                self.out,
                "@group(0) @binding({}) var tex_swizzle: texture_2d<u32>;",
                bindings::TEX_SWIZZLE
            );
        }
        if self.ir.bindings.clut {
            let _ = writeln!(
                self.out,
                "@group(0) @binding({}) var clut: texture_2d<u32>;",
                bindings::CLUT
            );
        }
        self.out.push('\n');
        self.out.push_str(MEMORY_HELPERS);
        self.out.push('\n');
        self.out.push_str(FRAGMENT_IN);
        self.out.push_str("\n@fragment\n");
        self.out
            .push_str("fn fs_main(input: FragmentIn) -> @location(0) vec4<f32> {\n");
        self.out
            .push_str("  var frag_color: vec4<f32> = vec4<f32>(0.0);\n");
        self.block(&self.ir.body.clone());
        self.out.push_str("  return frag_color;\n}\n");
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let(local, init) => {
                let line = format!("let {} = {};", self.local_name(*local), self.expr(init));
                self.line(&line);
            }
            Stmt::Var(local, ty, init) => {
                let line = format!(
                    "var {}: {} = {};",
                    self.local_name(*local),
                    ty_name(*ty),
                    self.expr(init)
                );
                self.line(&line);
            }
            Stmt::Set(local, value) => {
                let line = format!("{} = {};", self.local_name(*local), self.expr(value));
                self.line(&line);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let line = format!("if ({}) {{", self.expr(cond));
                self.line(&line);
                self.indent += 1;
                self.block(then_branch);
                self.indent -= 1;
                if else_branch.is_empty() {
                    self.line("}");
                } else {
                    self.line("} else {");
                    self.indent += 1;
                    self.block(else_branch);
                    self.indent -= 1;
                    self.line("}");
                }
            }
            Stmt::MemStore(width, addr, value) => {
                let helper = match width {
                    MemWidth::Half => "vram_write16",
                    MemWidth::Triple => "vram_write24",
                    MemWidth::Word => "vram_write32",
                    // The pipeline never writes sub-byte destinations.
                    MemWidth::Nibble | MemWidth::Byte => {
                        unreachable!("no sub-word destination stores are synthesized")
                    }
                };
                let line = format!("{helper}({}, {});", self.expr(addr), self.expr(value));
                self.line(&line);
            }
            Stmt::Interlocked { key, body } => self.interlocked(key, body),
            Stmt::Output(output, value) => {
                let target = match (self.ir.stage, output) {
                    (Stage::Vertex, Output::ClipPos) => "out.clip_pos",
                    (Stage::Vertex, Output::Depth) => "out.depth",
                    (Stage::Vertex, Output::Color) => "out.color",
                    (Stage::Vertex, Output::TexCoord) => "out.texcoord",
                    (Stage::Fragment, Output::FragColor) => "frag_color",
                    (stage, output) => {
                        unreachable!("output {output:?} is not valid in {stage:?}")
                    }
                };
                let line = format!("{} = {};", target, self.expr(value));
                self.line(&line);
            }
        }
    }

    // WebGPU offers no fragment shader interlock, so the critical section
    // lowers to a spin lock on the lock word covering the keyed
    // emulated-memory address. The loop keeps every invocation iterating
    // until it has taken its turn, which stays deadlock-free under SIMD
    // execution where a plain `while !acquired {}` would not.
    fn interlocked(&mut self, key: &Expr, body: &[Stmt]) {
        let suffix = if self.interlocks == 0 {
            String::new()
        } else {
            format!("_{}", self.interlocks)
        };
        self.interlocks += 1;
        let index = format!("lock_index{suffix}");
        let done = format!("lock_done{suffix}");
        let acquire = format!("lock_acquire{suffix}");

        let line = format!("let {index} = u32({}) >> 2u;", self.expr(key));
        self.line(&line);
        self.line(&format!("var {done} = false;"));
        self.line("loop {");
        self.indent += 1;
        self.line(&format!("if (!{done}) {{"));
        self.indent += 1;
        self.line(&format!(
            "let {acquire} = atomicCompareExchangeWeak(&vram_locks[{index}], 0u, 1u);"
        ));
        self.line(&format!("if ({acquire}.exchanged) {{"));
        self.indent += 1;
        self.block(body);
        self.line(&format!("atomicStore(&vram_locks[{index}], 0u);"));
        self.line(&format!("{done} = true;"));
        self.indent -= 1;
        self.line("}");
        self.indent -= 1;
        self.line("}");
        self.line(&format!("if ({done}) {{ break; }}"));
        self.indent -= 1;
        self.line("}");
    }

    fn local_name(&self, local: crate::ir::Local) -> &str {
        &self.ir.locals[local.0 as usize].name
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::F32(v) => format!("{v:?}"),
            Expr::I32(v) => format!("{v}"),
            Expr::U32(v) => {
                if *v > 0xFFFF {
                    format!("0x{v:08x}u")
                } else {
                    format!("{v}u")
                }
            }
            Expr::Bool(v) => format!("{v}"),
            Expr::Input(slot) => self.input_name(*slot).to_owned(),
            Expr::Push(field) => format!("pc.{}", push_field_name(*field)),
            Expr::Local(local) => self.local_name(*local).to_owned(),
            Expr::Unary(op, operand) => {
                let token = match op {
                    UnOp::Neg => "-",
                    UnOp::Not => "!",
                    UnOp::BitNot => "~",
                };
                format!("({token}{})", self.expr(operand))
            }
            Expr::Binary(op, lhs, rhs) => {
                format!(
                    "({} {} {})",
                    self.expr(lhs),
                    bin_op_token(*op),
                    self.expr(rhs)
                )
            }
            Expr::Swizzle(operand, components) => {
                format!("{}.{components}", self.expr(operand))
            }
            Expr::Construct(ty, args) => {
                let args: Vec<_> = args.iter().map(|a| self.expr(a)).collect();
                format!("{}({})", ty_name(*ty), args.join(", "))
            }
            Expr::Splat(ty, value) => format!("{}({})", ty_name(*ty), self.expr(value)),
            Expr::Cast(ty, value) => format!("{}({})", ty_name(*ty), self.expr(value)),
            Expr::Call(builtin, args) => {
                let name = match builtin {
                    Builtin::Clamp => "clamp",
                    Builtin::Mix => "mix",
                    Builtin::Min => "min",
                    Builtin::Max => "max",
                };
                let args: Vec<_> = args.iter().map(|a| self.expr(a)).collect();
                format!("{name}({})", args.join(", "))
            }
            Expr::Fetch(image, coord) => {
                let name = match image {
                    Image::FbSwizzle => "fb_swizzle",
                    Image::DepthSwizzle => "depth_swizzle",
                    Image::TexSwizzle => "tex_swizzle",
                    Image::Clut => "clut",
                };
                format!("textureLoad({name}, {}, 0).x", self.expr(coord))
            }
            Expr::MemLoad(width, addr) => {
                let helper = match width {
                    MemWidth::Nibble => "vram_read4",
                    MemWidth::Byte => "vram_read8",
                    MemWidth::Half => "vram_read16",
                    MemWidth::Triple => "vram_read24",
                    MemWidth::Word => "vram_read32",
                };
                format!("{helper}({})", self.expr(addr))
            }
        }
    }

    fn input_name(&self, slot: Input) -> &'static str {
        match (self.ir.stage, slot) {
            (Stage::Vertex, Input::Position) => "input.position",
            (Stage::Fragment, Input::FragCoord) => "input.frag_coord",
            (_, Input::Depth) => "input.depth",
            (_, Input::Color) => "input.color",
            (_, Input::TexCoord) => "input.texcoord",
            (stage, slot) => unreachable!("input {slot:?} is not valid in {stage:?}"),
        }
    }
}

fn ty_name(ty: Ty) -> &'static str {
    match ty {
        Ty::F32 => "f32",
        Ty::F32x2 => "vec2<f32>",
        Ty::F32x3 => "vec3<f32>",
        Ty::F32x4 => "vec4<f32>",
        Ty::I32 => "i32",
        Ty::I32x2 => "vec2<i32>",
        Ty::U32 => "u32",
        Ty::Bool => "bool",
    }
}

fn bin_op_token(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

fn push_field_name(field: PushField) -> &'static str {
    match field {
        PushField::FbBufAddr => "fb_buf_addr",
        PushField::FbBufWidth => "fb_buf_width",
        PushField::FbWriteMask => "fb_write_mask",
        PushField::DepthBufAddr => "depth_buf_addr",
        PushField::DepthBufWidth => "depth_buf_width",
        PushField::TexBufAddr => "tex_buf_addr",
        PushField::TexBufWidth => "tex_buf_width",
        PushField::TexWidth => "tex_width",
        PushField::TexHeight => "tex_height",
        PushField::TexCsa => "tex_csa",
        PushField::TexA0 => "tex_a0",
        PushField::TexA1 => "tex_a1",
        PushField::AlphaRef => "alpha_ref",
        PushField::AlphaFix => "alpha_fix",
        PushField::ClampMinU => "clamp_min_u",
        PushField::ClampMinV => "clamp_min_v",
        PushField::ClampMaxU => "clamp_max_u",
        PushField::ClampMaxV => "clamp_max_v",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::{self, BindingSet, ShaderBuilder, Ty};

    #[test]
    fn lowers_expressions_with_full_parenthesization() {
        let mut b = ShaderBuilder::fragment(BindingSet::default());
        b.let_(
            "addr",
            (ir::push(PushField::FbBufAddr) + ir::i32(16)) * ir::i32(4),
        );
        let wgsl = lower(&b.finish());
        assert!(wgsl.contains("let addr = ((pc.fb_buf_addr + 16) * 4);"));
    }

    #[test]
    fn interlock_lowers_to_spin_lock() {
        let mut b = ShaderBuilder::fragment(BindingSet::default());
        let addr = b.let_("addr", ir::i32(0));
        b.interlocked(addr.clone(), |b| {
            b.store(crate::ir::MemWidth::Word, addr.clone(), ir::u32(5));
        });
        let wgsl = lower(&b.finish());
        assert!(wgsl.contains("atomicCompareExchangeWeak(&vram_locks[lock_index], 0u, 1u)"));
        assert!(wgsl.contains("vram_write32(addr, 5u);"));
        assert!(wgsl.contains("atomicStore(&vram_locks[lock_index], 0u);"));
    }

    #[test]
    fn optional_bindings_follow_the_binding_set() {
        let mut b = ShaderBuilder::fragment(BindingSet {
            texture: true,
            clut: false,
        });
        b.let_("x", ir::i32(0));
        let wgsl = lower(&b.finish());
        assert!(wgsl.contains("var tex_swizzle: texture_2d<u32>;"));
        assert!(!wgsl.contains("var clut: texture_2d<u32>;"));
    }

    #[test]
    fn float_literals_keep_a_decimal_point() {
        let mut b = ShaderBuilder::fragment(BindingSet::default());
        b.let_("depth_scale", ir::f32(4294967296.0));
        let wgsl = lower(&b.finish());
        assert!(wgsl.contains("let depth_scale = 4294967296.0;"));
    }

    #[test]
    fn var_declarations_carry_their_type() {
        let mut b = ShaderBuilder::fragment(BindingSet::default());
        let v = b.var("acc", Ty::F32x4, ir::splat(Ty::F32x4, ir::f32(1.0)));
        b.set(v, ir::splat(Ty::F32x4, ir::f32(0.0)));
        let wgsl = lower(&b.finish());
        assert!(wgsl.contains("var acc: vec4<f32> = vec4<f32>(1.0);"));
        assert!(wgsl.contains("acc = vec4<f32>(0.0);"));
    }

    #[test]
    fn equal_ir_lowers_identically() {
        let build = || {
            let mut b = ShaderBuilder::fragment(BindingSet::default());
            let addr = b.let_("addr", ir::push(PushField::FbBufAddr));
            b.interlocked(addr.clone(), |b| {
                b.store(crate::ir::MemWidth::Half, addr.clone(), ir::u32(0));
            });
            lower(&b.finish())
        };
        assert_eq!(build(), build());
    }
}
