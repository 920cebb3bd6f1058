//! Tagged-expression intermediate representation for synthesized shaders.
//!
//! Programs are built as plain typed trees: expressions for values,
//! statements for control flow and side effects (emulated-memory stores,
//! the interlocked read-modify-write region, stage outputs). The IR says
//! nothing about any shading language; `wgsl` owns the encoding.

use std::ops;

/// Value types the IR distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ty {
    F32,
    F32x2,
    F32x3,
    F32x4,
    I32,
    I32x2,
    U32,
    Bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Clamp,
    Mix,
    Min,
    Max,
}

/// Bound lookup images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Image {
    FbSwizzle,
    DepthSwizzle,
    TexSwizzle,
    Clut,
}

/// Access width of an emulated-memory load or store. `Nibble` operates on
/// nibble addresses; everything else on byte addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemWidth {
    Nibble,
    Byte,
    Half,
    Triple,
    Word,
}

/// Interpolated (or builtin) inputs of a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    /// Vertex: 2D drawing-area position. Fragment: window position builtin.
    Position,
    FragCoord,
    Depth,
    Color,
    TexCoord,
}

/// Stage outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    ClipPos,
    Depth,
    Color,
    TexCoord,
    FragColor,
}

/// Fields of the per-draw push-constant block. The block layout is fixed;
/// which fields a program reads depends on the capability descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushField {
    FbBufAddr,
    FbBufWidth,
    FbWriteMask,
    DepthBufAddr,
    DepthBufWidth,
    TexBufAddr,
    TexBufWidth,
    TexWidth,
    TexHeight,
    TexCsa,
    TexA0,
    TexA1,
    AlphaRef,
    AlphaFix,
    ClampMinU,
    ClampMinV,
    ClampMaxU,
    ClampMaxV,
}

/// Handle to a named local declared through the builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Local(pub(crate) u32);

impl Local {
    /// Reads the local's current value.
    pub fn get(self) -> Expr {
        Expr::Local(self)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    F32(f32),
    I32(i32),
    U32(u32),
    Bool(bool),
    Input(Input),
    Push(PushField),
    Local(Local),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Component selection, e.g. `.xyz`.
    Swizzle(Box<Expr>, &'static str),
    /// Vector construction from mixed scalar/vector arguments.
    Construct(Ty, Vec<Expr>),
    /// Vector construction by scalar broadcast.
    Splat(Ty, Box<Expr>),
    /// Elementwise numeric conversion to the target type.
    Cast(Ty, Box<Expr>),
    Call(Builtin, Vec<Expr>),
    /// `u32` texel fetch from a bound lookup image at a `vec2<i32>` coord.
    Fetch(Image, Box<Expr>),
    /// `u32` load from the emulated-memory buffer.
    MemLoad(MemWidth, Box<Expr>),
}

impl Expr {
    pub fn sw(self, components: &'static str) -> Expr {
        Expr::Swizzle(Box::new(self), components)
    }

    pub fn x(self) -> Expr {
        self.sw("x")
    }

    pub fn y(self) -> Expr {
        self.sw("y")
    }

    pub fn z(self) -> Expr {
        self.sw("z")
    }

    pub fn w(self) -> Expr {
        self.sw("w")
    }

    pub fn xy(self) -> Expr {
        self.sw("xy")
    }

    pub fn xyz(self) -> Expr {
        self.sw("xyz")
    }

    pub fn cast(self, ty: Ty) -> Expr {
        Expr::Cast(ty, Box::new(self))
    }

    pub fn to_f32(self) -> Expr {
        self.cast(Ty::F32)
    }

    pub fn to_i32(self) -> Expr {
        self.cast(Ty::I32)
    }

    pub fn to_u32(self) -> Expr {
        self.cast(Ty::U32)
    }

    fn bin(self, op: BinOp, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(self), Box::new(rhs))
    }

    pub fn ceq(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Eq, rhs)
    }

    pub fn cne(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Ne, rhs)
    }

    pub fn clt(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Lt, rhs)
    }

    pub fn cle(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Le, rhs)
    }

    pub fn cgt(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Gt, rhs)
    }

    pub fn cge(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Ge, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        self.bin(BinOp::And, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Or, rhs)
    }

    pub fn bit_not(self) -> Expr {
        Expr::Unary(UnOp::BitNot, Box::new(self))
    }
}

macro_rules! impl_bin_op {
    ($trait:ident, $method:ident, $op:ident) => {
        impl ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                self.bin(BinOp::$op, rhs)
            }
        }
    };
}

impl_bin_op!(Add, add, Add);
impl_bin_op!(Sub, sub, Sub);
impl_bin_op!(Mul, mul, Mul);
impl_bin_op!(Div, div, Div);
impl_bin_op!(Rem, rem, Rem);
impl_bin_op!(BitAnd, bitand, BitAnd);
impl_bin_op!(BitOr, bitor, BitOr);
impl_bin_op!(BitXor, bitxor, BitXor);
impl_bin_op!(Shl, shl, Shl);
impl_bin_op!(Shr, shr, Shr);

pub fn f32(value: f32) -> Expr {
    Expr::F32(value)
}

pub fn i32(value: i32) -> Expr {
    Expr::I32(value)
}

pub fn u32(value: u32) -> Expr {
    Expr::U32(value)
}

pub fn input(slot: Input) -> Expr {
    Expr::Input(slot)
}

pub fn push(field: PushField) -> Expr {
    Expr::Push(field)
}

pub fn i32x2(x: Expr, y: Expr) -> Expr {
    Expr::Construct(Ty::I32x2, vec![x, y])
}

pub fn f32x4(parts: Vec<Expr>) -> Expr {
    Expr::Construct(Ty::F32x4, parts)
}

pub fn splat(ty: Ty, value: Expr) -> Expr {
    Expr::Splat(ty, Box::new(value))
}

pub fn clamp(value: Expr, lo: Expr, hi: Expr) -> Expr {
    Expr::Call(Builtin::Clamp, vec![value, lo, hi])
}

pub fn mix(a: Expr, b: Expr, t: Expr) -> Expr {
    Expr::Call(Builtin::Mix, vec![a, b, t])
}

pub fn fetch(image: Image, coord: Expr) -> Expr {
    Expr::Fetch(image, Box::new(coord))
}

pub fn mem_load(width: MemWidth, addr: Expr) -> Expr {
    Expr::MemLoad(width, Box::new(addr))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

/// Which optional lookup images the program binds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindingSet {
    pub texture: bool,
    pub clut: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// Immutable binding; the encoding infers the type.
    Let(Local, Expr),
    /// Mutable binding with an explicit type.
    Var(Local, Ty, Expr),
    Set(Local, Expr),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    /// Store to the emulated-memory buffer.
    MemStore(MemWidth, Expr, Expr),
    /// Critical section: the body must execute with mutual exclusion
    /// against every other fragment whose `key` resolves to the same
    /// emulated-memory word.
    Interlocked { key: Expr, body: Vec<Stmt> },
    Output(Output, Expr),
}

#[derive(Clone, Debug)]
pub(crate) struct LocalDecl {
    pub name: String,
}

/// A complete stage program, ready for lowering.
#[derive(Clone, Debug)]
pub struct ShaderIr {
    pub stage: Stage,
    pub bindings: BindingSet,
    pub(crate) locals: Vec<LocalDecl>,
    pub body: Vec<Stmt>,
}

/// Incremental program builder with structured blocks.
pub struct ShaderBuilder {
    stage: Stage,
    bindings: BindingSet,
    locals: Vec<LocalDecl>,
    frames: Vec<Vec<Stmt>>,
}

impl ShaderBuilder {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            bindings: BindingSet::default(),
            locals: Vec::new(),
            frames: vec![Vec::new()],
        }
    }

    pub fn fragment(bindings: BindingSet) -> Self {
        let mut builder = Self::new(Stage::Fragment);
        builder.bindings = bindings;
        builder
    }

    fn declare(&mut self, name: &str) -> Local {
        let mut unique = name.to_owned();
        let mut suffix = 1u32;
        while self.locals.iter().any(|l| l.name == unique) {
            unique = format!("{name}_{suffix}");
            suffix += 1;
        }
        self.locals.push(LocalDecl { name: unique });
        Local(self.locals.len() as u32 - 1)
    }

    fn push(&mut self, stmt: Stmt) {
        self.frames
            .last_mut()
            .expect("builder block stack is never empty")
            .push(stmt);
    }

    /// Binds `init` to a fresh immutable local and returns a read of it.
    pub fn let_(&mut self, name: &str, init: Expr) -> Expr {
        let local = self.declare(name);
        self.push(Stmt::Let(local, init));
        local.get()
    }

    /// Declares a fresh mutable local.
    pub fn var(&mut self, name: &str, ty: Ty, init: Expr) -> Local {
        let local = self.declare(name);
        self.push(Stmt::Var(local, ty, init));
        local
    }

    pub fn set(&mut self, local: Local, value: Expr) {
        self.push(Stmt::Set(local, value));
    }

    fn block(&mut self, build: impl FnOnce(&mut Self)) -> Vec<Stmt> {
        self.frames.push(Vec::new());
        build(self);
        self.frames.pop().expect("block frame pushed above")
    }

    pub fn if_(&mut self, cond: Expr, then_branch: impl FnOnce(&mut Self)) {
        let then_branch = self.block(then_branch);
        self.push(Stmt::If {
            cond,
            then_branch,
            else_branch: Vec::new(),
        });
    }

    pub fn interlocked(&mut self, key: Expr, body: impl FnOnce(&mut Self)) {
        let body = self.block(body);
        self.push(Stmt::Interlocked { key, body });
    }

    pub fn store(&mut self, width: MemWidth, addr: Expr, value: Expr) {
        self.push(Stmt::MemStore(width, addr, value));
    }

    pub fn output(&mut self, output: Output, value: Expr) {
        self.push(Stmt::Output(output, value));
    }

    pub fn finish(mut self) -> ShaderIr {
        assert_eq!(self.frames.len(), 1, "unclosed block in shader builder");
        ShaderIr {
            stage: self.stage,
            bindings: self.bindings,
            locals: self.locals,
            body: self.frames.pop().expect("root frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_scopes_blocks() {
        let mut b = ShaderBuilder::new(Stage::Fragment);
        let flag = b.var("flag", Ty::Bool, Expr::Bool(false));
        b.if_(u32(1).ceq(u32(1)), |b| {
            b.set(flag, Expr::Bool(true));
        });
        let ir = b.finish();
        assert_eq!(ir.body.len(), 2);
        match &ir.body[1] {
            Stmt::If { then_branch, else_branch, .. } => {
                assert_eq!(then_branch.len(), 1);
                assert!(else_branch.is_empty());
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_are_made_unique() {
        let mut b = ShaderBuilder::new(Stage::Fragment);
        b.let_("addr", i32(0));
        b.let_("addr", i32(1));
        let ir = b.finish();
        assert_eq!(ir.locals[0].name, "addr");
        assert_eq!(ir.locals[1].name, "addr_1");
    }

    #[test]
    fn operator_sugar_builds_binary_nodes() {
        let e = (f32(1.0) + f32(2.0)) * f32(3.0);
        match e {
            Expr::Binary(BinOp::Mul, lhs, _) => match *lhs {
                Expr::Binary(BinOp::Add, ..) => {}
                other => panic!("expected Add, got {other:?}"),
            },
            other => panic!("expected Mul, got {other:?}"),
        }
    }
}
