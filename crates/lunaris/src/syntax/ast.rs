//! The syntax tree.
//!
//! Nodes live in flat arenas inside a `Chunk` and reference each other
//! by index, so the evaluator's continuation ops can hold plain `u32`s
//! instead of borrowed references. Every node carries the source line
//! it started on.

use smol_str::SmolStr;
use std::rc::Rc;

use crate::env::VarAttrib;

pub type ExprId = u32;
pub type StatId = u32;
pub type BlockId = u32;
pub type ProtoId = u32;

/// A compiled chunk: the arenas plus the function prototypes defined in
/// it. The source text is retained for `string.dump`.
pub struct Chunk {
    pub name: String,
    pub source: Rc<str>,
    pub exprs: Vec<Expr>,
    pub stats: Vec<Stat>,
    pub blocks: Vec<Block>,
    pub protos: Vec<Proto>,
    /// Prototype of the chunk body itself.
    pub main: ProtoId,
}

impl Chunk {
    #[inline(always)]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id as usize]
    }

    #[inline(always)]
    pub fn stat(&self, id: StatId) -> &Stat {
        &self.stats[id as usize]
    }

    #[inline(always)]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id as usize]
    }

    #[inline(always)]
    pub fn proto(&self, id: ProtoId) -> &Proto {
        &self.protos[id as usize]
    }
}

pub struct Block {
    pub stats: Vec<StatId>,
    /// Visible labels: name → statement position inside `stats`.
    pub labels: Vec<(SmolStr, usize)>,
}

impl Block {
    pub fn label_position(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, pos)| *pos)
    }
}

/// A function prototype: parameters plus a body block. The byte span of
/// the body inside the chunk source supports `string.dump`.
pub struct Proto {
    pub params: Vec<SmolStr>,
    pub is_vararg: bool,
    pub body: BlockId,
    /// Best-effort name for tracebacks ("?" when anonymous).
    pub name: SmolStr,
    pub line: u32,
    pub body_span: (u32, u32),
}

pub struct Stat {
    pub kind: StatKind,
    pub line: u32,
}

pub enum StatKind {
    Local {
        names: Vec<(SmolStr, VarAttrib)>,
        exprs: Vec<ExprId>,
    },
    Assign {
        targets: Vec<ExprId>,
        exprs: Vec<ExprId>,
    },
    /// Expression statement; always a call or method call.
    Call(ExprId),
    Do(BlockId),
    While {
        cond: ExprId,
        body: BlockId,
    },
    Repeat {
        body: BlockId,
        cond: ExprId,
    },
    If {
        arms: Vec<(ExprId, BlockId)>,
        else_body: Option<BlockId>,
    },
    NumericFor {
        var: SmolStr,
        start: ExprId,
        limit: ExprId,
        step: Option<ExprId>,
        body: BlockId,
    },
    GenericFor {
        names: Vec<SmolStr>,
        exprs: Vec<ExprId>,
        body: BlockId,
    },
    LocalFunction {
        name: SmolStr,
        proto: ProtoId,
    },
    Return {
        exprs: Vec<ExprId>,
        /// True when the statement is `return f(args)` with the call as
        /// its only expression: the frame is reused instead of grown.
        tail_call: bool,
    },
    Break,
    Goto(SmolStr),
    Label(SmolStr),
}

pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

pub enum ExprKind {
    Nil,
    True,
    False,
    Integer(i64),
    Float(f64),
    /// Decoded string literal bytes.
    Str(Box<[u8]>),
    Vararg,
    Name(SmolStr),
    Index {
        obj: ExprId,
        key: ExprId,
    },
    Call {
        func: ExprId,
        args: Vec<ExprId>,
    },
    MethodCall {
        obj: ExprId,
        name: SmolStr,
        args: Vec<ExprId>,
    },
    Function(ProtoId),
    Table {
        fields: Vec<TableField>,
    },
    Binary {
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: UnOp,
        operand: ExprId,
    },
    /// Parenthesized expression; truncates multi-values to one.
    Paren(ExprId),
}

pub enum TableField {
    /// Positional entry; collects at the next array index.
    Item(ExprId),
    /// `[k] = v` or the `name = v` sugar.
    Keyed { key: ExprId, value: ExprId },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnOp {
    Neg,
    Not,
    Len,
    BNot,
}

impl ExprKind {
    /// Whether this expression can produce multiple values in a spread
    /// position.
    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } | ExprKind::Vararg
        )
    }
}
