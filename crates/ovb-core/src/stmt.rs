//! Statement trees consumed by the engine. Structured control flow arrives
//! pre-lowered to jump targets by the external compiler; a procedure body is
//! a flat statement list addressed by cursor index.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::decl::{EventId, ModuleId, ProcId};

pub use crate::error::SourceLocation;

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub loc: SourceLocation,
}

impl Statement {
    pub fn new(kind: StatementKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    /// Evaluate an expression and store it into a variable.
    Assign { target: Target, expr: Expr },
    /// Invoke a procedure, discarding its result.
    Call { callee: Callee, args: Vec<CallArg> },
    /// Jump to `target` when the condition coerces to true.
    IfGoto { cond: Expr, target: usize },
    Goto { target: usize },
    /// Push the current cursor on the gosub return stack and jump.
    GoSub { target: usize },
    /// Pop the gosub return stack and continue after the matching GoSub.
    ReturnSub,
    /// Install an error handler at `Some(target)`, or clear it with `None`.
    OnError { handler: Option<usize> },
    /// Leave the handler and continue forward execution in the same frame.
    Resume { kind: ResumeKind },
    /// Raise a legacy error with the given numeric code (Err.Raise).
    RaiseError { code: Expr },
    /// Fan the event out to every live subscriber of the current instance.
    RaiseEvent { event: EventId, args: Vec<Expr> },
    ExitProc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    /// Re-execute the statement that failed.
    Same,
    /// Continue at the statement after the one that failed.
    Next,
    /// Continue at an explicit statement index.
    Label(usize),
}

/// A writable storage reference. Locals index the frame's slot vector,
/// fields and statics index the executing module instance's vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Local(usize),
    Field(usize),
    Static(usize),
}

/// Callee resolved to a declaration by the compiler; the engine dispatches
/// by declaration identity, never by name.
#[derive(Debug, Clone)]
pub enum Callee {
    /// A procedure of a standard module, executed against its singleton
    /// instance (or the current instance when it belongs to the same module).
    Proc(ProcId),
    /// A method call on an object expression.
    Method { target: Box<Expr>, proc: ProcId },
    /// A call arriving through the implemented-interface view of an object;
    /// redirected via the link-time implementation map.
    Interface {
        target: Box<Expr>,
        interface: ModuleId,
        proc: ProcId,
    },
}

#[derive(Debug, Clone)]
pub struct CallArg {
    /// Present for named arguments; resolution is case-insensitive.
    pub name: Option<String>,
    pub expr: Expr,
}

impl CallArg {
    pub fn positional(expr: Expr) -> Self {
        Self { name: None, expr }
    }

    pub fn named(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: Some(name.into()),
            expr,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLocation,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Local(usize),
    /// Field read; `target` is `None` for the executing instance's own field.
    Field {
        target: Option<Box<Expr>>,
        index: usize,
    },
    Static(usize),
    /// The executing instance as an object value.
    MeRef,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function-style invocation producing a value.
    Invoke {
        callee: Callee,
        args: Vec<CallArg>,
    },
    /// Instantiate a class module.
    New(ModuleId),
    /// 0-based array element read.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// True when the optional parameter at this local index was omitted.
    IsMissing(usize),
}

#[derive(Debug, Clone)]
pub enum Literal {
    Empty,
    Null,
    Nothing,
    Bool(bool),
    Integer(i16),
    Long(i32),
    Single(f32),
    Double(f64),
    Currency(Decimal),
    Date(NaiveDateTime),
    Str(String),
    ErrorCode(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// String concatenation; both operands coerce to string.
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}
