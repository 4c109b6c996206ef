//! Compiler-facing data consumed by the OVB engine: the declaration arena,
//! statement trees, and the error payloads shared across the runtime.

pub mod decl;
pub mod error;
pub mod stmt;

pub use decl::{
    DeclArena, EventDecl, EventId, ModuleDecl, ModuleId, ModuleKind, NativeId, ParamDecl,
    ParamMode, ProcBody, ProcDecl, ProcId, ProcKind, RuleCandidate, TypeTag, VarDecl,
};
pub use error::{codes, ArgumentError, LinkError, RuntimeError, SourceLocation, TraceFrame};
pub use stmt::{
    BinOp, CallArg, Callee, Expr, ExprKind, Literal, ResumeKind, Statement, StatementKind, Target,
    UnaryOp,
};
