//! OVB execution engine. The external compiler lowers source modules into a
//! declaration arena plus flat statement lists; this crate runs them with
//! the legacy semantics: variant values, positional/named/optional argument
//! binding with by-reference aliasing, structured resumable error handling,
//! guarded rule dispatch, and a withevents object model.

mod runtime;

pub use runtime::{
    as_condition, bind_arguments, cast, compare, eval_binary, eval_unary, format_value, new_slot,
    reorder_named, value_to_json, values_equal, Arg, DebugHub, FrameSnapshot, Interpreter,
    LocalSnapshot, ModuleInstance, NativeFn, NativeProc, Repr, Slot, StepMode, Value,
};

pub use ovb_core::{
    codes, ArgumentError, BinOp, CallArg, Callee, DeclArena, EventDecl, EventId, Expr, ExprKind,
    LinkError, Literal, ModuleDecl, ModuleId, ModuleKind, NativeId, ParamDecl, ParamMode,
    ProcBody, ProcDecl, ProcId, ProcKind, ResumeKind, RuleCandidate, RuntimeError,
    SourceLocation, Statement, StatementKind, Target, TraceFrame, TypeTag, UnaryOp, VarDecl,
};

/// Failure surfaced to an embedder: either the program failed to link or a
/// call failed at run time.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
