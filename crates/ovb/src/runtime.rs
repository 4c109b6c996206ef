//! The execution engine: value model, argument binder, call-frame stepper,
//! rule dispatcher, object/event graph, and the step-mode hub.

mod binder;
mod debug;
mod frame;
mod interpreter;
mod objects;
mod values;


pub use binder::{bind_arguments, reorder_named, Arg};
pub use debug::{DebugHub, FrameSnapshot, LocalSnapshot, StepMode};
pub use interpreter::{Interpreter, NativeFn, NativeProc};
pub use objects::ModuleInstance;
pub use values::{
    as_condition, cast, compare, eval_binary, eval_unary, format_value, new_slot, value_to_json,
    values_equal, Repr, Slot, Value,
};
