use std::sync::Arc;

use ovb_core::error::codes;
use ovb_core::{ProcId, RuntimeError};

use super::objects::ModuleInstance;
use super::values::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Ready,
    Running,
    Suspended,
    Completed,
    Failed,
}

/// Per-frame structured error carrier. An error stays "active" until a
/// handler claims it; a claimed error keeps its payload around so `Resume`
/// knows where forward execution continues.
#[derive(Debug, Default)]
pub struct ErrorState {
    error: Option<RuntimeError>,
    handled: bool,
    /// Cursor of the statement that failed, for Resume / Resume Next.
    resume_point: usize,
    /// Set while control is inside the handler; a failure raised there must
    /// propagate instead of re-entering the same frame's handler.
    pub in_handler: bool,
}

impl ErrorState {
    pub fn active(&self) -> bool {
        self.error.is_some() && !self.handled
    }

    pub fn wrap(&mut self, error: RuntimeError, statement_index: usize) {
        self.error = Some(error);
        self.handled = false;
        self.resume_point = statement_index;
    }

    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub fn resume_point(&self) -> usize {
        self.resume_point
    }

    pub fn clear(&mut self) {
        self.error = None;
        self.handled = false;
        self.in_handler = false;
    }

    /// Claimed error available to a Resume statement?
    pub fn claimed(&self) -> bool {
        self.error.is_some() && self.handled
    }

    pub fn take(&mut self) -> Option<RuntimeError> {
        self.handled = false;
        self.in_handler = false;
        self.error.take()
    }
}

/// One live procedure activation: bound storage, statement cursor, error
/// state, and the jump registers for unstructured control flow.
pub struct CallFrame {
    pub instance: Option<Arc<ModuleInstance>>,
    pub proc: ProcId,
    /// Parameter slots first, then plain locals, in declaration order.
    pub locals: Vec<Slot>,
    /// Index of the next statement to execute.
    pub cursor: usize,
    /// Index of the statement currently executing.
    pub statement_index: usize,
    /// Return points for GoSub.
    pub gosub_stack: Vec<usize>,
    /// Installed error-handler jump target.
    pub handler: Option<usize>,
    pub error: ErrorState,
    pub state: FrameState,
}

impl CallFrame {
    pub fn new(instance: Option<Arc<ModuleInstance>>, proc: ProcId, locals: Vec<Slot>) -> Self {
        Self {
            instance,
            proc,
            locals,
            cursor: 0,
            statement_index: 0,
            gosub_stack: Vec::new(),
            handler: None,
            error: ErrorState::default(),
            state: FrameState::Ready,
        }
    }

    pub fn local(&self, index: usize) -> Result<Slot, RuntimeError> {
        self.locals
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::new(codes::INTERNAL_ERROR))
    }

    pub fn install_handler(&mut self, handler: Option<usize>) {
        self.handler = handler;
    }
}
