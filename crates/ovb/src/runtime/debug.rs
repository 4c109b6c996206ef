//! Step-mode coordination between the running engine thread and an external
//! controller thread. The engine calls in at statement boundaries; the
//! controller sets the mode, reads snapshots, and releases the pause.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    None,
    Into,
    Over,
    Out,
}

/// One frame of a paused stack, outermost first.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub module: String,
    pub proc: String,
    pub statement: usize,
    pub locals: Vec<LocalSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalSnapshot {
    pub name: String,
    pub value: serde_json::Value,
}

struct HubState {
    mode: StepMode,
    /// Stack depth at or above which the next statement boundary pauses.
    target_depth: usize,
    paused: bool,
    snapshot: Vec<FrameSnapshot>,
}

pub struct DebugHub {
    state: Mutex<HubState>,
    resumed: Condvar,
}

impl DebugHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                mode: StepMode::None,
                target_depth: 0,
                paused: false,
                snapshot: Vec::new(),
            }),
            resumed: Condvar::new(),
        })
    }

    /// Arms the next pause. Over pauses at the paused frame's depth or
    /// shallower, Out strictly shallower, Into at the very next statement.
    /// Over and Out are relative to a live pause; armed while the engine is
    /// running they degrade to Into.
    pub fn set_step_mode(&self, mode: StepMode) {
        let mut state = self.state.lock();
        let mode = match mode {
            StepMode::Over | StepMode::Out if !state.paused => StepMode::Into,
            other => other,
        };
        let depth = state.snapshot.len();
        state.target_depth = match mode {
            StepMode::Over => depth,
            StepMode::Out => depth.saturating_sub(1),
            _ => 0,
        };
        state.mode = mode;
    }

    /// Releases a paused engine thread.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.paused = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// The stack published at the most recent pause, outermost frame first.
    pub fn stack_snapshot(&self) -> Vec<FrameSnapshot> {
        self.state.lock().snapshot.clone()
    }

    pub(crate) fn should_stop(&self, depth: usize) -> bool {
        let state = self.state.lock();
        match state.mode {
            StepMode::None => false,
            StepMode::Into => true,
            StepMode::Over | StepMode::Out => depth <= state.target_depth,
        }
    }

    /// Publishes the stack, disarms stepping, and blocks until resumed.
    pub(crate) fn stop(&self, snapshot: Vec<FrameSnapshot>) {
        let mut state = self.state.lock();
        state.mode = StepMode::None;
        state.paused = true;
        state.snapshot = snapshot;
        while state.paused {
            self.resumed.wait(&mut state);
        }
    }
}
