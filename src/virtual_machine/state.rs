//! Engine run state.

use std::fmt;

/// Where the engine stands between steps.
///
/// `Halt` and `Fault` are terminal: stepping a terminal engine does nothing.
/// `Break` is a pause that the next `execute`, `step_over` or `step_out`
/// clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VMState {
    /// Not yet run to completion, not paused.
    #[default]
    None,
    /// The invocation stack emptied normally.
    Halt,
    /// Execution was aborted by an error.
    Fault,
    /// Stopped at a breakpoint.
    Break,
}

impl VMState {
    pub fn is_terminal(self) -> bool {
        matches!(self, VMState::Halt | VMState::Fault)
    }

    /// True when a bulk driver must stop.
    pub fn is_stopped(self) -> bool {
        self != VMState::None
    }
}

impl fmt::Display for VMState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMState::None => write!(f, "NONE"),
            VMState::Halt => write!(f, "HALT"),
            VMState::Fault => write!(f, "FAULT"),
            VMState::Break => write!(f, "BREAK"),
        }
    }
}
