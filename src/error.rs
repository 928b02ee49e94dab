use thiserror::Error;

use crate::debugger::breakpoint::BreakpointId;
use crate::protocol::{ScriptId, TargetId};

/// Failure reported by a target for one command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("command rejected by target: {0}")]
    Rejected(String),
    #[error("target {0} is not connected")]
    Disconnected(TargetId),
    #[error("{0} is not supported by this protocol version")]
    Unsupported(&'static str),
}

/// Errors surfaced to callers of the debugger manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    #[error("cannot {0} because the debugger is not paused")]
    NotPaused(&'static str),
    #[error("breakpoint {0} cannot be removed")]
    NotRemovable(BreakpointId),
    #[error("breakpoint {0} cannot be edited")]
    NotEditable(BreakpointId),
    #[error("unknown breakpoint {0}")]
    UnknownBreakpoint(BreakpointId),
    #[error("unknown script {script} in target {target}")]
    UnknownScript { target: TargetId, script: ScriptId },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("operation was cancelled")]
    Cancelled,
}
