use tokio::sync::mpsc;

use crate::debugger::breakpoint::BreakpointId;
use crate::protocol::{ScriptId, TargetId};

/// Notifications emitted by the debugger manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerEvent {
    BreakpointAdded(BreakpointId),
    BreakpointRemoved(BreakpointId),
    BreakpointMoved(BreakpointId),
    BreakpointResolvedStateDidChange { breakpoint: BreakpointId, resolved: bool },
    BreakpointsEnabledDidChange(bool),
    WaitingToPause,
    Paused,
    Resumed,
    CallFramesDidChange(TargetId),
    ActiveCallFrameDidChange,
    ScriptAdded { target: TargetId, script: ScriptId },
    ScriptRemoved { target: TargetId, script: ScriptId },
    ScriptsCleared,
    BreakpointActionSound { action: u32 },
}

/// Fan-out of [`DebuggerEvent`]s to every live subscriber
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<DebuggerEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer; dropping the receiver unregisters it
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DebuggerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn dispatch(&mut self, event: DebuggerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
