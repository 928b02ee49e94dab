//! Breakpoint and pause-state manager for a multi-target web inspector.
//!
//! The core [`DebuggerManager`] owns every breakpoint, keeps the per-target
//! debugger state and decides which protocol commands each target needs.
//! [`DebuggerSession`] drives it against any [`ProtocolGateway`].

pub mod debugger;
pub mod error;
pub mod protocol;
pub mod replay;
pub mod settings;

/// Re-export key types for easier access in tests
pub use debugger::breakpoint::{Breakpoint, BreakpointAction, BreakpointCookie, BreakpointId, BreakpointSource, ScriptRef};
pub use debugger::core::{
    AddBreakpointOptions, Completion, DebuggerManager, ManagerConfig, OutgoingRequest, TimerCommand, TimerEvent,
};
pub use debugger::events::DebuggerEvent;
pub use debugger::session::DebuggerSession;
pub use debugger::targets::{CallFrame, PauseReason, Script, TargetDebuggerState};
pub use error::{DebuggerError, ProtocolError};
pub use protocol::{Capabilities, GatewayCommand, GatewayEvent, PauseOnExceptionsMode, ProtocolGateway, ScriptedGateway, TargetId};
pub use settings::{DebuggerSettings, JsonFileSettingsStore, MemorySettingsStore, SettingsStore};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize the logging system
pub fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("inspector_debugger", level)
        .format_timestamp_secs()
        .init();
}
