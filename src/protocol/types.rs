use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// One independently debuggable execution context (main frame, worker)
    TargetId
);
string_id!(
    /// Identifier of one parsed script instance inside a target
    ScriptId
);
string_id!(
    /// Breakpoint identifier handed out by a target when a set is acknowledged
    ServerBreakpointId
);

/// Break-on-exceptions mode pushed to every target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseOnExceptionsMode {
    #[default]
    None,
    Uncaught,
    All,
}

impl PauseOnExceptionsMode {
    /// Derive the mode from the global enabled flag and the two exception sentinels
    pub fn derive(breakpoints_enabled: bool, all_exceptions_disabled: bool, all_uncaught_disabled: bool) -> Self {
        if !breakpoints_enabled {
            Self::None
        } else if !all_exceptions_disabled {
            Self::All
        } else if !all_uncaught_disabled {
            Self::Uncaught
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Uncaught => "uncaught",
            Self::All => "all",
        }
    }
}

impl fmt::Display for PauseOnExceptionsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position inside a parsed script, as reported by a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolLocation {
    pub script_id: ScriptId,
    pub line_number: u32,
    #[serde(default)]
    pub column_number: u32,
}

/// Action kinds understood by targets that support breakpoint options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointActionType {
    Log,
    Evaluate,
    Sound,
    Probe,
}

impl BreakpointActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Evaluate => "evaluate",
            Self::Sound => "sound",
            Self::Probe => "probe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolBreakpointAction {
    #[serde(rename = "type")]
    pub action_type: BreakpointActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub actions: Vec<ProtocolBreakpointAction>,
    pub auto_continue: bool,
    pub ignore_count: u32,
}

/// Parameters of `setBreakpointByUrl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrl {
    pub line_number: u32,
    pub url: String,
    pub column_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<BreakpointOptions>,
}

/// Parameters of `setBreakpoint`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpoint {
    pub location: ProtocolLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<BreakpointOptions>,
}

/// Acknowledgement of either set command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointSet {
    pub breakpoint_id: ServerBreakpointId,
    pub locations: Vec<ProtocolLocation>,
}

/// Every command the manager sends to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCommand {
    Enable,
    SetBreakpointsActive(bool),
    SetPauseOnExceptions(PauseOnExceptionsMode),
    SetPauseOnAssertions(bool),
    SetAsyncStackTraceDepth(u32),
    SetBreakpointByUrl(SetBreakpointByUrl),
    SetBreakpoint(SetBreakpoint),
    RemoveBreakpoint(ServerBreakpointId),
    Pause,
    Resume,
    ContinueUntilNextRunLoop,
    StepOver,
    StepInto,
    StepOut,
    ContinueToLocation(ProtocolLocation),
}

impl GatewayCommand {
    /// Protocol method name, used for logging
    pub fn method(&self) -> &'static str {
        match self {
            Self::Enable => "Debugger.enable",
            Self::SetBreakpointsActive(_) => "Debugger.setBreakpointsActive",
            Self::SetPauseOnExceptions(_) => "Debugger.setPauseOnExceptions",
            Self::SetPauseOnAssertions(_) => "Debugger.setPauseOnAssertions",
            Self::SetAsyncStackTraceDepth(_) => "Debugger.setAsyncStackTraceDepth",
            Self::SetBreakpointByUrl(_) => "Debugger.setBreakpointByUrl",
            Self::SetBreakpoint(_) => "Debugger.setBreakpoint",
            Self::RemoveBreakpoint(_) => "Debugger.removeBreakpoint",
            Self::Pause => "Debugger.pause",
            Self::Resume => "Debugger.resume",
            Self::ContinueUntilNextRunLoop => "Debugger.continueUntilNextRunLoop",
            Self::StepOver => "Debugger.stepOver",
            Self::StepInto => "Debugger.stepInto",
            Self::StepOut => "Debugger.stepOut",
            Self::ContinueToLocation(_) => "Debugger.continueToLocation",
        }
    }
}

/// Successful outcome of a [`GatewayCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResponse {
    Ack,
    BreakpointSet(BreakpointSet),
}

/// Scope kinds as reported by the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolScopeType {
    Global,
    With,
    Closure,
    Catch,
    FunctionName,
    GlobalLexicalEnvironment,
    NestedLexical,
    /// Only sent by old backends
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolScope {
    #[serde(rename = "type")]
    pub scope_type: ProtocolScopeType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolCallFrame {
    pub call_frame_id: String,
    #[serde(default)]
    pub function_name: String,
    pub location: ProtocolLocation,
    #[serde(default)]
    pub scope_chain: Vec<ProtocolScope>,
    #[serde(default)]
    pub is_tail_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncStackTrace {
    pub call_frames: Vec<ProtocolCallFrame>,
    #[serde(default)]
    pub top_call_frame_is_boundary: bool,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub parent_stack_trace: Option<Box<AsyncStackTrace>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
    pub script_id: ScriptId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub start_column: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub end_column: u32,
    #[serde(default)]
    pub is_module: bool,
    #[serde(default)]
    pub is_content_script: bool,
    #[serde(default, rename = "sourceURL")]
    pub source_url: Option<String>,
    #[serde(default, rename = "sourceMapURL")]
    pub source_map_url: Option<String>,
}

impl ScriptParsed {
    /// Minimal payload for a script at `url`
    pub fn new(script_id: impl Into<ScriptId>, url: Option<&str>) -> Self {
        Self {
            script_id: script_id.into(),
            url: url.map(str::to_string),
            start_line: 0,
            start_column: 0,
            end_line: 0,
            end_column: 0,
            is_module: false,
            is_content_script: false,
            source_url: None,
            source_map_url: None,
        }
    }
}

impl From<String> for ScriptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Debugger-domain events delivered by a target, in target order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum GatewayEvent {
    ScriptParsed(ScriptParsed),
    #[serde(rename_all = "camelCase")]
    Paused {
        call_frames: Vec<ProtocolCallFrame>,
        reason: String,
        #[serde(default)]
        data: Option<serde_json::Value>,
        #[serde(default)]
        async_stack_trace: Option<AsyncStackTrace>,
    },
    Resumed,
    #[serde(rename_all = "camelCase")]
    BreakpointResolved {
        breakpoint_id: ServerBreakpointId,
        location: ProtocolLocation,
    },
    GlobalObjectCleared,
    #[serde(rename_all = "camelCase")]
    PlayBreakpointActionSound {
        breakpoint_action_id: u32,
    },
}
