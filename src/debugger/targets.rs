use std::fmt;

use indexmap::IndexMap;
use log::debug;

use crate::debugger::breakpoint::{ScriptRef, SourceCodeLocation};
use crate::protocol::{
    AsyncStackTrace, ProtocolCallFrame, ProtocolScope, ProtocolScopeType, ScriptId, ScriptParsed, TargetId,
};

/// Why a target paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Assertion,
    Breakpoint,
    CspViolation,
    DebuggerStatement,
    Exception,
    PauseOnNextStatement,
    Other,
}

impl PauseReason {
    /// Map a protocol pause reason; unknown reasons become `Other`
    pub fn from_protocol(reason: &str) -> Self {
        match reason {
            "assert" => Self::Assertion,
            "Breakpoint" => Self::Breakpoint,
            "CSPViolation" => Self::CspViolation,
            "DebuggerStatement" => Self::DebuggerStatement,
            "exception" => Self::Exception,
            "PauseOnNextStatement" => Self::PauseOnNextStatement,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assertion => "assertion",
            Self::Breakpoint => "breakpoint",
            Self::CspViolation => "CSP-violation",
            Self::DebuggerStatement => "debugger-statement",
            Self::Exception => "exception",
            Self::PauseOnNextStatement => "pause-on-next-statement",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    With,
    Closure,
    Catch,
    FunctionName,
    Block,
    GlobalLexicalEnvironment,
}

impl From<ProtocolScopeType> for ScopeKind {
    fn from(scope_type: ProtocolScopeType) -> Self {
        match scope_type {
            ProtocolScopeType::Global => Self::Global,
            ProtocolScopeType::With => Self::With,
            ProtocolScopeType::Closure => Self::Closure,
            ProtocolScopeType::Catch => Self::Catch,
            ProtocolScopeType::FunctionName => Self::FunctionName,
            ProtocolScopeType::NestedLexical => Self::Block,
            ProtocolScopeType::GlobalLexicalEnvironment => Self::GlobalLexicalEnvironment,
            // Older backends report function locals separately; they are closures
            ProtocolScopeType::Local => Self::Closure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChainNode {
    pub kind: ScopeKind,
    pub name: Option<String>,
    pub empty: bool,
}

impl From<&ProtocolScope> for ScopeChainNode {
    fn from(scope: &ProtocolScope) -> Self {
        Self { kind: scope.scope_type.into(), name: scope.name.clone(), empty: scope.empty }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Program,
    Module,
}

/// A script parsed by one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub id: ScriptId,
    pub target: TargetId,
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub source_map_url: Option<String>,
    /// start line, start column, end line, end column
    pub range: (u32, u32, u32, u32),
    pub source_type: SourceType,
    pub is_content_script: bool,
}

const INTERNAL_SCRIPT_PREFIXES: [&str; 2] = ["__InjectedScript_", "__WebInspector"];
const CONSOLE_EVALUATION_URL: &str = "__WebInspectorConsoleEvaluation__";

impl Script {
    pub fn from_payload(target: TargetId, payload: &ScriptParsed) -> Self {
        Self {
            id: payload.script_id.clone(),
            target,
            url: payload.url.clone().filter(|url| !url.is_empty()),
            source_url: payload.source_url.clone().filter(|url| !url.is_empty()),
            source_map_url: payload.source_map_url.clone(),
            range: (payload.start_line, payload.start_column, payload.end_line, payload.end_column),
            source_type: if payload.is_module { SourceType::Module } else { SourceType::Program },
            is_content_script: payload.is_content_script,
        }
    }

    /// URL-based identity: the `sourceURL` directive wins over the load URL
    pub fn content_identifier(&self) -> Option<&str> {
        self.source_url.as_deref().or(self.url.as_deref())
    }

    pub fn script_ref(&self) -> ScriptRef {
        ScriptRef { target: self.target.clone(), script_id: self.id.clone() }
    }

    /// Engine-injected scripts, hidden unless the debug UI is on
    pub fn is_internal(&self) -> bool {
        self.source_url
            .as_deref()
            .is_some_and(|url| INTERNAL_SCRIPT_PREFIXES.iter().any(|prefix| url.starts_with(prefix)))
    }

    pub fn is_console_evaluation(&self) -> bool {
        self.source_url.as_deref() == Some(CONSOLE_EVALUATION_URL)
    }
}

/// One frame of a paused target's stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub id: String,
    pub target: TargetId,
    pub function_name: String,
    pub location: SourceCodeLocation,
    pub scope_chain: Vec<ScopeChainNode>,
    pub is_tail_deleted: bool,
}

impl CallFrame {
    pub(crate) fn from_payload(target: &TargetId, payload: &ProtocolCallFrame, script: &Script) -> Self {
        let location = SourceCodeLocation::bound(
            payload.location.line_number,
            payload.location.column_number,
            script.script_ref(),
        );

        Self {
            id: payload.call_frame_id.clone(),
            target: target.clone(),
            function_name: payload.function_name.clone(),
            location,
            scope_chain: payload.scope_chain.iter().map(ScopeChainNode::from).collect(),
            is_tail_deleted: payload.is_tail_deleted,
        }
    }

    pub fn script(&self) -> Option<&ScriptRef> {
        self.location.source_code()
    }
}

/// Debugger state of one execution target
#[derive(Debug)]
pub struct TargetDebuggerState {
    target: TargetId,
    scripts: IndexMap<ScriptId, Script>,
    initialized: bool,
    paused: bool,
    /// A pause command is in flight
    pausing: bool,
    making_forward_progress: bool,
    call_frames: Vec<CallFrame>,
    pause_reason: Option<PauseReason>,
    pause_data: Option<serde_json::Value>,
    async_stack_trace: Option<AsyncStackTrace>,
}

impl TargetDebuggerState {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            scripts: IndexMap::new(),
            initialized: false,
            paused: false,
            pausing: false,
            making_forward_progress: false,
            call_frames: Vec::new(),
            pause_reason: None,
            pause_data: None,
            async_stack_trace: None,
        }
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_pausing(&self) -> bool {
        self.pausing
    }

    pub fn call_frames(&self) -> &[CallFrame] {
        &self.call_frames
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.pause_reason
    }

    pub fn pause_data(&self) -> Option<&serde_json::Value> {
        self.pause_data.as_ref()
    }

    pub fn async_stack_trace(&self) -> Option<&AsyncStackTrace> {
        self.async_stack_trace.as_ref()
    }

    pub fn scripts(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }

    pub fn script_for_identifier(&self, id: &ScriptId) -> Option<&Script> {
        self.scripts.get(id)
    }

    pub fn scripts_for_url<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Script> + 'a {
        self.scripts.values().filter(move |script| script.url.as_deref() == Some(url))
    }

    pub(crate) fn add_script(&mut self, script: Script) {
        self.scripts.insert(script.id.clone(), script);
    }

    /// Whether a pause command should be sent; marks the pause as in flight
    pub(crate) fn pause_if_needed(&mut self) -> bool {
        if self.paused || self.pausing {
            return false;
        }
        self.pausing = true;
        true
    }

    /// Whether a resume command should be sent
    pub(crate) fn resume_if_needed(&mut self) -> bool {
        if !self.paused && !self.pausing {
            return false;
        }
        self.pausing = false;
        true
    }

    pub(crate) fn continue_until_next_run_loop(&mut self) -> bool {
        if !self.paused || self.making_forward_progress {
            return false;
        }
        self.making_forward_progress = true;
        true
    }

    pub(crate) fn pause_failed(&mut self) {
        self.pausing = false;
    }

    pub(crate) fn update_for_pause(
        &mut self,
        call_frames: Vec<CallFrame>,
        reason: PauseReason,
        data: Option<serde_json::Value>,
        async_stack_trace: Option<AsyncStackTrace>,
    ) {
        debug_assert!(!call_frames.is_empty());
        debug!("Target {} paused ({}), {} frame(s)", self.target, reason, call_frames.len());

        self.paused = true;
        self.pausing = false;
        self.making_forward_progress = false;
        self.call_frames = call_frames;
        self.pause_reason = Some(reason);
        self.pause_data = data;
        self.async_stack_trace = async_stack_trace;
    }

    pub(crate) fn update_for_resume(&mut self) {
        debug!("Target {} resumed", self.target);

        self.paused = false;
        self.pausing = false;
        self.making_forward_progress = false;
        self.call_frames.clear();
        self.pause_reason = None;
        self.pause_data = None;
        self.async_stack_trace = None;
    }

    /// Forget scripts and pause state after the target navigated
    pub(crate) fn reset(&mut self) {
        self.scripts.clear();
        self.update_for_resume();
    }
}
