#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::debugger::log_message;
use crate::protocol::{
    BreakpointActionType, BreakpointOptions, ProtocolBreakpointAction, ScriptId, ServerBreakpointId,
    TargetId,
};

/// Local handle of a breakpoint owned by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub(crate) u64);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bp{}", self.0)
    }
}

/// The three built-in pseudo-breakpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialBreakpoint {
    AllExceptions,
    AllUncaughtExceptions,
    Assertions,
}

impl SpecialBreakpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllExceptions => "all exceptions",
            Self::AllUncaughtExceptions => "all uncaught exceptions",
            Self::Assertions => "assertions",
        }
    }
}

/// What a breakpoint is anchored to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BreakpointSource {
    /// Durable, URL-based identity that survives reloads
    ContentIdentifier(String),
    /// Bound to one parsed-script instance; lost on reload
    Script { target: TargetId, script_id: ScriptId },
    Special(SpecialBreakpoint),
}

/// A parsed script a breakpoint location is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptRef {
    pub target: TargetId,
    pub script_id: ScriptId,
}

impl ScriptRef {
    pub fn new(target: impl Into<TargetId>, script_id: impl Into<ScriptId>) -> Self {
        Self { target: target.into(), script_id: script_id.into() }
    }
}

/// Line and column of a breakpoint plus the script it is currently bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCodeLocation {
    line: u32,
    column: u32,
    source_code: Option<ScriptRef>,
}

impl SourceCodeLocation {
    /// Line/column of the special breakpoints
    pub const SPECIAL: u32 = u32::MAX;

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column, source_code: None }
    }

    pub(crate) fn bound(line: u32, column: u32, script: ScriptRef) -> Self {
        Self { line, column, source_code: Some(script) }
    }

    pub fn special() -> Self {
        Self::new(Self::SPECIAL, Self::SPECIAL)
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn is_special(&self) -> bool {
        self.line == Self::SPECIAL && self.column == Self::SPECIAL
    }

    pub fn source_code(&self) -> Option<&ScriptRef> {
        self.source_code.as_ref()
    }
}

/// One action run when a breakpoint is hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointAction {
    #[serde(rename = "type")]
    pub action_type: BreakpointActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub id: u32,
}

impl BreakpointAction {
    pub fn new(action_type: BreakpointActionType, data: Option<String>) -> Self {
        Self { action_type, data, id: 0 }
    }
}

/// Durable form of a content-identifier breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointCookie {
    pub content_identifier: String,
    pub line_number: u32,
    #[serde(default)]
    pub column_number: u32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub actions: Vec<BreakpointAction>,
    #[serde(default)]
    pub ignore_count: u32,
    #[serde(default)]
    pub auto_continue: bool,
}

/// Notification returned by every attribute setter that changed something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointChange {
    DisabledState,
    Condition,
    IgnoreCount,
    AutoContinue,
    Actions,
    DisplayLocation,
}

impl BreakpointChange {
    /// Changes that alter what the target evaluates and need a resubmission
    pub fn is_editable_property(&self) -> bool {
        matches!(self, Self::Condition | Self::IgnoreCount | Self::AutoContinue | Self::Actions)
    }
}

/// Bookkeeping for in-flight gateway traffic of one breakpoint
#[derive(Debug, Clone, Default)]
pub(crate) struct SyncState {
    /// Bumped whenever in-flight set acknowledgements become stale
    pub(crate) generation: u64,
    /// Remove commands awaiting acknowledgement
    pub(crate) pending_removals: usize,
    /// Set again once every pending removal has completed
    pub(crate) resubmit: Option<Resubmission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resubmission {
    Edited,
    Moved,
}

/// A source location (or special sentinel) the debugger should stop at
#[derive(Debug, Clone)]
pub struct Breakpoint {
    source: BreakpointSource,
    location: SourceCodeLocation,
    condition: Option<String>,
    actions: Vec<BreakpointAction>,
    ignore_count: u32,
    auto_continue: bool,
    disabled: bool,
    resolved: bool,
    /// Identifiers acknowledged per target
    server_ids: BTreeMap<TargetId, ServerBreakpointId>,
    pub(crate) sync: SyncState,
}

impl Breakpoint {
    /// Create a new breakpoint, unresolved and unregistered
    pub fn new(source: BreakpointSource, line: u32, column: u32, disabled: bool) -> Self {
        let location = match source {
            BreakpointSource::Special(_) => SourceCodeLocation::special(),
            _ => SourceCodeLocation::new(line, column),
        };

        Self {
            source,
            location,
            condition: None,
            actions: Vec::new(),
            ignore_count: 0,
            auto_continue: false,
            disabled,
            resolved: false,
            server_ids: BTreeMap::new(),
            sync: SyncState::default(),
        }
    }

    /// Breakpoint identified by a script URL
    pub fn for_url(url: impl Into<String>, line: u32, column: u32) -> Self {
        Self::new(BreakpointSource::ContentIdentifier(url.into()), line, column, false)
    }

    /// Breakpoint bound to one script instance of one target
    pub fn for_script(target: impl Into<TargetId>, script_id: impl Into<ScriptId>, line: u32, column: u32) -> Self {
        let target = target.into();
        let script_id = script_id.into();
        let mut breakpoint = Self::new(
            BreakpointSource::Script { target: target.clone(), script_id: script_id.clone() },
            line,
            column,
            false,
        );
        breakpoint.location.source_code = Some(ScriptRef { target, script_id });
        breakpoint
    }

    pub(crate) fn special(kind: SpecialBreakpoint, disabled: bool) -> Self {
        Self::new(BreakpointSource::Special(kind), 0, 0, disabled)
    }

    /// Rebuild a breakpoint from its persisted form
    pub fn from_cookie(cookie: BreakpointCookie) -> Self {
        let mut breakpoint = Self::new(
            BreakpointSource::ContentIdentifier(cookie.content_identifier),
            cookie.line_number,
            cookie.column_number,
            cookie.disabled,
        );
        breakpoint.condition = cookie.condition.filter(|c| !c.is_empty());
        breakpoint.actions = cookie.actions;
        breakpoint.ignore_count = cookie.ignore_count;
        breakpoint.auto_continue = cookie.auto_continue;
        breakpoint
    }

    /// Durable record of this breakpoint; only content-identifier breakpoints persist
    pub fn serialize_for_persistence(&self) -> Option<BreakpointCookie> {
        let BreakpointSource::ContentIdentifier(content_identifier) = &self.source else {
            return None;
        };

        Some(BreakpointCookie {
            content_identifier: content_identifier.clone(),
            line_number: self.location.line,
            column_number: self.location.column,
            disabled: self.disabled,
            condition: self.condition.clone(),
            actions: self.actions.clone(),
            ignore_count: self.ignore_count,
            auto_continue: self.auto_continue,
        })
    }

    pub fn source(&self) -> &BreakpointSource {
        &self.source
    }

    pub fn content_identifier(&self) -> Option<&str> {
        match &self.source {
            BreakpointSource::ContentIdentifier(url) => Some(url),
            _ => None,
        }
    }

    pub fn script_identifier(&self) -> Option<&ScriptId> {
        match &self.source {
            BreakpointSource::Script { script_id, .. } => Some(script_id),
            _ => None,
        }
    }

    /// Target owning the script of a script-identifier breakpoint
    pub fn target(&self) -> Option<&TargetId> {
        match &self.source {
            BreakpointSource::Script { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn special_kind(&self) -> Option<SpecialBreakpoint> {
        match self.source {
            BreakpointSource::Special(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_special(&self) -> bool {
        self.special_kind().is_some()
    }

    pub fn location(&self) -> &SourceCodeLocation {
        &self.location
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn actions(&self) -> &[BreakpointAction] {
        &self.actions
    }

    pub fn ignore_count(&self) -> u32 {
        self.ignore_count
    }

    pub fn auto_continue(&self) -> bool {
        self.auto_continue
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Server identifier acknowledged by `target`
    pub fn server_identifier(&self, target: &TargetId) -> Option<&ServerBreakpointId> {
        self.server_ids.get(target)
    }

    pub fn server_identifiers(&self) -> impl Iterator<Item = (&TargetId, &ServerBreakpointId)> {
        self.server_ids.iter()
    }

    /// Whether any target currently holds this breakpoint
    pub fn is_registered(&self) -> bool {
        !self.server_ids.is_empty()
    }

    pub fn set_disabled(&mut self, disabled: bool) -> Option<BreakpointChange> {
        if self.disabled == disabled {
            return None;
        }
        self.disabled = disabled;
        Some(BreakpointChange::DisabledState)
    }

    pub fn set_condition(&mut self, condition: Option<String>) -> Option<BreakpointChange> {
        let condition = condition.filter(|c| !c.is_empty());
        if self.condition == condition {
            return None;
        }
        self.condition = condition;
        Some(BreakpointChange::Condition)
    }

    pub fn set_actions(&mut self, actions: Vec<BreakpointAction>) -> Option<BreakpointChange> {
        if self.actions == actions {
            return None;
        }
        self.actions = actions;
        Some(BreakpointChange::Actions)
    }

    pub fn clear_actions(&mut self) -> Option<BreakpointChange> {
        self.set_actions(Vec::new())
    }

    pub fn set_ignore_count(&mut self, ignore_count: u32) -> Option<BreakpointChange> {
        if self.ignore_count == ignore_count {
            return None;
        }
        self.ignore_count = ignore_count;
        Some(BreakpointChange::IgnoreCount)
    }

    pub fn set_auto_continue(&mut self, auto_continue: bool) -> Option<BreakpointChange> {
        if self.auto_continue == auto_continue {
            return None;
        }
        self.auto_continue = auto_continue;
        Some(BreakpointChange::AutoContinue)
    }

    /// Move the breakpoint; special breakpoints never move
    pub fn set_location(&mut self, line: u32, column: u32) -> Option<BreakpointChange> {
        if self.is_special() || (self.location.line == line && self.location.column == column) {
            return None;
        }
        self.location.line = line;
        self.location.column = column;
        Some(BreakpointChange::DisplayLocation)
    }

    pub(crate) fn set_resolved(&mut self, resolved: bool) -> bool {
        if self.resolved == resolved {
            return false;
        }
        self.resolved = resolved;
        true
    }

    pub(crate) fn bind_source_code(&mut self, script: ScriptRef) {
        if self.location.source_code.is_none() {
            self.location.source_code = Some(script);
        }
    }

    pub(crate) fn clear_source_code(&mut self) {
        self.location.source_code = None;
    }

    pub(crate) fn record_server_id(&mut self, target: TargetId, id: ServerBreakpointId) -> Option<ServerBreakpointId> {
        self.server_ids.insert(target, id)
    }

    pub(crate) fn take_server_ids(&mut self) -> BTreeMap<TargetId, ServerBreakpointId> {
        std::mem::take(&mut self.server_ids)
    }

    pub(crate) fn forget_target(&mut self, target: &TargetId) -> Option<ServerBreakpointId> {
        self.server_ids.remove(target)
    }

    /// Options sent with a set command.
    ///
    /// Templated log actions become evaluate actions; malformed templates are dropped.
    pub fn protocol_options(&self) -> BreakpointOptions {
        let mut actions = Vec::with_capacity(self.actions.len());

        for action in &self.actions {
            let data = action.data.as_deref().unwrap_or_default();
            if action.action_type == BreakpointActionType::Log && log_message::has_template_placeholder(data) {
                match log_message::compile_log_template(data) {
                    Some(script) => actions.push(ProtocolBreakpointAction {
                        action_type: BreakpointActionType::Evaluate,
                        data: Some(script),
                        id: action.id,
                    }),
                    None => debug!("Dropping log action {} with malformed template", action.id),
                }
                continue;
            }

            actions.push(ProtocolBreakpointAction {
                action_type: action.action_type,
                data: action.data.clone(),
                id: action.id,
            });
        }

        BreakpointOptions {
            condition: self.condition.clone(),
            actions,
            auto_continue: self.auto_continue,
            ignore_count: self.ignore_count,
        }
    }

    /// Short human-readable description
    pub fn get_description(&self) -> String {
        match &self.source {
            BreakpointSource::ContentIdentifier(url) => format!("{}:{}:{}", url, self.location.line, self.location.column),
            BreakpointSource::Script { script_id, .. } => {
                format!("script {}:{}:{}", script_id, self.location.line, self.location.column)
            }
            BreakpointSource::Special(kind) => kind.as_str().to_string(),
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.disabled { "disabled" } else { "enabled" };
        let resolution = if self.resolved { "resolved" } else { "unresolved" };

        write!(f, "Breakpoint at {} ({} {})", self.get_description(), status, resolution)?;

        if self.ignore_count > 0 {
            write!(f, ", ignore {} time(s)", self.ignore_count)?;
        }

        if let Some(condition) = &self.condition {
            write!(f, ", condition: {}", condition)?;
        }

        Ok(())
    }
}
