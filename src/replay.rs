//! Replays a JSON transcript of user actions and backend events against a
//! [`ScriptedGateway`], reporting every notification the manager emits.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::debugger::breakpoint::{Breakpoint, BreakpointId};
use crate::debugger::core::ManagerConfig;
use crate::debugger::events::DebuggerEvent;
use crate::debugger::session::DebuggerSession;
use crate::protocol::{Capabilities, GatewayEvent, ProtocolLocation, ScriptParsed, ScriptedGateway, TargetId};
use crate::settings::DebuggerSettings;

/// Longest wait for a pause, resume or step to take effect
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Step {
    #[serde(rename_all = "camelCase")]
    InitializeTarget { target: TargetId },
    #[serde(rename_all = "camelCase")]
    TargetRemoved { target: TargetId },
    #[serde(rename_all = "camelCase")]
    ScriptParsed {
        #[serde(default)]
        target: Option<TargetId>,
        script: ScriptParsed,
    },
    #[serde(rename_all = "camelCase")]
    HitBreakpoint {
        #[serde(default)]
        target: Option<TargetId>,
        location: ProtocolLocation,
    },
    #[serde(rename_all = "camelCase")]
    ClearGlobalObject {
        #[serde(default)]
        target: Option<TargetId>,
    },
    /// Raw backend event
    #[serde(rename_all = "camelCase")]
    Event {
        #[serde(default)]
        target: Option<TargetId>,
        event: GatewayEvent,
    },
    #[serde(rename_all = "camelCase")]
    AddBreakpoint {
        url: String,
        line: u32,
        #[serde(default)]
        column: u32,
        #[serde(default)]
        condition: Option<String>,
    },
    /// Index into the breakpoint list, in insertion order
    #[serde(rename_all = "camelCase")]
    RemoveBreakpoint { index: usize },
    #[serde(rename_all = "camelCase")]
    SetBreakpointDisabled { index: usize, disabled: bool },
    #[serde(rename_all = "camelCase")]
    SetBreakpointsEnabled { enabled: bool },
    #[serde(rename_all = "camelCase")]
    BreakOnAllExceptions { enabled: bool },
    #[serde(rename_all = "camelCase")]
    BreakOnUncaughtExceptions { enabled: bool },
    Pause,
    Resume,
    StepOver,
    StepInto,
    StepOut,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitializeTarget { .. } => "initializeTarget",
            Self::TargetRemoved { .. } => "targetRemoved",
            Self::ScriptParsed { .. } => "scriptParsed",
            Self::HitBreakpoint { .. } => "hitBreakpoint",
            Self::ClearGlobalObject { .. } => "clearGlobalObject",
            Self::Event { .. } => "event",
            Self::AddBreakpoint { .. } => "addBreakpoint",
            Self::RemoveBreakpoint { .. } => "removeBreakpoint",
            Self::SetBreakpointDisabled { .. } => "setBreakpointDisabled",
            Self::SetBreakpointsEnabled { .. } => "setBreakpointsEnabled",
            Self::BreakOnAllExceptions { .. } => "breakOnAllExceptions",
            Self::BreakOnUncaughtExceptions { .. } => "breakOnUncaughtExceptions",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::StepOver => "stepOver",
            Self::StepInto => "stepInto",
            Self::StepOut => "stepOut",
        }
    }
}

/// Load a transcript: a JSON array of steps
pub fn load_transcript(path: impl AsRef<Path>) -> Result<Vec<Step>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).with_context(|| format!("reading transcript {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing transcript {}", path.display()))
}

/// A session wired to a scripted backend
pub struct Replay {
    session: DebuggerSession<ScriptedGateway>,
    events: mpsc::UnboundedReceiver<DebuggerEvent>,
}

impl Replay {
    pub async fn start(capabilities: Capabilities, settings: DebuggerSettings, config: ManagerConfig) -> Result<Self> {
        let (gateway, rx) = ScriptedGateway::new(capabilities);
        let mut session = DebuggerSession::connect(gateway, rx, settings, config).await?;
        let events = session.subscribe();
        session.settle().await;

        Ok(Self { session, events })
    }

    pub fn session(&self) -> &DebuggerSession<ScriptedGateway> {
        &self.session
    }

    pub fn gateway(&self) -> &Arc<ScriptedGateway> {
        self.session.gateway()
    }

    /// Apply one step, let the session settle and return what it emitted
    pub async fn apply(&mut self, step: &Step) -> Result<Vec<DebuggerEvent>> {
        debug!("Replaying {:?}", step);
        let main = self.session.manager().main_target().clone();

        match step {
            Step::InitializeTarget { target } => self.session.initialize_target(target.clone()),
            Step::TargetRemoved { target } => self.session.target_removed(target),
            Step::ScriptParsed { target, script } => {
                self.gateway().parse_script(target.as_ref().unwrap_or(&main), script.clone())
            }
            Step::HitBreakpoint { target, location } => {
                self.gateway().hit_breakpoint(target.as_ref().unwrap_or(&main), location.clone())
            }
            Step::ClearGlobalObject { target } => self.gateway().clear_global_object(target.as_ref().unwrap_or(&main)),
            Step::Event { target, event } => self.gateway().send_event(target.as_ref().unwrap_or(&main), event.clone()),
            Step::AddBreakpoint { url, line, column, condition } => {
                let mut breakpoint = Breakpoint::for_url(url.clone(), *line, *column);
                breakpoint.set_condition(condition.clone());
                self.session.add_breakpoint(breakpoint);
            }
            Step::RemoveBreakpoint { index } => {
                let id = self.breakpoint_at(*index)?;
                self.session.remove_breakpoint(id)?;
            }
            Step::SetBreakpointDisabled { index, disabled } => {
                let id = self.breakpoint_at(*index)?;
                self.session
                    .with_manager(|manager| manager.set_breakpoint_disabled(id, *disabled))?;
            }
            Step::SetBreakpointsEnabled { enabled } => self.session.set_breakpoints_enabled(*enabled),
            Step::BreakOnAllExceptions { enabled } => {
                self.session.with_manager(|manager| {
                    manager.set_breakpoint_disabled(manager.all_exceptions_breakpoint(), !enabled)
                })?;
            }
            Step::BreakOnUncaughtExceptions { enabled } => {
                self.session.with_manager(|manager| {
                    manager.set_breakpoint_disabled(manager.all_uncaught_exceptions_breakpoint(), !enabled)
                })?;
            }
            Step::Pause => self.wait(step).await?,
            Step::Resume => self.wait(step).await?,
            Step::StepOver => self.wait(step).await?,
            Step::StepInto => self.wait(step).await?,
            Step::StepOut => self.wait(step).await?,
        }

        self.session.settle().await;

        let mut emitted = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            emitted.push(event);
        }
        Ok(emitted)
    }

    async fn wait(&mut self, step: &Step) -> Result<()> {
        let operation = async {
            match step {
                Step::Pause => self.session.pause().await,
                Step::Resume => self.session.resume().await,
                Step::StepOver => self.session.step_over().await,
                Step::StepInto => self.session.step_into().await,
                Step::StepOut => self.session.step_out().await,
                _ => Ok(()),
            }
        };

        timeout(STEP_TIMEOUT, operation)
            .await
            .map_err(|_| anyhow!("timed out waiting for {}", step.name()))??;
        Ok(())
    }

    fn breakpoint_at(&self, index: usize) -> Result<BreakpointId> {
        self.session
            .manager()
            .breakpoint_ids()
            .get(index)
            .copied()
            .ok_or_else(|| anyhow!("no breakpoint at index {}", index))
    }

    /// Human-readable state of the manager
    pub fn summary(&self) -> String {
        let manager = self.session.manager();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "breakpoints {} | exceptions: {} | {}",
            if manager.breakpoints_enabled() { "enabled" } else { "disabled" },
            manager.break_on_exceptions_state(),
            if manager.paused() { "paused" } else { "running" },
        );
        for (id, breakpoint) in manager.breakpoints() {
            let targets: Vec<String> = breakpoint
                .server_identifiers()
                .map(|(target, server_id)| format!("{}={}", target, server_id))
                .collect();
            let _ = writeln!(
                out,
                "  {} {}{}{} [{}]",
                id,
                breakpoint.get_description(),
                if breakpoint.is_disabled() { " (disabled)" } else { "" },
                if breakpoint.is_resolved() { " (resolved)" } else { "" },
                targets.join(", "),
            );
        }
        if let Some(frame) = manager.active_call_frame() {
            let _ = writeln!(
                out,
                "  active frame: {} in {} at line {}",
                frame.function_name,
                frame.target,
                frame.location.line()
            );
        }

        info!("Replay finished with {} breakpoint(s)", manager.breakpoint_ids().len());
        out
    }
}
