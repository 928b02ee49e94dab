//! In-process gateway that behaves like a cooperative backend.
//!
//! Every call is recorded. Events the backend would emit (script parses,
//! pauses, resumes) are pushed to the channel returned by [`ScriptedGateway::new`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, trace};
use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::protocol::gateway::{Capabilities, ProtocolGateway};
use crate::protocol::types::{
    BreakpointSet, GatewayCommand, GatewayEvent, PauseOnExceptionsMode, ProtocolCallFrame, ProtocolLocation,
    ScriptParsed, ServerBreakpointId, SetBreakpoint, SetBreakpointByUrl, TargetId,
};

pub type EventSender = mpsc::UnboundedSender<(TargetId, GatewayEvent)>;
pub type EventReceiver = mpsc::UnboundedReceiver<(TargetId, GatewayEvent)>;

#[derive(Debug, Default)]
struct ScriptedState {
    calls: Vec<(TargetId, GatewayCommand)>,
    scripts: HashMap<TargetId, Vec<ScriptParsed>>,
    breakpoints: HashMap<TargetId, HashSet<ServerBreakpointId>>,
    paused: HashMap<TargetId, ProtocolLocation>,
    detached: HashSet<TargetId>,
    rejection: Option<String>,
    next_breakpoint: u32,
    next_frame: u32,
}

#[derive(Debug)]
pub struct ScriptedGateway {
    capabilities: Capabilities,
    events: EventSender,
    state: Mutex<ScriptedState>,
}

impl ScriptedGateway {
    pub fn new(capabilities: Capabilities) -> (Arc<Self>, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            capabilities,
            events,
            state: Mutex::new(ScriptedState::default()),
        };
        (Arc::new(gateway), rx)
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, target: &TargetId, event: GatewayEvent) {
        trace!("scripted <- {} {:?}", target, event);
        if self.events.send((target.clone(), event)).is_err() {
            debug!("Dropping event for {}: session is gone", target);
        }
    }

    /// Deliver an arbitrary event as if the target had sent it
    pub fn send_event(&self, target: &TargetId, event: GatewayEvent) {
        self.emit(target, event);
    }

    /// The target parsed a script
    pub fn parse_script(&self, target: &TargetId, payload: ScriptParsed) {
        self.state()
            .scripts
            .entry(target.clone())
            .or_default()
            .push(payload.clone());
        self.emit(target, GatewayEvent::ScriptParsed(payload));
    }

    /// The target navigated: scripts are gone, registrations survive
    pub fn clear_global_object(&self, target: &TargetId) {
        {
            let mut state = self.state();
            state.scripts.remove(target);
            state.paused.remove(target);
        }
        self.emit(target, GatewayEvent::GlobalObjectCleared);
    }

    /// Pause the target as if it hit a breakpoint at `location`
    pub fn hit_breakpoint(&self, target: &TargetId, location: ProtocolLocation) {
        self.enter_pause(target, location, "Breakpoint");
    }

    /// Fail every subsequent set command with `reason`, or stop failing
    pub fn reject_breakpoints(&self, reason: Option<&str>) {
        self.state().rejection = reason.map(str::to_string);
    }

    /// Fail every subsequent command addressed to `target`
    pub fn detach(&self, target: &TargetId) {
        self.state().detached.insert(target.clone());
    }

    pub fn calls(&self) -> Vec<(TargetId, GatewayCommand)> {
        self.state().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<(TargetId, GatewayCommand)> {
        std::mem::take(&mut self.state().calls)
    }

    /// Server identifiers currently registered in `target`
    pub fn registered_breakpoints(&self, target: &TargetId) -> HashSet<ServerBreakpointId> {
        self.state().breakpoints.get(target).cloned().unwrap_or_default()
    }

    pub fn is_paused(&self, target: &TargetId) -> bool {
        self.state().paused.contains_key(target)
    }

    fn record(&self, target: &TargetId, command: GatewayCommand) -> Result<(), ProtocolError> {
        let mut state = self.state();
        state.calls.push((target.clone(), command));
        if state.detached.contains(target) {
            return Err(ProtocolError::Disconnected(target.clone()));
        }
        Ok(())
    }

    fn register(&self, target: &TargetId, label: String) -> Result<ServerBreakpointId, ProtocolError> {
        let mut state = self.state();
        if let Some(reason) = &state.rejection {
            return Err(ProtocolError::Rejected(reason.clone()));
        }

        state.next_breakpoint += 1;
        let id = ServerBreakpointId::new(format!("{}#{}", label, state.next_breakpoint));
        state.breakpoints.entry(target.clone()).or_default().insert(id.clone());
        Ok(id)
    }

    fn enter_pause(&self, target: &TargetId, location: ProtocolLocation, reason: &str) {
        let call_frame_id = {
            let mut state = self.state();
            state.next_frame += 1;
            state.paused.insert(target.clone(), location.clone());
            format!("frame-{}", state.next_frame)
        };

        let frame = ProtocolCallFrame {
            call_frame_id,
            function_name: "scripted".into(),
            location,
            scope_chain: Vec::new(),
            is_tail_deleted: false,
        };
        self.emit(
            target,
            GatewayEvent::Paused {
                call_frames: vec![frame],
                reason: reason.to_string(),
                data: None,
                async_stack_trace: None,
            },
        );
    }

    fn leave_pause(&self, target: &TargetId) -> Option<ProtocolLocation> {
        let location = self.state().paused.remove(target)?;
        self.emit(target, GatewayEvent::Resumed);
        Some(location)
    }

    /// Resume, then stop again one line further on
    fn step(&self, target: &TargetId, line_delta: i32) -> Result<(), ProtocolError> {
        let Some(mut location) = self.leave_pause(target) else {
            return Err(ProtocolError::Rejected("not paused".into()));
        };
        location.line_number = location.line_number.saturating_add_signed(line_delta);
        self.enter_pause(target, location, "other");
        Ok(())
    }
}

#[async_trait]
impl ProtocolGateway for ScriptedGateway {
    async fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn enable(&self, target: TargetId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::Enable)
    }

    async fn set_breakpoints_active(&self, target: TargetId, active: bool) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::SetBreakpointsActive(active))
    }

    async fn set_pause_on_exceptions(&self, target: TargetId, mode: PauseOnExceptionsMode) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::SetPauseOnExceptions(mode))
    }

    async fn set_pause_on_assertions(&self, target: TargetId, enabled: bool) -> Result<(), ProtocolError> {
        if !self.capabilities.pause_on_assertions {
            return Err(ProtocolError::Unsupported("Debugger.setPauseOnAssertions"));
        }
        self.record(&target, GatewayCommand::SetPauseOnAssertions(enabled))
    }

    async fn set_async_stack_trace_depth(&self, target: TargetId, depth: u32) -> Result<(), ProtocolError> {
        if !self.capabilities.async_stack_trace_depth {
            return Err(ProtocolError::Unsupported("Debugger.setAsyncStackTraceDepth"));
        }
        self.record(&target, GatewayCommand::SetAsyncStackTraceDepth(depth))
    }

    async fn set_breakpoint_by_url(&self, target: TargetId, params: SetBreakpointByUrl) -> Result<BreakpointSet, ProtocolError> {
        self.record(&target, GatewayCommand::SetBreakpointByUrl(params.clone()))?;

        let label = format!("{}:{}:{}", params.url, params.line_number, params.column_number);
        let breakpoint_id = self.register(&target, label)?;

        let locations = self
            .state()
            .scripts
            .get(&target)
            .map(|scripts| {
                scripts
                    .iter()
                    .filter(|script| {
                        script.source_url.as_deref().or(script.url.as_deref()) == Some(params.url.as_str())
                    })
                    .map(|script| ProtocolLocation {
                        script_id: script.script_id.clone(),
                        line_number: params.line_number,
                        column_number: params.column_number,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(BreakpointSet { breakpoint_id, locations })
    }

    async fn set_breakpoint(&self, target: TargetId, params: SetBreakpoint) -> Result<BreakpointSet, ProtocolError> {
        self.record(&target, GatewayCommand::SetBreakpoint(params.clone()))?;

        let known = self
            .state()
            .scripts
            .get(&target)
            .is_some_and(|scripts| scripts.iter().any(|s| s.script_id == params.location.script_id));
        if !known {
            return Err(ProtocolError::Rejected(format!("unknown script {}", params.location.script_id)));
        }

        let label = format!("{}:{}:{}", params.location.script_id, params.location.line_number, params.location.column_number);
        let breakpoint_id = self.register(&target, label)?;
        Ok(BreakpointSet { breakpoint_id, locations: vec![params.location] })
    }

    async fn remove_breakpoint(&self, target: TargetId, breakpoint_id: ServerBreakpointId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::RemoveBreakpoint(breakpoint_id.clone()))?;

        let removed = self
            .state()
            .breakpoints
            .get_mut(&target)
            .is_some_and(|ids| ids.remove(&breakpoint_id));
        if removed {
            Ok(())
        } else {
            Err(ProtocolError::Rejected(format!("no breakpoint {}", breakpoint_id)))
        }
    }

    async fn pause(&self, target: TargetId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::Pause)?;
        if self.is_paused(&target) {
            return Ok(());
        }

        let script = self
            .state()
            .scripts
            .get(&target)
            .and_then(|scripts| scripts.first().map(|s| s.script_id.clone()));
        if let Some(script_id) = script {
            let location = ProtocolLocation { script_id, line_number: 0, column_number: 0 };
            self.enter_pause(&target, location, "PauseOnNextStatement");
        }
        Ok(())
    }

    async fn resume(&self, target: TargetId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::Resume)?;
        self.leave_pause(&target);
        Ok(())
    }

    async fn continue_until_next_run_loop(&self, target: TargetId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::ContinueUntilNextRunLoop)?;
        self.leave_pause(&target);
        Ok(())
    }

    async fn step_over(&self, target: TargetId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::StepOver)?;
        self.step(&target, 1)
    }

    async fn step_into(&self, target: TargetId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::StepInto)?;
        self.step(&target, 1)
    }

    async fn step_out(&self, target: TargetId) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::StepOut)?;
        self.step(&target, -1)
    }

    async fn continue_to_location(&self, target: TargetId, location: ProtocolLocation) -> Result<(), ProtocolError> {
        self.record(&target, GatewayCommand::ContinueToLocation(location.clone()))?;
        if self.leave_pause(&target).is_none() {
            return Err(ProtocolError::Rejected("not paused".into()));
        }
        self.enter_pause(&target, location, "other");
        Ok(())
    }
}
