use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::debugger::breakpoint::{
    Breakpoint, BreakpointAction, BreakpointChange, BreakpointId, BreakpointSource, Resubmission, ScriptRef,
    SpecialBreakpoint,
};
use crate::debugger::events::{DebuggerEvent, EventBus};
use crate::debugger::targets::{CallFrame, PauseReason, Script, TargetDebuggerState};
use crate::error::{DebuggerError, ProtocolError};
use crate::protocol::{
    AsyncStackTrace, Capabilities, GatewayCommand, GatewayResponse, PauseOnExceptionsMode, ProtocolCallFrame,
    ProtocolEventHandler, ProtocolLocation, ScriptId, ScriptParsed, ServerBreakpointId, SetBreakpoint,
    SetBreakpointByUrl, TargetId,
};
use crate::settings::DebuggerSettings;

/// Identifier of one queued protocol request
pub type RequestId = u64;

/// Window during which an ambiguous `resumed` event may still be followed by a pause
pub const DEFAULT_RESUME_DEBOUNCE: Duration = Duration::from_millis(50);

/// Static configuration of a [`DebuggerManager`]
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Target that always exists and is listed first
    pub main_target: TargetId,
    pub resume_debounce: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            main_target: TargetId::from("main"),
            resume_debounce: DEFAULT_RESUME_DEBOUNCE,
        }
    }
}

/// A command the manager wants delivered to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub id: RequestId,
    pub target: TargetId,
    pub command: GatewayCommand,
}

/// Deferred work scheduled by the manager itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    DelayedResume { token: u64 },
}

impl TimerEvent {
    pub fn token(&self) -> u64 {
        match self {
            Self::DelayedResume { token } => *token,
        }
    }
}

/// Timer work for whoever drives the manager.
///
/// The manager never owns a clock. A driver arms `Schedule` and feeds the
/// event back through [`DebuggerManager::handle_timer`] once `delay` elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Schedule { event: TimerEvent, delay: Duration },
    Cancel { token: u64 },
}

/// Options for [`DebuggerManager::add_breakpoint_with_options`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AddBreakpointOptions {
    /// Mark the breakpoint resolved as soon as any target acknowledges it
    pub speculatively_resolve: bool,
}

type Waiter = oneshot::Sender<Result<(), DebuggerError>>;

/// Resolves once an asynchronous debugger operation has completed
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), DebuggerError>>,
}

impl Completion {
    fn pending() -> (Waiter, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    fn ready() -> Self {
        let (tx, completion) = Self::pending();
        let _ = tx.send(Ok(()));
        completion
    }

    /// Result if the operation already finished
    pub fn try_result(&mut self) -> Option<Result<(), DebuggerError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DebuggerError::Cancelled)),
        }
    }
}

impl Future for Completion {
    type Output = Result<(), DebuggerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DebuggerError::Cancelled)))
    }
}

/// What to do with the response to a request
#[derive(Debug)]
enum PendingRequest {
    SetBreakpoint { breakpoint: BreakpointId, generation: u64, speculative: bool },
    RemoveBreakpoint { breakpoint: BreakpointId },
    /// Cleanup of a registration nobody wants anymore
    DiscardStale,
    Pause,
    Step { waiter: u64 },
    Command { method: &'static str },
}

/// Breakpoint and pause state shared by every target of one inspected page.
///
/// The manager never talks to a target directly. Commands are queued and
/// drained with [`take_requests`](Self::take_requests); their outcomes come
/// back through [`handle_response`](Self::handle_response). Events from
/// targets arrive through [`ProtocolEventHandler`].
pub struct DebuggerManager {
    config: ManagerConfig,
    capabilities: Capabilities,
    settings: DebuggerSettings,
    events: EventBus,

    breakpoints: HashMap<BreakpointId, Breakpoint>,
    /// User breakpoints in insertion order
    breakpoint_order: Vec<BreakpointId>,
    content_identifier_index: HashMap<String, Vec<BreakpointId>>,
    script_identifier_index: HashMap<ScriptId, Vec<BreakpointId>>,
    server_id_index: HashMap<(TargetId, ServerBreakpointId), BreakpointId>,
    next_breakpoint_id: u64,
    next_action_identifier: u32,

    all_exceptions_breakpoint: BreakpointId,
    all_uncaught_exceptions_breakpoint: BreakpointId,
    assertions_breakpoint: BreakpointId,
    break_on_exceptions_state: PauseOnExceptionsMode,
    restoring_breakpoints: bool,

    targets: IndexMap<TargetId, TargetDebuggerState>,
    active_call_frame: Option<CallFrame>,
    internal_scripts: Vec<ScriptRef>,
    debug_ui_enabled: bool,

    /// Ambiguous resumes waiting out the debounce, one token per target
    delayed_resumes: HashMap<TargetId, u64>,
    next_timer_token: u64,
    timer_outbox: VecDeque<TimerCommand>,

    next_request_id: RequestId,
    outbox: VecDeque<OutgoingRequest>,
    pending: HashMap<RequestId, (TargetId, PendingRequest)>,

    next_waiter_id: u64,
    pause_waiters: Vec<Waiter>,
    resume_waiters: Vec<Waiter>,
    frame_waiters: Vec<(u64, Waiter)>,
}

impl DebuggerManager {
    pub fn new(mut settings: DebuggerSettings, capabilities: Capabilities, config: ManagerConfig) -> Self {
        // A previous session ended while breakpoints were suppressed
        if let Some(restore) = settings.temporarily_disabled_restore() {
            info!("Restoring breakpoints-enabled={} left over from a suppressed session", restore);
            settings.set_breakpoints_enabled(restore);
            settings.set_temporarily_disabled_restore(None);
        }

        let all_exceptions_breakpoint = BreakpointId(1);
        let all_uncaught_exceptions_breakpoint = BreakpointId(2);
        let assertions_breakpoint = BreakpointId(3);

        let mut all_exceptions = Breakpoint::special(SpecialBreakpoint::AllExceptions, !settings.break_on_all_exceptions());
        all_exceptions.set_resolved(true);
        let all_uncaught = Breakpoint::special(
            SpecialBreakpoint::AllUncaughtExceptions,
            !settings.break_on_all_uncaught_exceptions(),
        );
        let mut assertions = Breakpoint::special(SpecialBreakpoint::Assertions, !settings.break_on_assertions());
        assertions.set_resolved(true);

        let mut breakpoints = HashMap::new();
        breakpoints.insert(all_exceptions_breakpoint, all_exceptions);
        breakpoints.insert(all_uncaught_exceptions_breakpoint, all_uncaught);
        breakpoints.insert(assertions_breakpoint, assertions);

        let mut targets = IndexMap::new();
        targets.insert(config.main_target.clone(), TargetDebuggerState::new(config.main_target.clone()));

        let mut manager = Self {
            config,
            capabilities,
            settings,
            events: EventBus::new(),
            breakpoints,
            breakpoint_order: Vec::new(),
            content_identifier_index: HashMap::new(),
            script_identifier_index: HashMap::new(),
            server_id_index: HashMap::new(),
            next_breakpoint_id: 4,
            next_action_identifier: 1,
            all_exceptions_breakpoint,
            all_uncaught_exceptions_breakpoint,
            assertions_breakpoint,
            break_on_exceptions_state: PauseOnExceptionsMode::None,
            restoring_breakpoints: false,
            targets,
            active_call_frame: None,
            internal_scripts: Vec::new(),
            debug_ui_enabled: false,
            delayed_resumes: HashMap::new(),
            next_timer_token: 0,
            timer_outbox: VecDeque::new(),
            next_request_id: 1,
            outbox: VecDeque::new(),
            pending: HashMap::new(),
            next_waiter_id: 1,
            pause_waiters: Vec::new(),
            resume_waiters: Vec::new(),
            frame_waiters: Vec::new(),
        };
        manager.update_break_on_exceptions_state();
        manager
    }

    /// Manager with in-memory settings and default configuration
    pub fn with_defaults(capabilities: Capabilities) -> Self {
        Self::new(DebuggerSettings::in_memory(), capabilities, ManagerConfig::default())
    }

    // ---- plumbing ----

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn settings(&self) -> &DebuggerSettings {
        &self.settings
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DebuggerEvent> {
        self.events.subscribe()
    }

    /// Drain timers armed or cancelled since the last call
    pub fn take_timer_commands(&mut self) -> Vec<TimerCommand> {
        self.timer_outbox.drain(..).collect()
    }

    /// Drain every command queued since the last call
    pub fn take_requests(&mut self) -> Vec<OutgoingRequest> {
        self.outbox.drain(..).collect()
    }

    /// Requests sent but not yet answered
    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    fn issue(&mut self, target: TargetId, command: GatewayCommand, pending: PendingRequest) {
        let id = self.next_request_id;
        self.next_request_id += 1;

        debug!("Queueing #{} {} for {}", id, command.method(), target);
        self.pending.insert(id, (target.clone(), pending));
        self.outbox.push_back(OutgoingRequest { id, target, command });
    }

    fn issue_command(&mut self, target: TargetId, command: GatewayCommand) {
        let method = command.method();
        self.issue(target, command, PendingRequest::Command { method });
    }

    fn dispatch(&mut self, event: DebuggerEvent) {
        let waiters = match event {
            DebuggerEvent::Paused => std::mem::take(&mut self.pause_waiters),
            DebuggerEvent::Resumed => std::mem::take(&mut self.resume_waiters),
            DebuggerEvent::ActiveCallFrameDidChange => {
                self.frame_waiters.drain(..).map(|(_, tx)| tx).collect()
            }
            _ => Vec::new(),
        };
        for tx in waiters {
            let _ = tx.send(Ok(()));
        }

        self.events.dispatch(event);
    }

    /// Deliver the outcome of a request taken from [`take_requests`](Self::take_requests)
    pub fn handle_response(&mut self, id: RequestId, result: Result<GatewayResponse, ProtocolError>) {
        let Some((target, pending)) = self.pending.remove(&id) else {
            debug!("Ignoring response to unknown request #{}", id);
            return;
        };

        match pending {
            PendingRequest::SetBreakpoint { breakpoint, generation, speculative } => {
                self.did_set_breakpoint(target, breakpoint, generation, speculative, result)
            }
            PendingRequest::RemoveBreakpoint { breakpoint } => self.did_remove_breakpoint(&target, breakpoint, result),
            PendingRequest::DiscardStale => {
                if let Err(e) = result {
                    debug!("Cleanup of stale registration in {} failed: {}", target, e);
                }
            }
            PendingRequest::Pause => {
                if let Err(e) = result {
                    warn!("Failed to pause {}: {}", target, e);
                    if let Some(state) = self.targets.get_mut(&target) {
                        state.pause_failed();
                    }
                }
            }
            PendingRequest::Step { waiter } => {
                if let Err(e) = result {
                    error!("Step in {} failed: {}", target, e);
                    if let Some(index) = self.frame_waiters.iter().position(|(id, _)| *id == waiter) {
                        let (_, tx) = self.frame_waiters.remove(index);
                        let _ = tx.send(Err(e.into()));
                    }
                }
            }
            PendingRequest::Command { method } => {
                if let Err(e) = result {
                    warn!("{} failed for {}: {}", method, target, e);
                }
            }
        }
    }

    /// A delayed resume is waiting to fire
    pub fn has_pending_timer(&self) -> bool {
        !self.delayed_resumes.is_empty()
    }

    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::DelayedResume { token } => {
                let target = self
                    .delayed_resumes
                    .iter()
                    .find_map(|(target, pending)| (*pending == token).then(|| target.clone()));
                let Some(target) = target else {
                    debug!("Ignoring cancelled delayed resume {}", token);
                    return;
                };
                self.delayed_resumes.remove(&target);
                self.did_resume_internal(&target);
            }
        }
    }

    fn schedule_delayed_resume(&mut self, target: TargetId) {
        self.cancel_delayed_resume(&target);

        self.next_timer_token += 1;
        let token = self.next_timer_token;
        let event = TimerEvent::DelayedResume { token };
        self.timer_outbox.push_back(TimerCommand::Schedule { event, delay: self.config.resume_debounce });
        self.delayed_resumes.insert(target, token);
    }

    fn cancel_delayed_resume(&mut self, target: &TargetId) {
        if let Some(token) = self.delayed_resumes.remove(target) {
            self.timer_outbox.push_back(TimerCommand::Cancel { token });
        }
    }

    // ---- targets ----

    pub fn main_target(&self) -> &TargetId {
        &self.config.main_target
    }

    /// Known targets, main target first
    pub fn targets(&self) -> impl Iterator<Item = &TargetDebuggerState> {
        self.targets.values()
    }

    pub fn target_state(&self, target: &TargetId) -> Option<&TargetDebuggerState> {
        self.targets.get(target)
    }

    fn data_for_target(&mut self, target: &TargetId) -> &mut TargetDebuggerState {
        self.targets
            .entry(target.clone())
            .or_insert_with(|| TargetDebuggerState::new(target.clone()))
    }

    fn initialized_targets(&self) -> Vec<TargetId> {
        self.targets
            .values()
            .filter(|state| state.is_initialized())
            .map(|state| state.target().clone())
            .collect()
    }

    /// Bring a newly attached target in line with the global state
    pub fn initialize_target(&mut self, target: TargetId) {
        info!("Initializing debugger for target {}", target);
        self.data_for_target(&target).mark_initialized();

        self.issue_command(target.clone(), GatewayCommand::Enable);
        self.issue_command(
            target.clone(),
            GatewayCommand::SetBreakpointsActive(self.settings.breakpoints_enabled()),
        );
        if self.capabilities.pause_on_assertions {
            self.issue_command(
                target.clone(),
                GatewayCommand::SetPauseOnAssertions(self.settings.break_on_assertions()),
            );
        }
        self.issue_command(
            target.clone(),
            GatewayCommand::SetPauseOnExceptions(self.break_on_exceptions_state),
        );
        if self.capabilities.async_stack_trace_depth {
            self.issue_command(
                target.clone(),
                GatewayCommand::SetAsyncStackTraceDepth(self.settings.async_stack_trace_depth()),
            );
        }

        if self.paused() {
            self.pause_target_if_needed(&target);
        }

        self.restoring_breakpoints = true;
        let content_breakpoints: Vec<BreakpointId> = self
            .breakpoint_order
            .iter()
            .copied()
            .filter(|id| {
                self.breakpoints
                    .get(id)
                    .is_some_and(|bp| !bp.is_disabled() && bp.content_identifier().is_some())
            })
            .collect();
        for id in content_breakpoints {
            self.set_breakpoint(id, Some(target.clone()), false);
        }
        self.restoring_breakpoints = false;
    }

    /// Forget a detached target and everything registered in it
    pub fn target_removed(&mut self, target: &TargetId) {
        let was_paused = self.paused();
        if self.targets.shift_remove(target).is_none() {
            debug!("Removal of unknown target {}", target);
            return;
        }
        info!("Target {} removed", target);

        for breakpoint in self.breakpoints.values_mut() {
            if let Some(server_id) = breakpoint.forget_target(target) {
                self.server_id_index.remove(&(target.clone(), server_id));
            }
        }

        self.internal_scripts.retain(|script| &script.target != target);
        self.cancel_delayed_resume(target);

        let frame_changed = self.active_call_frame.as_ref().is_some_and(|frame| &frame.target == target);
        if frame_changed {
            self.active_call_frame = None;
        }

        if was_paused && !self.paused() {
            self.dispatch(DebuggerEvent::Resumed);
        }
        if frame_changed {
            self.dispatch(DebuggerEvent::ActiveCallFrameDidChange);
        }
    }

    /// The main frame navigated; its target cannot still be paused
    pub fn main_frame_navigated(&mut self) {
        let main = self.config.main_target.clone();
        self.did_resume_internal(&main);
    }

    // ---- scripts ----

    pub fn script_for_identifier(&self, target: &TargetId, script_id: &ScriptId) -> Option<&Script> {
        self.targets.get(target)?.script_for_identifier(script_id)
    }

    pub fn scripts_for_url<'a>(&'a self, url: &'a str, target: &TargetId) -> Vec<&'a Script> {
        self.targets
            .get(target)
            .map(|state| state.scripts_for_url(url).collect())
            .unwrap_or_default()
    }

    /// Scripts visible to the user across every target
    pub fn known_scripts(&self) -> Vec<&Script> {
        self.targets
            .values()
            .flat_map(|state| state.scripts())
            .filter(|script| self.debug_ui_enabled || !script.is_internal())
            .filter(|script| !script.is_console_evaluation())
            .collect()
    }

    /// Known scripts that can be looked up by URL
    pub fn searchable_scripts(&self) -> Vec<&Script> {
        self.known_scripts()
            .into_iter()
            .filter(|script| script.content_identifier().is_some())
            .collect()
    }

    pub fn debug_ui_enabled(&self) -> bool {
        self.debug_ui_enabled
    }

    /// Show or hide engine-internal scripts
    pub fn set_debug_ui_enabled(&mut self, enabled: bool) {
        if self.debug_ui_enabled == enabled {
            return;
        }
        self.debug_ui_enabled = enabled;

        let scripts = self.internal_scripts.clone();
        for script in scripts {
            let event = if enabled {
                DebuggerEvent::ScriptAdded { target: script.target, script: script.script_id }
            } else {
                DebuggerEvent::ScriptRemoved { target: script.target, script: script.script_id }
            };
            self.dispatch(event);
        }
    }

    // ---- breakpoint queries ----

    pub fn all_exceptions_breakpoint(&self) -> BreakpointId {
        self.all_exceptions_breakpoint
    }

    pub fn all_uncaught_exceptions_breakpoint(&self) -> BreakpointId {
        self.all_uncaught_exceptions_breakpoint
    }

    pub fn assertions_breakpoint(&self) -> BreakpointId {
        self.assertions_breakpoint
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    /// User breakpoints in the order they were added
    pub fn breakpoint_ids(&self) -> &[BreakpointId] {
        &self.breakpoint_order
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = (BreakpointId, &Breakpoint)> {
        self.breakpoint_order
            .iter()
            .filter_map(|id| self.breakpoints.get(id).map(|bp| (*id, bp)))
    }

    pub fn breakpoint_for_server_identifier(
        &self,
        target: &TargetId,
        server_id: &ServerBreakpointId,
    ) -> Option<BreakpointId> {
        self.server_id_index.get(&(target.clone(), server_id.clone())).copied()
    }

    pub fn breakpoints_for_content_identifier(&self, url: &str) -> &[BreakpointId] {
        self.content_identifier_index.get(url).map(Vec::as_slice).unwrap_or_default()
    }

    /// Breakpoints that apply to a script, binding them to it on the way
    pub fn breakpoints_for_script(&mut self, script: &ScriptRef) -> Vec<BreakpointId> {
        let Some(content_identifier) = self
            .script_for_identifier(&script.target, &script.script_id)
            .map(|s| s.content_identifier().map(str::to_string))
        else {
            return Vec::new();
        };

        let mut ids = content_identifier
            .and_then(|url| self.content_identifier_index.get(&url).cloned())
            .unwrap_or_default();
        if ids.is_empty() {
            ids = self
                .script_identifier_index
                .get(&script.script_id)
                .map(|ids| {
                    ids.iter()
                        .copied()
                        .filter(|id| self.breakpoints.get(id).and_then(Breakpoint::target) == Some(&script.target))
                        .collect()
                })
                .unwrap_or_default();
        }

        for id in &ids {
            if let Some(breakpoint) = self.breakpoints.get_mut(id) {
                breakpoint.bind_source_code(script.clone());
            }
        }
        ids
    }

    pub fn is_breakpoint_removable(&self, id: BreakpointId) -> bool {
        id != self.all_exceptions_breakpoint
            && id != self.all_uncaught_exceptions_breakpoint
            && id != self.assertions_breakpoint
    }

    pub fn is_breakpoint_editable(&self, id: BreakpointId) -> bool {
        self.is_breakpoint_removable(id)
    }

    /// Fresh identifier for a new breakpoint action
    pub fn next_breakpoint_action_identifier(&mut self) -> u32 {
        let id = self.next_action_identifier;
        self.next_action_identifier += 1;
        id
    }

    // ---- global breakpoint state ----

    pub fn breakpoints_enabled(&self) -> bool {
        self.settings.breakpoints_enabled()
    }

    pub fn breakpoints_disabled_temporarily(&self) -> bool {
        self.settings.temporarily_disabled_restore().is_some()
    }

    pub fn break_on_exceptions_state(&self) -> PauseOnExceptionsMode {
        self.break_on_exceptions_state
    }

    pub fn set_breakpoints_enabled(&mut self, enabled: bool) {
        if self.settings.breakpoints_enabled() == enabled {
            return;
        }
        if enabled && self.breakpoints_disabled_temporarily() {
            debug!("Not enabling breakpoints while they are temporarily disabled");
            return;
        }

        info!("Breakpoints {}", if enabled { "enabled" } else { "disabled" });
        self.settings.set_breakpoints_enabled(enabled);
        self.update_break_on_exceptions_state();

        let mode = self.break_on_exceptions_state;
        for target in self.initialized_targets() {
            self.issue_command(target.clone(), GatewayCommand::SetBreakpointsActive(enabled));
            self.issue_command(target, GatewayCommand::SetPauseOnExceptions(mode));
        }

        self.dispatch(DebuggerEvent::BreakpointsEnabledDidChange(enabled));
    }

    fn update_break_on_exceptions_state(&mut self) {
        let is_disabled = |id: BreakpointId| self.breakpoints.get(&id).map_or(true, Breakpoint::is_disabled);
        let mode = PauseOnExceptionsMode::derive(
            self.settings.breakpoints_enabled(),
            is_disabled(self.all_exceptions_breakpoint),
            is_disabled(self.all_uncaught_exceptions_breakpoint),
        );
        self.break_on_exceptions_state = mode;

        // Uncaught exceptions are subsumed while pausing on all of them
        let uncaught = self.all_uncaught_exceptions_breakpoint;
        self.set_breakpoint_resolved(uncaught, mode != PauseOnExceptionsMode::All);
    }

    fn push_break_on_exceptions_state(&mut self) {
        self.update_break_on_exceptions_state();

        let mode = self.break_on_exceptions_state;
        for target in self.initialized_targets() {
            self.issue_command(target, GatewayCommand::SetPauseOnExceptions(mode));
        }
    }

    /// Suppress breakpoints while a timeline recording runs
    pub fn recording_will_start(&mut self) {
        self.start_disabling_breakpoints_temporarily();
        if self.paused() {
            let _ = self.resume();
        }
    }

    pub fn recording_stopped(&mut self) {
        self.stop_disabling_breakpoints_temporarily();
    }

    fn start_disabling_breakpoints_temporarily(&mut self) {
        if self.breakpoints_disabled_temporarily() {
            warn!("Breakpoints are already temporarily disabled");
            return;
        }

        let enabled = self.settings.breakpoints_enabled();
        self.settings.set_temporarily_disabled_restore(Some(enabled));
        self.set_breakpoints_enabled(false);
    }

    fn stop_disabling_breakpoints_temporarily(&mut self) {
        let Some(restore) = self.settings.temporarily_disabled_restore() else {
            warn!("Breakpoints are not temporarily disabled");
            return;
        };

        self.settings.set_temporarily_disabled_restore(None);
        self.set_breakpoints_enabled(restore);
    }

    pub fn async_stack_trace_depth(&self) -> u32 {
        self.settings.async_stack_trace_depth()
    }

    pub fn set_async_stack_trace_depth(&mut self, depth: u32) {
        if self.settings.async_stack_trace_depth() == depth {
            return;
        }
        self.settings.set_async_stack_trace_depth(depth);

        if !self.capabilities.async_stack_trace_depth {
            return;
        }
        for target in self.initialized_targets() {
            self.issue_command(target, GatewayCommand::SetAsyncStackTraceDepth(depth));
        }
    }

    // ---- breakpoint lifecycle ----

    /// Recreate persisted breakpoints without saving them back
    pub fn restore_breakpoints(&mut self) {
        let cookies = self.settings.breakpoints().to_vec();
        info!("Restoring {} breakpoint(s)", cookies.len());

        self.restoring_breakpoints = true;
        for cookie in cookies {
            self.add_breakpoint(Breakpoint::from_cookie(cookie));
        }
        self.restoring_breakpoints = false;
    }

    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) -> BreakpointId {
        self.add_breakpoint_with_options(breakpoint, AddBreakpointOptions::default())
    }

    pub fn add_breakpoint_with_options(&mut self, breakpoint: Breakpoint, options: AddBreakpointOptions) -> BreakpointId {
        let id = BreakpointId(self.next_breakpoint_id);
        self.next_breakpoint_id += 1;
        debug!("Adding breakpoint {} at {}", id, breakpoint.get_description());

        if let Some(url) = breakpoint.content_identifier() {
            self.content_identifier_index.entry(url.to_string()).or_default().push(id);
        }
        if let Some(script_id) = breakpoint.script_identifier() {
            self.script_identifier_index.entry(script_id.clone()).or_default().push(id);
        }

        let disabled = breakpoint.is_disabled();
        self.breakpoints.insert(id, breakpoint);
        self.breakpoint_order.push(id);

        if !disabled {
            self.set_breakpoint(id, None, options.speculatively_resolve);
        }

        self.save_breakpoints();
        self.dispatch(DebuggerEvent::BreakpointAdded(id));
        id
    }

    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<Breakpoint, DebuggerError> {
        if !self.breakpoints.contains_key(&id) {
            return Err(DebuggerError::UnknownBreakpoint(id));
        }
        if !self.is_breakpoint_removable(id) {
            return Err(DebuggerError::NotRemovable(id));
        }
        debug!("Removing breakpoint {}", id);

        self.unregister_breakpoint(id);

        let Some(mut breakpoint) = self.breakpoints.remove(&id) else {
            return Err(DebuggerError::UnknownBreakpoint(id));
        };
        breakpoint.clear_actions();
        breakpoint.set_disabled(true);
        breakpoint.sync.generation += 1;
        breakpoint.sync.resubmit = None;

        if let Some(url) = breakpoint.content_identifier() {
            remove_from_index(&mut self.content_identifier_index, url, id);
        }
        if let Some(script_id) = breakpoint.script_identifier() {
            remove_from_index(&mut self.script_identifier_index, script_id, id);
        }
        self.breakpoint_order.retain(|other| *other != id);

        self.save_breakpoints();
        self.dispatch(DebuggerEvent::BreakpointRemoved(id));
        Ok(breakpoint)
    }

    pub fn set_breakpoint_disabled(&mut self, id: BreakpointId, disabled: bool) -> Result<(), DebuggerError> {
        let breakpoint = self.breakpoints.get_mut(&id).ok_or(DebuggerError::UnknownBreakpoint(id))?;
        if breakpoint.set_disabled(disabled).is_some() {
            self.breakpoint_disabled_state_did_change(id);
        }
        Ok(())
    }

    pub fn set_breakpoint_condition(&mut self, id: BreakpointId, condition: Option<String>) -> Result<(), DebuggerError> {
        self.edit_breakpoint(id, |bp| bp.set_condition(condition))
    }

    pub fn set_breakpoint_ignore_count(&mut self, id: BreakpointId, ignore_count: u32) -> Result<(), DebuggerError> {
        self.edit_breakpoint(id, |bp| bp.set_ignore_count(ignore_count))
    }

    pub fn set_breakpoint_auto_continue(&mut self, id: BreakpointId, auto_continue: bool) -> Result<(), DebuggerError> {
        self.edit_breakpoint(id, |bp| bp.set_auto_continue(auto_continue))
    }

    pub fn set_breakpoint_actions(&mut self, id: BreakpointId, actions: Vec<BreakpointAction>) -> Result<(), DebuggerError> {
        self.edit_breakpoint(id, |bp| bp.set_actions(actions))
    }

    /// Change the display location; a registered breakpoint is re-registered there
    pub fn move_breakpoint(&mut self, id: BreakpointId, line: u32, column: u32) -> Result<(), DebuggerError> {
        self.edit_breakpoint(id, |bp| bp.set_location(line, column))
    }

    fn edit_breakpoint<F>(&mut self, id: BreakpointId, edit: F) -> Result<(), DebuggerError>
    where
        F: FnOnce(&mut Breakpoint) -> Option<BreakpointChange>,
    {
        if !self.is_breakpoint_editable(id) {
            return Err(DebuggerError::NotEditable(id));
        }
        let breakpoint = self.breakpoints.get_mut(&id).ok_or(DebuggerError::UnknownBreakpoint(id))?;

        if let Some(change) = edit(breakpoint) {
            self.breakpoint_editable_property_did_change(id, change);
        }
        Ok(())
    }

    fn breakpoint_disabled_state_did_change(&mut self, id: BreakpointId) {
        let Some(breakpoint) = self.breakpoints.get(&id) else {
            return;
        };
        let disabled = breakpoint.is_disabled();

        if let Some(kind) = breakpoint.special_kind() {
            if !disabled && !self.breakpoints_disabled_temporarily() {
                self.set_breakpoints_enabled(true);
            }

            match kind {
                SpecialBreakpoint::AllExceptions => {
                    self.settings.set_break_on_all_exceptions(!disabled);
                    self.push_break_on_exceptions_state();
                }
                SpecialBreakpoint::AllUncaughtExceptions => {
                    self.settings.set_break_on_all_uncaught_exceptions(!disabled);
                    self.push_break_on_exceptions_state();
                }
                SpecialBreakpoint::Assertions => {
                    self.settings.set_break_on_assertions(!disabled);
                    if self.capabilities.pause_on_assertions {
                        for target in self.initialized_targets() {
                            self.issue_command(target, GatewayCommand::SetPauseOnAssertions(!disabled));
                        }
                    }
                }
            }
            return;
        }

        self.save_breakpoints();

        if disabled {
            if let Some(breakpoint) = self.breakpoints.get_mut(&id) {
                breakpoint.sync.generation += 1;
                breakpoint.sync.resubmit = None;
            }
            self.unregister_breakpoint(id);
        } else {
            self.submit_or_defer(id, Resubmission::Edited);
        }
    }

    fn breakpoint_editable_property_did_change(&mut self, id: BreakpointId, change: BreakpointChange) {
        self.save_breakpoints();

        let Some(breakpoint) = self.breakpoints.get_mut(&id) else {
            return;
        };
        if breakpoint.is_disabled() {
            return;
        }
        let resubmission = match change {
            BreakpointChange::DisplayLocation => Resubmission::Moved,
            _ if change.is_editable_property() => Resubmission::Edited,
            _ => return,
        };
        breakpoint.sync.generation += 1;

        self.unregister_breakpoint(id);
        self.submit_or_defer(id, resubmission);
    }

    /// Register now, or once every outstanding removal has been acknowledged
    fn submit_or_defer(&mut self, id: BreakpointId, resubmission: Resubmission) {
        let Some(breakpoint) = self.breakpoints.get_mut(&id) else {
            return;
        };

        if breakpoint.sync.pending_removals > 0 {
            breakpoint.sync.resubmit = match breakpoint.sync.resubmit {
                Some(Resubmission::Moved) => Some(Resubmission::Moved),
                _ => Some(resubmission),
            };
            return;
        }

        self.resubmit(id, resubmission);
    }

    fn resubmit(&mut self, id: BreakpointId, resubmission: Resubmission) {
        self.set_breakpoint(id, None, false);
        if resubmission == Resubmission::Moved {
            self.dispatch(DebuggerEvent::BreakpointMoved(id));
        }
    }

    /// Register a breakpoint with every initialized target, or just one
    fn set_breakpoint(&mut self, id: BreakpointId, specific_target: Option<TargetId>, speculative: bool) {
        match self.breakpoints.get(&id) {
            Some(breakpoint) if !breakpoint.is_disabled() && !breakpoint.is_special() => {}
            _ => return,
        }

        if !self.restoring_breakpoints && !self.breakpoints_disabled_temporarily() {
            self.set_breakpoints_enabled(true);
        }
        if specific_target.is_none() {
            self.set_breakpoint_resolved(id, false);
        }

        let Some(breakpoint) = self.breakpoints.get(&id) else {
            return;
        };
        let generation = breakpoint.sync.generation;
        let condition = breakpoint.condition().map(str::to_string);
        let options = self.capabilities.breakpoint_options.then(|| breakpoint.protocol_options());
        let line_number = breakpoint.location().line();
        let column_number = breakpoint.location().column();

        let requests: Vec<(TargetId, GatewayCommand)> = match breakpoint.source() {
            BreakpointSource::ContentIdentifier(url) => {
                let targets = match specific_target {
                    Some(target) => vec![target],
                    None => self.initialized_targets(),
                };
                targets
                    .into_iter()
                    .map(|target| {
                        let params = SetBreakpointByUrl {
                            line_number,
                            url: url.clone(),
                            column_number,
                            condition: condition.clone(),
                            options: options.clone(),
                        };
                        (target, GatewayCommand::SetBreakpointByUrl(params))
                    })
                    .collect()
            }
            BreakpointSource::Script { target, script_id } => {
                let wanted = specific_target.as_ref().map_or(true, |specific| specific == target);
                if wanted && self.targets.contains_key(target) {
                    let params = SetBreakpoint {
                        location: ProtocolLocation {
                            script_id: script_id.clone(),
                            line_number,
                            column_number,
                        },
                        condition,
                        options,
                    };
                    vec![(target.clone(), GatewayCommand::SetBreakpoint(params))]
                } else {
                    Vec::new()
                }
            }
            BreakpointSource::Special(_) => Vec::new(),
        };

        for (target, command) in requests {
            self.issue(target, command, PendingRequest::SetBreakpoint { breakpoint: id, generation, speculative });
        }
    }

    /// Take the breakpoint's registrations out and queue their removal
    fn unregister_breakpoint(&mut self, id: BreakpointId) {
        let Some(breakpoint) = self.breakpoints.get_mut(&id) else {
            return;
        };
        let server_ids = breakpoint.take_server_ids();

        for (target, server_id) in server_ids {
            self.server_id_index.remove(&(target.clone(), server_id.clone()));
            if !self.targets.contains_key(&target) {
                continue;
            }

            if let Some(breakpoint) = self.breakpoints.get_mut(&id) {
                breakpoint.sync.pending_removals += 1;
            }
            self.issue(
                target,
                GatewayCommand::RemoveBreakpoint(server_id),
                PendingRequest::RemoveBreakpoint { breakpoint: id },
            );
        }
    }

    fn did_set_breakpoint(
        &mut self,
        target: TargetId,
        id: BreakpointId,
        generation: u64,
        speculative: bool,
        result: Result<GatewayResponse, ProtocolError>,
    ) {
        let set = match result {
            Ok(GatewayResponse::BreakpointSet(set)) => set,
            Ok(other) => {
                warn!("Unexpected response {:?} to setting breakpoint {}", other, id);
                return;
            }
            Err(e) => {
                warn!("Failed to set breakpoint {} in {}: {}", id, target, e);
                return;
            }
        };

        let target_known = self.targets.contains_key(&target);
        let current = target_known
            && self
                .breakpoints
                .get(&id)
                .is_some_and(|bp| !bp.is_disabled() && bp.sync.generation == generation);

        if !current {
            let already_recorded = self
                .breakpoints
                .get(&id)
                .and_then(|bp| bp.server_identifier(&target))
                == Some(&set.breakpoint_id);
            if target_known && !already_recorded {
                debug!("Discarding stale registration {} of {} in {}", set.breakpoint_id, id, target);
                self.issue(target, GatewayCommand::RemoveBreakpoint(set.breakpoint_id), PendingRequest::DiscardStale);
            }
            return;
        }

        let previous = self
            .breakpoints
            .get_mut(&id)
            .and_then(|bp| bp.record_server_id(target.clone(), set.breakpoint_id.clone()));
        if let Some(previous) = previous.filter(|previous| *previous != set.breakpoint_id) {
            self.server_id_index.remove(&(target.clone(), previous.clone()));
            self.issue(target.clone(), GatewayCommand::RemoveBreakpoint(previous), PendingRequest::DiscardStale);
        }
        self.server_id_index.insert((target.clone(), set.breakpoint_id.clone()), id);

        for location in &set.locations {
            self.breakpoint_resolved(&target, &set.breakpoint_id, location);
        }
        if speculative {
            self.set_breakpoint_resolved(id, true);
        }
    }

    fn did_remove_breakpoint(
        &mut self,
        target: &TargetId,
        id: BreakpointId,
        result: Result<GatewayResponse, ProtocolError>,
    ) {
        if let Err(e) = result {
            warn!("Failed to remove breakpoint {} from {}: {}", id, target, e);
        }

        let Some(breakpoint) = self.breakpoints.get_mut(&id) else {
            return;
        };
        breakpoint.sync.pending_removals = breakpoint.sync.pending_removals.saturating_sub(1);
        if breakpoint.sync.pending_removals > 0 {
            return;
        }

        let Some(resubmission) = breakpoint.sync.resubmit.take() else {
            return;
        };
        if breakpoint.is_disabled() {
            return;
        }
        self.resubmit(id, resubmission);
    }

    fn set_breakpoint_resolved(&mut self, id: BreakpointId, resolved: bool) {
        let changed = self
            .breakpoints
            .get_mut(&id)
            .is_some_and(|breakpoint| breakpoint.set_resolved(resolved));
        if changed {
            self.dispatch(DebuggerEvent::BreakpointResolvedStateDidChange { breakpoint: id, resolved });
        }
    }

    fn save_breakpoints(&mut self) {
        if self.restoring_breakpoints {
            return;
        }

        let cookies = self
            .breakpoint_order
            .iter()
            .filter_map(|id| self.breakpoints.get(id))
            .filter_map(Breakpoint::serialize_for_persistence)
            .collect();
        self.settings.set_breakpoints(cookies);
    }

    // ---- execution control ----

    /// Whether any target is paused
    pub fn paused(&self) -> bool {
        self.targets.values().any(TargetDebuggerState::is_paused)
    }

    pub fn active_call_frame(&self) -> Option<&CallFrame> {
        self.active_call_frame.as_ref()
    }

    pub fn set_active_call_frame(&mut self, frame: Option<CallFrame>) {
        if self.active_call_frame == frame {
            return;
        }
        self.active_call_frame = frame;
        self.dispatch(DebuggerEvent::ActiveCallFrameDidChange);
    }

    fn pause_target_if_needed(&mut self, target: &TargetId) {
        if self.data_for_target(target).pause_if_needed() {
            self.issue(target.clone(), GatewayCommand::Pause, PendingRequest::Pause);
        }
    }

    /// Pause every initialized target; resolves on the next pause
    pub fn pause(&mut self) -> Completion {
        if self.paused() {
            return Completion::ready();
        }

        self.dispatch(DebuggerEvent::WaitingToPause);

        let (tx, completion) = Completion::pending();
        self.pause_waiters.push(tx);

        for target in self.initialized_targets() {
            self.pause_target_if_needed(&target);
        }
        completion
    }

    /// Resume every paused target; resolves once all have resumed
    pub fn resume(&mut self) -> Completion {
        if !self.paused() {
            return Completion::ready();
        }

        let (tx, completion) = Completion::pending();
        self.resume_waiters.push(tx);

        let targets: Vec<TargetId> = self.targets.keys().cloned().collect();
        for target in targets {
            if self.data_for_target(&target).resume_if_needed() {
                self.issue_command(target, GatewayCommand::Resume);
            }
        }
        completion
    }

    pub fn step_over(&mut self) -> Result<Completion, DebuggerError> {
        self.step(GatewayCommand::StepOver, "step over")
    }

    pub fn step_into(&mut self) -> Result<Completion, DebuggerError> {
        self.step(GatewayCommand::StepInto, "step into")
    }

    pub fn step_out(&mut self) -> Result<Completion, DebuggerError> {
        self.step(GatewayCommand::StepOut, "step out")
    }

    fn step(&mut self, command: GatewayCommand, action: &'static str) -> Result<Completion, DebuggerError> {
        if !self.paused() {
            return Err(DebuggerError::NotPaused(action));
        }

        let target = self
            .active_call_frame
            .as_ref()
            .map(|frame| frame.target.clone())
            .or_else(|| {
                self.targets
                    .values()
                    .find(|state| state.is_paused())
                    .map(|state| state.target().clone())
            })
            .ok_or(DebuggerError::NotPaused(action))?;

        let (tx, completion) = Completion::pending();
        let waiter = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.frame_waiters.push((waiter, tx));

        self.issue(target, command, PendingRequest::Step { waiter });
        Ok(completion)
    }

    pub fn continue_until_next_run_loop(&mut self, target: &TargetId) {
        let Some(state) = self.targets.get_mut(target) else {
            return;
        };
        if state.continue_until_next_run_loop() {
            self.issue_command(target.clone(), GatewayCommand::ContinueUntilNextRunLoop);
        }
    }

    pub fn continue_to_location(&mut self, script: &ScriptRef, line: u32, column: u32) -> Result<(), DebuggerError> {
        if self.script_for_identifier(&script.target, &script.script_id).is_none() {
            return Err(DebuggerError::UnknownScript {
                target: script.target.clone(),
                script: script.script_id.clone(),
            });
        }

        let location = ProtocolLocation {
            script_id: script.script_id.clone(),
            line_number: line,
            column_number: column,
        };
        self.issue_command(script.target.clone(), GatewayCommand::ContinueToLocation(location));
        Ok(())
    }

    fn did_resume_internal(&mut self, target: &TargetId) {
        self.cancel_delayed_resume(target);
        if !self.paused() {
            return;
        }

        let active_changed = self.active_call_frame.as_ref().is_some_and(|frame| &frame.target == target);
        if active_changed {
            self.active_call_frame = None;
        }

        self.data_for_target(target).update_for_resume();

        if !self.paused() {
            self.dispatch(DebuggerEvent::Resumed);
        }
        self.dispatch(DebuggerEvent::CallFramesDidChange(target.clone()));
        if active_changed {
            self.dispatch(DebuggerEvent::ActiveCallFrameDidChange);
        }
    }
}

impl ProtocolEventHandler for DebuggerManager {
    fn script_did_parse(&mut self, target: TargetId, payload: ScriptParsed) {
        let debug_ui = self.debug_ui_enabled;
        let state = self.data_for_target(&target);

        if state.script_for_identifier(&payload.script_id).is_some() {
            debug!("Script {} already known in {}", payload.script_id, target);
            return;
        }

        let script = Script::from_payload(target.clone(), &payload);
        let script_ref = script.script_ref();
        let internal = script.is_internal();
        let console_evaluation = script.is_console_evaluation();
        state.add_script(script);

        if console_evaluation {
            return;
        }
        if internal {
            self.internal_scripts.push(script_ref);
            if !debug_ui {
                return;
            }
        }

        self.dispatch(DebuggerEvent::ScriptAdded { target, script: payload.script_id });
    }

    fn debugger_did_pause(
        &mut self,
        target: TargetId,
        call_frames: Vec<ProtocolCallFrame>,
        reason: String,
        data: Option<serde_json::Value>,
        async_stack_trace: Option<AsyncStackTrace>,
    ) {
        self.cancel_delayed_resume(&target);

        let was_paused = self.paused();
        let debug_ui = self.debug_ui_enabled;
        let state = self.data_for_target(&target);

        let frames: Vec<CallFrame> = call_frames
            .iter()
            .filter_map(|payload| {
                let script = state.script_for_identifier(&payload.location.script_id)?;
                if !debug_ui && script.is_internal() {
                    return None;
                }
                Some(CallFrame::from_payload(&target, payload, script))
            })
            .collect();

        let Some(top_frame) = frames.first().cloned() else {
            debug!("Pause in {} has no user frames, continuing", target);
            let command = if was_paused { GatewayCommand::ContinueUntilNextRunLoop } else { GatewayCommand::Resume };
            self.issue_command(target.clone(), command);
            self.did_resume_internal(&target);
            return;
        };

        state.update_for_pause(frames, PauseReason::from_protocol(&reason), data, async_stack_trace);

        for other in self.initialized_targets() {
            if other != target {
                self.pause_target_if_needed(&other);
            }
        }

        let mut active_changed = false;
        if self.active_call_frame.as_ref().is_some_and(|frame| frame.target == target) {
            self.active_call_frame = Some(top_frame);
            active_changed = true;
        } else if !was_paused {
            self.active_call_frame = Some(top_frame);
            active_changed = true;
        }

        if !was_paused {
            self.dispatch(DebuggerEvent::Paused);
        }
        self.dispatch(DebuggerEvent::CallFramesDidChange(target));
        if active_changed {
            self.dispatch(DebuggerEvent::ActiveCallFrameDidChange);
        }
    }

    fn debugger_did_resume(&mut self, target: TargetId) {
        if self.capabilities.unambiguous_resumed_event {
            self.did_resume_internal(&target);
            return;
        }

        // Older backends report a resume right before pausing again
        self.schedule_delayed_resume(target);
    }

    fn breakpoint_resolved(&mut self, target: &TargetId, breakpoint_id: &ServerBreakpointId, location: &ProtocolLocation) {
        let Some(id) = self.breakpoint_for_server_identifier(target, breakpoint_id) else {
            debug!("Resolution of unknown breakpoint {} in {}", breakpoint_id, target);
            return;
        };

        let script = self
            .script_for_identifier(target, &location.script_id)
            .map(Script::script_ref);
        if let (Some(script), Some(breakpoint)) = (script, self.breakpoints.get_mut(&id)) {
            breakpoint.bind_source_code(script);
        }

        self.set_breakpoint_resolved(id, true);
    }

    fn reset(&mut self) {
        info!("Global object cleared, resetting debugger state");
        let was_paused = self.paused();

        let pending: Vec<TargetId> = self.delayed_resumes.keys().cloned().collect();
        for target in &pending {
            self.cancel_delayed_resume(target);
        }
        for state in self.targets.values_mut() {
            state.reset();
        }
        self.internal_scripts.clear();

        let ids = self.breakpoint_order.clone();
        for id in ids {
            self.set_breakpoint_resolved(id, false);
            if let Some(breakpoint) = self.breakpoints.get_mut(&id) {
                breakpoint.clear_source_code();
            }
        }

        let frame_changed = self.active_call_frame.take().is_some();

        self.dispatch(DebuggerEvent::ScriptsCleared);
        if was_paused {
            self.dispatch(DebuggerEvent::Resumed);
        }
        if frame_changed {
            self.dispatch(DebuggerEvent::ActiveCallFrameDidChange);
        }
    }

    fn play_breakpoint_action_sound(&mut self, action: u32) {
        self.dispatch(DebuggerEvent::BreakpointActionSound { action });
    }
}

impl std::fmt::Debug for DebuggerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerManager")
            .field("targets", &self.targets.len())
            .field("breakpoints", &self.breakpoint_order.len())
            .field("paused", &self.paused())
            .field("break_on_exceptions_state", &self.break_on_exceptions_state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn remove_from_index<K, Q>(index: &mut HashMap<K, Vec<BreakpointId>>, key: &Q, id: BreakpointId)
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    let now_empty = match index.get_mut(key) {
        Some(ids) => {
            ids.retain(|other| *other != id);
            ids.is_empty()
        }
        None => false,
    };
    if now_empty {
        index.remove(key);
    }
}
