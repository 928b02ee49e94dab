use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::protocol::types::{
    BreakpointSet, GatewayCommand, GatewayResponse, PauseOnExceptionsMode, ProtocolLocation,
    ServerBreakpointId, SetBreakpoint, SetBreakpointByUrl, TargetId,
};

/// Optional protocol features, negotiated once per connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// `setPauseOnAssertions` exists
    pub pause_on_assertions: bool,
    /// `setAsyncStackTraceDepth` exists
    pub async_stack_trace_depth: bool,
    /// Set commands accept an `options` object with typed actions
    pub breakpoint_options: bool,
    /// A `resumed` event always means the target really resumed.
    /// Older backends also send it right before pausing again after a step.
    pub unambiguous_resumed_event: bool,
}

impl Capabilities {
    /// Everything supported
    pub fn modern() -> Self {
        Self {
            pause_on_assertions: true,
            async_stack_trace_depth: true,
            breakpoint_options: true,
            unambiguous_resumed_event: true,
        }
    }

    /// A backend that predates assertions, async stack traces and unambiguous resumes
    pub fn legacy() -> Self {
        Self {
            pause_on_assertions: false,
            async_stack_trace_depth: false,
            breakpoint_options: true,
            unambiguous_resumed_event: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::modern()
    }
}

/// Debugger-domain commands of a remote inspector connection.
///
/// Every call addresses one target. Implementations deliver inbound
/// [`GatewayEvent`](crate::protocol::GatewayEvent)s separately, through the
/// channel handed to the session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProtocolGateway: Send + Sync {
    /// Query optional features; called once when a session connects
    async fn capabilities(&self) -> Capabilities;

    async fn enable(&self, target: TargetId) -> Result<(), ProtocolError>;
    async fn set_breakpoints_active(&self, target: TargetId, active: bool) -> Result<(), ProtocolError>;
    async fn set_pause_on_exceptions(&self, target: TargetId, mode: PauseOnExceptionsMode) -> Result<(), ProtocolError>;
    async fn set_pause_on_assertions(&self, target: TargetId, enabled: bool) -> Result<(), ProtocolError>;
    async fn set_async_stack_trace_depth(&self, target: TargetId, depth: u32) -> Result<(), ProtocolError>;

    async fn set_breakpoint_by_url(&self, target: TargetId, params: SetBreakpointByUrl) -> Result<BreakpointSet, ProtocolError>;
    async fn set_breakpoint(&self, target: TargetId, params: SetBreakpoint) -> Result<BreakpointSet, ProtocolError>;
    async fn remove_breakpoint(&self, target: TargetId, breakpoint_id: ServerBreakpointId) -> Result<(), ProtocolError>;

    async fn pause(&self, target: TargetId) -> Result<(), ProtocolError>;
    async fn resume(&self, target: TargetId) -> Result<(), ProtocolError>;
    async fn continue_until_next_run_loop(&self, target: TargetId) -> Result<(), ProtocolError>;
    async fn step_over(&self, target: TargetId) -> Result<(), ProtocolError>;
    async fn step_into(&self, target: TargetId) -> Result<(), ProtocolError>;
    async fn step_out(&self, target: TargetId) -> Result<(), ProtocolError>;
    async fn continue_to_location(&self, target: TargetId, location: ProtocolLocation) -> Result<(), ProtocolError>;
}

/// Route one queued command to the matching gateway method
pub async fn dispatch<G>(gateway: &G, target: TargetId, command: GatewayCommand) -> Result<GatewayResponse, ProtocolError>
where
    G: ProtocolGateway + ?Sized,
{
    debug!("-> {} {}", target, command.method());

    let ack = |result: Result<(), ProtocolError>| result.map(|()| GatewayResponse::Ack);

    match command {
        GatewayCommand::Enable => ack(gateway.enable(target).await),
        GatewayCommand::SetBreakpointsActive(active) => ack(gateway.set_breakpoints_active(target, active).await),
        GatewayCommand::SetPauseOnExceptions(mode) => ack(gateway.set_pause_on_exceptions(target, mode).await),
        GatewayCommand::SetPauseOnAssertions(enabled) => ack(gateway.set_pause_on_assertions(target, enabled).await),
        GatewayCommand::SetAsyncStackTraceDepth(depth) => ack(gateway.set_async_stack_trace_depth(target, depth).await),
        GatewayCommand::SetBreakpointByUrl(params) => gateway
            .set_breakpoint_by_url(target, params)
            .await
            .map(GatewayResponse::BreakpointSet),
        GatewayCommand::SetBreakpoint(params) => gateway
            .set_breakpoint(target, params)
            .await
            .map(GatewayResponse::BreakpointSet),
        GatewayCommand::RemoveBreakpoint(id) => ack(gateway.remove_breakpoint(target, id).await),
        GatewayCommand::Pause => ack(gateway.pause(target).await),
        GatewayCommand::Resume => ack(gateway.resume(target).await),
        GatewayCommand::ContinueUntilNextRunLoop => ack(gateway.continue_until_next_run_loop(target).await),
        GatewayCommand::StepOver => ack(gateway.step_over(target).await),
        GatewayCommand::StepInto => ack(gateway.step_into(target).await),
        GatewayCommand::StepOut => ack(gateway.step_out(target).await),
        GatewayCommand::ContinueToLocation(location) => ack(gateway.continue_to_location(target, location).await),
    }
}
