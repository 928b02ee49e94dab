use log::trace;

use crate::protocol::types::{
    AsyncStackTrace, GatewayEvent, ProtocolCallFrame, ProtocolLocation, ScriptParsed, ServerBreakpointId, TargetId,
};

/// Receiver of Debugger-domain events, one method per event kind
pub trait ProtocolEventHandler {
    fn script_did_parse(&mut self, target: TargetId, payload: ScriptParsed);

    fn debugger_did_pause(
        &mut self,
        target: TargetId,
        call_frames: Vec<ProtocolCallFrame>,
        reason: String,
        data: Option<serde_json::Value>,
        async_stack_trace: Option<AsyncStackTrace>,
    );

    fn debugger_did_resume(&mut self, target: TargetId);

    fn breakpoint_resolved(&mut self, target: &TargetId, breakpoint_id: &ServerBreakpointId, location: &ProtocolLocation);

    /// The target's global object was cleared
    fn reset(&mut self);

    fn play_breakpoint_action_sound(&mut self, action: u32);

    /// Route a decoded event to its handler
    fn handle_event(&mut self, target: TargetId, event: GatewayEvent) {
        trace!("<- {} {:?}", target, event);

        match event {
            GatewayEvent::ScriptParsed(payload) => self.script_did_parse(target, payload),
            GatewayEvent::Paused { call_frames, reason, data, async_stack_trace } => {
                self.debugger_did_pause(target, call_frames, reason, data, async_stack_trace)
            }
            GatewayEvent::Resumed => self.debugger_did_resume(target),
            GatewayEvent::BreakpointResolved { breakpoint_id, location } => {
                self.breakpoint_resolved(&target, &breakpoint_id, &location)
            }
            GatewayEvent::GlobalObjectCleared => self.reset(),
            GatewayEvent::PlayBreakpointActionSound { breakpoint_action_id } => {
                self.play_breakpoint_action_sound(breakpoint_action_id)
            }
        }
    }
}
