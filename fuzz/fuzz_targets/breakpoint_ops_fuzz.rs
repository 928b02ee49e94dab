#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use inspector_debugger::protocol::{BreakpointSet, GatewayResponse, ServerBreakpointId};
use inspector_debugger::{
    Breakpoint, BreakpointId, Capabilities, DebuggerManager, GatewayCommand, OutgoingRequest, ProtocolError,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Add { line: u8 },
    Remove { index: u8 },
    Toggle { index: u8 },
    Condition { index: u8, condition: Option<String> },
    Move { index: u8, line: u8 },
    Answer { index: u8, reject: bool },
}

/// Registrations held by the pretend backend
#[derive(Default)]
struct Backend {
    registered: HashSet<ServerBreakpointId>,
    next_id: u32,
}

impl Backend {
    fn answer(&mut self, request: &OutgoingRequest, reject: bool) -> Result<GatewayResponse, ProtocolError> {
        match &request.command {
            GatewayCommand::SetBreakpointByUrl(_) if reject => Err(ProtocolError::Rejected("fuzz".into())),
            GatewayCommand::SetBreakpointByUrl(_) => {
                self.next_id += 1;
                let breakpoint_id = ServerBreakpointId::new(format!("fuzz#{}", self.next_id));
                self.registered.insert(breakpoint_id.clone());
                Ok(GatewayResponse::BreakpointSet(BreakpointSet { breakpoint_id, locations: Vec::new() }))
            }
            GatewayCommand::RemoveBreakpoint(breakpoint_id) => {
                self.registered.remove(breakpoint_id);
                Ok(GatewayResponse::Ack)
            }
            _ => Ok(GatewayResponse::Ack),
        }
    }
}

fn pick(added: &[BreakpointId], index: u8) -> Option<BreakpointId> {
    (!added.is_empty()).then(|| added[index as usize % added.len()])
}

fuzz_target!(|ops: Vec<Op>| {
    let mut manager = DebuggerManager::with_defaults(Capabilities::modern());
    let main = manager.main_target().clone();
    manager.initialize_target(main.clone());

    let mut backend = Backend::default();
    let mut added: Vec<BreakpointId> = Vec::new();
    let mut in_flight = manager.take_requests();

    for op in ops {
        match op {
            Op::Add { line } => added.push(manager.add_breakpoint(Breakpoint::for_url("fuzz.js", line.into(), 0))),
            Op::Remove { index } => {
                if let Some(id) = pick(&added, index) {
                    let _ = manager.remove_breakpoint(id);
                    added.retain(|other| *other != id);
                }
            }
            Op::Toggle { index } => {
                if let Some(id) = pick(&added, index) {
                    let disabled = manager.breakpoint(id).is_some_and(Breakpoint::is_disabled);
                    let _ = manager.set_breakpoint_disabled(id, !disabled);
                }
            }
            Op::Condition { index, condition } => {
                if let Some(id) = pick(&added, index) {
                    let _ = manager.set_breakpoint_condition(id, condition);
                }
            }
            Op::Move { index, line } => {
                if let Some(id) = pick(&added, index) {
                    let _ = manager.move_breakpoint(id, line.into(), 0);
                }
            }
            Op::Answer { index, reject } => {
                if !in_flight.is_empty() {
                    let request = in_flight.remove(index as usize % in_flight.len());
                    let response = backend.answer(&request, reject);
                    manager.handle_response(request.id, response);
                }
            }
        }
        in_flight.extend(manager.take_requests());
    }

    while !in_flight.is_empty() {
        for request in std::mem::take(&mut in_flight) {
            let response = backend.answer(&request, false);
            manager.handle_response(request.id, response);
        }
        in_flight.extend(manager.take_requests());
    }

    let known: HashSet<ServerBreakpointId> = manager
        .breakpoints()
        .filter_map(|(_, breakpoint)| breakpoint.server_identifier(&main).cloned())
        .collect();
    assert_eq!(known, backend.registered);
});
