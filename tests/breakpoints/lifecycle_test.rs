use inspector_debugger::debugger::breakpoint::ScriptRef;
use inspector_debugger::protocol::ScriptParsed;
use inspector_debugger::{Breakpoint, Capabilities, DebuggerEvent, DebuggerSettings, GatewayCommand};

use crate::test_helpers::{connect, main_target, manager_registrations};

#[tokio::test]
async fn test_rapid_edits_leave_exactly_one_registration() {
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;
    session.gateway().parse_script(&main_target(), ScriptParsed::new("1", Some("app.js")));
    session.settle().await;
    let mut events = session.subscribe();

    let id = session.add_breakpoint(Breakpoint::for_url("app.js", 10, 0));
    session
        .with_manager(|manager| manager.set_breakpoint_condition(id, Some("i == 3".into())))
        .unwrap();
    session.with_manager(|manager| manager.move_breakpoint(id, 11, 0)).unwrap();
    session.with_manager(|manager| manager.set_breakpoint_disabled(id, true)).unwrap();
    session.with_manager(|manager| manager.set_breakpoint_disabled(id, false)).unwrap();
    session.settle().await;

    let registered = session.gateway().registered_breakpoints(&main_target());
    assert_eq!(registered.len(), 1);
    assert_eq!(registered, manager_registrations(session.manager(), &main_target()));
    assert_eq!(session.manager().pending_request_count(), 0);

    let breakpoint = session.manager().breakpoint(id).unwrap();
    assert_eq!(breakpoint.location().line(), 11);
    assert!(breakpoint.is_resolved());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&DebuggerEvent::BreakpointMoved(id)));
}

#[tokio::test]
async fn test_edit_of_registered_breakpoint_round_trips_through_backend() {
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;
    let id = session.add_breakpoint(Breakpoint::for_url("app.js", 10, 0));
    session.settle().await;
    let before = manager_registrations(session.manager(), &main_target());
    session.gateway().take_calls();

    session.with_manager(|manager| manager.set_breakpoint_ignore_count(id, 2)).unwrap();
    session.settle().await;

    let calls = session.gateway().take_calls();
    assert!(matches!(calls[0].1, GatewayCommand::RemoveBreakpoint(_)));
    assert!(matches!(
        &calls[1].1,
        GatewayCommand::SetBreakpointByUrl(params) if params.options.as_ref().map(|o| o.ignore_count) == Some(2)
    ));
    assert_eq!(calls.len(), 2);

    let after = manager_registrations(session.manager(), &main_target());
    assert_eq!(after.len(), 1);
    assert!(before.is_disjoint(&after));
    assert_eq!(session.gateway().registered_breakpoints(&main_target()), after);
}

#[tokio::test]
async fn test_remove_while_set_in_flight_cleans_up_backend() {
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;

    let id = session.add_breakpoint(Breakpoint::for_url("app.js", 1, 0));
    let removed = session.remove_breakpoint(id).unwrap();
    assert!(removed.is_disabled());
    session.settle().await;

    assert!(session.gateway().registered_breakpoints(&main_target()).is_empty());
    assert!(session.manager().breakpoint_ids().is_empty());
}

#[tokio::test]
async fn test_rejected_breakpoint_can_be_retried() {
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;
    session.gateway().reject_breakpoints(Some("backend busy"));

    let id = session.add_breakpoint(Breakpoint::for_url("app.js", 1, 0));
    session.settle().await;
    assert!(!session.manager().breakpoint(id).unwrap().is_registered());

    session.gateway().reject_breakpoints(None);
    session.with_manager(|manager| manager.set_breakpoint_disabled(id, true)).unwrap();
    session.with_manager(|manager| manager.set_breakpoint_disabled(id, false)).unwrap();
    session.settle().await;
    assert!(session.manager().breakpoint(id).unwrap().is_registered());
}

#[tokio::test]
async fn test_script_breakpoint_resolves_immediately() {
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;
    session.gateway().parse_script(&main_target(), ScriptParsed::new("7", None));
    session.settle().await;

    let id = session.add_breakpoint(Breakpoint::for_script(main_target(), "7", 4, 0));
    session.settle().await;

    let breakpoint = session.manager().breakpoint(id).unwrap();
    assert!(breakpoint.is_registered());
    assert!(breakpoint.is_resolved());
    assert_eq!(breakpoint.location().source_code(), Some(&ScriptRef::new("main", "7")));
    assert!(session.manager().settings().breakpoints().is_empty());
}
