use inspector_debugger::debugger::breakpoint::ScriptRef;
use inspector_debugger::protocol::{ProtocolLocation, ScriptParsed};
use inspector_debugger::{
    Breakpoint, Capabilities, DebuggerEvent, DebuggerSettings, GatewayCommand, GatewayEvent, TargetId,
};

use crate::test_helpers::{connect, main_target, manager_registrations};

fn location(script_id: &str, line_number: u32) -> ProtocolLocation {
    ProtocolLocation {
        script_id: script_id.into(),
        line_number,
        column_number: 0,
    }
}

#[tokio::test]
async fn test_reload_keeps_registration_and_rebinds() {
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;
    session.gateway().parse_script(&main_target(), ScriptParsed::new("1", Some("app.js")));
    session.settle().await;

    let id = session.add_breakpoint(Breakpoint::for_url("app.js", 10, 0));
    session.settle().await;
    assert!(session.manager().breakpoint(id).unwrap().is_resolved());
    let registered = manager_registrations(session.manager(), &main_target());
    let server_id = registered.iter().next().cloned().unwrap();

    session.gateway().take_calls();
    session.gateway().clear_global_object(&main_target());
    session.settle().await;

    let breakpoint = session.manager().breakpoint(id).unwrap();
    assert!(!breakpoint.is_resolved());
    assert_eq!(breakpoint.server_identifier(&main_target()), Some(&server_id));
    assert!(session.manager().known_scripts().is_empty());

    session.gateway().parse_script(&main_target(), ScriptParsed::new("2", Some("app.js")));
    session.gateway().send_event(
        &main_target(),
        GatewayEvent::BreakpointResolved {
            breakpoint_id: server_id.clone(),
            location: location("2", 10),
        },
    );
    session.settle().await;

    let breakpoint = session.manager().breakpoint(id).unwrap();
    assert!(breakpoint.is_resolved());
    assert_eq!(breakpoint.location().source_code(), Some(&ScriptRef::new("main", "2")));
    assert!(
        session.gateway().take_calls().is_empty(),
        "a reload must not re-register breakpoints"
    );
}

#[tokio::test]
async fn test_pause_in_one_target_pauses_the_others() {
    let worker = TargetId::from("worker");
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;
    session.initialize_target(worker.clone());
    session.gateway().parse_script(&main_target(), ScriptParsed::new("1", Some("app.js")));
    session.gateway().parse_script(&worker, ScriptParsed::new("9", Some("worker.js")));
    session.settle().await;
    let mut events = session.subscribe();

    session.gateway().hit_breakpoint(&worker, location("9", 4));
    session.settle().await;

    let manager = session.manager();
    assert!(manager.paused());
    assert_eq!(manager.active_call_frame().map(|frame| &frame.target), Some(&worker));
    assert!(manager.target_state(&main_target()).unwrap().is_paused());
    assert!(session.gateway().is_paused(&main_target()));
    assert!(session
        .gateway()
        .calls()
        .contains(&(main_target(), GatewayCommand::Pause)));

    session.resume().await.unwrap();
    assert!(!session.manager().paused());
    assert!(!session.gateway().is_paused(&worker));
    assert!(!session.gateway().is_paused(&main_target()));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.iter().filter(|event| **event == DebuggerEvent::Paused).count(), 1);
    assert_eq!(seen.iter().filter(|event| **event == DebuggerEvent::Resumed).count(), 1);
}

#[tokio::test]
async fn test_removed_target_forgets_registrations() {
    let worker = TargetId::from("worker");
    let mut session = connect(Capabilities::modern(), DebuggerSettings::in_memory()).await;
    session.initialize_target(worker.clone());
    let id = session.add_breakpoint(Breakpoint::for_url("app.js", 3, 0));
    session.settle().await;

    assert!(session.manager().breakpoint(id).unwrap().server_identifier(&worker).is_some());

    session.target_removed(&worker);
    session.settle().await;

    let breakpoint = session.manager().breakpoint(id).unwrap();
    assert!(breakpoint.server_identifier(&worker).is_none());
    assert!(breakpoint.server_identifier(&main_target()).is_some());
    assert!(session.manager().target_state(&worker).is_none());
}

#[tokio::test]
async fn test_legacy_step_hides_transient_resume() {
    let mut session = connect(Capabilities::legacy(), DebuggerSettings::in_memory()).await;
    session.gateway().parse_script(&main_target(), ScriptParsed::new("1", Some("app.js")));
    session.settle().await;
    session.pause().await.unwrap();
    let mut events = session.subscribe();

    session.step_over().await.unwrap();
    session.settle().await;

    assert!(session.manager().paused());
    assert!(!session.manager().has_pending_timer());
    assert_eq!(session.manager().active_call_frame().unwrap().location.line(), 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(!seen.contains(&DebuggerEvent::Resumed));
    assert!(seen.contains(&DebuggerEvent::ActiveCallFrameDidChange));
}

#[tokio::test]
async fn test_legacy_resume_is_reported_after_debounce() {
    let mut session = connect(Capabilities::legacy(), DebuggerSettings::in_memory()).await;
    session.gateway().parse_script(&main_target(), ScriptParsed::new("1", Some("app.js")));
    session.settle().await;
    session.pause().await.unwrap();

    session.resume().await.unwrap();
    assert!(!session.manager().paused());
    assert!(!session.manager().has_pending_timer());
}

#[tokio::test]
async fn test_legacy_resume_of_paused_siblings_completes() {
    let worker = TargetId::from("worker");
    let mut session = connect(Capabilities::legacy(), DebuggerSettings::in_memory()).await;
    session.initialize_target(worker.clone());
    session.gateway().parse_script(&main_target(), ScriptParsed::new("1", Some("app.js")));
    session.gateway().parse_script(&worker, ScriptParsed::new("9", Some("worker.js")));
    session.settle().await;

    session.gateway().hit_breakpoint(&worker, location("9", 4));
    session.settle().await;
    assert!(session.manager().target_state(&main_target()).unwrap().is_paused());
    assert!(session.manager().target_state(&worker).unwrap().is_paused());

    session.resume().await.unwrap();
    session.settle().await;

    let manager = session.manager();
    assert!(!manager.paused());
    assert!(!manager.target_state(&main_target()).unwrap().is_paused());
    assert!(!manager.target_state(&worker).unwrap().is_paused());
    assert!(!manager.has_pending_timer());
}
