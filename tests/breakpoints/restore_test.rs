use inspector_debugger::{
    Breakpoint, Capabilities, DebuggerSettings, GatewayCommand, JsonFileSettingsStore, PauseOnExceptionsMode,
};

use crate::test_helpers::{connect, main_target};

fn file_settings(path: &std::path::Path) -> DebuggerSettings {
    DebuggerSettings::load(Box::new(JsonFileSettingsStore::open(path).unwrap()))
}

#[tokio::test]
async fn test_breakpoints_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    {
        let mut session = connect(Capabilities::modern(), file_settings(&path)).await;
        let first = session.add_breakpoint(Breakpoint::for_url("app.js", 12, 0));
        session
            .with_manager(|manager| manager.set_breakpoint_condition(first, Some("n > 2".into())))
            .unwrap();
        let second = session.add_breakpoint(Breakpoint::for_url("lib.js", 1, 0));
        session.with_manager(|manager| manager.set_breakpoint_disabled(second, true)).unwrap();
        session
            .with_manager(|manager| manager.set_breakpoint_disabled(manager.all_exceptions_breakpoint(), false))
            .unwrap();
        session.settle().await;
    }

    let settings = file_settings(&path);
    assert!(settings.break_on_all_exceptions());
    assert_eq!(settings.breakpoints().len(), 2);

    let session = connect(Capabilities::modern(), settings).await;
    let manager = session.manager();
    let restored: Vec<(String, u32, Option<String>, bool)> = manager
        .breakpoints()
        .map(|(_, bp)| {
            (
                bp.content_identifier().unwrap_or_default().to_string(),
                bp.location().line(),
                bp.condition().map(str::to_string),
                bp.is_disabled(),
            )
        })
        .collect();
    assert_eq!(
        restored,
        vec![
            ("app.js".to_string(), 12, Some("n > 2".to_string()), false),
            ("lib.js".to_string(), 1, None, true),
        ]
    );
    assert_eq!(manager.break_on_exceptions_state(), PauseOnExceptionsMode::All);

    let sets = session
        .gateway()
        .calls()
        .into_iter()
        .filter(|(_, command)| matches!(command, GatewayCommand::SetBreakpointByUrl(_)))
        .count();
    assert_eq!(sets, 1, "disabled breakpoints are not registered");
    assert_eq!(session.gateway().registered_breakpoints(&main_target()).len(), 1);
}

#[tokio::test]
async fn test_suppression_does_not_outlive_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    {
        let mut session = connect(Capabilities::modern(), file_settings(&path)).await;
        session.with_manager(|manager| manager.recording_will_start());
        session.settle().await;
        assert!(!session.manager().breakpoints_enabled());
    }

    let settings = file_settings(&path);
    assert_eq!(settings.temporarily_disabled_restore(), Some(true));

    let session = connect(Capabilities::modern(), settings).await;
    assert!(session.manager().breakpoints_enabled());
    assert!(!session.manager().breakpoints_disabled_temporarily());
    assert!(session
        .gateway()
        .calls()
        .contains(&(main_target(), GatewayCommand::SetBreakpointsActive(true))));
}

#[tokio::test]
async fn test_globally_disabled_breakpoints_stay_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    {
        let mut session = connect(Capabilities::modern(), file_settings(&path)).await;
        session.set_breakpoints_enabled(false);
        session.add_breakpoint(Breakpoint::for_url("app.js", 3, 0));
        session.set_breakpoints_enabled(false);
        session.settle().await;
    }

    let session = connect(Capabilities::modern(), file_settings(&path)).await;
    assert!(!session.manager().breakpoints_enabled(), "restoring keeps breakpoints globally off");
    assert_eq!(session.manager().breakpoint_ids().len(), 1);
}
