use crate::common::wait_until;
use crate::session_env;
use gdbsession::debugger::store::SourcePosition;
use gdbsession::debugger::SessionState;
use serial_test::serial;
use std::path::PathBuf;

#[test]
#[serial]
fn test_debug_info_parsed() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.update_debug_info();

        assert!(wait_until(&mut debugger, |_| info.has_event("backtrace")
            && info.has_event("locals")));

        let frames = info.frames.borrow().clone();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function_name, "inner");
        assert_eq!(frames[0].arguments, "()");
        assert_eq!(frames[0].file, Some(PathBuf::from("main.c")));
        assert_eq!(frames[0].line, Some(5));
        assert_eq!(frames[1].function_name, "main");
        assert_eq!(frames[1].line, Some(12));

        assert_eq!(
            *info.locals.borrow(),
            vec!["i = 1".to_string(), "j = 2".to_string()]
        );
        assert_eq!(debugger.stores().frames, frames);

        assert_eq!(
            gdb.commands(),
            vec![
                "backtrace".to_string(),
                "info locals".to_string(),
                "info args".to_string(),
            ]
        );
    });
}

#[test]
#[serial]
fn test_watch_updates_resumed_after_step() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.send("next", "");

        assert!(wait_until(&mut debugger, |_| info.has_event("Resume")));
        assert_eq!(
            info.events(),
            vec![
                "Pause".to_string(),
                "position".to_string(),
                "watches".to_string(),
                "Resume".to_string(),
            ]
        );
        assert_eq!(
            *info.position.borrow(),
            Some(SourcePosition {
                file: PathBuf::from("/tmp/main.c"),
                line: 5,
            })
        );
        assert_eq!(
            gdb.commands(),
            vec!["next".to_string(), "display".to_string()]
        );
    });
}

#[test]
#[serial]
fn test_stale_source_ignored() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.send("run", "");

        assert!(wait_until(&mut debugger, |_| info.has_event("stale")));
        assert_eq!(debugger.state(), SessionState::Running);
        assert!(!info.has_event("rebuild"));
    });
}

#[test]
#[serial]
fn test_stale_source_stops_session() {
    let gdb = crate::common::FakeGdb::new();
    let info = crate::common::TestInfo::default();
    let mut debugger = gdbsession::debugger::Debugger::new(
        crate::common::TestConfig::new(gdb.path()),
        crate::common::TestHooks::new(info.clone()).with_rebuild_on_stale(),
    );

    debugger.start().unwrap();
    debugger.send("run", "");

    assert!(wait_until(&mut debugger, |d| d.state() == SessionState::Idle));
    let events = info.events();
    let stale = events.iter().position(|e| e == "stale").unwrap();
    let rebuild = events.iter().position(|e| e == "rebuild").unwrap();
    assert!(stale < rebuild);
    assert!(info.has_event("finished"));
}

#[test]
#[serial]
fn test_program_exit_stops_session() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.send("continue", "");

        assert!(wait_until(&mut debugger, |d| d.state() == SessionState::Idle));
        assert_eq!(debugger.stores().exit_code, Some(0));
        assert!(info.has_event("finished"));
        assert_eq!(gdb.commands(), vec!["continue".to_string()]);
    });
}
