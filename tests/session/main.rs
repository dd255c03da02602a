mod common;

mod breakpoints;
mod responses;

use crate::common::{wait_until, TestConfig, TestHooks};
use gdbsession::debugger::{Debugger, Error, SessionState};
use serial_test::serial;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::thread;
use std::time::Duration;

#[test]
#[serial]
fn test_session_start_and_stop() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        assert_eq!(debugger.state(), SessionState::Running);
        assert!(matches!(debugger.start(), Err(Error::AlreadyRun)));

        debugger.stop();
        assert_eq!(debugger.state(), SessionState::Stopping);
        assert!(wait_until(&mut debugger, |d| d.state() == SessionState::Idle));

        let events = info.events();
        assert_eq!(
            events[events.len() - 2..],
            ["marks reset".to_string(), "finished".to_string()]
        );
    });
}

#[test]
#[serial]
fn test_session_restart() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.stop();
        assert!(wait_until(&mut debugger, |d| d.state() == SessionState::Idle));

        debugger.start().unwrap();
        assert_eq!(debugger.state(), SessionState::Running);
        debugger.send("info", "source");
        assert!(wait_until(&mut debugger, |_| gdb
            .commands()
            .contains(&"info source".to_string())));

        debugger.stop();
        assert!(wait_until(&mut debugger, |d| d.state() == SessionState::Idle));
        assert_eq!(
            info.events().iter().filter(|e| *e == "finished").count(),
            2
        );
    });
}

#[test]
#[serial]
fn test_debugger_runs_in_its_directory() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.send("info", "frame");
        assert!(wait_until(&mut debugger, |_| !gdb.commands().is_empty()));
        assert!(gdb.dir().join("commands.log").exists());
    });
}

#[test]
#[serial]
fn test_commands_dropped_without_session() {
    session_env!(gdb, info, debugger, {
        debugger.add_breakpoint("main.c", 5).unwrap();
        debugger.send("next", "");
        debugger.update_debug_info();
        debugger.evaluate("i");

        thread::sleep(Duration::from_millis(100));
        debugger.process_events();

        assert_eq!(debugger.state(), SessionState::Idle);
        assert!(gdb.commands().is_empty());
        assert!(info.events().is_empty());
    });
}

#[test]
#[serial]
fn test_start_failure_keeps_session_idle() {
    let gdb = common::FakeGdb::new();
    let not_executable = gdb.dir().join("not-executable");
    fs::write(&not_executable, "").unwrap();
    fs::set_permissions(&not_executable, fs::Permissions::from_mode(0o644)).unwrap();

    let mut debugger = Debugger::new(
        TestConfig::new(&not_executable),
        TestHooks::default(),
    );
    let err = debugger.start().unwrap_err();
    assert!(matches!(err, Error::Spawn(_)));
    assert!(err.is_fatal());
    assert_eq!(debugger.state(), SessionState::Idle);

    let mut debugger = Debugger::new(
        TestConfig::new(&gdb.dir().join("missing")),
        TestHooks::default(),
    );
    assert!(matches!(
        debugger.start(),
        Err(Error::DebuggerNotFound(_))
    ));
}
