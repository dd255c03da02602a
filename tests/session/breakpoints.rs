use crate::common::wait_until;
use crate::session_env;
use gdbsession::debugger::SessionState;
use serial_test::serial;

#[test]
#[serial]
fn test_breakpoints_replayed_on_start() {
    session_env!(gdb, info, debugger, {
        debugger.add_breakpoint("a.c", 1).unwrap();
        debugger.add_breakpoint("b.c", 2).unwrap();
        debugger
            .set_breakpoint_condition(1, Some("n > 1".to_string()))
            .unwrap();
        debugger.add_watch("x").unwrap();

        debugger.start().unwrap();
        assert!(wait_until(&mut debugger, |_| gdb.commands().len() >= 3));

        assert_eq!(
            gdb.commands(),
            vec![
                "break \"a.c\":1".to_string(),
                "break \"b.c\":2 if n > 1".to_string(),
                "display x".to_string(),
            ]
        );
        assert!(wait_until(&mut debugger, |_| info.has_event("watches")));
    });
}

#[test]
#[serial]
fn test_breakpoint_numbers_learned() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.add_breakpoint("a.c", 1).unwrap();
        debugger.add_breakpoint("b.c", 2).unwrap();

        assert!(wait_until(&mut debugger, |d| d
            .breakpoints()
            .iter()
            .all(|b| b.handle.is_some())));
        let handles: Vec<_> = debugger.breakpoints().iter().map(|b| b.handle).collect();
        assert_eq!(handles, vec![Some(1), Some(2)]);

        debugger.set_breakpoint_condition(1, Some("i == 3".to_string())).unwrap();
        assert!(wait_until(&mut debugger, |_| gdb
            .commands()
            .contains(&"cond 2 i == 3".to_string())));

        debugger.stop();
        assert!(wait_until(&mut debugger, |d| d.state() == SessionState::Idle));
        assert!(debugger.breakpoints().iter().all(|b| b.handle.is_none()));
        assert!(info.has_event("marks reset"));
    });
}

#[test]
#[serial]
fn test_remove_breakpoint_sends_clear() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.add_breakpoint("dir\\main.c", 7).unwrap();
        assert_eq!(
            debugger.remove_breakpoint("dir\\main.c".as_ref(), 7).len(),
            1
        );

        assert!(wait_until(&mut debugger, |_| gdb.commands().len() >= 2));
        assert_eq!(
            gdb.commands(),
            vec![
                "break \"dir/main.c\":7".to_string(),
                "clear \"dir/main.c\":7".to_string(),
            ]
        );
        assert!(debugger.breakpoints().is_empty());
    });
}

#[test]
#[serial]
fn test_remove_breakpoint_clears_duplicates() {
    session_env!(gdb, info, debugger, {
        debugger.start().unwrap();
        debugger.add_breakpoint("a.c", 1).unwrap();
        debugger.add_breakpoint("a.c", 1).unwrap();
        debugger.add_breakpoint("b.c", 2).unwrap();

        let removed = debugger.remove_breakpoint("a.c".as_ref(), 1);
        assert_eq!(removed.len(), 2);
        assert_eq!(debugger.breakpoints().len(), 1);

        assert!(wait_until(&mut debugger, |_| gdb.commands().len() >= 4));
        assert_eq!(
            gdb.commands(),
            vec![
                "break \"a.c\":1".to_string(),
                "break \"a.c\":1".to_string(),
                "break \"b.c\":2".to_string(),
                "clear \"a.c\":1".to_string(),
            ]
        );

        debugger.stop();
        assert!(wait_until(&mut debugger, |d| d.state() == SessionState::Idle));
        debugger.start().unwrap();
        assert!(wait_until(&mut debugger, |_| gdb.commands().len() >= 5));
        assert_eq!(gdb.commands()[4], "break \"b.c\":2");
    });
}
