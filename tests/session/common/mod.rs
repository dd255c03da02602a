use gdbsession::debugger::command::{Command, TextEncoding};
use gdbsession::debugger::queue::WatchUpdate;
use gdbsession::debugger::store::{SourcePosition, StackFrame};
use gdbsession::debugger::watch::WatchList;
use gdbsession::debugger::{ConfigProvider, Debugger, SessionHook};
use std::cell::{Cell, RefCell};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Answers commands the way gdb does with `--annotate=2`.
/// Every received line is appended to `commands.log` in the working directory.
const FAKE_GDB: &str = r##"#!/bin/sh
A=$(printf '\032\032')
n=1

prompt() {
    printf '\n%spre-prompt\n(gdb) \n%sprompt\n' "$A" "$A"
}

frame() {
    printf '\n%sframe-begin %s 0x401534\n#%s  \n' "$A" "$1" "$1"
    printf '%sframe-function-name\n%s\n%sframe-args\n ()\n' "$A" "$2" "$A"
    printf '%sframe-source-begin\n at \n%sframe-source-file\n%s\n' "$A" "$A" "$3"
    printf '%sframe-source-line\n%s\n%sframe-source-end\n\n%sframe-end\n' "$A" "$4" "$A" "$A"
}

while IFS= read -r line; do
    printf '%s\n' "$line" >> commands.log
    case "$line" in
        break*)
            printf '\n%spost-prompt\nBreakpoint %s at 0x401534: file main.c, line 5.\n' "$A" "$n"
            n=$((n + 1))
            ;;
        backtrace)
            printf '\n%spost-prompt\n' "$A"
            frame 0 inner main.c 5
            frame 1 main main.c 12
            ;;
        "info locals")
            printf '\n%spost-prompt\n%si = 1\n%sj = 2\n' "$A" "$A" "$A"
            ;;
        next)
            printf '\n%ssource /tmp/main.c:5:10:beg:0x401534\n' "$A"
            ;;
        run)
            printf 'warning: Source file is more recent than executable.\n'
            ;;
        continue)
            printf '\n%sexited 0\n' "$A"
            ;;
    esac
    prompt
done
"##;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_POLL: Duration = Duration::from_millis(10);

/// Fake debugger executable inside a private temporary directory.
pub struct FakeGdb {
    dir: PathBuf,
    path: PathBuf,
}

impl FakeGdb {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("gdbs-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let path = dir.join("gdb");
        fs::write(&path, FAKE_GDB).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lines received by the fake debugger so far.
    pub fn commands(&self) -> Vec<String> {
        fs::read_to_string(self.dir.join("commands.log"))
            .map(|log| log.lines().map(ToString::to_string).collect())
            .unwrap_or_default()
    }
}

impl Drop for FakeGdb {
    fn drop(&mut self) {
        _ = fs::remove_dir_all(&self.dir);
    }
}

pub struct TestConfig {
    pub debugger: Option<PathBuf>,
}

impl TestConfig {
    pub fn new(debugger: &Path) -> Self {
        Self {
            debugger: Some(debugger.to_path_buf()),
        }
    }
}

impl ConfigProvider for TestConfig {
    fn debugger_path(&self) -> Option<PathBuf> {
        self.debugger.clone()
    }

    fn encoding(&self) -> TextEncoding {
        TextEncoding::Utf8
    }

    fn poll_interval(&self) -> Duration {
        EVENT_POLL
    }
}

#[derive(Clone, Default)]
pub struct TestInfo {
    pub events: Rc<RefCell<Vec<String>>>,
    pub frames: Rc<RefCell<Vec<StackFrame>>>,
    pub locals: Rc<RefCell<Vec<String>>>,
    pub position: Rc<RefCell<Option<SourcePosition>>>,
    pub exit_code: Rc<Cell<Option<i32>>>,
}

impl TestInfo {
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.events.borrow().iter().any(|e| e == event)
    }

    fn push(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }
}

#[derive(Default)]
pub struct TestHooks {
    info: TestInfo,
    rebuild_on_stale: bool,
}

impl TestHooks {
    pub fn new(info: TestInfo) -> Self {
        Self {
            info,
            rebuild_on_stale: false,
        }
    }

    pub fn with_rebuild_on_stale(mut self) -> Self {
        self.rebuild_on_stale = true;
        self
    }
}

impl SessionHook for TestHooks {
    fn on_backtrace(&self, frames: &[StackFrame]) {
        self.info.push("backtrace");
        self.info.frames.replace(frames.to_vec());
    }

    fn on_locals(&self, locals: &[String]) {
        self.info.push("locals");
        self.info.locals.replace(locals.to_vec());
    }

    fn on_watches(&self, _: &WatchList) {
        self.info.push("watches");
    }

    fn on_execution_position(&self, position: &SourcePosition, _: bool) {
        self.info.push("position");
        self.info.position.replace(Some(position.clone()));
    }

    fn on_write_failed(&self, command: &Command, _: &str) {
        self.info.push(format!("write failed: {}", command.text()));
    }

    fn on_watch_update(&self, update: WatchUpdate) {
        self.info.push(format!("{update:?}"));
    }

    fn on_stale_source(&self) -> bool {
        self.info.push("stale");
        self.rebuild_on_stale
    }

    fn on_rebuild_requested(&self) {
        self.info.push("rebuild");
    }

    fn on_breakpoint_marks_reset(&self) {
        self.info.push("marks reset");
    }

    fn on_session_finished(&self, exit_code: Option<i32>) {
        self.info.push("finished");
        self.info.exit_code.set(exit_code);
    }
}

pub type TestDebugger = Debugger<TestConfig, TestHooks>;

/// Process session events until `cond` holds. Returns false on timeout.
pub fn wait_until(debugger: &mut TestDebugger, cond: impl Fn(&TestDebugger) -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if cond(debugger) {
            return true;
        }
        debugger.wait_event(EVENT_POLL);
    }
    cond(debugger)
}

#[macro_export]
macro_rules! session_env {
    ($gdb: ident, $info: ident, $debugger: ident, $code: block) => {{
        let $gdb = $crate::common::FakeGdb::new();
        let $info = $crate::common::TestInfo::default();
        #[allow(unused_mut)]
        let mut $debugger = gdbsession::debugger::Debugger::new(
            $crate::common::TestConfig::new($gdb.path()),
            $crate::common::TestHooks::new($info.clone()),
        );
        $code
    }};
}
