//! FIFO of commands waiting for the debugger prompt.
//!
//! At most one command is in flight. Watch refresh is suppressed while a burst of commands
//! that want a watch update is queued and resumed when the burst drains.

use crate::debugger::command::Command;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum WatchUpdate {
    /// Stop refreshing watch values.
    Pause,
    /// Refresh watch values again.
    Resume,
}

/// Receiver of watch update suppression notifications.
pub trait WatchUpdateHook: Send + Sync {
    fn on_watch_update(&self, update: WatchUpdate);
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Command>,
    current: Option<Command>,
    in_flight: bool,
    /// Number of `Pause` notifications not matched by a `Resume` yet.
    suppressed: u32,
}

pub struct CommandQueue {
    state: Mutex<QueueState>,
    hook: Arc<dyn WatchUpdateHook>,
}

impl CommandQueue {
    pub fn new(hook: Arc<dyn WatchUpdateHook>) -> Self {
        Self {
            state: Mutex::default(),
            hook,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // queue state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a command to the queue tail.
    pub fn enqueue(&self, cmd: Command) {
        let pause = {
            let mut state = self.lock();
            let pause = state.pending.is_empty() && cmd.update_watch;
            if pause {
                state.suppressed += 1;
            }
            state.pending.push_back(cmd);
            pause
        };

        if pause {
            self.hook.on_watch_update(WatchUpdate::Pause);
        }
    }

    /// Take the next command and mark it in flight.
    ///
    /// Returns `None` while another command is in flight or when the queue is drained.
    /// Draining the queue releases the current command and resumes watch updates if any
    /// command of the burst paused them.
    pub fn dequeue_next(&self) -> Option<Command> {
        let mut state = self.lock();
        if state.in_flight {
            return None;
        }

        match state.pending.pop_front() {
            Some(cmd) => {
                state.current = Some(cmd.clone());
                state.in_flight = true;
                Some(cmd)
            }
            None => {
                let requested = state
                    .current
                    .take()
                    .map(|cmd| cmd.update_watch)
                    .unwrap_or_default();
                let resume = requested || state.suppressed > 0;
                state.suppressed = 0;
                drop(state);

                if resume {
                    self.hook.on_watch_update(WatchUpdate::Resume);
                }
                None
            }
        }
    }

    /// Mark the in-flight command as answered and return it.
    pub fn complete(&self) -> Option<Command> {
        let mut state = self.lock();
        state.in_flight = false;
        state.current.clone()
    }

    /// Mark the in-flight command as lost, it will never get a response.
    pub fn abort_current(&self) {
        let mut state = self.lock();
        state.in_flight = false;
        state.current = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Command which response is parsed now (or was parsed last).
    pub fn current(&self) -> Option<Command> {
        self.lock().current.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn suppression_count(&self) -> u32 {
        self.lock().suppressed
    }

    /// Drop every pending command. Resume watch updates exactly once if they were paused.
    pub fn clear(&self) {
        let resume = {
            let mut state = self.lock();
            state.pending.clear();
            state.current = None;
            state.in_flight = false;
            let resume = state.suppressed > 0;
            state.suppressed = 0;
            resume
        };

        if resume {
            self.hook.on_watch_update(WatchUpdate::Resume);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct RecordingHook {
        updates: Mutex<Vec<WatchUpdate>>,
    }

    impl WatchUpdateHook for RecordingHook {
        fn on_watch_update(&self, update: WatchUpdate) {
            self.updates.lock().unwrap().push(update);
        }
    }

    fn queue() -> (CommandQueue, Arc<RecordingHook>) {
        let hook = Arc::new(RecordingHook::default());
        (CommandQueue::new(hook.clone()), hook)
    }

    #[test]
    fn test_fifo_order() {
        let (queue, _) = queue();
        queue.enqueue(Command::new("break", "\"a.c\":1"));
        queue.enqueue(Command::new("break", "\"a.c\":2"));
        queue.enqueue(Command::new("run", ""));

        let mut sent = vec![];
        while let Some(cmd) = queue.dequeue_next() {
            sent.push(cmd.text());
            queue.complete();
        }
        assert_eq!(sent, vec!["break \"a.c\":1", "break \"a.c\":2", "run"]);
    }

    #[test]
    fn test_single_command_in_flight() {
        let (queue, _) = queue();
        queue.enqueue(Command::new("next", ""));
        queue.enqueue(Command::new("step", ""));

        assert_eq!(queue.dequeue_next().unwrap().verb, "next");
        assert!(queue.is_in_flight());
        assert!(queue.dequeue_next().is_none());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.complete().unwrap().verb, "next");
        assert_eq!(queue.dequeue_next().unwrap().verb, "step");
    }

    #[test]
    fn test_watch_update_pause_and_resume() {
        let (queue, hook) = queue();
        queue.enqueue(Command::new("next", ""));
        queue.enqueue(Command::new("backtrace", ""));
        assert_eq!(queue.suppression_count(), 1);
        assert_eq!(*hook.updates.lock().unwrap(), vec![WatchUpdate::Pause]);

        while queue.dequeue_next().is_some() {
            queue.complete();
        }

        assert_eq!(queue.suppression_count(), 0);
        assert_eq!(
            *hook.updates.lock().unwrap(),
            vec![WatchUpdate::Pause, WatchUpdate::Resume]
        );
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_resume_after_follow_up_command() {
        let (queue, hook) = queue();
        queue.enqueue(Command::new("next", ""));
        assert_eq!(queue.dequeue_next().unwrap().verb, "next");
        queue.complete();

        // refresh requested while handling the step response
        queue.enqueue(Command::new("display", "").with_update_watch(false));
        assert_eq!(queue.dequeue_next().unwrap().verb, "display");
        queue.complete();
        assert!(queue.dequeue_next().is_none());

        assert_eq!(queue.suppression_count(), 0);
        assert_eq!(
            *hook.updates.lock().unwrap(),
            vec![WatchUpdate::Pause, WatchUpdate::Resume]
        );

        assert!(queue.dequeue_next().is_none());
        assert_eq!(hook.updates.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_no_pause_without_update_watch() {
        let (queue, hook) = queue();
        queue.enqueue(Command::new("display", "x").with_update_watch(false));
        while queue.dequeue_next().is_some() {
            queue.complete();
        }
        assert!(hook.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clear_resumes_once() {
        let (queue, hook) = queue();
        queue.enqueue(Command::new("next", ""));
        queue.enqueue(Command::new("step", ""));
        queue.dequeue_next();
        assert_eq!(queue.suppression_count(), 1);

        queue.clear();
        queue.clear();

        assert!(queue.is_empty());
        assert!(!queue.is_in_flight());
        assert_eq!(queue.suppression_count(), 0);
        assert_eq!(
            *hook.updates.lock().unwrap(),
            vec![WatchUpdate::Pause, WatchUpdate::Resume]
        );
    }
}
