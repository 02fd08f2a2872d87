//! Non-realtime → realtime command channel (C2).
//!
//! Built on two [`Fifo`]s of boxed commands: `inbound` carries work from
//! the control thread to the realtime thread, `cleanup` carries executed
//! commands back for destruction off the realtime path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::fifo::Fifo;

/// A unit of work that crosses from the non-realtime thread to the
/// realtime thread and back.
///
/// `execute` runs on the realtime thread and must not allocate or block.
/// `cleanup` runs afterwards on the non-realtime thread; the default does
/// nothing beyond the implicit `Drop` of the command itself.
pub trait Command: Send {
    fn execute(&mut self);

    fn cleanup(&mut self) {}
}

const DEFAULT_CAPACITY: usize = 1024;
const RETRY_SLEEP: Duration = Duration::from_micros(50);

/// The non-realtime → realtime command queue.
pub struct CommandQueue {
    inbound: Fifo<Box<dyn Command>>,
    cleanup: Fifo<Box<dyn Command>>,
    /// `true` in normal (queued) mode; `false` in bypass mode, where
    /// `push` executes and cleans up synchronously on the calling thread.
    active: AtomicBool,
    dropped_cleanups: AtomicUsize,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inbound: Fifo::new(capacity),
            cleanup: Fifo::new(capacity),
            active: AtomicBool::new(false),
            dropped_cleanups: AtomicUsize::new(0),
        }
    }

    /// Switches the queue into normal (queued) mode. Called once the
    /// realtime thread is running and will be draining `process_commands`
    /// every period.
    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Switches the queue into bypass mode. The inbound FIFO must be
    /// empty (debug-checked); no realtime thread may be running.
    pub fn deactivate(&self) {
        debug_assert!(
            self.inbound.is_empty(),
            "deactivate() called with commands still pending"
        );
        self.active.store(false, Ordering::Release);
    }

    /// Enqueues `command` from the non-realtime thread. In bypass mode it
    /// is executed and cleaned up synchronously instead.
    ///
    /// Calling this from more than one thread concurrently without an
    /// external lock violates the inbound FIFO's SPSC contract.
    pub fn push(&self, mut command: Box<dyn Command>) {
        self.drain_cleanup();

        if !self.active.load(Ordering::Acquire) {
            command.execute();
            command.cleanup();
            return;
        }

        loop {
            match self.inbound.push(command) {
                Ok(()) => break,
                Err(returned) => {
                    log::warn!("command queue inbound fifo full, retrying");
                    command = returned;
                    thread::sleep(RETRY_SLEEP);
                }
            }
        }
    }

    /// Drains the cleanup FIFO on the non-realtime thread, running each
    /// command's `cleanup` hook before dropping it.
    pub fn drain_cleanup(&self) {
        while let Some(mut command) = self.cleanup.pop() {
            command.cleanup();
        }
    }

    /// Runs every pending command on the realtime thread, then pushes it
    /// onto the cleanup FIFO. Must be called once per audio period before
    /// any other processing.
    pub fn process_commands(&self) {
        while let Some(mut command) = self.inbound.pop() {
            command.execute();
            if let Err(_leaked) = self.cleanup.push(command) {
                // The cleanup FIFO is sized to match inbound, so this
                // cannot happen in practice; if it does, the command
                // (and whatever it owns) simply leaks rather than
                // corrupting the realtime thread.
                self.dropped_cleanups.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Blocks the calling (non-realtime) thread until every command
    /// pushed before this call has been executed and cleaned up.
    pub fn wait(&self) {
        let flag = Arc::new(AtomicBool::new(false));
        self.push(Box::new(WaitCommand { flag: flag.clone() }));
        while !flag.load(Ordering::Acquire) {
            thread::sleep(RETRY_SLEEP);
        }
    }

    pub fn dropped_cleanups(&self) -> usize {
        self.dropped_cleanups.load(Ordering::Relaxed)
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct WaitCommand {
    flag: Arc<AtomicBool>,
}

impl Command for WaitCommand {
    fn execute(&mut self) {}

    fn cleanup(&mut self) {
        self.flag.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    struct Increment<'a>(&'a AtomicI32);

    impl Command for Increment<'static> {
        fn execute(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn bypass_mode_runs_synchronously() {
        static COUNTER: AtomicI32 = AtomicI32::new(0);
        let queue = CommandQueue::new();
        queue.push(Box::new(Increment(&COUNTER)));
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn active_mode_requires_process_commands() {
        static COUNTER: AtomicI32 = AtomicI32::new(0);
        let queue = CommandQueue::new();
        queue.activate();
        queue.push(Box::new(Increment(&COUNTER)));
        assert_eq!(COUNTER.load(Ordering::SeqCst), 0);
        queue.process_commands();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        queue.drain_cleanup();
    }

    #[test]
    fn wait_blocks_until_processed() {
        let queue = Arc::new(CommandQueue::new());
        queue.activate();
        let q2 = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            q2.process_commands();
        });
        queue.wait();
        handle.join().unwrap();
    }
}
