//! Single-writer shared-data cell (C3, scalar half).

use crate::command::{Command, CommandQueue};

/// A value written from the non-realtime thread through a [`CommandQueue`]
/// and read in plain fashion from the realtime thread.
///
/// No tearing is possible: the only code that ever mutates the held value
/// is the `execute` hook of the command `set` enqueues, and that hook
/// always runs on the realtime thread. Reading from anywhere but the
/// realtime thread (or while the owning queue is in bypass mode) is a
/// contract violation the type cannot check.
pub struct SharedData<T> {
    value: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SharedData<T> {}

impl<T: Send + 'static> SharedData<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: std::cell::UnsafeCell::new(initial),
        }
    }

    /// Reads the current value. Realtime-thread-only by contract.
    #[inline]
    pub fn get(&self) -> &T {
        unsafe { &*self.value.get() }
    }

    /// Enqueues a write of `new_value`, visible to the realtime thread
    /// after its next `process_commands` call.
    pub fn set(&self, queue: &CommandQueue, new_value: T) {
        let ptr = self.value.get();
        queue.push(Box::new(SetCommand {
            ptr,
            new_value: Some(new_value),
        }));
    }

    /// Writes directly, for values the realtime thread itself updates so
    /// the non-realtime side picks them up next cycle. Justified only
    /// under the single-writer discipline: no other writer may exist for
    /// this cell while this is used.
    pub fn set_from_rt_thread(&self, new_value: T) {
        unsafe { *self.value.get() = new_value };
    }
}

struct SetCommand<T> {
    ptr: *mut T,
    new_value: Option<T>,
}

unsafe impl<T: Send> Send for SetCommand<T> {}

impl<T: Send> Command for SetCommand<T> {
    fn execute(&mut self) {
        if let Some(value) = self.new_value.take() {
            unsafe { *self.ptr = value };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_deferred_until_process_commands() {
        let queue = CommandQueue::new();
        queue.activate();
        let cell = SharedData::new(1_i32);
        cell.set(&queue, 2);
        assert_eq!(*cell.get(), 1);
        queue.process_commands();
        assert_eq!(*cell.get(), 2);
        queue.drain_cleanup();
    }

    #[test]
    fn bypass_mode_applies_immediately() {
        let queue = CommandQueue::new();
        let cell = SharedData::new(1_i32);
        cell.set(&queue, 5);
        assert_eq!(*cell.get(), 5);
    }
}
