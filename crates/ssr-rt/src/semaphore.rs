//! Minimal counting semaphore used for the worker pool's `cont`/`wait`
//! handshake (C7). Cloning shares the same counter and condition
//! variable, so each worker thread gets its own lightweight handle.

use std::sync::{Arc, Condvar, Mutex};

#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    pub fn post(&self) {
        let (lock, cvar) = &*self.inner;
        let mut count = lock.lock().unwrap();
        *count += 1;
        cvar.notify_one();
    }

    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut count = lock.lock().unwrap();
        while *count == 0 {
            count = cvar.wait(count).unwrap();
        }
        *count -= 1;
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn post_wakes_waiter() {
        let sem = Semaphore::new();
        let waiter = sem.clone();
        let handle = thread::spawn(move || waiter.wait());
        sem.post();
        handle.join().unwrap();
    }
}
