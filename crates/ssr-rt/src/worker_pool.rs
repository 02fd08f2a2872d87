//! Static round-robin worker pool (C7).
//!
//! At construction, `N-1` worker threads are spawned; the calling thread
//! acts as worker 0. Each call to [`WorkerPool::run_over`] posts every
//! worker's `cont` semaphore, processes worker 0's own share inline, then
//! waits on every worker's `wait` semaphore before returning. Items are
//! assigned to workers by `index % num_workers`; there is no work
//! stealing, so list items must be independent of one another.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ssr_core::RtList;

use crate::semaphore::Semaphore;

/// One item of a realtime-processed list: inputs, intermediates, and
/// outputs of the MIMO framework all implement this.
pub trait ProcessItem: Send + Sync {
    fn process(&self);
}

type ItemList = RtList<Box<dyn ProcessItem>>;

pub struct WorkerPool {
    num_workers: usize,
    cont: Vec<Semaphore>,
    wait: Vec<Semaphore>,
    keep_running: Arc<AtomicBool>,
    current_list: Arc<AtomicPtr<ItemList>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let keep_running = Arc::new(AtomicBool::new(true));
        let current_list: Arc<AtomicPtr<ItemList>> = Arc::new(AtomicPtr::new(std::ptr::null_mut()));

        let cont: Vec<Semaphore> = (0..num_workers).map(|_| Semaphore::new()).collect();
        let wait: Vec<Semaphore> = (0..num_workers).map(|_| Semaphore::new()).collect();

        let mut handles = Vec::with_capacity(num_workers - 1);
        for worker_id in 1..num_workers {
            let cont = cont[worker_id].clone();
            let wait = wait[worker_id].clone();
            let keep_running = keep_running.clone();
            let current_list = current_list.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("ssr-worker-{worker_id}"))
                    .spawn(move || worker_loop(worker_id, num_workers, cont, wait, keep_running, current_list))
                    .expect("failed to spawn worker thread"),
            );
        }

        Self {
            num_workers,
            cont,
            wait,
            keep_running,
            current_list,
            handles,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Walks `list` across the whole pool, returning only once every
    /// worker (including this, worker 0) has finished its share.
    pub fn run_over(&self, list: &ItemList) {
        self.current_list
            .store(list as *const ItemList as *mut ItemList, Ordering::Release);
        for sem in &self.cont[1..self.num_workers] {
            sem.post();
        }
        process_share(list, 0, self.num_workers);
        for sem in &self.wait[1..self.num_workers] {
            sem.wait();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.keep_running.store(false, Ordering::Release);
        for sem in &self.cont[1..self.num_workers] {
            sem.post();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn process_share(list: &ItemList, worker_id: usize, num_workers: usize) {
    for (idx, item) in list.iter().enumerate() {
        if idx % num_workers == worker_id {
            item.process();
        }
    }
}

fn worker_loop(
    worker_id: usize,
    num_workers: usize,
    cont: Semaphore,
    wait: Semaphore,
    keep_running: Arc<AtomicBool>,
    current_list: Arc<AtomicPtr<ItemList>>,
) {
    loop {
        cont.wait();
        if !keep_running.load(Ordering::Acquire) {
            return;
        }
        let ptr = current_list.load(Ordering::Acquire);
        if !ptr.is_null() {
            // SAFETY: `run_over` keeps `list` borrowed on the calling
            // thread for the duration of the cont/wait handshake, so the
            // pointee outlives every worker's dereference here.
            let list = unsafe { &*ptr };
            process_share(list, worker_id, num_workers);
        }
        wait.post();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingItem(Arc<AtomicUsize>);

    impl ProcessItem for CountingItem {
        fn process(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn run_over_processes_every_item_exactly_once() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let list: ItemList = RtList::new();
        let queue = ssr_core::CommandQueue::new();
        queue.activate();
        for _ in 0..10 {
            list.add(&queue, Box::new(CountingItem(counter.clone())) as Box<dyn ProcessItem>);
        }
        queue.process_commands();

        pool.run_over(&list);

        assert_eq!(counter.load(Ordering::SeqCst), 10);
        queue.drain_cleanup();
    }
}
