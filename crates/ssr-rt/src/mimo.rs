//! MIMO processor framework (C7): the per-period list walk that drives
//! every renderer backend.

use ssr_core::{CommandQueue, RtList};

use crate::worker_pool::{ProcessItem, WorkerPool};

/// The engine-level hook invoked between the input and output list
/// walks; each renderer backend supplies its own, typically walking
/// auxiliary (intermediate) lists that the input/output items don't
/// reach directly.
pub trait EngineHooks: Send + Sync {
    fn process(&self);
}

impl EngineHooks for () {
    fn process(&self) {}
}

/// Owns the three realtime lists (inputs, intermediates, outputs), the
/// command queue draining them, and the worker pool that walks them.
pub struct Engine<H: EngineHooks = ()> {
    commands: CommandQueue,
    inputs: RtList<Box<dyn ProcessItem>>,
    intermediates: RtList<Box<dyn ProcessItem>>,
    outputs: RtList<Box<dyn ProcessItem>>,
    pool: WorkerPool,
    hooks: H,
}

impl<H: EngineHooks> Engine<H> {
    pub fn new(num_workers: usize, hooks: H) -> Self {
        Self {
            commands: CommandQueue::new(),
            inputs: RtList::new(),
            intermediates: RtList::new(),
            outputs: RtList::new(),
            pool: WorkerPool::new(num_workers),
            hooks,
        }
    }

    pub fn command_queue(&self) -> &CommandQueue {
        &self.commands
    }

    pub fn inputs(&self) -> &RtList<Box<dyn ProcessItem>> {
        &self.inputs
    }

    pub fn intermediates(&self) -> &RtList<Box<dyn ProcessItem>> {
        &self.intermediates
    }

    pub fn outputs(&self) -> &RtList<Box<dyn ProcessItem>> {
        &self.outputs
    }

    pub fn num_workers(&self) -> usize {
        self.pool.num_workers()
    }

    /// Starts normal (non-bypass) command processing. Call once the
    /// backend begins delivering periods.
    pub fn activate(&self) {
        self.commands.activate();
    }

    /// Stops normal command processing and drains whatever commands are
    /// still outstanding on the calling (non-realtime) thread. The
    /// realtime thread must have stopped calling `process_period` before
    /// this is called, so the inbound FIFO is already empty.
    pub fn deactivate(&self) {
        self.commands.process_commands();
        self.commands.deactivate();
        self.commands.drain_cleanup();
    }

    /// Runs one audio period: drains commands, walks the input list,
    /// invokes the engine hook, walks the output list, then drains
    /// whatever commands' cleanup became due.
    pub fn process_period(&self) {
        self.commands.process_commands();
        self.pool.run_over(&self.inputs);
        self.hooks.process();
        self.pool.run_over(&self.outputs);
        self.commands.drain_cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingItem(Arc<AtomicUsize>);

    impl ProcessItem for RecordingItem {
        fn process(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordingHook(Arc<AtomicUsize>);

    impl EngineHooks for RecordingHook {
        fn process(&self) {
            self.0.fetch_add(100, Ordering::SeqCst);
        }
    }

    #[test]
    fn process_period_walks_inputs_then_hook_then_outputs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = Engine::new(2, RecordingHook(counter.clone()));
        engine.activate();
        engine
            .inputs()
            .add(engine.command_queue(), Box::new(RecordingItem(counter.clone())) as Box<dyn ProcessItem>);
        engine
            .outputs()
            .add(engine.command_queue(), Box::new(RecordingItem(counter.clone())) as Box<dyn ProcessItem>);
        engine.process_period();
        // first period: commands just queued above are drained, then
        // input(+1) -> hook(+100) -> output(+1)
        assert_eq!(counter.load(Ordering::SeqCst), 102);
    }
}
