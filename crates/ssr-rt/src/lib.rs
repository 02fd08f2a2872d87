//! MIMO processor framework (C7) and transport integration shim (C11):
//! the worker pool and per-period list walk that drive every renderer
//! backend, plus the contract an audio backend uses to feed it.

mod mimo;
mod semaphore;
mod transport;
mod worker_pool;

pub use mimo::{Engine, EngineHooks};
pub use semaphore::Semaphore;
pub use transport::{AudioPort, PeriodBuffers, TransportConfig};
pub use worker_pool::{ProcessItem, WorkerPool};
