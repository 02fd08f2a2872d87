//! Transport/control integration shim (C11): adapts an audio backend's
//! periodic block callback to the MIMO engine's [`Engine::process_period`],
//! and carries the per-period buffer contract.

use ssr_core::{BlockSize, SampleRate};

/// What the audio backend hands the engine once per period: fixed block
/// size and sample rate for the activation, plus that period's input and
/// output buffers. Input and output slices may point at the same
/// backend-owned storage; nothing here assumes otherwise.
pub struct PeriodBuffers<'a> {
    pub block_size: BlockSize,
    pub sample_rate: SampleRate,
    pub inputs: &'a [&'a [f32]],
    pub outputs: &'a mut [&'a mut [f32]],
}

/// Implemented by each renderer-specific input/output wrapper to read
/// from or write to the backend's buffers for the current period. The
/// MIMO framework only ever calls `process` on the realtime thread.
pub trait AudioPort: Send + Sync {
    /// Copies this port's channel out of (for inputs) or into (for
    /// outputs) the backend buffer identified by `channel_index`.
    fn bind_period(&self, channel_index: usize, buffers: &PeriodBuffers<'_>);
}

/// Configuration fixed for the lifetime of one activation.
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub block_size: BlockSize,
    pub sample_rate: SampleRate,
    pub num_workers: usize,
}

impl TransportConfig {
    pub fn new(block_size: BlockSize, sample_rate: SampleRate, num_workers: usize) -> Self {
        Self {
            block_size,
            sample_rate,
            num_workers: num_workers.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_clamps_num_workers_to_at_least_one() {
        let cfg = TransportConfig::new(BlockSize(64), SampleRate(48_000), 0);
        assert_eq!(cfg.num_workers, 1);
    }
}
