//! Sample and block-size types shared across the engine.

/// A single audio sample. Matches the source engine's `sample_type`.
pub type Sample = f32;

/// Sample rate in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRate(pub u32);

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

/// Block (period) size in samples. Must be a multiple of 8 wherever a
/// convolver is in use (§4.5's SIMD/layout requirement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSize(pub usize);

impl BlockSize {
    #[inline]
    pub fn get(self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_multiple_of_eight(self) -> bool {
        self.0 % 8 == 0
    }
}

/// A non-owning view of one period's worth of samples for one channel.
pub type Block<'a> = &'a [Sample];
/// A mutable non-owning view of one period's worth of samples.
pub type BlockMut<'a> = &'a mut [Sample];
