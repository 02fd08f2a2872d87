//! Pure signal-processing building blocks used by the renderer backends:
//! block delay lines (C4), the partitioned FFT convolver (C5), and the
//! crossfading channel combiner (C6).

mod combine;
mod convolution;
mod delayline;

pub use combine::{
    classify_transition, combine_channels, raised_cosine_window, CombineChannelsResult,
};
pub use convolution::{
    Convolver, FftPlans, Input, Output, PartitionedFilter, StaticConvolver, StaticOutput,
};
pub use delayline::{BlockDelayLine, DelayLineCirculator, NonCausalBlockDelayLine};
