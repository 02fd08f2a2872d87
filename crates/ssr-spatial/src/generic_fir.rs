//! Generic FIR renderer: every source carries one arbitrary impulse
//! response per loudspeaker, loaded from its properties file — no
//! built-in panning law, just whatever filter set the scene author
//! supplies. Distance attenuation is left to the author too, so the
//! common weighting factor skips the inverse-distance law entirely.

use std::sync::Arc;

use ssr_core::Position;
use ssr_dsp::{FftPlans, Input, Output, PartitionedFilter};

use crate::source::{combine_raw_contribution, weighting_factor, GainParams, SourceState};
use crate::Sample;

/// One output channel's convolver stage plus its crossfade scratch.
struct Channel {
    output: Output,
    old: Vec<Sample>,
    new: Vec<Sample>,
    contribution: Vec<Sample>,
}

impl Channel {
    fn new(plans: Arc<FftPlans>, num_partitions: usize) -> Self {
        let block_size = plans.block_size();
        Self {
            output: Output::new(plans, num_partitions),
            old: vec![0.0; block_size],
            new: vec![0.0; block_size],
            contribution: vec![0.0; block_size],
        }
    }
}

/// One source rendered through `O` independent FIR filters, one per
/// loudspeaker output channel, where `O` matches the reproduction setup's
/// channel count.
pub struct GenericFirSource {
    state: SourceState,
    weighting: Sample,
    input: Input,
    channels: Vec<Channel>,
}

impl GenericFirSource {
    pub fn new(plans: Arc<FftPlans>, num_partitions: usize, num_outputs: usize, state: SourceState) -> Self {
        let channels = (0..num_outputs)
            .map(|_| Channel::new(plans.clone(), num_partitions))
            .collect();
        Self {
            state,
            weighting: 0.0,
            input: Input::new(plans, num_partitions),
            channels,
        }
    }

    pub fn set_state(&mut self, state: SourceState) {
        self.state = state;
    }

    /// Installs a full new filter set, one impulse response per output
    /// channel. `filters.len()` must match the number of output channels
    /// this source was constructed with.
    pub fn set_filters(&mut self, filters: &[PartitionedFilter]) {
        debug_assert_eq!(filters.len(), self.channels.len());
        for (channel, filter) in self.channels.iter_mut().zip(filters) {
            channel.output.set_filter(filter);
        }
    }

    /// Renders one period into `output_buses`, one slice per loudspeaker
    /// channel, in the same order as [`Self::set_filters`].
    pub fn process(
        &mut self,
        block: &[Sample],
        reference: Position,
        gain: &GainParams,
        fade_out: &[Sample],
        fade_in: &[Sample],
        output_buses: &mut [&mut [Sample]],
    ) {
        debug_assert_eq!(output_buses.len(), self.channels.len());
        self.input.add_block(block);

        let old_weight = self.weighting;
        let new_weight = weighting_factor(&self.state, reference, gain, false);
        self.weighting = new_weight;

        for (channel, bus) in self.channels.iter_mut().zip(output_buses.iter_mut()) {
            channel.output.rotate_queues();
            let raw = channel.output.convolve(&self.input, 1.0);
            combine_raw_contribution(
                raw,
                old_weight,
                new_weight,
                false,
                fade_out,
                fade_in,
                &mut channel.old,
                &mut channel.new,
                &mut channel.contribution,
                bus,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceModel;
    use ssr_core::Rotation;

    fn state() -> SourceState {
        SourceState {
            gain: 1.0,
            mute: false,
            processing: true,
            active: true,
            model: SourceModel::Point,
            position: Position::new(0.0, 1.0, 0.0),
            orientation: Rotation::identity(),
        }
    }

    fn gain_params() -> GainParams {
        GainParams {
            master_volume: 1.0,
            master_volume_correction_db: 0.0,
            decay_exponent: 1.0,
            amplitude_reference_distance: 1.0,
        }
    }

    #[test]
    fn distributes_identity_filters_to_each_channel_unchanged() {
        let plans = Arc::new(FftPlans::new(8));
        let mut ir = vec![0.0; 8];
        ir[0] = 1.0;
        let identity = PartitionedFilter::prepare(&plans, &ir);
        let mut zero_ir = vec![0.0; 8];
        zero_ir[0] = 0.0;
        let zero = PartitionedFilter::prepare(&plans, &zero_ir);

        let mut source = GenericFirSource::new(plans, 1, 2, state());
        source.set_filters(&[identity, zero]);

        let block = vec![3.0; 8];
        let mut bus_a = vec![0.0; 8];
        let mut bus_b = vec![0.0; 8];
        let fade = vec![1.0; 8];
        {
            let mut buses: Vec<&mut [Sample]> = vec![&mut bus_a, &mut bus_b];
            source.process(&block, Position::new(0.0, 0.0, 0.0), &gain_params(), &fade, &fade, &mut buses);
        }
        // channel A carries the identity filter, channel B is silent.
        assert!(bus_a.iter().any(|&s| s.abs() > 1e-3));
        assert!(bus_b.iter().all(|&s| s.abs() < 1e-6));
    }
}
