//! Binaural and BRS (Binaural Room Synthesis) renderers: every source is
//! convolved with a pair of head-related (or room) impulse responses
//! selected by relative azimuth, decoded straight to the listener's ears.
//!
//! Both renderers share the same per-source pipeline; they differ only in
//! where the HRTF set comes from and what drives the selection index. The
//! plain binaural renderer looks up a shared, scene-wide HRTF set by the
//! source's position relative to the listener; BRS gives each source its
//! own room-impulse-response set and selects by listener rotation alone,
//! ignoring source position entirely.

use std::sync::Arc;

use ssr_core::{Position, Result, Rotation};
use ssr_dsp::{FftPlans, Input, Output, PartitionedFilter};

use crate::source::{combine_raw_contribution, weighting_factor, GainParams, SourceModel, SourceState};
use crate::Sample;

/// A set of `A` head-related impulse response pairs, indexed by azimuth.
/// Loaded once, non-realtime, from `2·A` interleaved channels (left/right
/// alternating) of equal-length impulse responses.
pub struct HrtfSet {
    num_angles: usize,
    left: Vec<PartitionedFilter>,
    right: Vec<PartitionedFilter>,
}

impl HrtfSet {
    /// Builds a set from `channels`, where `channels[2*i]` is the left ear
    /// and `channels[2*i+1]` the right ear impulse response for angle `i`.
    pub fn from_interleaved_channels(plans: &FftPlans, channels: &[Vec<Sample>]) -> Result<Self> {
        if channels.is_empty() || channels.len() % 2 != 0 {
            return Err(ssr_core::Error::Configuration(
                "HRTF data must hold an even, non-zero number of channels (interleaved left/right)".to_string(),
            ));
        }
        let num_angles = channels.len() / 2;
        let mut left = Vec::with_capacity(num_angles);
        let mut right = Vec::with_capacity(num_angles);
        for pair in channels.chunks(2) {
            left.push(PartitionedFilter::prepare(plans, &pair[0]));
            right.push(PartitionedFilter::prepare(plans, &pair[1]));
        }
        Ok(Self {
            num_angles,
            left,
            right,
        })
    }

    pub fn num_angles(&self) -> usize {
        self.num_angles
    }

    pub fn left(&self, index: usize) -> &PartitionedFilter {
        &self.left[index]
    }

    pub fn right(&self, index: usize) -> &PartitionedFilter {
        &self.right[index]
    }

    /// Maps a relative azimuth (degrees, mathematical convention) onto the
    /// nearest of the `A` stored angles, wrapping around the circle:
    /// `wrap(azimuth · A / 360 + 0.5, A)`.
    pub fn index_for_azimuth(&self, azimuth_deg: Sample) -> usize {
        let a = self.num_angles as Sample;
        let raw = azimuth_deg * a / 360.0 + 0.5;
        let wrapped = raw.rem_euclid(a);
        (wrapped.floor() as usize).min(self.num_angles - 1)
    }
}

/// A single-sample impulse (identity filter), used to blend towards an
/// unfiltered signal when a source is nearer than half a metre to the
/// listener.
pub fn neutral_filter(plans: &FftPlans) -> PartitionedFilter {
    let mut ir = vec![0.0; plans.block_size()];
    ir[0] = 1.0;
    PartitionedFilter::prepare(plans, &ir)
}

/// Converts a 2D direction (x, y) into an azimuth in degrees, mathematical
/// convention (zero along +x, increasing counter-clockwise).
fn azimuth_deg_of(x: Sample, y: Sample) -> Sample {
    90.0 - y.atan2(x).to_degrees()
}

/// The relative azimuth (degrees) used to index an [`HrtfSet`]: the
/// source's direction expressed in the listener's local frame, offset by
/// 180° for plane waves (whose orientation names the propagation
/// direction, not the direction the sound arrives *from*).
fn relative_azimuth(state: &SourceState, reference: Position, listener_rotation: Rotation) -> Sample {
    let inverse = listener_rotation.inverse();
    match state.model {
        SourceModel::Point => {
            let local = inverse * (state.position - reference);
            azimuth_deg_of(local.x, local.y)
        }
        SourceModel::Plane => {
            let forward = state.orientation * Position::new(0.0, 1.0, 0.0);
            let local = inverse * forward;
            azimuth_deg_of(local.x, local.y) + 180.0
        }
    }
}

/// How near-head blending towards [`neutral_filter`] should weight the
/// dirac contribution: `0` beyond half a metre, rising linearly to `1` at
/// zero distance.
fn near_head_interpolation(state: &SourceState, reference: Position) -> Sample {
    let distance = (state.position - reference).norm();
    (1.0 - 2.0 * distance).clamp(0.0, 1.0)
}

/// Per-ear scratch buffers and convolver output stage. One of these feeds
/// each ear from one [`BinauralSource`].
struct Ear {
    hrtf: Output,
    dirac: Output,
    blended: Vec<Sample>,
    old: Vec<Sample>,
    new: Vec<Sample>,
    contribution: Vec<Sample>,
}

impl Ear {
    fn new(plans: Arc<FftPlans>, num_partitions: usize, dirac: &PartitionedFilter) -> Self {
        let block_size = plans.block_size();
        let mut dirac_output = Output::new(plans.clone(), num_partitions);
        dirac_output.set_filter(dirac);
        for _ in 0..num_partitions {
            dirac_output.rotate_queues();
        }
        Self {
            hrtf: Output::new(plans, num_partitions),
            dirac: dirac_output,
            blended: vec![0.0; block_size],
            old: vec![0.0; block_size],
            new: vec![0.0; block_size],
            contribution: vec![0.0; block_size],
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process(
        &mut self,
        input: &Input,
        interpolation: Sample,
        old_weight: Sample,
        new_weight: Sample,
        filter_changed: bool,
        fade_out: &[Sample],
        fade_in: &[Sample],
        bus: &mut [Sample],
    ) {
        self.hrtf.rotate_queues();
        self.dirac.rotate_queues();
        let raw_hrtf = self.hrtf.convolve(input, 1.0);
        for (b, &h) in self.blended.iter_mut().zip(raw_hrtf.iter()) {
            *b = h * (1.0 - interpolation);
        }
        if interpolation > 0.0 {
            let raw_dirac = self.dirac.convolve(input, 1.0);
            for (b, &d) in self.blended.iter_mut().zip(raw_dirac.iter()) {
                *b += d * interpolation;
            }
        }
        combine_raw_contribution(
            &self.blended,
            old_weight,
            new_weight,
            filter_changed,
            fade_out,
            fade_in,
            &mut self.old,
            &mut self.new,
            &mut self.contribution,
            bus,
        );
    }
}

/// One source rendered through a shared, scene-wide [`HrtfSet`]: the
/// plain binaural renderer. Filter selection tracks the source's position
/// relative to the listener.
pub struct BinauralSource {
    state: SourceState,
    weighting: Sample,
    hrtf_index: Option<usize>,
    input: Input,
    left: Ear,
    right: Ear,
}

impl BinauralSource {
    pub fn new(plans: Arc<FftPlans>, num_partitions: usize, dirac: &PartitionedFilter, state: SourceState) -> Self {
        Self {
            state,
            weighting: 0.0,
            hrtf_index: None,
            input: Input::new(plans.clone(), num_partitions),
            left: Ear::new(plans.clone(), num_partitions, dirac),
            right: Ear::new(plans, num_partitions, dirac),
        }
    }

    pub fn set_state(&mut self, state: SourceState) {
        self.state = state;
    }

    /// Renders one period of this source into `(left_bus, right_bus)`.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        block: &[Sample],
        reference: Position,
        listener_rotation: Rotation,
        hrtf: &HrtfSet,
        gain: &GainParams,
        fade_out: &[Sample],
        fade_in: &[Sample],
        left_bus: &mut [Sample],
        right_bus: &mut [Sample],
    ) {
        self.input.add_block(block);

        let azimuth = relative_azimuth(&self.state, reference, listener_rotation);
        let new_index = hrtf.index_for_azimuth(azimuth);
        let filter_changed = self.hrtf_index != Some(new_index);
        if filter_changed {
            self.left.hrtf.set_filter(hrtf.left(new_index));
            self.right.hrtf.set_filter(hrtf.right(new_index));
            self.hrtf_index = Some(new_index);
        }

        let old_weight = self.weighting;
        let new_weight = weighting_factor(&self.state, reference, gain, true);
        self.weighting = new_weight;

        let interpolation = near_head_interpolation(&self.state, reference);

        self.left.process(
            &self.input,
            interpolation,
            old_weight,
            new_weight,
            filter_changed,
            fade_out,
            fade_in,
            left_bus,
        );
        self.right.process(
            &self.input,
            interpolation,
            old_weight,
            new_weight,
            filter_changed,
            fade_out,
            fade_in,
            right_bus,
        );
    }
}

/// A BRS (Binaural Room Synthesis) source: carries its own `2·A`-channel
/// set of room impulse responses, indexed purely by listener rotation
/// (source position is ignored — a fixed loudspeaker position is baked
/// into the recorded impulse responses themselves).
pub struct BrsSource {
    state: SourceState,
    weighting: Sample,
    brir_index: Option<usize>,
    input: Input,
    left: Ear,
    right: Ear,
    brir: HrtfSet,
}

impl BrsSource {
    pub fn new(plans: Arc<FftPlans>, num_partitions: usize, dirac: &PartitionedFilter, brir: HrtfSet, state: SourceState) -> Self {
        Self {
            state,
            weighting: 0.0,
            brir_index: None,
            input: Input::new(plans.clone(), num_partitions),
            left: Ear::new(plans.clone(), num_partitions, dirac),
            right: Ear::new(plans, num_partitions, dirac),
            brir,
        }
    }

    pub fn set_state(&mut self, state: SourceState) {
        self.state = state;
    }

    /// Index is driven solely by `listener_rotation`; unlike
    /// [`BinauralSource`], no distance-based near-head blend applies,
    /// since the room impulse responses already encode the acoustic
    /// environment at a fixed listening position.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        block: &[Sample],
        reference: Position,
        listener_rotation: Rotation,
        gain: &GainParams,
        fade_out: &[Sample],
        fade_in: &[Sample],
        left_bus: &mut [Sample],
        right_bus: &mut [Sample],
    ) {
        self.input.add_block(block);

        let forward = listener_rotation.inverse() * Position::new(0.0, 1.0, 0.0);
        let azimuth = azimuth_deg_of(forward.x, forward.y);
        let new_index = self.brir.index_for_azimuth(azimuth);
        let filter_changed = self.brir_index != Some(new_index);
        if filter_changed {
            self.left.hrtf.set_filter(self.brir.left(new_index));
            self.right.hrtf.set_filter(self.brir.right(new_index));
            self.brir_index = Some(new_index);
        }

        let old_weight = self.weighting;
        let new_weight = weighting_factor(&self.state, reference, gain, false);
        self.weighting = new_weight;

        self.left.process(
            &self.input,
            0.0,
            old_weight,
            new_weight,
            filter_changed,
            fade_out,
            fade_in,
            left_bus,
        );
        self.right.process(
            &self.input,
            0.0,
            old_weight,
            new_weight,
            filter_changed,
            fade_out,
            fade_in,
            right_bus,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plans() -> Arc<FftPlans> {
        Arc::new(FftPlans::new(8))
    }

    fn source_state(position: Position) -> SourceState {
        SourceState {
            gain: 1.0,
            mute: false,
            processing: true,
            active: true,
            model: SourceModel::Point,
            position,
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
    fn hrtf_set_rejects_odd_channel_count() {
        let p = plans();
        let channels = vec![vec![0.0; 8]; 3];
        assert!(HrtfSet::from_interleaved_channels(&p, &channels).is_err());
    }

    #[test]
    fn index_for_azimuth_wraps_around_the_circle() {
        let p = plans();
        let channels = vec![vec![0.0; 8]; 8]; // 4 angles
        let set = HrtfSet::from_interleaved_channels(&p, &channels).unwrap();
        assert_eq!(set.num_angles(), 4);
        assert_eq!(set.index_for_azimuth(0.0), 0);
        assert_eq!(set.index_for_azimuth(350.0), 0);
        assert_eq!(set.index_for_azimuth(90.0), 1);
    }

    #[test]
    fn near_head_interpolation_is_zero_beyond_half_a_metre() {
        let state = source_state(Position::new(1.0, 0.0, 0.0));
        assert_eq!(near_head_interpolation(&state, Position::new(0.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn near_head_interpolation_is_one_at_zero_distance() {
        let state = source_state(Position::new(0.0, 0.0, 0.0));
        assert_eq!(near_head_interpolation(&state, Position::new(0.0, 0.0, 0.0)), 1.0);
    }

    #[test]
    fn binaural_source_renders_silence_for_muted_source() {
        let p = plans();
        let channels = vec![vec![0.0; 8]; 8];
        let hrtf = HrtfSet::from_interleaved_channels(&p, &channels).unwrap();
        let dirac = neutral_filter(&p);
        let mut state = source_state(Position::new(2.0, 0.0, 0.0));
        state.mute = true;
        let mut source = BinauralSource::new(p, 3, &dirac, state);

        let block = vec![1.0; 8];
        let mut left_bus = vec![0.0; 8];
        let mut right_bus = vec![0.0; 8];
        let fade = vec![1.0; 8];
        source.process(
            &block,
            Position::new(0.0, 0.0, 0.0),
            Rotation::identity(),
            &hrtf,
            &gain_params(),
            &fade,
            &fade,
            &mut left_bus,
            &mut right_bus,
        );
        assert!(left_bus.iter().all(|&s| s == 0.0));
        assert!(right_bus.iter().all(|&s| s == 0.0));
    }
}
