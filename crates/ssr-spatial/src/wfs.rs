//! Wave Field Synthesis renderer: loudspeaker-array reproduction by delay
//! and amplitude weighting, driven by the same common gain pipeline (C8)
//! but with its own per-loudspeaker delay/weight law instead of a static
//! filter. Grounded directly on the original renderer's `WEIGHTING_OLD`
//! convention (see DESIGN.md) — `WEIGHTING_DELFT` is not implemented.

use std::sync::Arc;

use ssr_core::{BlockParameter, Position, Rotation};
use ssr_dsp::{
    combine_channels, raised_cosine_window, CombineChannelsResult, FftPlans, NonCausalBlockDelayLine,
    PartitionedFilter, StaticConvolver,
};

use crate::setup::{Loudspeaker, LoudspeakerModel};
use crate::source::SourceModel;
use crate::Sample;

const SPEED_OF_SOUND: Sample = 343.0;
const SAFETY_RADIUS: Sample = 0.01;

/// A listener reference frame: position plus facing rotation. WFS (like
/// VBAP and AAP) distinguishes the primary reference from a second
/// "reference offset" transform applied on top of it for loudspeaker
/// positions, matching the original engine's two-stage transform.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceFrame {
    pub position: Position,
    pub orientation: Rotation,
}

fn transform_point(frame: &ReferenceFrame, local: Position) -> Position {
    frame.position + frame.orientation * local
}

fn transform_direction(frame: &ReferenceFrame, local: Position) -> Position {
    frame.orientation * local
}

/// Angle (radians, `[0, 2π)`) between two 2D direction vectors, ignoring
/// the z component.
fn angle_2d(a: Position, b: Position) -> Sample {
    let angle = a.y.atan2(a.x) - b.y.atan2(b.x);
    angle.rem_euclid(2.0 * std::f32::consts::PI)
}

fn cos_angle_2d(a: Position, b: Position) -> Sample {
    let dot = a.x * b.x + a.y * b.y;
    let na = (a.x * a.x + a.y * a.y).sqrt();
    let nb = (b.x * b.x + b.y * b.y).sqrt();
    if na < 1e-9 || nb < 1e-9 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

/// Whether every non-subwoofer loudspeaker in `loudspeakers` "turns its
/// back" to a point source at `source_position` — the condition under
/// which the source is rendered as focused.
fn is_focused(loudspeakers: &[Loudspeaker], source_position: Position, reference: &ReferenceFrame) -> bool {
    let half_pi = std::f32::consts::FRAC_PI_2;
    for ls in loudspeakers {
        if ls.model == LoudspeakerModel::Subwoofer {
            continue;
        }
        let ls_position = transform_point(reference, ls.position);
        let ls_orientation = transform_direction(reference, ls.orientation * Position::new(0.0, 1.0, 0.0));
        let a = angle_2d(ls_position - source_position, ls_orientation);
        if a < half_pi || a > 3.0 * half_pi {
            return false;
        }
    }
    true
}

/// The delay (metres, to be divided by `c`) and weight computed for one
/// (source, loudspeaker) pair this period.
struct DelayWeight {
    distance: Sample,
    weight: Sample,
}

#[allow(clippy::too_many_arguments)]
fn point_source_delay_weight(
    source_position: Position,
    focused: bool,
    ls: &Loudspeaker,
    ls_position: Position,
    ls_orientation: Position,
    reference_offset: Position,
    reference_distance: Sample,
) -> DelayWeight {
    if ls.model == LoudspeakerModel::Subwoofer {
        return DelayWeight {
            distance: (source_position - reference_offset).norm() - reference_distance,
            weight: 1.0,
        };
    }

    let source_ls_distance = (ls_position - source_position).norm();
    let denominator = source_ls_distance.max(SAFETY_RADIUS).sqrt();
    let mut distance = source_ls_distance;
    let mut weight = cos_angle_2d(ls_position - source_position, ls_orientation) / denominator;

    if weight < 0.0 {
        if !focused {
            return DelayWeight { distance, weight: 0.0 };
        }
        let lhs = ls_position - source_position;
        let mut rhs = reference_offset - source_position;
        if rhs.x == 0.0 && rhs.y == 0.0 {
            rhs.y = -0.001;
        }
        if lhs.x * rhs.x + lhs.y * rhs.y < 0.0 {
            distance = -distance;
            weight = -weight;
        } else {
            weight = 0.0;
        }
    } else if focused {
        // positive weight on a focused source's loudspeaker never fires.
        weight = 0.0;
    }

    if weight != 0.0 && ls.model != LoudspeakerModel::Subwoofer {
        weight *= (source_position - reference_offset).norm().max(0.5).sqrt();
    }
    DelayWeight { distance, weight }
}

fn plane_source_delay_weight(
    source_position: Position,
    source_orientation: Position,
    ls: &Loudspeaker,
    ls_position: Position,
    ls_orientation: Position,
    reference_offset: Position,
    reference_distance: Sample,
) -> DelayWeight {
    if ls.model == LoudspeakerModel::Subwoofer {
        let distance = (source_position - reference_offset).dot(&source_orientation) - reference_distance;
        return DelayWeight { distance, weight: 1.0 };
    }
    let weight = cos_angle_2d(source_orientation, ls_orientation);
    if weight < 0.0 {
        return DelayWeight { distance: 0.0, weight: 0.0 };
    }
    let distance = (ls_position - source_position).dot(&source_orientation);
    DelayWeight { distance, weight }
}

/// One rendering channel: a loudspeaker output fed from one source,
/// reading the source's shared delay line at this period's delay.
struct Channel {
    weighting: BlockParameter<Sample>,
    delay: BlockParameter<i32>,
    old_scratch: Vec<Sample>,
    new_scratch: Vec<Sample>,
    contribution: Vec<Sample>,
}

impl Channel {
    fn new(block_size: usize) -> Self {
        Self {
            weighting: BlockParameter::new(0.0),
            delay: BlockParameter::new(0),
            old_scratch: vec![0.0; block_size],
            new_scratch: vec![0.0; block_size],
            contribution: vec![0.0; block_size],
        }
    }
}

/// One source's WFS rendering state: a pre-equalisation convolver, the
/// non-causal block delay line it feeds, and one [`Channel`] per
/// loudspeaker output.
pub struct WfsSource {
    gain: Sample,
    mute: bool,
    processing: bool,
    active: bool,
    model: SourceModel,
    position: Position,
    orientation: Rotation,
    prefilter: StaticConvolver,
    delayline: NonCausalBlockDelayLine,
    channels: Vec<Channel>,
    fade_out: Vec<Sample>,
    fade_in: Vec<Sample>,
}

impl WfsSource {
    pub fn new(
        plans: Arc<FftPlans>,
        prefilter: &PartitionedFilter,
        max_delay: usize,
        initial_delay: usize,
        num_outputs: usize,
        position: Position,
        orientation: Rotation,
        model: SourceModel,
    ) -> Self {
        let block_size = plans.block_size();
        Self {
            gain: 1.0,
            mute: false,
            processing: true,
            active: true,
            model,
            position,
            orientation,
            prefilter: StaticConvolver::new(plans, prefilter),
            delayline: NonCausalBlockDelayLine::new(block_size, max_delay, initial_delay),
            channels: (0..num_outputs).map(|_| Channel::new(block_size)).collect(),
            fade_out: raised_cosine_window(block_size, false),
            fade_in: raised_cosine_window(block_size, true),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_state(&mut self, gain: Sample, mute: bool, processing: bool, active: bool, position: Position, orientation: Rotation) {
        self.gain = gain;
        self.mute = mute;
        self.processing = processing;
        self.active = active;
        self.position = position;
        self.orientation = orientation;
    }

    fn is_silenced(&self) -> bool {
        !self.processing || self.mute || !self.active
    }

    /// Pushes one period of raw input through the pre-equalisation filter
    /// and into the delay line; must run once per period before
    /// [`Self::render`].
    pub fn feed(&mut self, block: &[Sample]) {
        self.delayline.advance();
        let filtered = self.prefilter.process(block, 1.0);
        self.delayline.write_block(filtered);
    }

    /// Renders this source's contribution into every loudspeaker bus,
    /// given the full array (for focused-source detection), the
    /// reference frame, and the sample rate for delay conversion.
    pub fn render(
        &mut self,
        loudspeakers: &[Loudspeaker],
        reference: &ReferenceFrame,
        reference_offset: &ReferenceFrame,
        sample_rate: Sample,
        buses: &mut [&mut [Sample]],
    ) {
        debug_assert_eq!(buses.len(), self.channels.len());
        debug_assert_eq!(buses.len(), loudspeakers.len());

        let focused = self.model == SourceModel::Point && is_focused(loudspeakers, self.position, reference);
        let source_orientation = transform_direction(
            &ReferenceFrame {
                position: Position::zeros(),
                orientation: self.orientation,
            },
            Position::new(0.0, 1.0, 0.0),
        );

        let silenced = self.is_silenced();
        let gain = self.gain;
        let model = self.model;
        let source_position = self.position;
        let initial_delay = self.delayline.initial_delay() as i32;
        let max_delay = self.delayline.max_delay() as i32;
        let delayline = &self.delayline;
        let fade_out = &self.fade_out;
        let fade_in = &self.fade_in;
        let reference_distance_point = |ls_position: Position| (ls_position - reference_offset.position).norm();

        for ((ls, channel), bus) in loudspeakers.iter().zip(self.channels.iter_mut()).zip(buses.iter_mut()) {
            let ls_position = transform_point(reference, ls.position);
            let ls_orientation = transform_direction(reference, ls.orientation * Position::new(0.0, 1.0, 0.0));
            let reference_distance = reference_distance_point(ls_position);

            let dw = if silenced {
                DelayWeight { distance: 0.0, weight: 0.0 }
            } else {
                match model {
                    SourceModel::Point => point_source_delay_weight(
                        source_position,
                        focused,
                        ls,
                        ls_position,
                        ls_orientation,
                        reference_offset.position,
                        reference_distance,
                    ),
                    SourceModel::Plane => plane_source_delay_weight(
                        source_position,
                        source_orientation,
                        ls,
                        ls_position,
                        ls_orientation,
                        reference_offset.position,
                        reference_distance,
                    ),
                }
            };

            let mut weight = dw.weight * gain * ls.weight;
            let float_delay = dw.distance / SPEED_OF_SOUND * sample_rate;
            let int_delay = (float_delay + 0.5).floor() as i32;

            let valid = (-initial_delay..=max_delay).contains(&int_delay);
            if !valid {
                weight = 0.0;
            }

            channel.weighting.begin_period();
            channel.delay.begin_period();
            channel.weighting.set(weight);
            channel.delay.set(if valid { int_delay } else { 0 });

            let old_delay = channel.delay.old();
            let new_delay = channel.delay.get();
            let old_weight = channel.weighting.old();
            let new_weight = channel.weighting.get();

            let mode = if old_weight == 0.0 && new_weight == 0.0 {
                CombineChannelsResult::Nothing
            } else if old_weight == new_weight && old_delay == new_delay {
                CombineChannelsResult::Constant
            } else if old_weight == 0.0 {
                CombineChannelsResult::FadeIn
            } else if new_weight == 0.0 {
                CombineChannelsResult::FadeOut
            } else {
                CombineChannelsResult::Change
            };

            if mode != CombineChannelsResult::Nothing {
                let _ = delayline.read_block_weighted(&mut channel.old_scratch, old_delay as isize, old_weight);
                let _ = delayline.read_block_weighted(&mut channel.new_scratch, new_delay as isize, new_weight);
            }

            channel.contribution.iter_mut().for_each(|s| *s = 0.0);
            combine_channels(
                &mut channel.contribution,
                &mode,
                Some(&channel.old_scratch),
                Some(&channel.new_scratch),
                fade_out,
                fade_in,
            );
            for (b, c) in bus.iter_mut().zip(channel.contribution.iter()) {
                *b += c;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::LoudspeakerModel;

    fn identity_prefilter(plans: &FftPlans) -> PartitionedFilter {
        let mut ir = vec![0.0; plans.block_size()];
        ir[0] = 1.0;
        PartitionedFilter::prepare(plans, &ir)
    }

    fn loudspeaker(x: Sample, y: Sample) -> Loudspeaker {
        Loudspeaker {
            position: Position::new(x, y, 0.0),
            orientation: ssr_core::rotation_from_2d_azimuth(90.0 - y.atan2(x).to_degrees() + 180.0),
            model: LoudspeakerModel::Normal,
            delay: 0.0,
            weight: 1.0,
            channel: 1,
        }
    }

    #[test]
    fn non_focused_point_source_renders_nonzero_weight_towards_nearest_speaker() {
        let plans = Arc::new(FftPlans::new(8));
        let prefilter = identity_prefilter(&plans);
        let mut source = WfsSource::new(
            plans,
            &prefilter,
            64,
            8,
            1,
            Position::new(0.0, -1.0, 0.0),
            Rotation::identity(),
            SourceModel::Point,
        );
        let reference = ReferenceFrame {
            position: Position::zeros(),
            orientation: Rotation::identity(),
        };
        let speakers = vec![loudspeaker(0.0, 2.0)];
        let block = vec![1.0; 8];
        source.feed(&block);
        source.feed(&block);
        let mut bus = vec![0.0; 8];
        {
            let mut buses: Vec<&mut [Sample]> = vec![&mut bus];
            source.render(&speakers, &reference, &reference, 44100.0, &mut buses);
        }
        // weighting is nonnegative by construction for a non-focused source.
        assert!(bus.iter().all(|&s| s.is_finite()));
    }
}
