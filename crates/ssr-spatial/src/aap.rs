//! Ambisonics Amplitude Panning renderer: every loudspeaker gets a weight
//! from a closed-form directivity function of the angle between its
//! azimuth and the source's, masked by per-sample linear interpolation
//! rather than a crossfade.

use ssr_core::{azimuth_2d_from_rotation, Position, Rotation};

use crate::setup::{Loudspeaker, LoudspeakerModel};
use crate::source::SourceModel;
use crate::Sample;

/// In-phase vs. max-rE directivity, selected per renderer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directivity {
    InPhase,
    MaxRe,
}

/// `cos((α - θ)/2)^(2M)`.
fn in_phase_weight(alpha: Sample, theta: Sample, order: u32) -> Sample {
    ((alpha - theta) / 2.0).cos().powi(2 * order as i32)
}

/// `sin((2M+1)(α-θ)/2) / ((2M+1)·sin((α-θ)/2))`, falling back to `1` at
/// the removable singularity where `α == θ`.
fn max_re_weight(alpha: Sample, theta: Sample, order: u32) -> Sample {
    let half_diff = (alpha - theta) / 2.0;
    let denominator = (2 * order + 1) as Sample * half_diff.sin();
    if denominator.abs() < 1e-6 {
        return 1.0;
    }
    (((2 * order + 1) as Sample * half_diff).sin()) / denominator
}

/// The non-subwoofer loudspeaker ring an AAP renderer decodes onto: their
/// azimuths around the reference, plus the Ambisonics order (default
/// `(L-1)/2` for `L` loudspeakers, per the decoder's usual rule of
/// thumb).
pub struct Decoder {
    output_indices: Vec<usize>,
    azimuths: Vec<Sample>,
    order: u32,
    directivity: Directivity,
}

impl Decoder {
    pub fn build(loudspeakers: &[Loudspeaker], reference_orientation: Rotation, order: Option<u32>, directivity: Directivity) -> Self {
        let mut output_indices = Vec::new();
        let mut azimuths = Vec::new();
        for (i, ls) in loudspeakers.iter().enumerate() {
            if ls.model == LoudspeakerModel::Subwoofer {
                continue;
            }
            // AAP decodes onto each loudspeaker's own stated orientation,
            // not its bearing from the reference (unlike VBAP's ring,
            // which is legitimately position-relative).
            let local_orientation = reference_orientation.inverse() * ls.orientation;
            output_indices.push(i);
            azimuths.push(azimuth_2d_from_rotation(local_orientation).to_radians());
        }
        let l = output_indices.len().max(1) as u32;
        let order = order.unwrap_or((l.saturating_sub(1)) / 2).max(0);
        Self {
            output_indices,
            azimuths,
            order,
            directivity,
        }
    }

    fn weight_for(&self, alpha: Sample, theta: Sample) -> Sample {
        match self.directivity {
            Directivity::InPhase => in_phase_weight(alpha, theta, self.order),
            Directivity::MaxRe => max_re_weight(alpha, theta, self.order),
        }
    }
}

/// One source's per-output weight vector, recomputed every period and
/// linearly interpolated sample-by-sample from the previous period's
/// values by [`AapSource::render`].
pub struct AapSource {
    model: SourceModel,
    weights: Vec<Sample>,
    previous_weights: Vec<Sample>,
}

impl AapSource {
    pub fn new(num_outputs: usize, model: SourceModel) -> Self {
        Self {
            model,
            weights: vec![0.0; num_outputs],
            previous_weights: vec![0.0; num_outputs],
        }
    }

    pub fn update(
        &mut self,
        decoder: &Decoder,
        source_position: Position,
        source_orientation: Rotation,
        reference: Position,
        reference_orientation: Rotation,
        gain: Sample,
    ) {
        std::mem::swap(&mut self.previous_weights, &mut self.weights);
        self.weights.iter_mut().for_each(|w| *w = 0.0);

        let direction = match self.model {
            SourceModel::Point => source_position - reference,
            SourceModel::Plane => source_orientation * Position::new(0.0, -1.0, 0.0),
        };
        let local = reference_orientation.inverse() * direction;
        let theta = local.y.atan2(local.x);

        for (output_index, &alpha) in decoder.output_indices.iter().zip(decoder.azimuths.iter()) {
            self.weights[*output_index] = decoder.weight_for(alpha, theta) * gain;
        }
    }

    pub fn render(&self, block: &[Sample], buses: &mut [&mut [Sample]]) {
        let n = block.len().max(1);
        for ((bus, &w_old), &w_new) in buses.iter_mut().zip(self.previous_weights.iter()).zip(self.weights.iter()) {
            if w_old == 0.0 && w_new == 0.0 {
                continue;
            }
            for (i, (b, &s)) in bus.iter_mut().zip(block.iter()).enumerate() {
                let t = i as Sample / n as Sample;
                let w = w_old + (w_new - w_old) * t;
                *b += s * w;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loudspeaker_at(azimuth_deg: Sample) -> Loudspeaker {
        let rad = azimuth_deg.to_radians();
        Loudspeaker {
            position: Position::new(rad.cos(), rad.sin(), 0.0),
            orientation: ssr_core::rotation_from_2d_azimuth(azimuth_deg),
            model: LoudspeakerModel::Normal,
            delay: 0.0,
            weight: 1.0,
            channel: 1,
        }
    }

    #[test]
    fn default_order_follows_loudspeaker_count() {
        let speakers: Vec<_> = (0..5).map(|i| loudspeaker_at(i as Sample * 72.0)).collect();
        let decoder = Decoder::build(&speakers, Rotation::identity(), None, Directivity::MaxRe);
        assert_eq!(decoder.order, 2); // (5-1)/2
    }

    #[test]
    fn max_re_weight_is_one_at_the_singularity() {
        assert_eq!(max_re_weight(0.0, 0.0, 2), 1.0);
    }

    #[test]
    fn in_phase_weight_peaks_towards_the_source() {
        let on_axis = in_phase_weight(0.0, 0.0, 2);
        let off_axis = in_phase_weight(std::f32::consts::PI, 0.0, 2);
        assert!(on_axis > off_axis);
    }

    #[test]
    fn source_aimed_at_a_loudspeaker_weights_it_most() {
        let speakers: Vec<_> = (0..4).map(|i| loudspeaker_at(i as Sample * 90.0)).collect();
        let decoder = Decoder::build(&speakers, Rotation::identity(), Some(1), Directivity::InPhase);
        let mut source = AapSource::new(4, SourceModel::Point);
        source.update(&decoder, Position::new(5.0, 0.0, 0.0), Rotation::identity(), Position::zeros(), Rotation::identity(), 1.0);
        let max_index = source
            .weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(max_index, 0);
    }
}
