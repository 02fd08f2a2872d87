//! Vector Base Amplitude Panning renderer: sources are panned between the
//! two loudspeakers of whichever adjacent pair, sorted by azimuth around
//! the listener reference, brackets the source's incidence angle.

use ssr_core::{Position, Rotation};

use crate::setup::{Loudspeaker, LoudspeakerModel};
use crate::source::SourceModel;
use crate::Sample;

const TWO_PI: Sample = std::f32::consts::TAU;

/// One non-subwoofer loudspeaker as VBAP sees it: its output index and
/// azimuth (radians, `[0, 2π)`) around the reference.
#[derive(Debug, Clone, Copy)]
struct RingSpeaker {
    output_index: usize,
    azimuth: Sample,
}

/// An adjacent pair in the sorted ring, with its validity for direct
/// (non-overhang) panning.
#[derive(Debug, Clone, Copy)]
struct Pair {
    first: usize,
    second: usize,
    span: Sample,
    valid: bool,
}

/// The loudspeaker ring a VBAP renderer pans across: built once from the
/// reproduction setup's non-subwoofer loudspeakers, re-sorted only when a
/// reference change makes the stored order wrap around 0.
pub struct Ring {
    speakers: Vec<RingSpeaker>,
    pairs: Vec<Pair>,
    max_angle: Sample,
    overhang_angle: Sample,
}

fn azimuth_of(position: Position, reference: Position, reference_orientation: Rotation) -> Sample {
    let local = reference_orientation.inverse() * (position - reference);
    local.y.atan2(local.x).rem_euclid(TWO_PI)
}

impl Ring {
    pub fn build(
        loudspeakers: &[Loudspeaker],
        reference: Position,
        reference_orientation: Rotation,
        max_angle: Sample,
        overhang_angle: Sample,
    ) -> Self {
        let mut speakers: Vec<RingSpeaker> = loudspeakers
            .iter()
            .enumerate()
            .filter(|(_, ls)| ls.model != LoudspeakerModel::Subwoofer)
            .map(|(i, ls)| RingSpeaker {
                output_index: i,
                azimuth: azimuth_of(ls.position, reference, reference_orientation),
            })
            .collect();
        speakers.sort_by(|a, b| a.azimuth.partial_cmp(&b.azimuth).unwrap());

        let mut ring = Self {
            speakers,
            pairs: Vec::new(),
            max_angle,
            overhang_angle,
        };
        ring.rebuild_pairs();
        ring
    }

    fn rebuild_pairs(&mut self) {
        let n = self.speakers.len();
        self.pairs.clear();
        if n < 2 {
            return;
        }
        for i in 0..n {
            let j = (i + 1) % n;
            let mut span = self.speakers[j].azimuth - self.speakers[i].azimuth;
            if span < 0.0 {
                span += TWO_PI;
            }
            self.pairs.push(Pair {
                first: i,
                second: j,
                span,
                valid: span <= self.max_angle,
            });
        }
    }

    /// Re-sorts from scratch if the new reference changes the ring's
    /// angular order enough to wrap around 0; otherwise updates the
    /// stored azimuths in place and leaves the sort order untouched.
    pub fn update_reference(&mut self, loudspeakers: &[Loudspeaker], reference: Position, reference_orientation: Rotation) {
        let mut new_azimuths = Vec::with_capacity(self.speakers.len());
        for speaker in &self.speakers {
            new_azimuths.push(azimuth_of(loudspeakers[speaker.output_index].position, reference, reference_orientation));
        }

        let wrapped = self
            .speakers
            .iter()
            .zip(&new_azimuths)
            .any(|(s, &new_az)| (new_az - s.azimuth).abs() > std::f32::consts::PI);

        for (speaker, &new_az) in self.speakers.iter_mut().zip(&new_azimuths) {
            speaker.azimuth = new_az;
        }

        if wrapped {
            self.speakers.sort_by(|a, b| a.azimuth.partial_cmp(&b.azimuth).unwrap());
        }
        self.rebuild_pairs();
    }

    /// Finds the pair whose arc contains `incidence`, and the two weights
    /// (for `pair.first`/`pair.second`) that place a source exactly there.
    /// Invalid (too-wide) pairs fall back to a raised-cosine overhang
    /// window instead of the standard two-speaker solve.
    fn solve(&self, incidence: Sample) -> Option<(usize, Sample, usize, Sample)> {
        for pair in &self.pairs {
            let a = self.speakers[pair.first].azimuth;
            let mut offset = incidence - a;
            if offset < 0.0 {
                offset += TWO_PI;
            }
            if offset > pair.span {
                continue;
            }

            if pair.valid {
                let sin_span = pair.span.sin();
                let (w_first, w_second) = if sin_span.abs() > 1e-6 {
                    let t = offset / pair.span;
                    (
                        (pair.span * (1.0 - t)).sin() / sin_span,
                        (pair.span * t).sin() / sin_span,
                    )
                } else {
                    (1.0, 0.0)
                };
                return Some((pair.first, w_first, pair.second, w_second));
            } else {
                // raised-cosine overhang: weight decays to 0 at the far
                // edge of `overhang_angle` beyond each loudspeaker.
                let w_first = if offset <= self.overhang_angle {
                    0.5 + 0.5 * (std::f32::consts::PI * offset / self.overhang_angle).cos()
                } else {
                    0.0
                };
                let remaining = pair.span - offset;
                let w_second = if remaining <= self.overhang_angle {
                    0.5 + 0.5 * (std::f32::consts::PI * remaining / self.overhang_angle).cos()
                } else {
                    0.0
                };
                return Some((pair.first, w_first, pair.second, w_second));
            }
        }
        None
    }
}

/// One source's pan state: the two active loudspeaker output indices and
/// their current/previous weight, linearly interpolated per-sample by the
/// caller (no crossfade — stationary sources stay coherent).
pub struct VbapSource {
    model: SourceModel,
    weights: Vec<Sample>,
    previous_weights: Vec<Sample>,
}

impl VbapSource {
    pub fn new(num_outputs: usize, model: SourceModel) -> Self {
        Self {
            model,
            weights: vec![0.0; num_outputs],
            previous_weights: vec![0.0; num_outputs],
        }
    }

    /// Recomputes this period's weight vector from the source's position
    /// relative to the (possibly reference-offset) listener frame.
    pub fn update(
        &mut self,
        ring: &Ring,
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
        let incidence = local.y.atan2(local.x).rem_euclid(TWO_PI);

        if let Some((first, w_first, second, w_second)) = ring.solve(incidence) {
            self.weights[ring.speakers[first].output_index] = w_first * gain;
            self.weights[ring.speakers[second].output_index] = w_second * gain;
        }
    }

    /// Renders this period's contribution into `buses`, one slice per
    /// output channel, with the weight linearly interpolated from the
    /// previous period's value across the block.
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
    use approx::assert_relative_eq;

    fn loudspeaker_at(azimuth_deg: Sample) -> Loudspeaker {
        let rad = azimuth_deg.to_radians();
        Loudspeaker {
            position: Position::new(rad.cos(), rad.sin(), 0.0),
            orientation: Rotation::identity(),
            model: LoudspeakerModel::Normal,
            delay: 0.0,
            weight: 1.0,
            channel: 1,
        }
    }

    #[test]
    fn ring_marks_wide_gaps_invalid() {
        let speakers = vec![loudspeaker_at(0.0), loudspeaker_at(90.0), loudspeaker_at(200.0)];
        let ring = Ring::build(&speakers, Position::zeros(), Rotation::identity(), std::f32::consts::PI, 0.2);
        let wide = ring.pairs.iter().find(|p| p.span > std::f32::consts::PI);
        assert!(wide.is_some());
        assert!(!wide.unwrap().valid);
    }

    #[test]
    fn source_between_two_speakers_activates_only_those_two() {
        let speakers = vec![loudspeaker_at(0.0), loudspeaker_at(90.0), loudspeaker_at(180.0), loudspeaker_at(270.0)];
        let ring = Ring::build(&speakers, Position::zeros(), Rotation::identity(), std::f32::consts::PI, 0.2);
        let mut source = VbapSource::new(4, SourceModel::Point);
        // place the source at azimuth 45 degrees (between speaker 0 and 1).
        let rad: Sample = 45f32.to_radians();
        source.update(
            &ring,
            Position::new(rad.cos() * 5.0, rad.sin() * 5.0, 0.0),
            Rotation::identity(),
            Position::zeros(),
            Rotation::identity(),
            1.0,
        );
        let active = source.weights.iter().filter(|&&w| w > 1e-6).count();
        assert_eq!(active, 2);
    }

    #[test]
    fn two_speaker_solve_follows_the_tangent_law_not_equal_power() {
        let speakers = vec![
            loudspeaker_at(30.0),
            loudspeaker_at(100.0),
            loudspeaker_at(190.0),
            loudspeaker_at(330.0),
        ];
        let ring = Ring::build(&speakers, Position::zeros(), Rotation::identity(), std::f32::consts::PI, 0.2);
        let rad: Sample = 70f32.to_radians();
        let (first, w_first, second, w_second) = ring.solve(rad.rem_euclid(TWO_PI)).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_relative_eq!(w_first, 0.5321, epsilon = 1e-3);
        assert_relative_eq!(w_second, 0.6840, epsilon = 1e-3);
    }
}
