//! Common source lifecycle and gain pipeline (C8), shared by every
//! renderer backend in [`crate`].

use std::sync::atomic::{AtomicU64, Ordering};

use ssr_core::{Position, Rotation};
use ssr_dsp::{combine_channels, CombineChannelsResult, Input, Output};

use crate::Sample;

/// How a source's wavefront is modeled for the distance law and, in WFS,
/// the wave shape itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceModel {
    Point,
    Plane,
}

/// The renderer-independent half of a source's per-period state: the
/// scene-graph facts every backend needs to compute its weighting
/// factor, regardless of what it then does with that factor.
#[derive(Debug, Clone, Copy)]
pub struct SourceState {
    pub gain: Sample,
    pub mute: bool,
    pub processing: bool,
    pub active: bool,
    pub model: SourceModel,
    pub position: Position,
    /// Propagation direction for plane-wave sources; ignored for point
    /// sources.
    pub orientation: Rotation,
}

/// Gain-pipeline parameters shared across all renderers, typically
/// sourced from engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct GainParams {
    pub master_volume: Sample,
    pub master_volume_correction_db: Sample,
    pub decay_exponent: Sample,
    pub amplitude_reference_distance: Sample,
}

impl GainParams {
    fn master_volume_correction_linear(&self) -> Sample {
        10f32.powf(self.master_volume_correction_db / 20.0)
    }
}

/// Computes the common weighting factor. Zero when the source isn't
/// processing, is muted, or is inactive; otherwise gain × master volume
/// × the master volume correction, further scaled by the inverse-distance
/// law for point sources when `apply_distance_model` is set (BRS and
/// Generic FIR leave it unset: their filter selection already encodes
/// distance, or ignores it entirely).
pub fn weighting_factor(
    state: &SourceState,
    reference: Position,
    params: &GainParams,
    apply_distance_model: bool,
) -> Sample {
    if !state.processing || state.mute || !state.active {
        return 0.0;
    }
    let mut factor = state.gain * params.master_volume * params.master_volume_correction_linear();
    if apply_distance_model && state.model == SourceModel::Point {
        let r = (state.position - reference).norm().max(0.5);
        factor *= r.powf(-params.decay_exponent) * params.amplitude_reference_distance.powf(params.decay_exponent);
    }
    factor
}

/// Chooses the combine-channel mode for one (source, output) pair, given
/// its previous and current weighting factor and whether its underlying
/// filter/delay selection changed independently of the weight itself.
pub fn classify_weight_transition(old: Sample, new: Sample, selection_changed: bool) -> CombineChannelsResult {
    let was_active = old != 0.0;
    let is_active = new != 0.0;
    match (was_active, is_active) {
        (false, false) => CombineChannelsResult::Nothing,
        (true, true) if selection_changed => CombineChannelsResult::Change,
        (true, true) => CombineChannelsResult::Constant,
        (false, true) => CombineChannelsResult::FadeIn,
        (true, false) => CombineChannelsResult::FadeOut,
    }
}

/// Generates process-local, monotonically increasing ids for anonymous
/// sources (`.ssr:<n>`), one instance per engine.
pub struct SourceIdGenerator {
    next: AtomicU64,
}

impl SourceIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!(".ssr:{n}")
    }
}

impl Default for SourceIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `requested` unchanged unless empty, in which case a fresh id
/// is generated.
pub fn resolve_source_id(generator: &SourceIdGenerator, requested: &str) -> String {
    if requested.is_empty() {
        generator.next_id()
    } else {
        requested.to_string()
    }
}

/// Convolves `input` through `output` once (unweighted), derives the
/// period's old- and new-weight contributions from that single pass, and
/// crossfades between them according to `classify_weight_transition`
/// before summing into `bus`. Shared by every renderer whose output
/// stage is a partitioned convolver (binaural, BRS, generic FIR, WFS's
/// pre-filter). Every slice argument must already be sized to the
/// engine's block size; nothing here allocates.
#[allow(clippy::too_many_arguments)]
pub fn render_contribution(
    output: &mut Output,
    input: &Input,
    old_weight: Sample,
    new_weight: Sample,
    filter_changed: bool,
    fade_out: &[Sample],
    fade_in: &[Sample],
    scratch_old: &mut [Sample],
    scratch_new: &mut [Sample],
    scratch_contribution: &mut [Sample],
    bus: &mut [Sample],
) {
    output.rotate_queues();
    let raw = output.convolve(input, 1.0);
    combine_raw_contribution(
        raw,
        old_weight,
        new_weight,
        filter_changed,
        fade_out,
        fade_in,
        scratch_old,
        scratch_new,
        scratch_contribution,
        bus,
    );
}

/// The weighting/crossfade half of [`render_contribution`], taking an
/// already-computed unweighted raw block instead of running a convolver
/// itself. Used by the binaural renderer, which first blends two
/// convolver outputs (selected HRTF and the neutral near-head filter)
/// before the weighting crossfade applies.
#[allow(clippy::too_many_arguments)]
pub fn combine_raw_contribution(
    raw: &[Sample],
    old_weight: Sample,
    new_weight: Sample,
    filter_changed: bool,
    fade_out: &[Sample],
    fade_in: &[Sample],
    scratch_old: &mut [Sample],
    scratch_new: &mut [Sample],
    scratch_contribution: &mut [Sample],
    bus: &mut [Sample],
) {
    for ((o, n), &r) in scratch_old.iter_mut().zip(scratch_new.iter_mut()).zip(raw.iter()) {
        *o = r * old_weight;
        *n = r * new_weight;
    }
    let mode = classify_weight_transition(old_weight, new_weight, filter_changed);
    scratch_contribution.iter_mut().for_each(|s| *s = 0.0);
    combine_channels(
        scratch_contribution,
        &mode,
        Some(scratch_old),
        Some(scratch_new),
        fade_out,
        fade_in,
    );
    for (b, c) in bus.iter_mut().zip(scratch_contribution.iter()) {
        *b += c;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GainParams {
        GainParams {
            master_volume: 1.0,
            master_volume_correction_db: 0.0,
            decay_exponent: 1.0,
            amplitude_reference_distance: 3.0,
        }
    }

    #[test]
    fn muted_source_has_zero_weight() {
        let state = SourceState {
            gain: 1.0,
            mute: true,
            processing: true,
            active: true,
            model: SourceModel::Point,
            position: Position::new(1.0, 0.0, 0.0),
            orientation: Rotation::identity(),
        };
        assert_eq!(weighting_factor(&state, Position::new(0.0, 0.0, 0.0), &params(), true), 0.0);
    }

    #[test]
    fn point_source_applies_distance_law_with_minimum_radius() {
        let state = SourceState {
            gain: 1.0,
            mute: false,
            processing: true,
            active: true,
            model: SourceModel::Point,
            position: Position::new(0.1, 0.0, 0.0),
            orientation: Rotation::identity(),
        };
        // r = 0.1 clamps to 0.5
        let weight = weighting_factor(&state, Position::new(0.0, 0.0, 0.0), &params(), true);
        assert!((weight - (0.5f32.powf(-1.0) * 3.0f32.powf(1.0))).abs() < 1e-5);
    }

    #[test]
    fn plane_source_ignores_distance_law() {
        let state = SourceState {
            gain: 2.0,
            mute: false,
            processing: true,
            active: true,
            model: SourceModel::Plane,
            position: Position::new(100.0, 0.0, 0.0),
            orientation: Rotation::identity(),
        };
        let weight = weighting_factor(&state, Position::new(0.0, 0.0, 0.0), &params(), true);
        assert_eq!(weight, 2.0);
    }

    #[test]
    fn empty_requested_id_is_generated() {
        let r#gen = SourceIdGenerator::new();
        let id = resolve_source_id(&r#gen, "");
        assert!(id.starts_with(".ssr:"));
        assert_eq!(resolve_source_id(&r#gen, "named"), "named");
    }

    #[test]
    fn transition_classification_matches_activity_and_selection() {
        assert_eq!(classify_weight_transition(0.0, 0.0, false), CombineChannelsResult::Nothing);
        assert_eq!(classify_weight_transition(0.0, 1.0, false), CombineChannelsResult::FadeIn);
        assert_eq!(classify_weight_transition(1.0, 0.0, false), CombineChannelsResult::FadeOut);
        assert_eq!(classify_weight_transition(1.0, 1.0, false), CombineChannelsResult::Constant);
        assert_eq!(classify_weight_transition(1.0, 1.0, true), CombineChannelsResult::Change);
    }
}
