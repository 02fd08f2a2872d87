//! Channel combiner (C6): merges a changing number of per-source output
//! channels into a single loudspeaker feed, crossfading whenever the
//! active channel set changes between periods to avoid audible clicks.

use ssr_core::Sample;
use wide::f32x8;

/// Outcome of comparing this period's active channel list against the
/// previous period's, used to choose which combination path to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombineChannelsResult {
    /// No channels were active in either period; output is silence.
    Nothing,
    /// The active channel set is unchanged: no crossfade needed.
    Constant,
    /// The active set changed but overlaps: apply fade-out to the old
    /// contributions and fade-in to the new ones.
    Change,
    /// Channels became active this period where none were active before.
    FadeIn,
    /// Channels that were active became inactive this period.
    FadeOut,
}

/// Raised-cosine fade window of `len` samples, rising from 0 to 1 (or the
/// reverse when `rising` is false).
pub fn raised_cosine_window(len: usize, rising: bool) -> Vec<Sample> {
    (0..len)
        .map(|i| {
            let phase = std::f32::consts::PI * (i as Sample + 1.0) / (len as Sample + 1.0);
            let value = 0.5 - 0.5 * phase.cos();
            if rising {
                value
            } else {
                1.0 - value
            }
        })
        .collect()
}

/// Adds `src * window[i]` into `dest[i]` for every sample, using 8-wide
/// SIMD lanes where the block divides evenly and a scalar tail otherwise.
fn fade_accumulate(dest: &mut [Sample], src: &[Sample], window: &[Sample]) {
    debug_assert_eq!(dest.len(), src.len());
    debug_assert_eq!(dest.len(), window.len());

    let lanes = dest.len() / 8;
    for lane in 0..lanes {
        let base = lane * 8;
        let d = f32x8::from(<[f32; 8]>::try_from(&dest[base..base + 8]).unwrap());
        let s = f32x8::from(<[f32; 8]>::try_from(&src[base..base + 8]).unwrap());
        let w = f32x8::from(<[f32; 8]>::try_from(&window[base..base + 8]).unwrap());
        let result: [f32; 8] = (d + s * w).into();
        dest[base..base + 8].copy_from_slice(&result);
    }
    for i in (lanes * 8)..dest.len() {
        dest[i] += src[i] * window[i];
    }
}

/// Adds `src` straight into `dest`, unweighted.
fn accumulate(dest: &mut [Sample], src: &[Sample]) {
    debug_assert_eq!(dest.len(), src.len());
    let lanes = dest.len() / 8;
    for lane in 0..lanes {
        let base = lane * 8;
        let d = f32x8::from(<[f32; 8]>::try_from(&dest[base..base + 8]).unwrap());
        let s = f32x8::from(<[f32; 8]>::try_from(&src[base..base + 8]).unwrap());
        let result: [f32; 8] = (d + s).into();
        dest[base..base + 8].copy_from_slice(&result);
    }
    for i in (lanes * 8)..dest.len() {
        dest[i] += src[i];
    }
}

/// Combines `old` and `new` channel blocks into `dest` according to
/// `result`, using `fade_out`/`fade_in` windows (each `dest.len()` samples
/// long) when a crossfade is required. `dest` must start zeroed.
pub fn combine_channels(
    dest: &mut [Sample],
    result: &CombineChannelsResult,
    old: Option<&[Sample]>,
    new: Option<&[Sample]>,
    fade_out: &[Sample],
    fade_in: &[Sample],
) {
    match result {
        CombineChannelsResult::Nothing => {
            dest.iter_mut().for_each(|s| *s = 0.0);
        }
        CombineChannelsResult::Constant => {
            if let Some(new) = new {
                accumulate(dest, new);
            }
        }
        CombineChannelsResult::FadeIn => {
            if let Some(new) = new {
                fade_accumulate(dest, new, fade_in);
            }
        }
        CombineChannelsResult::FadeOut => {
            if let Some(old) = old {
                fade_accumulate(dest, old, fade_out);
            }
        }
        CombineChannelsResult::Change => {
            if let Some(old) = old {
                fade_accumulate(dest, old, fade_out);
            }
            if let Some(new) = new {
                fade_accumulate(dest, new, fade_in);
            }
        }
    }
}

/// Classifies a transition from `was_active` to `is_active` into the
/// combine result that should be used for it.
pub fn classify_transition(was_active: bool, is_active: bool) -> CombineChannelsResult {
    match (was_active, is_active) {
        (false, false) => CombineChannelsResult::Nothing,
        (true, true) => CombineChannelsResult::Constant,
        (false, true) => CombineChannelsResult::FadeIn,
        (true, false) => CombineChannelsResult::FadeOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_crossfades_both_contributions() {
        let old = [1.0, 2.0, 3.0];
        let new = [4.0, 5.0, 6.0];
        let fade_out = [2.0, 2.0, 2.0];
        let fade_in = [3.0, 3.0, 3.0];
        let mut dest = [0.0; 3];
        combine_channels(
            &mut dest,
            &CombineChannelsResult::Change,
            Some(&old),
            Some(&new),
            &fade_out,
            &fade_in,
        );
        assert_eq!(dest, [25.0, 35.0, 45.0]);
    }

    #[test]
    fn nothing_is_silence() {
        let mut dest = [1.0, 2.0, 3.0];
        combine_channels(
            &mut dest,
            &CombineChannelsResult::Nothing,
            None,
            None,
            &[0.0; 3],
            &[0.0; 3],
        );
        assert_eq!(dest, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn constant_passes_new_through_unweighted() {
        let new = [1.0, 2.0, 3.0];
        let mut dest = [0.0; 3];
        combine_channels(
            &mut dest,
            &CombineChannelsResult::Constant,
            None,
            Some(&new),
            &[0.0; 3],
            &[0.0; 3],
        );
        assert_eq!(dest, new);
    }

    #[test]
    fn raised_cosine_window_rising_endpoints() {
        let window = raised_cosine_window(4, true);
        assert!(window[0] > 0.0 && window[0] < window[3]);
        assert!(window[3] < 1.0);
    }

    #[test]
    fn classify_transition_matches_activity_changes() {
        assert_eq!(
            classify_transition(false, false),
            CombineChannelsResult::Nothing
        );
        assert_eq!(
            classify_transition(true, true),
            CombineChannelsResult::Constant
        );
        assert_eq!(
            classify_transition(false, true),
            CombineChannelsResult::FadeIn
        );
        assert_eq!(
            classify_transition(true, false),
            CombineChannelsResult::FadeOut
        );
    }
}
