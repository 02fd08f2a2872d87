//! Renderer base gain pipeline (C8) and the six rendering back-ends built
//! on it (C9): binaural HRTF convolution, binaural room synthesis,
//! generic per-output FIR, Wave Field Synthesis, Vector Base Amplitude
//! Panning, and Ambisonics Amplitude Panning. Also owns the loudspeaker
//! reproduction-setup XML parser (C11's external-interface half).

pub use ssr_core::Sample;

pub mod aap;
pub mod binaural;
pub mod generic_fir;
pub mod setup;
pub mod source;
pub mod vbap;
pub mod wfs;

pub use aap::{AapSource, Decoder as AapDecoder, Directivity};
pub use binaural::{neutral_filter, BinauralSource, BrsSource, HrtfSet};
pub use generic_fir::GenericFirSource;
pub use setup::{parse_setup, Loudspeaker, LoudspeakerModel};
pub use source::{
    classify_weight_transition, combine_raw_contribution, render_contribution, resolve_source_id,
    weighting_factor, GainParams, SourceIdGenerator, SourceModel, SourceState,
};
pub use vbap::{Ring as VbapRing, VbapSource};
pub use wfs::{ReferenceFrame, WfsSource};
