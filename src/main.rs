//! Offline command-line driver for the rendering engine: loads a
//! loudspeaker reproduction setup and a set of mono source WAV files,
//! runs them through one renderer backend period by period, and writes
//! the resulting loudspeaker feeds to a multi-channel WAV file.
//!
//! This is a batch harness, not the realtime JACK/PortAudio transport the
//! engine is designed for — it exists to exercise C7–C9 end to end
//! without an audio backend. A realtime transport would implement
//! [`ssr_rt::AudioPort`] per channel and drive [`ssr_rt::Engine`] from an
//! audio callback instead of this file's block loop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use ssr_core::{Position, Result, Rotation};
use ssr_dsp::{FftPlans, PartitionedFilter};
use ssr_spatial::{
    parse_setup, AapDecoder, AapSource, Directivity, GainParams, GenericFirSource, Loudspeaker,
    ReferenceFrame, SourceModel, SourceState, VbapRing, VbapSource, WfsSource,
};

mod config;
use config::Config;

const DEFAULT_BLOCK_SIZE: usize = 64;

#[derive(Parser)]
#[command(name = "ssr-render", about = "Offline multi-channel spatial audio renderer")]
struct Cli {
    /// Loudspeaker reproduction setup XML.
    #[arg(long)]
    setup: PathBuf,

    /// Mono source input WAV files, one virtual source per file.
    #[arg(long = "source", required = true)]
    sources: Vec<PathBuf>,

    /// Output multi-channel WAV file, one channel per loudspeaker.
    #[arg(long)]
    output: PathBuf,

    /// Optional JSON configuration file (block_size, threads, distance
    /// model parameters); CLI flags still win where both are given.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    renderer: RendererArgs,
}

#[derive(Subcommand)]
enum RendererArgs {
    /// Per-source, per-output static FIR filters from one multi-channel
    /// impulse-response file (`O` channels, `O` = number of outputs).
    GenericFir {
        #[arg(long)]
        ir_file: PathBuf,
    },
    /// Wave Field Synthesis on a loudspeaker array.
    Wfs {
        #[arg(long)]
        prefilter_file: PathBuf,
        #[arg(long, default_value_t = 4096)]
        delayline_size: usize,
        #[arg(long, default_value_t = 256)]
        initial_delay: usize,
    },
    /// Vector Base Amplitude Panning across a convex loudspeaker ring.
    Vbap,
    /// Ambisonics Amplitude Panning.
    Aap {
        #[arg(long)]
        order: Option<u32>,
        #[arg(long, value_enum, default_value = "max-re")]
        directivity: DirectivityArg,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum DirectivityArg {
    InPhase,
    MaxRe,
}

fn hound_err(e: hound::Error) -> ssr_core::Error {
    ssr_core::Error::Resource(e.to_string())
}

fn read_mono_wav(path: &PathBuf) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(hound_err)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(hound_err)?,
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .map_err(hound_err)?,
    };
    Ok((samples, spec.sample_rate))
}

fn read_multichannel_wav(path: &PathBuf) -> Result<(Vec<Vec<f32>>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(hound_err)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let mut out = vec![Vec::new(); channels];
    match spec.sample_format {
        hound::SampleFormat::Float => {
            for (i, s) in reader.samples::<f32>().enumerate() {
                out[i % channels].push(s.map_err(hound_err)?);
            }
        }
        hound::SampleFormat::Int => {
            for (i, s) in reader.samples::<i32>().enumerate() {
                out[i % channels].push(s.map_err(hound_err)? as f32 / i32::MAX as f32);
            }
        }
    }
    Ok((out, spec.sample_rate))
}

fn pad_blocks(samples: &[f32], block_size: usize) -> Vec<Vec<f32>> {
    let num_blocks = samples.len().div_ceil(block_size).max(1);
    (0..num_blocks)
        .map(|i| {
            let start = i * block_size;
            let end = (start + block_size).min(samples.len());
            let mut block = vec![0.0; block_size];
            block[..end - start].copy_from_slice(&samples[start..end]);
            block
        })
        .collect()
}

fn write_output(path: &PathBuf, channels: &[Vec<f32>], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(hound_err)?;
    let len = channels.first().map(Vec::len).unwrap_or(0);
    for i in 0..len {
        for channel in channels {
            writer.write_sample(channel[i]).map_err(hound_err)?;
        }
    }
    writer.finalize().map_err(hound_err)?;
    Ok(())
}

fn gain_params() -> GainParams {
    GainParams {
        master_volume: 1.0,
        master_volume_correction_db: 0.0,
        decay_exponent: 1.0,
        amplitude_reference_distance: 1.0,
    }
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

/// Places sources evenly around the origin so every rendered scene has a
/// plausible, non-degenerate layout without requiring scene-description
/// input beyond a flat list of WAV files.
fn default_source_position(index: usize, total: usize) -> Position {
    let angle = (index as f32 / total.max(1) as f32) * std::f32::consts::TAU;
    Position::new(angle.cos() * 2.0, angle.sin() * 2.0, 0.0)
}

fn run_generic_fir(sources: &[(Vec<f32>, u32)], loudspeakers: &[Loudspeaker], ir_file: &PathBuf, output: &PathBuf, block_size: usize) -> Result<()> {
    let (ir_channels, ir_rate) = read_multichannel_wav(ir_file)?;
    if ir_channels.len() != loudspeakers.len() {
        return Err(ssr_core::Error::Configuration(format!(
            "generic FIR impulse file has {} channels, expected {} (one per output)",
            ir_channels.len(),
            loudspeakers.len()
        )));
    }
    let sample_rate = sources.first().map(|(_, r)| *r).unwrap_or(ir_rate);
    let plans = Arc::new(FftPlans::new(block_size));
    let filters: Vec<PartitionedFilter> = ir_channels.iter().map(|ir| PartitionedFilter::prepare(&plans, ir)).collect();
    let num_partitions = filters.iter().map(PartitionedFilter::num_partitions).max().unwrap_or(1);

    let mut output_buffers: Vec<Vec<f32>> = vec![Vec::new(); loudspeakers.len()];
    let gain = gain_params();
    let fade = vec![1.0; block_size];

    for (index, (samples, _)) in sources.iter().enumerate() {
        let position = default_source_position(index, sources.len());
        let mut src = GenericFirSource::new(plans.clone(), num_partitions, loudspeakers.len(), source_state(position));
        src.set_filters(&filters);

        let blocks = pad_blocks(samples, block_size);
        for block in blocks {
            let mut period_buses: Vec<Vec<f32>> = vec![vec![0.0; block_size]; loudspeakers.len()];
            {
                let mut refs: Vec<&mut [f32]> = period_buses.iter_mut().map(|b| b.as_mut_slice()).collect();
                src.process(&block, Position::zeros(), &gain, &fade, &fade, &mut refs);
            }
            for (bus, period) in output_buffers.iter_mut().zip(period_buses) {
                bus.extend(period);
            }
        }
    }

    write_output(output, &output_buffers, sample_rate)
}

fn run_wfs(sources: &[(Vec<f32>, u32)], loudspeakers: &[Loudspeaker], prefilter_file: &PathBuf, delayline_size: usize, initial_delay: usize, output: &PathBuf, block_size: usize) -> Result<()> {
    let (prefilter_samples, sample_rate) = read_mono_wav(prefilter_file)?;
    let plans = Arc::new(FftPlans::new(block_size));
    let prefilter = PartitionedFilter::prepare(&plans, &prefilter_samples);
    let sample_rate = sources.first().map(|(_, r)| *r).unwrap_or(sample_rate);

    let reference = ReferenceFrame { position: Position::zeros(), orientation: Rotation::identity() };
    let mut output_buffers: Vec<Vec<f32>> = vec![Vec::new(); loudspeakers.len()];

    for (index, (samples, _)) in sources.iter().enumerate() {
        let position = default_source_position(index, sources.len());
        let mut src = WfsSource::new(
            plans.clone(),
            &prefilter,
            delayline_size,
            initial_delay,
            loudspeakers.len(),
            position,
            Rotation::identity(),
            SourceModel::Point,
        );

        let blocks = pad_blocks(samples, block_size);
        for block in blocks {
            src.feed(&block);
            let mut period_buses: Vec<Vec<f32>> = vec![vec![0.0; block_size]; loudspeakers.len()];
            {
                let mut refs: Vec<&mut [f32]> = period_buses.iter_mut().map(|b| b.as_mut_slice()).collect();
                src.render(loudspeakers, &reference, &reference, sample_rate as f32, &mut refs);
            }
            for (bus, period) in output_buffers.iter_mut().zip(period_buses) {
                bus.extend(period);
            }
        }
    }

    write_output(output, &output_buffers, sample_rate)
}

fn run_vbap(sources: &[(Vec<f32>, u32)], loudspeakers: &[Loudspeaker], output: &PathBuf, block_size: usize) -> Result<()> {
    let sample_rate = sources.first().map(|(_, r)| *r).unwrap_or(44_100);
    let reference = Position::zeros();
    let ring = VbapRing::build(loudspeakers, reference, Rotation::identity(), std::f32::consts::PI, 0.2);
    let mut output_buffers: Vec<Vec<f32>> = vec![Vec::new(); loudspeakers.len()];

    for (index, (samples, _)) in sources.iter().enumerate() {
        let position = default_source_position(index, sources.len());
        let mut src = VbapSource::new(loudspeakers.len(), SourceModel::Point);

        let blocks = pad_blocks(samples, block_size);
        for block in blocks {
            src.update(&ring, position, Rotation::identity(), reference, Rotation::identity(), 1.0);
            let mut period_buses: Vec<Vec<f32>> = vec![vec![0.0; block_size]; loudspeakers.len()];
            {
                let mut refs: Vec<&mut [f32]> = period_buses.iter_mut().map(|b| b.as_mut_slice()).collect();
                src.render(&block, &mut refs);
            }
            for (bus, period) in output_buffers.iter_mut().zip(period_buses) {
                bus.extend(period);
            }
        }
    }

    write_output(output, &output_buffers, sample_rate)
}

fn run_aap(sources: &[(Vec<f32>, u32)], loudspeakers: &[Loudspeaker], order: Option<u32>, directivity: Directivity, output: &PathBuf, block_size: usize) -> Result<()> {
    let sample_rate = sources.first().map(|(_, r)| *r).unwrap_or(44_100);
    let reference = Position::zeros();
    let decoder = AapDecoder::build(loudspeakers, Rotation::identity(), order, directivity);
    let mut output_buffers: Vec<Vec<f32>> = vec![Vec::new(); loudspeakers.len()];

    for (index, (samples, _)) in sources.iter().enumerate() {
        let position = default_source_position(index, sources.len());
        let mut src = AapSource::new(loudspeakers.len(), SourceModel::Point);

        let blocks = pad_blocks(samples, block_size);
        for block in blocks {
            src.update(&decoder, position, Rotation::identity(), reference, Rotation::identity(), 1.0);
            let mut period_buses: Vec<Vec<f32>> = vec![vec![0.0; block_size]; loudspeakers.len()];
            {
                let mut refs: Vec<&mut [f32]> = period_buses.iter_mut().map(|b| b.as_mut_slice()).collect();
                src.render(&block, &mut refs);
            }
            for (bus, period) in output_buffers.iter_mut().zip(period_buses) {
                bus.extend(period);
            }
        }
    }

    write_output(output, &output_buffers, sample_rate)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let block_size = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("loaded config from {:?}: threads={}, sample_rate={}", path, config.threads, config.sample_rate);
            config.block_size
        }
        None => DEFAULT_BLOCK_SIZE,
    };

    let setup_xml = std::fs::read_to_string(&cli.setup)?;
    let loudspeakers = parse_setup(&setup_xml)?;
    info!("loaded {} loudspeakers from {:?}", loudspeakers.len(), cli.setup);

    let sources: Vec<(Vec<f32>, u32)> = cli
        .sources
        .iter()
        .map(read_mono_wav)
        .collect::<Result<_>>()?;
    info!("loaded {} source files", sources.len());

    match cli.renderer {
        RendererArgs::GenericFir { ir_file } => run_generic_fir(&sources, &loudspeakers, &ir_file, &cli.output, block_size),
        RendererArgs::Wfs { prefilter_file, delayline_size, initial_delay } => {
            run_wfs(&sources, &loudspeakers, &prefilter_file, delayline_size, initial_delay, &cli.output, block_size)
        }
        RendererArgs::Vbap => run_vbap(&sources, &loudspeakers, &cli.output, block_size),
        RendererArgs::Aap { order, directivity } => {
            let directivity = match directivity {
                DirectivityArg::InPhase => Directivity::InPhase,
                DirectivityArg::MaxRe => Directivity::MaxRe,
            };
            run_aap(&sources, &loudspeakers, order, directivity, &cli.output, block_size)
        }
    }
}
