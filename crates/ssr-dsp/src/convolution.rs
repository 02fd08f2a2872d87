//! Partitioned FFT convolver (C5): overlap-save with uniformly
//! partitioned filters and per-partition update queues.
//!
//! The filter's coefficient layout is the crate's native real-FFT
//! spectrum (`Complex<f32>`, length `block_size + 1`) rather than the
//! hand-packed, SIMD-oriented real-array layout of the original engine —
//! functionally equivalent (same zero-flag short-circuiting, same
//! partition/update-queue mechanics, same numeric result), see DESIGN.md.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use ssr_core::Sample;

type Spectrum = Vec<Complex<Sample>>;

/// One partition of a transformed filter or input signal: the spectrum
/// of a `2·block_size`-sample window, plus a flag marking it all-zero so
/// `convolve` can skip it.
#[derive(Clone)]
struct Partition {
    spectrum: Spectrum,
    zero: bool,
}

impl Partition {
    fn empty(bins: usize) -> Self {
        Self {
            spectrum: vec![Complex::new(0.0, 0.0); bins],
            zero: true,
        }
    }
}

/// Shared FFT machinery for one convolver instance: plans are allocated
/// once, non-realtime, and reused for every transform.
pub struct FftPlans {
    block_size: usize,
    forward: Arc<dyn RealToComplex<Sample>>,
    inverse: Arc<dyn ComplexToReal<Sample>>,
}

impl FftPlans {
    pub fn new(block_size: usize) -> Self {
        assert_eq!(block_size % 8, 0, "block size must be a multiple of 8");
        let mut planner = RealFftPlanner::<Sample>::new();
        let n = 2 * block_size;
        Self {
            block_size,
            forward: planner.plan_fft_forward(n),
            inverse: planner.plan_fft_inverse(n),
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn bins(&self) -> usize {
        self.block_size + 1
    }

    fn forward_transform(&self, time_domain: &mut [Sample]) -> Spectrum {
        let mut spectrum = self.forward.make_output_vec();
        self.forward.process(time_domain, &mut spectrum).expect("fft size mismatch");
        spectrum
    }
}

/// A filter split into fixed-size partitions of transformed coefficients.
/// Built on the non-realtime thread from impulse-response data.
#[derive(Clone)]
pub struct PartitionedFilter {
    partitions: Vec<Partition>,
}

impl PartitionedFilter {
    /// Splits `ir` into `ceil(ir.len() / block_size)` partitions, each
    /// zero-padded to `2·block_size` and transformed. All-zero chunks are
    /// marked zero and never transformed.
    pub fn prepare(plans: &FftPlans, ir: &[Sample]) -> Self {
        let block_size = plans.block_size();
        let num_partitions = ir.len().div_ceil(block_size).max(1);
        let mut partitions = Vec::with_capacity(num_partitions);
        for chunk in ir.chunks(block_size) {
            if chunk.iter().all(|&s| s == 0.0) {
                partitions.push(Partition::empty(plans.bins()));
                continue;
            }
            let mut windowed = vec![0.0; 2 * block_size];
            windowed[..chunk.len()].copy_from_slice(chunk);
            let spectrum = plans.forward_transform(&mut windowed);
            partitions.push(Partition {
                spectrum,
                zero: false,
            });
        }
        Self { partitions }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Resizes (by truncation or zero-padding) to exactly `count`
    /// partitions, matching a convolver's own partition count.
    fn resized(&self, count: usize, bins: usize) -> Vec<Partition> {
        let mut out = self.partitions.clone();
        out.truncate(count);
        while out.len() < count {
            out.push(Partition::empty(bins));
        }
        out
    }
}

/// Accumulates `a[i] * b[i]` into `acc[i]` for every bin, unless either
/// operand is flagged zero.
fn multiply_accumulate(acc: &mut [Complex<Sample>], a: &Partition, b: &Partition) -> bool {
    if a.zero || b.zero {
        return false;
    }
    for ((acc, a), b) in acc.iter_mut().zip(&a.spectrum).zip(&b.spectrum) {
        *acc += a * b;
    }
    true
}

/// Holds the last `P` transformed windows of an input signal, each
/// covering the current and immediately preceding raw block.
pub struct Input {
    plans: Arc<FftPlans>,
    num_partitions: usize,
    previous_block: Vec<Sample>,
    /// Index 0 is the most recently added partition.
    ring: std::collections::VecDeque<Partition>,
}

impl Input {
    pub fn new(plans: Arc<FftPlans>, num_partitions: usize) -> Self {
        let block_size = plans.block_size();
        let bins = plans.bins();
        let mut ring = std::collections::VecDeque::with_capacity(num_partitions);
        for _ in 0..num_partitions {
            ring.push_back(Partition::empty(bins));
        }
        Self {
            plans,
            num_partitions,
            previous_block: vec![0.0; block_size],
            ring,
        }
    }

    /// Transforms a new window of `[previous_block, new_block]`, marking
    /// it zero (and skipping the transform) when both halves are zero.
    pub fn add_block(&mut self, new_block: &[Sample]) {
        debug_assert_eq!(new_block.len(), self.plans.block_size());

        let prev_zero = self.previous_block.iter().all(|&s| s == 0.0);
        let new_zero = new_block.iter().all(|&s| s == 0.0);

        let partition = if prev_zero && new_zero {
            Partition::empty(self.plans.bins())
        } else {
            let mut window = vec![0.0; 2 * self.plans.block_size()];
            window[..self.plans.block_size()].copy_from_slice(&self.previous_block);
            window[self.plans.block_size()..].copy_from_slice(new_block);
            let spectrum = self.plans.forward_transform(&mut window);
            Partition {
                spectrum,
                zero: false,
            }
        };

        self.ring.pop_back();
        self.ring.push_front(partition);
        self.previous_block.copy_from_slice(new_block);
    }

    fn partition(&self, i: usize) -> &Partition {
        &self.ring[i]
    }
}

/// The non-update-queue half of an output stage: the active filter
/// partitions and the IFFT machinery to turn an accumulated spectrum
/// back into a time-domain block.
struct OutputCore {
    plans: Arc<FftPlans>,
    active: Vec<Partition>,
    accumulator: Spectrum,
    time_domain: Vec<Sample>,
    tail: Vec<Sample>,
}

impl OutputCore {
    fn new(plans: Arc<FftPlans>, num_partitions: usize) -> Self {
        let bins = plans.bins();
        let block_size = plans.block_size();
        Self {
            active: vec![Partition::empty(bins); num_partitions],
            accumulator: vec![Complex::new(0.0, 0.0); bins],
            time_domain: vec![0.0; 2 * block_size],
            tail: vec![0.0; block_size],
            plans,
        }
    }

    /// Multiplies every active partition against the matching input
    /// partition and accumulates; transforms back and scales by
    /// `weight / (2·block_size)` unless the whole sum was zero, in which
    /// case a zero block is returned without transforming.
    fn convolve(&mut self, input: &Input, weight: Sample) -> &[Sample] {
        for bin in self.accumulator.iter_mut() {
            *bin = Complex::new(0.0, 0.0);
        }
        let mut any_nonzero = false;
        for i in 0..self.active.len() {
            let input_partition = input.partition(i);
            if multiply_accumulate(&mut self.accumulator, input_partition, &self.active[i]) {
                any_nonzero = true;
            }
        }

        if !any_nonzero {
            self.tail.iter_mut().for_each(|s| *s = 0.0);
            return &self.tail;
        }

        self.plans
            .inverse
            .process(&mut self.accumulator, &mut self.time_domain)
            .expect("fft size mismatch");

        let block_size = self.plans.block_size();
        let scale = weight / (2.0 * block_size as Sample);
        for (t, o) in self.time_domain[block_size..].iter().zip(self.tail.iter_mut()) {
            *o = t * scale;
        }
        &self.tail
    }
}

/// A dynamic convolver output: filter updates install partition 0
/// immediately and schedule partitions `1..P` to install `i` periods
/// later, masking the resulting discontinuity behind a crossfade.
pub struct Output {
    core: OutputCore,
    pending: Vec<Option<(Partition, u32)>>,
}

impl Output {
    pub fn new(plans: Arc<FftPlans>, num_partitions: usize) -> Self {
        Self {
            core: OutputCore::new(plans, num_partitions),
            pending: vec![None; num_partitions],
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.core.active.len()
    }

    /// Installs partition 0 of `filter` immediately; schedules partition
    /// `i` (`i >= 1`) to install `i` periods later.
    pub fn set_filter(&mut self, filter: &PartitionedFilter) {
        let count = self.core.active.len();
        let bins = self.core.plans.bins();
        let resized = filter.resized(count, bins);
        for (i, partition) in resized.into_iter().enumerate() {
            if i == 0 {
                self.core.active[0] = partition;
            } else {
                self.pending[i] = Some((partition, i as u32));
            }
        }
    }

    /// Advances every pending update by one period, installing any whose
    /// countdown reaches zero. Slot `i`'s countdown starts at `i`, so it
    /// installs on the `i`-th call, matching a FIFO shift register of
    /// length `i` rather than `i + 1`.
    pub fn rotate_queues(&mut self) {
        for i in 1..self.pending.len() {
            if let Some((partition, countdown)) = &mut self.pending[i] {
                *countdown -= 1;
                if *countdown == 0 {
                    self.core.active[i] = partition.clone();
                    self.pending[i] = None;
                }
            }
        }
    }

    /// `true` iff no scheduled update is still pending installation.
    pub fn queues_empty(&self) -> bool {
        self.pending.iter().all(Option::is_none)
    }

    pub fn convolve(&mut self, input: &Input, weight: Sample) -> &[Sample] {
        self.core.convolve(input, weight)
    }
}

/// A static convolver output: the filter is fixed at construction, no
/// update-queue machinery is allocated.
pub struct StaticOutput {
    core: OutputCore,
}

impl StaticOutput {
    pub fn new(plans: Arc<FftPlans>, filter: &PartitionedFilter) -> Self {
        let mut core = OutputCore::new(plans, filter.num_partitions());
        let bins = core.plans.bins();
        core.active = filter.resized(filter.num_partitions(), bins);
        Self { core }
    }

    pub fn convolve(&mut self, input: &Input, weight: Sample) -> &[Sample] {
        self.core.convolve(input, weight)
    }
}

/// Aggregate of an [`Input`] and a dynamic [`Output`], sharing one FFT
/// plan pair.
pub struct Convolver {
    plans: Arc<FftPlans>,
    input: Input,
    output: Output,
}

impl Convolver {
    pub fn new(block_size: usize, num_partitions: usize) -> Self {
        let plans = Arc::new(FftPlans::new(block_size));
        Self {
            input: Input::new(plans.clone(), num_partitions),
            output: Output::new(plans.clone(), num_partitions),
            plans,
        }
    }

    pub fn block_size(&self) -> usize {
        self.plans.block_size()
    }

    pub fn set_filter(&mut self, filter: &PartitionedFilter) {
        self.output.set_filter(filter);
    }

    pub fn rotate_queues(&mut self) {
        self.output.rotate_queues();
    }

    pub fn queues_empty(&self) -> bool {
        self.output.queues_empty()
    }

    pub fn process(&mut self, new_block: &[Sample], weight: Sample) -> &[Sample] {
        self.input.add_block(new_block);
        self.output.convolve(&self.input, weight)
    }
}

/// Aggregate of an [`Input`] and a [`StaticOutput`] for a filter fixed at
/// construction.
pub struct StaticConvolver {
    input: Input,
    output: StaticOutput,
}

impl StaticConvolver {
    pub fn new(plans: Arc<FftPlans>, filter: &PartitionedFilter) -> Self {
        Self {
            input: Input::new(plans.clone(), filter.num_partitions()),
            output: StaticOutput::new(plans, filter),
        }
    }

    pub fn process(&mut self, new_block: &[Sample], weight: Sample) -> &[Sample] {
        self.input.add_block(new_block);
        self.output.convolve(&self.input, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_count_matches_ceil_division() {
        let plans = FftPlans::new(8);
        let ir = vec![0.0; 20];
        let filter = PartitionedFilter::prepare(&plans, &ir);
        assert_eq!(filter.num_partitions(), 3); // ceil(20/8)
    }

    #[test]
    fn static_convolver_dirac_scenario() {
        let plans = Arc::new(FftPlans::new(8));
        let mut ir = vec![0.0; 13];
        ir[10] = 5.0;
        ir[11] = 4.0;
        ir[12] = 3.0;
        let filter = PartitionedFilter::prepare(&plans, &ir);
        let mut conv = StaticConvolver::new(plans, &filter);

        let mut block1 = vec![0.0; 8];
        block1[1] = 1.0;
        let mut block2 = vec![0.0; 8];
        block2[1] = 2.0;
        let zero_block = vec![0.0; 8];

        let out1 = conv.process(&block1, 1.0).to_vec();
        for s in &out1 {
            assert!(s.abs() < 1e-4);
        }

        let out2 = conv.process(&block2, 1.0).to_vec();
        let expected2 = [0.0, 0.0, 0.0, 5.0, 4.0, 3.0, 0.0, 0.0];
        for (a, b) in out2.iter().zip(expected2.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} != {b}");
        }

        let out3 = conv.process(&zero_block, 1.0).to_vec();
        let expected3 = [0.0, 0.0, 0.0, 10.0, 8.0, 6.0, 0.0, 0.0];
        for (a, b) in out3.iter().zip(expected3.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} != {b}");
        }
    }

    #[test]
    fn zero_input_yields_zero_output() {
        let plans = Arc::new(FftPlans::new(8));
        let mut ir = vec![0.0; 8];
        ir[0] = 1.0;
        let filter = PartitionedFilter::prepare(&plans, &ir);
        let mut conv = StaticConvolver::new(plans, &filter);
        let zero_block = vec![0.0; 8];
        for _ in 0..3 {
            let out = conv.process(&zero_block, 1.0);
            assert!(out.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn dynamic_output_schedules_partition_installs() {
        let plans = Arc::new(FftPlans::new(8));
        let mut conv = Convolver::new(8, 3);
        let mut ir = vec![0.0; 24];
        ir[0] = 1.0;
        ir[8] = 1.0;
        ir[16] = 1.0;
        let filter = PartitionedFilter::prepare(&plans, &ir);
        conv.set_filter(&filter);
        assert!(!conv.queues_empty());
        conv.rotate_queues();
        // slot 1 installs on the 1st call; slot 2 is still pending.
        assert!(!conv.queues_empty());
        conv.rotate_queues();
        // slot 2 installs on its 2nd call.
        assert!(conv.queues_empty());
    }
}
