//! Stochastic samplers for GCP-SGD: produce a `(X_g, w_g)` batch of
//! nonzero and zero coordinates with per-sample weights such that the
//! expectation of the gradient computed from the batch equals the full
//! gradient.

pub mod hash;
pub mod semi_stratified;
pub mod stratified;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{AlgParams, SamplingType};
use crate::tensor::SparseTensor;

/// One sampled coordinate, carrying enough to evaluate the loss and scale
/// its gradient contribution: the data value (`0.0` for a zero draw), the
/// strata weight, and whether it was drawn from the nonzero or zero
/// strata (needed by [`semi_stratified`]'s fused correction term).
#[derive(Debug, Clone)]
pub struct Sample {
    pub coord: Vec<usize>,
    pub x: f64,
    pub weight: f64,
    pub from_nonzero_stratum: bool,
}

/// A sampled batch: one `Sample` per draw.
#[derive(Debug, Clone, Default)]
pub struct SampleBatch {
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn weights(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.weight).collect()
    }
}

/// Per-worker RNG pool, partitioned so each worker draws from a private
/// generator state. Workers are addressed by index rather than through a
/// checkout queue, since the CPU execution space always partitions work
/// into a fixed, known number of contiguous chunks ahead of time; a
/// worker's generator is checked out for the duration of the `&mut
/// StdRng` borrow [`Self::worker_rng`]/[`Self::workers_mut`] hands back,
/// and returned the moment that borrow ends.
pub struct RngPool {
    rngs: Vec<StdRng>,
}

impl RngPool {
    pub fn new(seed: u64, workers: usize) -> Self {
        let rngs = (0..workers.max(1))
            .map(|w| StdRng::seed_from_u64(seed.wrapping_add(w as u64)))
            .collect();
        Self { rngs }
    }

    pub fn len(&self) -> usize {
        self.rngs.len()
    }

    pub fn worker_rng(&mut self, worker: usize) -> &mut StdRng {
        let len = self.rngs.len();
        &mut self.rngs[worker % len]
    }

    /// All workers' generators at once, as disjoint mutable borrows one
    /// per slot; used to hand each `rayon::scope` task its own generator
    /// without any two tasks ever aliasing the same one.
    pub fn workers_mut(&mut self) -> &mut [StdRng] {
        &mut self.rngs
    }
}

/// Draws a gradient sample batch from `x` using `params.sampling_type`,
/// sequentially from a single generator.
pub fn sample_grad(x: &SparseTensor, params: &AlgParams, rng: &mut StdRng) -> SampleBatch {
    match params.sampling_type {
        SamplingType::Stratified => stratified::sample(
            x,
            params.num_samples_nonzeros_grad,
            params.num_samples_zeros_grad,
            rng,
        ),
        SamplingType::SemiStratified => semi_stratified::sample(
            x,
            params.num_samples_nonzeros_grad,
            params.num_samples_zeros_grad,
            rng,
        ),
    }
}

/// Draws the (once-per-run, reused-across-epochs) evaluation batch used
/// for epoch-acceptance decisions, sequentially from a single generator.
pub fn sample_value(x: &SparseTensor, params: &AlgParams, rng: &mut StdRng) -> SampleBatch {
    match params.sampling_type {
        SamplingType::Stratified => stratified::sample(
            x,
            params.num_samples_nonzeros_value,
            params.num_samples_zeros_value,
            rng,
        ),
        SamplingType::SemiStratified => semi_stratified::sample(
            x,
            params.num_samples_nonzeros_value,
            params.num_samples_zeros_value,
            rng,
        ),
    }
}

/// Parallel variant of [`sample_grad`]: partitions the draw across
/// `pool`'s workers instead of drawing from one generator sequentially.
pub fn sample_grad_parallel(x: &SparseTensor, params: &AlgParams, pool: &mut RngPool) -> SampleBatch {
    match params.sampling_type {
        SamplingType::Stratified => stratified::sample_parallel(
            x,
            params.num_samples_nonzeros_grad,
            params.num_samples_zeros_grad,
            pool,
        ),
        SamplingType::SemiStratified => semi_stratified::sample_parallel(
            x,
            params.num_samples_nonzeros_grad,
            params.num_samples_zeros_grad,
            pool,
        ),
    }
}

/// Parallel variant of [`sample_value`]: partitions the draw across
/// `pool`'s workers instead of drawing from one generator sequentially.
pub fn sample_value_parallel(x: &SparseTensor, params: &AlgParams, pool: &mut RngPool) -> SampleBatch {
    match params.sampling_type {
        SamplingType::Stratified => stratified::sample_parallel(
            x,
            params.num_samples_nonzeros_value,
            params.num_samples_zeros_value,
            pool,
        ),
        SamplingType::SemiStratified => semi_stratified::sample_parallel(
            x,
            params.num_samples_nonzeros_value,
            params.num_samples_zeros_value,
            pool,
        ),
    }
}
