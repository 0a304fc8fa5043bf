//! Configuration types shared across the kernel layer.
//!
//! A plain struct with `Default`, `with_*` setters, and a couple of named
//! presets.

use serde::{Deserialize, Serialize};

use crate::loss::Loss;

/// Selects which MTTKRP algorithm variant a call is a contract with.
///
/// A closed enumeration: the dispatch is a small table chosen once per
/// call, not per nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MttkrpMethod {
    /// Sequential accumulation, no atomics. CPU-only.
    Single,
    /// Parallel over nonzeros, atomic scatter-add into `V`.
    Atomic,
    /// Parallel over nonzeros with private per-worker accumulation buffers.
    /// CPU-only; used only when `dims[n] * P <= gamma * nnz`.
    Duplicated,
    /// Iterates `perm[n]` order so consecutive nonzeros share a target row.
    /// Requires `SparseTensor::create_permutation` to have been called.
    Perm,
    /// Legacy compatibility alias retained for benchmark parity; behaves
    /// like `Single`.
    OrigKokkos,
}

impl Default for MttkrpMethod {
    fn default() -> Self {
        MttkrpMethod::Atomic
    }
}

/// Column-norm flavor for `FactorMatrix::column_norms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormType {
    Inf,
    One,
    Two,
}

/// Which triangle of a symmetric matrix is defined/requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Uplo {
    Upper,
    Lower,
}

/// Sampler family used by the GCP-SGD driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingType {
    Stratified,
    SemiStratified,
}

impl Default for SamplingType {
    fn default() -> Self {
        SamplingType::Stratified
    }
}

/// The full set of knobs consumed by the GCP-SGD driver and the MTTKRP
/// dispatch layer underneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgParams {
    pub loss: Loss,

    // MTTKRP dispatch
    pub mttkrp_method: MttkrpMethod,
    /// Column tile width for `Duplicated`; `0` disables tiling.
    pub mttkrp_tile_size: usize,
    /// Threshold `gamma` for auto-selecting `Duplicated` (`dims[n] * P <=
    /// gamma * nnz`).
    pub mttkrp_duplicated_threshold: f64,
    /// When set, a warmup pass forces `Atomic` for every mode regardless
    /// of `mttkrp_method`, and `Perm`'s permutation is only built once the
    /// warmup pass is over. If `Perm` is requested but no permutation has
    /// been built by the time of a real call, callers fall back to
    /// `Atomic` instead of failing.
    pub mttkrp_warmup_force_atomic: bool,

    // GCP-SGD epoch loop
    pub rate: f64,
    pub decay: f64,
    pub max_fails: usize,
    pub epoch_iters: usize,
    pub frozen_iters: usize,
    pub max_epochs: usize,
    pub tol: f64,
    pub seed: u64,
    pub print_iter: usize,
    pub compute_fit: bool,
    /// Fuse the gradient sample and MTTKRP-all into one kernel pass
    /// (semi-stratified sampling only).
    pub fuse: bool,

    // ADAM
    pub use_adam: bool,
    pub adam_beta1: f64,
    pub adam_beta2: f64,
    pub adam_eps: f64,

    // Sampler
    pub sampling_type: SamplingType,
    pub num_samples_nonzeros_grad: usize,
    pub num_samples_zeros_grad: usize,
    pub num_samples_nonzeros_value: usize,
    pub num_samples_zeros_value: usize,
}

impl Default for AlgParams {
    fn default() -> Self {
        Self {
            loss: Loss::Gaussian,
            mttkrp_method: MttkrpMethod::default(),
            mttkrp_tile_size: 0,
            mttkrp_duplicated_threshold: 0.25,
            mttkrp_warmup_force_atomic: true,
            rate: 1.0e-3,
            decay: 0.1,
            max_fails: 10,
            epoch_iters: 1000,
            frozen_iters: 1,
            max_epochs: 1000,
            tol: 1.0e-10,
            seed: 12345,
            print_iter: 10,
            compute_fit: false,
            fuse: false,
            use_adam: true,
            adam_beta1: 0.9,
            adam_beta2: 0.999,
            adam_eps: 1.0e-8,
            sampling_type: SamplingType::default(),
            num_samples_nonzeros_grad: 1000,
            num_samples_zeros_grad: 1000,
            num_samples_nonzeros_value: 1000,
            num_samples_zeros_value: 1000,
        }
    }
}

impl AlgParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_mttkrp_method(mut self, method: MttkrpMethod) -> Self {
        self.mttkrp_method = method;
        self
    }

    pub fn with_mttkrp_warmup_force_atomic(mut self, enabled: bool) -> Self {
        self.mttkrp_warmup_force_atomic = enabled;
        self
    }

    pub fn with_adam(mut self, enabled: bool) -> Self {
        self.use_adam = enabled;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// A config tuned for a quick, low-iteration smoke test.
    pub fn fast() -> Self {
        Self {
            epoch_iters: 10,
            max_epochs: 5,
            print_iter: 1,
            ..Self::default()
        }
    }
}
