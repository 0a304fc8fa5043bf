//! `gcp-bench`: the benchmark/smoke-test CLI. A small hand-rolled argument
//! parser rather than reaching for `clap`, since this surface is a thin
//! outer layer around the kernel library, not the kernel layer itself.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use gcp_kernels::backend::ExecutionSpace;
use gcp_kernels::config::{AlgParams, MttkrpMethod};
use gcp_kernels::error::GcpError;
use gcp_kernels::io::{self, AnyTensor};
use gcp_kernels::ktensor::Ktensor;
use gcp_kernels::mttkrp;
use gcp_kernels::tensor::{DenseTensor, SparseTensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tensor storage format, selected by `--sparse`/`--dense` and otherwise
/// inferred from `--input`'s header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Sparse,
    Dense,
}

struct Args {
    input: Option<PathBuf>,
    index_base: usize,
    gz: bool,
    format: Format,
    dims: Vec<usize>,
    nnz: usize,
    nc: usize,
    iters: usize,
    seed: u64,
    check: bool,
    warmup: bool,
    /// Matches `AlgParams::mttkrp_warmup_force_atomic`: forces every mode
    /// to `Atomic` during the warmup pass and falls back to `Atomic`
    /// instead of failing if `Perm` is requested before a permutation has
    /// been built.
    warmup_force_atomic: bool,
    mttkrp_method: MttkrpMethod,
    mttkrp_tile_size: usize,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            input: None,
            index_base: 0,
            gz: false,
            format: Format::Sparse,
            dims: vec![50, 50, 50],
            nnz: 1000,
            nc: 5,
            iters: 5,
            seed: 1,
            check: false,
            warmup: true,
            warmup_force_atomic: true,
            mttkrp_method: MttkrpMethod::Atomic,
            mttkrp_tile_size: 0,
        }
    }
}

fn parse_method(s: &str) -> Result<MttkrpMethod, GcpError> {
    match s {
        "Single" => Ok(MttkrpMethod::Single),
        "Atomic" => Ok(MttkrpMethod::Atomic),
        "Duplicated" => Ok(MttkrpMethod::Duplicated),
        "Perm" => Ok(MttkrpMethod::Perm),
        "OrigKokkos" => Ok(MttkrpMethod::OrigKokkos),
        other => Err(GcpError::invalid_argument(format!("unknown --mttkrp-method {other:?}"))),
    }
}

fn parse_dims(s: &str) -> Result<Vec<usize>, GcpError> {
    let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');
    trimmed
        .split(',')
        .map(|tok| {
            tok.trim()
                .parse::<usize>()
                .map_err(|_| GcpError::invalid_argument(format!("invalid --dims entry {tok:?}")))
        })
        .collect()
}

fn parse_args() -> Result<Args, GcpError> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = || {
            it.next()
                .ok_or_else(|| GcpError::invalid_argument(format!("{flag} requires a value")))
        };
        match flag.as_str() {
            "--input" => {
                let v = value()?;
                args.input = (!v.is_empty()).then(|| PathBuf::from(v));
            }
            "--index-base" => args.index_base = value()?.parse().unwrap_or(0),
            "--gz" => args.gz = true,
            "--no-gz" => args.gz = false,
            "--sparse" => args.format = Format::Sparse,
            "--dense" => args.format = Format::Dense,
            "--dims" => args.dims = parse_dims(&value()?)?,
            "--nnz" => args.nnz = value()?.parse().unwrap_or(args.nnz),
            "--nc" => args.nc = value()?.parse().unwrap_or(args.nc),
            "--iters" => args.iters = value()?.parse().unwrap_or(args.iters),
            "--seed" => args.seed = value()?.parse().unwrap_or(args.seed),
            "--check" => args.check = value()?.trim() != "0",
            "--warmup" => args.warmup = value()?.trim() != "0",
            "--warmup-force-atomic" => args.warmup_force_atomic = value()?.trim() != "0",
            "--mttkrp-method" => args.mttkrp_method = parse_method(&value()?)?,
            "--mttkrp-tile-size" => args.mttkrp_tile_size = value()?.parse().unwrap_or(0),
            other => return Err(GcpError::invalid_argument(format!("unrecognized flag {other:?}"))),
        }
    }
    Ok(args)
}

fn random_sparse(dims: &[usize], nnz: usize, seed: u64) -> SparseTensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let coords: Vec<Vec<usize>> = (0..nnz)
        .map(|_| dims.iter().map(|&d| rng.gen_range(0..d)).collect())
        .collect();
    let values: Vec<f64> = (0..nnz).map(|_| rng.gen_range(0.0..1.0)).collect();
    SparseTensor::new(dims.to_vec(), coords, values).expect("generated coordinates are in range")
}

fn random_dense(dims: &[usize], seed: u64) -> DenseTensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let numel: usize = dims.iter().product();
    let values: Vec<f64> = (0..numel).map(|_| rng.gen_range(0.0..1.0)).collect();
    DenseTensor::from_values(dims.to_vec(), values).expect("generated buffer matches dims")
}

fn random_ktensor(dims: &[usize], r: usize, seed: u64) -> Ktensor {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let factors = dims
        .iter()
        .map(|&d| {
            let data: Vec<f64> = (0..d * r).map(|_| rng.gen_range(0.0..1.0)).collect();
            gcp_kernels::factor_matrix::FactorMatrix::from_values(d, r, data).unwrap()
        })
        .collect();
    Ktensor::new(vec![1.0; r], factors).unwrap()
}

/// Runs the sparse MTTKRP benchmark: a warmup pass that forces `Atomic` on
/// every mode (mirroring the warmup behavior `AlgParams` describes), then
/// the timed loop using `args.mttkrp_method` with a real Perm-without-a-
/// permutation fallback, then an optional correctness check against
/// [`mttkrp::sparse::reference`].
fn run_sparse(args: &Args, mut x: SparseTensor) -> Result<bool, GcpError> {
    let params = AlgParams::new()
        .with_mttkrp_method(args.mttkrp_method)
        .with_mttkrp_warmup_force_atomic(args.warmup_force_atomic);

    let u = random_ktensor(x.dims(), args.nc, args.seed);

    if args.mttkrp_tile_size > 0 {
        tracing::debug!(tile_size = args.mttkrp_tile_size, "tile size is advisory in this CLI");
    }

    if args.warmup {
        for n in 0..x.ndims() {
            let _ = mttkrp::dispatch(&x, &u, n, MttkrpMethod::Atomic)?;
        }
    }

    if matches!(args.mttkrp_method, MttkrpMethod::Perm) && !x.has_permutation() {
        x.fill_complete();
    }

    let start = Instant::now();
    for _ in 0..args.iters {
        for n in 0..x.ndims() {
            let _ =
                mttkrp::dispatch_with_fallback(&x, &u, n, args.mttkrp_method, ExecutionSpace::Cpu, &params)?;
        }
    }
    let elapsed = start.elapsed();
    tracing::info!(?elapsed, iters = args.iters, "mttkrp timing complete");

    if args.check {
        for n in 0..x.ndims() {
            let reference = mttkrp::sparse::reference(&x, &u, n)?;
            let got =
                mttkrp::dispatch_with_fallback(&x, &u, n, args.mttkrp_method, ExecutionSpace::Cpu, &params)?;
            for i in 0..reference.data().len() {
                let diff = (reference.data()[i] - got.data()[i]).abs();
                let tol = 1.0e3 * f64::EPSILON * reference.data()[i].abs().max(1.0);
                if diff > tol {
                    tracing::error!(mode = n, diff, tol, "correctness check failed");
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

/// Runs the dense MTTKRP benchmark. There is only one dense kernel
/// (`mttkrp::dense::dense`), so `--mttkrp-method`/`--warmup-force-atomic`
/// have no effect here; the warmup pass still runs one untimed call per
/// mode when requested.
fn run_dense(args: &Args, x: DenseTensor) -> Result<bool, GcpError> {
    let u = random_ktensor(x.dims(), args.nc, args.seed);

    if args.warmup {
        for n in 0..x.ndims() {
            let _ = mttkrp::dense::dense(&x, &u, n)?;
        }
    }

    let start = Instant::now();
    for _ in 0..args.iters {
        for n in 0..x.ndims() {
            let _ = mttkrp::dense::dense(&x, &u, n)?;
        }
    }
    let elapsed = start.elapsed();
    tracing::info!(?elapsed, iters = args.iters, "mttkrp timing complete");

    if args.check {
        for n in 0..x.ndims() {
            let reference = mttkrp::dense::dense_reference(&x, &u, n)?;
            let got = mttkrp::dense::dense(&x, &u, n)?;
            for i in 0..reference.data().len() {
                let diff = (reference.data()[i] - got.data()[i]).abs();
                let tol = 1.0e3 * f64::EPSILON * reference.data()[i].abs().max(1.0);
                if diff > tol {
                    tracing::error!(mode = n, diff, tol, "correctness check failed");
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

fn run() -> Result<bool, GcpError> {
    tracing_subscriber::fmt::init();
    let args = parse_args()?;

    let tensor = match &args.input {
        Some(path) => io::read_tensor_file(path, args.gz, args.index_base)?,
        None => match args.format {
            Format::Sparse => AnyTensor::Sparse(random_sparse(&args.dims, args.nnz, args.seed)),
            Format::Dense => AnyTensor::Dense(random_dense(&args.dims, args.seed)),
        },
    };

    match tensor {
        AnyTensor::Sparse(x) => run_sparse(&args, x),
        AnyTensor::Dense(x) => run_dense(&args, x),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("gcp-bench: {e}");
            ExitCode::from(255)
        }
    }
}
