//! MTTKRP variant comparison benchmark. `harness = false`: a plain `main`
//! timing loop rather than `cubecl::benchmark::Benchmark` (that trait is
//! built for device kernels with a `prepare`/`execute`/device-timer
//! split; a CPU-only kernel has no such split to model).

use std::time::Instant;

use gcp_kernels::config::MttkrpMethod;
use gcp_kernels::factor_matrix::FactorMatrix;
use gcp_kernels::ktensor::Ktensor;
use gcp_kernels::mttkrp;
use gcp_kernels::tensor::SparseTensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_sparse(dims: &[usize], nnz: usize, seed: u64) -> SparseTensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let coords: Vec<Vec<usize>> = (0..nnz)
        .map(|_| dims.iter().map(|&d| rng.gen_range(0..d)).collect())
        .collect();
    let values: Vec<f64> = (0..nnz).map(|_| rng.gen_range(0.0..1.0)).collect();
    SparseTensor::new(dims.to_vec(), coords, values).unwrap()
}

fn random_ktensor(dims: &[usize], r: usize, seed: u64) -> Ktensor {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let factors = dims
        .iter()
        .map(|&d| {
            let data: Vec<f64> = (0..d * r).map(|_| rng.gen_range(0.0..1.0)).collect();
            FactorMatrix::from_values(d, r, data).unwrap()
        })
        .collect();
    Ktensor::new(vec![1.0; r], factors).unwrap()
}

fn time_variant(x: &SparseTensor, u: &Ktensor, method: MttkrpMethod, iters: usize) -> std::time::Duration {
    let start = Instant::now();
    for _ in 0..iters {
        for n in 0..x.ndims() {
            mttkrp::dispatch(x, u, n, method).unwrap();
        }
    }
    start.elapsed()
}

fn main() {
    let dims = [200usize, 200, 200];
    let nnz = 200_000;
    let nc = 16;
    let iters = 5;

    let mut x = random_sparse(&dims, nnz, 0);
    x.fill_complete();
    let u = random_ktensor(&dims, nc, 1);

    for method in [
        MttkrpMethod::Single,
        MttkrpMethod::Atomic,
        MttkrpMethod::Duplicated,
        MttkrpMethod::Perm,
    ] {
        let elapsed = time_variant(&x, &u, method, iters);
        println!("{method:?}: {elapsed:?} total over {iters} passes ({} modes each)", x.ndims());
    }
}
