//! End-to-end tests exercising the full stack: sparse tensor construction,
//! MTTKRP variant cross-checks, and a short GCP-SGD run.

use gcp_kernels::config::{AlgParams, MttkrpMethod};
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
    let values: Vec<f64> = (0..nnz).map(|_| rng.gen_range(0.1..1.0)).collect();
    SparseTensor::new(dims.to_vec(), coords, values).unwrap()
}

fn random_ktensor(dims: &[usize], r: usize, seed: u64) -> Ktensor {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let factors = dims
        .iter()
        .map(|&d| {
            let data: Vec<f64> = (0..d * r).map(|_| rng.gen_range(0.1..1.0)).collect();
            FactorMatrix::from_values(d, r, data).unwrap()
        })
        .collect();
    Ktensor::new(vec![1.0; r], factors).unwrap()
}

#[test]
fn sparse_mttkrp_variants_agree_within_tolerance() {
    let dims = [15usize, 10, 8];
    let mut x = random_sparse(&dims, 300, 42);
    x.fill_complete();
    let u = random_ktensor(&dims, 4, 99);

    for n in 0..x.ndims() {
        let reference = mttkrp::sparse::reference(&x, &u, n).unwrap();
        for method in [
            MttkrpMethod::Single,
            MttkrpMethod::Atomic,
            MttkrpMethod::Duplicated,
            MttkrpMethod::Perm,
        ] {
            let got = mttkrp::dispatch(&x, &u, n, method).unwrap();
            for i in 0..reference.data().len() {
                let diff = (reference.data()[i] - got.data()[i]).abs();
                let tol = 1.0e3 * f64::EPSILON * reference.data()[i].abs().max(1.0);
                assert!(
                    diff <= tol,
                    "mode {n} method {method:?} entry {i}: {} vs {} (diff {diff}, tol {tol})",
                    got.data()[i],
                    reference.data()[i]
                );
            }
        }
    }
}

#[test]
fn mttkrp_all_fused_matches_per_mode_dispatch() {
    let dims = [6usize, 7, 5];
    let mut x = random_sparse(&dims, 80, 7);
    x.fill_complete();
    let u = random_ktensor(&dims, 3, 11);

    let fused = mttkrp::all::fused(&x, &u).unwrap();
    for n in 0..x.ndims() {
        let direct = mttkrp::dispatch(&x, &u, n, MttkrpMethod::Single).unwrap();
        for i in 0..direct.data().len() {
            assert!((fused[n].data()[i] - direct.data()[i]).abs() < 1e-6);
        }
    }
}

#[test]
fn gcp_sgd_regression_is_stable_on_synthetic_data() {
    let dims = [20usize, 20, 20];
    let x = random_sparse(&dims, 400, 1);
    let u0 = random_ktensor(&dims, 5, 2);

    let params = AlgParams {
        max_epochs: 10,
        epoch_iters: 20,
        frozen_iters: 1,
        num_samples_nonzeros_grad: 50,
        num_samples_zeros_grad: 50,
        num_samples_nonzeros_value: 50,
        num_samples_zeros_value: 50,
        rate: 1.0e-3,
        ..AlgParams::default()
    };

    let (fitted, report) = gcp_kernels::gcp_sgd::run(&x, u0, &params).unwrap();
    fitted.check_consistent().unwrap();
    assert!(report.nfails <= params.max_fails);
    for pair in report.fest_history.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-9);
    }
}

#[test]
fn innerprod_matches_reference_summation() {
    let dims = [10usize, 9, 8];
    let x = random_sparse(&dims, 50, 5);
    let u = random_ktensor(&dims, 3, 6);

    let fast = u.innerprod(&x).unwrap();
    let mut reference = 0.0;
    for i in 0..x.nnz() {
        let coord = x.coord(i);
        let mut row_sum = 0.0;
        for c in 0..u.ncomponents() {
            let mut prod = u.lambda()[c];
            for (m, &idx) in coord.iter().enumerate() {
                prod *= u.factor(m).get(idx, c);
            }
            row_sum += prod;
        }
        reference += x.value(i) * row_sum;
    }
    assert!((fast - reference).abs() < 1e3 * f64::EPSILON * reference.abs().max(1.0));
}
