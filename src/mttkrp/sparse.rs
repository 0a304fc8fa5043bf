//! The four sparse MTTKRP variants: `Single` (sequential), `Atomic`
//! (parallel scatter-add), `Duplicated` (per-worker private buffers,
//! reduced), and `Perm` (permutation-ordered, register-accumulated).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::cpu;
use crate::error::{GcpError, GcpResult};
use crate::factor_matrix::FactorMatrix;
use crate::ktensor::Ktensor;
use crate::tensor::SparseTensor;

use super::simd::accumulate_row;

fn factor_rows_excluding<'a>(u: &'a Ktensor, coord: &[usize], n: usize) -> Vec<&'a [f64]> {
    (0..u.ndims())
        .filter(|&m| m != n)
        .map(|m| u.factor(m).row(coord[m]))
        .collect()
}

fn check_mode(x: &SparseTensor, u: &Ktensor, n: usize) -> GcpResult<usize> {
    if n >= x.ndims() {
        return Err(GcpError::shape("mttkrp: mode out of range", x.ndims(), n));
    }
    if x.ndims() != u.ndims() {
        return Err(GcpError::shape("mttkrp: ndims mismatch", u.ndims(), x.ndims()));
    }
    for m in 0..x.ndims() {
        if u.factor(m).nrows() != x.dims()[m] {
            return Err(GcpError::shape(
                format!("mttkrp: factor {m} row count disagrees with tensor dim"),
                x.dims()[m],
                u.factor(m).nrows(),
            ));
        }
    }
    Ok(x.dims()[n])
}

/// Sequential accumulation, no atomics, no duplication. Correct only on a
/// single-threaded host; also used as the correctness-check reference
/// since it is the literal unoptimized formula.
pub fn single(x: &SparseTensor, u: &Ktensor, n: usize) -> GcpResult<FactorMatrix> {
    let dim_n = check_mode(x, u, n)?;
    let mut v = FactorMatrix::zeros(dim_n, u.ncomponents());
    for i in 0..x.nnz() {
        let coord = x.coord(i);
        let rows = factor_rows_excluding(u, coord, n);
        let row = v.row_mut(coord[n]);
        accumulate_row(row, x.value(i), u.lambda(), &rows);
    }
    Ok(v)
}

/// The single-threaded reference implementation used for correctness
/// cross-checks. Identical to [`single`] by construction: both are the
/// unoptimized formula with no parallel decomposition to get wrong.
pub fn reference(x: &SparseTensor, u: &Ktensor, n: usize) -> GcpResult<FactorMatrix> {
    single(x, u, n)
}

/// Parallel over nonzeros; each contribution is added to `V[coord_n, r]`
/// via an atomic compare-and-swap loop. Correct everywhere a CPU atomic
/// add is available; the GPU path launches
/// [`crate::backend::gpu::launch_atomic_scatter_add`] instead.
pub fn atomic(x: &SparseTensor, u: &Ktensor, n: usize) -> GcpResult<FactorMatrix> {
    let dim_n = check_mode(x, u, n)?;
    let r = u.ncomponents();
    let atomic_data: Vec<AtomicU64> = vec![0u64; dim_n * r]
        .into_iter()
        .map(AtomicU64::new)
        .collect();

    cpu::parallel_for_chunks(x.nnz(), |range| {
        for i in range {
            let coord = x.coord(i);
            let rows = factor_rows_excluding(u, coord, n);
            let contrib = super::simd::compute_row(x.value(i), u.lambda(), &rows);
            let base = coord[n] * r;
            for (c, val) in contrib.into_iter().enumerate() {
                cpu::atomic_add_f64(&atomic_data[base + c], val);
            }
        }
    });

    let mut v = FactorMatrix::zeros(dim_n, r);
    for (dst, src) in v.data_mut().iter_mut().zip(atomic_data.iter()) {
        *dst = f64::from_bits(src.load(Ordering::Relaxed));
    }
    Ok(v)
}

/// Threshold check for auto-selecting `Duplicated`: `dims[n] * P <= gamma
/// * nnz`.
pub fn duplicated_is_viable(dim_n: usize, nnz: usize, gamma: f64) -> bool {
    let p = cpu::num_workers().max(1);
    (dim_n * p) as f64 <= gamma * (nnz.max(1) as f64)
}

/// Parallel over nonzeros; each worker accumulates into a private
/// `[dims[n] x R]` buffer, then buffers are reduced into `V`. Forbidden on
/// GPU because the private buffers are host memory sized per worker
/// thread, not per SIMT lane.
pub fn duplicated(x: &SparseTensor, u: &Ktensor, n: usize) -> GcpResult<FactorMatrix> {
    let dim_n = check_mode(x, u, n)?;
    let r = u.ncomponents();
    let workers = cpu::num_workers().max(1);

    let buffers: Vec<Vec<f64>> = (0..workers).map(|_| vec![0.0; dim_n * r]).collect();
    let buffers = std::sync::Mutex::new(buffers);

    let nnz = x.nnz();
    if nnz > 0 {
        let chunk = nnz.div_ceil(workers);
        rayon::scope(|scope| {
            for (w, start) in (0..nnz).step_by(chunk).enumerate() {
                let end = (start + chunk).min(nnz);
                let buffers = &buffers;
                scope.spawn(move |_| {
                    let mut local = vec![0.0; dim_n * r];
                    for i in start..end {
                        let coord = x.coord(i);
                        let rows = factor_rows_excluding(u, coord, n);
                        let base = coord[n] * r;
                        accumulate_row(&mut local[base..base + r], x.value(i), u.lambda(), &rows);
                    }
                    buffers.lock().unwrap()[w] = local;
                });
            }
        });
    }

    let mut v = FactorMatrix::zeros(dim_n, r);
    for local in buffers.into_inner().unwrap() {
        for (dst, src) in v.data_mut().iter_mut().zip(local.iter()) {
            *dst += src;
        }
    }
    Ok(v)
}

/// Iterates nonzeros in `perm[n]` order so consecutive nonzeros sharing a
/// target row can be accumulated in a local register before a single
/// write. Requires [`SparseTensor::create_permutation`] to have run for
/// mode `n`. Atomic writes are only needed for the first and last row
/// visited by each worker's tile, because those two rows may continue
/// into the neighboring tile; every interior row is owned outright by one
/// worker.
pub fn perm(x: &SparseTensor, u: &Ktensor, n: usize) -> GcpResult<FactorMatrix> {
    let dim_n = check_mode(x, u, n)?;
    let r = u.ncomponents();
    let perm_n = x
        .perm(n)
        .ok_or_else(|| GcpError::unsupported("mttkrp Perm requires create_permutation for this mode"))?;

    let atomic_data: Vec<AtomicU64> = vec![0u64; dim_n * r]
        .into_iter()
        .map(AtomicU64::new)
        .collect();

    let nnz = x.nnz();
    if nnz > 0 {
        let workers = cpu::num_workers().max(1);
        let chunk = nnz.div_ceil(workers);
        rayon::scope(|scope| {
            let mut start = 0;
            while start < nnz {
                let end = (start + chunk).min(nnz);
                let atomic_data = &atomic_data;
                let perm_n = perm_n;
                scope.spawn(move |_| {
                    let mut k = start;
                    while k < end {
                        let row = x.coord(perm_n[k])[n];
                        let row_run_start = k;
                        let mut acc = vec![0.0; r];
                        while k < end && x.coord(perm_n[k])[n] == row {
                            let coord = x.coord(perm_n[k]);
                            let rows = factor_rows_excluding(u, coord, n);
                            accumulate_row(&mut acc, x.value(perm_n[k]), u.lambda(), &rows);
                            k += 1;
                        }
                        let is_boundary = row_run_start == start || k == end;
                        let base = row * r;
                        for (c, val) in acc.into_iter().enumerate() {
                            if is_boundary {
                                cpu::atomic_add_f64(&atomic_data[base + c], val);
                            } else {
                                // This chunk is the sole writer of this row: a
                                // plain store is equivalent to an add against
                                // the zero-initialized buffer.
                                atomic_data[base + c].store(val.to_bits(), Ordering::Relaxed);
                            }
                        }
                    }
                });
                start = end;
            }
        });
    }

    let mut v = FactorMatrix::zeros(dim_n, r);
    for (dst, src) in v.data_mut().iter_mut().zip(atomic_data.iter()) {
        *dst = f64::from_bits(src.load(Ordering::Relaxed));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor_matrix::FactorMatrix;

    fn scenario_2() -> (SparseTensor, Ktensor) {
        let x = SparseTensor::new(vec![2, 3, 4], vec![vec![0, 0, 0]], vec![1.0]).unwrap();
        let u0 = FactorMatrix::from_values(2, 1, vec![10.0, 11.0]).unwrap();
        let u1 = FactorMatrix::from_values(3, 1, vec![12.0, 13.0, 14.0]).unwrap();
        let u2 = FactorMatrix::from_values(4, 1, vec![15.0, 16.0, 17.0, 18.0]).unwrap();
        let u = Ktensor::new(vec![1.0], vec![u0, u1, u2]).unwrap();
        (x, u)
    }

    #[test]
    fn mode0_single_nonzero() {
        let (x, u) = scenario_2();
        let v = single(&x, &u, 0).unwrap();
        assert!((v.get(0, 0) - 180.0).abs() < 1e-9);
        assert!((v.get(1, 0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn mode0_two_nonzeros_all_variants_agree() {
        let (mut x, u) = scenario_2();
        let u0 = FactorMatrix::from_values(2, 1, vec![10.0, 11.0]).unwrap();
        let u1 = FactorMatrix::from_values(3, 1, vec![12.0, 13.0, 14.0]).unwrap();
        let u2 = FactorMatrix::from_values(4, 1, vec![15.0, 16.0, 17.0, 18.0]).unwrap();
        let u = Ktensor::new(vec![1.0], vec![u0, u1, u2]).unwrap();
        x = SparseTensor::new(
            vec![2, 3, 4],
            vec![vec![0, 0, 0], vec![1, 2, 3]],
            vec![1.0, 1.0],
        )
        .unwrap();
        x.fill_complete();

        let v_single = single(&x, &u, 0).unwrap();
        let v_atomic = atomic(&x, &u, 0).unwrap();
        let v_dup = duplicated(&x, &u, 0).unwrap();
        let v_perm = perm(&x, &u, 0).unwrap();

        assert!((v_single.get(0, 0) - 180.0).abs() < 1e-9);
        assert!((v_single.get(1, 0) - 252.0).abs() < 1e-9);

        for v in [&v_atomic, &v_dup, &v_perm] {
            for i in 0..2 {
                assert!(
                    (v.get(i, 0) - v_single.get(i, 0)).abs() < 1e3 * f64::EPSILON * v_single.get(i, 0).abs().max(1.0),
                    "variant mismatch at row {i}: {} vs {}",
                    v.get(i, 0),
                    v_single.get(i, 0)
                );
            }
        }
    }

    #[test]
    fn mode1_and_mode2() {
        let (mut x, u) = scenario_2();
        x = SparseTensor::new(
            vec![2, 3, 4],
            vec![vec![0, 0, 0], vec![1, 2, 3]],
            vec![1.0, 1.0],
        )
        .unwrap();
        let v1 = single(&x, &u, 1).unwrap();
        assert!((v1.get(0, 0) - 150.0).abs() < 1e-9);
        assert!((v1.get(1, 0) - 0.0).abs() < 1e-9);
        assert!((v1.get(2, 0) - 198.0).abs() < 1e-9);

        let v2 = single(&x, &u, 2).unwrap();
        assert!((v2.get(0, 0) - 120.0).abs() < 1e-9);
        assert!((v2.get(1, 0) - 0.0).abs() < 1e-9);
        assert!((v2.get(2, 0) - 0.0).abs() < 1e-9);
        assert!((v2.get(3, 0) - 154.0).abs() < 1e-9);
    }

    #[test]
    fn perm_requires_permutation() {
        let (x, u) = scenario_2();
        assert!(perm(&x, &u, 0).is_err());
    }

    #[test]
    fn zero_nnz_is_zero() {
        let x = SparseTensor::new(vec![2, 2], vec![], vec![]).unwrap();
        let u = Ktensor::zeros(&[2, 2], 2);
        let v = single(&x, &u, 0).unwrap();
        assert!(v.data().iter().all(|&e| e == 0.0));
    }
}
