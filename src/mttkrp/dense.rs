//! Dense MTTKRP: the same contraction as the sparse variants, but
//! iterating every element of a [`DenseTensor`] rather than a nonzero
//! list.

use crate::backend::cpu;
use crate::error::GcpResult;
use crate::factor_matrix::FactorMatrix;
use crate::ktensor::Ktensor;
use crate::tensor::DenseTensor;

use super::simd::accumulate_row;

/// `V[n] <- sum_{i} X[i] * lambda * prod_{m != n} U[m][i_m, :]`, parallel
/// over dense elements with atomic scatter-add into `V` (every element
/// touches exactly one target row, same as the sparse `Atomic` variant).
pub fn dense(x: &DenseTensor, u: &Ktensor, n: usize) -> GcpResult<FactorMatrix> {
    use std::sync::atomic::{AtomicU64, Ordering};

    if x.ndims() != u.ndims() {
        return Err(crate::error::GcpError::shape(
            "dense mttkrp: ndims mismatch",
            u.ndims(),
            x.ndims(),
        ));
    }
    let dim_n = x.dims()[n];
    let r = u.ncomponents();
    let atomic_data: Vec<AtomicU64> = vec![0u64; dim_n * r]
        .into_iter()
        .map(AtomicU64::new)
        .collect();

    let coords: Vec<(Vec<usize>, f64)> = x.iter_coords().collect();
    cpu::parallel_for_chunks(coords.len(), |range| {
        for i in range {
            let (coord, value) = &coords[i];
            if *value == 0.0 {
                continue;
            }
            let rows: Vec<&[f64]> = (0..u.ndims())
                .filter(|&m| m != n)
                .map(|m| u.factor(m).row(coord[m]))
                .collect();
            let contrib = super::simd::compute_row(*value, u.lambda(), &rows);
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

/// Sequential reference used by correctness tests: identical contraction,
/// no parallelism.
pub fn dense_reference(x: &DenseTensor, u: &Ktensor, n: usize) -> GcpResult<FactorMatrix> {
    let dim_n = x.dims()[n];
    let mut v = FactorMatrix::zeros(dim_n, u.ncomponents());
    for (coord, value) in x.iter_coords() {
        if value == 0.0 {
            continue;
        }
        let rows: Vec<&[f64]> = (0..u.ndims())
            .filter(|&m| m != n)
            .map(|m| u.factor(m).row(coord[m]))
            .collect();
        let row = v.row_mut(coord[n]);
        accumulate_row(row, value, u.lambda(), &rows);
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_matches_reference() {
        let x = DenseTensor::from_values(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let u0 = FactorMatrix::from_values(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let u1 = FactorMatrix::from_values(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let u = Ktensor::new(vec![1.0, 1.0], vec![u0, u1]).unwrap();

        let v_ref = dense_reference(&x, &u, 0).unwrap();
        let v_par = dense(&x, &u, 0).unwrap();
        for i in 0..v_ref.data().len() {
            assert!((v_ref.data()[i] - v_par.data()[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_elements_are_skipped() {
        let x = DenseTensor::zeros(vec![2, 2]);
        let u = Ktensor::zeros(&[2, 2], 2);
        let v = dense_reference(&x, &u, 0).unwrap();
        assert!(v.data().iter().all(|&e| e == 0.0));
    }
}
