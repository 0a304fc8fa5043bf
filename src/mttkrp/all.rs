//! MTTKRP-all: computing every mode's factor-matrix update from one
//! GCP-SGD gradient sample. `iterated` is the naive N-pass baseline; the
//! other three variants mirror the per-mode sparse strategies, but walk
//! the nonzero list once and compute all `N` modes' contributions per
//! nonzero before writing out: `fused_single` (sequential, no atomics),
//! `fused` (`Atomic`, parallel scatter-add), and `fused_duplicated`
//! (per-worker private buffers, reduced). [`dispatch`] picks among them by
//! [`MttkrpMethod`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::cpu;
use crate::config::MttkrpMethod;
use crate::error::GcpResult;
use crate::factor_matrix::FactorMatrix;
use crate::ktensor::Ktensor;
use crate::tensor::SparseTensor;

use super::simd::accumulate_row;

/// Runs `mttkrp` once per mode via [`super::dispatch`], Single/Atomic/
/// Duplicated/Perm all routed the same as a standalone call. This is the
/// straightforward baseline the fused path is checked against.
pub fn iterated(
    x: &SparseTensor,
    u: &Ktensor,
    method: MttkrpMethod,
) -> GcpResult<Vec<FactorMatrix>> {
    (0..u.ndims())
        .map(|n| super::dispatch(x, u, n, method))
        .collect()
}

/// One pass over the nonzero list, computing every mode's contribution for
/// each nonzero before the atomic scatter. Always uses the `Atomic`
/// scatter strategy per mode, the only one that composes across modes
/// without per-mode private buffers ballooning memory by a factor of `N`.
pub fn fused(x: &SparseTensor, u: &Ktensor) -> GcpResult<Vec<FactorMatrix>> {
    if x.ndims() != u.ndims() {
        return Err(crate::error::GcpError::shape(
            "mttkrp_all fused: ndims mismatch",
            u.ndims(),
            x.ndims(),
        ));
    }
    let r = u.ncomponents();
    let dims = x.dims().to_vec();
    let atomic_data: Vec<Vec<AtomicU64>> = dims
        .iter()
        .map(|&d| (0..d * r).map(|_| AtomicU64::new(0)).collect())
        .collect();

    cpu::parallel_for_chunks(x.nnz(), |range| {
        for i in range {
            let coord = x.coord(i);
            let value = x.value(i);
            for n in 0..u.ndims() {
                let rows: Vec<&[f64]> = (0..u.ndims())
                    .filter(|&m| m != n)
                    .map(|m| u.factor(m).row(coord[m]))
                    .collect();
                let contrib = super::simd::compute_row(value, u.lambda(), &rows);
                let base = coord[n] * r;
                for (c, val) in contrib.into_iter().enumerate() {
                    cpu::atomic_add_f64(&atomic_data[n][base + c], val);
                }
            }
        }
    });

    Ok(atomic_data
        .into_iter()
        .zip(dims.iter())
        .map(|(buf, &dim_n)| {
            let mut v = FactorMatrix::zeros(dim_n, r);
            for (dst, src) in v.data_mut().iter_mut().zip(buf.iter()) {
                *dst = f64::from_bits(src.load(Ordering::Relaxed));
            }
            v
        })
        .collect())
}

/// Sequential fused pass, no atomics, no duplication: the `Single`
/// MTTKRP-all variant. Also serves as the correctness-check reference
/// for [`fused`]/[`fused_duplicated`] since it is the literal unoptimized
/// formula.
pub fn fused_single(x: &SparseTensor, u: &Ktensor) -> GcpResult<Vec<FactorMatrix>> {
    if x.ndims() != u.ndims() {
        return Err(crate::error::GcpError::shape(
            "mttkrp_all fused_single: ndims mismatch",
            u.ndims(),
            x.ndims(),
        ));
    }
    let mut out: Vec<FactorMatrix> = x
        .dims()
        .iter()
        .map(|&d| FactorMatrix::zeros(d, u.ncomponents()))
        .collect();
    for i in 0..x.nnz() {
        let coord = x.coord(i);
        let value = x.value(i);
        for n in 0..u.ndims() {
            let rows: Vec<&[f64]> = (0..u.ndims())
                .filter(|&m| m != n)
                .map(|m| u.factor(m).row(coord[m]))
                .collect();
            let row = out[n].row_mut(coord[n]);
            accumulate_row(row, value, u.lambda(), &rows);
        }
    }
    Ok(out)
}

/// Parallel over nonzeros; each worker accumulates every mode's
/// contribution into private per-mode `[dims[n] x R]` buffers, which are
/// reduced into the output at the end: the `Duplicated` MTTKRP-all
/// variant, generalizing [`super::sparse::duplicated`] across every mode
/// in one sweep. Forbidden on GPU for the same reason as the per-mode
/// case: the private buffers are host memory sized per worker thread.
pub fn fused_duplicated(x: &SparseTensor, u: &Ktensor) -> GcpResult<Vec<FactorMatrix>> {
    if x.ndims() != u.ndims() {
        return Err(crate::error::GcpError::shape(
            "mttkrp_all fused_duplicated: ndims mismatch",
            u.ndims(),
            x.ndims(),
        ));
    }
    let r = u.ncomponents();
    let dims = x.dims().to_vec();
    let workers = cpu::num_workers().max(1);

    let buffers: Vec<Vec<Vec<f64>>> = (0..workers)
        .map(|_| dims.iter().map(|&d| vec![0.0; d * r]).collect())
        .collect();
    let buffers = std::sync::Mutex::new(buffers);

    let nnz = x.nnz();
    if nnz > 0 {
        let chunk = nnz.div_ceil(workers);
        rayon::scope(|scope| {
            for (w, start) in (0..nnz).step_by(chunk).enumerate() {
                let end = (start + chunk).min(nnz);
                let buffers = &buffers;
                let dims = &dims;
                scope.spawn(move |_| {
                    let mut local: Vec<Vec<f64>> =
                        dims.iter().map(|&d| vec![0.0; d * r]).collect();
                    for i in start..end {
                        let coord = x.coord(i);
                        let value = x.value(i);
                        for n in 0..u.ndims() {
                            let rows: Vec<&[f64]> = (0..u.ndims())
                                .filter(|&m| m != n)
                                .map(|m| u.factor(m).row(coord[m]))
                                .collect();
                            let base = coord[n] * r;
                            accumulate_row(&mut local[n][base..base + r], value, u.lambda(), &rows);
                        }
                    }
                    buffers.lock().unwrap()[w] = local;
                });
            }
        });
    }

    let mut out: Vec<FactorMatrix> = dims.iter().map(|&d| FactorMatrix::zeros(d, r)).collect();
    for local in buffers.into_inner().unwrap() {
        for (n, buf) in local.into_iter().enumerate() {
            for (dst, src) in out[n].data_mut().iter_mut().zip(buf.iter()) {
                *dst += src;
            }
        }
    }
    Ok(out)
}

/// Dispatches the fused MTTKRP-all pass by method: `Single`/`Atomic`/
/// `Duplicated` route to [`fused_single`]/[`fused`]/[`fused_duplicated`].
/// `Perm` has no fused-all counterpart (there is no single shared order
/// across modes that keeps every mode's permutation locality) and is
/// rejected rather than silently falling back.
pub fn dispatch(x: &SparseTensor, u: &Ktensor, method: MttkrpMethod) -> GcpResult<Vec<FactorMatrix>> {
    match method {
        MttkrpMethod::Single | MttkrpMethod::OrigKokkos => fused_single(x, u),
        MttkrpMethod::Atomic => fused(x, u),
        MttkrpMethod::Duplicated => fused_duplicated(x, u),
        MttkrpMethod::Perm => Err(crate::error::GcpError::unsupported(
            "mttkrp_all has no Perm fused variant",
        )),
    }
}

/// Single-threaded reference matching `fused`'s contract, used to check
/// the fused kernel's accumulation order is not scrambled by parallelism.
/// Identical to [`fused_single`] by construction.
pub fn fused_reference(x: &SparseTensor, u: &Ktensor) -> GcpResult<Vec<FactorMatrix>> {
    fused_single(x, u)
}
