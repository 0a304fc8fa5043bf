//! MTTKRP: matricized-tensor-times-Khatri-Rao-product, the central kernel
//! of the GCP/CP-ALS decomposition loop. This module only dispatches; the
//! four sparse strategies live in [`sparse`], the dense path in [`dense`],
//! the multi-mode fused/iterated variants in [`all`], and the shared
//! row-accumulation primitive in [`simd`].

pub mod all;
pub mod dense;
pub mod simd;
pub mod sparse;

use crate::backend::ExecutionSpace;
use crate::config::{AlgParams, MttkrpMethod};
use crate::error::{GcpError, GcpResult};
use crate::factor_matrix::FactorMatrix;
use crate::ktensor::Ktensor;
use crate::tensor::SparseTensor;

/// Computes `V[n]` for a sparse tensor using the given method, on the CPU
/// execution space. Equivalent to calling [`dispatch_on`] with
/// `ExecutionSpace::Cpu`.
pub fn dispatch(
    x: &SparseTensor,
    u: &Ktensor,
    n: usize,
    method: MttkrpMethod,
) -> GcpResult<FactorMatrix> {
    dispatch_on(x, u, n, method, ExecutionSpace::Cpu)
}

/// Computes `V[n]`, rejecting unsupported method/backend combinations
/// before any kernel launches: `Single`/`Duplicated`/`OrigKokkos` on GPU,
/// and `Perm` without a built permutation.
pub fn dispatch_on(
    x: &SparseTensor,
    u: &Ktensor,
    n: usize,
    method: MttkrpMethod,
    space: ExecutionSpace,
) -> GcpResult<FactorMatrix> {
    if space.is_gpu() && !matches!(method, MttkrpMethod::Atomic) {
        return Err(GcpError::unsupported(format!(
            "mttkrp method {method:?} is not available on the GPU execution space; only Atomic is"
        )));
    }
    if matches!(method, MttkrpMethod::Perm) && !x.has_permutation() {
        return Err(GcpError::unsupported(
            "mttkrp Perm requires SparseTensor::create_permutation to have run",
        ));
    }

    match method {
        MttkrpMethod::Single | MttkrpMethod::OrigKokkos => sparse::single(x, u, n),
        MttkrpMethod::Atomic => sparse::atomic(x, u, n),
        MttkrpMethod::Duplicated => sparse::duplicated(x, u, n),
        MttkrpMethod::Perm => sparse::perm(x, u, n),
    }
}

/// Like [`dispatch_on`], but honors two `AlgParams` auto-corrections
/// instead of failing or wasting memory on an unfavorable shape:
/// `Perm` without a built permutation falls back to `Atomic` when
/// `mttkrp_warmup_force_atomic` is set, and `Duplicated` falls back to
/// `Atomic` when `sparse::duplicated_is_viable` says the per-worker
/// buffer cost is not worth it for this mode's size (`dims[n] * P <=
/// gamma * nnz`, `gamma = mttkrp_duplicated_threshold`).
pub fn dispatch_with_fallback(
    x: &SparseTensor,
    u: &Ktensor,
    n: usize,
    method: MttkrpMethod,
    space: ExecutionSpace,
    params: &AlgParams,
) -> GcpResult<FactorMatrix> {
    let mut effective = method;
    if matches!(effective, MttkrpMethod::Perm)
        && !x.has_permutation()
        && params.mttkrp_warmup_force_atomic
    {
        effective = MttkrpMethod::Atomic;
    }
    if matches!(effective, MttkrpMethod::Duplicated)
        && !sparse::duplicated_is_viable(x.dims()[n], x.nnz(), params.mttkrp_duplicated_threshold)
    {
        effective = MttkrpMethod::Atomic;
    }
    dispatch_on(x, u, n, effective, space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor_matrix::FactorMatrix;

    fn scenario() -> (SparseTensor, Ktensor) {
        let u0 = FactorMatrix::from_values(2, 1, vec![10.0, 11.0]).unwrap();
        let u1 = FactorMatrix::from_values(3, 1, vec![12.0, 13.0, 14.0]).unwrap();
        let u2 = FactorMatrix::from_values(4, 1, vec![15.0, 16.0, 17.0, 18.0]).unwrap();
        let u = Ktensor::new(vec![1.0], vec![u0, u1, u2]).unwrap();
        let x = SparseTensor::new(vec![2, 3, 4], vec![vec![0, 0, 0]], vec![1.0]).unwrap();
        (x, u)
    }

    #[test]
    fn rejects_single_on_gpu() {
        let (x, u) = scenario();
        let err = dispatch_on(&x, &u, 0, MttkrpMethod::Single, ExecutionSpace::Gpu);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_duplicated_on_gpu() {
        let (x, u) = scenario();
        let err = dispatch_on(&x, &u, 0, MttkrpMethod::Duplicated, ExecutionSpace::Gpu);
        assert!(err.is_err());
    }

    #[test]
    fn allows_atomic_on_gpu() {
        // `dispatch_on` only validates the method/backend combination; a
        // real GPU launch needs a `cubecl` Runtime/ComputeClient that
        // this signature does not carry, so the call still runs the CPU
        // kernel. See `backend::gpu::launch_atomic_scatter_add` for the
        // actual device kernel exercised once a client is available.
        let (x, u) = scenario();
        let v = dispatch_on(&x, &u, 0, MttkrpMethod::Atomic, ExecutionSpace::Gpu);
        assert!(v.is_ok());
    }

    #[test]
    fn rejects_perm_without_permutation() {
        let (x, u) = scenario();
        let err = dispatch(&x, &u, 0, MttkrpMethod::Perm);
        assert!(err.is_err());
    }

    #[test]
    fn dispatch_with_fallback_falls_back_to_atomic_without_permutation() {
        let (x, u) = scenario();
        let params = AlgParams::new().with_mttkrp_warmup_force_atomic(true);
        let v = dispatch_with_fallback(
            &x,
            &u,
            0,
            MttkrpMethod::Perm,
            ExecutionSpace::Cpu,
            &params,
        );
        assert!(v.is_ok());
    }

    #[test]
    fn dispatch_with_fallback_falls_back_to_atomic_when_duplicated_not_viable() {
        // A single nonzero against the default threshold (gamma = 0.25) is
        // never viable for `Duplicated` regardless of worker count.
        let (x, u) = scenario();
        let params = AlgParams::new();
        let v = dispatch_with_fallback(
            &x,
            &u,
            0,
            MttkrpMethod::Duplicated,
            ExecutionSpace::Cpu,
            &params,
        );
        assert!(v.is_ok());
    }

    #[test]
    fn dispatch_with_fallback_still_errors_when_disabled() {
        let (x, u) = scenario();
        let params = AlgParams::new().with_mttkrp_warmup_force_atomic(false);
        let v = dispatch_with_fallback(
            &x,
            &u,
            0,
            MttkrpMethod::Perm,
            ExecutionSpace::Cpu,
            &params,
        );
        assert!(v.is_err());
    }

    #[test]
    fn single_matches_atomic() {
        let (x, u) = scenario();
        let v1 = dispatch(&x, &u, 0, MttkrpMethod::Single).unwrap();
        let v2 = dispatch(&x, &u, 0, MttkrpMethod::Atomic).unwrap();
        for i in 0..v1.data().len() {
            assert!((v1.data()[i] - v2.data()[i]).abs() < 1e-9);
        }
    }
}
