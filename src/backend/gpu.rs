//! GPU execution space: dense, regular kernels, each a thin host-side
//! launch function that validates shapes and picks a grid, plus a
//! `#[cube(launch_unchecked)]` device kernel.
//!
//! Only the `Atomic` MTTKRP variant is permitted on GPU: it is the only
//! sparse variant whose synchronization (per-index atomic
//! scatter-add) has a direct, portable GPU intrinsic. `Single` and
//! `Duplicated` require either strict sequential ordering or per-worker
//! host memory that has no GPU analogue and are rejected before any kernel
//! launches (see `mttkrp::dispatch`). `Perm` is CPU-only because its
//! "accumulate in a register while the row is constant" strategy assumes
//! a small, fixed number of long-lived threads, not a SIMT grid.

use cubecl::prelude::*;
use cubecl::Runtime;
use cubecl::client::ComputeClient;
use cubecl::std::tensor::TensorHandle;

use crate::error::{GcpError, GcpResult};

const BLOCK_SIZE: u32 = 256;

/// Scatter-adds `nnz` precomputed per-nonzero contributions (one `R`-length
/// row each) into `output`'s row named by `target_row[i]`. The host side
/// (`mttkrp::sparse::atomic`) is responsible for computing each
/// contribution row (`value * lambda * prod_{m != n} U[m][coord_m]`);
/// this kernel only owns the atomic scatter, separating the per-nonzero
/// gather from the atomic write.
pub fn launch_atomic_scatter_add<R: Runtime, E: CubePrimitive + Numeric>(
    client: &ComputeClient<R>,
    contributions: &TensorHandle<R>,
    target_row: &TensorHandle<R>,
    output: &mut TensorHandle<R>,
) -> GcpResult<()> {
    let nnz = target_row.shape.first().copied().unwrap_or(0);
    if nnz == 0 {
        return Ok(());
    }
    let ncomponents = output.shape.get(1).copied().unwrap_or(0);

    let num_cubes = ((nnz as u32) + BLOCK_SIZE - 1) / BLOCK_SIZE;
    let cube_dim = CubeDim { x: BLOCK_SIZE, y: 1, z: 1 };
    let cube_count = CubeCount::Static(num_cubes, 1, 1);

    unsafe {
        atomic_scatter_add_kernel::launch_unchecked::<R>(
            client,
            cube_count,
            cube_dim,
            contributions.as_arg(1),
            target_row.as_arg(1),
            output.as_arg(1),
            ScalarArg::new(nnz),
            ScalarArg::new(ncomponents),
            E::as_type_native_unchecked(),
        )
        .map_err(|e| GcpError::launch(format!("atomic scatter-add kernel failed: {e:?}")))
    }
}

#[cube(launch_unchecked)]
fn atomic_scatter_add_kernel<E: Numeric>(
    contributions: &Tensor<Line<E>>,
    target_row: &Tensor<Line<E>>,
    output: &mut Tensor<Line<E>>,
    nnz: usize,
    ncomponents: usize,
    #[define(E)] _dtype: StorageType,
) {
    if ABSOLUTE_POS < nnz {
        let row = usize::cast_from(target_row[ABSOLUTE_POS][0]);
        let mut r = 0usize;
        while r < ncomponents {
            let out_idx = row * ncomponents + r;
            let contrib_idx = ABSOLUTE_POS * ncomponents + r;
            atomic_add(&mut output[out_idx], contributions[contrib_idx]);
            r += 1;
        }
    }
}
