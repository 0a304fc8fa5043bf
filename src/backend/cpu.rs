//! CPU execution space: `rayon` for `launch_parallel_for`, a CAS-loop
//! `f64` atomic add, per-worker scratch buffers for `Duplicated` MTTKRP,
//! and `fence` as a no-op (a `rayon::scope` already joins all its spawned
//! work before returning, satisfying the fence requirement for free).

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of workers the CPU execution space will fan a parallel region
/// out to. Used by `Duplicated` MTTKRP's viability threshold
/// (`dims[n] * workers <= gamma * nnz`).
pub fn num_workers() -> usize {
    rayon::current_num_threads()
}

/// Atomically adds `val` to the `f64` at `*target`, implemented via a
/// compare-and-swap loop over the bit pattern — `std` has no native
/// `AtomicF64`. Used by the `Atomic` MTTKRP variant's scatter-add into the
/// output factor matrix.
#[inline]
pub fn atomic_add_f64(target: &AtomicU64, val: f64) {
    let mut current = target.load(Ordering::Relaxed);
    loop {
        let new = f64::from_bits(current) + val;
        match target.compare_exchange_weak(
            current,
            new.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

/// Runs `nnz` units of work in parallel chunks, handing each chunk's index
/// range to `body`. This is `launch_parallel_for` for the `Duplicated` and
/// `Atomic` MTTKRP variants, which partition work by nonzero range rather
/// than by element so each worker's chunk is contiguous in `perm` order.
pub fn parallel_for_chunks(n: usize, body: impl Fn(std::ops::Range<usize>) + Sync) {
    if n == 0 {
        return;
    }
    let workers = num_workers().max(1);
    let chunk = n.div_ceil(workers);
    rayon::scope(|scope| {
        let mut start = 0;
        while start < n {
            let end = (start + chunk).min(n);
            let body = &body;
            scope.spawn(move |_| body(start..end));
            start = end;
        }
    });
    // `rayon::scope` already fences on return.
}
