//! Semi-stratified sampling: zero draws are not checked against the
//! nonzero set — a draw that happens to land on a real nonzero is left
//! as-is, and the gradient kernel corrects for it by subtracting the
//! model's nonzero-evaluated derivative. This removes the hash lookup
//! from the hot path and allows a fused nonzero+zero kernel.

use rand::rngs::StdRng;
use rand::Rng;

use super::{RngPool, Sample, SampleBatch};
use crate::tensor::SparseTensor;

fn draw_random_coord(dims: &[usize], rng: &mut StdRng) -> Vec<usize> {
    dims.iter().map(|&d| rng.gen_range(0..d)).collect()
}

/// Draws `nnz_n` nonzero-stratum samples and `z_n` zero-stratum samples
/// from a single generator; `nnz_samples`/`z_samples` are the total
/// requested counts across all chunks, used for the strata weight
/// formula.
fn sample_chunk(
    x: &SparseTensor,
    nnz_n: usize,
    nnz_samples: usize,
    z_n: usize,
    z_samples: usize,
    rng: &mut StdRng,
) -> SampleBatch {
    let nnz = x.nnz();
    let numel = x.numel();
    let mut samples = Vec::with_capacity(nnz_n + z_n);

    let nnz_weight = if nnz_samples == 0 {
        0.0
    } else {
        nnz as f64 / nnz_samples as f64
    };
    for _ in 0..nnz_n {
        if nnz == 0 {
            break;
        }
        let i = rng.gen_range(0..nnz);
        samples.push(Sample {
            coord: x.coord(i).to_vec(),
            x: x.value(i),
            weight: nnz_weight,
            from_nonzero_stratum: true,
        });
    }

    let zero_weight = if z_samples == 0 {
        0.0
    } else {
        (numel.saturating_sub(nnz)) as f64 / z_samples as f64
    };
    for _ in 0..z_n {
        // No collision check: an unlucky draw that lands on a real
        // nonzero is tagged `from_nonzero_stratum = false` regardless,
        // and is treated as a zero draw by the gradient weighting.
        let coord = draw_random_coord(x.dims(), rng);
        samples.push(Sample {
            coord,
            x: 0.0,
            weight: zero_weight,
            from_nonzero_stratum: false,
        });
    }

    SampleBatch { samples }
}

/// Splits `total` as evenly as possible across `workers` chunks.
fn split_counts(total: usize, workers: usize) -> Vec<usize> {
    let base = total / workers;
    let rem = total % workers;
    (0..workers).map(|w| base + usize::from(w < rem)).collect()
}

pub fn sample(x: &SparseTensor, nnz_samples: usize, z_samples: usize, rng: &mut StdRng) -> SampleBatch {
    sample_chunk(x, nnz_samples, nnz_samples, z_samples, z_samples, rng)
}

/// Parallel variant of [`sample`]: splits the requested draw counts
/// across `pool`'s workers, each drawing from its own checked-out
/// generator for the duration of its chunk, then concatenates the
/// partial batches. No collision check means no shared read-only state
/// is needed across workers, unlike [`super::stratified::sample_parallel`].
pub fn sample_parallel(x: &SparseTensor, nnz_samples: usize, z_samples: usize, pool: &mut RngPool) -> SampleBatch {
    let workers = pool.len();
    let nnz_chunks = split_counts(nnz_samples, workers);
    let z_chunks = split_counts(z_samples, workers);

    let results = std::sync::Mutex::new(vec![SampleBatch::default(); workers]);
    rayon::scope(|scope| {
        for (w, rng) in pool.workers_mut().iter_mut().enumerate() {
            let nnz_n = nnz_chunks[w];
            let z_n = z_chunks[w];
            let results = &results;
            scope.spawn(move |_| {
                let batch = sample_chunk(x, nnz_n, nnz_samples, z_n, z_samples, rng);
                results.lock().unwrap()[w] = batch;
            });
        }
    });

    let samples = results
        .into_inner()
        .unwrap()
        .into_iter()
        .flat_map(|b| b.samples)
        .collect();
    SampleBatch { samples }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn draws_requested_counts() {
        let x = SparseTensor::new(vec![4, 4], vec![vec![0, 0]], vec![1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let batch = sample(&x, 5, 7, &mut rng);
        assert_eq!(batch.samples.iter().filter(|s| s.from_nonzero_stratum).count(), 5);
        assert_eq!(batch.samples.iter().filter(|s| !s.from_nonzero_stratum).count(), 7);
    }

    #[test]
    fn zero_samples_carry_zero_data_value() {
        let x = SparseTensor::new(vec![4, 4], vec![vec![0, 0]], vec![1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let batch = sample(&x, 0, 20, &mut rng);
        assert!(batch.samples.iter().all(|s| s.x == 0.0));
    }

    #[test]
    fn sample_parallel_draws_requested_counts() {
        let x = SparseTensor::new(vec![6, 6], vec![vec![0, 0], vec![1, 1]], vec![1.0, 2.0]).unwrap();
        let mut pool = RngPool::new(5, 4);
        let batch = sample_parallel(&x, 13, 19, &mut pool);
        assert_eq!(batch.samples.iter().filter(|s| s.from_nonzero_stratum).count(), 13);
        assert_eq!(batch.samples.iter().filter(|s| !s.from_nonzero_stratum).count(), 19);
    }
}
