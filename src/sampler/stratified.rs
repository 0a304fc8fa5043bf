//! Stratified sampling: nonzeros drawn uniformly with replacement from
//! `X`'s nonzero list; zero coordinates drawn uniformly from the full
//! index space and rejected/re-drawn on collision with a real nonzero.

use rand::rngs::StdRng;
use rand::Rng;

use super::hash::NonzeroSet;
use super::{RngPool, Sample, SampleBatch};
use crate::tensor::SparseTensor;

fn draw_random_coord(dims: &[usize], rng: &mut StdRng) -> Vec<usize> {
    dims.iter().map(|&d| rng.gen_range(0..d)).collect()
}

/// Draws `nnz_n` nonzero-stratum samples and `z_n` zero-stratum samples
/// from a single generator. `nnz_samples`/`z_samples` are the *total*
/// requested counts across all chunks, used for the strata weight formula;
/// `nnz_n`/`z_n` are this chunk's share of that total.
fn sample_chunk(
    x: &SparseTensor,
    nnz_n: usize,
    nnz_samples: usize,
    z_n: usize,
    z_samples: usize,
    known: Option<&NonzeroSet>,
    rng: &mut StdRng,
) -> SampleBatch {
    let nnz = x.nnz();
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
        (x.numel().saturating_sub(nnz)) as f64 / z_samples as f64
    };
    if z_n > 0 {
        let known = known.expect("z_n > 0 implies the caller built a NonzeroSet");
        let mut drawn = 0;
        // Bounded retries: with `numel >> nnz` (the regime this sampler
        // targets) collisions are rare; a hard cap avoids spinning
        // forever on a degenerate, near-dense tensor.
        let max_attempts = z_n.saturating_mul(64).max(1024);
        let mut attempts = 0;
        while drawn < z_n && attempts < max_attempts {
            attempts += 1;
            let coord = draw_random_coord(x.dims(), rng);
            if known.contains(&coord) {
                continue;
            }
            samples.push(Sample {
                coord,
                x: 0.0,
                weight: zero_weight,
                from_nonzero_stratum: false,
            });
            drawn += 1;
        }
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
    let known = (z_samples > 0).then(|| NonzeroSet::build(x));
    sample_chunk(x, nnz_samples, nnz_samples, z_samples, z_samples, known.as_ref(), rng)
}

/// Parallel variant of [`sample`]: splits the requested draw counts across
/// `pool`'s workers, each drawing from its own checked-out generator for
/// the duration of its chunk, then concatenates the partial batches.
/// Draws land in a different order than [`sample`] for the same seed
/// (each worker advances its own stream independently) but the strata
/// weights and the rejection-sampling contract are identical.
pub fn sample_parallel(x: &SparseTensor, nnz_samples: usize, z_samples: usize, pool: &mut RngPool) -> SampleBatch {
    let workers = pool.len();
    let known = (z_samples > 0).then(|| NonzeroSet::build(x));
    let nnz_chunks = split_counts(nnz_samples, workers);
    let z_chunks = split_counts(z_samples, workers);

    let results = std::sync::Mutex::new(vec![SampleBatch::default(); workers]);
    let known = known.as_ref();
    rayon::scope(|scope| {
        for (w, rng) in pool.workers_mut().iter_mut().enumerate() {
            let nnz_n = nnz_chunks[w];
            let z_n = z_chunks[w];
            let results = &results;
            scope.spawn(move |_| {
                let batch = sample_chunk(x, nnz_n, nnz_samples, z_n, z_samples, known, rng);
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
    fn zero_draws_never_collide_with_nonzeros() {
        let x = SparseTensor::new(
            vec![3, 3],
            vec![vec![0, 0], vec![1, 1], vec![2, 2]],
            vec![1.0, 1.0, 1.0],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let batch = sample(&x, 5, 10, &mut rng);
        let known = NonzeroSet::build(&x);
        for s in &batch.samples {
            if !s.from_nonzero_stratum {
                assert!(!known.contains(&s.coord));
            }
        }
    }

    #[test]
    fn weights_match_strata_formula() {
        let x = SparseTensor::new(vec![10, 10], vec![vec![0, 0]], vec![5.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let batch = sample(&x, 2, 3, &mut rng);
        for s in &batch.samples {
            if s.from_nonzero_stratum {
                assert!((s.weight - 1.0 / 2.0).abs() < 1e-12);
            } else {
                assert!((s.weight - 99.0 / 3.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn sample_parallel_draws_requested_counts_and_avoids_collisions() {
        let x = SparseTensor::new(
            vec![6, 6],
            vec![vec![0, 0], vec![1, 1], vec![2, 2], vec![3, 3]],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        let mut pool = RngPool::new(11, 4);
        let batch = sample_parallel(&x, 17, 23, &mut pool);
        assert_eq!(batch.samples.iter().filter(|s| s.from_nonzero_stratum).count(), 17);
        assert_eq!(batch.samples.iter().filter(|s| !s.from_nonzero_stratum).count(), 23);
        let known = NonzeroSet::build(&x);
        for s in &batch.samples {
            if !s.from_nonzero_stratum {
                assert!(!known.contains(&s.coord));
            }
        }
    }

    #[test]
    fn sample_parallel_weights_match_strata_formula() {
        let x = SparseTensor::new(vec![10, 10], vec![vec![0, 0]], vec![5.0]).unwrap();
        let mut pool = RngPool::new(9, 3);
        let batch = sample_parallel(&x, 6, 9, &mut pool);
        for s in &batch.samples {
            if s.from_nonzero_stratum {
                assert!((s.weight - 1.0 / 6.0).abs() < 1e-12);
            } else {
                assert!((s.weight - 99.0 / 9.0).abs() < 1e-12);
            }
        }
    }
}
