//! SIMD row dispatch: every per-nonzero accumulation is templated over a
//! compile-time column block size chosen from `{1,2,4,8,16,32}`; the
//! runtime component count `R` is rounded up to the smallest of these
//! `>= R`, with any remainder handled as a short tail block.

const BLOCK_SIZES: [usize; 6] = [1, 2, 4, 8, 16, 32];

/// Picks the smallest supported block size `>= r`, capping at the largest
/// (32), which then runs in multiple passes for its tail.
pub fn block_size_for(r: usize) -> usize {
    BLOCK_SIZES
        .iter()
        .copied()
        .find(|&b| b >= r)
        .unwrap_or(32)
}

/// Accumulates one nonzero's contribution into `out_row` (length `R`):
/// `out_row[r] += val * lambda[r] * prod_m factor_rows[m][r]`, computing
/// `val * lambda[r]` first, then multiplying in factors mode by mode.
#[inline]
fn accumulate_block<const BLOCK: usize>(
    out_row: &mut [f64],
    val: f64,
    lambda: &[f64],
    factor_rows: &[&[f64]],
) {
    let r = out_row.len();
    let mut base = 0;
    while base < r {
        let width = BLOCK.min(r - base);
        for b in 0..width {
            let rr = base + b;
            let mut v = val * lambda[rr];
            for frow in factor_rows {
                v *= frow[rr];
            }
            out_row[rr] += v;
        }
        base += width;
    }
}

/// Dispatches to the monomorphized block size for `out_row.len()`.
pub fn accumulate_row(out_row: &mut [f64], val: f64, lambda: &[f64], factor_rows: &[&[f64]]) {
    match block_size_for(out_row.len()) {
        1 => accumulate_block::<1>(out_row, val, lambda, factor_rows),
        2 => accumulate_block::<2>(out_row, val, lambda, factor_rows),
        4 => accumulate_block::<4>(out_row, val, lambda, factor_rows),
        8 => accumulate_block::<8>(out_row, val, lambda, factor_rows),
        16 => accumulate_block::<16>(out_row, val, lambda, factor_rows),
        _ => accumulate_block::<32>(out_row, val, lambda, factor_rows),
    }
}

/// Same contribution, returned as a fresh vector rather than accumulated
/// in place — used where the caller needs to stage a contribution before
/// an atomic or GPU scatter-add (e.g. `mttkrp::sparse::atomic`).
pub fn compute_row(val: f64, lambda: &[f64], factor_rows: &[&[f64]]) -> Vec<f64> {
    let r = lambda.len();
    let mut out = vec![0.0; r];
    accumulate_row(&mut out, val, lambda, factor_rows);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_rounds_up() {
        assert_eq!(block_size_for(1), 1);
        assert_eq!(block_size_for(3), 4);
        assert_eq!(block_size_for(5), 8);
        assert_eq!(block_size_for(17), 32);
        assert_eq!(block_size_for(40), 32);
    }

    #[test]
    fn accumulate_matches_naive_for_odd_r() {
        let lambda = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let f0 = vec![1.0, 1.0, 1.0, 1.0, 1.0];
        let f1 = vec![2.0, 2.0, 2.0, 2.0, 2.0];
        let mut out = vec![0.0; 5];
        accumulate_row(&mut out, 3.0, &lambda, &[&f0, &f1]);
        let expected: Vec<f64> = lambda.iter().map(|&l| 3.0 * l * 1.0 * 2.0).collect();
        for (g, e) in out.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-12);
        }
    }
}
