//! Thin wrappers around raw LAPACK/BLAS calls, plus the hand-rolled blocked
//! fallback kernels required for portability when no BLAS is linked.
//!
//! Calls `T::xgetrf` and friends directly on raw slices rather than going
//! through a matrix abstraction. Storage here is row-major; LAPACK/BLAS
//! assume column-major, so every wrapper flips the `uplo`/`trans` flag to
//! compensate.

use crate::config::Uplo;
use crate::error::{GcpError, GcpResult};

fn uplo_char(uplo: Uplo) -> u8 {
    // Row-major storage viewed as column-major is the transpose, so the
    // triangle flips.
    match uplo {
        Uplo::Upper => b'L',
        Uplo::Lower => b'U',
    }
}

/// `y <- alpha * A^T x + beta * y` for row-major `A` of shape `[m x n]`
/// (BLAS sees it as column-major `[n x m]`, so the "no-transpose" BLAS call
/// already computes `A^T x` in our row-major convention; `transpose = true`
/// asks for `A x` instead).
pub fn gemv(a: &[f64], m: usize, n: usize, x: &[f64], y: &mut [f64], transpose: bool) {
    let trans = if transpose { b'T' } else { b'N' };
    let (lda, blas_m, blas_n) = (n as i32, n as i32, m as i32);
    unsafe {
        blas::dgemv(
            trans, blas_m, blas_n, 1.0, a, lda, x, 1, 0.0, y, 1,
        );
    }
}

/// Symmetric rank-k update: `C <- A^T A` for row-major `A` of shape
/// `[m x n]`, writing the triangle of `C` (shape `[n x n]`) selected by
/// `uplo`.
pub fn syrk(a: &[f64], m: usize, n: usize, c: &mut [f64], uplo: Uplo) {
    let u = uplo_char(uplo);
    // Row-major A^T A == column-major A A^T with A viewed as [n x m]; BLAS
    // `trans = 'N'` on the column-major view computes exactly that.
    unsafe {
        blas::dsyrk(u, b'N', n as i32, m as i32, 1.0, a, n as i32, 0.0, c, n as i32);
    }
}

/// Cholesky solve of `A X = B` (SPD path). `a` is `[n x n]` row-major,
/// `b` is `[n x nrhs]` row-major and is overwritten with the solution.
/// Returns `Ok(false)` (not an error) when LAPACK reports the matrix is not
/// positive definite, so the caller can fall back to [`sysv`].
pub fn posv(a: &mut [f64], n: usize, b: &mut [f64], nrhs: usize, uplo: Uplo) -> GcpResult<bool> {
    let u = uplo_char(uplo);
    let mut info = 0i32;
    unsafe {
        lapack::dposv(u, n as i32, nrhs as i32, a, n as i32, b, n as i32, &mut info);
    }
    if info < 0 {
        return Err(GcpError::numerical(format!(
            "dposv: illegal argument {}",
            -info
        )));
    }
    Ok(info == 0)
}

/// Symmetric indefinite (Bunch-Kaufman) solve of `A X = B`. `a` is
/// `[n x n]` row-major, `b` is `[n x nrhs]` row-major and is overwritten
/// with the solution.
pub fn sysv(a: &mut [f64], n: usize, b: &mut [f64], nrhs: usize, uplo: Uplo) -> GcpResult<()> {
    let u = uplo_char(uplo);
    let mut ipiv = vec![0i32; n];
    let mut info = 0i32;

    // Workspace query.
    let mut work = [0.0f64; 1];
    unsafe {
        lapack::dsysv(
            u, n as i32, nrhs as i32, a, n as i32, &mut ipiv, b, n as i32, &mut work, -1,
            &mut info,
        );
    }
    let lwork = work[0].max(1.0) as usize;
    let mut work = vec![0.0f64; lwork];
    unsafe {
        lapack::dsysv(
            u,
            n as i32,
            nrhs as i32,
            a,
            n as i32,
            &mut ipiv,
            b,
            n as i32,
            &mut work,
            lwork as i32,
            &mut info,
        );
    }
    if info < 0 {
        return Err(GcpError::numerical(format!(
            "dsysv: illegal argument {}",
            -info
        )));
    }
    if info > 0 {
        return Err(GcpError::numerical(
            "dsysv: matrix is exactly singular, solve failed",
        ));
    }
    Ok(())
}

/// General LU solve of `A X = B`, used for the `full = true` path of
/// `solve_transpose_rhs`.
pub fn gesv(a: &mut [f64], n: usize, b: &mut [f64], nrhs: usize) -> GcpResult<()> {
    let mut ipiv = vec![0i32; n];
    let mut info = 0i32;
    unsafe {
        lapack::dgesv(n as i32, nrhs as i32, a, n as i32, &mut ipiv, b, n as i32, &mut info);
    }
    if info < 0 {
        return Err(GcpError::numerical(format!(
            "dgesv: illegal argument {}",
            -info
        )));
    }
    if info > 0 {
        return Err(GcpError::numerical(
            "dgesv: matrix is exactly singular, solve failed",
        ));
    }
    Ok(())
}

/// Blocked, hand-rolled `C <- A^T A` fallback, used when no vendor BLAS is
/// linked. Block size is one of the same row-block sizes the SIMD
/// accumulator dispatches over (`{1,2,4,8,16,32}`).
pub fn gramian_fallback(a: &[f64], m: usize, n: usize, c: &mut [f64], uplo: Uplo, full: bool) {
    const BLOCK: usize = 8;
    c.iter_mut().for_each(|v| *v = 0.0);
    for row_block in (0..m).step_by(BLOCK) {
        let row_end = (row_block + BLOCK).min(m);
        for row in row_block..row_end {
            let a_row = &a[row * n..(row + 1) * n];
            for i in 0..n {
                let lo = if matches!(uplo, Uplo::Upper) { i } else { 0 };
                let hi = if matches!(uplo, Uplo::Upper) { n } else { i + 1 };
                let ai = a_row[i];
                for j in lo..hi {
                    c[i * n + j] += ai * a_row[j];
                }
            }
        }
    }
    if full {
        for i in 0..n {
            for j in 0..i {
                let (lo, hi) = (j, i);
                let src = c[lo * n + hi];
                c[hi * n + lo] = src;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gramian_fallback_matches_naive() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3x2
        let (m, n) = (3, 2);
        let mut c = vec![0.0; n * n];
        gramian_fallback(&a, m, n, &mut c, Uplo::Upper, true);

        let mut expected = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let mut s = 0.0;
                for k in 0..m {
                    s += a[k * n + i] * a[k * n + j];
                }
                expected[i * n + j] = s;
            }
        }
        for (got, want) in c.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12, "{got} vs {want}");
        }
    }

    #[test]
    fn gramian_fallback_is_symmetric_when_full() {
        let a = vec![1.0, -2.0, 0.5, 3.0, 2.0, -1.0]; // 3x2
        let mut c = vec![0.0; 4];
        gramian_fallback(&a, 3, 2, &mut c, Uplo::Upper, true);
        assert!((c[1] - c[2]).abs() < 1e-12);
    }
}
