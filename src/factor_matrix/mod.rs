//! Factor matrix operations: Gramian, column norms/scale, column
//! permutation, and the symmetric transpose-RHS solve used by CP-ALS.
//!
//! Storage is row-major `[nrows x ncols]`. No padded leading dimension is
//! used here, since this crate never mirrors a host buffer to a GPU with
//! a fixed stride expectation (see DESIGN.md).

pub mod blas;

use crate::config::{NormType, Uplo};
use crate::error::{GcpError, GcpResult};

/// A dense `[nrows x ncols]` matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorMatrix {
    nrows: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl FactorMatrix {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![0.0; nrows * ncols],
        }
    }

    pub fn from_values(nrows: usize, ncols: usize, data: Vec<f64>) -> GcpResult<Self> {
        if data.len() != nrows * ncols {
            return Err(GcpError::shape("factor matrix data size", nrows * ncols, data.len()));
        }
        Ok(Self { nrows, ncols, data })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.ncols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, v: f64) {
        self.data[row * self.ncols + col] = v;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    fn check_square(&self, other: &FactorMatrix) -> GcpResult<()> {
        if self.ncols != other.ncols {
            return Err(GcpError::shape(
                "gramian output must be ncols x ncols",
                self.ncols,
                other.ncols,
            ));
        }
        Ok(())
    }

    /// `C <- A^T A`. If `full`, both triangles are written and equal;
    /// otherwise only the triangle named by `uplo` is defined. Delegates
    /// to vendor BLAS `dsyrk`.
    pub fn gramian(&self, full: bool, uplo: Uplo) -> GcpResult<FactorMatrix> {
        let mut c = FactorMatrix::zeros(self.ncols, self.ncols);
        self.check_square(&c)?;
        blas::syrk(&self.data, self.nrows, self.ncols, &mut c.data, uplo);
        if full {
            mirror_triangle(&mut c.data, self.ncols, uplo);
        }
        Ok(c)
    }

    /// Same contract as [`Self::gramian`], but uses the hand-rolled blocked
    /// kernel instead of BLAS. Exists for portability (no vendor BLAS
    /// linked) and as the reference implementation tests check BLAS
    /// against.
    pub fn gramian_fallback(&self, full: bool, uplo: Uplo) -> FactorMatrix {
        let mut c = FactorMatrix::zeros(self.ncols, self.ncols);
        blas::gramian_fallback(&self.data, self.nrows, self.ncols, &mut c.data, uplo, full);
        c
    }

    /// Column norms under the `{Inf, One, Two}` family, with an optional
    /// floor (`minval`) to avoid divide-by-zero in subsequent column
    /// scaling.
    pub fn column_norms(&self, norm_type: NormType, minval: Option<f64>) -> Vec<f64> {
        let mut norms: Vec<f64> = vec![0.0; self.ncols];
        for row in 0..self.nrows {
            let r = self.row(row);
            for (col, &v) in r.iter().enumerate() {
                match norm_type {
                    NormType::Inf => norms[col] = norms[col].max(v.abs()),
                    NormType::One => norms[col] += v.abs(),
                    NormType::Two => norms[col] += v * v,
                }
            }
        }
        if matches!(norm_type, NormType::Two) {
            for n in norms.iter_mut() {
                *n = n.sqrt();
            }
        }
        if let Some(floor) = minval {
            for n in norms.iter_mut() {
                if *n < floor {
                    *n = floor;
                }
            }
        }
        norms
    }

    /// Multiplies each column by `scales[col]` (or its reciprocal when
    /// `inverse`). Fails if `inverse` and any scale is exactly zero.
    pub fn column_scale(&mut self, scales: &[f64], inverse: bool) -> GcpResult<()> {
        if scales.len() != self.ncols {
            return Err(GcpError::shape("column_scale length", self.ncols, scales.len()));
        }
        let mut factors = scales.to_vec();
        if inverse {
            for f in factors.iter_mut() {
                if *f == 0.0 {
                    return Err(GcpError::numerical("column_scale: divide by zero"));
                }
                *f = 1.0 / *f;
            }
        }
        for row in 0..self.nrows {
            let r = self.row_mut(row);
            for (col, v) in r.iter_mut().enumerate() {
                *v *= factors[col];
            }
        }
        Ok(())
    }

    /// Reorders columns in place according to `perm` (`perm[new] = old`),
    /// via in-place cycle decomposition using one scratch column.
    pub fn permute_columns(&mut self, perm: &[usize]) -> GcpResult<()> {
        if perm.len() != self.ncols {
            return Err(GcpError::shape("permute_columns length", self.ncols, perm.len()));
        }
        let mut visited = vec![false; self.ncols];
        let mut scratch = vec![0.0; self.nrows];

        for start in 0..self.ncols {
            if visited[start] {
                continue;
            }
            let mut cycle = vec![start];
            let mut cur = start;
            loop {
                let next = perm.iter().position(|&p| p == cur).unwrap_or(cur);
                if next == start {
                    break;
                }
                cycle.push(next);
                cur = next;
            }
            if cycle.len() < 2 {
                visited[start] = true;
                continue;
            }
            for row in 0..self.nrows {
                scratch[row] = self.get(row, cycle[cycle.len() - 1]);
            }
            for k in (1..cycle.len()).rev() {
                for row in 0..self.nrows {
                    let v = self.get(row, cycle[k - 1]);
                    self.set(row, cycle[k], v);
                }
            }
            for row in 0..self.nrows {
                self.set(row, cycle[0], scratch[row]);
            }
            for &c in &cycle {
                visited[c] = true;
            }
        }
        Ok(())
    }

    /// Solves `X A = B` where `B = self` is overwritten with the solution
    /// `X`. Because storage is row-major this is equivalent to solving
    /// `A^T X^T = B^T` in column-major terms; the three solve paths (full
    /// LU, SPD Cholesky, symmetric-indefinite) are implemented directly on
    /// the row-major buffers via the flipped `uplo` convention in
    /// [`blas`].
    ///
    /// Returns the `spd` flag actually used: `true` unless the Cholesky
    /// path was requested and failed, in which case the indefinite solver
    /// ran instead and `false` is returned.
    pub fn solve_transpose_rhs(
        &mut self,
        a: &mut FactorMatrix,
        full: bool,
        uplo: Uplo,
        spd: bool,
    ) -> GcpResult<bool> {
        if a.nrows != a.ncols {
            return Err(GcpError::shape("solve_transpose_rhs: A must be square", a.ncols, a.nrows));
        }
        if self.ncols != a.ncols {
            return Err(GcpError::shape(
                "solve_transpose_rhs: B columns must match A dimension",
                a.ncols,
                self.ncols,
            ));
        }
        let n = a.ncols;
        let nrhs = self.nrows;

        if full {
            blas::gesv(&mut a.data, n, &mut self.data, nrhs)?;
            return Ok(false);
        }

        if spd {
            let solved = blas::posv(&mut a.data, n, &mut self.data, nrhs, uplo)?;
            if solved {
                return Ok(true);
            }
            // Not positive definite: fall back to the indefinite solver.
            blas::sysv(&mut a.data, n, &mut self.data, nrhs, uplo)?;
            return Ok(false);
        }

        blas::sysv(&mut a.data, n, &mut self.data, nrhs, uplo)?;
        Ok(false)
    }

    /// Row-wise Hadamard product accumulation: `self[row] += x[row] * y[row]`
    /// elementwise, used by MTTKRP's "for m != n" factor gather.
    pub fn row_hadamard_into(out: &mut [f64], x: &[f64], y: &[f64]) {
        for ((o, &xv), &yv) in out.iter_mut().zip(x.iter()).zip(y.iter()) {
            *o = xv * yv;
        }
    }

    pub fn row_dot(x: &[f64], y: &[f64]) -> f64 {
        x.iter().zip(y.iter()).map(|(&a, &b)| a * b).sum()
    }
}

fn mirror_triangle(c: &mut [f64], n: usize, uplo: Uplo) {
    for i in 0..n {
        for j in 0..i {
            match uplo {
                Uplo::Upper => {
                    let v = c[j * n + i];
                    c[i * n + j] = v;
                }
                Uplo::Lower => {
                    let v = c[i * n + j];
                    c[j * n + i] = v;
                }
            }
        }
    }
}
