//! `Ktensor`: a weighted sum of rank-one outer products, stored as a weight
//! vector `lambda` plus `N` factor matrices.

use crate::config::NormType;
use crate::error::{GcpError, GcpResult};
use crate::factor_matrix::FactorMatrix;
use crate::tensor::SparseTensor;

/// `N` factor matrices `U[k]` of shape `[dims[k] x R]` plus a weight vector
/// `lambda` of length `R`. The consistency invariant is that every factor
/// matrix has the same column count `R` as `lambda.len()`.
#[derive(Debug, Clone)]
pub struct Ktensor {
    lambda: Vec<f64>,
    factors: Vec<FactorMatrix>,
}

impl Ktensor {
    pub fn new(lambda: Vec<f64>, factors: Vec<FactorMatrix>) -> GcpResult<Self> {
        let k = Self { lambda, factors };
        k.check_consistent()?;
        Ok(k)
    }

    /// Builds a Ktensor with `lambda = 1` and zero-filled factor matrices
    /// of the given per-mode sizes.
    pub fn zeros(dims: &[usize], ncomponents: usize) -> Self {
        let factors = dims
            .iter()
            .map(|&d| FactorMatrix::zeros(d, ncomponents))
            .collect();
        Self {
            lambda: vec![1.0; ncomponents],
            factors,
        }
    }

    pub fn ndims(&self) -> usize {
        self.factors.len()
    }

    pub fn ncomponents(&self) -> usize {
        self.lambda.len()
    }

    pub fn lambda(&self) -> &[f64] {
        &self.lambda
    }

    pub fn lambda_mut(&mut self) -> &mut [f64] {
        &mut self.lambda
    }

    pub fn factor(&self, mode: usize) -> &FactorMatrix {
        &self.factors[mode]
    }

    pub fn factor_mut(&mut self, mode: usize) -> &mut FactorMatrix {
        &mut self.factors[mode]
    }

    pub fn factors(&self) -> &[FactorMatrix] {
        &self.factors
    }

    pub fn dims(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.nrows()).collect()
    }

    /// `isConsistent()`: every factor matrix shares the same column count,
    /// equal to `lambda.len()`.
    pub fn check_consistent(&self) -> GcpResult<()> {
        let r = self.lambda.len();
        for (mode, f) in self.factors.iter().enumerate() {
            if f.ncols() != r {
                return Err(GcpError::shape(
                    format!("ktensor mode {mode} column count disagrees with lambda length"),
                    r,
                    f.ncols(),
                ));
            }
        }
        Ok(())
    }

    /// Rescales each column of each factor matrix to unit `p`-norm,
    /// absorbing the scale into `lambda`.
    pub fn normalize(&mut self, norm_type: NormType) {
        let r = self.ncomponents();
        let mut total = vec![1.0; r];
        for f in self.factors.iter_mut() {
            let norms = f.column_norms(norm_type, Some(f64::MIN_POSITIVE));
            f.column_scale(&norms, true).expect("norms are never exactly zero");
            for (t, n) in total.iter_mut().zip(norms.iter()) {
                *t *= n;
            }
        }
        for (l, t) in self.lambda.iter_mut().zip(total.iter()) {
            *l *= t;
        }
    }

    /// Sets `lambda <- 1`, spreading the previous weight uniformly into the
    /// first factor matrix's columns.
    pub fn distribute(&mut self) {
        if self.factors.is_empty() {
            self.lambda.iter_mut().for_each(|l| *l = 1.0);
            return;
        }
        let scales = self.lambda.clone();
        self.factors[0]
            .column_scale(&scales, false)
            .expect("column_scale with forward scaling never fails");
        self.lambda.iter_mut().for_each(|l| *l = 1.0);
    }

    /// Sorts components by decreasing `|lambda|`.
    pub fn arrange(&mut self) {
        let r = self.ncomponents();
        let mut order: Vec<usize> = (0..r).collect();
        order.sort_by(|&a, &b| {
            self.lambda[b]
                .abs()
                .partial_cmp(&self.lambda[a].abs())
                .unwrap()
        });
        // perm[new] = old
        let new_lambda: Vec<f64> = order.iter().map(|&old| self.lambda[old]).collect();
        self.lambda = new_lambda;
        for f in self.factors.iter_mut() {
            f.permute_columns(&order).expect("order has the right length");
        }
    }

    /// Squared Frobenius norm of the reconstructed dense tensor,
    /// `||reconstruct()||_F^2`, computed without materializing it via the
    /// standard `lambda^T (U0^T U0 * U1^T U1 * ... ) lambda` identity.
    pub fn norm_fsq(&self) -> f64 {
        let r = self.ncomponents();
        let mut gram = vec![1.0; r * r];
        for f in &self.factors {
            let g = f.gramian_fallback(true, crate::config::Uplo::Upper);
            for i in 0..r {
                for j in 0..r {
                    gram[i * r + j] *= g.get(i, j);
                }
            }
        }
        let mut total = 0.0;
        for i in 0..r {
            for j in 0..r {
                total += self.lambda[i] * self.lambda[j] * gram[i * r + j];
            }
        }
        total
    }

    /// `innerprod(X, u) = sum_x x.value * sum_r lambda_r * prod_m U[m][coord_m(x), r]`.
    /// Reuses [`Self::eval_at`] per nonzero; the cheapest correct form for
    /// one nonzero at a time, since MTTKRP does the heavy lifting
    /// elsewhere.
    pub fn innerprod(&self, x: &SparseTensor) -> GcpResult<f64> {
        if x.ndims() != self.ndims() {
            return Err(GcpError::shape("innerprod: ndims mismatch", self.ndims(), x.ndims()));
        }
        let mut total = 0.0;
        for i in 0..x.nnz() {
            total += x.value(i) * self.eval_at(x.coord(i));
        }
        Ok(total)
    }

    /// Evaluates the full reconstruction at one coordinate:
    /// `sum_r lambda_r * prod_m U[m][coord_m, r]`. Builds the row-wise
    /// Hadamard product across modes via [`FactorMatrix::row_hadamard_into`]
    /// and reduces it against `lambda` via [`FactorMatrix::row_dot`].
    pub fn eval_at(&self, coord: &[usize]) -> f64 {
        let r = self.ncomponents();
        if self.factors.is_empty() {
            return self.lambda.iter().sum();
        }
        let mut acc = self.factors[0].row(coord[0]).to_vec();
        for (m, &idx) in coord.iter().enumerate().skip(1) {
            let mut next = vec![0.0; r];
            FactorMatrix::row_hadamard_into(&mut next, &acc, self.factors[m].row(idx));
            acc = next;
        }
        FactorMatrix::row_dot(&self.lambda, &acc)
    }

    pub fn zero(&mut self) {
        self.lambda.iter_mut().for_each(|l| *l = 0.0);
        for f in self.factors.iter_mut() {
            f.data_mut().iter_mut().for_each(|v| *v = 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tensor() -> SparseTensor {
        SparseTensor::new(
            vec![4, 2, 3],
            vec![vec![2, 0, 0], vec![1, 1, 1], vec![3, 0, 2], vec![0, 1, 2]],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap()
    }

    fn sample_ktensor(lambda: Vec<f64>) -> Ktensor {
        let mut u0 = FactorMatrix::zeros(4, 2);
        u0.set(2, 0, 1.0);
        u0.set(1, 0, -1.0);
        u0.set(3, 1, 0.3);
        let mut u1 = FactorMatrix::zeros(2, 2);
        u1.set(0, 0, 1.0);
        u1.set(0, 1, 0.3);
        let mut u2 = FactorMatrix::zeros(3, 2);
        u2.set(0, 0, 1.0);
        u2.set(2, 1, 0.3);
        Ktensor::new(lambda, vec![u0, u1, u2]).unwrap()
    }

    #[test]
    fn innerprod_matches_spec_scenario_1() {
        let x = sample_tensor();
        let u = sample_ktensor(vec![1.0, 2.0]);
        let ip = u.innerprod(&x).unwrap();
        assert!((ip - 1.162).abs() < 1e-9, "got {ip}");

        let u2 = sample_ktensor(vec![3.0, 1.0]);
        let ip2 = u2.innerprod(&x).unwrap();
        assert!((ip2 - 3.081).abs() < 1e-9, "got {ip2}");
    }

    #[test]
    fn distribute_then_lambda_is_one() {
        let mut k = sample_ktensor(vec![2.0, 3.0]);
        k.distribute();
        assert!(k.lambda().iter().all(|&l| (l - 1.0).abs() < 1e-12));
    }

    #[test]
    fn normalize_preserves_reconstruction() {
        let mut k = Ktensor::zeros(&[3, 2], 2);
        for (m, dim) in [3usize, 2].into_iter().enumerate() {
            for row in 0..dim {
                for col in 0..2 {
                    k.factor_mut(m).set(row, col, (row + 1) as f64 * (col + 2) as f64);
                }
            }
        }
        let before = k.eval_at(&[1, 1]);
        k.normalize(NormType::Two);
        let after = k.eval_at(&[1, 1]);
        assert!((before - after).abs() < 1e-9, "{before} vs {after}");
    }

    #[test]
    fn arrange_sorts_by_decreasing_abs_lambda() {
        let mut k = sample_ktensor(vec![1.0, -5.0]);
        k.arrange();
        assert!(k.lambda()[0].abs() >= k.lambda()[1].abs());
    }

    #[test]
    fn inconsistent_ktensor_is_rejected() {
        let u0 = FactorMatrix::zeros(2, 2);
        let u1 = FactorMatrix::zeros(2, 3);
        assert!(Ktensor::new(vec![1.0, 1.0], vec![u0, u1]).is_err());
    }
}
