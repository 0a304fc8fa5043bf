//! GCP loss functions: a closed sum type rather than a trait object, so the
//! SGD inner loop sees a direct call instead of a vtable dispatch. The
//! concrete loss is picked once, outside the hot loop, rather than
//! re-dispatched per sample.

use serde::{Deserialize, Serialize};

/// One of the five supported elementwise losses. `eps` guards the `log`
/// and division terms against `m = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Loss {
    /// `1/2 (x - m)^2`. Unbounded.
    Gaussian,
    /// `m - x * log(m + eps)`. Requires `m >= 0`.
    Poisson { eps: f64 },
    /// `log(1 + m) - x * log(m + eps)`. Requires `m >= 0`.
    Bernoulli { eps: f64 },
    /// `x / (m + eps) + log(m + eps)`. Requires `m >= 0`.
    Gamma { eps: f64 },
    /// `2 log(m + eps) + (pi/4) (x / (m + eps))^2`. Requires `m >= 0`.
    Rayleigh { eps: f64 },
}

impl Loss {
    pub const DEFAULT_EPS: f64 = 1.0e-10;

    pub fn poisson() -> Self {
        Loss::Poisson { eps: Self::DEFAULT_EPS }
    }

    pub fn bernoulli() -> Self {
        Loss::Bernoulli { eps: Self::DEFAULT_EPS }
    }

    pub fn gamma() -> Self {
        Loss::Gamma { eps: Self::DEFAULT_EPS }
    }

    pub fn rayleigh() -> Self {
        Loss::Rayleigh { eps: Self::DEFAULT_EPS }
    }

    /// Elementwise loss value `f(x, m)` for data entry `x` and model
    /// prediction `m`.
    #[inline]
    pub fn value(&self, x: f64, m: f64) -> f64 {
        match *self {
            Loss::Gaussian => 0.5 * (x - m) * (x - m),
            Loss::Poisson { eps } => m - x * (m + eps).ln(),
            Loss::Bernoulli { eps } => (1.0 + m).ln() - x * (m + eps).ln(),
            Loss::Gamma { eps } => x / (m + eps) + (m + eps).ln(),
            Loss::Rayleigh { eps } => {
                let r = x / (m + eps);
                2.0 * (m + eps).ln() + std::f64::consts::FRAC_PI_4 * r * r
            }
        }
    }

    /// Partial derivative of `f(x, m)` with respect to `m`, the quantity
    /// GCP-SGD's gradient sample needs.
    #[inline]
    pub fn deriv(&self, x: f64, m: f64) -> f64 {
        match *self {
            Loss::Gaussian => m - x,
            Loss::Poisson { eps } => 1.0 - x / (m + eps),
            Loss::Bernoulli { eps } => 1.0 / (1.0 + m) - x / (m + eps),
            Loss::Gamma { eps } => -x / (m + eps).powi(2) + 1.0 / (m + eps),
            Loss::Rayleigh { eps } => {
                2.0 / (m + eps) - std::f64::consts::FRAC_PI_2 * x * x / (m + eps).powi(3)
            }
        }
    }

    pub fn has_lower_bound(&self) -> bool {
        !matches!(self, Loss::Gaussian)
    }

    pub fn has_upper_bound(&self) -> bool {
        false
    }

    /// Lower bound the model value `m` must be clipped to after a step,
    /// if this loss declares bounds at all.
    pub fn lower_bound(&self) -> f64 {
        match self {
            Loss::Gaussian => f64::NEG_INFINITY,
            Loss::Poisson { .. }
            | Loss::Bernoulli { .. }
            | Loss::Gamma { .. }
            | Loss::Rayleigh { .. } => 0.0,
        }
    }

    pub fn upper_bound(&self) -> f64 {
        f64::INFINITY
    }

    /// Clips `m` into `[lower_bound(), upper_bound()]`.
    #[inline]
    pub fn clip(&self, m: f64) -> f64 {
        m.max(self.lower_bound()).min(self.upper_bound())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_value_and_deriv() {
        let l = Loss::Gaussian;
        assert!((l.value(3.0, 1.0) - 2.0).abs() < 1e-12);
        assert!((l.deriv(3.0, 1.0) - (-2.0)).abs() < 1e-12);
    }

    #[test]
    fn poisson_requires_nonnegative_model() {
        let l = Loss::poisson();
        assert!(l.has_lower_bound());
        assert_eq!(l.lower_bound(), 0.0);
        assert_eq!(l.clip(-5.0), 0.0);
    }

    #[test]
    fn gaussian_is_unbounded() {
        let l = Loss::Gaussian;
        assert!(!l.has_lower_bound());
        assert_eq!(l.clip(-5.0), -5.0);
    }

    #[test]
    fn rayleigh_matches_closed_form_at_x_equals_m() {
        let l = Loss::rayleigh();
        let v = l.value(2.0, 2.0);
        let expected = 2.0 * (2.0 + Loss::DEFAULT_EPS).ln() + std::f64::consts::FRAC_PI_4;
        assert!((v - expected).abs() < 1e-9);
    }
}
