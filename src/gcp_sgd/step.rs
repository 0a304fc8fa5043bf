//! GCP-SGD step rules: Plain gradient descent and ADAM, with the
//! bias-correction rollback ADAM needs on a rejected epoch. `beta1_t`/
//! `beta2_t` are tracked as running products and rolled back by dividing
//! out `beta^epoch_iters` on rejection.

use crate::factor_matrix::FactorMatrix;
use crate::ktensor::Ktensor;
use crate::loss::Loss;

/// ADAM's first/second moment estimates, one `FactorMatrix` per mode,
/// plus the running bias-correction powers `beta1^t`, `beta2^t`. `_prev`
/// fields are the last *accepted* epoch's buffers, restored verbatim on
/// rejection; the bias powers are instead rolled back algebraically,
/// since dividing out `beta^epoch_iters` is cheaper than keeping a
/// second pair of scalars in lockstep with the snapshot.
#[derive(Debug, Clone)]
pub struct AdamState {
    pub m: Vec<FactorMatrix>,
    pub v: Vec<FactorMatrix>,
    pub m_prev: Vec<FactorMatrix>,
    pub v_prev: Vec<FactorMatrix>,
    pub beta1_t: f64,
    pub beta2_t: f64,
}

impl AdamState {
    pub fn zeros(dims: &[usize], ncomponents: usize) -> Self {
        let zero_factors = || dims.iter().map(|&d| FactorMatrix::zeros(d, ncomponents)).collect::<Vec<_>>();
        Self {
            m: zero_factors(),
            v: zero_factors(),
            m_prev: zero_factors(),
            v_prev: zero_factors(),
            beta1_t: 1.0,
            beta2_t: 1.0,
        }
    }

    pub fn accept(&mut self) {
        self.m_prev = self.m.clone();
        self.v_prev = self.v.clone();
    }

    /// Restores `m`/`v` to the last accepted snapshot and rolls `beta1^t`,
    /// `beta2^t` back by dividing out `beta^epoch_iters`, rather than
    /// snapshotting the bias powers alongside `m_prev`/`v_prev`.
    pub fn reject(&mut self, epoch_iters: usize, beta1: f64, beta2: f64) {
        self.m = self.m_prev.clone();
        self.v = self.v_prev.clone();
        self.beta1_t /= beta1.powi(epoch_iters as i32);
        self.beta2_t /= beta2.powi(epoch_iters as i32);
    }
}

/// Clips every factor-matrix entry of `u` into the loss's declared
/// bounds. Lambda is left untouched: the driver holds `lambda = 1`
/// throughout the epoch loop and only renormalizes at finalization.
fn clip_to_bounds(u: &mut Ktensor, loss: &Loss) {
    if !loss.has_lower_bound() && !loss.has_upper_bound() {
        return;
    }
    for mode in 0..u.ndims() {
        for v in u.factor_mut(mode).data_mut().iter_mut() {
            *v = loss.clip(*v);
        }
    }
}

/// `u_i <- u_i - step * g_i`, applied to every factor-matrix entry.
pub fn apply_plain_step(u: &mut Ktensor, g: &Ktensor, step: f64, loss: &Loss) {
    for mode in 0..u.ndims() {
        let gdata: Vec<f64> = g.factor(mode).data().to_vec();
        let udata = u.factor_mut(mode).data_mut();
        for (uv, gv) in udata.iter_mut().zip(gdata.iter()) {
            *uv -= step * gv;
        }
    }
    clip_to_bounds(u, loss);
}

/// One ADAM update: advances the bias-correction powers by one global
/// iteration, then applies `u_i <- u_i - adam_step * m_i / sqrt(v_i + eps)`
/// with `adam_step = step * sqrt(1 - beta2^t) / (1 - beta1^t)`.
#[allow(clippy::too_many_arguments)]
pub fn apply_adam_step(
    u: &mut Ktensor,
    g: &Ktensor,
    step: f64,
    adam: &mut AdamState,
    beta1: f64,
    beta2: f64,
    eps: f64,
    loss: &Loss,
) {
    adam.beta1_t *= beta1;
    adam.beta2_t *= beta2;
    let adam_step = step * (1.0 - adam.beta2_t).sqrt() / (1.0 - adam.beta1_t);

    for mode in 0..u.ndims() {
        let gdata: Vec<f64> = g.factor(mode).data().to_vec();
        let mdata = adam.m[mode].data_mut();
        let vdata = adam.v[mode].data_mut();
        let udata = u.factor_mut(mode).data_mut();
        for i in 0..udata.len() {
            let gi = gdata[i];
            mdata[i] = beta1 * mdata[i] + (1.0 - beta1) * gi;
            vdata[i] = beta2 * vdata[i] + (1.0 - beta2) * gi * gi;
            udata[i] -= adam_step * mdata[i] / (vdata[i] + eps).sqrt();
        }
    }
    clip_to_bounds(u, loss);
}
