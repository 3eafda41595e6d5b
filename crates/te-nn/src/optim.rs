//! Adam with global gradient-norm clipping
//!
//! Moment estimates are kept as plain tensors so they can be written into a
//! checkpoint and restored exactly.

use crate::checkpoint::TensorBundle;
use candle_core::{Tensor, Var};
use te_common::{TeError, TeResult};

/// Adam hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamParams {
    /// Step size
    pub lr: f64,
    /// First moment decay
    pub beta1: f64,
    /// Second moment decay
    pub beta2: f64,
    /// Denominator stabiliser
    pub eps: f64,
}

impl AdamParams {
    /// Standard betas with the given learning rate
    pub fn with_lr(lr: f64) -> Self {
        Self {
            lr,
            ..Self::default()
        }
    }
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            lr: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

/// Adam optimizer over a fixed list of variables
#[derive(Debug)]
pub struct Adam {
    vars: Vec<Var>,
    params: AdamParams,
    step: u64,
    m: Vec<Tensor>,
    v: Vec<Tensor>,
}

impl Adam {
    /// Optimizer with zeroed moments
    pub fn new(vars: Vec<Var>, params: AdamParams) -> TeResult<Self> {
        if !(params.lr.is_finite() && params.lr > 0.0) {
            return Err(TeError::Config(format!("learning rate must be positive, got {}", params.lr)));
        }
        let m = vars
            .iter()
            .map(|v| v.as_tensor().zeros_like())
            .collect::<candle_core::Result<Vec<_>>>()?;
        let v = m.clone();
        Ok(Self {
            vars,
            params,
            step: 0,
            m,
            v,
        })
    }

    /// Backpropagate `loss`, optionally clip, and apply one update.
    ///
    /// Returns the gradient norm measured before clipping.
    pub fn backward_step(&mut self, loss: &Tensor, max_grad_norm: Option<f64>) -> TeResult<f64> {
        let store = loss.backward()?;
        let mut grads = Vec::with_capacity(self.vars.len());
        for var in &self.vars {
            let grad = match store.get(var.as_tensor()) {
                Some(g) => g.clone(),
                None => var.as_tensor().zeros_like()?,
            };
            grads.push(grad);
        }

        let norm = match max_grad_norm {
            Some(max_norm) => clip_grad_norm(&mut grads, max_norm)?,
            None => global_norm(&grads)?,
        };
        self.apply(&grads)?;
        Ok(norm)
    }

    /// Apply one update from precomputed gradients (same order as the vars)
    pub fn apply(&mut self, grads: &[Tensor]) -> TeResult<()> {
        if grads.len() != self.vars.len() {
            return Err(TeError::InvalidInput(format!(
                "{} gradients for {} parameters",
                grads.len(),
                self.vars.len()
            )));
        }

        self.step += 1;
        let AdamParams { lr, beta1, beta2, eps } = self.params;
        let t = self.step as i32;
        let bias1 = 1.0 - beta1.powi(t);
        let bias2 = 1.0 - beta2.powi(t);
        let step_size = lr / bias1;
        let bias2_sqrt = bias2.sqrt();

        for (i, (var, grad)) in self.vars.iter().zip(grads).enumerate() {
            let m = self.m[i]
                .affine(beta1, 0.0)?
                .add(&grad.affine(1.0 - beta1, 0.0)?)?;
            let v = self.v[i]
                .affine(beta2, 0.0)?
                .add(&grad.sqr()?.affine(1.0 - beta2, 0.0)?)?;

            let denom = v.sqrt()?.affine(1.0 / bias2_sqrt, eps)?;
            let update = m.div(&denom)?.affine(step_size, 0.0)?;
            var.set(&var.as_tensor().sub(&update)?)?;

            self.m[i] = m;
            self.v[i] = v;
        }
        Ok(())
    }

    /// Executed update count
    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// Hyper-parameters
    pub fn params(&self) -> AdamParams {
        self.params
    }

    /// Write moments and step count under `prefix`
    pub fn export(&self, bundle: &mut TensorBundle, prefix: &str) -> TeResult<()> {
        for (i, (m, v)) in self.m.iter().zip(&self.v).enumerate() {
            bundle.insert(format!("{prefix}.m.{i}"), m.clone());
            bundle.insert(format!("{prefix}.v.{i}"), v.clone());
        }
        bundle.insert_scalar(format!("{prefix}.step"), self.step as f64)
    }

    /// Restore moments and step count written by [`Adam::export`]
    pub fn import(&mut self, bundle: &mut TensorBundle, prefix: &str) -> TeResult<()> {
        let mut m = Vec::with_capacity(self.vars.len());
        let mut v = Vec::with_capacity(self.vars.len());
        for (i, var) in self.vars.iter().enumerate() {
            let dims = var.as_tensor().dims().to_vec();
            m.push(bundle.take(&format!("{prefix}.m.{i}"), &dims)?);
            v.push(bundle.take(&format!("{prefix}.v.{i}"), &dims)?);
        }
        let step = bundle.scalar(&format!("{prefix}.step"))?;
        if !(step.is_finite() && step >= 0.0) {
            return Err(TeError::Persistence(format!("invalid optimizer step {step}")));
        }

        self.m = m;
        self.v = v;
        self.step = step as u64;
        Ok(())
    }
}

fn global_norm(grads: &[Tensor]) -> TeResult<f64> {
    let mut total = 0.0;
    for g in grads {
        total += g.sqr()?.sum_all()?.to_scalar::<f64>()?;
    }
    Ok(total.sqrt())
}

/// Scale `grads` in place so their joint L2 norm is at most `max_norm`.
///
/// Returns the norm before scaling.
pub fn clip_grad_norm(grads: &mut [Tensor], max_norm: f64) -> TeResult<f64> {
    let norm = global_norm(grads)?;
    let coef = max_norm / (norm + 1e-6);
    if coef < 1.0 {
        for g in grads.iter_mut() {
            *g = g.affine(coef, 0.0)?;
        }
    }
    Ok(norm)
}
