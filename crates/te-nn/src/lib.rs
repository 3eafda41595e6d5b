//! Neural-network building blocks on candle
//!
//! Parameters are plain [`Var`]s initialised from a caller-supplied RNG, so
//! a fixed seed reproduces a model bit for bit. All math runs in `f64` on
//! the CPU.
//!
//! - [`QNetwork`]: feed-forward action-value approximator
//! - [`LstmRegressor`]: stacked LSTM with a linear read-out
//! - [`Adam`]: optimizer with exportable moment state
//! - [`TensorBundle`]: safetensors checkpoint container

#![warn(missing_docs)]

pub mod checkpoint;
pub mod init;
pub mod lstm;
pub mod optim;
pub mod qnet;

pub use candle_core::{DType, Device, Tensor, Var};
pub use checkpoint::{BundleKind, TensorBundle};
pub use lstm::LstmRegressor;
pub use optim::{clip_grad_norm, Adam, AdamParams};
pub use qnet::QNetwork;

use te_common::TeResult;

/// Floating point type of every parameter and activation
pub const DTYPE: DType = DType::F64;

/// Compute device (edge deployments are CPU only)
pub fn device() -> Device {
    Device::Cpu
}

/// A model exposing its trainable parameters under stable names
pub trait ParamSet {
    /// Parameters in a fixed order with checkpoint names
    fn named_vars(&self) -> Vec<(String, Var)>;

    /// Parameters in the same order as [`ParamSet::named_vars`]
    fn vars(&self) -> Vec<Var> {
        self.named_vars().into_iter().map(|(_, v)| v).collect()
    }

    /// All parameter values flattened in declaration order
    fn flat_parameters(&self) -> TeResult<Vec<f64>> {
        let mut out = Vec::new();
        for var in self.vars() {
            out.extend(var.as_tensor().flatten_all()?.to_vec1::<f64>()?);
        }
        Ok(out)
    }

    /// Number of scalar parameters
    fn num_parameters(&self) -> usize {
        self.vars().iter().map(|v| v.as_tensor().elem_count()).sum()
    }
}

/// Hard-copy every parameter of `src` into `dst`
pub fn copy_parameters(dst: &impl ParamSet, src: &impl ParamSet) -> TeResult<()> {
    let dst_vars = dst.named_vars();
    let src_vars = src.named_vars();
    if dst_vars.len() != src_vars.len() {
        return Err(te_common::TeError::Config(format!(
            "parameter count mismatch: {} vs {}",
            dst_vars.len(),
            src_vars.len()
        )));
    }
    for ((_, d), (_, s)) in dst_vars.iter().zip(src_vars.iter()) {
        d.set(s.as_tensor())?;
    }
    Ok(())
}
