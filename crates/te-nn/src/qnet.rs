//! Feed-forward action-value network
//!
//! `hidden_layers + [action_size]` fully connected layers, ReLU between
//! hidden layers and a linear output. The agent builds two of these
//! (policy and target) with identical shapes.

use crate::init::{batch_from_rows, fan_in_bound, uniform_var};
use crate::ParamSet;
use candle_core::{Device, Tensor, Var};
use candle_nn::{Linear, Module};
use rand::Rng;
use te_common::{TeError, TeResult};

/// Fully connected layer `y = x Wᵀ + b` over seeded variables
///
/// The [`Linear`] shares storage with the variables, so optimizer updates
/// through [`Var::set`] are visible to the forward pass.
#[derive(Debug, Clone)]
pub(crate) struct Dense {
    pub(crate) weight: Var,
    pub(crate) bias: Var,
    linear: Linear,
}

impl Dense {
    pub(crate) fn new<R: Rng + ?Sized>(
        rng: &mut R,
        in_dim: usize,
        out_dim: usize,
        device: &Device,
    ) -> TeResult<Self> {
        let bound = fan_in_bound(in_dim);
        let weight = uniform_var(rng, (out_dim, in_dim), bound, device)?;
        let bias = uniform_var(rng, out_dim, bound, device)?;
        let linear = Linear::new(weight.as_tensor().clone(), Some(bias.as_tensor().clone()));
        Ok(Self {
            weight,
            bias,
            linear,
        })
    }

    pub(crate) fn forward(&self, x: &Tensor) -> TeResult<Tensor> {
        Ok(self.linear.forward(x)?)
    }
}

/// Q(state) -> one value per discrete action
#[derive(Debug, Clone)]
pub struct QNetwork {
    layers: Vec<Dense>,
    input_size: usize,
    output_size: usize,
    device: Device,
}

impl QNetwork {
    /// Build a network `input_size -> hidden... -> output_size`
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        hidden_layers: &[usize],
        output_size: usize,
        rng: &mut R,
        device: &Device,
    ) -> TeResult<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(TeError::Config("network input and output sizes must be positive".into()));
        }
        if hidden_layers.iter().any(|&w| w == 0) {
            return Err(TeError::Config("hidden layer widths must be positive".into()));
        }

        let mut layers = Vec::with_capacity(hidden_layers.len() + 1);
        let mut in_dim = input_size;
        for &width in hidden_layers.iter().chain(std::iter::once(&output_size)) {
            layers.push(Dense::new(rng, in_dim, width, device)?);
            in_dim = width;
        }

        Ok(Self {
            layers,
            input_size,
            output_size,
            device: device.clone(),
        })
    }

    /// Batched forward pass: `[batch, input] -> [batch, output]`
    pub fn forward(&self, states: &Tensor) -> TeResult<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = states.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = x.relu()?;
            }
        }
        Ok(x)
    }

    /// Action values for a single state
    pub fn q_values(&self, state: &[f64]) -> TeResult<Vec<f64>> {
        let batch = self.batch(std::iter::once(state))?;
        Ok(self.forward(&batch)?.squeeze(0)?.to_vec1::<f64>()?)
    }

    /// Stack states into a `[batch, input]` tensor on this network's device
    pub fn batch<'a>(&self, states: impl IntoIterator<Item = &'a [f64]>) -> TeResult<Tensor> {
        batch_from_rows(states, self.input_size, &self.device)
    }

    /// State vector length
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Number of actions
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Device holding the parameters
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl ParamSet for QNetwork {
    fn named_vars(&self) -> Vec<(String, Var)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                [
                    (format!("layer{i}.weight"), layer.weight.clone()),
                    (format!("layer{i}.bias"), layer.bias.clone()),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy_parameters;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net(seed: u64) -> QNetwork {
        QNetwork::new(6, &[8, 4], 3, &mut StdRng::seed_from_u64(seed), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_shapes() {
        let q = net(0);
        let batch = q
            .batch([[0.1; 6].as_slice(), [0.2; 6].as_slice()])
            .unwrap();
        let out = q.forward(&batch).unwrap();
        assert_eq!(out.dims(), &[2, 3]);
        assert_eq!(q.q_values(&[0.0; 6]).unwrap().len(), 3);
        // 6*8+8 + 8*4+4 + 4*3+3
        assert_eq!(q.num_parameters(), 107);
    }

    #[test]
    fn test_rejects_wrong_state_width() {
        let q = net(0);
        assert!(q.q_values(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(QNetwork::new(0, &[4], 2, &mut rng, &Device::Cpu).is_err());
        assert!(QNetwork::new(4, &[0], 2, &mut rng, &Device::Cpu).is_err());
    }

    #[test]
    fn test_no_hidden_layers_is_linear() {
        let q = QNetwork::new(3, &[], 2, &mut StdRng::seed_from_u64(3), &Device::Cpu).unwrap();
        assert_eq!(q.named_vars().len(), 2);
        assert_eq!(q.q_values(&[1.0, 2.0, 3.0]).unwrap().len(), 2);
    }

    #[test]
    fn test_dense_tracks_variable_updates() {
        let device = Device::Cpu;
        let layer = Dense::new(&mut StdRng::seed_from_u64(4), 2, 1, &device).unwrap();
        layer
            .weight
            .set(&Tensor::new(&[[2.0f64, -1.0]], &device).unwrap())
            .unwrap();
        layer.bias.set(&Tensor::new(&[0.5f64], &device).unwrap()).unwrap();

        let x = Tensor::new(&[[1.0f64, 3.0]], &device).unwrap();
        let y = layer.forward(&x).unwrap().to_vec2::<f64>().unwrap();
        assert_eq!(y, vec![vec![-0.5]]);
    }

    #[test]
    fn test_copy_parameters() {
        let policy = net(1);
        let target = net(2);
        assert_ne!(policy.flat_parameters().unwrap(), target.flat_parameters().unwrap());

        copy_parameters(&target, &policy).unwrap();
        assert_eq!(policy.flat_parameters().unwrap(), target.flat_parameters().unwrap());

        let state = [0.3, -0.2, 0.5, 1.0, 0.0, 0.7];
        assert_eq!(policy.q_values(&state).unwrap(), target.q_values(&state).unwrap());
    }
}
