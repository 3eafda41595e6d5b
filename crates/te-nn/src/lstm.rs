//! Stacked LSTM regressor
//!
//! Batch-first input `[batch, seq_len, input_size]`, one scalar out per
//! sequence read from the last timestep of the top layer. Gate layout
//! follows the usual `i, f, g, o` packing with separate input and
//! recurrent biases.

use crate::init::{fan_in_bound, uniform_var};
use crate::qnet::Dense;
use crate::ParamSet;
use candle_core::{DType, Device, Tensor, Var};
use rand::{Rng, RngCore};
use te_common::{TeError, TeResult};

#[derive(Debug, Clone)]
struct LstmLayer {
    w_ih: Var,
    w_hh: Var,
    b_ih: Var,
    b_hh: Var,
    hidden_size: usize,
}

impl LstmLayer {
    fn new<R: Rng + ?Sized>(
        rng: &mut R,
        input_size: usize,
        hidden_size: usize,
        device: &Device,
    ) -> TeResult<Self> {
        let bound = fan_in_bound(hidden_size);
        let gates = 4 * hidden_size;
        Ok(Self {
            w_ih: uniform_var(rng, (gates, input_size), bound, device)?,
            w_hh: uniform_var(rng, (gates, hidden_size), bound, device)?,
            b_ih: uniform_var(rng, gates, bound, device)?,
            b_hh: uniform_var(rng, gates, bound, device)?,
            hidden_size,
        })
    }

    /// `[batch, seq_len, in] -> [batch, seq_len, hidden]`
    fn forward(&self, xs: &Tensor) -> TeResult<Tensor> {
        let (batch, seq_len, _) = xs.dims3()?;
        let device = xs.device();
        let mut h = Tensor::zeros((batch, self.hidden_size), DType::F64, device)?;
        let mut c = Tensor::zeros((batch, self.hidden_size), DType::F64, device)?;

        let w_ih = self.w_ih.t()?;
        let w_hh = self.w_hh.t()?;
        let mut outputs = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let x_t = xs.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
            let gates = x_t
                .matmul(&w_ih)?
                .broadcast_add(&self.b_ih)?
                .add(&h.matmul(&w_hh)?)?
                .broadcast_add(&self.b_hh)?;
            let chunks = gates.chunk(4, 1)?;
            let i = candle_nn::ops::sigmoid(&chunks[0])?;
            let f = candle_nn::ops::sigmoid(&chunks[1])?;
            let g = chunks[2].tanh()?;
            let o = candle_nn::ops::sigmoid(&chunks[3])?;

            c = f.mul(&c)?.add(&i.mul(&g)?)?;
            h = o.mul(&c.tanh()?)?;
            outputs.push(h.clone());
        }
        Ok(Tensor::stack(&outputs, 1)?)
    }
}

/// LSTM stack followed by a linear read-out
#[derive(Debug, Clone)]
pub struct LstmRegressor {
    layers: Vec<LstmLayer>,
    head: Dense,
    dropout: f64,
}

impl LstmRegressor {
    /// Build `num_layers` LSTM layers of width `hidden_size` and a
    /// `hidden_size -> 1` head
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        rng: &mut R,
        device: &Device,
    ) -> TeResult<Self> {
        if input_size == 0 || hidden_size == 0 || num_layers == 0 {
            return Err(TeError::Config("LSTM sizes and depth must be positive".into()));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(TeError::Config(format!("dropout must be in [0, 1), got {dropout}")));
        }

        let mut layers = Vec::with_capacity(num_layers);
        for layer in 0..num_layers {
            let in_dim = if layer == 0 { input_size } else { hidden_size };
            layers.push(LstmLayer::new(rng, in_dim, hidden_size, device)?);
        }
        let head = Dense::new(rng, hidden_size, 1, device)?;

        Ok(Self { layers, head, dropout })
    }

    /// Inference pass, dropout disabled: `[batch, seq_len, in] -> [batch, 1]`
    pub fn forward(&self, xs: &Tensor) -> TeResult<Tensor> {
        self.run(xs, None)
    }

    /// Training pass with inter-layer dropout drawn from `rng`
    pub fn forward_train(&self, xs: &Tensor, rng: &mut dyn RngCore) -> TeResult<Tensor> {
        self.run(xs, Some(rng))
    }

    fn run(&self, xs: &Tensor, mut rng: Option<&mut dyn RngCore>) -> TeResult<Tensor> {
        let (_, seq_len, _) = xs.dims3()?;
        if seq_len == 0 {
            return Err(TeError::InvalidInput("empty input sequence".into()));
        }

        let last = self.layers.len() - 1;
        let mut x = xs.clone();
        for (idx, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if idx < last && self.dropout > 0.0 {
                if let Some(rng) = rng.as_deref_mut() {
                    x = self.apply_dropout(&x, rng)?;
                }
            }
        }

        let top = x.narrow(1, seq_len - 1, 1)?.squeeze(1)?.contiguous()?;
        self.head.forward(&top)
    }

    fn apply_dropout(&self, x: &Tensor, rng: &mut dyn RngCore) -> TeResult<Tensor> {
        let keep = 1.0 - self.dropout;
        let scale = 1.0 / keep;
        let mask: Vec<f64> = (0..x.elem_count())
            .map(|_| if rng.gen::<f64>() < keep { scale } else { 0.0 })
            .collect();
        let mask = Tensor::from_vec(mask, x.dims().to_vec(), x.device())?;
        Ok(x.mul(&mask)?)
    }

    /// Stack depth
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl ParamSet for LstmRegressor {
    fn named_vars(&self) -> Vec<(String, Var)> {
        let mut vars = Vec::with_capacity(self.layers.len() * 4 + 2);
        for (i, layer) in self.layers.iter().enumerate() {
            vars.push((format!("lstm{i}.w_ih"), layer.w_ih.clone()));
            vars.push((format!("lstm{i}.w_hh"), layer.w_hh.clone()));
            vars.push((format!("lstm{i}.b_ih"), layer.b_ih.clone()));
            vars.push((format!("lstm{i}.b_hh"), layer.b_hh.clone()));
        }
        vars.push(("head.weight".to_string(), self.head.weight.clone()));
        vars.push(("head.bias".to_string(), self.head.bias.clone()));
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn input(batch: usize, seq_len: usize) -> Tensor {
        let values: Vec<f64> = (0..batch * seq_len).map(|i| (i as f64 * 0.1).sin()).collect();
        Tensor::from_vec(values, (batch, seq_len, 1), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_output_shape() {
        let model = LstmRegressor::new(1, 8, 2, 0.2, &mut StdRng::seed_from_u64(0), &Device::Cpu).unwrap();
        let out = model.forward(&input(3, 10)).unwrap();
        assert_eq!(out.dims(), &[3, 1]);
        // 2 layers of 4*8*(in+8) + 2*4*8, plus an 8 -> 1 head
        let expected = (32 * 1 + 32 * 8 + 64) + (32 * 8 + 32 * 8 + 64) + 9;
        assert_eq!(model.num_parameters(), expected);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let model = LstmRegressor::new(1, 4, 2, 0.5, &mut StdRng::seed_from_u64(1), &Device::Cpu).unwrap();
        let xs = input(2, 6);
        let a = model.forward(&xs).unwrap().to_vec2::<f64>().unwrap();
        let b = model.forward(&xs).unwrap().to_vec2::<f64>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_training_pass_uses_dropout() {
        let model = LstmRegressor::new(1, 16, 2, 0.5, &mut StdRng::seed_from_u64(2), &Device::Cpu).unwrap();
        let xs = input(4, 6);
        let eval = model.forward(&xs).unwrap().to_vec2::<f64>().unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let train = model.forward_train(&xs, &mut rng).unwrap().to_vec2::<f64>().unwrap();
        assert_ne!(eval, train);
    }

    #[test]
    fn test_single_layer_ignores_dropout() {
        let model = LstmRegressor::new(1, 4, 1, 0.5, &mut StdRng::seed_from_u64(3), &Device::Cpu).unwrap();
        let xs = input(2, 5);
        let eval = model.forward(&xs).unwrap().to_vec2::<f64>().unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let train = model.forward_train(&xs, &mut rng).unwrap().to_vec2::<f64>().unwrap();
        assert_eq!(eval, train);
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(LstmRegressor::new(1, 0, 2, 0.2, &mut rng, &Device::Cpu).is_err());
        assert!(LstmRegressor::new(1, 4, 2, 1.0, &mut rng, &Device::Cpu).is_err());
    }
}
