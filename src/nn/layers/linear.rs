use crate::error::Result;
use crate::io::{StateDict, TensorData};
use crate::nn::Module;
use crate::tensor::{RawTensor, Tensor, TensorOps};

/// Fully-connected (dense/linear) layer
///
/// Computes: y = xW + b
/// where x is (batch, in_features), W is (in_features, out_features), b is (out_features)
pub struct Linear {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Linear {
    /// Create a new linear layer with Xavier initialization
    pub fn new(in_features: usize, out_features: usize, use_bias: bool) -> Self {
        let w = RawTensor::xavier_uniform(&[in_features, out_features]);
        w.borrow_mut().requires_grad = true;
        let b = if use_bias {
            let b = RawTensor::zeros(&[out_features]);
            b.borrow_mut().requires_grad = true;
            Some(b)
        } else {
            None
        };
        Linear { weight: w, bias: b }
    }

    pub fn in_features(&self) -> usize {
        self.weight.borrow().shape[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.borrow().shape[1]
    }
}

impl Module for Linear {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.linear(&self.weight, self.bias.as_ref())
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        if let Some(ref bias) = self.bias {
            params.push(bias.clone())
        }
        params
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("weight".to_string(), TensorData::from_tensor(&self.weight));
        if let Some(b) = &self.bias {
            state.insert("bias".to_string(), TensorData::from_tensor(b));
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        if let Some(w) = state.get("weight") {
            w.copy_into(&self.weight);
        }
        if let (Some(b), Some(bias)) = (state.get("bias"), &self.bias) {
            b.copy_into(bias);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_shapes() {
        let layer = Linear::new(4, 3, true);
        assert_eq!((layer.in_features(), layer.out_features()), (4, 3));
        let y = layer.forward(&RawTensor::ones(&[5, 4])).unwrap();
        assert_eq!(y.shape(), vec![5, 3]);
    }

    #[test]
    fn test_linear_without_bias() {
        let layer = Linear::new(2, 2, false);
        assert_eq!(layer.parameters().len(), 1);
        let y = layer.forward(&RawTensor::zeros(&[1, 2])).unwrap();
        assert_eq!(y.to_vec(), vec![0.0, 0.0]);
    }
}
