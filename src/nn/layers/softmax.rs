use crate::error::Result;
use crate::nn::Module;
use crate::tensor::{Tensor, TensorOps};

/// Softmax over the last axis, typically used as a prediction activation.
pub struct Softmax;

impl Module for Softmax {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.softmax())
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}
