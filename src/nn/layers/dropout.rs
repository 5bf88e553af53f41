use crate::error::{NetError, Result};
use crate::nn::Module;
use crate::tensor::{RawTensor, Tensor};
use rand::Rng;
use std::cell::Cell;

pub struct Dropout {
    p: f32,
    training: Cell<bool>,
}

impl Dropout {
    /// Create a new Dropout layer
    ///
    /// # Arguments
    /// * `p` - Probability of an element being zeroed out, in \[0, 1)
    pub fn new(p: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(NetError::InvalidParameter(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        Ok(Self {
            p,
            training: Cell::new(true),
        })
    }

    pub fn p(&self) -> f32 {
        self.p
    }
}

impl Module for Dropout {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        if !self.training.get() || self.p == 0.0 {
            return Ok(x.clone());
        }

        let keep_prob = 1.0 - self.p;
        let scale = 1.0 / keep_prob;
        let req_grad = RawTensor::track(&[x]);
        let xs = x.borrow();

        // Inverted dropout: kept values are rescaled so eval needs no correction
        let data: Vec<f32> = crate::tensor::with_rng(|rng| {
            xs.data
                .iter()
                .map(|&v| {
                    if rng.random::<f32>() < keep_prob {
                        v * scale
                    } else {
                        0.0
                    }
                })
                .collect()
        });

        Ok(RawTensor::new(data, &xs.shape, req_grad))
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }

    fn train(&self, mode: bool) {
        self.training.set(mode);
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}
