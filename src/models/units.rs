use crate::error::Result;
use crate::io::StateDict;
use crate::models::config::UnitSpec;
use crate::nn::{Activation, ConvNd, Dropout, Linear, MaxPoolNd, Module};
use crate::tensor::{RawTensor, Tensor};
use std::cell::Cell;

fn prefixed(state: &mut StateDict, prefix: &str, sub: StateDict) {
    for (key, value) in sub {
        state.insert(format!("{prefix}.{key}"), value);
    }
}

fn sub_state(state: &StateDict, prefix: &str) -> StateDict {
    let prefix = format!("{prefix}.");
    state
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|s| (s.to_string(), v.clone())))
        .collect()
}

/// One convolutional stage: convolution, optional max-pool, activation,
/// optional dropout.
pub struct ConvUnit {
    conv: ConvNd,
    pool: Option<MaxPoolNd>,
    activation: Option<Box<dyn Module>>,
    dropout: Option<Dropout>,
    training: Cell<bool>,
}

impl ConvUnit {
    pub fn from_spec(spec: &UnitSpec) -> Result<Self> {
        let conv = ConvNd::new(
            spec.in_channels,
            spec.out_channels,
            &spec.kernel_size,
            &spec.stride,
            &spec.padding,
            true,
        )?;
        let pool = spec
            .pool_size
            .as_deref()
            .map(MaxPoolNd::new)
            .transpose()?;
        let dropout = spec.dropout.map(Dropout::new).transpose()?;
        Ok(Self {
            conv,
            pool,
            activation: spec.activation.map(Activation::layer),
            dropout,
            training: Cell::new(true),
        })
    }

    pub fn conv(&self) -> &ConvNd {
        &self.conv
    }
}

impl Module for ConvUnit {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut out = self.conv.forward(x)?;
        if let Some(pool) = &self.pool {
            out = pool.forward(&out)?;
        }
        if let Some(act) = &self.activation {
            out = act.forward(&out)?;
        }
        if let Some(dropout) = &self.dropout {
            out = dropout.forward(&out)?;
        }
        Ok(out)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.conv.parameters()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        prefixed(&mut state, "conv", self.conv.state_dict());
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        self.conv.load_state_dict(&sub_state(state, "conv"));
    }

    fn train(&self, mode: bool) {
        self.training.set(mode);
        if let Some(d) = &self.dropout {
            d.train(mode);
        }
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}

/// One dense stage: linear map, optional activation, optional dropout.
///
/// Also serves as the classification head of a network.
pub struct DenseUnit {
    linear: Linear,
    activation: Option<Box<dyn Module>>,
    dropout: Option<Dropout>,
    training: Cell<bool>,
}

impl DenseUnit {
    pub fn new(
        in_features: usize,
        out_features: usize,
        activation: Option<Activation>,
        dropout: Option<f32>,
    ) -> Result<Self> {
        RawTensor::check_alloc(&[in_features, out_features])?;
        Ok(Self {
            linear: Linear::new(in_features, out_features, true),
            activation: activation.map(Activation::layer),
            dropout: dropout.map(Dropout::new).transpose()?,
            training: Cell::new(true),
        })
    }

    pub fn in_features(&self) -> usize {
        self.linear.in_features()
    }

    pub fn out_features(&self) -> usize {
        self.linear.out_features()
    }
}

impl Module for DenseUnit {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut out = self.linear.forward(x)?;
        if let Some(act) = &self.activation {
            out = act.forward(&out)?;
        }
        if let Some(dropout) = &self.dropout {
            out = dropout.forward(&out)?;
        }
        Ok(out)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.linear.parameters()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        prefixed(&mut state, "linear", self.linear.state_dict());
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        self.linear.load_state_dict(&sub_state(state, "linear"));
    }

    fn train(&self, mode: bool) {
        self.training.set(mode);
        if let Some(d) = &self.dropout {
            d.train(mode);
        }
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}
