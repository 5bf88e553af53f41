//! Composable convolutional and dense networks.
//!
//! Networks are configured from JSON unit lists and can consume the outputs
//! of other networks. Inputs of different shapes are padded and folded to a
//! common spatial shape before they are concatenated.

pub mod error;
pub mod io;
pub mod models;
pub mod nn;
pub mod ops;
pub mod tensor;

pub use error::{ConfigError, NetError, Result, ShapeMismatchError};
pub use io::{StateDict, TensorData, load_state_dict, save_state_dict};
pub use models::{
    ConvNet, ConvNetConfig, DenseNet, DenseNetConfig, InDim, NetInput, Network, ShapeDescriptor,
    ShapeKind, TrainingOptions,
};
pub use nn::{Activation, Module};
pub use tensor::{RawTensor, Tensor, TensorOps, cat, manual_seed, no_grad, ones, randn, zeros};
