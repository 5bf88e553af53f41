use crate::error::Result;
use crate::io::StateDict;
use crate::tensor::Tensor;

pub mod activation;
pub mod layers;

pub use activation::Activation;
pub use layers::{
    ConvNd, Dropout, HookHandle, Linear, MaxPoolNd, ReLU, Sequential, SequentialBuilder,
    Sigmoid, Softmax, Tanh,
};

pub trait Module {
    fn forward(&self, x: &Tensor) -> Result<Tensor>;
    fn parameters(&self) -> Vec<Tensor>;

    // State dict methods
    fn state_dict(&self) -> StateDict {
        StateDict::new()
    }
    fn load_state_dict(&mut self, _state: &StateDict) {}

    /// Switch between training and evaluation modes.
    /// Only stochastic layers such as `Dropout` care.
    fn train(&self, _mode: bool) {}
    fn eval(&self) {
        self.train(false);
    }
    fn is_training(&self) -> bool {
        true
    }

    /// Stop all parameters from taking part in training
    fn freeze(&self) {
        for p in self.parameters() {
            p.borrow_mut().requires_grad = false;
        }
    }
    fn unfreeze(&self) {
        for p in self.parameters() {
            p.borrow_mut().requires_grad = true;
        }
    }
}
