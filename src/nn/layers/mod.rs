pub mod conv;
pub mod dropout;
pub mod linear;
pub mod maxpool;
pub mod relu;
pub mod sequential;
pub mod sequential_builder;
pub mod sigmoid;
pub mod softmax;
pub mod tanh;

pub use conv::ConvNd;
pub use dropout::Dropout;
pub use linear::Linear;
pub use maxpool::MaxPoolNd;
pub use relu::ReLU;
pub use sequential::{HookHandle, Sequential};
pub use sequential_builder::SequentialBuilder;
pub use sigmoid::Sigmoid;
pub use softmax::Softmax;
pub use tanh::Tanh;
