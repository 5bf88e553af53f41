//! Composable networks: unit configuration, pipeline construction, fan-in
//! shape reconciliation and the [`Network`] facade.

pub mod builder;
pub mod cnn;
pub mod config;
pub mod diagnostics;
pub mod dnn;
pub mod network;
pub mod probe;
pub mod reconcile;
pub mod shape;
pub mod units;

pub use builder::{BuiltPipeline, build_conv_network, build_dense_network};
pub use cnn::{ConvNet, ConvNetBuilder};
pub use config::{ConvNetConfig, DenseNetConfig, OptimSpec, TrainingOptions, UnitSpec};
pub use diagnostics::{CollectingDiagnostics, Diagnostics, LogDiagnostics};
pub use dnn::{DenseNet, DenseNetBuilder};
pub use network::{InputRegistry, NetInput, Network, NetworkCore, extract_class_labels};
pub use probe::{Probe, probe};
pub use reconcile::{FanInCast, Reconciliation, reconcile, split_deficit};
pub use shape::{InDim, ShapeDescriptor, ShapeKind};
pub use units::{ConvUnit, DenseUnit};
