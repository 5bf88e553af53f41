use thiserror::Error;

/// Problems with user-supplied configuration, raised while a network is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be specified")]
    MissingKey(&'static str),

    #[error("{0} must contain at least one unit")]
    EmptyUnits(&'static str),

    #[error("{field} needs to be specified in your config (unit {unit})")]
    MissingField { unit: usize, field: &'static str },

    #[error("invalid value for {field} in unit {unit}: {reason}")]
    InvalidField {
        unit: usize,
        field: &'static str,
        reason: String,
    },

    #[error("unit {unit} cannot be built: {reason}")]
    InvalidUnit { unit: usize, reason: String },

    #[error("network {0} has neither an input dimension nor input networks")]
    MissingInDim(String),

    #[error("input network {0} is already registered")]
    DuplicateInput(String),

    #[error("shape probe failed for network {network}: {reason}")]
    Probe { network: String, reason: String },

    #[error("network {network} produces an empty output for input {in_dim:?}")]
    NonPositiveFlatSize { network: String, in_dim: Vec<usize> },
}

/// Fan-in reconciliation could not find a consistent target shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeMismatchError {
    #[error("no spatial input network to reconcile against")]
    NoSpatialInput,

    #[error(
        "input {input} axis {axis} has size {actual}, larger than the reconciled size {target}"
    )]
    NegativeDeficit {
        input: usize,
        axis: usize,
        target: usize,
        actual: usize,
    },

    #[error("incompatible shapes: {0}")]
    Incompatible(String),
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error("Shape mismatch: tensor has {elements} elements but data length is {len}")]
    ShapeDataMismatch {
        shape: Vec<usize>,
        elements: usize,
        len: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Operation failed: {0}")]
    OpError(String),

    #[error("input network {0} was dropped")]
    DanglingInput(String),

    #[error("network {network} expects {expected} inputs, got {actual}")]
    InputArity {
        network: String,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state dict codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, NetError>;
