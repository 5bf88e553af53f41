use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a network output carries spatial structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// Dense output: a single feature axis
    Flat,
    /// Convolutional output with this many spatial axes
    Spatial(usize),
}

/// Per-sample tensor shape: `[channels, *spatial_dims]`, no batch axis.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeDescriptor(Vec<usize>);

impl ShapeDescriptor {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn flat(features: usize) -> Self {
        Self(vec![features])
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Leading axis: channels for spatial shapes, features for flat ones
    pub fn channels(&self) -> usize {
        self.0.first().copied().unwrap_or(0)
    }

    pub fn spatial(&self) -> &[usize] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn kind(&self) -> ShapeKind {
        match self.spatial().len() {
            0 => ShapeKind::Flat,
            n => ShapeKind::Spatial(n),
        }
    }

    /// Product of the dims, saturating at `usize::MAX`
    pub fn numel(&self) -> usize {
        self.0.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// Product of the dims, `None` on overflow
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// The shape with a leading batch axis
    pub fn batched(&self, batch: usize) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.0.len() + 1);
        shape.push(batch);
        shape.extend_from_slice(&self.0);
        shape
    }
}

impl From<Vec<usize>> for ShapeDescriptor {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for ShapeDescriptor {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for ShapeDescriptor {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Input dimension of a network: one shape, or one per upstream network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InDim {
    Single(ShapeDescriptor),
    Multi(Vec<ShapeDescriptor>),
}

impl InDim {
    pub fn from_upstream(mut dims: Vec<ShapeDescriptor>) -> Self {
        if dims.len() == 1 {
            InDim::Single(dims.remove(0))
        } else {
            InDim::Multi(dims)
        }
    }

    pub fn descriptors(&self) -> &[ShapeDescriptor] {
        match self {
            InDim::Single(d) => std::slice::from_ref(d),
            InDim::Multi(ds) => ds,
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors().is_empty()
    }
}

impl From<ShapeDescriptor> for InDim {
    fn from(dims: ShapeDescriptor) -> Self {
        InDim::Single(dims)
    }
}

impl From<Vec<usize>> for InDim {
    fn from(dims: Vec<usize>) -> Self {
        InDim::Single(dims.into())
    }
}

impl<const N: usize> From<[usize; N]> for InDim {
    fn from(dims: [usize; N]) -> Self {
        InDim::Single(dims.into())
    }
}

impl PartialEq<ShapeDescriptor> for InDim {
    fn eq(&self, other: &ShapeDescriptor) -> bool {
        matches!(self, InDim::Single(d) if d == other)
    }
}
