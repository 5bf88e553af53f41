//! Fan-in shape reconciliation.
//!
//! When a network consumes several upstream networks their outputs rarely
//! agree in shape. A common spatial shape is chosen as the element-wise max
//! over every spatial upstream, and each input is cast to it:
//!
//! - a flat input is zero-padded and folded into `[n_channels, *target]`
//! - a lower-rank spatial input gets singleton axes after its channel axis,
//!   then every spatial axis is zero-padded around its centre
//!
//! The cast inputs are concatenated along the channel axis.

use crate::error::{Result, ShapeMismatchError};
use crate::models::shape::{ShapeDescriptor, ShapeKind};
use crate::tensor::{RawTensor, Tensor, TensorOps, cat};

/// Split a padding deficit into `(leading, trailing)`, the extra element
/// going first.
pub fn split_deficit(deficit: usize) -> (usize, usize) {
    (deficit.div_ceil(2), deficit / 2)
}

/// Whether a set of upstream shapes has to be reconciled before it can be
/// concatenated.
pub fn needs_reconciliation(upstream: &[ShapeDescriptor]) -> bool {
    upstream.len() > 1
}

/// How a single upstream output is brought to the target spatial shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FanInCast {
    /// Flat input: pad the feature axis, then fold into `n_channels` maps
    Broadcast {
        n_channels: usize,
        pad: (usize, usize),
    },
    /// Spatial input: insert singleton axes after the channel axis, then pad
    /// each spatial axis
    Pad {
        inserted_axes: usize,
        padding: Vec<(usize, usize)>,
    },
}

impl FanInCast {
    /// Apply to a batched tensor `[B, *per_sample]`
    pub fn apply(&self, x: &Tensor, target_spatial: &[usize]) -> Result<Tensor> {
        match self {
            FanInCast::Broadcast { n_channels, pad } => {
                let flat = x.flatten_batch()?;
                let batch = flat.shape()[0];
                let padded = flat.pad(&[(0, 0), *pad])?;
                let mut shape = vec![batch, *n_channels];
                shape.extend_from_slice(target_spatial);
                padded.reshape(&shape)
            }
            FanInCast::Pad {
                inserted_axes,
                padding,
            } => {
                let mut out = x.clone();
                for _ in 0..*inserted_axes {
                    out = out.unsqueeze(2)?;
                }
                let mut pads = vec![(0, 0), (0, 0)];
                pads.extend_from_slice(padding);
                out.pad(&pads)
            }
        }
    }

    pub fn is_identity(&self) -> bool {
        match self {
            FanInCast::Broadcast { .. } => false,
            FanInCast::Pad {
                inserted_axes,
                padding,
            } => *inserted_axes == 0 && padding.iter().all(|&(l, r)| l == 0 && r == 0),
        }
    }
}

/// Result of reconciling a set of upstream shapes.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    /// `[1, *target_spatial]`
    pub target_shape: ShapeDescriptor,
    /// Per-sample shape after concatenation
    pub unified_in_dim: ShapeDescriptor,
    pub inputs: Vec<ShapeDescriptor>,
    pub casts: Vec<FanInCast>,
}

impl Reconciliation {
    pub fn target_spatial(&self) -> &[usize] {
        self.target_shape.spatial()
    }

    /// Cast every batched input and concatenate along the channel axis.
    pub fn apply(&self, inputs: &[Tensor]) -> Result<Tensor> {
        if inputs.len() != self.casts.len() {
            return Err(ShapeMismatchError::Incompatible(format!(
                "expected {} inputs, got {}",
                self.casts.len(),
                inputs.len()
            ))
            .into());
        }
        let cast = inputs
            .iter()
            .zip(&self.inputs)
            .zip(&self.casts)
            .enumerate()
            .map(|(i, ((x, expected), cast))| {
                let shape = x.shape();
                if shape.get(1..) != Some(expected.dims()) {
                    return Err(ShapeMismatchError::Incompatible(format!(
                        "input {i} has shape {shape:?}, expected a batch of {expected}"
                    ))
                    .into());
                }
                cast.apply(x, self.target_spatial())
            })
            .collect::<Result<Vec<_>>>()?;
        cat(&cast, 1)
    }
}

fn cast_for(
    index: usize,
    dims: &ShapeDescriptor,
    target_spatial: &[usize],
) -> std::result::Result<FanInCast, ShapeMismatchError> {
    match dims.kind() {
        ShapeKind::Flat => {
            let incompatible = || {
                ShapeMismatchError::Incompatible(format!(
                    "cannot fold input {index} of shape {dims} into spatial shape {target_spatial:?}"
                ))
            };
            let numel = dims.checked_numel().ok_or_else(incompatible)?;
            let sequence_length = target_spatial
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .ok_or_else(incompatible)?;
            if numel == 0 || sequence_length == 0 {
                return Err(incompatible());
            }
            let n_channels = numel.div_ceil(sequence_length);
            let padded = sequence_length
                .checked_mul(n_channels)
                .ok_or_else(incompatible)?;
            Ok(FanInCast::Broadcast {
                n_channels,
                pad: split_deficit(padded - numel),
            })
        }
        ShapeKind::Spatial(rank) => {
            let inserted_axes = target_spatial.len() - rank;
            let mut spatial = vec![1; inserted_axes];
            spatial.extend_from_slice(dims.spatial());

            // innermost axis first, then restored to axis order for `pad`
            let mut padding = Vec::with_capacity(spatial.len());
            for axis in (0..spatial.len()).rev() {
                let (actual, target) = (spatial[axis], target_spatial[axis]);
                let deficit = target.checked_sub(actual).ok_or(
                    ShapeMismatchError::NegativeDeficit {
                        input: index,
                        axis: axis + 1,
                        target,
                        actual,
                    },
                )?;
                padding.push(split_deficit(deficit));
            }
            padding.reverse();
            Ok(FanInCast::Pad {
                inserted_axes,
                padding,
            })
        }
    }
}

/// Compute the common spatial shape of `upstream` and the cast for each
/// input.
///
/// Axis numbers in [`ShapeMismatchError::NegativeDeficit`] count the channel
/// axis as 0.
pub fn reconcile(upstream: &[ShapeDescriptor]) -> Result<Reconciliation> {
    let spatial: Vec<&[usize]> = upstream
        .iter()
        .filter(|d| matches!(d.kind(), ShapeKind::Spatial(_)))
        .map(ShapeDescriptor::spatial)
        .collect();
    let max_rank = spatial
        .iter()
        .map(|s| s.len())
        .max()
        .ok_or(ShapeMismatchError::NoSpatialInput)?;

    let mut target_spatial = vec![0; max_rank];
    for shape in &spatial {
        for (t, &d) in target_spatial.iter_mut().zip(shape.iter()) {
            *t = (*t).max(d);
        }
    }

    let casts = upstream
        .iter()
        .enumerate()
        .map(|(i, d)| cast_for(i, d, &target_spatial))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut target_shape = vec![1];
    target_shape.extend_from_slice(&target_spatial);
    let mut reconciliation = Reconciliation {
        target_shape: target_shape.into(),
        unified_in_dim: ShapeDescriptor::new(Vec::new()),
        inputs: upstream.to_vec(),
        casts,
    };

    let synthetic = upstream
        .iter()
        .map(|d| {
            RawTensor::try_ones(&d.batched(1)).map_err(|e| {
                ShapeMismatchError::Incompatible(format!("input of shape {d}: {e}"))
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let unified = reconciliation.apply(&synthetic)?;
    reconciliation.unified_in_dim = ShapeDescriptor::from(&unified.shape()[1..]);
    Ok(reconciliation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetError;
    use proptest::prelude::*;

    fn sd<const N: usize>(dims: [usize; N]) -> ShapeDescriptor {
        ShapeDescriptor::from(dims)
    }

    #[test]
    fn test_mixed_rank_spatial_inputs() {
        let r = reconcile(&[sd([16, 8, 8]), sd([12, 4])]).unwrap();
        assert_eq!(r.target_shape, sd([1, 8, 8]));
        assert_eq!(
            r.casts[1],
            FanInCast::Pad {
                inserted_axes: 1,
                padding: vec![(4, 3), (2, 2)],
            }
        );
        assert!(r.casts[0].is_identity());
        assert_eq!(r.unified_in_dim, sd([28, 8, 8]));

        let cast = r.casts[1]
            .apply(&RawTensor::ones(&[1, 12, 4]), r.target_spatial())
            .unwrap();
        assert_eq!(cast.shape(), vec![1, 12, 8, 8]);
    }

    #[test]
    fn test_flat_input_is_folded() {
        let r = reconcile(&[sd([16, 8, 8]), sd([200])]).unwrap();
        // 200 values over 64 positions: 4 channels, 56 padded
        assert_eq!(
            r.casts[1],
            FanInCast::Broadcast {
                n_channels: 4,
                pad: (28, 28),
            }
        );
        let cast = r.casts[1]
            .apply(&RawTensor::ones(&[1, 200]), r.target_spatial())
            .unwrap();
        assert_eq!(cast.shape(), vec![1, 4, 8, 8]);
        let data = cast.to_vec();
        assert_eq!(data[27], 0.0);
        assert_eq!(data[28], 1.0);
        assert_eq!(data[227], 1.0);
        assert_eq!(data[228], 0.0);
        assert_eq!(r.unified_in_dim, sd([20, 8, 8]));
    }

    #[test]
    fn test_rank_one_input_gains_two_axes() {
        let r = reconcile(&[sd([2, 4, 4, 4]), sd([3, 2])]).unwrap();
        assert_eq!(
            r.casts[1],
            FanInCast::Pad {
                inserted_axes: 2,
                padding: vec![(2, 1), (2, 1), (1, 1)],
            }
        );
        let cast = r.casts[1]
            .apply(&RawTensor::ones(&[1, 3, 2]), r.target_spatial())
            .unwrap();
        assert_eq!(cast.shape(), vec![1, 3, 4, 4, 4]);
        assert_eq!(r.unified_in_dim, sd([5, 4, 4, 4]));
    }

    #[test]
    fn test_oversized_shapes_are_incompatible() {
        let err = reconcile(&[sd([1, 1 << 33, 1 << 33]), sd([5])]).unwrap_err();
        assert!(matches!(
            err,
            NetError::ShapeMismatch(ShapeMismatchError::Incompatible(_))
        ));

        // fits in usize but is too large to materialise
        let err = reconcile(&[sd([1, 100_000, 100_000]), sd([4, 8])]).unwrap_err();
        assert!(matches!(
            err,
            NetError::ShapeMismatch(ShapeMismatchError::Incompatible(_))
        ));
    }

    #[test]
    fn test_odd_deficit_pads_leading_side_more() {
        let r = reconcile(&[sd([1, 5]), sd([1, 2])]).unwrap();
        let y = r.casts[1]
            .apply(&RawTensor::new(vec![7.0, 9.0], &[1, 1, 2], false), &[5])
            .unwrap();
        assert_eq!(y.to_vec(), vec![0.0, 0.0, 7.0, 9.0, 0.0]);
    }

    #[test]
    fn test_negative_deficit() {
        // target [5, 3]; [6, 5] becomes [6, 1, 5] whose last axis overflows
        let err = reconcile(&[sd([4, 2, 3]), sd([6, 5])]).unwrap_err();
        assert!(matches!(
            err,
            NetError::ShapeMismatch(ShapeMismatchError::NegativeDeficit {
                input: 1,
                axis: 2,
                target: 3,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_all_flat_rejected() {
        let err = reconcile(&[sd([10]), sd([20])]).unwrap_err();
        assert!(matches!(
            err,
            NetError::ShapeMismatch(ShapeMismatchError::NoSpatialInput)
        ));
    }

    #[test]
    fn test_single_spatial_input_passes_through() {
        let r = reconcile(&[sd([3, 6, 6])]).unwrap();
        assert!(r.casts[0].is_identity());
        assert_eq!(r.unified_in_dim, sd([3, 6, 6]));
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let inputs = [sd([1, 28, 28, 28]), sd([10]), sd([4, 7, 3])];
        assert_eq!(reconcile(&inputs).unwrap(), reconcile(&inputs).unwrap());
    }

    #[test]
    fn test_apply_rejects_wrong_input_shape() {
        let r = reconcile(&[sd([16, 8, 8]), sd([12, 4])]).unwrap();
        let err = r
            .apply(&[RawTensor::ones(&[2, 16, 8, 8]), RawTensor::ones(&[2, 12, 5])])
            .unwrap_err();
        assert!(matches!(
            err,
            NetError::ShapeMismatch(ShapeMismatchError::Incompatible(_))
        ));
    }

    #[test]
    fn test_apply_keeps_batch() {
        let r = reconcile(&[sd([2, 4, 4]), sd([6])]).unwrap();
        let y = r
            .apply(&[RawTensor::ones(&[3, 2, 4, 4]), RawTensor::ones(&[3, 6])])
            .unwrap();
        assert_eq!(y.shape(), vec![3, 3, 4, 4]);
    }

    proptest! {
        #[test]
        fn prop_split_deficit_is_centred(d in 0usize..10_000) {
            let (lead, trail) = split_deficit(d);
            prop_assert_eq!(lead + trail, d);
            prop_assert!(lead == trail || lead == trail + 1);
        }

        #[test]
        fn prop_spatial_input_reaches_target(
            a in 1usize..6, b in 1usize..6, c in 1usize..6, extra in 0usize..4
        ) {
            let r = reconcile(&[sd([1, a + extra, b + extra]), sd([2, a, b]), sd([c * 5])]).unwrap();
            let target = r.target_spatial().to_vec();
            for (i, dims) in r.inputs.iter().enumerate() {
                let y = r.casts[i].apply(&RawTensor::ones(&dims.batched(1)), &target).unwrap();
                prop_assert_eq!(&y.shape()[2..], target.as_slice());
            }
        }
    }
}
