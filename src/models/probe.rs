use crate::error::{ConfigError, NetError, Result};
use crate::models::shape::ShapeDescriptor;
use crate::nn::Module;
use crate::tensor::{RawTensor, TensorOps, no_grad};

/// Output of a dry run through a pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Probe {
    /// Per-sample output shape
    pub out_shape: ShapeDescriptor,
    /// Product of `out_shape`
    pub flat_dim: usize,
}

/// Run a single all-ones sample of shape `in_dim` through `pipeline` to find
/// its output size.
///
/// The pass runs in evaluation mode without gradient tracking and restores
/// the pipeline's mode afterwards. Parameters are not touched.
pub fn probe(network: &str, pipeline: &dyn Module, in_dim: &ShapeDescriptor) -> Result<Probe> {
    let sample = RawTensor::try_ones(&in_dim.batched(1)).map_err(|e| ConfigError::Probe {
        network: network.to_string(),
        reason: e.to_string(),
    })?;
    let was_training = pipeline.is_training();
    pipeline.eval();
    let result = no_grad(|| pipeline.forward(&sample));
    pipeline.train(was_training);

    let out = result.map_err(|e| match e {
        NetError::Config(_) => e,
        other => ConfigError::Probe {
            network: network.to_string(),
            reason: other.to_string(),
        }
        .into(),
    })?;

    let out_shape = ShapeDescriptor::from(out.shape().get(1..).unwrap_or_default());
    let flat_dim = out_shape.numel();
    if out_shape.is_empty() || flat_dim == 0 {
        return Err(ConfigError::NonPositiveFlatSize {
            network: network.to_string(),
            in_dim: in_dim.dims().to_vec(),
        }
        .into());
    }
    log::trace!("probe {network}: {in_dim} -> {out_shape} ({flat_dim} features)");
    Ok(Probe { out_shape, flat_dim })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ConvNetConfig;
    use crate::models::builder::build_conv_network;
    use crate::models::diagnostics::CollectingDiagnostics;
    use crate::nn::{Activation, Dropout, Linear, Sequential};
    use serde_json::json;

    #[test]
    fn test_probe_sizes_conv_pipeline() {
        let cfg = ConvNetConfig::from_value(&json!({"conv_units": [
            {"in_channels": 1, "out_channels": 16, "kernel_size": [5, 5], "pool_size": 2, "stride": 2, "dropout": 0.1},
            {"in_channels": 16, "out_channels": 1, "kernel_size": [5, 5], "stride": 2, "padding": 2}
        ]}))
        .unwrap();
        let built =
            build_conv_network(&cfg.units, 1, Activation::ReLU, &CollectingDiagnostics::new())
                .unwrap();
        let before: Vec<Vec<f32>> = built.network.parameters().iter().map(|p| p.to_vec()).collect();

        let p = probe("conv", &built.network, &ShapeDescriptor::from([1, 28, 28])).unwrap();
        assert_eq!(p.out_shape, ShapeDescriptor::from([1, 3, 3]));
        assert_eq!(p.flat_dim, 9);

        let after: Vec<Vec<f32>> = built.network.parameters().iter().map(|p| p.to_vec()).collect();
        assert_eq!(before, after);
        assert!(built.network.is_training());
    }

    #[test]
    fn test_probe_restores_eval_mode() {
        let net = Sequential::new(vec![Box::new(Dropout::new(0.5).unwrap())]);
        net.eval();
        probe("drop", &net, &ShapeDescriptor::flat(4)).unwrap();
        assert!(!net.is_training());
    }

    #[test]
    fn test_kernel_larger_than_input() {
        let cfg = ConvNetConfig::from_value(&json!({"conv_units": [
            {"in_channels": 1, "out_channels": 2, "kernel_size": [5, 5]}
        ]}))
        .unwrap();
        let built =
            build_conv_network(&cfg.units, 1, Activation::ReLU, &CollectingDiagnostics::new())
                .unwrap();
        let err = probe("tiny", &built.network, &ShapeDescriptor::from([1, 3, 3])).unwrap_err();
        assert!(matches!(err, NetError::Config(ConfigError::Probe { .. })));
    }

    #[test]
    fn test_probe_flat_pipeline() {
        let net = Sequential::new(vec![Box::new(Linear::new(3, 2, true))]);
        let p = probe("fc", &net, &ShapeDescriptor::flat(3)).unwrap();
        assert_eq!(p.out_shape, ShapeDescriptor::flat(2));
        assert!(net.parameters().iter().all(|t| t.borrow().requires_grad));
    }

    #[test]
    fn test_oversized_sample_is_rejected() {
        let net = Sequential::new(vec![Box::new(Linear::new(3, 2, true))]);
        net.train(true);
        let err = probe("huge", &net, &ShapeDescriptor::from([1, 100_000, 100_000])).unwrap_err();
        assert!(matches!(
            err,
            NetError::Config(ConfigError::Probe { ref network, .. }) if network == "huge"
        ));
        assert!(net.is_training());
    }
}
