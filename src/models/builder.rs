use crate::error::{ConfigError, NetError, Result};
use crate::models::config::UnitSpec;
use crate::models::diagnostics::Diagnostics;
use crate::models::units::{ConvUnit, DenseUnit};
use crate::nn::{Activation, Sequential};

/// Normalized unit specs together with the pipeline built from them.
pub struct BuiltPipeline<S> {
    pub units: Vec<S>,
    pub network: Sequential,
}

fn unit_error(unit: usize, err: NetError) -> NetError {
    match err {
        NetError::Config(_) => err,
        other => ConfigError::InvalidUnit {
            unit,
            reason: other.to_string(),
        }
        .into(),
    }
}

/// Build the convolutional pipeline for `units`.
///
/// The returned specs are copies: the first one takes `upstream_channels` as
/// its input channels and every one uses `activation`. Stages are named
/// `conv_unit_{i}`.
pub fn build_conv_network(
    units: &[UnitSpec],
    upstream_channels: usize,
    activation: Activation,
    diagnostics: &dyn Diagnostics,
) -> Result<BuiltPipeline<UnitSpec>> {
    if units.is_empty() {
        return Err(ConfigError::EmptyUnits("conv_units").into());
    }

    let specs: Vec<UnitSpec> = units
        .iter()
        .enumerate()
        .map(|(i, u)| UnitSpec {
            in_channels: if i == 0 { upstream_channels } else { u.in_channels },
            activation: Some(activation),
            ..u.clone()
        })
        .collect();

    let mut builder = Sequential::builder();
    for (i, spec) in specs.iter().enumerate() {
        if let Some(p) = spec.dropout
            && !(0.0..1.0).contains(&p)
        {
            return Err(ConfigError::InvalidField {
                unit: i,
                field: "dropout",
                reason: format!("{p} is outside [0, 1)"),
            }
            .into());
        }
        let unit = ConvUnit::from_spec(spec).map_err(|e| unit_error(i, e))?;
        diagnostics.debug(&format!(
            "conv_unit_{i}: {}D conv {} -> {} kernel {:?} stride {:?} padding {:?} pool {:?}",
            spec.conv_dim(),
            spec.in_channels,
            spec.out_channels,
            spec.kernel_size,
            spec.stride,
            spec.padding,
            spec.pool_size,
        ));
        builder = builder.add_named(format!("conv_unit_{i}"), Box::new(unit));
    }

    Ok(BuiltPipeline {
        units: specs,
        network: builder.build(),
    })
}

/// Build a dense pipeline: one `DenseUnit` per entry of `units`, the first
/// taking `in_features`. Stages are named `dense_unit_{i}`.
pub fn build_dense_network(
    in_features: usize,
    units: &[usize],
    dropout: &[Option<f32>],
    activation: Activation,
    diagnostics: &dyn Diagnostics,
) -> Result<BuiltPipeline<usize>> {
    if units.is_empty() {
        return Err(ConfigError::EmptyUnits("dense_units").into());
    }

    let mut builder = Sequential::builder();
    let mut fan_in = in_features;
    for (i, &out) in units.iter().enumerate() {
        let p = dropout.get(i).copied().flatten();
        if let Some(p) = p
            && !(0.0..1.0).contains(&p)
        {
            return Err(ConfigError::InvalidField {
                unit: i,
                field: "dropout",
                reason: format!("{p} is outside [0, 1)"),
            }
            .into());
        }
        let unit = DenseUnit::new(fan_in, out, Some(activation), p).map_err(|e| unit_error(i, e))?;
        diagnostics.debug(&format!("dense_unit_{i}: {fan_in} -> {out} dropout {p:?}"));
        builder = builder.add_named(format!("dense_unit_{i}"), Box::new(unit));
        fan_in = out;
    }

    Ok(BuiltPipeline {
        units: units.to_vec(),
        network: builder.build(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ConvNetConfig;
    use crate::models::diagnostics::CollectingDiagnostics;
    use crate::nn::Module;
    use crate::tensor::{RawTensor, TensorOps};
    use serde_json::json;

    fn config() -> ConvNetConfig {
        ConvNetConfig::from_value(&json!({"conv_units": [
            {"in_channels": 99, "out_channels": 16, "kernel_size": [5, 5], "pool_size": 2, "stride": 2},
            {"in_channels": 16, "out_channels": 1, "kernel_size": [5, 5], "stride": 2, "padding": 2}
        ]}))
        .unwrap()
    }

    #[test]
    fn test_first_unit_takes_upstream_channels() {
        let cfg = config();
        let sink = CollectingDiagnostics::new();
        let built = build_conv_network(&cfg.units, 3, Activation::Tanh, &sink).unwrap();
        assert_eq!(built.units[0].in_channels, 3);
        assert_eq!(built.units[1].in_channels, 16);
        assert!(built.units.iter().all(|u| u.activation == Some(Activation::Tanh)));
        // caller's specs untouched
        assert_eq!(cfg.units[0].in_channels, 99);
        assert_eq!(cfg.units[0].activation, None);
        assert_eq!(
            built.network.layer_names(),
            vec![Some("conv_unit_0"), Some("conv_unit_1")]
        );
        assert!(sink.contains("conv_unit_1"));
    }

    #[test]
    fn test_built_pipeline_runs() {
        let cfg = config();
        let built =
            build_conv_network(&cfg.units, 1, Activation::ReLU, &CollectingDiagnostics::new())
                .unwrap();
        let y = built.network.forward(&RawTensor::ones(&[1, 1, 28, 28])).unwrap();
        assert_eq!(y.shape(), vec![1, 1, 3, 3]);
    }

    #[test]
    fn test_zero_stride_reported_per_unit() {
        let mut cfg = config();
        cfg.units[1].stride = vec![0, 0];
        let err = build_conv_network(&cfg.units, 1, Activation::ReLU, &CollectingDiagnostics::new())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            NetError::Config(ConfigError::InvalidUnit { unit: 1, .. })
        ));
    }

    #[test]
    fn test_dropout_out_of_range() {
        let mut cfg = config();
        cfg.units[0].dropout = Some(1.0);
        let err = build_conv_network(&cfg.units, 1, Activation::ReLU, &CollectingDiagnostics::new())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            NetError::Config(ConfigError::InvalidField { field: "dropout", .. })
        ));
    }

    #[test]
    fn test_dense_pipeline_chains_sizes() {
        let sink = CollectingDiagnostics::new();
        let built =
            build_dense_network(12, &[8, 4], &[Some(0.5), None], Activation::ReLU, &sink).unwrap();
        assert_eq!(
            built.network.layer_names(),
            vec![Some("dense_unit_0"), Some("dense_unit_1")]
        );
        built.network.eval();
        let y = built.network.forward(&RawTensor::ones(&[2, 12])).unwrap();
        assert_eq!(y.shape(), vec![2, 4]);
        assert!(sink.contains("12 -> 8"));
    }
}
