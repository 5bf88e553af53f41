use crate::error::{ConfigError, Result};
use crate::models::builder::build_conv_network;
use crate::models::config::{ConvNetConfig, TrainingOptions, UnitSpec};
use crate::models::diagnostics::{Diagnostics, LogDiagnostics};
use crate::models::network::{
    InputRegistry, Network, NetworkCore, check_num_classes, resolve_inputs,
};
use crate::models::probe::probe;
use crate::models::reconcile::{Reconciliation, needs_reconciliation, reconcile};
use crate::models::shape::{InDim, ShapeDescriptor};
use crate::models::units::DenseUnit;
use crate::nn::{Activation, Module, Sequential};
use crate::tensor::{Tensor, cat};
use serde_json::Value;
use std::rc::Rc;

/// Convolutional network built from a list of conv units, optionally fed by
/// other networks and optionally ending in a classification head.
pub struct ConvNet {
    core: NetworkCore,
    config: ConvNetConfig,
    units: Vec<UnitSpec>,
    network: Sequential,
    reconciliation: Option<Reconciliation>,
    conv_in_dim: ShapeDescriptor,
    conv_out_dim: ShapeDescriptor,
    conv_flat_dim: usize,
}

/// Everything derived from a config and an input dimension
struct Assembled {
    units: Vec<UnitSpec>,
    network: Sequential,
    reconciliation: Option<Reconciliation>,
    conv_in_dim: ShapeDescriptor,
    conv_out_dim: ShapeDescriptor,
    conv_flat_dim: usize,
    head: Option<DenseUnit>,
    out_dim: ShapeDescriptor,
}

struct HeadSpec {
    num_classes: Option<usize>,
    activation: Activation,
    pred_activation: Option<Activation>,
}

fn assemble(
    name: &str,
    config: &ConvNetConfig,
    in_dim: &InDim,
    head: &HeadSpec,
    diagnostics: &dyn Diagnostics,
) -> Result<Assembled> {
    let upstream = in_dim.descriptors();
    let (reconciliation, conv_in_dim) = if needs_reconciliation(upstream) {
        let r = reconcile(upstream)?;
        diagnostics.info(&format!(
            "{name}: reconciled {} inputs to {} (target spatial {:?})",
            upstream.len(),
            r.unified_in_dim,
            r.target_spatial()
        ));
        let unified = r.unified_in_dim.clone();
        (Some(r), unified)
    } else {
        let single = upstream
            .first()
            .cloned()
            .ok_or_else(|| ConfigError::MissingInDim(name.to_string()))?;
        (None, single)
    };

    let built = build_conv_network(
        &config.units,
        conv_in_dim.channels(),
        head.activation,
        diagnostics,
    )?;
    let probed = probe(name, &built.network, &conv_in_dim)?;
    diagnostics.debug(&format!(
        "{name}: {conv_in_dim} -> {} ({} features)",
        probed.out_shape, probed.flat_dim
    ));

    let head_unit = head
        .num_classes
        .map(|n| DenseUnit::new(probed.flat_dim, n, head.pred_activation, None))
        .transpose()?;
    let out_dim = match head.num_classes {
        Some(n) => ShapeDescriptor::flat(n),
        None => probed.out_shape.clone(),
    };

    Ok(Assembled {
        units: built.units,
        network: built.network,
        reconciliation,
        conv_in_dim,
        conv_out_dim: probed.out_shape,
        conv_flat_dim: probed.flat_dim,
        head: head_unit,
        out_dim,
    })
}

impl ConvNet {
    /// Start configuring a network called `name`.
    ///
    /// ```
    /// use composenet::models::{ConvNet, Network};
    /// use serde_json::json;
    ///
    /// let net = ConvNet::builder("digits")
    ///     .in_dim([1, 28, 28])
    ///     .config(json!({"conv_units": [
    ///         {"in_channels": 1, "out_channels": 16, "kernel_size": [5, 5], "pool_size": 2, "stride": 2},
    ///         {"in_channels": 16, "out_channels": 1, "kernel_size": [5, 5], "stride": 2, "padding": 2}
    ///     ]}))
    ///     .num_classes(3)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(net.conv_flat_dim(), 9);
    /// assert_eq!(net.out_dim().dims(), &[3]);
    /// ```
    pub fn builder<'a>(name: impl Into<String>) -> ConvNetBuilder<'a> {
        ConvNetBuilder::new(name)
    }

    /// Validated config as given, before the build step
    pub fn config(&self) -> &ConvNetConfig {
        &self.config
    }

    /// Unit specs the pipeline was built from
    pub fn units(&self) -> &[UnitSpec] {
        &self.units
    }

    pub fn reconciliation(&self) -> Option<&Reconciliation> {
        self.reconciliation.as_ref()
    }

    /// Per-sample shape entering the pipeline
    pub fn conv_in_dim(&self) -> &ShapeDescriptor {
        &self.conv_in_dim
    }

    /// Per-sample shape leaving the pipeline, before the head
    pub fn conv_out_dim(&self) -> &ShapeDescriptor {
        &self.conv_out_dim
    }

    pub fn conv_flat_dim(&self) -> usize {
        self.conv_flat_dim
    }

    /// Register another upstream network and rebuild.
    ///
    /// The input dimension is recomputed from every registered upstream. On
    /// failure the network is left unchanged.
    pub fn add_input_network(&mut self, net: &Rc<dyn Network>) -> Result<()> {
        self.add_input_network_with(net, &LogDiagnostics)
    }

    /// [`ConvNet::add_input_network`] reporting the rebuild to `diagnostics`
    pub fn add_input_network_with(
        &mut self,
        net: &Rc<dyn Network>,
        diagnostics: &dyn Diagnostics,
    ) -> Result<()> {
        let mut registry = self.core.input_networks.clone();
        registry.insert(net)?;
        let in_dim = InDim::from_upstream(registry.out_dims()?);
        let head = HeadSpec {
            num_classes: self.core.num_classes,
            activation: self.core.activation,
            pred_activation: self.core.pred_activation,
        };
        let assembled = assemble(&self.core.name, &self.config, &in_dim, &head, diagnostics)?;
        self.commit(registry, in_dim, assembled);
        Ok(())
    }

    fn commit(&mut self, registry: InputRegistry, in_dim: InDim, a: Assembled) {
        self.core.input_networks = registry;
        self.core.in_dim = in_dim;
        self.core.out_dim = a.out_dim;
        self.core.head = a.head;
        self.units = a.units;
        self.network = a.network;
        self.reconciliation = a.reconciliation;
        self.conv_in_dim = a.conv_in_dim;
        self.conv_out_dim = a.conv_out_dim;
        self.conv_flat_dim = a.conv_flat_dim;
    }
}

impl Network for ConvNet {
    fn core(&self) -> &NetworkCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NetworkCore {
        &mut self.core
    }

    fn network(&self) -> &Sequential {
        &self.network
    }

    fn network_mut(&mut self) -> &mut Sequential {
        &mut self.network
    }

    fn forward_inputs(&self, inputs: &[Tensor]) -> Result<Tensor> {
        let x = match (&self.reconciliation, inputs) {
            (Some(r), _) => r.apply(inputs)?,
            (None, [single]) => single.clone(),
            (None, _) => cat(inputs, 1)?,
        };
        let out = self.network.forward(&x)?;
        self.core.apply_head(out)
    }
}

/// Builder for [`ConvNet`]
pub struct ConvNetBuilder<'a> {
    name: String,
    in_dim: Option<InDim>,
    raw_config: Option<Value>,
    config: Option<ConvNetConfig>,
    inputs: Vec<Rc<dyn Network>>,
    num_classes: Option<usize>,
    activation: Activation,
    pred_activation: Option<Activation>,
    training: TrainingOptions,
    diagnostics: Option<&'a dyn Diagnostics>,
}

impl<'a> ConvNetBuilder<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_dim: None,
            raw_config: None,
            config: None,
            inputs: Vec::new(),
            num_classes: None,
            activation: Activation::ReLU,
            pred_activation: None,
            training: TrainingOptions::default(),
            diagnostics: None,
        }
    }

    /// Input dimension of a network without input networks
    #[must_use]
    pub fn in_dim(mut self, in_dim: impl Into<InDim>) -> Self {
        self.in_dim = Some(in_dim.into());
        self
    }

    /// Raw configuration, validated by [`ConvNetBuilder::build`]
    #[must_use]
    pub fn config(mut self, raw: Value) -> Self {
        self.raw_config = Some(raw);
        self
    }

    /// Already validated configuration; takes precedence over `config`
    #[must_use]
    pub fn units(mut self, config: ConvNetConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn input_network(mut self, net: &Rc<dyn Network>) -> Self {
        self.inputs.push(Rc::clone(net));
        self
    }

    #[must_use]
    pub fn num_classes(mut self, n: usize) -> Self {
        self.num_classes = Some(n);
        self
    }

    #[must_use]
    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    #[must_use]
    pub fn pred_activation(mut self, activation: Activation) -> Self {
        self.pred_activation = Some(activation);
        self
    }

    #[must_use]
    pub fn training(mut self, options: TrainingOptions) -> Self {
        self.training = options;
        self
    }

    /// Sink for construction messages; defaults to the `log` facade
    #[must_use]
    pub fn diagnostics(mut self, sink: &'a dyn Diagnostics) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn build(self) -> Result<ConvNet> {
        let config = match (self.config, &self.raw_config) {
            (Some(config), _) => config,
            (None, Some(raw)) => ConvNetConfig::from_value(raw)?,
            (None, None) => return Err(ConfigError::MissingKey("conv_units").into()),
        };
        check_num_classes(self.num_classes)?;
        let (registry, in_dim) = resolve_inputs(&self.name, &self.inputs, self.in_dim)?;

        let diagnostics = self.diagnostics.unwrap_or(&LogDiagnostics);
        let head = HeadSpec {
            num_classes: self.num_classes,
            activation: self.activation,
            pred_activation: self.pred_activation,
        };
        let a = assemble(&self.name, &config, &in_dim, &head, diagnostics)?;

        Ok(ConvNet {
            core: NetworkCore {
                name: self.name,
                in_dim,
                out_dim: a.out_dim,
                input_networks: registry,
                num_classes: self.num_classes,
                activation: self.activation,
                pred_activation: self.pred_activation,
                head: a.head,
                training: self.training,
            },
            config,
            units: a.units,
            network: a.network,
            reconciliation: a.reconciliation,
            conv_in_dim: a.conv_in_dim,
            conv_out_dim: a.conv_out_dim,
            conv_flat_dim: a.conv_flat_dim,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NetError, ShapeMismatchError};
    use crate::models::diagnostics::CollectingDiagnostics;
    use crate::tensor::{RawTensor, TensorOps};
    use serde_json::json;

    fn digits_config() -> Value {
        json!({"conv_units": [
            {"in_channels": 1, "out_channels": 16, "kernel_size": [5, 5], "pool_size": 2, "stride": 2},
            {"in_channels": 16, "out_channels": 1, "kernel_size": [5, 5], "stride": 2, "padding": 2}
        ]})
    }

    #[test]
    fn test_without_head_out_dim_is_probed_shape() {
        let net = ConvNet::builder("noclass")
            .in_dim([1, 28, 28])
            .config(digits_config())
            .build()
            .unwrap();
        assert_eq!(net.conv_flat_dim(), 9);
        assert_eq!(net.out_dim(), &ShapeDescriptor::from([1, 3, 3]));
        assert!(net.core().head().is_none());
    }

    #[test]
    fn test_missing_in_dim() {
        let err = ConvNet::builder("lost").config(digits_config()).build().err().unwrap();
        assert!(matches!(
            err,
            NetError::Config(ConfigError::MissingInDim(ref n)) if n == "lost"
        ));
    }

    #[test]
    fn test_missing_config() {
        let err = ConvNet::builder("empty").in_dim([1, 8, 8]).build().err().unwrap();
        assert!(matches!(
            err,
            NetError::Config(ConfigError::MissingKey("conv_units"))
        ));
    }

    #[test]
    fn test_rank_mismatch_fails_probe() {
        let err = ConvNet::builder("flat")
            .in_dim([200])
            .config(digits_config())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, NetError::Config(ConfigError::Probe { .. })));
    }

    #[test]
    fn test_forward_batch() {
        let sink = CollectingDiagnostics::new();
        let net = ConvNet::builder("class")
            .in_dim([1, 28, 28])
            .config(digits_config())
            .num_classes(3)
            .diagnostics(&sink)
            .build()
            .unwrap();
        let y = net.forward_inputs(&[RawTensor::ones(&[2, 1, 28, 28])]).unwrap();
        assert_eq!(y.shape(), vec![2, 3]);
        assert!(y.to_vec().iter().all(|v| v.is_finite()));
        assert!(sink.contains("9 features"));
    }

    #[test]
    fn test_zero_classes_rejected() {
        let err = ConvNet::builder("zero")
            .in_dim([1, 28, 28])
            .config(digits_config())
            .num_classes(0)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, NetError::InvalidParameter(_)));
    }

    #[test]
    fn test_oversized_in_dim_is_rejected() {
        let err = ConvNet::builder("big")
            .in_dim([1, 100_000, 100_000])
            .config(digits_config())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, NetError::Config(ConfigError::Probe { .. })));

        let err = ConvNet::builder("huge")
            .in_dim(InDim::Multi(vec![
                ShapeDescriptor::from([1, 1 << 33, 1 << 33]),
                ShapeDescriptor::flat(5),
            ]))
            .config(digits_config())
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            NetError::ShapeMismatch(ShapeMismatchError::Incompatible(_))
        ));
    }

    #[test]
    fn test_rebuild_reports_to_given_diagnostics() {
        let upstream: Rc<dyn Network> = Rc::new(
            ConvNet::builder("up")
                .in_dim([1, 28, 28])
                .config(json!({"conv_units": [
                    {"in_channels": 1, "out_channels": 2, "kernel_size": [3, 3], "padding": 1}
                ]}))
                .build()
                .unwrap(),
        );
        let mut net = ConvNet::builder("down")
            .in_dim([2, 28, 28])
            .config(digits_config())
            .build()
            .unwrap();
        let sink = CollectingDiagnostics::new();
        net.add_input_network_with(&upstream, &sink).unwrap();
        assert_eq!(net.in_dim(), &ShapeDescriptor::from([2, 28, 28]));
        assert!(sink.contains("9 features"));
    }
}
