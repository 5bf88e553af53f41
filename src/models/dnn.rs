use crate::error::{ConfigError, Result};
use crate::models::builder::build_dense_network;
use crate::models::config::{DenseNetConfig, TrainingOptions};
use crate::models::diagnostics::{Diagnostics, LogDiagnostics};
use crate::models::network::{
    InputRegistry, Network, NetworkCore, check_num_classes, resolve_inputs,
};
use crate::models::probe::probe;
use crate::models::shape::{InDim, ShapeDescriptor};
use crate::models::units::DenseUnit;
use crate::nn::{Activation, Module, Sequential};
use crate::tensor::{Tensor, TensorOps, cat};
use serde_json::Value;
use std::rc::Rc;

/// Fully-connected network. Every input is flattened per sample and the
/// results are concatenated along the feature axis.
pub struct DenseNet {
    core: NetworkCore,
    config: DenseNetConfig,
    network: Sequential,
    in_features: usize,
}

struct Assembled {
    network: Sequential,
    in_features: usize,
    head: Option<DenseUnit>,
    out_dim: ShapeDescriptor,
}

fn assemble(
    name: &str,
    config: &DenseNetConfig,
    in_dim: &InDim,
    num_classes: Option<usize>,
    activation: Activation,
    pred_activation: Option<Activation>,
    diagnostics: &dyn Diagnostics,
) -> Result<Assembled> {
    let in_features = in_dim
        .descriptors()
        .iter()
        .try_fold(0usize, |acc, d| d.checked_numel().and_then(|n| acc.checked_add(n)))
        .ok_or_else(|| ConfigError::Probe {
            network: name.to_string(),
            reason: format!("input size of {in_dim:?} overflows"),
        })?;
    if in_features == 0 {
        return Err(ConfigError::NonPositiveFlatSize {
            network: name.to_string(),
            in_dim: Vec::new(),
        }
        .into());
    }

    let built = build_dense_network(
        in_features,
        &config.dense_units,
        &config.dropout,
        activation,
        diagnostics,
    )?;
    let probed = probe(name, &built.network, &ShapeDescriptor::flat(in_features))?;
    diagnostics.debug(&format!(
        "{name}: {in_features} -> {} features",
        probed.flat_dim
    ));

    let head = num_classes
        .map(|n| DenseUnit::new(probed.flat_dim, n, pred_activation, None))
        .transpose()?;
    let out_dim = match num_classes {
        Some(n) => ShapeDescriptor::flat(n),
        None => probed.out_shape,
    };
    Ok(Assembled {
        network: built.network,
        in_features,
        head,
        out_dim,
    })
}

impl DenseNet {
    pub fn builder<'a>(name: impl Into<String>) -> DenseNetBuilder<'a> {
        DenseNetBuilder::new(name)
    }

    pub fn config(&self) -> &DenseNetConfig {
        &self.config
    }

    /// Summed flat size of every input
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Register another upstream network and rebuild; unchanged on failure.
    pub fn add_input_network(&mut self, net: &Rc<dyn Network>) -> Result<()> {
        self.add_input_network_with(net, &LogDiagnostics)
    }

    /// [`DenseNet::add_input_network`] reporting the rebuild to `diagnostics`
    pub fn add_input_network_with(
        &mut self,
        net: &Rc<dyn Network>,
        diagnostics: &dyn Diagnostics,
    ) -> Result<()> {
        let mut registry = self.core.input_networks.clone();
        registry.insert(net)?;
        let in_dim = InDim::from_upstream(registry.out_dims()?);
        let a = assemble(
            &self.core.name,
            &self.config,
            &in_dim,
            self.core.num_classes,
            self.core.activation,
            self.core.pred_activation,
            diagnostics,
        )?;
        self.commit(registry, in_dim, a);
        Ok(())
    }

    fn commit(&mut self, registry: InputRegistry, in_dim: InDim, a: Assembled) {
        self.core.input_networks = registry;
        self.core.in_dim = in_dim;
        self.core.out_dim = a.out_dim;
        self.core.head = a.head;
        self.network = a.network;
        self.in_features = a.in_features;
    }
}

impl Network for DenseNet {
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
        let flat = inputs
            .iter()
            .map(|x| x.flatten_batch())
            .collect::<Result<Vec<_>>>()?;
        let x = match flat.as_slice() {
            [single] => single.clone(),
            _ => cat(&flat, 1)?,
        };
        let out = self.network.forward(&x)?;
        self.core.apply_head(out)
    }
}

/// Builder for [`DenseNet`]
pub struct DenseNetBuilder<'a> {
    name: String,
    in_dim: Option<InDim>,
    raw_config: Option<Value>,
    config: Option<DenseNetConfig>,
    inputs: Vec<Rc<dyn Network>>,
    num_classes: Option<usize>,
    activation: Activation,
    pred_activation: Option<Activation>,
    training: TrainingOptions,
    diagnostics: Option<&'a dyn Diagnostics>,
}

impl<'a> DenseNetBuilder<'a> {
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

    #[must_use]
    pub fn in_dim(mut self, in_dim: impl Into<InDim>) -> Self {
        self.in_dim = Some(in_dim.into());
        self
    }

    #[must_use]
    pub fn config(mut self, raw: Value) -> Self {
        self.raw_config = Some(raw);
        self
    }

    #[must_use]
    pub fn units(mut self, config: DenseNetConfig) -> Self {
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

    #[must_use]
    pub fn diagnostics(mut self, sink: &'a dyn Diagnostics) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn build(self) -> Result<DenseNet> {
        let config = match (self.config, &self.raw_config) {
            (Some(config), _) => config,
            (None, Some(raw)) => DenseNetConfig::from_value(raw)?,
            (None, None) => return Err(ConfigError::MissingKey("dense_units").into()),
        };
        check_num_classes(self.num_classes)?;
        let (registry, in_dim) = resolve_inputs(&self.name, &self.inputs, self.in_dim)?;

        let a = assemble(
            &self.name,
            &config,
            &in_dim,
            self.num_classes,
            self.activation,
            self.pred_activation,
            self.diagnostics.unwrap_or(&LogDiagnostics),
        )?;

        Ok(DenseNet {
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
            network: a.network,
            in_features: a.in_features,
        })
    }
}
