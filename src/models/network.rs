use crate::error::{ConfigError, NetError, Result};
use crate::io::{self, StateDict, StateDictDiff};
use crate::models::config::TrainingOptions;
use crate::models::shape::{InDim, ShapeDescriptor, ShapeKind};
use crate::models::units::DenseUnit;
use crate::nn::{Activation, Module, Sequential};
use crate::tensor::{RawTensor, Tensor, TensorOps, no_grad};
use std::path::Path;
use std::rc::{Rc, Weak};

/// Input to [`Network::forward`].
///
/// A leaf network takes its tensor directly. A network with upstream
/// networks takes one entry per upstream, in registration order, each of
/// which is forwarded through that upstream.
#[derive(Clone, Debug)]
pub enum NetInput {
    Tensor(Tensor),
    Nested(Vec<NetInput>),
}

impl NetInput {
    fn items(&self) -> &[NetInput] {
        match self {
            NetInput::Nested(items) => items,
            single => std::slice::from_ref(single),
        }
    }
}

impl From<Tensor> for NetInput {
    fn from(t: Tensor) -> Self {
        NetInput::Tensor(t)
    }
}

impl From<Vec<NetInput>> for NetInput {
    fn from(items: Vec<NetInput>) -> Self {
        NetInput::Nested(items)
    }
}

/// Named upstream networks, in registration order.
///
/// Entries do not keep their networks alive: the caller owns each upstream
/// through an `Rc`, and forwarding after it was dropped fails with
/// [`NetError::DanglingInput`].
#[derive(Clone, Debug, Default)]
pub struct InputRegistry {
    entries: Vec<(String, Weak<dyn Network>)>,
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, net: &Rc<dyn Network>) -> std::result::Result<(), ConfigError> {
        let name = net.name().to_string();
        if self.contains(&name) {
            return Err(ConfigError::DuplicateInput(name));
        }
        self.entries.push((name, Rc::downgrade(net)));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// `None` if absent or already dropped
    pub fn get(&self, name: &str) -> Option<Rc<dyn Network>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, w)| w.upgrade())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every upstream, failing on the first one that was dropped
    pub fn upgraded(&self) -> Result<Vec<Rc<dyn Network>>> {
        self.entries
            .iter()
            .map(|(name, w)| w.upgrade().ok_or_else(|| NetError::DanglingInput(name.clone())))
            .collect()
    }

    /// Upstreams that are still alive
    pub fn live(&self) -> Vec<Rc<dyn Network>> {
        self.entries.iter().filter_map(|(_, w)| w.upgrade()).collect()
    }

    pub fn out_dims(&self) -> Result<Vec<ShapeDescriptor>> {
        Ok(self
            .upgraded()?
            .iter()
            .map(|n| n.out_dim().clone())
            .collect())
    }
}

/// Register `inputs` and work out the input dimension.
///
/// With upstream networks the input dimension is taken from their outputs
/// and `in_dim` is ignored.
pub(crate) fn resolve_inputs(
    name: &str,
    inputs: &[Rc<dyn Network>],
    in_dim: Option<InDim>,
) -> Result<(InputRegistry, InDim)> {
    let mut registry = InputRegistry::new();
    for net in inputs {
        registry.insert(net)?;
    }
    if !registry.is_empty() {
        let dims = registry.out_dims()?;
        return Ok((registry, InDim::from_upstream(dims)));
    }
    match in_dim {
        Some(d) if !d.is_empty() => Ok((registry, d)),
        _ => Err(ConfigError::MissingInDim(name.to_string()).into()),
    }
}

pub(crate) fn check_num_classes(num_classes: Option<usize>) -> Result<()> {
    if num_classes == Some(0) {
        return Err(NetError::InvalidParameter(
            "num_classes must be positive".to_string(),
        ));
    }
    Ok(())
}

/// State shared by every network kind.
pub struct NetworkCore {
    pub(crate) name: String,
    pub(crate) in_dim: InDim,
    pub(crate) out_dim: ShapeDescriptor,
    pub(crate) input_networks: InputRegistry,
    pub(crate) num_classes: Option<usize>,
    pub(crate) activation: Activation,
    pub(crate) pred_activation: Option<Activation>,
    pub(crate) head: Option<DenseUnit>,
    pub(crate) training: TrainingOptions,
}

impl NetworkCore {
    pub fn head(&self) -> Option<&DenseUnit> {
        self.head.as_ref()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn pred_activation(&self) -> Option<Activation> {
        self.pred_activation
    }

    pub fn training(&self) -> &TrainingOptions {
        &self.training
    }

    /// Flatten `out` and run it through the classification head, if any
    pub(crate) fn apply_head(&self, out: Tensor) -> Result<Tensor> {
        match &self.head {
            Some(head) => head.forward(&out.flatten_batch()?),
            None => Ok(out),
        }
    }
}

/// A network that can be composed with other networks.
///
/// Implementors provide the pipeline and the forward computation over
/// already-collected input tensors; everything else is shared.
pub trait Network {
    fn core(&self) -> &NetworkCore;
    fn core_mut(&mut self) -> &mut NetworkCore;

    /// The hidden-layer pipeline, without the classification head
    fn network(&self) -> &Sequential;
    fn network_mut(&mut self) -> &mut Sequential;

    /// Forward batched tensors, one per entry of `in_dim`
    fn forward_inputs(&self, inputs: &[Tensor]) -> Result<Tensor>;

    fn name(&self) -> &str {
        &self.core().name
    }

    fn in_dim(&self) -> &InDim {
        &self.core().in_dim
    }

    fn out_dim(&self) -> &ShapeDescriptor {
        &self.core().out_dim
    }

    fn shape_kind(&self) -> ShapeKind {
        self.out_dim().kind()
    }

    fn input_networks(&self) -> &InputRegistry {
        &self.core().input_networks
    }

    fn num_classes(&self) -> Option<usize> {
        self.core().num_classes
    }

    /// Forward through every upstream network, then through this one.
    fn forward(&self, input: &NetInput) -> Result<Tensor> {
        let upstream = self.input_networks().upgraded()?;
        let items = input.items();

        let tensors = if upstream.is_empty() {
            items
                .iter()
                .map(|item| match item {
                    NetInput::Tensor(t) => Ok(t.clone()),
                    NetInput::Nested(_) => Err(NetError::InvalidParameter(format!(
                        "network {} has no input networks and takes tensors only",
                        self.name()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?
        } else if upstream.len() == 1 && items.len() != 1 {
            // the whole input belongs to the single upstream
            vec![upstream[0].forward(input)?]
        } else {
            if items.len() != upstream.len() {
                return Err(NetError::InputArity {
                    network: self.name().to_string(),
                    expected: upstream.len(),
                    actual: items.len(),
                });
            }
            upstream
                .iter()
                .zip(items)
                .map(|(net, item)| net.forward(item))
                .collect::<Result<Vec<_>>>()?
        };

        if tensors.len() != self.in_dim().len() {
            return Err(NetError::InputArity {
                network: self.name().to_string(),
                expected: self.in_dim().len(),
                actual: tensors.len(),
            });
        }
        self.forward_inputs(&tensors)
    }

    /// Inference: switch this network and its inputs to evaluation mode and
    /// forward without gradient tracking.
    ///
    /// With `convert_to_class` the result is a `[B]` tensor of class indices.
    /// The networks are left in evaluation mode.
    fn forward_pass(&self, input: &NetInput, convert_to_class: bool) -> Result<Tensor> {
        self.set_training(false, true);
        let out = no_grad(|| self.forward(input))?;
        if !convert_to_class {
            return Ok(out);
        }
        let labels = extract_class_labels(&out);
        let n = labels.len();
        Ok(RawTensor::new(
            labels.into_iter().map(|l| l as f32).collect(),
            &[n],
            false,
        ))
    }

    /// Pipeline parameters followed by the head's
    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.network().parameters();
        if let Some(head) = &self.core().head {
            params.extend(head.parameters());
        }
        params
    }

    /// Exclude this network's parameters from training, and those of every
    /// live upstream network when `apply_inputs` is set.
    fn freeze(&self, apply_inputs: bool) {
        for p in self.parameters() {
            p.borrow_mut().requires_grad = false;
        }
        if apply_inputs {
            for net in self.input_networks().live() {
                net.freeze(true);
            }
        }
    }

    fn unfreeze(&self, apply_inputs: bool) {
        for p in self.parameters() {
            p.borrow_mut().requires_grad = true;
        }
        if apply_inputs {
            for net in self.input_networks().live() {
                net.unfreeze(true);
            }
        }
    }

    fn set_training(&self, mode: bool, apply_inputs: bool) {
        self.network().train(mode);
        if let Some(head) = &self.core().head {
            head.train(mode);
        }
        if apply_inputs {
            for net in self.input_networks().live() {
                net.set_training(mode, true);
            }
        }
    }

    fn is_training(&self) -> bool {
        self.network().is_training()
    }

    /// `network.*` keys for the pipeline, `head.*` for the head
    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (key, value) in self.network().state_dict() {
            state.insert(format!("network.{key}"), value);
        }
        if let Some(head) = &self.core().head {
            for (key, value) in head.state_dict() {
                state.insert(format!("head.{key}"), value);
            }
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        let sub = |prefix: &str| -> StateDict {
            state
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(prefix).map(|s| (s.to_string(), v.clone())))
                .collect()
        };
        self.network_mut().load_state_dict(&sub("network."));
        if let Some(head) = self.core_mut().head.as_mut() {
            head.load_state_dict(&sub("head."));
        }
    }

    /// Write this network's state dict to `path`
    fn save(&self, path: &Path) -> Result<()> {
        io::save_state_dict(&self.state_dict(), path)?;
        log::info!("saved {} to {}", self.name(), path.display());
        Ok(())
    }

    /// Load weights saved by [`Network::save`], returning what did not match
    fn load_weights(&mut self, path: &Path) -> Result<StateDictDiff> {
        let state = io::load_state_dict(path)?;
        let diff = io::diff_state_dict(&self.state_dict(), &state);
        if !diff.is_empty() {
            log::warn!("loading {} from {}: {diff:?}", self.name(), path.display());
        }
        self.load_state_dict(&state);
        Ok(diff)
    }
}

/// Row-wise argmax of a `[B, C]` prediction
pub fn extract_class_labels(pred: &Tensor) -> Vec<usize> {
    pred.argmax_last()
}
