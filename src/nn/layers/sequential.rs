use crate::error::Result;
use crate::io::StateDict;
use crate::nn::{Module, SequentialBuilder};
use crate::tensor::Tensor;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub(crate) struct LayerEntry {
    pub(crate) name: Option<String>,
    pub(crate) layer: Box<dyn Module>,
}

impl LayerEntry {
    fn key(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| index.to_string())
    }
}

type Hook = Rc<dyn Fn(&str, &Tensor)>;

/// Identifies a registered hook so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle(usize);

/// Ordered pipeline of layers, applied one after another.
///
/// Hooks registered with [`Sequential::register_hook`] see every stage output
/// together with the stage key; they cannot change what flows downstream.
pub struct Sequential {
    pub(crate) layers: Vec<LayerEntry>,
    pub(crate) hooks: RefCell<Vec<(HookHandle, Hook)>>,
    pub(crate) next_hook: Cell<usize>,
}

impl Module for Sequential {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut current = x.clone();
        for (i, entry) in self.layers.iter().enumerate() {
            current = entry.layer.forward(&current)?;
            // snapshot so hooks may register or remove hooks
            let hooks: Vec<Hook> = self.hooks.borrow().iter().map(|(_, h)| Rc::clone(h)).collect();
            if !hooks.is_empty() {
                let key = entry.key(i);
                for hook in &hooks {
                    hook(&key, &current);
                }
            }
        }
        Ok(current)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.layers.iter().flat_map(|l| l.layer.parameters()).collect()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, entry) in self.layers.iter().enumerate() {
            let prefix = entry.key(i);
            for (key, value) in entry.layer.state_dict() {
                state.insert(format!("{prefix}.{key}"), value);
            }
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        for (i, entry) in self.layers.iter_mut().enumerate() {
            let prefix = format!("{}.", entry.key(i));
            // Filter keys for this layer
            let mut sub_state = StateDict::new();
            for (key, value) in state {
                if let Some(sub_key) = key.strip_prefix(&prefix)
                    && !sub_key.is_empty()
                {
                    sub_state.insert(sub_key.to_string(), value.clone());
                }
            }
            if !sub_state.is_empty() {
                entry.layer.load_state_dict(&sub_state);
            }
        }
    }

    fn train(&self, mode: bool) {
        for entry in &self.layers {
            entry.layer.train(mode);
        }
    }

    fn is_training(&self) -> bool {
        self.layers.iter().all(|e| e.layer.is_training())
    }
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn Module>>) -> Self {
        let mut builder = SequentialBuilder::new();
        for layer in layers {
            builder = builder.add_unnamed(layer);
        }
        builder.build()
    }

    pub fn builder() -> SequentialBuilder {
        SequentialBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Names in insertion order, `None` for unnamed layers
    pub fn layer_names(&self) -> Vec<Option<&str>> {
        self.layers.iter().map(|e| e.name.as_deref()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.layers
            .iter()
            .find(|e| e.name.as_deref() == Some(name))
            .map(|e| e.layer.as_ref())
    }

    /// Observe each stage output during forward
    pub fn register_hook(&self, hook: impl Fn(&str, &Tensor) + 'static) -> HookHandle {
        let handle = HookHandle(self.next_hook.get());
        self.next_hook.set(handle.0 + 1);
        self.hooks.borrow_mut().push((handle, Rc::new(hook)));
        handle
    }

    /// Returns false if the handle was already removed
    pub fn remove_hook(&self, handle: HookHandle) -> bool {
        let mut hooks = self.hooks.borrow_mut();
        let before = hooks.len();
        hooks.retain(|(h, _)| *h != handle);
        hooks.len() != before
    }
}
