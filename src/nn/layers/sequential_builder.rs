use super::sequential::LayerEntry;
use crate::nn::{Module, Sequential};
use std::cell::{Cell, RefCell};

/// Builder for constructing Sequential models with named or unnamed layers
///
/// # Examples
///
/// ```
/// use composenet::nn::{Linear, ReLU, Sequential};
///
/// let model = Sequential::builder()
///     .add_named("encoder", Box::new(Linear::new(784, 128, true)))
///     .add_unnamed(Box::new(ReLU))
///     .add_named("decoder", Box::new(Linear::new(128, 10, true)))
///     .build();
/// assert_eq!(model.len(), 3);
/// ```
pub struct SequentialBuilder {
    entries: Vec<LayerEntry>,
}

impl SequentialBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add an unnamed layer to the sequence
    ///
    /// The layer will be keyed by its numeric index in the state dict
    #[must_use]
    pub fn add_unnamed(mut self, layer: Box<dyn Module>) -> Self {
        self.entries.push(LayerEntry { name: None, layer });
        self
    }

    /// Add a named layer to the sequence
    ///
    /// Empty strings are treated as unnamed.
    #[must_use]
    pub fn add_named(mut self, name: impl Into<String>, layer: Box<dyn Module>) -> Self {
        let name_str = name.into();
        let name_opt = if name_str.is_empty() {
            None
        } else {
            Some(name_str)
        };

        self.entries.push(LayerEntry {
            name: name_opt,
            layer,
        });
        self
    }

    #[must_use]
    pub fn build(self) -> Sequential {
        Sequential {
            layers: self.entries,
            hooks: RefCell::new(Vec::new()),
            next_hook: Cell::new(0),
        }
    }
}

impl Default for SequentialBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Linear, ReLU};

    #[test]
    fn test_builder_empty() {
        let model = SequentialBuilder::new().build();
        assert_eq!(model.len(), 0);
        assert!(model.is_empty());
    }

    #[test]
    fn test_builder_mixed() {
        let model = SequentialBuilder::new()
            .add_named("fc1", Box::new(Linear::new(2, 3, true)))
            .add_unnamed(Box::new(ReLU))
            .add_named("fc2", Box::new(Linear::new(3, 1, true)))
            .build();

        assert_eq!(model.len(), 3);
        assert_eq!(model.layer_names(), vec![Some("fc1"), None, Some("fc2")]);
        assert!(model.get("fc2").is_some());
        assert!(model.get("fc3").is_none());
    }

    #[test]
    fn test_builder_empty_string_name() {
        let model = SequentialBuilder::new()
            .add_named("", Box::new(Linear::new(2, 3, true)))
            .build();

        assert_eq!(model.layer_names(), vec![None]); // Empty string treated as unnamed
    }
}
