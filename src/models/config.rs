//! Validation of raw network configuration.
//!
//! Raw configuration arrives as a JSON mapping. Validation checks that the
//! required keys are present, normalizes kernel-like fields into per-axis
//! sequences and infers each unit's dimensionality from its kernel.
//! Values are parsed, not range-checked: a zero stride or an out-of-range
//! dropout is reported later by the layer that cannot use it.

use crate::error::ConfigError;
use crate::nn::Activation;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

const CONV_REQUIRED: [&str; 3] = ["in_channels", "out_channels", "kernel_size"];

/// One convolutional stage
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: Vec<usize>,
    pub stride: Vec<usize>,
    pub padding: Vec<usize>,
    pub pool_size: Option<Vec<usize>>,
    pub dropout: Option<f32>,
    pub activation: Option<Activation>,
}

impl UnitSpec {
    /// Spatial dimensionality, always `kernel_size.len()`
    pub fn conv_dim(&self) -> usize {
        self.kernel_size.len()
    }

    fn from_raw(unit: usize, raw: &Value) -> Result<Self, ConfigError> {
        let obj = raw.as_object().ok_or_else(|| ConfigError::InvalidField {
            unit,
            field: "conv_units",
            reason: format!("expected a mapping, got {raw}"),
        })?;
        if let Some(&field) = CONV_REQUIRED.iter().find(|f| !obj.contains_key(**f)) {
            return Err(ConfigError::MissingField { unit, field });
        }

        let kernel_size = kernel_field(unit, obj)?;
        let rank = kernel_size.len();
        Ok(UnitSpec {
            in_channels: required_usize(unit, obj, "in_channels")?,
            out_channels: required_usize(unit, obj, "out_channels")?,
            stride: extent_field(unit, obj, "stride", rank)?.unwrap_or_else(|| vec![1; rank]),
            padding: extent_field(unit, obj, "padding", rank)?.unwrap_or_else(|| vec![0; rank]),
            pool_size: extent_field(unit, obj, "pool_size", rank)?,
            dropout: optional_f32(unit, obj, "dropout")?,
            activation: optional_activation(unit, obj)?,
            kernel_size,
        })
    }
}

/// Validated configuration of a convolutional network
#[derive(Clone, Debug, PartialEq)]
pub struct ConvNetConfig {
    pub units: Vec<UnitSpec>,
}

impl ConvNetConfig {
    pub fn from_value(raw: &Value) -> Result<Self, ConfigError> {
        let units = raw
            .get("conv_units")
            .ok_or(ConfigError::MissingKey("conv_units"))?;
        let units = units.as_array().ok_or_else(|| ConfigError::InvalidField {
            unit: 0,
            field: "conv_units",
            reason: "expected a list of units".to_string(),
        })?;
        if units.is_empty() {
            return Err(ConfigError::EmptyUnits("conv_units"));
        }
        let units = units
            .iter()
            .enumerate()
            .map(|(i, u)| UnitSpec::from_raw(i, u))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { units })
    }
}

impl<'de> Deserialize<'de> for ConvNetConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(&raw).map_err(serde::de::Error::custom)
    }
}

/// Validated configuration of a dense network
#[derive(Clone, Debug, PartialEq)]
pub struct DenseNetConfig {
    pub dense_units: Vec<usize>,
    /// One entry per unit
    pub dropout: Vec<Option<f32>>,
}

impl DenseNetConfig {
    /// `dropout` may be a single value for every unit or one value per unit.
    /// `initializer`, `bias_init` and `norm` are accepted and ignored.
    pub fn from_value(raw: &Value) -> Result<Self, ConfigError> {
        let units = raw
            .get("dense_units")
            .ok_or(ConfigError::MissingKey("dense_units"))?
            .as_array()
            .ok_or_else(|| ConfigError::InvalidField {
                unit: 0,
                field: "dense_units",
                reason: "expected a list of unit sizes".to_string(),
            })?;
        if units.is_empty() {
            return Err(ConfigError::EmptyUnits("dense_units"));
        }
        let dense_units = units
            .iter()
            .enumerate()
            .map(|(i, v)| positive_usize(i, "dense_units", v))
            .collect::<Result<Vec<_>, _>>()?;

        let dropout = match raw.get("dropout") {
            None | Some(Value::Null) => vec![None; dense_units.len()],
            Some(Value::Array(ps)) => {
                if ps.len() != dense_units.len() {
                    return Err(ConfigError::InvalidField {
                        unit: 0,
                        field: "dropout",
                        reason: format!(
                            "{} values for {} dense units",
                            ps.len(),
                            dense_units.len()
                        ),
                    });
                }
                ps.iter()
                    .enumerate()
                    .map(|(i, p)| as_f32(i, "dropout", p))
                    .collect::<Result<Vec<_>, _>>()?
            }
            Some(p) => vec![as_f32(0, "dropout", p)?; dense_units.len()],
        };

        Ok(Self {
            dense_units,
            dropout,
        })
    }
}

impl<'de> Deserialize<'de> for DenseNetConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(&raw).map_err(serde::de::Error::custom)
    }
}

/// Optimizer descriptor; stored for the training loop, not interpreted here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimSpec {
    pub name: String,
    pub lr: f64,
}

impl Default for OptimSpec {
    fn default() -> Self {
        Self {
            name: "Adam".to_string(),
            lr: 0.001,
        }
    }
}

/// Training-related options carried by every network
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    pub optim_spec: OptimSpec,
    pub lr_scheduler: Option<Value>,
    pub early_stopping: Option<Value>,
    pub criter_spec: String,
    pub save_path: Option<PathBuf>,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            optim_spec: OptimSpec::default(),
            lr_scheduler: None,
            early_stopping: None,
            criter_spec: "CrossEntropyLoss".to_string(),
            save_path: None,
        }
    }
}

// ===== FIELD PARSERS =====

fn invalid(unit: usize, field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        unit,
        field,
        reason: reason.into(),
    }
}

fn as_usize(unit: usize, field: &'static str, v: &Value) -> Result<usize, ConfigError> {
    v.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(unit, field, format!("expected a non-negative integer, got {v}")))
}

fn positive_usize(unit: usize, field: &'static str, v: &Value) -> Result<usize, ConfigError> {
    match as_usize(unit, field, v)? {
        0 => Err(invalid(unit, field, "must be positive")),
        n => Ok(n),
    }
}

fn as_f32(unit: usize, field: &'static str, v: &Value) -> Result<Option<f32>, ConfigError> {
    match v {
        Value::Null => Ok(None),
        _ => v
            .as_f64()
            .map(|p| Some(p as f32))
            .ok_or_else(|| invalid(unit, field, format!("expected a number, got {v}"))),
    }
}

fn required_usize(
    unit: usize,
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<usize, ConfigError> {
    let v = obj.get(field).ok_or(ConfigError::MissingField { unit, field })?;
    as_usize(unit, field, v)
}

fn optional_f32(
    unit: usize,
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f32>, ConfigError> {
    obj.get(field)
        .map_or(Ok(None), |v| as_f32(unit, field, v))
}

/// Scalar kernel `5` becomes `[5]`; a list is kept as is.
fn kernel_field(unit: usize, obj: &Map<String, Value>) -> Result<Vec<usize>, ConfigError> {
    let field = "kernel_size";
    let kernel = match obj.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| positive_usize(unit, field, v))
            .collect::<Result<Vec<_>, _>>()?,
        Some(v) => vec![positive_usize(unit, field, v)?],
        None => return Err(ConfigError::MissingField { unit, field }),
    };
    if !(1..=3).contains(&kernel.len()) {
        return Err(invalid(
            unit,
            field,
            format!("expected 1 to 3 axes, got {}", kernel.len()),
        ));
    }
    Ok(kernel)
}

/// Scalars broadcast to every axis; lists must have one entry per axis.
fn extent_field(
    unit: usize,
    obj: &Map<String, Value>,
    field: &'static str,
    rank: usize,
) -> Result<Option<Vec<usize>>, ConfigError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            if items.len() != rank {
                return Err(invalid(
                    unit,
                    field,
                    format!("{} entries for a {rank}D kernel", items.len()),
                ));
            }
            items
                .iter()
                .map(|v| as_usize(unit, field, v))
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        }
        Some(v) => Ok(Some(vec![as_usize(unit, field, v)?; rank])),
    }
}

fn optional_activation(
    unit: usize,
    obj: &Map<String, Value>,
) -> Result<Option<Activation>, ConfigError> {
    match obj.get("activation") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => name
            .parse()
            .map(Some)
            .map_err(|reason: String| invalid(unit, "activation", reason)),
        Some(v) => Err(invalid(unit, "activation", format!("expected a name, got {v}"))),
    }
}
