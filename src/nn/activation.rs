use crate::nn::{Module, ReLU, Sigmoid, Softmax, Tanh};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Non-linearity applied by a unit, shared across a network's units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    ReLU,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    /// Layer implementing this activation
    pub fn layer(self) -> Box<dyn Module> {
        match self {
            Activation::ReLU => Box::new(ReLU),
            Activation::Sigmoid => Box::new(Sigmoid),
            Activation::Tanh => Box::new(Tanh),
            Activation::Softmax => Box::new(Softmax),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::ReLU => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Softmax => "softmax",
        };
        f.write_str(name)
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::ReLU),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "softmax" => Ok(Activation::Softmax),
            other => Err(format!("unknown activation {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for a in [
            Activation::ReLU,
            Activation::Sigmoid,
            Activation::Tanh,
            Activation::Softmax,
        ] {
            assert_eq!(a.to_string().parse::<Activation>(), Ok(a));
        }
        assert!("gelu".parse::<Activation>().is_err());
        assert_eq!("ReLU".parse::<Activation>(), Ok(Activation::ReLU));
    }
}
