use std::convert::TryFrom;

use failure::format_err;

use crate::common::types::{CError, CResult};

/// Scalar activation strategy applied to every convolution output.
///
/// `derivative` is evaluated at the *activated* output, not the
/// pre-activation value; the built-in implementations and the backward pass
/// both follow this convention.
pub trait Activation: Send + Sync {
    fn activate(&self, x: f64) -> f64;
    fn derivative(&self, y: f64) -> f64;
}

pub struct Relu;

impl Activation for Relu {
    fn activate(&self, x: f64) -> f64 {
        if x > 0.0 {
            x
        } else {
            0.0
        }
    }

    fn derivative(&self, y: f64) -> f64 {
        if y > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

pub struct Sigmoid;

impl Activation for Sigmoid {
    fn activate(&self, x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    fn derivative(&self, y: f64) -> f64 {
        y * (1.0 - y)
    }
}

pub struct Tanh;

impl Activation for Tanh {
    fn activate(&self, x: f64) -> f64 {
        x.tanh()
    }

    fn derivative(&self, y: f64) -> f64 {
        1.0 - y * y
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationKind {
    Relu,
    Sigmoid,
    Tanh,
}

impl ActivationKind {
    const RELU_STR: &'static str = "relu";
    const SIGMOID_STR: &'static str = "sigmoid";
    const TANH_STR: &'static str = "tanh";

    pub fn build(&self) -> Box<dyn Activation> {
        match self {
            ActivationKind::Relu => Box::new(Relu),
            ActivationKind::Sigmoid => Box::new(Sigmoid),
            ActivationKind::Tanh => Box::new(Tanh),
        }
    }
}

impl TryFrom<&str> for ActivationKind {
    type Error = CError;

    fn try_from(value: &str) -> CResult<ActivationKind> {
        match value {
            Self::RELU_STR => Ok(ActivationKind::Relu),
            Self::SIGMOID_STR => Ok(ActivationKind::Sigmoid),
            Self::TANH_STR => Ok(ActivationKind::Tanh),
            s => Err(format_err!("Unknown activation value: `{}`", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        assert_eq!(Relu.activate(2.5), 2.5);
        assert_eq!(Relu.activate(-1.0), 0.0);
        assert_eq!(Relu.derivative(2.5), 1.0);
        assert_eq!(Relu.derivative(0.0), 0.0);
    }

    #[test]
    fn test_sigmoid_derivative_takes_activated_output() {
        let x = 0.7;
        let y = Sigmoid.activate(x);
        assert!((y - 1.0 / (1.0 + (-0.7f64).exp())).abs() < 1e-12);
        assert!((Sigmoid.derivative(y) - y * (1.0 - y)).abs() < 1e-12);
    }

    #[test]
    fn test_tanh_derivative_takes_activated_output() {
        let y = Tanh.activate(-0.3);
        assert!((Tanh.derivative(y) - (1.0 - y * y)).abs() < 1e-12);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(ActivationKind::try_from("relu").unwrap(), ActivationKind::Relu);
        assert_eq!(ActivationKind::try_from("tanh").unwrap(), ActivationKind::Tanh);
        let err = ActivationKind::try_from("softplus").unwrap_err();
        assert_eq!(err.to_string(), "Unknown activation value: `softplus`");
    }

    #[test]
    fn test_kind_builds_matching_strategy() {
        let act = ActivationKind::Sigmoid.build();
        assert!((act.activate(0.0) - 0.5).abs() < 1e-12);
    }
}
