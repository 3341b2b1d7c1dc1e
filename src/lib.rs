//! A trainable 2D convolution + max-pooling layer.
//!
//! [`ConvPoolLayer`] runs forward inference over single samples and
//! backpropagates minibatch gradients with a plain in-place SGD update.
//! Network assembly, the training loop and data loading are left to the
//! caller.

pub mod activations;
mod common;
pub mod config;
mod init;
mod kernels;
mod layers;

pub use crate::activations::{Activation, ActivationKind, Relu, Sigmoid, Tanh};
pub use crate::common::types::{CError, CResult, LayerError};
pub use crate::config::LayerConfig;
pub use crate::kernels::pool::TieBreak;
pub use crate::layers::{ConvPoolLayer, ForwardPass};
