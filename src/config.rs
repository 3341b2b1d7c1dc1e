use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::activations::ActivationKind;
use crate::common::types::{CResult, LayerError};
use crate::kernels::pool::TieBreak;

fn default_seed() -> u64 {
    1234
}

fn default_activation() -> String {
    String::from("relu")
}

fn default_tie_break() -> String {
    String::from("first_max")
}

/// Construction-time configuration of a convolution + pooling layer.
///
/// The convolved and pooled sizes are derived from these fields and checked
/// by [`validate`](LayerConfig::validate); they are never taken on trust
/// from the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Input image height and width.
    pub image_size: (usize, usize),
    /// Number of input channels.
    pub channels: usize,
    /// Number of kernels (output feature maps).
    pub kernel_count: usize,
    /// Kernel height and width.
    pub kernel_size: (usize, usize),
    /// Pooling window height and width; the pooling stride equals the
    /// window, so windows never overlap.
    pub pool_size: (usize, usize),
    /// Seed for the weight-initialization random source.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Name of the built-in activation: `relu`, `sigmoid` or `tanh`.
    #[serde(default = "default_activation")]
    pub activation: String,
    /// Pooling-gradient tie routing: `first_max` or `all_max`.
    #[serde(default = "default_tie_break")]
    pub tie_break: String,
}

impl LayerConfig {
    /// Feature-map size after convolution. Only meaningful for a validated
    /// configuration.
    pub fn convolved_size(&self) -> (usize, usize) {
        let (h, w) = self.image_size;
        let (kh, kw) = self.kernel_size;
        (h - kh + 1, w - kw + 1)
    }

    /// Feature-map size after pooling. Only meaningful for a validated
    /// configuration.
    pub fn pooled_size(&self) -> (usize, usize) {
        let (hc, wc) = self.convolved_size();
        let (ph, pw) = self.pool_size;
        (hc / ph, wc / pw)
    }

    pub fn validate(&self) -> CResult<()> {
        let (h, w) = self.image_size;
        let (kh, kw) = self.kernel_size;
        let (ph, pw) = self.pool_size;
        if self.channels == 0
            || self.kernel_count == 0
            || h == 0
            || w == 0
            || kh == 0
            || kw == 0
            || ph == 0
            || pw == 0
        {
            return Err(invalid("all dimensions must be positive"));
        }
        if kh > h || kw > w {
            return Err(invalid(&format!(
                "kernel size ({}, {}) exceeds image size ({}, {})",
                kh, kw, h, w
            )));
        }
        let (hc, wc) = self.convolved_size();
        if hc % ph != 0 || wc % pw != 0 {
            return Err(invalid(&format!(
                "pool size ({}, {}) does not evenly divide convolved size ({}, {})",
                ph, pw, hc, wc
            )));
        }
        ActivationKind::try_from(self.activation.as_str())?;
        TieBreak::try_from(self.tie_break.as_str())?;
        Ok(())
    }
}

fn invalid(msg: &str) -> crate::common::types::CError {
    LayerError::InvalidConfig(String::from(msg)).into()
}
