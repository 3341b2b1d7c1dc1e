use std::convert::TryFrom;

use ndarray::{stack, Array1, Array3, Array4, ArrayView3, ArrayView4, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::activations::{Activation, ActivationKind};
use crate::common::types::{ensure_shape, CResult, LayerError};
use crate::config::LayerConfig;
use crate::init;
use crate::kernels::pool::TieBreak;
use crate::kernels::{conv, pool};

/// Everything the forward pass produced for one sample. The caller keeps
/// these values and hands them back to [`ConvPoolLayer::backward`], which
/// re-validates their shapes against the layer configuration before any
/// computation.
#[derive(Debug)]
pub struct ForwardPass {
    /// Convolution output before the activation, `[K][Hc][Wc]`.
    pub pre_activation: Array3<f64>,
    /// Activated feature maps, `[K][Hc][Wc]`.
    pub activation: Array3<f64>,
    /// Max-pooled output, `[K][Hp][Wp]`.
    pub pooled: Array3<f64>,
    /// Flat in-window offset of each pooled maximum, used for
    /// single-position gradient routing.
    pub(crate) max_switches: Array3<usize>,
}

impl ForwardPass {
    /// The layer output consumed by the next layer.
    pub fn output(&self) -> &Array3<f64> {
        &self.pooled
    }
}

/// A trainable layer chaining 2D cross-correlation, a scalar activation and
/// non-overlapping max-pooling.
///
/// The weight tensor (`[K][C][kh][kw]`) and bias vector (`[K]`) are the only
/// persistent state; both mutate exclusively inside [`backward`]'s SGD step,
/// which takes `&mut self` so concurrent updates of one instance cannot
/// compile. Forward passes only read the state and may run from several
/// threads against their own layer instances.
///
/// [`backward`]: ConvPoolLayer::backward
pub struct ConvPoolLayer {
    config: LayerConfig,
    tie_break: TieBreak,
    activation: Box<dyn Activation>,
    weights: Array4<f64>,
    bias: Array1<f64>,
}

impl ConvPoolLayer {
    /// Builds a layer from an explicit activation strategy and random
    /// source. Weights are drawn from the fan-scaled uniform distribution,
    /// the bias starts at zero.
    pub fn new<R: Rng + ?Sized>(
        config: LayerConfig,
        activation: Box<dyn Activation>,
        rng: &mut R,
    ) -> CResult<ConvPoolLayer> {
        config.validate()?;
        let tie_break = TieBreak::try_from(config.tie_break.as_str())?;
        let (weights, bias) = init::init_params(&config, rng);
        Ok(ConvPoolLayer {
            config,
            tie_break,
            activation,
            weights,
            bias,
        })
    }

    /// Builds the seeded random source and the named built-in activation
    /// from the configuration itself.
    pub fn from_config(config: LayerConfig) -> CResult<ConvPoolLayer> {
        let kind = ActivationKind::try_from(config.activation.as_str())?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        ConvPoolLayer::new(config, kind.build(), &mut rng)
    }

    pub fn from_json(json: &str) -> CResult<ConvPoolLayer> {
        let config: LayerConfig = serde_json::from_str(json)?;
        ConvPoolLayer::from_config(config)
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn weights(&self) -> &Array4<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    /// Replaces the weight tensor, e.g. when restoring persisted state.
    pub fn set_weights(&mut self, weights: Array4<f64>) -> CResult<()> {
        let (kh, kw) = self.config.kernel_size;
        ensure_shape(
            "weights",
            &[self.config.kernel_count, self.config.channels, kh, kw],
            weights.shape(),
        )?;
        self.weights = weights;
        Ok(())
    }

    /// Replaces the bias vector, e.g. when restoring persisted state.
    pub fn set_bias(&mut self, bias: Array1<f64>) -> CResult<()> {
        ensure_shape("bias", &[self.config.kernel_count], bias.shape())?;
        self.bias = bias;
        Ok(())
    }

    /// Runs one sample through convolution, activation and pooling. The
    /// output is a pure function of the input and the current parameters.
    pub fn forward(&self, input: ArrayView3<f64>) -> CResult<ForwardPass> {
        let (h, w) = self.config.image_size;
        ensure_shape("input", &[self.config.channels, h, w], input.shape())?;
        let pre_activation = conv::convolve(&input, &self.weights, &self.bias);
        let activation = pre_activation.mapv(|z| self.activation.activate(z));
        let (pooled, max_switches) =
            pool::downsample(&activation.view(), self.config.pool_size);
        Ok(ForwardPass {
            pre_activation,
            activation,
            pooled,
            max_switches,
        })
    }

    /// Propagates the upstream gradient back through pooling and
    /// convolution, applies the SGD update in place and returns the gradient
    /// with respect to the layer input.
    ///
    /// `inputs` is the minibatch the forward passes were computed from,
    /// `passes` the matching forward results in the same order, and
    /// `grad_output` the upstream gradient at pooled resolution,
    /// `[N][K][Hp][Wp]`. Parameters move by
    /// `learning_rate * gradient / minibatch_size`; the returned input
    /// gradient is computed from the freshly updated weights, preserving the
    /// update-then-propagate order of the backward pass.
    pub fn backward(
        &mut self,
        inputs: &ArrayView4<f64>,
        passes: &[ForwardPass],
        grad_output: &ArrayView4<f64>,
        minibatch_size: usize,
        learning_rate: f64,
    ) -> CResult<Array4<f64>> {
        if minibatch_size == 0 {
            return Err(LayerError::InvalidConfig(String::from(
                "minibatch size must be positive",
            ))
            .into());
        }
        let (h, w) = self.config.image_size;
        let (hc, wc) = self.config.convolved_size();
        let (hp, wp) = self.config.pooled_size();
        let kn = self.config.kernel_count;
        ensure_shape(
            "inputs",
            &[minibatch_size, self.config.channels, h, w],
            inputs.shape(),
        )?;
        ensure_shape("grad_output", &[minibatch_size, kn, hp, wp], grad_output.shape())?;
        if passes.len() != minibatch_size {
            return Err(LayerError::ShapeMismatch {
                tensor: "passes",
                expected: vec![minibatch_size],
                actual: vec![passes.len()],
            }
            .into());
        }
        for pass in passes {
            ensure_shape("passes.activation", &[kn, hc, wc], pass.activation.shape())?;
            ensure_shape("passes.pooled", &[kn, hp, wp], pass.pooled.shape())?;
        }

        let acts = stack_samples(passes.iter().map(|p| p.activation.view()).collect())?;
        let pooled = stack_samples(passes.iter().map(|p| p.pooled.view()).collect())?;
        let switches = stack_samples(passes.iter().map(|p| p.max_switches.view()).collect())?;

        // pooling gradient first, then the activation derivative at the
        // cached post-activation values
        let dz = pool::upsample(
            &acts.view(),
            &pooled.view(),
            &switches.view(),
            grad_output,
            self.config.pool_size,
            self.tie_break,
        )?;
        let delta = Zip::from(&dz)
            .and(&acts)
            .map_collect(|&g, &a| g * self.activation.derivative(a));

        let (grad_weights, grad_bias) = conv::grad_params(inputs, &delta.view());
        let scale = learning_rate / minibatch_size as f64;
        self.weights.scaled_add(-scale, &grad_weights);
        self.bias.scaled_add(-scale, &grad_bias);

        Ok(conv::grad_input(
            &delta.view(),
            &self.weights,
            self.config.image_size,
        )?)
    }
}

fn stack_samples<A: Copy>(views: Vec<ArrayView3<A>>) -> Result<Array4<A>, ndarray::ShapeError> {
    stack(Axis(0), views.as_slice())
}
