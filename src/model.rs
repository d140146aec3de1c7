// src/model.rs
//
// Sequence classifier: intra-sequence self-attention to weight the
// informative frames of a window, an LSTM pass whose final hidden state
// summarizes the attended sequence, and a linear head producing one
// score per sign class. An optional convolutional front end re-encodes
// raw grayscale frames for deployments that skip the feature pipeline;
// a given deployment uses exactly one of the two input modes.

use crate::types::Prediction;
use anyhow::{Context, Result};
use burn::{
    config::Config,
    module::Module,
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Lstm, LstmConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor, TensorData},
};

const CONV1_CHANNELS: usize = 64;
const CONV2_CHANNELS: usize = 128;

#[derive(Config, Debug)]
pub struct SignClassifierConfig {
    pub num_classes: usize,
    pub sequence_length: usize,
    /// Per-frame input width in precomputed-feature mode. Ignored when
    /// `frame_size` selects the raw-frame front end.
    pub feature_dim: usize,
    #[config(default = 512)]
    pub hidden_size: usize,
    #[config(default = 8)]
    pub attention_heads: usize,
    /// Square side of raw grayscale input frames. `Some` switches the
    /// model to raw-frame mode with the convolutional front end.
    #[config(default = "None")]
    pub frame_size: Option<usize>,
}

impl SignClassifierConfig {
    /// Width of the per-position representation entering the attention
    /// and recurrent stages.
    pub fn embed_dim(&self) -> usize {
        match self.frame_size {
            Some(side) => CONV2_CHANNELS * (side / 4) * (side / 4),
            None => self.feature_dim,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SignClassifier<B>> {
        if self.num_classes < 2 {
            anyhow::bail!("classifier needs at least 2 classes, got {}", self.num_classes);
        }
        if self.sequence_length == 0 {
            anyhow::bail!("sequence length must be at least 1");
        }
        if let Some(side) = self.frame_size {
            if side == 0 || side % 4 != 0 {
                anyhow::bail!(
                    "frame size must be a positive multiple of 4 (two 2x2 poolings), got {side}"
                );
            }
        }

        let embed = self.embed_dim();
        if embed == 0 {
            anyhow::bail!("per-frame input width must be positive");
        }
        if embed % self.attention_heads != 0 {
            anyhow::bail!(
                "attention embedding width {} is not divisible by {} heads",
                embed,
                self.attention_heads
            );
        }

        let conv = self.frame_size.map(|_| ConvEncoder {
            conv1: Conv2dConfig::new([1, CONV1_CHANNELS], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv2: Conv2dConfig::new([CONV1_CHANNELS, CONV2_CHANNELS], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        });

        Ok(SignClassifier {
            conv,
            attention: MultiHeadAttentionConfig::new(embed, self.attention_heads).init(device),
            lstm: LstmConfig::new(embed, self.hidden_size, true).init(device),
            head: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
        })
    }
}

/// Two conv+ReLU+pool blocks flattened per frame.
#[derive(Module, Debug)]
pub struct ConvEncoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> ConvEncoder<B> {
    /// [frames, 1, S, S] -> [frames, embed]
    fn forward(&self, frames: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.activation.forward(self.conv1.forward(frames)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        x.flatten(1, 3)
    }
}

#[derive(Module, Debug)]
pub struct SignClassifier<B: Backend> {
    conv: Option<ConvEncoder<B>>,
    attention: MultiHeadAttention<B>,
    lstm: Lstm<B>,
    head: Linear<B>,
}

impl<B: Backend> SignClassifier<B> {
    /// Score a batch of precomputed-feature windows, laid out
    /// [batch, T, D]. Returns unnormalized class scores [batch, classes].
    pub fn forward_features(&self, windows: Tensor<B, 3>) -> Tensor<B, 2> {
        // Query, key and value all come from the window itself.
        let attended = self.attention.forward(MhaInput::self_attn(windows)).context;
        // Only the hidden state after the final position is kept.
        let (_, state) = self.lstm.forward(attended, None);
        self.head.forward(state.hidden)
    }

    /// Raw-frame alternative: grayscale windows [batch, T, S, S] pass
    /// through the convolutional front end, then the same temporal
    /// stages as `forward_features`.
    pub fn forward_frames(&self, windows: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let conv = self
            .conv
            .as_ref()
            .context("model was built for precomputed features; raw-frame input needs the convolutional front end")?;

        let [batch, t, side, _] = windows.dims();
        let frames = windows.reshape([batch * t, 1, side, side]);
        let encoded = conv.forward(frames);
        let embed = encoded.dims()[1];
        let sequence = encoded.reshape([batch, t, embed]);
        Ok(self.forward_features(sequence))
    }
}

/// Classify a single flattened window and report the top class with its
/// softmax confidence.
pub fn classify_window<B: Backend>(
    model: &SignClassifier<B>,
    features: &[f32],
    sequence_length: usize,
    feature_dim: usize,
    device: &B::Device,
) -> Result<Prediction> {
    let expected = sequence_length * feature_dim;
    if features.len() != expected {
        anyhow::bail!(
            "window holds {} values, expected {} (T={} x D={})",
            features.len(),
            expected,
            sequence_length,
            feature_dim
        );
    }

    let input = Tensor::<B, 3>::from_data(
        TensorData::new(features.to_vec(), [1, sequence_length, feature_dim]),
        device,
    );
    let probabilities = softmax(model.forward_features(input), 1);
    let scores = probabilities
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read class scores: {e:?}"))?;

    let (class_id, confidence) = scores
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .context("classifier produced no scores")?;

    Ok(Prediction {
        class_id,
        confidence,
    })
}
