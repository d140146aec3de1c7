// src/trainer.rs
//
// Owned-model training runs. A run takes the dataset and a model
// configuration, owns the model weights for its whole duration, and
// hands back an autodiff-free snapshot plus bookkeeping. Checkpoints
// are an opaque record file with a JSON sidecar carrying the model
// dimensions and the class map, so consumers always reconstruct an
// identically-shaped model and the exact training-time class ordering.

use crate::corpus::{WindowDataset, WindowIndex};
use crate::metrics::{ConfusionAccumulator, EvaluationReport};
use crate::model::{SignClassifier, SignClassifierConfig};
use crate::types::ClassMap;
use anyhow::{Context, Result};
use burn::{
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

pub type InferenceBackend = burn_ndarray::NdArray<f32>;
pub type TrainBackend = burn::backend::Autodiff<InferenceBackend>;

#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

pub struct TrainOutcome {
    /// Snapshot for inference and persistence; the autodiff graph stays
    /// inside the run.
    pub model: SignClassifier<InferenceBackend>,
    pub epoch_losses: Vec<f32>,
    /// Accuracy on the validation windows after the final epoch, 0 when
    /// no validation split was held out.
    pub validation_accuracy: f32,
}

pub fn train(
    dataset: &WindowDataset,
    model_config: &SignClassifierConfig,
    settings: &TrainSettings,
) -> Result<TrainOutcome> {
    if settings.batch_size == 0 {
        anyhow::bail!("batch size must be at least 1");
    }
    if settings.epochs == 0 {
        anyhow::bail!("epoch count must be at least 1");
    }

    let device = <TrainBackend as Backend>::Device::default();
    TrainBackend::seed(settings.seed);

    let mut model: SignClassifier<TrainBackend> = model_config.init(&device)?;
    let mut optim = AdamConfig::new().init();
    let loss_fn = CrossEntropyLossConfig::new().init(&device);
    let mut rng = StdRng::seed_from_u64(settings.seed);

    let t = dataset.sequence_length();
    let d = dataset.feature_dim();
    let mut epoch_losses = Vec::with_capacity(settings.epochs);
    let mut validation_accuracy = 0.0f32;

    info!(
        "Training: {} windows, {} epochs, batch {}, lr {:.2e}",
        dataset.train_windows().len(),
        settings.epochs,
        settings.batch_size,
        settings.learning_rate
    );

    for epoch in 1..=settings.epochs {
        let mut order: Vec<WindowIndex> = dataset.train_windows().to_vec();
        order.shuffle(&mut rng);

        let mut loss_sum = 0.0f32;
        let mut batches = 0usize;

        for chunk in order.chunks(settings.batch_size) {
            let (flat, labels) = dataset.gather(chunk);
            let batch = chunk.len();

            let input = Tensor::<TrainBackend, 3>::from_data(
                TensorData::new(flat, [batch, t, d]),
                &device,
            );
            let targets = Tensor::<TrainBackend, 1, Int>::from_data(
                TensorData::new(labels, [batch]),
                &device,
            );

            let logits = model.forward_features(input);
            let loss = loss_fn.forward(logits, targets);
            let batch_loss: f32 = loss.clone().into_scalar();

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(settings.learning_rate, model, grads);

            loss_sum += batch_loss;
            batches += 1;
        }

        let epoch_loss = loss_sum / batches.max(1) as f32;
        epoch_losses.push(epoch_loss);

        if dataset.val_windows().is_empty() {
            info!("Epoch {}/{} — train loss {:.4}", epoch, settings.epochs, epoch_loss);
        } else {
            let snapshot = model.valid();
            validation_accuracy =
                accuracy_on(&snapshot, dataset, dataset.val_windows(), settings.batch_size)?;
            info!(
                "Epoch {}/{} — train loss {:.4}, val accuracy {:.1}%",
                epoch,
                settings.epochs,
                epoch_loss,
                validation_accuracy * 100.0
            );
        }
    }

    Ok(TrainOutcome {
        model: model.valid(),
        epoch_losses,
        validation_accuracy,
    })
}

/// Full evaluation pass over the given windows.
pub fn evaluate(
    model: &SignClassifier<InferenceBackend>,
    dataset: &WindowDataset,
    windows: &[WindowIndex],
    batch_size: usize,
) -> Result<EvaluationReport> {
    let device = <InferenceBackend as Backend>::Device::default();
    let pairs = predict_pairs(model, dataset, windows, batch_size, &device)?;

    let mut confusion = ConfusionAccumulator::new(dataset.num_classes());
    for (true_id, predicted_id) in pairs {
        confusion.record(true_id, predicted_id);
    }

    Ok(confusion.report(&dataset.corpus().class_map))
}

fn accuracy_on(
    model: &SignClassifier<InferenceBackend>,
    dataset: &WindowDataset,
    windows: &[WindowIndex],
    batch_size: usize,
) -> Result<f32> {
    let device = <InferenceBackend as Backend>::Device::default();
    let pairs = predict_pairs(model, dataset, windows, batch_size, &device)?;
    if pairs.is_empty() {
        return Ok(0.0);
    }
    let correct = pairs.iter().filter(|(t, p)| t == p).count();
    Ok(correct as f32 / pairs.len() as f32)
}

/// (true, predicted) class ids for every window, batched forward passes.
fn predict_pairs<B: Backend>(
    model: &SignClassifier<B>,
    dataset: &WindowDataset,
    windows: &[WindowIndex],
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<(usize, usize)>> {
    let t = dataset.sequence_length();
    let d = dataset.feature_dim();
    let mut pairs = Vec::with_capacity(windows.len());

    for chunk in windows.chunks(batch_size.max(1)) {
        let (flat, labels) = dataset.gather(chunk);
        let input =
            Tensor::<B, 3>::from_data(TensorData::new(flat, [chunk.len(), t, d]), device);

        let predicted = model
            .forward_features(input)
            .argmax(1)
            .into_data()
            .to_vec::<i64>()
            .map_err(|e| anyhow::anyhow!("failed to read predictions: {e:?}"))?;

        for (label, prediction) in labels.into_iter().zip(predicted) {
            pairs.push((label as usize, prediction as usize));
        }
    }

    Ok(pairs)
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

/// Sidecar written next to every checkpoint. The record file itself is
/// an opaque blob; everything needed to rebuild the model — and to agree
/// on class ids — lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub saved_at: String,
    pub sequence_length: usize,
    pub feature_dim: usize,
    pub hidden_size: usize,
    pub attention_heads: usize,
    pub num_classes: usize,
    pub class_map: ClassMap,
}

impl CheckpointMeta {
    pub fn model_config(&self) -> SignClassifierConfig {
        SignClassifierConfig::new(self.num_classes, self.sequence_length, self.feature_dim)
            .with_hidden_size(self.hidden_size)
            .with_attention_heads(self.attention_heads)
    }

    /// Fatal, descriptive failure when the consumer's dimensions do not
    /// match what the checkpoint was trained with.
    pub fn ensure_compatible(
        &self,
        feature_dim: usize,
        sequence_length: usize,
        num_classes: usize,
    ) -> Result<()> {
        let mut mismatches = Vec::new();
        if self.feature_dim != feature_dim {
            mismatches.push(format!(
                "feature dim: expected {feature_dim}, checkpoint has {}",
                self.feature_dim
            ));
        }
        if self.sequence_length != sequence_length {
            mismatches.push(format!(
                "sequence length: expected {sequence_length}, checkpoint has {}",
                self.sequence_length
            ));
        }
        if self.num_classes != num_classes {
            mismatches.push(format!(
                "class count: expected {num_classes}, checkpoint has {}",
                self.num_classes
            ));
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("checkpoint shape mismatch — {}", mismatches.join("; "))
        }
    }
}

fn sidecar_path(checkpoint: &Path) -> PathBuf {
    let mut os = checkpoint.as_os_str().to_os_string();
    os.push(".meta.json");
    PathBuf::from(os)
}

pub fn save_checkpoint(
    model: &SignClassifier<InferenceBackend>,
    checkpoint: &Path,
    meta: &CheckpointMeta,
) -> Result<()> {
    if let Some(parent) = checkpoint.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(checkpoint, &recorder)
        .with_context(|| format!("failed to save checkpoint {}", checkpoint.display()))?;

    let sidecar = sidecar_path(checkpoint);
    let file = File::create(&sidecar)
        .with_context(|| format!("failed to create sidecar {}", sidecar.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), meta)
        .with_context(|| format!("failed to write sidecar {}", sidecar.display()))?;

    info!("💾 Checkpoint saved: {} (+ {})", checkpoint.display(), sidecar.display());
    Ok(())
}

pub fn load_checkpoint(checkpoint: &Path) -> Result<(SignClassifier<InferenceBackend>, CheckpointMeta)> {
    let sidecar = sidecar_path(checkpoint);
    let file = File::open(&sidecar).with_context(|| {
        format!(
            "checkpoint metadata not found at {} — was this model saved by `train`?",
            sidecar.display()
        )
    })?;
    let meta: CheckpointMeta = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("corrupt checkpoint sidecar {}", sidecar.display()))?;

    let device = <InferenceBackend as Backend>::Device::default();
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = meta
        .model_config()
        .init::<InferenceBackend>(&device)?
        .load_file(checkpoint, &recorder, &device)
        .with_context(|| format!("failed to load model record {}", checkpoint.display()))?;

    info!(
        "📦 Checkpoint loaded: {} classes, T={}, D={}",
        meta.num_classes, meta.sequence_length, meta.feature_dim
    );

    Ok((model, meta))
}
