use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub pipeline: PipelineConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub optimizer: OptimizerConfig,
    pub live: LiveConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {path}"))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Raw video corpus: one directory per class, one video file per clip.
    pub video_dir: String,
    /// Root of the persisted feature cache written by `extract`.
    pub features_dir: String,
    /// Checkpoint path stem; the recorder adds its own extension and the
    /// metadata sidecar lands at `<stem>.meta.json`.
    pub checkpoint_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            video_dir: "data/videos".to_string(),
            features_dir: "data/features".to_string(),
            checkpoint_path: "models/sign_classifier".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Instance-segmentation ONNX model used for foreground isolation.
    pub segmentation_model: String,
    /// Pretrained visual backbone ONNX model (feature-extractor export,
    /// classification head removed).
    pub backbone_model: String,
    /// Square input resolution the backbone expects.
    pub backbone_input_size: usize,
    /// Length of the backbone's flattened feature output.
    pub backbone_dim: usize,
    /// Square resolution the optical-flow field is computed at. The motion
    /// vector length is the square of this value.
    pub motion_resolution: usize,
    pub intra_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmentation_model: "models/mask_rcnn.onnx".to_string(),
            backbone_model: "models/vgg16_features.onnx".to_string(),
            backbone_input_size: 224,
            backbone_dim: 25088,
            motion_resolution: 128,
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Window length T: how many consecutive frames one prediction sees.
    pub sequence_length: usize,
    pub hidden_size: usize,
    pub attention_heads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            hidden_size: 512,
            attention_heads: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of windows held out for validation.
    pub validation_split: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Candidates sampled per round.
    pub num_agents: usize,
    /// Search rounds.
    pub max_iterations: usize,
    /// Learning-rate search interval, half-open.
    pub lr_bounds: [f64; 2],
    /// Batch-size search interval, half-open; sampled values are rounded.
    pub batch_bounds: [f64; 2],
    /// Epochs each candidate trains for during fitness evaluation.
    pub search_epochs: usize,
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            num_agents: 10,
            max_iterations: 5,
            lr_bounds: [1e-4, 1e-1],
            batch_bounds: [16.0, 64.0],
            search_epochs: 3,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub camera_index: i32,
    /// Minimum softmax confidence before a sign is reported.
    pub confidence_threshold: f32,
    pub window_name: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            confidence_threshold: 0.90,
            window_name: "sign recognition".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model.sequence_length, 10);
        assert_eq!(config.pipeline.motion_resolution, 128);
        assert_eq!(config.training.batch_size, 32);
        assert!((config.live.confidence_threshold - 0.90).abs() < 1e-6);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "model:\n  sequence_length: 16\ntraining:\n  epochs: 3\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.model.sequence_length, 16);
        assert_eq!(config.training.epochs, 3);
        // Untouched sections fall back to defaults
        assert_eq!(config.model.hidden_size, 512);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.data.features_dir, "data/features");
    }
}
