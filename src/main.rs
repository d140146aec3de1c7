// src/main.rs

mod config;
mod corpus;
mod features;
mod foreground;
mod live;
mod metrics;
mod model;
mod motion;
mod optimizer;
mod pipeline;
mod segmentation;
mod spatial;
mod trainer;
mod types;
mod video;
mod window;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use corpus::WindowDataset;
use model::SignClassifierConfig;
use optimizer::{HybridOptimizer, ParameterBounds};
use std::path::Path;
use tracing::{info, warn};
use trainer::{CheckpointMeta, TrainOutcome, TrainSettings};

#[derive(Parser, Debug)]
#[command(name = "sign-recognition")]
#[command(version, about = "Sign gesture recognition from video", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every corpus clip through the feature pipeline and cache the results
    Extract,
    /// Train the classifier on cached features and save a checkpoint
    Train,
    /// Score a saved checkpoint against the cached corpus
    Evaluate,
    /// Search training hyperparameters, then train with the best found
    Tune,
    /// Recognize signs from the camera in real time
    Live,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "sign_recognition={},ort=warn",
            config.logging.level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🤟 Sign Recognition System Starting");
    info!("✓ Configuration loaded from {}", cli.config);

    match cli.command {
        Commands::Extract => cmd_extract(&config),
        Commands::Train => cmd_train(&config),
        Commands::Evaluate => cmd_evaluate(&config),
        Commands::Tune => cmd_tune(&config),
        Commands::Live => live::run_live(&config),
    }
}

fn cmd_extract(config: &Config) -> Result<()> {
    let summary = pipeline::extract_corpus(config)?;
    if summary.clips_ok == 0 {
        anyhow::bail!("no clip produced features — see warnings above");
    }
    info!("Feature cache ready under {}", config.data.features_dir);
    Ok(())
}

fn cmd_train(config: &Config) -> Result<()> {
    let dataset = build_dataset(config)?;
    let model_config = classifier_config(config, &dataset);

    let settings = TrainSettings {
        epochs: config.training.epochs,
        batch_size: config.training.batch_size,
        learning_rate: config.training.learning_rate,
        seed: config.training.seed,
    };

    let outcome = trainer::train(&dataset, &model_config, &settings)?;
    if let Some(last) = outcome.epoch_losses.last() {
        info!(
            "Training finished: loss {:.4}, validation accuracy {:.1}%",
            last,
            outcome.validation_accuracy * 100.0
        );
    }

    save_trained(config, &dataset, &model_config, &outcome)
}

fn cmd_evaluate(config: &Config) -> Result<()> {
    let (model, meta) = trainer::load_checkpoint(Path::new(&config.data.checkpoint_path))?;

    if config.model.sequence_length != meta.sequence_length {
        warn!(
            "⚠️ Config sequence_length {} differs from checkpoint {}, using the checkpoint's",
            config.model.sequence_length, meta.sequence_length
        );
    }

    let mut corpus = corpus::load_corpus(Path::new(&config.data.features_dir))?;
    // Ids must come from the training-time map, not this listing
    corpus.align_to(&meta.class_map)?;
    meta.ensure_compatible(corpus.dim, meta.sequence_length, corpus.class_map.len())?;

    // No held-out split here: the whole corpus is scored
    let dataset = WindowDataset::build(corpus, meta.sequence_length, 0.0, config.training.seed)?;
    let report = trainer::evaluate(
        &model,
        &dataset,
        dataset.train_windows(),
        config.training.batch_size,
    )?;

    info!("📊 Evaluation over {} windows", report.total);
    info!("  Accuracy: {:.1}%", report.accuracy * 100.0);
    info!(
        "  Macro precision {:.3} | recall {:.3} | F1 {:.3}",
        report.macro_precision, report.macro_recall, report.macro_f1
    );
    for class in &report.per_class {
        info!(
            "  {:<14} P {:.3} R {:.3} F1 {:.3} (n={})",
            class.name, class.precision, class.recall, class.f1, class.support
        );
    }

    let report_path = format!("{}.evaluation.json", config.data.checkpoint_path);
    let file = std::fs::File::create(&report_path)
        .with_context(|| format!("failed to create report file {report_path}"))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &report)?;
    info!("💾 Report written to {}", report_path);

    Ok(())
}

fn cmd_tune(config: &Config) -> Result<()> {
    let dataset = build_dataset(config)?;
    let model_config = classifier_config(config, &dataset);

    let bounds = vec![
        ParameterBounds::new(
            "learning_rate",
            config.optimizer.lr_bounds[0],
            config.optimizer.lr_bounds[1],
        ),
        ParameterBounds::new(
            "batch_size",
            config.optimizer.batch_bounds[0],
            config.optimizer.batch_bounds[1],
        ),
    ];
    let mut search = HybridOptimizer::new(
        bounds,
        config.optimizer.num_agents,
        config.optimizer.max_iterations,
        config.optimizer.seed,
    )?;

    info!(
        "🔬 Hyperparameter search: {} candidates x {} rounds, {} epochs per evaluation",
        config.optimizer.num_agents, config.optimizer.max_iterations, config.optimizer.search_epochs
    );

    let best = search.optimize(|params| {
        let settings = TrainSettings {
            epochs: config.optimizer.search_epochs,
            batch_size: (params[1].round() as usize).max(1),
            learning_rate: params[0],
            seed: config.training.seed,
        };
        let outcome = trainer::train(&dataset, &model_config, &settings)?;
        Ok(outcome.validation_accuracy as f64)
    })?;

    let best_lr = best.params[0];
    let best_batch = (best.params[1].round() as usize).max(1);
    info!(
        "🏁 Best candidate: lr={:.2e}, batch={} (val accuracy {:.1}%)",
        best_lr,
        best_batch,
        best.fitness * 100.0
    );

    // Full-length run with the selected hyperparameters
    let settings = TrainSettings {
        epochs: config.training.epochs,
        batch_size: best_batch,
        learning_rate: best_lr,
        seed: config.training.seed,
    };
    let outcome = trainer::train(&dataset, &model_config, &settings)?;
    info!(
        "Final validation accuracy {:.1}%",
        outcome.validation_accuracy * 100.0
    );

    save_trained(config, &dataset, &model_config, &outcome)
}

fn build_dataset(config: &Config) -> Result<WindowDataset> {
    let corpus = corpus::load_corpus(Path::new(&config.data.features_dir))?;
    WindowDataset::build(
        corpus,
        config.model.sequence_length,
        config.training.validation_split,
        config.training.seed,
    )
}

fn classifier_config(config: &Config, dataset: &WindowDataset) -> SignClassifierConfig {
    SignClassifierConfig::new(
        dataset.num_classes(),
        dataset.sequence_length(),
        dataset.feature_dim(),
    )
    .with_hidden_size(config.model.hidden_size)
    .with_attention_heads(config.model.attention_heads)
}

fn save_trained(
    config: &Config,
    dataset: &WindowDataset,
    model_config: &SignClassifierConfig,
    outcome: &TrainOutcome,
) -> Result<()> {
    let meta = CheckpointMeta {
        saved_at: chrono::Utc::now().to_rfc3339(),
        sequence_length: dataset.sequence_length(),
        feature_dim: dataset.feature_dim(),
        hidden_size: model_config.hidden_size,
        attention_heads: model_config.attention_heads,
        num_classes: dataset.num_classes(),
        class_map: dataset.corpus().class_map.clone(),
    };
    trainer::save_checkpoint(&outcome.model, Path::new(&config.data.checkpoint_path), &meta)?;

    info!("✅ Model ready at {}", config.data.checkpoint_path);
    Ok(())
}
