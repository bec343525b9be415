use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use earlystop_gate::{
    Controller, ControllerConfig, Phase, Precision, StateStore, TrendEvaluator, TrendRule,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default controller configuration
    InitConfig {
        #[arg(long)]
        output: PathBuf,
    },
    /// Drive a controller with a synthetic decaying loss curve
    Simulate {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        state_path: Option<PathBuf>,
        #[arg(long, default_value = "200")]
        epochs: usize,
        #[arg(long, default_value = "2.0")]
        start_loss: f64,
        #[arg(long, default_value = "0.3")]
        floor_loss: f64,
        #[arg(long, default_value = "0.1")]
        decay: f64,
        #[arg(long, default_value = "0.01")]
        noise: f64,
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Feed a JSON-lines loss trace through a controller
    Replay {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        trace: PathBuf,
    },
    /// Print the persisted validation window
    Inspect {
        #[arg(long)]
        state_path: PathBuf,
        #[arg(long)]
        capacity: usize,
        #[arg(long, value_enum, default_value = "f64")]
        precision: Precision,
    },
    /// Score an explicit window of validation means
    Score {
        #[arg(long, value_delimiter = ',')]
        values: Vec<f64>,
        #[arg(long, default_value = "1.0")]
        scale_factor: f64,
        #[arg(long, default_value = "0.05")]
        threshold: f64,
        #[arg(long, value_enum, default_value = "relative-improvement")]
        rule: TrendRule,
        /// Epoch-sampled training losses, read by the min-sum-ratio rule
        #[arg(long, value_delimiter = ',')]
        train_history: Vec<f64>,
        /// Lowest validation mean seen before the window, read by the min-sum-ratio rule
        #[arg(long)]
        best_validation: Option<f64>,
    },
}

#[derive(Debug, Deserialize)]
struct TraceRecord {
    phase: Phase,
    loss: f64,
}

fn load_config(path: Option<&PathBuf>) -> Result<ControllerConfig> {
    match path {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ControllerConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "earlystop_gate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { output } => {
            ControllerConfig::default()
                .to_file(&output)
                .with_context(|| format!("Failed to write config to {}", output.display()))?;
            println!("Wrote default config to {}", output.display());
        }
        Commands::Simulate {
            config,
            state_path,
            epochs,
            start_loss,
            floor_loss,
            decay,
            noise,
            seed,
        } => {
            let mut cfg = load_config(config.as_ref())?;
            if let Some(path) = state_path {
                cfg.state_path = path;
            }
            let train_steps = cfg.train_steps_per_epoch;
            let validation_steps = cfg.validation_steps_per_epoch;
            let mut controller = Controller::new(cfg)?;
            let mut rng = StdRng::seed_from_u64(seed);
            let noise = noise.abs();
            let mut iteration = 0u64;

            let curve = |epoch: usize| floor_loss + (start_loss - floor_loss) * (-decay * epoch as f64).exp();

            'epochs: for epoch in 0..epochs {
                for _ in 0..train_steps {
                    let loss = curve(epoch) + rng.gen_range(-noise..=noise);
                    let decision = controller.observe(loss, Phase::Train, iteration);
                    iteration += 1;
                    if decision.stopped {
                        println!("Stopped during epoch {} at iteration {}", epoch + 1, iteration - 1);
                        break 'epochs;
                    }
                }
                for _ in 0..validation_steps {
                    let loss = curve(epoch) * 1.05 + rng.gen_range(-noise..=noise);
                    controller.observe(loss, Phase::Validate, iteration);
                }
            }

            if !controller.is_stopped() {
                println!("Ran {} epochs without stopping", epochs);
            }
            if let Some(evaluation) = controller.last_evaluation() {
                println!("Last evaluation: {}", serde_json::to_string(evaluation)?);
            }
        }
        Commands::Replay { config, trace } => {
            let cfg = load_config(Some(&config))?;
            let mut controller = Controller::new(cfg)?;
            let raw = fs::read_to_string(&trace)
                .with_context(|| format!("Failed to read trace {}", trace.display()))?;

            let mut observed = 0u64;
            for (line_no, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: TraceRecord = serde_json::from_str(line)
                    .with_context(|| format!("Invalid trace record on line {}", line_no + 1))?;
                let decision = controller.observe(record.loss, record.phase, observed);
                if decision.is_stop_event() {
                    println!("Stop event at record {} (line {})", observed, line_no + 1);
                }
                observed += 1;
            }
            println!(
                "Replayed {} records; stopped: {}",
                observed,
                controller.is_stopped()
            );
        }
        Commands::Inspect {
            state_path,
            capacity,
            precision,
        } => {
            anyhow::ensure!(capacity > 0, "capacity must be > 0");
            let store = StateStore::new(state_path, capacity, precision);
            let window = store
                .load()
                .with_context(|| format!("Failed to read {}", store.path().display()))?;
            println!("{}", serde_json::to_string_pretty(&window.values())?);
        }
        Commands::Score {
            values,
            scale_factor,
            threshold,
            rule,
            train_history,
            best_validation,
        } => {
            let evaluator = TrendEvaluator::new(threshold, scale_factor, rule)
                .with_train_span(values.len());
            match evaluator.evaluate_with_best(&values, &train_history, best_validation) {
                Some(evaluation) => println!("{}", serde_json::to_string_pretty(&evaluation)?),
                None => println!("Insufficient data: score undefined, training continues"),
            }
        }
    }

    Ok(())
}
