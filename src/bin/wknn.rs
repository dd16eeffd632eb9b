//! Command-line entry point for batch runs.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wknn::io::{self, DirSource, LogSink, TraceSink, WriterSink};
use wknn::{generate_clustered_dataset, Config, SyntheticParams};

#[derive(Parser, Debug)]
#[command(name = "wknn", version, about = "Weighted k-NN website fingerprinting classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Learn weights, classify, and persist the learned weights.
    Run {
        #[command(flatten)]
        common: Common,
        /// Where to write the learned weights (default: weights.<unix time>).
        #[arg(long)]
        weights_out: Option<PathBuf>,
    },
    /// Classify with weights from an earlier run.
    Classify {
        #[command(flatten)]
        common: Common,
        /// Weight record written by `run`.
        #[arg(long)]
        weights: PathBuf,
    },
    /// Learn and classify on a generated clustered dataset.
    Synthetic {
        #[command(flatten)]
        common: Common,
        /// Standard deviation of instances around their site centre.
        #[arg(long, default_value_t = 0.5)]
        spread: f64,
        /// Probability that a feature is missing.
        #[arg(long, default_value_t = 0.05)]
        missing_rate: f64,
        /// Seed of the data generator.
        #[arg(long, default_value_t = 42)]
        data_seed: u64,
    },
}

#[derive(Args, Debug)]
struct Common {
    /// JSON configuration; unspecified fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write per-query predictions to this file instead of the debug log.
    #[arg(long)]
    trace: Option<PathBuf>,
    /// Override the configured number of distance workers.
    #[arg(long)]
    workers: Option<usize>,
    /// Override the configured learning seed.
    #[arg(long)]
    seed: Option<u64>,
}

impl Common {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }

    fn sink(&self) -> anyhow::Result<Box<dyn TraceSink>> {
        Ok(match &self.trace {
            Some(path) => {
                let file = File::create(path).with_context(|| format!("creating trace {}", path.display()))?;
                Box::new(WriterSink::new(BufWriter::new(file)))
            }
            None => Box::new(LogSink),
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { common, weights_out } => {
            let config = common.config()?;
            config.validate()?;
            let dataset = io::load_dataset(&DirSource::from_config(&config), &config)?;
            let mut sink = common.sink()?;
            let report = wknn::learn_and_evaluate(&config, &dataset, sink.as_mut())?;
            println!("Accuracy: {:.6} {:.6}", report.accuracy.tp, report.accuracy.tn);

            let path = match weights_out {
                Some(path) => path,
                None => {
                    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
                    PathBuf::from(format!("weights.{now}"))
                }
            };
            io::write_weights(&path, &report.weights)
                .with_context(|| format!("writing weights {}", path.display()))?;
            tracing::info!(path = %path.display(), seed = report.seed, "weights written");
        }
        Command::Classify { common, weights } => {
            let config = common.config()?;
            config.validate_classification()?;
            let weights = io::read_weights(&weights, config.feat_num)
                .with_context(|| format!("reading weights {}", weights.display()))?;
            let eval = io::load_eval(&DirSource::from_config(&config), &config)?;
            let mut sink = common.sink()?;
            let accuracy = wknn::evaluate_with(&config, &eval, &weights, sink.as_mut())?;
            println!("Accuracy: {:.6} {:.6}", accuracy.tp, accuracy.tn);
        }
        Command::Synthetic {
            common,
            spread,
            missing_rate,
            data_seed,
        } => {
            let config = common.config()?;
            config.validate()?;
            let params = SyntheticParams {
                spread,
                missing_rate,
                seed: data_seed,
            };
            let dataset = generate_clustered_dataset(&config, params)?;
            let mut sink = common.sink()?;
            let report = wknn::learn_and_evaluate(&config, &dataset, sink.as_mut())?;
            println!("Accuracy: {:.6} {:.6}", report.accuracy.tp, report.accuracy.tn);
        }
    }
    Ok(())
}
