//! `lincrf` command-line tool: train a tagger or label a column file with one.

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lincrf_trainer::{CorpusReader, EmbeddingTagger, OptimizerKind, TrainConfig, run_training};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lincrf")]
#[command(about = "Train and run a linear-chain CRF sequence labeller")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and keep the checkpoint with the best dev F1
    Train(TrainArgs),
    /// Label every sentence of a column file with a saved model
    Tag {
        /// Directory holding model.safetensors and model.json
        #[arg(short, long, env = "LINCRF_MODEL_DIR", default_value = "models")]
        model_dir: PathBuf,

        /// Column file to label; its label column is ignored
        input: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Overrides on top of the defaults or a JSON config file.
#[derive(Args)]
struct TrainArgs {
    /// JSON config file
    #[arg(short, long, env = "LINCRF_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    train_file: Option<PathBuf>,
    #[arg(long)]
    dev_file: Option<PathBuf>,
    #[arg(long)]
    test_file: Option<PathBuf>,
    /// Pretrained embeddings (GloVe text format)
    #[arg(long)]
    embedding_file: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    embedding_dim: Option<usize>,
    #[arg(long)]
    dropout: Option<f32>,
    #[arg(long)]
    use_char_rnn: Option<bool>,
    #[arg(long, value_enum)]
    optimizer: Option<OptimizerKind>,
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long)]
    l2: Option<f64>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    num_epochs: Option<usize>,
    #[arg(long)]
    shuffle: Option<bool>,
    #[arg(long)]
    eval_freq: Option<usize>,
    #[arg(long)]
    eval_epoch: Option<usize>,
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

impl TrainArgs {
    fn into_config(self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };

        if let Some(v) = self.train_file {
            config.train_file = v;
        }
        if let Some(v) = self.dev_file {
            config.dev_file = v;
        }
        if let Some(v) = self.test_file {
            config.test_file = v;
        }
        if self.embedding_file.is_some() {
            config.embedding_file = self.embedding_file;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.embedding_dim {
            config.embedding_dim = v;
        }
        if let Some(v) = self.dropout {
            config = config.with_dropout(v);
        }
        if let Some(v) = self.use_char_rnn {
            config.use_char_rnn = v;
        }
        if let Some(v) = self.optimizer {
            config.optimizer = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.l2 {
            config.l2 = v;
        }
        if let Some(v) = self.batch_size {
            config = config.with_batch_size(v);
        }
        if let Some(v) = self.num_epochs {
            config.num_epochs = v;
        }
        if let Some(v) = self.shuffle {
            config.shuffle = v;
        }
        if let Some(v) = self.eval_freq {
            config.eval_freq = v;
        }
        if let Some(v) = self.eval_epoch {
            config.eval_epoch = v;
        }
        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        Ok(config.normalized())
    }
}

fn tag(model_dir: PathBuf, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let model = EmbeddingTagger::load(&model_dir)?;
    let reader = CorpusReader::new(model.config().digit2zero)?;
    let sentences = reader.read_file(&input, -1)?;
    info!("Tagging {} sentences", sentences.len());

    let sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut out = BufWriter::new(sink);

    for sentence in &sentences {
        let decoded = model.decode(&sentence.words)?;
        for (word, label) in sentence.words.iter().zip(&decoded.labels) {
            writeln!(out, "{word} {label}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train(args) => {
            let config = args.into_config()?;
            info!("{}", serde_json::to_string_pretty(&config)?);
            let summary = run_training(&config)?;
            info!(
                "Best dev F1 {:.2} (epoch {}), best test F1 {:.2} (epoch {})",
                summary.best_dev,
                summary.best_dev_epoch + 1,
                summary.best_test,
                summary.best_test_epoch + 1
            );
        }
        Commands::Tag {
            model_dir,
            input,
            output,
        } => tag(model_dir, input, output)?,
    }
    Ok(())
}
