//! Nickname Generator CLI
//!
//! Train the nickname model, generate nicknames from a saved snapshot, or
//! print the model status.
//!
//! ## Usage
//!
//! ```bash
//! # Train on nicknames.txt, saving to nickname_model.bin
//! cargo run --release -- train
//!
//! # Shorter run with a CSV progress log
//! cargo run --release -- train --iterations 5000 --csv-log training_log.csv
//!
//! # Word-level vocabulary via jieba
//! cargo run --release -- --segmenter jieba train
//!
//! # Generate five nicknames of exactly four characters
//! cargo run --release -- generate --count 5 --max-length 4 --exact-length
//!
//! # Status as JSON
//! cargo run --release -- status
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for more detail.

use clap::{Parser, Subcommand};
use nickname_rnn::{
    GenerateRequest, NicknameConfig, NicknameError, SegmenterKind, StartOutcome,
    TrainingCoordinator,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "nickname", about = "Character-level RNN nickname generator")]
struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Training corpus, one nickname per line
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Model snapshot file
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Corpus tokenization: char or jieba
    #[arg(long, global = true)]
    segmenter: Option<SegmenterKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model in the foreground and save it
    Train {
        /// Number of training iterations
        #[arg(long)]
        iterations: Option<usize>,

        /// Hidden state width
        #[arg(long)]
        hidden_size: Option<usize>,

        /// SGD learning rate
        #[arg(long)]
        lr: Option<f32>,

        /// Terminate every corpus line with the end token
        #[arg(long)]
        append_end_token: bool,

        /// Write progress rows to this CSV file
        #[arg(long)]
        csv_log: Option<PathBuf>,
    },

    /// Generate nicknames from the saved model
    Generate {
        /// Number of nicknames (1-20)
        #[arg(long, default_value_t = 5)]
        count: usize,

        /// Seed for repeatable output
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum nickname length (2-20)
        #[arg(long, default_value_t = 10)]
        max_length: usize,

        /// Produce nicknames of exactly --max-length characters
        #[arg(long)]
        exact_length: bool,
    },

    /// Print the model status as JSON
    Status,
}

fn load_config(args: &Args) -> Result<NicknameConfig, NicknameError> {
    let mut config = match &args.config {
        Some(path) => NicknameConfig::from_file(path)?,
        None => NicknameConfig::default(),
    };
    if let Some(corpus) = &args.corpus {
        config.corpus_path = corpus.clone();
    }
    if let Some(model) = &args.model {
        config.model_path = model.clone();
    }
    if let Some(segmenter) = args.segmenter {
        config.segmenter = segmenter;
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), NicknameError> {
    let mut config = load_config(&args)?;

    match args.command {
        Command::Train {
            iterations,
            hidden_size,
            lr,
            append_end_token,
            csv_log,
        } => {
            let training = &mut config.training;
            if let Some(iterations) = iterations {
                training.iterations = iterations;
            }
            if let Some(hidden_size) = hidden_size {
                training.hidden_size = hidden_size;
            }
            if let Some(lr) = lr {
                training.learning_rate = lr;
            }
            training.append_end_token |= append_end_token;
            if csv_log.is_some() {
                training.csv_log_path = csv_log;
            }
            training.validate()?;

            let coordinator = TrainingCoordinator::new(config);
            if let StartOutcome::AlreadyRunning { progress } = coordinator.start_training()? {
                log::warn!("training already running at {}%", progress);
            }
            coordinator.wait();

            let status = coordinator.get_status();
            if let Some(error) = status.error {
                return Err(NicknameError::Training(error));
            }
            if let Some(samples) = status.sample_nicknames {
                println!("Last samples:");
                for name in samples {
                    println!("  {}", name);
                }
            }
            Ok(())
        }

        Command::Generate {
            count,
            seed,
            max_length,
            exact_length,
        } => {
            let coordinator = TrainingCoordinator::new(config);
            let request = GenerateRequest {
                count,
                seed,
                max_length,
                exact_length,
                ..GenerateRequest::default()
            };
            for name in coordinator.generate(&request)? {
                println!("{}", name);
            }
            Ok(())
        }

        Command::Status => {
            let coordinator = TrainingCoordinator::new(config);
            let status = coordinator.get_status();
            let json = serde_json::to_string_pretty(&status)
                .map_err(|e| NicknameError::Config(e.to_string()))?;
            println!("{}", json);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
