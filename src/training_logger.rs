//! Training Progress Log
//!
//! Records each progress report of a training run as one CSV row, so a run can
//! be charted or compared with another one afterwards.
//!
//! ## Example
//!
//! ```rust,no_run
//! use nickname_rnn::TrainingLogger;
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(1000, 0.01, 12.8, &["小猫".to_string(), "大狗".to_string()])?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## CSV Format
//!
//! - `iteration`: Training iteration of the report
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: SGD step size
//! - `smoothed_loss`: Exponential moving average of the per-example loss
//! - `perplexity`: `exp(smoothed_loss / num_monitor_samples)`, see below
//! - `samples`: Monitor nicknames joined by `|`, empty on rows without samples
//!
//! ## Perplexity
//!
//! The smoothed loss is a sum over the tokens of a whole nickname and starts
//! out at `ln(V) · num_monitor_samples`. Dividing by the same factor before
//! exponentiating gives a number that starts near the vocabulary size and
//! drops toward 1 as the model gets more certain:
//!
//! ```text
//! perplexity = exp(smoothed_loss / num_monitor_samples)
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// CSV logger for training progress
pub struct TrainingLogger {
    log_file: BufWriter<File>,
    start_time: Instant,
    loss_scale: f32,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    ///
    /// Perplexity is computed as `exp(loss)`; see
    /// [`TrainingLogger::with_loss_scale`] for the per-sample variant.
    pub fn new(log_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::with_loss_scale(log_path, 1)
    }

    /// Like [`TrainingLogger::new`], dividing the loss by `loss_scale` before
    /// computing perplexity
    pub fn with_loss_scale(log_path: impl AsRef<Path>, loss_scale: usize) -> std::io::Result<Self> {
        let mut log_file = BufWriter::new(File::create(log_path)?);
        writeln!(
            log_file,
            "iteration,elapsed_seconds,learning_rate,smoothed_loss,perplexity,samples"
        )?;
        log_file.flush()?;

        Ok(Self {
            log_file,
            start_time: Instant::now(),
            loss_scale: loss_scale.max(1) as f32,
        })
    }

    /// Append one progress row
    ///
    /// # Arguments
    ///
    /// * `iteration` - Iteration the report belongs to
    /// * `learning_rate` - Current learning rate
    /// * `smoothed_loss` - Smoothed training loss
    /// * `samples` - Monitor nicknames, possibly empty
    pub fn log(
        &mut self,
        iteration: usize,
        learning_rate: f32,
        smoothed_loss: f32,
        samples: &[String],
    ) -> std::io::Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let perplexity = (smoothed_loss / self.loss_scale).exp();

        // CSV quoting: double every embedded quote
        let joined = samples.join("|").replace('"', "\"\"");

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.4},{:.2},\"{}\"",
            iteration, elapsed, learning_rate, smoothed_loss, perplexity, joined
        )?;

        // Flush every row so a crashed run keeps its history
        self.log_file.flush()
    }
}
