//! Background Training
//!
//! [`TrainingCoordinator`] runs the training driver on a worker thread and
//! keeps a [`ModelStatus`] record that any thread can read at any time.
//!
//! ## Lifecycle
//!
//! ```text
//! start_training()
//!   training == true  -> AlreadyRunning, nothing else happens
//!   training == false -> training = true, spawn worker, Started
//!
//! worker, every progress report
//!   progress, current_loss, sample_nicknames updated
//!   live parameters published to the generator
//!
//! worker, on success
//!   trained = true, training = false, progress = 100, last_trained = now
//!
//! worker, on failure (error or panic)
//!   training = false, error = message, trained unchanged
//! ```
//!
//! At most one worker runs at a time; the check and the flip of `training`
//! happen under one write lock.
//!
//! ## Snapshots
//!
//! An existing snapshot at `model_path` is loaded on construction. While no
//! model is loaded, every `generate` call looks at `model_path` again, so a
//! snapshot written later (say by `nickname train` in another process) is
//! picked up without a restart. There is no cancellation: a run goes on until
//! its last iteration, and dropping the coordinator waits for it.
//!
//! ## Status Reads
//!
//! The status is one record behind a `parking_lot::RwLock`. Writers replace
//! fields under the write lock and readers clone the whole record, so a
//! reader never sees half of an update.

use crate::checkpoint::NicknameModel;
use crate::config::NicknameConfig;
use crate::error::{NicknameError, Result};
use crate::generator::{GenerateRequest, NicknameGenerator};
use crate::segmenter::Segmenter;
use crate::train::{train, TrainingProgress};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Timestamp format of [`ModelStatus::last_trained`]
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Snapshot of the model's training state
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModelStatus {
    /// A model was trained or loaded
    pub trained: bool,
    /// A training run is in progress
    pub training: bool,
    /// Completion of the current or last run, 0 to 100
    pub progress: u8,
    /// When the model was last trained or loaded
    pub last_trained: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_loss: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_nicknames: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`TrainingCoordinator::start_training`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new worker was spawned
    Started,
    /// A run is already in progress
    AlreadyRunning { progress: u8 },
}

/// Owns the background training worker, the status record and the generator
pub struct TrainingCoordinator {
    config: Arc<NicknameConfig>,
    segmenter: Arc<dyn Segmenter>,
    status: Arc<RwLock<ModelStatus>>,
    generator: NicknameGenerator,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TrainingCoordinator {
    /// Coordinator with the segmenter named in `config`
    ///
    /// Tries to load an existing snapshot from `config.model_path`; when that
    /// works the status starts out as trained.
    pub fn new(config: NicknameConfig) -> Self {
        let segmenter = config.segmenter.build();
        Self::with_segmenter(config, segmenter)
    }

    pub fn with_segmenter(config: NicknameConfig, segmenter: Arc<dyn Segmenter>) -> Self {
        let coordinator = Self {
            config: Arc::new(config),
            segmenter,
            status: Arc::new(RwLock::new(ModelStatus::default())),
            generator: NicknameGenerator::default(),
            worker: Mutex::new(None),
        };
        coordinator.load_existing();
        coordinator
    }

    fn load_existing(&self) {
        let path = &self.config.model_path;
        match self.load_snapshot() {
            Ok(()) => {
                log::info!("pre-trained model loaded from {}", path.display());
            }
            Err(NicknameError::NotFound { .. }) => {
                log::info!("no model at {}, training required", path.display());
            }
            Err(e) => {
                log::warn!("ignoring unusable model at {}: {}", path.display(), e);
            }
        }
    }

    /// Publish the snapshot at `model_path` and mark the status trained
    fn load_snapshot(&self) -> Result<()> {
        let model = NicknameModel::load(&self.config.model_path)?;
        self.generator.publish(model);
        let mut status = self.status.write();
        status.trained = true;
        status.last_trained = Some(now());
        Ok(())
    }

    /// Start a background training run unless one is already going
    ///
    /// # Errors
    ///
    /// Only when the worker thread cannot be spawned; the status is rolled
    /// back in that case.
    pub fn start_training(&self) -> Result<StartOutcome> {
        {
            let mut status = self.status.write();
            if status.training {
                log::info!("training already running ({}%)", status.progress);
                return Ok(StartOutcome::AlreadyRunning {
                    progress: status.progress,
                });
            }
            status.training = true;
            status.progress = 0;
            status.error = None;
        }

        let worker = Worker {
            config: Arc::clone(&self.config),
            segmenter: Arc::clone(&self.segmenter),
            status: Arc::clone(&self.status),
            generator: self.generator.clone(),
        };
        let spawned = thread::Builder::new()
            .name("nickname-training".to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                log::info!("training started");
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                let mut status = self.status.write();
                status.training = false;
                status.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Copy of the current status
    pub fn get_status(&self) -> ModelStatus {
        self.status.read().clone()
    }

    /// Generate nicknames from the latest trained, loaded or published model
    ///
    /// With no model loaded yet, the snapshot at `model_path` is tried first.
    ///
    /// # Errors
    ///
    /// [`NicknameError::ModelNotReady`] while there is neither a model nor a
    /// usable snapshot.
    pub fn generate(&self, request: &GenerateRequest) -> Result<Vec<String>> {
        if !self.generator.is_ready() {
            match self.load_snapshot() {
                Ok(()) => log::info!(
                    "model loaded on demand from {}",
                    self.config.model_path.display()
                ),
                Err(NicknameError::NotFound { .. }) => return Err(NicknameError::ModelNotReady),
                Err(e) => {
                    log::warn!("cannot load {}: {}", self.config.model_path.display(), e);
                    return Err(NicknameError::ModelNotReady);
                }
            }
        }
        self.generator.generate(request)
    }

    /// Block until the current worker, if any, has finished
    pub fn wait(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("training worker terminated abnormally");
            }
        }
    }

    pub fn config(&self) -> &NicknameConfig {
        &self.config
    }
}

impl Drop for TrainingCoordinator {
    fn drop(&mut self) {
        self.wait();
    }
}

/// Everything the worker thread needs, moved onto the thread
struct Worker {
    config: Arc<NicknameConfig>,
    segmenter: Arc<dyn Segmenter>,
    status: Arc<RwLock<ModelStatus>>,
    generator: NicknameGenerator,
}

impl Worker {
    fn run(self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            train(
                &self.config.corpus_path,
                &self.config.training,
                Some(self.config.model_path.as_path()),
                self.segmenter.as_ref(),
                |report| self.report(report),
            )
        }));

        let mut status = self.status.write();
        status.training = false;
        match outcome {
            Ok(Ok(model)) => {
                self.generator.publish(model);
                status.trained = true;
                status.progress = 100;
                status.last_trained = Some(now());
                log::info!("training finished");
            }
            Ok(Err(e)) => {
                log::error!("training failed: {}", e);
                status.error = Some(e.to_string());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("training panicked: {}", message);
                status.error = Some(message);
            }
        }
    }

    fn report(&self, report: &TrainingProgress<'_>) {
        self.generator.publish(NicknameModel::new(
            report.parameters.clone(),
            report.vocab.clone(),
        ));

        let mut status = self.status.write();
        status.progress = report.percent();
        status.current_loss = Some(report.smoothed_loss);
        if !report.samples.is_empty() {
            status.sample_nicknames = Some(report.samples.to_vec());
        }
    }
}

fn now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "training worker panicked".to_string()
    }
}
