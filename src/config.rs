//! Service Configuration
//!
//! Where the corpus and the model snapshot live, how corpus lines are cut into
//! tokens, plus the training hyperparameters. Every field has a default, so a JSON file only needs the
//! values it changes:
//!
//! ```json
//! {
//!     "corpus_path": "data/nicknames.txt",
//!     "segmenter": "jieba",
//!     "training": { "iterations": 50000, "hidden_size": 64 }
//! }
//! ```

use crate::error::{NicknameError, Result};
use crate::segmenter::SegmenterKind;
use crate::train::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default corpus file, one nickname per line
pub const DEFAULT_CORPUS_PATH: &str = "nicknames.txt";

/// Default snapshot file
pub const DEFAULT_MODEL_PATH: &str = "nickname_model.bin";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NicknameConfig {
    pub corpus_path: PathBuf,
    pub model_path: PathBuf,
    /// Corpus tokenization, `"char"` or `"jieba"`
    pub segmenter: SegmenterKind,
    pub training: TrainingConfig,
}

impl Default for NicknameConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            segmenter: SegmenterKind::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl NicknameConfig {
    /// Read a JSON configuration file
    ///
    /// # Errors
    ///
    /// [`NicknameError::NotFound`] when the file is missing and
    /// [`NicknameError::Config`] when it is not valid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => NicknameError::not_found(path),
            _ => NicknameError::Io(e),
        })?;
        let config = Self::from_json(&text)
            .map_err(|e| NicknameError::Config(format!("{}: {}", path.display(), e)))?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| NicknameError::Config(e.to_string()))?;
        config.training.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = NicknameConfig::from_json("{}").unwrap();
        assert_eq!(config, NicknameConfig::default());
        assert_eq!(config.training.iterations, 20_000);
        assert_eq!(config.model_path, PathBuf::from("nickname_model.bin"));
        assert_eq!(config.segmenter, SegmenterKind::Char);
    }

    #[test]
    fn test_segmenter_selection() {
        let config = NicknameConfig::from_json(r#"{"segmenter": "jieba"}"#).unwrap();
        assert_eq!(config.segmenter, SegmenterKind::Jieba);
        assert!(matches!(
            NicknameConfig::from_json(r#"{"segmenter": "bytes"}"#),
            Err(NicknameError::Config(_))
        ));
    }

    #[test]
    fn test_partial_override() {
        let config = NicknameConfig::from_json(
            r#"{"corpus_path": "names.txt", "training": {"hidden_size": 8, "append_end_token": true}}"#,
        )
        .unwrap();
        assert_eq!(config.corpus_path, PathBuf::from("names.txt"));
        assert_eq!(config.training.hidden_size, 8);
        assert!(config.training.append_end_token);
        assert_eq!(config.training.learning_rate, 0.01);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            NicknameConfig::from_json(r#"{"training": {"learning_rate": -1.0}}"#),
            Err(NicknameError::Config(_))
        ));
        assert!(matches!(
            NicknameConfig::from_json("not json"),
            Err(NicknameError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(matches!(
            NicknameConfig::from_file(&path),
            Err(NicknameError::NotFound { .. })
        ));

        std::fs::write(&path, r#"{"model_path": "m.bin"}"#).unwrap();
        let config = NicknameConfig::from_file(&path).unwrap();
        assert_eq!(config.model_path, PathBuf::from("m.bin"));
    }
}
