//! Model Snapshots
//!
//! A snapshot bundles everything needed to generate nicknames later: the five
//! parameter tensors, the vocabulary, and a little training metadata.
//!
//! ## File Layout
//!
//! Little-endian binary:
//!
//! ```text
//! "NICKRNN1"                magic, 8 bytes
//! version                   u8 (currently 1)
//! 5 × tensor                Wax, Waa, Wya, b, by
//!     rank                  u32
//!     dims                  rank × u32
//!     len                   u32
//!     data                  len × f32
//! vocabulary                u32 length + JSON array of tokens in index order
//! metadata                  u32 length + JSON object
//! ```
//!
//! Floats are stored as raw bits, so a load right after a save reproduces
//! every tensor exactly.
//!
//! ## Atomic Writes
//!
//! [`NicknameModel::save`] writes to `<path>.tmp`, flushes and syncs it, then
//! renames it over `<path>`. A reader never sees a half-written snapshot, and
//! a failed write leaves the previous snapshot in place.
//!
//! ## Example
//!
//! ```rust,no_run
//! use nickname_rnn::{NicknameModel, Parameters, Vocabulary};
//!
//! let vocab = Vocabulary::from_tokens(["小", "猫", "\n"]);
//! let model = NicknameModel::new(Parameters::initialize(50, vocab.len()), vocab);
//!
//! model.save("nickname_model.bin", 0, 0.0)?;
//! let restored = NicknameModel::load("nickname_model.bin")?;
//! assert_eq!(restored, model);
//! # Ok::<(), nickname_rnn::NicknameError>(())
//! ```

use crate::error::{NicknameError, Result};
use crate::params::Parameters;
use crate::tensor::Tensor;
use crate::vocab::Vocabulary;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"NICKRNN1";
const VERSION: u8 = 1;

/// Trained parameters plus the vocabulary they were trained on
#[derive(Clone, Debug, PartialEq)]
pub struct NicknameModel {
    pub params: Parameters,
    pub vocab: Vocabulary,
}

/// Training metadata stored next to the tensors
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Iterations completed when the snapshot was taken
    pub iterations: usize,
    /// Smoothed training loss at that point
    pub smoothed_loss: f32,
    pub hidden_size: usize,
    pub vocab_size: usize,
}

impl NicknameModel {
    pub fn new(params: Parameters, vocab: Vocabulary) -> Self {
        Self { params, vocab }
    }

    /// Write the snapshot atomically to `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Destination file
    /// * `iterations` - Iterations completed so far, recorded in the metadata
    /// * `smoothed_loss` - Current smoothed loss, recorded in the metadata
    pub fn save(&self, path: impl AsRef<Path>, iterations: usize, smoothed_loss: f32) -> Result<()> {
        let path = path.as_ref();
        let metadata = SnapshotMetadata {
            iterations,
            smoothed_loss,
            hidden_size: self.params.hidden_size(),
            vocab_size: self.params.vocab_size(),
        };

        let tmp = temp_path(path);
        let written = write_snapshot_file(&tmp, self, &metadata).and_then(|()| {
            fs::rename(&tmp, path)?;
            Ok(())
        });
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written?;

        log::info!(
            "saved model snapshot to {} ({} parameters, vocab {})",
            path.display(),
            self.params.count(),
            self.vocab.len()
        );
        Ok(())
    }

    /// Load a snapshot, discarding its metadata
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_metadata(path).map(|(model, _)| model)
    }

    /// Load a snapshot together with its metadata
    ///
    /// # Errors
    ///
    /// * [`NicknameError::NotFound`] when `path` does not exist
    /// * [`NicknameError::CorruptModel`] when the header, a tensor shape or
    ///   the vocabulary fails validation, or the file is truncated
    pub fn load_with_metadata(path: impl AsRef<Path>) -> Result<(Self, SnapshotMetadata)> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(NicknameError::not_found(path))
            }
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();

        let mut reader = SnapshotReader {
            inner: BufReader::new(file),
            remaining: file_len,
        };
        let (model, metadata) = reader.read_snapshot()?;

        log::info!(
            "loaded model snapshot from {} (hidden {}, vocab {}, {} iterations)",
            path.display(),
            metadata.hidden_size,
            metadata.vocab_size,
            metadata.iterations
        );
        Ok((model, metadata))
    }
}

/// `<path>.tmp`, next to the destination so the rename stays on one filesystem
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_snapshot_file(tmp: &Path, model: &NicknameModel, metadata: &SnapshotMetadata) -> Result<()> {
    let file = File::create(tmp)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION])?;

    let p = &model.params;
    for tensor in [&p.wax, &p.waa, &p.wya, &p.b, &p.by] {
        write_tensor(&mut writer, tensor)?;
    }

    let vocab_json = serde_json::to_vec(&model.vocab)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_block(&mut writer, &vocab_json)?;

    let metadata_json = serde_json::to_vec(metadata)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_block(&mut writer, &metadata_json)?;

    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn write_tensor<W: Write>(writer: &mut W, tensor: &Tensor) -> io::Result<()> {
    writer.write_all(&(tensor.shape.len() as u32).to_le_bytes())?;
    for &dim in &tensor.shape {
        writer.write_all(&(dim as u32).to_le_bytes())?;
    }
    writer.write_all(&(tensor.data.len() as u32).to_le_bytes())?;
    for &val in &tensor.data {
        writer.write_all(&val.to_le_bytes())?;
    }
    Ok(())
}

fn write_block<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)
}

fn corrupt(message: impl Into<String>) -> NicknameError {
    NicknameError::CorruptModel(message.into())
}

/// Reads snapshot fields while tracking how many bytes are left, so a bogus
/// length prefix cannot trigger a huge allocation
struct SnapshotReader<R: Read> {
    inner: R,
    remaining: u64,
}

impl<R: Read> SnapshotReader<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 > self.remaining {
            return Err(corrupt("file is truncated"));
        }
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => corrupt("file is truncated"),
            _ => NicknameError::Io(e),
        })?;
        self.remaining -= buf.len() as u64;
        Ok(())
    }

    fn read_u32(&mut self) -> Result<usize> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes) as usize)
    }

    fn read_tensor(&mut self, name: &str) -> Result<Tensor> {
        let rank = self.read_u32()?;
        if rank != 2 {
            return Err(corrupt(format!("{} has rank {}, expected 2", name, rank)));
        }
        let shape = vec![self.read_u32()?, self.read_u32()?];

        let len = self.read_u32()?;
        let expected = shape[0].checked_mul(shape[1]);
        if expected != Some(len) {
            return Err(corrupt(format!(
                "{} stores {} values for shape {:?}",
                name, len, shape
            )));
        }
        if (len as u64).saturating_mul(4) > self.remaining {
            return Err(corrupt("file is truncated"));
        }

        let mut bytes = vec![0u8; len * 4];
        self.read_exact(&mut bytes)?;
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Tensor::new(data, shape))
    }

    fn read_block(&mut self, what: &str) -> Result<Vec<u8>> {
        let len = self.read_u32()?;
        if len as u64 > self.remaining {
            return Err(corrupt(format!("{} block is truncated", what)));
        }
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_snapshot(&mut self) -> Result<(NicknameModel, SnapshotMetadata)> {
        let mut magic = [0u8; 8];
        self.read_exact(&mut magic)
            .map_err(|_| corrupt("missing snapshot header"))?;
        if &magic != MAGIC {
            return Err(corrupt("invalid header, expected NICKRNN1"));
        }

        let mut version = [0u8; 1];
        self.read_exact(&mut version)?;
        if version[0] != VERSION {
            return Err(corrupt(format!("unsupported version {}", version[0])));
        }

        let params = Parameters {
            wax: self.read_tensor("Wax")?,
            waa: self.read_tensor("Waa")?,
            wya: self.read_tensor("Wya")?,
            b: self.read_tensor("b")?,
            by: self.read_tensor("by")?,
        };
        params.validate_shapes().map_err(corrupt)?;

        let vocab_bytes = self.read_block("vocabulary")?;
        let vocab: Vocabulary = serde_json::from_slice(&vocab_bytes)
            .map_err(|e| corrupt(format!("vocabulary: {}", e)))?;
        if vocab.len() != params.vocab_size() {
            return Err(corrupt(format!(
                "vocabulary has {} tokens but the tensors expect {}",
                vocab.len(),
                params.vocab_size()
            )));
        }

        let metadata_bytes = self.read_block("metadata")?;
        let metadata: SnapshotMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| corrupt(format!("metadata: {}", e)))?;

        Ok((NicknameModel { params, vocab }, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn toy_model() -> NicknameModel {
        let vocab = Vocabulary::from_tokens(["苹", "果", "\n"]);
        let mut params = Parameters::initialize(6, vocab.len());
        params.b.data[2] = -0.125;
        params.by.data[1] = f32::MIN_POSITIVE;
        NicknameModel::new(params, vocab)
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let model = toy_model();

        model.save(&path, 5000, 3.25).unwrap();
        let (restored, meta) = NicknameModel::load_with_metadata(&path).unwrap();

        assert_eq!(restored, model);
        assert_eq!(meta.iterations, 5000);
        assert_eq!(meta.smoothed_loss, 3.25);
        assert_eq!(meta.hidden_size, 6);
        assert_eq!(meta.vocab_size, 3);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_save_replaces_existing_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut model = toy_model();
        model.save(&path, 1, 1.0).unwrap();

        model.params.wax.data[0] = 9.0;
        model.save(&path, 2, 1.0).unwrap();
        assert_eq!(NicknameModel::load(&path).unwrap().params.wax.data[0], 9.0);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let result = NicknameModel::load(dir.path().join("absent.bin"));
        assert!(matches!(result, Err(NicknameError::NotFound { .. })));
    }

    #[test]
    fn test_bad_header_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"NOTAMODEL-at-all").unwrap();
        assert!(matches!(
            NicknameModel::load(&path),
            Err(NicknameError::CorruptModel(_))
        ));

        fs::write(&path, b"NICK").unwrap();
        assert!(matches!(
            NicknameModel::load(&path),
            Err(NicknameError::CorruptModel(_))
        ));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        toy_model().save(&path, 0, 0.0).unwrap();

        let bytes = fs::read(&path).unwrap();
        for cut in [9, 20, bytes.len() / 2, bytes.len() - 1] {
            fs::write(&path, &bytes[..cut]).unwrap();
            assert!(
                matches!(NicknameModel::load(&path), Err(NicknameError::CorruptModel(_))),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_vocab_size_mismatch_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut model = toy_model();
        model.vocab = Vocabulary::from_tokens(["苹", "果"]);
        model.save(&path, 0, 0.0).unwrap();

        match NicknameModel::load(&path) {
            Err(NicknameError::CorruptModel(msg)) => assert!(msg.contains("vocabulary")),
            other => panic!("expected CorruptModel, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_mismatch_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut model = toy_model();
        model.params.wax = Tensor::zeros(vec![6, 4]);
        model.save(&path, 0, 0.0).unwrap();

        assert!(matches!(
            NicknameModel::load(&path),
            Err(NicknameError::CorruptModel(_))
        ));
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("model.bin");
        assert!(toy_model().save(&path, 0, 0.0).is_err());
        assert!(!temp_path(&path).exists());
    }
}
