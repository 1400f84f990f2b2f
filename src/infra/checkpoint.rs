// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// One file per finished epoch holding everything needed to
// continue training exactly where it stopped:
//
//   TrainingCheckpoint
//     format_version   — layout version, currently 1
//     epoch            — last completed epoch
//     global_step      — optimizer steps taken so far
//     skipped_steps    — batches dropped for non-finite loss
//     train_stats      — running training accumulator
//     model_state      — Burn model record (bytes)
//     optimizer_state  — Burn optimizer record (bytes)
//     schedule_state   — Noam schedule, if one is used
//
// The envelope is bincode-encoded. Tensors inside the two
// state blobs are produced by Burn's BinBytesRecorder in the
// ML layer; this file never touches Burn.
//
// File naming convention:
//   <checkpoints_dir>/<model_dir>/
//     <basename>_00.ckpt     ← after epoch 0
//     <basename>_01.ckpt     ← after epoch 1
//     ...
//     train_config.json      ← hyperparameters for inference
//
// Writes go to `<file>.tmp` first and are renamed into place,
// so a crash never leaves a half-written checkpoint behind.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::{schedule::NoamSchedule, stats::StatsAccumulator};

/// Current checkpoint layout version
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

const CHECKPOINT_EXTENSION: &str = "ckpt";
const CONFIG_FILE: &str = "train_config.json";

// ─── TrainingCheckpoint ───────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingCheckpoint {
    /// Must stay the first field: it is read on its own before
    /// the rest of the record is decoded.
    pub format_version:  u32,
    pub epoch:           usize,
    pub global_step:     usize,
    pub skipped_steps:   usize,
    pub train_stats:     StatsAccumulator,
    pub model_state:     Vec<u8>,
    pub optimizer_state: Vec<u8>,
    pub schedule_state:  Option<NoamSchedule>,
}

impl TrainingCheckpoint {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("Cannot encode checkpoint")
    }

    /// Decode a checkpoint, refusing layouts newer than this build.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let version: u32 = bincode::deserialize(bytes)
            .context("Checkpoint is truncated: no format version")?;
        if version > CHECKPOINT_FORMAT_VERSION {
            bail!(
                "Checkpoint format version {} is newer than the supported version {}",
                version,
                CHECKPOINT_FORMAT_VERSION
            );
        }

        bincode::deserialize(bytes).context("Checkpoint is corrupt")
    }
}

// ─── CheckpointStore ──────────────────────────────────────────────────────────
/// Epoch-indexed checkpoint files with a retention limit.
pub struct CheckpointStore {
    dir:      PathBuf,
    basename: String,
    /// Newest files to keep after each save; 0 keeps everything
    keep:     usize,
}

impl CheckpointStore {
    /// Creates `<checkpoints_dir>/<model_dir>` if needed.
    pub fn new(
        checkpoints_dir: impl AsRef<Path>,
        model_dir:       impl AsRef<Path>,
        basename:        impl Into<String>,
        keep:            usize,
    ) -> Result<Self> {
        let dir = checkpoints_dir.as_ref().join(model_dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;

        Ok(Self { dir, basename: basename.into(), keep })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<basename>_<epoch:02>.ckpt`
    pub fn path_for(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{}_{:02}.{}", self.basename, epoch, CHECKPOINT_EXTENSION))
    }

    /// Write the checkpoint for `checkpoint.epoch`, then apply the
    /// retention limit. Returns the written path.
    pub fn save(&self, checkpoint: &TrainingCheckpoint) -> Result<PathBuf> {
        let path = self.path_for(checkpoint.epoch);
        let tmp  = path.with_extension(format!("{CHECKPOINT_EXTENSION}.tmp"));

        fs::write(&tmp, checkpoint.to_bytes()?)
            .with_context(|| format!("Failed to write checkpoint to '{}'", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move checkpoint into '{}'", path.display()))?;

        tracing::info!("Checkpoint saved: epoch {} → '{}'", checkpoint.epoch, path.display());

        if self.keep > 0 {
            self.ensure_retention(self.keep)?;
        }
        Ok(path)
    }

    /// Epoch numbers of all checkpoint files, ascending.
    pub fn list_epochs(&self) -> Result<Vec<usize>> {
        let prefix = format!("{}_", self.basename);
        let suffix = format!(".{CHECKPOINT_EXTENSION}");

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot list checkpoints in '{}'", self.dir.display()))?;

        let mut epochs = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };

            let epoch = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .and_then(|digits| digits.parse::<usize>().ok());
            if let Some(epoch) = epoch {
                epochs.push(epoch);
            }
        }

        epochs.sort_unstable();
        Ok(epochs)
    }

    /// Delete the oldest checkpoints until at most `limit` remain.
    /// Returns the removed epochs.
    pub fn ensure_retention(&self, limit: usize) -> Result<Vec<usize>> {
        let epochs = self.list_epochs()?;
        if epochs.len() <= limit {
            return Ok(Vec::new());
        }

        let excess  = epochs.len() - limit;
        let removed = epochs[..excess].to_vec();
        for &epoch in &removed {
            let path = self.path_for(epoch);
            fs::remove_file(&path)
                .with_context(|| format!("Cannot remove old checkpoint '{}'", path.display()))?;
            tracing::debug!("Removed old checkpoint: epoch {}", epoch);
        }
        Ok(removed)
    }

    pub fn load(&self, epoch: usize) -> Result<TrainingCheckpoint> {
        let path  = self.path_for(epoch);
        let bytes = fs::read(&path)
            .with_context(|| format!("Cannot read checkpoint '{}'", path.display()))?;

        TrainingCheckpoint::from_bytes(&bytes)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))
    }

    /// The checkpoint with the highest epoch, or None if there is none.
    pub fn load_latest(&self) -> Result<Option<TrainingCheckpoint>> {
        match self.list_epochs()?.last() {
            Some(&epoch) => {
                tracing::info!("Loading checkpoint from epoch {}", epoch);
                self.load(epoch).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Save the training configuration next to the checkpoints so
    /// the translator can rebuild the exact model architecture.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before 'translate'.",
                path.display()
            )
        })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Invalid training config in '{}'", path.display()))
    }
}
