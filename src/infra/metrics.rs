// ============================================================
// Layer 6 — Metrics Sinks
// ============================================================
// Implementations of the MetricsSink trait (Layer 3).
//
//   CsvMetricsSink — appends one row per scalar to metrics.csv
//   MemorySink     — keeps every scalar in a Vec (tests, tools)
//
// Scalar names written by the trainer:
//   train/loss, train/accuracy          every validation interval
//   valid/loss, valid/accuracy          every validation interval
//   valid_bleu/BLEU-1 … BLEU-4          every validation interval
//   learning_rate/group-0               every optimizer step
//   loss/train_batch_loss               every optimizer step
//
// Example CSV output:
//   step,name,value
//   0,learning_rate/group-0,0.000000
//   2999,train/loss,4.812300
//   2999,valid_bleu/BLEU-4,0.031200
//
// Grouped scalars are flattened to `<group>/<key>` so the file
// stays a plain three-column table that plots with any tool.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::traits::MetricsSink;

const CSV_HEADER: &str = "step,name,value";

// ─── CsvMetricsSink ───────────────────────────────────────────────────────────
pub struct CsvMetricsSink {
    csv_path: PathBuf,
    writer:   BufWriter<File>,
}

impl CsvMetricsSink {
    /// Open `<dir>/metrics.csv` for appending.
    /// Writes the header only if the file is new, so a resumed run
    /// keeps adding to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        let is_new   = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open metrics file '{}'", csv_path.display()))?;
        let mut writer = BufWriter::new(file);

        if is_new {
            writeln!(writer, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, writer })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn add_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        writeln!(self.writer, "{step},{name},{value:.6}")?;
        Ok(())
    }

    fn add_scalars(&mut self, group: &str, values: &[(String, f64)], step: usize) -> Result<()> {
        for (key, value) in values {
            writeln!(self.writer, "{step},{group}/{key},{value:.6}")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Cannot flush metrics to '{}'", self.csv_path.display()))
    }
}

// ─── MemorySink ───────────────────────────────────────────────────────────────
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    /// (name, value, step) in arrival order
    pub scalars: Vec<(String, f64, usize)>,
    pub flushes: usize,
}

impl MemorySink {
    /// Last value recorded for `name` at `step`.
    pub fn value(&self, name: &str, step: usize) -> Option<f64> {
        self.scalars
            .iter()
            .rev()
            .find(|(n, _, s)| n == name && *s == step)
            .map(|(_, v, _)| *v)
    }

    /// Every (step, value) recorded for `name`.
    pub fn series(&self, name: &str) -> Vec<(usize, f64)> {
        self.scalars
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, v, s)| (*s, *v))
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn add_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
        self.scalars.push((name.to_string(), value, step));
        Ok(())
    }

    fn add_scalars(&mut self, group: &str, values: &[(String, f64)], step: usize) -> Result<()> {
        for (key, value) in values {
            self.scalars.push((format!("{group}/{key}"), *value, step));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
