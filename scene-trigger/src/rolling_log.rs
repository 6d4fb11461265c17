/// Rolling loudness log
///
/// Batches loudness values and, once per full batch, appends one CSV line
/// `timestamp,average,max` to the log file. The line is also handed back so
/// the caller can echo it. Purely a side channel: nothing here feeds back
/// into trigger decisions.

use crate::loudness::Loudness;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Log file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// CSV file the summaries are appended to
    pub path: PathBuf,

    /// Values per summary line. Follows the trigger window, never read
    /// from the config file.
    #[serde(skip)]
    pub window: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output.csv"),
            window: 100,
        }
    }
}

pub struct RollingLogger {
    path: PathBuf,
    window: usize,
    batch: Vec<Loudness>,
}

impl RollingLogger {
    pub fn new(config: &LogConfig) -> Self {
        let window = config.window.max(1);
        Self {
            path: config.path.clone(),
            window,
            batch: Vec::with_capacity(window),
        }
    }

    /// Add one value. Returns the summary line when the batch completes.
    pub fn record(&mut self, loudness: Loudness) -> Option<String> {
        self.record_at(loudness, Local::now().naive_local())
    }

    /// `record` with an explicit timestamp
    pub fn record_at(&mut self, loudness: Loudness, now: NaiveDateTime) -> Option<String> {
        self.batch.push(loudness);
        if self.batch.len() < self.window {
            return None;
        }

        let sum: f64 = self.batch.iter().sum();
        let average = (sum / self.batch.len() as f64) as i64;
        let max = self.batch.iter().copied().fold(0.0, f64::max) as i64;
        self.batch.clear();

        let line = format!("{},{},{}", now.format("%Y-%m-%d %H:%M:%S"), average, max);

        if let Err(e) = append_line(&self.path, &line) {
            warn!("Failed to append to {}: {}", self.path.display(), e);
        }

        Some(line)
    }

    /// Values waiting for the current batch to fill
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}
