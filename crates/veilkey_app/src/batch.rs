//! Parallel key generation over a JSON manifest.
//!
//! Each entry is independent, so entries are handed to a rayon pool with no
//! coordination beyond the shared progress bar.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use veilkey_core::{process_sender, SenderOptions, SenderReport, StegoError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchEntry {
    pub cover: PathBuf,
    pub secret: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub entry: BatchEntry,
    pub error: StegoError,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub resampled: usize,
    pub failures: Vec<BatchFailure>,
}

/// Reads a manifest. Relative paths are taken relative to the manifest's
/// directory.
pub fn load_manifest(path: &Path) -> Result<Vec<BatchEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let mut entries: Vec<BatchEntry> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for entry in &mut entries {
        for p in [&mut entry.cover, &mut entry.secret, &mut entry.key] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
    Ok(entries)
}

pub fn run_batch(
    entries: Vec<BatchEntry>,
    options: SenderOptions,
    jobs: Option<usize>,
    show_progress: bool,
) -> Result<BatchSummary> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = jobs {
        builder = builder.num_threads(n);
    }
    let pool = builder.build().context("Failed to build worker pool")?;

    let pb = if show_progress {
        let pb = ProgressBar::new(entries.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("##-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let results: Vec<(usize, BatchEntry, Result<SenderReport, StegoError>)> = pool.install(|| {
        entries
            .into_par_iter()
            .enumerate()
            .map(|(index, entry)| {
                let result = process_sender(&entry.cover, &entry.secret, &entry.key, &options);
                pb.inc(1);
                (index, entry, result)
            })
            .collect()
    });
    pb.finish_and_clear();

    let mut summary = BatchSummary::default();
    for (index, entry, result) in results {
        match result {
            Ok(report) => {
                debug!(index, key = %entry.key.display(), shape = %report.shape, "batch entry done");
                summary.succeeded += 1;
                if report.resampled {
                    summary.resampled += 1;
                }
            }
            Err(error) => {
                warn!(index, cover = %entry.cover.display(), error = %error, "batch entry failed");
                summary.failures.push(BatchFailure {
                    index,
                    entry,
                    error,
                });
            }
        }
    }

    Ok(summary)
}
