//! Sender reports and file digests.
//!
//! A report records the SHA-256 of the cover as read before and after key
//! generation, which lets a third party confirm the cover was never modified.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use veilkey_core::SenderReport;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct SenderRecord {
    pub cover: String,
    pub secret: String,
    pub key: String,
    pub shape: String,
    pub secret_shape: String,
    pub resampled: bool,
    pub cover_sha256_before: String,
    pub cover_sha256_after: String,
    pub cover_unchanged: bool,
    pub key_sha256: String,
    pub generated_at: String,
}

impl SenderRecord {
    pub fn new(
        cover: &Path,
        secret: &Path,
        key: &Path,
        report: &SenderReport,
        cover_sha256_before: String,
    ) -> Result<Self> {
        let cover_sha256_after = sha256_file(cover)
            .with_context(|| format!("Failed to hash {}", cover.display()))?;
        let key_sha256 =
            sha256_file(key).with_context(|| format!("Failed to hash {}", key.display()))?;

        Ok(Self {
            cover: cover.display().to_string(),
            secret: secret.display().to_string(),
            key: key.display().to_string(),
            shape: report.shape.to_string(),
            secret_shape: report.secret_shape.to_string(),
            resampled: report.resampled,
            cover_unchanged: cover_sha256_before == cover_sha256_after,
            cover_sha256_before,
            cover_sha256_after,
            key_sha256,
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        veilkey_core::io::write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        Ok(())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
