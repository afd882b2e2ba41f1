use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use veilkey_core::{ColorMode, ReconcilePolicy, SenderOptions};
use veilkey_io::StoreRoots;

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;
const DEFAULT_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Settings for the service layer. Every field has a default, so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Base directory for relative artifact directories.
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub keys_dir: PathBuf,
    pub recovered_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// Lower-case image extensions accepted for uploads.
    pub allowed_extensions: Vec<String>,
    pub key_extension: String,
    pub reconcile: ReconcilePolicy,
    pub color_mode: ColorMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./veilkey-data"),
            uploads_dir: PathBuf::from("uploads"),
            keys_dir: PathBuf::from("keys"),
            recovered_dir: PathBuf::from("recovered"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            key_extension: veilkey_core::keystore::KEY_EXTENSION.to_string(),
            reconcile: ReconcilePolicy::default(),
            color_mode: ColorMode::default(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn store_roots(&self) -> StoreRoots {
        StoreRoots {
            uploads: self.data_dir.join(&self.uploads_dir),
            keys: self.data_dir.join(&self.keys_dir),
            recovered: self.data_dir.join(&self.recovered_dir),
        }
    }

    pub fn sender_options(&self) -> SenderOptions {
        SenderOptions {
            color_mode: self.color_mode,
            policy: self.reconcile,
        }
    }

    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}
