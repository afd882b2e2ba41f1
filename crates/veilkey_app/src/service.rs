//! Upload-facing service layer.
//!
//! Takes raw uploads, validates them, stores them under fresh handles and
//! runs the core pipeline. Configuration is injected; the service keeps no
//! per-session state, so one instance can serve concurrent callers.

use crate::config::ServiceConfig;
use crate::report::{sha256_file, sha256_hex};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;
use veilkey_core::{Shape, StegoError};
use veilkey_io::{ArtifactKind, Handle, ScopedStore, StorageError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Please select the {0} file")]
    MissingFile(&'static str),

    #[error("Invalid file type for {field}: {file_name}")]
    InvalidExtension { field: &'static str, file_name: String },

    #[error("{field} upload is {size} bytes, over the {limit} byte limit")]
    TooLarge {
        field: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("Stored cover changed during key generation: {expected} became {actual}")]
    CoverModified { expected: String, actual: String },

    #[error(transparent)]
    Stego(#[from] StegoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// A file as received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Reads a local file as if it had been uploaded under its own name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(file_name, bytes))
    }

    fn extension(&self) -> Option<&str> {
        self.file_name.rsplit_once('.').map(|(_, ext)| ext)
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub session: Uuid,
    pub key: Handle,
    pub shape: Shape,
    pub resampled: bool,
    pub cover_sha256: String,
    pub key_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    pub session: Uuid,
    pub recovered: Handle,
    pub shape: Shape,
}

/// A file ready to be served.
#[derive(Debug, Clone)]
pub struct Download {
    pub path: PathBuf,
    pub file_name: String,
}

pub struct StegoService {
    config: ServiceConfig,
    store: ScopedStore,
}

impl StegoService {
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let store = ScopedStore::open(&config.store_roots())?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Sender side: stores both images and produces a downloadable key.
    pub fn send(&self, cover: &Upload, secret: &Upload) -> ServiceResult<SendOutcome> {
        self.check_image(cover, "cover")?;
        self.check_image(secret, "secret")?;

        let session = Uuid::new_v4();
        let span = info_span!("send", %session);
        let _guard = span.enter();

        let cover_sha256 = sha256_hex(&cover.bytes);
        let cover_path = self.store_upload(cover)?;
        let secret_path = self.store_upload(secret)?;
        let key = self.store.allocate(ArtifactKind::Key);

        let report = veilkey_core::process_sender(
            &cover_path,
            &secret_path,
            &key.path,
            &self.config.sender_options(),
        )
        .inspect_err(|e| warn!(error = %e, "key generation failed"))?;

        ensure_unchanged(&cover_path, &cover_sha256)?;
        let key_sha256 = sha256_file(&key.path).map_err(StorageError::Io)?;

        if report.resampled {
            info!(
                from = %report.secret_shape,
                to = %report.shape,
                "secret resampled to cover shape"
            );
        }
        info!(key = %key.handle, shape = %report.shape, "stego key generated");

        Ok(SendOutcome {
            session,
            key: key.handle,
            shape: report.shape,
            resampled: report.resampled,
            cover_sha256,
            key_sha256,
        })
    }

    /// Receiver side: recovers the secret from a cover and an uploaded key.
    pub fn receive(&self, cover: &Upload, key: &Upload) -> ServiceResult<ReceiveOutcome> {
        self.check_image(cover, "cover")?;
        self.check_key(key)?;

        let session = Uuid::new_v4();
        let span = info_span!("receive", %session);
        let _guard = span.enter();

        let cover_path = self.store_upload(cover)?;
        let key_handle = self.store.write(ArtifactKind::Key, &key.bytes)?;
        let key_path = self.store.resolve(&key_handle)?;
        let recovered = self.store.allocate(ArtifactKind::Recovered);

        let image = veilkey_core::process_receiver(
            &cover_path,
            &key_path,
            &recovered.path,
            self.config.color_mode,
        )
        .inspect_err(|e| warn!(error = %e, "recovery failed"))?;

        info!(recovered = %recovered.handle, shape = %image.shape(), "secret recovered");

        Ok(ReceiveOutcome {
            session,
            recovered: recovered.handle,
            shape: image.shape(),
        })
    }

    /// PSNR of a previously recovered image against a reference upload.
    pub fn verify(&self, recovered: &Handle, reference: &Upload) -> ServiceResult<f64> {
        self.check_image(reference, "reference")?;
        if recovered.kind() != ArtifactKind::Recovered {
            return Err(StorageError::InvalidHandle(recovered.to_string()).into());
        }

        let recovered_path = self.store.resolve(recovered)?;
        let reference_path = self.store_upload(reference)?;

        // The recovered file is saved in the layout of its cover, so load
        // both sides with the configured mode.
        let mode = self.config.color_mode;
        let value = veilkey_core::verify(&reference_path, &recovered_path, mode)?;
        info!(%recovered, psnr = value, "verified recovery");
        Ok(value)
    }

    /// Resolves an externally supplied handle string to a servable file.
    pub fn download(&self, handle: &str) -> ServiceResult<Download> {
        let (handle, path) = self.store.resolve_download(handle)?;
        Ok(Download {
            path,
            file_name: handle.file_name(),
        })
    }

    fn store_upload(&self, upload: &Upload) -> ServiceResult<PathBuf> {
        let handle = self.store.write(ArtifactKind::Upload, &upload.bytes)?;
        Ok(self.store.resolve(&handle)?)
    }

    fn check_size(&self, upload: &Upload, field: &'static str) -> ServiceResult<()> {
        let size = upload.bytes.len() as u64;
        let limit = self.config.max_upload_bytes;
        if size > limit {
            return Err(ServiceError::TooLarge { field, size, limit });
        }
        if size == 0 {
            return Err(ServiceError::MissingFile(field));
        }
        Ok(())
    }

    fn check_image(&self, upload: &Upload, field: &'static str) -> ServiceResult<()> {
        if upload.file_name.is_empty() {
            return Err(ServiceError::MissingFile(field));
        }
        match upload.extension() {
            Some(ext) if self.config.is_allowed_extension(ext) => {}
            _ => {
                return Err(ServiceError::InvalidExtension {
                    field,
                    file_name: upload.file_name.clone(),
                });
            }
        }
        self.check_size(upload, field)
    }

    fn check_key(&self, upload: &Upload) -> ServiceResult<()> {
        if upload.file_name.is_empty() {
            return Err(ServiceError::MissingFile("key"));
        }
        match upload.extension() {
            Some(ext) if ext.eq_ignore_ascii_case(&self.config.key_extension) => {}
            _ => {
                return Err(ServiceError::InvalidExtension {
                    field: "key",
                    file_name: upload.file_name.clone(),
                });
            }
        }
        self.check_size(upload, "key")
    }
}

/// Re-hashes `path` and fails unless it still has the digest `expected`.
fn ensure_unchanged(path: &Path, expected: &str) -> ServiceResult<()> {
    let actual = sha256_file(path).map_err(StorageError::Io)?;
    if actual != expected {
        warn!(%expected, %actual, "stored cover changed");
        return Err(ServiceError::CoverModified {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use veilkey_core::raster::ImageFormat;
    use veilkey_core::{keystore, raster, ColorMode, RasterImage, StegoKey};

    fn service() -> (TempDir, StegoService) {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig {
            data_dir: dir.path().to_path_buf(),
            ..ServiceConfig::default()
        };
        (dir, StegoService::new(config).unwrap())
    }

    fn png_upload(name: &str, shape: Shape, seed: u8) -> (Upload, RasterImage) {
        let data = (0..shape.len())
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect();
        let img = RasterImage::from_raw(shape, data).unwrap();
        let bytes = raster::encode(&img, ImageFormat::Png).unwrap();
        (Upload::new(name, bytes), img)
    }

    #[test]
    fn test_send_receive_download() {
        let (_dir, svc) = service();
        let shape = Shape::new(9, 7, 3);
        let (cover, _) = png_upload("cover.PNG", shape, 3);
        let (secret, secret_img) = png_upload("secret.png", shape, 100);

        let sent = svc.send(&cover, &secret).unwrap();
        assert_eq!(sent.shape, shape);
        assert!(!sent.resampled);
        assert_eq!(sent.cover_sha256, sha256_hex(&cover.bytes));

        let key_file = svc.download(&sent.key.to_string()).unwrap();
        assert!(key_file.file_name.ends_with(".npy"));
        let key_upload = Upload::new("stego_key.npy", std::fs::read(&key_file.path).unwrap());

        let received = svc.receive(&cover, &key_upload).unwrap();
        let recovered = svc.download(&received.recovered.to_string()).unwrap();
        let recovered_img = raster::load(&recovered.path, ColorMode::Auto).unwrap();
        assert_eq!(recovered_img, secret_img);

        let psnr = svc.verify(&received.recovered, &secret).unwrap();
        assert!(psnr.is_infinite());
    }

    #[test]
    fn test_rejects_bad_extensions() {
        let (_dir, svc) = service();
        let (cover, _) = png_upload("cover.gif", Shape::new(2, 2, 1), 0);
        let (secret, _) = png_upload("secret.png", Shape::new(2, 2, 1), 0);

        assert!(matches!(
            svc.send(&cover, &secret),
            Err(ServiceError::InvalidExtension { field: "cover", .. })
        ));

        let (cover, _) = png_upload("cover.png", Shape::new(2, 2, 1), 0);
        let key = Upload::new("key.txt", vec![1, 2, 3]);
        assert!(matches!(
            svc.receive(&cover, &key),
            Err(ServiceError::InvalidExtension { field: "key", .. })
        ));
    }

    #[test]
    fn test_rejects_missing_and_oversized() {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig {
            data_dir: dir.path().to_path_buf(),
            max_upload_bytes: 40,
            ..ServiceConfig::default()
        };
        let svc = StegoService::new(config).unwrap();
        let (big, _) = png_upload("big.png", Shape::new(32, 32, 3), 9);
        let (small, _) = png_upload("s.png", Shape::new(1, 1, 1), 9);

        assert!(matches!(
            svc.send(&big, &small),
            Err(ServiceError::TooLarge { field: "cover", .. })
        ));
        assert!(matches!(
            svc.send(&Upload::new("", vec![]), &small),
            Err(ServiceError::MissingFile("cover"))
        ));
    }

    #[test]
    fn test_receive_with_mismatched_key() {
        let (_dir, svc) = service();
        let (cover, _) = png_upload("cover.png", Shape::new(4, 4, 3), 1);
        let key = StegoKey::from_raw(Shape::new(4, 5, 3), vec![0; 60]).unwrap();
        let key_upload = Upload::new("k.npy", keystore::to_bytes(&key));

        let result = svc.receive(&cover, &key_upload);

        assert!(matches!(
            result,
            Err(ServiceError::Stego(StegoError::ShapeMismatch { .. }))
        ));
    }

    #[test]
    fn test_receive_with_corrupt_key() {
        let (_dir, svc) = service();
        let (cover, _) = png_upload("cover.png", Shape::new(4, 4, 1), 1);
        let key_upload = Upload::new("k.npy", b"\x93NUMPY garbage".to_vec());

        assert!(matches!(
            svc.receive(&cover, &key_upload),
            Err(ServiceError::Stego(StegoError::KeyFormat(_)))
        ));
    }

    #[test]
    fn test_download_rejects_paths() {
        let (_dir, svc) = service();
        for text in ["../../etc/passwd", "keys/whatever.npy", "upload-x"] {
            assert!(matches!(
                svc.download(text),
                Err(ServiceError::Storage(StorageError::InvalidHandle(_)))
            ));
        }
    }

    #[test]
    fn test_resampled_secret_reported() {
        let (_dir, svc) = service();
        let (cover, _) = png_upload("cover.png", Shape::new(6, 6, 3), 1);
        let (secret, _) = png_upload("secret.jpg", Shape::new(3, 4, 3), 2);

        let sent = svc.send(&cover, &secret).unwrap();

        assert!(sent.resampled);
        assert_eq!(sent.shape, Shape::new(6, 6, 3));
        assert_eq!(raster::decode(&cover.bytes, ColorMode::Auto).unwrap().shape(), sent.shape);
    }

    #[test]
    fn test_upload_extension() {
        assert_eq!(Upload::new("a.b.PNG", vec![]).extension(), Some("PNG"));
        assert_eq!(Upload::new("noext", vec![]).extension(), None);
    }

    #[test]
    fn test_changed_cover_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cover.bin");
        std::fs::write(&path, b"cover").unwrap();

        assert!(ensure_unchanged(&path, &sha256_hex(b"cover")).is_ok());

        std::fs::write(&path, b"tampered").unwrap();
        let result = ensure_unchanged(&path, &sha256_hex(b"cover"));
        assert!(matches!(result, Err(ServiceError::CoverModified { .. })));
    }
}
