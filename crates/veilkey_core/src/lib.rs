//! Zero-steganography: hide a secret image as a signed difference key against
//! an unmodified cover image, and recover it from the cover plus the key.

pub mod engine;
mod error;
pub mod io;
pub mod keystore;
pub mod pipeline;
pub mod quality;
pub mod raster;
pub mod reconcile;
mod types;

pub use engine::{generate, recover};
pub use error::{Result, StegoError};
pub use pipeline::{
    process_receiver, process_sender, verify, ReconcilePolicy, SenderOptions, SenderReport,
};
pub use quality::psnr;
pub use raster::ColorMode;
pub use reconcile::reconcile;
pub use types::{RasterImage, RecoveredImage, Shape, StegoKey, MAX_KEY_MAGNITUDE};
