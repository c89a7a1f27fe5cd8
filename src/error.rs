use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("text recognition failed: {0}")]
    Recognition(#[from] ort::Error),

    #[error("failed to read recognition keys {}: {source}", path.display())]
    Keys {
        path: PathBuf,
        source: std::io::Error,
    },

    #[cfg(feature = "tesseract")]
    #[error("tesseract backend: {0}")]
    Tesseract(String),
}
