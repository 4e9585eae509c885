//! Encoding rendered images into downloadable artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::RgbImage;

use crate::error::{Error, Result};

use super::Size;

/// MIME type shared by every artifact.
pub const PNG_MIME: &str = "image/png";

/// The three outputs produced per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Reconstruction at the preview size.
    Preview,
    /// Reconstruction at the original upload size.
    FullResolution,
    /// Before/after composite.
    Comparison,
}

impl ArtifactKind {
    /// Logical name, used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::FullResolution => "full resolution",
            Self::Comparison => "comparison",
        }
    }

    /// Download filename for an artifact of this kind with the given pixel size.
    ///
    /// Only the full-resolution name depends on the size.
    #[must_use]
    pub fn filename(&self, prefix: &str, size: Size) -> String {
        match self {
            Self::Preview => format!("{prefix}_preview.png"),
            Self::FullResolution => format!("{prefix}_full_{}x{}.png", size.width, size.height),
            Self::Comparison => format!("{prefix}_comparison.png"),
        }
    }
}

/// An encoded image ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub filename: String,
    pub mime_type: &'static str,
    pub size: Size,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Write the artifact into `dir` under its filename.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.filename);

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &self.bytes)?;
        if let Err(err) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }

        Ok(path)
    }
}

/// Encode `img` losslessly as PNG and name it.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn export(kind: ArtifactKind, img: &RgbImage, prefix: &str) -> Result<Artifact> {
    let size = Size::from(img.dimensions());

    let mut bytes = Vec::new();
    img.write_with_encoder(PngEncoder::new(&mut bytes))
        .map_err(|source| Error::Encode {
            name: kind.name().to_string(),
            source,
        })?;

    tracing::debug!(artifact = kind.name(), %size, len = bytes.len(), "Encoded artifact");

    Ok(Artifact {
        kind,
        filename: kind.filename(prefix, size),
        mime_type: PNG_MIME,
        size,
        bytes,
    })
}
