//! First-frame extraction and JPEG thumbnail encoding.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::error::AssetError;
use crate::sanitize::redact_path;

/// JPEG quality used for every thumbnail.
pub const THUMBNAIL_QUALITY: u8 = 90;

/// Decodes the first frame of a video file.
pub trait FrameExtractor: Send + Sync {
    fn first_frame(&self, video: &Path) -> Result<DynamicImage, AssetError>;
}

/// Runs `ffmpeg` to grab frame one as PNG on stdout, then decodes it.
pub struct FfmpegFrameExtractor {
    binary: PathBuf,
}

impl FfmpegFrameExtractor {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn first_frame(&self, video: &Path) -> Result<DynamicImage, AssetError> {
        let output = Command::new(&self.binary)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .output()
            .map_err(|e| {
                AssetError::FrameExtraction(format!(
                    "Failed to execute {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AssetError::FrameExtraction(format!(
                "ffmpeg failed on {}: {}",
                redact_path(video),
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(AssetError::FrameExtraction(format!(
                "No decodable frame in {}",
                redact_path(video)
            )));
        }

        image::load_from_memory(&output.stdout)
            .map_err(|e| AssetError::FrameExtraction(format!("Failed to decode frame: {}", e)))
    }
}

/// Re-encodes a frame as JPEG at [`THUMBNAIL_QUALITY`].
pub fn encode_jpeg(frame: &DynamicImage) -> Result<Vec<u8>, AssetError> {
    let rgb = frame.to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, THUMBNAIL_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| AssetError::FrameExtraction(format!("Failed to encode thumbnail: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Copies `source` into a scoped temporary file, extracts its first frame
/// and returns the JPEG bytes. The temporary file is removed on every path.
pub fn thumbnail_from_stream(
    extractor: &dyn FrameExtractor,
    source: &mut dyn Read,
    suffix: &str,
) -> Result<Vec<u8>, AssetError> {
    let mut staged = tempfile::Builder::new()
        .prefix("larvixon-frame-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| AssetError::FrameExtraction(format!("Failed to create temp file: {}", e)))?;

    std::io::copy(source, &mut staged)
        .map_err(|e| AssetError::FrameExtraction(format!("Failed to read upload: {}", e)))?;
    staged
        .flush()
        .map_err(|e| AssetError::FrameExtraction(format!("Failed to flush temp file: {}", e)))?;

    let frame = extractor.first_frame(staged.path())?;
    encode_jpeg(&frame)
}
