//! Asset storage: videos, thumbnails, and the manager that ties them to
//! analysis owners.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AssetError;

pub mod filesystem;
pub mod thumbnail;

pub use filesystem::FileAssetStore;
pub use thumbnail::{FfmpegFrameExtractor, FrameExtractor};

/// Readable handle to a stored asset.
pub type AssetReader = Box<dyn Read + Send>;

/// Backend that persists assets under string keys.
pub trait AssetStore: Send + Sync {
    /// Stores `content` under `name` (or a suffixed variant if taken) and
    /// returns the key actually used.
    fn save(&self, name: &str, content: &mut dyn Read) -> Result<String, AssetError>;

    fn open(&self, key: &str) -> Result<AssetReader, AssetError>;

    fn delete(&self, key: &str) -> Result<(), AssetError>;

    /// Local filesystem location of the asset, when the backend has one.
    fn path(&self, key: &str) -> Option<PathBuf>;
}

/// A freshly stored asset.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub key: String,
    /// Where the asset lives; falls back to the key when the backend has no
    /// local path.
    pub location: String,
}

/// A derived thumbnail that has not been stored yet.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub name: String,
    pub jpeg: Vec<u8>,
}

/// Stores, opens and deletes analysis assets and derives thumbnails.
pub struct AssetManager {
    store: Arc<dyn AssetStore>,
    extractor: Arc<dyn FrameExtractor>,
}

impl AssetManager {
    pub fn new(store: Arc<dyn AssetStore>, extractor: Arc<dyn FrameExtractor>) -> Self {
        Self { store, extractor }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    /// Stores an uploaded video under `videos/owner_<id>/`.
    pub fn store_video(
        &self,
        owner_id: i64,
        file_name: &str,
        content: &mut dyn Read,
    ) -> Result<StoredAsset, AssetError> {
        let name = format!("videos/owner_{}/{}", owner_id, sanitize_file_name(file_name));
        self.save(&name, content)
    }

    /// Stores a thumbnail under `thumbnails/owner_<id>/`.
    pub fn store_thumbnail(
        &self,
        owner_id: i64,
        thumbnail: &Thumbnail,
    ) -> Result<StoredAsset, AssetError> {
        let name = format!("thumbnails/owner_{}/{}", owner_id, thumbnail.name);
        self.save(&name, &mut Cursor::new(thumbnail.jpeg.as_slice()))
    }

    /// Derives a JPEG thumbnail from the first decodable frame of `content`.
    pub fn extract_first_frame(
        &self,
        file_name: &str,
        content: &mut dyn Read,
    ) -> Result<Thumbnail, AssetError> {
        let file_name = sanitize_file_name(file_name);
        let suffix = Path::new(&file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let jpeg = thumbnail::thumbnail_from_stream(self.extractor.as_ref(), content, &suffix)?;
        Ok(Thumbnail {
            name: thumbnail_name(&file_name),
            jpeg,
        })
    }

    pub fn open(&self, key: &str) -> Result<AssetReader, AssetError> {
        self.store.open(key)
    }

    pub fn delete(&self, key: &str) -> Result<(), AssetError> {
        self.store.delete(key)
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.store.path(key)
    }

    fn save(&self, name: &str, content: &mut dyn Read) -> Result<StoredAsset, AssetError> {
        let key = self.store.save(name, content)?;
        let location = self
            .store
            .path(&key)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        log::debug!("Stored asset {}", key);
        Ok(StoredAsset { key, location })
    }
}

/// Reduces a client-supplied name to a safe final path component.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<stem>_thumb.jpg` for a video file name.
pub fn thumbnail_name(video_name: &str) -> String {
    let stem = Path::new(video_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    format!("{}_thumb.jpg", stem)
}
