use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::AssetError;
use crate::storage::{AssetReader, AssetStore};

/// Asset store rooted at a local directory. Keys are `/`-separated paths
/// relative to the root.
pub struct FileAssetStore {
    root: PathBuf,
}

impl FileAssetStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key to its location under the root, refusing absolute paths
    /// and any `..` or `.` component.
    fn resolve(&self, key: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(key);
        if key.is_empty() || key.contains('\\') {
            return Err(AssetError::InvalidKey(key.to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(AssetError::InvalidKey(key.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), AssetError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| AssetError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Creates the file exclusively, stepping through `name_2.ext`,
    /// `name_3.ext`, ... while the name is taken.
    fn create_unique(&self, dir_path: &Path, filename: &str) -> Result<(PathBuf, File), AssetError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = dir_path.join(&try_filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(file) => return Ok((try_path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(AssetError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(AssetError::NameExhausted(dir_path.join(filename)))
    }

    fn key_for(&self, path: &Path) -> Result<String, AssetError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| AssetError::InvalidKey(path.display().to_string()))?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }
}

impl AssetStore for FileAssetStore {
    fn save(&self, name: &str, content: &mut dyn Read) -> Result<String, AssetError> {
        let target = self.resolve(name)?;
        let dir_path = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let filename = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AssetError::InvalidKey(name.to_string()))?;

        self.ensure_directory(&dir_path)?;
        let (path, mut file) = self.create_unique(&dir_path, filename)?;

        if let Err(e) = std::io::copy(content, &mut file) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(AssetError::WriteFile { path, source: e });
        }

        self.key_for(&path)
    }

    fn open(&self, key: &str) -> Result<AssetReader, AssetError> {
        let path = self.resolve(key)?;
        let file = File::open(&path).map_err(|e| AssetError::Open {
            key: key.to_string(),
            source: e,
        })?;
        Ok(Box::new(file))
    }

    fn delete(&self, key: &str) -> Result<(), AssetError> {
        let path = self.resolve(key)?;
        std::fs::remove_file(&path).map_err(|e| AssetError::Delete {
            key: key.to_string(),
            source: e,
        })
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.resolve(key).ok()
    }
}
