use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{content_type_for, validate_key, BlobError, BlobStore, StoredBlob};

/// Filesystem blob store: key `scans/123-leaf.jpg` lives at `<root>/scans/123-leaf.jpg`.
///
/// Writes go to a sibling temp file first and are hard-linked into place, so
/// a reader never observes a half-written image and an existing file is
/// never replaced. The content type is not
/// persisted separately; it is sniffed from the bytes on read.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn create(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<bool, BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension(format!("tmp-{}", rand::random::<u32>()));
        if let Err(e) = std::fs::write(&tmp, bytes) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        // link(2) fails with EEXIST instead of replacing the target
        let linked = std::fs::hard_link(&tmp, &path);
        let _ = std::fs::remove_file(&tmp);
        match linked {
            Ok(()) => {
                tracing::debug!(key, size = bytes.len(), "Blob stored");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, key: &str) -> Result<Option<StoredBlob>, BlobError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                let content_type = content_type_for(key, &bytes);
                Ok(Some(StoredBlob::new(bytes, content_type)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
