use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{validate_key, BlobError, BlobStore, StoredBlob};

/// In-process blob store. Content type is kept as supplied on `create`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn create(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<bool, BlobError> {
        validate_key(key)?;
        let mut blobs = self.blobs.write().map_err(|_| BlobError::LockPoisoned)?;
        match blobs.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(StoredBlob::new(bytes.to_vec(), content_type.to_string()));
                Ok(true)
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<StoredBlob>, BlobError> {
        validate_key(key)?;
        let blobs = self.blobs.read().map_err(|_| BlobError::LockPoisoned)?;
        Ok(blobs.get(key).cloned())
    }

    fn exists(&self, key: &str) -> Result<bool, BlobError> {
        validate_key(key)?;
        let blobs = self.blobs.read().map_err(|_| BlobError::LockPoisoned)?;
        Ok(blobs.contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        let mut blobs = self.blobs.write().map_err(|_| BlobError::LockPoisoned)?;
        blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_supplied_content_type() {
        let store = MemoryBlobStore::new();
        assert!(store.create("scans/1-a.heic", b"data", "image/heic").unwrap());
        let blob = store.get("scans/1-a.heic").unwrap().unwrap();
        assert_eq!(blob.content_type, "image/heic");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_removes_entry() {
        let store = MemoryBlobStore::new();
        store.create("scans/1-a.jpg", b"data", "image/jpeg").unwrap();
        store.delete("scans/1-a.jpg").unwrap();
        assert!(store.is_empty());
        assert!(store.get("scans/1-a.jpg").unwrap().is_none());
    }

    #[test]
    fn create_refuses_taken_key() {
        let store = MemoryBlobStore::new();
        assert!(store.create("scans/1-a.jpg", b"first", "image/jpeg").unwrap());
        assert!(!store.create("scans/1-a.jpg", b"second", "image/jpeg").unwrap());
        let blob = store.get("scans/1-a.jpg").unwrap().unwrap();
        assert_eq!(blob.bytes, b"first");
    }
}
