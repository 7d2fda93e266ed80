//! Per-class persistence of feature collections.
//!
//! One key per class label, exact match. A `put` replaces the whole entry;
//! entries are never partially updated.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::geometric::features::ClassFeatureCollection;

/// File extension used by [`DirectoryBlobStore`]
pub const GEOJSON_EXTENSION: &str = "geojson";

/// Key → blob storage backing the feature store
pub trait BlobStore: Send + Sync {
    /// Store `blob` under `key`, replacing any previous value
    fn put(&self, key: &str, blob: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Returns whether a value was present
    fn remove(&self, key: &str) -> Result<bool>;
    /// Stored keys in lexicographic order
    fn keys(&self) -> Result<Vec<String>>;
}

/// Keys become file names, so only `[A-Za-z0-9_-]` is accepted
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        bail!("Store key must not be empty");
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        bail!("Store key '{}' contains invalid character {:?}", key, bad);
    }
    Ok(())
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        MemoryBlobStore::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, blob: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.entries
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self
            .entries
            .read()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?
            .get(key)
            .cloned())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self
            .entries
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?
            .remove(key)
            .is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?
            .keys()
            .cloned()
            .collect())
    }
}

/// One `{key}.geojson` file per entry under a root directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written collection.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    root: PathBuf,
}

impl DirectoryBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .context(format!("Failed to create store directory: {:?}", root))?;
        Ok(DirectoryBlobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{}.{}", key, GEOJSON_EXTENSION)))
    }
}

impl BlobStore for DirectoryBlobStore {
    fn put(&self, key: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = self.root.join(format!(".{}.{}.tmp", key, GEOJSON_EXTENSION));
        std::fs::write(&tmp, blob).context(format!("Failed to write {:?}", tmp))?;
        std::fs::rename(&tmp, &path)
            .context(format!("Failed to move {:?} to {:?}", tmp, path))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to read {:?}", path)),
        }
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context(format!("Failed to remove {:?}", path)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .context(format!("Failed to list store directory: {:?}", self.root))?
        {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(GEOJSON_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Class label → feature collection store
#[derive(Debug)]
pub struct FeatureStore<S: BlobStore> {
    blobs: S,
}

impl<S: BlobStore> FeatureStore<S> {
    pub fn new(blobs: S) -> Self {
        FeatureStore { blobs }
    }

    pub fn blobs(&self) -> &S {
        &self.blobs
    }

    /// Serialize `collection` for storage under `label`. The collection must
    /// carry the same label.
    pub fn encode(label: &str, collection: &ClassFeatureCollection) -> Result<String> {
        if collection.label != label {
            bail!(
                "Cannot store collection '{}' under label '{}'",
                collection.label,
                label
            );
        }
        validate_key(label)?;
        collection.to_geojson_string()
    }

    /// Overwrite the entry for `label`
    pub fn put(&self, label: &str, collection: &ClassFeatureCollection) -> Result<()> {
        let text = Self::encode(label, collection)?;
        self.put_encoded(label, &text)?;
        log::debug!("Stored {} features under '{}'", collection.len(), label);
        Ok(())
    }

    /// Overwrite the entry for `label` with text from [`Self::encode`]
    pub fn put_encoded(&self, label: &str, text: &str) -> Result<()> {
        self.blobs
            .put(label, text.as_bytes())
            .context(format!("Failed to store feature collection '{}'", label))?;
        log::debug!("Wrote '{}' ({} bytes)", label, text.len());
        Ok(())
    }

    pub fn get(&self, label: &str) -> Result<Option<ClassFeatureCollection>> {
        let Some(bytes) = self.blobs.get(label)? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&bytes)
            .context(format!("Stored collection '{}' is not UTF-8", label))?;
        Ok(Some(ClassFeatureCollection::from_geojson_str(label, text)?))
    }

    pub fn remove(&self, label: &str) -> Result<bool> {
        self.blobs.remove(label)
    }

    pub fn labels(&self) -> Result<Vec<String>> {
        self.blobs.keys()
    }

    /// Collections stored for `labels`, in the given order. Missing labels are
    /// skipped.
    pub fn load_all<L: AsRef<str>>(&self, labels: &[L]) -> Result<Vec<ClassFeatureCollection>> {
        let mut collections = Vec::with_capacity(labels.len());
        for label in labels {
            match self.get(label.as_ref())? {
                Some(collection) => collections.push(collection),
                None => log::warn!("No feature collection stored for '{}'", label.as_ref()),
            }
        }
        Ok(collections)
    }
}
