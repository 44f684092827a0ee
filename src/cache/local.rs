//! Filesystem cache store
//!
//! Entries are immutable once written. Each one lives in a directory named
//! after a digest of its key:
//!
//! ```text
//! <store>/<sha256(key)[..16]>/
//!   entry.json        key, creation time, original paths, totals
//!   paths/0/...       copy of the first saved path
//!   paths/1/...
//! ```
//!
//! Saves are staged in a uuid-named sibling directory and renamed into
//! place, so a concurrent writer of the same key loses the rename and gets
//! an "already exists" failure.

use crate::cache::backend::CacheBackend;
use crate::cache::key::CacheKey;
use crate::error::{StepCacheError, StepCacheResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Metadata file inside every entry directory
pub const ENTRY_METADATA: &str = "entry.json";

const PATHS_DIR: &str = "paths";
const STAGING_PREFIX: &str = ".staging-";

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// A stored cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the entry was saved under
    pub key: CacheKey,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
    /// Paths as they were passed to `save`
    pub paths: Vec<PathBuf>,
    /// Number of files (including symlinks) in the entry
    pub files: u64,
    /// Total size of regular files in bytes
    pub size_bytes: u64,
}

/// Cache backend keeping entries in a local directory
#[derive(Debug, Clone)]
pub struct LocalCacheBackend {
    store_dir: PathBuf,
}

impl LocalCacheBackend {
    /// Create a backend rooted at `store_dir`
    ///
    /// The directory is created on first save.
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }

    /// Root directory of the store
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.as_str().as_bytes());
        self.store_dir.join(hex::encode(&digest[..8]))
    }

    /// Look up the metadata of the entry stored under `key`
    pub async fn entry(&self, key: &CacheKey) -> StepCacheResult<Option<CacheEntry>> {
        let path = self.entry_dir(key).join(ENTRY_METADATA);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StepCacheError::io(
                    format!("reading {}", path.display()),
                    e,
                ))
            }
        };

        let entry: CacheEntry = serde_json::from_str(&content)?;
        // Digest prefixes can collide, the stored key is authoritative
        if &entry.key != key {
            debug!("Entry at {} belongs to key {}", path.display(), entry.key);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// List all entries, sorted by key
    pub async fn list(&self) -> StepCacheResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.store_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => {
                return Err(StepCacheError::io(
                    format!("listing {}", self.store_dir.display()),
                    e,
                ))
            }
        };

        while let Some(child) = dir
            .next_entry()
            .await
            .map_err(|e| StepCacheError::io(format!("listing {}", self.store_dir.display()), e))?
        {
            if child.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            let metadata_path = child.path().join(ENTRY_METADATA);
            let Ok(content) = fs::read_to_string(&metadata_path).await else {
                continue;
            };
            match serde_json::from_str::<CacheEntry>(&content) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "Skipping unreadable cache entry {}: {}",
                    metadata_path.display(),
                    e
                ),
            }
        }

        entries.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        Ok(entries)
    }

    /// Delete the entry stored under `key`
    pub async fn remove(&self, key: &CacheKey) -> StepCacheResult<()> {
        if self.entry(key).await?.is_none() {
            return Err(StepCacheError::CacheEntryNotFound(key.to_string()));
        }

        let dir = self.entry_dir(key);
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| StepCacheError::io(format!("removing {}", dir.display()), e))
    }

    /// Delete every entry, returning how many were removed
    pub async fn clear(&self) -> StepCacheResult<usize> {
        let count = self.list().await?.len();

        match fs::remove_dir_all(&self.store_dir).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StepCacheError::io(
                format!("removing {}", self.store_dir.display()),
                e,
            )),
        }
    }

    async fn stage(&self, paths: &[PathBuf], key: &CacheKey, staging: &Path) -> StepCacheResult<()> {
        let sources = paths.to_vec();
        let target = staging.join(PATHS_DIR);

        let stats = tokio::task::spawn_blocking(move || {
            let mut total = CopyStats::default();
            for (index, source) in sources.iter().enumerate() {
                let stats = copy_tree(source, &target.join(index.to_string()))?;
                total.files += stats.files;
                total.bytes += stats.bytes;
            }
            Ok::<_, std::io::Error>(total)
        })
        .await
        .map_err(|e| StepCacheError::Internal(format!("cache copy task failed: {}", e)))?
        .map_err(|e| StepCacheError::CacheSave {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let entry = CacheEntry {
            key: key.clone(),
            created_at: Utc::now(),
            paths: paths.to_vec(),
            files: stats.files,
            size_bytes: stats.bytes,
        };
        let metadata_path = staging.join(ENTRY_METADATA);
        fs::write(&metadata_path, serde_json::to_string_pretty(&entry)?)
            .await
            .map_err(|e| StepCacheError::io(format!("writing {}", metadata_path.display()), e))?;

        debug!(
            "Staged {} file(s), {} for key {}",
            entry.files,
            format_bytes(entry.size_bytes),
            key
        );
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for LocalCacheBackend {
    async fn restore(&self, paths: &[PathBuf], key: &CacheKey) -> StepCacheResult<Option<CacheKey>> {
        let Some(entry) = self.entry(key).await? else {
            return Ok(None);
        };

        if entry.paths.len() != paths.len() {
            debug!(
                "Entry {} holds {} path(s), {} requested; treating as miss",
                key,
                entry.paths.len(),
                paths.len()
            );
            return Ok(None);
        }

        let source = self.entry_dir(key).join(PATHS_DIR);
        let targets = paths.to_vec();
        tokio::task::spawn_blocking(move || restore_into(&source, &targets))
            .await
            .map_err(|e| StepCacheError::Internal(format!("cache copy task failed: {}", e)))?
            .map_err(|e| StepCacheError::CacheRestore {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(entry.key))
    }

    async fn save(&self, paths: &[PathBuf], key: &CacheKey) -> StepCacheResult<()> {
        let entry_dir = self.entry_dir(key);
        if fs::try_exists(&entry_dir).await.unwrap_or(false) {
            return Err(StepCacheError::CacheSave {
                key: key.to_string(),
                reason: "entry already exists".to_string(),
            });
        }

        fs::create_dir_all(&self.store_dir)
            .await
            .map_err(|e| StepCacheError::io(format!("creating {}", self.store_dir.display()), e))?;

        let staging = self
            .store_dir
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));

        if let Err(e) = self.stage(paths, key, &staging).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&staging, &entry_dir).await {
            let _ = fs::remove_dir_all(&staging).await;
            let reason = if fs::try_exists(&entry_dir).await.unwrap_or(false) {
                "entry already exists".to_string()
            } else {
                e.to_string()
            };
            return Err(StepCacheError::CacheSave {
                key: key.to_string(),
                reason,
            });
        }

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// Copy `source/<i>` to `targets[i]` for every target
///
/// Each tree is copied into a hidden sibling of its target first and moved
/// into place only once every copy succeeded, so a failed restore leaves
/// the targets as they were.
fn restore_into(source: &Path, targets: &[PathBuf]) -> std::io::Result<()> {
    let mut staged = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().enumerate() {
        let staging = restore_staging(target);
        let copied = copy_tree(&source.join(index.to_string()), &staging);
        staged.push(staging);
        if let Err(e) = copied {
            staged.iter().for_each(|dir| remove_path(dir));
            return Err(e);
        }
    }

    for (staging, target) in staged.iter().zip(targets) {
        let placed = if std::fs::symlink_metadata(target).is_ok() {
            copy_tree(staging, target).map(|_| remove_path(staging))
        } else {
            std::fs::rename(staging, target)
        };
        if let Err(e) = placed {
            staged.iter().for_each(|dir| remove_path(dir));
            return Err(e);
        }
    }
    Ok(())
}

fn restore_staging(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.restore-{}", name, Uuid::new_v4()))
}

fn remove_path(path: &Path) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CopyStats {
    files: u64,
    bytes: u64,
}

/// Recursively copy `src` to `dst`, merging into existing directories
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<CopyStats> {
    let mut stats = CopyStats::default();
    copy_into(src, dst, &mut stats)?;
    Ok(stats)
}

fn copy_into(src: &Path, dst: &Path, stats: &mut CopyStats) -> std::io::Result<()> {
    let file_type = std::fs::symlink_metadata(src)?.file_type();

    if file_type.is_dir() {
        std::fs::create_dir_all(dst)?;
        for child in std::fs::read_dir(src)? {
            let child = child?;
            copy_into(&child.path(), &dst.join(child.file_name()), stats)?;
        }
        return Ok(());
    }

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if file_type.is_symlink() {
        let link_target = std::fs::read_link(src)?;
        if std::fs::symlink_metadata(dst).is_ok() {
            std::fs::remove_file(dst)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&link_target, dst)?;
        #[cfg(not(unix))]
        {
            let _ = link_target;
            std::fs::copy(src, dst)?;
        }
    } else {
        stats.bytes += std::fs::copy(src, dst)?;
    }
    stats.files += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn restore_miss_leaves_path_untouched() {
        let temp = TempDir::new().unwrap();
        let backend = LocalCacheBackend::new(temp.path().join("store"));
        let target = temp.path().join("cache").join("step");

        let result = backend
            .restore(&[target.clone()], &CacheKey::for_step("step", "v1"))
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn save_then_restore_into_fresh_directory() {
        let temp = TempDir::new().unwrap();
        let backend = LocalCacheBackend::new(temp.path().join("store"));
        let source = temp.path().join("cache").join("step");
        write(&source.join("bin").join("tool"), "#!/bin/sh\n");
        write(&source.join("paths.txt"), "/opt/tool/bin\n");

        let key = CacheKey::for_step("step", "v1");
        backend.save(&[source.clone()], &key).await.unwrap();

        let restored = temp.path().join("other").join("step");
        let hit = backend.restore(&[restored.clone()], &key).await.unwrap();

        assert_eq!(hit, Some(key.clone()));
        assert_eq!(
            std::fs::read_to_string(restored.join("paths.txt")).unwrap(),
            "/opt/tool/bin\n"
        );
        assert!(restored.join("bin").join("tool").is_file());

        let entry = backend.entry(&key).await.unwrap().unwrap();
        assert_eq!(entry.files, 2);
        assert_eq!(entry.paths, vec![source]);
    }

    #[tokio::test]
    async fn failed_restore_leaves_targets_untouched() {
        let temp = TempDir::new().unwrap();
        let backend = LocalCacheBackend::new(temp.path().join("store"));
        let first = temp.path().join("src").join("first");
        let second = temp.path().join("src").join("second");
        write(&first.join("out"), "1");
        write(&second.join("out"), "2");

        let key = CacheKey::for_step("pair", "v1");
        backend.save(&[first, second], &key).await.unwrap();
        std::fs::remove_dir_all(backend.entry_dir(&key).join(PATHS_DIR).join("1")).unwrap();

        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        let targets = [cache.join("first"), cache.join("second")];
        let err = backend.restore(&targets, &key).await.unwrap_err();

        assert!(matches!(err, StepCacheError::CacheRestore { .. }));
        assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn list_skips_staging_directories() {
        let temp = TempDir::new().unwrap();
        let store = temp.path().join("store");
        let backend = LocalCacheBackend::new(&store);
        let source = temp.path().join("step");
        write(&source.join("out"), "data");

        let key = CacheKey::for_step("step", "v1");
        backend.save(&[source], &key).await.unwrap();
        let staging = store.join(format!("{}crashed", STAGING_PREFIX));
        copy_tree(&backend.entry_dir(&key), &staging).unwrap();

        let entries = backend.list().await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key);
    }

    #[tokio::test]
    async fn save_existing_key_fails() {
        let temp = TempDir::new().unwrap();
        let backend = LocalCacheBackend::new(temp.path().join("store"));
        let source = temp.path().join("step");
        write(&source.join("out"), "1");

        let key = CacheKey::for_step("step", "v1");
        backend.save(&[source.clone()], &key).await.unwrap();
        let err = backend.save(&[source], &key).await.unwrap_err();

        assert!(matches!(err, StepCacheError::CacheSave { .. }));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn save_missing_path_fails_without_leaving_staging() {
        let temp = TempDir::new().unwrap();
        let store = temp.path().join("store");
        let backend = LocalCacheBackend::new(&store);

        let err = backend
            .save(&[temp.path().join("missing")], &CacheKey::for_step("missing", "v1"))
            .await
            .unwrap_err();

        assert!(matches!(err, StepCacheError::CacheSave { .. }));
        let leftovers = std::fs::read_dir(&store).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn list_remove_and_clear() {
        let temp = TempDir::new().unwrap();
        let backend = LocalCacheBackend::new(temp.path().join("store"));
        let source = temp.path().join("step");
        write(&source.join("out"), "data");

        let a = CacheKey::for_step("a", "v1");
        let b = CacheKey::for_step("b", "v1");
        backend.save(&[source.clone()], &b).await.unwrap();
        backend.save(&[source], &a).await.unwrap();

        let keys: Vec<_> = backend
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key.to_string())
            .collect();
        assert_eq!(keys, vec!["a-v1", "b-v1"]);

        backend.remove(&a).await.unwrap();
        assert!(backend.entry(&a).await.unwrap().is_none());
        assert!(matches!(
            backend.remove(&a).await,
            Err(StepCacheError::CacheEntryNotFound(_))
        ));

        assert_eq!(backend.clear().await.unwrap(), 1);
        assert!(backend.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_missing_store_is_empty() {
        let temp = TempDir::new().unwrap();
        let backend = LocalCacheBackend::new(temp.path().join("nope"));
        assert!(backend.list().await.unwrap().is_empty());
    }
}
