//! Content-addressed cache (§4.2): maps `(game, source, mod, version)` to
//! an extracted file tree on disk. Addressed by key, not by content hash —
//! dedup across profiles of the same game falls out of the key being
//! independent of profile.

use crate::error::CoreResult;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub game_id: String,
    pub source_id: String,
    pub mod_id: String,
    pub version: String,
}

impl CacheKey {
    pub fn new(
        game_id: impl Into<String>,
        source_id: impl Into<String>,
        mod_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            source_id: source_id.into(),
            mod_id: mod_id.into(),
            version: version.into(),
        }
    }

    fn segment(&self) -> PathBuf {
        PathBuf::from(&self.game_id)
            .join(&self.source_id)
            .join(&self.mod_id)
            .join(&self.version)
    }
}

/// A game-scoped cache rooted at a single directory.
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.segment())
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path(key).is_dir()
    }

    pub fn store(&self, key: &CacheKey, relative_path: &Path, bytes: &[u8]) -> CoreResult<()> {
        let dest = self.file_path(key, relative_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, bytes)?;
        Ok(())
    }

    /// Recursive enumeration of every file under the key's directory, in
    /// stable (lexicographic, walkdir-default) order.
    pub fn list_files(&self, key: &CacheKey) -> CoreResult<Vec<PathBuf>> {
        let root = self.path(key);
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() {
                let relative = entry.path().strip_prefix(&root).expect("under root");
                out.push(relative.to_path_buf());
            }
        }
        Ok(out)
    }

    pub fn file_path(&self, key: &CacheKey, relative_path: &Path) -> PathBuf {
        self.path(key).join(relative_path)
    }

    pub fn delete(&self, key: &CacheKey) -> CoreResult<()> {
        let dir = self.path(key);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key() -> CacheKey {
        CacheKey::new("skyrimse", "nexus", "12345", "1.0.0")
    }

    #[test]
    fn path_is_deterministic_and_game_scoped() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let p1 = cache.path(&key());
        let p2 = cache.path(&key());
        assert_eq!(p1, p2);
        assert!(p1.starts_with(dir.path()));
    }

    #[test]
    fn store_then_list_then_delete_round_trips() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let key = key();

        assert!(!cache.exists(&key));
        cache
            .store(&key, Path::new("textures/a.dds"), b"data")
            .unwrap();
        cache
            .store(&key, Path::new("meshes/b.nif"), b"more")
            .unwrap();
        assert!(cache.exists(&key));

        let mut files = cache.list_files(&key).unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![
                PathBuf::from("meshes/b.nif"),
                PathBuf::from("textures/a.dds"),
            ]
        );

        let bytes = std::fs::read(cache.file_path(&key, Path::new("textures/a.dds"))).unwrap();
        assert_eq!(bytes, b"data");

        cache.delete(&key).unwrap();
        assert!(!cache.exists(&key));
        assert!(cache.list_files(&key).unwrap().is_empty());
    }

    #[test]
    fn different_keys_are_independent() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let a = CacheKey::new("g", "nexus", "1", "1.0");
        let b = CacheKey::new("g", "nexus", "1", "2.0");
        cache.store(&a, Path::new("f.txt"), b"v1").unwrap();
        cache.store(&b, Path::new("f.txt"), b"v2").unwrap();
        assert_ne!(cache.path(&a), cache.path(&b));
    }
}
