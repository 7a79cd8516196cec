//! Integrity Verifier (§4.12): checks each installed mod's cached files
//! against their stored checksum, and optionally repairs discrepancies by
//! re-downloading through the mod's source.

use crate::cache::{Cache, CacheKey};
use crate::cancel::CancelToken;
use crate::db::Database;
use crate::download::Downloader;
use crate::error::CoreResult;
use crate::sources::ModSource;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Ok,
    Corrupted,
    Missing,
    NoChecksum,
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub source_id: String,
    pub mod_id: String,
    pub file_id: String,
    pub status: FileStatus,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub files: Vec<FileReport>,
    pub fixed: Vec<FileReport>,
    pub fix_errors: Vec<crate::error::CoreError>,
}

impl VerifyReport {
    pub fn errors(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| matches!(f.status, FileStatus::Corrupted | FileStatus::Missing))
    }

    pub fn warnings(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.status == FileStatus::NoChecksum)
    }
}

pub struct Verifier {
    db: Arc<Database>,
    cache: Arc<Cache>,
    downloader: Downloader,
}

impl Verifier {
    pub fn new(db: Arc<Database>, cache: Arc<Cache>) -> Self {
        Self { db, cache, downloader: Downloader::new(3) }
    }

    pub async fn verify(
        &self,
        game_id: &str,
        profile: &str,
        fix: bool,
        source: Option<&dyn ModSource>,
        cancel: &CancelToken,
    ) -> CoreResult<VerifyReport> {
        let mut report = VerifyReport::default();

        for installed in self.db.list_installed_mods(game_id, profile)? {
            cancel.check()?;
            let files = self.db.list_installed_mod_files(
                &installed.source_id,
                &installed.mod_id,
                game_id,
                profile,
            )?;
            let key = CacheKey::new(game_id, &installed.source_id, &installed.mod_id, &installed.version);

            for file in files {
                cancel.check()?;
                let status = self.classify(&key, &file)?;
                let entry = FileReport {
                    source_id: installed.source_id.clone(),
                    mod_id: installed.mod_id.clone(),
                    file_id: file.file_id.clone(),
                    status,
                };

                if fix && status != FileStatus::Ok {
                    match self.repair(&key, &file, source, cancel).await {
                        Ok(()) => report.fixed.push(entry.clone()),
                        Err(e) => report.fix_errors.push(e),
                    }
                }

                report.files.push(entry);
            }
        }

        Ok(report)
    }

    fn classify(&self, key: &CacheKey, file: &crate::db::InstalledModFileRow) -> CoreResult<FileStatus> {
        let Some(expected) = &file.checksum else {
            return Ok(FileStatus::NoChecksum);
        };

        let path = self.cache.file_path(key, std::path::Path::new(&file.file_id));
        if !path.exists() {
            return Ok(FileStatus::Missing);
        }

        let bytes = std::fs::read(&path)?;
        let got = format!("{:x}", md5::compute(&bytes));
        if &got == expected {
            Ok(FileStatus::Ok)
        } else {
            Ok(FileStatus::Corrupted)
        }
    }

    async fn repair(
        &self,
        key: &CacheKey,
        file: &crate::db::InstalledModFileRow,
        source: Option<&dyn ModSource>,
        cancel: &CancelToken,
    ) -> CoreResult<()> {
        let source = source.ok_or_else(|| crate::error::CoreError::NotFound("source unavailable for repair".to_string()))?;
        let url = source.download_url(&file.source_id, &file.mod_id, &file.file_id).await?;
        let dest = self.cache.file_path(key, std::path::Path::new(&file.file_id));

        let outcome = self.downloader.download(&url, &dest, None, cancel).await?;
        self.db.upsert_installed_mod_file(&crate::db::InstalledModFileRow {
            checksum: Some(outcome.md5_hex),
            ..file.clone()
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InstalledModRow;
    use tempfile::tempdir;

    fn sample_installed(db: &Database, checksum: Option<&str>) {
        db.upsert_installed_mod(&InstalledModRow {
            source_id: "nexus".into(),
            mod_id: "1".into(),
            game_id: "g".into(),
            profile_name: "p".into(),
            name: "Mod".into(),
            version: "1.0".into(),
            author: None,
            update_policy: crate::db::UpdatePolicy::Auto,
            enabled: true,
            deployed: true,
            installed_at: "2026-01-01T00:00:00Z".into(),
            previous_version: None,
            link_method: crate::deploy::LinkMethod::Symlink,
        })
        .unwrap();
        db.upsert_installed_mod_file(&crate::db::InstalledModFileRow {
            source_id: "nexus".into(),
            mod_id: "1".into(),
            game_id: "g".into(),
            profile_name: "p".into(),
            file_id: "plugin.esp".into(),
            checksum: checksum.map(str::to_string),
        })
        .unwrap();
    }

    #[tokio::test]
    async fn matching_checksum_is_ok() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(Cache::new(dir.path()));
        let key = CacheKey::new("g", "nexus", "1", "1.0");
        cache.store(&key, std::path::Path::new("plugin.esp"), b"hello").unwrap();
        let checksum = format!("{:x}", md5::compute(b"hello"));
        sample_installed(&db, Some(&checksum));

        let verifier = Verifier::new(db, cache);
        let report = verifier.verify("g", "p", false, None, &CancelToken::new()).await.unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].status, FileStatus::Ok);
    }

    #[tokio::test]
    async fn mismatched_checksum_is_corrupted() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(Cache::new(dir.path()));
        let key = CacheKey::new("g", "nexus", "1", "1.0");
        cache.store(&key, std::path::Path::new("plugin.esp"), b"hello").unwrap();
        sample_installed(&db, Some("deadbeef"));

        let verifier = Verifier::new(db, cache);
        let report = verifier.verify("g", "p", false, None, &CancelToken::new()).await.unwrap();
        assert_eq!(report.files[0].status, FileStatus::Corrupted);
    }

    #[tokio::test]
    async fn absent_cache_file_is_missing() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(Cache::new(dir.path()));
        sample_installed(&db, Some("deadbeef"));

        let verifier = Verifier::new(db, cache);
        let report = verifier.verify("g", "p", false, None, &CancelToken::new()).await.unwrap();
        assert_eq!(report.files[0].status, FileStatus::Missing);
    }

    #[tokio::test]
    async fn null_checksum_is_a_warning_not_an_error() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(Cache::new(dir.path()));
        sample_installed(&db, None);

        let verifier = Verifier::new(db, cache);
        let report = verifier.verify("g", "p", false, None, &CancelToken::new()).await.unwrap();
        assert_eq!(report.files[0].status, FileStatus::NoChecksum);
        assert_eq!(report.errors().count(), 0);
        assert_eq!(report.warnings().count(), 1);
    }
}
