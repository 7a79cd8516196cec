//! Profile Transactor (§4.11, "the centerpiece"): switches a game's active
//! profile through four phases, each with a compensation that reverses only
//! what the phases up to that point actually did. On success `new` is the
//! sole default with its mods deployed; on any failure `current` remains so.

use crate::cache::{Cache, CacheKey};
use crate::cancel::CancelToken;
use crate::deploy::{self, LinkMethod};
use crate::error::{join_errors, CoreError, CoreResult};
use crate::games::Game;
use crate::ledger::{Ledger, Owner};
use crate::profiles::{Profile, ProfileStore};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub struct Transactor {
    cache: Arc<Cache>,
    ledger: Arc<Ledger>,
    profiles: Arc<ProfileStore>,
}

impl Transactor {
    pub fn new(cache: Arc<Cache>, ledger: Arc<Ledger>, profiles: Arc<ProfileStore>) -> Self {
        Self { cache, ledger, profiles }
    }

    pub fn switch(&self, game: &Game, new_profile_name: &str, cancel: &CancelToken) -> CoreResult<()> {
        cancel.check()?;
        let current = match self.profiles.get_default(&game.id) {
            Ok(p) => p,
            Err(CoreError::NotFound(_)) => Profile::sentinel(&game.id),
            Err(e) => return Err(e),
        };
        let new = self.profiles.load(&game.id, new_profile_name)?;

        // Phase 1: undeploy current. On failure at mod i, re-deploy mods
        // 0..i (already fully undeployed); mod i itself is left alone.
        if current.name != new.name && !current.mods.is_empty() {
            let link_method = self.link_method(game, &current);
            for (i, entry) in current.mods.iter().enumerate() {
                let step = cancel.check().and_then(|()| {
                    self.undeploy_mod_files(game, &current.name, &entry.reference, link_method)
                });
                if let Err(primary) = step {
                    let mut rollback_errors = Vec::new();
                    for earlier in &current.mods[..i] {
                        if let Err(e) = self.deploy_mod_files(game, &current.name, &earlier.reference, link_method) {
                            rollback_errors.push(e);
                        }
                    }
                    return Err(CoreError::switch_failed(primary, join_errors(rollback_errors)));
                }
            }
        }

        // Phase 2: deploy new. On failure at mod j, undeploy new mods
        // 0..j, then re-deploy current in full (both best-effort).
        {
            let link_method = self.link_method(game, &new);
            for (j, entry) in new.mods.iter().enumerate() {
                let step = cancel.check().and_then(|()| {
                    self.deploy_mod_files(game, &new.name, &entry.reference, link_method)
                });
                if let Err(primary) = step {
                    let mut rollback_errors = Vec::new();
                    for earlier in &new.mods[..j] {
                        if let Err(e) = self.undeploy_mod_files(game, &new.name, &earlier.reference, link_method) {
                            rollback_errors.push(e);
                        }
                    }
                    if let Err(e) = self.deploy_all(game, &current) {
                        rollback_errors.push(e);
                    }
                    return Err(CoreError::switch_failed(primary, join_errors(rollback_errors)));
                }
            }
        }

        // Phase 3: apply new overrides. On a write error, undeploy new,
        // re-deploy current, re-apply current's overrides (best-effort).
        if let Err(primary) = self.apply_overrides(game, &new) {
            let rollback = self.rollback_to_current(game, &current, &new);
            return Err(CoreError::switch_failed(primary, rollback));
        }

        // Phase 4: set default. Same compensation as phase 3.
        if let Err(primary) = self.profiles.set_default(&game.id, &new.name) {
            let rollback = self.rollback_to_current(game, &current, &new);
            return Err(CoreError::switch_failed(primary, rollback));
        }

        Ok(())
    }

    fn link_method(&self, game: &Game, profile: &Profile) -> LinkMethod {
        profile.link_method.or(game.link_method).unwrap_or_default()
    }

    /// Deploy every mod in `profile.mods`, in list order, stopping (but not
    /// compensating further) at the first failure. Used only as a
    /// best-effort compensation step itself, so its own errors are
    /// collected by the caller rather than triggering nested rollback.
    fn deploy_all(&self, game: &Game, profile: &Profile) -> CoreResult<()> {
        let link_method = self.link_method(game, profile);
        for entry in &profile.mods {
            self.deploy_mod_files(game, &profile.name, &entry.reference, link_method)?;
        }
        Ok(())
    }

    fn undeploy_all(&self, game: &Game, profile: &Profile) -> CoreResult<()> {
        let link_method = self.link_method(game, profile);
        for entry in &profile.mods {
            self.undeploy_mod_files(game, &profile.name, &entry.reference, link_method)?;
        }
        Ok(())
    }

    /// Shared compensation for phase 3/4 failures: undeploy `new`,
    /// re-deploy `current`, re-apply `current`'s overrides, all
    /// best-effort, collected into a single joined error.
    fn rollback_to_current(&self, game: &Game, current: &Profile, new: &Profile) -> Option<CoreError> {
        let mut errors = Vec::new();
        if let Err(e) = self.undeploy_all(game, new) {
            errors.push(e);
        }
        if let Err(e) = self.deploy_all(game, current) {
            errors.push(e);
        }
        if let Err(e) = self.apply_overrides(game, current) {
            errors.push(e);
        }
        join_errors(errors)
    }

    fn deploy_mod_files(
        &self,
        game: &Game,
        profile_name: &str,
        reference: &crate::model::ModReference,
        link_method: LinkMethod,
    ) -> CoreResult<()> {
        let key = CacheKey::new(&game.id, &reference.source_id, &reference.mod_id, &reference.version);
        if !self.cache.exists(&key) {
            return Err(CoreError::CacheMissing(reference.key()));
        }
        let files = self.cache.list_files(&key)?;
        let deployer = deploy::for_method(link_method);
        let owner = Owner {
            source_id: reference.source_id.clone(),
            mod_id: reference.mod_id.clone(),
        };
        for file in &files {
            let src = self.cache.file_path(&key, file);
            let dst = game.mod_path.join(file);
            deployer.deploy(&src, &dst)?;
            self.ledger.record(&game.id, profile_name, &file.to_string_lossy(), &owner)?;
        }
        Ok(())
    }

    fn undeploy_mod_files(
        &self,
        game: &Game,
        profile_name: &str,
        reference: &crate::model::ModReference,
        link_method: LinkMethod,
    ) -> CoreResult<()> {
        let key = CacheKey::new(&game.id, &reference.source_id, &reference.mod_id, &reference.version);
        if !self.cache.exists(&key) {
            return Err(CoreError::CacheMissing(reference.key()));
        }
        let files = self.cache.list_files(&key)?;
        let deployer = deploy::for_method(link_method);
        let owner = Owner {
            source_id: reference.source_id.clone(),
            mod_id: reference.mod_id.clone(),
        };
        for file in &files {
            let dst = game.mod_path.join(file);
            deployer.undeploy(&dst)?;
        }
        self.ledger.remove_all(&game.id, profile_name, &owner)?;
        Ok(())
    }

    fn apply_overrides(&self, game: &Game, profile: &Profile) -> CoreResult<()> {
        for (relpath, bytes) in &profile.overrides {
            let dest = safe_override_path(&game.install_path, relpath)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, bytes)?;
        }
        Ok(())
    }
}

/// Reject absolute paths and any path that escapes `root` after collapsing
/// `.`/`..` components (§4.11 phase 3).
fn safe_override_path(root: &Path, relpath: &str) -> CoreResult<PathBuf> {
    let candidate = Path::new(relpath);
    if candidate.is_absolute() {
        return Err(CoreError::InvalidOverride(relpath.to_string()));
    }

    let mut resolved = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::Prefix(_) => {
                return Err(CoreError::InvalidOverride(relpath.to_string()));
            }
        }
    }

    if resolved == root || resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(CoreError::InvalidOverride(relpath.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::ModReference;
    use crate::profiles::ProfileModEntry;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn reference(id: &str) -> ModReference {
        ModReference {
            source_id: "nexus".into(),
            mod_id: id.into(),
            version: "1.0".into(),
            file_ids: vec![],
        }
    }

    fn setup(dir: &Path) -> (Transactor, Arc<Cache>, Arc<ProfileStore>, Game) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(Cache::new(dir.join("cache")));
        let ledger = Arc::new(Ledger::new(db));
        let profiles = Arc::new(ProfileStore::new(dir.join("profiles")));
        let game = Game::new("g", "Game", dir.join("install"), dir.join("install/mods"));
        let transactor = Transactor::new(cache.clone(), ledger, profiles.clone());
        (transactor, cache, profiles, game)
    }

    #[test]
    fn switch_deploys_new_and_undeploys_current() {
        let dir = tempdir().unwrap();
        let (transactor, cache, profiles, game) = setup(dir.path());

        cache.store(&CacheKey::new("g", "nexus", "1", "1.0"), Path::new("a.esp"), b"a").unwrap();
        cache.store(&CacheKey::new("g", "nexus", "2", "1.0"), Path::new("b.esp"), b"b").unwrap();

        let mut current = profiles.create("g", "current").unwrap();
        current.mods.push(ProfileModEntry { reference: reference("1"), enabled: true });
        profiles.save(&current).unwrap();
        profiles.set_default("g", "current").unwrap();

        let mut new = profiles.create("g", "new").unwrap();
        new.mods.push(ProfileModEntry { reference: reference("2"), enabled: true });
        profiles.save(&new).unwrap();

        transactor.switch(&game, "new", &CancelToken::new()).unwrap();

        assert!(!game.mod_path.join("a.esp").exists());
        assert!(game.mod_path.join("b.esp").exists());
        assert!(profiles.get_default("g").unwrap().name == "new");
    }

    #[test]
    fn switch_without_existing_default_treats_current_as_empty() {
        let dir = tempdir().unwrap();
        let (transactor, cache, profiles, game) = setup(dir.path());
        cache.store(&CacheKey::new("g", "nexus", "1", "1.0"), Path::new("a.esp"), b"a").unwrap();

        let mut new = profiles.create("g", "first").unwrap();
        new.mods.push(ProfileModEntry { reference: reference("1"), enabled: true });
        profiles.save(&new).unwrap();

        transactor.switch(&game, "first", &CancelToken::new()).unwrap();
        assert!(game.mod_path.join("a.esp").exists());
    }

    #[test]
    fn switch_fails_on_missing_cache_and_leaves_current_deployed() {
        // S3: P1=[modA] -> P2=[modA, modB] where modB was never cached.
        // deploy_mod_files must reject it outright rather than silently
        // deploying zero files for it.
        let dir = tempdir().unwrap();
        let (transactor, cache, profiles, game) = setup(dir.path());

        cache.store(&CacheKey::new("g", "nexus", "1", "1.0"), Path::new("a.esp"), b"a").unwrap();

        let mut current = profiles.create("g", "current").unwrap();
        current.mods.push(ProfileModEntry { reference: reference("1"), enabled: true });
        profiles.save(&current).unwrap();
        profiles.set_default("g", "current").unwrap();

        let mut new = profiles.create("g", "new").unwrap();
        new.mods.push(ProfileModEntry { reference: reference("1"), enabled: true });
        new.mods.push(ProfileModEntry { reference: reference("2"), enabled: true });
        profiles.save(&new).unwrap();

        let err = transactor.switch(&game, "new", &CancelToken::new()).unwrap_err();
        match err {
            CoreError::SwitchFailed { primary, .. } => {
                assert!(matches!(*primary, CoreError::CacheMissing(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(game.mod_path.join("a.esp").exists());
        assert_eq!(profiles.get_default("g").unwrap().name, "current");
    }

    #[test]
    fn switch_fails_on_filesystem_error_and_leaves_current_deployed() {
        let dir = tempdir().unwrap();
        let (transactor, cache, profiles, game) = setup(dir.path());

        cache.store(&CacheKey::new("g", "nexus", "1", "1.0"), Path::new("a.esp"), b"a").unwrap();

        let mut current = profiles.create("g", "current").unwrap();
        current.mods.push(ProfileModEntry { reference: reference("1"), enabled: true });
        profiles.save(&current).unwrap();
        profiles.set_default("g", "current").unwrap();

        let mut new = profiles.create("g", "new").unwrap();
        new.mods.push(ProfileModEntry { reference: reference("2"), enabled: true });
        profiles.save(&new).unwrap();
        cache.store(&CacheKey::new("g", "nexus", "2", "1.0"), Path::new("sub/b.esp"), b"b").unwrap();

        // Block the destination so the cached-and-listed file still fails
        // to deploy, exercising the compensation path for a plain Io error.
        std::fs::create_dir_all(&game.mod_path).unwrap();
        let blocker = game.mod_path.join("sub");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = transactor.switch(&game, "new", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, CoreError::SwitchFailed { .. }));
        assert!(game.mod_path.join("a.esp").exists());
        assert_eq!(profiles.get_default("g").unwrap().name, "current");
    }

    #[test]
    fn safe_override_path_rejects_escape_and_absolute() {
        let root = Path::new("/games/x");
        assert!(safe_override_path(root, "/etc/passwd").is_err());
        assert!(safe_override_path(root, "../../etc/passwd").is_err());
        assert_eq!(safe_override_path(root, "ini/game.ini").unwrap(), root.join("ini/game.ini"));
    }

    #[test]
    fn phase3_override_write_failure_rolls_back_deploy() {
        let dir = tempdir().unwrap();
        let (transactor, cache, profiles, game) = setup(dir.path());
        cache.store(&CacheKey::new("g", "nexus", "1", "1.0"), Path::new("a.esp"), b"a").unwrap();

        let mut new = profiles.create("g", "new").unwrap();
        new.mods.push(ProfileModEntry { reference: reference("1"), enabled: true });
        let mut overrides = HashMap::new();
        overrides.insert("/absolute/escape".to_string(), b"x".to_vec());
        new.overrides = overrides;
        profiles.save(&new).unwrap();

        let err = transactor.switch(&game, "new", &CancelToken::new()).unwrap_err();
        match err {
            CoreError::SwitchFailed { primary, .. } => {
                assert!(matches!(*primary, CoreError::InvalidOverride(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!game.mod_path.join("a.esp").exists());
    }

    #[test]
    fn switch_rejects_an_already_cancelled_token() {
        let dir = tempdir().unwrap();
        let (transactor, cache, profiles, game) = setup(dir.path());
        cache.store(&CacheKey::new("g", "nexus", "1", "1.0"), Path::new("a.esp"), b"a").unwrap();

        let mut new = profiles.create("g", "new").unwrap();
        new.mods.push(ProfileModEntry { reference: reference("1"), enabled: true });
        profiles.save(&new).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = transactor.switch(&game, "new", &cancel).unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert!(!game.mod_path.join("a.esp").exists());
    }
}
