//! Installer / Batch Orchestrator (§4.10): per-mod install/uninstall driven
//! by the cache, deployer, and ledger, plus batch variants that layer hook
//! invocations and best-effort error collection around the per-mod ops.

use crate::cache::{Cache, CacheKey};
use crate::cancel::CancelToken;
use crate::db::Database;
use crate::deploy::{self, LinkMethod};
use crate::error::{CoreError, CoreResult};
use crate::hooks::{self, HookRunner};
use crate::ledger::{Ledger, Owner};
use crate::model::{Mod, ModReference};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Installer {
    db: Arc<Database>,
    cache: Arc<Cache>,
    ledger: Arc<Ledger>,
}

impl Installer {
    pub fn new(db: Arc<Database>, cache: Arc<Cache>, ledger: Arc<Ledger>) -> Self {
        Self { db, cache, ledger }
    }

    pub fn install(
        &self,
        game_id: &str,
        mod_path: &Path,
        profile: &str,
        m: &Mod,
        link_method: LinkMethod,
        force: bool,
        cancel: &CancelToken,
    ) -> CoreResult<()> {
        cancel.check()?;
        let key = cache_key(game_id, &m.reference);
        if !self.cache.exists(&key) {
            return Err(CoreError::CacheMissing(m.key()));
        }

        let files = self.cache.list_files(&key)?;
        let relative: Vec<String> = files.iter().map(|p| p.to_string_lossy().into_owned()).collect();

        if !force {
            let conflicts = self.ledger.conflicts(game_id, profile, &relative)?;
            if !conflicts.is_empty() {
                let pairs = conflicts
                    .into_iter()
                    .map(|(path, owner)| (path, format!("{}:{}", owner.source_id, owner.mod_id)))
                    .collect();
                return Err(CoreError::Conflict(pairs));
            }
        }

        let deployer = deploy::for_method(link_method);
        let owner = Owner {
            source_id: m.reference.source_id.clone(),
            mod_id: m.reference.mod_id.clone(),
        };

        for file in &files {
            cancel.check()?;
            let src = self.cache.file_path(&key, file);
            let dst = mod_path.join(file);
            deployer.deploy(&src, &dst)?;
            self.ledger.record(game_id, profile, &file.to_string_lossy(), &owner)?;
        }

        self.db.upsert_installed_mod(&crate::db::InstalledModRow {
            source_id: m.reference.source_id.clone(),
            mod_id: m.reference.mod_id.clone(),
            game_id: game_id.to_string(),
            profile_name: profile.to_string(),
            name: m.name.clone(),
            version: m.reference.version.clone(),
            author: m.author.clone(),
            update_policy: crate::db::UpdatePolicy::Auto,
            enabled: true,
            deployed: true,
            installed_at: chrono::Utc::now().to_rfc3339(),
            previous_version: None,
            link_method,
        })?;

        for file_id in &m.reference.file_ids {
            self.db.upsert_installed_mod_file(&crate::db::InstalledModFileRow {
                source_id: m.reference.source_id.clone(),
                mod_id: m.reference.mod_id.clone(),
                game_id: game_id.to_string(),
                profile_name: profile.to_string(),
                file_id: file_id.clone(),
                checksum: None,
            })?;
        }

        tracing::info!(mod_id = %m.reference.mod_id, "installed");
        Ok(())
    }

    pub fn uninstall(
        &self,
        game_id: &str,
        mod_path: &Path,
        profile: &str,
        m: &Mod,
        cancel: &CancelToken,
    ) -> CoreResult<()> {
        cancel.check()?;
        let owner = Owner {
            source_id: m.reference.source_id.clone(),
            mod_id: m.reference.mod_id.clone(),
        };
        let paths = self.ledger.paths_for(game_id, profile, &owner)?;

        // Any link method can undeploy via its own `undeploy`; the concrete
        // variant that created the entry doesn't need to match, since each
        // undeploy only inspects what's currently on disk.
        let link_method = self
            .db
            .get_installed_mod(&m.reference.source_id, &m.reference.mod_id, game_id, profile)?
            .map(|row| row.link_method)
            .unwrap_or_default();
        let deployer = deploy::for_method(link_method);

        for path in &paths {
            cancel.check()?;
            let dst = mod_path.join(path);
            deployer.undeploy(&dst)?;
        }

        cleanup_empty_dirs(mod_path, &paths);

        self.ledger.remove_all(game_id, profile, &owner)?;
        self.db.set_deployed(&m.reference.source_id, &m.reference.mod_id, game_id, profile, false)?;

        tracing::info!(mod_id = %m.reference.mod_id, "uninstalled");
        Ok(())
    }

    pub fn is_installed(&self, game_id: &str, mod_path: &Path, profile: &str, m: &Mod) -> CoreResult<bool> {
        let key = cache_key(game_id, &m.reference);
        if !self.cache.exists(&key) {
            return Ok(false);
        }
        let files = self.cache.list_files(&key)?;
        let Some(first) = files.first() else {
            return Ok(false);
        };
        let link_method = self
            .db
            .get_installed_mod(&m.reference.source_id, &m.reference.mod_id, game_id, profile)?
            .map(|row| row.link_method)
            .unwrap_or_default();
        deploy::for_method(link_method).is_deployed(&mod_path.join(first))
    }
}

fn cache_key(game_id: &str, reference: &ModReference) -> CacheKey {
    CacheKey::new(game_id, &reference.source_id, &reference.mod_id, &reference.version)
}

/// Remove directories left empty by `undeploy`, deepest first, stopping at
/// (and never removing) `root` itself. Best-effort: failures are ignored.
fn cleanup_empty_dirs(root: &Path, relative_paths: &[String]) {
    let mut dirs: Vec<PathBuf> = relative_paths
        .iter()
        .filter_map(|p| root.join(p).parent().map(Path::to_path_buf))
        .collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    dirs.dedup();

    for dir in dirs {
        let mut current = dir;
        while current.starts_with(root) && current != root {
            match std::fs::read_dir(&current) {
                Ok(mut entries) if entries.next().is_none() => {
                    if std::fs::remove_dir(&current).is_err() {
                        break;
                    }
                }
                _ => break,
            }
            let Some(parent) = current.parent() else { break };
            current = parent.to_path_buf();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedHooks {
    pub before_all: Option<PathBuf>,
    pub before_each: Option<PathBuf>,
    pub after_each: Option<PathBuf>,
    pub after_all: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BatchHookContext {
    pub game_id: String,
    pub game_path: String,
    pub mod_path: String,
}

pub struct BatchOptions<'a> {
    pub hooks: Option<&'a ResolvedHooks>,
    pub hook_runner: Option<&'a HookRunner>,
    pub hook_ctx: BatchHookContext,
    pub force: bool,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub installed: Vec<ModReference>,
    pub uninstalled: Vec<ModReference>,
    pub skipped: Vec<(ModReference, String)>,
    pub errors: Vec<CoreError>,
}

enum Operation {
    Install,
    Uninstall,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Install => "install",
            Operation::Uninstall => "uninstall",
        }
    }
}

impl Installer {
    pub async fn install_batch(
        &self,
        game_id: &str,
        mod_path: &Path,
        profile: &str,
        mods: &[Mod],
        link_method: LinkMethod,
        opts: BatchOptions<'_>,
        cancel: &CancelToken,
    ) -> BatchResult {
        self.run_batch(Operation::Install, game_id, mod_path, profile, mods, link_method, opts, cancel)
            .await
    }

    pub async fn uninstall_batch(
        &self,
        game_id: &str,
        mod_path: &Path,
        profile: &str,
        mods: &[Mod],
        opts: BatchOptions<'_>,
        cancel: &CancelToken,
    ) -> BatchResult {
        self.run_batch(Operation::Uninstall, game_id, mod_path, profile, mods, LinkMethod::default(), opts, cancel)
            .await
    }

    async fn run_batch(
        &self,
        op: Operation,
        game_id: &str,
        mod_path: &Path,
        profile: &str,
        mods: &[Mod],
        link_method: LinkMethod,
        opts: BatchOptions<'_>,
        cancel: &CancelToken,
    ) -> BatchResult {
        let mut result = BatchResult::default();

        if let Err(e) = cancel.check() {
            result.errors.push(e);
            return result;
        }

        if let (Some(hooks), Some(runner)) = (opts.hooks, opts.hook_runner) {
            if let Some(script) = &hooks.before_all {
                let slot = format!("{}.before_all", op.name());
                let ctx = hooks::batch_context(&opts.hook_ctx.game_id, &opts.hook_ctx.game_path, &opts.hook_ctx.mod_path);
                if let Err(e) = runner.run(script, &slot, &ctx, cancel).await {
                    if opts.force {
                        result.errors.push(e);
                    } else {
                        result.errors.push(e);
                        return result;
                    }
                }
            }
        }

        for m in mods {
            if let Err(e) = cancel.check() {
                result.errors.push(e);
                break;
            }

            if let (Some(hooks), Some(runner)) = (opts.hooks, opts.hook_runner) {
                if let Some(script) = &hooks.before_each {
                    let slot = format!("{}.before_each", op.name());
                    let ctx = hooks::mod_context(
                        &opts.hook_ctx.game_id,
                        &opts.hook_ctx.game_path,
                        &opts.hook_ctx.mod_path,
                        &m.reference.mod_id,
                        &m.name,
                        &m.reference.version,
                    );
                    if let Err(e) = runner.run(script, &slot, &ctx, cancel).await {
                        result.skipped.push((m.reference.clone(), e.to_string()));
                        continue;
                    }
                }
            }

            let op_result = match op {
                Operation::Install => self.install(game_id, mod_path, profile, m, link_method, opts.force, cancel),
                Operation::Uninstall => self.uninstall(game_id, mod_path, profile, m, cancel),
            };

            match op_result {
                Ok(()) => match op {
                    Operation::Install => result.installed.push(m.reference.clone()),
                    Operation::Uninstall => result.uninstalled.push(m.reference.clone()),
                },
                Err(e) => {
                    result.errors.push(e);
                    continue;
                }
            }

            if let (Some(hooks), Some(runner)) = (opts.hooks, opts.hook_runner) {
                if let Some(script) = &hooks.after_each {
                    let slot = format!("{}.after_each", op.name());
                    let ctx = hooks::mod_context(
                        &opts.hook_ctx.game_id,
                        &opts.hook_ctx.game_path,
                        &opts.hook_ctx.mod_path,
                        &m.reference.mod_id,
                        &m.name,
                        &m.reference.version,
                    );
                    if let Err(e) = runner.run(script, &slot, &ctx, cancel).await {
                        result.errors.push(e);
                    }
                }
            }
        }

        if let (Some(hooks), Some(runner)) = (opts.hooks, opts.hook_runner) {
            if let Some(script) = &hooks.after_all {
                let slot = format!("{}.after_all", op.name());
                let ctx = hooks::batch_context(&opts.hook_ctx.game_id, &opts.hook_ctx.game_path, &opts.hook_ctx.mod_path);
                if let Err(e) = runner.run(script, &slot, &ctx, cancel).await {
                    result.errors.push(e);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dependency;
    use tempfile::tempdir;

    fn sample_mod(id: &str) -> Mod {
        Mod {
            reference: ModReference {
                source_id: "nexus".into(),
                mod_id: id.into(),
                version: "1.0".into(),
                file_ids: vec!["f1".into()],
            },
            name: format!("Mod {id}"),
            author: None,
            summary: None,
            category: None,
            dependencies: Vec::<Dependency>::new(),
        }
    }

    fn setup() -> (Installer, Arc<Cache>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(Cache::new(dir.path().join("cache")));
        let ledger = Arc::new(Ledger::new(db.clone()));
        (Installer::new(db, cache.clone(), ledger), cache, dir)
    }

    #[test]
    fn install_without_cached_mod_is_cache_missing() {
        let (installer, _cache, dir) = setup();
        let m = sample_mod("1");
        let err = installer
            .install("g", &dir.path().join("mods"), "default", &m, LinkMethod::Symlink, false, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::CacheMissing(_)));
    }

    #[test]
    fn install_then_uninstall_round_trips() {
        let (installer, cache, dir) = setup();
        let m = sample_mod("1");
        let key = cache_key("g", &m.reference);
        cache.store(&key, Path::new("plugin.esp"), b"data").unwrap();

        let mod_path = dir.path().join("mods");
        installer
            .install("g", &mod_path, "default", &m, LinkMethod::Symlink, false, &CancelToken::new())
            .unwrap();
        assert!(mod_path.join("plugin.esp").exists());
        assert!(installer.is_installed("g", &mod_path, "default", &m).unwrap());

        installer.uninstall("g", &mod_path, "default", &m, &CancelToken::new()).unwrap();
        assert!(!mod_path.join("plugin.esp").exists());
    }

    #[test]
    fn install_without_force_rejects_conflicting_file() {
        let (installer, cache, dir) = setup();
        let a = sample_mod("1");
        let b = sample_mod("2");
        let mod_path = dir.path().join("mods");

        cache.store(&cache_key("g", &a.reference), Path::new("shared.esp"), b"a").unwrap();
        cache.store(&cache_key("g", &b.reference), Path::new("shared.esp"), b"b").unwrap();

        installer
            .install("g", &mod_path, "default", &a, LinkMethod::Symlink, false, &CancelToken::new())
            .unwrap();
        let err = installer
            .install("g", &mod_path, "default", &b, LinkMethod::Symlink, false, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn install_batch_before_each_failure_skips_without_aborting() {
        let (installer, cache, dir) = setup();
        let a = sample_mod("1");
        let b = sample_mod("2");
        cache.store(&cache_key("g", &a.reference), Path::new("a.esp"), b"a").unwrap();
        cache.store(&cache_key("g", &b.reference), Path::new("b.esp"), b"b").unwrap();

        let hook_dir = tempdir().unwrap();
        let script = hook_dir.path().join("before_each.sh");
        std::fs::write(&script, "#!/bin/sh\n[ \"$LMM_MOD_ID\" = \"1\" ] && exit 1\nexit 0\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = HookRunner::default();
        let hooks = ResolvedHooks {
            before_each: Some(script),
            ..Default::default()
        };
        let mod_path = dir.path().join("mods");
        let opts = BatchOptions {
            hooks: Some(&hooks),
            hook_runner: Some(&runner),
            hook_ctx: BatchHookContext {
                game_id: "g".into(),
                game_path: "/games/g".into(),
                mod_path: mod_path.to_string_lossy().into_owned(),
            },
            force: false,
        };

        let result = installer
            .install_batch("g", &mod_path, "default", &[a, b], LinkMethod::Symlink, opts, &CancelToken::new())
            .await;

        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].0.mod_id, "1");
        assert_eq!(result.installed.len(), 1);
        assert_eq!(result.installed[0].mod_id, "2");
    }

    #[tokio::test]
    async fn install_batch_stops_once_cancelled() {
        let (installer, cache, dir) = setup();
        let a = sample_mod("1");
        let b = sample_mod("2");
        cache.store(&cache_key("g", &a.reference), Path::new("a.esp"), b"a").unwrap();
        cache.store(&cache_key("g", &b.reference), Path::new("b.esp"), b"b").unwrap();

        let mod_path = dir.path().join("mods");
        let opts = BatchOptions {
            hooks: None,
            hook_runner: None,
            hook_ctx: BatchHookContext {
                game_id: "g".into(),
                game_path: "/games/g".into(),
                mod_path: mod_path.to_string_lossy().into_owned(),
            },
            force: false,
        };

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = installer
            .install_batch("g", &mod_path, "default", &[a, b], LinkMethod::Symlink, opts, &cancel)
            .await;

        assert!(result.installed.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], CoreError::Cancelled));
    }
}
