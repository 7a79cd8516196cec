//! Application wiring: constructs every component from [`Config`] and
//! exposes the handful of operations the CLI front-end drives (§9, C13).

use crate::cache::Cache;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::db::Database;
use crate::deploy::LinkMethod;
use crate::error::CoreResult;
use crate::games::{Game, GameStore};
use crate::hooks::HookRunner;
use crate::installer::{BatchHookContext, BatchOptions, BatchResult, Installer, ResolvedHooks};
use crate::ledger::Ledger;
use crate::lock::ProcessLock;
use crate::model::Mod;
use crate::profiles::{HookSlot, Profile, ProfileStore};
use crate::transactor::Transactor;
use crate::verify::{VerifyReport};
use std::sync::Arc;
use std::time::Duration;

/// Owns every long-lived component and the process lock for as long as
/// the CLI invocation runs.
pub struct App {
    pub config: Config,
    pub db: Arc<Database>,
    pub cache: Arc<Cache>,
    pub ledger: Arc<Ledger>,
    pub games: GameStore,
    pub profiles: Arc<ProfileStore>,
    pub installer: Installer,
    pub transactor: Transactor,
    pub hooks: HookRunner,
    cancel: CancelToken,
    _lock: ProcessLock,
}

impl App {
    /// Acquire the process lock and wire up every component from `config`.
    /// Only one `App` may be live against a given data root at a time.
    pub fn new(config: Config) -> CoreResult<Self> {
        config.paths.ensure_dirs()?;
        let lock = ProcessLock::acquire(config.paths.lock_file())?;

        let db = Arc::new(Database::open(&config.paths.database_file())?);
        let cache = Arc::new(Cache::new(config.paths.cache_dir()));
        let ledger = Arc::new(Ledger::new(db.clone()));
        let games = GameStore::new(config.paths.games_file());
        let profiles = Arc::new(ProfileStore::new(config.paths.games_config_dir()));
        let installer = Installer::new(db.clone(), cache.clone(), ledger.clone());
        let transactor = Transactor::new(cache.clone(), ledger.clone(), profiles.clone());
        let hooks = HookRunner::new(Duration::from_secs(config.hook_timeout_secs));

        Ok(Self {
            config,
            db,
            cache,
            ledger,
            games,
            profiles,
            installer,
            transactor,
            hooks,
            cancel: CancelToken::new(),
            _lock: lock,
        })
    }

    /// The token that every long-running operation this `App` drives checks
    /// between steps. Clone it out to wire a SIGINT handler before invoking
    /// the operation.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn list_games(&self) -> CoreResult<Vec<Game>> {
        self.games.list()
    }

    pub fn get_game(&self, game_id: &str) -> CoreResult<Game> {
        self.games.get(game_id)
    }

    pub fn add_game(&self, game: Game) -> CoreResult<()> {
        self.games.upsert(game)
    }

    pub fn remove_game(&self, game_id: &str) -> CoreResult<()> {
        self.games.remove(game_id)
    }

    pub fn list_profiles(&self, game_id: &str) -> CoreResult<Vec<Profile>> {
        self.profiles.list(game_id)
    }

    pub fn create_profile(&self, game_id: &str, name: &str) -> CoreResult<Profile> {
        self.profiles.create(game_id, name)
    }

    pub fn delete_profile(&self, game_id: &str, name: &str) -> CoreResult<()> {
        self.profiles.delete(game_id, name)
    }

    /// Switch `game`'s active profile to `profile_name`, deploying its
    /// mods and rolling back to the prior default on any failure.
    pub fn switch_profile(&self, game: &Game, profile_name: &str) -> CoreResult<()> {
        self.transactor.switch(game, profile_name, &self.cancel)
    }

    /// Install `m` into `game`'s `profile_name`, running that profile's
    /// resolved hooks (game-level defaults overridden per §4.9) around it.
    pub async fn install_mod(
        &self,
        game: &Game,
        profile_name: &str,
        m: &Mod,
        link_method: Option<LinkMethod>,
        force: bool,
    ) -> BatchResult {
        let profile = match self.profiles.load(&game.id, profile_name) {
            Ok(p) => p,
            Err(e) => {
                let mut result = BatchResult::default();
                result.errors.push(e);
                return result;
            }
        };
        let hooks = resolved_hooks(game, &profile);
        let link = link_method
            .or(profile.link_method)
            .or(game.link_method)
            .unwrap_or(self.config.default_link_method);
        let opts = BatchOptions {
            hooks: Some(&hooks),
            hook_runner: Some(&self.hooks),
            hook_ctx: batch_hook_context(game),
            force,
        };
        self.installer
            .install_batch(&game.id, &game.mod_path, profile_name, std::slice::from_ref(m), link, opts, &self.cancel)
            .await
    }

    /// Uninstall `m` from `game`'s `profile_name`, running that profile's
    /// resolved hooks around it.
    pub async fn uninstall_mod(&self, game: &Game, profile_name: &str, m: &Mod) -> BatchResult {
        let profile = match self.profiles.load(&game.id, profile_name) {
            Ok(p) => p,
            Err(e) => {
                let mut result = BatchResult::default();
                result.errors.push(e);
                return result;
            }
        };
        let hooks = resolved_hooks(game, &profile);
        let opts = BatchOptions {
            hooks: Some(&hooks),
            hook_runner: Some(&self.hooks),
            hook_ctx: batch_hook_context(game),
            force: false,
        };
        self.installer
            .uninstall_batch(&game.id, &game.mod_path, profile_name, std::slice::from_ref(m), opts, &self.cancel)
            .await
    }

    /// Check every installed mod file's checksum, repairing through
    /// `source` when `fix` is set.
    pub async fn verify(
        &self,
        game_id: &str,
        profile: &str,
        fix: bool,
        source: Option<&dyn crate::sources::ModSource>,
    ) -> CoreResult<VerifyReport> {
        let verifier = crate::verify::Verifier::new(self.db.clone(), self.cache.clone());
        verifier.verify(game_id, profile, fix, source, &self.cancel).await
    }
}

fn batch_hook_context(game: &Game) -> BatchHookContext {
    BatchHookContext {
        game_id: game.id.clone(),
        game_path: game.install_path.to_string_lossy().into_owned(),
        mod_path: game.mod_path.to_string_lossy().into_owned(),
    }
}

/// Resolve `profile`'s effective hook script for each slot against
/// `game`'s defaults (§4.9), anchoring relative script names at the
/// game's install directory.
fn resolved_hooks(game: &Game, profile: &Profile) -> ResolvedHooks {
    let resolve = |slot: HookSlot, game_default: Option<&str>| {
        profile
            .hooks
            .effective(slot, &profile.hooks_explicit, game_default)
            .map(|name| crate::hooks::hook_path(&game.install_path, name))
    };
    ResolvedHooks {
        before_all: resolve(HookSlot::BeforeAll, game.hooks.before_all.as_deref()),
        before_each: resolve(HookSlot::BeforeEach, game.hooks.before_each.as_deref()),
        after_each: resolve(HookSlot::AfterEach, game.hooks.after_each.as_deref()),
        after_all: resolve(HookSlot::AfterAll, game.hooks.after_all.as_deref()),
    }
}
