//! The `ModSource` capability set (§9 design notes): the external
//! collaborator boundary for talking to a mod host. Deliberately narrow —
//! identify, search, fetch metadata, list files, resolve a download URL,
//! check for updates — so it can be mocked in core-logic tests instead of
//! touching the network.

use crate::error::CoreResult;
use crate::model::Mod;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModSource: Send + Sync {
    /// This source's own identifier (e.g. "nexus").
    fn id(&self) -> &str;

    /// Confirm this source knows about `game_id` and return its own id for
    /// that game (e.g. "skyrimspecialedition" for "skyrimse").
    async fn identify(&self, game_id: &str) -> CoreResult<String>;

    async fn search(&self, game_id: &str, query: &str) -> CoreResult<Vec<Mod>>;

    async fn get_mod(&self, game_id: &str, mod_id: &str) -> CoreResult<Mod>;

    async fn list_files(&self, game_id: &str, mod_id: &str, version: &str) -> CoreResult<Vec<String>>;

    async fn download_url(&self, source_id: &str, mod_id: &str, file_id: &str) -> CoreResult<String>;

    /// `Some(version)` if a newer version than `current_version` exists.
    async fn check_updates(&self, game_id: &str, mod_id: &str, current_version: &str) -> CoreResult<Option<String>>;
}
