//! Game registry (§3, §6): the set of games known to linuxmodmanager,
//! persisted as a single `games.yaml` document at the configuration root.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How a mod's extracted files reach `mod_path`: linked in place from the
/// cache (`Extract`) or physically copied (`Copy`). Distinct from
/// [`crate::deploy::LinkMethod`], which governs *how* the link is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMode {
    Extract,
    Copy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub install_path: PathBuf,
    pub mod_path: PathBuf,
    /// Maps a source id (e.g. "nexus") to that source's own identifier for
    /// this game (e.g. "skyrimspecialedition").
    #[serde(default)]
    pub source_ids: HashMap<String, String>,
    pub link_method: Option<crate::deploy::LinkMethod>,
    pub deploy_mode: DeployMode,
    pub cache_path: Option<PathBuf>,
    #[serde(default)]
    pub hooks: crate::profiles::HookSet,
}

impl Game {
    pub fn new(id: impl Into<String>, name: impl Into<String>, install_path: PathBuf, mod_path: PathBuf) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            install_path,
            mod_path,
            source_ids: HashMap::new(),
            link_method: None,
            deploy_mode: DeployMode::Extract,
            cache_path: None,
            hooks: crate::profiles::HookSet::default(),
        }
    }
}

/// `games.yaml`-backed registry of known games.
pub struct GameStore {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GamesDocument {
    games: Vec<Game>,
}

impl GameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> CoreResult<GamesDocument> {
        if !self.path.exists() {
            return Ok(GamesDocument::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_yaml::from_str(&content).map_err(|e| CoreError::Serde(e.to_string()))
    }

    fn write(&self, doc: &GamesDocument) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(doc).map_err(|e| CoreError::Serde(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn list(&self) -> CoreResult<Vec<Game>> {
        Ok(self.read()?.games)
    }

    pub fn get(&self, id: &str) -> CoreResult<Game> {
        self.read()?
            .games
            .into_iter()
            .find(|g| g.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("game {id}")))
    }

    pub fn upsert(&self, game: Game) -> CoreResult<()> {
        let mut doc = self.read()?;
        match doc.games.iter_mut().find(|g| g.id == game.id) {
            Some(existing) => *existing = game,
            None => doc.games.push(game),
        }
        self.write(&doc)
    }

    pub fn remove(&self, id: &str) -> CoreResult<()> {
        let mut doc = self.read()?;
        let before = doc.games.len();
        doc.games.retain(|g| g.id != id);
        if doc.games.len() == before {
            return Err(CoreError::NotFound(format!("game {id}")));
        }
        self.write(&doc)
    }
}

/// Scan `path` for entries already managed by the ledger (symlink present
/// or name matching an installed mod) versus import candidates: one entry
/// per file in `Copy` mode, one per subdirectory in `Extract` mode (§4.10).
pub fn scan_mod_path(path: &Path, mode: DeployMode, known_names: &[String]) -> CoreResult<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    if !path.exists() {
        return Ok(candidates);
    }
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        let is_symlink = entry.path().symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_symlink || known_names.contains(&name) {
            continue;
        }
        let file_type = entry.file_type()?;
        match mode {
            DeployMode::Copy if file_type.is_file() => candidates.push(entry_path),
            DeployMode::Extract if file_type.is_dir() => candidates.push(entry_path),
            _ => {}
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(id: &str) -> Game {
        Game::new(id, format!("Game {id}"), PathBuf::from("/games/x"), PathBuf::from("/games/x/mods"))
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path().join("games.yaml"));
        store.upsert(sample("g1")).unwrap();
        let got = store.get("g1").unwrap();
        assert_eq!(got.name, "Game g1");
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path().join("games.yaml"));
        store.upsert(sample("g1")).unwrap();
        let mut updated = sample("g1");
        updated.name = "Renamed".into();
        store.upsert(updated).unwrap();

        let games = store.list().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].name, "Renamed");
    }

    #[test]
    fn remove_missing_game_errors() {
        let dir = tempdir().unwrap();
        let store = GameStore::new(dir.path().join("games.yaml"));
        let err = store.remove("ghost").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn scan_mod_path_skips_symlinks_and_known_names() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Managed")).unwrap();
        std::fs::create_dir(dir.path().join("NewMod")).unwrap();
        std::fs::create_dir(dir.path().join("Skip")).unwrap();

        let known = vec!["Skip".to_string()];
        let candidates = scan_mod_path(dir.path(), DeployMode::Extract, &known).unwrap();
        let names: Vec<_> = candidates
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"Managed".to_string()));
        assert!(names.contains(&"NewMod".to_string()));
        assert!(!names.contains(&"Skip".to_string()));
    }
}
