//! XDG-compliant path management

use directories::ProjectDirs;
use std::path::PathBuf;

/// Manages all application paths using the XDG base directory specification
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: ProjectDirs,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let dirs = ProjectDirs::from("", "", "linuxmodmanager")
            .expect("failed to determine project directories");
        Self { dirs }
    }

    // ========== Config root ==========

    /// Config directory: ~/.config/linuxmodmanager/
    pub fn config_dir(&self) -> PathBuf {
        self.dirs.config_dir().to_path_buf()
    }

    /// Main settings file: ~/.config/linuxmodmanager/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// Game registry: ~/.config/linuxmodmanager/games.yaml
    pub fn games_file(&self) -> PathBuf {
        self.config_dir().join("games.yaml")
    }

    /// Profile directory root: ~/.config/linuxmodmanager/games/
    pub fn games_config_dir(&self) -> PathBuf {
        self.config_dir().join("games")
    }

    /// Profiles for a specific game: ~/.config/linuxmodmanager/games/<id>/profiles/
    pub fn game_profiles_dir(&self, game_id: &str) -> PathBuf {
        self.games_config_dir().join(game_id).join("profiles")
    }

    /// Override templates for a specific game: ~/.config/linuxmodmanager/games/<id>/overrides/
    pub fn game_overrides_dir(&self, game_id: &str) -> PathBuf {
        self.games_config_dir().join(game_id).join("overrides")
    }

    // ========== Data root ==========

    /// Data directory: ~/.local/share/linuxmodmanager/
    pub fn data_dir(&self) -> PathBuf {
        self.dirs.data_dir().to_path_buf()
    }

    /// Persistent store: ~/.local/share/linuxmodmanager/store.db
    pub fn database_file(&self) -> PathBuf {
        self.data_dir().join("store.db")
    }

    /// Default cache root: ~/.local/share/linuxmodmanager/cache/
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join("cache")
    }

    /// Cache directory for one game's key-space.
    pub fn game_cache_dir(&self, game_id: &str) -> PathBuf {
        self.cache_dir().join(game_id)
    }

    /// Transient download staging area: ~/.local/share/linuxmodmanager/downloads/
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir().join("downloads")
    }

    /// Advisory lock file path: ~/.local/share/linuxmodmanager/.lmm.lock
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir().join(".lmm.lock")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.games_config_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.cache_dir())?;
        std::fs::create_dir_all(self.downloads_dir())?;
        Ok(())
    }
}
