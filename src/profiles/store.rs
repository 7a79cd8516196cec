//! YAML-backed profile store (§4.8): one file per profile, one directory
//! per game.

use super::Profile;
use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn game_dir(&self, game_id: &str) -> PathBuf {
        self.root.join(game_id)
    }

    fn profile_path(&self, game_id: &str, name: &str) -> PathBuf {
        self.game_dir(game_id).join(format!("{name}.yaml"))
    }

    pub fn create(&self, game_id: &str, name: &str) -> CoreResult<Profile> {
        if self.profile_path(game_id, name).exists() {
            return Err(CoreError::DuplicateProfile(name.to_string()));
        }
        let profile = Profile::new(game_id, name);
        self.save(&profile)?;
        Ok(profile)
    }

    pub fn list(&self, game_id: &str) -> CoreResult<Vec<Profile>> {
        let dir = self.game_dir(game_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut profiles = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                profiles.push(self.load_path(&path)?);
            }
        }
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    pub fn load(&self, game_id: &str, name: &str) -> CoreResult<Profile> {
        let path = self.profile_path(game_id, name);
        if !path.exists() {
            return Err(CoreError::NotFound(format!("profile {name}")));
        }
        self.load_path(&path)
    }

    fn load_path(&self, path: &Path) -> CoreResult<Profile> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| CoreError::Serde(e.to_string()))
    }

    pub fn save(&self, profile: &Profile) -> CoreResult<()> {
        let dir = self.game_dir(&profile.game_id);
        std::fs::create_dir_all(&dir)?;
        let content = serde_yaml::to_string(profile).map_err(|e| CoreError::Serde(e.to_string()))?;
        std::fs::write(self.profile_path(&profile.game_id, &profile.name), content)?;
        Ok(())
    }

    pub fn delete(&self, game_id: &str, name: &str) -> CoreResult<()> {
        let path = self.profile_path(game_id, name);
        if !path.exists() {
            return Err(CoreError::NotFound(format!("profile {name}")));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Set `name` as default for `game_id`; clears the flag on every other
    /// profile in that game. At most one `is_default` per game.
    pub fn set_default(&self, game_id: &str, name: &str) -> CoreResult<()> {
        let mut profiles = self.list(game_id)?;
        if !profiles.iter().any(|p| p.name == name) {
            return Err(CoreError::NotFound(format!("profile {name}")));
        }
        for profile in &mut profiles {
            let should_be_default = profile.name == name;
            if profile.is_default != should_be_default {
                profile.is_default = should_be_default;
                profile.touch();
                self.save(profile)?;
            }
        }
        Ok(())
    }

    /// The flagged default, else the first listed, else `NotFound`.
    pub fn get_default(&self, game_id: &str) -> CoreResult<Profile> {
        let profiles = self.list(game_id)?;
        if let Some(default) = profiles.iter().find(|p| p.is_default) {
            return Ok(default.clone());
        }
        profiles
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("default profile for {game_id}")))
    }

    pub fn export(&self, game_id: &str, name: &str) -> CoreResult<Vec<u8>> {
        let profile = self.load(game_id, name)?;
        serde_yaml::to_string(&profile)
            .map(|s| s.into_bytes())
            .map_err(|e| CoreError::Serde(e.to_string()))
    }

    pub fn import(&self, game_id: &str, bytes: &[u8], force: bool) -> CoreResult<Profile> {
        let mut profile: Profile = serde_yaml::from_slice(bytes).map_err(|e| CoreError::Serde(e.to_string()))?;
        profile.game_id = game_id.to_string();
        profile.is_default = false;

        if self.profile_path(game_id, &profile.name).exists() && !force {
            return Err(CoreError::DuplicateProfile(profile.name.clone()));
        }

        self.save(&profile)?;
        Ok(profile)
    }
}
