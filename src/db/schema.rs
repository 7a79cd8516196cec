//! Row types for the persistent store (§6 "Persistent store schema").

pub use crate::deploy::LinkMethod;
use rusqlite::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    Auto,
    Notify,
    Pinned,
}

impl UpdatePolicy {
    pub fn to_i32(self) -> i32 {
        match self {
            UpdatePolicy::Auto => 0,
            UpdatePolicy::Notify => 1,
            UpdatePolicy::Pinned => 2,
        }
    }

    pub fn from_i32(v: i32) -> Self {
        match v {
            2 => UpdatePolicy::Pinned,
            1 => UpdatePolicy::Notify,
            _ => UpdatePolicy::Auto,
        }
    }
}

pub fn link_method_to_i32(m: LinkMethod) -> i32 {
    match m {
        LinkMethod::Symlink => 0,
        LinkMethod::Hardlink => 1,
        LinkMethod::Copy => 2,
    }
}

pub fn link_method_from_i32(v: i32) -> LinkMethod {
    match v {
        1 => LinkMethod::Hardlink,
        2 => LinkMethod::Copy,
        _ => LinkMethod::Symlink,
    }
}

/// Row in `installed_mods`. Key: (source_id, mod_id, game_id, profile_name).
#[derive(Debug, Clone)]
pub struct InstalledModRow {
    pub source_id: String,
    pub mod_id: String,
    pub game_id: String,
    pub profile_name: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub update_policy: UpdatePolicy,
    pub enabled: bool,
    pub deployed: bool,
    pub installed_at: String,
    pub previous_version: Option<String>,
    pub link_method: LinkMethod,
}

impl InstalledModRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source_id: row.get("source_id")?,
            mod_id: row.get("mod_id")?,
            game_id: row.get("game_id")?,
            profile_name: row.get("profile_name")?,
            name: row.get("name")?,
            version: row.get("version")?,
            author: row.get("author")?,
            update_policy: UpdatePolicy::from_i32(row.get("update_policy")?),
            enabled: row.get::<_, i32>("enabled")? != 0,
            deployed: row.get::<_, i32>("deployed")? != 0,
            installed_at: row.get("installed_at")?,
            previous_version: row.get("previous_version")?,
            link_method: link_method_from_i32(row.get("link_method")?),
        })
    }
}

/// Row in `installed_mod_files`. Child of `installed_mods`, keyed by file_id.
#[derive(Debug, Clone)]
pub struct InstalledModFileRow {
    pub source_id: String,
    pub mod_id: String,
    pub game_id: String,
    pub profile_name: String,
    pub file_id: String,
    pub checksum: Option<String>,
}

impl InstalledModFileRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source_id: row.get("source_id")?,
            mod_id: row.get("mod_id")?,
            game_id: row.get("game_id")?,
            profile_name: row.get("profile_name")?,
            file_id: row.get("file_id")?,
            checksum: row.get("checksum")?,
        })
    }
}

/// Row in `deployed_files`. Key: (game_id, profile_name, relative_path).
#[derive(Debug, Clone)]
pub struct DeployedFileRow {
    pub game_id: String,
    pub profile_name: String,
    pub relative_path: String,
    pub source_id: String,
    pub mod_id: String,
    pub deployed_at: String,
}

impl DeployedFileRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            game_id: row.get("game_id")?,
            profile_name: row.get("profile_name")?,
            relative_path: row.get("relative_path")?,
            source_id: row.get("source_id")?,
            mod_id: row.get("mod_id")?,
            deployed_at: row.get("deployed_at")?,
        })
    }
}
