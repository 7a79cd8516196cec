//! Core data-model value types shared across components (§3). These are
//! in-memory values, not persisted rows — see [`crate::db::schema`] for
//! the on-disk representation of installed mods.

use serde::{Deserialize, Serialize};

/// `(source_id, mod_id, version, file_ids[])` — an immutable reference to
/// one version of one mod on one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModReference {
    pub source_id: String,
    pub mod_id: String,
    pub version: String,
    pub file_ids: Vec<String>,
}

impl ModReference {
    /// The stable "{source}:{id}" key used by the resolver and error messages.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_id, self.mod_id)
    }
}

/// A dependency is a ModReference without a version — any version satisfies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub source_id: String,
    pub mod_id: String,
}

impl Dependency {
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_id, self.mod_id)
    }
}

/// A ModReference plus descriptive metadata, as obtained from a Source.
/// Not persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mod {
    pub reference: ModReference,
    pub name: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub dependencies: Vec<Dependency>,
}

impl Mod {
    pub fn key(&self) -> String {
        self.reference.key()
    }
}
