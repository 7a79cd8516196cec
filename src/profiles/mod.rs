//! Profile documents (§3, §4.8): named, ordered mod lists with per-game
//! link method, overrides, and hook inheritance.

mod store;

pub use store::ProfileStore;

use crate::model::ModReference;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the four points a hook can run at (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookSlot {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl HookSlot {
    pub fn name(&self, operation: &str) -> String {
        let slot = match self {
            HookSlot::BeforeAll => "before_all",
            HookSlot::BeforeEach => "before_each",
            HookSlot::AfterEach => "after_each",
            HookSlot::AfterAll => "after_all",
        };
        format!("{operation}.{slot}")
    }
}

/// Hook script paths per slot. An entry being present in `hooks` only
/// takes effect at the profile level when the matching `hooks_explicit`
/// flag is set — otherwise the game-level hook is inherited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSet {
    pub before_all: Option<String>,
    pub before_each: Option<String>,
    pub after_each: Option<String>,
    pub after_all: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HookExplicit {
    pub before_all: bool,
    pub before_each: bool,
    pub after_each: bool,
    pub after_all: bool,
}

impl HookSet {
    /// Resolve the effective script for a slot given the game-level
    /// default and this profile's explicit-override flags.
    pub fn effective<'a>(&'a self, slot: HookSlot, explicit: &HookExplicit, game_default: Option<&'a str>) -> Option<&'a str> {
        let (profile_value, is_explicit) = match slot {
            HookSlot::BeforeAll => (self.before_all.as_deref(), explicit.before_all),
            HookSlot::BeforeEach => (self.before_each.as_deref(), explicit.before_each),
            HookSlot::AfterEach => (self.after_each.as_deref(), explicit.after_each),
            HookSlot::AfterAll => (self.after_all.as_deref(), explicit.after_all),
        };

        if is_explicit {
            // Explicit empty string means "disable the inherited hook".
            profile_value.filter(|s| !s.is_empty())
        } else {
            game_default
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileModEntry {
    pub reference: ModReference,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub game_id: String,
    pub name: String,
    pub is_default: bool,
    /// Load order: later entries win on file conflict.
    pub mods: Vec<ProfileModEntry>,
    pub link_method: Option<crate::deploy::LinkMethod>,
    /// Relative path (under the game's install directory) -> file bytes.
    pub overrides: HashMap<String, Vec<u8>>,
    pub hooks: HookSet,
    pub hooks_explicit: HookExplicit,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    /// An empty, unnamed profile standing in for "no default profile yet"
    /// (§4.11 phase 1's `current` when nothing has ever been deployed).
    pub fn sentinel(game_id: impl Into<String>) -> Self {
        Self::new(game_id, "")
    }

    pub fn new(game_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            game_id: game_id.into(),
            name: name.into(),
            is_default: false,
            mods: Vec::new(),
            link_method: None,
            overrides: HashMap::new(),
            hooks: HookSet::default(),
            hooks_explicit: HookExplicit::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
