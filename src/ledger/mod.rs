//! Deployed-file ledger (§4.5): the persisted mapping of deployed paths to
//! their owning mod, per (game, profile). Expresses no conflict policy
//! itself — it only records the final owner; the Installer decides what
//! to do about conflicts.

use crate::db::Database;
use crate::error::CoreResult;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub source_id: String,
    pub mod_id: String,
}

pub struct Ledger {
    db: Arc<Database>,
}

impl Ledger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn record(&self, game_id: &str, profile: &str, relative_path: &str, owner: &Owner) -> CoreResult<()> {
        self.db.ledger_record(
            game_id,
            profile,
            relative_path,
            &owner.source_id,
            &owner.mod_id,
            &chrono::Utc::now().to_rfc3339(),
        )
    }

    pub fn owner(&self, game_id: &str, profile: &str, relative_path: &str) -> CoreResult<Option<Owner>> {
        Ok(self
            .db
            .ledger_owner(game_id, profile, relative_path)?
            .map(|(source_id, mod_id)| Owner { source_id, mod_id }))
    }

    pub fn paths_for(&self, game_id: &str, profile: &str, owner: &Owner) -> CoreResult<Vec<String>> {
        self.db
            .ledger_paths_for(game_id, profile, &owner.source_id, &owner.mod_id)
    }

    pub fn remove_all(&self, game_id: &str, profile: &str, owner: &Owner) -> CoreResult<()> {
        self.db
            .ledger_remove_all(game_id, profile, &owner.source_id, &owner.mod_id)
    }

    pub fn remove_path(&self, game_id: &str, profile: &str, relative_path: &str) -> CoreResult<()> {
        self.db.ledger_remove_path(game_id, profile, relative_path)
    }

    /// Set-intersection of `relative_paths` with the currently recorded
    /// owners, each paired with its owner (§P8).
    pub fn conflicts(
        &self,
        game_id: &str,
        profile: &str,
        relative_paths: &[String],
    ) -> CoreResult<Vec<(String, Owner)>> {
        Ok(self
            .db
            .ledger_conflicts(game_id, profile, relative_paths)?
            .into_iter()
            .map(|(path, source_id, mod_id)| (path, Owner { source_id, mod_id }))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: &str) -> Owner {
        Owner {
            source_id: "nexus".into(),
            mod_id: id.into(),
        }
    }

    #[test]
    fn record_and_owner_round_trip() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ledger = Ledger::new(db);
        ledger.record("g", "p", "a.esp", &owner("1")).unwrap();
        assert_eq!(ledger.owner("g", "p", "a.esp").unwrap(), Some(owner("1")));
    }

    #[test]
    fn remove_all_clears_every_path_for_owner() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ledger = Ledger::new(db);
        ledger.record("g", "p", "a.esp", &owner("1")).unwrap();
        ledger.record("g", "p", "b.esp", &owner("1")).unwrap();
        ledger.record("g", "p", "c.esp", &owner("2")).unwrap();

        ledger.remove_all("g", "p", &owner("1")).unwrap();

        assert!(ledger.paths_for("g", "p", &owner("1")).unwrap().is_empty());
        assert_eq!(ledger.paths_for("g", "p", &owner("2")).unwrap(), vec!["c.esp"]);
    }

    #[test]
    fn conflicts_returns_exact_subset_with_owner() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ledger = Ledger::new(db);
        ledger.record("g", "p", "a.esp", &owner("1")).unwrap();

        let found = ledger
            .conflicts("g", "p", &["a.esp".into(), "z.esp".into()])
            .unwrap();
        assert_eq!(found, vec![("a.esp".to_string(), owner("1"))]);
    }
}
