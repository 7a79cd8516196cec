//! Persistent store (§6): installed mods, their files, the deployed-file
//! ledger, the mod metadata cache, and auth tokens, all behind a single
//! SQLite connection. Migrations are forward-only and ordered; the
//! Integrity Verifier and ledger depend on schema versions 6 and 7
//! respectively (see [`MIGRATIONS`]).

mod schema;

pub use schema::*;

use crate::error::{CoreError, CoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const MIGRATIONS: &[(i64, &str)] = &[
    (1, r#"CREATE TABLE IF NOT EXISTS schema_migrations (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL
    );"#),
    (2, r#"CREATE TABLE IF NOT EXISTS installed_mods (
        source_id TEXT NOT NULL,
        mod_id TEXT NOT NULL,
        game_id TEXT NOT NULL,
        profile_name TEXT NOT NULL,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        author TEXT,
        update_policy INTEGER NOT NULL DEFAULT 0,
        enabled INTEGER NOT NULL DEFAULT 1,
        deployed INTEGER NOT NULL DEFAULT 0,
        installed_at TEXT NOT NULL,
        previous_version TEXT,
        link_method INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (source_id, mod_id, game_id, profile_name)
    );"#),
    (3, r#"CREATE TABLE IF NOT EXISTS installed_mod_files (
        source_id TEXT NOT NULL,
        mod_id TEXT NOT NULL,
        game_id TEXT NOT NULL,
        profile_name TEXT NOT NULL,
        file_id TEXT NOT NULL,
        checksum TEXT,
        PRIMARY KEY (source_id, mod_id, game_id, profile_name, file_id),
        FOREIGN KEY (source_id, mod_id, game_id, profile_name)
            REFERENCES installed_mods(source_id, mod_id, game_id, profile_name) ON DELETE CASCADE
    );"#),
    (4, r#"CREATE TABLE IF NOT EXISTS mod_cache (
        source_id TEXT NOT NULL,
        mod_id TEXT NOT NULL,
        game_id TEXT NOT NULL,
        metadata TEXT NOT NULL,
        cached_at TEXT NOT NULL,
        PRIMARY KEY (source_id, mod_id, game_id)
    );"#),
    (5, r#"CREATE TABLE IF NOT EXISTS auth_tokens (
        source_id TEXT PRIMARY KEY,
        token_data TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#),
    (6, r#"CREATE INDEX IF NOT EXISTS idx_installed_mods_game_profile
        ON installed_mods(game_id, profile_name);"#),
    (7, r#"CREATE TABLE IF NOT EXISTS deployed_files (
        game_id TEXT NOT NULL,
        profile_name TEXT NOT NULL,
        relative_path TEXT NOT NULL,
        source_id TEXT NOT NULL,
        mod_id TEXT NOT NULL,
        deployed_at TEXT NOT NULL,
        PRIMARY KEY (game_id, profile_name, relative_path)
    );"#),
];

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> CoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(MIGRATIONS[0].1)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |r| r.get(0))
            .unwrap_or(0);

        for (version, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }

    // ========== installed_mods ==========

    pub fn upsert_installed_mod(&self, row: &InstalledModRow) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO installed_mods
                (source_id, mod_id, game_id, profile_name, name, version, author,
                 update_policy, enabled, deployed, installed_at, previous_version, link_method)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
               ON CONFLICT(source_id, mod_id, game_id, profile_name) DO UPDATE SET
                 name = excluded.name,
                 version = excluded.version,
                 author = excluded.author,
                 update_policy = excluded.update_policy,
                 enabled = excluded.enabled,
                 deployed = excluded.deployed,
                 previous_version = excluded.previous_version,
                 link_method = excluded.link_method"#,
            params![
                row.source_id,
                row.mod_id,
                row.game_id,
                row.profile_name,
                row.name,
                row.version,
                row.author,
                row.update_policy.to_i32(),
                row.enabled as i32,
                row.deployed as i32,
                row.installed_at,
                row.previous_version,
                link_method_to_i32(row.link_method),
            ],
        )?;
        Ok(())
    }

    pub fn get_installed_mod(
        &self,
        source_id: &str,
        mod_id: &str,
        game_id: &str,
        profile_name: &str,
    ) -> CoreResult<Option<InstalledModRow>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM installed_mods WHERE source_id = ?1 AND mod_id = ?2 AND game_id = ?3 AND profile_name = ?4",
            params![source_id, mod_id, game_id, profile_name],
            InstalledModRow::from_row,
        )
        .optional()
        .map_err(CoreError::from)
    }

    pub fn list_installed_mods(&self, game_id: &str, profile_name: &str) -> CoreResult<Vec<InstalledModRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM installed_mods WHERE game_id = ?1 AND profile_name = ?2 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![game_id, profile_name], InstalledModRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_deployed(
        &self,
        source_id: &str,
        mod_id: &str,
        game_id: &str,
        profile_name: &str,
        deployed: bool,
    ) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE installed_mods SET deployed = ?1 WHERE source_id = ?2 AND mod_id = ?3 AND game_id = ?4 AND profile_name = ?5",
            params![deployed as i32, source_id, mod_id, game_id, profile_name],
        )?;
        Ok(())
    }

    pub fn remove_installed_mod(
        &self,
        source_id: &str,
        mod_id: &str,
        game_id: &str,
        profile_name: &str,
    ) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM installed_mods WHERE source_id = ?1 AND mod_id = ?2 AND game_id = ?3 AND profile_name = ?4",
            params![source_id, mod_id, game_id, profile_name],
        )?;
        Ok(())
    }

    // ========== installed_mod_files ==========

    pub fn upsert_installed_mod_file(&self, row: &InstalledModFileRow) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO installed_mod_files (source_id, mod_id, game_id, profile_name, file_id, checksum)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(source_id, mod_id, game_id, profile_name, file_id) DO UPDATE SET
                 checksum = excluded.checksum"#,
            params![
                row.source_id,
                row.mod_id,
                row.game_id,
                row.profile_name,
                row.file_id,
                row.checksum,
            ],
        )?;
        Ok(())
    }

    pub fn list_installed_mod_files(
        &self,
        source_id: &str,
        mod_id: &str,
        game_id: &str,
        profile_name: &str,
    ) -> CoreResult<Vec<InstalledModFileRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM installed_mod_files WHERE source_id = ?1 AND mod_id = ?2 AND game_id = ?3 AND profile_name = ?4",
        )?;
        let rows = stmt
            .query_map(params![source_id, mod_id, game_id, profile_name], InstalledModFileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========== deployed_files (ledger backing store) ==========

    pub fn ledger_record(
        &self,
        game_id: &str,
        profile_name: &str,
        relative_path: &str,
        source_id: &str,
        mod_id: &str,
        deployed_at: &str,
    ) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO deployed_files (game_id, profile_name, relative_path, source_id, mod_id, deployed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(game_id, profile_name, relative_path) DO UPDATE SET
                 source_id = excluded.source_id,
                 mod_id = excluded.mod_id,
                 deployed_at = excluded.deployed_at"#,
            params![game_id, profile_name, relative_path, source_id, mod_id, deployed_at],
        )?;
        Ok(())
    }

    pub fn ledger_owner(
        &self,
        game_id: &str,
        profile_name: &str,
        relative_path: &str,
    ) -> CoreResult<Option<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT source_id, mod_id FROM deployed_files WHERE game_id = ?1 AND profile_name = ?2 AND relative_path = ?3",
            params![game_id, profile_name, relative_path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(CoreError::from)
    }

    pub fn ledger_paths_for(
        &self,
        game_id: &str,
        profile_name: &str,
        source_id: &str,
        mod_id: &str,
    ) -> CoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT relative_path FROM deployed_files WHERE game_id = ?1 AND profile_name = ?2 AND source_id = ?3 AND mod_id = ?4",
        )?;
        let rows = stmt
            .query_map(params![game_id, profile_name, source_id, mod_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ledger_remove_all(
        &self,
        game_id: &str,
        profile_name: &str,
        source_id: &str,
        mod_id: &str,
    ) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM deployed_files WHERE game_id = ?1 AND profile_name = ?2 AND source_id = ?3 AND mod_id = ?4",
            params![game_id, profile_name, source_id, mod_id],
        )?;
        Ok(())
    }

    pub fn ledger_remove_path(&self, game_id: &str, profile_name: &str, relative_path: &str) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM deployed_files WHERE game_id = ?1 AND profile_name = ?2 AND relative_path = ?3",
            params![game_id, profile_name, relative_path],
        )?;
        Ok(())
    }

    pub fn ledger_conflicts(
        &self,
        game_id: &str,
        profile_name: &str,
        relative_paths: &[String],
    ) -> CoreResult<Vec<(String, String, String)>> {
        let mut out = Vec::new();
        for path in relative_paths {
            if let Some((source_id, mod_id)) = self.ledger_owner(game_id, profile_name, path)? {
                out.push((path.clone(), source_id, mod_id));
            }
        }
        Ok(out)
    }

    // ========== mod_cache (informational) ==========

    pub fn upsert_mod_cache_metadata(
        &self,
        source_id: &str,
        mod_id: &str,
        game_id: &str,
        metadata: &str,
    ) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO mod_cache (source_id, mod_id, game_id, metadata, cached_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(source_id, mod_id, game_id) DO UPDATE SET
                 metadata = excluded.metadata, cached_at = excluded.cached_at"#,
            params![source_id, mod_id, game_id, metadata, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ========== auth_tokens ==========

    pub fn set_auth_token(&self, source_id: &str, token_data: &str) -> CoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO auth_tokens (source_id, token_data, updated_at)
               VALUES (?1, ?2, ?3)
               ON CONFLICT(source_id) DO UPDATE SET token_data = excluded.token_data, updated_at = excluded.updated_at"#,
            params![source_id, token_data, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_auth_token(&self, source_id: &str) -> CoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT token_data FROM auth_tokens WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(profile: &str) -> InstalledModRow {
        InstalledModRow {
            source_id: "nexus".into(),
            mod_id: "42".into(),
            game_id: "skyrimse".into(),
            profile_name: profile.into(),
            name: "Mod A".into(),
            version: "1.0.0".into(),
            author: Some("author".into()),
            update_policy: UpdatePolicy::Auto,
            enabled: true,
            deployed: false,
            installed_at: "2026-01-01T00:00:00Z".into(),
            previous_version: None,
            link_method: LinkMethod::Symlink,
        }
    }

    #[test]
    fn idempotent_upsert_yields_one_row_with_latest_values() {
        let db = Database::open_in_memory().unwrap();
        let mut row = sample_row("default");
        db.upsert_installed_mod(&row).unwrap();
        row.version = "1.1.0".into();
        db.upsert_installed_mod(&row).unwrap();

        let rows = db.list_installed_mods("skyrimse", "default").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].version, "1.1.0");
    }

    #[test]
    fn ledger_upsert_overwrites_owner() {
        let db = Database::open_in_memory().unwrap();
        db.ledger_record("g", "p", "textures/a.dds", "nexus", "1", "t0").unwrap();
        db.ledger_record("g", "p", "textures/a.dds", "nexus", "2", "t1").unwrap();

        let owner = db.ledger_owner("g", "p", "textures/a.dds").unwrap().unwrap();
        assert_eq!(owner, ("nexus".to_string(), "2".to_string()));
    }

    #[test]
    fn ledger_conflicts_returns_exact_subset() {
        let db = Database::open_in_memory().unwrap();
        db.ledger_record("g", "p", "a.txt", "nexus", "1", "t0").unwrap();

        let conflicts = db
            .ledger_conflicts("g", "p", &["a.txt".into(), "b.txt".into()])
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].0, "a.txt");
    }

    #[test]
    fn migrations_are_idempotent_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_installed_mod(&sample_row("default")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_installed_mods("skyrimse", "default").unwrap().len(), 1);
    }
}
