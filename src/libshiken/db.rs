use crate::libshiken::kotoba::{Language, VocabItem, VocabUnit};
use chrono::Utc;
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Row};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

pub const MAX_WORKSPACES: usize = 3;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("a {0} workspace already exists")]
    WorkspaceExists(Language),
    #[error("at most {} workspaces are allowed", MAX_WORKSPACES)]
    WorkspaceLimit,
    #[error("workspace {0} not found")]
    WorkspaceNotFound(String),
    #[error("unit {0} not found")]
    UnitNotFound(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub id: String,
    pub owner: String,
    pub language: Language,
    pub name: String,
    pub created_at: String,
}

/// Units and their items, keyed by workspace.
pub struct UnitStore;

impl Workspace {
    fn from_row(row: &Row) -> rusqlite::Result<(String, String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn from_parts(parts: (String, String, String, String, String)) -> Result<Workspace> {
        let (id, owner, language, name, created_at) = parts;
        let language = language
            .parse()
            .map_err(|_| DbError::Corrupt(format!("workspace {} has language {:?}", id, language)))?;
        Ok(Workspace {
            id,
            owner,
            language,
            name,
            created_at,
        })
    }

    pub fn create(connection: &Connection, owner: &str, language: Language) -> Result<Workspace> {
        let existing = Self::get_all_for(connection, owner)?;
        if existing.iter().any(|w| w.language == language) {
            warn!("[DB] {} already has a {} workspace", owner, language);
            return Err(DbError::WorkspaceExists(language));
        }
        if existing.len() >= MAX_WORKSPACES {
            warn!("[DB] {} already has {} workspaces", owner, existing.len());
            return Err(DbError::WorkspaceLimit);
        }

        let now = Utc::now();
        let workspace = Workspace {
            id: format!("{}-{}-{}", owner, language, now.timestamp_millis()),
            owner: owner.to_string(),
            language,
            name: language.name().to_string(),
            created_at: now.to_rfc3339(),
        };
        match connection.execute(
            "INSERT INTO Workspace(id, owner, language, name, createdAt) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                workspace.id,
                workspace.owner,
                workspace.language.as_str(),
                workspace.name,
                workspace.created_at
            ],
        ) {
            Ok(_) => {
                debug!("[DB] Created Workspace '{}' for {}", workspace.id, owner);
                Ok(workspace)
            }
            Err(err) => {
                error!("[DB] Error while creating Workspace: {:?}", err);
                Err(err.into())
            }
        }
    }

    pub fn get_all_for(connection: &Connection, owner: &str) -> Result<Vec<Workspace>> {
        let mut statement = connection.prepare(
            "SELECT id, owner, language, name, createdAt FROM Workspace \
            WHERE owner = :owner ORDER BY createdAt, id",
        )?;
        let rows = statement.query_map(&[(":owner", owner)], Self::from_row)?;

        rows.map(|row| Self::from_parts(row?)).collect()
    }

    pub fn get_for_language(
        connection: &Connection,
        owner: &str,
        language: Language,
    ) -> Result<Option<Workspace>> {
        let mut statement = connection.prepare(
            "SELECT id, owner, language, name, createdAt FROM Workspace \
            WHERE owner = ?1 AND language = ?2 LIMIT 1",
        )?;
        match statement
            .query_row(params![owner, language.as_str()], Self::from_row)
            .optional()?
        {
            Some(parts) => Ok(Some(Self::from_parts(parts)?)),
            None => Ok(None),
        }
    }

    /// Removes the workspace with all of its units.
    pub fn delete(connection: &Connection, owner: &str, id: &str) -> Result<()> {
        let tx = connection.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM Workspace WHERE id = ?1 AND owner = ?2",
            params![id, owner],
        )?;
        if removed == 0 {
            warn!("[DB] No Workspace '{}' for {}", id, owner);
            return Err(DbError::WorkspaceNotFound(id.to_string()));
        }
        tx.execute("DELETE FROM Item WHERE workspaceId = ?1", params![id])?;
        tx.execute("DELETE FROM Unit WHERE workspaceId = ?1", params![id])?;
        tx.commit()?;
        debug!("[DB] Deleted Workspace '{}'", id);
        Ok(())
    }
}

impl UnitStore {
    fn items(connection: &Connection, workspace_id: &str, file_name: &str) -> Result<Vec<VocabItem>> {
        let mut statement = connection.prepare(
            "SELECT foreignText, foreignAlt, nativeText FROM Item \
            WHERE workspaceId = ?1 AND fileName = ?2 ORDER BY position",
        )?;
        let rows = statement.query_map(params![workspace_id, file_name], |row| {
            Ok(VocabItem {
                foreign: row.get(0)?,
                foreign_alt: row.get(1)?,
                native: row.get(2)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn unit_from_row(row: &Row) -> rusqlite::Result<(String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn assemble(
        connection: &Connection,
        workspace_id: &str,
        (file_name, name, language): (String, String, String),
    ) -> Result<VocabUnit> {
        let language = language
            .parse()
            .map_err(|_| DbError::Corrupt(format!("unit {} has language {:?}", file_name, language)))?;
        let items = Self::items(connection, workspace_id, &file_name)?;
        Ok(VocabUnit {
            name,
            file_name,
            language,
            items,
        })
    }

    pub fn get_all(connection: &Connection, workspace_id: &str) -> Result<Vec<VocabUnit>> {
        let now = Instant::now();
        let mut statement = connection.prepare(
            "SELECT fileName, name, language FROM Unit WHERE workspaceId = ?1 ORDER BY rowid",
        )?;
        let heads = statement
            .query_map(params![workspace_id], Self::unit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let units = heads
            .into_iter()
            .map(|head| Self::assemble(connection, workspace_id, head))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "[DB] Loaded {} units of '{}' in {} ms.",
            units.len(),
            workspace_id,
            now.elapsed().as_millis()
        );
        Ok(units)
    }

    pub fn get_one(connection: &Connection, workspace_id: &str, file_name: &str) -> Result<VocabUnit> {
        let mut statement = connection.prepare(
            "SELECT fileName, name, language FROM Unit WHERE workspaceId = ?1 AND fileName = ?2 LIMIT 1",
        )?;
        let head = statement
            .query_row(params![workspace_id, file_name], Self::unit_from_row)
            .optional()?
            .ok_or_else(|| DbError::UnitNotFound(file_name.to_string()))?;

        Self::assemble(connection, workspace_id, head)
    }

    /// Inserts the unit, or replaces the one with the same file name wholesale.
    pub fn save(connection: &Connection, workspace_id: &str, unit: &VocabUnit) -> Result<()> {
        let tx = connection.unchecked_transaction()?;
        let known: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM Workspace WHERE id = ?1",
                params![workspace_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(DbError::WorkspaceNotFound(workspace_id.to_string()));
        }

        tx.execute(
            "INSERT INTO Unit(workspaceId, fileName, name, language) VALUES (?1, ?2, ?3, ?4) \
            ON CONFLICT(workspaceId, fileName) DO UPDATE SET name = excluded.name, language = excluded.language",
            params![workspace_id, unit.file_name, unit.name, unit.language.as_str()],
        )?;
        tx.execute(
            "DELETE FROM Item WHERE workspaceId = ?1 AND fileName = ?2",
            params![workspace_id, unit.file_name],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO Item(workspaceId, fileName, position, foreignText, foreignAlt, nativeText) \
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, item) in unit.items.iter().enumerate() {
                insert.execute(params![
                    workspace_id,
                    unit.file_name,
                    position as i64,
                    item.foreign,
                    item.foreign_alt,
                    item.native
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            "[DB] Saved Unit '{}' ({} items) to '{}'",
            unit.file_name,
            unit.items.len(),
            workspace_id
        );
        Ok(())
    }

    pub fn delete(connection: &Connection, workspace_id: &str, file_name: &str) -> Result<()> {
        let tx = connection.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM Item WHERE workspaceId = ?1 AND fileName = ?2",
            params![workspace_id, file_name],
        )?;
        let removed = tx.execute(
            "DELETE FROM Unit WHERE workspaceId = ?1 AND fileName = ?2",
            params![workspace_id, file_name],
        )?;
        if removed == 0 {
            return Err(DbError::UnitNotFound(file_name.to_string()));
        }
        tx.commit()?;
        debug!("[DB] Deleted Unit '{}' from '{}'", file_name, workspace_id);
        Ok(())
    }
}

pub fn create_or_open(src: &Path) -> Result<Connection> {
    if src.exists() {
        info!("[DB] Opening existing Database");
        open_db(src)
    } else {
        info!("[DB] Creating new Database");
        create_db(src)
    }
}

pub fn create_db(dest: &Path) -> Result<Connection> {
    let now = Instant::now();
    let db = init_db(Connection::open_in_memory()?)?;
    match db.backup(DatabaseName::Main, dest, None) {
        Ok(_) => {
            debug!(
                "[DB] Creating and Saving took {} ms.",
                now.elapsed().as_millis()
            );
            close_db(db)?;
            open_db(dest)
        }
        Err(err) => {
            warn!("[DB] Failed to create database file: {}", err);
            close_db(db)?;
            Err(err.into())
        }
    }
}

pub fn open_db(src: &Path) -> Result<Connection> {
    let now = Instant::now();
    let db = Connection::open(src)?;
    debug!("[DB] Opening took {} ms.", now.elapsed().as_millis());
    Ok(db)
}

pub fn close_db(connection: Connection) -> Result<()> {
    info!("[DB] Closing Database");
    match connection.close() {
        Ok(_) => Ok(()),
        Err((conn, _)) => {
            error!("[DB] Cannot close connection. Retrying 1/1...");
            conn.close().map_err(|(_, err)| err.into())
        }
    }
}

pub fn init_db(conn: Connection) -> Result<Connection> {
    info!("[DB INIT] Creating tables");
    conn.execute(
        "CREATE TABLE Workspace (
              id TEXT NOT NULL PRIMARY KEY,
              owner TEXT NOT NULL,
              language TEXT NOT NULL,
              name TEXT NOT NULL,
              createdAt TEXT NOT NULL,
              UNIQUE (owner, language)
            )",
        (),
    )?;
    info!("[DB INIT] Created table Workspace");
    conn.execute(
        "CREATE TABLE Unit (
              workspaceId TEXT NOT NULL,
              fileName TEXT NOT NULL,
              name TEXT NOT NULL,
              language TEXT NOT NULL,
              PRIMARY KEY (workspaceId, fileName),
              FOREIGN KEY (workspaceId) REFERENCES Workspace(id) ON DELETE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table Unit");
    conn.execute(
        "CREATE TABLE Item (
              workspaceId TEXT NOT NULL,
              fileName TEXT NOT NULL,
              position INTEGER NOT NULL,
              foreignText TEXT NOT NULL,
              foreignAlt TEXT,
              nativeText TEXT NOT NULL,
              PRIMARY KEY (workspaceId, fileName, position),
              FOREIGN KEY (workspaceId, fileName) REFERENCES Unit(workspaceId, fileName) ON DELETE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table Item");
    conn.execute("CREATE INDEX Workspace_owner_idx ON Workspace(owner)", ())?;
    info!("[DB INIT] Created index Workspace_owner_idx");
    info!("[DB INIT] Database Creation Successful!");

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        init_db(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn unit(file_name: &str, words: &[(&str, Option<&str>, &str)]) -> VocabUnit {
        let items = words
            .iter()
            .map(|(f, alt, n)| VocabItem::new(f, *alt, n).unwrap())
            .collect();
        VocabUnit::new(file_name, Language::Japanese, items)
    }

    #[test]
    fn one_workspace_per_language_per_user() {
        let db = memory_db();
        let ja = Workspace::create(&db, "mai", Language::Japanese).unwrap();
        assert_eq!(ja.name, "日本語");
        assert!(ja.id.starts_with("mai-japanese-"));

        assert!(matches!(
            Workspace::create(&db, "mai", Language::Japanese),
            Err(DbError::WorkspaceExists(Language::Japanese))
        ));
        Workspace::create(&db, "mai", Language::Chinese).unwrap();
        Workspace::create(&db, "mai", Language::English).unwrap();
        // a different user starts from zero
        Workspace::create(&db, "lan", Language::Japanese).unwrap();

        let all = Workspace::get_all_for(&db, "mai").unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(
            Workspace::get_for_language(&db, "mai", Language::Japanese).unwrap(),
            Some(ja)
        );
        assert_eq!(
            Workspace::get_for_language(&db, "nobody", Language::Japanese).unwrap(),
            None
        );
    }

    #[test]
    fn same_language_for_two_users_back_to_back() {
        let db = memory_db();
        let mai = Workspace::create(&db, "mai", Language::English).unwrap();
        let lan = Workspace::create(&db, "lan", Language::English).unwrap();
        assert_ne!(mai.id, lan.id);

        let unit = unit("bai1.csv", &[("cat", None, "con mèo")]);
        UnitStore::save(&db, &mai.id, &unit).unwrap();
        assert_eq!(UnitStore::get_all(&db, &mai.id).unwrap().len(), 1);
        assert!(UnitStore::get_all(&db, &lan.id).unwrap().is_empty());

        Workspace::delete(&db, "mai", &mai.id).unwrap();
        assert_eq!(
            Workspace::get_for_language(&db, "lan", Language::English).unwrap(),
            Some(lan)
        );
    }

    #[test]
    fn corrupt_language_is_reported() {
        let db = memory_db();
        db.execute(
            "INSERT INTO Workspace(id, owner, language, name, createdAt) \
            VALUES ('w9', 'mai', 'klingon', 'x', '2025-01-01T00:00:00+00:00')",
            (),
        )
        .unwrap();
        assert!(matches!(
            Workspace::get_all_for(&db, "mai"),
            Err(DbError::Corrupt(_))
        ));
    }

    #[test]
    fn save_replaces_by_file_name_and_keeps_order() {
        let db = memory_db();
        let ws = Workspace::create(&db, "mai", Language::Japanese).unwrap();

        let first = unit("bai1.xlsx", &[("猫", None, "con mèo"), ("犬", None, "con chó")]);
        UnitStore::save(&db, &ws.id, &first).unwrap();
        UnitStore::save(&db, &ws.id, &unit("bai2.xlsx", &[("水", None, "nước")])).unwrap();

        let replaced = unit(
            "bai1.xlsx",
            &[("食べる", Some("たべる"), "ăn"), ("飲む", None, "uống"), ("猫", None, "con mèo")],
        );
        UnitStore::save(&db, &ws.id, &replaced).unwrap();

        let units = UnitStore::get_all(&db, &ws.id).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0], replaced);
        assert_eq!(units[0].items[0].foreign_alt.as_deref(), Some("たべる"));
        assert_eq!(units[1].name, "bai2");

        assert_eq!(UnitStore::get_one(&db, &ws.id, "bai2.xlsx").unwrap().items.len(), 1);
    }

    #[test]
    fn delete_unit_and_workspace() {
        let db = memory_db();
        let ws = Workspace::create(&db, "mai", Language::Japanese).unwrap();
        UnitStore::save(&db, &ws.id, &unit("bai1.xlsx", &[("猫", None, "con mèo")])).unwrap();
        UnitStore::save(&db, &ws.id, &unit("bai2.xlsx", &[("水", None, "nước")])).unwrap();

        UnitStore::delete(&db, &ws.id, "bai1.xlsx").unwrap();
        assert!(matches!(
            UnitStore::get_one(&db, &ws.id, "bai1.xlsx"),
            Err(DbError::UnitNotFound(_))
        ));
        assert!(matches!(
            UnitStore::delete(&db, &ws.id, "bai1.xlsx"),
            Err(DbError::UnitNotFound(_))
        ));

        assert!(matches!(
            Workspace::delete(&db, "someone-else", &ws.id),
            Err(DbError::WorkspaceNotFound(_))
        ));
        Workspace::delete(&db, "mai", &ws.id).unwrap();
        assert!(Workspace::get_all_for(&db, "mai").unwrap().is_empty());
        assert!(UnitStore::get_all(&db, &ws.id).unwrap().is_empty());
        let orphans: i64 = db
            .query_row("SELECT COUNT(*) FROM Item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn saving_into_missing_workspace_fails() {
        let db = memory_db();
        assert!(matches!(
            UnitStore::save(&db, "nope", &unit("a.csv", &[("a", None, "b")])),
            Err(DbError::WorkspaceNotFound(_))
        ));
    }

    #[test]
    fn database_file_is_created_then_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.db");
        let db = create_or_open(&path).unwrap();
        Workspace::create(&db, "mai", Language::English).unwrap();
        close_db(db).unwrap();

        let db = create_or_open(&path).unwrap();
        assert_eq!(Workspace::get_all_for(&db, "mai").unwrap().len(), 1);
        close_db(db).unwrap();
    }
}
