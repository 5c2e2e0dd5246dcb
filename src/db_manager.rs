//! SQLite-backed store assigning durable artist and album ids.

use std::path::Path;

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

/// Normalizes a display name for ordering and matching: whitespace collapsed,
/// lowercased.
pub fn sort_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    /// Opens the library database, creating the schema when missing.
    ///
    /// Without an explicit path the database lives under the platform data
    /// directory.
    pub fn new(path: Option<&Path>) -> Result<Self, rusqlite::Error> {
        let conn = match path {
            Some(path) => Connection::open(path)?,
            None => {
                let data_dir = dirs::data_dir()
                    .expect("Could not find data directory")
                    .join("discograph");
                if !data_dir.exists() {
                    std::fs::create_dir_all(&data_dir).expect("Could not create data directory");
                }
                Connection::open(data_dir.join("library.db"))?
            }
        };

        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    /// In-memory database, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let db_manager = Self {
            conn: Connection::open_in_memory()?,
        };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS artists (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                sortname TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS albums (
                id INTEGER PRIMARY KEY,
                artist_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                sortname TEXT NOT NULL,
                UNIQUE(artist_id, name),
                FOREIGN KEY(artist_id) REFERENCES artists(id)
            )",
            [],
        )?;
        Ok(())
    }

    /// Durable id for an artist name; `auto_create` inserts on miss.
    pub fn artist_id(&self, name: &str, auto_create: bool) -> Result<Option<u32>, rusqlite::Error> {
        let existing = self
            .conn
            .query_row(
                "SELECT id FROM artists WHERE name = ?1 COLLATE NOCASE",
                params![name],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        if existing.is_some() || !auto_create {
            return Ok(existing);
        }

        self.conn.execute(
            "INSERT INTO artists (name, sortname) VALUES (?1, ?2)",
            params![name, sort_name(name)],
        )?;
        let id = self.conn.last_insert_rowid() as u32;
        debug!("DbManager: created artist '{}' with id {}", name, id);
        Ok(Some(id))
    }

    /// Durable id for an `(artist, album)` pair; `auto_create` inserts both
    /// rows on miss.
    pub fn album_id(
        &self,
        artist: &str,
        album: &str,
        auto_create: bool,
    ) -> Result<Option<u32>, rusqlite::Error> {
        let Some(artist_id) = self.artist_id(artist, auto_create)? else {
            return Ok(None);
        };

        let existing = self
            .conn
            .query_row(
                "SELECT id FROM albums WHERE artist_id = ?1 AND name = ?2 COLLATE NOCASE",
                params![artist_id, album],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        if existing.is_some() || !auto_create {
            return Ok(existing);
        }

        self.conn.execute(
            "INSERT INTO albums (artist_id, name, sortname) VALUES (?1, ?2, ?3)",
            params![artist_id, album, sort_name(album)],
        )?;
        let id = self.conn.last_insert_rowid() as u32;
        debug!(
            "DbManager: created album '{}' by '{}' with id {}",
            album, artist, id
        );
        Ok(Some(id))
    }
}
