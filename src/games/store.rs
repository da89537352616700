//! Game persistence using SQLite.

use super::{Category, Game, GameStore, Page, StoreError};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Games table backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE games (
///     id           INTEGER PRIMARY KEY AUTOINCREMENT,
///     release_year INTEGER NOT NULL,
///     name         TEXT NOT NULL,
///     category     TEXT NOT NULL,
///     categories   TEXT NOT NULL DEFAULT '[]'  -- JSON array of {name}
/// );
/// ```
///
/// The connection is wrapped in a Mutex; every call holds it for one
/// statement.
pub struct SqliteGameStore {
    conn: Mutex<Connection>,
}

impl SqliteGameStore {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open games DB at {}", db_path.display()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS games (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                release_year INTEGER NOT NULL,
                name         TEXT NOT NULL,
                category     TEXT NOT NULL,
                categories   TEXT NOT NULL DEFAULT '[]'
            );",
        )
        .context("Failed to create games table")?;

        info!(path = %db_path.display(), "Games store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("games DB mutex poisoned"))
    }
}

fn encode_categories(categories: &[Category]) -> Result<String> {
    serde_json::to_string(categories).context("Failed to encode categories")
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<(Game, String)> {
    let game = Game {
        id: row.get(0)?,
        release_year: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        categories: Vec::new(),
    };
    Ok((game, row.get(4)?))
}

fn decode_categories((mut game, categories): (Game, String)) -> Result<Game> {
    game.categories = serde_json::from_str(&categories)
        .with_context(|| format!("Corrupt categories for game {}", game.id))?;
    Ok(game)
}

impl GameStore for SqliteGameStore {
    fn add(&self, game: &Game) -> Result<Game, StoreError> {
        let categories = encode_categories(&game.categories)?;
        let conn = self.conn()?;
        let id: i64 = conn
            .query_row(
                "INSERT INTO games (release_year, name, category, categories)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id",
                params![game.release_year, game.name, game.category, categories],
                |row| row.get(0),
            )
            .context("Failed to insert game")?;

        debug!(id, name = %game.name, "Game inserted");

        Ok(Game {
            id,
            ..game.clone()
        })
    }

    fn get(&self, id: i64) -> Result<Game, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, release_year, name, category, categories FROM games WHERE id = ?1",
                params![id],
                game_from_row,
            )
            .optional()
            .context("Failed to query game")?;

        match row {
            Some(row) => Ok(decode_categories(row)?),
            None => Err(StoreError::NotFound),
        }
    }

    fn list(&self, page: Page) -> Result<Vec<Game>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, release_year, name, category, categories FROM games
                 ORDER BY id ASC
                 LIMIT ?1 OFFSET ?2",
            )
            .context("Failed to prepare list query")?;

        let rows = stmt
            .query_map(params![page.size, page.offset()], game_from_row)
            .context("Failed to list games")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read game rows")?;

        let games = rows
            .into_iter()
            .map(decode_categories)
            .collect::<Result<Vec<_>>>()?;

        Ok(games)
    }

    fn update(&self, id: i64, game: &Game) -> Result<(), StoreError> {
        let categories = encode_categories(&game.categories)?;
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(
                "UPDATE games
                 SET release_year = ?2, name = ?3, category = ?4, categories = ?5
                 WHERE id = ?1",
                params![id, game.release_year, game.name, game.category, categories],
            )
            .context("Failed to update game")?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        debug!(id, "Game updated");
        Ok(())
    }

    fn remove(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute("DELETE FROM games WHERE id = ?1", params![id])
            .context("Failed to delete game")?;

        debug!(id, rows_affected, "Game delete executed");
        Ok(())
    }
}
