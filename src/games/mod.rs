//! Game resource: model, pagination and the storage contract.

mod store;


pub use store::SqliteGameStore;

use serde::{Deserialize, Serialize};

/// A game record as exposed over HTTP.
///
/// `id` is assigned by the store; any id supplied on create or update is
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(default)]
    pub id: i64,
    pub release_year: i32,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// An additional category tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
}

/// Validated page request. Offset is `page * size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Page {
    /// Validate raw query values against `max_size`
    pub fn new(page: i64, size: i64, max_size: u32) -> Result<Self, PageError> {
        if page < 0 {
            return Err(PageError::NegativePage);
        }
        if size < 1 {
            return Err(PageError::SizeTooSmall);
        }
        if size > i64::from(max_size) {
            return Err(PageError::SizeTooLarge { max: max_size });
        }
        // Offset must fit a SQLite integer
        if page.checked_mul(size).is_none() {
            return Err(PageError::PageTooLarge);
        }
        let page = u32::try_from(page).map_err(|_| PageError::PageTooLarge)?;

        Ok(Self {
            page,
            size: size as u32,
        })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }
}

/// Page validation errors
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page must not be negative")]
    NegativePage,
    #[error("page is too large")]
    PageTooLarge,
    #[error("size must be at least 1")]
    SizeTooSmall,
    #[error("size must not exceed {max}")]
    SizeTooLarge { max: u32 },
}

/// Storage errors. `NotFound` is the only variant callers branch on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("game not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// CRUD contract over games, independent of the storage technology.
pub trait GameStore: Send + Sync {
    /// Insert `game`, returning it with the assigned id
    fn add(&self, game: &Game) -> Result<Game, StoreError>;

    fn get(&self, id: i64) -> Result<Game, StoreError>;

    /// Games ordered by id, `page.size` at a time
    fn list(&self, page: Page) -> Result<Vec<Game>, StoreError>;

    /// Replace every field except the id. `NotFound` when no row matched.
    fn update(&self, id: i64, game: &Game) -> Result<(), StoreError>;

    /// Delete by id. Deleting a missing id succeeds.
    fn remove(&self, id: i64) -> Result<(), StoreError>;
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path (`:memory:` for an in-process database)
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "games.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}
