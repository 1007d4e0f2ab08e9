//! Arena persistence.
//!
//! Data model (table `arenas`):
//!   id            uuid primary key
//!   arena_index   bigserial, the market id on the ledger
//!   tweet_id      text, unique - the only guard against duplicate arenas
//!   status        'active' | 'locked' | 'resolved'
//!   outcome       'yes' | 'no' | null, non-null iff resolved
//!   first_demo_bet_at  set by the API when the first wager is confirmed
//!                      (`Arena::first_bet_at` on the Rust side)
//!
//! Resolved rows are never updated again; every write is guarded by
//! `status <> 'resolved'`.

pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PgArenaStore;

use crate::arena::{Arena, Category, NewArena, Outcome};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("corrupt arena row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Arena),
    /// Another writer already holds an arena for this tweet.
    Duplicate,
}

#[async_trait]
pub trait ArenaStore: Send + Sync + 'static {
    /// Id of the arena opened for `tweet_id`, if any.
    async fn find_by_tweet_id(&self, tweet_id: &str) -> Result<Option<Uuid>, StoreError>;

    /// Insert a new `active` arena unless one exists for the same tweet.
    async fn insert_if_absent(&self, arena: &NewArena) -> Result<InsertOutcome, StoreError>;

    /// Open arenas (`active` or `locked`) with a confirmed first wager,
    /// ordered by `arena_index`.
    async fn load_resolvable(&self) -> Result<Vec<Arena>, StoreError>;

    /// Set status and outcome together. Returns false if the row was
    /// already resolved or does not exist.
    async fn mark_resolved(&self, id: Uuid, outcome: Outcome) -> Result<bool, StoreError>;

    /// Attach a topic label to an unresolved arena.
    async fn set_category(&self, id: Uuid, category: Category) -> Result<bool, StoreError>;
}
