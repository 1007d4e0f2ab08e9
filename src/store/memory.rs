//! In-process [`ArenaStore`] for tick tests, with switchable failures.

use super::{ArenaStore, InsertOutcome, StoreError};
use crate::arena::{Arena, ArenaStatus, Category, NewArena, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryArenaStore {
    rows: Mutex<Vec<Arena>>,
    next_index: AtomicI64,
    fail_lookup: Mutex<HashSet<String>>,
    fail_insert: Mutex<HashSet<String>>,
    fail_load: AtomicBool,
    fail_update: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::Db(sqlx::Error::PoolTimedOut)
}

impl MemoryArenaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Arena> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Arena> {
        self.rows.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    pub fn by_tweet(&self, tweet_id: &str) -> Option<Arena> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.tweet_id == tweet_id)
            .cloned()
    }

    /// What the API does when the first wager lands.
    pub fn mark_first_bet(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(a) = self.rows.lock().unwrap().iter_mut().find(|a| a.id == id) {
            a.first_bet_at.get_or_insert(at);
        }
    }

    pub fn set_status(&self, id: Uuid, status: ArenaStatus) {
        if let Some(a) = self.rows.lock().unwrap().iter_mut().find(|a| a.id == id) {
            a.status = status;
        }
    }

    pub fn fail_lookup_for(&self, tweet_id: &str) {
        self.fail_lookup.lock().unwrap().insert(tweet_id.to_string());
    }

    pub fn fail_insert_for(&self, tweet_id: &str) {
        self.fail_insert.lock().unwrap().insert(tweet_id.to_string());
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArenaStore for MemoryArenaStore {
    async fn find_by_tweet_id(&self, tweet_id: &str) -> Result<Option<Uuid>, StoreError> {
        if self.fail_lookup.lock().unwrap().contains(tweet_id) {
            return Err(injected());
        }
        Ok(self.by_tweet(tweet_id).map(|a| a.id))
    }

    async fn insert_if_absent(&self, arena: &NewArena) -> Result<InsertOutcome, StoreError> {
        if self.fail_insert.lock().unwrap().contains(&arena.tweet_id) {
            return Err(injected());
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|a| a.tweet_id == arena.tweet_id) {
            return Ok(InsertOutcome::Duplicate);
        }
        let row = Arena {
            id: Uuid::new_v4(),
            arena_index: self.next_index.fetch_add(1, Ordering::SeqCst) + 1,
            tweet_id: arena.tweet_id.clone(),
            tweet_url: arena.tweet_url.clone(),
            tweet_author_handle: arena.tweet_author_handle.clone(),
            author_display_name: arena.author_display_name.clone(),
            tweet_text: arena.tweet_text.clone(),
            tweet_created_at: arena.tweet_created_at,
            arena_created_at: arena.arena_created_at,
            resolve_deadline: arena.resolve_deadline,
            bet_cutoff_at: arena.bet_cutoff_at,
            likes_0: arena.likes_0,
            retweets_0: arena.retweets_0,
            replies_0: arena.replies_0,
            views_0: arena.views_0,
            quotes_0: arena.quotes_0,
            score_0: arena.score_0,
            banger_line: arena.banger_line,
            score_line: arena.score_line,
            status: ArenaStatus::Active,
            outcome: None,
            category: None,
            first_bet_at: None,
        };
        rows.push(row.clone());
        Ok(InsertOutcome::Inserted(row))
    }

    async fn load_resolvable(&self) -> Result<Vec<Arena>, StoreError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut open: Vec<Arena> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status.is_open() && a.first_bet_at.is_some())
            .cloned()
            .collect();
        open.sort_by_key(|a| a.arena_index);
        Ok(open)
    }

    async fn mark_resolved(&self, id: Uuid, outcome: Outcome) -> Result<bool, StoreError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|a| a.id == id && a.status != ArenaStatus::Resolved) {
            Some(a) => {
                a.status = ArenaStatus::Resolved;
                a.outcome = Some(outcome);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_category(&self, id: Uuid, category: Category) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|a| a.id == id && a.status != ArenaStatus::Resolved) {
            Some(a) => {
                a.category = Some(category);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
