//! Postgres-backed [`ArenaStore`].

use super::{ArenaStore, InsertOutcome, StoreError};
use crate::arena::{Arena, ArenaStatus, Category, NewArena, Outcome};
use crate::config::StoreConfig;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Set by the arena API when the first wager on an arena is confirmed.
const WAGER_MARKER_COLUMN: &str = "first_demo_bet_at";

/// Read shape shared with the arena API. Counters and scores are `integer`
/// and `numeric` in tables created by the API's initializer, so they are
/// cast to the widths the row decoder expects.
const ARENA_COLUMNS: &str = "id, arena_index, tweet_id, tweet_url, tweet_author_handle, \
     author_display_name, tweet_text, tweet_created_at, arena_created_at, resolve_deadline, \
     bet_cutoff_at, likes_0::int8 AS likes_0, retweets_0::int8 AS retweets_0, \
     replies_0::int8 AS replies_0, views_0::int8 AS views_0, quotes_0::int8 AS quotes_0, \
     score_0::float8 AS score_0, banger_line::int8 AS banger_line, \
     score_line::float8 AS score_line, status, outcome, category, first_demo_bet_at";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS arenas (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        arena_index BIGSERIAL UNIQUE NOT NULL,
        tweet_id TEXT NOT NULL,
        tweet_url TEXT NOT NULL,
        tweet_author_handle TEXT NOT NULL,
        tweet_created_at TIMESTAMPTZ NOT NULL,
        arena_created_at TIMESTAMPTZ NOT NULL,
        resolve_deadline TIMESTAMPTZ NOT NULL,
        bet_cutoff_at TIMESTAMPTZ NOT NULL,
        likes_0 BIGINT NOT NULL,
        banger_line BIGINT NOT NULL CHECK (banger_line > 0),
        status TEXT NOT NULL DEFAULT 'active'
            CHECK (status IN ('active', 'locked', 'resolved')),
        outcome TEXT CHECK (outcome IN ('yes', 'no')),
        category TEXT,
        author_followers INTEGER,
        created_by_agent BOOLEAN NOT NULL DEFAULT TRUE,
        CHECK (bet_cutoff_at <= resolve_deadline),
        CHECK ((status = 'resolved') = (outcome IS NOT NULL))
    )
    "#,
    // Columns added after the first release. Tables created by the API's
    // initializer pick them up here too.
    r#"
    ALTER TABLE arenas
        ADD COLUMN IF NOT EXISTS first_demo_bet_at TIMESTAMPTZ,
        ADD COLUMN IF NOT EXISTS tweet_text TEXT,
        ADD COLUMN IF NOT EXISTS author_display_name TEXT,
        ADD COLUMN IF NOT EXISTS retweets_0 BIGINT,
        ADD COLUMN IF NOT EXISTS replies_0 BIGINT,
        ADD COLUMN IF NOT EXISTS views_0 BIGINT,
        ADD COLUMN IF NOT EXISTS quotes_0 BIGINT,
        ADD COLUMN IF NOT EXISTS score_0 DOUBLE PRECISION,
        ADD COLUMN IF NOT EXISTS score_line DOUBLE PRECISION
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS arenas_tweet_id_key ON arenas (tweet_id)",
    "CREATE INDEX IF NOT EXISTS arenas_status_idx ON arenas (status)",
];

fn resolvable_query() -> String {
    format!(
        "SELECT {ARENA_COLUMNS} FROM arenas \
         WHERE status IN ('active', 'locked') AND {WAGER_MARKER_COLUMN} IS NOT NULL \
         ORDER BY arena_index"
    )
}

#[derive(Clone)]
pub struct PgArenaStore {
    pool: PgPool,
}

impl PgArenaStore {
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&cfg.database_url)
            .await?;
        info!(max_connections = cfg.max_connections, "connected to arena store");
        Ok(Self { pool })
    }

    /// Create the arenas table and its indexes if they do not exist.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        info!("arena schema ready");
        Ok(())
    }
}

#[async_trait]
impl ArenaStore for PgArenaStore {
    async fn find_by_tweet_id(&self, tweet_id: &str) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query("SELECT id FROM arenas WHERE tweet_id = $1 LIMIT 1")
            .bind(tweet_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<Uuid, _>("id")).transpose()?)
    }

    async fn insert_if_absent(&self, arena: &NewArena) -> Result<InsertOutcome, StoreError> {
        let sql = format!(
            "INSERT INTO arenas (tweet_id, tweet_url, tweet_author_handle, author_display_name, \
             tweet_text, tweet_created_at, arena_created_at, resolve_deadline, bet_cutoff_at, \
             likes_0, retweets_0, replies_0, views_0, quotes_0, score_0, banger_line, score_line, \
             status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             'active') \
             ON CONFLICT (tweet_id) DO NOTHING \
             RETURNING {ARENA_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&arena.tweet_id)
            .bind(&arena.tweet_url)
            .bind(&arena.tweet_author_handle)
            .bind(&arena.author_display_name)
            .bind(&arena.tweet_text)
            .bind(arena.tweet_created_at)
            .bind(arena.arena_created_at)
            .bind(arena.resolve_deadline)
            .bind(arena.bet_cutoff_at)
            .bind(arena.likes_0)
            .bind(arena.retweets_0)
            .bind(arena.replies_0)
            .bind(arena.views_0)
            .bind(arena.quotes_0)
            .bind(arena.score_0)
            .bind(arena.banger_line)
            .bind(arena.score_line)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(arena_from_row(&row)?)),
            None => Ok(InsertOutcome::Duplicate),
        }
    }

    async fn load_resolvable(&self) -> Result<Vec<Arena>, StoreError> {
        let rows = sqlx::query(&resolvable_query()).fetch_all(&self.pool).await?;
        rows.iter().map(arena_from_row).collect()
    }

    async fn mark_resolved(&self, id: Uuid, outcome: Outcome) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE arenas SET status = 'resolved', outcome = $2 \
             WHERE id = $1 AND status <> 'resolved'",
        )
        .bind(id)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_category(&self, id: Uuid, category: Category) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE arenas SET category = $2 WHERE id = $1 AND status <> 'resolved'",
        )
        .bind(id)
        .bind(category.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn arena_from_row(row: &PgRow) -> Result<Arena, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.to_string(),
        reason,
    };

    let status: String = row.try_get("status")?;
    let outcome: Option<String> = row.try_get("outcome")?;
    let category: Option<String> = row.try_get("category")?;

    Ok(Arena {
        id,
        arena_index: row.try_get("arena_index")?,
        tweet_id: row.try_get("tweet_id")?,
        tweet_url: row.try_get("tweet_url")?,
        tweet_author_handle: row.try_get("tweet_author_handle")?,
        author_display_name: row.try_get("author_display_name")?,
        tweet_text: row.try_get("tweet_text")?,
        tweet_created_at: row.try_get("tweet_created_at")?,
        arena_created_at: row.try_get("arena_created_at")?,
        resolve_deadline: row.try_get("resolve_deadline")?,
        bet_cutoff_at: row.try_get("bet_cutoff_at")?,
        likes_0: row.try_get("likes_0")?,
        retweets_0: row.try_get("retweets_0")?,
        replies_0: row.try_get("replies_0")?,
        views_0: row.try_get("views_0")?,
        quotes_0: row.try_get("quotes_0")?,
        score_0: row.try_get("score_0")?,
        banger_line: row.try_get("banger_line")?,
        score_line: row.try_get("score_line")?,
        status: status.parse::<ArenaStatus>().map_err(corrupt)?,
        outcome: outcome
            .map(|o| o.parse::<Outcome>())
            .transpose()
            .map_err(corrupt)?,
        // Labels outside the known set are kept out of the typed model.
        category: category.and_then(|c| c.parse::<Category>().ok()),
        first_bet_at: row.try_get(WAGER_MARKER_COLUMN)?,
    })
}
