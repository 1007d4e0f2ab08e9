//! Arena domain model shared by discovery, resolution and the store.
//!
//! An arena is a short-lived yes/no market on whether one tweet crosses an
//! engagement threshold before its deadline. Rows are created `active` by
//! discovery and flipped to `resolved` by resolution once the ledger has
//! settled; `locked` is a valid status that the worker itself never assigns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Operating mode. Governs every time window and threshold formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    /// Short windows and an easy line, for live demos.
    Demo,
    #[default]
    Prod,
}

impl AppMode {
    /// Lenient parse used for `APP_MODE`: only "demo" selects demo mode.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("demo") {
            AppMode::Demo
        } else {
            AppMode::Prod
        }
    }
}

impl std::fmt::Display for AppMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppMode::Demo => write!(f, "demo"),
            AppMode::Prod => write!(f, "prod"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaStatus {
    Active,
    /// Past bet cutoff. Assigned outside the worker, if at all.
    Locked,
    Resolved,
}

impl ArenaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArenaStatus::Active => "active",
            ArenaStatus::Locked => "locked",
            ArenaStatus::Resolved => "resolved",
        }
    }

    /// Statuses the resolution tick will consider.
    pub fn is_open(&self) -> bool {
        matches!(self, ArenaStatus::Active | ArenaStatus::Locked)
    }
}

impl std::fmt::Display for ArenaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArenaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ArenaStatus::Active),
            "locked" => Ok(ArenaStatus::Locked),
            "resolved" => Ok(ArenaStatus::Resolved),
            other => Err(format!("unknown arena status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "yes",
            Outcome::No => "no",
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Outcome::Yes)
    }

    pub fn from_yes(yes: bool) -> Self {
        if yes {
            Outcome::Yes
        } else {
            Outcome::No
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Outcome::Yes),
            "no" => Ok(Outcome::No),
            other => Err(format!("unknown arena outcome: {other}")),
        }
    }
}

/// Coarse topic label attached after discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ai,
    Crypto,
    Politics,
    Meme,
    Sports,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ai => "ai",
            Category::Crypto => "crypto",
            Category::Politics => "politics",
            Category::Meme => "meme",
            Category::Sports => "sports",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai" => Ok(Category::Ai),
            "crypto" => Ok(Category::Crypto),
            "politics" => Ok(Category::Politics),
            "meme" => Ok(Category::Meme),
            "sports" => Ok(Category::Sports),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Engagement counters as observed at some instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TweetMetrics {
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub views: u64,
    pub quotes: u64,
}

/// Betting and resolution window of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaWindow {
    pub bet_cutoff_at: DateTime<Utc>,
    pub resolve_deadline: DateTime<Utc>,
}

/// A persisted arena row.
#[derive(Debug, Clone, PartialEq)]
pub struct Arena {
    pub id: Uuid,
    /// Market id on the settlement ledger.
    pub arena_index: i64,
    pub tweet_id: String,
    pub tweet_url: String,
    pub tweet_author_handle: String,
    pub author_display_name: Option<String>,
    pub tweet_text: Option<String>,
    pub tweet_created_at: DateTime<Utc>,
    pub arena_created_at: DateTime<Utc>,
    pub resolve_deadline: DateTime<Utc>,
    pub bet_cutoff_at: DateTime<Utc>,
    pub likes_0: i64,
    pub retweets_0: Option<i64>,
    pub replies_0: Option<i64>,
    pub views_0: Option<i64>,
    pub quotes_0: Option<i64>,
    pub score_0: Option<f64>,
    pub banger_line: i64,
    pub score_line: Option<f64>,
    pub status: ArenaStatus,
    pub outcome: Option<Outcome>,
    pub category: Option<Category>,
    /// Stored as `first_demo_bet_at`.
    pub first_bet_at: Option<DateTime<Utc>>,
}

/// Insert payload produced by discovery. Id, index, status and outcome are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArena {
    pub tweet_id: String,
    pub tweet_url: String,
    pub tweet_author_handle: String,
    pub author_display_name: Option<String>,
    pub tweet_text: Option<String>,
    pub tweet_created_at: DateTime<Utc>,
    pub arena_created_at: DateTime<Utc>,
    pub resolve_deadline: DateTime<Utc>,
    pub bet_cutoff_at: DateTime<Utc>,
    pub likes_0: i64,
    pub retweets_0: Option<i64>,
    pub replies_0: Option<i64>,
    pub views_0: Option<i64>,
    pub quotes_0: Option<i64>,
    pub score_0: Option<f64>,
    pub banger_line: i64,
    pub score_line: Option<f64>,
}

impl NewArena {
    pub fn window(&self) -> ArenaWindow {
        ArenaWindow {
            bet_cutoff_at: self.bet_cutoff_at,
            resolve_deadline: self.resolve_deadline,
        }
    }
}
