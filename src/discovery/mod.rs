//! Discovery tick: open new arenas from the freshest high-velocity tweets.
//!
//! fetch -> age filter -> score + rank -> dedup -> thresholds + window -> insert
//!
//! Per-candidate store failures are logged and skipped; only a failed fetch
//! aborts the tick. Running the tick twice over the same candidates is a
//! no-op the second time: the store's unique `tweet_id` is the final word.

use crate::arena::{AppMode, Arena, ArenaWindow, NewArena};
use crate::classify::{self, Classifier};
use crate::scoring::{compute_banger_line, compute_banger_score, compute_score_line, ScoreInput};
use crate::store::{ArenaStore, InsertOutcome};
use crate::twitter::{CandidateSource, CandidateTweet};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

pub const MIN_AGE_MINUTES: f64 = 2.0;
/// 4 hours.
pub const MAX_AGE_MINUTES: f64 = 240.0;
pub const MAX_CANDIDATES_PER_TICK: usize = 20;

/// A candidate that passed the age filter, with its score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub tweet: CandidateTweet,
    pub age_minutes: f64,
    pub score: f64,
}

#[derive(Debug, Default)]
pub struct AgePartition {
    pub eligible: Vec<(CandidateTweet, f64)>,
    pub too_young: usize,
    pub too_old: usize,
}

/// Counters for one tick, returned for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub fetched: usize,
    pub too_young: usize,
    pub too_old: usize,
    pub ranked: usize,
    pub inserted: usize,
    pub existing: usize,
    pub failed: usize,
}

/// Split candidates by age at `now`. Bounds are inclusive on the eligible side.
pub fn partition_by_age(tweets: Vec<CandidateTweet>, now: DateTime<Utc>) -> AgePartition {
    let mut out = AgePartition::default();
    for tweet in tweets {
        let age = tweet.age_minutes(now);
        if age < MIN_AGE_MINUTES {
            out.too_young += 1;
        } else if age > MAX_AGE_MINUTES {
            out.too_old += 1;
        } else {
            out.eligible.push((tweet, age));
        }
    }
    out
}

/// Score eligible candidates and keep the best [`MAX_CANDIDATES_PER_TICK`].
pub fn rank_candidates(eligible: Vec<(CandidateTweet, f64)>) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = eligible
        .into_iter()
        .map(|(tweet, age_minutes)| {
            let score = compute_banger_score(ScoreInput::from_metrics(&tweet.metrics, age_minutes));
            ScoredCandidate {
                tweet,
                age_minutes,
                score,
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(MAX_CANDIDATES_PER_TICK);
    scored
}

/// Betting and resolution window, anchored on the tweet's creation time.
///
/// demo: deadline +5m, cutoff min(+3m, deadline - 1m)
/// prod: deadline +12h, cutoff min(+2h, deadline - 1h)
pub fn arena_window(tweet_created_at: DateTime<Utc>, mode: AppMode) -> ArenaWindow {
    let (total, betting, lock) = match mode {
        AppMode::Demo => (Duration::minutes(5), Duration::minutes(3), Duration::minutes(1)),
        AppMode::Prod => (Duration::hours(12), Duration::hours(2), Duration::hours(1)),
    };
    let resolve_deadline = tweet_created_at + total;
    let bet_cutoff_at = (tweet_created_at + betting).min(resolve_deadline - lock);
    ArenaWindow {
        bet_cutoff_at,
        resolve_deadline,
    }
}

/// Insert payload for a ranked candidate.
pub fn build_new_arena(c: &ScoredCandidate, mode: AppMode, now: DateTime<Utc>) -> NewArena {
    let tweet = &c.tweet;
    let m = &tweet.metrics;
    let likes_0 = to_i64(m.likes);
    let window = arena_window(tweet.created_at, mode);

    NewArena {
        tweet_id: tweet.id.clone(),
        tweet_url: tweet.permalink(),
        tweet_author_handle: tweet.author.handle.clone(),
        author_display_name: tweet.author.display_name.clone(),
        tweet_text: Some(tweet.text.clone()),
        tweet_created_at: tweet.created_at,
        arena_created_at: now,
        resolve_deadline: window.resolve_deadline,
        bet_cutoff_at: window.bet_cutoff_at,
        likes_0,
        retweets_0: Some(to_i64(m.retweets)),
        replies_0: Some(to_i64(m.replies)),
        views_0: Some(to_i64(m.views)),
        quotes_0: Some(to_i64(m.quotes)),
        score_0: Some(c.score),
        banger_line: compute_banger_line(likes_0, mode),
        score_line: compute_score_line(c.score),
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub struct DiscoveryTick {
    source: Arc<dyn CandidateSource>,
    store: Arc<dyn ArenaStore>,
    classifier: Option<Arc<Classifier>>,
    mode: AppMode,
}

impl DiscoveryTick {
    pub fn new(source: Arc<dyn CandidateSource>, store: Arc<dyn ArenaStore>, mode: AppMode) -> Self {
        Self {
            source,
            store,
            classifier: None,
            mode,
        }
    }

    /// Label inserted arenas in the background after each tick.
    pub fn with_classifier(mut self, classifier: Option<Arc<Classifier>>) -> Self {
        self.classifier = classifier;
        self
    }

    #[instrument(name = "discovery_tick", skip_all, fields(mode = %self.mode))]
    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<DiscoveryReport> {
        info!("discovery tick start");

        let tweets = self
            .source
            .search_candidates()
            .await
            .context("fetching candidate tweets")?;

        let mut report = DiscoveryReport {
            fetched: tweets.len(),
            ..Default::default()
        };

        let sample: Vec<(String, String, u64, f64)> = tweets
            .iter()
            .take(5)
            .map(|t| (t.id.clone(), t.author.handle.clone(), t.metrics.likes, t.age_minutes(now)))
            .collect();

        let partition = partition_by_age(tweets, now);
        report.too_young = partition.too_young;
        report.too_old = partition.too_old;

        let ranked = rank_candidates(partition.eligible);
        report.ranked = ranked.len();

        info!(
            fetched = report.fetched,
            candidates = report.ranked,
            too_young = report.too_young,
            too_old = report.too_old,
            "discovery candidates after filters"
        );

        if ranked.is_empty() {
            for (id, handle, likes, age) in &sample {
                info!(tweet_id = %id, handle = %handle, likes, age_minutes = age.round(), "sample tweet");
            }
            return Ok(report);
        }

        let mut inserted: Vec<Arena> = Vec::new();
        for candidate in &ranked {
            let tweet_id = &candidate.tweet.id;

            match self.store.find_by_tweet_id(tweet_id).await {
                Ok(Some(_)) => {
                    debug!(tweet_id = %tweet_id, "arena already exists");
                    report.existing += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(tweet_id = %tweet_id, error = %e, "store lookup failed, skipping candidate");
                    report.failed += 1;
                    continue;
                }
            }

            let row = build_new_arena(candidate, self.mode, now);
            match self.store.insert_if_absent(&row).await {
                Ok(InsertOutcome::Inserted(arena)) => {
                    info!(
                        arena = arena.arena_index,
                        tweet_id = %tweet_id,
                        handle = %arena.tweet_author_handle,
                        likes_0 = arena.likes_0,
                        banger_line = arena.banger_line,
                        score_line = ?arena.score_line,
                        "arena opened"
                    );
                    report.inserted += 1;
                    inserted.push(arena);
                }
                Ok(InsertOutcome::Duplicate) => {
                    debug!(tweet_id = %tweet_id, "arena created concurrently");
                    report.existing += 1;
                }
                Err(e) => {
                    error!(tweet_id = %tweet_id, error = %e, "arena insert failed");
                    report.failed += 1;
                }
            }
        }

        match &self.classifier {
            Some(classifier) if !inserted.is_empty() => {
                tokio::spawn(classify::label_new_arenas(
                    classifier.clone(),
                    self.store.clone(),
                    inserted,
                ));
            }
            _ => {}
        }

        info!(
            inserted = report.inserted,
            existing = report.existing,
            failed = report.failed,
            "discovery tick done"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaStatus, TweetMetrics};
    use crate::store::memory::MemoryArenaStore;
    use crate::twitter::{SearchError, TweetAuthor};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FixedSource {
        tweets: Mutex<Result<Vec<CandidateTweet>, u16>>,
    }

    impl FixedSource {
        fn ok(tweets: Vec<CandidateTweet>) -> Arc<Self> {
            Arc::new(Self { tweets: Mutex::new(Ok(tweets)) })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self { tweets: Mutex::new(Err(status)) })
        }
    }

    #[async_trait]
    impl CandidateSource for FixedSource {
        async fn search_candidates(&self) -> Result<Vec<CandidateTweet>, SearchError> {
            match &*self.tweets.lock().unwrap() {
                Ok(t) => Ok(t.clone()),
                Err(status) => Err(SearchError::Status {
                    status: *status,
                    body: String::new(),
                }),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn tweet(id: &str, age_minutes: i64, likes: u64) -> CandidateTweet {
        CandidateTweet {
            id: id.to_string(),
            url: None,
            text: format!("tweet {id}"),
            author: TweetAuthor {
                handle: format!("user{id}"),
                display_name: None,
            },
            created_at: now() - Duration::minutes(age_minutes),
            metrics: TweetMetrics {
                likes,
                retweets: likes / 10,
                replies: likes / 20,
                views: likes * 50,
                quotes: 1,
            },
        }
    }

    fn tick(source: Arc<FixedSource>, store: Arc<MemoryArenaStore>, mode: AppMode) -> DiscoveryTick {
        DiscoveryTick::new(source, store, mode)
    }

    #[test]
    fn test_demo_window() {
        let t = now();
        let w = arena_window(t, AppMode::Demo);
        assert_eq!(w.bet_cutoff_at, t + Duration::minutes(3));
        assert_eq!(w.resolve_deadline, t + Duration::minutes(5));
        assert!(w.bet_cutoff_at <= w.resolve_deadline - Duration::minutes(1));
    }

    #[test]
    fn test_prod_window() {
        let t = now();
        let w = arena_window(t, AppMode::Prod);
        assert_eq!(w.bet_cutoff_at, t + Duration::hours(2));
        assert_eq!(w.resolve_deadline, t + Duration::hours(12));
        assert!(w.bet_cutoff_at <= w.resolve_deadline);
    }

    #[test]
    fn test_age_partition_bounds() {
        let tweets = vec![
            tweet("young", 1, 500),
            tweet("edge-young", 2, 500),
            tweet("mid", 60, 500),
            tweet("edge-old", 240, 500),
            tweet("old", 241, 500),
        ];
        let p = partition_by_age(tweets, now());
        assert_eq!(p.too_young, 1);
        assert_eq!(p.too_old, 1);
        let ids: Vec<&str> = p.eligible.iter().map(|(t, _)| t.id.as_str()).collect();
        assert_eq!(ids, vec!["edge-young", "mid", "edge-old"]);
    }

    #[test]
    fn test_ranking_is_descending_and_capped() {
        let eligible: Vec<(CandidateTweet, f64)> = (0..30)
            .map(|i| (tweet(&i.to_string(), 10, 200 + i * 10), 10.0))
            .collect();
        let ranked = rank_candidates(eligible);
        assert_eq!(ranked.len(), MAX_CANDIDATES_PER_TICK);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked[0].tweet.id, "29");
    }

    #[test]
    fn test_new_arena_fields() {
        let c = rank_candidates(vec![(tweet("9", 30, 120), 30.0)]).remove(0);
        let row = build_new_arena(&c, AppMode::Prod, now());
        assert_eq!(row.tweet_url, "https://x.com/user9/status/9");
        assert_eq!(row.likes_0, 120);
        assert_eq!(row.banger_line, 500);
        assert_eq!(row.score_0, Some(c.score));
        assert_eq!(row.score_line, compute_score_line(c.score));
        assert_eq!(row.arena_created_at, now());
        assert_eq!(row.window(), arena_window(row.tweet_created_at, AppMode::Prod));
    }

    #[tokio::test]
    async fn test_opens_arenas_for_eligible_candidates() {
        let store = Arc::new(MemoryArenaStore::new());
        let source = FixedSource::ok(vec![
            tweet("a", 10, 300),
            tweet("b", 1, 900),
            tweet("c", 300, 900),
            tweet("d", 100, 1000),
        ]);

        let report = tick(source, store.clone(), AppMode::Demo).run(now()).await.unwrap();
        assert_eq!(report.fetched, 4);
        assert_eq!(report.too_young, 1);
        assert_eq!(report.too_old, 1);
        assert_eq!(report.inserted, 2);

        assert!(store.by_tweet("b").is_none());
        assert!(store.by_tweet("c").is_none());

        let a = store.by_tweet("a").unwrap();
        assert_eq!(a.status, ArenaStatus::Active);
        assert_eq!(a.outcome, None);
        assert_eq!(a.banger_line, 303);
        assert_eq!(a.resolve_deadline, a.tweet_created_at + Duration::minutes(5));
        assert_eq!(a.bet_cutoff_at, a.tweet_created_at + Duration::minutes(3));

        // "a" has the higher velocity, so it was inserted first.
        let d = store.by_tweet("d").unwrap();
        assert!(a.arena_index < d.arena_index);
    }

    #[tokio::test]
    async fn test_rerun_does_not_duplicate() {
        let store = Arc::new(MemoryArenaStore::new());
        let source = FixedSource::ok(vec![tweet("a", 10, 300), tweet("b", 20, 400)]);
        let t = tick(source, store.clone(), AppMode::Prod);

        let first = t.run(now()).await.unwrap();
        let second = t.run(now() + Duration::minutes(3)).await.unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.existing, 2);
        assert_eq!(store.all().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_is_absorbed_by_store() {
        let store = Arc::new(MemoryArenaStore::new());
        let c = rank_candidates(vec![(tweet("a", 10, 300), 10.0)]).remove(0);
        let row = build_new_arena(&c, AppMode::Prod, now());
        assert!(matches!(
            store.insert_if_absent(&row).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert_eq!(
            store.insert_if_absent(&row).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_without_writes() {
        let store = Arc::new(MemoryArenaStore::new());
        let err = tick(FixedSource::failing(503), store.clone(), AppMode::Prod)
            .run(now())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("503"));
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_no_eligible_candidates_is_a_noop() {
        let store = Arc::new(MemoryArenaStore::new());
        let source = FixedSource::ok(vec![tweet("a", 0, 300), tweet("b", 500, 300)]);
        let report = tick(source, store.clone(), AppMode::Prod).run(now()).await.unwrap();
        assert_eq!(report.ranked, 0);
        assert_eq!(report.inserted, 0);
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_per_candidate_store_errors_do_not_stop_the_tick() {
        let store = Arc::new(MemoryArenaStore::new());
        store.fail_lookup_for("a");
        store.fail_insert_for("b");
        let source = FixedSource::ok(vec![
            tweet("a", 10, 900),
            tweet("b", 10, 800),
            tweet("c", 10, 700),
        ]);

        let report = tick(source, store.clone(), AppMode::Prod).run(now()).await.unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.inserted, 1);
        assert!(store.by_tweet("c").is_some());
        assert!(store.by_tweet("a").is_none());
        assert!(store.by_tweet("b").is_none());
    }
}
