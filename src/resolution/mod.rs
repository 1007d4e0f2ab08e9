//! Resolution tick: settle arenas whose outcome is decided.
//!
//! Arenas are handled one at a time in `arena_index` order. The ledger is
//! the system of record: an arena is marked resolved locally only after the
//! resolution transaction has been confirmed, never before.

use crate::arena::{AppMode, Arena, Outcome, TweetMetrics};
use crate::ledger::LedgerGateway;
use crate::scoring::{compute_banger_score, ScoreInput};
use crate::store::ArenaStore;
use crate::twitter::MetricsSource;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Decide an arena's outcome from its current metrics.
///
/// Yes as soon as the line is reached, no once the deadline has passed
/// without reaching it, `None` while still pending. In prod the line is
/// `score_line` when it is usable and `banger_line` otherwise; demo always
/// uses `banger_line`.
pub fn decide_outcome(
    mode: AppMode,
    arena: &Arena,
    metrics: &TweetMetrics,
    now: DateTime<Utc>,
) -> Option<Outcome> {
    let crossed = match (mode, arena.score_line) {
        (AppMode::Prod, Some(line)) if line.is_finite() && line > 0.0 => {
            let age_minutes = (now - arena.tweet_created_at).num_seconds() as f64 / 60.0;
            let score_now = compute_banger_score(ScoreInput::from_metrics(metrics, age_minutes));
            score_now >= line
        }
        _ => i64::try_from(metrics.likes).unwrap_or(i64::MAX) >= arena.banger_line,
    };

    if crossed {
        Some(Outcome::Yes)
    } else if now >= arena.resolve_deadline {
        Some(Outcome::No)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub loaded: usize,
    pub resolved: usize,
    pub pending: usize,
    /// Skipped this tick: metrics or ledger read failed, or nothing to settle.
    pub skipped: usize,
    /// Settlement failed or the local update diverged from the ledger.
    pub failed: usize,
    /// Already resolved on the ledger and healed locally.
    pub healed: usize,
    /// Resolved on the ledger but still open locally, left for an operator.
    pub diverged: usize,
}

enum Step {
    Resolved,
    Pending,
    Skipped,
    Failed,
    Healed,
    Diverged,
}

pub struct ResolutionTick {
    store: Arc<dyn ArenaStore>,
    metrics: Arc<dyn MetricsSource>,
    ledger: Arc<dyn LedgerGateway>,
    mode: AppMode,
    reconcile: bool,
    /// Arenas already reported as diverged, so the error is logged once.
    flagged: Mutex<HashSet<Uuid>>,
}

impl ResolutionTick {
    pub fn new(
        store: Arc<dyn ArenaStore>,
        metrics: Arc<dyn MetricsSource>,
        ledger: Arc<dyn LedgerGateway>,
        mode: AppMode,
    ) -> Self {
        Self {
            store,
            metrics,
            ledger,
            mode,
            reconcile: false,
            flagged: Mutex::new(HashSet::new()),
        }
    }

    /// Check the ledger before deciding and copy over outcomes it already holds.
    pub fn with_reconcile(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }

    #[instrument(name = "resolution_tick", skip_all, fields(mode = %self.mode))]
    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<ResolutionReport> {
        let arenas = self
            .store
            .load_resolvable()
            .await
            .context("loading open arenas")?;

        let mut report = ResolutionReport {
            loaded: arenas.len(),
            ..Default::default()
        };
        if arenas.is_empty() {
            debug!("no open arenas with wagers");
            return Ok(report);
        }
        info!(arenas = arenas.len(), "resolution tick start");

        for arena in &arenas {
            match self.resolve_one(arena, now).await {
                Step::Resolved => report.resolved += 1,
                Step::Pending => report.pending += 1,
                Step::Skipped => report.skipped += 1,
                Step::Failed => report.failed += 1,
                Step::Healed => report.healed += 1,
                Step::Diverged => report.diverged += 1,
            }
        }

        info!(
            resolved = report.resolved,
            pending = report.pending,
            skipped = report.skipped,
            failed = report.failed,
            healed = report.healed,
            diverged = report.diverged,
            "resolution tick done"
        );
        Ok(report)
    }

    /// The ledger already settled this market but the local row is open.
    /// A resubmission would only revert, so the arena is left alone.
    fn flag_divergence(&self, arena: &Arena, outcome_yes: bool) {
        let first = match self.flagged.lock() {
            Ok(mut seen) => seen.insert(arena.id),
            Err(_) => true,
        };
        let ledger_outcome = Outcome::from_yes(outcome_yes);
        if first {
            error!(
                arena = arena.arena_index,
                ledger_outcome = %ledger_outcome,
                "arena resolved on ledger but open in store, not resubmitting"
            );
        } else {
            debug!(arena = arena.arena_index, "ledger/store divergence already reported");
        }
    }

    async fn resolve_one(&self, arena: &Arena, now: DateTime<Utc>) -> Step {
        let idx = arena.arena_index;

        if self.reconcile {
            match self.ledger.arena_view(idx).await {
                Ok(view) if view.exists && view.resolved => {
                    let outcome = Outcome::from_yes(view.outcome_yes);
                    return match self.store.mark_resolved(arena.id, outcome).await {
                        Ok(_) => {
                            warn!(arena = idx, outcome = %outcome, "arena already resolved on ledger, healed locally");
                            Step::Healed
                        }
                        Err(e) => {
                            error!(arena = idx, outcome = %outcome, error = %e, "failed to heal ledger-resolved arena");
                            Step::Failed
                        }
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(arena = idx, error = %e, "ledger read failed");
                    return Step::Skipped;
                }
            }
        }

        let metrics = match self.metrics.tweet_metrics(&arena.tweet_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(arena = idx, tweet_id = %arena.tweet_id, error = %e, "metrics fetch failed");
                return Step::Skipped;
            }
        };

        let Some(outcome) = decide_outcome(self.mode, arena, &metrics, now) else {
            debug!(arena = idx, likes = metrics.likes, banger_line = arena.banger_line, "still pending");
            return Step::Pending;
        };

        let view = match self.ledger.arena_view(idx).await {
            Ok(v) => v,
            Err(e) => {
                warn!(arena = idx, error = %e, "ledger read failed");
                return Step::Skipped;
            }
        };
        if !view.exists {
            info!(arena = idx, "no market on ledger, not settling");
            return Step::Skipped;
        }
        if view.resolved {
            self.flag_divergence(arena, view.outcome_yes);
            return Step::Diverged;
        }
        if !view.is_settleable() {
            info!(arena = idx, "no stake on ledger, not settling");
            return Step::Skipped;
        }

        let tx = match self.ledger.resolve_arena(idx, outcome.is_yes()).await {
            Ok(tx) => tx,
            Err(e) => {
                error!(arena = idx, outcome = %outcome, error = %e, "settlement failed, arena left open");
                return Step::Failed;
            }
        };

        match self.store.mark_resolved(arena.id, outcome).await {
            Ok(true) => {
                info!(arena = idx, outcome = %outcome, tx = %tx, likes = metrics.likes, "arena resolved");
                Step::Resolved
            }
            Ok(false) => {
                warn!(arena = idx, tx = %tx, "arena settled on ledger but was already resolved locally");
                Step::Resolved
            }
            Err(e) => {
                error!(
                    arena = idx,
                    outcome = %outcome,
                    tx = %tx,
                    error = %e,
                    "ledger settled but local update failed, store diverges from ledger"
                );
                Step::Failed
            }
        }
    }
}
