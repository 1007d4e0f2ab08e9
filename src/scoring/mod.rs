//! Virality score and arena thresholds.
//!
//! Pure functions only. The same score formula is used to rank candidates
//! at discovery time and to re-score an arena's tweet at resolution time.

use crate::arena::{AppMode, TweetMetrics};

const LIKE_WEIGHT: f64 = 1.0;
const RETWEET_WEIGHT: f64 = 0.5;
const REPLY_WEIGHT: f64 = 0.3;
/// Weight of the engagement-per-view ratio.
const VIEW_ENGAGEMENT_WEIGHT: f64 = 50.0;
/// Ratios above this are treated as outliers (botted likes, tiny view counts).
const MAX_VIEW_ENGAGEMENT: f64 = 0.2;
const QUOTE_WEIGHT: f64 = 0.2;

const DEMO_LINE_BUMP: i64 = 3;
const PROD_LINE_FLOOR: i64 = 500;
const SCORE_LINE_MULTIPLIER: f64 = 1.5;
const SCORE_LINE_FLOOR: f64 = 10.0;

/// Inputs to [`compute_banger_score`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInput {
    pub likes: f64,
    pub retweets: f64,
    pub replies: f64,
    pub views: Option<f64>,
    pub quotes: Option<f64>,
    pub age_minutes: f64,
}

impl ScoreInput {
    pub fn from_metrics(metrics: &TweetMetrics, age_minutes: f64) -> Self {
        Self {
            likes: metrics.likes as f64,
            retweets: metrics.retweets as f64,
            replies: metrics.replies as f64,
            views: Some(metrics.views as f64),
            quotes: Some(metrics.quotes as f64),
            age_minutes,
        }
    }
}

/// Per-minute engagement velocity plus view-relative engagement and quotes.
///
/// Age is floored at one minute so a just-posted tweet does not divide by
/// zero. Callers must not pass NaN or negative counters.
pub fn compute_banger_score(input: ScoreInput) -> f64 {
    let age = input.age_minutes.max(1.0);

    let mut score = LIKE_WEIGHT * (input.likes / age)
        + RETWEET_WEIGHT * (input.retweets / age)
        + REPLY_WEIGHT * (input.replies / age);

    let views = input.views.unwrap_or(0.0);
    if views > 0.0 {
        let engagement = (input.likes + input.retweets + input.replies) / views;
        score += VIEW_ENGAGEMENT_WEIGHT * engagement.clamp(0.0, MAX_VIEW_ENGAGEMENT);
    }

    score + QUOTE_WEIGHT * input.quotes.unwrap_or(0.0)
}

/// Raw-likes threshold an arena must reach for a yes.
pub fn compute_banger_line(likes_0: i64, mode: AppMode) -> i64 {
    match mode {
        AppMode::Demo => likes_0.saturating_add(DEMO_LINE_BUMP),
        AppMode::Prod => likes_0.saturating_mul(2).max(PROD_LINE_FLOOR),
    }
}

/// Score threshold for the production rule, or `None` when the initial
/// score carries no signal.
pub fn compute_score_line(score_0: f64) -> Option<f64> {
    if !score_0.is_finite() || score_0 <= 0.0 {
        return None;
    }
    Some((score_0 * SCORE_LINE_MULTIPLIER).max(SCORE_LINE_FLOOR))
}
