// Trending change scoring
//
// Each change gets a 0-25 score from eight review-activity signals. Every
// signal is interpolated between a (min, max) range and capped at its weight.
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::Change;

/// Changes scoring below this never make the list
pub const MIN_TRENDING_SCORE: u32 = 8;

/// Sum of all signal weights
pub const MAX_TRENDING_SCORE: u32 = 25;

/// Messages newer than this count as recent activity
pub const RECENT_ACTIVITY_HOURS: i64 = 72;

/// Changes older than this get no recency points
pub const MAX_AGED_MS: i64 = 36 * 60 * 60 * 1000;

/// Weight and interpolation range for one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalWeight {
    pub weight: u32,
    pub min: i64,
    pub max: i64,
}

impl SignalWeight {
    const fn new(weight: u32, min: i64, max: i64) -> Self {
        Self { weight, min, max }
    }

    pub fn apply(&self, value: i64) -> u32 {
        apply_weight(value, self.weight, self.min, self.max)
    }
}

pub const PATCH_SETS: SignalWeight = SignalWeight::new(4, 5, 10);
pub const VOTES: SignalWeight = SignalWeight::new(3, 1, 4);
pub const MESSAGES: SignalWeight = SignalWeight::new(3, 7, 20);
pub const RECENT_MESSAGES: SignalWeight = SignalWeight::new(3, 1, 3);
pub const INLINE_COMMENTS: SignalWeight = SignalWeight::new(3, 1, 10);
pub const COMMENTERS: SignalWeight = SignalWeight::new(3, 3, 7);
pub const REVIEWERS: SignalWeight = SignalWeight::new(3, 1, 15);
pub const RECENCY: SignalWeight = SignalWeight::new(3, 0, MAX_AGED_MS);

/// Map a raw count onto `0..=weight`
///
/// Below `min` contributes nothing, `max` and above contributes the full
/// weight, and everything in between is interpolated linearly and rounded
/// half up.
pub fn apply_weight(value: i64, weight: u32, min: i64, max: i64) -> u32 {
    if value < min {
        return 0;
    }
    if value >= max {
        return weight;
    }
    let scaled = (value - min) as f64 * weight as f64 / (max - min) as f64;
    (scaled + 0.5).floor() as u32
}

fn vote_pattern() -> &'static Regex {
    static VOTE: OnceLock<Regex> = OnceLock::new();
    VOTE.get_or_init(|| Regex::new(r"[+-]\d").expect("vote regex is valid"))
}

fn inline_comment_pattern() -> &'static Regex {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    INLINE.get_or_init(|| Regex::new(r"\((\d+) comments?\)").expect("inline comment regex is valid"))
}

/// Raw value and weighted points of a single signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub raw: i64,
    pub points: u32,
}

impl Signal {
    fn measure(raw: i64, weight: SignalWeight) -> Self {
        Self {
            raw,
            points: weight.apply(raw),
        }
    }
}

/// Per-signal view of a change's trending score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub patch_sets: Signal,
    pub votes: Signal,
    pub messages: Signal,
    pub recent_messages: Signal,
    pub inline_comments: Signal,
    pub commenters: Signal,
    pub reviewers: Signal,
    /// Raw value is the remaining freshness in milliseconds
    pub recency: Signal,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.patch_sets.points
            + self.votes.points
            + self.messages.points
            + self.recent_messages.points
            + self.inline_comments.points
            + self.commenters.points
            + self.reviewers.points
            + self.recency.points
    }

    /// Label/signal pairs in display order
    pub fn signals(&self) -> [(&'static str, Signal); 8] {
        [
            ("patch sets", self.patch_sets),
            ("votes", self.votes),
            ("messages", self.messages),
            ("recent messages", self.recent_messages),
            ("inline comments", self.inline_comments),
            ("commenters", self.commenters),
            ("reviewers", self.reviewers),
            ("recency", self.recency),
        ]
    }
}

/// Trending scorer
///
/// Pure: the same change and `now` always produce the same score.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendingScorer;

impl TrendingScorer {
    pub fn new() -> Self {
        Self
    }

    /// Measure every signal for a change
    ///
    /// Robot messages (non-empty tag) are ignored by all message-based
    /// signals.
    pub fn breakdown(&self, change: &Change, now: DateTime<Utc>) -> ScoreBreakdown {
        let recent_cutoff = now - Duration::hours(RECENT_ACTIVITY_HOURS);

        let mut votes = 0i64;
        let mut messages = 0i64;
        let mut recent_messages = 0i64;
        let mut inline_comments = 0i64;
        let mut commenters = HashSet::new();

        for msg in change.human_messages() {
            messages += 1;

            if msg.date > recent_cutoff {
                recent_messages += 1;
            }

            if vote_pattern().is_match(msg.first_line()) {
                votes += 1;
            }

            if let Some(count) = inline_comment_pattern()
                .captures(&msg.message)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())
            {
                inline_comments += count;
            }

            // A blank line means there is free text after the header
            if msg.message.contains("\n\n") {
                if let Some(author) = msg.author {
                    commenters.insert(author);
                }
            }
        }

        let since_update = (now - change.updated).num_milliseconds();
        let aged = (MAX_AGED_MS - since_update).clamp(0, MAX_AGED_MS);

        ScoreBreakdown {
            patch_sets: Signal::measure(change.current_patch_set() as i64, PATCH_SETS),
            votes: Signal::measure(votes, VOTES),
            messages: Signal::measure(messages, MESSAGES),
            recent_messages: Signal::measure(recent_messages, RECENT_MESSAGES),
            inline_comments: Signal::measure(inline_comments, INLINE_COMMENTS),
            commenters: Signal::measure(commenters.len() as i64, COMMENTERS),
            reviewers: Signal::measure(change.active_reviewer_count() as i64, REVIEWERS),
            recency: Signal::measure(aged, RECENCY),
        }
    }

    pub fn score(&self, change: &Change, now: DateTime<Utc>) -> u32 {
        self.breakdown(change, now).total()
    }

    /// Score, filter, order and truncate a candidate set
    ///
    /// Keeps changes scoring at least [`MIN_TRENDING_SCORE`], highest score
    /// first with the most recently updated change winning ties, and returns
    /// at most `max_items` of them.
    pub fn select(&self, changes: Vec<Change>, now: DateTime<Utc>, max_items: usize) -> Vec<Change> {
        let mut trending: Vec<Change> = changes
            .into_iter()
            .map(|mut change| {
                change.trending_score = self.score(&change, now);
                change
            })
            .filter(|change| change.trending_score >= MIN_TRENDING_SCORE)
            .collect();

        trending.sort_by(|a, b| {
            b.trending_score
                .cmp(&a.trending_score)
                .then_with(|| b.updated.cmp(&a.updated))
        });
        trending.truncate(max_items);
        trending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{change, message, robot_message, with_patch_sets};
    use crate::models::{Account, ReviewerState};

    fn now() -> DateTime<Utc> {
        chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_apply_weight_bounds() {
        assert_eq!(apply_weight(4, 4, 5, 10), 0);
        assert_eq!(apply_weight(5, 4, 5, 10), 0);
        assert_eq!(apply_weight(8, 4, 5, 10), 2);
        assert_eq!(apply_weight(10, 4, 5, 10), 4);
        assert_eq!(apply_weight(1000, 4, 5, 10), 4);
    }

    #[test]
    fn test_apply_weight_rounds_half_up() {
        // (2 - 1) * 3 / 2 = 1.5
        assert_eq!(apply_weight(2, 3, 1, 3), 2);
        // (9 - 7) * 3 / 13 = 0.46
        assert_eq!(apply_weight(9, 3, 7, 20), 0);
    }

    #[test]
    fn test_weighting_is_monotonic_and_saturates() {
        for weight in [PATCH_SETS, VOTES, MESSAGES, RECENT_MESSAGES, INLINE_COMMENTS, COMMENTERS, REVIEWERS] {
            let mut previous = 0;
            for value in 0..=(weight.max + 5) {
                let points = weight.apply(value);
                assert!(points >= previous, "{:?} dropped at {}", weight, value);
                assert!(points <= weight.weight);
                if value >= weight.max {
                    assert_eq!(points, weight.weight);
                }
                previous = points;
            }
        }
    }

    #[test]
    fn test_weights_sum_to_max_score() {
        let total: u32 = [
            PATCH_SETS,
            VOTES,
            MESSAGES,
            RECENT_MESSAGES,
            INLINE_COMMENTS,
            COMMENTERS,
            REVIEWERS,
            RECENCY,
        ]
        .iter()
        .map(|w| w.weight)
        .sum();
        assert_eq!(total, MAX_TRENDING_SCORE);
    }

    /// Patch set 8, 2 votes, 10 messages (none recent), 4 commenters,
    /// 5 reviewers, updated 10 hours ago: exactly the threshold
    fn threshold_change() -> Change {
        let now = now();
        let mut c = with_patch_sets(change("threshold", now - Duration::hours(10)), 8);
        let old = now - Duration::hours(100);

        c.messages.push(message(10, old, "Patch Set 3: Code-Review+1"));
        c.messages.push(message(11, old, "Patch Set 4: Verified-1"));
        for author in 20..24 {
            c.messages
                .push(message(author, old, "Patch Set 5:\n\nPlease rename this."));
        }
        for author in 30..34 {
            c.messages.push(message(author, old, "Uploaded patch set 6."));
        }

        c.reviewers.insert(
            ReviewerState::Reviewer,
            (40..45).map(Account::new).collect(),
        );
        c
    }

    #[test]
    fn test_worked_example_meets_threshold() {
        let scorer = TrendingScorer::new();
        let c = threshold_change();
        let b = scorer.breakdown(&c, now());

        assert_eq!(b.patch_sets, Signal { raw: 8, points: 2 });
        assert_eq!(b.votes, Signal { raw: 2, points: 1 });
        assert_eq!(b.messages, Signal { raw: 10, points: 1 });
        assert_eq!(b.recent_messages.points, 0);
        assert_eq!(b.inline_comments.points, 0);
        assert_eq!(b.commenters, Signal { raw: 4, points: 1 });
        assert_eq!(b.reviewers, Signal { raw: 5, points: 1 });
        assert_eq!(b.recency.raw, 26 * 60 * 60 * 1000);
        assert_eq!(b.recency.points, 2);
        assert_eq!(b.total(), 8);

        let selected = scorer.select(vec![c], now(), 10);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].trending_score, 8);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let scorer = TrendingScorer::new();
        let c = threshold_change();
        assert_eq!(scorer.score(&c, now()), scorer.score(&c, now()));
        assert_eq!(scorer.breakdown(&c, now()), scorer.breakdown(&c, now()));
    }

    #[test]
    fn test_robot_messages_are_ignored() {
        let scorer = TrendingScorer::new();
        let now = now();
        let base = change("c", now - Duration::hours(1));

        let mut noisy = base.clone();
        for _ in 0..30 {
            noisy.messages.push(robot_message(
                now - Duration::hours(1),
                "Patch Set 1: Verified+1\n\nBuild done (5 comments)",
            ));
        }

        let quiet = scorer.breakdown(&base, now);
        let with_bots = scorer.breakdown(&noisy, now);
        assert_eq!(quiet, with_bots);
        assert_eq!(with_bots.votes.raw, 0);
        assert_eq!(with_bots.messages.raw, 0);
        assert_eq!(with_bots.inline_comments.raw, 0);
        assert_eq!(with_bots.commenters.raw, 0);
    }

    #[test]
    fn test_vote_detection_uses_first_line_only() {
        let scorer = TrendingScorer::new();
        let now = now();
        let mut c = change("c", now);
        c.messages.push(message(1, now, "Patch Set 2: Code-Review+2"));
        c.messages.push(message(2, now, "Patch Set 2:\n\nthis is -1 worthy"));
        c.messages.push(message(3, now, "Patch Set 2: Code-Review-1"));

        assert_eq!(scorer.breakdown(&c, now).votes.raw, 2);
    }

    #[test]
    fn test_inline_comment_counting() {
        let scorer = TrendingScorer::new();
        let now = now();
        let mut c = change("c", now);
        c.messages.push(message(1, now, "Patch Set 1:\n\n(1 comment)"));
        c.messages.push(message(2, now, "Patch Set 1:\n\n(12 comments)"));
        c.messages.push(message(3, now, "Patch Set 1: no inline comments here"));

        let b = scorer.breakdown(&c, now);
        assert_eq!(b.inline_comments.raw, 13);
        assert_eq!(b.inline_comments.points, 3);
    }

    #[test]
    fn test_distinct_commenters_need_a_blank_line() {
        let scorer = TrendingScorer::new();
        let now = now();
        let mut c = change("c", now);
        c.messages.push(message(1, now, "Patch Set 1:\n\nfirst"));
        c.messages.push(message(1, now, "Patch Set 2:\n\nsecond"));
        c.messages.push(message(2, now, "Patch Set 2:\n\nthird"));
        c.messages.push(message(3, now, "Patch Set 2: Code-Review+1"));

        assert_eq!(scorer.breakdown(&c, now).commenters.raw, 2);
    }

    #[test]
    fn test_recent_messages_window() {
        let scorer = TrendingScorer::new();
        let now = now();
        let mut c = change("c", now);
        c.messages.push(message(1, now - Duration::hours(1), "recent"));
        c.messages.push(message(1, now - Duration::hours(71), "still recent"));
        c.messages.push(message(1, now - Duration::hours(73), "too old"));

        let b = scorer.breakdown(&c, now);
        assert_eq!(b.messages.raw, 3);
        assert_eq!(b.recent_messages.raw, 2);
    }

    #[test]
    fn test_recency_is_clamped() {
        let scorer = TrendingScorer::new();
        let now = now();

        let fresh = change("fresh", now);
        assert_eq!(scorer.breakdown(&fresh, now).recency.points, 3);

        let stale = change("stale", now - Duration::hours(48));
        let b = scorer.breakdown(&stale, now);
        assert_eq!(b.recency.raw, 0);
        assert_eq!(b.recency.points, 0);

        // Clock skew: updated "in the future"
        let future = change("future", now + Duration::hours(2));
        assert_eq!(scorer.breakdown(&future, now).recency.raw, MAX_AGED_MS);
    }

    fn change_with_score_hint(id: &str, patch_sets: u32, updated: DateTime<Utc>) -> Change {
        let mut c = with_patch_sets(change(id, updated), patch_sets);
        c.reviewers
            .insert(ReviewerState::Reviewer, (1..16).map(Account::new).collect());
        c
    }

    #[test]
    fn test_select_filters_sorts_and_truncates() {
        let scorer = TrendingScorer::new();
        let now = now();

        // recency 3 + reviewers 3 = 6 before patch sets
        let low = change_with_score_hint("low", 1, now);
        let mid_old = change_with_score_hint("mid-old", 8, now - Duration::minutes(30));
        let mid_new = change_with_score_hint("mid-new", 8, now - Duration::minutes(10));
        let top = change_with_score_hint("top", 10, now - Duration::hours(2));

        let selected = scorer.select(
            vec![low.clone(), mid_old.clone(), mid_new.clone(), top.clone()],
            now,
            10,
        );
        let ids: Vec<_> = selected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "mid-new", "mid-old"]);
        assert!(selected.iter().all(|c| c.trending_score >= MIN_TRENDING_SCORE));

        for pair in selected.windows(2) {
            assert!(
                pair[0].trending_score > pair[1].trending_score
                    || (pair[0].trending_score == pair[1].trending_score
                        && pair[0].updated >= pair[1].updated)
            );
        }

        let truncated = scorer.select(vec![low, mid_old, mid_new, top], now, 2);
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].id, "top");
    }

    #[test]
    fn test_select_with_zero_max_items() {
        let scorer = TrendingScorer::new();
        let c = threshold_change();
        assert!(scorer.select(vec![c], now(), 0).is_empty());
    }
}
