//! Relevance scoring and selection of candidate papers.
//!
//! A paper's score is a weighted sum of keyword hits (title and abstract),
//! recency inside the lookback window, a priority-source match against author
//! names and affiliations, and a bonus for large author lists. Papers are then
//! ordered by score, newest first on ties, and truncated to the configured count.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::config::DigestConfig;
use crate::models::{PaperRecord, ScoredPaper};

/// Bonus constants for [`RelevanceScorer`].
///
/// With the defaults a fresh paper can outrank an older one with a better
/// keyword match, since recency is worth up to 3. Set
/// `title_keyword > max_recency + abstract_keyword` to make a title hit win
/// regardless of publication time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub title_keyword: f64,
    pub abstract_keyword: f64,
    /// Bonus for a paper published right now; decays linearly to 0 at the window edge.
    pub max_recency: f64,
    pub priority_source: f64,
    pub multi_author: f64,
    pub multi_author_threshold: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            title_keyword: 2.0,
            abstract_keyword: 1.0,
            max_recency: 3.0,
            priority_source: 2.0,
            multi_author: 1.0,
            multi_author_threshold: 4,
        }
    }
}

pub struct RelevanceScorer<'a> {
    config: &'a DigestConfig,
    weights: ScoringWeights,
    keywords: Vec<String>,
    priority_sources: Vec<String>,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(config: &'a DigestConfig) -> Self {
        Self::with_weights(config, ScoringWeights::default())
    }

    pub fn with_weights(config: &'a DigestConfig, weights: ScoringWeights) -> Self {
        let lowered = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            config,
            weights,
            keywords: lowered(&config.keywords),
            priority_sources: lowered(&config.priority_sources),
        }
    }

    pub fn score(&self, paper: &PaperRecord, now: DateTime<Utc>) -> f64 {
        if !self.config.sort_by_relevance {
            return 0.0;
        }

        self.keyword_score(paper)
            + self.recency_score(paper.published, now)
            + self.source_score(paper)
            + self.author_score(paper)
    }

    fn keyword_score(&self, paper: &PaperRecord) -> f64 {
        let title = paper.title.to_lowercase();
        let abstract_text = paper.abstract_text.to_lowercase();

        self.keywords
            .iter()
            .map(|keyword| {
                let mut points = 0.0;
                if title.contains(keyword.as_str()) {
                    points += self.weights.title_keyword;
                }
                if abstract_text.contains(keyword.as_str()) {
                    points += self.weights.abstract_keyword;
                }
                points
            })
            .sum()
    }

    fn recency_score(&self, published: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let window_secs = self.config.days_back.max(1) as f64 * 86_400.0;
        let age_secs = (now - published).num_seconds().max(0) as f64;
        let remaining = (1.0 - age_secs / window_secs).clamp(0.0, 1.0);
        self.weights.max_recency * remaining
    }

    fn source_score(&self, paper: &PaperRecord) -> f64 {
        if self.priority_sources.is_empty() {
            return 0.0;
        }

        let author_text = paper
            .authors
            .iter()
            .flat_map(|a| std::iter::once(a.name.as_str()).chain(a.affiliations.iter().map(String::as_str)))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        if self
            .priority_sources
            .iter()
            .any(|source| author_text.contains(source.as_str()))
        {
            self.weights.priority_source
        } else {
            0.0
        }
    }

    fn author_score(&self, paper: &PaperRecord) -> f64 {
        if paper.authors.len() >= self.weights.multi_author_threshold {
            self.weights.multi_author
        } else {
            0.0
        }
    }

    /// Scores, orders and truncates the candidates to `max_papers`.
    pub fn select(&self, candidates: &[PaperRecord], now: DateTime<Utc>) -> Vec<ScoredPaper> {
        let mut scored: Vec<ScoredPaper> = candidates
            .iter()
            .map(|paper| ScoredPaper::new(paper.clone(), self.score(paper, now)))
            .collect();

        scored.sort_by(compare_ranked);
        scored.truncate(self.config.max_papers);
        scored
    }
}

/// Descending score, then newest first, then arXiv id so equal papers never swap.
fn compare_ranked(a: &ScoredPaper, b: &ScoredPaper) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.paper.published.cmp(&a.paper.published))
        .then_with(|| a.paper.id.cmp(&b.paper.id))
}
