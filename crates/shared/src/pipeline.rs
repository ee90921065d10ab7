//! One digest run: fetch, score, summarize, format, deliver.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::arxiv::{PaperQuery, PaperSource};
use crate::config::DigestConfig;
use crate::delivery::Transport;
use crate::digest::{DigestFormatter, FormattedDigest};
use crate::error::Result;
use crate::models::ScoredPaper;
use crate::scoring::{RelevanceScorer, ScoringWeights};
use crate::summarizer::{SummaryService, Summarizer};

/// How many candidates to request per selected paper, so scoring has room to choose.
const CANDIDATE_MULTIPLIER: usize = 3;

#[derive(Debug)]
pub struct RunReport {
    pub candidates: usize,
    pub papers: Vec<ScoredPaper>,
    pub digest: FormattedDigest,
}

impl RunReport {
    pub fn summarized(&self) -> usize {
        self.papers
            .iter()
            .filter(|p| p.summary.as_ref().is_some_and(|s| s.is_generated()))
            .count()
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing matched; no email was sent.
    NoPapers,
    Delivered(RunReport),
}

pub fn build_query(config: &DigestConfig) -> PaperQuery {
    PaperQuery {
        keywords: config.keywords.clone(),
        categories: config.effective_categories(),
        days_back: config.days_back,
        max_results: config.max_papers * CANDIDATE_MULTIPLIER,
    }
}

pub struct DigestPipeline<'a, S> {
    config: &'a DigestConfig,
    source: &'a dyn PaperSource,
    summarizer: Summarizer<S>,
    transport: &'a dyn Transport,
    weights: ScoringWeights,
}

impl<'a, S: SummaryService> DigestPipeline<'a, S> {
    pub fn new(
        config: &'a DigestConfig,
        source: &'a dyn PaperSource,
        summarizer: Summarizer<S>,
        transport: &'a dyn Transport,
    ) -> Self {
        Self {
            config,
            source,
            summarizer,
            transport,
            weights: ScoringWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunOutcome> {
        let query = build_query(self.config);
        info!(
            keywords = ?query.keywords,
            categories = ?query.categories,
            days_back = query.days_back,
            "fetching candidates"
        );
        let candidates = self.source.fetch_papers(&query, now).await?;

        let scorer = RelevanceScorer::with_weights(self.config, self.weights.clone());
        let selected = scorer.select(&candidates, now);
        if selected.is_empty() {
            warn!("no papers found matching criteria");
            return Ok(RunOutcome::NoPapers);
        }
        info!(candidates = candidates.len(), selected = selected.len(), "selected papers");

        let papers = self.summarizer.summarize_papers(selected).await;
        let digest = DigestFormatter::render(&papers, &self.config.keywords, now);

        info!(recipient = %self.config.email, transport = self.transport.name(), "sending digest");
        self.transport.send(&self.config.email, &digest).await?;

        Ok(RunOutcome::Delivered(RunReport {
            candidates: candidates.len(),
            papers,
            digest,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DigestError;
    use crate::models::{Author, PaperRecord, SUMMARY_PLACEHOLDER};
    use crate::summarizer::{RetryPolicy, ServiceFailure};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap()
    }

    fn paper(id: &str, title: &str, hours_old: i64) -> PaperRecord {
        PaperRecord {
            id: id.to_string(),
            title: title.to_string(),
            authors: vec![Author::new("Jane Doe")],
            abstract_text: format!("Abstract of {}", title),
            categories: vec!["cs.LG".to_string()],
            published: now() - Duration::hours(hours_old),
            abs_url: format!("https://arxiv.org/abs/{}", id),
            pdf_url: format!("https://arxiv.org/pdf/{}", id),
        }
    }

    struct FakeSource {
        result: Mutex<Option<Result<Vec<PaperRecord>>>>,
        queries: Mutex<Vec<PaperQuery>>,
    }

    impl FakeSource {
        fn new(result: Result<Vec<PaperRecord>>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaperSource for FakeSource {
        async fn fetch_papers(&self, query: &PaperQuery, _now: DateTime<Utc>) -> Result<Vec<PaperRecord>> {
            self.queries.lock().unwrap().push(query.clone());
            self.result.lock().unwrap().take().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Fails every abstract that mentions "Broken".
    struct FlakyService;

    #[async_trait]
    impl SummaryService for FlakyService {
        async fn complete(&self, prompt: &str) -> core::result::Result<String, ServiceFailure> {
            if prompt.contains("Broken") {
                Err(ServiceFailure::RateLimited("429 Too Many Requests".to_string()))
            } else {
                Ok("• Key contribution\n• Why it matters".to_string())
            }
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, FormattedDigest)>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, recipient: &str, digest: &FormattedDigest) -> Result<()> {
            if self.fail {
                return Err(DigestError::Delivery("connection refused".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), digest.clone()));
            Ok(())
        }
    }

    fn config(max_papers: usize) -> DigestConfig {
        DigestConfig {
            keywords: vec!["transformer".to_string()],
            categories: vec!["cs.LG".to_string()],
            max_papers,
            days_back: 2,
            email: "reader@example.com".to_string(),
            ..DigestConfig::default()
        }
    }

    fn summarizer() -> Summarizer<FlakyService> {
        Summarizer::new(FlakyService).with_retry(RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn test_one_failed_summary_still_delivers_all_papers() {
        let papers = vec![
            paper("1", "Transformer one", 1),
            paper("2", "Transformer two", 2),
            paper("3", "Broken transformer", 3),
            paper("4", "Transformer four", 4),
            paper("5", "Transformer five", 5),
        ];
        let config = config(5);
        let source = FakeSource::new(Ok(papers));
        let transport = RecordingTransport::default();
        let pipeline = DigestPipeline::new(&config, &source, summarizer(), &transport);

        let outcome = pipeline.run(now()).await.unwrap();
        let RunOutcome::Delivered(report) = outcome else {
            panic!("expected delivery");
        };

        assert_eq!(report.papers.len(), 5);
        assert_eq!(report.summarized(), 4);
        let placeholders: Vec<&ScoredPaper> = report
            .papers
            .iter()
            .filter(|p| p.summary_text() == SUMMARY_PLACEHOLDER)
            .collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].paper.id, "3");

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "reader@example.com");
        assert!(sent[0].1.html.contains(SUMMARY_PLACEHOLDER));
        assert_eq!(sent[0].1.text.matches("Title: ").count(), 5);
    }

    #[tokio::test]
    async fn test_query_uses_config_and_candidate_multiplier() {
        let config = config(4);
        let source = FakeSource::new(Ok(vec![paper("1", "Transformer", 1)]));
        let transport = RecordingTransport::default();
        let pipeline = DigestPipeline::new(&config, &source, summarizer(), &transport);

        pipeline.run(now()).await.unwrap();

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].max_results, 12);
        assert_eq!(queries[0].categories, vec!["cs.LG"]);
        assert_eq!(queries[0].days_back, 2);
    }

    #[tokio::test]
    async fn test_digest_is_sorted_and_truncated() {
        let papers = vec![
            paper("old-miss", "Something", 40),
            paper("title-hit", "Transformer", 30),
            paper("new-miss", "Other", 1),
        ];
        let config = config(2);
        let source = FakeSource::new(Ok(papers));
        let transport = RecordingTransport::default();
        let pipeline = DigestPipeline::new(&config, &source, summarizer(), &transport);

        let RunOutcome::Delivered(report) = pipeline.run(now()).await.unwrap() else {
            panic!("expected delivery");
        };
        let ids: Vec<&str> = report.papers.iter().map(|p| p.paper.id.as_str()).collect();
        assert_eq!(ids, vec!["title-hit", "new-miss"]);
        assert_eq!(report.candidates, 3);
    }

    #[tokio::test]
    async fn test_no_candidates_sends_nothing() {
        let config = config(5);
        let source = FakeSource::new(Ok(Vec::new()));
        let transport = RecordingTransport::default();
        let pipeline = DigestPipeline::new(&config, &source, summarizer(), &transport);

        let outcome = pipeline.run(now()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::NoPapers));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_aborts_run() {
        let config = config(5);
        let source = FakeSource::new(Err(DigestError::Fetch("503".to_string())));
        let transport = RecordingTransport::default();
        let pipeline = DigestPipeline::new(&config, &source, summarizer(), &transport);

        let err = pipeline.run(now()).await.unwrap_err();
        assert!(matches!(err, DigestError::Fetch(_)));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_error_is_fatal() {
        let config = config(5);
        let source = FakeSource::new(Ok(vec![paper("1", "Transformer", 1)]));
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let pipeline = DigestPipeline::new(&config, &source, summarizer(), &transport);

        let err = pipeline.run(now()).await.unwrap_err();
        assert!(matches!(err, DigestError::Delivery(_)));
    }
}
