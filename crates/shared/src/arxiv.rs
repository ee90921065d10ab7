use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{DigestError, Result};
use crate::models::{Author, PaperRecord};

pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 2000;

/// What to ask the paper source for.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperQuery {
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
    pub days_back: u32,
    pub max_results: usize,
}

impl PaperQuery {
    /// `(cat:a OR cat:b) AND ("kw one" OR "kw two")`
    pub fn search_query(&self) -> String {
        let mut parts = Vec::new();

        if self.categories.is_empty() {
            parts.push("cat:cs.*".to_string());
        } else {
            let cats = self
                .categories
                .iter()
                .map(|c| format!("cat:{}", c))
                .collect::<Vec<_>>()
                .join(" OR ");
            parts.push(format!("({})", cats));
        }

        let keywords = self
            .keywords
            .iter()
            .map(|k| k.replace('"', ""))
            .filter(|k| !k.trim().is_empty())
            .map(|k| format!("\"{}\"", k.trim()))
            .collect::<Vec<_>>();
        if !keywords.is_empty() {
            parts.push(format!("({})", keywords.join(" OR ")));
        }

        parts.join(" AND ")
    }
}

#[async_trait]
pub trait PaperSource: Send + Sync {
    async fn fetch_papers(&self, query: &PaperQuery, now: DateTime<Utc>) -> Result<Vec<PaperRecord>>;
}

pub struct ArxivClient {
    client: Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(ARXIV_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("arxiv-digest/0.1")
            .build()
            .map_err(|e| DigestError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn request_url(&self, query: &PaperQuery) -> String {
        format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.base_url,
            urlencoding::encode(&query.search_query()),
            query.max_results
        )
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let mut retries = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && retries < MAX_RETRIES {
                        retries += 1;
                        warn!(%status, retries, "arXiv request failed, retrying");
                        tokio::time::sleep(std::time::Duration::from_millis(
                            RETRY_DELAY_MS * retries as u64,
                        ))
                        .await;
                        continue;
                    }
                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| String::from("unknown error"));
                        return Err(DigestError::Fetch(format!(
                            "arXiv API returned error: {} - {}",
                            status, error_text
                        )));
                    }
                    return response
                        .text()
                        .await
                        .map_err(|e| DigestError::Fetch(format!("Failed to read arXiv response: {}", e)));
                }
                Err(e) if retries < MAX_RETRIES => {
                    retries += 1;
                    warn!(error = %e, retries, "arXiv request failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_DELAY_MS * retries as u64,
                    ))
                    .await;
                }
                Err(e) => {
                    return Err(DigestError::Fetch(format!("arXiv unreachable: {}", e)));
                }
            }
        }
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    async fn fetch_papers(&self, query: &PaperQuery, now: DateTime<Utc>) -> Result<Vec<PaperRecord>> {
        let url = self.request_url(query);
        debug!(%url, "querying arXiv");

        let body = self.fetch_with_retry(&url).await?;
        let papers = parse_feed(&body)?;
        let total = papers.len();

        let cutoff = now - Duration::days(query.days_back as i64);
        let recent: Vec<PaperRecord> = papers
            .into_iter()
            .filter(|p| p.published >= cutoff)
            .take(query.max_results)
            .collect();

        debug!(total, kept = recent.len(), %cutoff, "filtered arXiv results by date");
        Ok(recent)
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `http://arxiv.org/abs/2401.01234v1` -> `2401.01234v1`
pub fn arxiv_id_from_url(url: &str) -> String {
    url.split("/abs/")
        .nth(1)
        .unwrap_or(url)
        .trim_matches('/')
        .to_string()
}

fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

#[derive(Default)]
struct EntryBuilder {
    id_url: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<Author>,
    categories: Vec<String>,
    pdf_url: Option<String>,
    abs_url: Option<String>,
}

impl EntryBuilder {
    fn handle_empty_or_start(&mut self, e: &BytesStart) {
        match e.local_name().as_ref() {
            b"category" => {
                if let Some(term) = attribute(e, "term").filter(|t| !t.trim().is_empty()) {
                    if !self.categories.contains(&term) {
                        self.categories.push(term);
                    }
                }
            }
            b"link" => {
                let href = attribute(e, "href");
                let title = attribute(e, "title");
                let rel = attribute(e, "rel");
                if title.as_deref() == Some("pdf") {
                    self.pdf_url = href;
                } else if rel.as_deref() == Some("alternate") {
                    self.abs_url = href;
                }
            }
            _ => {}
        }
    }

    fn build(self) -> Result<PaperRecord> {
        let published = DateTime::parse_from_rfc3339(&self.published)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                DigestError::Fetch(format!(
                    "Invalid publication date '{}' for {}: {}",
                    self.published, self.id_url, e
                ))
            })?;

        let id = arxiv_id_from_url(&self.id_url);
        let abs_url = self.abs_url.unwrap_or_else(|| self.id_url.clone());
        let pdf_url = self
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}", id));

        Ok(PaperRecord {
            id,
            title: normalize_ws(&self.title),
            authors: self.authors,
            abstract_text: normalize_ws(&self.summary),
            categories: self.categories,
            published,
            abs_url,
            pdf_url,
        })
    }
}

/// Parses an arXiv Atom feed into paper records, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut author: Option<Author> = None;
    let mut text = String::new();
    let mut saw_feed = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"feed" => saw_feed = true,
                    b"entry" => entry = Some(EntryBuilder::default()),
                    b"author" if entry.is_some() => author = Some(Author::new(String::new())),
                    _ => {
                        if let Some(current) = entry.as_mut() {
                            current.handle_empty_or_start(&e);
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(current) = entry.as_mut() {
                    current.handle_empty_or_start(&e);
                }
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| DigestError::Fetch(format!("Malformed arXiv XML: {}", e)))?;
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&value);
            }
            Ok(Event::End(e)) => {
                let value = normalize_ws(&text);
                text.clear();
                let Some(current) = entry.as_mut() else {
                    continue;
                };
                match e.local_name().as_ref() {
                    b"name" => {
                        if let Some(a) = author.as_mut() {
                            a.name = value;
                        }
                    }
                    b"affiliation" => {
                        if let Some(a) = author.as_mut().filter(|_| !value.is_empty()) {
                            a.affiliations.push(value);
                        }
                    }
                    b"author" => {
                        if let Some(a) = author.take().filter(|a| !a.name.is_empty()) {
                            current.authors.push(a);
                        }
                    }
                    b"id" => current.id_url = value,
                    b"title" => current.title = value,
                    b"summary" => current.summary = value,
                    b"published" => current.published = value,
                    b"entry" => {
                        if let Some(done) = entry.take() {
                            papers.push(done.build()?);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DigestError::Fetch(format!(
                    "Malformed arXiv XML at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if !saw_feed {
        return Err(DigestError::Fetch(
            "arXiv response was not an Atom feed".to_string(),
        ));
    }

    Ok(papers)
}
