use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SUMMARY_PLACEHOLDER: &str = "Summary unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliations: Vec::new(),
        }
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliations.push(affiliation.into());
        self
    }
}

/// A paper as returned by the paper source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// arXiv identifier including version, e.g. `2401.01234v1`
    pub id: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub published: DateTime<Utc>,
    pub abs_url: String,
    pub pdf_url: String,
}

impl PaperRecord {
    /// "First, Second, Third et al." as shown in the digest.
    pub fn short_author_list(&self) -> String {
        let mut names = self
            .authors
            .iter()
            .take(3)
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if self.authors.len() > 3 {
            names.push_str(" et al.");
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Summary {
    Generated(String),
    Unavailable(String),
}

impl Summary {
    /// Text to show in the digest; never empty.
    pub fn display_text(&self) -> &str {
        match self {
            Summary::Generated(text) if !text.trim().is_empty() => text,
            _ => SUMMARY_PLACEHOLDER,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Summary::Generated(text) if !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPaper {
    pub paper: PaperRecord,
    pub score: f64,
    pub summary: Option<Summary>,
}

impl ScoredPaper {
    pub fn new(paper: PaperRecord, score: f64) -> Self {
        Self {
            paper,
            score,
            summary: None,
        }
    }

    pub fn summary_text(&self) -> &str {
        self.summary
            .as_ref()
            .map(Summary::display_text)
            .unwrap_or(SUMMARY_PLACEHOLDER)
    }
}

/// Archived record of a sent digest
#[derive(Debug, Serialize, Deserialize)]
pub struct DigestArchive {
    pub version: String,
    pub created_at: String,
    pub recipient: String,
    pub keywords: Vec<String>,
    pub papers: Vec<ScoredPaper>,
}

impl DigestArchive {
    pub fn new(recipient: impl Into<String>, keywords: Vec<String>, papers: Vec<ScoredPaper>) -> Self {
        Self {
            version: "1.0".to_string(),
            created_at: Utc::now().to_rfc3339(),
            recipient: recipient.into(),
            keywords,
            papers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn paper_with_authors(count: usize) -> PaperRecord {
        PaperRecord {
            id: "2401.00001v1".to_string(),
            title: "A Paper".to_string(),
            authors: (1..=count).map(|i| Author::new(format!("Author {}", i))).collect(),
            abstract_text: "Abstract".to_string(),
            categories: vec!["cs.LG".to_string()],
            published: Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap(),
            abs_url: "https://arxiv.org/abs/2401.00001v1".to_string(),
            pdf_url: "https://arxiv.org/pdf/2401.00001v1".to_string(),
        }
    }

    #[test]
    fn test_short_author_list_three_or_fewer() {
        assert_eq!(
            paper_with_authors(3).short_author_list(),
            "Author 1, Author 2, Author 3"
        );
    }

    #[test]
    fn test_short_author_list_truncates() {
        assert_eq!(
            paper_with_authors(5).short_author_list(),
            "Author 1, Author 2, Author 3 et al."
        );
    }

    #[test]
    fn test_summary_placeholder_when_missing_or_unavailable() {
        let mut scored = ScoredPaper::new(paper_with_authors(1), 0.0);
        assert_eq!(scored.summary_text(), SUMMARY_PLACEHOLDER);

        scored.summary = Some(Summary::Unavailable("timeout".to_string()));
        assert_eq!(scored.summary_text(), SUMMARY_PLACEHOLDER);

        scored.summary = Some(Summary::Generated("   ".to_string()));
        assert_eq!(scored.summary_text(), SUMMARY_PLACEHOLDER);

        scored.summary = Some(Summary::Generated("- Point".to_string()));
        assert_eq!(scored.summary_text(), "- Point");
    }
}
