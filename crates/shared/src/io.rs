use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::digest::FormattedDigest;
use crate::error::{DigestError, Result};
use crate::models::DigestArchive;

/// Get the default directory for archived digests
pub fn get_default_digest_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| DigestError::Configuration("Could not determine local data directory".to_string()))?
        .join("arxiv-digest")
        .join("digests");

    fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedDigest {
    pub html: PathBuf,
    pub text: PathBuf,
    pub json: PathBuf,
}

/// Writes `arxiv_digest_YYYYMMDD.{html,txt,json}` into `dir`.
pub fn save_digest(
    dir: &Path,
    digest: &FormattedDigest,
    archive: &DigestArchive,
    date: DateTime<Utc>,
) -> Result<SavedDigest> {
    fs::create_dir_all(dir)?;
    let stem = format!("arxiv_digest_{}", date.format("%Y%m%d"));

    let saved = SavedDigest {
        html: dir.join(format!("{}.html", stem)),
        text: dir.join(format!("{}.txt", stem)),
        json: dir.join(format!("{}.json", stem)),
    };

    fs::write(&saved.html, &digest.html)?;
    fs::write(&saved.text, &digest.text)?;
    fs::write(&saved.json, serde_json::to_string_pretty(archive)?)?;

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, PaperRecord, ScoredPaper, Summary};
    use chrono::TimeZone;

    #[test]
    fn test_save_and_reload_digest() {
        let dir = tempfile::tempdir().unwrap();
        let date = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let digest = FormattedDigest {
            subject: "Subject".to_string(),
            html: "<p>html</p>".to_string(),
            text: "text".to_string(),
        };
        let mut scored = ScoredPaper::new(
            PaperRecord {
                id: "2602.00001v1".to_string(),
                title: "Paper".to_string(),
                authors: vec![Author::new("Ada").with_affiliation("MIT")],
                abstract_text: "Abstract".to_string(),
                categories: vec!["cs.AI".to_string()],
                published: date,
                abs_url: "https://arxiv.org/abs/2602.00001v1".to_string(),
                pdf_url: "https://arxiv.org/pdf/2602.00001v1".to_string(),
            },
            2.5,
        );
        scored.summary = Some(Summary::Generated("• Point".to_string()));
        let archive = DigestArchive::new("reader@example.com", vec!["llm".to_string()], vec![scored.clone()]);

        let saved = save_digest(dir.path(), &digest, &archive, date).unwrap();
        assert!(saved.html.ends_with("arxiv_digest_20260201.html"));
        assert_eq!(fs::read_to_string(&saved.html).unwrap(), "<p>html</p>");
        assert_eq!(fs::read_to_string(&saved.text).unwrap(), "text");

        let loaded: DigestArchive =
            serde_json::from_str(&fs::read_to_string(&saved.json).unwrap()).unwrap();
        assert_eq!(loaded.version, "1.0");
        assert_eq!(loaded.recipient, "reader@example.com");
        assert_eq!(loaded.papers, vec![scored]);
    }
}
