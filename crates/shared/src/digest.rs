use chrono::{DateTime, Utc};

use crate::models::ScoredPaper;

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedDigest {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub struct DigestFormatter;

impl DigestFormatter {
    pub fn subject(date: DateTime<Utc>) -> String {
        format!("ArXiv Daily Digest – {}", date.format("%B %-d, %Y"))
    }

    pub fn render(papers: &[ScoredPaper], keywords: &[String], date: DateTime<Utc>) -> FormattedDigest {
        FormattedDigest {
            subject: Self::subject(date),
            html: Self::generate_html(papers, keywords, date),
            text: Self::generate_text(papers, keywords, date),
        }
    }

    pub fn generate_html(papers: &[ScoredPaper], keywords: &[String], date: DateTime<Utc>) -> String {
        let mut html = String::new();
        let formatted_date = date.format("%B %-d, %Y").to_string();

        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
        html.push_str("  <meta charset=\"UTF-8\">\n");
        html.push_str(&format!(
            "  <title>ArXiv Daily Digest - {}</title>\n",
            formatted_date
        ));
        html.push_str("</head>\n<body>\n");
        html.push_str(
            "<div style=\"font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto;\">\n",
        );
        html.push_str("  <h1 style=\"color: #1a73e8; text-align: center;\">ArXiv Daily Digest</h1>\n");
        html.push_str(&format!(
            "  <h2 style=\"color: #5f6368; text-align: center;\">{} AI/CS Paper{} for {}</h2>\n",
            papers.len(),
            if papers.len() == 1 { "" } else { "s" },
            formatted_date
        ));
        if !keywords.is_empty() {
            html.push_str(&format!(
                "  <p style=\"text-align: center; color: #5f6368;\">Keywords: {}</p>\n",
                Self::escape_html(&keywords.join(", "))
            ));
        }
        html.push_str("  <hr style=\"border: 1px solid #e0e0e0; margin: 30px 0;\">\n");

        for scored in papers {
            Self::push_paper_html(&mut html, scored);
        }

        html.push_str("  <hr style=\"border: 1px solid #e0e0e0; margin: 30px 0;\">\n");
        html.push_str(
            "  <p style=\"text-align: center; color: #9aa0a6; font-size: 12px;\">Generated by ArXiv Daily Digest</p>\n",
        );
        html.push_str("</div>\n</body>\n</html>");
        html
    }

    fn push_paper_html(html: &mut String, scored: &ScoredPaper) {
        let paper = &scored.paper;

        html.push_str("  <div style=\"margin-bottom: 30px; padding: 20px; border-left: 4px solid #4285f4; background-color: #f8f9fa;\">\n");
        html.push_str(&format!(
            "    <h3 style=\"margin-top: 0; color: #1a73e8;\">{}</h3>\n",
            Self::escape_html(&paper.title)
        ));
        html.push_str(&format!(
            "    <p style=\"color: #5f6368; margin: 5px 0;\"><strong>Authors:</strong> {}</p>\n",
            Self::escape_html(&paper.short_author_list())
        ));
        html.push_str(&format!(
            "    <p style=\"color: #5f6368; margin: 5px 0;\"><strong>Published:</strong> {} &middot; <strong>Score:</strong> {:.1}</p>\n",
            paper.published.format("%Y-%m-%d"),
            scored.score
        ));

        let summary_html = Self::escape_html(scored.summary_text()).replace('\n', "<br>\n      ");
        match &scored.summary {
            Some(s) if s.is_generated() => {
                html.push_str(&format!("    <div style=\"margin: 15px 0;\">\n      {}\n    </div>\n", summary_html));
            }
            _ => {
                html.push_str(&format!(
                    "    <div style=\"margin: 15px 0; color: #d93025; font-style: italic;\">{}</div>\n",
                    summary_html
                ));
            }
        }

        html.push_str(&format!(
            "    <p style=\"margin-top: 15px;\"><a href=\"{}\" style=\"color: #1a73e8; text-decoration: none; margin-right: 15px;\">PDF</a> <a href=\"{}\" style=\"color: #1a73e8; text-decoration: none;\">arXiv</a></p>\n",
            Self::escape_html(&paper.pdf_url),
            Self::escape_html(&paper.abs_url)
        ));
        html.push_str("  </div>\n");
    }

    pub fn generate_text(papers: &[ScoredPaper], keywords: &[String], date: DateTime<Utc>) -> String {
        let rule = "-".repeat(60);
        let mut text = format!("ArXiv Digest - {}\n", date.format("%B %-d, %Y"));
        if !keywords.is_empty() {
            text.push_str(&format!("Keywords: {}\n", keywords.join(", ")));
        }
        text.push_str(&"=".repeat(60));
        text.push_str("\n\n");

        for scored in papers {
            let paper = &scored.paper;
            text.push_str(&format!("Title: {}\n", paper.title));
            text.push_str(&format!("Authors: {}\n", paper.short_author_list()));
            text.push_str(&format!("Published: {}\n", paper.published.format("%Y-%m-%d")));
            text.push_str(&format!("PDF: {}\n", paper.pdf_url));
            text.push_str(&format!("arXiv: {}\n\n", paper.abs_url));
            text.push_str("Summary:\n");
            text.push_str(scored.summary_text());
            text.push_str("\n\n");
            text.push_str(&rule);
            text.push_str("\n\n");
        }

        text
    }

    fn escape_html(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }
}
