use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DigestError, Result};

pub const DEFAULT_KEYWORDS: &str = "artificial intelligence, machine learning, computer vision, NLP";
pub const DEFAULT_PRIORITY_SOURCES: &str = "google, openai, anthropic, deepmind";
pub const DEFAULT_FROM_EMAIL: &str = "digest@artefact.ai";
pub const DEFAULT_SITE_NAME: &str = "ArXiv Daily Digest";
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 465;

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "cs.AI", "cs.LG", "cs.CV", "cs.CL", "cs.RO", "cs.CR", "cs.HC", "cs.IR",
];

pub const DAYS_BACK_RANGE: (u32, u32) = (1, 7);
pub const MAX_PAPERS_RANGE: (usize, usize) = (1, 20);

/// Splits "a, b,,c" into ["a", "b", "c"].
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Sendgrid,
    Smtp,
}

impl FromStr for TransportKind {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sendgrid" => Ok(TransportKind::Sendgrid),
            "smtp" | "gmail" => Ok(TransportKind::Smtp),
            other => Err(DigestError::Configuration(format!(
                "Unknown transport '{}'. Use 'sendgrid' or 'smtp'",
                other
            ))),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Sendgrid => write!(f, "sendgrid"),
            TransportKind::Smtp => write!(f, "smtp"),
        }
    }
}

/// Options for a single digest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    #[serde(deserialize_with = "list_or_csv")]
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "list_or_csv")]
    pub categories: Vec<String>,
    pub days_back: u32,
    pub max_papers: usize,
    #[serde(deserialize_with = "list_or_csv")]
    pub priority_sources: Vec<String>,
    pub email: String,
    pub sort_by_relevance: bool,
    pub transport: TransportKind,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            keywords: split_list(DEFAULT_KEYWORDS),
            categories: Vec::new(),
            days_back: 7,
            max_papers: 20,
            priority_sources: split_list(DEFAULT_PRIORITY_SOURCES),
            email: String::new(),
            sort_by_relevance: true,
            transport: TransportKind::default(),
        }
    }
}

impl DigestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DigestError::Configuration(format!(
                "Config file not found or unreadable: {} ({})",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            DigestError::Configuration(format!("Invalid JSON in config file {}: {}", path.display(), e))
        })
    }

    /// Categories to query, falling back to the default CS set.
    pub fn effective_categories(&self) -> Vec<String> {
        if self.categories.is_empty() {
            DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
        } else {
            self.categories.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (min_days, max_days) = DAYS_BACK_RANGE;
        if !(min_days..=max_days).contains(&self.days_back) {
            return Err(DigestError::Configuration(format!(
                "days_back must be between {} and {}, got {}",
                min_days, max_days, self.days_back
            )));
        }

        let (min_papers, max_papers) = MAX_PAPERS_RANGE;
        if !(min_papers..=max_papers).contains(&self.max_papers) {
            return Err(DigestError::Configuration(format!(
                "max_papers must be between {} and {}, got {}",
                min_papers, max_papers, self.max_papers
            )));
        }

        if self.email.trim().is_empty() {
            return Err(DigestError::Configuration(
                "Email address is required. Provide --email or set 'email' in the config file"
                    .to_string(),
            ));
        }
        self.email
            .trim()
            .parse::<lettre::Address>()
            .map_err(|e| DigestError::Configuration(format!("Invalid email '{}': {}", self.email, e)))?;

        if let Some(bad) = self
            .categories
            .iter()
            .find(|c| c.is_empty() || c.chars().any(char::is_whitespace))
        {
            return Err(DigestError::Configuration(format!(
                "Invalid category code: '{}'",
                bad
            )));
        }

        Ok(())
    }
}

fn list_or_csv<'de, D>(deserializer: D) -> core::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Option::<ListOrCsv>::deserialize(deserializer)? {
        Some(ListOrCsv::List(items)) => items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(ListOrCsv::Csv(value)) => split_list(&value),
        None => Vec::new(),
    })
}

#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Secrets and service settings, read from the environment once per run.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub openrouter_api_key: Option<String>,
    pub openrouter_site_url: Option<String>,
    pub openrouter_site_name: String,
    pub sendgrid_api_key: Option<String>,
    pub from_email: String,
    pub smtp: Option<SmtpCredentials>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::try_load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let smtp = match (get("GMAIL_USER"), get("GMAIL_APP_PASSWORD")) {
            (Some(username), Some(password)) => Some(SmtpCredentials {
                host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                port: get("SMTP_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(DEFAULT_SMTP_PORT),
                username,
                password,
            }),
            _ => None,
        };

        Self {
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openrouter_site_url: get("OPENROUTER_SITE_URL"),
            openrouter_site_name: get("OPENROUTER_SITE_NAME")
                .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
            sendgrid_api_key: get("SENDGRID_API_KEY"),
            from_email: get("FROM_EMAIL").unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
            smtp,
        }
    }

    pub fn openrouter_key(&self) -> Result<&str> {
        self.openrouter_api_key.as_deref().ok_or_else(|| {
            DigestError::Configuration(
                "OPENROUTER_API_KEY not found.\n\n\
                To fix this, create ~/.config/arxiv-digest/.env with:\n  \
                OPENROUTER_API_KEY=your_key_here\n\n\
                Get an OpenRouter API key from: https://openrouter.ai/keys"
                    .to_string(),
            )
        })
    }

    /// Checks that everything the selected transport needs is present.
    pub fn require_transport(&self, transport: TransportKind) -> Result<()> {
        match transport {
            TransportKind::Sendgrid => {
                if self.sendgrid_api_key.is_none() {
                    return Err(DigestError::Configuration(
                        "SENDGRID_API_KEY not set but transport is 'sendgrid'".to_string(),
                    ));
                }
                self.from_email.parse::<lettre::Address>().map_err(|e| {
                    DigestError::Configuration(format!("Invalid FROM_EMAIL '{}': {}", self.from_email, e))
                })?;
            }
            TransportKind::Smtp => {
                if self.smtp.is_none() {
                    return Err(DigestError::Configuration(
                        "GMAIL_USER and GMAIL_APP_PASSWORD must be set for transport 'smtp'.\n\
                        Use an App Password, not your regular password"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Everything a full run needs before the first network call.
    pub fn validate_for_run(&self, transport: TransportKind) -> Result<()> {
        self.openrouter_key()?;
        self.require_transport(transport)
    }

    fn try_load_dotenv() {
        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/arxiv-digest/.env
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("arxiv-digest").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }
}
