// Public modules
pub mod arxiv;
pub mod config;
pub mod delivery;
pub mod digest;
pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod summarizer;

// Re-export commonly used types
pub use arxiv::{ArxivClient, PaperQuery, PaperSource};
pub use config::{Credentials, DigestConfig, TransportKind};
pub use delivery::{transport_for, Transport};
pub use digest::{DigestFormatter, FormattedDigest};
pub use error::{DigestError, Result};
pub use io::{get_default_digest_dir, save_digest};
pub use models::{DigestArchive, PaperRecord, ScoredPaper, Summary};
pub use pipeline::{DigestPipeline, RunOutcome, RunReport};
pub use scoring::RelevanceScorer;
pub use summarizer::{OpenRouterClient, Summarizer};
