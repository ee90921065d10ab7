use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use shared::config::split_list;
use shared::pipeline::build_query;
use shared::{
    get_default_digest_dir, save_digest, transport_for, ArxivClient, Credentials, DigestArchive,
    DigestConfig, DigestError, DigestPipeline, OpenRouterClient, RunOutcome, Summarizer,
    TransportKind,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daily-digest")]
#[command(about = "Email a daily digest of recent arXiv papers with AI-written summaries")]
struct Args {
    /// JSON config file with run options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recipient address
    #[arg(short, long)]
    email: Option<String>,

    /// Comma-separated keywords
    #[arg(short, long)]
    keywords: Option<String>,

    /// Comma-separated arXiv categories (e.g. cs.AI,cs.LG)
    #[arg(long)]
    categories: Option<String>,

    /// Maximum number of papers in the digest (1-20)
    #[arg(short, long)]
    max_papers: Option<usize>,

    /// How many days back to search (1-7)
    #[arg(short, long)]
    days_back: Option<u32>,

    /// Comma-separated institutions that boost a paper's score
    #[arg(long)]
    priority_sources: Option<String>,

    /// Skip relevance scoring and list newest papers first
    #[arg(long)]
    no_relevance_sort: bool,

    /// Delivery transport (sendgrid or smtp)
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Also write the digest to the local archive directory
    #[arg(long)]
    save: bool,

    /// Validate config and credentials, then exit without any network call
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// How a run ended when no error was raised.
#[derive(Debug, PartialEq)]
enum RunStatus {
    Sent,
    DryRun,
    /// Nothing matched, nothing was sent. Reported to the scheduler as a failed run.
    NoPapers,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn resolve_config(args: &Args) -> Result<DigestConfig> {
    let mut config = match &args.config {
        Some(path) => DigestConfig::load(path)?,
        None => DigestConfig::default(),
    };

    if let Some(email) = &args.email {
        config.email = email.clone();
    }
    if let Some(keywords) = &args.keywords {
        config.keywords = split_list(keywords);
    }
    if let Some(categories) = &args.categories {
        config.categories = split_list(categories);
    }
    if let Some(max_papers) = args.max_papers {
        config.max_papers = max_papers;
    }
    if let Some(days_back) = args.days_back {
        config.days_back = days_back;
    }
    if let Some(sources) = &args.priority_sources {
        config.priority_sources = split_list(sources);
    }
    if args.no_relevance_sort {
        config.sort_by_relevance = false;
    }
    if let Some(transport) = args.transport {
        config.transport = transport;
    }

    config.validate()?;
    Ok(config)
}

async fn run(args: Args, credentials: Credentials) -> Result<RunStatus> {
    let config = resolve_config(&args)?;
    credentials.validate_for_run(config.transport)?;

    println!("📋 Digest for {}", config.email);
    println!("  Keywords: {}", config.keywords.join(", "));
    println!("  Categories: {}", config.effective_categories().join(", "));
    println!(
        "  Last {} day(s), up to {} papers, via {}",
        config.days_back, config.max_papers, config.transport
    );

    if args.dry_run {
        let query = build_query(&config);
        info!(query = %query.search_query(), "dry run, skipping fetch and delivery");
        println!("\n🔍 Query: {}", query.search_query());
        println!("\n✅ Configuration and credentials look good (dry run, nothing sent)");
        return Ok(RunStatus::DryRun);
    }

    let source = ArxivClient::new()?;
    let summarizer = Summarizer::new(OpenRouterClient::new(&credentials)?);
    let transport = transport_for(config.transport, &credentials)?;
    let pipeline = DigestPipeline::new(&config, &source, summarizer, transport.as_ref());

    println!("\n📚 Fetching papers from arXiv, summarizing and sending...");
    println!("  (This may take a minute...)");
    let now = Utc::now();
    let outcome = pipeline.run(now).await.context("Digest run failed")?;

    let report = match outcome {
        RunOutcome::NoPapers => {
            println!("\nNo papers found matching your criteria. Nothing sent.");
            return Ok(RunStatus::NoPapers);
        }
        RunOutcome::Delivered(report) => report,
    };

    println!(
        "✓ Selected {} of {} candidate papers",
        report.papers.len(),
        report.candidates
    );
    println!(
        "✓ Summarized {}/{} papers",
        report.summarized(),
        report.papers.len()
    );
    info!(
        candidates = report.candidates,
        selected = report.papers.len(),
        summarized = report.summarized(),
        "digest delivered"
    );
    let missing = report.papers.len() - report.summarized();
    if missing > 0 {
        println!("⚠ {} paper(s) sent with a placeholder summary", missing);
    }

    if args.save {
        let dir = get_default_digest_dir()?;
        let archive = DigestArchive::new(
            config.email.clone(),
            config.keywords.clone(),
            report.papers.clone(),
        );
        let saved = save_digest(&dir, &report.digest, &archive, now)
            .context("Failed to save digest")?;
        println!("\n💾 Digest saved to: {}", saved.html.display());
    }

    println!("\n✅ Digest sent to {}", config.email);
    Ok(RunStatus::Sent)
}

/// 0 on success, 2 for configuration problems, 1 for everything else.
fn exit_status(result: &Result<RunStatus>) -> u8 {
    match result {
        Ok(RunStatus::Sent | RunStatus::DryRun) => 0,
        Ok(RunStatus::NoPapers) => 1,
        Err(e) => match e.downcast_ref::<DigestError>() {
            Some(err) if err.is_configuration() => 2,
            _ => 1,
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose);

    let result = run(args, Credentials::from_env()).await;
    if let Err(e) = &result {
        eprintln!("\n❌ Error: {:#}", e);
    }
    ExitCode::from(exit_status(&result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("daily-digest").chain(extra.iter().copied()))
    }

    fn credentials() -> Credentials {
        let vars: HashMap<String, String> = [
            ("OPENROUTER_API_KEY", "or-key"),
            ("SENDGRID_API_KEY", "sg-key"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Credentials::from_map(&vars)
    }

    #[test]
    fn test_cli_values_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "email": "file@example.com",
                "keywords": "graph networks",
                "max_papers": 5,
                "days_back": 2,
                "sort_by_relevance": true,
                "transport": "smtp"
            }}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = resolve_config(&args(&[
            "--config",
            path,
            "--email",
            "cli@example.com",
            "--max-papers",
            "3",
            "--no-relevance-sort",
            "--transport",
            "sendgrid",
        ]))
        .unwrap();

        assert_eq!(config.email, "cli@example.com");
        assert_eq!(config.max_papers, 3);
        assert!(!config.sort_by_relevance);
        assert_eq!(config.transport, TransportKind::Sendgrid);
        // untouched by the command line
        assert_eq!(config.keywords, vec!["graph networks"]);
        assert_eq!(config.days_back, 2);
    }

    #[test]
    fn test_cli_lists_are_comma_separated() {
        let config = resolve_config(&args(&[
            "--email",
            "reader@example.com",
            "--keywords",
            "llm, diffusion",
            "--categories",
            "cs.LG,cs.CL",
        ]))
        .unwrap();
        assert_eq!(config.keywords, vec!["llm", "diffusion"]);
        assert_eq!(config.categories, vec!["cs.LG", "cs.CL"]);
        assert!(config.sort_by_relevance);
    }

    #[test]
    fn test_invalid_config_exits_with_2() {
        let out_of_range = resolve_config(&args(&["--email", "reader@example.com", "--days-back", "9"]));
        assert_eq!(exit_status(&out_of_range.map(|_| RunStatus::Sent)), 2);

        let missing_file = resolve_config(&args(&["--config", "/nonexistent/digest.json"]));
        assert_eq!(exit_status(&missing_file.map(|_| RunStatus::Sent)), 2);

        let no_email = resolve_config(&args(&[]));
        assert_eq!(exit_status(&no_email.map(|_| RunStatus::Sent)), 2);
    }

    #[test]
    fn test_run_failures_exit_with_1() {
        let fetch: Result<RunStatus> = Err(anyhow::Error::from(DigestError::Fetch("503".to_string()))
            .context("Digest run failed"));
        assert_eq!(exit_status(&fetch), 1);

        let delivery: Result<RunStatus> =
            Err(anyhow::Error::from(DigestError::Delivery("rejected".to_string())));
        assert_eq!(exit_status(&delivery), 1);

        let other: Result<RunStatus> = Err(anyhow::anyhow!("disk full"));
        assert_eq!(exit_status(&other), 1);

        // context does not hide a configuration error
        let config: Result<RunStatus> = Err(anyhow::Error::from(DigestError::Configuration(
            "bad".to_string(),
        ))
        .context("Digest run failed"));
        assert_eq!(exit_status(&config), 2);
    }

    #[test]
    fn test_no_papers_is_a_failed_run() {
        assert_eq!(exit_status(&Ok(RunStatus::NoPapers)), 1);
        assert_eq!(exit_status(&Ok(RunStatus::Sent)), 0);
        assert_eq!(exit_status(&Ok(RunStatus::DryRun)), 0);
    }

    #[tokio::test]
    async fn test_dry_run_stops_before_any_client_is_built() {
        let status = run(
            args(&["--dry-run", "--email", "reader@example.com"]),
            credentials(),
        )
        .await
        .unwrap();
        assert_eq!(status, RunStatus::DryRun);
    }

    #[tokio::test]
    async fn test_dry_run_still_checks_credentials() {
        let result = run(
            args(&["--dry-run", "--email", "reader@example.com"]),
            Credentials::from_map(&HashMap::new()),
        )
        .await;
        assert_eq!(exit_status(&result), 2);
    }
}
