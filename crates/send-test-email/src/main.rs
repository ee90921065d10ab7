use anyhow::{Context, Result};
use clap::Parser;
use shared::{transport_for, Credentials, FormattedDigest, TransportKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "send-test-email")]
#[command(about = "Send a short test message to check email delivery settings")]
struct Args {
    /// Recipient address
    #[arg(long)]
    to: String,

    /// Delivery transport (sendgrid or smtp)
    #[arg(short, long, default_value = "sendgrid")]
    transport: TransportKind,
}

fn test_message() -> FormattedDigest {
    FormattedDigest {
        subject: "ArXiv Digest - Test Email".to_string(),
        html: "<html><body>\
               <h2>ArXiv Digest test</h2>\
               <p>If you can read this, email delivery is configured correctly.</p>\
               </body></html>"
            .to_string(),
        text: "ArXiv Digest test\n\nIf you can read this, email delivery is configured correctly.\n"
            .to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let credentials = Credentials::from_env();

    let transport = transport_for(args.transport, &credentials)?;
    println!("📧 Sending test email to {} via {}...", args.to, transport.name());

    transport
        .send(&args.to, &test_message())
        .await
        .context("Failed to send test email")?;

    info!(to = %args.to, transport = transport.name(), "test email accepted");
    println!("✅ Test email sent. Check your inbox (and spam folder).");
    Ok(())
}
