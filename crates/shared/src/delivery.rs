use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials as SmtpLogin;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Credentials, SmtpCredentials, TransportKind};
use crate::digest::FormattedDigest;
use crate::error::{DigestError, Result};

pub const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Something that can put a rendered digest in a mailbox.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, recipient: &str, digest: &FormattedDigest) -> Result<()>;
}

/// Builds the transport selected in the run configuration.
pub fn transport_for(kind: TransportKind, credentials: &Credentials) -> Result<Box<dyn Transport>> {
    credentials.require_transport(kind)?;
    match kind {
        TransportKind::Sendgrid => {
            let api_key = credentials.sendgrid_api_key.clone().unwrap_or_default();
            Ok(Box::new(SendGridTransport::new(api_key, credentials.from_email.clone())?))
        }
        TransportKind::Smtp => {
            let smtp = credentials.smtp.clone().ok_or_else(|| {
                DigestError::Configuration("SMTP credentials missing".to_string())
            })?;
            Ok(Box::new(SmtpTransport::new(smtp)))
        }
    }
}

pub struct SmtpTransport {
    settings: SmtpCredentials,
}

impl SmtpTransport {
    pub fn new(settings: SmtpCredentials) -> Self {
        Self { settings }
    }

    pub fn build_message(&self, recipient: &str, digest: &FormattedDigest) -> Result<Message> {
        let from: Mailbox = self.settings.username.parse().map_err(|e| {
            DigestError::Configuration(format!("Invalid from address '{}': {}", self.settings.username, e))
        })?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| DigestError::Configuration(format!("Invalid recipient '{}': {}", recipient, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(digest.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(
                digest.text.clone(),
                digest.html.clone(),
            ))
            .map_err(|e| DigestError::Delivery(format!("Failed to build email: {}", e)))
    }

    fn mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = self.settings.host.as_str();
        // 465 is implicit TLS; anything else upgrades with STARTTLS
        let builder = if self.settings.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| DigestError::Delivery(format!("SMTP relay error: {}", e)))?;

        Ok(builder
            .port(self.settings.port)
            .credentials(SmtpLogin::new(
                self.settings.username.clone(),
                self.settings.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(30)))
            .build())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, recipient: &str, digest: &FormattedDigest) -> Result<()> {
        let message = self.build_message(recipient, digest)?;
        let mailer = self.mailer()?;

        debug!(host = %self.settings.host, port = self.settings.port, "sending via SMTP");
        let response = mailer.send(message).await.map_err(|e| {
            let text = e.to_string();
            if text.to_lowercase().contains("authentication") {
                DigestError::Delivery(format!(
                    "SMTP authentication failed ({}). Use an App Password, not your regular password",
                    text
                ))
            } else {
                DigestError::Delivery(format!("SMTP send error: {}", text))
            }
        })?;

        info!(code = %response.code(), "SMTP accepted digest");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendGridMail<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: EmailAddress<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<EmailAddress<'a>>,
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

fn sendgrid_payload<'a>(from: &'a str, recipient: &'a str, digest: &'a FormattedDigest) -> SendGridMail<'a> {
    SendGridMail {
        personalizations: vec![Personalization {
            to: vec![EmailAddress { email: recipient }],
        }],
        from: EmailAddress { email: from },
        subject: &digest.subject,
        // SendGrid requires text/plain before text/html
        content: vec![
            Content {
                content_type: "text/plain",
                value: &digest.text,
            },
            Content {
                content_type: "text/html",
                value: &digest.html,
            },
        ],
    }
}

pub struct SendGridTransport {
    client: Client,
    api_key: String,
    from_email: String,
    url: String,
}

impl SendGridTransport {
    pub fn new(api_key: String, from_email: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DigestError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            from_email,
            url: SENDGRID_URL.to_string(),
        })
    }
}

#[async_trait]
impl Transport for SendGridTransport {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, recipient: &str, digest: &FormattedDigest) -> Result<()> {
        let payload = sendgrid_payload(&self.from_email, recipient, digest);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DigestError::Delivery(format!("Failed to reach SendGrid: {}", e)))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(DigestError::Delivery(format!(
                "SendGrid returned {}: {}",
                status, error_text
            )));
        }

        info!("SendGrid accepted digest");
        Ok(())
    }
}
