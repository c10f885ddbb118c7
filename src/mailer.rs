//! SMTP delivery for instructor reports.
//!
//! A single authenticated submission over TLS to a fixed relay. Delivery is
//! one-shot: failures are logged for operators and swallowed; the student
//! flow never sees them.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, instrument};

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

#[derive(Clone)]
pub struct Mailer {
  transport: AsyncSmtpTransport<Tokio1Executor>,
  sender: String,
}

impl Mailer {
  /// Construct the mailer if EMAIL_SENDER and EMAIL_PASSWORD are present;
  /// otherwise return None. Absence disables email delivery only.
  pub fn from_env() -> Option<Self> {
    let sender = std::env::var("EMAIL_SENDER").ok()?;
    let password = std::env::var("EMAIL_PASSWORD").ok()?;
    let host = std::env::var("SMTP_HOST").unwrap_or_else(|_| DEFAULT_SMTP_HOST.into());

    let transport = match AsyncSmtpTransport::<Tokio1Executor>::relay(&host) {
      Ok(builder) => builder
        .credentials(Credentials::new(sender.clone(), password))
        .build(),
      Err(e) => {
        error!(target: "report", %host, error = %e, "SMTP relay configuration invalid");
        return None;
      }
    };

    Some(Self { transport, sender })
  }

  /// Send one plain-text message. No retries.
  #[instrument(level = "info", skip(self, body), fields(%to, subject_len = subject.len(), body_len = body.len()))]
  pub async fn send_plain(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
    let message = Message::builder()
      .from(self.sender.parse().map_err(|e| format!("bad sender address: {e}"))?)
      .to(to.parse().map_err(|e| format!("bad recipient address: {e}"))?)
      .subject(subject)
      .header(ContentType::TEXT_PLAIN)
      .body(body.to_string())
      .map_err(|e| format!("message build failed: {e}"))?;

    match self.transport.send(message).await {
      Ok(_) => {
        info!(target: "report", %to, "Report email delivered");
        Ok(())
      }
      Err(e) => Err(e.to_string()),
    }
  }
}
