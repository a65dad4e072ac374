use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use glitch_db::CodeKind;

/// Outgoing mail. The SMTP implementation is used in production; tests
/// plug in a recorder.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Port 465 uses implicit TLS; anything else upgrades with STARTTLS.
    pub fn new(host: &str, port: u16, user: &str, pass: &str) -> Result<Self> {
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .with_context(|| format!("invalid SMTP relay {}", host))?;

        let transport = builder
            .port(port)
            .credentials(Credentials::new(user.trim().to_string(), pass.trim().to_string()))
            .build();

        let from: Mailbox = format!("THE GLITCH <{}>", user.trim())
            .parse()
            .context("EMAIL_USER is not a valid address")?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().with_context(|| format!("invalid recipient {}", to))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;

        self.transport.send(message).await?;
        debug!("Mail '{}' delivered to {}", subject, to);
        Ok(())
    }
}

/// Subject and HTML body for a one-time code email.
pub fn code_email(kind: CodeKind, code: &str) -> (&'static str, String) {
    let (subject, heading, intro) = match kind {
        CodeKind::Mfa => (
            "THE GLITCH - MFA Verification Code",
            "Verification Code",
            "Use the code below to finish signing in.",
        ),
        CodeKind::PasswordReset => (
            "THE GLITCH - Password Reset Code",
            "Password Reset",
            "We received a request to reset your password. Enter this code to continue.",
        ),
        CodeKind::SignupVerification => (
            "THE GLITCH - Email Verification Code",
            "Verify Your Email",
            "Welcome to THE GLITCH. Enter this code to verify your email address.",
        ),
    };

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; background: #0a0a0f; color: #e0e0e0; padding: 32px;">
  <h1 style="color: #00ff9d; text-align: center;">THE GLITCH</h1>
  <h2 style="text-align: center;">{heading}</h2>
  <p>{intro}</p>
  <div style="font-size: 32px; letter-spacing: 8px; text-align: center; font-weight: bold; color: #00ff9d; padding: 16px; border: 1px solid #00ff9d;">{code}</div>
  <p>This code expires in 10 minutes.</p>
  <p style="font-size: 12px; color: #888;">If you did not request this, you can ignore this email.</p>
</div>"#
    );

    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_email_embeds_code_and_subject() {
        let (subject, html) = code_email(CodeKind::PasswordReset, "482913");
        assert_eq!(subject, "THE GLITCH - Password Reset Code");
        assert!(html.contains(">482913<"));
    }
}
