//! Outbound mail collaborator.
//!
//! The core only ever looks at success or failure of a send; message
//! contents are opaque to it. Implementations must not retry on their own —
//! a failed delivery is surfaced to the caller.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    /// Delivery refused by a non-SMTP mailer implementation.
    #[error("mail delivery rejected: {0}")]
    Rejected(String),
}

/// Sends a single message to a single recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> Result<(), MailError>;
}

/// SMTP mailer over an implicit-TLS relay (submissions port).
#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build a pooled transport for `relay:port`. Credentials are optional;
    /// unauthenticated relays are common in local setups.
    pub fn new(
        relay: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
    ) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)?.port(port);
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }
        Ok(Self {
            transport: builder.build(),
            from: from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)?;
        self.transport.send(message).await?;
        debug!(to, subject, "mail accepted by relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_with_and_without_credentials() {
        assert!(
            SmtpMailer::new(
                "smtp.example.com",
                465,
                Some(("user".into(), "pass".into())),
                "Filegate <no-reply@example.com>",
            )
            .is_ok()
        );
        assert!(SmtpMailer::new("smtp.example.com", 465, None, "no-reply@example.com").is_ok());
    }

    #[tokio::test]
    async fn rejects_malformed_from_address() {
        let err = SmtpMailer::new("smtp.example.com", 465, None, "not an address").unwrap_err();
        assert!(matches!(err, MailError::Address(_)));
    }
}
