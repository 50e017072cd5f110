use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use fundflow_core::config::MailConfig;
use fundflow_core::domain::outbox::EmailMessage;
use fundflow_engine::{MailTransport, TransportError};

/// SMTP delivery behind the drainer's transport seam.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailTransport {
    /// Builds a transport when an SMTP host is configured; `None` means the
    /// caller should fall back to the log-only transport.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>, TransportError> {
        let Some(host) = &config.smtp_host else {
            return Ok(None);
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| TransportError(e.to_string()))?;
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Some(Self { mailer: builder.build(), from_address: config.from_address.clone() }))
    }
}

fn mailbox(raw: &str) -> Result<lettre::message::Mailbox, TransportError> {
    raw.parse().map_err(|e: lettre::address::AddressError| TransportError(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let mut builder = Message::builder()
            .from(mailbox(&self.from_address)?)
            .to(mailbox(&message.to_address)?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML);
        if let Some(cc) = &message.cc_address {
            builder = builder.cc(mailbox(cc)?);
        }

        let email =
            builder.body(message.html_body.clone()).map_err(|e| TransportError(e.to_string()))?;
        self.mailer.send(email).await.map_err(|e| TransportError(e.to_string()))?;
        Ok(())
    }
}
