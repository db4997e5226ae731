use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::settings::MailSettings;

pub const CONFIRMATION_SUBJECT: &str = "Your confirmation code";

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),
}

/// Delivers confirmation codes. Without an SMTP host the message is only
/// written to the log.
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Log {
        from: Mailbox,
    },
}

impl Mailer {
    pub fn from_settings(settings: &MailSettings) -> Result<Self, MailError> {
        let from: Mailbox = settings.from.parse()?;
        let Some(host) = &settings.smtp_host else {
            log::warn!("No SMTP host configured, emails will only be logged");
            return Ok(Mailer::Log { from });
        };

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(settings.smtp_port);
        if let (Some(user), Some(password)) = (&settings.smtp_user, &settings.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Mailer::Smtp {
            transport: builder.build(),
            from,
        })
    }

    fn confirmation_message(
        from: &Mailbox,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<Message, MailError> {
        let body = format!(
            "Hello, {}!\n\nYour confirmation code: {}\n\nExchange it for an access token at /api/v1/auth/token/.",
            username, code
        );
        Ok(Message::builder()
            .from(from.clone())
            .to(to.parse()?)
            .subject(CONFIRMATION_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?)
    }

    pub async fn send_confirmation_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        match self {
            Mailer::Smtp { transport, from } => {
                let message = Self::confirmation_message(from, to, username, code)?;
                transport.send(message).await?;
                log::info!("Confirmation code sent to {}", to);
            }
            Mailer::Log { from } => {
                let message = Self::confirmation_message(from, to, username, code)?;
                log::info!(
                    "Email (not sent):\n{}",
                    String::from_utf8_lossy(&message.formatted())
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_settings(from: &str) -> MailSettings {
        MailSettings {
            from: from.to_string(),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
        }
    }

    #[test]
    fn without_smtp_host_messages_are_logged() {
        let mailer = Mailer::from_settings(&mail_settings("noreply@reviews.local")).unwrap();
        assert!(matches!(mailer, Mailer::Log { .. }));
    }

    #[test]
    fn invalid_sender_is_rejected() {
        assert!(matches!(
            Mailer::from_settings(&mail_settings("not an address")),
            Err(MailError::Address(_))
        ));
    }

    #[test]
    fn confirmation_message_carries_the_code() {
        let from: Mailbox = "noreply@reviews.local".parse().unwrap();
        let message = Mailer::confirmation_message(&from, "bob@x.com", "bob", "AbC123").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("To: bob@x.com"));
        assert!(raw.contains(CONFIRMATION_SUBJECT));
        assert!(raw.contains("AbC123"));
    }

    #[actix_web::test]
    async fn log_backend_delivers_without_network() {
        let mailer = Mailer::from_settings(&mail_settings("noreply@reviews.local")).unwrap();
        assert!(mailer
            .send_confirmation_code("bob@x.com", "bob", "AbC123")
            .await
            .is_ok());
    }

    #[actix_web::test]
    async fn log_backend_still_validates_recipient() {
        let mailer = Mailer::from_settings(&mail_settings("noreply@reviews.local")).unwrap();
        assert!(mailer
            .send_confirmation_code("nobody", "bob", "AbC123")
            .await
            .is_err());
    }
}
