use crate::config::Config;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

/// Outgoing mail. Debug builds and deployments without SMTP credentials log
/// messages instead of sending them.
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Console {
        from: Mailbox,
    },
}

impl Mailer {
    pub fn from_config(config: &Config) -> anyhow::Result<Mailer> {
        let from = config.from_email.parse::<Mailbox>()?;

        match (&config.email_user, &config.email_password) {
            (Some(user), Some(password)) if !config.is_debug() => {
                let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.email_host)?
                    .credentials(Credentials::new(user.clone(), password.clone()))
                    .build();
                Ok(Mailer::Smtp { transport, from })
            }
            _ => Ok(Mailer::Console { from }),
        }
    }

    pub fn console(from: Mailbox) -> Mailer {
        Mailer::Console { from }
    }

    fn from(&self) -> &Mailbox {
        match self {
            Mailer::Smtp { from, .. } | Mailer::Console { from } => from,
        }
    }

    /// Mails the sender address to itself so broken credentials surface at
    /// startup rather than on the first password reset.
    pub async fn sanity_check(&self) -> anyhow::Result<()> {
        if let Mailer::Smtp { .. } = self {
            self.send(
                self.from().clone(),
                "Ensuring provided email is valid",
                "SANITY CHECK".to_string(),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn send(&self, to: Mailbox, subject: &str, body: String) -> anyhow::Result<()> {
        match self {
            Mailer::Smtp { transport, from } => {
                let message = Message::builder()
                    .from(from.clone())
                    .to(to)
                    .subject(subject)
                    .body(body)?;
                transport.send(message).await?;
            }
            Mailer::Console { from } => {
                tracing::info!(%from, %to, subject, %body, "outgoing email");
            }
        }
        Ok(())
    }

    /// Sends without failing the request; delivery problems are only logged.
    pub async fn send_quietly(&self, to: Mailbox, subject: &str, body: String) {
        if let Err(err) = self.send(to.clone(), subject, body).await {
            tracing::warn!(%to, subject, error = %err, "failed to send email");
        }
    }
}
