use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, warn};

use super::{InvitationData, MailError, Mailer, Template, FROM_NAME, MAX_RETRIES};
use crate::config::MailConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Sandbox sends report what a relay answers on acceptance.
const SMTP_OK: u16 = 250;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    max_retries: u32,
    backoff: Duration,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        let from = Mailbox::new(Some(FROM_NAME.to_string()), config.from_email.parse()?);

        Ok(Self {
            transport: builder.build(),
            from,
            max_retries: MAX_RETRIES,
            backoff: Duration::from_secs(1),
        })
    }

    fn build_message(
        &self,
        template: Template,
        username: &str,
        email: &str,
        data: &InvitationData,
    ) -> Result<Message, MailError> {
        let to = Mailbox::new(Some(username.to_string()), email.parse::<Address>()?);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(template.subject(data))
            .header(ContentType::TEXT_HTML)
            .body(template.html_body(data))?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        template: Template,
        username: &str,
        email: &str,
        data: &InvitationData,
        sandbox: bool,
    ) -> Result<u16, MailError> {
        let message = self.build_message(template, username, email, data)?;

        if sandbox {
            debug!(?template, %email, "sandbox mode, email not transmitted");
            return Ok(SMTP_OK);
        }

        let mut last = String::new();
        for attempt in 1..=self.max_retries {
            match self.transport.send(message.clone()).await {
                Ok(response) => {
                    let code = response.code().to_string().parse().unwrap_or(SMTP_OK);
                    info!(?template, %email, attempt, code, "email sent");
                    return Ok(code);
                }
                Err(e) => {
                    warn!(?template, %email, attempt, error = %e, "email send failed");
                    last = e.to_string();
                    if attempt < self.max_retries {
                        // linear backoff
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }

        Err(MailError::RetriesExhausted {
            attempts: self.max_retries,
            last,
        })
    }
}
