//! Transactional email.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod smtp;
mod templates;

pub use smtp::SmtpMailer;
pub use templates::{InvitationData, Template};

pub const FROM_NAME: &str = "Social";
pub const MAX_RETRIES: u32 = 3;
/// Total budget for one delivery, retries included. Must stay below the
/// request timeout.
pub const SEND_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("cannot build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp transport: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("failed to send email after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("email delivery exceeded {0:?}")]
    DeadlineExceeded(Duration),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Renders `template` for the recipient and delivers it, retrying
    /// transport failures internally. Returns the server's reply code.
    ///
    /// In sandbox mode the message is built but never transmitted.
    async fn send(
        &self,
        template: Template,
        username: &str,
        email: &str,
        data: &InvitationData,
        sandbox: bool,
    ) -> Result<u16, MailError>;
}
