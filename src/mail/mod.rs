use anyhow::Result;
use chrono::{DateTime, FixedOffset};

use crate::address::Address;
use crate::auth::Credentials;
use crate::config::ServerConfig;

pub mod imap;
pub mod smtp;
#[cfg(test)]
pub mod testing;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub recipients: Vec<Address>,
    pub subject: String,
    /// May contain HTML; sent as `text/html`.
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub received: Option<DateTime<FixedOffset>>,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Mail service operations the menu flows depend on.
pub trait MailTransport {
    fn send(&self, credentials: &Credentials, message: &OutgoingMessage) -> Result<()>;

    /// Newest first, at most `limit` messages.
    fn fetch_recent(&self, credentials: &Credentials, limit: usize) -> Result<Vec<ReceivedMessage>>;
}

/// SMTP for sending, IMAP for reading.
pub struct ServerTransport {
    imap: ServerConfig,
    smtp: ServerConfig,
}

impl ServerTransport {
    pub fn new(imap: ServerConfig, smtp: ServerConfig) -> Self {
        Self { imap, smtp }
    }
}

impl MailTransport for ServerTransport {
    fn send(&self, credentials: &Credentials, message: &OutgoingMessage) -> Result<()> {
        smtp::send(&self.smtp, credentials, message)
    }

    fn fetch_recent(
        &self,
        credentials: &Credentials,
        limit: usize,
    ) -> Result<Vec<ReceivedMessage>> {
        imap::fetch_recent(&self.imap, &credentials.login(), limit)
    }
}

fn is_localhost(host: &str) -> bool {
    host == "127.0.0.1" || host == "localhost"
}
