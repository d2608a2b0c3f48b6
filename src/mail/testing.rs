use anyhow::{bail, Result};
use std::cell::{Cell, RefCell};

use super::{MailTransport, OutgoingMessage, ReceivedMessage};
use crate::auth::Credentials;

/// Records sends and serves a canned inbox; `failure` makes every call fail.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: RefCell<Vec<(String, OutgoingMessage)>>,
    pub inbox: Vec<ReceivedMessage>,
    pub fetches: Cell<usize>,
    pub failure: Option<String>,
}

impl RecordingTransport {
    pub fn with_inbox(inbox: Vec<ReceivedMessage>) -> Self {
        Self {
            inbox,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }
}

impl MailTransport for RecordingTransport {
    fn send(&self, credentials: &Credentials, message: &OutgoingMessage) -> Result<()> {
        if let Some(failure) = &self.failure {
            bail!("{failure}");
        }
        self.sent
            .borrow_mut()
            .push((credentials.mailbox().to_string(), message.clone()));
        Ok(())
    }

    fn fetch_recent(
        &self,
        _credentials: &Credentials,
        limit: usize,
    ) -> Result<Vec<ReceivedMessage>> {
        if let Some(failure) = &self.failure {
            bail!("{failure}");
        }
        self.fetches.set(self.fetches.get() + 1);
        Ok(self.inbox.iter().take(limit).cloned().collect())
    }
}
