use anyhow::Result;
use tracing::info;

use crate::address::Address;
use crate::auth::Credentials;
use crate::console::{require_line, Console};
use crate::mail::{MailTransport, OutgoingMessage};

/// Reads a comma separated recipient line. A single address must be valid on
/// its own; in a list, invalid entries are reported and skipped.
pub fn collect_recipients(console: &mut dyn Console) -> Result<Vec<Address>> {
    let line = loop {
        console.say("Enter recipients email address(es) separated by comma (,)")?;
        let line = require_line(console)?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    if !line.contains(',') {
        return Ok(Address::parse(&line).into_iter().collect());
    }

    let mut valid = Vec::new();
    for candidate in line.split(',') {
        match Address::parse(candidate.trim()) {
            Some(addr) => valid.push(addr),
            None => {
                console.say(&format!("Invalid: {candidate}. Ignored from the recipients list"))?
            }
        }
    }
    Ok(valid)
}

pub fn compose(
    console: &mut dyn Console,
    transport: &dyn MailTransport,
    credentials: &Credentials,
) -> Result<()> {
    let recipients = collect_recipients(console)?;
    if recipients.is_empty() {
        console.say("No valid recipients were found!")?;
        return Ok(());
    }

    console.say("Enter the subject")?;
    let subject = console.read_line()?.unwrap_or_default();

    console.say("Please enter the message you want to send. You can include HTML tags also!")?;
    let body = console.read_line()?.unwrap_or_default();

    let message = OutgoingMessage {
        recipients,
        subject,
        body,
    };
    transport.send(credentials, &message)?;
    info!(recipients = message.recipients.len(), "message sent");

    console.say("Email Sent successfully")
}
