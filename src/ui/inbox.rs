use anyhow::Result;

use crate::auth::Credentials;
use crate::console::Console;
use crate::mail::{MailTransport, ReceivedMessage};

pub const INBOX_LIMIT: usize = 100;

const RULE: &str = "----------------------------------------";
const RULE_TAIL: &str = "----------------------------------------------";

pub fn render_message(n: usize, m: &ReceivedMessage) -> String {
    let on = m
        .received
        .map(|t| t.format("%d/%b/%Y %H:%M").to_string())
        .unwrap_or_else(|| "(unknown)".to_string());

    format!(
        "{RULE} Message {n} {RULE_TAIL}\n\
         On: {on}\n\
         From: {}\n\
         Subject: {}\n\
         Message: {}\n\
         {RULE} End of Message {RULE_TAIL}\n\n\n",
        m.from, m.subject, m.body
    )
}

/// Fetches the newest messages and prints each one in full, in the order the
/// transport returned them.
pub fn read_inbox(
    console: &mut dyn Console,
    transport: &dyn MailTransport,
    credentials: &Credentials,
) -> Result<()> {
    let messages = transport.fetch_recent(credentials, INBOX_LIMIT)?;
    if messages.is_empty() {
        return console.say("No messages found.");
    }

    for (i, m) in messages.iter().enumerate() {
        console.write(&render_message(i + 1, m))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::script::ScriptedConsole;
    use crate::mail::testing::RecordingTransport;
    use crate::ui::tests::password_credentials;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn message(subject: &str) -> ReceivedMessage {
        ReceivedMessage {
            received: Some(DateTime::parse_from_rfc3339("2024-03-05T07:09:00+01:00").unwrap()),
            from: "alice@example.com".to_string(),
            subject: subject.to_string(),
            body: "line one\nline two".to_string(),
        }
    }

    #[test]
    fn renders_fixed_block() {
        let expected = "---------------------------------------- Message 3 \
----------------------------------------------\n\
On: 05/Mar/2024 07:09\n\
From: alice@example.com\n\
Subject: Status\n\
Message: line one\nline two\n\
---------------------------------------- End of Message \
----------------------------------------------\n\n\n";

        assert_eq!(render_message(3, &message("Status")), expected);
    }

    #[test]
    fn missing_timestamp_is_marked() {
        let mut m = message("x");
        m.received = None;
        assert!(render_message(1, &m).contains("On: (unknown)\n"));
    }

    #[test]
    fn long_bodies_are_not_truncated() {
        let mut m = message("big");
        m.body = "z".repeat(10_000);
        assert!(render_message(1, &m).contains(&m.body));
    }

    #[test]
    fn prints_messages_in_transport_order() {
        let inbox = vec![message("newest"), message("older"), message("oldest")];
        let transport = RecordingTransport::with_inbox(inbox);
        let mut console = ScriptedConsole::default();

        read_inbox(&mut console, &transport, &password_credentials()).unwrap();

        let newest = console.output.find("Subject: newest").unwrap();
        let older = console.output.find("Subject: older").unwrap();
        let oldest = console.output.find("Subject: oldest").unwrap();
        assert!(newest < older && older < oldest);
        assert_eq!(console.count("End of Message"), 3);
        assert!(console.output.contains(" Message 3 "));
    }

    #[test]
    fn requests_one_hundred_messages() {
        let inbox = (0..150).map(|i| message(&format!("m{i}"))).collect();
        let transport = RecordingTransport::with_inbox(inbox);
        let mut console = ScriptedConsole::default();

        read_inbox(&mut console, &transport, &password_credentials()).unwrap();

        assert_eq!(console.count("End of Message"), INBOX_LIMIT);
        assert_eq!(transport.fetches.get(), 1);
    }

    #[test]
    fn empty_inbox_says_so() {
        let transport = RecordingTransport::default();
        let mut console = ScriptedConsole::default();

        read_inbox(&mut console, &transport, &password_credentials()).unwrap();

        assert_eq!(console.output, "No messages found.\n");
    }
}
