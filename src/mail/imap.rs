use anyhow::Result;
use chrono::{DateTime, FixedOffset, Local};
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;
use tracing::{debug, instrument, warn};

use super::{is_localhost, ReceivedMessage};
use crate::auth::{Login, Mechanism};
use crate::config::ServerConfig;

const TEXT_WIDTH: usize = 100;

fn tls_connector_for(cfg: &ServerConfig) -> Result<TlsConnector> {
    let mut b = TlsConnector::builder();

    if is_localhost(&cfg.host) {
        b.danger_accept_invalid_certs(true);
        b.danger_accept_invalid_hostnames(true);
    }

    Ok(b.build()?)
}

struct XOAuth2<'a> {
    user: &'a str,
    token: &'a str,
}

impl imap::Authenticator for XOAuth2<'_> {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> Self::Response {
        format!("user={}\x01auth=Bearer {}\x01\x01", self.user, self.token)
    }
}

#[instrument(
    name = "imap::connect",
    skip_all,
    fields(host = %cfg.host, port = cfg.port, mechanism = ?login.mechanism)
)]
fn connect(cfg: &ServerConfig, login: &Login<'_>) -> Result<imap::Session<TlsStream<TcpStream>>> {
    let tls = tls_connector_for(cfg)?;

    let client = if cfg.starttls {
        imap::connect_starttls((cfg.host.as_str(), cfg.port), &cfg.host, &tls)?
    } else {
        imap::connect((cfg.host.as_str(), cfg.port), &cfg.host, &tls)?
    };

    let session = match login.mechanism {
        Mechanism::Password => client.login(login.user, login.secret).map_err(|e| e.0)?,
        Mechanism::XOAuth2 => {
            let auth = XOAuth2 {
                user: login.user,
                token: login.secret,
            };
            client.authenticate("XOAUTH2", &auth).map_err(|e| e.0)?
        }
    };

    debug!("authenticated");
    Ok(session)
}

/// Highest `limit` UIDs, newest first.
fn newest_uids(uids: impl IntoIterator<Item = u32>, limit: usize) -> Vec<u32> {
    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.truncate(limit);
    uids
}

#[instrument(name = "imap::fetch_recent", skip(cfg, login), fields(host = %cfg.host))]
pub fn fetch_recent(
    cfg: &ServerConfig,
    login: &Login<'_>,
    limit: usize,
) -> Result<Vec<ReceivedMessage>> {
    let mut sess = connect(cfg, login)?;
    sess.select("INBOX")?;

    let picked = newest_uids(sess.uid_search("ALL")?, limit);
    if picked.is_empty() {
        let _ = sess.logout();
        return Ok(vec![]);
    }

    let set = picked.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    let fetches = sess.uid_fetch(&set, "(UID INTERNALDATE BODY.PEEK[])")?;

    let raw = fetches.iter().filter_map(|f| {
        let uid = f.uid?;
        let Some(body) = f.body() else {
            warn!(uid, "fetch returned no body");
            return None;
        };
        Some((uid, body, f.internal_date()))
    });
    let out = collect_received(raw);
    debug!(count = out.len(), "fetched messages");

    let _ = sess.logout();
    Ok(out)
}

/// Parses fetched bodies, newest UID first. A message that fails to parse is
/// logged and left out rather than failing the whole read.
fn collect_received<'a>(
    fetched: impl IntoIterator<Item = (u32, &'a [u8], Option<DateTime<FixedOffset>>)>,
) -> Vec<ReceivedMessage> {
    let mut out: Vec<(u32, ReceivedMessage)> = fetched
        .into_iter()
        .filter_map(|(uid, raw, internal_date)| match parse_received(raw, internal_date) {
            Ok(msg) => Some((uid, msg)),
            Err(e) => {
                warn!(uid, error = %e, "skipping unparsable message");
                None
            }
        })
        .collect();
    out.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    out.into_iter().map(|(_, m)| m).collect()
}

/// Builds a display record from a raw RFC 5322 message. `internal_date` is the
/// server's receive time; the `Date` header is used when it is missing.
pub fn parse_received(
    raw: &[u8],
    internal_date: Option<DateTime<FixedOffset>>,
) -> Result<ReceivedMessage> {
    let parsed = mailparse::parse_mail(raw)?;

    let received = internal_date
        .or_else(|| {
            let date = parsed.headers.get_first_value("Date")?;
            let ts = mailparse::dateparse(&date).ok()?;
            DateTime::from_timestamp(ts, 0).map(|dt| dt.fixed_offset())
        })
        .map(|dt| dt.with_timezone(&Local).fixed_offset());

    let from = parsed
        .headers
        .get_first_header("From")
        .and_then(|h| mailparse::addrparse_header(h).ok())
        .and_then(|list| {
            list.iter().find_map(|a| match a {
                MailAddr::Single(info) => Some(info.addr.clone()),
                MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
            })
        })
        .unwrap_or_default();

    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();

    Ok(ReceivedMessage {
        received,
        from,
        subject,
        body: extract_text(&parsed),
    })
}

/// Plain-text parts joined together; HTML-only messages are rendered to text.
fn extract_text(m: &ParsedMail) -> String {
    let plain = collect_parts(m, "text/plain");
    if !plain.trim().is_empty() {
        return plain;
    }

    let html = collect_parts(m, "text/html");
    if html.trim().is_empty() {
        return String::new();
    }
    html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or(html)
}

fn collect_parts(m: &ParsedMail, mimetype: &str) -> String {
    if !m.subparts.is_empty() {
        let mut out = String::new();
        for sp in &m.subparts {
            let t = collect_parts(sp, mimetype);
            if !t.trim().is_empty() {
                if !out.is_empty() {
                    out.push_str("\n\n");
                }
                out.push_str(&t);
            }
        }
        return out;
    }

    if m.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
        if let Ok(body) = m.get_body() {
            return body;
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Alice Example <alice@example.com>\r\n\
To: me@contoso.com\r\n\
Subject: =?UTF-8?Q?Caf=C3=A9_plans?=\r\n\
Date: Tue, 14 Mar 2023 09:05:00 +0000\r\n\
\r\n\
Lunch at noon?\r\n";

    const ALTERNATIVE: &str = "From: bob@example.org\r\n\
Subject: Report\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain version\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML version</p>\r\n\
--b1--\r\n";

    const HTML_ONLY: &str = "From: news@example.net\r\n\
Subject: Digest\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Top story</p></body></html>\r\n";

    #[test]
    fn plain_message_fields() {
        let msg = parse_received(PLAIN.as_bytes(), None).unwrap();

        assert_eq!(msg.from, "alice@example.com");
        assert_eq!(msg.subject, "Café plans");
        assert_eq!(msg.body.trim(), "Lunch at noon?");
        let received = msg.received.unwrap();
        assert_eq!(received.timestamp(), 1_678_784_700);
    }

    #[test]
    fn internal_date_wins_over_header() {
        let internal = DateTime::parse_from_rfc3339("2024-01-02T03:04:05+02:00").unwrap();
        let msg = parse_received(PLAIN.as_bytes(), Some(internal)).unwrap();

        assert_eq!(msg.received.unwrap().timestamp(), internal.timestamp());
    }

    #[test]
    fn alternative_prefers_plain_part() {
        let msg = parse_received(ALTERNATIVE.as_bytes(), None).unwrap();

        assert_eq!(msg.from, "bob@example.org");
        assert_eq!(msg.body.trim(), "Plain version");
        assert!(msg.received.is_none());
    }

    #[test]
    fn html_only_is_rendered_to_text() {
        let msg = parse_received(HTML_ONLY.as_bytes(), None).unwrap();

        assert!(msg.body.contains("Top story"));
        assert!(!msg.body.contains("<p>"));
    }

    #[test]
    fn unparsable_message_is_skipped() {
        let broken: &[u8] = b" Subject: folded onto nothing\r\n\r\nbody\r\n";
        assert!(parse_received(broken, None).is_err());

        let fetched = [
            (4, PLAIN.as_bytes(), None),
            (9, broken, None),
            (12, ALTERNATIVE.as_bytes(), None),
        ];
        let messages = collect_received(fetched);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].subject, "Report");
        assert_eq!(messages[1].from, "alice@example.com");
    }

    #[test]
    fn newest_uids_are_capped_and_descending() {
        assert_eq!(newest_uids([3, 10, 7, 1], 3), vec![10, 7, 3]);
        assert_eq!(newest_uids([5, 2], 100), vec![5, 2]);
        assert!(newest_uids(std::iter::empty(), 100).is_empty());
    }

    #[test]
    fn xoauth2_response_format() {
        use imap::Authenticator;

        let auth = XOAuth2 {
            user: "me@contoso.com",
            token: "tok",
        };
        assert_eq!(auth.process(b""), "user=me@contoso.com\x01auth=Bearer tok\x01\x01");
    }
}
