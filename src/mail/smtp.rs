use anyhow::Result;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::{
    Credentials as SmtpCredentials, Mechanism as SmtpMechanism,
};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, instrument};

use super::{is_localhost, OutgoingMessage};
use crate::address::Address;
use crate::auth::{Credentials, Mechanism};
use crate::config::ServerConfig;

pub fn build_message(from: &Address, message: &OutgoingMessage) -> Result<Message> {
    let mut builder = Message::builder()
        .from(from.as_str().parse::<Mailbox>()?)
        .subject(message.subject.clone())
        .header(ContentType::TEXT_HTML);

    for to in &message.recipients {
        builder = builder.to(to.as_str().parse::<Mailbox>()?);
    }

    Ok(builder.body(message.body.clone())?)
}

fn mechanisms(mechanism: Mechanism) -> Vec<SmtpMechanism> {
    match mechanism {
        Mechanism::XOAuth2 => vec![SmtpMechanism::Xoauth2],
        Mechanism::Password => vec![SmtpMechanism::Plain, SmtpMechanism::Login],
    }
}

#[instrument(
    name = "smtp::send",
    skip_all,
    fields(host = %cfg.host, port = cfg.port, recipients = message.recipients.len())
)]
pub fn send(
    cfg: &ServerConfig,
    credentials: &Credentials,
    message: &OutgoingMessage,
) -> Result<()> {
    let email = build_message(credentials.mailbox(), message)?;

    let login = credentials.login();
    let creds = SmtpCredentials::new(login.user.to_string(), login.secret.to_string());

    let mut tlsb = TlsParameters::builder(cfg.host.clone());
    if is_localhost(&cfg.host) {
        tlsb = tlsb
            .dangerous_accept_invalid_certs(true)
            .dangerous_accept_invalid_hostnames(true);
    }
    let tls = tlsb.build()?;
    let tls = if cfg.starttls { Tls::Required(tls) } else { Tls::Wrapper(tls) };

    let mailer = SmtpTransport::builder_dangerous(&cfg.host)
        .port(cfg.port)
        .credentials(creds)
        .authentication(mechanisms(login.mechanism))
        .tls(tls)
        .build();

    mailer.send(&email)?;
    debug!("message accepted");
    Ok(())
}
