use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{info, warn};

use crate::address::Address;
use crate::config::OAuthConfig;
use crate::console::{read_masked, require_line, Console};

pub mod oauth;
mod pkce;

pub const CLIENT_ID_VAR: &str = "AZ_ClientID";
pub const TENANT_ID_VAR: &str = "AZ_TenantId";

/// Looks up a configuration value by name; production reads the process environment.
pub type EnvLookup = fn(&str) -> Option<String>;

pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("environment variable {0} is not set")]
    MissingConfig(&'static str),

    #[error("invalid authority URL")]
    InvalidAuthority(#[from] url::ParseError),

    #[error("identity provider returned {error}: {description}")]
    Provider { error: String, description: String },

    #[error("authorization response state did not match the request")]
    StateMismatch,

    #[error("authorization response carried no code")]
    MissingCode,

    #[error("token endpoint rejected the request ({status}): {error}: {description}")]
    TokenRejected {
        status: u16,
        error: String,
        description: String,
    },

    #[error("token request failed")]
    Http(#[from] reqwest::Error),

    #[error("loopback listener failed")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Errors raised by the identity provider itself, as opposed to local faults.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. }
                | Self::StateMismatch
                | Self::MissingCode
                | Self::TokenRejected { .. }
        )
    }
}

/// Application registration used for interactive sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRegistration {
    pub client_id: String,
    pub tenant_id: String,
}

impl AppRegistration {
    pub fn from_lookup(lookup: EnvLookup) -> Result<Self, AuthError> {
        let value = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(AuthError::MissingConfig(key))
        };

        Ok(Self {
            client_id: value(CLIENT_ID_VAR)?,
            tenant_id: value(TENANT_ID_VAR)?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mechanism {
    Password,
    XOAuth2,
}

/// What a transport needs to authenticate, regardless of how the credentials were obtained.
pub struct Login<'a> {
    pub user: &'a str,
    pub secret: &'a str,
    pub mechanism: Mechanism,
}

#[derive(Debug)]
pub enum Credentials {
    Bearer { mailbox: Address, token: SecretString },
    Password { mailbox: Address, password: SecretString },
}

impl Credentials {
    pub fn mailbox(&self) -> &Address {
        match self {
            Self::Bearer { mailbox, .. } | Self::Password { mailbox, .. } => mailbox,
        }
    }

    pub fn login(&self) -> Login<'_> {
        match self {
            Self::Bearer { mailbox, token } => Login {
                user: mailbox.as_str(),
                secret: token.expose_secret(),
                mechanism: Mechanism::XOAuth2,
            },
            Self::Password { mailbox, password } => Login {
                user: mailbox.as_str(),
                secret: password.expose_secret(),
                mechanism: Mechanism::Password,
            },
        }
    }
}

/// Interactive OAuth sign-in. `Ok(None)` means the caller should fall back to
/// manual entry: configuration is missing or the exchange failed (already reported).
pub async fn sign_in_interactive(
    console: &mut dyn Console,
    oauth: &OAuthConfig,
    env: EnvLookup,
) -> Result<Option<Credentials>> {
    let app = match AppRegistration::from_lookup(env) {
        Ok(app) => app,
        Err(e) => {
            info!(reason = %e, "interactive sign-in unavailable");
            console.say("Please set the environment variables for ClientID and Tenant ID.")?;
            return Ok(None);
        }
    };

    let grant = match acquire(console, oauth, &app).await? {
        Ok(grant) => grant,
        Err(e) => {
            warn!(error = %e, "interactive sign-in failed");
            let label = if e.is_token_error() { "Error acquiring access token" } else { "Error" };
            let e = anyhow::Error::new(e);
            console.say(&format!("{label}: {e:#}"))?;
            return Ok(None);
        }
    };

    let mailbox = match grant.mailbox {
        Some(mailbox) => mailbox,
        None => prompt_mailbox(console)?,
    };
    info!(%mailbox, "signed in with bearer token");

    Ok(Some(Credentials::Bearer {
        mailbox,
        token: grant.access_token,
    }))
}

async fn acquire(
    console: &mut dyn Console,
    oauth: &OAuthConfig,
    app: &AppRegistration,
) -> Result<Result<oauth::Grant, AuthError>> {
    let pending = match oauth::PendingAuthorization::start(&oauth.authority, app).await {
        Ok(pending) => pending,
        Err(e) => return Ok(Err(e)),
    };
    let url = pending.authorize_url();

    console.say("Opening browser for sign-in...")?;
    console.say(&format!("If the browser doesn't open, visit: {url}"))?;
    if let Err(e) = open::that(url.as_str()) {
        warn!(error = %e, "could not launch browser");
    }
    console.say("Waiting for sign-in to complete...")?;

    Ok(pending.complete().await)
}

/// Asks for a mailbox address until the validator accepts it.
pub fn prompt_mailbox(console: &mut dyn Console) -> Result<Address> {
    loop {
        console.say("Please enter your valid Office 365 Email ID")?;
        let line = require_line(console)?;
        if let Some(mailbox) = Address::parse(&line) {
            return Ok(mailbox);
        }
    }
}

/// Manual fallback: mailbox address plus a masked, non-empty password.
pub fn sign_in_manual(console: &mut dyn Console) -> Result<Credentials> {
    let mailbox = prompt_mailbox(console)?;

    let password = loop {
        console.say("Please enter your Office 365 Password")?;
        let password = read_masked(console)?;
        if !password.is_empty() {
            break password;
        }
    };

    Ok(Credentials::Password {
        mailbox,
        password: SecretString::from(password),
    })
}
