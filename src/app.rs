use anyhow::Result;
use tracing::{debug, warn};

use crate::auth::{self, Credentials, EnvLookup};
use crate::config::OAuthConfig;
use crate::console::{require_line, Console, Key};
use crate::mail::MailTransport;
use crate::ui;

const WELCOME: &str = "Welcome to MailChamp! You can send or receive Email using this program.\n";
const FALLBACK: &str =
    "We could not process your request! Falling back to manual authentication. \n";
const MENU: &str = "\n1) Enter 1 to Compose Email\n2) Enter 2 to Read Top 100 Emails";

/// Auth state that outlives a single menu cycle. Only an interactive sign-in
/// is remembered; manual credentials are asked for again after a restart.
#[derive(Default)]
pub struct Session {
    token: Option<Credentials>,
}

impl Session {
    pub fn token(&self) -> Option<&Credentials> {
        self.token.as_ref()
    }

    pub fn remember(&mut self, credentials: Credentials) -> &Credentials {
        self.token.insert(credentials)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Compose,
    ReadInbox,
}

impl Operation {
    pub fn from_selection(input: &str) -> Option<Self> {
        match input.trim().parse::<i32>() {
            Ok(1) => Some(Self::Compose),
            Ok(2) => Some(Self::ReadInbox),
            _ => None,
        }
    }
}

pub fn choose_operation(console: &mut dyn Console) -> Result<Operation> {
    loop {
        console.say(MENU)?;
        let line = require_line(console)?;
        if let Some(op) = Operation::from_selection(&line) {
            return Ok(op);
        }
        console.say("Invalid Option! Please try again!")?;
    }
}

pub fn dispatch(
    console: &mut dyn Console,
    transport: &dyn MailTransport,
    credentials: &Credentials,
) -> Result<()> {
    let op = choose_operation(console)?;
    debug!(?op, "operation selected");

    match op {
        Operation::Compose => ui::compose(console, transport, credentials),
        Operation::ReadInbox => ui::read_inbox(console, transport, credentials),
    }
}

async fn run_cycle(
    console: &mut dyn Console,
    transport: &dyn MailTransport,
    oauth: &OAuthConfig,
    env: EnvLookup,
    session: &mut Session,
) -> Result<()> {
    if let Some(credentials) = session.token() {
        return dispatch(console, transport, credentials);
    }

    console.say("Please login to your Microsoft account! \n")?;
    match auth::sign_in_interactive(console, oauth, env).await? {
        Some(credentials) => {
            let credentials = session.remember(credentials);
            dispatch(console, transport, credentials)
        }
        None => {
            console.say(FALLBACK)?;
            let credentials = auth::sign_in_manual(console)?;
            dispatch(console, transport, &credentials)
        }
    }
}

/// Closed input or an unreadable terminal counts as "any other key".
fn wants_restart(console: &mut dyn Console) -> Result<bool> {
    console.say("Please press c to start from main menu. Any other key to quit\n")?;
    match console.read_key() {
        Ok(key) => Ok(matches!(key, Key::Char('c' | 'C'))),
        Err(e) => {
            debug!(error = %e, "no key at restart prompt; quitting");
            Ok(false)
        }
    }
}

/// Runs menu cycles until the user declines to restart. Errors inside a cycle
/// are printed and never end the program.
pub async fn run(
    console: &mut dyn Console,
    transport: &dyn MailTransport,
    oauth: &OAuthConfig,
    env: EnvLookup,
    session: &mut Session,
) -> Result<()> {
    loop {
        console.say(WELCOME)?;

        if let Err(e) = run_cycle(console, transport, oauth, env, session).await {
            warn!(error = %e, "menu cycle failed");
            console.say(&format!("{e:#}"))?;
        }

        if !wants_restart(console)? {
            return Ok(());
        }
        console.clear()?;
    }
}
