use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod address;
mod app;
mod auth;
mod config;
mod console;
mod mail;
mod ui;

use crate::app::Session;
use crate::config::Config;
use crate::console::StdConsole;
use crate::mail::ServerTransport;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout belongs to the menu; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailchamp=warn")),
        )
        .init();

    let (config, created, config_path) = Config::load_or_create()?;
    if created {
        info!(path = %config_path.display(), "wrote default config");
    }

    let transport = ServerTransport::new(config.imap.clone(), config.smtp.clone());
    let mut console = StdConsole::default();
    let mut session = Session::default();

    app::run(&mut console, &transport, &config.oauth, auth::process_env, &mut session).await
}
