//! Interactive sign-in against the Microsoft identity platform.
//!
//! Authorization code flow with PKCE for a public client: the browser is sent
//! to the tenant's authorize endpoint, the redirect lands on a one-shot
//! loopback listener, and the code is exchanged for a bearer token.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::SecretString;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, instrument};
use url::Url;

use super::pkce::{random_token, Pkce};
use super::{AppRegistration, AuthError};
use crate::address::Address;

/// Mailbox read/send access plus the OpenID claims that name the signed-in mailbox.
pub const MAIL_SCOPE: &str = "openid profile offline_access \
https://outlook.office.com/IMAP.AccessAsUser.All https://outlook.office.com/SMTP.Send";

/// How long a loopback connection may take to send its request line and headers.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

const SIGN_IN_FAILED: &str = "Sign-in failed. You can close this window.";

pub struct Grant {
    pub access_token: SecretString,
    /// Mailbox named by the ID token, when it carried a usable address.
    pub mailbox: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorize: Url,
    pub token: Url,
}

impl Endpoints {
    pub fn new(authority: &str, tenant: &str) -> Result<Self, AuthError> {
        let base = Url::parse(&format!("{}/", authority.trim_end_matches('/')))?;
        Ok(Self {
            authorize: base.join(&format!("{tenant}/oauth2/v2.0/authorize"))?,
            token: base.join(&format!("{tenant}/oauth2/v2.0/token"))?,
        })
    }
}

/// An authorize request waiting for its redirect.
pub struct PendingAuthorization {
    listener: TcpListener,
    endpoints: Endpoints,
    client_id: String,
    redirect_uri: String,
    pkce: Pkce,
    state: String,
}

impl PendingAuthorization {
    pub async fn start(authority: &str, app: &AppRegistration) -> Result<Self, AuthError> {
        let endpoints = Endpoints::new(authority, &app.tenant_id)?;
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            listener,
            endpoints,
            client_id: app.client_id.clone(),
            redirect_uri: format!("http://localhost:{port}"),
            pkce: Pkce::generate(),
            state: random_token(16),
        })
    }

    pub fn authorize_url(&self) -> Url {
        let mut url = self.endpoints.authorize.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", MAIL_SCOPE)
            .append_pair("state", &self.state)
            .append_pair("code_challenge", &self.pkce.challenge)
            .append_pair("code_challenge_method", Pkce::METHOD)
            .append_pair("prompt", "select_account");
        url
    }

    #[instrument(name = "oauth::complete", skip_all, fields(redirect_uri = %self.redirect_uri))]
    pub async fn complete(self) -> Result<Grant, AuthError> {
        let code = wait_for_callback(&self.listener, &self.state).await?;
        debug!("authorization code received");
        drop(self.listener);

        let http = reqwest::Client::new();
        let response = http
            .post(self.endpoints.token.clone())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", self.pkce.verifier.as_str()),
                ("scope", MAIL_SCOPE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: TokenError = response.json().await.unwrap_or_default();
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                error: body.error,
                description: body.error_description,
            });
        }

        let token: TokenResponse = response.json().await?;
        debug!(has_id_token = token.id_token.is_some(), "token issued");

        Ok(Grant {
            mailbox: token.id_token.as_deref().and_then(mailbox_from_id_token),
            access_token: SecretString::from(token.access_token),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: Option<String>,
}

#[derive(Deserialize, Default)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Deserialize)]
struct IdClaims {
    preferred_username: Option<String>,
    email: Option<String>,
    upn: Option<String>,
}

/// Reads the mailbox out of an ID token payload. The signature is not checked;
/// the token came straight from the token endpoint over TLS.
pub fn mailbox_from_id_token(id_token: &str) -> Option<Address> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: IdClaims = serde_json::from_slice(&bytes).ok()?;

    [claims.preferred_username, claims.email, claims.upn]
        .into_iter()
        .flatten()
        .find_map(|candidate| Address::parse(&candidate))
}

#[derive(Debug, Default)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl Callback {
    fn parse(target: &str) -> Option<Self> {
        let url = Url::parse(&format!("http://localhost{target}")).ok()?;
        let mut cb = Self::default();
        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "code" => cb.code = Some(v.into_owned()),
                "state" => cb.state = Some(v.into_owned()),
                "error" => cb.error = Some(v.into_owned()),
                "error_description" => cb.error_description = Some(v.into_owned()),
                _ => {}
            }
        }
        (cb.code.is_some() || cb.error.is_some()).then_some(cb)
    }
}

/// Serves the loopback redirect. Requests that are not the redirect get a 404;
/// connections that send nothing within [`REQUEST_TIMEOUT`] (browser
/// preconnects) are dropped. Either way the listener keeps waiting.
pub async fn wait_for_callback(
    listener: &TcpListener,
    expected_state: &str,
) -> Result<String, AuthError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "loopback connection");

        let read = timeout(REQUEST_TIMEOUT, read_request_target(stream)).await;
        let (target, mut stream) = match read {
            Ok(Ok(read)) => read,
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "dropping unreadable loopback connection");
                continue;
            }
            Err(_) => {
                debug!(%peer, "dropping idle loopback connection");
                continue;
            }
        };
        let Some(cb) = target.as_deref().and_then(Callback::parse) else {
            respond(&mut stream, "404 Not Found", "Not found").await;
            continue;
        };

        if let Some(error) = cb.error {
            respond(&mut stream, "400 Bad Request", SIGN_IN_FAILED).await;
            return Err(AuthError::Provider {
                error,
                description: cb.error_description.unwrap_or_default(),
            });
        }

        if cb.state.as_deref() != Some(expected_state) {
            respond(&mut stream, "400 Bad Request", SIGN_IN_FAILED).await;
            return Err(AuthError::StateMismatch);
        }

        respond(&mut stream, "200 OK", "Sign-in complete. You can close this window.").await;
        return cb.code.ok_or(AuthError::MissingCode);
    }
}

async fn read_request_target(stream: TcpStream) -> Result<(Option<String>, TcpStream), AuthError> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    // GET /?code=...&state=... HTTP/1.1
    let target = request_line.split_whitespace().nth(1).map(str::to_string);
    Ok((target, reader.into_inner()))
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let body = format!("<html><body><h1>{message}</h1></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
