use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub imap: ServerConfig,
    pub smtp: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub starttls: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct OAuthConfig {
    pub authority: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
        Ok(dir.join("mailchamp").join("config.toml"))
    }

    /// Loads the config file, writing the Office 365 defaults first if none exists.
    pub fn load_or_create() -> Result<(Self, bool, PathBuf)> {
        let path = Self::path()?;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, DEFAULT_CONFIG)?;
            return Ok((Self::parse(DEFAULT_CONFIG)?, true, path));
        }

        let data = fs::read_to_string(&path)?;
        let cfg = Self::parse(&data)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok((cfg, false, path))
    }

    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }
}

const DEFAULT_CONFIG: &str = r#"
[imap]
host = "outlook.office365.com"
port = 993
starttls = false

[smtp]
host = "smtp.office365.com"
port = 587
starttls = true

[oauth]
authority = "https://login.microsoftonline.com"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_office365() {
        let cfg = Config::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(cfg.imap.host, "outlook.office365.com");
        assert_eq!(cfg.imap.port, 993);
        assert!(!cfg.imap.starttls);
        assert_eq!(cfg.smtp.host, "smtp.office365.com");
        assert_eq!(cfg.smtp.port, 587);
        assert!(cfg.smtp.starttls);
        assert_eq!(cfg.oauth.authority, OAuthConfig::default().authority);
    }

    #[test]
    fn oauth_section_is_optional() {
        let cfg = Config::parse(
            r#"
            [imap]
            host = "127.0.0.1"
            port = 1143
            starttls = true

            [smtp]
            host = "127.0.0.1"
            port = 1025
            starttls = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.imap.port, 1143);
        assert_eq!(cfg.oauth.authority, "https://login.microsoftonline.com");
    }

    #[test]
    fn missing_server_section_is_an_error() {
        assert!(Config::parse("[imap]\nhost = \"x\"\nport = 1\nstarttls = false\n").is_err());
    }
}
