use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "dev-secret-change-me",
    "your-secret-key",
    "your_jwt_secret",
    "change-me",
    "changeme",
    "secret",
];

pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub super_admin_email: String,
    /// `None` unless both `EMAIL_USER` and `EMAIL_PASS` are set.
    pub email: Option<EmailConfig>,
    pub stripe_webhook_secret: Option<String>,
    pub frontend_url: String,
    pub code_sweep_interval: Duration,
    pub relay_require_auth: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.to_ascii_lowercase().as_str()) {
            bail!("JWT_SECRET is a placeholder value; set a real secret");
        }

        let email = match (var("EMAIL_USER"), var("EMAIL_PASS")) {
            (Some(user), Some(pass)) => Some(EmailConfig {
                host: var("EMAIL_HOST").unwrap_or_else(|| "smtp.gmail.com".into()),
                port: parse_or(var("EMAIL_PORT"), "EMAIL_PORT", 587)?,
                user,
                pass,
            }),
            _ => {
                warn!("EMAIL_USER/EMAIL_PASS not set; code emails are disabled");
                None
            }
        };

        if var("STRIPE_SECRET_KEY").is_some() {
            info!("STRIPE_SECRET_KEY set; hosted checkout is not wired up, using the redirect");
        }

        Ok(Self {
            host: var("GLITCH_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(var("PORT"), "PORT", 8080)?,
            db_path: PathBuf::from(var("GLITCH_DB_PATH").unwrap_or_else(|| "glitch.db".into())),
            jwt_secret,
            super_admin_email: var("SUPER_ADMIN_EMAIL")
                .unwrap_or_else(|| "superadmin@theglitch.world".into())
                .to_lowercase(),
            email,
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            frontend_url: var("FRONTEND_URL").unwrap_or_else(|| "https://www.theglitch.world".into()),
            code_sweep_interval: Duration::from_secs(parse_or(var("CODE_SWEEP_SECS"), "CODE_SWEEP_SECS", 600)?),
            relay_require_auth: var("RELAY_REQUIRE_AUTH")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key} value '{raw}': {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_a_secret() {
        let config = load(&[("JWT_SECRET", "s3cr3t-for-tests")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, PathBuf::from("glitch.db"));
        assert!(config.email.is_none());
        assert_eq!(config.code_sweep_interval, Duration::from_secs(600));
        assert!(!config.relay_require_auth);
    }

    #[test]
    fn missing_or_placeholder_secret_aborts() {
        assert!(load(&[]).is_err());
        assert!(load(&[("JWT_SECRET", "  ")]).is_err());
        assert!(load(&[("JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn email_needs_both_credentials() {
        let partial = load(&[("JWT_SECRET", "k"), ("EMAIL_USER", "bot@glitch.io")]).unwrap();
        assert!(partial.email.is_none());

        let full = load(&[
            ("JWT_SECRET", "k"),
            ("EMAIL_USER", "bot@glitch.io"),
            ("EMAIL_PASS", "pw"),
            ("EMAIL_PORT", "465"),
        ])
        .unwrap();
        let email = full.email.unwrap();
        assert_eq!(email.port, 465);
        assert_eq!(email.host, "smtp.gmail.com");
    }

    #[test]
    fn relay_auth_flag_is_opt_in() {
        for on in ["1", "true", "YES"] {
            let config = load(&[("JWT_SECRET", "k"), ("RELAY_REQUIRE_AUTH", on)]).unwrap();
            assert!(config.relay_require_auth, "{on}");
        }
        let off = load(&[("JWT_SECRET", "k"), ("RELAY_REQUIRE_AUTH", "no")]).unwrap();
        assert!(!off.relay_require_auth);
        assert!(load(&[("RELAY_REQUIRE_AUTH", "true"), ("JWT_SECRET", "changeme")]).is_err());
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(load(&[("JWT_SECRET", "k"), ("PORT", "eighty")]).is_err());
    }
}
