use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Placeholder JWT secrets that should never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];
const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_publishable_key: String,
    pub stripe_webhook_secret: Option<String>,
    pub public_api_url: Option<String>,
    pub cors_origin: Option<String>,
    pub seed_demo: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        // Empty values count as unset.
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("STAYHUB_PORT") {
            Some(port) => port.parse().with_context(|| format!("STAYHUB_PORT is not a port: {}", port))?,
            None => 3000,
        };
        let seed_demo = match var("STAYHUB_SEED_DEMO").as_deref() {
            None | Some("0") | Some("false") | Some("no") => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some(other) => anyhow::bail!("STAYHUB_SEED_DEMO must be true or false, got {}", other),
        };

        Ok(Self {
            db_path: database_path(var("DATABASE_URL").as_deref().unwrap_or("stayhub.db")),
            host: var("STAYHUB_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt_secret: var("STAYHUB_JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.into()),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_publishable_key: var("STRIPE_PUBLISHABLE_KEY").unwrap_or_default(),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            public_api_url: var("NEXT_PUBLIC_API_URL"),
            cors_origin: var("STAYHUB_CORS_ORIGIN"),
            seed_demo,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn has_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

/// Accepts a bare path or a `sqlite://` / `sqlite:` URL.
fn database_path(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("stayhub.db"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
        assert!(config.has_placeholder_secret());
        assert!(config.stripe_secret_key.is_none());
        assert!(!config.seed_demo);
    }

    #[test]
    fn sqlite_urls_become_paths() {
        assert_eq!(database_path("sqlite://data/app.db"), PathBuf::from("data/app.db"));
        assert_eq!(database_path("sqlite:app.db"), PathBuf::from("app.db"));
        assert_eq!(database_path("/var/lib/stayhub.db"), PathBuf::from("/var/lib/stayhub.db"));
    }

    #[test]
    fn explicit_values_win() {
        let config = config(&[
            ("STAYHUB_PORT", "8080"),
            ("STAYHUB_JWT_SECRET", "a-real-secret"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STRIPE_WEBHOOK_SECRET", "  "),
            ("STAYHUB_SEED_DEMO", "true"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.has_placeholder_secret());
        assert_eq!(config.stripe_secret_key.as_deref(), Some("sk_test_1"));
        assert!(config.stripe_webhook_secret.is_none());
        assert!(config.seed_demo);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(config(&[("STAYHUB_PORT", "eighty")]).is_err());
        assert!(config(&[("STAYHUB_SEED_DEMO", "maybe")]).is_err());
    }
}
