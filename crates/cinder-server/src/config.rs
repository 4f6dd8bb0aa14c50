use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub public_url: String,
    pub sweep_interval_secs: u64,
    pub max_paste_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("CINDER_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CINDER_JWT_SECRET is unset or still a placeholder.");
        }

        let port = get("CINDER_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("CINDER_PORT is not a valid port")?;

        Ok(Self {
            db_path: get("CINDER_DB_PATH").unwrap_or_else(|| "cinder.db".into()).into(),
            host: get("CINDER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt_secret,
            public_url: get("CINDER_PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            sweep_interval_secs: get("CINDER_SWEEP_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            max_paste_bytes: get("CINDER_MAX_PASTE_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(512 * 1024), // 512 KiB
        })
    }
}
