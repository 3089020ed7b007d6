use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use parley_api::attachments::DEFAULT_MAX_ATTACHMENT_BYTES;
use parley_api::gateway::DeliveryMode;
use parley_xmpp::{Credentials, XmppConfig};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Headroom on top of the base64-inflated attachments for the rest of the
/// JSON body.
const BODY_OVERHEAD: usize = 64 * 1024;

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub xmpp: XmppConfig,
    pub delivery: DeliveryMode,
    pub file_dir: PathBuf,
    pub media_dir: PathBuf,
    pub max_attachment_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is unset or still a placeholder");
        }

        let host = get("PARLEY_HOST", "0.0.0.0");
        let port: u16 = get("PARLEY_PORT", "3000")
            .parse()
            .context("PARLEY_PORT is not a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("PARLEY_HOST '{}' is not an IP address", host))?;

        let ttl_hours: i64 = get("PARLEY_TOKEN_TTL_HOURS", "24")
            .parse()
            .context("PARLEY_TOKEN_TTL_HOURS is not a number")?;

        let domain = var("PARLEY_XMPP_DOMAIN")
            .filter(|d| !d.trim().is_empty())
            .context("PARLEY_XMPP_DOMAIN must be set")?;
        let mut xmpp = XmppConfig::new(
            get("PARLEY_XMPP_HOST", "localhost"),
            get("PARLEY_XMPP_PORT", "5222")
                .parse()
                .context("PARLEY_XMPP_PORT is not a port number")?,
            domain.trim().to_ascii_lowercase(),
        );
        xmpp.resource = get("PARLEY_XMPP_RESOURCE", "parley");
        xmpp.reply_timeout = Duration::from_secs(
            get("PARLEY_XMPP_TIMEOUT_SECS", "10")
                .parse()
                .context("PARLEY_XMPP_TIMEOUT_SECS is not a number")?,
        );

        let delivery = match get("PARLEY_DELIVERY_MODE", "service").as_str() {
            "service" => {
                let user = var("PARLEY_XMPP_SERVICE_USER").filter(|v| !v.is_empty());
                let password = var("PARLEY_XMPP_SERVICE_PASSWORD").filter(|v| !v.is_empty());
                match (user, password) {
                    (Some(user), Some(password)) => {
                        DeliveryMode::ServiceAccount(Credentials::new(user, password))
                    }
                    _ => bail!(
                        "service delivery needs PARLEY_XMPP_SERVICE_USER and PARLEY_XMPP_SERVICE_PASSWORD"
                    ),
                }
            }
            "sender" => DeliveryMode::AsSender,
            other => bail!("PARLEY_DELIVERY_MODE must be 'service' or 'sender', got '{}'", other),
        };

        let max_attachment_bytes = match var("PARLEY_MAX_ATTACHMENT_BYTES") {
            Some(v) => v
                .parse()
                .context("PARLEY_MAX_ATTACHMENT_BYTES is not a number")?,
            None => DEFAULT_MAX_ATTACHMENT_BYTES,
        };

        Ok(Self {
            addr,
            db_path: get("PARLEY_DB_PATH", "parley.db").into(),
            jwt_secret,
            token_ttl: chrono::Duration::hours(ttl_hours),
            xmpp,
            delivery,
            file_dir: get("PARLEY_FILE_DIR", "./uploads/files").into(),
            media_dir: get("PARLEY_MEDIA_DIR", "./uploads/media").into(),
            max_attachment_bytes,
        })
    }

    /// Largest JSON body accepted on the send route: two attachments, base64
    /// encoded, plus the rest of the request.
    pub fn body_limit(&self) -> usize {
        self.max_attachment_bytes
            .saturating_mul(2)
            .saturating_mul(4)
            / 3
            + BODY_OVERHEAD
    }
}
