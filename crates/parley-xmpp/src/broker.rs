use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use parley_types::Identity;

use crate::error::SessionError;
use crate::session::{Ack, Session, SessionRole};

/// Default reply timeout for every protocol step.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct XmppConfig {
    pub host: String,
    pub port: u16,
    pub domain: String,
    pub resource: String,
    pub reply_timeout: Duration,
}

impl XmppConfig {
    pub fn new(host: impl Into<String>, port: u16, domain: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            domain: domain.into(),
            resource: "parley".into(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// Username/password pair for one session. The password never appears in
/// `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens single-use sessions against one XMPP endpoint.
///
/// Cheap to clone; holds no per-session state.
#[derive(Clone)]
pub struct SessionBroker {
    config: Arc<XmppConfig>,
}

impl SessionBroker {
    pub fn new(config: XmppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    /// Open and authenticate a session for `username` on the configured domain.
    pub async fn establish_session(
        &self,
        credentials: &Credentials,
        role: SessionRole,
    ) -> Result<Session, SessionError> {
        let identity = Identity::from_username(&credentials.username, &self.config.domain)?;
        Session::establish(&self.config, identity, &credentials.password, role).await
    }

    /// Check a username/password pair by logging in and straight back out.
    ///
    /// Every failure is reported as `false`.
    pub async fn authenticate(&self, username: &str, password: &str) -> bool {
        info!("Attempting to authenticate user: {}", username);
        let credentials = Credentials::new(username, password);

        match self.establish_session(&credentials, SessionRole::AuthCheck).await {
            Ok(session) => {
                session.close().await;
                info!("User {} authenticated successfully", username);
                true
            }
            Err(e @ SessionError::MalformedIdentity(_)) => {
                warn!("Authentication failed for user {}: {}", username, e);
                false
            }
            Err(SessionError::InvalidCredentials(_)) => {
                warn!("Authentication failed for user {}: invalid credentials", username);
                false
            }
            Err(e) => {
                error!(
                    "Failed to connect or login for user {} ({}): {}",
                    username,
                    e.kind(),
                    e
                );
                false
            }
        }
    }

    /// Deliver one chat message over a fresh session opened with
    /// `credentials`, then close it whatever the outcome.
    pub async fn send_message(
        &self,
        credentials: &Credentials,
        from: &Identity,
        to: &Identity,
        body: &str,
    ) -> Result<Ack, SessionError> {
        info!(
            "Opening delivery session as '{}' for message {} -> {}",
            credentials.username, from, to
        );
        let mut session = self
            .establish_session(credentials, SessionRole::Delivery)
            .await?;

        let result = session.send_stanza(to, from, body).await;
        session.close().await;

        match &result {
            Ok(ack) => info!("Message {} sent from '{}' to '{}'", ack.stanza_id, from, to),
            Err(e) => warn!("Message from '{}' to '{}' failed: {}", from, to, e),
        }
        result
    }
}
