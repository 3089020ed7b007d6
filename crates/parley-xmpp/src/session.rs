use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::Identity;

use crate::broker::XmppConfig;
use crate::error::SessionError;
use crate::framer::{Frame, XmlFramer};
use crate::stanza;

/// How long `close` waits for the server to echo the stream close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

const READ_BUF_SIZE: usize = 8 * 1024;

/// What a session was opened for. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    AuthCheck,
    Delivery,
}

/// Confirmation that a stanza was written to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub stanza_id: String,
}

/// An authenticated, resource-bound client stream.
///
/// Call [`Session::close`] when done. Dropping a session without closing it
/// still releases the socket, but skips the polite stream close.
pub struct Session {
    stream: TcpStream,
    framer: XmlFramer,
    identity: Identity,
    role: SessionRole,
    reply_timeout: Duration,
    /// Set once a write fails or times out; the stream may hold a partial
    /// stanza and the peer may no longer be reading.
    broken: bool,
}

impl Session {
    /// Connect, authenticate with SASL PLAIN and bind a resource.
    ///
    /// If any step after the TCP connect fails, the half-open stream is
    /// closed before the error is returned.
    pub(crate) async fn establish(
        config: &XmppConfig,
        identity: Identity,
        password: &str,
        role: SessionRole,
    ) -> Result<Self, SessionError> {
        let addr = (config.host.as_str(), config.port);
        let stream = timeout(config.reply_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::Timeout(config.reply_timeout))??;
        stream.set_nodelay(true)?;

        debug!(
            "XMPP: connected to {}:{} as {} ({:?})",
            config.host, config.port, identity, role
        );

        let mut session = Self {
            stream,
            framer: XmlFramer::new(),
            identity,
            role,
            reply_timeout: config.reply_timeout,
            broken: false,
        };

        match session.negotiate(config, password).await {
            Ok(()) => {
                info!("XMPP session opened for {} ({:?})", session.identity, role);
                Ok(session)
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    async fn negotiate(&mut self, config: &XmppConfig, password: &str) -> Result<(), SessionError> {
        // -- Stream open + SASL --
        let features = self.open_stream(&config.domain).await?;

        if let Some(tls) = stanza::child(&features, "starttls") {
            if stanza::child(tls, "required").is_some() {
                return Err(SessionError::Protocol(
                    "server requires STARTTLS, which this client does not negotiate".into(),
                ));
            }
        }

        let mechanisms = stanza::mechanisms(&features);
        if !mechanisms.iter().any(|m| m == "PLAIN") {
            return Err(SessionError::Protocol(format!(
                "server offers no PLAIN mechanism (offered: {:?})",
                mechanisms
            )));
        }

        self.write(&stanza::auth_plain(self.identity.local(), password)).await?;
        let reply = self.read_element().await?;
        match stanza::element_name(&reply) {
            "success" => debug!("XMPP: SASL success for {}", self.identity),
            "failure" => return Err(self.sasl_failure(&reply)),
            other => {
                return Err(SessionError::Protocol(format!(
                    "unexpected <{}> during SASL",
                    other
                )));
            }
        }

        // -- Restarted stream + bind --
        let features = self.open_stream(&config.domain).await?;

        if stanza::child(&features, "bind").is_none() {
            return Err(SessionError::Protocol("server offers no resource binding".into()));
        }
        let bind_id = format!("bind_{}", Uuid::new_v4().simple());
        self.write(&stanza::bind_request(&bind_id, &config.resource)).await?;
        self.await_iq_result(&bind_id).await?;

        // Legacy servers still require an explicit session request.
        if let Some(session) = stanza::child(&features, "session") {
            if stanza::child(session, "optional").is_none() {
                let session_id = format!("sess_{}", Uuid::new_v4().simple());
                self.write(&stanza::session_request(&session_id)).await?;
                self.await_iq_result(&session_id).await?;
            }
        }

        Ok(())
    }

    /// Send one chat stanza to `to`.
    ///
    /// `from` is stamped on the stanza only when it is this session's own
    /// identity; servers reject stanzas claiming any other sender.
    pub async fn send_stanza(
        &mut self,
        to: &Identity,
        from: &Identity,
        body: &str,
    ) -> Result<Ack, SessionError> {
        let stanza_id = Uuid::new_v4().to_string();
        let from_attr = if *from == self.identity {
            Some(from.to_string())
        } else {
            debug!(
                "XMPP: sending for {} over {}'s session; server stamps sender",
                from, self.identity
            );
            None
        };

        let message = stanza::chat_message(&stanza_id, &to.to_string(), from_attr.as_deref(), body);
        self.write(&message).await?;

        debug!("XMPP: stanza {} written to {}", stanza_id, to);
        Ok(Ack { stanza_id })
    }

    /// Close the stream and the socket. Never fails; errors are logged.
    ///
    /// The polite close (write `</stream:stream>`, wait for the server's) is
    /// bounded by `CLOSE_GRACE` and skipped entirely after a failed write.
    pub async fn close(mut self) {
        if self.broken {
            debug!(
                "XMPP: skipping stream close for {}; an earlier write did not complete",
                self.identity
            );
        } else {
            let polite = timeout(CLOSE_GRACE, async {
                self.stream.write_all(stanza::STREAM_CLOSE.as_bytes()).await?;
                loop {
                    match self.next_frame().await {
                        Ok(Frame::StreamClose) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                Ok::<_, std::io::Error>(())
            })
            .await;

            match polite {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("XMPP: stream close write failed for {}: {}", self.identity, e),
                Err(_) => debug!(
                    "XMPP: no stream close from server within {:?} for {}",
                    CLOSE_GRACE, self.identity
                ),
            }
        }

        if let Err(e) = self.stream.shutdown().await {
            debug!("XMPP: socket shutdown for {}: {}", self.identity, e);
        }
        info!("XMPP session closed for {} ({:?})", self.identity, self.role);
    }

    // -- Internals --

    async fn open_stream(&mut self, domain: &str) -> Result<String, SessionError> {
        self.write(&stanza::stream_header(domain)).await?;

        match self.next_frame().await? {
            Frame::StreamOpen(_) => {}
            Frame::Element(e) => return Err(self.unexpected(&e, "stream header")),
            Frame::StreamClose => {
                return Err(SessionError::Protocol("server closed stream on open".into()));
            }
        }

        let features = self.read_element().await?;
        if stanza::element_name(&features) != "stream:features" {
            return Err(self.unexpected(&features, "stream features"));
        }
        Ok(features)
    }

    async fn await_iq_result(&mut self, id: &str) -> Result<(), SessionError> {
        loop {
            let elem = self.read_element().await?;
            if stanza::element_name(&elem) != "iq" || stanza::attribute(&elem, "id").as_deref() != Some(id) {
                debug!("XMPP: skipping <{}> while waiting for iq {}", stanza::element_name(&elem), id);
                continue;
            }
            return match stanza::attribute(&elem, "type").as_deref() {
                Some("result") => Ok(()),
                _ => Err(SessionError::Protocol(format!(
                    "iq {} failed: {}",
                    id,
                    stanza::child(&elem, "error")
                        .and_then(stanza::first_child_name)
                        .unwrap_or("unknown error")
                ))),
            };
        }
    }

    async fn read_element(&mut self) -> Result<String, SessionError> {
        match self.next_frame().await? {
            Frame::Element(e) if stanza::element_name(&e) == "stream:error" => {
                let condition = stanza::first_child_name(&e).unwrap_or("undefined-condition");
                Err(SessionError::Protocol(format!("stream error: {}", condition)))
            }
            Frame::Element(e) => Ok(e),
            Frame::StreamOpen(_) => Err(SessionError::Protocol("unexpected stream restart".into())),
            Frame::StreamClose => Err(SessionError::Protocol("server closed the stream".into())),
        }
    }

    async fn next_frame(&mut self) -> Result<Frame, SessionError> {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            if let Some(frame) = self
                .framer
                .next_frame()
                .map_err(|e| SessionError::Protocol(e.to_string()))?
            {
                return Ok(frame);
            }

            let n = timeout(self.reply_timeout, self.stream.read(&mut buf))
                .await
                .map_err(|_| SessionError::Timeout(self.reply_timeout))??;
            if n == 0 {
                return Err(SessionError::Network(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
            self.framer
                .push(&buf[..n])
                .map_err(|e| SessionError::Protocol(e.to_string()))?;
        }
    }

    async fn write(&mut self, data: &str) -> Result<(), SessionError> {
        let result = timeout(self.reply_timeout, async {
            self.stream.write_all(data.as_bytes()).await?;
            self.stream.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.broken = true;
                Err(e.into())
            }
            Err(_) => {
                self.broken = true;
                Err(SessionError::Timeout(self.reply_timeout))
            }
        }
    }

    fn sasl_failure(&self, reply: &str) -> SessionError {
        let condition = stanza::first_child_name(reply).unwrap_or("undefined-condition");
        warn!("XMPP: SASL failure for {}: {}", self.identity, condition);
        match condition {
            "not-authorized" | "account-disabled" | "credentials-expired" | "invalid-authzid" => {
                SessionError::InvalidCredentials(self.identity.to_string())
            }
            "malformed-request" | "incorrect-encoding" | "invalid-mechanism"
            | "mechanism-too-weak" | "encryption-required" => {
                SessionError::Protocol(format!("SASL failure: {}", condition))
            }
            other => SessionError::Other(format!("SASL failure: {}", other)),
        }
    }

    fn unexpected(&self, elem: &str, expected: &str) -> SessionError {
        SessionError::Protocol(format!(
            "expected {}, got <{}>",
            expected,
            stanza::element_name(elem)
        ))
    }
}
