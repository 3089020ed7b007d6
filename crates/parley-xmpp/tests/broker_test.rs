//! Integration tests: drive the session broker against a scripted XMPP
//! server on a loopback TCP listener.
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use parley_types::Identity;
use parley_xmpp::{Credentials, SessionBroker, SessionError, SessionRole, XmppConfig};

const DOMAIN: &str = "example.com";
const HEADER_TAIL: &str = "xmlns:stream='http://etherx.jabber.org/streams'>";

const SERVER_HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
    xmlns:stream='http://etherx.jabber.org/streams' id='s1' from='example.com' version='1.0'>";

const SASL_FEATURES: &str = "<stream:features>\
    <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
    </stream:features>";

const BIND_FEATURES: &str = "<stream:features>\
    <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
    <session xmlns='urn:ietf:params:xml:ns:xmpp-session'><optional/></session>\
    </stream:features>";

struct Transcript {
    seen: String,
    cursor: usize,
}

impl Transcript {
    async fn read_until(&mut self, sock: &mut TcpStream, needle: &str) -> bool {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(i) = self.seen[self.cursor..].find(needle) {
                self.cursor += i + needle.len();
                return true;
            }
            match sock.read(&mut buf).await {
                Ok(0) | Err(_) => return false,
                Ok(n) => self.seen.push_str(&String::from_utf8_lossy(&buf[..n])),
            }
        }
    }
}

/// Play the server side up to a bound resource for `alice` / `secret`.
/// Returns `false` if the client stopped early or authentication failed.
async fn handshake(sock: &mut TcpStream, t: &mut Transcript, first_features: &str) -> bool {
    if !t.read_until(sock, HEADER_TAIL).await {
        return false;
    }
    let _ = sock
        .write_all(format!("{}{}", SERVER_HEADER, first_features).as_bytes())
        .await;

    if !t.read_until(sock, "</auth>").await {
        return false;
    }
    // base64("\0alice\0secret")
    if !t.seen.contains("AGFsaWNlAHNlY3JldA==") {
        let _ = sock
            .write_all(b"<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>")
            .await;
        return false;
    }
    let _ = sock
        .write_all(b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
        .await;

    if !t.read_until(sock, HEADER_TAIL).await {
        return false;
    }
    let _ = sock
        .write_all(format!("{}{}", SERVER_HEADER, BIND_FEATURES).as_bytes())
        .await;

    if !t.read_until(sock, "</iq>").await {
        return false;
    }
    let id_start = t.seen.rfind("id='").unwrap() + 4;
    let id_end = id_start + t.seen[id_start..].find('\'').unwrap();
    let bind_id = t.seen[id_start..id_end].to_string();
    let _ = sock
        .write_all(
            format!(
                "<iq type='result' id='{}'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
                 <jid>alice@example.com/parley</jid></bind></iq>",
                bind_id
            )
            .as_bytes(),
        )
        .await;
    true
}

/// Accept one connection and play a well-behaved server that accepts
/// `alice` / `secret`. Returns everything the client sent.
async fn spawn_server(first_features: &'static str) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut t = Transcript { seen: String::new(), cursor: 0 };

        handshake(&mut sock, &mut t, first_features).await;

        t.read_until(&mut sock, "</stream:stream>").await;
        let _ = sock.write_all(b"</stream:stream>").await;
        t.seen
    });

    (port, handle)
}

fn broker(port: u16) -> SessionBroker {
    let mut config = XmppConfig::new("127.0.0.1", port, DOMAIN);
    config.reply_timeout = Duration::from_secs(5);
    SessionBroker::new(config)
}

fn id(s: &str) -> Identity {
    s.parse().unwrap()
}

#[tokio::test]
async fn authenticate_succeeds_and_closes_stream() {
    let (port, server) = spawn_server(SASL_FEATURES).await;

    assert!(broker(port).authenticate("alice", "secret").await);

    let sent = server.await.unwrap();
    assert!(sent.contains("<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><resource>parley</resource>"));
    assert!(sent.ends_with("</stream:stream>"));
    assert!(!sent.contains("<message"));
}

#[tokio::test]
async fn authenticate_rejects_bad_password() {
    let (port, server) = spawn_server(SASL_FEATURES).await;

    assert!(!broker(port).authenticate("alice", "wrong").await);

    let sent = server.await.unwrap();
    assert!(sent.ends_with("</stream:stream>"), "session must be closed: {}", sent);
}

#[tokio::test]
async fn bad_password_is_classified_as_terminal() {
    let (port, server) = spawn_server(SASL_FEATURES).await;

    let err = broker(port)
        .establish_session(&Credentials::new("alice", "wrong"), SessionRole::Delivery)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::InvalidCredentials(_)));
    assert!(!err.is_retryable());
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_username_fails_before_connecting() {
    // Nothing listens here; a connection attempt would be a network error.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let err = broker(port)
        .establish_session(&Credentials::new("bad user", "pw"), SessionRole::AuthCheck)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::MalformedIdentity(_)));
    assert!(!broker(port).authenticate("bad user", "pw").await);
}

#[tokio::test]
async fn send_message_writes_chat_stanza_then_closes() {
    let (port, server) = spawn_server(SASL_FEATURES).await;

    let ack = broker(port)
        .send_message(
            &Credentials::new("alice", "secret"),
            &id("alice@example.com"),
            &id("bob@example.com"),
            "hi & bye",
        )
        .await
        .unwrap();

    let sent = server.await.unwrap();
    assert!(sent.contains(&format!("id='{}'", ack.stanza_id)));
    assert!(sent.contains("to='bob@example.com'"));
    assert!(sent.contains("from='alice@example.com'"));
    assert!(sent.contains("<body>hi &amp; bye</body>"));
    let msg_at = sent.find("<message").unwrap();
    let close_at = sent.rfind("</stream:stream>").unwrap();
    assert!(msg_at < close_at);
}

#[tokio::test]
async fn service_session_lets_server_stamp_sender() {
    let (port, server) = spawn_server(SASL_FEATURES).await;

    broker(port)
        .send_message(
            &Credentials::new("alice", "secret"),
            &id("carol@example.com"),
            &id("bob@example.com"),
            "relayed",
        )
        .await
        .unwrap();

    let sent = server.await.unwrap();
    assert!(sent.contains("<message"));
    assert!(!sent.contains("from='carol@example.com'"));
}

#[tokio::test]
async fn unreachable_host_is_retryable_network_error() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let err = broker(port)
        .send_message(
            &Credentials::new("alice", "secret"),
            &id("alice@example.com"),
            &id("bob@example.com"),
            "hi",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Network(_)), "got {:?}", err);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(sock);
    });

    let mut config = XmppConfig::new("127.0.0.1", port, DOMAIN);
    config.reply_timeout = Duration::from_millis(200);

    let err = SessionBroker::new(config)
        .establish_session(&Credentials::new("alice", "secret"), SessionRole::AuthCheck)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::Timeout(_)), "got {:?}", err);
    server.abort();
}

#[tokio::test]
async fn required_starttls_is_a_protocol_error() {
    let features = "<stream:features>\
        <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>\
        <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
        </stream:features>";
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut t = Transcript { seen: String::new(), cursor: 0 };
        t.read_until(&mut sock, HEADER_TAIL).await;
        let _ = sock
            .write_all(format!("{}{}", SERVER_HEADER, features).as_bytes())
            .await;
        t.read_until(&mut sock, "</stream:stream>").await;
        let _ = sock.write_all(b"</stream:stream>").await;
        t.seen
    });

    let err = broker(port)
        .establish_session(&Credentials::new("alice", "secret"), SessionRole::AuthCheck)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::Protocol(_)), "got {:?}", err);

    let sent = server.await.unwrap();
    assert!(!sent.contains("<auth"), "credentials must not be sent: {}", sent);
}

#[tokio::test]
async fn stalled_server_cannot_hang_send_or_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut t = Transcript { seen: String::new(), cursor: 0 };
        assert!(handshake(&mut sock, &mut t, SASL_FEATURES).await);
        // Keep the socket open but never read again.
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(sock);
    });

    let mut config = XmppConfig::new("127.0.0.1", port, DOMAIN);
    config.reply_timeout = Duration::from_millis(500);
    let body = "x".repeat(32 * 1024 * 1024);

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        SessionBroker::new(config).send_message(
            &Credentials::new("alice", "secret"),
            &id("alice@example.com"),
            &id("bob@example.com"),
            &body,
        ),
    )
    .await
    .expect("send_message must return once the reply timeout has passed");

    let err = outcome.unwrap_err();
    assert!(matches!(err, SessionError::Timeout(_)), "got {:?}", err);
    assert!(err.is_retryable());
    server.abort();
}
