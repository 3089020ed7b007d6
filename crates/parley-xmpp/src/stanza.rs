//! Outbound stanza builders and the few inspections the client needs on
//! inbound elements.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

pub const NS_CLIENT: &str = "jabber:client";
pub const NS_STREAM: &str = "http://etherx.jabber.org/streams";
pub const NS_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
pub const NS_BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
pub const NS_SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// -- Outbound --

pub fn stream_header(domain: &str) -> String {
    format!(
        "<?xml version='1.0'?><stream:stream to='{}' version='1.0' xmlns='{}' xmlns:stream='{}'>",
        escape(domain),
        NS_CLIENT,
        NS_STREAM
    )
}

pub const STREAM_CLOSE: &str = "</stream:stream>";

/// SASL PLAIN: base64("" NUL authcid NUL password).
pub fn auth_plain(username: &str, password: &str) -> String {
    let mut raw = Vec::with_capacity(username.len() + password.len() + 2);
    raw.push(0);
    raw.extend_from_slice(username.as_bytes());
    raw.push(0);
    raw.extend_from_slice(password.as_bytes());
    format!(
        "<auth xmlns='{}' mechanism='PLAIN'>{}</auth>",
        NS_SASL,
        B64.encode(raw)
    )
}

pub fn bind_request(id: &str, resource: &str) -> String {
    format!(
        "<iq type='set' id='{}'><bind xmlns='{}'><resource>{}</resource></bind></iq>",
        escape(id),
        NS_BIND,
        escape(resource)
    )
}

pub fn session_request(id: &str) -> String {
    format!(
        "<iq type='set' id='{}'><session xmlns='{}'/></iq>",
        escape(id),
        NS_SESSION
    )
}

/// A one-to-one chat message. An empty body is sent as `<body/>`.
pub fn chat_message(id: &str, to: &str, from: Option<&str>, body: &str) -> String {
    let from_attr = from
        .map(|f| format!(" from='{}'", escape(f)))
        .unwrap_or_default();
    let body_elem = if body.is_empty() {
        "<body/>".to_string()
    } else {
        format!("<body>{}</body>", escape(body))
    };
    format!(
        "<message type='chat' id='{}' to='{}'{}>{}</message>",
        escape(id),
        escape(to),
        from_attr,
        body_elem
    )
}

// -- Inbound --

/// Qualified name of an element, e.g. `stream:features` or `iq`.
pub fn element_name(elem: &str) -> &str {
    let rest = elem.trim_start().trim_start_matches('<');
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Value of an attribute on the element's opening tag.
pub fn attribute(elem: &str, name: &str) -> Option<String> {
    let open_end = opening_tag_end(elem)?;
    let tag = &elem[..open_end];
    let mut rest = &tag[tag.find(|c: char| c.is_whitespace())?..];

    loop {
        rest = rest.trim_start();
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let close = after[1..].find(quote)? + 1;
        if key == name {
            return Some(unescape(&after[1..close]));
        }
        rest = &after[close + 1..];
    }
}

/// The first descendant element named `name` (including its own children),
/// or `None`.
pub fn child<'a>(elem: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}", name);
    let mut search = 0;
    let start = loop {
        let idx = elem[search..].find(&open)? + search;
        let next = elem[idx + open.len()..].chars().next()?;
        if next.is_whitespace() || next == '>' || next == '/' {
            break idx;
        }
        search = idx + open.len();
    };

    let sub = &elem[start..];
    let tag_end = opening_tag_end(sub)?;
    if sub[..tag_end].ends_with("/>") {
        return Some(&sub[..tag_end]);
    }
    let close = format!("</{}>", name);
    let close_idx = sub.find(&close)?;
    Some(&sub[..close_idx + close.len()])
}

/// Text content of an element without children.
pub fn text(elem: &str) -> Option<String> {
    let open_end = opening_tag_end(elem)?;
    let inner = &elem[open_end..];
    let close = inner.rfind("</")?;
    Some(unescape(&inner[..close]))
}

/// SASL mechanisms offered in a `<stream:features/>` element.
pub fn mechanisms(features: &str) -> Vec<String> {
    let Some(mechs) = child(features, "mechanisms") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut rest = mechs;
    while let Some(m) = child(rest, "mechanism") {
        if let Some(t) = text(m) {
            out.push(t.trim().to_string());
        }
        let Some(pos) = rest.find(m) else { break };
        rest = &rest[pos + m.len()..];
    }
    out
}

/// Name of the first child element, used for SASL failure and stream error
/// conditions.
pub fn first_child_name(elem: &str) -> Option<&str> {
    let open_end = opening_tag_end(elem)?;
    let inner = &elem[open_end..];
    let lt = inner.find('<')?;
    let name = element_name(&inner[lt..]);
    if name.starts_with('/') || name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Exclusive end index of the opening tag, quote-aware.
fn opening_tag_end(elem: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in elem.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i + 1),
            None => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: &str = "<stream:features>\
        <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>\
        <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
        <mechanism>SCRAM-SHA-1</mechanism><mechanism>PLAIN</mechanism>\
        </mechanisms></stream:features>";

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a<b & 'c'"), "a&lt;b &amp; &apos;c&apos;");
        assert_eq!(unescape(&escape("<&>\"'")), "<&>\"'");
    }

    #[test]
    fn auth_plain_encodes_nul_separated_credentials() {
        let auth = auth_plain("alice", "secret");
        let encoded = text(&auth).unwrap();
        let raw = B64.decode(encoded).unwrap();
        assert_eq!(raw, b"\0alice\0secret");
        assert_eq!(attribute(&auth, "mechanism").as_deref(), Some("PLAIN"));
    }

    #[test]
    fn chat_message_escapes_body_and_omits_missing_from() {
        let m = chat_message("m1", "bob@example.com", None, "1 < 2");
        assert_eq!(
            m,
            "<message type='chat' id='m1' to='bob@example.com'><body>1 &lt; 2</body></message>"
        );
        let empty = chat_message("m2", "bob@example.com", Some("alice@example.com"), "");
        assert!(empty.contains("from='alice@example.com'"));
        assert!(empty.contains("<body/>"));
    }

    #[test]
    fn reads_names_and_attributes() {
        let iq = "<iq type=\"result\" id='bind_1'><bind/></iq>";
        assert_eq!(element_name(iq), "iq");
        assert_eq!(attribute(iq, "type").as_deref(), Some("result"));
        assert_eq!(attribute(iq, "id").as_deref(), Some("bind_1"));
        assert_eq!(attribute(iq, "to"), None);
        assert_eq!(element_name("<stream:features/>"), "stream:features");
    }

    #[test]
    fn lists_mechanisms() {
        assert_eq!(mechanisms(FEATURES), vec!["SCRAM-SHA-1", "PLAIN"]);
        assert!(mechanisms("<stream:features/>").is_empty());
    }

    #[test]
    fn finds_children() {
        assert_eq!(
            child(FEATURES, "starttls"),
            Some("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>")
        );
        assert!(child(FEATURES, "bind").is_none());
        let session = "<stream:features><session xmlns='x'><optional/></session></stream:features>";
        assert_eq!(
            child(session, "session"),
            Some("<session xmlns='x'><optional/></session>")
        );
    }

    #[test]
    fn reads_failure_condition() {
        let failure = "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>";
        assert_eq!(first_child_name(failure), Some("not-authorized"));
        assert_eq!(first_child_name("<failure/>"), None);
    }
}
