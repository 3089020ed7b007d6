//! Session Broker: short-lived client sessions against an XMPP server.
//!
//! Every session is opened for exactly one operation (a login check or one
//! outgoing chat message) and closed again on every exit path. There is no
//! pooling; concurrent callers each get their own TCP connection.

pub mod broker;
pub mod error;
pub mod framer;
pub mod session;
pub mod stanza;

pub use broker::{Credentials, SessionBroker, XmppConfig};
pub use error::SessionError;
pub use session::{Ack, Session, SessionRole};
