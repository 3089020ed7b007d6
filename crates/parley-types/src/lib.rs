pub mod api;
pub mod identity;
pub mod message_type;
pub mod models;

pub use identity::{Identity, IdentityError};
pub use message_type::{MessageType, classify};
