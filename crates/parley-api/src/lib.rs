pub mod archive;
pub mod attachments;
pub mod auth;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod validation;
