pub mod attachments;
pub mod auth;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod participants;
pub mod users;
