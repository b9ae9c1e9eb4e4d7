pub mod convert;
pub mod error;
pub mod guard;
pub mod service;

pub use error::{ChatError, ChatResult};
pub use guard::MembershipGuard;
pub use service::{ChatService, DEFAULT_MAX_ATTACHMENT_BYTES};
