use thiserror::Error;

/// Failure taxonomy for chat operations. Boundaries (REST handlers, gateway
/// sessions) translate each kind into a caller-visible outcome; nothing below
/// them logs-and-swallows.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("user is not a participant of the conversation")]
    NotAParticipant,

    #[error("user is not an admin of the conversation")]
    NotAnAdmin,

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("message belongs to another user")]
    NotMessageOwner,

    #[error("file of {size} bytes exceeds the {max} byte limit")]
    AttachmentTooLarge { size: u64, max: u64 },

    #[error("could not validate credentials")]
    IdentityUnresolvable,

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

pub type ChatResult<T> = Result<T, ChatError>;
