use axum::http::StatusCode;
use parley_chat::ChatError;
use tracing::error;

/// Translate a chat failure into the caller-visible status code.
/// Storage failures are logged here — the one place they surface — and hidden
/// behind a 500.
pub fn into_status(err: ChatError) -> StatusCode {
    match err {
        ChatError::NotAParticipant | ChatError::NotAnAdmin | ChatError::NotMessageOwner => {
            StatusCode::FORBIDDEN
        }
        ChatError::ConversationNotFound | ChatError::MessageNotFound => StatusCode::NOT_FOUND,
        ChatError::AttachmentTooLarge { .. } => StatusCode::BAD_REQUEST,
        ChatError::IdentityUnresolvable => StatusCode::UNAUTHORIZED,
        ChatError::Database(e) => {
            error!("storage failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_the_documented_codes() {
        assert_eq!(into_status(ChatError::NotAParticipant), StatusCode::FORBIDDEN);
        assert_eq!(into_status(ChatError::NotAnAdmin), StatusCode::FORBIDDEN);
        assert_eq!(into_status(ChatError::NotMessageOwner), StatusCode::FORBIDDEN);
        assert_eq!(into_status(ChatError::ConversationNotFound), StatusCode::NOT_FOUND);
        assert_eq!(into_status(ChatError::MessageNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            into_status(ChatError::AttachmentTooLarge { size: 2, max: 1 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(into_status(ChatError::IdentityUnresolvable), StatusCode::UNAUTHORIZED);
    }
}
