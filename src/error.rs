use thiserror::Error;
use uuid::Uuid;

/// Engine error taxonomy. `InvalidQuality` is a caller bug and is
/// rejected before any state changes; the storage variants are
/// retryable from the client's point of view.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("quality rating {0} is outside the 0-5 range")]
    InvalidQuality(u8),

    #[error("card {card_id} is not part of deck {deck_id}")]
    UnknownCard { card_id: Uuid, deck_id: Uuid },

    #[error("concurrent update detected for card {0}; retry the submission")]
    Conflict(Uuid),

    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}
