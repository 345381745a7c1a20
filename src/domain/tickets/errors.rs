use chrono::{DateTime, Utc};

use crate::auth::PermissionDenied;
use crate::store::StoreError;
use crate::util::dates::BirthdateError;

// ============================================================================
// Ticket Issuance & Redemption Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("order not found")]
    OrderNotFound,

    #[error("ticket not found")]
    TicketNotFound,

    #[error("event not found")]
    EventNotFound,

    #[error("tickets can only be generated for paid orders")]
    OrderNotPaid,

    #[error("tickets have already been generated for this order")]
    AlreadyGenerated,

    #[error("tickets have not been released for this order yet")]
    NotGenerated,

    #[error("ticket has already been redeemed")]
    AlreadyRedeemed {
        redeemed_at: Option<DateTime<Utc>>,
        redeemed_by: Option<String>,
    },

    #[error("no redeemed tickets found for this operator")]
    NothingToUndo,

    #[error("a reason is required")]
    ReasonRequired,

    #[error("invalid birthdate: {0}")]
    InvalidBirthdate(#[from] BirthdateError),

    #[error("ticket download is currently not available")]
    DownloadDisabled,

    #[error(transparent)]
    Permission(#[from] PermissionDenied),

    #[error(transparent)]
    Store(#[from] StoreError),
}
