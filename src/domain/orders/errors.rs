use chrono::{DateTime, Utc};

use crate::auth::PermissionDenied;
use crate::store::StoreError;
use crate::util::dates::BirthdateError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================
//
// Every rejection reason an order operation can produce. The messages are
// user-facing; the API layer returns them verbatim in the error envelope.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("event not found")]
    EventNotFound,

    #[error("ticket sales for this event are currently disabled")]
    SalesDisabled,

    #[error("ticket sales have not started yet (sales open {opens_at})")]
    SaleNotStarted { opens_at: DateTime<Utc> },

    #[error("ticket sales have ended (sales closed {closed_at})")]
    SaleEnded { closed_at: DateTime<Utc> },

    #[error("access denied")]
    AccessDenied,

    #[error("event password required")]
    PasswordRequired,

    #[error("your email address must be verified before buying tickets")]
    EmailNotVerified,

    #[error("not enough tickets available for this event")]
    EventCapacityExceeded,

    #[error("not enough tickets available in the '{tier}' category")]
    TierCapacityExceeded { tier: String },

    #[error("you are currently excluded from buying tickets for this event")]
    PurchaseBlocked,

    #[error("ticket limit exceeded: at most {limit} tickets for this event")]
    UserLimitExceeded { limit: u32 },

    #[error("selected ticket category not found")]
    TierNotFound,

    #[error("participant data is required")]
    MissingParticipants,

    #[error("participant count does not match the ticket count")]
    ParticipantCountMismatch,

    #[error("participant {index}: name is required")]
    ParticipantNameMissing { index: usize },

    #[error("participant {index}: invalid birthdate: {source}")]
    ParticipantBirthdateInvalid {
        index: usize,
        source: BirthdateError,
    },

    #[error("order not found")]
    OrderNotFound,

    #[error("no order found for reference '{reference}'")]
    ReferenceNotFound { reference: String },

    #[error(transparent)]
    Permission(#[from] PermissionDenied),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Short stable label for the rejection metric.
    pub fn reason_label(&self) -> &'static str {
        match self {
            OrderError::EventNotFound => "event_not_found",
            OrderError::SalesDisabled => "sales_disabled",
            OrderError::SaleNotStarted { .. } => "sale_not_started",
            OrderError::SaleEnded { .. } => "sale_ended",
            OrderError::AccessDenied => "access_denied",
            OrderError::PasswordRequired => "password_required",
            OrderError::EmailNotVerified => "email_not_verified",
            OrderError::EventCapacityExceeded => "event_capacity",
            OrderError::TierCapacityExceeded { .. } => "tier_capacity",
            OrderError::PurchaseBlocked => "purchase_blocked",
            OrderError::UserLimitExceeded { .. } => "user_limit",
            OrderError::TierNotFound => "tier_not_found",
            OrderError::MissingParticipants
            | OrderError::ParticipantCountMismatch
            | OrderError::ParticipantNameMissing { .. }
            | OrderError::ParticipantBirthdateInvalid { .. } => "participants_invalid",
            OrderError::OrderNotFound => "order_not_found",
            OrderError::ReferenceNotFound { .. } => "reference_not_found",
            OrderError::Permission(_) => "permission_denied",
            OrderError::Store(_) => "store_failure",
        }
    }
}
