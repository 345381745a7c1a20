use crate::auth::PermissionDenied;
use crate::store::StoreError;

// ============================================================================
// Payment Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("event not found")]
    EventNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("payment request not found")]
    RequestNotFound,

    #[error("bank account not found")]
    AccountNotFound,

    #[error("order is already paid")]
    AlreadyPaid,

    #[error("no bank accounts configured for this event")]
    NoAccountsConfigured,

    #[error("bank account percentages must sum to 100% (currently: {total}%)")]
    PercentagesInvalid { total: f64 },

    #[error("no bank details on file for this order")]
    NoBankDetails,

    #[error("notification failed: {0}")]
    NotificationFailed(String),

    #[error(transparent)]
    Permission(#[from] PermissionDenied),

    #[error(transparent)]
    Store(#[from] StoreError),
}
