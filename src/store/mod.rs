use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub mod entities;
pub mod memory;

pub use entities::*;
pub use memory::MemoryStore;

// ============================================================================
// Store Boundary
// ============================================================================
//
// The persistent store is a collaborator: the core issues typed queries and
// commands against this trait and never sees the backend's own row shapes.
// Each compound query has its own result struct, decoded once here, so
// business logic never handles loosely-typed maps.
//
// Compound mutations (order+participants insert, redeem, undo, birthdate
// correction) are atomic: an implementation must apply all of their writes
// or none, and the check-and-set operations must not interleave with other
// writers on the same rows.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("event not found")]
    EventNotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("ticket not found")]
    TicketNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("bank account not found")]
    BankAccountNotFound,

    #[error("payment request not found")]
    PaymentRequestNotFound,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

// ----------------------------------------------------------------------------
// Typed query results
// ----------------------------------------------------------------------------

/// An order joined with the user who placed it.
#[derive(Debug, Clone)]
pub struct OrderWithBuyer {
    pub order: TicketOrder,
    pub buyer: User,
}

/// A pending order eligible for a payment request, with everything the
/// notification needs.
#[derive(Debug, Clone)]
pub struct PendingOrderRow {
    pub order: TicketOrder,
    pub buyer: User,
    pub participants: Vec<Participant>,
}

/// Everything the scanner needs about one ticket.
#[derive(Debug, Clone)]
pub struct ScannedTicketRow {
    pub participant: Participant,
    pub order: TicketOrder,
    pub buyer: User,
    pub event: Event,
}

/// One participant of a paid order, for attendance projections.
#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub participant: Participant,
    pub order_id: String,
    pub payment_reference: String,
    pub event_id: String,
}

/// One row of the guest list export.
#[derive(Debug, Clone)]
pub struct GuestListRow {
    pub participant: Participant,
    pub buyer_name: String,
    pub buyer_email: String,
    pub payment_reference: String,
    pub order_created_at: DateTime<Utc>,
    pub total_price: f64,
}

/// Outcome of the atomic redeem check-and-set.
#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    Redeemed,
    AlreadyRedeemed {
        redeemed_at: Option<DateTime<Utc>>,
        redeemed_by: Option<String>,
    },
}

/// The ticket reverted by an undo.
#[derive(Debug, Clone)]
pub struct UndoneRedemption {
    pub order_id: String,
    pub ticket_number: u32,
    pub participant_name: String,
}

/// Field replacement for an admin order update.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order_id: String,
    pub ticket_count: u32,
    pub total_price: f64,
    pub payment_reference: String,
    pub status: OrderStatus,
}

/// Contact edits propagated from an order update to the owning user.
#[derive(Debug, Clone, Default)]
pub struct UserContactUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl UserContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.address.is_none() && self.phone.is_none()
    }
}

/// Audit details accompanying a birthdate correction. The store captures the
/// old value itself so the correction and its audit record cannot diverge.
#[derive(Debug, Clone)]
pub struct BirthdateCorrection {
    pub audit_id: String,
    pub reason: String,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

// ----------------------------------------------------------------------------
// The store trait
// ----------------------------------------------------------------------------

#[async_trait]
pub trait TicketStore: Send + Sync {
    // --- events & tiers -----------------------------------------------------

    /// Fetch an event by id. Inactive (tombstoned) events are invisible.
    async fn active_event(&self, event_id: &str) -> Result<Option<Event>, StoreError>;

    async fn tier(&self, event_id: &str, tier_id: &str) -> Result<Option<TicketTier>, StoreError>;

    // --- users --------------------------------------------------------------

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn event_override(
        &self,
        email: &str,
        event_id: &str,
    ) -> Result<Option<EventOverride>, StoreError>;

    async fn update_user_contact(
        &self,
        email: &str,
        update: UserContactUpdate,
    ) -> Result<(), StoreError>;

    // --- bank accounts ------------------------------------------------------

    /// Accounts of an event, sorted by percentage descending.
    async fn bank_accounts(&self, event_id: &str) -> Result<Vec<BankAccount>, StoreError>;

    async fn bank_account(&self, account_id: &str) -> Result<Option<BankAccount>, StoreError>;

    /// Replace the whole account set of an event. The caller has already
    /// validated the percentage sum; the store persists all or nothing.
    async fn replace_bank_accounts(
        &self,
        event_id: &str,
        accounts: Vec<BankAccount>,
    ) -> Result<(), StoreError>;

    // --- capacity reads -----------------------------------------------------

    /// Tickets reserved for an event: the sum of ticket_count over paid and
    /// pending orders.
    async fn event_tickets_reserved(&self, event_id: &str) -> Result<u32, StoreError>;

    async fn tier_tickets_reserved(&self, event_id: &str, tier_id: &str)
        -> Result<u32, StoreError>;

    async fn user_tickets_reserved(&self, email: &str, event_id: &str)
        -> Result<u32, StoreError>;

    /// All orders a user ever placed for an event, regardless of status.
    /// Feeds the payment-reference ordinal.
    async fn user_order_count(&self, email: &str, event_id: &str) -> Result<u32, StoreError>;

    // --- orders -------------------------------------------------------------

    /// Persist an order together with its participants as one atomic write.
    async fn insert_order(
        &self,
        order: TicketOrder,
        participants: Vec<Participant>,
    ) -> Result<(), StoreError>;

    async fn order(&self, order_id: &str) -> Result<Option<TicketOrder>, StoreError>;

    async fn order_with_buyer(&self, order_id: &str)
        -> Result<Option<OrderWithBuyer>, StoreError>;

    async fn participants(&self, order_id: &str) -> Result<Vec<Participant>, StoreError>;

    async fn orders_for_user(&self, email: &str) -> Result<Vec<TicketOrder>, StoreError>;

    /// Orders scoped to one event, or all orders when no event is given.
    async fn orders_for_event(&self, event_id: Option<&str>)
        -> Result<Vec<OrderWithBuyer>, StoreError>;

    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        paid_at: Option<NaiveDate>,
    ) -> Result<(), StoreError>;

    /// Case-insensitive lookup by payment reference.
    async fn order_by_reference(&self, reference: &str)
        -> Result<Option<TicketOrder>, StoreError>;

    async fn update_order(&self, update: OrderUpdate) -> Result<(), StoreError>;

    /// Wholesale participant replacement (delete then recreate).
    async fn replace_participants(
        &self,
        order_id: &str,
        participants: Vec<Participant>,
    ) -> Result<(), StoreError>;

    /// Remove the order, its participants and its payment requests.
    async fn delete_order(&self, order_id: &str) -> Result<(), StoreError>;

    /// Participants of capacity-counting orders with a non-empty name.
    async fn participant_count(&self, event_id: Option<&str>) -> Result<u32, StoreError>;

    // --- payment errors -----------------------------------------------------

    async fn insert_payment_error(&self, record: PaymentErrorRecord) -> Result<(), StoreError>;

    async fn payment_errors(&self) -> Result<Vec<PaymentErrorRecord>, StoreError>;

    // --- payment requests ---------------------------------------------------

    async fn insert_payment_request(&self, request: PaymentRequest) -> Result<(), StoreError>;

    async fn payment_request(&self, request_id: &str)
        -> Result<Option<PaymentRequest>, StoreError>;

    /// Requests of an order, newest first. The first entry is authoritative
    /// for display.
    async fn payment_requests(&self, order_id: &str) -> Result<Vec<PaymentRequest>, StoreError>;

    async fn set_payment_request_status(
        &self,
        request_id: &str,
        status: PaymentRequestStatus,
        paid_at: Option<NaiveDate>,
    ) -> Result<(), StoreError>;

    /// Pending orders of an event that have no payment request yet,
    /// optionally restricted to an explicit order-id subset.
    async fn pending_orders_without_request(
        &self,
        event_id: &str,
        order_ids: Option<&[String]>,
    ) -> Result<Vec<PendingOrderRow>, StoreError>;

    // --- issuance & redemption ----------------------------------------------

    async fn mark_tickets_generated(
        &self,
        order_id: &str,
        at: DateTime<Utc>,
        by: &str,
    ) -> Result<(), StoreError>;

    /// Paid orders of an event whose tickets are not generated yet.
    async fn paid_orders_awaiting_generation(
        &self,
        event_id: &str,
    ) -> Result<Vec<String>, StoreError>;

    async fn scanned_ticket(
        &self,
        order_id: &str,
        ticket_number: u32,
    ) -> Result<Option<ScannedTicketRow>, StoreError>;

    /// Atomic check-and-set: marks the participant redeemed unless it
    /// already is, in which case the prior redemption metadata is returned.
    async fn redeem(
        &self,
        order_id: &str,
        ticket_number: u32,
        operator: &str,
        at: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError>;

    /// Atomically find and revert the most recent redemption performed by
    /// this operator. Returns None when the operator has none.
    async fn undo_last_redemption(
        &self,
        operator: &str,
    ) -> Result<Option<UndoneRedemption>, StoreError>;

    /// Atomically update the birthdate and append the audit record; the old
    /// value is captured inside the same write.
    async fn correct_birthdate(
        &self,
        order_id: &str,
        ticket_number: u32,
        new_birthdate: NaiveDate,
        correction: BirthdateCorrection,
    ) -> Result<BirthdateAuditRecord, StoreError>;

    async fn birthdate_audit(&self, order_id: &str)
        -> Result<Vec<BirthdateAuditRecord>, StoreError>;

    // --- projections --------------------------------------------------------

    /// All participants of paid orders, optionally scoped to one event.
    async fn attendance(&self, event_id: Option<&str>) -> Result<Vec<AttendanceRow>, StoreError>;

    /// Participants of paid orders of one event, name ascending.
    async fn guest_list(&self, event_id: &str) -> Result<Vec<GuestListRow>, StoreError>;
}
