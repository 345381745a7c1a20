use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Persisted Entities
// ============================================================================

/// Who may see and buy into an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    PasswordProtected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    CancelledByUser,
    Error,
}

impl OrderStatus {
    /// Pending orders are reservations: they hold capacity before payment
    /// is confirmed, so both paid and pending count as sold.
    pub fn counts_toward_capacity(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Paid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Sent,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub year: i32,
    pub location: Option<String>,
    pub visibility: Visibility,
    pub password: Option<String>,
    pub max_tickets: u32,
    pub ticket_price: f64,
    pub start_datetime: Option<DateTime<Utc>>,
    pub ticket_sale_start: Option<DateTime<Utc>>,
    pub ticket_sale_end: Option<DateTime<Utc>>,
    pub max_tickets_per_user: Option<u32>,
    pub ticket_generation_enabled: bool,
    /// Tombstone flag. Events are never hard-deleted; inactive events are
    /// invisible to every read path.
    pub active: bool,
}

/// A named price/capacity bucket within an event. Absence of tiers implies a
/// single implicit "Standard" tier using the event's base price and capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketTier {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub price: f64,
    pub max_tickets: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: String,
    pub event_id: String,
    pub account_name: String,
    pub bank_name: String,
    pub iban: String,
    pub bic: String,
    /// Share of incoming transfers this account should receive, 0–100.
    /// Across an event's accounts the percentages sum to 100.
    pub percentage: f64,
    pub escrow_document_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
}

/// Per-user settings for one event, overriding the event defaults.
/// A limit of exactly 0 excludes the user from purchasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOverride {
    pub ticket_price: Option<f64>,
    pub ticket_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketOrder {
    pub id: String,
    pub user_email: String,
    pub event_id: String,
    pub tier_id: Option<String>,
    /// Snapshot of the tier name at purchase time ("Standard" for the
    /// implicit default tier).
    pub tier_name: String,
    pub ticket_count: u32,
    pub total_price: f64,
    pub individual_ticket_price: f64,
    pub payment_reference: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<NaiveDate>,
    pub tickets_generated: bool,
    pub tickets_generated_at: Option<DateTime<Utc>>,
    pub tickets_generated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub birthdate: Option<NaiveDate>,
    /// 1-based, unique within the order. The addressable unit for
    /// redemption and ticket documents.
    pub ticket_number: u32,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<String>,
}

impl Participant {
    pub fn new(name: String, phone: String, email: String, birthdate: Option<NaiveDate>, ticket_number: u32) -> Self {
        Self {
            name,
            phone,
            email,
            birthdate,
            ticket_number,
            redeemed: false,
            redeemed_at: None,
            redeemed_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: String,
    pub order_id: String,
    pub bank_account_id: String,
    pub status: PaymentRequestStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
    pub paid_at: Option<NaiveDate>,
    pub created_by: String,
}

/// Freestanding reconciliation artifact for an incoming transfer whose
/// reference matched no order. Never silently discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentErrorRecord {
    pub id: String,
    pub payment_reference: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub recorded_by: String,
}

/// Append-only audit record of a birthdate correction. Never mutated or
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirthdateAuditRecord {
    pub id: String,
    pub order_id: String,
    pub ticket_number: u32,
    pub participant_name: String,
    pub old_value: Option<NaiveDate>,
    pub new_value: NaiveDate,
    pub reason: String,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_counting_statuses() {
        assert!(OrderStatus::Pending.counts_toward_capacity());
        assert!(OrderStatus::Paid.counts_toward_capacity());
        assert!(!OrderStatus::Cancelled.counts_toward_capacity());
        assert!(!OrderStatus::CancelledByUser.counts_toward_capacity());
        assert!(!OrderStatus::Error.counts_toward_capacity());
    }

    #[test]
    fn test_status_serialization_is_snake_case() {
        let json = serde_json::to_string(&OrderStatus::CancelledByUser).unwrap();
        assert_eq!(json, "\"cancelled_by_user\"");

        let back: OrderStatus = serde_json::from_str("\"paid\"").unwrap();
        assert_eq!(back, OrderStatus::Paid);
    }

    #[test]
    fn test_visibility_serialization() {
        let json = serde_json::to_string(&Visibility::PasswordProtected).unwrap();
        assert_eq!(json, "\"password_protected\"");
    }
}
