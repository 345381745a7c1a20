use serde::{Deserialize, Serialize};

use crate::store::{OrderStatus, Participant, TicketOrder, User};

use crate::domain::payments::PaymentRequestView;

// ============================================================================
// Order Commands & Views
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantInput {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: String,
    /// Absent or "default" selects the implicit default tier.
    #[serde(default)]
    pub tier_id: Option<String>,
    pub ticket_count: u32,
    pub participants: Vec<ParticipantInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order_id: String,
    pub payment_reference: String,
    pub total_price: f64,
    pub ticket_count: u32,
}

/// Full-field replacement for an admin order update. Participant lists are
/// replaced wholesale (delete then recreate), never patched. Buyer contact
/// edits propagate to the owning user record.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderRequest {
    pub order_id: String,
    pub ticket_count: u32,
    pub total_price: f64,
    pub payment_reference: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub participants: Vec<ParticipantInput>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_address: Option<String>,
    #[serde(default)]
    pub user_phone: Option<String>,
}

/// One of the caller's own orders, with everything the ticket page shows.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub order: TicketOrder,
    pub event_name: String,
    pub participants: Vec<Participant>,
    pub latest_payment_request: Option<PaymentRequestView>,
}

/// Admin view of one order, including the buyer.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: TicketOrder,
    pub buyer: User,
    pub event_name: String,
    pub participants: Vec<Participant>,
    pub payment_requests: Vec<PaymentRequestView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatistics {
    pub total_tickets_sold: u32,
    pub tickets_paid: u32,
    pub tickets_reserved: u32,
    pub tickets_available: i64,
    pub paid_orders: u32,
    pub pending_orders: u32,
    pub revenue_total: f64,
    pub total_participants: u32,
}
