use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    AttendanceRow, BirthdateCorrection, GuestListRow, OrderUpdate, OrderWithBuyer,
    PendingOrderRow, RedeemOutcome, ScannedTicketRow, StoreError, TicketStore, UndoneRedemption,
    UserContactUpdate,
};
use super::entities::*;

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Reference implementation of the store boundary. A single lock guards all
// tables, which makes every compound operation (order+participants insert,
// redeem check-and-set, undo, birthdate correction) trivially atomic: no
// other writer can observe a half-applied state.
//
// Also the substrate for the test suites of the domain services.
//
// ============================================================================

#[derive(Default)]
struct Inner {
    events: HashMap<String, Event>,
    tiers: HashMap<String, TicketTier>,
    users: HashMap<String, User>,
    overrides: HashMap<(String, String), EventOverride>,
    accounts: HashMap<String, BankAccount>,
    orders: HashMap<String, TicketOrder>,
    participants: HashMap<String, Vec<Participant>>,
    requests: HashMap<String, PaymentRequest>,
    payment_errors: Vec<PaymentErrorRecord>,
    audit: Vec<BirthdateAuditRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- seeding ------------------------------------------------------------
    //
    // Event, tier and user administration is out of scope for the core, so
    // the reference store exposes direct inserts for wiring and tests.

    pub fn insert_event(&self, event: Event) {
        self.write().events.insert(event.id.clone(), event);
    }

    pub fn insert_tier(&self, tier: TicketTier) {
        self.write().tiers.insert(tier.id.clone(), tier);
    }

    pub fn insert_user(&self, user: User) {
        self.write().users.insert(user.email.clone(), user);
    }

    pub fn set_event_override(&self, email: &str, event_id: &str, value: EventOverride) {
        self.write()
            .overrides
            .insert((email.to_string(), event_id.to_string()), value);
    }
}

impl Inner {
    fn reserved(&self, filter: impl Fn(&TicketOrder) -> bool) -> u32 {
        self.orders
            .values()
            .filter(|o| o.status.counts_toward_capacity())
            .filter(|o| filter(o))
            .map(|o| o.ticket_count)
            .sum()
    }

    fn has_request(&self, order_id: &str) -> bool {
        self.requests.values().any(|r| r.order_id == order_id)
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn active_event(&self, event_id: &str) -> Result<Option<Event>, StoreError> {
        Ok(self
            .read()
            .events
            .get(event_id)
            .filter(|e| e.active)
            .cloned())
    }

    async fn tier(&self, event_id: &str, tier_id: &str) -> Result<Option<TicketTier>, StoreError> {
        Ok(self
            .read()
            .tiers
            .get(tier_id)
            .filter(|t| t.event_id == event_id)
            .cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read().users.get(email).cloned())
    }

    async fn event_override(
        &self,
        email: &str,
        event_id: &str,
    ) -> Result<Option<EventOverride>, StoreError> {
        Ok(self
            .read()
            .overrides
            .get(&(email.to_string(), event_id.to_string()))
            .cloned())
    }

    async fn update_user_contact(
        &self,
        email: &str,
        update: UserContactUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        {
            let user = inner.users.get_mut(email).ok_or(StoreError::UserNotFound)?;
            if let Some(name) = update.name {
                user.name = name;
            }
            if let Some(address) = update.address {
                user.address = Some(address);
            }
            if let Some(phone) = update.phone {
                user.phone = Some(phone);
            }
        }
        if let Some(new_email) = update.email {
            if new_email != email {
                let mut moved = inner.users.remove(email).ok_or(StoreError::UserNotFound)?;
                moved.email = new_email.clone();
                inner.users.insert(new_email.clone(), moved);
                for order in inner.orders.values_mut() {
                    if order.user_email == email {
                        order.user_email = new_email.clone();
                    }
                }
            }
        }
        Ok(())
    }

    async fn bank_accounts(&self, event_id: &str) -> Result<Vec<BankAccount>, StoreError> {
        let mut accounts: Vec<BankAccount> = self
            .read()
            .accounts
            .values()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| {
            b.percentage
                .partial_cmp(&a.percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(accounts)
    }

    async fn bank_account(&self, account_id: &str) -> Result<Option<BankAccount>, StoreError> {
        Ok(self.read().accounts.get(account_id).cloned())
    }

    async fn replace_bank_accounts(
        &self,
        event_id: &str,
        accounts: Vec<BankAccount>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.accounts.retain(|_, a| a.event_id != event_id);
        for account in accounts {
            inner.accounts.insert(account.id.clone(), account);
        }
        Ok(())
    }

    async fn event_tickets_reserved(&self, event_id: &str) -> Result<u32, StoreError> {
        Ok(self.read().reserved(|o| o.event_id == event_id))
    }

    async fn tier_tickets_reserved(
        &self,
        event_id: &str,
        tier_id: &str,
    ) -> Result<u32, StoreError> {
        Ok(self
            .read()
            .reserved(|o| o.event_id == event_id && o.tier_id.as_deref() == Some(tier_id)))
    }

    async fn user_tickets_reserved(&self, email: &str, event_id: &str) -> Result<u32, StoreError> {
        Ok(self
            .read()
            .reserved(|o| o.event_id == event_id && o.user_email == email))
    }

    async fn user_order_count(&self, email: &str, event_id: &str) -> Result<u32, StoreError> {
        Ok(self
            .read()
            .orders
            .values()
            .filter(|o| o.event_id == event_id && o.user_email == email)
            .count() as u32)
    }

    async fn insert_order(
        &self,
        order: TicketOrder,
        participants: Vec<Participant>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.participants.insert(order.id.clone(), participants);
        inner.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn order(&self, order_id: &str) -> Result<Option<TicketOrder>, StoreError> {
        Ok(self.read().orders.get(order_id).cloned())
    }

    async fn order_with_buyer(
        &self,
        order_id: &str,
    ) -> Result<Option<OrderWithBuyer>, StoreError> {
        let inner = self.read();
        let Some(order) = inner.orders.get(order_id) else {
            return Ok(None);
        };
        let buyer = inner
            .users
            .get(&order.user_email)
            .ok_or(StoreError::UserNotFound)?;
        Ok(Some(OrderWithBuyer {
            order: order.clone(),
            buyer: buyer.clone(),
        }))
    }

    async fn participants(&self, order_id: &str) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .read()
            .participants
            .get(order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn orders_for_user(&self, email: &str) -> Result<Vec<TicketOrder>, StoreError> {
        let mut orders: Vec<TicketOrder> = self
            .read()
            .orders
            .values()
            .filter(|o| o.user_email == email)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn orders_for_event(
        &self,
        event_id: Option<&str>,
    ) -> Result<Vec<OrderWithBuyer>, StoreError> {
        let inner = self.read();
        let mut rows = Vec::new();
        for order in inner.orders.values() {
            if let Some(event_id) = event_id {
                if order.event_id != event_id {
                    continue;
                }
            }
            let buyer = inner
                .users
                .get(&order.user_email)
                .ok_or(StoreError::UserNotFound)?;
            rows.push(OrderWithBuyer {
                order: order.clone(),
                buyer: buyer.clone(),
            });
        }
        rows.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
        Ok(rows)
    }

    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        paid_at: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or(StoreError::OrderNotFound)?;
        order.status = status;
        order.paid_at = paid_at;
        Ok(())
    }

    async fn order_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TicketOrder>, StoreError> {
        Ok(self
            .read()
            .orders
            .values()
            .find(|o| o.payment_reference.eq_ignore_ascii_case(reference))
            .cloned())
    }

    async fn update_order(&self, update: OrderUpdate) -> Result<(), StoreError> {
        let mut inner = self.write();
        let order = inner
            .orders
            .get_mut(&update.order_id)
            .ok_or(StoreError::OrderNotFound)?;
        order.ticket_count = update.ticket_count;
        order.total_price = update.total_price;
        order.payment_reference = update.payment_reference;
        order.status = update.status;
        Ok(())
    }

    async fn replace_participants(
        &self,
        order_id: &str,
        participants: Vec<Participant>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        if !inner.orders.contains_key(order_id) {
            return Err(StoreError::OrderNotFound);
        }
        inner.participants.insert(order_id.to_string(), participants);
        Ok(())
    }

    async fn delete_order(&self, order_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.orders.remove(order_id).is_none() {
            return Err(StoreError::OrderNotFound);
        }
        inner.participants.remove(order_id);
        inner.requests.retain(|_, r| r.order_id != order_id);
        Ok(())
    }

    async fn participant_count(&self, event_id: Option<&str>) -> Result<u32, StoreError> {
        let inner = self.read();
        let mut count = 0;
        for order in inner.orders.values() {
            if !order.status.counts_toward_capacity() {
                continue;
            }
            if let Some(event_id) = event_id {
                if order.event_id != event_id {
                    continue;
                }
            }
            if let Some(list) = inner.participants.get(&order.id) {
                count += list.iter().filter(|p| !p.name.trim().is_empty()).count() as u32;
            }
        }
        Ok(count)
    }

    async fn insert_payment_error(&self, record: PaymentErrorRecord) -> Result<(), StoreError> {
        self.write().payment_errors.push(record);
        Ok(())
    }

    async fn payment_errors(&self) -> Result<Vec<PaymentErrorRecord>, StoreError> {
        Ok(self.read().payment_errors.clone())
    }

    async fn insert_payment_request(&self, request: PaymentRequest) -> Result<(), StoreError> {
        let mut inner = self.write();
        if !inner.orders.contains_key(&request.order_id) {
            return Err(StoreError::OrderNotFound);
        }
        inner.requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn payment_request(
        &self,
        request_id: &str,
    ) -> Result<Option<PaymentRequest>, StoreError> {
        Ok(self.read().requests.get(request_id).cloned())
    }

    async fn payment_requests(&self, order_id: &str) -> Result<Vec<PaymentRequest>, StoreError> {
        let mut requests: Vec<PaymentRequest> = self
            .read()
            .requests
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn set_payment_request_status(
        &self,
        request_id: &str,
        status: PaymentRequestStatus,
        paid_at: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let request = inner
            .requests
            .get_mut(request_id)
            .ok_or(StoreError::PaymentRequestNotFound)?;
        request.status = status;
        request.paid_at = paid_at;
        Ok(())
    }

    async fn pending_orders_without_request(
        &self,
        event_id: &str,
        order_ids: Option<&[String]>,
    ) -> Result<Vec<PendingOrderRow>, StoreError> {
        let inner = self.read();
        let mut rows = Vec::new();
        for order in inner.orders.values() {
            if order.event_id != event_id || order.status != OrderStatus::Pending {
                continue;
            }
            if let Some(wanted) = order_ids {
                if !wanted.contains(&order.id) {
                    continue;
                }
            }
            if inner.has_request(&order.id) {
                continue;
            }
            let buyer = inner
                .users
                .get(&order.user_email)
                .ok_or(StoreError::UserNotFound)?;
            rows.push(PendingOrderRow {
                order: order.clone(),
                buyer: buyer.clone(),
                participants: inner
                    .participants
                    .get(&order.id)
                    .cloned()
                    .unwrap_or_default(),
            });
        }
        rows.sort_by(|a, b| a.order.created_at.cmp(&b.order.created_at));
        Ok(rows)
    }

    async fn mark_tickets_generated(
        &self,
        order_id: &str,
        at: DateTime<Utc>,
        by: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or(StoreError::OrderNotFound)?;
        order.tickets_generated = true;
        order.tickets_generated_at = Some(at);
        order.tickets_generated_by = Some(by.to_string());
        Ok(())
    }

    async fn paid_orders_awaiting_generation(
        &self,
        event_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .read()
            .orders
            .values()
            .filter(|o| {
                o.event_id == event_id && o.status == OrderStatus::Paid && !o.tickets_generated
            })
            .map(|o| o.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn scanned_ticket(
        &self,
        order_id: &str,
        ticket_number: u32,
    ) -> Result<Option<ScannedTicketRow>, StoreError> {
        let inner = self.read();
        let Some(order) = inner.orders.get(order_id) else {
            return Ok(None);
        };
        let Some(participant) = inner
            .participants
            .get(order_id)
            .and_then(|list| list.iter().find(|p| p.ticket_number == ticket_number))
        else {
            return Ok(None);
        };
        let buyer = inner
            .users
            .get(&order.user_email)
            .ok_or(StoreError::UserNotFound)?;
        let event = inner
            .events
            .get(&order.event_id)
            .ok_or(StoreError::EventNotFound)?;
        Ok(Some(ScannedTicketRow {
            participant: participant.clone(),
            order: order.clone(),
            buyer: buyer.clone(),
            event: event.clone(),
        }))
    }

    async fn redeem(
        &self,
        order_id: &str,
        ticket_number: u32,
        operator: &str,
        at: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError> {
        let mut inner = self.write();
        let participant = inner
            .participants
            .get_mut(order_id)
            .and_then(|list| list.iter_mut().find(|p| p.ticket_number == ticket_number))
            .ok_or(StoreError::TicketNotFound)?;
        if participant.redeemed {
            return Ok(RedeemOutcome::AlreadyRedeemed {
                redeemed_at: participant.redeemed_at,
                redeemed_by: participant.redeemed_by.clone(),
            });
        }
        participant.redeemed = true;
        participant.redeemed_at = Some(at);
        participant.redeemed_by = Some(operator.to_string());
        Ok(RedeemOutcome::Redeemed)
    }

    async fn undo_last_redemption(
        &self,
        operator: &str,
    ) -> Result<Option<UndoneRedemption>, StoreError> {
        let mut inner = self.write();
        let mut latest: Option<(String, u32, DateTime<Utc>)> = None;
        for (order_id, list) in &inner.participants {
            for participant in list {
                if !participant.redeemed || participant.redeemed_by.as_deref() != Some(operator) {
                    continue;
                }
                if let Some(at) = participant.redeemed_at {
                    if latest.as_ref().map_or(true, |(_, _, best)| at > *best) {
                        latest = Some((order_id.clone(), participant.ticket_number, at));
                    }
                }
            }
        }
        let Some((order_id, ticket_number, _)) = latest else {
            return Ok(None);
        };
        let participant = inner
            .participants
            .get_mut(&order_id)
            .and_then(|list| list.iter_mut().find(|p| p.ticket_number == ticket_number))
            .ok_or(StoreError::TicketNotFound)?;
        participant.redeemed = false;
        participant.redeemed_at = None;
        participant.redeemed_by = None;
        Ok(Some(UndoneRedemption {
            order_id,
            ticket_number,
            participant_name: participant.name.clone(),
        }))
    }

    async fn correct_birthdate(
        &self,
        order_id: &str,
        ticket_number: u32,
        new_birthdate: NaiveDate,
        correction: BirthdateCorrection,
    ) -> Result<BirthdateAuditRecord, StoreError> {
        let mut inner = self.write();
        let participant = inner
            .participants
            .get_mut(order_id)
            .and_then(|list| list.iter_mut().find(|p| p.ticket_number == ticket_number))
            .ok_or(StoreError::TicketNotFound)?;
        let record = BirthdateAuditRecord {
            id: correction.audit_id,
            order_id: order_id.to_string(),
            ticket_number,
            participant_name: participant.name.clone(),
            old_value: participant.birthdate,
            new_value: new_birthdate,
            reason: correction.reason,
            operator: correction.operator,
            timestamp: correction.timestamp,
        };
        participant.birthdate = Some(new_birthdate);
        inner.audit.push(record.clone());
        Ok(record)
    }

    async fn birthdate_audit(
        &self,
        order_id: &str,
    ) -> Result<Vec<BirthdateAuditRecord>, StoreError> {
        Ok(self
            .read()
            .audit
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn attendance(&self, event_id: Option<&str>) -> Result<Vec<AttendanceRow>, StoreError> {
        let inner = self.read();
        let mut rows = Vec::new();
        for order in inner.orders.values() {
            if order.status != OrderStatus::Paid {
                continue;
            }
            if let Some(event_id) = event_id {
                if order.event_id != event_id {
                    continue;
                }
            }
            if let Some(list) = inner.participants.get(&order.id) {
                for participant in list {
                    rows.push(AttendanceRow {
                        participant: participant.clone(),
                        order_id: order.id.clone(),
                        payment_reference: order.payment_reference.clone(),
                        event_id: order.event_id.clone(),
                    });
                }
            }
        }
        Ok(rows)
    }

    async fn guest_list(&self, event_id: &str) -> Result<Vec<GuestListRow>, StoreError> {
        let inner = self.read();
        let mut rows = Vec::new();
        for order in inner.orders.values() {
            if order.event_id != event_id || order.status != OrderStatus::Paid {
                continue;
            }
            let buyer = inner
                .users
                .get(&order.user_email)
                .ok_or(StoreError::UserNotFound)?;
            if let Some(list) = inner.participants.get(&order.id) {
                for participant in list {
                    rows.push(GuestListRow {
                        participant: participant.clone(),
                        buyer_name: buyer.name.clone(),
                        buyer_email: buyer.email.clone(),
                        payment_reference: order.payment_reference.clone(),
                        order_created_at: order.created_at,
                        total_price: order.total_price,
                    });
                }
            }
        }
        rows.sort_by(|a, b| a.participant.name.cmp(&b.participant.name));
        Ok(rows)
    }
}
