use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;

use crate::auth::{AuthContext, Permission};
use crate::documents::{order_summary_document, TableDocument};
use crate::domain::availability::{AvailabilityCalculator, AvailabilityQuote};
use crate::domain::payments::PaymentRequestView;
use crate::metrics::Metrics;
use crate::notify::{content, Notifier};
use crate::store::{
    Event, OrderStatus, OrderUpdate, OrderWithBuyer, Participant, PaymentErrorRecord,
    PaymentRequest, PaymentRequestStatus, StoreError, TicketOrder, TicketStore, TicketTier,
    UserContactUpdate, Visibility,
};
use crate::util::{dates, ids};

use super::commands::{
    CreateOrderRequest, CreatedOrder, OrderDetail, OrderStatistics, OrderView, UpdateOrderRequest,
};
use super::errors::OrderError;

// ============================================================================
// Order Lifecycle Manager
// ============================================================================
//
// Validates and creates orders, flips their status, and keeps the
// reconciliation trail for unmatched payments.
//
// Order creation is the hot race in this system: two concurrent purchases
// could each validate against a capacity neither alone exceeds. All of
// read-validate-write runs under a per-event async mutex, so creation is
// single-writer per event and the cap cannot be jointly overshot.
//
// ============================================================================

pub struct OrderService {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    availability: AvailabilityCalculator,
    max_tickets_global: u32,
    event_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        default_user_limit: u32,
        max_tickets_global: u32,
    ) -> Self {
        let availability = AvailabilityCalculator::new(store.clone(), default_user_limit);
        Self {
            store,
            notifier,
            metrics,
            availability,
            max_tickets_global,
            event_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// The serialization point for order creation on one event.
    fn event_lock(&self, event_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .event_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(event_id.to_string()).or_default().clone()
    }

    fn check_event_access(&self, ctx: &AuthContext, event: &Event) -> Result<(), OrderError> {
        match event.visibility {
            Visibility::Public => Ok(()),
            Visibility::Private => {
                if ctx.has(Permission::CreateEvents) || ctx.has(Permission::Admin) {
                    Ok(())
                } else {
                    Err(OrderError::AccessDenied)
                }
            }
            Visibility::PasswordProtected => {
                if ctx.event_access.contains(&event.id) {
                    Ok(())
                } else {
                    Err(OrderError::PasswordRequired)
                }
            }
        }
    }

    // --- creation -----------------------------------------------------------

    pub async fn create_order(
        &self,
        ctx: &AuthContext,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, OrderError> {
        let started = Instant::now();
        match self.create_order_inner(ctx, request).await {
            Ok(created) => {
                self.metrics
                    .record_order_created(started.elapsed().as_secs_f64());
                Ok(created)
            }
            Err(error) => {
                self.metrics.record_order_rejected(error.reason_label());
                Err(error)
            }
        }
    }

    async fn create_order_inner(
        &self,
        ctx: &AuthContext,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, OrderError> {
        ctx.require(Permission::BuyTickets)?;

        let lock = self.event_lock(&request.event_id);
        let _guard = lock.lock().await;

        let event = self
            .store
            .active_event(&request.event_id)
            .await?
            .ok_or(OrderError::EventNotFound)?;

        if !event.ticket_generation_enabled {
            return Err(OrderError::SalesDisabled);
        }

        let now = Utc::now();
        if let Some(opens_at) = event.ticket_sale_start {
            if now < opens_at {
                return Err(OrderError::SaleNotStarted { opens_at });
            }
        }
        if let Some(closed_at) = event.ticket_sale_end {
            if now > closed_at {
                return Err(OrderError::SaleEnded { closed_at });
            }
        }

        self.check_event_access(ctx, &event)?;

        let buyer = self
            .store
            .user_by_email(&ctx.email)
            .await?
            .ok_or(OrderError::Store(StoreError::UserNotFound))?;
        if !buyer.email_verified {
            return Err(OrderError::EmailNotVerified);
        }

        let tier = self.resolve_tier(&event, request.tier_id.as_deref()).await?;

        let quote = self
            .availability
            .quote(&event, tier.as_ref(), &ctx.email)
            .await?;

        if quote.event_sold + request.ticket_count > event.max_tickets {
            return Err(OrderError::EventCapacityExceeded);
        }
        if let Some(tier) = &tier {
            if let Some(tier_max) = tier.max_tickets {
                if quote.tier_sold.unwrap_or(0) + request.ticket_count > tier_max {
                    return Err(OrderError::TierCapacityExceeded {
                        tier: tier.name.clone(),
                    });
                }
            }
        }

        if quote.user_blocked() {
            return Err(OrderError::PurchaseBlocked);
        }
        if quote.user_current + request.ticket_count > quote.user_limit {
            return Err(OrderError::UserLimitExceeded {
                limit: quote.user_limit,
            });
        }

        let reference_date = dates::reference_date(event.start_datetime, now.date_naive());
        let participants =
            validate_participants(&request.participants, request.ticket_count, reference_date)?;

        let order_count = self
            .store
            .user_order_count(&ctx.email, &event.id)
            .await?
            + 1;
        let payment_reference =
            format!("{}{:03}", ctx.reference_tag(), order_count).to_uppercase();

        let total_price = quote.ticket_price * request.ticket_count as f64;
        let order = TicketOrder {
            id: ids::order_id(),
            user_email: ctx.email.clone(),
            event_id: event.id.clone(),
            tier_id: tier.as_ref().map(|t| t.id.clone()),
            tier_name: tier
                .as_ref()
                .map(|t| t.name.clone())
                .unwrap_or_else(|| "Standard".to_string()),
            ticket_count: request.ticket_count,
            total_price,
            individual_ticket_price: quote.ticket_price,
            payment_reference: payment_reference.clone(),
            status: OrderStatus::Pending,
            created_at: now,
            paid_at: None,
            tickets_generated: false,
            tickets_generated_at: None,
            tickets_generated_by: None,
        };
        let order_id = order.id.clone();

        self.store
            .insert_order(order, participants.clone())
            .await?;

        tracing::info!(
            order_id = %order_id,
            user = %ctx.email,
            event_id = %event.id,
            tickets = request.ticket_count,
            total = total_price,
            "Order created"
        );

        // The order is committed; the confirmation mail is best-effort and
        // carries no payment details. Those follow with the payment request.
        let mail = content::order_received(
            &buyer.email,
            &buyer.name,
            &event,
            &payment_reference,
            &participants,
            total_price,
        );
        if let Err(error) = self.notifier.send(mail).await {
            self.metrics.record_notification_failure();
            tracing::warn!(order_id = %order_id, error = %error, "Order confirmation mail failed");
        }

        Ok(CreatedOrder {
            order_id,
            payment_reference,
            total_price,
            ticket_count: request.ticket_count,
        })
    }

    async fn resolve_tier(
        &self,
        event: &Event,
        tier_id: Option<&str>,
    ) -> Result<Option<TicketTier>, OrderError> {
        match tier_id {
            None | Some("default") => Ok(None),
            Some(tier_id) => Ok(Some(
                self.store
                    .tier(&event.id, tier_id)
                    .await?
                    .ok_or(OrderError::TierNotFound)?,
            )),
        }
    }

    /// Availability quote for the calling user, as shown on the order form.
    pub async fn ticket_limits(
        &self,
        ctx: &AuthContext,
        event_id: &str,
    ) -> Result<AvailabilityQuote, OrderError> {
        ctx.require(Permission::BuyTickets)?;

        let event = self
            .store
            .active_event(event_id)
            .await?
            .ok_or(OrderError::EventNotFound)?;
        self.check_event_access(ctx, &event)?;

        let quote = self.availability.quote(&event, None, &ctx.email).await?;
        if quote.user_blocked() {
            return Err(OrderError::PurchaseBlocked);
        }
        Ok(quote)
    }

    // --- status flips -------------------------------------------------------

    pub async fn mark_paid(&self, ctx: &AuthContext, order_id: &str) -> Result<(), OrderError> {
        ctx.require(Permission::ManageOrders)?;
        self.store
            .order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        self.set_paid(order_id).await?;
        tracing::info!(order_id = %order_id, "Order marked paid");
        Ok(())
    }

    pub async fn mark_unpaid(&self, ctx: &AuthContext, order_id: &str) -> Result<(), OrderError> {
        ctx.require(Permission::ManageOrders)?;
        self.store
            .order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        self.store
            .set_order_status(order_id, OrderStatus::Pending, None)
            .await?;
        if let Some(latest) = self.latest_request(order_id).await? {
            self.store
                .set_payment_request_status(&latest.id, PaymentRequestStatus::Sent, None)
                .await?;
        }
        tracing::info!(order_id = %order_id, "Order marked unpaid");
        Ok(())
    }

    /// Match an incoming bank transfer to an order by its reference and mark
    /// it paid. References are compared case-insensitively with surrounding
    /// whitespace stripped, because they arrive typed off bank statements.
    pub async fn quick_mark_paid(
        &self,
        ctx: &AuthContext,
        reference: &str,
    ) -> Result<String, OrderError> {
        ctx.require(Permission::ManageOrders)?;

        let normalized = reference.trim().to_uppercase();
        let order = self
            .store
            .order_by_reference(&normalized)
            .await?
            .ok_or_else(|| OrderError::ReferenceNotFound {
                reference: normalized.clone(),
            })?;

        self.set_paid(&order.id).await?;
        tracing::info!(order_id = %order.id, reference = %normalized, "Order marked paid via quick payment");
        Ok(order.id)
    }

    async fn set_paid(&self, order_id: &str) -> Result<(), OrderError> {
        let today = Utc::now().date_naive();
        self.store
            .set_order_status(order_id, OrderStatus::Paid, Some(today))
            .await?;
        if let Some(latest) = self.latest_request(order_id).await? {
            self.store
                .set_payment_request_status(&latest.id, PaymentRequestStatus::Paid, Some(today))
                .await?;
        }
        Ok(())
    }

    async fn latest_request(&self, order_id: &str) -> Result<Option<PaymentRequest>, OrderError> {
        Ok(self
            .store
            .payment_requests(order_id)
            .await?
            .into_iter()
            .next())
    }

    pub async fn search_by_reference(
        &self,
        ctx: &AuthContext,
        reference: &str,
    ) -> Result<OrderWithBuyer, OrderError> {
        ctx.require(Permission::ManageOrders)?;

        let normalized = reference.trim().to_uppercase();
        let order = self
            .store
            .order_by_reference(&normalized)
            .await?
            .ok_or_else(|| OrderError::ReferenceNotFound {
                reference: normalized.clone(),
            })?;
        self.store
            .order_with_buyer(&order.id)
            .await?
            .ok_or(OrderError::OrderNotFound)
    }

    /// Record an incoming transfer whose reference matched nothing. The
    /// money arrived either way; the record keeps it visible for
    /// reconciliation instead of silently dropping it.
    pub async fn record_payment_error(
        &self,
        ctx: &AuthContext,
        reference: &str,
    ) -> Result<PaymentErrorRecord, OrderError> {
        ctx.require(Permission::ManageOrders)?;

        let record = PaymentErrorRecord {
            id: ids::order_id(),
            payment_reference: reference.trim().to_uppercase(),
            reason: "payment reference did not match any order".to_string(),
            created_at: Utc::now(),
            recorded_by: ctx.email.clone(),
        };
        self.store.insert_payment_error(record.clone()).await?;
        tracing::warn!(reference = %record.payment_reference, "Unmatched incoming payment recorded");
        Ok(record)
    }

    // --- admin update & delete ----------------------------------------------

    pub async fn update_order(
        &self,
        ctx: &AuthContext,
        request: UpdateOrderRequest,
    ) -> Result<(), OrderError> {
        ctx.require(Permission::ManageOrders)?;

        let order = self
            .store
            .order(&request.order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        self.store
            .update_order(OrderUpdate {
                order_id: request.order_id.clone(),
                ticket_count: request.ticket_count,
                total_price: request.total_price,
                payment_reference: request.payment_reference.clone(),
                status: request.status,
            })
            .await?;

        let contact = UserContactUpdate {
            name: request.user_name,
            email: request.user_email,
            address: request.user_address,
            phone: request.user_phone,
        };
        if !contact.is_empty() {
            self.store
                .update_user_contact(&order.user_email, contact)
                .await?;
        }

        if !request.participants.is_empty() {
            let event = self.store.active_event(&order.event_id).await?;
            let reference_date = dates::reference_date(
                event.and_then(|e| e.start_datetime),
                Utc::now().date_naive(),
            );

            // Wholesale replacement: entries without a name are dropped and
            // ticket numbers are reassigned from 1.
            let mut participants = Vec::new();
            for input in request
                .participants
                .iter()
                .filter(|p| !p.name.trim().is_empty())
            {
                let birthdate = match input.birthdate.as_deref() {
                    None => None,
                    Some(raw) if raw.trim().is_empty() => None,
                    Some(raw) => Some(dates::parse_birthdate(raw, reference_date).map_err(
                        |source| OrderError::ParticipantBirthdateInvalid {
                            index: participants.len() + 1,
                            source,
                        },
                    )?),
                };
                participants.push(Participant::new(
                    input.name.clone(),
                    input.phone.clone().unwrap_or_default(),
                    input.email.clone().unwrap_or_default(),
                    birthdate,
                    participants.len() as u32 + 1,
                ));
            }
            self.store
                .replace_participants(&request.order_id, participants)
                .await?;
        }

        tracing::info!(order_id = %request.order_id, "Order updated");
        Ok(())
    }

    pub async fn delete_order(&self, ctx: &AuthContext, order_id: &str) -> Result<(), OrderError> {
        ctx.require(Permission::ManageOrders)?;
        self.store
            .order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        self.store.delete_order(order_id).await?;
        tracing::info!(order_id = %order_id, "Order deleted");
        Ok(())
    }

    // --- views & statistics -------------------------------------------------

    pub async fn my_tickets(&self, ctx: &AuthContext) -> Result<Vec<OrderView>, OrderError> {
        ctx.require(Permission::BuyTickets)?;

        let mut views = Vec::new();
        for order in self.store.orders_for_user(&ctx.email).await? {
            let event_name = self
                .store
                .active_event(&order.event_id)
                .await?
                .map(|e| e.name)
                .unwrap_or_default();
            let participants = self.store.participants(&order.id).await?;
            let latest_payment_request = match self.latest_request(&order.id).await? {
                Some(request) => Some(self.request_view(request).await?),
                None => None,
            };
            views.push(OrderView {
                order,
                event_name,
                participants,
                latest_payment_request,
            });
        }
        Ok(views)
    }

    pub async fn order_detail(
        &self,
        ctx: &AuthContext,
        order_id: &str,
    ) -> Result<OrderDetail, OrderError> {
        ctx.require(Permission::ViewUsers)?;
        let row = self
            .store
            .order_with_buyer(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;
        self.build_detail(row).await
    }

    pub async fn all_orders(&self, ctx: &AuthContext) -> Result<Vec<OrderDetail>, OrderError> {
        ctx.require(Permission::ViewUsers)?;
        let mut details = Vec::new();
        for row in self.store.orders_for_event(None).await? {
            details.push(self.build_detail(row).await?);
        }
        Ok(details)
    }

    async fn build_detail(&self, row: OrderWithBuyer) -> Result<OrderDetail, OrderError> {
        let event_name = self
            .store
            .active_event(&row.order.event_id)
            .await?
            .map(|e| e.name)
            .unwrap_or_default();
        let participants = self.store.participants(&row.order.id).await?;
        let mut payment_requests = Vec::new();
        for request in self.store.payment_requests(&row.order.id).await? {
            payment_requests.push(self.request_view(request).await?);
        }
        Ok(OrderDetail {
            order: row.order,
            buyer: row.buyer,
            event_name,
            participants,
            payment_requests,
        })
    }

    async fn request_view(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentRequestView, OrderError> {
        let account = self.store.bank_account(&request.bank_account_id).await?;
        Ok(PaymentRequestView { request, account })
    }

    pub async fn statistics(
        &self,
        ctx: &AuthContext,
        event_id: Option<&str>,
    ) -> Result<OrderStatistics, OrderError> {
        ctx.require(Permission::ViewUsers)?;

        let max_tickets = match event_id {
            Some(event_id) => {
                self.store
                    .active_event(event_id)
                    .await?
                    .ok_or(OrderError::EventNotFound)?
                    .max_tickets
            }
            None => self.max_tickets_global,
        };

        let rows = self.store.orders_for_event(event_id).await?;
        let mut stats = OrderStatistics {
            total_tickets_sold: 0,
            tickets_paid: 0,
            tickets_reserved: 0,
            tickets_available: 0,
            paid_orders: 0,
            pending_orders: 0,
            revenue_total: 0.0,
            total_participants: 0,
        };
        for row in &rows {
            match row.order.status {
                OrderStatus::Paid => {
                    stats.tickets_paid += row.order.ticket_count;
                    stats.paid_orders += 1;
                    stats.revenue_total += row.order.total_price;
                }
                OrderStatus::Pending => {
                    stats.tickets_reserved += row.order.ticket_count;
                    stats.pending_orders += 1;
                }
                _ => {}
            }
        }
        stats.total_tickets_sold = stats.tickets_paid + stats.tickets_reserved;
        stats.tickets_available = max_tickets as i64 - stats.total_tickets_sold as i64;
        stats.revenue_total = (stats.revenue_total * 100.0).round() / 100.0;
        stats.total_participants = self.store.participant_count(event_id).await?;
        Ok(stats)
    }

    /// Structured order overview for the document renderer.
    pub async fn order_summary(&self, ctx: &AuthContext) -> Result<TableDocument, OrderError> {
        ctx.require(Permission::ViewUsers)?;
        let rows = self.store.orders_for_event(None).await?;
        Ok(order_summary_document("Ticket Orders", &rows))
    }
}

/// Validate the participant list of a new order and turn it into store rows.
fn validate_participants(
    inputs: &[super::commands::ParticipantInput],
    ticket_count: u32,
    reference_date: chrono::NaiveDate,
) -> Result<Vec<Participant>, OrderError> {
    if inputs.is_empty() {
        return Err(OrderError::MissingParticipants);
    }
    if inputs.len() != ticket_count as usize {
        return Err(OrderError::ParticipantCountMismatch);
    }

    let mut participants = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        if input.name.trim().is_empty() {
            return Err(OrderError::ParticipantNameMissing { index: index + 1 });
        }
        let birthdate = dates::parse_birthdate(
            input.birthdate.as_deref().unwrap_or(""),
            reference_date,
        )
        .map_err(|source| OrderError::ParticipantBirthdateInvalid {
            index: index + 1,
            source,
        })?;
        participants.push(Participant::new(
            input.name.clone(),
            input.phone.clone().unwrap_or_default(),
            input.email.clone().unwrap_or_default(),
            Some(birthdate),
            index as u32 + 1,
        ));
    }
    Ok(participants)
}
