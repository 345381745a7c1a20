use std::sync::Arc;

use serde::Serialize;

use crate::store::{Event, StoreError, TicketStore, TicketTier};

// ============================================================================
// Availability Calculator
// ============================================================================
//
// Computes remaining capacity at event, tier and per-user granularity.
// Pending orders are reservations and count as sold, so capacity cannot be
// given away twice during the payment window. Read-only; the order service
// calls this under its per-event lock immediately before creating an order.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityQuote {
    /// Paid + pending tickets for the event.
    pub event_sold: u32,
    /// Paid + pending tickets bound to the selected tier, when one is.
    pub tier_sold: Option<u32>,
    /// The user's own paid + pending tickets for the event.
    pub user_current: u32,
    /// Effective per-user limit: override, then event, then global default.
    /// Exactly 0 means the user is excluded from purchasing.
    pub user_limit: u32,
    /// Effective price per ticket. An explicitly selected tier wins;
    /// otherwise a user override beats the event default.
    pub ticket_price: f64,
    pub max_tickets_event: u32,
    pub available_event: u32,
    pub available_user: u32,
    /// min(event remaining, user remaining), floored at 0.
    pub max_order: u32,
}

impl AvailabilityQuote {
    pub fn user_blocked(&self) -> bool {
        self.user_limit == 0
    }
}

#[derive(Clone)]
pub struct AvailabilityCalculator {
    store: Arc<dyn TicketStore>,
    default_user_limit: u32,
}

impl AvailabilityCalculator {
    pub fn new(store: Arc<dyn TicketStore>, default_user_limit: u32) -> Self {
        Self {
            store,
            default_user_limit,
        }
    }

    pub async fn quote(
        &self,
        event: &Event,
        tier: Option<&TicketTier>,
        user_email: &str,
    ) -> Result<AvailabilityQuote, StoreError> {
        let event_sold = self.store.event_tickets_reserved(&event.id).await?;
        let user_current = self
            .store
            .user_tickets_reserved(user_email, &event.id)
            .await?;

        let tier_sold = match tier {
            Some(tier) => Some(
                self.store
                    .tier_tickets_reserved(&event.id, &tier.id)
                    .await?,
            ),
            None => None,
        };

        let override_row = self.store.event_override(user_email, &event.id).await?;

        let user_limit = override_row
            .as_ref()
            .and_then(|o| o.ticket_limit)
            .or(event.max_tickets_per_user)
            .unwrap_or(self.default_user_limit);

        let ticket_price = match tier {
            Some(tier) => tier.price,
            None => override_row
                .as_ref()
                .and_then(|o| o.ticket_price)
                .unwrap_or(event.ticket_price),
        };

        let available_event = event.max_tickets.saturating_sub(event_sold);
        let available_user = user_limit.saturating_sub(user_current);

        Ok(AvailabilityQuote {
            event_sold,
            tier_sold,
            user_current,
            user_limit,
            ticket_price,
            max_tickets_event: event.max_tickets,
            available_event,
            available_user,
            max_order: available_event.min(available_user),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        EventOverride, MemoryStore, OrderStatus, Participant, TicketOrder, Visibility,
    };
    use chrono::Utc;

    fn event(max_tickets: u32, per_user: Option<u32>) -> Event {
        Event {
            id: "ev1".to_string(),
            name: "Abiball 2026".to_string(),
            year: 2026,
            location: None,
            visibility: Visibility::Public,
            password: None,
            max_tickets,
            ticket_price: 45.0,
            start_datetime: None,
            ticket_sale_start: None,
            ticket_sale_end: None,
            max_tickets_per_user: per_user,
            ticket_generation_enabled: true,
            active: true,
        }
    }

    async fn seed_order(store: &MemoryStore, id: &str, email: &str, count: u32, status: OrderStatus) {
        let participants: Vec<Participant> = (1..=count)
            .map(|n| Participant::new(format!("P{n}"), String::new(), String::new(), None, n))
            .collect();
        store
            .insert_order(
                TicketOrder {
                    id: id.to_string(),
                    user_email: email.to_string(),
                    event_id: "ev1".to_string(),
                    tier_id: None,
                    tier_name: "Standard".to_string(),
                    ticket_count: count,
                    total_price: 45.0 * count as f64,
                    individual_ticket_price: 45.0,
                    payment_reference: format!("{}X", id.to_uppercase()),
                    status,
                    created_at: Utc::now(),
                    paid_at: None,
                    tickets_generated: false,
                    tickets_generated_at: None,
                    tickets_generated_by: None,
                },
                participants,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pending_orders_count_as_sold() {
        let store = Arc::new(MemoryStore::new());
        let ev = event(10, None);
        store.insert_event(ev.clone());
        seed_order(&store, "o1", "a@x.de", 4, OrderStatus::Paid).await;
        seed_order(&store, "o2", "b@x.de", 5, OrderStatus::Pending).await;
        seed_order(&store, "o3", "c@x.de", 2, OrderStatus::Cancelled).await;

        let calc = AvailabilityCalculator::new(store, 10);
        let quote = calc.quote(&ev, None, "d@x.de").await.unwrap();
        assert_eq!(quote.event_sold, 9);
        assert_eq!(quote.available_event, 1);
        assert_eq!(quote.max_order, 1);
    }

    #[tokio::test]
    async fn test_limit_resolution_override_beats_event_beats_default() {
        let store = Arc::new(MemoryStore::new());
        let ev = event(100, Some(4));
        store.insert_event(ev.clone());
        store.set_event_override(
            "vip@x.de",
            "ev1",
            EventOverride {
                ticket_price: Some(30.0),
                ticket_limit: Some(8),
            },
        );

        let calc = AvailabilityCalculator::new(store, 10);

        let quote = calc.quote(&ev, None, "vip@x.de").await.unwrap();
        assert_eq!(quote.user_limit, 8);
        assert_eq!(quote.ticket_price, 30.0);

        let quote = calc.quote(&ev, None, "plain@x.de").await.unwrap();
        assert_eq!(quote.user_limit, 4);
        assert_eq!(quote.ticket_price, 45.0);
    }

    #[tokio::test]
    async fn test_zero_limit_is_a_hard_block() {
        let store = Arc::new(MemoryStore::new());
        let ev = event(100, None);
        store.insert_event(ev.clone());
        store.set_event_override(
            "blocked@x.de",
            "ev1",
            EventOverride {
                ticket_price: None,
                ticket_limit: Some(0),
            },
        );

        let calc = AvailabilityCalculator::new(store, 10);
        let quote = calc.quote(&ev, None, "blocked@x.de").await.unwrap();
        assert!(quote.user_blocked());
        assert_eq!(quote.max_order, 0);
    }

    #[tokio::test]
    async fn test_tier_price_wins_over_override() {
        let store = Arc::new(MemoryStore::new());
        let ev = event(100, None);
        store.insert_event(ev.clone());
        store.set_event_override(
            "vip@x.de",
            "ev1",
            EventOverride {
                ticket_price: Some(30.0),
                ticket_limit: None,
            },
        );
        let tier = TicketTier {
            id: "t1".to_string(),
            event_id: "ev1".to_string(),
            name: "VIP".to_string(),
            price: 80.0,
            max_tickets: Some(20),
        };
        store.insert_tier(tier.clone());

        let calc = AvailabilityCalculator::new(store, 10);
        let quote = calc.quote(&ev, Some(&tier), "vip@x.de").await.unwrap();
        assert_eq!(quote.ticket_price, 80.0);
        assert_eq!(quote.tier_sold, Some(0));
    }
}
