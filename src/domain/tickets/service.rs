use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::auth::{AuthContext, Permission};
use crate::documents::{guest_list_document, TableDocument, TicketDocument};
use crate::metrics::Metrics;
use crate::store::{
    BirthdateCorrection, OrderStatus, RedeemOutcome, ScannedTicketRow, TicketStore,
    UndoneRedemption,
};
use crate::util::dates::{self, AgeCategory};
use crate::util::ids;

use super::errors::TicketError;
use super::security::{new_security_id, verification_hash, ScannedQr, TicketQrPayload};
use super::stats::{live_list, live_stats, LiveList, LiveStats};

// ============================================================================
// Ticket Issuance & Redemption Engine
// ============================================================================
//
// Issuance is a one-way, human-approved gate: an order must be paid before
// tickets are generated, and generation can happen once. Redemption is an
// atomic check-and-set in the store, so two scanners racing on the same
// ticket cannot both check it in. Undo is single-step and scoped to the
// operator who redeemed.
//
// ============================================================================

/// What the scanner shows about a ticket, whatever the scan outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    pub order_id: String,
    pub ticket_number: u32,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub birthdate: Option<NaiveDate>,
    pub order_status: OrderStatus,
    pub payment_reference: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub age_category: Option<AgeCategory>,
}

impl TicketDetails {
    fn from_row(row: &ScannedTicketRow) -> Self {
        let reference_date =
            dates::reference_date(row.event.start_datetime, Utc::now().date_naive());
        Self {
            order_id: row.order.id.clone(),
            ticket_number: row.participant.ticket_number,
            name: row.participant.name.clone(),
            phone: row.participant.phone.clone(),
            email: row.participant.email.clone(),
            birthdate: row.participant.birthdate,
            order_status: row.order.status,
            payment_reference: row.order.payment_reference.clone(),
            buyer_name: row.buyer.name.clone(),
            buyer_email: row.buyer.email.clone(),
            age_category: row
                .participant
                .birthdate
                .map(|b| dates::age_category(b, reference_date)),
        }
    }
}

/// Result of one scan. Invalid carries the reason (and the ticket when it
/// was found); already-redeemed is a valid, informative outcome, not an
/// error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Invalid {
        reason: String,
        ticket: Option<TicketDetails>,
    },
    Valid {
        ticket: TicketDetails,
    },
    AlreadyRedeemed {
        ticket: TicketDetails,
        redeemed_at: Option<chrono::DateTime<Utc>>,
        redeemed_by: Option<String>,
    },
    Redeemed {
        ticket: TicketDetails,
    },
}

impl ScanOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ScanOutcome::Invalid { .. } => "invalid",
            ScanOutcome::Valid { .. } => "valid",
            ScanOutcome::AlreadyRedeemed { .. } => "already_redeemed",
            ScanOutcome::Redeemed { .. } => "redeemed",
        }
    }

    fn invalid(reason: &str) -> Self {
        ScanOutcome::Invalid {
            reason: reason.to_string(),
            ticket: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationStatus {
    pub can_generate: bool,
    pub order_status: OrderStatus,
    pub tickets_generated: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkGenerateOutcome {
    pub generated: u32,
    pub errors: Vec<BulkGenerateError>,
}

#[derive(Debug, Serialize)]
pub struct BulkGenerateError {
    pub order_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionResult {
    pub audit_id: String,
    pub old_birthdate: Option<NaiveDate>,
    pub new_birthdate: NaiveDate,
    pub age_category: AgeCategory,
}

pub struct TicketService {
    store: Arc<dyn TicketStore>,
    metrics: Arc<Metrics>,
    allow_user_ticket_download: bool,
}

impl TicketService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        metrics: Arc<Metrics>,
        allow_user_ticket_download: bool,
    ) -> Self {
        Self {
            store,
            metrics,
            allow_user_ticket_download,
        }
    }

    // --- issuance -----------------------------------------------------------

    /// Release the tickets of a paid order. One-way and idempotent in the
    /// rejecting sense: a second call is an explicit error, never a
    /// re-generation.
    pub async fn generate(&self, ctx: &AuthContext, order_id: &str) -> Result<(), TicketError> {
        ctx.require(Permission::ManageOrders)?;

        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(TicketError::OrderNotFound)?;
        if order.status != OrderStatus::Paid {
            return Err(TicketError::OrderNotPaid);
        }
        if order.tickets_generated {
            return Err(TicketError::AlreadyGenerated);
        }

        self.store
            .mark_tickets_generated(order_id, Utc::now(), &ctx.email)
            .await?;
        self.metrics.tickets_generated.inc();
        tracing::info!(order_id = %order_id, by = %ctx.email, "Tickets generated");
        Ok(())
    }

    pub async fn generation_status(
        &self,
        ctx: &AuthContext,
        order_id: &str,
    ) -> Result<GenerationStatus, TicketError> {
        ctx.require(Permission::ManageOrders)?;

        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(TicketError::OrderNotFound)?;
        Ok(GenerationStatus {
            can_generate: order.status == OrderStatus::Paid && !order.tickets_generated,
            order_status: order.status,
            tickets_generated: order.tickets_generated,
        })
    }

    /// Generate tickets for every eligible paid order of an event. A single
    /// failure never aborts the rest of the batch.
    pub async fn bulk_generate(
        &self,
        ctx: &AuthContext,
        event_id: &str,
    ) -> Result<BulkGenerateOutcome, TicketError> {
        ctx.require(Permission::ManageOrders)?;

        self.store
            .active_event(event_id)
            .await?
            .ok_or(TicketError::EventNotFound)?;

        let mut outcome = BulkGenerateOutcome {
            generated: 0,
            errors: Vec::new(),
        };
        for order_id in self.store.paid_orders_awaiting_generation(event_id).await? {
            match self
                .store
                .mark_tickets_generated(&order_id, Utc::now(), &ctx.email)
                .await
            {
                Ok(()) => {
                    self.metrics.tickets_generated.inc();
                    outcome.generated += 1;
                }
                Err(error) => {
                    tracing::error!(order_id = %order_id, error = %error, "Ticket generation failed, continuing batch");
                    outcome.errors.push(BulkGenerateError {
                        order_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(event_id = %event_id, generated = outcome.generated, "Bulk ticket generation finished");
        Ok(outcome)
    }

    /// The per-ticket document with a freshly generated QR payload.
    /// Available to the order's owner (when downloads are enabled) and to
    /// order managers.
    pub async fn ticket_document(
        &self,
        ctx: &AuthContext,
        order_id: &str,
        ticket_number: u32,
    ) -> Result<TicketDocument, TicketError> {
        let row = self
            .store
            .scanned_ticket(order_id, ticket_number)
            .await?
            .ok_or(TicketError::TicketNotFound)?;

        let is_admin = ctx.has(Permission::ManageOrders);
        if !is_admin && row.order.user_email != ctx.email {
            return Err(TicketError::Permission(crate::auth::PermissionDenied));
        }
        if !is_admin && !self.allow_user_ticket_download {
            return Err(TicketError::DownloadDisabled);
        }
        if row.order.status != OrderStatus::Paid {
            return Err(TicketError::OrderNotPaid);
        }
        if !row.order.tickets_generated {
            return Err(TicketError::NotGenerated);
        }

        // A fresh security id per render: reprints stay valid, and the
        // payload verifies against a recomputed hash, not a stored one.
        let security_id = new_security_id(&mut rand::thread_rng());
        let payload = TicketQrPayload::new(
            &row.order.id,
            ticket_number,
            &row.participant.name,
            &row.event.name,
            security_id.clone(),
        );

        let details = TicketDetails::from_row(&row);
        Ok(TicketDocument {
            event_name: row.event.name.clone(),
            payment_reference: row.order.payment_reference.clone(),
            ticket_number,
            participant_name: row.participant.name.clone(),
            participant_phone: row.participant.phone.clone(),
            participant_email: row.participant.email.clone(),
            age_category: details.age_category,
            security_id,
            qr_payload: payload.to_json(),
        })
    }

    // --- scanning & redemption ----------------------------------------------

    /// Verify a raw scanned QR string. With `auto_redeem` a valid ticket is
    /// checked in atomically in the same call.
    pub async fn scan(
        &self,
        ctx: &AuthContext,
        raw_qr: &str,
        auto_redeem: bool,
    ) -> Result<ScanOutcome, TicketError> {
        ctx.require(Permission::ManageOrders)?;

        let outcome = self.scan_inner(ctx, raw_qr, auto_redeem).await?;
        self.metrics.record_scan(outcome.label());
        if matches!(outcome, ScanOutcome::Redeemed { .. }) {
            self.metrics.redemptions_total.inc();
        }
        Ok(outcome)
    }

    async fn scan_inner(
        &self,
        ctx: &AuthContext,
        raw_qr: &str,
        auto_redeem: bool,
    ) -> Result<ScanOutcome, TicketError> {
        let Ok(qr) = serde_json::from_str::<ScannedQr>(raw_qr) else {
            return Ok(ScanOutcome::invalid("QR code does not contain valid JSON"));
        };

        let (Some(order_id), Some(ticket_number), Some(security_id), Some(hash)) = (
            qr.order_id,
            qr.ticket_number,
            qr.security_id,
            qr.verification_hash,
        ) else {
            return Ok(ScanOutcome::invalid("QR code is missing required fields"));
        };

        // The hash is recomputed from the scanned fields themselves; only
        // order_id, ticket_number and security_id are covered by it.
        let expected = verification_hash(&order_id, ticket_number, &security_id);
        if hash != expected {
            return Ok(ScanOutcome::invalid("QR code verification failed"));
        }

        let Some(row) = self.store.scanned_ticket(&order_id, ticket_number).await? else {
            return Ok(ScanOutcome::invalid("ticket not found"));
        };
        let ticket = TicketDetails::from_row(&row);

        if row.order.status != OrderStatus::Paid {
            return Ok(ScanOutcome::Invalid {
                reason: "order is not paid".to_string(),
                ticket: Some(ticket),
            });
        }

        if row.participant.redeemed {
            return Ok(ScanOutcome::AlreadyRedeemed {
                ticket,
                redeemed_at: row.participant.redeemed_at,
                redeemed_by: row.participant.redeemed_by,
            });
        }

        if auto_redeem {
            // The check-and-set decides; a racing scanner that got here
            // first turns this into an already-redeemed outcome.
            match self
                .store
                .redeem(&order_id, ticket_number, &ctx.email, Utc::now())
                .await?
            {
                RedeemOutcome::Redeemed => {
                    tracing::info!(order_id = %order_id, ticket_number, "Ticket redeemed via scan");
                    Ok(ScanOutcome::Redeemed { ticket })
                }
                RedeemOutcome::AlreadyRedeemed {
                    redeemed_at,
                    redeemed_by,
                } => Ok(ScanOutcome::AlreadyRedeemed {
                    ticket,
                    redeemed_at,
                    redeemed_by,
                }),
            }
        } else {
            Ok(ScanOutcome::Valid { ticket })
        }
    }

    /// Manual check-in without a scanned code (fallback UI). Same atomic
    /// guard as the scan path.
    pub async fn redeem(
        &self,
        ctx: &AuthContext,
        order_id: &str,
        ticket_number: u32,
    ) -> Result<(), TicketError> {
        ctx.require(Permission::ManageOrders)?;

        let row = self
            .store
            .scanned_ticket(order_id, ticket_number)
            .await?
            .ok_or(TicketError::TicketNotFound)?;
        if row.order.status != OrderStatus::Paid {
            return Err(TicketError::OrderNotPaid);
        }

        match self
            .store
            .redeem(order_id, ticket_number, &ctx.email, Utc::now())
            .await?
        {
            RedeemOutcome::Redeemed => {
                self.metrics.redemptions_total.inc();
                tracing::info!(order_id = %order_id, ticket_number, "Ticket redeemed manually");
                Ok(())
            }
            RedeemOutcome::AlreadyRedeemed {
                redeemed_at,
                redeemed_by,
            } => Err(TicketError::AlreadyRedeemed {
                redeemed_at,
                redeemed_by,
            }),
        }
    }

    /// Revert the calling operator's most recent redemption. Single-step,
    /// operator-scoped; there is no deeper undo history.
    pub async fn undo_last_redemption(
        &self,
        ctx: &AuthContext,
    ) -> Result<UndoneRedemption, TicketError> {
        ctx.require(Permission::ManageOrders)?;

        let undone = self
            .store
            .undo_last_redemption(&ctx.email)
            .await?
            .ok_or(TicketError::NothingToUndo)?;
        self.metrics.redemption_undos.inc();
        tracing::info!(
            order_id = %undone.order_id,
            ticket_number = undone.ticket_number,
            "Redemption undone"
        );
        Ok(undone)
    }

    /// Correct a participant's birthdate. The new date passes the same age
    /// rule as order creation, a reason is mandatory, and the correction and
    /// its audit record are one atomic write.
    pub async fn correct_birthdate(
        &self,
        ctx: &AuthContext,
        order_id: &str,
        ticket_number: u32,
        new_birthdate: &str,
        reason: &str,
    ) -> Result<CorrectionResult, TicketError> {
        ctx.require(Permission::ManageOrders)?;

        if reason.trim().is_empty() {
            return Err(TicketError::ReasonRequired);
        }

        let row = self
            .store
            .scanned_ticket(order_id, ticket_number)
            .await?
            .ok_or(TicketError::TicketNotFound)?;

        let reference_date =
            dates::reference_date(row.event.start_datetime, Utc::now().date_naive());
        let new_date = dates::parse_birthdate(new_birthdate, reference_date)?;

        let record = self
            .store
            .correct_birthdate(
                order_id,
                ticket_number,
                new_date,
                BirthdateCorrection {
                    audit_id: ids::audit_id(),
                    reason: reason.trim().to_string(),
                    operator: ctx.email.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await?;

        tracing::info!(
            order_id = %order_id,
            ticket_number,
            old = ?record.old_value,
            new = %new_date,
            "Birthdate corrected"
        );

        Ok(CorrectionResult {
            audit_id: record.id,
            old_birthdate: record.old_value,
            new_birthdate: new_date,
            age_category: dates::age_category(new_date, reference_date),
        })
    }

    // --- live projections ---------------------------------------------------

    pub async fn live_stats(
        &self,
        ctx: &AuthContext,
        event_id: Option<&str>,
    ) -> Result<LiveStats, TicketError> {
        ctx.require(Permission::ManageOrders)?;
        let rows = self.store.attendance(event_id).await?;
        Ok(live_stats(&rows, Utc::now()))
    }

    pub async fn live_list(
        &self,
        ctx: &AuthContext,
        event_id: Option<&str>,
    ) -> Result<LiveList, TicketError> {
        ctx.require(Permission::ManageOrders)?;
        let rows = self.store.attendance(event_id).await?;
        Ok(live_list(&rows, Utc::now()))
    }

    /// Guest list of an event for the document renderer: paid participants,
    /// name ascending.
    pub async fn guest_list(
        &self,
        ctx: &AuthContext,
        event_id: &str,
    ) -> Result<TableDocument, TicketError> {
        ctx.require(Permission::ViewUsers)?;

        let event = self
            .store
            .active_event(event_id)
            .await?
            .ok_or(TicketError::EventNotFound)?;
        let rows = self.store.guest_list(event_id).await?;
        Ok(guest_list_document(&event, &rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Event, MemoryStore, Participant, TicketOrder, User, Visibility};
    use chrono::Duration;

    fn admin_ctx() -> AuthContext {
        AuthContext::new("door@x.de", "door").with_permissions([
            Permission::ManageOrders,
            Permission::ViewUsers,
        ])
    }

    fn test_event() -> Event {
        Event {
            id: "ev1".to_string(),
            name: "Abiball 2026".to_string(),
            year: 2026,
            location: None,
            visibility: Visibility::Public,
            password: None,
            max_tickets: 100,
            ticket_price: 45.0,
            start_datetime: Some(Utc::now() + Duration::days(10)),
            ticket_sale_start: None,
            ticket_sale_end: None,
            max_tickets_per_user: None,
            ticket_generation_enabled: true,
            active: true,
        }
    }

    async fn seed_order(store: &MemoryStore, id: &str, status: OrderStatus, count: u32) {
        store.insert_user(User {
            username: "max".to_string(),
            email: "max@x.de".to_string(),
            name: "Max Mustermann".to_string(),
            address: None,
            phone: None,
            email_verified: true,
        });
        let participants: Vec<Participant> = (1..=count)
            .map(|n| {
                Participant::new(
                    format!("Guest {n}"),
                    String::new(),
                    String::new(),
                    NaiveDate::from_ymd_opt(2006, 5, 14),
                    n,
                )
            })
            .collect();
        store
            .insert_order(
                TicketOrder {
                    id: id.to_string(),
                    user_email: "max@x.de".to_string(),
                    event_id: "ev1".to_string(),
                    tier_id: None,
                    tier_name: "Standard".to_string(),
                    ticket_count: count,
                    total_price: 45.0 * count as f64,
                    individual_ticket_price: 45.0,
                    payment_reference: format!("{}REF", id.to_uppercase()),
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

    fn service(store: Arc<MemoryStore>) -> TicketService {
        TicketService::new(store, Arc::new(Metrics::new().unwrap()), true)
    }

    fn qr_for(order_id: &str, ticket_number: u32) -> String {
        TicketQrPayload::new(order_id, ticket_number, "Guest 1", "Abiball 2026", "AB12CD".to_string())
            .to_json()
    }

    #[tokio::test]
    async fn test_generation_gate() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Pending, 1).await;
        let svc = service(store.clone());

        let result = svc.generate(&admin_ctx(), "o1").await;
        assert!(matches!(result, Err(TicketError::OrderNotPaid)));

        store
            .set_order_status("o1", OrderStatus::Paid, Some(Utc::now().date_naive()))
            .await
            .unwrap();
        svc.generate(&admin_ctx(), "o1").await.unwrap();

        let order = store.order("o1").await.unwrap().unwrap();
        assert!(order.tickets_generated);
        assert_eq!(order.tickets_generated_by.as_deref(), Some("door@x.de"));

        // Second call is a rejection, not a re-generation.
        let result = svc.generate(&admin_ctx(), "o1").await;
        assert!(matches!(result, Err(TicketError::AlreadyGenerated)));

        let status = svc.generation_status(&admin_ctx(), "o1").await.unwrap();
        assert!(!status.can_generate);
        assert!(status.tickets_generated);
    }

    #[tokio::test]
    async fn test_bulk_generation_covers_eligible_orders_only() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 1).await;
        seed_order(&store, "o2", OrderStatus::Paid, 1).await;
        seed_order(&store, "o3", OrderStatus::Pending, 1).await;
        let svc = service(store.clone());
        svc.generate(&admin_ctx(), "o1").await.unwrap();

        let outcome = svc.bulk_generate(&admin_ctx(), "ev1").await.unwrap();
        assert_eq!(outcome.generated, 1); // only o2 was still eligible
        assert!(outcome.errors.is_empty());
        assert!(store.order("o2").await.unwrap().unwrap().tickets_generated);
        assert!(!store.order("o3").await.unwrap().unwrap().tickets_generated);
    }

    #[tokio::test]
    async fn test_scan_state_machine() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 2).await;
        let svc = service(store.clone());
        let ctx = admin_ctx();

        // Malformed JSON
        let outcome = svc.scan(&ctx, "not json at all", false).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Invalid { .. }));

        // Missing fields
        let outcome = svc.scan(&ctx, "{\"order_id\": \"o1\"}", false).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Invalid { .. }));

        // Tampered hash
        let mut payload: serde_json::Value = serde_json::from_str(&qr_for("o1", 1)).unwrap();
        payload["security_id"] = serde_json::json!("FFFFFF");
        let outcome = svc
            .scan(&ctx, &payload.to_string(), false)
            .await
            .unwrap();
        assert!(matches!(outcome, ScanOutcome::Invalid { .. }));

        // Unknown ticket (hash is self-consistent but nothing is stored)
        let outcome = svc.scan(&ctx, &qr_for("ghost", 1), false).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Invalid { .. }));

        // Valid ticket, info-only mode
        let outcome = svc.scan(&ctx, &qr_for("o1", 1), false).await.unwrap();
        match &outcome {
            ScanOutcome::Valid { ticket } => {
                assert_eq!(ticket.name, "Guest 1");
                assert_eq!(ticket.age_category, Some(AgeCategory::Adult));
            }
            other => panic!("expected valid, got {}", other.label()),
        }

        // Nothing was redeemed in info-only mode.
        let row = store.scanned_ticket("o1", 1).await.unwrap().unwrap();
        assert!(!row.participant.redeemed);
    }

    #[tokio::test]
    async fn test_scan_rejects_unpaid_orders() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Pending, 1).await;
        let svc = service(store.clone());

        let outcome = svc.scan(&admin_ctx(), &qr_for("o1", 1), false).await.unwrap();
        match outcome {
            ScanOutcome::Invalid { reason, ticket } => {
                assert!(reason.contains("not paid"));
                assert!(ticket.is_some()); // door staff still sees who it is
            }
            other => panic!("expected invalid, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_tampered_display_name_still_verifies() {
        // The hash covers order_id, ticket_number and security_id only.
        // participant_name is a display field; changing it must NOT break
        // verification. This is the contract, not a bug.
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 1).await;
        let svc = service(store.clone());

        let mut payload: serde_json::Value = serde_json::from_str(&qr_for("o1", 1)).unwrap();
        payload["participant_name"] = serde_json::json!("Somebody Else");
        let outcome = svc
            .scan(&admin_ctx(), &payload.to_string(), false)
            .await
            .unwrap();
        assert!(matches!(outcome, ScanOutcome::Valid { .. }));
    }

    #[tokio::test]
    async fn test_redemption_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 2).await;
        let svc = service(store.clone());
        let ctx = admin_ctx();

        let outcome = svc.scan(&ctx, &qr_for("o1", 2), true).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Redeemed { .. }));
        let first_at = store
            .scanned_ticket("o1", 2)
            .await
            .unwrap()
            .unwrap()
            .participant
            .redeemed_at;

        // Second scan reports the prior redemption and changes nothing.
        let outcome = svc.scan(&ctx, &qr_for("o1", 2), true).await.unwrap();
        match outcome {
            ScanOutcome::AlreadyRedeemed { redeemed_at, redeemed_by, .. } => {
                assert_eq!(redeemed_at, first_at);
                assert_eq!(redeemed_by.as_deref(), Some("door@x.de"));
            }
            other => panic!("expected already_redeemed, got {}", other.label()),
        }
        let second_at = store
            .scanned_ticket("o1", 2)
            .await
            .unwrap()
            .unwrap()
            .participant
            .redeemed_at;
        assert_eq!(second_at, first_at);

        // Manual redeem rejects too.
        let result = svc.redeem(&ctx, "o1", 2).await;
        assert!(matches!(result, Err(TicketError::AlreadyRedeemed { .. })));
    }

    #[tokio::test]
    async fn test_undo_then_redeem_round_trip() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 1).await;
        let svc = service(store.clone());
        let ctx = admin_ctx();

        svc.redeem(&ctx, "o1", 1).await.unwrap();
        let undone = svc.undo_last_redemption(&ctx).await.unwrap();
        assert_eq!(undone.order_id, "o1");
        assert_eq!(undone.ticket_number, 1);

        // After undo the ticket scans as valid again, not already_redeemed.
        let outcome = svc.scan(&ctx, &qr_for("o1", 1), false).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Valid { .. }));

        svc.redeem(&ctx, "o1", 1).await.unwrap();

        // Nothing left to undo for another operator.
        let other = AuthContext::new("other@x.de", "other")
            .with_permissions([Permission::ManageOrders]);
        let result = svc.undo_last_redemption(&other).await;
        assert!(matches!(result, Err(TicketError::NothingToUndo)));
    }

    #[tokio::test]
    async fn test_birthdate_correction_writes_exactly_one_audit_record() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 1).await;
        let svc = service(store.clone());
        let ctx = admin_ctx();

        let result = svc
            .correct_birthdate(&ctx, "o1", 1, "2007-05-14", "   ")
            .await;
        assert!(matches!(result, Err(TicketError::ReasonRequired)));
        assert!(store.birthdate_audit("o1").await.unwrap().is_empty());

        let result = svc
            .correct_birthdate(&ctx, "o1", 1, "2099-01-01", "typo")
            .await;
        assert!(matches!(result, Err(TicketError::InvalidBirthdate(_))));

        let correction = svc
            .correct_birthdate(&ctx, "o1", 1, "2007-05-14", "wrong year on the form")
            .await
            .unwrap();
        assert_eq!(
            correction.old_birthdate,
            NaiveDate::from_ymd_opt(2006, 5, 14)
        );
        assert_eq!(
            correction.new_birthdate,
            NaiveDate::from_ymd_opt(2007, 5, 14).unwrap()
        );

        let audit = store.birthdate_audit("o1").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].old_value, NaiveDate::from_ymd_opt(2006, 5, 14));
        assert_eq!(audit[0].operator, "door@x.de");
    }

    #[tokio::test]
    async fn test_ticket_document_gates() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 1).await;
        let svc = service(store.clone());
        let owner = AuthContext::new("max@x.de", "max");

        // Not generated yet.
        let result = svc.ticket_document(&owner, "o1", 1).await;
        assert!(matches!(result, Err(TicketError::NotGenerated)));

        svc.generate(&admin_ctx(), "o1").await.unwrap();
        let document = svc.ticket_document(&owner, "o1", 1).await.unwrap();
        assert_eq!(document.ticket_number, 1);
        assert_eq!(document.event_name, "Abiball 2026");
        assert!(document.qr_payload.contains(&document.security_id));

        // Every render gets a fresh security id; both stay scannable.
        let second = svc.ticket_document(&owner, "o1", 1).await.unwrap();
        assert_ne!(document.security_id, second.security_id);
        let outcome = svc
            .scan(&admin_ctx(), &document.qr_payload, false)
            .await
            .unwrap();
        assert!(matches!(outcome, ScanOutcome::Valid { .. }));

        // Strangers are denied.
        let stranger = AuthContext::new("eve@x.de", "eve");
        let result = svc.ticket_document(&stranger, "o1", 1).await;
        assert!(matches!(result, Err(TicketError::Permission(_))));
    }

    #[tokio::test]
    async fn test_ticket_download_toggle_blocks_owners_not_admins() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 1).await;
        let svc = TicketService::new(store.clone(), Arc::new(Metrics::new().unwrap()), false);
        svc.generate(&admin_ctx(), "o1").await.unwrap();

        let owner = AuthContext::new("max@x.de", "max");
        let result = svc.ticket_document(&owner, "o1", 1).await;
        assert!(matches!(result, Err(TicketError::DownloadDisabled)));

        svc.ticket_document(&admin_ctx(), "o1", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_live_projections() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 3).await;
        seed_order(&store, "o2", OrderStatus::Pending, 2).await; // not counted
        let svc = service(store.clone());
        let ctx = admin_ctx();

        svc.redeem(&ctx, "o1", 1).await.unwrap();

        let stats = svc.live_stats(&ctx, Some("ev1")).await.unwrap();
        assert_eq!(stats.total_tickets, 3);
        assert_eq!(stats.checked_in, 1);
        assert_eq!(stats.not_checked_in, 2);
        assert_eq!(stats.scans_last_minute, 1);

        let list = svc.live_list(&ctx, Some("ev1")).await.unwrap();
        assert_eq!(list.present.len(), 1);
        assert_eq!(list.missing.len(), 2);
    }

    #[tokio::test]
    async fn test_guest_list_is_paid_only_and_sorted() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(test_event());
        seed_order(&store, "o1", OrderStatus::Paid, 2).await;
        seed_order(&store, "o2", OrderStatus::Pending, 1).await;
        let svc = service(store.clone());

        let document = svc.guest_list(&admin_ctx(), "ev1").await.unwrap();
        assert_eq!(document.rows.len(), 2);
        assert_eq!(document.rows[0][0], "Guest 1");
    }
}
