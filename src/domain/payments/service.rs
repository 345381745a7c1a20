use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthContext, Permission};
use crate::metrics::Metrics;
use crate::notify::{content, Notifier};
use crate::store::{
    BankAccount, Event, OrderStatus, PaymentRequest, PaymentRequestStatus, PendingOrderRow,
    TicketStore,
};
use crate::util::ids;

use super::allocation::pick_account;
use super::epc::epc_payload;
use super::errors::PaymentError;

// ============================================================================
// Payment Service
// ============================================================================
//
// Bank-account configuration and payment-request handling. Creating a
// request commits first and then notifies; the notification is best-effort.
// Bulk sending walks the eligible orders sequentially and keeps going past
// individual failures, accumulating them for the caller.
//
// ============================================================================

/// Tolerance when checking that an event's percentages sum to 100.
const PERCENT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Deserialize)]
pub struct BankAccountInput {
    pub account_name: String,
    pub bank_name: String,
    pub iban: String,
    pub bic: String,
    pub percentage: f64,
    #[serde(default)]
    pub escrow_document_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequestView {
    pub request: PaymentRequest,
    pub account: Option<BankAccount>,
}

#[derive(Debug, Serialize)]
pub struct BulkSendOutcome {
    pub sent_count: u32,
    pub errors: Vec<BulkSendError>,
}

#[derive(Debug, Serialize)]
pub struct BulkSendError {
    pub order_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentQr {
    pub epc_payload: String,
    pub account_name: String,
    pub bank_name: String,
    pub iban: String,
    pub bic: String,
    pub amount: f64,
    pub reference: String,
}

pub struct PaymentService {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn TicketStore>, notifier: Arc<dyn Notifier>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            notifier,
            metrics,
        }
    }

    /// Replace the bank-account set of an event. Rejected before anything is
    /// persisted when the percentages do not sum to 100 (± tolerance).
    pub async fn configure_accounts(
        &self,
        ctx: &AuthContext,
        event_id: &str,
        inputs: Vec<BankAccountInput>,
    ) -> Result<Vec<BankAccount>, PaymentError> {
        ctx.require(Permission::CreateEvents)?;

        let event = self
            .store
            .active_event(event_id)
            .await?
            .ok_or(PaymentError::EventNotFound)?;

        let total: f64 = inputs.iter().map(|a| a.percentage).sum();
        if (total - 100.0).abs() >= PERCENT_SUM_TOLERANCE {
            return Err(PaymentError::PercentagesInvalid { total });
        }

        let accounts: Vec<BankAccount> = inputs
            .into_iter()
            .map(|input| BankAccount {
                id: ids::account_id(),
                event_id: event.id.clone(),
                account_name: input.account_name,
                bank_name: input.bank_name,
                iban: input.iban,
                bic: input.bic,
                percentage: input.percentage,
                escrow_document_url: input
                    .escrow_document_url
                    .filter(|url| !url.trim().is_empty()),
            })
            .collect();

        self.store
            .replace_bank_accounts(&event.id, accounts.clone())
            .await?;

        tracing::info!(event_id = %event.id, accounts = accounts.len(), "Bank accounts updated");
        Ok(accounts)
    }

    pub async fn accounts(
        &self,
        ctx: &AuthContext,
        event_id: &str,
    ) -> Result<Vec<BankAccount>, PaymentError> {
        ctx.require(Permission::BuyTickets)?;
        self.store
            .active_event(event_id)
            .await?
            .ok_or(PaymentError::EventNotFound)?;
        Ok(self.store.bank_accounts(event_id).await?)
    }

    /// Accounts with an escrow agreement on file, for buyers to review
    /// before ordering.
    pub async fn escrow_agreements(
        &self,
        _ctx: &AuthContext,
        event_id: &str,
    ) -> Result<Vec<BankAccount>, PaymentError> {
        self.store
            .active_event(event_id)
            .await?
            .ok_or(PaymentError::EventNotFound)?;
        let mut accounts: Vec<BankAccount> = self
            .store
            .bank_accounts(event_id)
            .await?
            .into_iter()
            .filter(|a| a.escrow_document_url.is_some())
            .collect();
        accounts.sort_by(|a, b| a.account_name.cmp(&b.account_name));
        Ok(accounts)
    }

    /// Send a payment request for one order using an explicitly chosen bank
    /// account.
    pub async fn send_request(
        &self,
        ctx: &AuthContext,
        order_id: &str,
        bank_account_id: &str,
    ) -> Result<String, PaymentError> {
        ctx.require(Permission::ManageOrders)?;

        let row = self
            .store
            .order_with_buyer(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;
        if row.order.status == OrderStatus::Paid {
            return Err(PaymentError::AlreadyPaid);
        }

        let account = self
            .store
            .bank_account(bank_account_id)
            .await?
            .ok_or(PaymentError::AccountNotFound)?;
        let event = self
            .store
            .active_event(&row.order.event_id)
            .await?
            .ok_or(PaymentError::EventNotFound)?;

        let request_id = self
            .create_request(&row.order.id, &account, &ctx.email)
            .await?;

        self.notify_payment_request(&event, &row.buyer.email, &row.buyer.name, &row.order.payment_reference, row.order.total_price, &account)
            .await;

        tracing::info!(
            order_id = %row.order.id,
            request_id = %request_id,
            recipient = %row.buyer.email,
            "Payment request sent"
        );
        Ok(request_id)
    }

    /// Send payment requests for every eligible pending order of an event,
    /// selecting the bank account per order by weighted distribution.
    /// One order's failure never aborts the rest of the batch.
    pub async fn send_bulk(
        &self,
        ctx: &AuthContext,
        event_id: &str,
        order_ids: Option<Vec<String>>,
    ) -> Result<BulkSendOutcome, PaymentError> {
        ctx.require(Permission::ManageOrders)?;

        let event = self
            .store
            .active_event(event_id)
            .await?
            .ok_or(PaymentError::EventNotFound)?;

        let accounts = self.store.bank_accounts(event_id).await?;
        if accounts.is_empty() {
            return Err(PaymentError::NoAccountsConfigured);
        }

        let pending = self
            .store
            .pending_orders_without_request(event_id, order_ids.as_deref())
            .await?;

        let mut outcome = BulkSendOutcome {
            sent_count: 0,
            errors: Vec::new(),
        };

        for row in pending {
            match self.send_one_of_bulk(ctx, &event, &accounts, &row).await {
                Ok(()) => outcome.sent_count += 1,
                Err(error) => {
                    self.metrics.payment_request_failures.inc();
                    tracing::error!(
                        order_id = %row.order.id,
                        error = %error,
                        "Payment request failed, continuing batch"
                    );
                    outcome.errors.push(BulkSendError {
                        order_id: row.order.id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            event_id = %event_id,
            sent = outcome.sent_count,
            failed = outcome.errors.len(),
            "Bulk payment requests processed"
        );
        Ok(outcome)
    }

    async fn send_one_of_bulk(
        &self,
        ctx: &AuthContext,
        event: &Event,
        accounts: &[BankAccount],
        row: &PendingOrderRow,
    ) -> Result<(), PaymentError> {
        let account = {
            let mut rng = rand::thread_rng();
            pick_account(accounts, &mut rng)
                .ok_or(PaymentError::NoAccountsConfigured)?
                .clone()
        };

        self.create_request(&row.order.id, &account, &ctx.email)
            .await?;

        // Inside a bulk run a failed send surfaces as this order's error so
        // the operator sees it; the request itself stays committed.
        let mail = content::payment_request(
            &row.buyer.email,
            &row.buyer.name,
            event,
            &row.order.payment_reference,
            row.order.total_price,
            &account,
            &epc_payload(
                &account.account_name,
                &account.iban,
                &account.bic,
                row.order.total_price,
                &row.order.payment_reference,
            ),
        );
        if let Err(error) = self.notifier.send(mail).await {
            self.metrics.record_notification_failure();
            return Err(PaymentError::NotificationFailed(error.to_string()));
        }
        Ok(())
    }

    async fn create_request(
        &self,
        order_id: &str,
        account: &BankAccount,
        created_by: &str,
    ) -> Result<String, PaymentError> {
        let now = Utc::now();
        let request = PaymentRequest {
            id: ids::request_id(),
            order_id: order_id.to_string(),
            bank_account_id: account.id.clone(),
            status: PaymentRequestStatus::Sent,
            created_at: now,
            sent_at: now,
            paid_at: None,
            created_by: created_by.to_string(),
        };
        let request_id = request.id.clone();
        self.store.insert_payment_request(request).await?;
        self.metrics.payment_requests_sent.inc();
        Ok(request_id)
    }

    async fn notify_payment_request(
        &self,
        event: &Event,
        recipient: &str,
        buyer_name: &str,
        reference: &str,
        total_price: f64,
        account: &BankAccount,
    ) {
        let mail = content::payment_request(
            recipient,
            buyer_name,
            event,
            reference,
            total_price,
            account,
            &epc_payload(
                &account.account_name,
                &account.iban,
                &account.bic,
                total_price,
                reference,
            ),
        );
        if let Err(error) = self.notifier.send(mail).await {
            // Committed already; the send is best-effort.
            self.metrics.record_notification_failure();
            tracing::warn!(recipient = %recipient, error = %error, "Payment request mail failed");
        }
    }

    /// Mark a payment request paid and mirror the status onto its order.
    pub async fn mark_request_paid(
        &self,
        ctx: &AuthContext,
        request_id: &str,
    ) -> Result<(), PaymentError> {
        ctx.require(Permission::ManageOrders)?;

        let request = self
            .store
            .payment_request(request_id)
            .await?
            .ok_or(PaymentError::RequestNotFound)?;

        let today = Utc::now().date_naive();
        self.store
            .set_payment_request_status(request_id, PaymentRequestStatus::Paid, Some(today))
            .await?;
        self.store
            .set_order_status(&request.order_id, OrderStatus::Paid, Some(today))
            .await?;

        tracing::info!(request_id = %request_id, order_id = %request.order_id, "Payment request marked paid");
        Ok(())
    }

    /// Requests of an order, newest first, each with its bank account.
    pub async fn requests_for_order(
        &self,
        ctx: &AuthContext,
        order_id: &str,
    ) -> Result<Vec<PaymentRequestView>, PaymentError> {
        ctx.require(Permission::ViewUsers)?;

        self.store
            .order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;

        let mut views = Vec::new();
        for request in self.store.payment_requests(order_id).await? {
            let account = self.store.bank_account(&request.bank_account_id).await?;
            views.push(PaymentRequestView { request, account });
        }
        Ok(views)
    }

    /// EPC payload and bank details for an order's latest payment request.
    /// Available to the order's owner and to order managers.
    pub async fn payment_qr(
        &self,
        ctx: &AuthContext,
        order_id: &str,
    ) -> Result<PaymentQr, PaymentError> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;
        if order.user_email != ctx.email {
            ctx.require(Permission::ManageOrders)?;
        }

        let latest = self
            .store
            .payment_requests(order_id)
            .await?
            .into_iter()
            .next()
            .ok_or(PaymentError::NoBankDetails)?;
        let account = self
            .store
            .bank_account(&latest.bank_account_id)
            .await?
            .ok_or(PaymentError::NoBankDetails)?;

        Ok(PaymentQr {
            epc_payload: epc_payload(
                &account.account_name,
                &account.iban,
                &account.bic,
                order.total_price,
                &order.payment_reference,
            ),
            account_name: account.account_name,
            bank_name: account.bank_name,
            iban: account.iban,
            bic: account.bic,
            amount: order.total_price,
            reference: order.payment_reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::{MemoryStore, Participant, TicketOrder, User, Visibility};

    fn ctx_admin() -> AuthContext {
        AuthContext::new("admin@x.de", "admin").with_permissions([
            Permission::ManageOrders,
            Permission::ViewUsers,
            Permission::CreateEvents,
            Permission::BuyTickets,
        ])
    }

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            name: "Abiball 2026".to_string(),
            year: 2026,
            location: None,
            visibility: Visibility::Public,
            password: None,
            max_tickets: 100,
            ticket_price: 45.0,
            start_datetime: None,
            ticket_sale_start: None,
            ticket_sale_end: None,
            max_tickets_per_user: None,
            ticket_generation_enabled: true,
            active: true,
        }
    }

    fn account_input(name: &str, percentage: f64) -> BankAccountInput {
        BankAccountInput {
            account_name: name.to_string(),
            bank_name: "Testbank".to_string(),
            iban: "DE89 3704 0044 0532 0130 00".to_string(),
            bic: "COBADEFFXXX".to_string(),
            percentage,
            escrow_document_url: None,
        }
    }

    async fn seed_pending_order(store: &MemoryStore, id: &str, email: &str) {
        store.insert_user(User {
            username: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            name: "Buyer".to_string(),
            address: None,
            phone: None,
            email_verified: true,
        });
        store
            .insert_order(
                TicketOrder {
                    id: id.to_string(),
                    user_email: email.to_string(),
                    event_id: "ev1".to_string(),
                    tier_id: None,
                    tier_name: "Standard".to_string(),
                    ticket_count: 1,
                    total_price: 45.0,
                    individual_ticket_price: 45.0,
                    payment_reference: format!("{}001", id.to_uppercase()),
                    status: OrderStatus::Pending,
                    created_at: Utc::now(),
                    paid_at: None,
                    tickets_generated: false,
                    tickets_generated_at: None,
                    tickets_generated_by: None,
                },
                vec![Participant::new(
                    "Guest".to_string(),
                    String::new(),
                    String::new(),
                    None,
                    1,
                )],
            )
            .await
            .unwrap();
    }

    fn service(store: Arc<MemoryStore>, notifier: Arc<RecordingNotifier>) -> PaymentService {
        PaymentService::new(store, notifier, Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_percentages_must_sum_to_100() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(event("ev1"));
        let svc = service(store.clone(), Arc::new(RecordingNotifier::default()));

        let result = svc
            .configure_accounts(
                &ctx_admin(),
                "ev1",
                vec![account_input("A", 67.0), account_input("B", 30.0)],
            )
            .await;
        assert!(matches!(
            result,
            Err(PaymentError::PercentagesInvalid { total }) if (total - 97.0).abs() < 1e-9
        ));
        // Nothing was persisted.
        assert!(store.bank_accounts("ev1").await.unwrap().is_empty());

        svc.configure_accounts(
            &ctx_admin(),
            "ev1",
            vec![account_input("A", 70.0), account_input("B", 30.0)],
        )
        .await
        .unwrap();
        let accounts = store.bank_accounts("ev1").await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].percentage, 70.0); // sorted descending
    }

    #[tokio::test]
    async fn test_send_request_commits_then_notifies() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(event("ev1"));
        seed_pending_order(&store, "o1", "max@x.de").await;
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = service(store.clone(), notifier.clone());
        svc.configure_accounts(&ctx_admin(), "ev1", vec![account_input("A", 100.0)])
            .await
            .unwrap();
        let account_id = store.bank_accounts("ev1").await.unwrap()[0].id.clone();

        let request_id = svc
            .send_request(&ctx_admin(), "o1", &account_id)
            .await
            .unwrap();

        let requests = store.payment_requests("o1").await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, request_id);
        assert_eq!(requests[0].status, PaymentRequestStatus::Sent);
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_send_request_survives_notification_failure() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(event("ev1"));
        seed_pending_order(&store, "o1", "max@x.de").await;
        let notifier = Arc::new(RecordingNotifier::failing());
        let svc = service(store.clone(), notifier);
        svc.configure_accounts(&ctx_admin(), "ev1", vec![account_input("A", 100.0)])
            .await
            .unwrap();
        let account_id = store.bank_accounts("ev1").await.unwrap()[0].id.clone();

        // The send fails but the request stays committed.
        svc.send_request(&ctx_admin(), "o1", &account_id)
            .await
            .unwrap();
        assert_eq!(store.payment_requests("o1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_skips_orders_with_requests_and_continues_past_failures() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(event("ev1"));
        seed_pending_order(&store, "o1", "a@x.de").await;
        seed_pending_order(&store, "o2", "b@x.de").await;
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = service(store.clone(), notifier.clone());
        svc.configure_accounts(
            &ctx_admin(),
            "ev1",
            vec![account_input("A", 70.0), account_input("B", 30.0)],
        )
        .await
        .unwrap();

        let outcome = svc.send_bulk(&ctx_admin(), "ev1", None).await.unwrap();
        assert_eq!(outcome.sent_count, 2);
        assert!(outcome.errors.is_empty());

        // Re-running finds nothing eligible.
        let outcome = svc.send_bulk(&ctx_admin(), "ev1", None).await.unwrap();
        assert_eq!(outcome.sent_count, 0);
    }

    #[tokio::test]
    async fn test_bulk_collects_per_order_errors() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(event("ev1"));
        seed_pending_order(&store, "o1", "a@x.de").await;
        seed_pending_order(&store, "o2", "b@x.de").await;
        let notifier = Arc::new(RecordingNotifier::failing());
        let svc = service(store.clone(), notifier);
        svc.configure_accounts(&ctx_admin(), "ev1", vec![account_input("A", 100.0)])
            .await
            .unwrap();

        let outcome = svc.send_bulk(&ctx_admin(), "ev1", None).await.unwrap();
        assert_eq!(outcome.sent_count, 0);
        assert_eq!(outcome.errors.len(), 2);
        // Requests were still committed; only the mails failed.
        assert_eq!(store.payment_requests("o1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_request_paid_mirrors_onto_order() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(event("ev1"));
        seed_pending_order(&store, "o1", "max@x.de").await;
        let svc = service(store.clone(), Arc::new(RecordingNotifier::default()));
        svc.configure_accounts(&ctx_admin(), "ev1", vec![account_input("A", 100.0)])
            .await
            .unwrap();
        let account_id = store.bank_accounts("ev1").await.unwrap()[0].id.clone();
        let request_id = svc
            .send_request(&ctx_admin(), "o1", &account_id)
            .await
            .unwrap();

        svc.mark_request_paid(&ctx_admin(), &request_id).await.unwrap();

        let order = store.order("o1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.paid_at.is_some());
        let request = store.payment_request(&request_id).await.unwrap().unwrap();
        assert_eq!(request.status, PaymentRequestStatus::Paid);
    }

    #[tokio::test]
    async fn test_payment_qr_requires_ownership_or_permission() {
        let store = Arc::new(MemoryStore::new());
        store.insert_event(event("ev1"));
        seed_pending_order(&store, "o1", "max@x.de").await;
        let svc = service(store.clone(), Arc::new(RecordingNotifier::default()));
        svc.configure_accounts(&ctx_admin(), "ev1", vec![account_input("A", 100.0)])
            .await
            .unwrap();
        let account_id = store.bank_accounts("ev1").await.unwrap()[0].id.clone();
        svc.send_request(&ctx_admin(), "o1", &account_id)
            .await
            .unwrap();

        let owner = AuthContext::new("max@x.de", "max").with_permissions([Permission::BuyTickets]);
        let qr = svc.payment_qr(&owner, "o1").await.unwrap();
        assert!(qr.epc_payload.starts_with("BCD\n002\n1\nSCT\n"));
        assert_eq!(qr.reference, "O1001");

        let stranger = AuthContext::new("eve@x.de", "eve").with_permissions([Permission::BuyTickets]);
        assert!(matches!(
            svc.payment_qr(&stranger, "o1").await,
            Err(PaymentError::Permission(_))
        ));
    }
}
