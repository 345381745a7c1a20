use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthContext;
use crate::domain::payments::BankAccountInput;

use super::{fail, ok_with, AppState};
use super::orders::{EventIdBody, OrderIdBody};

#[derive(Deserialize)]
pub struct ManageAccountsBody {
    pub event_id: String,
    pub accounts: Vec<BankAccountInput>,
}

#[derive(Deserialize)]
pub struct SendRequestBody {
    pub order_id: String,
    pub bank_account_id: String,
}

#[derive(Deserialize)]
pub struct BulkSendBody {
    pub event_id: String,
    #[serde(default)]
    pub order_ids: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct RequestIdBody {
    pub payment_request_id: String,
}

pub async fn get_bank_accounts(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<EventIdBody>,
) -> HttpResponse {
    match state.payments.accounts(&ctx, &body.event_id).await {
        Ok(accounts) => ok_with(json!({ "accounts": accounts })),
        Err(error) => fail(error),
    }
}

pub async fn manage_bank_accounts(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<ManageAccountsBody>,
) -> HttpResponse {
    let body = body.into_inner();
    match state
        .payments
        .configure_accounts(&ctx, &body.event_id, body.accounts)
        .await
    {
        Ok(accounts) => ok_with(json!({ "accounts": accounts })),
        Err(error) => fail(error),
    }
}

pub async fn get_escrow_agreements(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<EventIdBody>,
) -> HttpResponse {
    match state.payments.escrow_agreements(&ctx, &body.event_id).await {
        Ok(accounts) => {
            let agreements: Vec<_> = accounts
                .iter()
                .map(|account| {
                    json!({
                        "id": account.id,
                        "account_name": account.account_name,
                        "escrow_document_url": account.escrow_document_url,
                    })
                })
                .collect();
            ok_with(json!({ "escrow_agreements": agreements }))
        }
        Err(error) => fail(error),
    }
}

pub async fn send_payment_request(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<SendRequestBody>,
) -> HttpResponse {
    match state
        .payments
        .send_request(&ctx, &body.order_id, &body.bank_account_id)
        .await
    {
        Ok(request_id) => ok_with(json!({
            "payment_request_id": request_id,
            "message": "payment request sent",
        })),
        Err(error) => fail(error),
    }
}

pub async fn send_bulk_payment_requests(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<BulkSendBody>,
) -> HttpResponse {
    let body = body.into_inner();
    match state
        .payments
        .send_bulk(&ctx, &body.event_id, body.order_ids)
        .await
    {
        Ok(outcome) => ok_with(json!({
            "sent_count": outcome.sent_count,
            "errors": outcome.errors,
        })),
        Err(error) => fail(error),
    }
}

pub async fn mark_payment_request_paid(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<RequestIdBody>,
) -> HttpResponse {
    match state
        .payments
        .mark_request_paid(&ctx, &body.payment_request_id)
        .await
    {
        Ok(()) => ok_with(json!({})),
        Err(error) => fail(error),
    }
}

pub async fn get_payment_requests(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.payments.requests_for_order(&ctx, &body.order_id).await {
        Ok(requests) => ok_with(json!({ "payment_requests": requests })),
        Err(error) => fail(error),
    }
}

pub async fn get_payment_qr_code(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.payments.payment_qr(&ctx, &body.order_id).await {
        Ok(qr) => ok_with(json!({
            "qr_payload": qr.epc_payload,
            "bank_info": {
                "account_name": qr.account_name,
                "bank_name": qr.bank_name,
                "iban": qr.iban,
                "bic": qr.bic,
                "amount": qr.amount,
                "reference": qr.reference,
            },
        })),
        Err(error) => fail(error),
    }
}
