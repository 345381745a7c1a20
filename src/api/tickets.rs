use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthContext;
use crate::documents::DocumentRenderer;
use crate::domain::tickets::ScanOutcome;

use super::orders::{EventIdBody, OptionalEventBody, OrderIdBody};
use super::{fail, ok_with, AppState};

#[derive(Deserialize)]
pub struct TicketRefBody {
    pub order_id: String,
    pub ticket_number: u32,
}

#[derive(Deserialize)]
pub struct ScanBody {
    pub qr_data: String,
    #[serde(default)]
    pub auto_redeem: bool,
}

#[derive(Deserialize)]
pub struct CorrectBirthdateBody {
    pub order_id: String,
    pub ticket_number: u32,
    pub new_birthdate: String,
    pub reason: String,
}

pub async fn generate_tickets(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.tickets.generate(&ctx, &body.order_id).await {
        Ok(()) => ok_with(json!({ "message": "tickets generated and released" })),
        Err(error) => fail(error),
    }
}

pub async fn bulk_generate_tickets(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<EventIdBody>,
) -> HttpResponse {
    match state.tickets.bulk_generate(&ctx, &body.event_id).await {
        Ok(outcome) => ok_with(json!({
            "generated": outcome.generated,
            "errors": outcome.errors,
        })),
        Err(error) => fail(error),
    }
}

pub async fn check_ticket_generation(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.tickets.generation_status(&ctx, &body.order_id).await {
        Ok(status) => ok_with(json!({
            "can_generate_tickets": status.can_generate,
            "order_status": status.order_status,
            "tickets_generated": status.tickets_generated,
        })),
        Err(error) => fail(error),
    }
}

pub async fn download_ticket(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<TicketRefBody>,
) -> HttpResponse {
    match state
        .tickets
        .ticket_document(&ctx, &body.order_id, body.ticket_number)
        .await
    {
        Ok(document) => ok_with(json!({ "ticket": document })),
        Err(error) => fail(error),
    }
}

pub async fn scan_ticket(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<ScanBody>,
) -> HttpResponse {
    match state
        .tickets
        .scan(&ctx, &body.qr_data, body.auto_redeem)
        .await
    {
        Ok(ScanOutcome::Invalid { reason, ticket }) => HttpResponse::Ok().json(json!({
            "success": false,
            "status": "invalid",
            "error": reason,
            "ticket": ticket,
        })),
        Ok(ScanOutcome::Valid { ticket }) => ok_with(json!({
            "status": "valid",
            "message": "ticket is valid",
            "ticket": ticket,
        })),
        Ok(ScanOutcome::AlreadyRedeemed {
            ticket,
            redeemed_at,
            redeemed_by,
        }) => ok_with(json!({
            "status": "already_redeemed",
            "message": "ticket has already been redeemed",
            "ticket": ticket,
            "redeemed_at": redeemed_at,
            "redeemed_by": redeemed_by,
        })),
        Ok(ScanOutcome::Redeemed { ticket }) => ok_with(json!({
            "status": "redeemed",
            "message": "ticket redeemed",
            "ticket": ticket,
        })),
        Err(error) => fail(error),
    }
}

pub async fn redeem_ticket(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<TicketRefBody>,
) -> HttpResponse {
    match state
        .tickets
        .redeem(&ctx, &body.order_id, body.ticket_number)
        .await
    {
        Ok(()) => ok_with(json!({ "message": "ticket redeemed" })),
        Err(error) => fail(error),
    }
}

pub async fn undo_last_redemption(state: web::Data<AppState>, ctx: AuthContext) -> HttpResponse {
    match state.tickets.undo_last_redemption(&ctx).await {
        Ok(undone) => ok_with(json!({
            "message": "redemption undone",
            "ticket": {
                "order_id": undone.order_id,
                "ticket_number": undone.ticket_number,
                "name": undone.participant_name,
            },
        })),
        Err(error) => fail(error),
    }
}

pub async fn correct_birthdate(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<CorrectBirthdateBody>,
) -> HttpResponse {
    match state
        .tickets
        .correct_birthdate(
            &ctx,
            &body.order_id,
            body.ticket_number,
            &body.new_birthdate,
            &body.reason,
        )
        .await
    {
        Ok(result) => ok_with(json!({
            "message": "birthdate corrected",
            "old_birthdate": result.old_birthdate,
            "new_birthdate": result.new_birthdate,
            "age_category": result.age_category,
        })),
        Err(error) => fail(error),
    }
}

pub async fn live_stats(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OptionalEventBody>,
) -> HttpResponse {
    match state.tickets.live_stats(&ctx, body.event_id.as_deref()).await {
        Ok(stats) => ok_with(json!({ "stats": stats })),
        Err(error) => fail(error),
    }
}

pub async fn live_list(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OptionalEventBody>,
) -> HttpResponse {
    match state.tickets.live_list(&ctx, body.event_id.as_deref()).await {
        Ok(list) => ok_with(json!({
            "present": list.present,
            "missing": list.missing,
            "last_updated": list.last_updated,
        })),
        Err(error) => fail(error),
    }
}

pub async fn export_guest_list(
    state: web::Data<AppState>,
    ctx: AuthContext,
    path: web::Path<String>,
) -> HttpResponse {
    let event_id = path.into_inner();
    let document = match state.tickets.guest_list(&ctx, &event_id).await {
        Ok(document) => document,
        Err(error) => return fail(error),
    };
    match state.renderer.render(&document) {
        Ok(bytes) => HttpResponse::Ok().content_type("text/csv").body(bytes),
        Err(error) => fail(error),
    }
}
