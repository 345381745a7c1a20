use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::{error::InternalError, web, FromRequest, HttpRequest, HttpResponse};
use serde_json::json;

use crate::auth::{AuthContext, Permission};
use crate::documents::DocumentRenderer;
use crate::domain::orders::OrderService;
use crate::domain::payments::PaymentService;
use crate::domain::tickets::TicketService;

mod orders;
mod payments;
mod tickets;

// ============================================================================
// HTTP API
// ============================================================================
//
// JSON endpoints under /api/... mirroring the core operations. Every
// response carries a success flag and either a payload or a human-readable
// error string; business rejections come back as 200 with success=false.
//
// Authentication itself is out of scope: a fronting gateway resolves the
// session and passes the identity in headers, from which the AuthContext is
// built per request.
//
// ============================================================================

pub struct AppState {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub tickets: Arc<TicketService>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

/// Operation-level failure in the response envelope.
pub fn fail(error: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::Ok().json(json!({"success": false, "error": error.to_string()}))
}

/// Success envelope with extra payload fields merged in.
pub fn ok_with(payload: serde_json::Value) -> HttpResponse {
    let mut body = json!({"success": true});
    if let (Some(body_map), Some(payload_map)) = (body.as_object_mut(), payload.as_object()) {
        for (key, value) in payload_map {
            body_map.insert(key.clone(), value.clone());
        }
    }
    HttpResponse::Ok().json(body)
}

const HEADER_EMAIL: &str = "x-auth-email";
const HEADER_USERNAME: &str = "x-auth-username";
const HEADER_NAME: &str = "x-auth-name";
const HEADER_PERMISSIONS: &str = "x-auth-permissions";
const HEADER_EVENT_ACCESS: &str = "x-auth-event-access";

fn header<'a>(req: &'a HttpRequest, name: &str) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

fn auth_from_headers(req: &HttpRequest) -> Result<AuthContext, actix_web::Error> {
    let email = header(req, HEADER_EMAIL).trim();
    if email.is_empty() {
        let response = HttpResponse::Unauthorized()
            .json(json!({"success": false, "error": "authentication required"}));
        return Err(InternalError::from_response("missing identity", response).into());
    }

    let permissions = header(req, HEADER_PERMISSIONS)
        .split(',')
        .filter_map(Permission::parse)
        .collect();
    let event_access = header(req, HEADER_EVENT_ACCESS)
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    let mut ctx = AuthContext::new(email, header(req, HEADER_USERNAME).trim());
    ctx.display_name = header(req, HEADER_NAME).trim().to_string();
    ctx.permissions = permissions;
    ctx.event_access = event_access;
    Ok(ctx)
}

impl FromRequest for AuthContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(auth_from_headers(req))
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // orders
            .route("/create_ticket_order", web::post().to(orders::create_ticket_order))
            .route("/ticket_limits", web::post().to(orders::ticket_limits))
            .route("/my_tickets", web::post().to(orders::my_tickets))
            .route("/all_ticket_orders", web::post().to(orders::all_ticket_orders))
            .route("/get_ticket_order", web::post().to(orders::get_ticket_order))
            .route("/update_ticket_order", web::post().to(orders::update_ticket_order))
            .route("/delete_ticket_order", web::post().to(orders::delete_ticket_order))
            .route("/mark_order_paid", web::post().to(orders::mark_order_paid))
            .route("/mark_order_unpaid", web::post().to(orders::mark_order_unpaid))
            .route("/quick_mark_paid", web::post().to(orders::quick_mark_paid))
            .route("/search_payment_reference", web::post().to(orders::search_payment_reference))
            .route("/mark_payment_error", web::post().to(orders::mark_payment_error))
            .route("/get_order_statistics", web::post().to(orders::get_order_statistics))
            .route("/order_summary_document", web::get().to(orders::order_summary_document))
            // payments
            .route("/get_bank_accounts", web::post().to(payments::get_bank_accounts))
            .route("/manage_bank_accounts", web::post().to(payments::manage_bank_accounts))
            .route("/get_escrow_agreements", web::post().to(payments::get_escrow_agreements))
            .route("/send_payment_request", web::post().to(payments::send_payment_request))
            .route(
                "/send_bulk_payment_requests",
                web::post().to(payments::send_bulk_payment_requests),
            )
            .route(
                "/mark_payment_request_paid",
                web::post().to(payments::mark_payment_request_paid),
            )
            .route("/get_payment_requests", web::post().to(payments::get_payment_requests))
            .route("/get_payment_qr_code", web::post().to(payments::get_payment_qr_code))
            // tickets
            .route("/generate_tickets", web::post().to(tickets::generate_tickets))
            .route(
                "/bulk_generate_tickets_for_event",
                web::post().to(tickets::bulk_generate_tickets),
            )
            .route(
                "/check_ticket_generation",
                web::post().to(tickets::check_ticket_generation),
            )
            .route("/download_ticket", web::post().to(tickets::download_ticket))
            .route("/scan_ticket", web::post().to(tickets::scan_ticket))
            .route("/redeem_ticket", web::post().to(tickets::redeem_ticket))
            .route("/undo_last_redemption", web::post().to(tickets::undo_last_redemption))
            .route("/correct_birthdate", web::post().to(tickets::correct_birthdate))
            .route("/live_stats", web::post().to(tickets::live_stats))
            .route("/live_list", web::post().to(tickets::live_list))
            .route(
                "/export_guest_list/{event_id}",
                web::get().to(tickets::export_guest_list),
            ),
    );
}
