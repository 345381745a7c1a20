use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthContext;
use crate::documents::DocumentRenderer;
use crate::domain::orders::{CreateOrderRequest, UpdateOrderRequest};

use super::{fail, ok_with, AppState};

#[derive(Deserialize)]
pub struct OrderIdBody {
    pub order_id: String,
}

#[derive(Deserialize)]
pub struct EventIdBody {
    pub event_id: String,
}

#[derive(Deserialize)]
pub struct OptionalEventBody {
    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ReferenceBody {
    pub payment_reference: String,
}

pub async fn create_ticket_order(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<CreateOrderRequest>,
) -> HttpResponse {
    match state.orders.create_order(&ctx, body.into_inner()).await {
        Ok(created) => ok_with(json!({
            "order_id": created.order_id,
            "payment_reference": created.payment_reference,
            "total_price": created.total_price,
            "ticket_count": created.ticket_count,
            "payment_request_sent": false,
        })),
        Err(error) => fail(error),
    }
}

pub async fn ticket_limits(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<EventIdBody>,
) -> HttpResponse {
    match state.orders.ticket_limits(&ctx, &body.event_id).await {
        Ok(quote) => ok_with(json!({ "limits": quote })),
        Err(error) => fail(error),
    }
}

pub async fn my_tickets(state: web::Data<AppState>, ctx: AuthContext) -> HttpResponse {
    match state.orders.my_tickets(&ctx).await {
        Ok(orders) => ok_with(json!({ "orders": orders })),
        Err(error) => fail(error),
    }
}

pub async fn all_ticket_orders(state: web::Data<AppState>, ctx: AuthContext) -> HttpResponse {
    match state.orders.all_orders(&ctx).await {
        Ok(orders) => ok_with(json!({ "orders": orders })),
        Err(error) => fail(error),
    }
}

pub async fn get_ticket_order(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.orders.order_detail(&ctx, &body.order_id).await {
        Ok(order) => ok_with(json!({ "order": order })),
        Err(error) => fail(error),
    }
}

pub async fn update_ticket_order(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<UpdateOrderRequest>,
) -> HttpResponse {
    match state.orders.update_order(&ctx, body.into_inner()).await {
        Ok(()) => ok_with(json!({})),
        Err(error) => fail(error),
    }
}

pub async fn delete_ticket_order(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.orders.delete_order(&ctx, &body.order_id).await {
        Ok(()) => ok_with(json!({ "message": "order deleted" })),
        Err(error) => fail(error),
    }
}

pub async fn mark_order_paid(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.orders.mark_paid(&ctx, &body.order_id).await {
        Ok(()) => ok_with(json!({})),
        Err(error) => fail(error),
    }
}

pub async fn mark_order_unpaid(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OrderIdBody>,
) -> HttpResponse {
    match state.orders.mark_unpaid(&ctx, &body.order_id).await {
        Ok(()) => ok_with(json!({})),
        Err(error) => fail(error),
    }
}

pub async fn quick_mark_paid(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<ReferenceBody>,
) -> HttpResponse {
    match state
        .orders
        .quick_mark_paid(&ctx, &body.payment_reference)
        .await
    {
        Ok(order_id) => ok_with(json!({ "order_id": order_id })),
        Err(error) => fail(error),
    }
}

pub async fn search_payment_reference(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<ReferenceBody>,
) -> HttpResponse {
    match state
        .orders
        .search_by_reference(&ctx, &body.payment_reference)
        .await
    {
        Ok(row) => ok_with(json!({ "order": row.order, "buyer": row.buyer })),
        Err(error) => fail(error),
    }
}

pub async fn mark_payment_error(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<ReferenceBody>,
) -> HttpResponse {
    match state
        .orders
        .record_payment_error(&ctx, &body.payment_reference)
        .await
    {
        Ok(record) => ok_with(json!({ "record": record })),
        Err(error) => fail(error),
    }
}

pub async fn get_order_statistics(
    state: web::Data<AppState>,
    ctx: AuthContext,
    body: web::Json<OptionalEventBody>,
) -> HttpResponse {
    match state
        .orders
        .statistics(&ctx, body.event_id.as_deref())
        .await
    {
        Ok(statistics) => ok_with(json!({ "statistics": statistics })),
        Err(error) => fail(error),
    }
}

pub async fn order_summary_document(
    state: web::Data<AppState>,
    ctx: AuthContext,
) -> HttpResponse {
    let document = match state.orders.order_summary(&ctx).await {
        Ok(document) => document,
        Err(error) => return fail(error),
    };
    match state.renderer.render(&document) {
        Ok(bytes) => HttpResponse::Ok()
            .content_type("text/csv")
            .body(bytes),
        Err(error) => fail(error),
    }
}
