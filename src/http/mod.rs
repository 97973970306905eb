//! HTTP boundary of the order service.
//!
//! `POST /orders` validates the body, publishes one `OrderCreated` event and
//! answers only after the log acknowledged it. `GET /health` is open.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{require_bearer, JwtAuth};
use crate::publisher::{AmountCents, OrderPublisher, OrderRequest, PublishError};

/// Shared state for request handlers.
pub struct AppState {
    pub publisher: Arc<OrderPublisher>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    store_id: String,
    total_amount_cents: i64,
}

/// Body of a 202 response: the event is durably in the log.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderAccepted {
    pub order_id: String,
    pub status: String,
    pub partition: i32,
    pub offset: i64,
}

/// Build the service router. Orders require a bearer token when `auth` is
/// set; health never does.
pub fn router(publisher: Arc<OrderPublisher>, auth: Option<Arc<JwtAuth>>) -> Router {
    let state = Arc::new(AppState { publisher });

    let mut orders = Router::new().route("/orders", post(create_order));
    if let Some(auth) = auth {
        orders = orders.route_layer(middleware::from_fn_with_state(auth, require_bearer));
    }

    Router::new()
        .merge(orders)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateOrderBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };

    let store_id = body.store_id.trim();
    if store_id.is_empty() {
        return bad_request("store_id is required");
    }
    let amount = match AmountCents::new(body.total_amount_cents) {
        Ok(amount) => amount,
        Err(e) => return bad_request(&e.to_string()),
    };

    match state
        .publisher
        .publish(OrderRequest::new(store_id, amount))
        .await
    {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(OrderAccepted {
                order_id: receipt.order_id,
                status: "accepted".to_string(),
                partition: receipt.position.partition,
                offset: receipt.position.offset,
            }),
        )
            .into_response(),
        Err(e) => publish_failure(e),
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn publish_failure(error: PublishError) -> Response {
    warn!(order_id = %error.order_id(), error = %error, "Order not accepted");
    match &error {
        PublishError::Rejected { .. } => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "error": "Failed to publish order",
                "order_id": error.order_id(),
            })),
        )
            .into_response(),
        // Outcome unknown: the order may still show up downstream.
        PublishError::Timeout { .. } => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(serde_json::json!({
                "error": "Order publish not confirmed in time; it may still be processed",
                "order_id": error.order_id(),
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests;
