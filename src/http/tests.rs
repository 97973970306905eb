use super::*;
use crate::bus::{ChannelLog, FaultyLog, LogConsumer};
use crate::event::codec;
use axum::body::Body;
use axum::http::{header, Request};
use std::time::Duration;
use tower::ServiceExt;

const TOPIC: &str = "global.orders.v1";

fn auth() -> Arc<JwtAuth> {
    Arc::new(JwtAuth::new(
        b"test-secret-key",
        "global-order-platform",
        Duration::from_secs(3600),
    ))
}

fn app(log: Arc<ChannelLog>, auth: Option<Arc<JwtAuth>>) -> Router {
    let publisher = Arc::new(OrderPublisher::new(log, TOPIC, Duration::from_secs(1)));
    router(publisher, auth)
}

fn post_order(body: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/orders")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_open() {
    let app = app(Arc::new(ChannelLog::new(1)), Some(auth()));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_create_order_accepted_after_append() {
    let log = Arc::new(ChannelLog::new(3));
    let auth = auth();
    let token = auth.issue_token("cashier-1", "cashier").unwrap();
    let app = app(log.clone(), Some(auth));

    let response = app
        .oneshot(post_order(
            r#"{"store_id":"S1","total_amount_cents":599}"#,
            Some(&token),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: OrderAccepted = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(accepted.status, "accepted");
    assert_eq!(log.partition_len(TOPIC, accepted.partition), 1);

    let mut consumer = log.consumer("check", TOPIC).unwrap();
    let record = consumer
        .poll(Duration::from_millis(20))
        .await
        .unwrap()
        .unwrap();
    let event = codec::decode(record.payload.as_deref().unwrap()).unwrap();
    assert_eq!(event.order_id, accepted.order_id);
    assert_eq!(event.store_id, "S1");
    assert_eq!(event.total_amount_cents, 599);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let log = Arc::new(ChannelLog::new(1));
    let app = app(log.clone(), Some(auth()));

    let response = app
        .oneshot(post_order(r#"{"store_id":"S1","total_amount_cents":599}"#, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["error"],
        "Authorization header required"
    );
    assert_eq!(log.partition_len(TOPIC, 0), 0);
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let app = app(Arc::new(ChannelLog::new(1)), Some(auth()));

    let response = app
        .oneshot(post_order(
            r#"{"store_id":"S1","total_amount_cents":599}"#,
            Some("not-a-token"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_disabled_accepts_without_token() {
    let app = app(Arc::new(ChannelLog::new(1)), None);

    let response = app
        .oneshot(post_order(r#"{"store_id":"S2","total_amount_cents":0}"#, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_validation_failures_are_bad_request() {
    let log = Arc::new(ChannelLog::new(1));
    let bodies = [
        r#"{"store_id":"","total_amount_cents":599}"#,
        r#"{"store_id":"   ","total_amount_cents":599}"#,
        r#"{"store_id":"S1","total_amount_cents":-5}"#,
        r#"{"store_id":"S1","total_amount_cents":3000000000}"#,
        r#"{"store_id":"S1"}"#,
        r#"{"total_amount_cents":599}"#,
        r#"not json"#,
    ];

    for body in bodies {
        let response = app(log.clone(), None)
            .oneshot(post_order(body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert!(json_body(response).await["error"].is_string());
    }
    assert_eq!(log.partition_len(TOPIC, 0), 0);
}

#[tokio::test]
async fn test_rejected_publish_is_bad_gateway() {
    let (log, faults) = FaultyLog::wrap(Arc::new(ChannelLog::new(1)));
    faults.fail_next_appends(1);
    let publisher = Arc::new(OrderPublisher::new(
        Arc::new(log),
        TOPIC,
        Duration::from_secs(1),
    ));

    let response = router(publisher, None)
        .oneshot(post_order(r#"{"store_id":"S1","total_amount_cents":599}"#, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(json_body(response).await["order_id"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_publish_is_gateway_timeout() {
    let (log, faults) = FaultyLog::wrap(Arc::new(ChannelLog::new(1)));
    faults.set_append_delay(Duration::from_secs(30));
    let publisher = Arc::new(OrderPublisher::new(
        Arc::new(log),
        TOPIC,
        Duration::from_secs(2),
    ));

    let response = router(publisher, None)
        .oneshot(post_order(r#"{"store_id":"S1","total_amount_cents":599}"#, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = json_body(response).await;
    assert!(body["order_id"].is_string());
}
