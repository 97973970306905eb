//! End-to-end order pipeline over the in-process log.
//!
//! HTTP request → publisher → log → subscriber → handler → commit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures::future::BoxFuture;
use tower::ServiceExt;

use orderflow::auth::JwtAuth;
use orderflow::bus::{ChannelLog, EventLog, FaultyConsumer, LogConsumer};
use orderflow::event::{codec, OrderCreated, STATUS_NEW};
use orderflow::http::{router, OrderAccepted};
use orderflow::publisher::{AmountCents, OrderPublisher, OrderRequest};
use orderflow::subscriber::{OrderHandler, OrderSubscriber, ProcessingError, RecordOutcome};

const TOPIC: &str = "global.orders.v1";
const GROUP: &str = "kitchen-service-group";

/// Kitchen stand-in that remembers what it processed.
#[derive(Default)]
struct RecordingKitchen {
    processed: Mutex<Vec<OrderCreated>>,
    fail_next: AtomicU32,
}

impl RecordingKitchen {
    fn processed(&self) -> Vec<OrderCreated> {
        self.processed.lock().unwrap().clone()
    }
}

impl OrderHandler for RecordingKitchen {
    fn process(&self, event: Arc<OrderCreated>) -> BoxFuture<'static, Result<(), ProcessingError>> {
        let fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !fail {
            self.processed.lock().unwrap().push((*event).clone());
        }
        Box::pin(async move {
            if fail {
                Err(ProcessingError::new(&event.order_id, "oven offline"))
            } else {
                Ok(())
            }
        })
    }
}

fn kitchen(log: &ChannelLog, recorder: Arc<RecordingKitchen>) -> OrderSubscriber {
    OrderSubscriber::new(Box::new(log.consumer(GROUP, TOPIC).unwrap()), recorder)
        .with_poll_timeout(Duration::from_millis(20))
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
}

fn publisher(log: &Arc<ChannelLog>) -> OrderPublisher {
    OrderPublisher::new(log.clone(), TOPIC, Duration::from_secs(1))
}

#[tokio::test]
async fn test_http_order_reaches_kitchen_and_commits() {
    let log = Arc::new(ChannelLog::new(3));
    let auth = Arc::new(JwtAuth::new(
        b"pipeline-key",
        "global-order-platform",
        Duration::from_secs(60),
    ));
    let token = auth.issue_token("cashier-7", "cashier").unwrap();
    let app = router(Arc::new(publisher(&log)), Some(auth));

    let response = app
        .oneshot(
            Request::post("/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from(r#"{"store_id":"S1","total_amount_cents":599}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let accepted: OrderAccepted = serde_json::from_slice(&bytes).unwrap();

    let recorder = Arc::new(RecordingKitchen::default());
    let mut sub = kitchen(&log, recorder.clone());
    assert!(matches!(sub.poll_once().await, RecordOutcome::Committed(_)));

    let processed = recorder.processed();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].order_id, accepted.order_id);
    assert_eq!(processed[0].store_id, "S1");
    assert_eq!(processed[0].total_amount_cents, 599);
    assert_eq!(processed[0].status, STATUS_NEW);
    assert_eq!(
        log.committed_offset(GROUP, TOPIC, accepted.partition),
        Some(accepted.offset + 1)
    );
}

#[tokio::test]
async fn test_crash_before_commit_reprocesses_after_restart() {
    let log = Arc::new(ChannelLog::new(1));
    let receipt = publisher(&log)
        .publish(OrderRequest::new("S3", AmountCents::new(1250).unwrap()))
        .await
        .unwrap();

    // Worker processes the order, then its commit is lost and it dies.
    let recorder = Arc::new(RecordingKitchen::default());
    {
        let (consumer, faults) = FaultyConsumer::wrap(log.consumer(GROUP, TOPIC).unwrap());
        faults.fail_next_commits(1);
        let mut sub = OrderSubscriber::new(Box::new(consumer), recorder.clone())
            .with_poll_timeout(Duration::from_millis(20));
        assert!(matches!(
            sub.poll_once().await,
            RecordOutcome::CommitFailed { .. }
        ));
    }
    assert_eq!(log.committed_offset(GROUP, TOPIC, 0), None);

    // Replacement worker in the same group sees the order again.
    let mut restarted = kitchen(&log, recorder.clone());
    assert!(matches!(
        restarted.poll_once().await,
        RecordOutcome::Committed(_)
    ));

    let processed = recorder.processed();
    assert_eq!(processed.len(), 2);
    assert_eq!(processed[0].order_id, receipt.order_id);
    assert_eq!(processed[1].order_id, receipt.order_id);
    assert_eq!(log.committed_offset(GROUP, TOPIC, 0), Some(1));
}

#[tokio::test]
async fn test_processing_failure_never_commits() {
    let log = Arc::new(ChannelLog::new(1));
    publisher(&log)
        .publish(OrderRequest::new("S1", AmountCents::new(599).unwrap()))
        .await
        .unwrap();

    let recorder = Arc::new(RecordingKitchen::default());
    recorder.fail_next.store(3, Ordering::SeqCst);
    let mut sub = kitchen(&log, recorder.clone());

    for _ in 0..3 {
        assert!(matches!(
            sub.poll_once().await,
            RecordOutcome::ProcessingFailed { .. }
        ));
        assert_eq!(log.committed_offset(GROUP, TOPIC, 0), None);
    }

    assert!(matches!(sub.poll_once().await, RecordOutcome::Committed(_)));
    assert_eq!(recorder.processed().len(), 1);
}

#[tokio::test]
async fn test_orders_with_same_key_stay_in_order() {
    let log = Arc::new(ChannelLog::new(4));
    let statuses = ["NEW", "PREPARING", "READY", "DELIVERED"];
    for status in statuses {
        let event = OrderCreated {
            order_id: "order-42".to_string(),
            store_id: "S9".to_string(),
            total_amount_cents: 800,
            status: status.to_string(),
            created_at: 1_718_000_000_000,
        };
        log.append(TOPIC, event.partition_key(), &codec::encode(&event))
            .await
            .unwrap();
    }

    let recorder = Arc::new(RecordingKitchen::default());
    let mut sub = kitchen(&log, recorder.clone());
    while !matches!(sub.poll_once().await, RecordOutcome::Idle) {}

    let seen: Vec<String> = recorder.processed().into_iter().map(|e| e.status).collect();
    assert_eq!(seen, statuses);
}

#[tokio::test]
async fn test_undecodable_record_does_not_block_partition() {
    let log = Arc::new(ChannelLog::new(1));
    log.append(TOPIC, b"bad", b"").await.unwrap();
    log.append(TOPIC, b"bad", &[0x02, 0xff]).await.unwrap();
    let receipt = publisher(&log)
        .publish(OrderRequest::new("S1", AmountCents::new(100).unwrap()))
        .await
        .unwrap();

    let recorder = Arc::new(RecordingKitchen::default());
    let mut sub = kitchen(&log, recorder.clone());

    assert!(matches!(sub.poll_once().await, RecordOutcome::Skipped { .. }));
    assert!(matches!(sub.poll_once().await, RecordOutcome::Skipped { .. }));
    assert!(matches!(sub.poll_once().await, RecordOutcome::Committed(_)));

    assert_eq!(recorder.processed()[0].order_id, receipt.order_id);
    assert_eq!(log.committed_offset(GROUP, TOPIC, 0), Some(3));
}

#[tokio::test]
async fn test_second_worker_in_group_is_refused_while_first_holds_assignment() {
    let log = ChannelLog::new(1);
    let mut first = log.consumer(GROUP, TOPIC).unwrap();
    assert!(log.consumer(GROUP, TOPIC).is_err());

    // Other groups read independently.
    assert!(log.consumer("analytics", TOPIC).is_ok());

    first.close().await.unwrap();
    assert!(log.consumer(GROUP, TOPIC).is_ok());
}
