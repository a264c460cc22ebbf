use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use kiosk_engine::{
    cancel_pair,
    payment::{OrderId, PaymentStatus, PaymentStatusSource, PaymentStatusType},
    PaymentPoller,
    PollError,
    PollOptions,
    RequestError,
};
use mockall::mock;
use tokio::time::Instant;

mock! {
    pub StatusSource {}
    impl PaymentStatusSource for StatusSource {
        async fn fetch_payment_status(&self, order_id: &OrderId) -> Result<PaymentStatus, RequestError>;
    }
}

fn status(order_id: &OrderId, payment_status: PaymentStatusType) -> PaymentStatus {
    PaymentStatus::new(order_id.clone(), "K-0042".into(), payment_status)
}

/// A source that replays `script` and then keeps reporting the last entry.
fn scripted(script: Vec<PaymentStatusType>, expected_calls: usize) -> (MockStatusSource, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut source = MockStatusSource::new();
    source.expect_fetch_payment_status().times(expected_calls).returning(move |id| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let next = script.get(n).or(script.last()).copied().unwrap_or_default();
        Ok(status(id, next))
    });
    (source, calls)
}

#[tokio::test(start_paused = true)]
async fn resolves_on_the_first_paid_status() {
    let _ = env_logger::try_init();
    let order_id = OrderId::from("1001");
    let script = vec![PaymentStatusType::Pending, PaymentStatusType::Pending, PaymentStatusType::Paid];
    let (source, calls) = scripted(script, 3);
    let poller = PaymentPoller::new(source, PollOptions::new(120, Duration::from_secs(5)));
    let mut updates = Vec::new();
    let start = Instant::now();
    let paid = poller.poll(&order_id, |s| updates.push(s.payment_status)).await.unwrap();
    assert!(paid.paid);
    assert_eq!(paid.order_number, "K-0042");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(updates, vec![PaymentStatusType::Pending, PaymentStatusType::Pending, PaymentStatusType::Paid]);
    // two 5s intervals between the three checks
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(15), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn times_out_after_max_attempts() {
    let order_id = OrderId::from("1002");
    let (source, calls) = scripted(vec![PaymentStatusType::Pending], 4);
    let poller = PaymentPoller::new(source, PollOptions::new(4, Duration::from_secs(5)));
    let mut seen = 0;
    let err = poller.poll(&order_id, |_| seen += 1).await.unwrap_err();
    assert!(matches!(err, PollError::Timeout { attempts: 4, .. }), "{err}");
    assert!(err.is_user_actionable());
    assert!(err.to_string().contains("ask a member of staff"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(seen, 4);
}

#[tokio::test(start_paused = true)]
async fn failed_and_expired_statuses_keep_polling() {
    let order_id = OrderId::from("1003");
    let script = vec![PaymentStatusType::Failed, PaymentStatusType::Expired, PaymentStatusType::Paid];
    let (source, _calls) = scripted(script, 3);
    let poller = PaymentPoller::new(source, PollOptions::new(10, Duration::from_secs(1)));
    let mut updates = Vec::new();
    let paid = poller.poll(&order_id, |s| updates.push(s.payment_status)).await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatusType::Paid);
    assert_eq!(updates, vec![PaymentStatusType::Failed, PaymentStatusType::Expired, PaymentStatusType::Paid]);
}

#[tokio::test(start_paused = true)]
async fn status_check_errors_end_the_poll() {
    let order_id = OrderId::from("1004");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut source = MockStatusSource::new();
    source.expect_fetch_payment_status().times(2).returning(move |id| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(status(id, PaymentStatusType::Pending))
        } else {
            Err(RequestError::Status { status: 404, message: "Order not found".into() })
        }
    });
    let poller = PaymentPoller::new(source, PollOptions::new(120, Duration::from_secs(5)));
    let err = poller.poll(&order_id, |_| {}).await.unwrap_err();
    match err {
        PollError::StatusCheck { attempts, source, .. } => {
            assert_eq!(attempts, 2);
            assert_eq!(source.status(), Some(404));
        },
        other => panic!("Expected a status check error, got {other}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelling_stops_the_poll() {
    let order_id = OrderId::from("1005");
    let (source, calls) = scripted(vec![PaymentStatusType::Pending], 2);
    let poller = PaymentPoller::new(source, PollOptions::new(120, Duration::from_secs(5)));
    let (canceller, signal) = cancel_pair();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        canceller.cancel();
    });
    let err = poller.poll_with_cancel(&order_id, |_| {}, signal).await.unwrap_err();
    assert!(matches!(err, PollError::Cancelled { attempts: 2, .. }), "{err}");
    assert!(!err.is_user_actionable());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn already_cancelled_polls_make_no_requests() {
    let order_id = OrderId::from("1006");
    let mut source = MockStatusSource::new();
    source.expect_fetch_payment_status().never();
    let poller = PaymentPoller::new(source, PollOptions::default());
    let (canceller, signal) = cancel_pair();
    drop(canceller);
    let err = poller.poll_with_cancel(&order_id, |_| {}, signal).await.unwrap_err();
    assert_eq!(err.attempts(), 0);
}
