//! Queued delivery of built request URIs to a CHORDS portal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::outbound::redact_api_key;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid CHORDS host '{host}': {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: url::ParseError,
    },
    #[error("timestamp {0} cannot be rendered as an instant")]
    InvalidTimestamp(f64),
    #[error("no tokio runtime available to run the sender")]
    NoRuntime,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl DeliveryError {
    /// The portal rejected the record itself, so retrying cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            DeliveryError::Request(err) => err.status().is_some_and(is_permanent_status),
            _ => false,
        }
    }
}

/// 4xx except timeouts and rate limiting.
fn is_permanent_status(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

/// Outbound queue shared between the submitting pipeline and a background
/// sender.
pub trait Delivery: Send + Sync {
    /// Starts background sending. Calling it again is a no-op.
    fn start(&self) -> Result<(), DeliveryError>;

    /// Queues `uri` without waiting for it to be sent. Once
    /// `max_queue_length` entries are waiting the oldest is dropped.
    fn enqueue(&self, uri: String, max_queue_length: usize) -> Result<(), DeliveryError>;

    /// Entries not yet acknowledged by the endpoint, including one in flight.
    fn pending(&self) -> usize;
}

#[derive(Clone)]
pub struct ChordsDelivery {
    shared: Arc<Shared>,
}

struct Shared {
    client: reqwest::Client,
    queue: Mutex<VecDeque<String>>,
    in_flight: AtomicUsize,
    started: AtomicBool,
    notify: Notify,
    retry_delay: Duration,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_next(&self) -> Option<String> {
        let mut queue = self.lock_queue();
        let next = queue.pop_front();
        if next.is_some() {
            self.in_flight.store(1, Ordering::SeqCst);
        }
        next
    }

    fn finish(&self) {
        self.in_flight.store(0, Ordering::SeqCst);
    }

    fn requeue_front(&self, uri: String) {
        let mut queue = self.lock_queue();
        queue.push_front(uri);
        self.in_flight.store(0, Ordering::SeqCst);
    }

    async fn send(&self, uri: &str) -> Result<(), DeliveryError> {
        self.client
            .get(uri)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl ChordsDelivery {
    pub fn new(retry_delay: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            shared: Arc::new(Shared {
                client,
                queue: Mutex::new(VecDeque::new()),
                in_flight: AtomicUsize::new(0),
                started: AtomicBool::new(false),
                notify: Notify::new(),
                retry_delay,
            }),
        })
    }
}

impl std::fmt::Debug for ChordsDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChordsDelivery")
            .field("pending", &self.pending())
            .field("started", &self.shared.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl Delivery for ChordsDelivery {
    fn start(&self) -> Result<(), DeliveryError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DeliveryError::NoRuntime)?;
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        runtime.spawn(run_sender(Arc::clone(&self.shared)));
        info!("CHORDS sender started");
        Ok(())
    }

    fn enqueue(&self, uri: String, max_queue_length: usize) -> Result<(), DeliveryError> {
        let limit = max_queue_length.max(1);
        {
            let mut queue = self.shared.lock_queue();
            while queue.len() >= limit {
                if let Some(evicted) = queue.pop_front() {
                    warn!(limit, uri = %redact_api_key(&evicted), "queue full, dropping oldest unsent record");
                }
            }
            queue.push_back(uri);
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    fn pending(&self) -> usize {
        let queue = self.shared.lock_queue();
        queue.len() + self.shared.in_flight.load(Ordering::SeqCst)
    }
}

async fn run_sender(shared: Arc<Shared>) {
    loop {
        let Some(uri) = shared.take_next() else {
            shared.notify.notified().await;
            continue;
        };

        match shared.send(&uri).await {
            Ok(()) => {
                shared.finish();
                debug!(uri = %redact_api_key(&uri), "record delivered");
            }
            Err(err) if err.is_permanent() => {
                shared.finish();
                error!(uri = %redact_api_key(&uri), error = %err, "record rejected, dropping");
            }
            Err(err) => {
                warn!(
                    uri = %redact_api_key(&uri),
                    error = %err,
                    retry_in = ?shared.retry_delay,
                    "delivery failed"
                );
                shared.requeue_front(uri);
                tokio::time::sleep(shared.retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every request with `status_line` and counts the requests.
    async fn serve(status_line: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        (format!("http://{addr}"), hits)
    }

    async fn wait_until_empty(delivery: &ChordsDelivery) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while delivery.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue did not empty");
    }

    #[test]
    fn only_client_errors_are_permanent() {
        assert!(is_permanent_status(StatusCode::BAD_REQUEST));
        assert!(is_permanent_status(StatusCode::UNAUTHORIZED));
        assert!(is_permanent_status(StatusCode::NOT_FOUND));
        assert!(!is_permanent_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_permanent_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_permanent_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_permanent_status(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn accepted_records_leave_the_queue() {
        let (base, hits) = serve("200 OK").await;
        let delivery = ChordsDelivery::new(Duration::from_secs(60)).expect("client");
        delivery.start().expect("start");

        for idx in 0..3 {
            delivery
                .enqueue(format!("{base}/measurements/url_create?n={idx}"), 10)
                .expect("enqueue");
        }

        wait_until_empty(&delivery).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejected_records_are_dropped_instead_of_blocking() {
        let (base, hits) = serve("400 Bad Request").await;
        // A retry would sleep far past the wait below.
        let delivery = ChordsDelivery::new(Duration::from_secs(60)).expect("client");
        delivery.start().expect("start");

        for idx in 0..2 {
            delivery
                .enqueue(format!("{base}/measurements/url_create?n={idx}"), 10)
                .expect("enqueue");
        }

        wait_until_empty(&delivery).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn enqueue_evicts_oldest_when_full() {
        let delivery = ChordsDelivery::new(Duration::from_millis(10)).expect("client");
        for idx in 0..5 {
            delivery
                .enqueue(format!("http://localhost/{idx}"), 3)
                .expect("enqueue");
        }

        assert_eq!(delivery.pending(), 3);
        let queue = delivery.shared.lock_queue();
        assert_eq!(queue.front().map(String::as_str), Some("http://localhost/2"));
    }

    #[test]
    fn start_requires_a_runtime() {
        let delivery = ChordsDelivery::new(Duration::from_millis(10)).expect("client");
        assert!(matches!(delivery.start(), Err(DeliveryError::NoRuntime)));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let delivery = ChordsDelivery::new(Duration::from_millis(10)).expect("client");
        delivery.start().expect("first start");
        delivery.start().expect("second start");
    }
}
