#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chords_ingest_core::config::{SubmissionConfig, VariableMapping};
use chords_ingest_core::delivery::{Delivery, DeliveryError};

/// Records every enqueue instead of sending. Each `pending` poll acknowledges
/// one queued entry, so drains finish after a predictable number of polls.
#[derive(Default)]
pub struct RecordingDelivery {
    pub started: AtomicBool,
    pub enqueued: Mutex<Vec<String>>,
    pub limits: Mutex<Vec<usize>>,
    outstanding: AtomicUsize,
    pub polls: AtomicUsize,
}

impl RecordingDelivery {
    pub fn with_outstanding(outstanding: usize) -> Self {
        let delivery = Self::default();
        delivery.outstanding.store(outstanding, Ordering::SeqCst);
        delivery
    }

    pub fn enqueued(&self) -> Vec<String> {
        self.enqueued.lock().expect("lock").clone()
    }

    pub fn was_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Delivery for RecordingDelivery {
    fn start(&self) -> Result<(), DeliveryError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn enqueue(&self, uri: String, max_queue_length: usize) -> Result<(), DeliveryError> {
        self.enqueued.lock().expect("lock").push(uri);
        self.limits.lock().expect("lock").push(max_queue_length);
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let current = self.outstanding.load(Ordering::SeqCst);
        if current > 0 {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
        current
    }
}

/// Never empties.
#[derive(Default)]
pub struct StuckDelivery;

impl Delivery for StuckDelivery {
    fn start(&self) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn enqueue(&self, _uri: String, _max_queue_length: usize) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn pending(&self) -> usize {
        7
    }
}

pub fn config(test_mode: bool, sleep_secs: f64) -> SubmissionConfig {
    let text = format!(
        r#"{{
            "instrument_id": 4,
            "api_email": "logger@example.org",
            "api_key": "secret",
            "chords_host": "chords.example.org",
            "time_column_name": "Time",
            "delimiter": ",",
            "sleep_secs": {sleep_secs},
            "max_queue_length": 100,
            "variables": [
                {{"column_name": "Temp", "short_name": "temp"}},
                {{"column_name": "Hum", "short_name": "hum"}},
                {{"column_name": "Wind", "short_name": "wspd"}}
            ]
        }}"#
    );
    SubmissionConfig::from_json_str(&text)
        .expect("test config")
        .with_test_mode(test_mode)
}

pub fn mapping() -> VariableMapping {
    [("Temp", "temp"), ("Hum", "hum")].into_iter().collect()
}
