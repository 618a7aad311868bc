use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SubmissionConfig;
use crate::delivery::{Delivery, DeliveryError};
use crate::mapper::VariableRecord;
use crate::outbound::{build_record_uri, redact_api_key, OutboundRecord};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Draining { remaining: usize },
    Drained,
}

impl DrainState {
    pub fn is_drained(&self) -> bool {
        matches!(self, DrainState::Drained)
    }
}

/// Outcome of a single `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub uri: String,
    pub enqueued: bool,
}

/// Paced producer over a [`Delivery`] handle.
#[derive(Clone)]
pub struct SubmissionPipeline {
    delivery: Arc<dyn Delivery>,
}

impl std::fmt::Debug for SubmissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionPipeline")
            .field("pending", &self.delivery.pending())
            .finish()
    }
}

impl SubmissionPipeline {
    pub fn new(delivery: Arc<dyn Delivery>) -> Self {
        Self { delivery }
    }

    /// Starts the background sender unless the run is in test mode.
    pub fn start(&self, config: &SubmissionConfig) -> Result<(), DeliveryError> {
        if config.test_mode {
            info!("test mode, records will not be sent");
            return Ok(());
        }
        self.delivery.start()
    }

    /// Builds and queues one record, then sleeps `config.sleep` whether or not
    /// the record was queued.
    pub async fn submit(
        &self,
        record: &VariableRecord,
        config: &SubmissionConfig,
    ) -> Result<Submission, DeliveryError> {
        let uri = build_record_uri(&config.chords_host, &OutboundRecord::new(config, record))?;
        info!(uri = %redact_api_key(&uri), "submitting");

        let enqueued = if config.test_mode {
            false
        } else {
            self.delivery
                .enqueue(uri.clone(), config.max_queue_length)?;
            true
        };

        tokio::time::sleep(config.sleep).await;
        Ok(Submission { uri, enqueued })
    }

    pub fn state(&self) -> DrainState {
        match self.delivery.pending() {
            0 => DrainState::Drained,
            remaining => DrainState::Draining { remaining },
        }
    }

    /// Waits until nothing is pending. There is no timeout; cancelling
    /// `cancel` stops the wait and returns the last `Draining` state.
    pub async fn drain(
        &self,
        poll_interval: Duration,
        cancel: Option<&CancellationToken>,
    ) -> DrainState {
        let mut state = self.state();

        while let DrainState::Draining { remaining } = state {
            info!(remaining, "queue length");
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            warn!(remaining, "drain cancelled with records still queued");
                            return state;
                        }
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
                None => tokio::time::sleep(poll_interval).await,
            }
            state = self.state();
        }

        info!("queue drained");
        state
    }
}
