use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tenure_core::{Store, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::logger::Logger;

/// Payload of an eviction broadcast. Receivers ignore the content.
pub const EVICTED: &[u8] = b"evicted";

/// Topic-scoped eviction broadcasts.
///
/// Purely a latency optimisation: the obtain and fallback ticks converge the
/// fleet even when every notification is lost.
#[derive(Clone)]
pub struct EvictionNotifier {
    store: Arc<dyn Store>,
    channel: String,
    resubscribe_after: Duration,
    logger: Arc<dyn Logger>,
}

impl EvictionNotifier {
    pub fn new(
        store: Arc<dyn Store>,
        channel: impl Into<String>,
        resubscribe_after: Duration,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            store,
            channel: channel.into(),
            resubscribe_after,
            logger,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Tells every subscriber of the topic that the lease is up for grabs.
    pub async fn publish(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
            published = self.store.publish(&self.channel, EVICTED) => published,
        }
    }

    /// Spawns a task turning every message on the channel into one slot in the
    /// returned queue. Messages arriving while the slot is full are coalesced.
    ///
    /// The task keeps resubscribing until `cancel` fires.
    pub fn watch(&self, cancel: CancellationToken) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        let notifier = self.clone();
        tokio::spawn(async move { notifier.forward(tx, cancel).await });
        rx
    }

    async fn forward(self, tx: mpsc::Sender<()>, cancel: CancellationToken) {
        loop {
            let subscribed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                subscribed = self.store.subscribe(&self.channel) => subscribed,
            };

            match subscribed {
                Ok(mut messages) => loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        message = messages.next() => match message {
                            Some(_) => {
                                if let Err(mpsc::error::TrySendError::Closed(())) = tx.try_send(()) {
                                    return;
                                }
                            }
                            None => {
                                self.logger.debug(
                                    "eviction subscription ended",
                                    &[("channel", &self.channel)],
                                );
                                break;
                            }
                        },
                    }
                },
                Err(err) => self.logger.error(
                    "failed to subscribe to eviction channel",
                    &[("channel", &self.channel), ("error", &err)],
                ),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.resubscribe_after) => {}
            }
        }
    }
}
