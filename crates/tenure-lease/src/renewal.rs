use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::ElectorState;
use crate::logger::Logger;

/// Spawns the scheduler for one leadership term.
///
/// Every `period` it asks the engine loop to renew by filling the single slot
/// in `renew_tx`. It never talks to the store itself. It exits when the role
/// is no longer leader, when `term` is cancelled, or when the loop is gone.
pub(crate) fn spawn(
    period: Duration,
    state: Arc<ElectorState>,
    renew_tx: mpsc::Sender<()>,
    term: CancellationToken,
    logger: Arc<dyn Logger>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let every = format!("{period:?}");
        logger.debug("queueing renewals", &[("every", &every)]);

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = term.cancelled() => return,
                _ = ticker.tick() => {
                    if !state.is_leader() {
                        return;
                    }
                    // A full slot already holds a pending renewal.
                    if let Err(TrySendError::Closed(())) = renew_tx.try_send(()) {
                        return;
                    }
                }
            }
        }
    })
}
