use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tenure_core::{InstanceId, LeaseKeys};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{ElectionSettings, ElectorConfig};
use crate::error::{ConfigError, LeaseError};
use crate::logger::Logger;
use crate::metrics::ElectionMetrics;
use crate::notifier::EvictionNotifier;
use crate::protocol::LeaseProtocol;
use crate::renewal;

/// What this instance believes about the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => f.write_str("leader"),
            Role::Follower => f.write_str("follower"),
        }
    }
}

/// State shared between the loop, its helper tasks and every handle.
///
/// Only the loop writes `leader`.
pub(crate) struct ElectorState {
    instance: InstanceId,
    leader: AtomicBool,
    initialised: watch::Sender<bool>,
    stop: CancellationToken,
}

impl ElectorState {
    pub(crate) fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            leader: AtomicBool::new(false),
            initialised: watch::Sender::new(false),
            stop: CancellationToken::new(),
        }
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }

    pub(crate) fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::Release);
    }

    /// Flips readiness to true. Returns whether this call did it.
    fn mark_initialised(&self) -> bool {
        self.initialised.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }
}

/// Cheap, cloneable view of a running elector.
#[derive(Clone)]
pub struct ElectorHandle {
    state: Arc<ElectorState>,
    protocol: LeaseProtocol,
}

impl ElectorHandle {
    /// Lock-free read of the current role.
    pub fn is_leader(&self) -> bool {
        self.state.is_leader()
    }

    pub fn role(&self) -> Role {
        if self.is_leader() {
            Role::Leader
        } else {
            Role::Follower
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.state.instance
    }

    /// Asks the loop to exit. Calling it again, or after the loop is gone,
    /// does nothing.
    pub fn stop(&self) {
        self.state.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stop.is_cancelled()
    }

    /// Resolves once the first election attempt has finished, whatever its
    /// outcome. Resolves immediately if that already happened, and never if
    /// the elector was stopped before its first attempt.
    pub async fn initialised(&self) {
        let mut ready = self.state.initialised.subscribe();
        // The sender lives in `state`, which `self` keeps alive.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    pub fn is_initialised(&self) -> bool {
        *self.state.initialised.borrow()
    }

    /// Watch channel behind [`initialised`](Self::initialised). It changes
    /// exactly once, from `false` to `true`.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.state.initialised.subscribe()
    }

    /// Asks the store whether this instance holds the lease right now.
    ///
    /// Read-only; the role is left alone whatever the answer.
    pub async fn verify(&self) -> Result<(), LeaseError> {
        self.protocol.check(&CancellationToken::new()).await
    }
}

/// A leader-election participant for one topic.
///
/// Build with [`Elector::new`], take as many [`ElectorHandle`]s as needed, then
/// drive it with [`Elector::run`]. `run` consumes the elector, so it can only
/// run once.
pub struct Elector {
    state: Arc<ElectorState>,
    protocol: LeaseProtocol,
    notifier: EvictionNotifier,
    settings: ElectionSettings,
    logger: Arc<dyn Logger>,
    metrics: ElectionMetrics,
}

impl Elector {
    /// Validates `config` and prepares an elector with a fresh instance id.
    /// No task is started.
    pub fn new(config: ElectorConfig) -> Result<Self, ConfigError> {
        let ElectorConfig {
            store,
            topic,
            settings,
            logger,
            metrics,
        } = config;

        if topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        settings.validate()?;

        let metrics = match metrics {
            Some(metrics) => metrics,
            None => ElectionMetrics::for_election(&settings.namespace, &topic)?,
        };

        let instance = InstanceId::random();
        let keys = LeaseKeys::new(&settings.namespace, &topic);
        let notifier = EvictionNotifier::new(
            Arc::clone(&store),
            keys.channel(),
            settings.obtain_interval,
            Arc::clone(&logger),
        );
        let protocol = LeaseProtocol::new(store, keys, instance, settings.validity)
            .with_timeout(settings.operation_timeout);

        Ok(Self {
            state: Arc::new(ElectorState::new(instance)),
            protocol,
            notifier,
            settings,
            logger,
            metrics,
        })
    }

    pub fn handle(&self) -> ElectorHandle {
        ElectorHandle {
            state: Arc::clone(&self.state),
            protocol: self.protocol.clone(),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.state.instance
    }

    pub fn keys(&self) -> &LeaseKeys {
        self.protocol.keys()
    }

    pub fn metrics(&self) -> &ElectionMetrics {
        &self.metrics
    }

    /// Runs the election until `cancel` fires or a handle calls `stop`.
    ///
    /// Store failures never end the loop; they only cost the current role.
    /// On the way out a held lease is released using a fresh token, so an
    /// already-cancelled caller still gets a clean hand-over.
    pub async fn run(self, cancel: CancellationToken) {
        let lifetime = cancel.child_token();
        let stop = self.state.stop.clone();
        let settings = self.settings.clone();

        let mut evictions = self.notifier.watch(lifetime.child_token());
        let (attempt_tx, mut attempt_rx) = mpsc::channel::<()>(1);
        let (renew_tx, mut renew_rx) = mpsc::channel::<()>(1);
        let mut obtain_tick = ticker(settings.obtain_interval);
        let mut fallback_tick = ticker(settings.check_interval);

        let mut engine = Engine {
            state: self.state,
            protocol: self.protocol,
            notifier: self.notifier,
            logger: self.logger,
            metrics: self.metrics,
            renew_period: settings.renew_period(),
            renew_tx,
            term: None,
        };

        engine.logger.info(
            "starting leader election",
            &[
                ("instance", &engine.state.instance),
                ("lease", &engine.protocol.keys().lease()),
            ],
        );
        queue(&attempt_tx);

        loop {
            tokio::select! {
                biased;
                _ = lifetime.cancelled() => break,
                _ = stop.cancelled() => break,
                Some(()) = renew_rx.recv() => engine.renew(&lifetime).await,
                _ = fallback_tick.tick() => engine.verify(&lifetime).await,
                Some(()) = evictions.recv() => {
                    engine.logger.info("observed lease eviction", &[]);
                    queue(&attempt_tx);
                }
                _ = obtain_tick.tick() => queue(&attempt_tx),
                Some(()) = attempt_rx.recv() => engine.attempt(&lifetime).await,
            }
        }

        // Unconditional: an obtain or renew cut short by cancellation may
        // still have landed, and a release by a non-holder changes nothing.
        engine.step_down(&CancellationToken::new()).await;
        lifetime.cancel();
        engine.logger.info("stopping leader election", &[]);
    }
}

/// First tick one period from now, unlike `tokio::time::interval`.
fn ticker(period: std::time::Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Fills the attempt slot unless a request is already pending.
fn queue(attempt_tx: &mpsc::Sender<()>) {
    let _ = attempt_tx.try_send(());
}

/// Loop-owned half of an elector. Every role change happens here.
struct Engine {
    state: Arc<ElectorState>,
    protocol: LeaseProtocol,
    notifier: EvictionNotifier,
    logger: Arc<dyn Logger>,
    metrics: ElectionMetrics,
    renew_period: std::time::Duration,
    renew_tx: mpsc::Sender<()>,
    /// Cancels the renewal scheduler of the current leadership term.
    term: Option<CancellationToken>,
}

impl Engine {
    async fn attempt(&mut self, cancel: &CancellationToken) {
        self.metrics.record_attempt();

        if self.state.is_leader() {
            self.logger.info("already the leader", &[]);
        } else {
            match self.protocol.obtain(cancel).await {
                Ok(()) => {
                    self.logger
                        .info("elected leader", &[("instance", &self.state.instance)]);
                    self.elected(cancel);
                }
                Err(LeaseError::NotAcquired) => {
                    self.logger.debug("not the leader", &[]);
                }
                Err(_) if cancel.is_cancelled() => {}
                Err(err) => {
                    self.logger.error("failed to obtain lease", &[("error", &err)]);
                }
            }
        }

        if self.state.mark_initialised() {
            let role = if self.state.is_leader() {
                Role::Leader
            } else {
                Role::Follower
            };
            self.logger
                .debug("first election attempt resolved", &[("role", &role)]);
        }
    }

    fn elected(&mut self, cancel: &CancellationToken) {
        self.state.set_leader(true);
        self.metrics.set_leader(true);

        let term = cancel.child_token();
        renewal::spawn(
            self.renew_period,
            Arc::clone(&self.state),
            self.renew_tx.clone(),
            term.clone(),
            Arc::clone(&self.logger),
        );
        self.term = Some(term);
    }

    async fn renew(&mut self, cancel: &CancellationToken) {
        // Left over from a term that already ended.
        if !self.state.is_leader() {
            return;
        }

        self.logger.debug("renewing lease", &[]);
        match self.protocol.renew(cancel).await {
            Ok(()) => self.metrics.record_renewal(),
            // Shutting down; the exit path releases on a fresh token.
            Err(_) if cancel.is_cancelled() => {}
            Err(err) => {
                self.logger.error("failed to renew lease", &[("error", &err)]);
                self.step_down(cancel).await;
            }
        }
    }

    /// Fallback check: the store must still name us as holder.
    async fn verify(&mut self, cancel: &CancellationToken) {
        if !self.state.is_leader() {
            return;
        }

        match self.protocol.check(cancel).await {
            Ok(()) => {}
            Err(_) if cancel.is_cancelled() => {}
            Err(err) => {
                self.logger.error(
                    "store disagrees with local leadership, correcting state",
                    &[("error", &err)],
                );
                self.step_down(cancel).await;
            }
        }
    }

    /// Gives up leadership: release the lease, tell the followers, become a
    /// follower. Safe to call when not leader; the release is simply refused.
    async fn step_down(&mut self, cancel: &CancellationToken) {
        let was_leader = self.state.is_leader();
        if let Some(term) = self.term.take() {
            term.cancel();
        }

        if let Err(err) = self.protocol.release(cancel).await {
            self.logger.debug("lease not released", &[("error", &err)]);
        }
        if was_leader {
            if let Err(err) = self.notifier.publish(cancel).await {
                self.logger
                    .error("failed to publish eviction", &[("error", &err)]);
            }
            self.logger.info("stepped down", &[("instance", &self.state.instance)]);
        }

        self.state.set_leader(false);
        self.metrics.set_leader(false);
    }
}
