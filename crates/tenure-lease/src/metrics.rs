use prometheus::{IntCounter, IntGauge, Opts, Registry};
use tenure_core::DEFAULT_NAMESPACE;

/// Prometheus collectors describing one elector.
///
/// Cloning shares the underlying collectors.
#[derive(Debug, Clone)]
pub struct ElectionMetrics {
    is_leader: IntGauge,
    attempts: IntCounter,
    renewals: IntCounter,
}

impl ElectionMetrics {
    /// Builds `<namespace>_is_leader`, `<namespace>_election_attempts_total`
    /// and `<namespace>_lease_renewals_total`, labelled with the topic.
    pub fn new(namespace: &str, topic: &str) -> prometheus::Result<Self> {
        Self::with_labels(namespace, &[("topic", topic)])
    }

    /// Collectors for the election on `<election_namespace>:<topic>`, under the
    /// `tenure` metric prefix. Both halves of the key become labels, so the
    /// same topic in two namespaces exports two series.
    pub fn for_election(election_namespace: &str, topic: &str) -> prometheus::Result<Self> {
        Self::with_labels(
            DEFAULT_NAMESPACE,
            &[("namespace", election_namespace), ("topic", topic)],
        )
    }

    fn with_labels(namespace: &str, labels: &[(&str, &str)]) -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| {
            labels.iter().fold(
                Opts::new(name, help).namespace(namespace),
                |opts, (label, value)| opts.const_label(*label, *value),
            )
        };

        Ok(Self {
            is_leader: IntGauge::with_opts(opts(
                "is_leader",
                "Whether this instance currently holds the lease (0 or 1)",
            ))?,
            attempts: IntCounter::with_opts(opts(
                "election_attempts_total",
                "Number of election attempts made by this instance",
            ))?,
            renewals: IntCounter::with_opts(opts(
                "lease_renewals_total",
                "Number of successful lease renewals",
            ))?,
        })
    }

    /// Uses collectors built by the caller.
    pub fn from_parts(is_leader: IntGauge, attempts: IntCounter, renewals: IntCounter) -> Self {
        Self {
            is_leader,
            attempts,
            renewals,
        }
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.is_leader.clone()))?;
        registry.register(Box::new(self.attempts.clone()))?;
        registry.register(Box::new(self.renewals.clone()))?;
        Ok(())
    }

    pub fn is_leader(&self) -> i64 {
        self.is_leader.get()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.get()
    }

    pub fn renewals(&self) -> u64 {
        self.renewals.get()
    }

    pub(crate) fn set_leader(&self, leader: bool) {
        self.is_leader.set(i64::from(leader));
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.inc();
    }

    pub(crate) fn record_renewal(&self) {
        self.renewals.inc();
    }
}
