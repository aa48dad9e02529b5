use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tenure_core::{DEFAULT_NAMESPACE, Store};

use crate::error::ConfigError;
use crate::logger::{Logger, TracingLogger};
use crate::metrics::ElectionMetrics;

/// Floor for `validity`; shorter leases make the fleet thrash.
pub const MIN_VALIDITY: Duration = Duration::from_secs(10);

pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(15);
pub const DEFAULT_RENEW_BEFORE: Duration = Duration::from_secs(3);
pub const DEFAULT_OBTAIN_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Timing and naming of an election, independent of the store it runs on.
///
/// Durations are (de)serialized as integer milliseconds, e.g.
/// `{"validity_ms": 15000, "renew_before_ms": 3000}`. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionSettings {
    /// How long a lease lives without renewal.
    #[serde(rename = "validity_ms", with = "millis")]
    pub validity: Duration,

    /// How long before expiry the leader renews.
    #[serde(rename = "renew_before_ms", with = "millis")]
    pub renew_before: Duration,

    /// How often followers try to obtain the lease.
    #[serde(rename = "obtain_interval_ms", with = "millis")]
    pub obtain_interval: Duration,

    /// How often the leader verifies the store still agrees with it.
    #[serde(rename = "check_interval_ms", with = "millis")]
    pub check_interval: Duration,

    /// Lower bound enforced on `validity`.
    #[serde(rename = "min_validity_ms", with = "millis")]
    pub min_validity: Duration,

    /// Deadline for a single store call. `None` leaves calls bounded only by
    /// cancellation.
    #[serde(rename = "operation_timeout_ms", with = "millis::option")]
    pub operation_timeout: Option<Duration>,

    pub namespace: String,
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self {
            validity: DEFAULT_VALIDITY,
            renew_before: DEFAULT_RENEW_BEFORE,
            obtain_interval: DEFAULT_OBTAIN_INTERVAL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            min_validity: MIN_VALIDITY,
            operation_timeout: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ElectionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validity < self.min_validity {
            return Err(ConfigError::ValidityTooShort {
                validity: self.validity,
                min: self.min_validity,
            });
        }
        if self.renew_before >= self.validity {
            return Err(ConfigError::RenewBeforeTooLong {
                renew_before: self.renew_before,
                validity: self.validity,
            });
        }
        if self.obtain_interval >= self.validity {
            return Err(ConfigError::ObtainIntervalTooLong {
                obtain_interval: self.obtain_interval,
                validity: self.validity,
            });
        }
        if self.obtain_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("obtain_interval"));
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("check_interval"));
        }
        if self.operation_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::ZeroDuration("operation_timeout"));
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(())
    }

    /// Period of the renewal scheduler.
    pub fn renew_period(&self) -> Duration {
        self.validity.saturating_sub(self.renew_before)
    }
}

/// Everything needed to construct an `Elector`.
pub struct ElectorConfig {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) topic: String,
    pub(crate) settings: ElectionSettings,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) metrics: Option<ElectionMetrics>,
}

impl ElectorConfig {
    pub fn builder<S: Store + 'static>(store: S, topic: impl Into<String>) -> ElectorConfigBuilder {
        ElectorConfigBuilder {
            store: Arc::new(store),
            topic: topic.into(),
            settings: ElectionSettings::default(),
            logger: None,
            metrics: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn settings(&self) -> &ElectionSettings {
        &self.settings
    }
}

/// Builder for [`ElectorConfig`]. Nothing is validated until `Elector::new`.
pub struct ElectorConfigBuilder {
    store: Arc<dyn Store>,
    topic: String,
    settings: ElectionSettings,
    logger: Option<Arc<dyn Logger>>,
    metrics: Option<ElectionMetrics>,
}

impl ElectorConfigBuilder {
    /// Replaces every timing and naming setting at once.
    pub fn settings(mut self, settings: ElectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn validity(mut self, validity: Duration) -> Self {
        self.settings.validity = validity;
        self
    }

    pub fn renew_before(mut self, renew_before: Duration) -> Self {
        self.settings.renew_before = renew_before;
        self
    }

    pub fn obtain_interval(mut self, obtain_interval: Duration) -> Self {
        self.settings.obtain_interval = obtain_interval;
        self
    }

    pub fn check_interval(mut self, check_interval: Duration) -> Self {
        self.settings.check_interval = check_interval;
        self
    }

    pub fn min_validity(mut self, min_validity: Duration) -> Self {
        self.settings.min_validity = min_validity;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.settings.operation_timeout = Some(timeout);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.settings.namespace = namespace.into();
        self
    }

    /// Sets the log sink (default: [`TracingLogger`]).
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Uses caller-owned collectors instead of fresh, unregistered ones.
    pub fn metrics(mut self, metrics: ElectionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ElectorConfig {
        ElectorConfig {
            store: self.store,
            topic: self.topic,
            settings: self.settings,
            logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
            metrics: self.metrics,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
