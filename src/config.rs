use std::time::Duration;

/// Timing configuration of a [crate::BleManager].
///
/// The default values reproduce the behaviour the callers of this library were written
/// against: 5 seconds for connection and disconnection, 100 ms of settle delay, and no
/// timeout on service discovery and notification configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManagerConfig {
    pub(crate) connection_timeout: Duration,
    pub(crate) disconnection_timeout: Duration,
    pub(crate) settle_delay: Duration,
    pub(crate) discovery_timeout: Option<Duration>,
    pub(crate) configuration_timeout: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            disconnection_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(100),
            discovery_timeout: None,
            configuration_timeout: None,
        }
    }
}

impl ManagerConfig {
    /// How long `connect` waits for the platform to report the connection.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// How long `disconnect` waits for the platform before tearing the session down by itself.
    pub fn with_disconnection_timeout(mut self, timeout: Duration) -> Self {
        self.disconnection_timeout = timeout;
        self
    }

    /// Delay between the connect signal and reading the connection result.
    ///
    /// The platform may report several connection state changes in a short burst;
    /// the result is read once they have settled.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Timeout of `discover_services`; `None` waits until the platform answers or the
    /// link is lost.
    pub fn with_discovery_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Timeout of `configure_notification`; `None` waits until the platform answers or
    /// the link is lost.
    pub fn with_configuration_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.configuration_timeout = timeout;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    pub fn disconnection_timeout(&self) -> Duration {
        self.disconnection_timeout
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn discovery_timeout(&self) -> Option<Duration> {
        self.discovery_timeout
    }

    pub fn configuration_timeout(&self) -> Option<Duration> {
        self.configuration_timeout
    }
}
