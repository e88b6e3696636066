use std::time::Duration;

pub const DEFAULT_PORT: u16 = 50000;

/// Settings to use when talking to a receiver. Can be created with [`ConnectionSettingsBuilder`].
///
/// The disconnect delay and operation spacing are hardware-empirical: the receiver only serves
/// one TCP client and needs a moment to free the slot after a close.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// How long to wait for the unsolicited echo frame which follows an RC5 command.
    pub echo_drain_timeout: Duration,
    /// Pause after every socket close before the connection slot is considered free.
    pub disconnect_delay: Duration,
    /// Minimum time between the end of one operation and the next connect.
    pub operation_spacing: Duration,
}

impl ConnectionSettings {
    /// Default settings for the receiver at `host`.
    pub fn new(host: &str) -> Self {
        ConnectionSettingsBuilder::new(host).build()
    }
}

/// Build a [`ConnectionSettings`] instance.
///
/// Examples:
/// ```
/// use std::time::Duration;
///
/// use lexicon_av::ConnectionSettingsBuilder;
///
/// // Default connection settings
/// ConnectionSettingsBuilder::new("192.168.1.50").build();
///
/// // Connection settings with overrides
/// ConnectionSettingsBuilder::new("lexicon.local")
///     .with_port(50001)
///     .with_disconnect_delay(Duration::from_millis(100))
///     .build();
/// ```
pub struct ConnectionSettingsBuilder {
    host: String,
    port: u16,
    connect_timeout: Duration,
    command_timeout: Duration,
    echo_drain_timeout: Duration,
    disconnect_delay: Duration,
    operation_spacing: Duration,
}

impl ConnectionSettingsBuilder {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(3),
            command_timeout: Duration::from_secs(3),
            echo_drain_timeout: Duration::from_millis(150),
            disconnect_delay: Duration::from_millis(50),
            operation_spacing: Duration::from_millis(100),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_echo_drain_timeout(mut self, timeout: Duration) -> Self {
        self.echo_drain_timeout = timeout;
        self
    }

    pub fn with_disconnect_delay(mut self, delay: Duration) -> Self {
        self.disconnect_delay = delay;
        self
    }

    pub fn with_operation_spacing(mut self, spacing: Duration) -> Self {
        self.operation_spacing = spacing;
        self
    }

    pub fn build(&mut self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            echo_drain_timeout: self.echo_drain_timeout,
            disconnect_delay: self.disconnect_delay,
            operation_spacing: self.operation_spacing,
        }
    }
}

// ================================================================================================
// Tests
