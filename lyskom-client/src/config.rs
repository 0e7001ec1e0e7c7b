//! Client configuration.

use std::time::Duration;

use protocol_lyskom::TokenLimits;

use crate::Error;

/// The IANA-registered LysKOM port.
pub const DEFAULT_PORT: u16 = 4894;

/// Configuration for a [`Client`](crate::Client) connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server TCP port.
    pub port: u16,
    /// User name sent in the client handshake. `None` takes `$USER` /
    /// `$LOGNAME` from the environment, falling back to `unknown`.
    pub user: Option<String>,
    /// Maximum number of requests awaiting replies. Further `call`s fail
    /// with [`Error::TooManyInFlight`] until replies drain.
    pub max_in_flight: usize,
    /// Timeout covering TCP connect and the server handshake. `None` waits
    /// indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Enable TCP_NODELAY on the connection.
    pub tcp_nodelay: bool,
    /// Tokenizer limits for data received from the server.
    pub token_limits: TokenLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            user: None,
            max_in_flight: 128,
            connect_timeout: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            token_limits: TokenLimits::default(),
        }
    }
}

impl ClientConfig {
    /// Validate configuration values. Returns an error if any value is out
    /// of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero"));
        }
        if self.max_in_flight == 0 {
            return Err(Error::Config("max_in_flight must be > 0"));
        }
        if self.token_limits.max_string_len == 0 {
            return Err(Error::Config("token_limits.max_string_len must be > 0"));
        }
        if self.token_limits.max_int_digits == 0 {
            return Err(Error::Config("token_limits.max_int_digits must be > 0"));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`] with discoverable methods and `build()`
/// validation.
///
/// # Example
///
/// ```
/// use lyskom_client::ClientConfigBuilder;
/// use std::time::Duration;
///
/// let config = ClientConfigBuilder::new()
///     .port(4894)
///     .user("oskar")
///     .max_in_flight(32)
///     .connect_timeout(Duration::from_secs(5))
///     .build()
///     .expect("invalid config");
/// ```
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the user name sent in the client handshake.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    /// Set the maximum number of requests awaiting replies.
    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.config.max_in_flight = n;
        self
    }

    /// Set the connect-and-handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Wait indefinitely for connect and handshake.
    pub fn no_connect_timeout(mut self) -> Self {
        self.config.connect_timeout = None;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.config.tcp_nodelay = enable;
        self
    }

    /// Set tokenizer limits for received data.
    pub fn token_limits(mut self, limits: TokenLimits) -> Self {
        self.config.token_limits = limits;
        self
    }

    /// Validate and build the final [`ClientConfig`].
    pub fn build(self) -> Result<ClientConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ClientConfig::default().validate().is_ok());
        assert_eq!(ClientConfig::default().port, 4894);
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(ClientConfigBuilder::new().port(0).build().is_err());
        assert!(ClientConfigBuilder::new().max_in_flight(0).build().is_err());
    }
}
