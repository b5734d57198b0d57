//! Configuration for the duplex channel.

use {
    crate::error::{PubsubError, Result},
    std::time::Duration,
    tungstenite::Message,
};

/// Timers and keepalive behaviour of a [`DuplexChannel`](crate::DuplexChannel).
#[derive(Debug, Clone)]
pub struct PubsubClientConfig {
    /// Period of the keepalive timer started on every successful connect.
    pub keepalive_interval: Duration,

    /// How long a request waits for its reply before failing with
    /// [`PubsubError::AckTimeout`](crate::PubsubError::AckTimeout).
    pub ack_timeout: Duration,

    /// How long a graceful close waits for the remote side before the
    /// socket tasks are aborted.
    pub close_timeout: Duration,

    /// Frame sent on each keepalive tick. `None` makes the tick a no-op.
    pub keepalive_payload: Option<Message>,
}

impl Default for PubsubClientConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(15),
            ack_timeout: Duration::from_secs(60),
            close_timeout: Duration::from_secs(5),
            keepalive_payload: None,
        }
    }
}

impl PubsubClientConfig {
    /// Rejects zero timer periods.
    pub fn validate(&self) -> Result<()> {
        for (name, period) in [
            ("keepalive_interval", self.keepalive_interval),
            ("ack_timeout", self.ack_timeout),
            ("close_timeout", self.close_timeout),
        ] {
            if period.is_zero() {
                return Err(PubsubError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    /// Create a config suitable for local testing with shorter timeouts.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(1),
            ack_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_millis(500),
            keepalive_payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn test_validate() {
        assert!(PubsubClientConfig::default().validate().is_ok());
        assert!(PubsubClientConfig::dev_default().validate().is_ok());

        let zero_keepalive = PubsubClientConfig {
            keepalive_interval: Duration::ZERO,
            ..PubsubClientConfig::default()
        };
        let zero_ack = PubsubClientConfig {
            ack_timeout: Duration::ZERO,
            ..PubsubClientConfig::default()
        };
        let zero_close = PubsubClientConfig {
            close_timeout: Duration::ZERO,
            ..PubsubClientConfig::default()
        };
        for (field, config) in [
            ("keepalive_interval", zero_keepalive),
            ("ack_timeout", zero_ack),
            ("close_timeout", zero_close),
        ] {
            assert_matches!(
                config.validate(),
                Err(PubsubError::InvalidConfig(message)) if message.contains(field)
            );
        }
    }
}
