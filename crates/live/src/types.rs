//! Public types for the live connection.

use std::time::Duration;

use darkroom_protocol::constants::EventType;
use darkroom_protocol::envelope::Message;

/// Where the live link stands.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    /// WebSocket and join handshake in progress.
    Connecting,
    /// Joined and ready for requests.
    Online,
    /// Connection lost, attempting to reconnect.
    Reconnecting { attempt: u32 },
    /// Not connected and not trying.
    Offline,
}

impl LinkState {
    pub fn is_online(&self) -> bool {
        matches!(self, LinkState::Online)
    }
}

/// Events emitted by [`LiveManager`](crate::LiveManager).
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// The link state changed.
    StateChanged(LinkState),
    /// The server pushed an event that was not a reply.
    Push { event: EventType, message: Message },
    /// A reconnect attempt is scheduled.
    Reconnecting { attempt: u32, next_retry_secs: f64 },
}

/// Where to connect and which gallery to join.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket endpoint, e.g. `wss://gallery.example/live`.
    pub url: String,
    pub group_id: String,
    pub token: String,
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Give up after this many failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based),
    /// with ±25% jitter to avoid thundering herd.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        let with_jitter = (capped + jitter * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_state_equality() {
        assert_eq!(LinkState::Online, LinkState::Online);
        assert_ne!(LinkState::Online, LinkState::Connecting);
        assert_ne!(
            LinkState::Reconnecting { attempt: 1 },
            LinkState::Reconnecting { attempt: 2 },
        );
        assert!(LinkState::Online.is_online());
        assert!(!LinkState::Reconnecting { attempt: 1 }.is_online());
    }

    #[test]
    fn reconnect_config_delay_backoff() {
        let config = ReconnectConfig::default();
        // Base delays: 250ms, 500ms, 1s, 2s, 4s, 8s, 15s (capped), 15s...
        let expected_base = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 15.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let secs = config.delay_for_attempt((i + 1) as u32).as_secs_f64();
            let lo = base * 0.74;
            let hi = base * 1.26;
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }

    #[test]
    fn reconnect_config_attempt_limit() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.allows(10_000));

        let limited = ReconnectConfig {
            max_attempts: Some(3),
            ..ReconnectConfig::default()
        };
        assert!(limited.allows(3));
        assert!(!limited.allows(4));
    }
}
