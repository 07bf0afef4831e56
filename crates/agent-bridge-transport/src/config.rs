//! Transport configuration.

use std::time::Duration;

/// Upper bound on any single reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Reconnection behaviour shared by both push channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnect automatically after a channel error.
    pub auto_reconnect: bool,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each following one.
    pub base_interval: Duration,
    /// Cap applied to every delay.
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Policy that never reconnects on its own.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            auto_reconnect: false,
            ..Self::default()
        }
    }

    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base interval.
    #[must_use]
    pub const fn with_base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based):
    /// `min(2^(attempt-1) * base_interval, max_delay)`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_interval
            .checked_mul(1 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_attempts: 5,
            base_interval: Duration::from_secs(1),
            max_delay: MAX_RECONNECT_DELAY,
        }
    }
}

/// Configuration for a [`BackendTransport`](crate::BackendTransport).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Backend base URL, without trailing slash.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
    /// Timeout for a whole HTTP request.
    pub request_timeout: Duration,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Extra headers sent with requests and stream connections.
    pub headers: Vec<(String, String)>,
    /// Channel reconnection policy.
    pub reconnect: ReconnectPolicy,
}

impl BridgeConfig {
    /// Create a configuration for the given backend.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            headers: Vec::new(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a custom header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Absolute URL for a path starting with `/`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Headers common to every request: custom headers plus authorization.
    #[must_use]
    pub fn common_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if let Some(token) = &self.auth_token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000/api")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_waits_base_interval() {
        let policy = ReconnectPolicy::default().with_base_interval(Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(250));
    }

    #[test]
    fn test_delay_doubles_and_caps_at_thirty_seconds() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=7)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        assert_eq!(policy.delay_for_attempt(u32::MAX), MAX_RECONNECT_DELAY);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = BridgeConfig::new("http://localhost:8080/api/");
        assert_eq!(config.url("/chat/sessions"), "http://localhost:8080/api/chat/sessions");
    }

    #[test]
    fn test_auth_header_added_when_token_set() {
        let config = BridgeConfig::new("http://x")
            .with_header("X-Client", "editor")
            .with_auth_token("secret");
        assert_eq!(
            config.common_headers(),
            vec![
                ("X-Client".to_string(), "editor".to_string()),
                ("Authorization".to_string(), "Bearer secret".to_string()),
            ]
        );
        assert!(BridgeConfig::new("http://x").common_headers().is_empty());
    }

    #[test]
    fn test_manual_policy_disables_auto_reconnect() {
        let policy = ReconnectPolicy::manual();
        assert!(!policy.auto_reconnect);
        assert_eq!(policy.max_attempts, 5);
    }
}
