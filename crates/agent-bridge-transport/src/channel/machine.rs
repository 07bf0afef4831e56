//! Reconnection state machine for one push channel.

use std::time::Duration;

use crate::config::ReconnectPolicy;

/// Identity of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Raw value, for logs.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Lifecycle phase of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// No connection and nothing scheduled.
    Closed,
    /// A connection attempt is in flight.
    Connecting,
    /// The stream is open.
    Open,
    /// Waiting out a backoff delay before the next attempt.
    ReconnectPending,
}

/// Inputs to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Caller asked for a connection.
    ConnectRequested,
    /// Attempt `id` established its stream.
    Opened(ConnectionId),
    /// Attempt `id` failed to connect or lost its stream.
    Failed(ConnectionId),
    /// The backoff timer armed for `epoch` expired.
    RetryElapsed(u64),
    /// Caller asked to tear the channel down.
    DisconnectRequested,
}

/// Side effects the driver must carry out, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEffect {
    /// Start connection attempt `id`.
    Open(ConnectionId),
    /// Release attempt `id` and everything attached to it.
    Close(ConnectionId),
    /// Arm a timer that reports `RetryElapsed(epoch)` after `delay`.
    ScheduleReconnect {
        epoch: u64,
        attempt: u32,
        delay: Duration,
    },
    /// Drop the armed backoff timer.
    CancelReconnect,
    /// Retries are exhausted; only a manual connect revives the channel.
    GaveUp { attempts: u32 },
}

/// Channel state as a plain value: `{phase, handle, attempts}` plus the
/// epoch that identifies the current backoff timer.
///
/// Events naming a connection other than the current handle, and timers
/// from an older epoch, are ignored. That is what makes late callbacks from
/// superseded or torn-down connections harmless.
#[derive(Debug, Clone)]
pub struct ChannelMachine {
    policy: ReconnectPolicy,
    phase: ChannelPhase,
    handle: Option<ConnectionId>,
    attempts: u32,
    epoch: u64,
    next_id: u64,
}

impl ChannelMachine {
    /// Create a closed channel.
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            phase: ChannelPhase::Closed,
            handle: None,
            attempts: 0,
            epoch: 0,
            next_id: 0,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> ChannelPhase {
        self.phase
    }

    /// Current connection, if any.
    #[must_use]
    pub const fn connection(&self) -> Option<ConnectionId> {
        self.handle
    }

    /// Consecutive failed reconnect attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.phase, ChannelPhase::Open)
    }

    #[must_use]
    pub const fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Apply one event and return the effects to perform.
    pub fn apply(&mut self, event: ChannelEvent) -> Vec<ChannelEffect> {
        match event {
            ChannelEvent::ConnectRequested => self.on_connect(),
            ChannelEvent::Opened(id) => self.on_opened(id),
            ChannelEvent::Failed(id) => self.on_failed(id),
            ChannelEvent::RetryElapsed(epoch) => self.on_retry(epoch),
            ChannelEvent::DisconnectRequested => self.on_disconnect(),
        }
    }

    fn on_connect(&mut self) -> Vec<ChannelEffect> {
        if self.handle.is_some() {
            return Vec::new();
        }
        let mut effects = Vec::with_capacity(2);
        if self.phase == ChannelPhase::ReconnectPending {
            effects.push(ChannelEffect::CancelReconnect);
        }
        effects.push(self.open_new());
        effects
    }

    fn on_opened(&mut self, id: ConnectionId) -> Vec<ChannelEffect> {
        if self.handle != Some(id) || self.phase != ChannelPhase::Connecting {
            return Vec::new();
        }
        self.phase = ChannelPhase::Open;
        self.attempts = 0;
        Vec::new()
    }

    fn on_failed(&mut self, id: ConnectionId) -> Vec<ChannelEffect> {
        if self.handle != Some(id) {
            return Vec::new();
        }
        self.handle = None;
        let mut effects = vec![ChannelEffect::Close(id)];

        if !self.policy.auto_reconnect {
            self.phase = ChannelPhase::Closed;
        } else if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            self.epoch += 1;
            self.phase = ChannelPhase::ReconnectPending;
            effects.push(ChannelEffect::ScheduleReconnect {
                epoch: self.epoch,
                attempt: self.attempts,
                delay: self.policy.delay_for_attempt(self.attempts),
            });
        } else {
            effects.push(ChannelEffect::GaveUp {
                attempts: self.attempts,
            });
            self.attempts = 0;
            self.phase = ChannelPhase::Closed;
        }
        effects
    }

    fn on_retry(&mut self, epoch: u64) -> Vec<ChannelEffect> {
        if self.phase != ChannelPhase::ReconnectPending || epoch != self.epoch {
            return Vec::new();
        }
        vec![self.open_new()]
    }

    fn on_disconnect(&mut self) -> Vec<ChannelEffect> {
        let mut effects = Vec::new();
        if let Some(id) = self.handle.take() {
            effects.push(ChannelEffect::Close(id));
        }
        if self.phase == ChannelPhase::ReconnectPending {
            effects.push(ChannelEffect::CancelReconnect);
        }
        self.phase = ChannelPhase::Closed;
        self.attempts = 0;
        self.epoch += 1;
        effects
    }

    fn open_new(&mut self) -> ChannelEffect {
        self.next_id += 1;
        self.epoch += 1;
        let id = ConnectionId(self.next_id);
        self.handle = Some(id);
        self.phase = ChannelPhase::Connecting;
        ChannelEffect::Open(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(500);

    fn machine(max_attempts: u32) -> ChannelMachine {
        ChannelMachine::new(
            ReconnectPolicy::default()
                .with_base_interval(INTERVAL)
                .with_max_attempts(max_attempts),
        )
    }

    fn opened_id(effects: &[ChannelEffect]) -> ConnectionId {
        effects
            .iter()
            .find_map(|e| match e {
                ChannelEffect::Open(id) => Some(*id),
                _ => None,
            })
            .expect("no Open effect")
    }

    #[test]
    fn test_connect_then_open() {
        let mut m = machine(3);
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        assert_eq!(m.phase(), ChannelPhase::Connecting);
        assert!(m.apply(ChannelEvent::Opened(id)).is_empty());
        assert!(m.is_connected());
    }

    #[test]
    fn test_connect_with_live_handle_is_noop() {
        let mut m = machine(3);
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        m.apply(ChannelEvent::Failed(id));
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        assert_eq!(m.attempts(), 1);

        assert!(m.apply(ChannelEvent::ConnectRequested).is_empty());
        assert_eq!(m.connection(), Some(id));
        assert_eq!(m.attempts(), 1);
    }

    #[test]
    fn test_three_retries_with_doubling_delay_then_give_up() {
        let mut m = machine(3);
        let mut id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        let mut delays = Vec::new();

        loop {
            let effects = m.apply(ChannelEvent::Failed(id));
            assert_eq!(effects[0], ChannelEffect::Close(id));
            match effects.get(1) {
                Some(ChannelEffect::ScheduleReconnect { epoch, attempt, delay }) => {
                    assert_eq!(*attempt as usize, delays.len() + 1);
                    delays.push(*delay);
                    id = opened_id(&m.apply(ChannelEvent::RetryElapsed(*epoch)));
                }
                Some(ChannelEffect::GaveUp { attempts }) => {
                    assert_eq!(*attempts, 3);
                    break;
                }
                other => panic!("unexpected effect {other:?}"),
            }
        }

        assert_eq!(delays, vec![INTERVAL, INTERVAL * 2, INTERVAL * 4]);
        assert_eq!(m.attempts(), 0);
        assert_eq!(m.phase(), ChannelPhase::Closed);
        assert_eq!(m.connection(), None);
    }

    #[test]
    fn test_delay_is_capped() {
        let mut m = ChannelMachine::new(
            ReconnectPolicy::default()
                .with_base_interval(Duration::from_secs(20))
                .with_max_attempts(5),
        );
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        let effects = m.apply(ChannelEvent::Failed(id));
        let ChannelEffect::ScheduleReconnect { epoch, delay, .. } = effects[1] else {
            panic!("expected reconnect");
        };
        assert_eq!(delay, Duration::from_secs(20));

        let id = opened_id(&m.apply(ChannelEvent::RetryElapsed(epoch)));
        let effects = m.apply(ChannelEvent::Failed(id));
        assert!(matches!(
            effects[1],
            ChannelEffect::ScheduleReconnect { attempt: 2, delay, .. }
                if delay == Duration::from_secs(30)
        ));
    }

    #[test]
    fn test_successful_open_resets_attempts() {
        let mut m = machine(3);
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        let effects = m.apply(ChannelEvent::Failed(id));
        let ChannelEffect::ScheduleReconnect { epoch, .. } = effects[1] else {
            panic!("expected reconnect");
        };
        let id = opened_id(&m.apply(ChannelEvent::RetryElapsed(epoch)));
        assert_eq!(m.attempts(), 1);
        m.apply(ChannelEvent::Opened(id));
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn test_stale_open_after_disconnect_is_noop() {
        let mut m = machine(3);
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        assert_eq!(m.apply(ChannelEvent::DisconnectRequested), vec![ChannelEffect::Close(id)]);

        assert!(m.apply(ChannelEvent::Opened(id)).is_empty());
        assert!(m.apply(ChannelEvent::Failed(id)).is_empty());
        assert_eq!(m.phase(), ChannelPhase::Closed);
        assert_eq!(m.attempts(), 0);
        assert!(!m.is_connected());
    }

    #[test]
    fn test_events_for_superseded_connection_ignored() {
        let mut m = machine(3);
        let old = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        m.apply(ChannelEvent::DisconnectRequested);
        let new = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        assert_ne!(old, new);

        assert!(m.apply(ChannelEvent::Failed(old)).is_empty());
        assert_eq!(m.connection(), Some(new));
        m.apply(ChannelEvent::Opened(new));
        assert!(m.is_connected());
    }

    #[test]
    fn test_stale_retry_after_disconnect_and_reconnect_is_ignored() {
        let mut m = machine(3);
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        let effects = m.apply(ChannelEvent::Failed(id));
        let ChannelEffect::ScheduleReconnect { epoch, .. } = effects[1] else {
            panic!("expected reconnect");
        };

        let effects = m.apply(ChannelEvent::DisconnectRequested);
        assert_eq!(effects, vec![ChannelEffect::CancelReconnect]);
        let live = opened_id(&m.apply(ChannelEvent::ConnectRequested));

        assert!(m.apply(ChannelEvent::RetryElapsed(epoch)).is_empty());
        assert_eq!(m.connection(), Some(live));
    }

    #[test]
    fn test_manual_connect_during_backoff_cancels_timer() {
        let mut m = machine(3);
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        m.apply(ChannelEvent::Failed(id));
        assert_eq!(m.phase(), ChannelPhase::ReconnectPending);

        let effects = m.apply(ChannelEvent::ConnectRequested);
        assert_eq!(effects[0], ChannelEffect::CancelReconnect);
        assert!(matches!(effects[1], ChannelEffect::Open(_)));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut m = machine(3);
        assert!(m.apply(ChannelEvent::DisconnectRequested).is_empty());
        assert!(m.apply(ChannelEvent::DisconnectRequested).is_empty());
        assert!(!m.is_connected());
        assert_eq!(m.phase(), ChannelPhase::Closed);
    }

    #[test]
    fn test_without_auto_reconnect_stays_closed() {
        let mut m = ChannelMachine::new(ReconnectPolicy::manual());
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        m.apply(ChannelEvent::Opened(id));

        assert_eq!(m.apply(ChannelEvent::Failed(id)), vec![ChannelEffect::Close(id)]);
        assert_eq!(m.phase(), ChannelPhase::Closed);
        assert!(matches!(
            m.apply(ChannelEvent::ConnectRequested).as_slice(),
            [ChannelEffect::Open(_)]
        ));
    }

    #[test]
    fn test_manual_connect_after_giving_up_starts_backoff_over() {
        let mut m = machine(1);
        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        let effects = m.apply(ChannelEvent::Failed(id));
        let ChannelEffect::ScheduleReconnect { epoch, .. } = effects[1] else {
            panic!("expected reconnect");
        };
        let id = opened_id(&m.apply(ChannelEvent::RetryElapsed(epoch)));
        assert!(matches!(
            m.apply(ChannelEvent::Failed(id))[1],
            ChannelEffect::GaveUp { attempts: 1 }
        ));

        let id = opened_id(&m.apply(ChannelEvent::ConnectRequested));
        let effects = m.apply(ChannelEvent::Failed(id));
        assert!(matches!(
            effects[1],
            ChannelEffect::ScheduleReconnect { attempt: 1, delay, .. } if delay == INTERVAL
        ));
    }
}
