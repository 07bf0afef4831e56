//! Tokio driver for a [`ChannelMachine`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agent_bridge_core::Dispatcher;
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    ChannelKind,
    machine::{ChannelEffect, ChannelEvent, ChannelMachine, ChannelPhase, ConnectionId},
};
use crate::{
    BridgeConfig,
    sse::{EventStreamConnector, StreamEvent},
};

/// Point-in-time view of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub phase: ChannelPhase,
    pub attempts: u32,
    pub connected: bool,
}

/// Owns one push channel: opens the stream, routes its events into the
/// dispatcher and reconnects with backoff when it breaks.
///
/// `connect` spawns tasks and must be called within a tokio runtime.
/// Dropping the controller disconnects it.
pub struct ChannelController {
    inner: Arc<Inner>,
}

struct Inner {
    kind: ChannelKind,
    url: String,
    headers: Vec<(String, String)>,
    connector: Arc<dyn EventStreamConnector>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<DriverState>,
}

struct DriverState {
    machine: ChannelMachine,
    live: Option<(ConnectionId, CancellationToken)>,
    retry: Option<CancellationToken>,
}

impl ChannelController {
    /// Create a disconnected channel of the given kind.
    #[must_use]
    pub fn new(
        kind: ChannelKind,
        config: &BridgeConfig,
        connector: Arc<dyn EventStreamConnector>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                url: config.url(kind.path()),
                headers: config.common_headers(),
                connector,
                dispatcher,
                state: Mutex::new(DriverState {
                    machine: ChannelMachine::new(config.reconnect.clone()),
                    live: None,
                    retry: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.inner.kind
    }

    /// Open the channel. No-op while a connection exists or is being made.
    pub fn connect(&self) {
        Inner::apply(&self.inner, ChannelEvent::ConnectRequested);
    }

    /// Close the channel and cancel any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        Inner::apply(&self.inner, ChannelEvent::DisconnectRequested);
    }

    /// Whether the stream is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().machine.is_connected()
    }

    #[must_use]
    pub fn snapshot(&self) -> ChannelSnapshot {
        let state = self.inner.lock();
        ChannelSnapshot {
            phase: state.machine.phase(),
            attempts: state.machine.attempts(),
            connected: state.machine.is_connected(),
        }
    }
}

impl Drop for ChannelController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for ChannelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelController")
            .field("kind", &self.inner.kind)
            .field("url", &self.inner.url)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed an event to the machine and carry out its effects while still
    /// holding the lock, so effects from concurrent events never interleave.
    ///
    /// Returns whether the event moved the channel to another phase.
    fn apply(this: &Arc<Self>, event: ChannelEvent) -> bool {
        let mut state = this.lock();
        let before = state.machine.phase();
        for effect in state.machine.apply(event) {
            this.execute(&mut state, effect);
        }
        state.machine.phase() != before
    }

    fn execute(self: &Arc<Self>, state: &mut DriverState, effect: ChannelEffect) {
        let channel = self.kind.name();
        match effect {
            ChannelEffect::Open(id) => {
                debug!(channel, connection = id.get(), url = %self.url, "Opening event stream");
                let token = CancellationToken::new();
                state.live = Some((id, token.clone()));
                tokio::spawn(run_connection(Arc::clone(self), id, token));
            }
            ChannelEffect::Close(id) => {
                if let Some((live, token)) = state.live.take() {
                    if live == id {
                        token.cancel();
                    } else {
                        state.live = Some((live, token));
                    }
                }
            }
            ChannelEffect::ScheduleReconnect {
                epoch,
                attempt,
                delay,
            } => {
                info!(
                    channel,
                    attempt,
                    max_attempts = state.machine.policy().max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reconnect"
                );
                let token = CancellationToken::new();
                if let Some(previous) = state.retry.replace(token.clone()) {
                    previous.cancel();
                }
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::select! {
                        () = token.cancelled() => {}
                        () = tokio::time::sleep(delay) => {
                            Self::apply(&this, ChannelEvent::RetryElapsed(epoch));
                        }
                    }
                });
            }
            ChannelEffect::CancelReconnect => {
                if let Some(token) = state.retry.take() {
                    token.cancel();
                }
            }
            ChannelEffect::GaveUp { attempts } => {
                error!(channel, attempts, "Reconnect attempts exhausted, channel closed");
            }
        }
    }

    fn dispatch(&self, event: &StreamEvent) {
        let channel = self.kind.name();
        let Some(message_type) = self.kind.route(&event.event) else {
            trace!(channel, event = %event.event, "Ignoring unrouted stream event");
            return;
        };

        let payload: Value = match serde_json::from_str(&event.data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    channel,
                    event = %event.event,
                    error = %e,
                    "Dropping stream event with malformed data"
                );
                return;
            }
        };
        let payload = self.kind.prepare_payload(&event.event, payload);

        // Observers have already seen the failure; the stream keeps going.
        if let Err(e) = self.dispatcher.invoke(message_type, payload, None) {
            debug!(channel, message_type = %message_type, error = %e, "Inbound handler failed");
        }
    }
}

async fn run_connection(inner: Arc<Inner>, id: ConnectionId, token: CancellationToken) {
    let channel = inner.kind.name();

    let connected = tokio::select! {
        biased;
        () = token.cancelled() => return,
        result = inner.connector.connect(&inner.url, &inner.headers) => result,
    };

    let mut stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            warn!(channel, connection = id.get(), error = %e, "Event stream connection failed");
            Inner::apply(&inner, ChannelEvent::Failed(id));
            return;
        }
    };

    if !Inner::apply(&inner, ChannelEvent::Opened(id)) {
        debug!(channel, connection = id.get(), "Dropping superseded event stream");
        return;
    }
    info!(channel, connection = id.get(), "Event stream open");

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(channel, connection = id.get(), "Event stream closed");
                return;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => inner.dispatch(&event),
                Some(Err(e)) => {
                    warn!(channel, connection = id.get(), error = %e, "Event stream error");
                    Inner::apply(&inner, ChannelEvent::Failed(id));
                    return;
                }
                None => {
                    warn!(channel, connection = id.get(), "Event stream ended");
                    Inner::apply(&inner, ChannelEvent::Failed(id));
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use agent_bridge_core::protocol::{ChatEvent, WorkflowEvent};
    use async_trait::async_trait;
    use futures::stream;
    use tokio::{
        sync::{Notify, mpsc},
        time::Instant,
    };
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::{ReconnectPolicy, TransportError, sse::EventStream};

    enum Step {
        Fail,
        Stream(EventStream),
        Pending,
        Gate(Arc<Notify>, EventStream),
    }

    /// Connector that plays back a script, then repeats `exhausted`.
    struct ScriptedConnector {
        script: Mutex<VecDeque<Step>>,
        fail_when_exhausted: bool,
        calls: Mutex<Vec<Instant>>,
        headers: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Step>, fail_when_exhausted: bool) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fail_when_exhausted,
                calls: Mutex::new(Vec::new()),
                headers: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventStreamConnector for ScriptedConnector {
        async fn connect(
            &self,
            _url: &str,
            headers: &[(String, String)],
        ) -> Result<EventStream, TransportError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.headers.lock().unwrap().push(headers.to_vec());
            let step = self.script.lock().unwrap().pop_front();
            let step = step.unwrap_or(if self.fail_when_exhausted {
                Step::Fail
            } else {
                Step::Pending
            });
            match step {
                Step::Fail => Err(TransportError::stream("connection refused")),
                Step::Stream(stream) => Ok(stream),
                Step::Pending => futures::future::pending().await,
                Step::Gate(gate, stream) => {
                    gate.notified().await;
                    Ok(stream)
                }
            }
        }
    }

    fn config(policy: ReconnectPolicy) -> BridgeConfig {
        BridgeConfig::new("http://backend/api").with_reconnect(policy)
    }

    fn controller(
        kind: ChannelKind,
        policy: ReconnectPolicy,
        connector: Arc<ScriptedConnector>,
    ) -> (ChannelController, Arc<Dispatcher>) {
        let dispatcher = Arc::new(Dispatcher::new());
        let controller =
            ChannelController::new(kind, &config(policy), connector, Arc::clone(&dispatcher));
        (controller, dispatcher)
    }

    fn channel() -> (
        mpsc::UnboundedSender<Result<StreamEvent, TransportError>>,
        EventStream,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, UnboundedReceiverStream::new(rx).boxed())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_doubling_delays_then_gives_up() {
        let connector = ScriptedConnector::new(Vec::new(), true);
        let policy = ReconnectPolicy::default()
            .with_base_interval(Duration::from_millis(100))
            .with_max_attempts(3);
        let (controller, _) = controller(ChannelKind::Primary, policy, Arc::clone(&connector));

        controller.connect();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let calls = connector.calls();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, ChannelPhase::Closed);
        assert_eq!(snapshot.attempts, 0);
        assert!(!snapshot.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connecting_is_noop() {
        let connector = ScriptedConnector::new(vec![Step::Pending], false);
        let (controller, _) = controller(
            ChannelKind::Primary,
            ReconnectPolicy::default(),
            Arc::clone(&connector),
        );

        controller.connect();
        settle().await;
        controller.connect();
        settle().await;

        assert_eq!(connector.calls().len(), 1);
        assert_eq!(controller.snapshot().phase, ChannelPhase::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_open_stays_closed() {
        let gate = Arc::new(Notify::new());
        let (tx, stream) = channel();
        let connector = ScriptedConnector::new(vec![Step::Gate(Arc::clone(&gate), stream)], false);
        let (controller, dispatcher) =
            controller(ChannelKind::Primary, ReconnectPolicy::default(), connector);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        dispatcher.on::<ChatEvent, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        controller.connect();
        settle().await;
        controller.disconnect();
        gate.notify_one();
        let _ = tx.send(Ok(StreamEvent::new("chat/event", r#"{"sessionId":"s","type":"x"}"#)));
        settle().await;

        assert!(!controller.is_connected());
        assert_eq!(controller.snapshot().phase, ChannelPhase::Closed);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    fn live_id(controller: &ChannelController) -> ConnectionId {
        controller.inner.lock().live.as_ref().map(|(id, _)| *id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_reports_only_real_transitions() {
        let connector = ScriptedConnector::new(vec![], false);
        let (controller, _) =
            controller(ChannelKind::Primary, ReconnectPolicy::default(), connector);

        controller.connect();
        let first = live_id(&controller);
        assert!(Inner::apply(&controller.inner, ChannelEvent::Opened(first)));
        assert!(!Inner::apply(&controller.inner, ChannelEvent::Opened(first)));
        assert!(controller.is_connected());

        controller.disconnect();
        controller.connect();
        let second = live_id(&controller);
        assert!(!Inner::apply(&controller.inner, ChannelEvent::Opened(first)));
        assert_eq!(controller.snapshot().phase, ChannelPhase::Connecting);
        assert!(Inner::apply(&controller.inner, ChannelEvent::Opened(second)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_auth_and_custom_headers() {
        let (_tx, stream) = channel();
        let connector = ScriptedConnector::new(vec![Step::Stream(stream)], false);
        let config = config(ReconnectPolicy::default())
            .with_header("X-Client", "editor")
            .with_auth_token("secret");
        let controller = ChannelController::new(
            ChannelKind::Workflow,
            &config,
            Arc::clone(&connector) as Arc<dyn EventStreamConnector>,
            Arc::new(Dispatcher::new()),
        );

        controller.connect();
        settle().await;

        assert!(controller.is_connected());
        let headers = connector.headers.lock().unwrap();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].contains(&("X-Client".to_string(), "editor".to_string())));
        assert!(headers[0].contains(&("Authorization".to_string(), "Bearer secret".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_event_is_skipped() {
        let (tx, stream) = channel();
        let connector = ScriptedConnector::new(vec![Step::Stream(stream)], false);
        let (controller, dispatcher) =
            controller(ChannelKind::Primary, ReconnectPolicy::default(), connector);
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sessions);
        dispatcher.on::<ChatEvent, _>(move |msg| {
            sink.lock().unwrap().push(msg.data.session_id);
            Ok(())
        });

        controller.connect();
        settle().await;
        assert!(controller.is_connected());

        tx.send(Ok(StreamEvent::new("chat/event", "{not json"))).unwrap();
        tx.send(Ok(StreamEvent::new(
            "chat/event",
            r#"{"sessionId":"s-1","type":"message","data":{}}"#,
        )))
        .unwrap();
        settle().await;

        assert_eq!(*sessions.lock().unwrap(), vec!["s-1".to_string()]);
        assert!(controller.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handler_keeps_stream_open() {
        let (tx, stream) = channel();
        let connector = ScriptedConnector::new(vec![Step::Stream(stream)], false);
        let (controller, dispatcher) =
            controller(ChannelKind::Primary, ReconnectPolicy::default(), connector);
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        dispatcher.on::<ChatEvent, _>(|_| anyhow::bail!("handler exploded"));
        dispatcher.on_error(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        controller.connect();
        settle().await;
        let event = StreamEvent::new("chat/event", r#"{"sessionId":"s","type":"x"}"#);
        tx.send(Ok(event.clone())).unwrap();
        tx.send(Ok(event)).unwrap();
        settle().await;

        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert!(controller.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_state_names_reach_workflow_handler() {
        let (tx, stream) = channel();
        let connector = ScriptedConnector::new(vec![Step::Stream(stream)], false);
        let (controller, dispatcher) =
            controller(ChannelKind::Workflow, ReconnectPolicy::default(), connector);
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        dispatcher.on::<WorkflowEvent, _>(move |msg| {
            sink.lock().unwrap().push(msg.data.kind);
            Ok(())
        });

        controller.connect();
        settle().await;
        tx.send(Ok(StreamEvent::new("DRAFT_UPDATED", r#"{"sessionId":"s"}"#)))
            .unwrap();
        tx.send(Ok(StreamEvent::new(
            "workflow/event",
            r#"{"type":"PHASE_CHANGED","sessionId":"s"}"#,
        )))
        .unwrap();
        tx.send(Ok(StreamEvent::new("chat/event", r#"{"sessionId":"s","type":"x"}"#)))
            .unwrap();
        settle().await;

        assert_eq!(
            *kinds.lock().unwrap(),
            vec!["DRAFT_UPDATED".to_string(), "PHASE_CHANGED".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_reconnects_and_open_resets_attempts() {
        let connector = ScriptedConnector::new(
            vec![Step::Stream(stream::empty().boxed()), Step::Stream(stream::pending().boxed())],
            false,
        );
        let policy = ReconnectPolicy::default().with_base_interval(Duration::from_millis(50));
        let (controller, _) = controller(ChannelKind::Primary, policy, Arc::clone(&connector));

        controller.connect();
        settle().await;
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, ChannelPhase::ReconnectPending);
        assert_eq!(snapshot.attempts, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let calls = connector.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(50));
        let snapshot = controller.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = ScriptedConnector::new(Vec::new(), true);
        let policy = ReconnectPolicy::default().with_base_interval(Duration::from_millis(100));
        let (controller, _) = controller(ChannelKind::Primary, policy, Arc::clone(&connector));

        controller.connect();
        settle().await;
        assert_eq!(controller.snapshot().phase, ChannelPhase::ReconnectPending);

        controller.disconnect();
        controller.disconnect();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(connector.calls().len(), 1);
        assert_eq!(controller.snapshot().phase, ChannelPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_policy_does_not_retry() {
        let connector = ScriptedConnector::new(Vec::new(), true);
        let (controller, _) =
            controller(ChannelKind::Primary, ReconnectPolicy::manual(), Arc::clone(&connector));

        controller.connect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.calls().len(), 1);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, ChannelPhase::Closed);
        assert_eq!(snapshot.attempts, 0);
    }
}
