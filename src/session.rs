//! Client session controller
//!
//! Owns exactly one connection channel at a time and loops through
//! `Disconnected -> Connecting -> Open -> Disconnected` for the lifetime
//! of the session. Messages submitted while disconnected queue in FIFO
//! order and drain once the channel opens; connection loss schedules a
//! reconnect with exponential backoff, switching permanently to a
//! fallback endpoint after repeated failures.
//!
//! The controller runs as a background task behind a [`SessionHandle`];
//! everything it hears from the server is forwarded to the consumer as
//! [`SessionEvent`]s.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::message::{ClientMessage, ServerMessage};
use crate::transport::{Channel, Connector};

/// Capacity of the bounded event channel to the consumer
const EVENT_BUFFER_SIZE: usize = 256;

/// Configuration for a client session
///
/// The two endpoint URLs are required; everything else defaults to the
/// reference policy: 1s base delay growing 1.5x per attempt, capped at
/// 30s, failing over after more than 5 consecutive failures, and
/// refreshing the room list every 5s while connected.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint dialed first and until failover
    pub primary_url: String,
    /// Endpoint used after the failover threshold; never reverts
    pub fallback_url: String,
    /// First-attempt reconnect delay
    pub base_delay: Duration,
    /// Multiplier applied per scheduled attempt
    pub backoff_growth: f64,
    /// Upper bound on the reconnect delay
    pub max_delay: Duration,
    /// Consecutive failures after which the fallback endpoint takes over
    pub failover_after: u32,
    /// Advisory room-list refresh period while open
    pub room_refresh: Duration,
}

impl SessionConfig {
    pub fn new(primary_url: impl Into<String>, fallback_url: impl Into<String>) -> Self {
        Self {
            primary_url: primary_url.into(),
            fallback_url: fallback_url.into(),
            base_delay: Duration::from_millis(1000),
            backoff_growth: 1.5,
            max_delay: Duration::from_secs(30),
            failover_after: 5,
            room_refresh: Duration::from_secs(5),
        }
    }

    /// Delay before the given (1-based) reconnect attempt
    fn backoff_delay(&self, attempts: u32) -> Duration {
        let scaled = self.base_delay.as_millis() as f64 * self.backoff_growth.powi(attempts as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Events emitted to the session consumer (the UI projection)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Channel reached the open state
    Connected,
    /// Channel lost; a reconnect is scheduled unless the session was shut down
    Disconnected,
    /// A protocol message arrived from the server
    Server(ServerMessage),
}

/// Commands from the handle to the session task
#[derive(Debug)]
enum SessionCommand {
    Send(ClientMessage),
    Shutdown,
}

/// Handle to a running session
///
/// Cheap to clone; dropping every handle shuts the session down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Submit a message: sent immediately while open, queued otherwise
    ///
    /// Returns false if the session task has already exited.
    pub fn send(&self, msg: ClientMessage) -> bool {
        self.cmd_tx.send(SessionCommand::Send(msg)).is_ok()
    }

    /// Tear the session down: close the channel and cancel any pending
    /// reconnect without scheduling another attempt
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
    }
}

/// Client session controller entry point
pub struct Session;

impl Session {
    /// Spawn the session task
    ///
    /// Returns the command handle and the event stream. The task runs
    /// until [`SessionHandle::shutdown`] or until every handle and the
    /// event receiver are gone.
    pub fn spawn(
        connector: Box<dyn Connector>,
        config: SessionConfig,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER_SIZE);

        tokio::spawn(run_session(connector, config, cmd_rx, event_tx));

        (SessionHandle { cmd_tx }, event_rx)
    }
}

/// Why the open state ended
enum OpenOutcome {
    /// Channel closed or errored; reconnect
    Lost,
    /// Explicit teardown; do not reconnect
    Shutdown,
}

async fn run_session(
    connector: Box<dyn Connector>,
    config: SessionConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    // Outbound queue: unbounded FIFO, survives reconnect attempts
    let mut queue: VecDeque<ClientMessage> = VecDeque::new();
    let mut attempts: u32 = 0;
    let mut on_fallback = false;

    loop {
        let url = if on_fallback {
            &config.fallback_url
        } else {
            &config.primary_url
        };

        debug!("Connecting to {}", url);

        match connector.connect(url).await {
            Ok(mut channel) => {
                attempts = 0;
                info!("Channel open to {}", url);
                if event_tx.send(SessionEvent::Connected).await.is_err() {
                    channel.close().await;
                    return;
                }

                match run_open(&mut *channel, &config, &mut queue, &mut cmd_rx, &event_tx).await
                {
                    OpenOutcome::Shutdown => {
                        channel.close().await;
                        let _ = event_tx.send(SessionEvent::Disconnected).await;
                        info!("Session shut down");
                        return;
                    }
                    OpenOutcome::Lost => {
                        if event_tx.send(SessionEvent::Disconnected).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", url, e);
            }
        }

        // Schedule the reconnect: every schedule counts, including the first
        attempts += 1;
        let delay = config.backoff_delay(attempts);
        if attempts > config.failover_after && !on_fallback {
            info!("Switching to fallback endpoint {}", config.fallback_url);
            on_fallback = true; // one-way switch
        }
        debug!("Reconnecting in {:?} (attempt {})", delay, attempts);

        if !wait_backoff(delay, &mut queue, &mut cmd_rx).await {
            let _ = event_tx.send(SessionEvent::Disconnected).await;
            return;
        }
    }
}

/// Wait out the reconnect delay while still accepting commands
///
/// Returns false on shutdown (or all handles dropped).
async fn wait_backoff(
    delay: Duration,
    queue: &mut VecDeque<ClientMessage>,
    cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Send(msg)) => queue.push_back(msg),
                Some(SessionCommand::Shutdown) | None => return false,
            },
        }
    }
}

/// Drive one open channel until it is lost or the session shuts down
async fn run_open(
    channel: &mut dyn Channel,
    config: &SessionConfig,
    queue: &mut VecDeque<ClientMessage>,
    cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    event_tx: &mpsc::Sender<SessionEvent>,
) -> OpenOutcome {
    // Fresh room list first, then the backlog in original order
    if send_frame(channel, &ClientMessage::ListRooms).await.is_err() {
        return OpenOutcome::Lost;
    }

    while let Some(msg) = queue.pop_front() {
        if send_frame(channel, &msg).await.is_err() {
            // Put it back where it was; ordering is preserved
            queue.push_front(msg);
            return OpenOutcome::Lost;
        }
    }

    // Advisory refresh; the first tick fires one period from now
    let mut refresh = tokio::time::interval_at(
        tokio::time::Instant::now() + config.room_refresh,
        config.room_refresh,
    );
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            incoming = channel.recv() => match incoming {
                Some(text) => {
                    // Malformed frames from the server are ignored
                    if let Ok(msg) = serde_json::from_str::<ServerMessage>(&text) {
                        if event_tx.send(SessionEvent::Server(msg)).await.is_err() {
                            return OpenOutcome::Shutdown;
                        }
                    } else {
                        debug!("Ignoring unparseable frame from server");
                    }
                }
                None => return OpenOutcome::Lost,
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Send(msg)) => {
                    // A send that fails while nominally open re-queues
                    // to the front rather than dropping the message
                    if send_frame(channel, &msg).await.is_err() {
                        queue.push_front(msg);
                        return OpenOutcome::Lost;
                    }
                }
                Some(SessionCommand::Shutdown) | None => return OpenOutcome::Shutdown,
            },
            _ = refresh.tick() => {
                if send_frame(channel, &ClientMessage::ListRooms).await.is_err() {
                    return OpenOutcome::Lost;
                }
            },
        }
    }
}

/// Serialize and send one client message
async fn send_frame(channel: &mut dyn Channel, msg: &ClientMessage) -> Result<(), ()> {
    let Ok(text) = serde_json::to_string(msg) else {
        // Unrepresentable message; nothing sensible to retry
        warn!("Failed to serialize outbound message");
        return Ok(());
    };
    channel.send_text(text).await.map_err(|e| {
        debug!("Send failed: {}", e);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// In-memory channel handed out by the mock connector. The test side
    /// keeps `sent_rx` (frames the session sent) and `in_tx` (frames the
    /// fake server pushes); dropping `in_tx` closes the channel.
    struct MockChannel {
        sent_tx: mpsc::UnboundedSender<String>,
        in_rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Channel for MockChannel {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.sent_tx
                .send(text)
                .map_err(|_| TransportError::Send("closed".to_string()))
        }

        async fn recv(&mut self) -> Option<String> {
            self.in_rx.recv().await
        }

        async fn close(&mut self) {
            self.in_rx.close();
        }
    }

    /// Test-side handles for one established mock channel
    struct ChannelProbe {
        sent_rx: mpsc::UnboundedReceiver<String>,
        in_tx: mpsc::UnboundedSender<String>,
    }

    /// Scripted connector: each dial pops the next outcome. `true` means
    /// the dial succeeds and a [`ChannelProbe`] is appended for the test.
    struct MockConnector {
        script: Mutex<VecDeque<bool>>,
        dialed: Arc<Mutex<Vec<String>>>,
        probes: Arc<Mutex<Vec<ChannelProbe>>>,
    }

    impl MockConnector {
        fn new(script: Vec<bool>) -> (Box<Self>, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<ChannelProbe>>>) {
            let dialed = Arc::new(Mutex::new(Vec::new()));
            let probes = Arc::new(Mutex::new(Vec::new()));
            let connector = Box::new(Self {
                script: Mutex::new(script.into()),
                dialed: dialed.clone(),
                probes: probes.clone(),
            });
            (connector, dialed, probes)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, TransportError> {
            self.dialed.lock().unwrap().push(url.to_string());
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
            if !ok {
                return Err(TransportError::Connect("refused".to_string()));
            }
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            self.probes.lock().unwrap().push(ChannelProbe { sent_rx, in_tx });
            Ok(Box::new(MockChannel { sent_tx, in_rx }))
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new("ws://primary", "ws://fallback")
    }

    async fn expect_connected(events: &mut mpsc::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Some(SessionEvent::Connected) => return,
                Some(_) => continue,
                None => panic!("event stream ended before Connected"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_requests_room_list() {
        let (connector, _dialed, probes) = MockConnector::new(vec![true]);
        let (_handle, mut events) = Session::spawn(connector, config());

        expect_connected(&mut events).await;

        let mut probe = probes.lock().unwrap().remove(0);
        let first = probe.sent_rx.recv().await.unwrap();
        assert_eq!(first, r#"{"type":"list_rooms"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_drained_fifo_after_reconnect() {
        // First dial fails; messages submitted meanwhile must flush in
        // order once the second dial succeeds, after the room list request.
        let (connector, _dialed, probes) = MockConnector::new(vec![false, true]);
        let (handle, mut events) = Session::spawn(connector, config());

        assert!(handle.send(ClientMessage::CreateRoom {
            room: "lobby".to_string()
        }));
        assert!(handle.send(ClientMessage::Join {
            room: "lobby".to_string(),
            username: "alice".to_string(),
        }));
        assert!(handle.send(ClientMessage::Message {
            text: "hi".to_string()
        }));

        expect_connected(&mut events).await;

        let mut probe = probes.lock().unwrap().remove(0);
        let mut sent = Vec::new();
        for _ in 0..4 {
            sent.push(probe.sent_rx.recv().await.unwrap());
        }
        assert_eq!(sent[0], r#"{"type":"list_rooms"}"#);
        assert_eq!(sent[1], r#"{"type":"create_room","room":"lobby"}"#);
        assert_eq!(
            sent[2],
            r#"{"type":"join","room":"lobby","username":"alice"}"#
        );
        assert_eq!(sent[3], r#"{"type":"message","text":"hi"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_five_failures() {
        let (connector, dialed, _probes) = MockConnector::new(vec![false; 8]);
        let (_handle, mut events) = Session::spawn(connector, config());

        expect_connected(&mut events).await;

        let dialed = dialed.lock().unwrap();
        // Dial 1 plus reconnect attempts 1..=5 target primary; attempt 6
        // onward targets the fallback and never reverts.
        assert!(dialed.len() >= 8);
        for url in &dialed[..6] {
            assert_eq!(url, "ws://primary");
        }
        for url in &dialed[6..] {
            assert_eq!(url, "ws://fallback");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delay_growth_and_cap() {
        let cfg = config();
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(1500));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(2250));
        // Far past the cap
        assert_eq!(cfg.backoff_delay(20), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_frames_forwarded_as_events() {
        let (connector, _dialed, probes) = MockConnector::new(vec![true]);
        let (_handle, mut events) = Session::spawn(connector, config());

        expect_connected(&mut events).await;

        let probe = probes.lock().unwrap().remove(0);
        probe
            .in_tx
            .send(r#"{"type":"created_room","room":"lobby"}"#.to_string())
            .unwrap();
        // Garbage is ignored without killing the session
        probe.in_tx.send("not json".to_string()).unwrap();
        probe
            .in_tx
            .send(r#"{"type":"error","message":"oops"}"#.to_string())
            .unwrap();

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Server(ServerMessage::CreatedRoom {
                room: "lobby".to_string()
            }))
        );
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Server(ServerMessage::Error {
                message: "oops".to_string()
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_channel_loss() {
        let (connector, dialed, probes) = MockConnector::new(vec![true, true]);
        let (_handle, mut events) = Session::spawn(connector, config());

        expect_connected(&mut events).await;

        // Server drops the connection
        let probe = probes.lock().unwrap().remove(0);
        drop(probe);

        assert_eq!(events.recv().await, Some(SessionEvent::Disconnected));
        assert_eq!(events.recv().await, Some(SessionEvent::Connected));
        assert_eq!(dialed.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_requeued_when_send_fails_while_open() {
        let (connector, _dialed, probes) = MockConnector::new(vec![true, true]);
        let (handle, mut events) = Session::spawn(connector, config());

        expect_connected(&mut events).await;

        // Kill the channel's send side without the session noticing yet
        {
            let mut probes = probes.lock().unwrap();
            let probe = &mut probes[0];
            probe.sent_rx.close();
            // Drain what already went through (the room list request)
            while probe.sent_rx.try_recv().is_ok() {}
        }

        assert!(handle.send(ClientMessage::Message {
            text: "hold on to this".to_string()
        }));

        // The failed send drops the channel and the reconnect flushes the
        // queued message on the fresh one, after the room list request.
        assert_eq!(events.recv().await, Some(SessionEvent::Disconnected));
        expect_connected(&mut events).await;

        let mut probe = {
            let mut probes = probes.lock().unwrap();
            probes.remove(1)
        };
        assert_eq!(
            probe.sent_rx.recv().await.unwrap(),
            r#"{"type":"list_rooms"}"#
        );
        assert_eq!(
            probe.sent_rx.recv().await.unwrap(),
            r#"{"type":"message","text":"hold on to this"}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_reconnecting() {
        // Every dial fails; the session would retry forever
        let (connector, dialed, _probes) = MockConnector::new(vec![false; 64]);
        let (handle, mut events) = Session::spawn(connector, config());

        // Let a couple of attempts happen
        tokio::time::sleep(Duration::from_secs(5)).await;
        let before = dialed.lock().unwrap().len();
        assert!(before >= 1);

        handle.shutdown();

        // Stream ends: Disconnected then closed
        loop {
            match events.recv().await {
                Some(SessionEvent::Disconnected) | Some(SessionEvent::Connected) => continue,
                Some(other) => panic!("unexpected event: {:?}", other),
                None => break,
            }
        }

        // No further dials after shutdown
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(dialed.lock().unwrap().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_open_closes_cleanly() {
        let (connector, dialed, _probes) = MockConnector::new(vec![true]);
        let (handle, mut events) = Session::spawn(connector, config());

        expect_connected(&mut events).await;
        handle.shutdown();

        assert_eq!(events.recv().await, Some(SessionEvent::Disconnected));
        assert_eq!(events.recv().await, None);
        assert_eq!(dialed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_room_refresh_while_open() {
        let (connector, _dialed, probes) = MockConnector::new(vec![true]);
        let (_handle, mut events) = Session::spawn(connector, config());

        expect_connected(&mut events).await;

        let mut probe = probes.lock().unwrap().remove(0);
        // Initial request on open
        assert_eq!(
            probe.sent_rx.recv().await.unwrap(),
            r#"{"type":"list_rooms"}"#
        );

        // Two refresh periods later, two more requests
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(
            probe.sent_rx.recv().await.unwrap(),
            r#"{"type":"list_rooms"}"#
        );
        assert_eq!(
            probe.sent_rx.recv().await.unwrap(),
            r#"{"type":"list_rooms"}"#
        );
    }
}
