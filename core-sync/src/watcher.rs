//! # Connection Watcher
//!
//! Keeps one push channel open to the daemon and turns its text messages into
//! [`ConnectionEvent`]s on the event bus.
//!
//! The liveness rules live in [`WatcherState`], a pure state machine driven
//! by explicit timestamps. [`ConnectionWatcher::run`] feeds it connection
//! outcomes, messages and ticks, and carries out what it asks for.
//!
//! ## Liveness
//!
//! - An open channel that stays silent longer than `connected_idle` is
//!   declared lost and reopened.
//! - A handshake pending longer than `connecting_idle` is abandoned.
//! - A gap longer than `lost_gap` between two messages means notifications
//!   may have been missed, so `Lost` is raised even though the channel is up.
//! - Quiet channels are pinged; any reply counts as activity.
//!
//! Before reopening, every in-flight transport call is aborted.

use crate::notifier::Notifier;
use crate::transport::Transport;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::push::PushChannel;
use core_runtime::config::WatcherConfig;
use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notifier source for connection notices.
pub const NOTICE_SOURCE: &str = "connection";

const PING: &str = "ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
}

/// What the state machine asks its driver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Connected,
    ResourceChanged(String),
    Lost,
    /// Close the channel, abort in-flight calls and reconnect.
    Reconnect,
}

#[derive(Debug, Clone)]
pub struct WatcherState {
    config: WatcherConfig,
    phase: Phase,
    last_activity: Instant,
    retry: u32,
}

impl WatcherState {
    pub fn new(config: WatcherConfig, now: Instant) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            last_activity: now,
            retry: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }

    /// Starts a handshake. Returns the number of attempts since the last
    /// successful open.
    pub fn on_connecting(&mut self, now: Instant) -> u32 {
        let retry = self.retry;
        self.retry = self.retry.saturating_add(1);
        self.phase = Phase::Connecting;
        self.last_activity = now;
        retry
    }

    pub fn on_open(&mut self, now: Instant) -> Vec<Signal> {
        self.phase = Phase::Connected;
        self.retry = 0;
        self.last_activity = now;
        vec![Signal::Connected]
    }

    pub fn on_message(&mut self, text: &str, now: Instant) -> Vec<Signal> {
        let gap = now.saturating_duration_since(self.last_activity);
        self.last_activity = now;

        let mut signals = Vec::new();
        if gap > self.config.lost_gap {
            signals.push(Signal::Lost);
        }
        let text = text.trim();
        if text.starts_with('/') {
            signals.push(Signal::ResourceChanged(text.to_string()));
        }
        signals
    }

    pub fn on_tick(&mut self, now: Instant) -> Vec<Signal> {
        let idle = now.saturating_duration_since(self.last_activity);
        match self.phase {
            Phase::Connected if idle > self.config.connected_idle => {
                self.phase = Phase::Idle;
                vec![Signal::Lost, Signal::Reconnect]
            }
            Phase::Connecting if idle > self.config.connecting_idle => {
                self.phase = Phase::Idle;
                vec![Signal::Reconnect]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_close(&mut self) -> Vec<Signal> {
        let was_connected = self.phase == Phase::Connected;
        self.phase = Phase::Idle;
        if was_connected {
            vec![Signal::Lost, Signal::Reconnect]
        } else {
            vec![Signal::Reconnect]
        }
    }

    /// Whether a connected channel has been quiet long enough to ping.
    pub fn needs_ping(&self, now: Instant) -> bool {
        self.phase == Phase::Connected
            && now.saturating_duration_since(self.last_activity) >= self.config.connected_idle / 2
    }
}

enum Wake {
    Shutdown,
    Message(Option<BridgeResult<String>>),
    Tick,
}

/// Async driver of the push channel.
pub struct ConnectionWatcher {
    channel: Arc<dyn PushChannel>,
    url: String,
    config: WatcherConfig,
    transport: Transport,
    notifier: Arc<Notifier>,
    bus: EventBus,
}

impl ConnectionWatcher {
    pub fn new(
        channel: Arc<dyn PushChannel>,
        url: impl Into<String>,
        config: WatcherConfig,
        transport: Transport,
        notifier: Arc<Notifier>,
        bus: EventBus,
    ) -> Self {
        Self {
            channel,
            url: url.into(),
            config,
            transport,
            notifier,
            bus,
        }
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Connects and reconnects until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut state = WatcherState::new(self.config.clone(), Instant::now());
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(url = %self.url, "Connection watcher started");

        while !shutdown.is_cancelled() {
            if self.connect_once(&mut state, &mut ticker, &shutdown).await {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }

        info!("Connection watcher stopped");
    }

    /// Runs one connection from handshake to loss. Returns `true` on shutdown.
    async fn connect_once(
        &self,
        state: &mut WatcherState,
        ticker: &mut Interval,
        shutdown: &CancellationToken,
    ) -> bool {
        let retry = state.on_connecting(Instant::now());
        self.emit(ConnectionEvent::Connecting { retry });
        if retry == 1 {
            self.notifier
                .notify(NOTICE_SOURCE, "Connection lost, reconnecting");
        }

        let connect = self.channel.connect(&self.url);
        tokio::pin!(connect);
        let connected = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return true,
                result = &mut connect => break Some(result),
                _ = ticker.tick() => {
                    if state.on_tick(Instant::now()).contains(&Signal::Reconnect) {
                        break None;
                    }
                }
            }
        };

        let mut connection = match connected {
            Some(Ok(connection)) => connection,
            Some(Err(e)) => {
                warn!(url = %self.url, retry, error = %e, "Push channel connect failed");
                state.on_close();
                return false;
            }
            None => {
                warn!(url = %self.url, retry, "Push channel handshake timed out");
                return false;
            }
        };

        let signals = state.on_open(Instant::now());
        self.notifier.clear(NOTICE_SOURCE);
        self.dispatch(signals);
        ticker.reset();

        loop {
            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Wake::Shutdown,
                message = connection.next_message() => Wake::Message(message),
                _ = ticker.tick() => Wake::Tick,
            };

            let now = Instant::now();
            let signals = match wake {
                Wake::Shutdown => {
                    connection.close().await;
                    return true;
                }
                Wake::Message(Some(Ok(text))) => {
                    debug!(message = %text.trim(), "Push message");
                    state.on_message(&text, now)
                }
                Wake::Message(Some(Err(e))) => {
                    warn!(error = %e, "Push channel failed");
                    state.on_close()
                }
                Wake::Message(None) => {
                    info!("Push channel closed");
                    state.on_close()
                }
                Wake::Tick => {
                    let signals = state.on_tick(now);
                    if signals.is_empty() && state.needs_ping(now) {
                        if let Err(e) = connection.send(PING).await {
                            debug!(error = %e, "Keep-alive ping failed");
                        }
                    }
                    signals
                }
            };

            if signals.contains(&Signal::Reconnect) {
                // Refetches triggered by `Lost` must outlive the abort.
                self.transport.abort_all();
                self.dispatch(signals);
                connection.close().await;
                return false;
            }
            self.dispatch(signals);
        }
    }

    /// Publishes event signals. `Reconnect` is handled by the caller.
    fn dispatch(&self, signals: Vec<Signal>) {
        for signal in signals {
            match signal {
                Signal::Connected => {
                    info!(url = %self.url, "Push channel connected");
                    self.emit(ConnectionEvent::Connected);
                }
                Signal::ResourceChanged(path) => {
                    self.emit(ConnectionEvent::ResourceChanged { path });
                }
                Signal::Lost => {
                    warn!("Push notifications may have been lost");
                    self.emit(ConnectionEvent::Lost);
                }
                Signal::Reconnect => {}
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.bus.emit(CoreEvent::Connection(event)).is_err() {
            debug!("No subscribers for connection event");
        }
    }
}
