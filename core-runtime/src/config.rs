//! # Core Configuration Module
//!
//! Provides configuration management for the client core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every bridge and tuning knob the core needs. It
//! enforces fail-fast validation so a missing capability is reported at
//! startup instead of on the first request.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - resource fetches and commands (desktop default: reqwest)
//! - `PushChannel` - change notifications (desktop default: tokio-tungstenite)
//!
//! ## Optional Dependencies
//!
//! - `LocalStore` (small and large) - durable snapshots; defaults to an
//!   in-memory store, which simply means nothing survives a restart
//! - `Clock` - defaults to the system clock
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient` and `PushChannel` are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .base_url("http://localhost:8080")
//!     .build()
//!     .expect("Failed to build config");
//! assert_eq!(config.push_url(), "ws://localhost:8080/api/music");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, LocalStore, MemoryStore, PushChannel, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Timeouts used by the request transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Timeout of the first GET attempt; doubled on every retry
    pub initial_get_timeout: Duration,
    /// Ceiling for the doubled GET timeout. A failure at the ceiling gives up.
    pub max_get_timeout: Duration,
    /// Fixed timeout for POST requests, which are never retried
    pub post_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            initial_get_timeout: Duration::from_secs(1),
            max_get_timeout: Duration::from_secs(50),
            post_timeout: Duration::from_secs(1),
        }
    }
}

/// Liveness settings for the push channel watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Path of the push endpoint, relative to the base URL
    pub push_path: String,
    /// How often the liveness check runs
    pub check_interval: Duration,
    /// Idle time after which an open channel is considered dead
    pub connected_idle: Duration,
    /// Idle time after which a pending handshake is abandoned
    pub connecting_idle: Duration,
    /// Gap between two messages that implies notifications were missed
    pub lost_gap: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            push_path: "/api/music".to_string(),
            check_interval: Duration::from_secs(1),
            connected_idle: Duration::from_secs(10),
            connecting_idle: Duration::from_secs(2),
            lost_gap: Duration::from_secs(10),
        }
    }
}

/// Core configuration for the client.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Daemon base URL, e.g. `http://localhost:8080`
    pub base_url: String,

    /// HTTP client for resource fetches and commands
    pub http_client: Arc<dyn HttpClient>,

    /// Push notification channel factory
    pub push_channel: Arc<dyn PushChannel>,

    /// Small durable store: current track, playlist, preferences
    pub store: Arc<dyn LocalStore>,

    /// Large durable store for the full library snapshot
    pub library_store: Arc<dyn LocalStore>,

    /// Wall-clock source
    pub clock: Arc<dyn Clock>,

    pub transport: TransportConfig,

    pub watcher: WatcherConfig,

    /// Capacity of the broadcast event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("base_url", &self.base_url)
            .field("http_client", &"HttpClient { ... }")
            .field("push_channel", &"PushChannel { ... }")
            .field("store", &"LocalStore { ... }")
            .field("library_store", &"LocalStore { ... }")
            .field("transport", &self.transport)
            .field("watcher", &self.watcher)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Absolute URL of a resource path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL of the push endpoint, with the scheme switched to ws/wss.
    pub fn push_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}{}", base, self.watcher.push_path)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Base URL is an http(s) URL
    /// - Transport timeouts are non-zero and ordered
    /// - Watcher intervals are non-zero
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }

        let transport = &self.transport;
        if transport.initial_get_timeout.is_zero() || transport.post_timeout.is_zero() {
            return Err(Error::Config(
                "Transport timeouts must be greater than zero".to_string(),
            ));
        }
        if transport.initial_get_timeout > transport.max_get_timeout {
            return Err(Error::Config(format!(
                "Initial GET timeout {:?} exceeds ceiling {:?}",
                transport.initial_get_timeout, transport.max_get_timeout
            )));
        }

        let watcher = &self.watcher;
        if watcher.check_interval.is_zero()
            || watcher.connected_idle.is_zero()
            || watcher.connecting_idle.is_zero()
        {
            return Err(Error::Config(
                "Watcher intervals must be greater than zero".to_string(),
            ));
        }
        if !watcher.push_path.starts_with('/') {
            return Err(Error::Config(format!(
                "Push path must be absolute, got '{}'",
                watcher.push_path
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to talk to the daemon. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Web: inject a fetch-based client."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn push_channel_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PushChannel".to_string(),
        message: "PushChannel implementation is required for change notifications. \
                 Desktop: enable the 'desktop-shims' feature to use WebSocketChannel. \
                 Web: inject a browser WebSocket adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to initialize default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_push_channel() -> Result<Arc<dyn PushChannel>> {
    Ok(Arc::new(bridge_desktop::WebSocketChannel::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_push_channel() -> Result<Arc<dyn PushChannel>> {
    Err(push_channel_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    base_url: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    push_channel: Option<Arc<dyn PushChannel>>,
    store: Option<Arc<dyn LocalStore>>,
    library_store: Option<Arc<dyn LocalStore>>,
    clock: Option<Arc<dyn Clock>>,
    transport: Option<TransportConfig>,
    watcher: Option<WatcherConfig>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the daemon base URL. A trailing slash is dropped.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn push_channel(mut self, channel: Arc<dyn PushChannel>) -> Self {
        self.push_channel = Some(channel);
        self
    }

    pub fn store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn library_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.library_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn watcher(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing, a required bridge is
    /// missing and no desktop default is available, or validation fails.
    pub fn build(self) -> Result<CoreConfig> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("Base URL is required".to_string()))?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let push_channel = match self.push_channel {
            Some(channel) => channel,
            None => provide_default_push_channel()?,
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn LocalStore>);
        let library_store = self
            .library_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn LocalStore>);

        let config = CoreConfig {
            base_url,
            http_client,
            push_channel,
            store,
            library_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            transport: self.transport.unwrap_or_default(),
            watcher: self.watcher.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}
