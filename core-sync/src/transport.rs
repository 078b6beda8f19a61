//! # Request Transport
//!
//! Conditional GET and fire-once POST against the daemon's HTTP API.
//!
//! ## Discipline
//!
//! - At most one call per method and path is in flight. Issuing a new call
//!   cancels the previous one; a cancelled GET resolves to
//!   [`Fetch::Cancelled`] and its callback never runs.
//! - A GET that times out or fails at the transport level is retried with a
//!   doubled timeout until the ceiling is reached, then the transport gives
//!   up and raises a notice.
//! - A POST is attempted once with a short fixed timeout. Failures and
//!   `{"error": ...}` bodies are raised as notices and returned as errors.
//! - [`Transport::abort_all`] cancels everything in flight; the watcher calls
//!   it before reconnecting.

use crate::error::{Result, SyncError};
use crate::notifier::Notifier;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use core_runtime::config::TransportConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cache validators of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.last_modified.is_none() && self.etag.is_none()
    }

    fn from_response(response: &HttpResponse) -> Self {
        Self {
            last_modified: response.header("Last-Modified").map(str::to_string),
            etag: response.header("ETag").map(str::to_string),
        }
    }
}

/// A fresh payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub value: Value,
    pub validators: Validators,
    /// Server clock at response time, from the `Date` header.
    pub date: Option<DateTime<Utc>>,
}

/// Outcome of a conditional GET.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch {
    Fresh(Response),
    NotModified,
    /// Superseded by a newer call or aborted.
    Cancelled,
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    http: Arc<dyn HttpClient>,
    base_url: String,
    config: TransportConfig,
    notifier: Arc<Notifier>,
    in_flight: Mutex<HashMap<(HttpMethod, String), InFlight>>,
    next_id: AtomicU64,
}

/// Registration of one in-flight call. Dropping it unregisters the call
/// unless a newer one has taken its slot.
struct Ticket {
    inner: Arc<Inner>,
    key: (HttpMethod, String),
    id: u64,
    token: CancellationToken,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.get(&self.key).is_some_and(|f| f.id == self.id) {
            in_flight.remove(&self.key);
        }
    }
}

/// HTTP transport shared by the data client and the command surface.
///
/// Cloning is cheap; clones share the in-flight table.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.inner.base_url)
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl Transport {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        config: TransportConfig,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.into(),
                config,
                notifier,
                in_flight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.inner.notifier
    }

    /// Registers a new call for `method` and `path`, cancelling the previous one.
    fn begin(&self, method: HttpMethod, path: &str) -> Ticket {
        let key = (method, path.to_string());
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.inner.in_flight.lock().insert(
            key.clone(),
            InFlight {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(method = method.as_str(), path, "Superseding in-flight request");
            previous.token.cancel();
        }

        Ticket {
            inner: self.inner.clone(),
            key,
            id,
            token,
        }
    }

    /// Conditional GET of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::GaveUp`] once the retry ceiling is reached,
    /// [`SyncError::Status`] for a response other than 200 or 304, and
    /// [`SyncError::Serialization`] for an unreadable 200 body. All of them
    /// have already been raised through the notifier.
    pub async fn get(&self, path: &str, validators: &Validators) -> Result<Fetch> {
        let ticket = self.begin(HttpMethod::Get, path);
        self.run_get(ticket, validators.clone()).await
    }

    /// Callback form of [`Transport::get`].
    ///
    /// The call is registered before this returns, so a later call for the
    /// same path always supersedes this one. `callback` runs only for a
    /// fresh payload.
    pub fn spawn_get<F>(&self, path: &str, validators: Validators, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        let ticket = self.begin(HttpMethod::Get, path);
        let token = ticket.token.clone();
        let transport = self.clone();
        tokio::spawn(async move {
            match transport.run_get(ticket, validators).await {
                // a newer call may have superseded this one after the reply arrived
                Ok(Fetch::Fresh(_)) if token.is_cancelled() => {
                    debug!("Dropping superseded GET payload");
                }
                Ok(Fetch::Fresh(response)) => callback(response),
                Ok(Fetch::NotModified) | Ok(Fetch::Cancelled) => {}
                Err(e) => debug!(error = %e, "GET finished without payload"),
            }
        })
    }

    async fn run_get(&self, ticket: Ticket, validators: Validators) -> Result<Fetch> {
        let path = ticket.key.1.clone();
        let url = format!("{}{}", self.inner.base_url, path);
        let config = self.inner.config;
        let mut timeout = config.initial_get_timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let started = Instant::now();
            let request = HttpRequest::new(HttpMethod::Get, url.as_str())
                .header_opt("If-Modified-Since", validators.last_modified.as_deref())
                .header_opt("If-None-Match", validators.etag.as_deref())
                .timeout(timeout);

            debug!(path = %path, attempt = attempts, timeout_ms = timeout.as_millis() as u64, "GET");

            let outcome = tokio::select! {
                biased;
                _ = ticket.token.cancelled() => {
                    debug!(path = %path, "GET cancelled");
                    return Ok(Fetch::Cancelled);
                }
                outcome = tokio::time::timeout(timeout, self.inner.http.execute(request)) => outcome,
            };

            match outcome {
                Ok(Ok(response)) => return self.read_get(&path, response),
                Ok(Err(e)) if !e.is_transient() => {
                    self.inner.notifier.notify(&path, e.to_string());
                    return Err(e.into());
                }
                Ok(Err(e)) => {
                    warn!(path = %path, attempt = attempts, error = %e, "GET failed");
                    // pace retries of immediate failures like timeouts
                    tokio::select! {
                        biased;
                        _ = ticket.token.cancelled() => return Ok(Fetch::Cancelled),
                        _ = tokio::time::sleep_until(started + timeout) => {}
                    }
                }
                Err(_) => {
                    warn!(path = %path, attempt = attempts, timeout_ms = timeout.as_millis() as u64, "GET timed out");
                }
            }

            if timeout >= config.max_get_timeout {
                self.inner
                    .notifier
                    .notify(&path, format!("{} is not responding", path));
                return Err(SyncError::GaveUp { path, attempts });
            }
            timeout = next_timeout(timeout, config.max_get_timeout);
        }
    }

    fn read_get(&self, path: &str, response: HttpResponse) -> Result<Fetch> {
        if response.is_not_modified() {
            debug!(path, "Not modified");
            self.inner.notifier.clear(path);
            return Ok(Fetch::NotModified);
        }
        if response.status != 200 {
            self.inner
                .notifier
                .notify(path, format!("HTTP {}", response.status));
            return Err(SyncError::Status {
                path: path.to_string(),
                status: response.status,
            });
        }

        let value = match parse_body(&response) {
            Ok(value) => value,
            Err(e) => {
                self.inner.notifier.notify(path, e.to_string());
                return Err(e.into());
            }
        };
        self.inner.notifier.clear(path);

        let date = response.header("Date").and_then(|date| {
            DateTime::parse_from_rfc2822(date)
                .map(|d| d.with_timezone(&Utc))
                .ok()
        });

        debug!(path, bytes = response.body.len(), "GET fresh payload");
        Ok(Fetch::Fresh(Response {
            value,
            validators: Validators::from_response(&response),
            date,
        }))
    }

    /// Sends `body` to `path` once.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] when superseded (not reported),
    /// otherwise any transport failure, non-2xx status or `{"error": ..}`
    /// body, each raised through the notifier first.
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let ticket = self.begin(HttpMethod::Post, path);
        let timeout = self.inner.config.post_timeout;
        let url = format!("{}{}", self.inner.base_url, path);
        let request = HttpRequest::new(HttpMethod::Post, url)
            .json(body)?
            .timeout(timeout);

        debug!(path, "POST");

        let outcome = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => {
                debug!(path, "POST cancelled");
                return Err(SyncError::Cancelled { path: path.to_string() });
            }
            outcome = tokio::time::timeout(timeout, self.inner.http.execute(request)) => outcome,
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.inner.notifier.notify(path, e.to_string());
                return Err(e.into());
            }
            Err(_) => {
                let e = bridge_traits::BridgeError::Timeout(timeout);
                self.inner.notifier.notify(path, e.to_string());
                return Err(e.into());
            }
        };

        if !response.is_success() {
            let message = match response.text() {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => format!("HTTP {}", response.status),
            };
            self.inner.notifier.notify(path, message);
            return Err(SyncError::Status {
                path: path.to_string(),
                status: response.status,
            });
        }

        let value = match parse_body(&response) {
            Ok(value) => value,
            Err(e) => {
                self.inner.notifier.notify(path, e.to_string());
                return Err(e.into());
            }
        };
        if let Some(error) = value.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.inner.notifier.notify(path, message.clone());
            return Err(SyncError::Server {
                path: path.to_string(),
                message,
            });
        }

        self.inner.notifier.clear(path);
        Ok(value)
    }

    /// Cancels every in-flight call.
    pub fn abort_all(&self) {
        let aborted: Vec<InFlight> = self
            .inner
            .in_flight
            .lock()
            .drain()
            .map(|(_, in_flight)| in_flight)
            .collect();
        if !aborted.is_empty() {
            debug!(count = aborted.len(), "Aborting in-flight requests");
        }
        for in_flight in aborted {
            in_flight.token.cancel();
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }
}

fn next_timeout(current: Duration, ceiling: Duration) -> Duration {
    (current * 2).min(ceiling)
}

fn parse_body(response: &HttpResponse) -> std::result::Result<Value, serde_json::Error> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body)
}
