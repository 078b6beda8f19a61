//! Scripted bridges shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::push::{PushChannel, PushConnection};
use core_runtime::config::TransportConfig;
use core_runtime::events::{CoreEvent, EventBus, Notice, Receiver};
use core_sync::{Notifier, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const BASE_URL: &str = "http://daemon.test";

/// What the scripted server does with one request.
pub enum Reply {
    Respond(HttpResponse),
    Fail(BridgeError),
    /// Never answers.
    Hang,
    After(Duration, HttpResponse),
}

type Handler = Box<dyn Fn(&HttpRequest, usize) -> Reply + Send + Sync>;

/// HTTP client answering from a handler; records every request.
pub struct ScriptedHttp {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    /// `handler` receives the request and the number of earlier requests.
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest, usize) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let seen = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len() - 1
        };
        match (self.handler)(&request, seen) {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(e) => Err(e),
            Reply::Hang => std::future::pending().await,
            Reply::After(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
        }
    }
}

pub fn json(status: u16, body: &str) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

pub fn transport_with(http: Arc<ScriptedHttp>) -> (Transport, EventBus) {
    let bus = EventBus::new(256);
    let notifier = Arc::new(Notifier::new(bus.clone()));
    let transport = Transport::new(http, BASE_URL, TransportConfig::default(), notifier);
    (transport, bus)
}

/// Every notice currently queued on `rx`.
pub fn drain_notices(rx: &mut Receiver<CoreEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Notice(notice) = event {
            notices.push(notice);
        }
    }
    notices
}

/// Push connection fed by the test through an mpsc channel. Sending `None`
/// closes it.
pub struct ScriptedConnection {
    incoming: mpsc::UnboundedReceiver<Option<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    on_close: CloseHook,
}

type CloseHook = Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>;

#[async_trait]
impl PushConnection for ScriptedConnection {
    async fn next_message(&mut self) -> Option<Result<String>> {
        match self.incoming.recv().await {
            Some(Some(text)) => Some(Ok(text)),
            Some(None) => None,
            None => std::future::pending().await,
        }
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        let hook = self.on_close.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Handle the test keeps for one scripted connection.
pub struct ConnectionHandle {
    pub messages: mpsc::UnboundedSender<Option<String>>,
    pub sent: Arc<Mutex<Vec<String>>>,
    on_close: CloseHook,
}

impl ConnectionHandle {
    pub fn push(&self, text: &str) {
        let _ = self.messages.send(Some(text.to_string()));
    }

    pub fn close(&self) {
        let _ = self.messages.send(None);
    }

    /// Runs `hook` when the watcher closes this connection.
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_close.lock() = Some(Box::new(hook));
    }
}

/// Push channel handing out queued connections; refuses once empty.
#[derive(Default)]
pub struct ScriptedChannel {
    connections: Mutex<VecDeque<ScriptedConnection>>,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue(&self) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let on_close: CloseHook = Arc::new(Mutex::new(None));
        self.connections.lock().push_back(ScriptedConnection {
            incoming: rx,
            sent: sent.clone(),
            on_close: on_close.clone(),
        });
        ConnectionHandle {
            messages: tx,
            sent,
            on_close,
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl PushChannel for ScriptedChannel {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>> {
        self.attempts.lock().push(url.to_string());
        match self.connections.lock().pop_front() {
            Some(connection) => Ok(Box::new(connection)),
            None => Err(BridgeError::ConnectionClosed("refused".to_string())),
        }
    }
}
