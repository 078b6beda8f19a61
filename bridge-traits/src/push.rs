//! Push Notification Channel Abstraction
//!
//! The daemon keeps one long-lived connection open per client and sends a
//! short text message naming a resource path whenever that resource changes.
//! The message is a change notification only; payloads are fetched over HTTP.

use async_trait::async_trait;

use crate::error::Result;

/// An open push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Wait for the next text message.
    ///
    /// Returns `None` once the peer closed the connection. Binary frames and
    /// keep-alive control frames are handled by the implementation and never
    /// surface here.
    async fn next_message(&mut self) -> Option<Result<String>>;

    /// Send a text message to the peer. The watcher uses this for keep-alive
    /// pings on otherwise quiet connections.
    async fn send(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Close the connection. Errors while closing are not interesting to
    /// callers and are swallowed by implementations.
    async fn close(&mut self) {}
}

/// Factory for push connections
///
/// # Example
///
/// ```ignore
/// use bridge_traits::push::PushChannel;
///
/// async fn first_message(channel: &dyn PushChannel) -> Option<String> {
///     let mut conn = channel.connect("ws://localhost:8080/api/music").await.ok()?;
///     conn.next_message().await?.ok()
/// }
/// ```
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open a new connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>>;
}
