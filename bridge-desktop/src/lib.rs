//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `PushChannel` using `tokio-tungstenite`
//! - `LocalStore` using a SQLite key-value table via `sqlx`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteLocalStore, WebSocketChannel};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let push = WebSocketChannel::new();
//!     let store = SqliteLocalStore::new("state/local.db".into()).await?;
//!
//!     // Hand them to CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod http;
mod push;
mod storage;

pub use http::ReqwestHttpClient;
pub use push::WebSocketChannel;
pub use storage::SqliteLocalStore;
