//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the client core and the
//! platform-specific adapters. Each trait represents a capability the core
//! requires but that is implemented differently per host (desktop, web).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP with per-request timeout
//! - [`PushChannel`](push::PushChannel) - Long-lived change-notification channel
//!
//! ### Storage
//! - [`LocalStore`](storage::LocalStore) - Durable key-value storage for snapshots and preferences
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Web      | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map timeouts to [`BridgeError::Timeout`] so the transport can tell
//! them apart in logs.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so the adapters can be shared
//! across async tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod push;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use push::{PushChannel, PushConnection};
pub use storage::{LocalStore, MemoryStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
