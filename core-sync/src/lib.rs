//! # Sync Module
//!
//! Keeps the client's view of the daemon current.
//!
//! ## Overview
//!
//! - **Transport** (`transport`): conditional GET and fire-once POST with
//!   at-most-one call in flight per method and path, and GET backoff
//! - **Connection Watcher** (`watcher`): push channel liveness and reconnect,
//!   publishing connection events on the event bus
//! - **Data Client** (`client`): per-resource snapshots with validators,
//!   skew-corrected timestamps and write-through local storage
//! - **Notifier** (`notifier`): user-facing notices, coalesced per source
//! - **Resources** (`resources`, `models`): the daemon's resource catalogue
//!   and typed payloads
//!
//! ## Data Flow
//!
//! ```text
//! push channel ──> ConnectionWatcher ──(EventBus)──> DataClient ──> listeners
//!                          │                             │
//!                          └── abort_all ──> Transport <─┘
//! ```

pub mod client;
pub mod error;
pub mod models;
pub mod notifier;
pub mod resources;
pub mod transport;
pub mod watcher;

pub use client::{DataClient, ResourceChange, Snapshot, SCHEMA_KEY, SCHEMA_VERSION};
pub use error::{Result, SyncError};
pub use models::{
    LibraryInfo, Mount, MountRequest, Output, OutputAttributes, OutputUpdate, PlayState,
    StateCommand, Stats, Status, StatusUpdate, UpdateRequest,
};
pub use notifier::Notifier;
pub use resources::{Persistence, Resource};
pub use transport::{Fetch, Response, Transport, Validators};
pub use watcher::{ConnectionWatcher, Phase, Signal, WatcherState};
