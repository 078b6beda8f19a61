//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the client core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Broadcast event bus for cross-component notifications
//! - Synchronous named listeners for in-order callbacks
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, the configuration surface and the two
//! event mechanisms used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod pubsub;

pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
pub use pubsub::{ListenerId, Listeners};
