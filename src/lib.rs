//! Client engine for a networked music daemon.
//!
//! Re-exports the service façade so host applications can depend on a
//! single crate and pick bridges through features.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
