//! Core service façade.
//!
//! [`MusicClient`] wires host-provided bridges (HTTP, push channel, local
//! storage, clock) from a [`CoreConfig`](core_runtime::config::CoreConfig)
//! into the transport, watcher, data client and library, and exposes
//! navigation and control commands to the host UI. Desktop apps typically
//! enable the `desktop-shims` feature, which injects the `bridge-desktop`
//! HTTP client and push channel when none are given.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::MusicClient;
//!
//! let config = CoreConfig::builder().base_url("http://localhost:8080").build()?;
//! let client = MusicClient::new(config);
//! client.start().await?;
//! client.down("AlbumArtist");
//! client.play_row(0).await?;
//! ```

pub mod client;
pub mod commands;
pub mod error;

pub use client::{MusicClient, ROOT_KEY};
pub use error::{CoreError, Result};

/// Builds a client for `base_url` with the desktop bridges, keeping local
/// state in SQLite files under `data_dir`.
#[cfg(feature = "desktop-shims")]
pub async fn connect_desktop(
    base_url: &str,
    data_dir: &std::path::Path,
) -> Result<MusicClient> {
    use bridge_desktop::SqliteLocalStore;
    use std::sync::Arc;

    let store = SqliteLocalStore::new(data_dir.join("state.db")).await?;
    let library_store = SqliteLocalStore::new(data_dir.join("library.db")).await?;
    let config = core_runtime::config::CoreConfig::builder()
        .base_url(base_url)
        .store(Arc::new(store))
        .library_store(Arc::new(library_store))
        .build()?;
    Ok(MusicClient::new(config))
}
