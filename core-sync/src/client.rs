//! # Data Client
//!
//! Holds the latest snapshot of every server resource and keeps it current.
//!
//! ## Overview
//!
//! - `Connected` and `Lost` connection events refetch every resource;
//!   `ResourceChanged` refetches the named one. Each fetch is conditional on
//!   the validators of the held snapshot.
//! - A fresh, non-empty payload replaces the snapshot, is written through to
//!   local storage for persistent resources, and is announced both on the
//!   event bus and to [`ResourceChange`] listeners with the old and new
//!   snapshot.
//! - Snapshot times are corrected for clock skew between daemon and client:
//!   `last_modified + (local receipt - server Date)`.
//! - [`DataClient::restore`] reloads persisted snapshots on startup, wiping
//!   both stores first when the schema-version marker does not match.
//!
//! Storage failures are logged and otherwise ignored; the client then runs
//! on in-memory state only.

use crate::error::Result;
use crate::models::{
    Images, LibraryInfo, Neighbors, Outputs, Stats, Status, Storage, Version,
};
use crate::resources::{Persistence, Resource};
use crate::transport::{Fetch, Response, Transport, Validators};
use bridge_traits::storage::LocalStore;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_library::{Track, VirtualPlaylist};
use core_runtime::events::{
    ConnectionEvent, CoreEvent, EventBus, Receiver, RecvError, ResourceEvent,
};
use core_runtime::pubsub::{ListenerId, Listeners};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Version of the persisted snapshot format.
pub const SCHEMA_VERSION: &str = "1";

/// Key of the schema-version marker in the small store.
pub const SCHEMA_KEY: &str = "schema_version";

/// Latest known state of a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub value: Arc<Value>,
    pub validators: Validators,
    /// Skew-corrected local time of the last modification.
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSnapshot {
    value: Value,
    #[serde(default)]
    validators: Validators,
    modified_at: DateTime<Utc>,
}

/// Old and new snapshot of a resource that just changed.
#[derive(Debug, Clone)]
pub struct ResourceChange {
    pub resource: Resource,
    pub old: Option<Snapshot>,
    pub new: Snapshot,
}

pub struct DataClient {
    transport: Transport,
    store: Arc<dyn LocalStore>,
    library_store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    snapshots: RwLock<HashMap<Resource, Snapshot>>,
    listeners: Listeners<ResourceChange>,
}

impl std::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataClient")
            .field("transport", &self.transport)
            .field("snapshots", &self.snapshots.read().len())
            .finish()
    }
}

impl DataClient {
    pub fn new(
        transport: Transport,
        store: Arc<dyn LocalStore>,
        library_store: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        Self {
            transport,
            store,
            library_store,
            clock,
            bus,
            snapshots: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Registers `callback` for changes of `resource`.
    pub fn subscribe<F>(&self, resource: Resource, callback: F) -> ListenerId
    where
        F: Fn(&ResourceChange) + Send + Sync + 'static,
    {
        self.listeners.subscribe(resource.path(), callback)
    }

    pub fn unsubscribe(&self, resource: Resource, id: ListenerId) -> bool {
        self.listeners.unsubscribe(resource.path(), id)
    }

    pub fn snapshot(&self, resource: Resource) -> Option<Snapshot> {
        self.snapshots.read().get(&resource).cloned()
    }

    fn store_for(&self, persistence: Persistence) -> &Arc<dyn LocalStore> {
        match persistence {
            Persistence::Small => &self.store,
            Persistence::Large => &self.library_store,
        }
    }

    /// Loads persisted snapshots. Returns how many were restored.
    ///
    /// A missing or different schema-version marker clears both stores and
    /// writes the current marker instead.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> usize {
        let marker = match self.store.get_string(SCHEMA_KEY).await {
            Ok(marker) => marker,
            Err(e) => {
                warn!(error = %e, "Local storage unavailable, starting without snapshots");
                return 0;
            }
        };

        if marker.as_deref() != Some(SCHEMA_VERSION) {
            info!(found = ?marker, expected = SCHEMA_VERSION, "Clearing local state of another schema");
            for store in [&self.store, &self.library_store] {
                if let Err(e) = store.clear_all().await {
                    warn!(error = %e, "Failed to clear local storage");
                }
            }
            if let Err(e) = self.store.set_string(SCHEMA_KEY, SCHEMA_VERSION).await {
                warn!(error = %e, "Failed to write schema marker");
            }
            return 0;
        }

        let mut restored = 0;
        for resource in Resource::ALL {
            let Some(persistence) = resource.persistence() else {
                continue;
            };
            let json = match self
                .store_for(persistence)
                .get_string(&resource.storage_key())
                .await
            {
                Ok(Some(json)) => json,
                Ok(None) => continue,
                Err(e) => {
                    warn!(resource = %resource, error = %e, "Failed to read stored snapshot");
                    continue;
                }
            };
            let stored: StoredSnapshot = match serde_json::from_str(&json) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(resource = %resource, error = %e, "Discarding unreadable snapshot");
                    continue;
                }
            };

            let snapshot = Snapshot {
                value: Arc::new(stored.value),
                validators: stored.validators,
                modified_at: stored.modified_at,
            };
            {
                let mut snapshots = self.snapshots.write();
                if snapshots.contains_key(&resource) {
                    continue;
                }
                snapshots.insert(resource, snapshot.clone());
            }

            debug!(resource = %resource, "Restored snapshot");
            restored += 1;
            let _ = self.bus.emit(CoreEvent::Resource(ResourceEvent::Restored {
                path: resource.path().to_string(),
            }));
            self.listeners.emit(
                resource.path(),
                &ResourceChange {
                    resource,
                    old: None,
                    new: snapshot,
                },
            );
        }
        restored
    }

    /// Conditionally refetches `resource`. Returns whether the snapshot changed.
    ///
    /// # Errors
    ///
    /// Propagates transport failures, which have already been raised as
    /// notices.
    pub async fn refresh(&self, resource: Resource) -> Result<bool> {
        let validators = self
            .snapshots
            .read()
            .get(&resource)
            .map(|s| s.validators.clone())
            .unwrap_or_default();

        match self.transport.get(resource.path(), &validators).await? {
            Fetch::Fresh(response) => {
                let received = self.clock.now();
                Ok(self.apply(resource, response, received).await)
            }
            Fetch::NotModified | Fetch::Cancelled => Ok(false),
        }
    }

    /// Refetches every resource concurrently. Returns how many changed.
    pub async fn refresh_all(&self) -> usize {
        let results = join_all(Resource::ALL.map(|resource| self.refresh(resource))).await;
        results
            .into_iter()
            .filter(|result| match result {
                Ok(changed) => *changed,
                Err(e) => {
                    debug!(error = %e, "Refresh failed");
                    false
                }
            })
            .count()
    }

    /// Replaces the snapshot of `resource` with a fresh payload received at
    /// `received`. Returns `false` for an empty object, which leaves the
    /// snapshot untouched.
    pub async fn apply(
        &self,
        resource: Resource,
        response: Response,
        received: DateTime<Utc>,
    ) -> bool {
        if response.value.as_object().is_some_and(|map| map.is_empty()) {
            debug!(resource = %resource, "Ignoring empty payload");
            return false;
        }

        let modified_at = skew_corrected(&response, received);
        let new = Snapshot {
            value: Arc::new(response.value),
            validators: response.validators,
            modified_at,
        };
        let old = self.snapshots.write().insert(resource, new.clone());

        if let Some(persistence) = resource.persistence() {
            self.write_through(resource, persistence, &new).await;
        }

        debug!(resource = %resource, modified_at = %modified_at, "Snapshot updated");
        let _ = self.bus.emit(CoreEvent::Resource(ResourceEvent::Updated {
            path: resource.path().to_string(),
            modified_at_ms: modified_at.timestamp_millis(),
        }));
        self.listeners.emit(
            resource.path(),
            &ResourceChange { resource, old, new },
        );
        true
    }

    async fn write_through(
        &self,
        resource: Resource,
        persistence: Persistence,
        snapshot: &Snapshot,
    ) {
        let stored = StoredSnapshot {
            value: (*snapshot.value).clone(),
            validators: snapshot.validators.clone(),
            modified_at: snapshot.modified_at,
        };
        let json = match serde_json::to_string(&stored) {
            Ok(json) => json,
            Err(e) => {
                warn!(resource = %resource, error = %e, "Failed to serialize snapshot");
                return;
            }
        };
        if let Err(e) = self
            .store_for(persistence)
            .set_string(&resource.storage_key(), &json)
            .await
        {
            warn!(resource = %resource, error = %e, "Failed to persist snapshot");
        }
    }

    /// Reacts to connection events until `shutdown` is cancelled or the bus
    /// closes.
    pub async fn run(
        self: Arc<Self>,
        mut events: Receiver<CoreEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(CoreEvent::Connection(ConnectionEvent::Connected))
                | Ok(CoreEvent::Connection(ConnectionEvent::Lost)) => self.spawn_refresh_all(),
                Ok(CoreEvent::Connection(ConnectionEvent::ResourceChanged { path })) => {
                    match Resource::from_path(&path) {
                        Some(resource) => {
                            let client = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = client.refresh(resource).await {
                                    debug!(resource = %resource, error = %e, "Refresh failed");
                                }
                            });
                        }
                        None => debug!(path = %path, "Ignoring change of unknown resource"),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event subscriber lagged, refreshing everything");
                    self.spawn_refresh_all();
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Data client stopped");
    }

    fn spawn_refresh_all(self: &Arc<Self>) {
        let client = self.clone();
        tokio::spawn(async move {
            let changed = client.refresh_all().await;
            debug!(changed, "Refreshed all resources");
        });
    }

    fn typed<T: DeserializeOwned>(&self, resource: Resource) -> Option<T> {
        let snapshot = self.snapshot(resource)?;
        match T::deserialize(snapshot.value.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(resource = %resource, error = %e, "Unexpected payload shape");
                None
            }
        }
    }

    /// Player status, stamped with the snapshot's corrected time.
    pub fn status(&self) -> Option<Status> {
        let modified_at = self.snapshot(Resource::Status)?.modified_at;
        let mut status: Status = self.typed(Resource::Status)?;
        status.modified_at = Some(modified_at);
        Some(status)
    }

    pub fn current(&self) -> Option<Track> {
        self.typed::<Option<Track>>(Resource::Current).flatten()
    }

    pub fn playlist(&self) -> Option<VirtualPlaylist> {
        self.typed(Resource::Playlist)
    }

    pub fn library_info(&self) -> Option<LibraryInfo> {
        self.typed(Resource::Library)
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.typed(Resource::LibrarySongs).unwrap_or_default()
    }

    pub fn outputs(&self) -> Outputs {
        self.typed(Resource::Outputs).unwrap_or_default()
    }

    pub fn storage(&self) -> Storage {
        self.typed(Resource::Storage).unwrap_or_default()
    }

    pub fn neighbors(&self) -> Neighbors {
        self.typed(Resource::Neighbors).unwrap_or_default()
    }

    pub fn stats(&self) -> Option<Stats> {
        self.typed(Resource::Stats)
    }

    pub fn version(&self) -> Version {
        self.typed(Resource::Version).unwrap_or_default()
    }

    pub fn images(&self) -> Option<Images> {
        self.typed(Resource::Images)
    }
}

/// Local time of the last modification, corrected for server clock skew.
pub fn skew_corrected(response: &Response, received: DateTime<Utc>) -> DateTime<Utc> {
    let last_modified = response
        .validators
        .last_modified
        .as_deref()
        .and_then(|lm| DateTime::parse_from_rfc2822(lm).ok())
        .map(|lm| lm.with_timezone(&Utc));

    match (last_modified, response.date) {
        (Some(last_modified), Some(date)) => last_modified + (received - date),
        (Some(last_modified), None) => last_modified,
        (None, _) => received,
    }
}
