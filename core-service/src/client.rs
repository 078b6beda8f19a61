//! Application root.

use crate::error::Result;
use bridge_traits::storage::LocalStore;
use core_library::{Ancestor, Groupings, Library, Listing, Navigation, Track};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, Receiver};
use core_sync::{
    ConnectionWatcher, DataClient, LibraryInfo, Notifier, Resource, ResourceChange, Status,
    Transport,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Key of the persisted active grouping in the small store.
pub const ROOT_KEY: &str = "library.root";

/// Client engine for one daemon.
///
/// Owns every component and wires them together:
///
/// ```text
/// ConnectionWatcher ──> DataClient ──> Library ──> LibraryEvent
/// ```
///
/// Navigation methods are synchronous; each completes its mutation and
/// releases the library lock before `LibraryEvent::Changed` is published,
/// so event handlers may navigate again.
pub struct MusicClient {
    config: CoreConfig,
    bus: EventBus,
    notifier: Arc<Notifier>,
    transport: Transport,
    data: Arc<DataClient>,
    watcher: Arc<ConnectionWatcher>,
    library: Arc<Mutex<Library>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for MusicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .finish()
    }
}

impl MusicClient {
    /// Builds a client browsing with the default groupings.
    pub fn new(config: CoreConfig) -> Self {
        Self::with_groupings(config, Groupings::default())
    }

    /// Builds a client browsing with groupings parsed from JSON.
    pub fn with_groupings_json(config: CoreConfig, json: &str) -> Result<Self> {
        Ok(Self::with_groupings(config, Groupings::from_json(json)?))
    }

    pub fn with_groupings(config: CoreConfig, groupings: Groupings) -> Self {
        let bus = EventBus::new(config.event_buffer_size);
        let notifier = Arc::new(Notifier::new(bus.clone()));
        let transport = Transport::new(
            config.http_client.clone(),
            config.base_url.clone(),
            config.transport,
            notifier.clone(),
        );
        let data = Arc::new(DataClient::new(
            transport.clone(),
            config.store.clone(),
            config.library_store.clone(),
            config.clock.clone(),
            bus.clone(),
        ));
        let watcher = Arc::new(ConnectionWatcher::new(
            config.push_channel.clone(),
            config.push_url(),
            config.watcher.clone(),
            transport.clone(),
            notifier.clone(),
            bus.clone(),
        ));
        let library = Arc::new(Mutex::new(Library::new(groupings)));

        let client = Self {
            config,
            bus,
            notifier,
            transport,
            data,
            watcher,
            library,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        };
        client.wire();
        client
    }

    /// Routes data client changes into the library.
    fn wire(&self) {
        let sync = LibrarySync {
            library: self.library.clone(),
            data: Arc::downgrade(&self.data),
            store: self.config.store.clone(),
            bus: self.bus.clone(),
        };

        let on_tracks = sync.clone();
        self.data.subscribe(Resource::LibrarySongs, move |change| {
            on_tracks.replace_tracks(change)
        });
        let on_current = sync.clone();
        self.data
            .subscribe(Resource::Current, move |_| on_current.follow_current());
        let on_playlist = sync.clone();
        self.data
            .subscribe(Resource::Playlist, move |_| on_playlist.follow_current());
        self.data
            .subscribe(Resource::Library, move |change| sync.detect_update_finished(change));
    }

    /// Restores local state and starts the watcher and data client.
    pub async fn start(&self) -> Result<()> {
        match self.config.store.get_string(ROOT_KEY).await {
            Ok(Some(root)) => {
                let resumed = self.library.lock().resume(&root);
                debug!(root = %root, resumed, "Resuming grouping");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read stored grouping"),
        }

        let restored = self.data.restore().await;
        info!(restored, base_url = %self.config.base_url, "Starting music client");
        self.emit_changed(self.navigation());

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(
            self.data
                .clone()
                .run(self.bus.subscribe(), self.shutdown.clone()),
        ));
        tasks.push(self.watcher.clone().spawn(self.shutdown.clone()));
        Ok(())
    }

    /// Stops background tasks and cancels in-flight requests.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.transport.abort_all();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task failed");
            }
        }
        info!("Music client stopped");
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> Receiver<CoreEvent> {
        self.bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn data(&self) -> &Arc<DataClient> {
        &self.data
    }

    pub fn status(&self) -> Option<Status> {
        self.data.status()
    }

    /// Elapsed seconds of the current track, projected to now.
    pub fn elapsed(&self) -> Option<f64> {
        let now = self.config.clock.now();
        self.data.status().map(|status| status.elapsed_at(now))
    }

    pub fn library_info(&self) -> Option<LibraryInfo> {
        self.data.library_info()
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn navigation(&self) -> Navigation {
        let library = self.library.lock();
        Navigation {
            root: library.rootname().to_string(),
            depth: library.tree().len(),
        }
    }

    /// Runs `f` against the library, then publishes the new cursor position
    /// and persists the grouping if it changed.
    fn navigate<F>(&self, f: F) -> Navigation
    where
        F: FnOnce(&mut Library) -> Navigation,
    {
        let (before, nav) = {
            let mut library = self.library.lock();
            let before = library.rootname().to_string();
            (before, f(&mut library))
        };
        if before != nav.root {
            persist_root(&self.config.store, &nav.root);
        }
        self.emit_changed(nav.clone());
        nav
    }

    fn emit_changed(&self, nav: Navigation) {
        emit(
            &self.bus,
            LibraryEvent::Changed {
                root: nav.root,
                depth: nav.depth,
            },
        );
    }

    /// Listing at the cursor.
    pub fn list(&self) -> Arc<Listing> {
        self.library.lock().list()
    }

    pub fn tree(&self) -> Vec<(String, String)> {
        self.library.lock().tree().to_vec()
    }

    pub fn rootname(&self) -> String {
        self.library.lock().rootname().to_string()
    }

    pub fn down(&self, value: &str) -> Navigation {
        self.navigate(|library| library.down(value))
    }

    pub fn up(&self) -> Navigation {
        self.navigate(|library| library.up())
    }

    /// Opens `root` at its top level. Unknown names leave the cursor alone.
    pub fn resume(&self, root: &str) -> Navigation {
        self.navigate(|library| {
            library.resume(root);
            Navigation {
                root: library.rootname().to_string(),
                depth: library.tree().len(),
            }
        })
    }

    /// Moves the cursor to `track`.
    pub fn abs(&self, track: &Track) -> Navigation {
        let playlist = self.data.playlist();
        self.navigate(|library| library.abs(track, playlist.as_ref()))
    }

    /// Moves the cursor to the playing track, if any.
    pub fn follow_current(&self) -> Option<Navigation> {
        let current = self.data.current()?;
        Some(self.abs(&current))
    }

    pub fn parent(&self) -> Ancestor {
        self.library.lock().parent()
    }

    pub fn grandparent(&self) -> Ancestor {
        self.library.lock().grandparent()
    }

    /// Runs `f` with the library locked. `f` must not call back into the
    /// client.
    pub fn with_library<R>(&self, f: impl FnOnce(&mut Library) -> R) -> R {
        f(&mut self.library.lock())
    }
}

impl Drop for MusicClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Stores the active grouping so the next start resumes it.
fn persist_root(store: &Arc<dyn LocalStore>, root: &str) {
    let store = store.clone();
    let root = root.to_string();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = store.set_string(ROOT_KEY, &root).await {
                    warn!(error = %e, "Failed to persist grouping");
                }
            });
        }
        Err(_) => debug!(root = %root, "No runtime, grouping not persisted"),
    }
}

fn emit(bus: &EventBus, event: LibraryEvent) {
    if bus.emit(CoreEvent::Library(event)).is_err() {
        debug!("No subscribers for library event");
    }
}

/// Data-client listener state. Holds the data client weakly; the data client
/// owns the listeners.
#[derive(Clone)]
struct LibrarySync {
    library: Arc<Mutex<Library>>,
    data: Weak<DataClient>,
    store: Arc<dyn LocalStore>,
    bus: EventBus,
}

impl LibrarySync {
    fn replace_tracks(&self, change: &ResourceChange) {
        let tracks = match Vec::<Track>::deserialize(change.new.value.as_ref()) {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(error = %e, "Unexpected library payload");
                return;
            }
        };
        let count = tracks.len();
        self.library.lock().update_tracks(tracks);
        info!(count, "Library tracks replaced");
        emit(&self.bus, LibraryEvent::TracksReplaced { count });
        self.follow_current();
    }

    fn follow_current(&self) {
        let Some(data) = self.data.upgrade() else {
            return;
        };
        let Some(current) = data.current() else {
            return;
        };
        let playlist = data.playlist();

        let (before, nav) = {
            let mut library = self.library.lock();
            if library.tracks().is_empty() {
                return;
            }
            let before = library.rootname().to_string();
            (before, library.abs(&current, playlist.as_ref()))
        };
        debug!(root = %nav.root, depth = nav.depth, "Following current track");
        if before != nav.root {
            persist_root(&self.store, &nav.root);
        }
        emit(
            &self.bus,
            LibraryEvent::Changed {
                root: nav.root,
                depth: nav.depth,
            },
        );
    }

    fn detect_update_finished(&self, change: &ResourceChange) {
        let updating = |value: &serde_json::Value| {
            value
                .get("updating")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        };
        let was_updating = change.old.as_ref().is_some_and(|old| updating(&old.value));
        if was_updating && !updating(&change.new.value) {
            info!("Library update finished");
            emit(&self.bus, LibraryEvent::UpdateFinished);
        }
    }
}
