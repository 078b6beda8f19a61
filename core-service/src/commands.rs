//! Control commands sent to the daemon.
//!
//! Every command is a single POST. Failures have already been raised as
//! notices by the transport when they are returned here.

use crate::client::MusicClient;
use crate::error::{CoreError, Result};
use core_library::VirtualPlaylist;
use core_sync::{
    MountRequest, OutputUpdate, Resource, StateCommand, StatusUpdate, UpdateRequest,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

impl MusicClient {
    async fn post<B: Serialize>(&self, resource: Resource, body: &B) -> Result<()> {
        self.transport().post(resource.path(), body).await?;
        Ok(())
    }

    /// Sends a partial status update.
    pub async fn update_status(&self, update: StatusUpdate) -> Result<()> {
        self.post(Resource::Status, &update).await
    }

    pub async fn play(&self) -> Result<()> {
        self.update_status(StatusUpdate::state(StateCommand::Play)).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.update_status(StatusUpdate::state(StateCommand::Pause)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.update_status(StatusUpdate::state(StateCommand::Stop)).await
    }

    pub async fn next(&self) -> Result<()> {
        self.update_status(StatusUpdate::state(StateCommand::Next)).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.update_status(StatusUpdate::state(StateCommand::Previous)).await
    }

    pub async fn set_volume(&self, volume: u32) -> Result<()> {
        self.update_status(StatusUpdate {
            volume: Some(volume.min(100)),
            ..Default::default()
        })
        .await
    }

    pub async fn set_repeat(&self, repeat: bool) -> Result<()> {
        self.update_status(StatusUpdate {
            repeat: Some(repeat),
            ..Default::default()
        })
        .await
    }

    pub async fn set_random(&self, random: bool) -> Result<()> {
        self.update_status(StatusUpdate {
            random: Some(random),
            ..Default::default()
        })
        .await
    }

    pub async fn set_single(&self, single: bool) -> Result<()> {
        self.update_status(StatusUpdate {
            single: Some(single),
            ..Default::default()
        })
        .await
    }

    /// Seeks the current track to `seconds`.
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.update_status(StatusUpdate {
            seek: Some(seconds.max(0.0)),
            ..Default::default()
        })
        .await
    }

    /// Plays the active grouping from row `pos` of its ordering, limited to
    /// the directories the cursor has entered.
    pub async fn play_row(&self, pos: usize) -> Result<()> {
        let request = self
            .with_library(|library| library.playlist_request(pos))
            .ok_or(CoreError::NothingToPlay(pos))?;
        debug!(pos, filters = request.filters.len(), "Playing row");
        self.post(Resource::Playlist, &request).await
    }

    /// Plays the whole ordering of `grouping` from row `pos`.
    pub async fn play_all(&self, grouping: &str, pos: usize) -> Result<()> {
        let request = self
            .with_library(|library| {
                let len = library.sorted(grouping)?.len();
                let sort = library.groupings().get(grouping)?.sort.clone();
                (pos < len).then(|| VirtualPlaylist {
                    sort: Some(sort),
                    filters: Vec::new(),
                    must: 0,
                    current: pos,
                })
            })
            .ok_or(CoreError::NothingToPlay(pos))?;
        self.post(Resource::Playlist, &request).await
    }

    /// Asks the daemon to rescan its music directory.
    pub async fn rescan_library(&self) -> Result<()> {
        self.post(Resource::Library, &UpdateRequest::START).await
    }

    /// Asks the daemon to rebuild its cover-art index.
    pub async fn rescan_images(&self) -> Result<()> {
        self.post(Resource::Images, &UpdateRequest::START).await
    }

    pub async fn set_output(&self, id: &str, update: OutputUpdate) -> Result<()> {
        let body = BTreeMap::from([(id.to_string(), update)]);
        self.post(Resource::Outputs, &body).await
    }

    pub async fn mount(&self, path: &str, uri: &str) -> Result<()> {
        let body = BTreeMap::from([(
            path.to_string(),
            MountRequest {
                uri: Some(uri.to_string()),
            },
        )]);
        self.post(Resource::Storage, &body).await
    }

    pub async fn unmount(&self, path: &str) -> Result<()> {
        let body = BTreeMap::from([(path.to_string(), MountRequest { uri: None })]);
        self.post(Resource::Storage, &body).await
    }
}
