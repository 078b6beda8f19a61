//! Typed payloads of the daemon's resources and command bodies.
//!
//! Every field carries a serde default so that a daemon omitting a field
//! (older versions, stopped player) still decodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Play,
    Pause,
    #[default]
    Stop,
}

/// Player status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub state: PlayState,
    pub volume: Option<u32>,
    pub repeat: bool,
    pub random: bool,
    pub single: bool,
    pub consume: bool,
    /// Seconds into the current track at `modified_at`.
    #[serde(rename = "song_elapsed")]
    pub elapsed: f64,
    pub replay_gain: String,
    pub crossfade: u32,
    pub error: Option<String>,
    /// Skew-corrected local time the snapshot describes. Not part of the
    /// payload; filled in by the data client.
    #[serde(skip)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Status {
    /// Elapsed seconds projected to `now`. Only a playing track advances.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        match (self.state, self.modified_at) {
            (PlayState::Play, Some(at)) => {
                let delta = (now - at).num_milliseconds().max(0) as f64 / 1000.0;
                self.elapsed + delta
            }
            _ => self.elapsed,
        }
    }
}

/// Output plugin attributes the client may change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_formats: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dop: Option<bool>,
}

impl OutputAttributes {
    pub fn is_empty(&self) -> bool {
        self.allowed_formats.is_none() && self.dop.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub name: String,
    pub plugin: String,
    pub enabled: bool,
    pub attributes: OutputAttributes,
}

/// Output devices keyed by id.
pub type Outputs = BTreeMap<String, Output>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Mount {
    pub uri: Option<String>,
}

/// Mounted storage keyed by mount path.
pub type Storage = BTreeMap<String, Mount>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Neighbor {
    pub name: String,
    pub uri: String,
}

/// Discoverable network shares keyed by name.
pub type Neighbors = BTreeMap<String, Neighbor>;

/// Database and player counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub artists: u64,
    pub albums: u64,
    pub songs: u64,
    pub uptime: u64,
    pub playtime: u64,
    pub db_playtime: u64,
    pub db_update: i64,
}

/// Component versions keyed by component name.
pub type Version = HashMap<String, String>;

/// Library database state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryInfo {
    pub updating: bool,
}

/// Cover-art index state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    pub updating: bool,
}

// ============================================================================
// Command bodies
// ============================================================================

/// Transport command carried in the `state` field of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateCommand {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
}

/// Partial status update; only the set fields are sent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consume: Option<bool>,
    #[serde(rename = "song_elapsed", skip_serializing_if = "Option::is_none")]
    pub seek: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_gain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crossfade: Option<u32>,
}

impl StatusUpdate {
    pub fn state(state: StateCommand) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }
}

/// Body of an output change, keyed by output id in the request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "OutputAttributes::is_empty")]
    pub attributes: OutputAttributes,
}

/// Body of a mount change, keyed by mount path. `uri: None` unmounts and is
/// sent as an explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MountRequest {
    pub uri: Option<String>,
}

/// Body that asks the daemon to start a rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub updating: bool,
}

impl UpdateRequest {
    pub const START: UpdateRequest = UpdateRequest { updating: true };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_status_decodes_partial_payload() {
        let status: Status =
            serde_json::from_value(json!({"state": "play", "song_elapsed": 12.5})).unwrap();
        assert_eq!(status.state, PlayState::Play);
        assert_eq!(status.volume, None);
        assert!(!status.repeat);
        assert_eq!(status.elapsed, 12.5);
    }

    #[test]
    fn test_elapsed_projection() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut status = Status {
            state: PlayState::Play,
            elapsed: 30.0,
            modified_at: Some(at),
            ..Default::default()
        };
        assert_eq!(status.elapsed_at(at + Duration::milliseconds(2500)), 32.5);

        status.state = PlayState::Pause;
        assert_eq!(status.elapsed_at(at + Duration::seconds(60)), 30.0);
    }

    #[test]
    fn test_status_update_sends_only_set_fields() {
        let body = serde_json::to_value(StatusUpdate::state(StateCommand::Next)).unwrap();
        assert_eq!(body, json!({"state": "next"}));

        let body = serde_json::to_value(StatusUpdate {
            volume: Some(40),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"volume": 40}));
    }

    #[test]
    fn test_unmount_sends_null_uri() {
        let body = serde_json::to_value(MountRequest { uri: None }).unwrap();
        assert_eq!(body, json!({"uri": null}));
    }

    #[test]
    fn test_output_update_omits_empty_attributes() {
        let body = serde_json::to_value(OutputUpdate {
            enabled: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"enabled": true}));

        let body = serde_json::to_value(OutputUpdate {
            enabled: None,
            attributes: OutputAttributes {
                dop: Some(true),
                ..Default::default()
            },
        })
        .unwrap();
        assert_eq!(body, json!({"attributes": {"dop": true}}));
    }
}
