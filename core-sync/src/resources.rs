//! Server resource catalogue.

use std::fmt;

/// Where a resource's snapshot is written through to, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Small store: current track, playlist, preferences
    Small,
    /// Large store: the full library snapshot
    Large,
}

/// A named server resource, fetched with conditional GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Status,
    Current,
    Playlist,
    LibrarySongs,
    Library,
    Outputs,
    Storage,
    Neighbors,
    Stats,
    Version,
    Images,
}

impl Resource {
    pub const ALL: [Resource; 11] = [
        Resource::Status,
        Resource::Current,
        Resource::Playlist,
        Resource::LibrarySongs,
        Resource::Library,
        Resource::Outputs,
        Resource::Storage,
        Resource::Neighbors,
        Resource::Stats,
        Resource::Version,
        Resource::Images,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Resource::Status => "/api/music",
            Resource::Current => "/api/music/playlist/songs/current",
            Resource::Playlist => "/api/music/playlist",
            Resource::LibrarySongs => "/api/music/library/songs",
            Resource::Library => "/api/music/library",
            Resource::Outputs => "/api/music/outputs",
            Resource::Storage => "/api/music/storage",
            Resource::Neighbors => "/api/music/storage/neighbors",
            Resource::Stats => "/api/music/stats",
            Resource::Version => "/api/version",
            Resource::Images => "/api/music/images",
        }
    }

    /// Resource named by a push notification. Surrounding whitespace and a
    /// trailing slash are ignored.
    pub fn from_path(path: &str) -> Option<Resource> {
        let path = path.trim();
        let path = path.strip_suffix('/').filter(|p| !p.is_empty()).unwrap_or(path);
        Resource::ALL.into_iter().find(|r| r.path() == path)
    }

    pub fn persistence(self) -> Option<Persistence> {
        match self {
            Resource::Current | Resource::Playlist => Some(Persistence::Small),
            Resource::LibrarySongs => Some(Persistence::Large),
            _ => None,
        }
    }

    /// Key of the persisted snapshot.
    pub fn storage_key(self) -> String {
        format!("snapshot:{}", self.path())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_round_trip() {
        for resource in Resource::ALL {
            assert_eq!(Resource::from_path(resource.path()), Some(resource));
        }
    }

    #[test]
    fn test_from_path_tolerates_whitespace() {
        assert_eq!(
            Resource::from_path(" /api/music/playlist/\n"),
            Some(Resource::Playlist)
        );
        assert_eq!(Resource::from_path("/api/music/unknown"), None);
        assert_eq!(Resource::from_path("pong"), None);
    }

    #[test]
    fn test_persistent_resources() {
        let persistent: Vec<Resource> = Resource::ALL
            .into_iter()
            .filter(|r| r.persistence().is_some())
            .collect();
        assert_eq!(
            persistent,
            vec![Resource::Current, Resource::Playlist, Resource::LibrarySongs]
        );
        assert_eq!(Resource::LibrarySongs.persistence(), Some(Persistence::Large));
    }
}
