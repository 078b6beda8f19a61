//! Library browsing cursor.
//!
//! The cursor walks a [`Grouping`] as a virtual directory tree. Its path is a
//! list of `(tag, value)` pairs whose first entry is always
//! `("root", grouping name)`; an empty path means a grouping has not been
//! chosen yet.
//!
//! Listings are memoized per depth and keyed by the whole path, and sorted
//! orderings are memoized per grouping. Both caches are dropped whenever the
//! track collection is replaced.
//!
//! Directories that hold a single track are skipped transparently in both
//! directions: descending into one jumps straight to the leaf, and ascending
//! from that leaf jumps back over the same chain.

use crate::grouping::{Grouping, Groupings, Style};
use crate::tags::{self, Row, Track};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tag of the first path entry, and the name of the grouping chooser.
pub const ROOT: &str = "root";

/// Placeholder ancestor above the grouping chooser.
pub const TOP: &str = "top";

/// One memoized directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// Serialized path this listing was computed for.
    pub key: String,
    pub rows: Vec<Row>,
    pub style: Style,
    /// `false` when the entries are songs.
    pub is_directory: bool,
    /// Expanded rows matching the path before de-duplication.
    pub matched: usize,
}

/// Cursor position after a navigation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub root: String,
    pub depth: usize,
}

/// A directory above the current listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Ancestor {
    pub tag: String,
    pub value: String,
    /// A track below that directory, if any.
    pub track: Option<Arc<Track>>,
    pub style: Style,
}

/// A daemon-side play order derived from a grouping's sort tags.
///
/// The daemon sorts the library by `sort`, applies `filters` the way
/// [`weak_filter`](crate::tags::weak_filter) does with `must` mandatory
/// filters, and starts playing at `current`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPlaylist {
    #[serde(default)]
    pub sort: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Vec<(String, String)>,
    #[serde(default)]
    pub must: usize,
    #[serde(default)]
    pub current: usize,
}

fn tree_key(tree: &[(String, String)]) -> String {
    tree.iter()
        .map(|(tag, value)| format!("{}\u{1f}{}", tag, value))
        .collect::<Vec<_>>()
        .join("\u{1e}")
}

fn chooser_row(name: &str, pos: usize) -> Row {
    Row {
        track: Arc::new(Track::new().with(ROOT, [name])),
        sort_key: name.to_string(),
        keys: vec![(ROOT.to_string(), name.to_string())],
        pos,
    }
}

/// Browsing state over a track collection.
#[derive(Debug)]
pub struct Library {
    groupings: Groupings,
    tracks: Vec<Arc<Track>>,
    tree: Vec<(String, String)>,
    focus: Option<Row>,
    child: Option<String>,
    sorted: HashMap<String, Arc<Vec<Row>>>,
    listings: Vec<Option<Arc<Listing>>>,
}

impl Default for Library {
    fn default() -> Self {
        Self::new(Groupings::default())
    }
}

impl Library {
    pub fn new(groupings: Groupings) -> Self {
        let slots = groupings.max_depth() + 1;
        Self {
            groupings,
            tracks: Vec::new(),
            tree: Vec::new(),
            focus: None,
            child: None,
            sorted: HashMap::new(),
            listings: vec![None; slots],
        }
    }

    pub fn groupings(&self) -> &Groupings {
        &self.groupings
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn tree(&self) -> &[(String, String)] {
        &self.tree
    }

    /// Last row of interest: where `up` came from, or the located track.
    pub fn focus(&self) -> Option<&Row> {
        self.focus.as_ref()
    }

    /// Tag of the directory `up` last left.
    pub fn child(&self) -> Option<&str> {
        self.child.as_deref()
    }

    /// Replaces the collection and drops every cache.
    pub fn update_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks.into_iter().map(Arc::new).collect();
        self.sorted.clear();
        self.listings.iter_mut().for_each(|slot| *slot = None);
        debug!(count = self.tracks.len(), "Library tracks replaced");
    }

    /// Active grouping, or `"root"` while choosing one.
    pub fn rootname(&self) -> &str {
        self.tree.first().map(|(_, v)| v.as_str()).unwrap_or(ROOT)
    }

    fn grouping(&self) -> Option<&Grouping> {
        self.groupings.get(self.rootname())
    }

    /// Reopens a previously active grouping at its top level.
    ///
    /// Returns `false` and leaves the cursor alone if `root` is unknown.
    pub fn resume(&mut self, root: &str) -> bool {
        if self.groupings.get(root).is_none() {
            return false;
        }
        self.tree = vec![(ROOT.to_string(), root.to_string())];
        true
    }

    /// The full sorted ordering of a grouping.
    pub fn sorted(&mut self, name: &str) -> Option<Arc<Vec<Row>>> {
        if let Some(rows) = self.sorted.get(name) {
            return Some(Arc::clone(rows));
        }
        let grouping = self.groupings.get(name)?;
        let rows = Arc::new(tags::sort(&self.tracks, &grouping.sort, &grouping.memo()));
        debug!(grouping = name, rows = rows.len(), "Sorted library");
        self.sorted.insert(name.to_string(), Arc::clone(&rows));
        Some(rows)
    }

    fn navigation(&self) -> Navigation {
        Navigation {
            root: self.rootname().to_string(),
            depth: self.tree.len(),
        }
    }

    /// Listing at the current path.
    ///
    /// A path that matches nothing (stale after a library update) is
    /// shortened one level at a time until it does.
    pub fn list(&mut self) -> Arc<Listing> {
        loop {
            let listing = self.listing();
            if listing.rows.is_empty() && self.tree.len() > 1 {
                debug!(depth = self.tree.len(), "Empty listing, ascending");
                self.tree.pop();
                continue;
            }
            return listing;
        }
    }

    fn listing(&mut self) -> Arc<Listing> {
        if !self.tree.is_empty() {
            match self.grouping().map(Grouping::depth) {
                None => {
                    warn!(root = self.rootname(), "Unknown grouping, returning to root");
                    self.tree.clear();
                }
                Some(depth) if self.tree.len() > depth => self.tree.truncate(depth),
                Some(_) => {}
            }
        }

        let depth = self.tree.len();
        let key = tree_key(&self.tree);
        if let Some(Some(cached)) = self.listings.get(depth) {
            if cached.key == key {
                return Arc::clone(cached);
            }
        }

        let listing = Arc::new(self.build_listing(key));
        if depth >= self.listings.len() {
            self.listings.resize(depth + 1, None);
        }
        self.listings[depth] = Some(Arc::clone(&listing));
        listing
    }

    fn build_listing(&mut self, key: String) -> Listing {
        if self.tree.is_empty() {
            let rows: Vec<Row> = self
                .groupings
                .names()
                .enumerate()
                .map(|(pos, name)| chooser_row(name, pos))
                .collect();
            return Listing {
                key,
                matched: rows.len(),
                rows,
                style: Style::Plain,
                is_directory: true,
            };
        }

        let depth = self.tree.len();
        let root = self.rootname().to_string();
        let level = self
            .groupings
            .get(&root)
            .map(|g| (g.levels[depth - 1].clone(), g.depth()));
        let (Some((level, levels)), Some(sorted)) = (level, self.sorted(&root)) else {
            return Listing {
                key,
                rows: Vec::new(),
                style: Style::Plain,
                is_directory: true,
                matched: 0,
            };
        };

        let matched = tags::filter(&sorted, &self.tree[1..]);
        Listing {
            key,
            rows: tags::uniq(&matched, &level.tag),
            style: level.style,
            is_directory: depth != levels,
            matched: matched.len(),
        }
    }

    /// Enters the entry named `value` of the current listing.
    ///
    /// At the grouping chooser `value` names a grouping; unknown names are
    /// ignored. At song level nothing is entered and the song becomes the
    /// focus instead.
    pub fn down(&mut self, value: &str) -> Navigation {
        if self.tree.is_empty() {
            if self.groupings.get(value).is_none() {
                warn!(grouping = value, "Ignoring unknown grouping");
                return self.navigation();
            }
            self.tree.push((ROOT.to_string(), value.to_string()));
        } else {
            let Some(levels) = self.grouping().map(|g| g.levels.clone()) else {
                self.tree.clear();
                return self.navigation();
            };
            let depth = self.tree.len();
            if depth >= levels.len() {
                let tag = levels.last().map(|l| l.tag.clone()).unwrap_or_default();
                let listing = self.list();
                self.focus = listing.rows.iter().find(|r| r.value(&tag) == value).cloned();
                return self.navigation();
            }
            self.tree.push((levels[depth - 1].tag.clone(), value.to_string()));
        }

        self.skip_down();
        let listing = self.list();
        debug!(
            root = self.rootname(),
            depth = self.tree.len(),
            rows = listing.rows.len(),
            "Descended"
        );
        self.navigation()
    }

    /// Follows directories that hold a single track down to the leaf.
    fn skip_down(&mut self) {
        let Some(levels) = self.grouping().map(|g| g.levels.clone()) else {
            return;
        };
        for _ in 0..levels.len() {
            if self.tree.is_empty() || self.tree.len() >= levels.len() {
                break;
            }
            let listing = self.list();
            if listing.matched != 1 || listing.rows.len() != 1 {
                break;
            }
            let tag = levels[self.tree.len() - 1].tag.clone();
            let value = listing.rows[0].value(&tag);
            self.tree.push((tag, value));
        }
    }

    /// Leaves the current directory, skipping parents that hold a single
    /// track.
    pub fn up(&mut self) -> Navigation {
        if self.tree.is_empty() {
            return self.navigation();
        }
        let listing = self.list();
        self.focus = listing.rows.first().cloned();

        let bound = self.groupings.max_depth() + 1;
        for step in 0..=bound {
            let Some((tag, _)) = self.tree.pop() else {
                break;
            };
            self.child = Some(tag);
            if step == bound || self.tree.is_empty() || self.list().matched != 1 {
                break;
            }
        }

        debug!(root = self.rootname(), depth = self.tree.len(), "Ascended");
        self.navigation()
    }

    /// Moves the cursor to the directory holding `track`.
    ///
    /// When the daemon plays a virtual playlist whose sort tags match a
    /// grouping, the track is looked up by its position in that ordering.
    /// Otherwise, or if the row at that position is a different file, the
    /// path is derived from the track's own tags. A track that cannot be
    /// located leaves the cursor at the grouping chooser.
    pub fn abs(&mut self, track: &Track, playlist: Option<&VirtualPlaylist>) -> Navigation {
        let Some(file) = track.file().map(str::to_string) else {
            self.tree.clear();
            return self.navigation();
        };

        let by_sort = playlist.and_then(|p| {
            let sort = p.sort.as_ref()?;
            self.groupings
                .by_sort(sort)
                .map(|g| (g.name.clone(), p.current))
        });

        if let Some((name, pos)) = &by_sort {
            if self.abs_sorted(name, *pos, &file) {
                debug!(grouping = %name, pos, "Located track by position");
                return self.navigation();
            }
        }

        let candidate = by_sort
            .map(|(name, _)| name)
            .or_else(|| self.grouping().map(|g| g.name.clone()));
        match candidate {
            Some(name) if self.abs_fallback(&name, track, &file) => {
                debug!(grouping = %name, "Located track by tags");
            }
            _ => {
                debug!("Track not found in any directory");
                self.tree.clear();
            }
        }
        self.navigation()
    }

    fn abs_sorted(&mut self, name: &str, pos: usize, file: &str) -> bool {
        let Some(rows) = self.sorted(name) else {
            return false;
        };
        let Some(row) = rows.get(pos) else {
            return false;
        };
        if row.file() != Some(file) {
            return false;
        }
        let Some(grouping) = self.groupings.get(name) else {
            return false;
        };
        let mut tree = vec![(ROOT.to_string(), name.to_string())];
        tree.extend(
            grouping.levels[..grouping.depth().saturating_sub(1)]
                .iter()
                .map(|level| (level.tag.clone(), row.value(&level.tag))),
        );
        self.tree = tree;
        self.locate(file)
    }

    fn abs_fallback(&mut self, name: &str, track: &Track, file: &str) -> bool {
        let Some(grouping) = self.groupings.get(name) else {
            return false;
        };
        let mut tree = vec![(ROOT.to_string(), name.to_string())];
        tree.extend(
            grouping.levels[..grouping.depth().saturating_sub(1)]
                .iter()
                .map(|level| (level.tag.clone(), tags::get(track, &level.tag))),
        );
        self.tree = tree;
        self.locate(file)
    }

    /// Focuses `file` in the current listing; `false` if the listing moved
    /// or does not contain it.
    fn locate(&mut self, file: &str) -> bool {
        let depth = self.tree.len();
        let listing = self.list();
        if self.tree.len() != depth {
            return false;
        }
        match listing.rows.iter().find(|row| row.file() == Some(file)) {
            Some(row) => {
                self.focus = Some(row.clone());
                true
            }
            None => false,
        }
    }

    pub fn parent(&mut self) -> Ancestor {
        self.ancestor(1)
    }

    pub fn grandparent(&mut self) -> Ancestor {
        self.ancestor(2)
    }

    fn ancestor(&mut self, up: usize) -> Ancestor {
        let listing = self.list();
        let track = listing.rows.first().map(|row| Arc::clone(&row.track));
        let depth = self.tree.len();
        if depth < up {
            return Ancestor {
                tag: TOP.to_string(),
                value: TOP.to_string(),
                track: None,
                style: Style::Plain,
            };
        }

        let index = depth - up;
        let (tag, value) = self.tree[index].clone();
        let style = match index {
            0 => Style::Plain,
            _ => self
                .grouping()
                .and_then(|g| g.levels.get(index - 1))
                .map_or(Style::Plain, |level| level.style),
        };
        Ancestor {
            tag,
            value,
            track,
            style,
        }
    }

    /// Directory constraints identifying the row at `pos` of the active
    /// grouping's ordering, outermost first.
    pub fn filters(&mut self, pos: usize) -> Vec<(String, String)> {
        let root = self.rootname().to_string();
        let Some(rows) = self.sorted(&root) else {
            return Vec::new();
        };
        let (Some(row), Some(grouping)) = (rows.get(pos), self.groupings.get(&root)) else {
            return Vec::new();
        };
        grouping.levels[..grouping.depth().saturating_sub(1)]
            .iter()
            .map(|level| (level.tag.clone(), row.value(&level.tag)))
            .collect()
    }

    /// Request asking the daemon to play the active grouping from `pos`,
    /// restricted to the directories the cursor has entered.
    pub fn playlist_request(&mut self, pos: usize) -> Option<VirtualPlaylist> {
        let sort = self.grouping()?.sort.clone();
        Some(VirtualPlaylist {
            sort: Some(sort),
            filters: self.filters(pos),
            must: self.tree.len().saturating_sub(1),
            current: pos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::FILE_TAG;

    fn track(file: &str, album_artist: &str, album: &str, title: &str) -> Track {
        Track::new()
            .with(FILE_TAG, [file])
            .with("AlbumArtist", [album_artist])
            .with("Album", [album])
            .with("Title", [title])
    }

    fn library(tracks: Vec<Track>) -> Library {
        let mut library = Library::default();
        library.update_tracks(tracks);
        library
    }

    #[test]
    fn test_chooser_lists_groupings() {
        let mut library = library(vec![]);
        assert_eq!(library.rootname(), ROOT);
        let listing = library.list();
        assert!(listing.is_directory);
        assert_eq!(listing.rows[0].value(ROOT), "AlbumArtist");
        assert_eq!(listing.rows.len(), library.groupings().len());
    }

    #[test]
    fn test_unknown_grouping_is_ignored() {
        let mut library = library(vec![track("a", "X", "M", "1")]);
        let nav = library.down("Nope");
        assert_eq!(nav.root, ROOT);
        assert!(library.tree().is_empty());
        assert!(!library.resume("Nope"));
    }

    #[test]
    fn test_listing_is_cached_per_path() {
        let mut library = library(vec![track("a", "X", "M", "1"), track("b", "Y", "N", "2")]);
        library.down("AlbumArtist");
        let first = library.list();
        let second = library.list();
        assert!(Arc::ptr_eq(&first, &second));

        library.update_tracks(vec![track("a", "X", "M", "1"), track("b", "Y", "N", "2")]);
        let third = library.list();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.rows.len(), third.rows.len());
    }

    #[test]
    fn test_is_directory_only_above_song_level() {
        let mut library = library(vec![
            track("a", "X", "M", "1"),
            track("b", "X", "M", "2"),
            track("c", "Y", "N", "3"),
        ]);
        library.down("AlbumArtist");
        assert!(library.list().is_directory);
        library.down("X");
        assert!(library.list().is_directory);
        library.down("M");
        let songs = library.list();
        assert!(!songs.is_directory);
        assert_eq!(songs.style, Style::Song);
    }

    #[test]
    fn test_down_at_song_level_focuses() {
        let mut library = library(vec![
            track("a", "X", "M", "1"),
            track("b", "X", "M", "2"),
            track("c", "Y", "N", "3"),
        ]);
        library.down("AlbumArtist");
        library.down("X");
        library.down("M");
        let before = library.tree().to_vec();

        library.down("2");
        assert_eq!(library.tree(), before.as_slice());
        assert_eq!(library.focus().and_then(Row::file), Some("b"));
    }

    #[test]
    fn test_stale_path_self_heals() {
        let mut library = library(vec![
            track("a", "X", "M", "1"),
            track("b", "X", "M", "2"),
            track("c", "Y", "N", "3"),
        ]);
        library.down("AlbumArtist");
        library.down("X");
        assert_eq!(library.tree().len(), 2);

        library.update_tracks(vec![track("c", "Y", "N", "3"), track("d", "Z", "O", "4")]);
        let listing = library.list();
        assert_eq!(library.tree().len(), 1);
        assert_eq!(listing.rows.len(), 2);
    }

    #[test]
    fn test_up_records_focus_and_child() {
        let mut library = library(vec![
            track("a", "X", "M", "1"),
            track("b", "X", "M", "2"),
            track("c", "Y", "N", "3"),
        ]);
        library.down("AlbumArtist");
        library.down("X");
        library.up();

        assert_eq!(library.child(), Some("AlbumArtist"));
        assert_eq!(library.focus().and_then(Row::file), Some("a"));
        assert_eq!(library.tree().len(), 1);
    }

    #[test]
    fn test_parent_and_grandparent() {
        let mut library = library(vec![
            track("a", "X", "M", "1"),
            track("b", "X", "M", "2"),
            track("c", "Y", "N", "3"),
        ]);
        assert_eq!(library.parent().tag, TOP);

        library.down("AlbumArtist");
        let parent = library.parent();
        assert_eq!(parent.tag, ROOT);
        assert_eq!(parent.value, "AlbumArtist");
        assert_eq!(library.grandparent().tag, TOP);

        library.down("X");
        library.down("M");
        let parent = library.parent();
        assert_eq!((parent.tag.as_str(), parent.value.as_str()), ("Album", "M"));
        assert_eq!(parent.style, Style::Album);
        assert_eq!(parent.track.as_ref().and_then(|t| t.file()), Some("a"));

        let grandparent = library.grandparent();
        assert_eq!(grandparent.value, "X");
        assert_eq!(grandparent.style, Style::Plain);
    }

    #[test]
    fn test_playlist_request_pins_entered_directories() {
        let mut library = library(vec![
            track("a", "X", "M", "1"),
            track("b", "X", "M", "2"),
            track("c", "Y", "N", "3"),
        ]);
        library.down("AlbumArtist");
        library.down("X");

        let request = library.playlist_request(1).unwrap();
        assert_eq!(request.current, 1);
        assert_eq!(request.must, 1);
        assert_eq!(
            request.filters,
            vec![
                ("AlbumArtist".to_string(), "X".to_string()),
                ("Album".to_string(), "M".to_string())
            ]
        );
        assert_eq!(
            request.sort.as_deref(),
            Some(library.groupings().get("AlbumArtist").unwrap().sort.as_slice())
        );
    }

    #[test]
    fn test_single_level_grouping_locates_tracks() {
        let groupings = Groupings::from_json(
            r#"[{"name":"Songs","sort":["file"],"levels":[{"tag":"Title","style":"song"}]}]"#,
        )
        .unwrap();
        let mut library = Library::new(groupings);
        library.update_tracks(vec![track("a", "X", "M", "1"), track("b", "X", "M", "2")]);
        assert!(library.resume("Songs"));

        let nav = library.abs(&track("b", "X", "M", "2"), None);
        assert_eq!(nav.depth, 1);
        assert_eq!(library.focus().and_then(Row::file), Some("b"));
        assert!(library.filters(1).is_empty());
        assert_eq!(library.playlist_request(1).unwrap().must, 0);
    }

    #[test]
    fn test_playlist_request_at_chooser() {
        let mut library = library(vec![track("a", "X", "M", "1")]);
        assert!(library.playlist_request(0).is_none());
    }

    #[test]
    fn test_virtual_playlist_wire_format() {
        let playlist: VirtualPlaylist = serde_json::from_str(
            r#"{"sort":["Album","file"],"filters":[["Album","M"]],"must":1,"current":3}"#,
        )
        .unwrap();
        assert_eq!(playlist.filters, vec![("Album".to_string(), "M".to_string())]);
        assert_eq!(playlist.current, 3);

        let empty: VirtualPlaylist = serde_json::from_str(r#"{"sort":null}"#).unwrap();
        assert_eq!(empty, VirtualPlaylist::default());
    }
}
