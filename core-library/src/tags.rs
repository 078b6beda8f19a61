//! Tag model: canonical access to multi-valued track metadata.
//!
//! A [`Track`] maps tag names to ordered value lists. Everything in this
//! module is total: a missing tag resolves through its fallback chain and
//! finally to a placeholder, never to an error.
//!
//! Sorting expands a track into one [`Row`] per combination of the values of
//! its multi-valued sort tags, so a song with two performers shows up under
//! both when browsing by performer.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tag holding the stable identity of a track.
pub const FILE_TAG: &str = "file";

/// Separator of composite tag keys such as `AlbumArtist-Album`.
pub const KEY_SEPARATOR: char = '-';

/// Tags consulted, in order, when a tag is absent.
fn fallbacks(tag: &str) -> &'static [&'static str] {
    match tag {
        "AlbumSort" => &["Album"],
        "AlbumArtist" => &["Artist"],
        "AlbumArtistSort" => &["AlbumArtist", "Artist"],
        "Date" => &["OriginalDate"],
        "OriginalDate" => &["Date"],
        _ => &[],
    }
}

/// Value reported for a tag absent from a track and from all its fallbacks.
pub fn placeholder(tag: &str) -> String {
    format!("[no {}]", tag)
}

// =============================================================================
// Track
// =============================================================================

/// One playable item: tag name → ordered values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Track(BTreeMap<String, Vec<String>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for Track {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
        Ok(Track(
            raw.into_iter()
                .map(|(tag, values)| match values {
                    OneOrMany::One(value) => (tag, vec![value]),
                    OneOrMany::Many(values) => (tag, values),
                })
                .collect(),
        ))
    }
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and fixtures.
    pub fn with<I, V>(mut self, tag: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert(tag, values);
        self
    }

    pub fn insert<I, V>(&mut self, tag: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.0
            .insert(tag.to_string(), values.into_iter().map(Into::into).collect());
    }

    /// Raw values of `tag`, without fallbacks.
    pub fn values(&self, tag: &str) -> &[String] {
        self.0.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stable identity of the track.
    pub fn file(&self) -> Option<&str> {
        self.values(FILE_TAG).first().map(String::as_str)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Values of `tag`, or of the first fallback that has any.
fn resolved_values<'a>(track: &'a Track, tag: &str) -> Option<&'a [String]> {
    std::iter::once(tag)
        .chain(fallbacks(tag).iter().copied())
        .map(|t| track.values(t))
        .find(|values| !values.is_empty())
}

/// First value of `tag` after fallbacks, or its placeholder.
pub fn get(track: &Track, tag: &str) -> String {
    resolved_values(track, tag)
        .and_then(|values| values.first())
        .cloned()
        .unwrap_or_else(|| placeholder(tag))
}

// =============================================================================
// Composite keys
// =============================================================================

/// A dash-joined composite key, e.g. `AlbumArtist-Album`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagKey(Vec<String>);

impl TagKey {
    pub fn parse(key: &str) -> Self {
        TagKey(key.split(KEY_SEPARATOR).map(str::to_string).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

/// Cartesian product of the values of every component of `key`, each tuple
/// joined with `-`. An absent component contributes `default`.
pub fn get_or_else_multi(track: &Track, key: &str, default: &str) -> Vec<String> {
    let mut combos = vec![String::new()];
    for (i, part) in TagKey::parse(key).parts().iter().enumerate() {
        let values: Vec<&str> = match resolved_values(track, part) {
            Some(values) => values.iter().map(String::as_str).collect(),
            None => vec![default],
        };
        combos = combos
            .iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    if i == 0 {
                        value.to_string()
                    } else {
                        format!("{}{}{}", prefix, KEY_SEPARATOR, value)
                    }
                })
            })
            .collect();
    }
    combos
}

// =============================================================================
// Rows
// =============================================================================

/// A track annotated for one sorted ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub track: Arc<Track>,
    pub sort_key: String,
    /// Resolved (tag, value) pairs for the memoized tags.
    pub keys: Vec<(String, String)>,
    /// Absolute index within the sorted ordering.
    pub pos: usize,
}

impl Row {
    /// Memoized value of `tag`, if recorded.
    pub fn key(&self, tag: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `tag` as seen by this row: the memoized one when present.
    pub fn value(&self, tag: &str) -> String {
        match self.key(tag) {
            Some(value) => value.to_string(),
            None => get(&self.track, tag),
        }
    }

    pub fn file(&self) -> Option<&str> {
        self.track.file()
    }
}

/// Expands `track` into one row per combination of its values for `tags`.
///
/// A missing value contributes a single space to the sort key. Only tags in
/// `memo` are recorded on the rows; memo tags outside `tags` take their first
/// resolved value.
pub fn sort_keys(track: &Arc<Track>, tags: &[String], memo: &[String]) -> Vec<Row> {
    let mut partial: Vec<(String, Vec<(String, String)>)> = vec![(String::new(), Vec::new())];

    for tag in tags {
        let remember = memo.contains(tag);
        match resolved_values(track, tag) {
            None => {
                for (sort_key, keys) in &mut partial {
                    sort_key.push(' ');
                    if remember {
                        keys.push((tag.clone(), placeholder(tag)));
                    }
                }
            }
            Some(values) => {
                partial = partial
                    .into_iter()
                    .flat_map(|(sort_key, keys)| {
                        values.iter().map(move |value| {
                            let mut keys = keys.clone();
                            if remember {
                                keys.push((tag.clone(), value.clone()));
                            }
                            (format!("{}{}", sort_key, value), keys)
                        })
                    })
                    .collect();
            }
        }
    }

    let extra: Vec<(String, String)> = memo
        .iter()
        .filter(|tag| !tags.contains(*tag))
        .map(|tag| {
            let value = get_or_else_multi(track, tag, &placeholder(tag))
                .into_iter()
                .next()
                .unwrap_or_else(|| placeholder(tag));
            (tag.clone(), value)
        })
        .collect();

    partial
        .into_iter()
        .map(|(sort_key, mut keys)| {
            keys.extend(extra.iter().cloned());
            Row {
                track: Arc::clone(track),
                sort_key,
                keys,
                pos: 0,
            }
        })
        .collect()
}

/// Expands every track, sorts by sort key (stable, codepoint order) and
/// numbers the rows from zero.
pub fn sort(tracks: &[Arc<Track>], tags: &[String], memo: &[String]) -> Vec<Row> {
    let mut rows: Vec<Row> = tracks
        .iter()
        .flat_map(|track| sort_keys(track, tags, memo))
        .collect();
    rows.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
    for (pos, row) in rows.iter_mut().enumerate() {
        row.pos = pos;
    }
    rows
}

/// Drops rows whose value for `tag` equals the previous row's.
pub fn uniq(rows: &[Row], tag: &str) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::new();
    let mut last: Option<String> = None;
    for row in rows {
        let value = row.value(tag);
        if last.as_deref() != Some(value.as_str()) {
            out.push(row.clone());
        }
        last = Some(value);
    }
    out
}

fn matches(row: &Row, tag: &str, value: &str) -> bool {
    match row.key(tag) {
        Some(memo) => memo == value,
        None => get(&row.track, tag) == value,
    }
}

/// Keeps rows matching every (tag, value) pair.
pub fn filter(rows: &[Row], filters: &[(String, String)]) -> Vec<Row> {
    rows.iter()
        .filter(|row| filters.iter().all(|(tag, value)| matches(row, tag, value)))
        .cloned()
        .collect()
}

/// Applies `filters` in order, stopping once at most `max` rows remain and
/// at least `must` filters were applied, then truncates to `max`.
///
/// Later filters are skipped as soon as the set is small enough, so the
/// result may keep rows that a full [`filter`] would drop.
pub fn weak_filter(
    rows: &[Row],
    filters: &[(String, String)],
    must: usize,
    max: usize,
) -> Vec<Row> {
    let mut out = rows.to_vec();
    for (i, (tag, value)) in filters.iter().enumerate() {
        if out.len() <= max && i >= must {
            break;
        }
        out.retain(|row| matches(row, tag, value));
    }
    out.truncate(max);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn song(file: &str) -> Track {
        Track::new().with(FILE_TAG, [file])
    }

    #[test]
    fn test_get_prefers_own_value() {
        let track = song("a.flac")
            .with("AlbumArtist", ["Band"])
            .with("Artist", ["Singer"]);
        assert_eq!(get(&track, "AlbumArtist"), "Band");
        assert_eq!(get(&track, "file"), "a.flac");
    }

    #[test]
    fn test_get_fallback_chains() {
        let artist_only = song("a.flac").with("Artist", ["Singer"]);
        assert_eq!(get(&artist_only, "AlbumArtist"), "Singer");
        assert_eq!(get(&artist_only, "AlbumArtistSort"), "Singer");

        let with_album_artist = artist_only.clone().with("AlbumArtist", ["Band"]);
        assert_eq!(get(&with_album_artist, "AlbumArtistSort"), "Band");

        let album = song("a.flac").with("Album", ["Debut"]);
        assert_eq!(get(&album, "AlbumSort"), "Debut");

        let dated = song("a.flac").with("OriginalDate", ["1999"]);
        assert_eq!(get(&dated, "Date"), "1999");
        let redated = song("a.flac").with("Date", ["2001"]);
        assert_eq!(get(&redated, "OriginalDate"), "2001");
    }

    #[test]
    fn test_get_placeholder() {
        let track = song("a.flac").with("Artist", ["Singer"]);
        assert_eq!(get(&track, "ArtistSort"), "[no ArtistSort]");
        assert_eq!(get(&track, "Genre"), "[no Genre]");
        assert_eq!(get(&Track::new(), "AlbumArtistSort"), "[no AlbumArtistSort]");
    }

    #[test]
    fn test_get_or_else_multi_product() {
        let track = song("a.flac")
            .with("Artist", ["A", "B"])
            .with("Album", ["X"])
            .with("Genre", ["Pop", "Rock"]);

        assert_eq!(get_or_else_multi(&track, "Artist", "?"), vec!["A", "B"]);
        assert_eq!(
            get_or_else_multi(&track, "Artist-Genre", "?"),
            vec!["A-Pop", "A-Rock", "B-Pop", "B-Rock"]
        );
        assert_eq!(
            get_or_else_multi(&track, "Album-Composer", "?"),
            vec!["X-?"]
        );
    }

    #[test]
    fn test_tag_key_parse() {
        assert_eq!(
            TagKey::parse("AlbumArtist-Album").parts(),
            &["AlbumArtist".to_string(), "Album".to_string()]
        );
    }

    #[test]
    fn test_sort_keys_expands_multi_values() {
        let track = Arc::new(song("a.flac").with("Performer", ["P1", "P2", "P3"]));
        let rows = sort_keys(&track, &tags(&["Performer", "file"]), &tags(&["Performer"]));

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].sort_key, "P1a.flac");
        assert_eq!(rows[2].key("Performer"), Some("P3"));
        assert_eq!(rows[0].key("file"), None);
    }

    #[test]
    fn test_sort_keys_missing_value_is_space() {
        let track = Arc::new(song("a.flac"));
        let rows = sort_keys(&track, &tags(&["Genre", "file"]), &tags(&["Genre"]));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sort_key, " a.flac");
        assert_eq!(rows[0].key("Genre"), Some("[no Genre]"));
    }

    #[test]
    fn test_sort_keys_memo_outside_sort_tags() {
        let track = Arc::new(song("a.flac").with("Artist", ["Singer"]));
        let rows = sort_keys(&track, &tags(&["file"]), &tags(&["AlbumArtist"]));
        assert_eq!(rows[0].key("AlbumArtist"), Some("Singer"));
    }

    #[test]
    fn test_sort_orders_and_numbers_rows() {
        let tracks: Vec<Arc<Track>> = ["c", "a", "b", "a"]
            .iter()
            .enumerate()
            .map(|(i, t)| Arc::new(song(&format!("{}.flac", i)).with("Title", [*t])))
            .collect();

        let rows = sort(&tracks, &tags(&["Title"]), &[]);
        let keys: Vec<&str> = rows.iter().map(|r| r.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "a", "b", "c"]);
        // stable: "1.flac" came before "3.flac"
        assert_eq!(rows[0].file(), Some("1.flac"));
        assert_eq!(rows[1].file(), Some("3.flac"));
        assert_eq!(rows.iter().map(|r| r.pos).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sort_uses_codepoint_order() {
        let tracks: Vec<Arc<Track>> = ["b", "B", "á", "a"]
            .iter()
            .map(|t| Arc::new(song(t).with("Title", [*t])))
            .collect();
        let rows = sort(&tracks, &tags(&["Title"]), &[]);
        let keys: Vec<&str> = rows.iter().map(|r| r.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["B", "a", "b", "á"]);
    }

    #[test]
    fn test_uniq_keeps_first_of_each_run() {
        let tracks: Vec<Arc<Track>> = [("1", "X"), ("2", "X"), ("3", "Y"), ("4", "Z"), ("5", "Z")]
            .iter()
            .map(|(f, a)| Arc::new(song(f).with("Album", [*a])))
            .collect();
        let rows = sort(&tracks, &tags(&["Album", "file"]), &tags(&["Album"]));
        let unique = uniq(&rows, "Album");

        let files: Vec<&str> = unique.iter().filter_map(|r| r.file()).collect();
        assert_eq!(files, vec!["1", "3", "4"]);
    }

    #[test]
    fn test_filter_requires_every_pair() {
        let tracks: Vec<Arc<Track>> = vec![
            Arc::new(song("1").with("Artist", ["A"]).with("Album", ["X"])),
            Arc::new(song("2").with("Artist", ["A"]).with("Album", ["Y"])),
            Arc::new(song("3").with("Artist", ["B"]).with("Album", ["X"])),
        ];
        let rows = sort(&tracks, &tags(&["file"]), &[]);
        let filters = vec![
            ("Artist".to_string(), "A".to_string()),
            ("Album".to_string(), "X".to_string()),
        ];
        let kept = filter(&rows, &filters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].file(), Some("1"));
    }

    fn numbered(count: usize, matching: usize) -> Vec<Row> {
        let tracks: Vec<Arc<Track>> = (0..count)
            .map(|i| {
                let genre = if i < matching { "Jazz" } else { "Pop" };
                Arc::new(song(&format!("{:04}", i)).with("Genre", [genre]))
            })
            .collect();
        sort(&tracks, &tags(&["file"]), &[])
    }

    #[test]
    fn test_weak_filter_narrow_filter() {
        let rows = numbered(1000, 10);
        let filters = vec![("Genre".to_string(), "Jazz".to_string())];
        let kept = weak_filter(&rows, &filters, 0, 500);
        assert_eq!(kept.len(), 10);
        assert!(kept.iter().all(|r| r.value("Genre") == "Jazz"));
    }

    #[test]
    fn test_weak_filter_wide_filter_is_capped() {
        let rows = numbered(1000, 800);
        let filters = vec![("Genre".to_string(), "Jazz".to_string())];
        let kept = weak_filter(&rows, &filters, 0, 500);
        assert!(kept.len() <= 500);
    }

    #[test]
    fn test_weak_filter_skips_unneeded_filters() {
        let rows = numbered(20, 5);
        let filters = vec![("Genre".to_string(), "Jazz".to_string())];

        // already under the cap and nothing is mandatory
        assert_eq!(weak_filter(&rows, &filters, 0, 500).len(), 20);
        // mandatory filters are always applied
        assert_eq!(weak_filter(&rows, &filters, 1, 500).len(), 5);
    }

    #[test]
    fn test_track_deserializes_scalars_and_lists() {
        let track: Track =
            serde_json::from_str(r#"{"file":"a.flac","Artist":["A","B"]}"#).unwrap();
        assert_eq!(track.file(), Some("a.flac"));
        assert_eq!(track.values("Artist"), &["A".to_string(), "B".to_string()]);
    }
}
