//! Groupings: declarative virtual directory hierarchies.

use crate::error::{LibraryError, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// How a level's entries are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Plain,
    Album,
    Song,
}

/// One level of a hierarchy: the tag its entries are named by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub tag: String,
    pub style: Style,
}

impl Level {
    pub fn new(tag: &str, style: Style) -> Self {
        Self {
            tag: tag.to_string(),
            style,
        }
    }
}

/// A named hierarchy over the track collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub name: String,
    /// Tags whose concatenated values define the total order.
    pub sort: Vec<String>,
    pub levels: Vec<Level>,
}

impl Grouping {
    pub fn new(name: &str, sort: &[&str], levels: Vec<Level>) -> Self {
        Self {
            name: name.to_string(),
            sort: sort.iter().map(|s| s.to_string()).collect(),
            levels,
        }
    }

    /// Tags recorded on sorted rows: one per level.
    pub fn memo(&self) -> Vec<String> {
        self.levels.iter().map(|level| level.tag.clone()).collect()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

const TRACK_ORDER: [&str; 5] = ["Album", "DiscNumber", "TrackNumber", "Title", "file"];

fn by_tag(name: &str, sort_tag: &str, with_date: bool) -> Grouping {
    let mut sort = vec![sort_tag];
    if with_date {
        sort.push("Date");
    }
    sort.extend(TRACK_ORDER);
    Grouping::new(
        name,
        &sort,
        vec![
            Level::new(name, Style::Plain),
            Level::new("Album", Style::Album),
            Level::new("Title", Style::Song),
        ],
    )
}

/// The fixed set of groupings a library browses with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Groupings(Vec<Grouping>);

impl<'de> Deserialize<'de> for Groupings {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let groupings = Vec::<Grouping>::deserialize(deserializer)?;
        Self::new(groupings).map_err(serde::de::Error::custom)
    }
}

impl Groupings {
    /// Validates and wraps a list of groupings.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::InvalidInput`] when a grouping has no name, no
    /// levels, no sort tags, or reuses a name.
    pub fn new(groupings: Vec<Grouping>) -> Result<Self> {
        for (i, grouping) in groupings.iter().enumerate() {
            if grouping.name.is_empty() || grouping.name == "root" {
                return Err(LibraryError::InvalidInput {
                    field: "name".to_string(),
                    message: format!("grouping #{} has a reserved or empty name", i),
                });
            }
            if grouping.levels.is_empty() {
                return Err(LibraryError::InvalidInput {
                    field: "levels".to_string(),
                    message: format!("grouping '{}' has no levels", grouping.name),
                });
            }
            if grouping.sort.is_empty() {
                return Err(LibraryError::InvalidInput {
                    field: "sort".to_string(),
                    message: format!("grouping '{}' has no sort tags", grouping.name),
                });
            }
            if groupings[..i].iter().any(|g| g.name == grouping.name) {
                return Err(LibraryError::InvalidInput {
                    field: "name".to_string(),
                    message: format!("duplicate grouping '{}'", grouping.name),
                });
            }
        }
        Ok(Self(groupings))
    }

    /// Parses a JSON list of groupings.
    pub fn from_json(json: &str) -> Result<Self> {
        let groupings: Vec<Grouping> = serde_json::from_str(json)?;
        Self::new(groupings)
    }

    pub fn get(&self, name: &str) -> Option<&Grouping> {
        self.0.iter().find(|g| g.name == name)
    }

    /// The grouping whose sort tags equal `sort` exactly.
    pub fn by_sort(&self, sort: &[String]) -> Option<&Grouping> {
        self.0.iter().find(|g| g.sort == sort)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|g| g.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grouping> {
        self.0.iter()
    }

    /// Deepest level count across all groupings.
    pub fn max_depth(&self) -> usize {
        self.0.iter().map(Grouping::depth).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Groupings {
    fn default() -> Self {
        Self(vec![
            Grouping::new(
                "AlbumArtist",
                &[
                    "AlbumArtistSort",
                    "Date",
                    "Album",
                    "DiscNumber",
                    "TrackNumber",
                    "Title",
                    "file",
                ],
                vec![
                    Level::new("AlbumArtist", Style::Plain),
                    Level::new("Album", Style::Album),
                    Level::new("Title", Style::Song),
                ],
            ),
            Grouping::new(
                "Album",
                &["Date", "Album", "DiscNumber", "TrackNumber", "Title", "file"],
                vec![
                    Level::new("Album", Style::Album),
                    Level::new("Title", Style::Song),
                ],
            ),
            Grouping::new(
                "Artist",
                &[
                    "ArtistSort",
                    "Date",
                    "Album",
                    "DiscNumber",
                    "TrackNumber",
                    "Title",
                    "file",
                ],
                vec![
                    Level::new("Artist", Style::Plain),
                    Level::new("Title", Style::Song),
                ],
            ),
            by_tag("Genre", "Genre", false),
            by_tag("Date", "Date", false),
            by_tag("Composer", "Composer", true),
            by_tag("Performer", "Performer", true),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_groupings() {
        let groupings = Groupings::default();
        let names: Vec<&str> = groupings.names().collect();
        assert_eq!(
            names,
            vec!["AlbumArtist", "Album", "Artist", "Genre", "Date", "Composer", "Performer"]
        );
        assert_eq!(groupings.max_depth(), 3);

        let album_artist = groupings.get("AlbumArtist").unwrap();
        assert_eq!(album_artist.memo(), vec!["AlbumArtist", "Album", "Title"]);
        assert_eq!(album_artist.levels[1].style, Style::Album);

        let composer = groupings.get("Composer").unwrap();
        assert_eq!(&composer.sort[..3], &["Composer", "Date", "Album"]);
    }

    #[test]
    fn test_by_sort_exact_match_only() {
        let groupings = Groupings::default();
        let sort = groupings.get("Genre").unwrap().sort.clone();
        assert_eq!(groupings.by_sort(&sort).map(|g| g.name.as_str()), Some("Genre"));
        assert!(groupings.by_sort(&sort[1..]).is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[{"name":"Genre","sort":["Genre","file"],
                        "levels":[{"tag":"Genre","style":"plain"},{"tag":"Title","style":"song"}]}]"#;
        let groupings = Groupings::from_json(json).unwrap();
        assert_eq!(groupings.len(), 1);
        assert_eq!(groupings.get("Genre").unwrap().levels[1].style, Style::Song);
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"[{"name":"G","sort":["file"],"levels":[]}]"#;
        let err = serde_json::from_str::<Groupings>(json).unwrap_err();
        assert!(err.to_string().contains("has no levels"));

        let json = serde_json::to_string(&Groupings::default()).unwrap();
        let groupings: Groupings = serde_json::from_str(&json).unwrap();
        assert_eq!(groupings, Groupings::default());
    }

    #[test]
    fn test_rejects_invalid_groupings() {
        let empty = Grouping::new("Empty", &["file"], vec![]);
        assert!(matches!(
            Groupings::new(vec![empty]),
            Err(LibraryError::InvalidInput { .. })
        ));

        let root = Grouping::new("root", &["file"], vec![Level::new("Title", Style::Song)]);
        assert!(Groupings::new(vec![root]).is_err());

        let a = Grouping::new("A", &["file"], vec![Level::new("Title", Style::Song)]);
        assert!(Groupings::new(vec![a.clone(), a]).is_err());

        assert!(matches!(
            Groupings::from_json("not json"),
            Err(LibraryError::Serialization(_))
        ));
    }
}
