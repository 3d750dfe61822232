// src/models/item.rs

//! Canonical bibliographic record types.
//!
//! Items are built transiently from DOM fragments by the page extractor
//! and passed through to the server unchanged; nothing here is persisted
//! by the connector itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Item type recognized by the analysis server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    JournalArticle,
    Book,
    BookSection,
    ConferencePaper,
    Thesis,
    Report,
    Webpage,
    Patent,
    #[default]
    Document,
}

// Unknown wire labels fall back to Document instead of failing the
// whole payload.
impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&label))
    }
}

impl ItemType {
    /// Map an exact wire label onto a known item type.
    pub fn from_wire(label: &str) -> Self {
        match label {
            "journalArticle" => Self::JournalArticle,
            "book" => Self::Book,
            "bookSection" => Self::BookSection,
            "conferencePaper" => Self::ConferencePaper,
            "thesis" => Self::Thesis,
            "report" => Self::Report,
            "webpage" => Self::Webpage,
            "patent" => Self::Patent,
            _ => Self::Document,
        }
    }

    /// Map a host-page type label onto a known item type.
    ///
    /// Exact wire labels win; display labels are matched
    /// case-insensitively by substring; anything unrecognized falls back
    /// to `Document`.
    pub fn from_host_label(label: &str) -> Self {
        let exact = Self::from_wire(label.trim());
        if exact != Self::Document {
            return exact;
        }
        let label = label.to_lowercase();
        if label.contains("journal") {
            Self::JournalArticle
        } else if label.contains("book section") || label.contains("chapter") {
            Self::BookSection
        } else if label.contains("book") {
            Self::Book
        } else if label.contains("conference") {
            Self::ConferencePaper
        } else if label.contains("thesis") {
            Self::Thesis
        } else if label.contains("report") {
            Self::Report
        } else if label.contains("web") {
            Self::Webpage
        } else if label.contains("patent") {
            Self::Patent
        } else {
            Self::Document
        }
    }
}

/// A creator (author, editor, ...) of a bibliographic item.
///
/// A comma-separated "Last, First" form parses into the split variant;
/// anything else is kept as a single display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Creator {
    Split {
        #[serde(rename = "firstName")]
        first_name: String,
        #[serde(rename = "lastName")]
        last_name: String,
        #[serde(rename = "creatorType", default = "default_creator_type")]
        creator_type: String,
    },
    Single {
        name: String,
        #[serde(rename = "creatorType", default = "default_creator_type")]
        creator_type: String,
    },
}

fn default_creator_type() -> String {
    "author".to_string()
}

impl Creator {
    /// Create a split-name author.
    pub fn author(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self::Split {
            first_name: first_name.into(),
            last_name: last_name.into(),
            creator_type: "author".to_string(),
        }
    }

    /// Create a single-name author.
    pub fn author_single(name: impl Into<String>) -> Self {
        Self::Single {
            name: name.into(),
            creator_type: "author".to_string(),
        }
    }

    /// Last name for split creators, empty for single-name creators.
    ///
    /// Feeds the composite dedupe key.
    pub fn last_name_or_empty(&self) -> &str {
        match self {
            Self::Split { last_name, .. } => last_name,
            Self::Single { .. } => "",
        }
    }
}

/// Parse a creator string into an ordered creator sequence.
///
/// The string splits on `;` into segments; a segment with at least one
/// comma parses as "Last, First", everything else becomes a single-name
/// creator. An empty input yields an empty sequence.
pub fn parse_creators(input: &str) -> Vec<Creator> {
    input
        .split(';')
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            match segment.split_once(',') {
                Some((last, first)) => Some(Creator::author(first.trim(), last.trim())),
                None => Some(Creator::author_single(segment)),
            }
        })
        .collect()
}

/// A tag attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
}

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

/// A canonical bibliographic record.
///
/// Invariant: `title` is never empty (a placeholder is substituted when
/// the page gives nothing readable); `creators` defaults to an empty
/// ordered sequence when unparsable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographicItem {
    pub title: String,

    #[serde(default)]
    pub creators: Vec<Creator>,

    #[serde(default)]
    pub date: String,

    pub item_type: ItemType,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub abstract_note: String,

    #[serde(default)]
    pub tags: Vec<Tag>,

    /// Collection ids the item was extracted under
    #[serde(default)]
    pub collections: Vec<String>,

    /// Always empty; the connector never carries attachment payloads
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,

    /// Extra bibliographic fields (journal, publisher, doi, isbn, issn,
    /// volume, issue, pages)
    #[serde(default, rename = "extraFields")]
    pub extra: BTreeMap<String, String>,
}

impl BibliographicItem {
    /// Placeholder used when the page exposes no readable title.
    pub const UNTITLED: &'static str = "Untitled";

    /// Create a minimal item with the invariants applied.
    pub fn new(title: impl Into<String>, item_type: ItemType) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            Self::UNTITLED.to_string()
        } else {
            title
        };
        Self {
            title,
            creators: Vec::new(),
            date: String::new(),
            item_type,
            url: String::new(),
            abstract_note: String::new(),
            tags: Vec::new(),
            collections: Vec::new(),
            attachments: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Composite identity key: `title + "-" + first creator last name +
    /// "-" + date`.
    ///
    /// This is a heuristic identity, not a content hash: near-duplicate
    /// records with slightly different titles are not merged, and two
    /// distinct works by single-named authors in the same year can
    /// collide. Kept as-is deliberately.
    pub fn identity_key(&self) -> String {
        let last_name = self
            .creators
            .first()
            .map(Creator::last_name_or_empty)
            .unwrap_or("");
        format!("{}-{}-{}", self.title, last_name, self.date)
    }
}
