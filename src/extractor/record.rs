// src/extractor/record.rs

//! Builds canonical bibliographic records from raw host fragments and
//! removes duplicates. Pure data transformation, no I/O.

use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::host::{DetailsPanel, ItemRow};
use crate::models::{parse_creators, BibliographicItem, ItemType, Tag};

/// Candidate field labels per extra-field target; the first label found
/// in the details panel wins.
const FIELD_CANDIDATES: &[(&str, &[&str])] = &[
    ("journal", &["publication", "journal", "journal title"]),
    ("publisher", &["publisher"]),
    ("doi", &["doi"]),
    ("isbn", &["isbn"]),
    ("issn", &["issn"]),
    ("volume", &["volume"]),
    ("issue", &["issue"]),
    ("pages", &["pages", "page range"]),
];

/// Build an item from a rendered row, enriching from the details panel
/// when one is supplied.
///
/// The title falls back to a placeholder and creators to an empty
/// sequence; a fragment only fails when it carries nothing usable at
/// all, and callers drop such fragments without aborting the batch.
pub fn build_item(row: &ItemRow, panel: Option<&DetailsPanel>) -> Result<BibliographicItem> {
    if row.title.trim().is_empty() && row.creators.trim().is_empty() && row.date.trim().is_empty() {
        return Err(AppError::extraction("item row has no readable cells"));
    }

    let mut item = BibliographicItem::new(
        row.title.trim(),
        ItemType::from_host_label(&row.type_label),
    );
    item.creators = parse_creators(&row.creators);
    item.date = row.date.trim().to_string();
    item.url = row.url.clone();

    if let Some(panel) = panel {
        enrich_from_panel(&mut item, panel);
    }

    Ok(item)
}

/// Pull abstract, tags and extra bibliographic fields from the details
/// panel into the item.
fn enrich_from_panel(item: &mut BibliographicItem, panel: &DetailsPanel) {
    if !panel.abstract_text.is_empty() {
        item.abstract_note = panel.abstract_text.clone();
    }
    item.tags = panel.tags.iter().map(Tag::new).collect();

    for (target, candidates) in FIELD_CANDIDATES {
        if let Some(value) = panel.field_by_candidates(candidates) {
            if !value.is_empty() {
                item.extra.insert((*target).to_string(), value.to_string());
            }
        }
    }
}

/// Remove duplicate items by composite identity key, keeping the first
/// occurrence of each key in encounter order.
///
/// Known limitation: the key is `(title, first creator's last name,
/// date)`, so near-duplicates with slightly different titles survive and
/// distinct same-year works by single-named authors can collapse.
pub fn dedupe(items: Vec<BibliographicItem>) -> Vec<BibliographicItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.identity_key()))
        .collect()
}
