// src/host/selectors.rs

//! CSS selectors for reading the library site's rendered UI.
//!
//! Every selector heuristic the connector depends on lives here, so a
//! library-site markup change is a data change, not a code change.

use serde::{Deserialize, Serialize};

/// CSS selectors and attribute names for the library site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSelectors {
    /// Landmark: the collection tree container
    #[serde(default = "defaults::collection_tree")]
    pub collection_tree: String,

    /// A single collection node within the tree
    #[serde(default = "defaults::collection_node")]
    pub collection_node: String,

    /// Class marking the currently active collection node
    #[serde(default = "defaults::active_class")]
    pub active_class: String,

    /// Attribute holding a collection's id, when the page exposes one
    #[serde(default = "defaults::collection_id_attr")]
    pub collection_id_attr: String,

    /// Item-count badge within a collection node
    #[serde(default = "defaults::collection_count")]
    pub collection_count: String,

    /// Landmark: the item list container
    #[serde(default = "defaults::item_list")]
    pub item_list: String,

    /// A single item row within the list
    #[serde(default = "defaults::item_row")]
    pub item_row: String,

    /// Class marking a selected item row
    #[serde(default = "defaults::selected_class")]
    pub selected_class: String,

    /// Title cell within a row
    #[serde(default = "defaults::title_cell")]
    pub title_cell: String,

    /// Creators cell within a row
    #[serde(default = "defaults::creators_cell")]
    pub creators_cell: String,

    /// Date cell within a row
    #[serde(default = "defaults::date_cell")]
    pub date_cell: String,

    /// Attribute on a row naming the item type
    #[serde(default = "defaults::item_type_attr")]
    pub item_type_attr: String,

    /// Link element within a row
    #[serde(default = "defaults::item_link")]
    pub item_link: String,

    /// The details panel for the focused item
    #[serde(default = "defaults::details_panel")]
    pub details_panel: String,

    /// Abstract text within the details panel
    #[serde(default = "defaults::abstract_text")]
    pub abstract_text: String,

    /// A tag entry within the details panel
    #[serde(default = "defaults::tag_entry")]
    pub tag_entry: String,

    /// A labelled field row within the details panel
    #[serde(default = "defaults::field_row")]
    pub field_row: String,

    /// Field label within a field row
    #[serde(default = "defaults::field_label")]
    pub field_label: String,

    /// Field value within a field row
    #[serde(default = "defaults::field_value")]
    pub field_value: String,

    /// Loading indicator shown while the item list repopulates
    #[serde(default = "defaults::loading_indicator")]
    pub loading_indicator: String,

    /// Library title element
    #[serde(default = "defaults::library_title")]
    pub library_title: String,

    /// Attribute for link extraction
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,

    /// Element id of the injected toolbar marker
    #[serde(default = "defaults::toolbar_marker_id")]
    pub toolbar_marker_id: String,
}

impl Default for HostSelectors {
    fn default() -> Self {
        Self {
            collection_tree: defaults::collection_tree(),
            collection_node: defaults::collection_node(),
            active_class: defaults::active_class(),
            collection_id_attr: defaults::collection_id_attr(),
            collection_count: defaults::collection_count(),
            item_list: defaults::item_list(),
            item_row: defaults::item_row(),
            selected_class: defaults::selected_class(),
            title_cell: defaults::title_cell(),
            creators_cell: defaults::creators_cell(),
            date_cell: defaults::date_cell(),
            item_type_attr: defaults::item_type_attr(),
            item_link: defaults::item_link(),
            details_panel: defaults::details_panel(),
            abstract_text: defaults::abstract_text(),
            tag_entry: defaults::tag_entry(),
            field_row: defaults::field_row(),
            field_label: defaults::field_label(),
            field_value: defaults::field_value(),
            loading_indicator: defaults::loading_indicator(),
            library_title: defaults::library_title(),
            link_attr: defaults::link_attr(),
            toolbar_marker_id: defaults::toolbar_marker_id(),
        }
    }
}

mod defaults {
    pub fn collection_tree() -> String {
        "nav.collection-tree".into()
    }
    pub fn collection_node() -> String {
        "nav.collection-tree li[data-collection-key], nav.collection-tree li.collection".into()
    }
    pub fn active_class() -> String {
        "selected".into()
    }
    pub fn collection_id_attr() -> String {
        "data-collection-key".into()
    }
    pub fn collection_count() -> String {
        "span.collection-count".into()
    }
    pub fn item_list() -> String {
        "div.items-table, table.items-list".into()
    }
    pub fn item_row() -> String {
        "div.items-table .item, table.items-list tr.item".into()
    }
    pub fn selected_class() -> String {
        "selected".into()
    }
    pub fn title_cell() -> String {
        ".metadata.title, td.title".into()
    }
    pub fn creators_cell() -> String {
        ".metadata.creator, td.creator".into()
    }
    pub fn date_cell() -> String {
        ".metadata.date, td.date".into()
    }
    pub fn item_type_attr() -> String {
        "data-item-type".into()
    }
    pub fn item_link() -> String {
        "a".into()
    }
    pub fn details_panel() -> String {
        "div.item-details, #item-details".into()
    }
    pub fn abstract_text() -> String {
        ".abstract, .metadata.abstract".into()
    }
    pub fn tag_entry() -> String {
        ".tag-selector .tag, ul.tags li".into()
    }
    pub fn field_row() -> String {
        ".meta-row, tr.meta".into()
    }
    pub fn field_label() -> String {
        ".key, th".into()
    }
    pub fn field_value() -> String {
        ".value, td".into()
    }
    pub fn loading_indicator() -> String {
        ".loading, .items-loading, .spinner".into()
    }
    pub fn library_title() -> String {
        "h1.library-name, .library-heading".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }
    pub fn toolbar_marker_id() -> String {
        "analylit-toolbar".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_as_selectors() {
        let s = HostSelectors::default();
        for selector in [
            &s.collection_tree,
            &s.collection_node,
            &s.item_list,
            &s.item_row,
            &s.title_cell,
            &s.details_panel,
            &s.loading_indicator,
        ] {
            assert!(
                scraper::Selector::parse(selector).is_ok(),
                "bad selector: {selector}"
            );
        }
    }

    #[test]
    fn overridable_from_toml() {
        let s: HostSelectors = toml::from_str(r#"item_row = "tr.entry""#).unwrap();
        assert_eq!(s.item_row, "tr.entry");
        assert_eq!(s.collection_tree, "nav.collection-tree");
    }
}
