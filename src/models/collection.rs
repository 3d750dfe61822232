// src/models/collection.rs

//! Collection summary extracted from the library site's tree.

use serde::{Deserialize, Serialize};

/// A collection visible in the host page's collection tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Collection id; a locally generated token when the page exposes
    /// none. Token ids are only stable within one extraction pass.
    pub id: String,

    /// Display name
    pub name: String,

    /// Item count shown next to the collection, 0 when unreadable
    pub item_count: usize,
}

/// Generate a local fallback id for a collection the page gives no id for.
pub fn fallback_collection_id() -> String {
    format!("col-{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_ids_are_distinct() {
        let a = fallback_collection_id();
        let b = fallback_collection_id();
        assert!(a.starts_with("col-"));
        assert_ne!(a, b);
    }

    #[test]
    fn collection_serializes_item_count_camel_case() {
        let col = Collection {
            id: "c1".to_string(),
            name: "Papers".to_string(),
            item_count: 3,
        };
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["itemCount"], 3);
    }
}
