use serde::{Deserialize, Serialize};

use crate::ids::CollectionId;
use crate::summary::CollectionSummary;

/// Positional navigation around one collection within a sorted view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationInfo {
    pub prev_id: Option<CollectionId>,
    pub next_id: Option<CollectionId>,
    /// 1-based position within the sorted view.
    pub current_position: u64,
    pub total: u64,
    pub has_prev: bool,
    pub has_next: bool,
}

/// The page of a sorted view that contains a given collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingsPage {
    /// Ordered exactly as the sorted set ranks them, never re-sorted.
    pub siblings: Vec<CollectionSummary>,
    pub current_position: u64,
    pub current_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPage {
    pub items: Vec<CollectionSummary>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl CollectionPage {
    pub fn empty(page: u64, page_size: u64) -> Self {
        Self {
            items: Vec::new(),
            page,
            page_size,
            total: 0,
            total_pages: 0,
        }
    }
}

/// Ceiling division used for page math everywhere a total is split into
/// fixed-size pages.
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}
