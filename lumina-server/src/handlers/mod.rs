pub mod admin;
pub mod auth;
pub mod collections;
pub mod jobs;

use serde::Deserialize;

use lumina_model::{SortDirection, SortField};

/// Common listing parameters; omitted fields fall back to the catalogue
/// defaults (newest first, 20 per page).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListParams {
    pub page: u64,
    pub size: u64,
    pub sort: SortField,
    pub dir: SortDirection,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            size: 20,
            sort: SortField::UpdatedAt,
            dir: SortDirection::Desc,
        }
    }
}
