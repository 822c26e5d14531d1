use std::time::Duration;

use lumina_model::{CollectionId, CollectionType, SortDirection, SortField};
use uuid::Uuid;

/// All index keys live under this namespace.
pub const NAMESPACE: &str = "collection_index";

pub const SORTED_PREFIX: &str = "collection_index:sorted:";
pub const DATA_PREFIX: &str = "collection_index:data:";
pub const STATE_PREFIX: &str = "collection_index:state:";
pub const THUMB_PREFIX: &str = "collection_index:thumb:";

pub const TOTAL_KEY: &str = "collection_index:stats:total";
pub const LAST_REBUILD_KEY: &str = "collection_index:last_rebuild";
pub const DASHBOARD_STATS_KEY: &str = "collection_index:dashboard:statistics";
pub const DASHBOARD_META_KEY: &str = "collection_index:dashboard:metadata";

/// Thumbnail blobs survive index resets; they only age out.
pub const THUMB_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DASHBOARD_TTL: Duration = Duration::from_secs(5 * 60);
/// Bound on the dashboard activity list.
pub const ACTIVITY_CAP: usize = 100;

pub fn sorted_key(field: SortField, direction: SortDirection) -> String {
    format!("{SORTED_PREFIX}{}:{}", field.as_str(), direction.as_str())
}

pub fn library_key(
    library_id: Uuid,
    field: SortField,
    direction: SortDirection,
) -> String {
    format!(
        "{NAMESPACE}:sorted:by_library:{library_id}:{}:{}",
        field.as_str(),
        direction.as_str()
    )
}

pub fn type_key(
    collection_type: CollectionType,
    field: SortField,
    direction: SortDirection,
) -> String {
    format!(
        "{NAMESPACE}:sorted:by_type:{}:{}:{}",
        collection_type.as_str(),
        field.as_str(),
        direction.as_str()
    )
}

pub fn data_key(id: CollectionId) -> String {
    format!("{DATA_PREFIX}{id}")
}

pub fn state_key(id: CollectionId) -> String {
    format!("{STATE_PREFIX}{id}")
}

pub fn thumb_key(id: CollectionId) -> String {
    format!("{THUMB_PREFIX}{id}")
}

/// Collection id carried in a `state:` key, if it parses.
pub fn id_from_state_key(key: &str) -> Option<CollectionId> {
    key.strip_prefix(STATE_PREFIX)
        .and_then(|raw| CollectionId::parse_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(
            sorted_key(SortField::UpdatedAt, SortDirection::Desc),
            "collection_index:sorted:updatedAt:desc"
        );
        assert_eq!(
            type_key(CollectionType::Archive, SortField::Name, SortDirection::Asc),
            "collection_index:sorted:by_type:archive:name:asc"
        );
        let lib = Uuid::nil();
        assert_eq!(
            library_key(lib, SortField::TotalSize, SortDirection::Desc),
            format!("collection_index:sorted:by_library:{lib}:totalSize:desc")
        );
    }

    #[test]
    fn state_key_round_trip() {
        let id = CollectionId::generate();
        let key = state_key(id);
        assert_eq!(id_from_state_key(&key), Some(id));
        assert_eq!(id_from_state_key("collection_index:data:zzz"), None);
        assert_eq!(id_from_state_key("collection_index:state:nothex"), None);
    }
}
