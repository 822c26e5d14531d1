use chrono::{DateTime, Utc};

use lumina_model::{Collection, SortDirection, SortField};

/// Number of leading characters that participate in the name score.
const NAME_PREFIX_LEN: u32 = 10;

/// Sorted-set score for a collection under one (field, direction) view.
///
/// Scores are doubles constructed so that ascending score order equals the
/// logical ordering of the view; descending views negate the raw value.
/// Ties (equal scores) fall back to lexical member ordering in the set,
/// which is collection-id ordering.
pub fn collection_score(
    collection: &Collection,
    field: SortField,
    direction: SortDirection,
) -> f64 {
    let raw = match field {
        SortField::UpdatedAt => ticks(collection.updated_at),
        SortField::CreatedAt => ticks(collection.created_at),
        SortField::Name => name_score(&collection.name),
        SortField::ImageCount => collection.images.len() as f64,
        SortField::TotalSize => collection.statistics.total_size as f64,
    };
    raw * direction.multiplier()
}

/// Timestamp in 100 ns ticks. Monotonic for the representable range; dates
/// beyond it saturate through the microsecond fallback.
fn ticks(at: DateTime<Utc>) -> f64 {
    match at.timestamp_nanos_opt() {
        Some(nanos) => (nanos / 100) as f64,
        None => at.timestamp_micros() as f64 * 10.0,
    }
}

/// Prefix-order-preserving score over the first 10 characters of the
/// normalized (trimmed, lowercased) name: a base-256 positional encoding,
/// `Σ codepoint_i × 256^(9−i)`.
///
/// Names that agree on the whole prefix collide; the sorted set then places
/// them adjacently in id order. Callers needing lexical exactness beyond the
/// prefix sort the returned window by name.
pub fn name_score(name: &str) -> f64 {
    let normalized = name.trim().to_lowercase();
    let mut chars = normalized.chars();
    let mut score = 0.0;
    for _ in 0..NAME_PREFIX_LEN {
        let code = chars.next().map(|c| c as u32).unwrap_or(0);
        score = score * 256.0 + code as f64;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lumina_model::{CollectionId, CollectionStatistics, CollectionType};

    fn collection(name: &str) -> Collection {
        Collection {
            id: CollectionId::generate(),
            library_id: None,
            name: name.into(),
            description: None,
            path: format!("/library/{name}"),
            collection_type: CollectionType::Folder,
            is_active: true,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            statistics: CollectionStatistics::default(),
            tags: vec![],
            images: vec![],
            thumbnails: vec![],
            cache_images: vec![],
        }
    }

    #[test]
    fn name_scores_are_case_insensitive_and_prefix_ordered() {
        // "Alpha" < "alpha2" (case-insensitive), both precede "beta"
        let alpha = name_score("Alpha");
        let alpha2 = name_score("alpha2");
        let beta = name_score("beta");
        assert!(alpha < alpha2);
        assert!(alpha2 < beta);
        assert_eq!(name_score("Alpha"), name_score("  alpha  "));
    }

    #[test]
    fn name_score_collides_past_the_prefix() {
        assert_eq!(
            name_score("exactlyten-one"),
            name_score("exactlyten-two")
        );
        assert_ne!(name_score("exactlyte"), name_score("exactlyten"));
    }

    #[test]
    fn timestamps_order_by_ticks() {
        let older = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut a = collection("a");
        a.updated_at = older;
        let mut b = collection("b");
        b.updated_at = newer;

        let asc_a = collection_score(&a, SortField::UpdatedAt, SortDirection::Asc);
        let asc_b = collection_score(&b, SortField::UpdatedAt, SortDirection::Asc);
        assert!(asc_a < asc_b);

        let desc_a =
            collection_score(&a, SortField::UpdatedAt, SortDirection::Desc);
        let desc_b =
            collection_score(&b, SortField::UpdatedAt, SortDirection::Desc);
        assert!(desc_b < desc_a);
    }

    #[test]
    fn counters_scale_by_direction() {
        let mut c = collection("c");
        c.statistics.total_size = 4096;
        assert_eq!(
            collection_score(&c, SortField::TotalSize, SortDirection::Asc),
            4096.0
        );
        assert_eq!(
            collection_score(&c, SortField::TotalSize, SortDirection::Desc),
            -4096.0
        );
    }
}
