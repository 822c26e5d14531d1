mod support;

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use lumina_core::index::{keys, RebuildMode, RebuildOptions};
use lumina_core::kvs::Kvs;
use lumina_core::store::CollectionRepository;
use lumina_model::{
    CollectionIndexState, CollectionSummary, SortDirection, SortField,
};

use support::{
    collection, harness, id, image_entry, seed_distinct, t0, thumbnail_record,
    write_png,
};

async fn full_rebuild(h: &support::Harness) {
    h.engine
        .rebuild_index(
            RebuildMode::Full,
            RebuildOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn full_rebuild_satisfies_index_invariants() {
    let h = harness();
    let seeded = seed_distinct(&h.collections, 7).await;
    full_rebuild(&h).await;

    let n = seeded.len() as u64;
    for field in SortField::ALL {
        for direction in SortDirection::ALL {
            let key = keys::sorted_key(field, direction);
            assert_eq!(h.kvs.zcard(&key).await.unwrap(), n, "{key}");
            for c in &seeded {
                // present exactly once: zrank finds it, zcard counted n
                assert!(
                    h.kvs.zrank(&key, &c.id.to_string()).await.unwrap().is_some(),
                    "{} missing from {key}",
                    c.id
                );
            }
        }
        // rank in asc mirrors rank in desc
        let asc = keys::sorted_key(field, SortDirection::Asc);
        let desc = keys::sorted_key(field, SortDirection::Desc);
        for c in &seeded {
            let member = c.id.to_string();
            let rank_asc = h.kvs.zrank(&asc, &member).await.unwrap().unwrap();
            let rank_desc = h.kvs.zrank(&desc, &member).await.unwrap().unwrap();
            assert_eq!(rank_asc, n - 1 - rank_desc, "field {field:?}");
        }
    }

    for c in &seeded {
        let summary_json = h
            .kvs
            .get_string(&keys::data_key(c.id))
            .await
            .unwrap()
            .expect("summary present");
        let summary: CollectionSummary =
            serde_json::from_str(&summary_json).unwrap();
        assert_eq!(summary.id, c.id);
        assert_eq!(summary.updated_at, c.updated_at);

        let state_json = h
            .kvs
            .get_string(&keys::state_key(c.id))
            .await
            .unwrap()
            .expect("state present");
        let state: CollectionIndexState =
            serde_json::from_str(&state_json).unwrap();
        assert_eq!(state.collection_updated_at, c.updated_at);
        assert!(state.indexed_at >= state.collection_updated_at);
    }

    assert_eq!(
        h.kvs.get_string(keys::TOTAL_KEY).await.unwrap().unwrap(),
        "7"
    );
}

#[tokio::test]
async fn add_or_update_is_idempotent() {
    let h = harness();
    let c = collection(1, "alpha", t0());
    h.collections.upsert(&c).await.unwrap();

    h.engine.add_or_update(&c).await;
    let key = keys::sorted_key(SortField::UpdatedAt, SortDirection::Desc);
    let first_rank = h.kvs.zrank(&key, &c.id.to_string()).await.unwrap();
    let first_summary = h.kvs.get_string(&keys::data_key(c.id)).await.unwrap();

    h.engine.add_or_update(&c).await;
    assert_eq!(
        h.kvs.zrank(&key, &c.id.to_string()).await.unwrap(),
        first_rank
    );
    assert_eq!(h.kvs.zcard(&key).await.unwrap(), 1);
    assert_eq!(
        h.kvs.get_string(&keys::data_key(c.id)).await.unwrap(),
        first_summary
    );
}

#[tokio::test]
async fn remove_clears_primary_and_secondary_indexes() {
    let h = harness();
    let library = uuid::Uuid::new_v4();
    let mut c = collection(2, "beta", t0());
    c.library_id = Some(library);
    h.collections.upsert(&c).await.unwrap();
    h.engine.add_or_update(&c).await;

    let member = c.id.to_string();
    for field in SortField::ALL {
        for direction in SortDirection::ALL {
            assert!(h
                .kvs
                .zrank(&keys::sorted_key(field, direction), &member)
                .await
                .unwrap()
                .is_some());
            assert!(h
                .kvs
                .zrank(&keys::library_key(library, field, direction), &member)
                .await
                .unwrap()
                .is_some());
            assert!(h
                .kvs
                .zrank(
                    &keys::type_key(c.collection_type, field, direction),
                    &member
                )
                .await
                .unwrap()
                .is_some());
        }
    }

    h.engine.remove(c.id).await;
    for field in SortField::ALL {
        for direction in SortDirection::ALL {
            assert!(h
                .kvs
                .zrank(&keys::sorted_key(field, direction), &member)
                .await
                .unwrap()
                .is_none());
            assert!(h
                .kvs
                .zrank(&keys::library_key(library, field, direction), &member)
                .await
                .unwrap()
                .is_none());
            assert!(h
                .kvs
                .zrank(
                    &keys::type_key(c.collection_type, field, direction),
                    &member
                )
                .await
                .unwrap()
                .is_none());
        }
    }
    assert!(h.kvs.get_string(&keys::data_key(c.id)).await.unwrap().is_none());
    assert!(h.kvs.get_string(&keys::state_key(c.id)).await.unwrap().is_none());
}

#[tokio::test]
async fn changed_only_after_full_is_a_noop() {
    let h = harness();
    seed_distinct(&h.collections, 5).await;
    full_rebuild(&h).await;

    let stats = h
        .engine
        .rebuild_index(
            RebuildMode::ChangedOnly,
            RebuildOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(stats.rebuilt, 0);
    assert_eq!(stats.skipped, stats.total);
}

#[tokio::test]
async fn verify_after_repair_is_consistent() {
    let h = harness();
    seed_distinct(&h.collections, 4).await;
    // no rebuild: everything is missing
    let cancel = CancellationToken::new();
    let report = h.engine.verify_index(false, &cancel).await.unwrap();
    assert_eq!(report.to_add, 4);
    assert!(!report.is_consistent);

    let report = h.engine.verify_index(true, &cancel).await.unwrap();
    assert!(report.is_consistent);
    assert_eq!(report.to_add + report.to_update + report.to_remove, 0);
}

// Scenario: three collections, navigate from the middle of the view.
#[tokio::test]
async fn navigation_walks_the_sorted_view() {
    let h = harness();
    let a = collection(1, "a-one", t0());
    let b = collection(2, "b-two", t0() + Duration::seconds(1));
    let c = collection(3, "c-three", t0() + Duration::seconds(2));
    for col in [&a, &b, &c] {
        h.collections.upsert(col).await.unwrap();
    }
    full_rebuild(&h).await;

    assert_eq!(
        h.kvs.get_string(keys::TOTAL_KEY).await.unwrap().unwrap(),
        "3"
    );

    let nav = h
        .engine
        .navigation(b.id, SortField::UpdatedAt, SortDirection::Desc)
        .await
        .unwrap();
    assert_eq!(nav.prev_id, Some(c.id));
    assert_eq!(nav.next_id, Some(a.id));
    assert_eq!(nav.current_position, 2);
    assert_eq!(nav.total, 3);
    assert!(nav.has_prev);
    assert!(nav.has_next);

    // boundary: ends of the view
    let first = h
        .engine
        .navigation(c.id, SortField::UpdatedAt, SortDirection::Desc)
        .await
        .unwrap();
    assert_eq!(first.prev_id, None);
    assert!(!first.has_prev);
    assert_eq!(first.current_position, 1);

    let last = h
        .engine
        .navigation(a.id, SortField::UpdatedAt, SortDirection::Desc)
        .await
        .unwrap();
    assert_eq!(last.next_id, None);
    assert!(!last.has_next);
    assert_eq!(last.current_position, 3);
}

// Scenario: a collection mutated behind the index's back is detected as
// outdated, then healed.
#[tokio::test]
async fn verify_detects_and_repairs_outdated_entries() {
    let h = harness();
    let seeded = seed_distinct(&h.collections, 3).await;
    full_rebuild(&h).await;

    let mut b = seeded[1].clone();
    b.updated_at = t0() + Duration::minutes(60);
    h.collections.upsert(&b).await.unwrap();

    let cancel = CancellationToken::new();
    let report = h.engine.verify_index(true, &cancel).await.unwrap();
    assert_eq!(report.outdated_in_index, vec![b.id]);
    assert_eq!(report.to_update, 1);
    assert!(!report.is_consistent);

    let report = h.engine.verify_index(false, &cancel).await.unwrap();
    assert!(!report.is_consistent);

    let report = h.engine.verify_index(true, &cancel).await.unwrap();
    assert!(report.is_consistent);

    let summary_json = h
        .kvs
        .get_string(&keys::data_key(b.id))
        .await
        .unwrap()
        .unwrap();
    let summary: CollectionSummary = serde_json::from_str(&summary_json).unwrap();
    assert_eq!(summary.updated_at, b.updated_at);
}

// Scenario: soft deletion leaves no index residue but keeps the thumbnail
// blob alive on its TTL.
#[tokio::test]
async fn verify_removes_soft_deleted_residue_but_keeps_thumbs() {
    let h = harness();
    let seeded = seed_distinct(&h.collections, 3).await;
    full_rebuild(&h).await;

    let a = &seeded[0];
    h.engine.cache_thumbnail(a.id, b"jpeg-bytes").await.unwrap();
    h.collections.set_deleted(a.id, true).await.unwrap();

    let report = h
        .engine
        .verify_index(false, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.orphaned_in_index, vec![a.id]);

    let member = a.id.to_string();
    for field in SortField::ALL {
        for direction in SortDirection::ALL {
            assert!(h
                .kvs
                .zrank(&keys::sorted_key(field, direction), &member)
                .await
                .unwrap()
                .is_none());
            assert!(h
                .kvs
                .zrank(
                    &keys::type_key(a.collection_type, field, direction),
                    &member
                )
                .await
                .unwrap()
                .is_none());
        }
    }
    assert!(h.kvs.get_string(&keys::data_key(a.id)).await.unwrap().is_none());
    assert!(h.kvs.get_string(&keys::state_key(a.id)).await.unwrap().is_none());
    assert_eq!(
        h.engine.cached_thumbnail(a.id).await.unwrap().unwrap(),
        b"jpeg-bytes"
    );
}

// Scenario: deep sibling pages land on the page containing the requested id.
#[tokio::test]
async fn siblings_substitute_the_page_containing_the_id() {
    let h = harness();
    let key = keys::sorted_key(SortField::UpdatedAt, SortDirection::Asc);
    let total: u64 = 30_000;
    let target_rank: u64 = 24_423;
    let mut target = None;
    for rank in 0..total {
        let mut bytes = [0u8; 12];
        bytes[..8].copy_from_slice(&rank.to_be_bytes());
        let member_id = lumina_model::CollectionId::from_bytes(bytes);
        h.kvs
            .zadd(&key, &member_id.to_string(), rank as f64)
            .await
            .unwrap();
        if rank == target_rank {
            target = Some(member_id);
        }
    }

    let page = h
        .engine
        .siblings(
            target.unwrap(),
            1,
            20,
            SortField::UpdatedAt,
            SortDirection::Asc,
        )
        .await
        .unwrap();
    assert_eq!(page.current_page, 1_222);
    assert_eq!(page.current_position, 24_424);
    assert_eq!(page.total, 30_000);
    assert_eq!(page.total_pages, 1_500);
}

#[tokio::test]
async fn sibling_order_follows_the_sorted_set() {
    let h = harness();
    // insertion order deliberately scrambled relative to name order
    for (n, name) in [(4u8, "delta"), (1, "alpha"), (3, "carol"), (2, "bravo")] {
        let c = collection(n, name, t0() + Duration::seconds(n as i64));
        h.collections.upsert(&c).await.unwrap();
    }
    full_rebuild(&h).await;

    let page = h
        .engine
        .siblings(id(1), 1, 10, SortField::Name, SortDirection::Asc)
        .await
        .unwrap();
    let names: Vec<&str> =
        page.siblings.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo", "carol", "delta"]);

    let page = h
        .engine
        .siblings(id(1), 1, 10, SortField::Name, SortDirection::Desc)
        .await
        .unwrap();
    let names: Vec<&str> =
        page.siblings.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["delta", "carol", "bravo", "alpha"]);
}

#[tokio::test]
async fn name_ties_break_by_id_order() {
    let h = harness();
    for n in [2u8, 1, 3] {
        let c = collection(n, "same-name", t0() + Duration::seconds(n as i64));
        h.collections.upsert(&c).await.unwrap();
    }
    full_rebuild(&h).await;

    let page = h
        .engine
        .page(1, 10, SortField::Name, SortDirection::Asc)
        .await
        .unwrap();
    let ids: Vec<_> = page.items.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![id(1), id(2), id(3)]);
}

#[tokio::test]
async fn secondary_indexes_serve_scoped_pages() {
    let h = harness();
    let library = uuid::Uuid::new_v4();
    for n in 1..=4u8 {
        let mut c =
            collection(n, &format!("s{n:02}"), t0() + Duration::seconds(n as i64));
        if n % 2 == 0 {
            c.library_id = Some(library);
        }
        if n == 3 {
            c.collection_type = lumina_model::CollectionType::Archive;
        }
        h.collections.upsert(&c).await.unwrap();
    }
    full_rebuild(&h).await;

    let by_library = h
        .engine
        .page_by_library(library, 1, 10, SortField::Name, SortDirection::Asc)
        .await
        .unwrap();
    assert_eq!(by_library.total, 2);
    assert!(by_library.items.iter().all(|s| s.library_id == Some(library)));

    let archives = h
        .engine
        .page_by_type(
            lumina_model::CollectionType::Archive,
            1,
            10,
            SortField::Name,
            SortDirection::Asc,
        )
        .await
        .unwrap();
    assert_eq!(archives.total, 1);
    assert_eq!(archives.items[0].id, id(3));
}

#[tokio::test]
async fn search_joins_summaries_from_the_index() {
    let h = harness();
    for (n, name) in [(1u8, "spring haul"), (2, "summer haul"), (3, "autumn")] {
        let c = collection(n, name, t0() + Duration::seconds(n as i64));
        h.collections.upsert(&c).await.unwrap();
    }
    full_rebuild(&h).await;

    let page = h
        .engine
        .search("HAUL", 1, 10, SortField::Name, SortDirection::Asc)
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    let names: Vec<&str> = page.items.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["spring haul", "summer haul"]);
}

#[tokio::test]
async fn cancelled_rebuild_preserves_previous_writes() {
    let h = harness();
    seed_distinct(&h.collections, 3).await;
    full_rebuild(&h).await;

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let stats = h
        .engine
        .rebuild_index(
            RebuildMode::ChangedOnly,
            RebuildOptions::default(),
            &cancelled,
        )
        .await
        .unwrap();
    assert_eq!(stats.rebuilt, 0);

    // previously written entries are intact
    let page = h
        .engine
        .page(1, 10, SortField::UpdatedAt, SortDirection::Desc)
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn dry_run_rebuild_writes_nothing() {
    let h = harness();
    seed_distinct(&h.collections, 3).await;

    let stats = h
        .engine
        .rebuild_index(
            RebuildMode::Full,
            RebuildOptions {
                dry_run: true,
                skip_thumbnail_caching: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(stats.rebuilt, 3);
    assert_eq!(h.kvs.dbsize().await.unwrap(), 0);
}

#[tokio::test]
async fn summaries_inline_thumbnails_per_policy() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();

    // within policy bounds: inlined as-is, format preserved
    let small_path = dir.path().join("small.png");
    write_png(&small_path, 200, 200);
    let small_size = std::fs::metadata(&small_path).unwrap().len();
    let mut small = collection(1, "small", t0());
    small.images = vec![image_entry(&small.path, "001.png", small_size)];
    let mut record =
        thumbnail_record(small.images[0].id, small_path.to_str().unwrap());
    record.file_size = small_size;
    small.thumbnails = vec![record];
    h.collections.upsert(&small).await.unwrap();
    h.engine.add_or_update(&small).await;

    let page = h
        .engine
        .page(1, 10, SortField::Name, SortDirection::Asc)
        .await
        .unwrap();
    let inline = page.items[0].thumbnail_base64.as_deref().unwrap();
    assert!(inline.starts_with("data:image/png;base64,"));
    assert_eq!(
        h.engine.cached_thumbnail(small.id).await.unwrap().unwrap(),
        std::fs::read(&small_path).unwrap()
    );

    // over the dimension bound: re-encoded to the configured format/size
    let big_path = dir.path().join("big.png");
    write_png(&big_path, 800, 300);
    let mut big = collection(2, "wide", t0() + Duration::seconds(5));
    big.images = vec![image_entry(&big.path, "wide.png", 4096)];
    let mut record =
        thumbnail_record(big.images[0].id, big_path.to_str().unwrap());
    record.width = 800;
    record.height = 300;
    big.thumbnails = vec![record];
    h.collections.upsert(&big).await.unwrap();
    h.engine.add_or_update(&big).await;

    let page = h
        .engine
        .page(1, 10, SortField::Name, SortDirection::Asc)
        .await
        .unwrap();
    let wide = page
        .items
        .iter()
        .find(|s| s.name == "wide")
        .and_then(|s| s.thumbnail_base64.as_deref())
        .unwrap();
    assert!(wide.starts_with("data:image/jpeg;base64,"));
    let reencoded = h.engine.cached_thumbnail(big.id).await.unwrap().unwrap();
    let decoded = image::load_from_memory(&reencoded).unwrap();
    let (width, height) = image::GenericImageView::dimensions(&decoded);
    assert!(width <= 300 && height <= 300);
}

#[tokio::test]
async fn rebuild_can_skip_thumbnail_work() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let thumb_path = dir.path().join("cover.png");
    write_png(&thumb_path, 100, 100);

    let mut c = collection(1, "covered", t0());
    c.images = vec![image_entry(&c.path, "cover.png", 512)];
    c.thumbnails =
        vec![thumbnail_record(c.images[0].id, thumb_path.to_str().unwrap())];
    h.collections.upsert(&c).await.unwrap();

    h.engine
        .rebuild_index(
            RebuildMode::Full,
            RebuildOptions {
                dry_run: false,
                skip_thumbnail_caching: true,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let page = h
        .engine
        .page(1, 10, SortField::Name, SortDirection::Asc)
        .await
        .unwrap();
    assert!(page.items[0].thumbnail_base64.is_none());
    assert!(h.engine.cached_thumbnail(c.id).await.unwrap().is_none());
}

#[tokio::test]
async fn dashboard_aggregates_and_activity_cap() {
    let h = harness();
    seed_distinct(&h.collections, 5).await;
    full_rebuild(&h).await;

    let stats = h.engine.dashboard().await.unwrap().expect("stored by rebuild");
    assert_eq!(stats.total_collections, 5);
    assert_eq!(stats.total_images, (1..=5u64).sum::<u64>());
    assert_eq!(stats.collections_by_type.get("folder"), Some(&5));
    assert!(h.engine.dashboard_is_fresh().await.unwrap());

    for n in 0..120 {
        h.engine
            .record_activity(lumina_model::ActivityEntry {
                at: t0(),
                kind: "test".into(),
                message: format!("event {n}"),
            })
            .await
            .unwrap();
    }
    let activity = h.engine.recent_activity().await.unwrap();
    assert_eq!(activity.len(), 100);
    assert_eq!(activity[0].message, "event 119");
}
