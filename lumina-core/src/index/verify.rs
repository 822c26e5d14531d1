use std::collections::HashSet;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lumina_model::CollectionId;

use crate::error::{CoreError, Result};

use super::{keys, CollectionIndexEngine};

const BATCH_SIZE: u64 = 100;

/// Diff between the document store and the index keyspace.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Active collections with no state record in the index.
    pub missing_in_index: Vec<CollectionId>,
    /// Active collections whose state record is stale (the document moved
    /// forward, or a first thumbnail appeared after the last index write).
    pub outdated_in_index: Vec<CollectionId>,
    /// State records whose collection is gone or soft-deleted.
    pub orphaned_in_index: Vec<CollectionId>,
    /// Indexed collections with a first thumbnail on disk but no cached
    /// thumbnail blob.
    pub missing_thumbnails: Vec<CollectionId>,
    /// Active collections examined in phase one.
    pub scanned: u64,
    pub to_add: usize,
    pub to_update: usize,
    pub to_remove: usize,
    pub is_consistent: bool,
    pub duration: Duration,
}

impl CollectionIndexEngine {
    /// Three-phase consistency check between the document store and the
    /// index: find missing/outdated entries, find orphaned entries, then
    /// (unless `dry_run`) apply the corresponding add/update/remove repairs.
    pub async fn verify_index(
        &self,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<VerifyReport> {
        let started = Instant::now();
        let mut report = VerifyReport::default();

        let cached_thumbs: HashSet<String> = self
            .kvs()
            .scan_prefix(keys::THUMB_PREFIX)
            .await?
            .into_iter()
            .collect();

        // Phase 1: document store -> index.
        let mut active_ids: HashSet<CollectionId> = HashSet::new();
        let mut last_id = None;
        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled("index verification".into()));
            }
            let batch = self
                .collections()
                .batch_after(last_id, BATCH_SIZE, false)
                .await?;
            if batch.is_empty() {
                break;
            }
            last_id = batch.last().map(|c| c.id);

            for collection in &batch {
                report.scanned += 1;
                active_ids.insert(collection.id);
                match self.read_state(collection.id).await? {
                    None => report.missing_in_index.push(collection.id),
                    Some(state) if state.is_stale_for(collection) => {
                        report.outdated_in_index.push(collection.id)
                    }
                    Some(_) => {
                        if collection.first_thumbnail().is_some()
                            && !cached_thumbs
                                .contains(&keys::thumb_key(collection.id))
                        {
                            report.missing_thumbnails.push(collection.id);
                        }
                    }
                }
            }
            drop(batch);
        }

        // Phase 2: index -> document store. Anything with a state record but
        // no active document is residue.
        for key in self.kvs().scan_prefix(keys::STATE_PREFIX).await? {
            let Some(id) = keys::id_from_state_key(&key) else {
                warn!("Unparseable state key {}", key);
                continue;
            };
            if !active_ids.contains(&id) {
                report.orphaned_in_index.push(id);
            }
        }

        report.to_add = report.missing_in_index.len();
        report.to_update =
            report.outdated_in_index.len() + report.missing_thumbnails.len();
        report.to_remove = report.orphaned_in_index.len();
        report.is_consistent = report.to_add == 0
            && report.to_update == 0
            && report.to_remove == 0;

        // Phase 3: repairs.
        if !dry_run && !report.is_consistent {
            let rewrite: Vec<CollectionId> = report
                .missing_in_index
                .iter()
                .chain(&report.outdated_in_index)
                .chain(&report.missing_thumbnails)
                .copied()
                .collect();
            for id in rewrite {
                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled("index verification".into()));
                }
                match self.collections().get(id).await? {
                    Some(collection) if !collection.is_deleted => {
                        if let Err(e) =
                            self.write_collection(&collection, false).await
                        {
                            warn!("Repair write for {} failed: {}", id, e);
                        }
                    }
                    _ => {
                        // Deleted or vanished between phases; treat as residue.
                        if let Err(e) = self.remove_entries(id).await {
                            warn!("Repair removal for {} failed: {}", id, e);
                        }
                    }
                }
            }
            for id in report.orphaned_in_index.clone() {
                if let Err(e) = self.remove_entries(id).await {
                    warn!("Orphan removal for {} failed: {}", id, e);
                }
            }
        }

        report.duration = started.elapsed();
        info!(
            scanned = report.scanned,
            to_add = report.to_add,
            to_update = report.to_update,
            to_remove = report.to_remove,
            consistent = report.is_consistent,
            dry_run,
            "Index verification finished"
        );
        Ok(report)
    }
}
