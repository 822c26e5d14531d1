use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::store::CollectionQuery;
use crate::util::current_rss_bytes;

use super::{keys, CollectionIndexEngine};

/// How long a rebuild waits for the KVS before giving up. A later rebuild
/// retries; nothing is cleared on abort.
const KVS_READY_TIMEOUT: Duration = Duration::from_secs(10);
const KVS_READY_POLL: Duration = Duration::from_millis(500);

/// Collections processed per batch. The batch buffer is released after each
/// round so peak memory stays bounded even with inline thumbnails at tens of
/// thousands of collections.
const BATCH_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// Clear the index keyspace and rebuild everything.
    Full,
    /// Rebuild only collections whose state record is stale.
    ChangedOnly,
    /// Rewrite everything without clearing and without staleness skips.
    ForceRebuildAll,
    /// Run a repairing verification instead of a rebuild.
    Verify,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    pub dry_run: bool,
    pub skip_thumbnail_caching: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildStatistics {
    pub total: u64,
    pub rebuilt: u64,
    pub skipped: u64,
    pub duration: Duration,
    pub peak_memory_bytes: u64,
}

impl CollectionIndexEngine {
    /// Rebuild the denormalized index from the document store.
    ///
    /// Per-collection KVS failures are logged and skipped; the rebuild only
    /// fails outright when the store itself is unavailable. Cancellation is
    /// honored between batches and between items, preserving writes already
    /// made.
    pub async fn rebuild_index(
        &self,
        mode: RebuildMode,
        options: RebuildOptions,
        cancel: &CancellationToken,
    ) -> Result<RebuildStatistics> {
        let started = Instant::now();
        self.await_kvs_ready().await?;

        if mode == RebuildMode::Verify {
            let report = self.verify_index(options.dry_run, cancel).await?;
            let repaired =
                (report.to_add + report.to_update + report.to_remove) as u64;
            return Ok(RebuildStatistics {
                total: report.scanned,
                rebuilt: repaired,
                skipped: report.scanned.saturating_sub(repaired),
                duration: started.elapsed(),
                peak_memory_bytes: current_rss_bytes().unwrap_or(0),
            });
        }

        let total = self.collections().count(&CollectionQuery::active()).await?;
        info!(
            ?mode,
            total,
            dry_run = options.dry_run,
            "Starting index rebuild"
        );

        if !options.dry_run {
            match mode {
                RebuildMode::Full => self.clear_index_keys().await?,
                RebuildMode::ChangedOnly | RebuildMode::ForceRebuildAll => {
                    // Stale-data safety valve: a tiny catalogue facing a
                    // bloated keyspace means the KVS holds leftovers from
                    // another life. Thumbnail blobs are cheap to lose to
                    // this; they rebuild from disk.
                    let dbsize = self.kvs().dbsize().await?;
                    if total < 100 && dbsize > total * 10 {
                        warn!(
                            total,
                            dbsize,
                            "KVS key count far exceeds catalogue size, flushing database"
                        );
                        self.kvs().flush_db().await?;
                    }
                }
                RebuildMode::Verify => unreachable!("handled above"),
            }
        }

        let mut rebuilt: u64 = 0;
        let mut skipped: u64 = 0;
        let mut failed: u64 = 0;
        let mut peak_memory = current_rss_bytes().unwrap_or(0);
        let mut last_id = None;
        let mut batch_no: u32 = 0;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let batch = self
                .collections()
                .batch_after(last_id, BATCH_SIZE, false)
                .await?;
            if batch.is_empty() {
                break;
            }
            batch_no += 1;
            let rss_before = current_rss_bytes().unwrap_or(0);
            last_id = batch.last().map(|c| c.id);

            // Sequential per-collection work: each write may decode and
            // re-encode a thumbnail from disk, which does not tolerate
            // unbounded fan-out.
            for collection in &batch {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                if mode == RebuildMode::ChangedOnly {
                    if let Ok(Some(state)) = self.read_state(collection.id).await
                    {
                        if !state.is_stale_for(collection) {
                            skipped += 1;
                            continue;
                        }
                    }
                }
                if options.dry_run {
                    rebuilt += 1;
                    continue;
                }
                match self
                    .write_collection(collection, options.skip_thumbnail_caching)
                    .await
                {
                    Ok(()) => rebuilt += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(
                            "Index write for {} failed during rebuild: {}",
                            collection.id, e
                        );
                    }
                }
            }

            // Release the batch buffer before the next round; the RSS
            // samples around it make per-batch growth visible in the log.
            drop(batch);
            let rss_after = current_rss_bytes().unwrap_or(0);
            peak_memory = peak_memory.max(rss_after);
            info!(
                batch = batch_no,
                rebuilt,
                skipped,
                memory_delta_bytes = rss_after as i64 - rss_before as i64,
                "Rebuild batch complete"
            );

            if cancelled {
                break;
            }
        }

        if cancelled {
            info!(
                batch = batch_no,
                rebuilt, "Rebuild cancelled, keeping completed writes"
            );
        } else if !options.dry_run {
            self.write_rebuild_markers(total).await;
            match self.build_dashboard(cancel).await {
                Ok(stats) => {
                    if let Err(e) = self.store_dashboard(&stats).await {
                        warn!("Failed to store dashboard statistics: {}", e);
                    }
                }
                Err(e) => warn!("Dashboard statistics pass failed: {}", e),
            }
        }

        let stats = RebuildStatistics {
            total,
            rebuilt,
            skipped,
            duration: started.elapsed(),
            peak_memory_bytes: peak_memory,
        };
        info!(
            total = stats.total,
            rebuilt = stats.rebuilt,
            skipped = stats.skipped,
            failed,
            duration_ms = stats.duration.as_millis() as u64,
            peak_memory_bytes = stats.peak_memory_bytes,
            "Index rebuild finished"
        );
        Ok(stats)
    }

    async fn await_kvs_ready(&self) -> Result<()> {
        let deadline = Instant::now() + KVS_READY_TIMEOUT;
        while !self.kvs().is_ready().await {
            if Instant::now() >= deadline {
                return Err(CoreError::TransientStore(format!(
                    "KVS not ready within {}s, rebuild aborted",
                    KVS_READY_TIMEOUT.as_secs()
                )));
            }
            tokio::time::sleep(KVS_READY_POLL).await;
        }
        Ok(())
    }

    /// Scan-delete the sorted/data/state prefixes. `thumb:` keys are never
    /// cleared here; they carry their own TTL.
    async fn clear_index_keys(&self) -> Result<()> {
        for prefix in [keys::SORTED_PREFIX, keys::DATA_PREFIX, keys::STATE_PREFIX]
        {
            let matched = self.kvs().scan_prefix(prefix).await?;
            if matched.is_empty() {
                continue;
            }
            info!("Clearing {} keys under {}", matched.len(), prefix);
            for chunk in matched.chunks(500) {
                let mut batch = crate::kvs::KvsBatch::new();
                for key in chunk {
                    batch.delete(key.clone());
                }
                self.kvs().apply_batch(batch).await?;
            }
        }
        Ok(())
    }

    async fn write_rebuild_markers(&self, total: u64) {
        if let Err(e) = self
            .kvs()
            .set_string(keys::TOTAL_KEY, &total.to_string(), None)
            .await
        {
            warn!("Failed to write total marker: {}", e);
        }
        if let Err(e) = self
            .kvs()
            .set_string(keys::LAST_REBUILD_KEY, &Utc::now().to_rfc3339(), None)
            .await
        {
            warn!("Failed to write last-rebuild marker: {}", e);
        }
    }

    /// Time of the last completed rebuild, if any. Absence signals that an
    /// initial rebuild is due.
    pub async fn last_rebuild(&self) -> Result<Option<chrono::DateTime<Utc>>> {
        let raw = self.kvs().get_string(keys::LAST_REBUILD_KEY).await?;
        Ok(raw.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }

    pub async fn indexed_total(&self) -> Result<Option<u64>> {
        let raw = self.kvs().get_string(keys::TOTAL_KEY).await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }
}
