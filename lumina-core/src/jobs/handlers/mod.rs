//! Per-job-type handlers and their parameter shapes.

mod cache;
mod cleanup;
mod scan;
mod source;
mod thumbnails;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use lumina_model::{BackgroundJob, CollectionId, JobKind};

use crate::error::{CoreError, Result};

use super::JobContext;

pub use cache::GenerateCacheHandler;
pub use cleanup::CleanupCacheHandler;
pub use scan::ScanCollectionHandler;
pub use thumbnails::GenerateThumbnailsHandler;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanParams {
    pub collection_id: CollectionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailParams {
    pub collection_id: CollectionId,
    #[serde(default = "default_thumb_side")]
    pub width: u32,
    #[serde(default = "default_thumb_side")]
    pub height: u32,
}

fn default_thumb_side() -> u32 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheParams {
    pub collection_id: CollectionId,
    /// Target bounds; the configured cache resolution (1920×1080 by
    /// default) applies when absent.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    job: &BackgroundJob,
) -> Result<T> {
    serde_json::from_value(job.parameters.clone()).map_err(|e| {
        CoreError::Validation(format!(
            "invalid parameters for {} job: {e}",
            job.job_type.as_str()
        ))
    })
}

/// One job type's implementation. Handlers are idempotent: messages may be
/// redelivered and the supervisor may race the consumer for pickup.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Execute the job, reporting progress through `ctx.jobs` as it goes.
    /// The returned string becomes the job's result message.
    async fn run(
        &self,
        ctx: JobContext,
        job: &BackgroundJob,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Static kind → handler table.
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn standard() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(Arc::new(ScanCollectionHandler));
        registry.register(Arc::new(GenerateThumbnailsHandler));
        registry.register(Arc::new(GenerateCacheHandler));
        registry.register(Arc::new(CleanupCacheHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

/// Validate job parameters at enqueue time so bad requests fail fast with a
/// `Validation` error instead of a failed job.
pub fn validate_params(kind: JobKind, parameters: &serde_json::Value) -> Result<()> {
    let check = |r: std::result::Result<(), serde_json::Error>| {
        r.map_err(|e| {
            CoreError::Validation(format!(
                "invalid parameters for {} job: {e}",
                kind.as_str()
            ))
        })
    };
    match kind {
        JobKind::ScanCollection => check(
            serde_json::from_value::<ScanParams>(parameters.clone()).map(|_| ()),
        ),
        JobKind::GenerateThumbnails => check(
            serde_json::from_value::<ThumbnailParams>(parameters.clone())
                .map(|_| ()),
        ),
        JobKind::GenerateCache => check(
            serde_json::from_value::<CacheParams>(parameters.clone()).map(|_| ()),
        ),
        JobKind::CleanupCache => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thumbnail_params_default_size() {
        let params: ThumbnailParams = serde_json::from_value(json!({
            "collectionId": "0123456789abcdef01234567"
        }))
        .unwrap();
        assert_eq!((params.width, params.height), (300, 300));
    }

    #[test]
    fn cache_params_leave_size_to_config() {
        let params: CacheParams = serde_json::from_value(json!({
            "collectionId": "0123456789abcdef01234567"
        }))
        .unwrap();
        assert_eq!((params.width, params.height), (None, None));

        let params: CacheParams = serde_json::from_value(json!({
            "collectionId": "0123456789abcdef01234567",
            "width": 2560,
            "height": 1440
        }))
        .unwrap();
        assert_eq!((params.width, params.height), (Some(2560), Some(1440)));
    }

    #[test]
    fn validation_rejects_bad_ids() {
        let err = validate_params(
            JobKind::ScanCollection,
            &json!({"collectionId": "nope"}),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(validate_params(JobKind::CleanupCache, &json!({})).is_ok());
    }

    #[test]
    fn registry_covers_all_kinds() {
        let registry = HandlerRegistry::standard();
        for kind in [
            JobKind::ScanCollection,
            JobKind::GenerateThumbnails,
            JobKind::GenerateCache,
            JobKind::CleanupCache,
        ] {
            assert!(registry.get(kind).is_some());
        }
    }
}
