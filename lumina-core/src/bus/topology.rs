use lumina_model::JobKind;

/// Message kinds the pipeline routes. Dispatch is a static table lookup,
/// never driven by runtime type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    CollectionScan,
    ThumbnailGeneration,
    CacheGeneration,
    CollectionCreation,
    BulkOperation,
    ImageProcessing,
    LibraryScan,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectionScan => "collectionScan",
            Self::ThumbnailGeneration => "thumbnailGeneration",
            Self::CacheGeneration => "cacheGeneration",
            Self::CollectionCreation => "collectionCreation",
            Self::BulkOperation => "bulkOperation",
            Self::ImageProcessing => "imageProcessing",
            Self::LibraryScan => "libraryScan",
        }
    }

    pub fn route(&self) -> &'static QueueSpec {
        // ROUTES covers every variant; the position is fixed by the table.
        ROUTES
            .iter()
            .find(|spec| spec.kind == *self)
            .unwrap_or(&ROUTES[0])
    }

    /// Queue a background job kind is published to.
    pub fn for_job(kind: JobKind) -> Self {
        match kind {
            JobKind::ScanCollection => Self::CollectionScan,
            JobKind::GenerateThumbnails => Self::ThumbnailGeneration,
            JobKind::GenerateCache => Self::CacheGeneration,
            // Cleanup has no dedicated route; it travels the generic
            // bulk-operation queue.
            JobKind::CleanupCache => Self::BulkOperation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub kind: MessageKind,
    pub queue: &'static str,
    pub routing_key: &'static str,
}

/// Static routing table: kind → (queue, routing key).
pub const ROUTES: &[QueueSpec] = &[
    QueueSpec {
        kind: MessageKind::CollectionScan,
        queue: "collection_scan_queue",
        routing_key: "collection.scan",
    },
    QueueSpec {
        kind: MessageKind::ThumbnailGeneration,
        queue: "thumbnail_generation_queue",
        routing_key: "thumbnail.generation",
    },
    QueueSpec {
        kind: MessageKind::CacheGeneration,
        queue: "cache_generation_queue",
        routing_key: "cache.generation",
    },
    QueueSpec {
        kind: MessageKind::CollectionCreation,
        queue: "collection_creation_queue",
        routing_key: "collection.creation",
    },
    QueueSpec {
        kind: MessageKind::BulkOperation,
        queue: "bulk_operation_queue",
        routing_key: "bulk.operation",
    },
    QueueSpec {
        kind: MessageKind::ImageProcessing,
        queue: "image_processing_queue",
        routing_key: "image.processing",
    },
    QueueSpec {
        kind: MessageKind::LibraryScan,
        queue: "library_scan_queue",
        routing_key: "library_scan_queue",
    },
];

/// Catch-all queue for expired, rejected, and failed messages.
pub const DEAD_LETTER_QUEUE: &str = "dead_letter_queue";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_route() {
        for kind in [
            MessageKind::CollectionScan,
            MessageKind::ThumbnailGeneration,
            MessageKind::CacheGeneration,
            MessageKind::CollectionCreation,
            MessageKind::BulkOperation,
            MessageKind::ImageProcessing,
            MessageKind::LibraryScan,
        ] {
            let spec = kind.route();
            assert_eq!(spec.kind, kind);
            assert!(!spec.queue.is_empty());
            assert!(!spec.routing_key.is_empty());
        }
    }

    #[test]
    fn queues_are_distinct() {
        let mut queues: Vec<&str> = ROUTES.iter().map(|r| r.queue).collect();
        queues.sort_unstable();
        queues.dedup();
        assert_eq!(queues.len(), ROUTES.len());
    }

    #[test]
    fn job_kinds_route_to_their_queues() {
        assert_eq!(
            MessageKind::for_job(JobKind::ScanCollection).route().routing_key,
            "collection.scan"
        );
        assert_eq!(
            MessageKind::for_job(JobKind::GenerateThumbnails)
                .route()
                .routing_key,
            "thumbnail.generation"
        );
        assert_eq!(
            MessageKind::for_job(JobKind::GenerateCache).route().routing_key,
            "cache.generation"
        );
        assert_eq!(
            MessageKind::for_job(JobKind::CleanupCache).route().routing_key,
            "bulk.operation"
        );
    }
}
