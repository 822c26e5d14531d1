use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lumina_core::auth::TokenService;
use lumina_core::config::AppConfig;
use lumina_core::index::CollectionIndexEngine;
use lumina_core::jobs::JobOrchestrator;
use lumina_core::store::{
    LibraryRepository, RefreshTokenRepository, UserRepository,
};

/// Shared handles the request handlers work against.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CollectionIndexEngine>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub libraries: Arc<dyn LibraryRepository>,
    pub users: Arc<dyn UserRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<AppConfig>,
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
