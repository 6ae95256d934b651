// Session context: everything one user session needs, built once at start and
// dropped at the end. Nothing in the crate lives in globals.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{ClientConfig, ClientError};
use crate::itinerary_sync::ItinerarySyncEngine;
use crate::model::{ItinerarySnapshot, SearchResult, UserIdentity};
use crate::notifier::ViewNotifier;
use crate::query_engine::QueryEngine;
use crate::result_cache::{CacheStats, ResultCache};
use crate::transport::{HttpTransport, Transport};

pub struct Session {
    config: ClientConfig,
    cache: Arc<ResultCache>,
    query: QueryEngine,
    itinerary: ItinerarySyncEngine,
}

impl Session {
    /// Builds the engines over `transport` and performs the initial itinerary
    /// load.
    ///
    /// A failed initial load does not fail the session: the snapshot stays
    /// empty and the itinerary view has already been told why.
    pub async fn start(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn ViewNotifier>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let cache = Arc::new(ResultCache::new());
        let query = QueryEngine::new(transport.clone(), cache.clone(), notifier.clone());
        let itinerary =
            ItinerarySyncEngine::new(transport, cache.clone(), notifier, config.user_id.clone());

        let session = Self {
            config,
            cache,
            query,
            itinerary,
        };

        info!(user_id = %session.config.user_id, base_url = %session.config.base_url, "session started");
        if let Err(e) = session.itinerary.refresh().await {
            warn!(error = %e, "initial itinerary load failed");
        }

        Ok(session)
    }

    // Same as `start`, talking HTTP to `config.base_url`
    pub async fn connect(
        config: ClientConfig,
        notifier: Arc<dyn ViewNotifier>,
    ) -> Result<Self, ClientError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::start(config, transport, notifier).await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn user_id(&self) -> &UserIdentity {
        &self.config.user_id
    }

    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    pub fn itinerary(&self) -> &ItinerarySyncEngine {
        &self.itinerary
    }

    pub fn search_result(&self) -> SearchResult {
        self.cache.search_result()
    }

    pub fn itinerary_snapshot(&self) -> ItinerarySnapshot {
        self.cache.itinerary_snapshot()
    }

    // Tears the session down and hands back the final cache statistics
    pub fn end(self) -> CacheStats {
        let stats = self.cache.stats();
        info!(
            user_id = %self.config.user_id,
            searches = stats.search_replacements,
            syncs = stats.itinerary_replacements,
            "session ended"
        );
        stats
    }
}
