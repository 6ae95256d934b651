// In-memory holder of the latest search result and itinerary snapshot.
// Values are only ever replaced whole; there is no merge path.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::model::{ItinerarySnapshot, SearchResult};

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub search_replacements: usize,
    pub itinerary_replacements: usize,
    pub last_search_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

// Each field has a single writer: the query engine owns the search result and
// the itinerary sync engine owns the snapshot.
#[derive(Debug, Default)]
pub struct ResultCache {
    search: RwLock<SearchResult>,
    itinerary: RwLock<ItinerarySnapshot>,
    stats: RwLock<CacheStats>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_result(&self) -> SearchResult {
        self.search.read().clone()
    }

    pub fn set_search_result(&self, result: SearchResult) {
        *self.search.write() = result;

        let mut stats = self.stats.write();
        stats.search_replacements += 1;
        stats.last_search_at = Some(Utc::now());
    }

    pub fn itinerary_snapshot(&self) -> ItinerarySnapshot {
        self.itinerary.read().clone()
    }

    pub fn set_itinerary_snapshot(&self, snapshot: ItinerarySnapshot) {
        *self.itinerary.write() = snapshot;

        let mut stats = self.stats.write();
        stats.itinerary_replacements += 1;
        stats.last_sync_at = Some(Utc::now());
    }

    // Read a cached value without cloning the whole sequence
    pub fn with_search_result<R>(&self, f: impl FnOnce(&SearchResult) -> R) -> R {
        f(&*self.search.read())
    }

    pub fn with_itinerary_snapshot<R>(&self, f: impl FnOnce(&ItinerarySnapshot) -> R) -> R {
        f(&*self.itinerary.read())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}
