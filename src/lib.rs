// Attraction search and itinerary synchronization client

pub mod config;
pub mod itinerary_sync;
pub mod mock_server;
pub mod model;
pub mod notifier;
pub mod query_engine;
pub mod result_cache;
pub mod session;
pub mod transport;

// Re-export key types for convenience
pub use config::{ClientConfig, ClientError};
pub use itinerary_sync::{ItinerarySyncEngine, MutationOutcome, MutationState, RefreshError, SyncError};
pub use model::{Attraction, ItinerarySnapshot, NameLookup, SearchResult, UserIdentity};
pub use notifier::{ConfirmationGate, View, ViewEvent, ViewNotifier, ViewState};
pub use query_engine::{QueryEngine, QueryOutcome};
pub use result_cache::{CacheStats, ResultCache};
pub use session::Session;
pub use transport::{HttpTransport, Transport, TransportError};
