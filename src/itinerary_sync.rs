// Itinerary sync engine: add/remove against the remote per-user itinerary.
//
// The remote store is the only source of truth for membership. Mutations
// never touch the local snapshot directly; after every confirmed mutation the
// snapshot is reloaded in full from the server.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{
    AddRequest, ApiResponse, Attraction, ItinerarySnapshot, NameLookup, RemoveRequest,
    UserIdentity,
};
use crate::notifier::{ConfirmationGate, View, ViewEvent, ViewNotifier, ViewState};
use crate::result_cache::ResultCache;
use crate::transport::{Method, Request, Response, Transport, TransportError, ITINERARY_PATH};

pub const CONFLICT_STATUS: u16 = 409;

// Client-side precondition failures. No request is sent for any of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Attraction not found: {0}")]
    NotFound(String),

    #[error("\"{name}\" matches {matches} attractions")]
    AmbiguousReference { name: String, matches: usize },

    #[error("A change to \"{0}\" is already in progress")]
    MutationInFlight(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshError {
    #[error("Failed to load itinerary: {0}")]
    ApplicationFailure(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Remove,
}

// Terminal result of one mutation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    // `count` is whatever the server reported; informational only
    Confirmed { count: Option<usize> },
    Conflict,
    Rejected { reason: String },
    TransportFailed { cause: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    InFlight,
    Confirmed,
    Conflict,
    Rejected,
    TransportFailed,
}

impl MutationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MutationState::Idle | MutationState::InFlight)
    }
}

impl From<&MutationOutcome> for MutationState {
    fn from(outcome: &MutationOutcome) -> Self {
        match outcome {
            MutationOutcome::Confirmed { .. } => MutationState::Confirmed,
            MutationOutcome::Conflict => MutationState::Conflict,
            MutationOutcome::Rejected { .. } => MutationState::Rejected,
            MutationOutcome::TransportFailed { .. } => MutationState::TransportFailed,
        }
    }
}

// One mutation attempt. Moves Idle -> InFlight -> terminal, never back.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub name: String,
    state: MutationState,
}

impl Mutation {
    pub fn new(kind: MutationKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            state: MutationState::Idle,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    fn start(&mut self) {
        if self.state == MutationState::Idle {
            self.state = MutationState::InFlight;
        }
    }

    fn finish(&mut self, outcome: &MutationOutcome) {
        if self.state == MutationState::InFlight {
            self.state = outcome.into();
        }
    }
}

// Releases the per-name slot when the mutation ends, even if the future is dropped
struct InFlightGuard<'a> {
    slots: &'a DashMap<String, MutationKind>,
    name: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slots.remove(&self.name);
    }
}

pub struct ItinerarySyncEngine {
    transport: Arc<dyn Transport>,
    cache: Arc<ResultCache>,
    notifier: Arc<dyn ViewNotifier>,
    user_id: UserIdentity,
    in_flight: DashMap<String, MutationKind>,
    last_mutation: RwLock<Option<Mutation>>,
}

impl ItinerarySyncEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<ResultCache>,
        notifier: Arc<dyn ViewNotifier>,
        user_id: UserIdentity,
    ) -> Self {
        Self {
            transport,
            cache,
            notifier,
            user_id,
            in_flight: DashMap::new(),
            last_mutation: RwLock::new(None),
        }
    }

    pub fn user_id(&self) -> &UserIdentity {
        &self.user_id
    }

    pub fn last_mutation(&self) -> Option<Mutation> {
        self.last_mutation.read().clone()
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains_key(name)
    }

    /// Reloads the whole itinerary from the server.
    ///
    /// The cached snapshot is replaced only when the server answers with
    /// `success: true`; any failure leaves the previous snapshot in place.
    pub async fn refresh(&self) -> Result<ItinerarySnapshot, RefreshError> {
        let request =
            Request::new(Method::Get, ITINERARY_PATH).query("user_id", self.user_id.as_str());

        let result = match self.transport.send(request).await {
            Ok(response) => Self::decode(response).map_err(RefreshError::from),
            Err(e) => Err(e.into()),
        }
        .and_then(|body| {
            if body.success {
                Ok(ItinerarySnapshot::new(body.itinerary.unwrap_or_default()))
            } else {
                Err(RefreshError::ApplicationFailure(body.failure_reason()))
            }
        });

        match result {
            Ok(snapshot) => {
                debug!(user_id = %self.user_id, items = snapshot.len(), "itinerary reloaded");
                self.cache.set_itinerary_snapshot(snapshot.clone());
                self.notifier.notify(Self::snapshot_event(&snapshot));
                Ok(snapshot)
            }
            Err(e) => {
                let message = match &e {
                    RefreshError::ApplicationFailure(_) => {
                        warn!(user_id = %self.user_id, error = %e, "itinerary load rejected");
                        e.to_string()
                    }
                    RefreshError::Transport(cause) => {
                        error!(user_id = %self.user_id, error = %cause, "itinerary load failed");
                        format!(
                            "Failed to load itinerary. Please make sure the backend is running at {}",
                            self.transport.base_url()
                        )
                    }
                };
                self.notifier
                    .notify(ViewEvent::new(View::Itinerary, ViewState::Failed, message));
                Err(e)
            }
        }
    }

    /// Saves an attraction from the current search result to the itinerary.
    ///
    /// Only names present exactly once in the cached search result can be
    /// added. A 409 from the server is reported as `Conflict`, which is an
    /// expected outcome rather than an error.
    pub async fn add(&self, name: &str) -> Result<MutationOutcome, SyncError> {
        let attraction = self.resolve_search_entry(name)?;
        let _slot = self.claim(MutationKind::Add, name)?;

        let mut mutation = Mutation::new(MutationKind::Add, name);
        mutation.start();

        let outcome = match self.send_add(&attraction).await {
            Ok(response) if response.status == CONFLICT_STATUS => MutationOutcome::Conflict,
            Ok(response) => match Self::decode(response) {
                Ok(body) if body.success => MutationOutcome::Confirmed { count: body.count },
                Ok(body) => MutationOutcome::Rejected {
                    reason: body.failure_reason(),
                },
                Err(e) => MutationOutcome::TransportFailed {
                    cause: e.to_string(),
                },
            },
            Err(e) => MutationOutcome::TransportFailed {
                cause: e.to_string(),
            },
        };

        mutation.finish(&outcome);
        *self.last_mutation.write() = Some(mutation);

        self.report_add(name, &outcome);

        if matches!(outcome, MutationOutcome::Confirmed { .. }) {
            // the add stays confirmed; refresh has already notified the view
            if let Err(e) = self.refresh().await {
                debug!(attraction = name, error = %e, "reload after add failed");
            }
        }

        Ok(outcome)
    }

    /// Deletes an attraction from the itinerary by name.
    ///
    /// Callers are expected to have obtained confirmation already; see
    /// [`ItinerarySyncEngine::remove_with_confirmation`]. On success the
    /// snapshot is reloaded from the server rather than spliced locally.
    pub async fn remove(&self, name: &str) -> Result<MutationOutcome, SyncError> {
        let _slot = self.claim(MutationKind::Remove, name)?;

        let mut mutation = Mutation::new(MutationKind::Remove, name);
        mutation.start();

        let outcome = match self.send_remove(name).await {
            Ok(response) if response.status == CONFLICT_STATUS => MutationOutcome::Conflict,
            Ok(response) => match Self::decode(response) {
                Ok(body) if body.success => {
                    let count = match self.refresh().await {
                        Ok(snapshot) => Some(snapshot.len()),
                        Err(e) => {
                            debug!(attraction = name, error = %e, "reload after remove failed");
                            None
                        }
                    };
                    MutationOutcome::Confirmed { count }
                }
                Ok(body) => MutationOutcome::Rejected {
                    reason: body
                        .error
                        .clone()
                        .filter(|error| !error.trim().is_empty())
                        .unwrap_or_else(|| body.failure_reason()),
                },
                Err(e) => MutationOutcome::TransportFailed {
                    cause: e.to_string(),
                },
            },
            Err(e) => MutationOutcome::TransportFailed {
                cause: e.to_string(),
            },
        };

        mutation.finish(&outcome);
        *self.last_mutation.write() = Some(mutation);

        self.report_remove(name, &outcome);
        Ok(outcome)
    }

    // Two-phase removal: ask first, and only call `remove` on a yes.
    // `Ok(None)` means the user declined and nothing was sent.
    pub async fn remove_with_confirmation(
        &self,
        gate: &dyn ConfirmationGate,
        name: &str,
    ) -> Result<Option<MutationOutcome>, SyncError> {
        if !gate.request_removal_confirmation(name) {
            debug!(attraction = name, "removal declined");
            return Ok(None);
        }

        self.remove(name).await.map(Some)
    }

    fn resolve_search_entry(&self, name: &str) -> Result<Attraction, SyncError> {
        let err = match self.cache.with_search_result(|result| result.find(name)) {
            NameLookup::Unique(attraction) => return Ok(attraction),
            NameLookup::Missing => SyncError::NotFound(name.to_string()),
            NameLookup::Ambiguous(matches) => SyncError::AmbiguousReference {
                name: name.to_string(),
                matches,
            },
        };

        warn!(attraction = name, error = %err, "add refused before sending");
        let message = match &err {
            SyncError::NotFound(_) => "Attraction not found!".to_string(),
            other => other.to_string(),
        };
        self.notifier
            .notify(ViewEvent::new(View::Search, ViewState::Rejected, message));
        Err(err)
    }

    fn claim(&self, kind: MutationKind, name: &str) -> Result<InFlightGuard<'_>, SyncError> {
        match self.in_flight.entry(name.to_string()) {
            Entry::Occupied(_) => {
                let err = SyncError::MutationInFlight(name.to_string());
                warn!(attraction = name, kind = ?kind, "mutation refused while another is in flight");
                let view = match kind {
                    MutationKind::Add => View::Search,
                    MutationKind::Remove => View::Itinerary,
                };
                self.notifier
                    .notify(ViewEvent::new(view, ViewState::Rejected, err.to_string()));
                Err(err)
            }
            Entry::Vacant(slot) => {
                slot.insert(kind);
                Ok(InFlightGuard {
                    slots: &self.in_flight,
                    name: name.to_string(),
                })
            }
        }
    }

    async fn send_add(&self, attraction: &Attraction) -> Result<Response, TransportError> {
        let request = Request::new(Method::Post, ITINERARY_PATH).payload(&AddRequest {
            user_id: &self.user_id,
            attraction,
        })?;
        self.transport.send(request).await
    }

    async fn send_remove(&self, name: &str) -> Result<Response, TransportError> {
        let request = Request::new(Method::Delete, ITINERARY_PATH).payload(&RemoveRequest {
            user_id: &self.user_id,
            attraction_name: name,
        })?;
        self.transport.send(request).await
    }

    fn decode(response: Response) -> Result<ApiResponse, TransportError> {
        // error status with no readable body
        if response.body.is_null() {
            return Ok(ApiResponse {
                error: Some(format!("server answered with status {}", response.status)),
                ..Default::default()
            });
        }

        serde_json::from_value(response.body).map_err(|e| TransportError::InvalidResponse {
            status: response.status,
            reason: e.to_string(),
        })
    }

    fn snapshot_event(snapshot: &ItinerarySnapshot) -> ViewEvent {
        if snapshot.is_empty() {
            return ViewEvent::new(View::Itinerary, ViewState::Empty, "Your Itinerary is Empty")
                .with_count(0);
        }

        let n = snapshot.len();
        ViewEvent::new(
            View::Itinerary,
            ViewState::Populated,
            format!("{} attraction{} saved", n, if n == 1 { "" } else { "s" }),
        )
        .with_attractions(snapshot.items().to_vec())
        .with_count(n)
    }

    fn report_add(&self, name: &str, outcome: &MutationOutcome) {
        let event = match outcome {
            MutationOutcome::Confirmed { count } => {
                info!(attraction = name, count = ?count, "added to itinerary");
                let message = match count {
                    Some(count) => format!(
                        "Added \"{}\" to your itinerary! You now have {} attractions saved.",
                        name, count
                    ),
                    None => format!("Added \"{}\" to your itinerary!", name),
                };
                let event = ViewEvent::new(View::Search, ViewState::Confirmed, message);
                match count {
                    Some(count) => event.with_count(*count),
                    None => event,
                }
            }
            MutationOutcome::Conflict => {
                debug!(attraction = name, "already in itinerary");
                ViewEvent::new(
                    View::Search,
                    ViewState::Conflict,
                    format!("\"{}\" is already in your itinerary.", name),
                )
            }
            MutationOutcome::Rejected { reason } => {
                warn!(attraction = name, reason = %reason, "add rejected by server");
                ViewEvent::new(
                    View::Search,
                    ViewState::Rejected,
                    format!("Failed to add: {}", reason),
                )
            }
            MutationOutcome::TransportFailed { cause } => {
                error!(attraction = name, cause = %cause, "add could not reach the backend");
                ViewEvent::new(
                    View::Search,
                    ViewState::Failed,
                    format!(
                        "Failed to add to itinerary. Please make sure the backend is running at {}",
                        self.transport.base_url()
                    ),
                )
            }
        };

        self.notifier.notify(event);
    }

    fn report_remove(&self, name: &str, outcome: &MutationOutcome) {
        let event = match outcome {
            MutationOutcome::Confirmed { .. } => {
                info!(attraction = name, "removed from itinerary");
                ViewEvent::new(
                    View::Itinerary,
                    ViewState::Confirmed,
                    format!("Removed \"{}\" from your itinerary", name),
                )
            }
            MutationOutcome::Conflict => {
                debug!(attraction = name, "remove conflicted with server state");
                ViewEvent::new(
                    View::Itinerary,
                    ViewState::Conflict,
                    format!("\"{}\" changed on the server; reload your itinerary.", name),
                )
            }
            MutationOutcome::Rejected { reason } => {
                warn!(attraction = name, reason = %reason, "remove rejected by server");
                ViewEvent::new(
                    View::Itinerary,
                    ViewState::Rejected,
                    format!("Failed to remove: {}", reason),
                )
            }
            MutationOutcome::TransportFailed { cause } => {
                error!(attraction = name, cause = %cause, "remove could not reach the backend");
                ViewEvent::new(
                    View::Itinerary,
                    ViewState::Failed,
                    format!(
                        "Failed to remove from itinerary. Please make sure the backend is running at {}",
                        self.transport.base_url()
                    ),
                )
            }
        };

        self.notifier.notify(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::{MockBackend, ServerMode};
    use crate::model::SearchResult;
    use crate::notifier::{RecordingNotifier, StaticGate};
    use serde_json::{json, Value};
    use tracing_test::traced_test;

    struct Fixture {
        server: Arc<MockBackend>,
        cache: Arc<ResultCache>,
        notifier: Arc<RecordingNotifier>,
        engine: ItinerarySyncEngine,
    }

    fn fixture(search: &[&str]) -> Fixture {
        let server = Arc::new(MockBackend::new());
        let cache = Arc::new(ResultCache::new());
        let notifier = Arc::new(RecordingNotifier::new());
        cache.set_search_result(SearchResult::new(
            search.iter().map(|name| Attraction::new(*name)).collect(),
        ));
        let engine = ItinerarySyncEngine::new(
            server.clone(),
            cache.clone(),
            notifier.clone(),
            UserIdentity::new("traveller"),
        );
        Fixture {
            server,
            cache,
            notifier,
            engine,
        }
    }

    #[tokio::test]
    async fn test_add_confirms_and_refreshes_snapshot() {
        let f = fixture(&["City Museum", "Night Market"]);

        let outcome = f.engine.add("City Museum").await.unwrap();

        assert_eq!(outcome, MutationOutcome::Confirmed { count: Some(1) });
        assert!(f.cache.itinerary_snapshot().contains("City Museum"));
        assert_eq!(
            f.engine.last_mutation().unwrap().state(),
            MutationState::Confirmed
        );
        assert!(!f.engine.is_in_flight("City Museum"));

        // full record and identity go out on the add
        let requests = f.server.requests().await;
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(
            requests[0].body,
            Some(json!({
                "user_id": "traveller",
                "attraction": {
                    "name": "City Museum",
                    "description": "",
                    "address": "",
                    "opening-hours": "",
                    "ticket_price": "",
                    "website_url": ""
                }
            }))
        );
        // followed by a full reload
        assert_eq!(requests[1].method, Method::Get);

        let events = f.notifier.events();
        assert_eq!(events[0].view, View::Search);
        assert_eq!(events[0].state, ViewState::Confirmed);
        assert_eq!(
            events[0].message,
            "Added \"City Museum\" to your itinerary! You now have 1 attractions saved."
        );
        assert_eq!(events[1].view, View::Itinerary);
        assert_eq!(events[1].state, ViewState::Populated);
    }

    #[tokio::test]
    async fn test_same_add_twice_is_confirmed_then_conflict() {
        let f = fixture(&["City Museum"]);

        let first = f.engine.add("City Museum").await.unwrap();
        let second = f.engine.add("City Museum").await.unwrap();

        assert!(matches!(first, MutationOutcome::Confirmed { .. }));
        assert_eq!(second, MutationOutcome::Conflict);
        assert_eq!(f.server.itinerary("traveller").len(), 1);
        assert_eq!(
            f.engine.last_mutation().unwrap().state(),
            MutationState::Conflict
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_conflict_is_not_logged_as_error() {
        let f = fixture(&["City Museum"]);
        f.server.seed_itinerary("traveller", vec![Attraction::new("City Museum")]);
        let before = f.cache.stats().itinerary_replacements;

        let outcome = f.engine.add("City Museum").await.unwrap();

        assert_eq!(outcome, MutationOutcome::Conflict);
        let last = f.notifier.last().unwrap();
        assert_eq!(last.state, ViewState::Conflict);
        assert!(last.message.contains("City Museum"));
        // no refresh after a conflict
        assert_eq!(f.cache.stats().itinerary_replacements, before);

        assert!(logs_contain("already in itinerary"));
        assert!(!logs_contain("ERROR"));
        assert!(!logs_contain("WARN"));
    }

    #[tokio::test]
    async fn test_add_unknown_name_sends_nothing() {
        let f = fixture(&["City Museum"]);

        let err = tokio_test::assert_err!(f.engine.add("Space Needle").await);

        assert_eq!(err, SyncError::NotFound("Space Needle".to_string()));
        assert_eq!(f.server.request_count(), 0);
        assert_eq!(f.notifier.last().unwrap().message, "Attraction not found!");
    }

    #[tokio::test]
    async fn test_add_ambiguous_name_sends_nothing() {
        let f = fixture(&["Harbour", "Harbour", "Old Town"]);

        let res = f.engine.add("Harbour").await;

        assert_eq!(
            res,
            Err(SyncError::AmbiguousReference {
                name: "Harbour".to_string(),
                matches: 2
            })
        );
        assert_eq!(f.server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_add_rejected_surfaces_server_reason() {
        let f = fixture(&["City Museum"]);
        f.server
            .force_response(
                Method::Post,
                400,
                json!({ "success": false, "message": "Attraction payload incomplete" }),
            )
            .await;

        let outcome = tokio_test::assert_ok!(f.engine.add("City Museum").await);

        assert_eq!(
            outcome,
            MutationOutcome::Rejected {
                reason: "Attraction payload incomplete".to_string()
            }
        );
        assert_eq!(
            f.notifier.last().unwrap().message,
            "Failed to add: Attraction payload incomplete"
        );
        assert!(f.server.itinerary("traveller").is_empty());
    }

    #[tokio::test]
    async fn test_add_during_outage_leaves_snapshot_alone() {
        let f = fixture(&["City Museum", "Zoo"]);
        f.engine.add("Zoo").await.unwrap();
        let snapshot = f.cache.itinerary_snapshot();

        f.server.set_mode(ServerMode::CompleteOutage);
        let outcome = f.engine.add("City Museum").await.unwrap();

        assert!(matches!(outcome, MutationOutcome::TransportFailed { .. }));
        assert_eq!(f.cache.itinerary_snapshot(), snapshot);
        let last = f.notifier.last().unwrap();
        assert_eq!(last.state, ViewState::Failed);
        assert!(last.message.contains("backend is running"));
    }

    #[tokio::test]
    async fn test_remove_reloads_snapshot_from_server() {
        let f = fixture(&[]);
        f.server.seed_itinerary(
            "traveller",
            vec![Attraction::new("City Museum"), Attraction::new("Zoo")],
        );
        f.engine.refresh().await.unwrap();
        assert_eq!(f.cache.itinerary_snapshot().len(), 2);

        let outcome = f.engine.remove("City Museum").await.unwrap();

        assert_eq!(outcome, MutationOutcome::Confirmed { count: Some(1) });
        let snapshot = f.cache.itinerary_snapshot();
        assert!(!snapshot.contains("City Museum"));
        assert!(snapshot.contains("Zoo"));

        let requests = f.server.requests().await;
        let delete = &requests[requests.len() - 2];
        assert_eq!(delete.method, Method::Delete);
        assert_eq!(
            delete.body,
            Some(json!({ "user_id": "traveller", "attraction_name": "City Museum" }))
        );
        assert_eq!(requests[requests.len() - 1].method, Method::Get);

        let last = f.notifier.last().unwrap();
        assert_eq!(last.view, View::Itinerary);
        assert_eq!(last.message, "Removed \"City Museum\" from your itinerary");
    }

    #[tokio::test]
    async fn test_remove_rejected_keeps_snapshot() {
        let f = fixture(&[]);
        f.server.seed_itinerary("traveller", vec![Attraction::new("Zoo")]);
        f.engine.refresh().await.unwrap();

        let outcome = f.engine.remove("Aquarium").await.unwrap();

        assert_eq!(
            outcome,
            MutationOutcome::Rejected {
                reason: "Attraction not found in itinerary".to_string()
            }
        );
        assert!(f.cache.itinerary_snapshot().contains("Zoo"));
        assert_eq!(
            f.notifier.last().unwrap().message,
            "Failed to remove: Attraction not found in itinerary"
        );
    }

    #[tokio::test]
    async fn test_remove_without_confirmation_never_sends() {
        let f = fixture(&[]);
        f.server.seed_itinerary("traveller", vec![Attraction::new("City Museum")]);

        let res = f
            .engine
            .remove_with_confirmation(&StaticGate(false), "City Museum")
            .await
            .unwrap();

        assert_eq!(res, None);
        assert_eq!(f.server.request_count(), 0);
        assert!(f.engine.last_mutation().is_none());
        assert_eq!(f.server.itinerary("traveller").len(), 1);

        let res = f
            .engine
            .remove_with_confirmation(&StaticGate(true), "City Museum")
            .await
            .unwrap();
        assert!(matches!(res, Some(MutationOutcome::Confirmed { .. })));
        assert!(f.server.itinerary("traveller").is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_snapshot() {
        let f = fixture(&[]);
        f.server.seed_itinerary("traveller", vec![Attraction::new("Zoo")]);
        f.engine.refresh().await.unwrap();

        f.server.fail_next_requests(1);
        let res = f.engine.refresh().await;
        assert_eq!(
            res,
            Err(RefreshError::ApplicationFailure(
                "Internal Server Error".to_string()
            ))
        );

        f.server.set_mode(ServerMode::CompleteOutage);
        assert!(matches!(
            f.engine.refresh().await,
            Err(RefreshError::Transport(_))
        ));

        assert!(f.cache.itinerary_snapshot().contains("Zoo"));
        assert_eq!(f.notifier.last().unwrap().state, ViewState::Failed);
    }

    #[tokio::test]
    async fn test_same_name_mutation_is_refused_while_in_flight() {
        let f = fixture(&["City Museum"]);
        f.server.set_delay(50);

        let (first, second) = tokio::join!(f.engine.add("City Museum"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            f.engine.remove("City Museum").await
        });

        assert!(matches!(first, Ok(MutationOutcome::Confirmed { .. })));
        assert_eq!(
            second,
            Err(SyncError::MutationInFlight("City Museum".to_string()))
        );
        assert!(!f.engine.is_in_flight("City Museum"));

        let refused = f
            .notifier
            .events_for(View::Itinerary)
            .into_iter()
            .find(|e| e.state == ViewState::Rejected)
            .unwrap();
        assert_eq!(
            refused.message,
            "A change to \"City Museum\" is already in progress"
        );
    }

    #[tokio::test]
    async fn test_overlapping_add_is_surfaced_on_search_view() {
        let f = fixture(&["Zoo"]);
        f.server.set_delay(50);

        let (first, second) = tokio::join!(f.engine.add("Zoo"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            f.engine.add("Zoo").await
        });

        assert!(matches!(first, Ok(MutationOutcome::Confirmed { .. })));
        assert_eq!(second, Err(SyncError::MutationInFlight("Zoo".to_string())));
        assert_eq!(f.server.itinerary("traveller").len(), 1);

        let search = f.notifier.events_for(View::Search);
        assert_eq!(search[0].state, ViewState::Rejected);
        assert!(search[0].message.contains("already in progress"));
    }

    #[tokio::test]
    async fn test_conflict_status_without_body_is_conflict() {
        let f = fixture(&["City Museum"]);
        f.server.force_response(Method::Post, 409, Value::Null).await;

        let outcome = f.engine.add("City Museum").await.unwrap();

        assert_eq!(outcome, MutationOutcome::Conflict);
        assert_eq!(f.notifier.last().unwrap().state, ViewState::Conflict);
    }

    #[tokio::test]
    async fn test_remove_conflict_skips_reload() {
        let f = fixture(&[]);
        f.server.seed_itinerary("traveller", vec![Attraction::new("Zoo")]);
        f.engine.refresh().await.unwrap();
        let before = f.cache.stats().itinerary_replacements;
        f.server.force_response(Method::Delete, 409, Value::Null).await;

        let outcome = f.engine.remove("Zoo").await.unwrap();

        assert_eq!(outcome, MutationOutcome::Conflict);
        assert_eq!(f.cache.stats().itinerary_replacements, before);
        let last = f.notifier.last().unwrap();
        assert_eq!(last.view, View::Itinerary);
        assert_eq!(last.state, ViewState::Conflict);
    }

    #[tokio::test]
    async fn test_remove_during_outage_leaves_snapshot_alone() {
        let f = fixture(&[]);
        f.server.seed_itinerary(
            "traveller",
            vec![Attraction::new("City Museum"), Attraction::new("Zoo")],
        );
        f.engine.refresh().await.unwrap();
        let snapshot = f.cache.itinerary_snapshot();

        f.server.set_mode(ServerMode::CompleteOutage);
        let outcome = f.engine.remove("Zoo").await.unwrap();

        assert!(matches!(outcome, MutationOutcome::TransportFailed { .. }));
        assert_eq!(f.cache.itinerary_snapshot(), snapshot);
        assert_eq!(
            f.engine.last_mutation().unwrap().state(),
            MutationState::TransportFailed
        );

        let last = f.notifier.last().unwrap();
        assert_eq!(last.view, View::Itinerary);
        assert_eq!(last.state, ViewState::Failed);
        assert!(last.message.contains("backend is running at http://mock.backend"));
    }

    #[tokio::test]
    async fn test_remove_stays_confirmed_when_reload_fails() {
        let f = fixture(&[]);
        f.server.seed_itinerary(
            "traveller",
            vec![Attraction::new("City Museum"), Attraction::new("Zoo")],
        );
        f.engine.refresh().await.unwrap();
        let snapshot = f.cache.itinerary_snapshot();
        f.notifier.clear();

        // the delete goes through, the reload after it does not
        f.server
            .force_response(
                Method::Get,
                500,
                json!({ "success": false, "error": "Internal Server Error" }),
            )
            .await;

        let outcome = f.engine.remove("Zoo").await.unwrap();

        assert_eq!(outcome, MutationOutcome::Confirmed { count: None });
        assert_eq!(f.server.itinerary("traveller").len(), 1);
        assert_eq!(f.cache.itinerary_snapshot(), snapshot);

        let states: Vec<_> = f
            .notifier
            .events_for(View::Itinerary)
            .iter()
            .map(|e| e.state)
            .collect();
        assert_eq!(states, vec![ViewState::Failed, ViewState::Confirmed]);
    }

    #[test]
    fn test_mutation_state_machine() {
        let mut mutation = Mutation::new(MutationKind::Add, "Zoo");
        assert_eq!(mutation.state(), MutationState::Idle);

        // cannot jump straight to a terminal state
        mutation.finish(&MutationOutcome::Conflict);
        assert_eq!(mutation.state(), MutationState::Idle);

        mutation.start();
        assert_eq!(mutation.state(), MutationState::InFlight);
        assert!(!mutation.state().is_terminal());

        mutation.finish(&MutationOutcome::Rejected {
            reason: "nope".to_string(),
        });
        assert_eq!(mutation.state(), MutationState::Rejected);
        assert!(mutation.state().is_terminal());

        // terminal states are final
        mutation.finish(&MutationOutcome::Confirmed { count: None });
        mutation.start();
        assert_eq!(mutation.state(), MutationState::Rejected);
    }
}
