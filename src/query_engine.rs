// Query engine: free text in, classified attraction search out.
//
// The text is forwarded verbatim (after trimming); interpreting it is the
// search service's job. Every non-blank query produces exactly one `Loading`
// event followed by exactly one terminal event on the search view.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::model::{ApiResponse, SearchRequest, SearchResult};
use crate::notifier::{View, ViewEvent, ViewNotifier, ViewState};
use crate::result_cache::ResultCache;
use crate::transport::{Method, Request, Transport, TransportError, SEARCH_PATH};

pub const LOADING_MESSAGE: &str = "Let me find some great attractions for you...";
pub const NO_RESULTS_MESSAGE: &str =
    "Sorry, I couldn't find any attractions matching your request. Try asking differently!";

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Populated(SearchResult, usize),
    Empty,
    Failed(String),
    // Blank input: nothing was sent and nothing was notified
    Ignored,
}

pub fn connectivity_message(base_url: &str) -> String {
    format!(
        "Sorry, I'm having trouble connecting to the server. Please make sure the backend is running at {}",
        base_url
    )
}

pub struct QueryEngine {
    transport: Arc<dyn Transport>,
    cache: Arc<ResultCache>,
    notifier: Arc<dyn ViewNotifier>,
}

impl QueryEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<ResultCache>,
        notifier: Arc<dyn ViewNotifier>,
    ) -> Self {
        Self {
            transport,
            cache,
            notifier,
        }
    }

    pub async fn run_query(&self, free_text: &str) -> QueryOutcome {
        let message = free_text.trim();
        if message.is_empty() {
            return QueryOutcome::Ignored;
        }

        debug!(query = message, "running attraction query");
        self.notifier
            .notify(ViewEvent::new(View::Search, ViewState::Loading, LOADING_MESSAGE));

        let outcome = match self.fetch(message).await {
            Ok(response) => self.apply(response),
            Err(e) => {
                error!(error = %e, "attraction search could not reach the backend");
                QueryOutcome::Failed(connectivity_message(self.transport.base_url()))
            }
        };

        self.notifier.notify(Self::terminal_event(&outcome));
        outcome
    }

    async fn fetch(&self, message: &str) -> Result<ApiResponse, TransportError> {
        let request = Request::new(Method::Post, SEARCH_PATH).payload(&SearchRequest { message })?;
        let response = self.transport.send(request).await?;

        serde_json::from_value(response.body).map_err(|e| TransportError::InvalidResponse {
            status: response.status,
            reason: e.to_string(),
        })
    }

    // Only a successful round trip touches the cache
    fn apply(&self, response: ApiResponse) -> QueryOutcome {
        if !response.success {
            debug!(reason = %response.failure_reason(), "search service reported failure");
            return QueryOutcome::Empty;
        }

        let attractions = response.attractions.unwrap_or_default();
        let result = SearchResult::new(attractions);
        self.cache.set_search_result(result.clone());

        if result.is_empty() {
            debug!("search returned no attractions");
            return QueryOutcome::Empty;
        }

        let count = response.count.unwrap_or(result.len());
        info!(count, "search populated");
        QueryOutcome::Populated(result, count)
    }

    fn terminal_event(outcome: &QueryOutcome) -> ViewEvent {
        match outcome {
            QueryOutcome::Populated(result, count) => ViewEvent::new(
                View::Search,
                ViewState::Populated,
                format!("I found {} amazing attractions for you!", count),
            )
            .with_attractions(result.attractions().to_vec())
            .with_count(*count),
            QueryOutcome::Empty | QueryOutcome::Ignored => {
                ViewEvent::new(View::Search, ViewState::Empty, NO_RESULTS_MESSAGE).with_count(0)
            }
            QueryOutcome::Failed(reason) => {
                ViewEvent::new(View::Search, ViewState::Failed, reason.clone())
            }
        }
    }
}
