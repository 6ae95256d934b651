// In-memory stand-in for the attractions backend, for tests and demos.
// Speaks the same JSON contract as the real service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::model::{ApiResponse, Attraction};
use crate::transport::{
    Method, Request, Response, Transport, TransportError, ITINERARY_PATH, SEARCH_PATH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Normal,
    // Connections are refused
    CompleteOutage,
    // Responses arrive but are not JSON
    Garbled,
}

pub struct MockBackend {
    base_url: String,
    mode: AtomicU8,
    request_count: AtomicUsize,
    delay_ms: AtomicUsize,
    fail_next_requests: AtomicUsize,
    search_responses: Mutex<HashMap<String, Vec<Attraction>>>,
    search_failures: Mutex<HashMap<String, String>>,
    forced_responses: Mutex<Vec<(Method, Response)>>,
    itineraries: DashMap<String, Vec<Attraction>>,
    requests: Mutex<Vec<Request>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            base_url: "http://mock.backend".to_string(),
            mode: AtomicU8::new(0),
            request_count: AtomicUsize::new(0),
            delay_ms: AtomicUsize::new(0),
            fail_next_requests: AtomicUsize::new(0),
            search_responses: Mutex::new(HashMap::new()),
            search_failures: Mutex::new(HashMap::new()),
            forced_responses: Mutex::new(Vec::new()),
            itineraries: DashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: ServerMode) {
        let mode_value = match mode {
            ServerMode::Normal => 0,
            ServerMode::CompleteOutage => 1,
            ServerMode::Garbled => 2,
        };
        self.mode.store(mode_value, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay_ms: usize) {
        self.delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    // Next `count` requests answer 500 with an error envelope
    pub fn fail_next_requests(&self, count: usize) {
        self.fail_next_requests.store(count, Ordering::SeqCst);
    }

    pub async fn add_search_response(&self, message: &str, attractions: Vec<Attraction>) {
        let mut responses = self.search_responses.lock().await;
        responses.insert(message.to_string(), attractions);
    }

    pub async fn add_search_failure(&self, message: &str, error: &str) {
        let mut failures = self.search_failures.lock().await;
        failures.insert(message.to_string(), error.to_string());
    }

    // Queue a canned response for the next request with the given method
    pub async fn force_response(&self, method: Method, status: u16, body: Value) {
        let mut forced = self.forced_responses.lock().await;
        forced.push((method, Response { status, body }));
    }

    pub fn seed_itinerary(&self, user_id: &str, items: Vec<Attraction>) {
        self.itineraries.insert(user_id.to_string(), items);
    }

    pub fn itinerary(&self, user_id: &str) -> Vec<Attraction> {
        self.itineraries
            .get(user_id)
            .map(|items| items.value().clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.requests.lock().await.clone()
    }

    fn reply(status: u16, response: ApiResponse) -> Response {
        Response {
            status,
            body: serde_json::to_value(response).unwrap_or(Value::Null),
        }
    }

    fn failure(status: u16, error: &str) -> Response {
        Self::reply(
            status,
            ApiResponse {
                error: Some(error.to_string()),
                ..Default::default()
            },
        )
    }

    async fn handle_search(&self, body: &Value) -> Response {
        let message = match body.get("message").and_then(Value::as_str) {
            Some(message) if !message.trim().is_empty() => message,
            _ => return Self::failure(400, "Message is required"),
        };

        if let Some(error) = self.search_failures.lock().await.get(message) {
            return Self::failure(500, error);
        }

        let attractions = self
            .search_responses
            .lock()
            .await
            .get(message)
            .cloned()
            .unwrap_or_default();

        Self::reply(
            200,
            ApiResponse {
                success: true,
                count: Some(attractions.len()),
                attractions: Some(attractions),
                ..Default::default()
            },
        )
    }

    fn handle_list(&self, request: &Request) -> Response {
        let user_id = request
            .query
            .iter()
            .find(|(k, _)| k == "user_id")
            .map(|(_, v)| v.as_str());

        match user_id {
            Some(user_id) => Self::reply(
                200,
                ApiResponse {
                    success: true,
                    itinerary: Some(self.itinerary(user_id)),
                    ..Default::default()
                },
            ),
            None => Self::failure(400, "user_id is required"),
        }
    }

    fn handle_add(&self, body: &Value) -> Response {
        let user_id = body.get("user_id").and_then(Value::as_str);
        let attraction = body
            .get("attraction")
            .cloned()
            .and_then(|a| serde_json::from_value::<Attraction>(a).ok());

        let (user_id, attraction) = match (user_id, attraction) {
            (Some(user_id), Some(attraction)) => (user_id, attraction),
            _ => return Self::failure(400, "user_id and attraction are required"),
        };

        let mut items = self.itineraries.entry(user_id.to_string()).or_default();
        if items.iter().any(|a| a.name == attraction.name) {
            return Self::reply(
                409,
                ApiResponse {
                    message: Some("Attraction already in itinerary".to_string()),
                    ..Default::default()
                },
            );
        }

        items.push(attraction);
        Self::reply(
            201,
            ApiResponse {
                success: true,
                count: Some(items.len()),
                message: Some("Attraction added to itinerary".to_string()),
                ..Default::default()
            },
        )
    }

    fn handle_remove(&self, body: &Value) -> Response {
        let user_id = body.get("user_id").and_then(Value::as_str);
        let name = body.get("attraction_name").and_then(Value::as_str);

        let (user_id, name) = match (user_id, name) {
            (Some(user_id), Some(name)) => (user_id, name),
            _ => return Self::failure(400, "user_id and attraction_name are required"),
        };

        let removed = match self.itineraries.get_mut(user_id) {
            Some(mut items) => {
                let before = items.len();
                items.retain(|a| a.name != name);
                before - items.len()
            }
            None => 0,
        };

        if removed == 0 {
            Self::failure(404, "Attraction not found in itinerary")
        } else {
            Self::reply(
                200,
                ApiResponse {
                    success: true,
                    ..Default::default()
                },
            )
        }
    }
}

#[async_trait]
impl Transport for MockBackend {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        match self.mode.load(Ordering::SeqCst) {
            1 => {
                return Err(TransportError::Unreachable(
                    "connection refused".to_string(),
                ))
            }
            2 => {
                return Err(TransportError::InvalidResponse {
                    status: 502,
                    reason: "expected value at line 1 column 1".to_string(),
                })
            }
            _ => {}
        }

        {
            let mut forced = self.forced_responses.lock().await;
            if let Some(pos) = forced.iter().position(|(m, _)| *m == request.method) {
                return Ok(forced.remove(pos).1);
            }
        }

        let fail_count = self.fail_next_requests.load(Ordering::SeqCst);
        if fail_count > 0 {
            self.fail_next_requests
                .store(fail_count - 1, Ordering::SeqCst);
            return Ok(Self::failure(500, "Internal Server Error"));
        }

        let body = request.body.clone().unwrap_or_else(|| json!({}));
        let response = match (request.method, request.path.as_str()) {
            (Method::Post, SEARCH_PATH) => self.handle_search(&body).await,
            (Method::Get, ITINERARY_PATH) => self.handle_list(&request),
            (Method::Post, ITINERARY_PATH) => self.handle_add(&body),
            (Method::Delete, ITINERARY_PATH) => self.handle_remove(&body),
            _ => Self::failure(404, "Not found"),
        };

        Ok(response)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
