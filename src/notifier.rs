// Capability interfaces towards the presentation layer. The engines only
// emit events and ask yes/no questions; rendering lives outside the crate.

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::model::Attraction;

// Which of the two independently rendered views an event targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Search,
    Itinerary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    Populated,
    Empty,
    Failed,
    Confirmed,
    Conflict,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewEvent {
    pub view: View,
    pub state: ViewState,
    pub message: String,
    pub attractions: Vec<Attraction>,
    pub count: Option<usize>,
}

impl ViewEvent {
    pub fn new(view: View, state: ViewState, message: impl Into<String>) -> Self {
        Self {
            view,
            state,
            message: message.into(),
            attractions: Vec::new(),
            count: None,
        }
    }

    pub fn with_attractions(mut self, attractions: Vec<Attraction>) -> Self {
        self.attractions = attractions;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

pub trait ViewNotifier: Send + Sync {
    fn notify(&self, event: ViewEvent);
}

// Blocking yes/no gate shown before a destructive action
pub trait ConfirmationGate: Send + Sync {
    fn request_removal_confirmation(&self, attraction_name: &str) -> bool;
}

pub fn removal_prompt(attraction_name: &str) -> String {
    format!("Remove \"{}\" from your itinerary?", attraction_name)
}

/// Writes every event to the log. Useful for headless sessions.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl ViewNotifier for TracingNotifier {
    fn notify(&self, event: ViewEvent) {
        match event.state {
            ViewState::Failed | ViewState::Rejected => {
                warn!(view = ?event.view, state = ?event.state, "{}", event.message)
            }
            _ => info!(
                view = ?event.view,
                state = ?event.state,
                items = event.attractions.len(),
                "{}",
                event.message
            ),
        }
    }
}

/// Keeps every event in order of arrival.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, view: View) -> Vec<ViewEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.view == view)
            .cloned()
            .collect()
    }

    pub fn states(&self) -> Vec<ViewState> {
        self.events.lock().iter().map(|e| e.state).collect()
    }

    pub fn last(&self) -> Option<ViewEvent> {
        self.events.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ViewNotifier for RecordingNotifier {
    fn notify(&self, event: ViewEvent) {
        self.events.lock().push(event);
    }
}

// Fixed answer, for scripted sessions
#[derive(Debug, Clone, Copy)]
pub struct StaticGate(pub bool);

impl ConfirmationGate for StaticGate {
    fn request_removal_confirmation(&self, _attraction_name: &str) -> bool {
        self.0
    }
}
