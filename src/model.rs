// Domain records shared by the query and itinerary engines, plus the JSON
// envelopes exchanged with the attractions backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// A single point of interest as returned by the search service.
// Records are never edited locally; they are stored and sent back whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attraction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "opening-hours", default)]
    pub opening_hours: String,
    #[serde(default)]
    pub ticket_price: String,
    #[serde(default)]
    pub website_url: String,

    // Fields the backend sends that we don't model. Kept so an add request
    // carries exactly the record the search returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attraction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_free(&self) -> bool {
        self.ticket_price.to_lowercase().contains("free")
    }
}

/// Result of looking an attraction up by name.
///
/// The backend treats `name` as unique, but nothing on the client enforces it,
/// so a lookup can see more than one record.
#[derive(Debug, Clone, PartialEq)]
pub enum NameLookup {
    Missing,
    Unique(Attraction),
    Ambiguous(usize),
}

fn lookup(items: &[Attraction], name: &str) -> NameLookup {
    let mut matches = items.iter().filter(|a| a.name == name);
    match (matches.next(), matches.count()) {
        (None, _) => NameLookup::Missing,
        (Some(found), 0) => NameLookup::Unique(found.clone()),
        (Some(_), rest) => NameLookup::Ambiguous(rest + 1),
    }
}

// Attractions produced by one search, in response order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult(Vec<Attraction>);

impl SearchResult {
    pub fn new(attractions: Vec<Attraction>) -> Self {
        Self(attractions)
    }

    pub fn attractions(&self) -> &[Attraction] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find(&self, name: &str) -> NameLookup {
        lookup(&self.0, name)
    }
}

// Server-held itinerary for one user as of the last successful sync
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItinerarySnapshot(Vec<Attraction>);

impl ItinerarySnapshot {
    pub fn new(items: Vec<Attraction>) -> Self {
        Self(items)
    }

    pub fn items(&self) -> &[Attraction] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|a| a.name == name)
    }

    pub fn find(&self, name: &str) -> NameLookup {
        lookup(&self.0, name)
    }
}

// Opaque itinerary owner id. Authentication is handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserIdentity {
    fn default() -> Self {
        Self("default_user".to_string())
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Request bodies

#[derive(Debug, Serialize)]
pub struct SearchRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AddRequest<'a> {
    pub user_id: &'a UserIdentity,
    pub attraction: &'a Attraction,
}

#[derive(Debug, Serialize)]
pub struct RemoveRequest<'a> {
    pub user_id: &'a UserIdentity,
    pub attraction_name: &'a str,
}

// Every endpoint answers with the same envelope; which of the optional
// fields are present depends on the endpoint and outcome.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attractions: Option<Vec<Attraction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<Vec<Attraction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    // Server-supplied failure text, preferring `message` over `error`
    pub fn failure_reason(&self) -> String {
        let present = |reason: &Option<String>| {
            reason
                .as_deref()
                .filter(|reason| !reason.trim().is_empty())
                .map(str::to_string)
        };

        present(&self.message)
            .or_else(|| present(&self.error))
            .unwrap_or_else(|| "unknown error".to_string())
    }
}
