//! Core traits for roastery abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// COFFEE REPOSITORY TRAITS
// =============================================================================

/// Request for listing coffees.
#[derive(Debug, Clone, Default)]
pub struct ListCoffeesRequest {
    /// Maximum results; `None` returns the full set
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Request for creating a new coffee.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateCoffeeRequest {
    pub name: String,
    pub brand: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Flavor names to resolve and associate; existing names are reused,
    /// new names create flavor rows
    #[serde(default)]
    pub flavors: Vec<String>,
}

/// Request for updating a coffee.
///
/// Absent fields leave the stored value unchanged. `flavors`, when present,
/// replaces the association set entirely (it is not merged with the prior
/// set); an empty vector clears all associations.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateCoffeeRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub flavors: Option<Vec<String>>,
}

/// Repository for coffee CRUD operations and the recommend path.
#[async_trait]
pub trait CoffeeRepository: Send + Sync {
    /// List coffees with pagination, flavors attached.
    async fn list(&self, req: ListCoffeesRequest) -> Result<Vec<Coffee>>;

    /// Fetch a coffee by id, flavors attached.
    async fn fetch(&self, id: i64) -> Result<Coffee>;

    /// Insert a new coffee, resolving and linking its flavor names in the
    /// same transaction.
    async fn insert(&self, req: CreateCoffeeRequest) -> Result<Coffee>;

    /// Merge-update a coffee. The merge and any flavor replacement commit
    /// as one unit; a partial merge is never persisted.
    async fn update(&self, id: i64, req: UpdateCoffeeRequest) -> Result<Coffee>;

    /// Delete a coffee and return the removed snapshot.
    async fn remove(&self, id: i64) -> Result<Coffee>;

    /// Increment the recommendation counter and append a `recommend_coffee`
    /// event atomically: both persist or neither does.
    async fn recommend(&self, id: i64) -> Result<()>;
}

// =============================================================================
// FLAVOR REPOSITORY TRAITS
// =============================================================================

/// Repository for flavor lookup and resolution.
#[async_trait]
pub trait FlavorRepository: Send + Sync {
    /// List all flavors.
    async fn list(&self) -> Result<Vec<Flavor>>;

    /// Look up a flavor by exact name. No normalization is applied.
    async fn find_by_name(&self, name: &str) -> Result<Option<Flavor>>;

    /// Resolve a batch of names to flavors, creating rows for names not
    /// seen before.
    ///
    /// Order-preserving: output position i corresponds to `names[i]`.
    /// Repeated names within one batch resolve to the same flavor identity;
    /// a name that already exists never gains a second row.
    async fn resolve(&self, names: &[String]) -> Result<Vec<Flavor>>;
}

// =============================================================================
// EVENT REPOSITORY TRAITS
// =============================================================================

/// Request for listing events.
#[derive(Debug, Clone, Default)]
pub struct ListEventsRequest {
    /// Maximum results; `None` returns the full log
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// A not-yet-persisted activity-log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: JsonValue,
}

impl NewEvent {
    /// The event appended when a coffee is recommended.
    pub fn recommend(coffee_id: i64) -> Self {
        Self {
            name: EVENT_RECOMMEND_COFFEE.to_string(),
            event_type: EVENT_TYPE_COFFEE.to_string(),
            payload: json!({ "coffeeId": coffee_id }),
        }
    }
}

/// Repository for the append-only event log.
///
/// Events are immutable: this interface deliberately has no update or
/// delete operations.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an event to the log.
    async fn append(&self, event: NewEvent) -> Result<Event>;

    /// List events, newest first.
    async fn list(&self, req: ListEventsRequest) -> Result<Vec<Event>>;

    /// List events whose payload references the given coffee id, oldest
    /// first.
    async fn find_for_coffee(&self, coffee_id: i64) -> Result<Vec<Event>>;
}
