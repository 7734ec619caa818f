//! Core data models for roastery.
//!
//! These types are shared across all roastery crates and represent
//! the catalog's domain entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// COFFEE TYPES
// =============================================================================

/// A catalog coffee with its flavor set attached.
///
/// Flavors are loaded eagerly with every coffee read; callers never have to
/// fetch the association separately.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Coffee {
    pub id: i64,
    pub name: String,
    pub brand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Times this coffee has been recommended. Non-negative; only ever
    /// incremented through the transactional recommend path.
    pub recommendations: i32,
    pub flavors: Vec<Flavor>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

// =============================================================================
// FLAVOR TYPES
// =============================================================================

/// A flavor tag shared across coffees, deduplicated by exact name.
///
/// At most one row exists per distinct name value; the resolver in
/// roastery-db guarantees a second row is never created for a name that
/// already exists.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Flavor {
    pub id: i64,
    pub name: String,
    pub created_at_utc: DateTime<Utc>,
}

// =============================================================================
// EVENT TYPES
// =============================================================================

/// Event name recorded when a coffee is recommended.
pub const EVENT_RECOMMEND_COFFEE: &str = "recommend_coffee";

/// Event type for coffee-scoped activity records.
pub const EVENT_TYPE_COFFEE: &str = "coffee";

/// An immutable activity-log record.
///
/// Events reference entities only by id inside `payload` (e.g.
/// `{"coffeeId": 7}`); there is no foreign key, so events survive deletion
/// of the entity they describe. Rows are append-only: never updated, never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Event {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: JsonValue,
    pub created_at_utc: DateTime<Utc>,
}
