//! Event log repository implementation.
//!
//! The event table is append-only: rows are inserted and read, never
//! updated or deleted. There is no foreign key to coffee, so events remain
//! readable after the coffee they reference is removed.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Transaction};

use roastery_core::{Error, Event, EventRepository, ListEventsRequest, NewEvent, Result};

/// Append an event within an existing transaction.
///
/// The recommend path uses this so the append commits or rolls back
/// together with the counter mutation it records.
pub async fn append_event_tx(tx: &mut Transaction<'_, Postgres>, event: NewEvent) -> Result<Event> {
    let appended = sqlx::query_as::<_, Event>(
        "INSERT INTO event (name, type, payload, created_at_utc)
         VALUES ($1, $2, $3, $4)
         RETURNING id, name, type, payload, created_at_utc",
    )
    .bind(&event.name)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::Database)?;
    Ok(appended)
}

/// PostgreSQL implementation of EventRepository.
pub struct PgEventRepository {
    pool: Pool<Postgres>,
}

impl PgEventRepository {
    /// Create a new PgEventRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn append(&self, event: NewEvent) -> Result<Event> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let appended = append_event_tx(&mut tx, event).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(appended)
    }

    async fn list(&self, req: ListEventsRequest) -> Result<Vec<Event>> {
        if let Some(limit) = req.limit {
            if limit < 1 {
                return Err(Error::InvalidInput("limit must be at least 1".to_string()));
            }
        }
        if let Some(offset) = req.offset {
            if offset < 0 {
                return Err(Error::InvalidInput(
                    "offset must be non-negative".to_string(),
                ));
            }
        }

        // A null limit means no limit.
        let events = sqlx::query_as::<_, Event>(
            "SELECT id, name, type, payload, created_at_utc FROM event
             ORDER BY id DESC LIMIT $1 OFFSET $2",
        )
        .bind(req.limit)
        .bind(req.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(events)
    }

    async fn find_for_coffee(&self, coffee_id: i64) -> Result<Vec<Event>> {
        // Containment match against the payload, so the GIN index applies.
        let needle = serde_json::json!({ "coffeeId": coffee_id });
        let events = sqlx::query_as::<_, Event>(
            "SELECT id, name, type, payload, created_at_utc FROM event
             WHERE payload @> $1
             ORDER BY id",
        )
        .bind(needle)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(events)
    }
}
