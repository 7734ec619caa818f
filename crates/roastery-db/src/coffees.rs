//! Coffee repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};

use roastery_core::{
    Coffee, CoffeeRepository, CreateCoffeeRequest, Error, Flavor, ListCoffeesRequest, NewEvent,
    Result, UpdateCoffeeRequest,
};

use crate::events::append_event_tx;
use crate::flavors::resolve_flavors_tx;

/// PostgreSQL implementation of CoffeeRepository.
pub struct PgCoffeeRepository {
    pool: Pool<Postgres>,
}

impl PgCoffeeRepository {
    /// Create a new PgCoffeeRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn map_coffee_row(row: &PgRow, flavors: Vec<Flavor>) -> Coffee {
    Coffee {
        id: row.get("id"),
        name: row.get("name"),
        brand: row.get("brand"),
        description: row.get("description"),
        recommendations: row.get("recommendations"),
        flavors,
        created_at_utc: row.get("created_at_utc"),
        updated_at_utc: row.get("updated_at_utc"),
    }
}

#[async_trait]
impl CoffeeRepository for PgCoffeeRepository {
    async fn list(&self, req: ListCoffeesRequest) -> Result<Vec<Coffee>> {
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
        let rows = sqlx::query(
            "SELECT id, name, brand, description, recommendations, created_at_utc, updated_at_utc
             FROM coffee ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(req.limit)
        .bind(req.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let ids: Vec<i64> = rows.iter().map(|row| row.get("id")).collect();
        let mut flavors_by_coffee = self.flavors_for_coffees(&ids).await?;

        let coffees = rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                map_coffee_row(row, flavors_by_coffee.remove(&id).unwrap_or_default())
            })
            .collect();
        Ok(coffees)
    }

    async fn fetch(&self, id: i64) -> Result<Coffee> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let coffee = self.fetch_tx(&mut tx, id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(coffee)
    }

    async fn insert(&self, req: CreateCoffeeRequest) -> Result<Coffee> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let coffee = self.insert_tx(&mut tx, req).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(coffee)
    }

    async fn update(&self, id: i64, req: UpdateCoffeeRequest) -> Result<Coffee> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let coffee = self.update_tx(&mut tx, id, req).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(coffee)
    }

    async fn remove(&self, id: i64) -> Result<Coffee> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Snapshot before deleting; join rows cascade, events stay.
        let coffee = self.fetch_tx(&mut tx, id).await?;
        sqlx::query("DELETE FROM coffee WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(coffee)
    }

    async fn recommend(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Row lock so concurrent recommenders serialize on the counter.
        let row = sqlx::query("SELECT recommendations FROM coffee WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::CoffeeNotFound(id))?;
        let current: i32 = row.get("recommendations");

        sqlx::query("UPDATE coffee SET recommendations = $1, updated_at_utc = $2 WHERE id = $3")
            .bind(current + 1)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        append_event_tx(&mut tx, NewEvent::recommend(id)).await?;

        // Any failure above has already returned, dropping the uncommitted
        // transaction and rolling back both writes. The caller always sees
        // the error.
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}

// =============================================================================
// TRANSACTION-AWARE VARIANTS
// =============================================================================

/// Transaction-aware variants.
///
/// These methods accept an existing transaction, allowing the coffee row,
/// its flavor associations, and any event append to commit or roll back as
/// one unit.
impl PgCoffeeRepository {
    /// Fetch a coffee within an existing transaction.
    pub async fn fetch_tx(&self, tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Coffee> {
        let row = sqlx::query(
            "SELECT id, name, brand, description, recommendations, created_at_utc, updated_at_utc
             FROM coffee WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::CoffeeNotFound(id))?;

        let flavors = sqlx::query_as::<_, Flavor>(
            "SELECT f.id, f.name, f.created_at_utc
             FROM coffee_flavor cf
             JOIN flavor f ON f.id = cf.flavor_id
             WHERE cf.coffee_id = $1
             ORDER BY f.id",
        )
        .bind(id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(map_coffee_row(&row, flavors))
    }

    /// Insert a coffee within an existing transaction.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: CreateCoffeeRequest,
    ) -> Result<Coffee> {
        let now = Utc::now();

        let coffee_id: i64 = sqlx::query_scalar(
            "INSERT INTO coffee (name, brand, description, created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING id",
        )
        .bind(&req.name)
        .bind(&req.brand)
        .bind(&req.description)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let flavors = resolve_flavors_tx(tx, &req.flavors).await?;
        self.link_flavors_tx(tx, coffee_id, &flavors).await?;

        self.fetch_tx(tx, coffee_id).await
    }

    /// Merge-update a coffee within an existing transaction.
    ///
    /// Fields absent from the request are left unchanged. A `flavors` value
    /// replaces the association set entirely; an empty vector clears it.
    pub async fn update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        req: UpdateCoffeeRequest,
    ) -> Result<Coffee> {
        // Lock the row for the duration of the merge.
        sqlx::query("SELECT id FROM coffee WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::CoffeeNotFound(id))?;

        let mut updates: Vec<String> = vec!["updated_at_utc = $1".to_string()];
        let now = Utc::now();
        // $1 = now, $2 = id, then dynamic params start at $3
        let mut param_idx = 3;

        if req.name.is_some() {
            updates.push(format!("name = ${}", param_idx));
            param_idx += 1;
        }
        if req.brand.is_some() {
            updates.push(format!("brand = ${}", param_idx));
            param_idx += 1;
        }
        if req.description.is_some() {
            updates.push(format!("description = ${}", param_idx));
        }

        let query = format!("UPDATE coffee SET {} WHERE id = $2", updates.join(", "));

        let mut q = sqlx::query(&query).bind(now).bind(id);
        if let Some(name) = &req.name {
            q = q.bind(name);
        }
        if let Some(brand) = &req.brand {
            q = q.bind(brand);
        }
        if let Some(description) = &req.description {
            q = q.bind(description);
        }
        q.execute(&mut **tx).await.map_err(Error::Database)?;

        if let Some(names) = &req.flavors {
            sqlx::query("DELETE FROM coffee_flavor WHERE coffee_id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await
                .map_err(Error::Database)?;

            let flavors = resolve_flavors_tx(tx, names).await?;
            self.link_flavors_tx(tx, id, &flavors).await?;
        }

        self.fetch_tx(tx, id).await
    }

    /// Link resolved flavors to a coffee within an existing transaction.
    async fn link_flavors_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        coffee_id: i64,
        flavors: &[Flavor],
    ) -> Result<()> {
        for flavor in flavors {
            // Repeated names in one batch resolve to the same row; the
            // conflict clause keeps the second link attempt a no-op.
            sqlx::query(
                "INSERT INTO coffee_flavor (coffee_id, flavor_id) VALUES ($1, $2)
                 ON CONFLICT (coffee_id, flavor_id) DO NOTHING",
            )
            .bind(coffee_id)
            .bind(flavor.id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Batch-load flavor sets for a page of coffees.
    async fn flavors_for_coffees(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<Flavor>>> {
        let mut by_coffee: HashMap<i64, Vec<Flavor>> = HashMap::new();
        if ids.is_empty() {
            return Ok(by_coffee);
        }

        let rows = sqlx::query(
            "SELECT cf.coffee_id, f.id, f.name, f.created_at_utc
             FROM coffee_flavor cf
             JOIN flavor f ON f.id = cf.flavor_id
             WHERE cf.coffee_id = ANY($1)
             ORDER BY cf.coffee_id, f.id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        for row in rows {
            by_coffee
                .entry(row.get("coffee_id"))
                .or_default()
                .push(Flavor {
                    id: row.get("id"),
                    name: row.get("name"),
                    created_at_utc: row.get("created_at_utc"),
                });
        }
        Ok(by_coffee)
    }
}
