//! Flavor repository and the lookup-or-create name resolver.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Transaction};

use roastery_core::{Error, Flavor, FlavorRepository, Result};

/// Validate a flavor name.
///
/// Names are compared exactly (case-sensitive, no trimming), so the only
/// rejected inputs are the empty string and names over 100 characters.
pub fn validate_flavor_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("Flavor name cannot be empty".to_string());
    }
    if name.len() > 100 {
        return Err("Flavor name must be 100 characters or less".to_string());
    }
    Ok(())
}

/// Reduce a name batch to its distinct names in first-occurrence order.
fn first_occurrence_order(names: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect()
}

/// Resolve a batch of flavor names within an existing transaction.
///
/// Returns one flavor per input name, in input order; repeated names map to
/// the same row. Existing rows are reused untouched and missing ones are
/// created. Check-and-create is a single upsert per distinct name, so two
/// writers racing on a new name converge on one row instead of failing.
pub async fn resolve_flavors_tx(
    tx: &mut Transaction<'_, Postgres>,
    names: &[String],
) -> Result<Vec<Flavor>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    for name in names {
        validate_flavor_name(name).map_err(Error::InvalidInput)?;
    }

    let now = Utc::now();
    let mut by_name: HashMap<&str, Flavor> = HashMap::new();

    for name in first_occurrence_order(names) {
        sqlx::query(
            "INSERT INTO flavor (name, created_at_utc) VALUES ($1, $2)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let flavor = sqlx::query_as::<_, Flavor>(
            "SELECT id, name, created_at_utc FROM flavor WHERE name = $1",
        )
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        by_name.insert(name, flavor);
    }

    Ok(names
        .iter()
        .map(|name| by_name[name.as_str()].clone())
        .collect())
}

/// PostgreSQL implementation of FlavorRepository.
pub struct PgFlavorRepository {
    pool: Pool<Postgres>,
}

impl PgFlavorRepository {
    /// Create a new PgFlavorRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlavorRepository for PgFlavorRepository {
    async fn list(&self) -> Result<Vec<Flavor>> {
        let flavors = sqlx::query_as::<_, Flavor>(
            "SELECT id, name, created_at_utc FROM flavor ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(flavors)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Flavor>> {
        let flavor = sqlx::query_as::<_, Flavor>(
            "SELECT id, name, created_at_utc FROM flavor WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(flavor)
    }

    async fn resolve(&self, names: &[String]) -> Result<Vec<Flavor>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let flavors = resolve_flavors_tx(&mut tx, names).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(flavors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_occurrence_order_empty() {
        assert!(first_occurrence_order(&[]).is_empty());
    }

    #[test]
    fn test_first_occurrence_order_preserves_input_order() {
        let input = names(&["vanilla", "chocolate", "mint"]);
        assert_eq!(
            first_occurrence_order(&input),
            vec!["vanilla", "chocolate", "mint"]
        );
    }

    #[test]
    fn test_first_occurrence_order_drops_repeats() {
        let input = names(&["chocolate", "vanilla", "chocolate", "chocolate", "vanilla"]);
        assert_eq!(first_occurrence_order(&input), vec!["chocolate", "vanilla"]);
    }

    #[test]
    fn test_first_occurrence_order_is_case_sensitive() {
        // Exact-match semantics: "Chocolate" and "chocolate" are distinct.
        let input = names(&["Chocolate", "chocolate"]);
        assert_eq!(
            first_occurrence_order(&input),
            vec!["Chocolate", "chocolate"]
        );
    }

    #[test]
    fn test_validate_flavor_name_rejects_empty() {
        assert!(validate_flavor_name("").is_err());
    }

    #[test]
    fn test_validate_flavor_name_rejects_overlong() {
        let name = "x".repeat(101);
        assert!(validate_flavor_name(&name).is_err());
    }

    #[test]
    fn test_validate_flavor_name_accepts_free_text() {
        // No normalization: interior whitespace and case are preserved.
        assert!(validate_flavor_name("toasted marshmallow").is_ok());
        assert!(validate_flavor_name("Chocolate").is_ok());
    }
}
