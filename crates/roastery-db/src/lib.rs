//! # roastery-db
//!
//! PostgreSQL database layer for roastery.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for coffees, flavors, and events
//! - The transactional recommend path (counter increment + event append)
//! - The lookup-or-create flavor resolver
//!
//! ## Example
//!
//! ```rust,ignore
//! use roastery_db::{CoffeeRepository, CreateCoffeeRequest, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/roastery").await?;
//!
//!     let coffee = db.coffees.insert(CreateCoffeeRequest {
//!         name: "Shipwreck Roast".to_string(),
//!         brand: "Buddy Brew".to_string(),
//!         description: None,
//!         flavors: vec!["chocolate".to_string(), "vanilla".to_string()],
//!     }).await?;
//!
//!     db.coffees.recommend(coffee.id).await?;
//!     Ok(())
//! }
//! ```
pub mod coffees;
pub mod events;
pub mod flavors;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use roastery_core::*;

// Re-export repository implementations
pub use coffees::PgCoffeeRepository;
pub use events::{append_event_tx, PgEventRepository};
pub use flavors::{resolve_flavors_tx, validate_flavor_name, PgFlavorRepository};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Coffee repository for CRUD and the recommend path.
    pub coffees: PgCoffeeRepository,
    /// Flavor repository for lookup and resolution.
    pub flavors: PgFlavorRepository,
    /// Event repository for the append-only activity log.
    pub events: PgEventRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            coffees: PgCoffeeRepository::new(pool.clone()),
            flavors: PgFlavorRepository::new(pool.clone()),
            events: PgEventRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            coffees: PgCoffeeRepository::new(self.pool.clone()),
            flavors: PgFlavorRepository::new(self.pool.clone()),
            events: PgEventRepository::new(self.pool.clone()),
        }
    }
}
