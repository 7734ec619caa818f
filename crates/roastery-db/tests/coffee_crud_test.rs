//! Integration tests for coffee CRUD operations.

use roastery_db::test_fixtures::{TestDataBuilder, TestDatabase};
use roastery_db::{
    CoffeeRepository, CreateCoffeeRequest, Error, EventRepository, ListCoffeesRequest,
    UpdateCoffeeRequest,
};

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_create_returns_saved_coffee_with_flavors() {
    let test_db = setup().await;

    let coffee = test_db
        .db
        .coffees
        .insert(CreateCoffeeRequest {
            name: "Shipwreck Roast".to_string(),
            brand: "Buddy Brew".to_string(),
            description: Some("dark and stormy".to_string()),
            flavors: names(&["chocolate", "vanilla"]),
        })
        .await
        .expect("Failed to create coffee");

    assert!(coffee.id >= 1);
    assert_eq!(coffee.name, "Shipwreck Roast");
    assert_eq!(coffee.brand, "Buddy Brew");
    assert_eq!(coffee.description.as_deref(), Some("dark and stormy"));
    assert_eq!(coffee.recommendations, 0);
    assert_eq!(coffee.flavors.len(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_fetch_missing_coffee_is_not_found() {
    let test_db = setup().await;

    let err = test_db.db.coffees.fetch(99).await.unwrap_err();
    assert!(matches!(err, Error::CoffeeNotFound(99)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_list_paginates_in_id_order() {
    let test_db = setup().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_coffee("Roast A", &["chocolate"])
        .await
        .with_coffee("Roast B", &[])
        .await
        .with_coffee("Roast C", &["vanilla", "caramel"])
        .await
        .build();

    // Without limit/offset the full set comes back from offset 0
    let all = test_db
        .db
        .coffees
        .list(ListCoffeesRequest::default())
        .await
        .expect("Failed to list coffees");
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, data.coffees[0]);
    assert_eq!(all[0].flavors.len(), 1);
    assert_eq!(all[1].flavors.len(), 0);
    assert_eq!(all[2].flavors.len(), 2);

    let page = test_db
        .db
        .coffees
        .list(ListCoffeesRequest {
            limit: Some(1),
            offset: Some(1),
        })
        .await
        .expect("Failed to list coffees");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, data.coffees[1]);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_list_rejects_invalid_pagination() {
    let test_db = setup().await;

    let err = test_db
        .db
        .coffees
        .list(ListCoffeesRequest {
            limit: Some(0),
            offset: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = test_db
        .db
        .coffees
        .list(ListCoffeesRequest {
            limit: None,
            offset: Some(-1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_update_merges_absent_fields() {
    let test_db = setup().await;
    let created = test_db
        .db
        .coffees
        .insert(CreateCoffeeRequest {
            name: "Shipwreck Roast".to_string(),
            brand: "Buddy Brew".to_string(),
            description: Some("dark and stormy".to_string()),
            flavors: names(&["chocolate"]),
        })
        .await
        .expect("Failed to create coffee");

    let updated = test_db
        .db
        .coffees
        .update(
            created.id,
            UpdateCoffeeRequest {
                name: Some("Shipwreck Decaf".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update coffee");

    // Only the provided field changed
    assert_eq!(updated.name, "Shipwreck Decaf");
    assert_eq!(updated.brand, "Buddy Brew");
    assert_eq!(updated.description.as_deref(), Some("dark and stormy"));
    assert_eq!(updated.flavors.len(), 1);
    assert!(updated.updated_at_utc > created.updated_at_utc);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_update_replaces_flavor_set_entirely() {
    let test_db = setup().await;
    let created = test_db
        .db
        .coffees
        .insert(CreateCoffeeRequest {
            name: "Shipwreck Roast".to_string(),
            brand: "Buddy Brew".to_string(),
            description: None,
            flavors: names(&["chocolate", "vanilla"]),
        })
        .await
        .expect("Failed to create coffee");

    let updated = test_db
        .db
        .coffees
        .update(
            created.id,
            UpdateCoffeeRequest {
                flavors: Some(names(&["mint"])),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update coffee");

    // Replaced, not merged
    assert_eq!(updated.flavors.len(), 1);
    assert_eq!(updated.flavors[0].name, "mint");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_update_with_empty_flavors_clears_associations() {
    let test_db = setup().await;
    let created = test_db
        .db
        .coffees
        .insert(CreateCoffeeRequest {
            name: "Shipwreck Roast".to_string(),
            brand: "Buddy Brew".to_string(),
            description: Some("dark and stormy".to_string()),
            flavors: names(&["chocolate", "vanilla"]),
        })
        .await
        .expect("Failed to create coffee");

    let updated = test_db
        .db
        .coffees
        .update(
            created.id,
            UpdateCoffeeRequest {
                flavors: Some(vec![]),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update coffee");

    assert!(updated.flavors.is_empty());
    // Unrelated fields untouched
    assert_eq!(updated.name, "Shipwreck Roast");
    assert_eq!(updated.description.as_deref(), Some("dark and stormy"));

    // The flavor rows themselves survive; only the associations are gone
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flavor")
        .fetch_one(&test_db.pool)
        .await
        .expect("Failed to count flavors");
    assert_eq!(remaining, 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_update_missing_coffee_is_not_found() {
    let test_db = setup().await;

    let err = test_db
        .db
        .coffees
        .update(
            5,
            UpdateCoffeeRequest {
                name: Some("Ghost Roast".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CoffeeNotFound(5)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_remove_returns_snapshot_and_leaves_events_readable() {
    let test_db = setup().await;
    let created = test_db
        .db
        .coffees
        .insert(CreateCoffeeRequest {
            name: "Shipwreck Roast".to_string(),
            brand: "Buddy Brew".to_string(),
            description: None,
            flavors: names(&["chocolate"]),
        })
        .await
        .expect("Failed to create coffee");

    test_db
        .db
        .coffees
        .recommend(created.id)
        .await
        .expect("Failed to recommend");

    let removed = test_db
        .db
        .coffees
        .remove(created.id)
        .await
        .expect("Failed to remove coffee");
    assert_eq!(removed.id, created.id);
    assert_eq!(removed.name, "Shipwreck Roast");
    assert_eq!(removed.recommendations, 1);
    assert_eq!(removed.flavors.len(), 1);

    let err = test_db.db.coffees.fetch(created.id).await.unwrap_err();
    assert!(matches!(err, Error::CoffeeNotFound(_)));

    // Events reference the coffee only by id in the payload; deletion
    // neither blocks on them nor cascades to them
    let events = test_db
        .db
        .events
        .find_for_coffee(created.id)
        .await
        .expect("Failed to list events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["coffeeId"], created.id);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server (DATABASE_URL)"]
async fn test_remove_missing_coffee_is_not_found() {
    let test_db = setup().await;

    let err = test_db.db.coffees.remove(12).await.unwrap_err();
    assert!(matches!(err, Error::CoffeeNotFound(12)));

    test_db.cleanup().await;
}
