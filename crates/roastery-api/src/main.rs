//! roastery-api - HTTP API server for the roastery coffee catalog

use std::net::SocketAddr;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use roastery_core::{
    Coffee, CoffeeRepository, CreateCoffeeRequest, Event, EventRepository, Flavor,
    FlavorRepository, ListCoffeesRequest, ListEventsRequest, UpdateCoffeeRequest,
};
use roastery_db::{Database, PoolConfig};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically in logs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Featured brands served when `COFFEE_BRANDS` is unset.
const DEFAULT_BRANDS: &str = "buddy brew,nescafe";

/// Parse the featured brand list from a comma-separated string.
///
/// Entries are trimmed and empty entries dropped. A list with no usable
/// entries is a configuration error.
fn parse_brands(raw: &str) -> roastery_core::Result<Vec<String>> {
    let brands: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if brands.is_empty() {
        return Err(roastery_core::Error::Config(
            "COFFEE_BRANDS must name at least one brand".to_string(),
        ));
    }
    Ok(brands)
}

/// Parse allowed CORS origins from a comma-separated environment variable.
///
/// # Environment Variable
/// `ALLOWED_ORIGINS` - Comma-separated list of allowed origins
///
/// Defaults to `http://localhost:3000` when unset or empty.
fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str =
        std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

    if origins_str.trim().is_empty() {
        return vec![HeaderValue::from_static("http://localhost:3000")];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    db: Database,
    /// Featured brand names from `COFFEE_BRANDS`, served at `/api/v1/brands`.
    brands: Vec<String>,
}

/// OpenAPI documentation, served at `/api-docs/openapi.json`.
///
/// Swagger UI at `/docs` renders this generated document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Roastery API",
        version = "2026.8.1",
        description = "Coffee catalog with flavor resolution and recommendation events"
    ),
    paths(
        list_coffees,
        create_coffee,
        get_coffee,
        update_coffee,
        delete_coffee,
        recommend_coffee,
        list_flavors,
        list_events,
        list_brands
    ),
    components(schemas(Coffee, Flavor, Event, CreateCoffeeRequest, UpdateCoffeeRequest)),
    tags(
        (name = "Coffees", description = "Coffee CRUD and recommendations"),
        (name = "Flavors", description = "Flavor catalog"),
        (name = "Events", description = "Recommendation event log"),
        (name = "System", description = "Health and configuration")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "roastery_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "roastery_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("roastery-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/roastery".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|_| roastery_core::Error::Config("PORT must be a valid port number".to_string()))?;
    let brands = parse_brands(
        &std::env::var("COFFEE_BRANDS").unwrap_or_else(|_| DEFAULT_BRANDS.to_string()),
    )?;

    info!(brands = ?brands, "Featured brands configured");

    // Connect to database, honoring DATABASE_* pool tuning vars
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Create app state
    let state = AppState { db, brands };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // OpenAPI / Swagger UI
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Coffees CRUD
        .route("/api/v1/coffees", get(list_coffees).post(create_coffee))
        .route(
            "/api/v1/coffees/:id",
            get(get_coffee).patch(update_coffee).delete(delete_coffee),
        )
        .route("/api/v1/coffees/:id/recommend", post(recommend_coffee))
        // Flavors
        .route("/api/v1/flavors", get(list_flavors))
        // Events
        .route("/api/v1/events", get(list_events))
        // Brands
        .route("/api/v1/brands", get(list_brands))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer({
            let allowed_origins = parse_allowed_origins();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .max_age(std::time::Duration::from_secs(3600))
        })
        // Catalog payloads are small JSON bodies
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// COFFEE HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct PaginationQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// List coffees in the catalog.
///
/// Returns the full catalog when no pagination parameters are given.
#[utoipa::path(get, path = "/api/v1/coffees", tag = "Coffees",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum number of coffees to return"),
        ("offset" = Option<i64>, Query, description = "Number of coffees to skip")
    ),
    responses(
        (status = 200, description = "Coffees with their flavors", body = [Coffee]),
        (status = 400, description = "Invalid pagination parameters")
    )
)]
async fn list_coffees(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Vec<Coffee>>, ApiError> {
    let coffees = state
        .db
        .coffees
        .list(ListCoffeesRequest {
            limit: query.limit,
            offset: query.offset,
        })
        .await?;
    Ok(Json(coffees))
}

/// Create a coffee.
///
/// Flavor names are resolved against the flavor catalog: unknown names are
/// created, known names are reused.
#[utoipa::path(post, path = "/api/v1/coffees", tag = "Coffees",
    request_body = CreateCoffeeRequest,
    responses(
        (status = 201, description = "Coffee created", body = Coffee),
        (status = 400, description = "Validation failed")
    )
)]
async fn create_coffee(
    State(state): State<AppState>,
    Json(body): Json<CreateCoffeeRequest>,
) -> Result<(StatusCode, Json<Coffee>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    if body.brand.trim().is_empty() {
        return Err(ApiError::BadRequest("brand is required".into()));
    }

    let coffee = state.db.coffees.insert(body).await?;
    Ok((StatusCode::CREATED, Json(coffee)))
}

/// Fetch a single coffee by id.
#[utoipa::path(get, path = "/api/v1/coffees/{id}", tag = "Coffees",
    params(("id" = i64, Path, description = "Coffee id")),
    responses(
        (status = 200, description = "The coffee", body = Coffee),
        (status = 404, description = "Coffee not found")
    )
)]
async fn get_coffee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Coffee>, ApiError> {
    if id < 1 {
        return Err(ApiError::BadRequest("id must be >= 1".into()));
    }
    let coffee = state.db.coffees.fetch(id).await?;
    Ok(Json(coffee))
}

/// Update a coffee.
///
/// Absent fields keep their stored values. A `flavors` array replaces the
/// coffee's flavor set; an empty array clears it.
#[utoipa::path(patch, path = "/api/v1/coffees/{id}", tag = "Coffees",
    params(("id" = i64, Path, description = "Coffee id")),
    request_body = UpdateCoffeeRequest,
    responses(
        (status = 200, description = "Updated coffee", body = Coffee),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Coffee not found")
    )
)]
async fn update_coffee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCoffeeRequest>,
) -> Result<Json<Coffee>, ApiError> {
    if id < 1 {
        return Err(ApiError::BadRequest("id must be >= 1".into()));
    }
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("name cannot be empty".into()));
        }
    }
    if let Some(brand) = &body.brand {
        if brand.trim().is_empty() {
            return Err(ApiError::BadRequest("brand cannot be empty".into()));
        }
    }

    let coffee = state.db.coffees.update(id, body).await?;
    Ok(Json(coffee))
}

/// Delete a coffee.
///
/// Returns the removed coffee. Recommendation events are kept.
#[utoipa::path(delete, path = "/api/v1/coffees/{id}", tag = "Coffees",
    params(("id" = i64, Path, description = "Coffee id")),
    responses(
        (status = 200, description = "The removed coffee", body = Coffee),
        (status = 404, description = "Coffee not found")
    )
)]
async fn delete_coffee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Coffee>, ApiError> {
    if id < 1 {
        return Err(ApiError::BadRequest("id must be >= 1".into()));
    }
    let coffee = state.db.coffees.remove(id).await?;
    Ok(Json(coffee))
}

/// Recommend a coffee.
///
/// Increments the recommendation counter and appends a `recommend_coffee`
/// event in the same transaction.
#[utoipa::path(post, path = "/api/v1/coffees/{id}/recommend", tag = "Coffees",
    params(("id" = i64, Path, description = "Coffee id")),
    responses(
        (status = 204, description = "Recommendation recorded"),
        (status = 404, description = "Coffee not found")
    )
)]
async fn recommend_coffee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if id < 1 {
        return Err(ApiError::BadRequest("id must be >= 1".into()));
    }
    state.db.coffees.recommend(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// FLAVOR HANDLERS
// =============================================================================

/// List all flavors.
#[utoipa::path(get, path = "/api/v1/flavors", tag = "Flavors",
    responses(
        (status = 200, description = "Flavors ordered by name", body = [Flavor]),
    )
)]
async fn list_flavors(State(state): State<AppState>) -> Result<Json<Vec<Flavor>>, ApiError> {
    let flavors = state.db.flavors.list().await?;
    Ok(Json(flavors))
}

// =============================================================================
// EVENT HANDLERS
// =============================================================================

/// List recorded events, newest first.
#[utoipa::path(get, path = "/api/v1/events", tag = "Events",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum number of events to return"),
        ("offset" = Option<i64>, Query, description = "Number of events to skip")
    ),
    responses(
        (status = 200, description = "Events, newest first", body = [Event]),
        (status = 400, description = "Invalid pagination parameters")
    )
)]
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state
        .db
        .events
        .list(ListEventsRequest {
            limit: query.limit,
            offset: query.offset,
        })
        .await?;
    Ok(Json(events))
}

// =============================================================================
// BRAND HANDLERS
// =============================================================================

/// List the featured coffee brands.
///
/// The list comes from configuration and has no effect on stored coffees.
#[utoipa::path(get, path = "/api/v1/brands", tag = "System",
    responses(
        (status = 200, description = "Configured brand names", body = [String]),
    )
)]
async fn list_brands(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.brands.clone())
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Database(roastery_core::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl From<roastery_core::Error> for ApiError {
    fn from(err: roastery_core::Error) -> Self {
        match &err {
            roastery_core::Error::CoffeeNotFound(_) => ApiError::NotFound(err.to_string()),
            roastery_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            roastery_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            roastery_core::Error::Database(sqlx_err) => {
                let msg = sqlx_err.to_string();
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    return ApiError::Conflict(msg);
                }
                ApiError::Database(err)
            }
            _ => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_brands_defaults() {
        let brands = parse_brands(DEFAULT_BRANDS).expect("default brands should parse");
        assert_eq!(
            brands,
            vec!["buddy brew".to_string(), "nescafe".to_string()]
        );
    }

    #[test]
    fn test_parse_brands_trims_and_skips_empty_entries() {
        let brands = parse_brands(" lavazza , , illy,").expect("brands should parse");
        assert_eq!(brands, vec!["lavazza".to_string(), "illy".to_string()]);
    }

    #[test]
    fn test_parse_brands_rejects_empty_list() {
        let err = parse_brands(" , ,").unwrap_err();
        assert!(matches!(err, roastery_core::Error::Config(_)));
    }

    #[test]
    fn test_api_error_maps_coffee_not_found() {
        let err: ApiError = roastery_core::Error::CoffeeNotFound(42).into();
        match err {
            ApiError::NotFound(msg) => assert!(msg.contains("42")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_api_error_maps_invalid_input() {
        let err: ApiError = roastery_core::Error::InvalidInput("limit must be >= 1".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_api_error_maps_not_found_message() {
        let err: ApiError = roastery_core::Error::NotFound("flavor 'mint'".into()).into();
        match err {
            ApiError::NotFound(msg) => assert_eq!(msg, "flavor 'mint'"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_api_error_responses_carry_status_and_json_body() {
        let resp = ApiError::NotFound("Coffee not found: 7".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let body: serde_json::Value =
            serde_json::from_slice(&bytes).expect("Response body should be JSON");
        assert_eq!(body["error"], "Coffee not found: 7");

        let resp = ApiError::BadRequest("id must be >= 1".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError::Conflict("duplicate key".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_health_check_reports_healthy() {
        let resp = health_check().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let body: serde_json::Value =
            serde_json::from_slice(&bytes).expect("Response body should be JSON");
        assert_eq!(body["status"], "healthy");
    }

    #[test]
    fn test_request_id_generator_produces_uuids() {
        let mut maker = MakeRequestUuidV7;
        let request = axum::http::Request::builder()
            .body(())
            .expect("Failed to build request");
        let id = maker.make_request_id(&request).expect("request id");
        let value = id
            .header_value()
            .to_str()
            .expect("request id should be ASCII");
        assert!(Uuid::parse_str(value).is_ok());
    }

    #[test]
    fn test_openapi_doc_includes_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| *p == "/api/v1/coffees"));
        assert!(paths.iter().any(|p| *p == "/api/v1/coffees/{id}"));
        assert!(paths.iter().any(|p| *p == "/api/v1/coffees/{id}/recommend"));
        assert!(paths.iter().any(|p| *p == "/api/v1/flavors"));
        assert!(paths.iter().any(|p| *p == "/api/v1/events"));
        assert!(paths.iter().any(|p| *p == "/api/v1/brands"));
    }
}
