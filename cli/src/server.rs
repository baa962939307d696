use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;

use frostbox_core::archive::{BackupFormat, BackupSummary};
use frostbox_core::conflict::ConflictPolicy;
use frostbox_core::models::{
    Category, CategoryWithCount, Location, LocationWithCount, NewCategory, NewLocation,
    NewProduct, Product, ProductFilter, ProductStatistics,
};
use frostbox_core::restore::{RestoreOptions, RestoreOutcome, RestoreRequest};
use frostbox_core::service::{FreezerService, ServiceError};

const BODY_LIMIT: usize = 50 * 1024 * 1024; // 50 MB
const DEFAULT_EXPIRING_DAYS: i64 = 7;
const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<FreezerService>>,
    api_key: Option<String>,
}

impl AppState {
    /// One caller at a time touches the store, so a restore never interleaves
    /// with another write or export.
    fn service(&self) -> MutexGuard<'_, FreezerService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ProductQuery {
    category_id: Option<i64>,
    location_id: Option<i64>,
    name: Option<String>,
    page: Option<i64>,
    size: Option<i64>,
}

impl ProductQuery {
    fn into_filter(self) -> Result<ProductFilter, ApiError> {
        let (limit, offset) = match (self.page, self.size) {
            (_, Some(size)) if !(1..=MAX_PAGE_SIZE).contains(&size) => {
                let msg = format!("size must be between 1 and {MAX_PAGE_SIZE}");
                return Err(ApiError::BadRequest(msg));
            }
            (Some(page), _) if page < 0 => {
                return Err(ApiError::BadRequest("page must not be negative".to_string()));
            }
            (Some(_), None) => {
                return Err(ApiError::BadRequest("page requires size".to_string()));
            }
            (page, Some(size)) => (Some(size), Some(page.unwrap_or(0) * size)),
            (None, None) => (None, None),
        };
        Ok(ProductFilter {
            category_id: self.category_id,
            location_id: self.location_id,
            name: self.name.filter(|n| !n.trim().is_empty()),
            limit,
            offset,
        })
    }
}

#[derive(Deserialize)]
struct DaysQuery {
    days: Option<i64>,
}

#[derive(Deserialize)]
struct FormatQuery {
    format: Option<String>,
}

#[derive(Deserialize)]
struct ImportQuery {
    format: Option<String>,
    #[serde(default)]
    clear_existing_data: bool,
    conflict_resolution: Option<String>,
    #[serde(default)]
    preserve_ids: bool,
}

fn parse_format(format: Option<&str>) -> Result<BackupFormat, ApiError> {
    format.map_or(Ok(BackupFormat::default()), |f| {
        f.parse().map_err(|e| ApiError::BadRequest(format!("{e}")))
    })
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                log::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ServiceError>() {
            Some(ServiceError::NotFound(msg)) => Self::NotFound(msg.clone()),
            Some(ServiceError::Invalid(msg)) => Self::BadRequest(msg.clone()),
            Some(ServiceError::Conflict(msg)) => Self::Conflict(msg.clone()),
            None => Self::Internal(err),
        }
    }
}

/// 200 for a successful restore, 400 with the full report otherwise.
fn outcome_response(outcome: RestoreOutcome) -> (StatusCode, Json<RestoreOutcome>) {
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(outcome))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Category handlers ---

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.service().list_categories()?))
}

async fn categories_with_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithCount>>, ApiError> {
    Ok(Json(state.service().category_product_counts()?))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.service().get_category(id)?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(req): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let created = state.service().create_category(&req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NewCategory>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.service().update_category(id, &req)?))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_category(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn default_categories(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let created = state.service().reinitialize_default_categories()?;
    Ok(Json(json!({ "created": created })))
}

// --- Location handlers ---

async fn list_locations(State(state): State<AppState>) -> Result<Json<Vec<Location>>, ApiError> {
    Ok(Json(state.service().list_locations()?))
}

async fn locations_with_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<LocationWithCount>>, ApiError> {
    Ok(Json(state.service().location_product_counts()?))
}

async fn locations_in_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
) -> Result<Json<Vec<Location>>, ApiError> {
    Ok(Json(state.service().list_locations_by_section(&section)?))
}

async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Location>, ApiError> {
    Ok(Json(state.service().get_location(id)?))
}

async fn create_location(
    State(state): State<AppState>,
    Json(req): Json<NewLocation>,
) -> Result<(StatusCode, Json<Location>), ApiError> {
    let created = state.service().create_location(&req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NewLocation>,
) -> Result<Json<Location>, ApiError> {
    Ok(Json(state.service().update_location(id, &req)?))
}

async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_location(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn default_locations(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let created = state.service().initialize_default_locations()?;
    Ok(Json(json!({ "created": created })))
}

// --- Product handlers ---

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.service().list_products(&filter)?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.service().get_product(id)?))
}

async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let created = state.service().create_product(&req, today())?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NewProduct>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.service().update_product(id, &req, today())?))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_product(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn expiring_soon(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_EXPIRING_DAYS);
    Ok(Json(state.service().expiring_soon(days, today())?))
}

async fn expired_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.service().expired(today())?))
}

async fn product_statistics(
    State(state): State<AppState>,
) -> Result<Json<ProductStatistics>, ApiError> {
    Ok(Json(state.service().statistics(today())?))
}

// --- Backup handlers ---

async fn export_backup(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, ApiError> {
    let format = parse_format(query.format.as_deref())?;
    let exported = state
        .service()
        .export_backup(format, Local::now().naive_local())?;
    log::info!(
        "Exported {} backup ({} bytes)",
        exported.format,
        exported.bytes.len()
    );

    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", exported.filename),
        ),
    ];
    Ok((headers, exported.bytes).into_response())
}

async fn import_backup(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<RestoreOutcome>), ApiError> {
    let format = parse_format(query.format.as_deref())?;
    let conflict_resolution = match query.conflict_resolution.as_deref() {
        Some(p) => p
            .parse::<ConflictPolicy>()
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?,
        None => ConflictPolicy::default(),
    };
    let options = RestoreOptions {
        clear_existing_data: query.clear_existing_data,
        conflict_resolution,
        preserve_ids: query.preserve_ids,
    };

    let outcome = state.service().import_backup(&body, format, &options);
    Ok(outcome_response(outcome))
}

async fn restore_backup(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> (StatusCode, Json<RestoreOutcome>) {
    outcome_response(state.service().restore(&req))
}

async fn validate_backup(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
    body: Bytes,
) -> Result<Json<BackupSummary>, ApiError> {
    let format = parse_format(query.format.as_deref())?;
    Ok(Json(state.service().validate_backup(&body, format)?))
}

async fn clear_data(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.service().clear_all_data()?;
    Ok(StatusCode::NO_CONTENT)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/with-products", get(categories_with_products))
        .route("/api/categories/defaults", post(default_categories))
        .route(
            "/api/categories/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .route("/api/locations", get(list_locations).post(create_location))
        .route("/api/locations/with-products", get(locations_with_products))
        .route("/api/locations/section/{section}", get(locations_in_section))
        .route("/api/locations/defaults", post(default_locations))
        .route(
            "/api/locations/{id}",
            get(get_location)
                .put(update_location)
                .delete(delete_location),
        )
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/expiring-soon", get(expiring_soon))
        .route("/api/products/expired", get(expired_products))
        .route("/api/products/statistics", get(product_statistics))
        .route(
            "/api/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/backup/export", get(export_backup))
        .route("/api/backup/import", post(import_backup))
        .route("/api/backup/restore", post(restore_backup))
        .route("/api/backup/validate", post(validate_backup))
        .route("/api/backup/clear", delete(clear_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: FreezerService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        log::info!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        log::warn!("Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        log::warn!(
            "Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    log::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
