//! # API REST
//!
//! REST API for Health Connect medical data.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - The OpenAPI document (`/api-docs/openapi.json`)
//! - REST-specific concerns (API key and caller headers, JSON bodies, CORS, status mapping)
//!
//! All data operations are delegated to [`hc_core::MedicalDataService`].

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod dto;
pub mod error;
pub mod health;

use auth::{ApiKeyChecked, Caller};
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use dto::{
    CreateDataSourceReq, DataSourceQuery, DataSourceRes, DataSourceSelection, DeleteReq,
    DeleteRes, FormatReq, FormatRes, IdsReq, ListDataSourcesRes, MedicalResourceRes,
    MedicalResourcesRes, ReadReq, ReadRes, UpsertReq, UpsertResourceReq,
};
use error::{ApiResult, ErrorRes};
use fhir::RawFhirFormatter;
use hc_core::{
    config, CoreConfig, CreateMedicalDataSourceRequest, MedicalDataService,
    UpsertMedicalResourceRequest,
};
use health::{HealthRes, HealthService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

/// Application state shared across REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MedicalDataService>,
    /// Expected `x-api-key` value; resolved once at startup.
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: Arc<MedicalDataService>, api_key: Option<String>) -> Self {
        Self {
            service,
            api_key: api_key.map(Arc::from),
        }
    }

    /// Resolves configuration from the process environment and opens the medical store.
    ///
    /// # Environment Variables
    /// - `HC_DATA_DIR`: storage root (default: `health_data`)
    /// - `HC_MAX_DATA_SOURCES`: per-package data source limit (default: 20)
    /// - `API_KEY`: key every protected request must present
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = config::data_dir_from_env_value(std::env::var("HC_DATA_DIR").ok());
        let max_sources =
            config::max_data_sources_from_env_value(std::env::var("HC_MAX_DATA_SOURCES").ok())?;
        let api_key = std::env::var("API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!("API_KEY not set; protected endpoints will answer 500");
        }

        let cfg = Arc::new(CoreConfig::new(data_dir, max_sources)?);
        tracing::info!("-- Medical data under {}", cfg.medical_dir().display());
        let service = MedicalDataService::open(cfg)?;

        Ok(Self::new(Arc::new(service), api_key))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_data_source,
        list_data_sources,
        delete_data_source,
        upsert_medical_resources,
        read_medical_resources,
        read_medical_resources_by_ids,
        delete_medical_resources_by_ids,
        delete_medical_resources,
        format_fhir,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        CreateDataSourceReq,
        DataSourceRes,
        ListDataSourcesRes,
        UpsertReq,
        UpsertResourceReq,
        MedicalResourceRes,
        MedicalResourcesRes,
        ReadReq,
        ReadRes,
        IdsReq,
        DeleteReq,
        DeleteRes,
        FormatReq,
        FormatRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/data-sources", post(create_data_source).get(list_data_sources))
        .route("/data-sources/:id", delete(delete_data_source))
        .route("/medical-resources", post(upsert_medical_resources))
        .route("/medical-resources/read", post(read_medical_resources))
        .route(
            "/medical-resources/read-by-ids",
            post(read_medical_resources_by_ids),
        )
        .route(
            "/medical-resources/delete-by-ids",
            post(delete_medical_resources_by_ids),
        )
        .route("/medical-resources/delete", post(delete_medical_resources))
        .route("/fhir/format", post(format_fhir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/data-sources",
    request_body = CreateDataSourceReq,
    responses(
        (status = 201, description = "Data source created", body = DataSourceRes),
        (status = 400, description = "Invalid request", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 403, description = "Caller lacks the write permission", body = ErrorRes)
    )
)]
/// Create a medical data source owned by the calling app.
#[axum::debug_handler]
async fn create_data_source(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<CreateDataSourceReq>,
) -> ApiResult<(StatusCode, Json<DataSourceRes>)> {
    let request = CreateMedicalDataSourceRequest::new(req.fhir_base_uri, req.display_name);
    let source = state
        .service
        .create_medical_data_source(&caller, &request)?;
    Ok((StatusCode::CREATED, Json(source.into())))
}

#[utoipa::path(
    get,
    path = "/data-sources",
    params(DataSourceQuery),
    responses(
        (status = 200, description = "Visible data sources", body = ListDataSourcesRes),
        (status = 400, description = "Invalid query", body = ErrorRes),
        (status = 403, description = "Caller holds no medical permission", body = ErrorRes)
    )
)]
/// List data sources by id or by owning package.
#[axum::debug_handler]
async fn list_data_sources(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<DataSourceQuery>,
) -> ApiResult<Json<ListDataSourcesRes>> {
    let sources = match query.selection()? {
        DataSourceSelection::Ids(ids) => state
            .service
            .get_medical_data_sources_by_ids(&caller, &ids)?,
        DataSourceSelection::Packages(packages) => state
            .service
            .get_medical_data_sources_by_packages(&caller, &packages)?,
    };
    Ok(Json(ListDataSourcesRes {
        data_sources: sources.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    delete,
    path = "/data-sources/{id}",
    params(("id" = String, Path, description = "Data source id")),
    responses(
        (status = 204, description = "Data source and its resources deleted"),
        (status = 404, description = "No such data source owned by the caller", body = ErrorRes)
    )
)]
/// Delete a data source together with all of its resources.
#[axum::debug_handler]
async fn delete_data_source(
    State(state): State<AppState>,
    Caller(caller): Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    let id = dto::parse_uuid(&id)?;
    state
        .service
        .delete_medical_data_source_with_data(&caller, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/medical-resources",
    request_body = UpsertReq,
    responses(
        (status = 200, description = "Resources written", body = MedicalResourcesRes),
        (status = 400, description = "A resource failed validation; nothing was written", body = ErrorRes),
        (status = 403, description = "Caller lacks the write permission", body = ErrorRes)
    )
)]
/// Insert or overwrite a batch of FHIR resources.
#[axum::debug_handler]
async fn upsert_medical_resources(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<UpsertReq>,
) -> ApiResult<Json<MedicalResourcesRes>> {
    let requests: Vec<UpsertMedicalResourceRequest> =
        req.resources.into_iter().map(Into::into).collect();
    let written = state.service.upsert_medical_resources(&caller, &requests)?;
    Ok(Json(MedicalResourcesRes::from_resources(written)))
}

#[utoipa::path(
    post,
    path = "/medical-resources/read",
    request_body = ReadReq,
    responses(
        (status = 200, description = "One page of resources", body = ReadRes),
        (status = 400, description = "Invalid request or page token", body = ErrorRes),
        (status = 403, description = "Caller may not read this type", body = ErrorRes)
    )
)]
/// Read one page of resources of a medical resource type.
#[axum::debug_handler]
async fn read_medical_resources(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<ReadReq>,
) -> ApiResult<Json<ReadRes>> {
    let request = req.into_request()?;
    let page = state.service.read_medical_resources(&caller, &request)?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/medical-resources/read-by-ids",
    request_body = IdsReq,
    responses(
        (status = 200, description = "Readable resources in request order", body = MedicalResourcesRes),
        (status = 400, description = "Invalid ids", body = ErrorRes)
    )
)]
/// Read resources by id.
#[axum::debug_handler]
async fn read_medical_resources_by_ids(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<IdsReq>,
) -> ApiResult<Json<MedicalResourcesRes>> {
    let ids = dto::parse_uuids(&req.ids)?;
    let found = state
        .service
        .read_medical_resources_by_ids(&caller, &ids)?;
    Ok(Json(MedicalResourcesRes::from_resources(found)))
}

#[utoipa::path(
    post,
    path = "/medical-resources/delete-by-ids",
    request_body = IdsReq,
    responses(
        (status = 200, description = "Number of resources deleted", body = DeleteRes),
        (status = 400, description = "Invalid ids", body = ErrorRes)
    )
)]
/// Delete the caller's resources by id.
#[axum::debug_handler]
async fn delete_medical_resources_by_ids(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<IdsReq>,
) -> ApiResult<Json<DeleteRes>> {
    let ids = dto::parse_uuids(&req.ids)?;
    let deleted = state
        .service
        .delete_medical_resources_by_ids(&caller, &ids)?;
    Ok(Json(DeleteRes { deleted }))
}

#[utoipa::path(
    post,
    path = "/medical-resources/delete",
    request_body = DeleteReq,
    responses(
        (status = 200, description = "Number of resources deleted", body = DeleteRes),
        (status = 400, description = "Invalid filters", body = ErrorRes)
    )
)]
/// Delete the caller's resources matching data source and type filters.
#[axum::debug_handler]
async fn delete_medical_resources(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<DeleteReq>,
) -> ApiResult<Json<DeleteRes>> {
    let request = req.into_request()?;
    let deleted = state
        .service
        .delete_medical_resources_by_request(&caller, &request)?;
    Ok(Json(DeleteRes { deleted }))
}

#[utoipa::path(
    post,
    path = "/fhir/format",
    request_body = FormatReq,
    responses(
        (status = 200, description = "Indented JSON, or the input unchanged", body = FormatRes)
    )
)]
/// Pretty-print raw FHIR JSON for display. Never fails on malformed input.
async fn format_fhir(_key: ApiKeyChecked, Json(req): Json<FormatReq>) -> Json<FormatRes> {
    Json(FormatRes {
        valid_json: RawFhirFormatter::is_valid_json(&req.data),
        formatted: RawFhirFormatter::format_str(&req.data),
    })
}
