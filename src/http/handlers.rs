//! REST handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResponse, ApiResult};
use crate::batch::{BatchRequest, BatchResult};
use crate::convert::{ConversionRequest, ConversionResult, ConverterInfo};
use crate::service::{ConvertService, HealthStatus};
use crate::types::{Environment, Error};

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::validation(rejection.body_text()).into())
}

#[derive(Debug, Serialize)]
pub(crate) struct Banner {
    name: String,
    version: String,
    environment: Environment,
    started_at: DateTime<Utc>,
}

pub(crate) async fn index(State(service): State<ConvertService>) -> ApiResponse<Banner> {
    let instance = service.instance();
    ApiResponse::success(Banner {
        name: instance.name.clone(),
        version: instance.version.clone(),
        environment: instance.environment,
        started_at: instance.started_at(),
    })
}

pub(crate) async fn convert(
    State(service): State<ConvertService>,
    payload: Result<Json<ConversionRequest>, JsonRejection>,
) -> ApiResult<ConversionResult> {
    let request = json_body(payload)?;
    Ok(ApiResponse::success(service.convert(request).await?))
}

pub(crate) async fn convert_batch(
    State(service): State<ConvertService>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> ApiResult<BatchResult> {
    let request = json_body(payload)?;
    Ok(ApiResponse::success(service.convert_batch(request).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SimpleQuery {
    #[serde(default)]
    html: String,
}

pub(crate) async fn convert_simple(
    State(service): State<ConvertService>,
    query: Result<Query<SimpleQuery>, QueryRejection>,
) -> ApiResult<ConversionResult> {
    let Query(query) = query.map_err(|rejection| Error::validation(rejection.body_text()))?;
    Ok(ApiResponse::success(
        service.convert(ConversionRequest::new(query.html)).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UrlRequest {
    #[serde(default)]
    url: String,
}

pub(crate) async fn convert_from_url(
    State(service): State<ConvertService>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> ApiResult<ConversionResult> {
    let request = json_body(payload)?;
    Ok(ApiResponse::success(service.convert_from_url(&request.url).await?))
}

pub(crate) async fn health(State(service): State<ConvertService>) -> ApiResponse<HealthStatus> {
    ApiResponse::success(service.health())
}

pub(crate) async fn info(State(service): State<ConvertService>) -> ApiResponse<ConverterInfo> {
    ApiResponse::success(service.info())
}

pub(crate) async fn not_found() -> ApiError {
    ApiError(Error::not_found("route not found"))
}
