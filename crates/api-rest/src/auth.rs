//! API key checks and caller identity extraction.
//!
//! Every protected request carries:
//! - `x-api-key`: the shared API key configured at startup
//! - `x-caller-package`: the package name of the calling app
//! - `x-granted-permissions`: comma-separated permissions granted to that app

use crate::error::ApiError;
use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use hc_core::{CallerIdentity, PackageName};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CALLER_PACKAGE_HEADER: &str = "x-caller-package";
pub const GRANTED_PERMISSIONS_HEADER: &str = "x-granted-permissions";

/// Validates the provided API key against the key configured at startup.
///
/// # Errors
///
/// Returns [`ApiError::Misconfigured`] if no key is configured and [`ApiError::Unauthorized`]
/// if the provided key is missing or wrong.
pub fn validate_api_key(expected: Option<&str>, provided: Option<&str>) -> Result<(), ApiError> {
    let expected =
        expected.ok_or_else(|| ApiError::Misconfigured("API_KEY not set in environment".into()))?;

    match provided {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("Invalid API key".into())),
        None => Err(ApiError::Unauthorized("Missing API key".into())),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Builds the caller identity from request headers.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] if the package header is missing or malformed.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<CallerIdentity, ApiError> {
    let package = header_str(headers, CALLER_PACKAGE_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", CALLER_PACKAGE_HEADER)))?;
    let package = PackageName::parse(package)
        .map_err(|e| ApiError::BadRequest(format!("{}: {}", CALLER_PACKAGE_HEADER, e)))?;

    let permissions = header_str(headers, GRANTED_PERMISSIONS_HEADER)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty());

    Ok(CallerIdentity::new(package, permissions))
}

/// A request that presented the right API key but acts for no particular app.
pub struct ApiKeyChecked;

#[async_trait]
impl FromRequestParts<AppState> for ApiKeyChecked {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        validate_api_key(
            state.api_key.as_deref(),
            header_str(&parts.headers, API_KEY_HEADER),
        )?;
        Ok(ApiKeyChecked)
    }
}

/// An authenticated caller.
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        validate_api_key(
            state.api_key.as_deref(),
            header_str(&parts.headers, API_KEY_HEADER),
        )?;
        caller_from_headers(&parts.headers).map(Caller)
    }
}
