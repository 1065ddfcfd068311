use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post, put},
};

use crate::app::dto::{
    AllocateRequest, DocumentNumberResponse, UpdateSettingsRequest, YearQuery, settings_response,
};
use crate::app::errors::{
    json_error, json_rejection_to_response, numbering_error_to_response, parse_family,
    query_rejection_to_response,
};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/:family/allocate", post(allocate))
        .route("/:family/preview", get(preview))
        .route("/:family/settings", put(update_settings))
}

/// Body of an allocate call. An empty body means "current year"; anything
/// else must be a well-formed JSON request.
fn parse_allocate_body(
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<AllocateRequest, axum::response::Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AllocateRequest::default());
    }
    if !has_json_content_type(headers) {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "expected request with `Content-Type: application/json`",
        ));
    }
    Json::<AllocateRequest>::from_bytes(body)
        .map(|Json(req)| req)
        .map_err(json_rejection_to_response)
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let essence = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Path(family): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let family = match parse_family(&family) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let req = match parse_allocate_body(&headers, &body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    match services.allocator().allocate(family, req.year).await {
        Ok(number) => (
            StatusCode::CREATED,
            Json(DocumentNumberResponse::new(family, &number)),
        )
            .into_response(),
        Err(e) => numbering_error_to_response(e),
    }
}

async fn preview(
    Extension(services): Extension<Arc<AppServices>>,
    Path(family): Path<String>,
    query: Result<Query<YearQuery>, QueryRejection>,
) -> axum::response::Response {
    let family = match parse_family(&family) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return query_rejection_to_response(rejection),
    };

    match services.allocator().preview(family, query.year).await {
        Ok(number) => Json(DocumentNumberResponse::new(family, &number)).into_response(),
        Err(e) => numbering_error_to_response(e),
    }
}

async fn get_settings(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.allocator().settings().await {
        Ok(data) => Json(settings_response(&data)).into_response(),
        Err(e) => numbering_error_to_response(e),
    }
}

async fn update_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Path(family): Path<String>,
    body: Result<Json<UpdateSettingsRequest>, JsonRejection>,
) -> axum::response::Response {
    let family = match parse_family(&family) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection_to_response(rejection),
    };
    let update = match req.into_update() {
        Ok(u) => u,
        Err(e) => return numbering_error_to_response(e),
    };

    match services.allocator().configure(family, update).await {
        Ok(data) => Json(settings_response(&data)).into_response(),
        Err(e) => numbering_error_to_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn empty_body_means_current_year() {
        let req = parse_allocate_body(&HeaderMap::new(), &Bytes::from_static(b"  \n")).ok().unwrap();
        assert_eq!(req.year, None);
    }

    #[test]
    fn json_body_without_content_type_is_rejected() {
        let resp = parse_allocate_body(&HeaderMap::new(), &Bytes::from_static(br#"{"year":2025}"#))
            .err().unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn mistyped_year_is_rejected() {
        let resp = parse_allocate_body(
            &json_headers("application/json"),
            &Bytes::from_static(br#"{"year":"2025"}"#),
        )
        .err().unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn charset_parameter_is_accepted() {
        let req = parse_allocate_body(
            &json_headers("application/json; charset=utf-8"),
            &Bytes::from_static(br#"{"year":2025}"#),
        )
        .ok()
        .unwrap();
        assert_eq!(req.year, Some(2025));
    }
}
