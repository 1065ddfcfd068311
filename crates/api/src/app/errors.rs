use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use logistiga_infra::numbering::NumberingError;
use logistiga_numbering::DocumentFamily;

pub fn numbering_error_to_response(err: NumberingError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        NumberingError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        NumberingError::LockTimeout(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", message)
        }
        NumberingError::StorageUnavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", message)
        }
        NumberingError::SequenceExhausted { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "sequence_exhausted", message)
        }
        NumberingError::CorruptCounter(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_counter", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_family(s: &str) -> Result<DocumentFamily, axum::response::Response> {
    s.parse().map_err(|_| {
        json_error(
            StatusCode::NOT_FOUND,
            "unknown_family",
            "family must be one of: devis, ordre, facture, avoir",
        )
    })
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn query_rejection_to_response(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}
