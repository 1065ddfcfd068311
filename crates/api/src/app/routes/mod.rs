use axum::Router;

pub mod numbering;
pub mod system;

/// Router for all numbering endpoints.
pub fn router() -> Router {
    Router::new().nest("/numbering", numbering::router())
}
