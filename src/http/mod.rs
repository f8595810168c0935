use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod redirect;
mod routes;

pub use auth::{AdminToken, AuthUser};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::categories())
        .merge(routes::posts())
        .merge(routes::comments())
        .with_state(state)
}
