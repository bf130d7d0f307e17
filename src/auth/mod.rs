use crate::state::AppState;
use axum::Router;

mod dto;
pub mod extractors;
pub mod handlers;
pub mod invitation;
pub mod jwt;
pub mod password;
pub mod services;

pub use extractors::{AuthUser, BasicAuth};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
