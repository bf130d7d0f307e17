use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod lookup;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
