use crate::app::AppState;
use axum::Router;

pub mod campaign;
pub mod events;
pub mod session;
pub mod sync;
pub mod webhook;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(campaign::router())
        .merge(session::router())
        .merge(sync::router())
        .merge(webhook::router())
        .merge(events::router())
}
