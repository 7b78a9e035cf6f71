pub mod dto;
pub mod handlers;
pub mod photos;
pub mod repo;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use photos::RandomPhotoNames;
pub use repo::PgGoodRepo;
pub use services::GoodStore;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes(max_upload_bytes))
}
