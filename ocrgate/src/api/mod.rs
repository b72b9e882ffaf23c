mod extractors;
mod handlers;
pub mod payload;
pub mod response;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
