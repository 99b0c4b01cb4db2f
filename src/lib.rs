// Docplan - turns uploaded planning documents into structured project plans

pub mod config;
pub mod extraction;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod plan;
pub mod queue;
pub mod routes;
pub mod settings; // AI provider configuration file
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
