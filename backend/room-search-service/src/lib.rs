pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use state::AppState;
