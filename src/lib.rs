pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod relay;
pub mod state;
pub mod store;
pub mod transit;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
