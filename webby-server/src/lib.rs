pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod htpasswd;
pub mod repository;
pub mod router;

pub use app_state::AppState;
pub use config::ServiceConfig;
pub use error::WebbyError;
pub use htpasswd::{Htpasswd, SharedHtpasswd};
pub use repository::Repository;
pub use router::app;
